use std::{fmt, sync::Arc};

/// Storage location referenced by operands and written by result-producing
/// instructions. The namespace belongs to the enclosing scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Variable {
    /// `%self`
    SelfRef,
    /// Scope-private register, never visible to closures.
    Temp(u32),
    Local(LocalVar),
}

/// Local variable slot, addressed through the dynamic scope chain.
///
/// `depth` counts closure boundaries between the referencing scope and the
/// scope that owns the slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalVar {
    pub name: Arc<str>,
    pub depth: u32,
    pub offset: u32,
}

impl LocalVar {
    pub fn new(name: impl Into<Arc<str>>, depth: u32, offset: u32) -> Self {
        Self {
            name: name.into(),
            depth,
            offset,
        }
    }

    /// Same slot as seen from a scope `levels` closures further in.
    pub fn deeper(&self, levels: u32) -> LocalVar {
        LocalVar {
            name: self.name.clone(),
            depth: self.depth + levels,
            offset: self.offset,
        }
    }
}

impl Variable {
    pub fn local(name: impl Into<Arc<str>>, depth: u32, offset: u32) -> Variable {
        Variable::Local(LocalVar::new(name, depth, offset))
    }

    #[inline]
    pub fn is_temp(&self) -> bool {
        matches!(self, Variable::Temp(_))
    }

    #[inline]
    pub fn is_local(&self) -> bool {
        matches!(self, Variable::Local(_))
    }

    pub fn as_local(&self) -> Option<&LocalVar> {
        match self {
            Variable::Local(l) => Some(l),
            _ => None,
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variable::SelfRef => f.write_str("%self"),
            Variable::Temp(n) => write!(f, "%v_{}", n),
            Variable::Local(l) if l.depth == 0 => write!(f, "{}", l.name),
            Variable::Local(l) => write!(f, "{}^{}", l.name, l.depth),
        }
    }
}
