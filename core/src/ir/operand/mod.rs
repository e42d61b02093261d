//! Operands: immutable descriptors of where an instruction's inputs come from.

use std::{fmt, sync::Arc};

use rustc_hash::FxHashMap;

use crate::{
    interp::{ExecutionContext, InterpState, Unwind},
    value::{BlockKind, Value},
};

use super::Scope;

mod label;
mod variable;

pub use label::{Label, LabelTable};
pub use variable::{LocalVar, Variable};

/// Copy/constant-propagation map consumed by [`Operand::simplified`].
pub type ValueMap = FxHashMap<Variable, Operand>;

// Bounds copy-chain walking so a malformed (cyclic) map cannot hang a pass.
const SIMPLIFY_FUEL: u32 = 32;

#[derive(Debug, Clone)]
pub enum Operand {
    Nil,
    Boolean(bool),
    Undefined,
    Fixnum(i64),
    Float(f64),
    /// Frozen string literal
    Str(Arc<str>),
    Symbol(Arc<str>),
    /// Array literal; `Splat` elements are expanded in place on retrieval
    Array(Arc<[Operand]>),
    Hash(Arc<[(Operand, Operand)]>),
    Splat(Arc<Operand>),
    Label(Label),
    Var(Variable),
    /// Literal block body; retrieval binds it to the current activation
    Closure(Arc<Scope>),
    /// The lexically enclosing module of the executing code
    ScopeModule,
    /// "No block" sentinel
    NullBlock,
}

impl Operand {
    pub fn str(s: &str) -> Operand {
        Operand::Str(Arc::from(s))
    }

    pub fn sym(s: &str) -> Operand {
        Operand::Symbol(Arc::from(s))
    }

    pub fn array(items: Vec<Operand>) -> Operand {
        Operand::Array(Arc::from(items))
    }

    pub fn splat(inner: Operand) -> Operand {
        Operand::Splat(Arc::new(inner))
    }

    pub fn self_ref() -> Operand {
        Operand::Var(Variable::SelfRef)
    }

    /// Literal whose value is fixed at build time and cheap to duplicate.
    pub fn is_constant(&self) -> bool {
        matches!(
            self,
            Operand::Nil
                | Operand::Boolean(_)
                | Operand::Undefined
                | Operand::Fixnum(_)
                | Operand::Float(_)
                | Operand::Str(_)
                | Operand::Symbol(_)
                | Operand::NullBlock
        )
    }

    /// Operands whose retrieval allocates; propagating them duplicates the
    /// allocation, so they are only substituted when simplification is forced.
    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            Operand::Array(_) | Operand::Hash(_) | Operand::Splat(_) | Operand::Closure(_)
        )
    }

    pub fn is_splat(&self) -> bool {
        matches!(self, Operand::Splat(_))
    }

    pub fn as_var(&self) -> Option<&Variable> {
        match self {
            Operand::Var(v) => Some(v),
            _ => None,
        }
    }

    /// Static method name carried by a string or symbol literal.
    pub fn as_static_name(&self) -> Option<&str> {
        match self {
            Operand::Str(s) | Operand::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn add_used_variables(&self, out: &mut Vec<Variable>) {
        match self {
            Operand::Var(v) => out.push(v.clone()),
            Operand::Array(items) => items.iter().for_each(|o| o.add_used_variables(out)),
            Operand::Hash(pairs) => pairs.iter().for_each(|(k, v)| {
                k.add_used_variables(out);
                v.add_used_variables(out);
            }),
            Operand::Splat(inner) => inner.add_used_variables(out),
            _ => {}
        }
    }

    pub fn references(&self, var: &Variable) -> bool {
        match self {
            Operand::Var(v) => v == var,
            Operand::Array(items) => items.iter().any(|o| o.references(var)),
            Operand::Hash(pairs) => pairs.iter().any(|(k, v)| k.references(var) || v.references(var)),
            Operand::Splat(inner) => inner.references(var),
            _ => false,
        }
    }

    /// Substitutes known equivalents from `map`.
    ///
    /// Copy chains are followed to their end, so applying the result to the
    /// same map again is a no-op. Composite values are only substituted for
    /// a variable when `force` is set.
    pub fn simplified(&self, map: &ValueMap, force: bool) -> Operand {
        self.simplify_with(map, force, SIMPLIFY_FUEL)
    }

    fn simplify_with(&self, map: &ValueMap, force: bool, fuel: u32) -> Operand {
        if fuel == 0 {
            return self.clone();
        }
        match self {
            Operand::Var(v) => match map.get(v) {
                None => self.clone(),
                Some(value) if value.is_composite() && !force => self.clone(),
                Some(value) => value.simplify_with(map, force, fuel - 1),
            },
            Operand::Array(items) => {
                Operand::Array(items.iter().map(|o| o.simplify_with(map, force, fuel - 1)).collect())
            }
            Operand::Hash(pairs) => Operand::Hash(
                pairs
                    .iter()
                    .map(|(k, v)| (k.simplify_with(map, force, fuel - 1), v.simplify_with(map, force, fuel - 1)))
                    .collect(),
            ),
            Operand::Splat(inner) => Operand::Splat(Arc::new(inner.simplify_with(map, force, fuel - 1))),
            _ => self.clone(),
        }
    }

    /// Run-time value of this operand in the given activation.
    pub fn retrieve(&self, ctx: &mut ExecutionContext, state: &InterpState) -> Result<Value, Unwind> {
        Ok(match self {
            Operand::Nil | Operand::NullBlock => Value::Nil,
            Operand::Boolean(b) => Value::Bool(*b),
            Operand::Undefined => Value::Undefined,
            Operand::Fixnum(i) => Value::Int(*i),
            Operand::Float(f) => Value::Float(*f),
            Operand::Str(s) => Value::Str(s.clone()),
            Operand::Symbol(s) => Value::Symbol(s.clone()),
            Operand::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items.iter() {
                    match item {
                        Operand::Splat(inner) => {
                            let v = inner.retrieve(ctx, state)?;
                            out.extend(ctx.splat(&v)?);
                        }
                        _ => out.push(item.retrieve(ctx, state)?),
                    }
                }
                Value::array(out)
            }
            Operand::Hash(pairs) => {
                let mut out = Vec::with_capacity(pairs.len());
                for (k, v) in pairs.iter() {
                    out.push((k.retrieve(ctx, state)?, v.retrieve(ctx, state)?));
                }
                Value::hash(out)
            }
            Operand::Splat(inner) => {
                let v = inner.retrieve(ctx, state)?;
                Value::array(ctx.splat(&v)?)
            }
            Operand::Label(l) => Value::Label(*l),
            Operand::Var(v) => state.get_var(v)?,
            Operand::Closure(body) => Value::Proc(state.make_block(body, BlockKind::Normal)?),
            Operand::ScopeModule => Value::Module(state.module().clone()),
        })
    }
}

impl PartialEq for Operand {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Operand::Nil, Operand::Nil)
            | (Operand::Undefined, Operand::Undefined)
            | (Operand::ScopeModule, Operand::ScopeModule)
            | (Operand::NullBlock, Operand::NullBlock) => true,
            (Operand::Boolean(a), Operand::Boolean(b)) => a == b,
            (Operand::Fixnum(a), Operand::Fixnum(b)) => a == b,
            (Operand::Float(a), Operand::Float(b)) => a.to_bits() == b.to_bits(),
            (Operand::Str(a), Operand::Str(b)) => a == b,
            (Operand::Symbol(a), Operand::Symbol(b)) => a == b,
            (Operand::Array(a), Operand::Array(b)) => a == b,
            (Operand::Hash(a), Operand::Hash(b)) => a == b,
            (Operand::Splat(a), Operand::Splat(b)) => a == b,
            (Operand::Label(a), Operand::Label(b)) => a == b,
            (Operand::Var(a), Operand::Var(b)) => a == b,
            (Operand::Closure(a), Operand::Closure(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<Variable> for Operand {
    fn from(v: Variable) -> Self {
        Operand::Var(v)
    }
}

impl From<Label> for Operand {
    fn from(l: Label) -> Self {
        Operand::Label(l)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Nil => f.write_str("nil"),
            Operand::Boolean(b) => write!(f, "{}", b),
            Operand::Undefined => f.write_str("undef"),
            Operand::Fixnum(i) => write!(f, "{}", i),
            Operand::Float(x) => write!(f, "{:?}", x),
            Operand::Str(s) => write!(f, "frozen:{:?}", s.as_ref()),
            Operand::Symbol(s) => write!(f, ":{}", s),
            Operand::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Operand::Hash(pairs) => {
                f.write_str("{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} => {}", k, v)?;
                }
                f.write_str("}")
            }
            Operand::Splat(inner) => write!(f, "*{}", inner),
            Operand::Label(l) => write!(f, "{}", l),
            Operand::Var(v) => write!(f, "{}", v),
            Operand::Closure(scope) => write!(f, "closure<{}>", scope.name()),
            Operand::ScopeModule => f.write_str("%current_module"),
            Operand::NullBlock => f.write_str("null_block"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp(n: u32) -> Variable {
        Variable::Temp(n)
    }

    #[test]
    fn simplify_follows_copy_chains_once() {
        let mut map = ValueMap::default();
        map.insert(temp(1), Operand::Var(temp(2)));
        map.insert(temp(2), Operand::Fixnum(7));
        let op = Operand::Var(temp(1));
        let once = op.simplified(&map, false);
        assert_eq!(once, Operand::Fixnum(7));
        assert_eq!(once.simplified(&map, false), once);
    }

    #[test]
    fn composite_values_need_force() {
        let mut map = ValueMap::default();
        map.insert(temp(1), Operand::array(vec![Operand::Fixnum(1)]));
        let op = Operand::Var(temp(1));
        assert_eq!(op.simplified(&map, false), op);
        assert_eq!(op.simplified(&map, true), Operand::array(vec![Operand::Fixnum(1)]));
    }

    #[test]
    fn simplify_rewrites_inside_composites() {
        let mut map = ValueMap::default();
        map.insert(temp(3), Operand::sym("x"));
        let op = Operand::array(vec![Operand::splat(Operand::Var(temp(3))), Operand::Nil]);
        let simplified = op.simplified(&map, false);
        assert_eq!(simplified, Operand::array(vec![Operand::splat(Operand::sym("x")), Operand::Nil]));
        assert_eq!(simplified.simplified(&map, false), simplified);
    }

    #[test]
    fn used_variables_reach_nested_operands() {
        let op = Operand::array(vec![Operand::Var(temp(1)), Operand::splat(Operand::Var(Variable::local("a", 0, 0)))]);
        let mut used = Vec::new();
        op.add_used_variables(&mut used);
        assert_eq!(used, vec![temp(1), Variable::local("a", 0, 0)]);
        assert!(op.references(&temp(1)));
        assert!(!op.references(&temp(2)));
    }
}
