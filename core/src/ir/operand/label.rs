use std::{fmt, sync::Arc};

/// Jump target token. Only meaningful relative to the [`LabelTable`] of the
/// scope that created it; resolved to an instruction offset at linearisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(u32);

impl Label {
    #[inline]
    pub const fn from_index(index: u32) -> Label {
        Label(index)
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Arena of labels owned by a scope.
#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    names: Vec<Arc<str>>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self, prefix: &str) -> Label {
        let label = Label(self.names.len() as u32);
        self.names.push(Arc::from(format!("{}_{}", prefix, label.0)));
        label
    }

    /// Re-creates a label with a given name; used when decoding so that
    /// label indices survive a round trip.
    pub fn push_named(&mut self, name: Arc<str>) -> Label {
        let label = Label(self.names.len() as u32);
        self.names.push(name);
        label
    }

    pub fn name(&self, label: Label) -> Option<&str> {
        self.names.get(label.0 as usize).map(|n| n.as_ref())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[Arc<str>] {
        &self.names
    }
}
