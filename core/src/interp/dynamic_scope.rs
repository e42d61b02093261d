use std::sync::{
    Arc, RwLock,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use crate::value::Value;

static NEXT_DYNSCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// What kind of activation owns a dynamic scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeRole {
    /// Script, module body or plain block
    Plain,
    Method,
    /// Block installed with `define_method`
    BlockMethod,
    Lambda,
}

struct Inner {
    id: u64,
    slots: RwLock<Vec<Value>>,
    parent: Option<DynamicScope>,
    role: ScopeRole,
    active: AtomicBool,
}

/// Local-variable storage of one activation, linked to the binding it was
/// created in. Cheap to clone; clones share the slots.
#[derive(Clone)]
pub struct DynamicScope(Arc<Inner>);

impl DynamicScope {
    pub fn new(slots: usize, parent: Option<DynamicScope>, role: ScopeRole) -> Self {
        Self(Arc::new(Inner {
            id: NEXT_DYNSCOPE_ID.fetch_add(1, Ordering::Relaxed),
            slots: RwLock::new(vec![Value::Nil; slots]),
            parent,
            role,
            active: AtomicBool::new(true),
        }))
    }

    /// Target identity for break and return signals.
    #[inline]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn parent(&self) -> Option<&DynamicScope> {
        self.0.parent.as_ref()
    }

    pub fn role(&self) -> ScopeRole {
        self.0.role
    }

    pub fn is_method_like(&self) -> bool {
        matches!(self.0.role, ScopeRole::Method | ScopeRole::BlockMethod)
    }

    /// Whether a nonlocal `return` from a nested block stops here.
    pub fn is_return_target(&self) -> bool {
        self.0.role != ScopeRole::Plain
    }

    pub fn is_active(&self) -> bool {
        self.0.active.load(Ordering::Acquire)
    }

    /// Called when the owning activation exits; procs that escaped it can no
    /// longer break or return through it.
    pub fn deactivate(&self) {
        self.0.active.store(false, Ordering::Release);
    }

    /// Scope `depth` levels out, `self` at 0.
    pub fn ancestor(&self, depth: u32) -> Option<&DynamicScope> {
        let mut cur = self;
        for _ in 0..depth {
            cur = cur.0.parent.as_ref()?;
        }
        Some(cur)
    }

    /// Nearest method-like scope and its distance.
    pub fn method_scope(&self) -> Option<(u32, &DynamicScope)> {
        self.find(DynamicScope::is_method_like)
    }

    /// Activation a nonlocal `return` from this scope leaves.
    pub fn return_target(&self) -> Option<&DynamicScope> {
        self.find(DynamicScope::is_return_target).map(|(_, scope)| scope)
    }

    fn find(&self, pred: impl Fn(&DynamicScope) -> bool) -> Option<(u32, &DynamicScope)> {
        let mut cur = self;
        let mut level = 0;
        loop {
            if pred(cur) {
                return Some((level, cur));
            }
            cur = cur.0.parent.as_ref()?;
            level += 1;
        }
    }

    pub fn get(&self, offset: u32) -> Value {
        let slots = self.0.slots.read().unwrap_or_else(|e| e.into_inner());
        slots.get(offset as usize).cloned().unwrap_or(Value::Nil)
    }

    pub fn set(&self, offset: u32, value: Value) {
        let mut slots = self.0.slots.write().unwrap_or_else(|e| e.into_inner());
        let offset = offset as usize;
        if offset >= slots.len() {
            // eval-style scopes may grow after creation
            slots.resize(offset + 1, Value::Nil);
        }
        slots[offset] = value;
    }
}

impl std::fmt::Debug for DynamicScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicScope")
            .field("id", &self.0.id)
            .field("role", &self.0.role)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_shared_between_clones() {
        let scope = DynamicScope::new(2, None, ScopeRole::Method);
        let alias = scope.clone();
        alias.set(1, Value::Int(7));
        assert_eq!(scope.get(1), Value::Int(7));
        assert_eq!(scope.id(), alias.id());
    }

    #[test]
    fn method_scope_is_found_through_closures() {
        let method = DynamicScope::new(1, None, ScopeRole::Method);
        let outer = DynamicScope::new(0, Some(method.clone()), ScopeRole::Plain);
        let inner = DynamicScope::new(0, Some(outer), ScopeRole::Lambda);
        let (level, found) = inner.method_scope().unwrap();
        assert_eq!(level, 2);
        assert_eq!(found.id(), method.id());
        assert_eq!(inner.ancestor(2).map(DynamicScope::id), Some(method.id()));
        assert!(inner.ancestor(3).is_none());
        // a lambda catches returns before the method does
        assert_eq!(inner.return_target().map(DynamicScope::id), Some(inner.id()));
    }

    #[test]
    fn deactivation_is_visible_to_captured_clones() {
        let scope = DynamicScope::new(0, None, ScopeRole::Method);
        let captured = scope.clone();
        scope.deactivate();
        assert!(!captured.is_active());
    }
}
