use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use dashmap::DashMap;

use crate::{
    interp::{ExecutionContext, Unwind},
    ir::Scope,
    value::{Block, Value},
};

static NEXT_MODULE_ID: AtomicU64 = AtomicU64::new(1);

/// Builtin method implementation: `(ctx, self, args, block)`.
pub type NativeFn = fn(&mut ExecutionContext, &Value, Vec<Value>, Option<Arc<Block>>) -> Result<Value, Unwind>;

#[derive(Clone)]
pub enum MethodBody {
    Ir(Arc<Scope>),
    /// Installed with `define_method`
    Block(Arc<Block>),
    Native(NativeFn),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Clone)]
pub struct Method {
    pub name: Arc<str>,
    pub body: MethodBody,
    pub visibility: Visibility,
}

impl Method {
    pub fn native(name: &str, f: NativeFn) -> Arc<Method> {
        Arc::new(Method {
            name: Arc::from(name),
            body: MethodBody::Native(f),
            visibility: Visibility::Public,
        })
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = match &self.body {
            MethodBody::Ir(scope) => format!("ir:{}", scope.name()),
            MethodBody::Block(block) => format!("block:{}", block.body().name()),
            MethodBody::Native(_) => "native".to_string(),
        };
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("body", &body)
            .field("visibility", &self.visibility)
            .finish()
    }
}

/// A class or module: method, singleton-method, constant and class-variable
/// tables plus the superclass link.
pub struct RModule {
    id: u64,
    name: Arc<str>,
    is_class: bool,
    superclass: Option<Arc<RModule>>,
    methods: DashMap<Arc<str>, Arc<Method>>,
    singleton_methods: DashMap<Arc<str>, Arc<Method>>,
    constants: DashMap<Arc<str>, Value>,
    class_vars: DashMap<Arc<str>, Value>,
}

impl RModule {
    fn build(name: &str, is_class: bool, superclass: Option<Arc<RModule>>) -> Arc<RModule> {
        Arc::new(RModule {
            id: NEXT_MODULE_ID.fetch_add(1, Ordering::Relaxed),
            name: Arc::from(name),
            is_class,
            superclass,
            methods: DashMap::new(),
            singleton_methods: DashMap::new(),
            constants: DashMap::new(),
            class_vars: DashMap::new(),
        })
    }

    pub fn new_class(name: &str, superclass: Option<Arc<RModule>>) -> Arc<RModule> {
        Self::build(name, true, superclass)
    }

    pub fn new_module(name: &str) -> Arc<RModule> {
        Self::build(name, false, None)
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_class(&self) -> bool {
        self.is_class
    }

    pub fn superclass(&self) -> Option<&Arc<RModule>> {
        self.superclass.as_ref()
    }

    /// `self` and every superclass, nearest first.
    pub fn ancestors(self: &Arc<Self>) -> Vec<Arc<RModule>> {
        let mut out = vec![self.clone()];
        let mut cur = self.superclass.clone();
        while let Some(m) = cur {
            cur = m.superclass.clone();
            out.push(m);
        }
        out
    }

    pub fn inherits_from(&self, other: &RModule) -> bool {
        if self.id == other.id {
            return true;
        }
        let mut cur = self.superclass.as_ref();
        while let Some(m) = cur {
            if m.id == other.id {
                return true;
            }
            cur = m.superclass.as_ref();
        }
        false
    }

    pub fn own_method(&self, name: &str) -> Option<Arc<Method>> {
        self.methods.get(name).map(|m| m.value().clone())
    }

    /// Instance method lookup along the superclass chain, with the module
    /// that defines it.
    pub fn find_method(self: &Arc<Self>, name: &str) -> Option<(Arc<Method>, Arc<RModule>)> {
        let mut cur = Some(self.clone());
        while let Some(m) = cur {
            if let Some(found) = m.methods.get(name) {
                return Some((found.value().clone(), m.clone()));
            }
            cur = m.superclass.clone();
        }
        None
    }

    /// Singleton (class-level) method lookup; class methods are inherited.
    pub fn find_singleton_method(self: &Arc<Self>, name: &str) -> Option<(Arc<Method>, Arc<RModule>)> {
        let mut cur = Some(self.clone());
        while let Some(m) = cur {
            if let Some(found) = m.singleton_methods.get(name) {
                return Some((found.value().clone(), m.clone()));
            }
            cur = m.superclass.clone();
        }
        None
    }

    pub(crate) fn put_method(&self, method: Arc<Method>) {
        self.methods.insert(method.name.clone(), method);
    }

    pub(crate) fn put_singleton_method(&self, method: Arc<Method>) {
        self.singleton_methods.insert(method.name.clone(), method);
    }

    pub fn method_names(&self) -> Vec<Arc<str>> {
        let mut names: Vec<Arc<str>> = self.methods.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn own_const(&self, name: &str) -> Option<Value> {
        self.constants.get(name).map(|v| v.value().clone())
    }

    /// Constant in `self` or a superclass.
    pub fn inherited_const(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.own_const(name) {
            return Some(v);
        }
        let mut cur = self.superclass.as_ref();
        while let Some(m) = cur {
            if let Some(v) = m.own_const(name) {
                return Some(v);
            }
            cur = m.superclass.as_ref();
        }
        None
    }

    pub(crate) fn put_const(&self, name: Arc<str>, value: Value) {
        self.constants.insert(name, value);
    }

    pub fn class_var(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.class_vars.get(name) {
            return Some(v.value().clone());
        }
        self.superclass.as_ref().and_then(|s| s.class_var(name))
    }

    /// Assigns where the variable is already defined, else on `self`.
    pub fn set_class_var(&self, name: Arc<str>, value: Value) {
        let mut cur = Some(self);
        while let Some(m) = cur {
            if let Some(mut slot) = m.class_vars.get_mut(name.as_ref()) {
                *slot = value;
                return;
            }
            cur = m.superclass.as_deref();
        }
        self.class_vars.insert(name, value);
    }
}

impl fmt::Debug for RModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RModule")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("is_class", &self.is_class)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nop(_: &mut ExecutionContext, _: &Value, _: Vec<Value>, _: Option<Arc<Block>>) -> Result<Value, Unwind> {
        Ok(Value::Nil)
    }

    #[test]
    fn lookup_walks_superclasses() {
        let base = RModule::new_class("Base", None);
        let derived = RModule::new_class("Derived", Some(base.clone()));
        base.put_method(Method::native("greet", nop));
        let (_, owner) = derived.find_method("greet").unwrap();
        assert_eq!(owner.id(), base.id());
        assert!(derived.inherits_from(&base));
        assert!(!base.inherits_from(&derived));
        assert_eq!(derived.ancestors().len(), 2);
    }

    #[test]
    fn class_vars_assign_where_defined() {
        let base = RModule::new_class("Base", None);
        let derived = RModule::new_class("Derived", Some(base.clone()));
        base.set_class_var("@@count".into(), Value::Int(1));
        derived.set_class_var("@@count".into(), Value::Int(2));
        assert_eq!(base.class_var("@@count"), Some(Value::Int(2)));
        assert_eq!(derived.class_var("@@missing"), None);
    }
}
