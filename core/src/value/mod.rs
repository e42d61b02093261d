//! Runtime values manipulated by the interpreter.

use std::{
    fmt,
    sync::{Arc, RwLock},
};

use rustc_hash::FxHashMap;

use crate::{interp::Unwind, ir::Label, runtime::RModule};

mod block;

pub use block::{Block, BlockKind};

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Frozen string, shared between all users of the literal
    Str(Arc<str>),
    Symbol(Arc<str>),
    /// Arrays are immutable snapshots; "mutating" builtins return new arrays
    Array(Arc<[Value]>),
    /// Insertion-ordered pairs
    Hash(Arc<[(Value, Value)]>),
    Object(Arc<Object>),
    Module(Arc<RModule>),
    Proc(Arc<Block>),
    Exception(Arc<Exception>),
    /// Internal: ensure-block return address read by `jump_indirect`.
    Label(Label),
    /// Internal: a non-language signal (break/return jump) held by a rescue
    /// handler so that `throw` can resume propagating it.
    Signal(Arc<Unwind>),
    /// Internal: "no value supplied", e.g. an unfilled optional parameter.
    Undefined,
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::Str(Arc::from(s))
    }

    pub fn sym(s: &str) -> Value {
        Value::Symbol(Arc::from(s))
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Arc::from(items))
    }

    pub fn empty_array() -> Value {
        Value::Array(Arc::from(Vec::new()))
    }

    pub fn hash(pairs: Vec<(Value, Value)>) -> Value {
        Value::Hash(Arc::from(pairs))
    }

    #[inline]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Method name carried by a symbol or string, as accepted by `send`.
    pub fn as_name(&self) -> Option<&Arc<str>> {
        match self {
            Value::Symbol(s) | Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_module(&self) -> Option<&Arc<RModule>> {
        match self {
            Value::Module(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_proc(&self) -> Option<&Arc<Block>> {
        match self {
            Value::Proc(b) => Some(b),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Equality used by the generic `beq`/`bne` branches.
    ///
    /// The relation is keyed on the second operand: comparing against a
    /// boolean compares truthiness, comparing against nil or undefined is an
    /// identity test and numbers compare numerically. Every construction-time
    /// branch specialisation is defined in terms of this relation.
    pub fn branch_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (v, Value::Bool(b)) => v.is_truthy() == *b,
            (v, Value::Nil) => v.is_nil(),
            (v, Value::Undefined) => v.is_undefined(),
            (Value::Int(a), Value::Int(b)) => a == b,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => a == b,
            },
        }
    }

    /// `inspect`-style rendering.
    pub fn inspect(&self) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Str(s) => format!("{:?}", s.as_ref()),
            Value::Symbol(s) => format!(":{}", s),
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().map(Value::inspect).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Hash(pairs) => {
                let parts: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| match k {
                        Value::Symbol(s) => format!("{}: {}", s, v.inspect()),
                        _ => format!("{} => {}", k.inspect(), v.inspect()),
                    })
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Exception(e) => format!("#<{}: {}>", e.class.name(), e.message),
            other => other.to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) | (Value::Undefined, Value::Undefined) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Hash(a), Value::Hash(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => a.id() == b.id(),
            (Value::Proc(a), Value::Proc(b)) => Arc::ptr_eq(a, b),
            (Value::Exception(a), Value::Exception(b)) => Arc::ptr_eq(a, b),
            (Value::Label(a), Value::Label(b)) => a == b,
            (Value::Signal(a), Value::Signal(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// `to_s`-style rendering.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => {
                if x.is_finite() && x.fract() == 0.0 {
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{}", x)
                }
            }
            Value::Str(s) | Value::Symbol(s) => f.write_str(s),
            Value::Array(_) | Value::Hash(_) => f.write_str(&self.inspect()),
            Value::Object(o) => write!(f, "#<{}>", o.class.name()),
            Value::Module(m) => f.write_str(m.name()),
            Value::Proc(b) => write!(f, "#<Proc:{}{}>", b.body().name(), if b.is_lambda() { " (lambda)" } else { "" }),
            Value::Exception(e) => f.write_str(&e.message),
            Value::Label(l) => write!(f, "{}", l),
            Value::Signal(s) => write!(f, "#<signal {}>", s),
            Value::Undefined => f.write_str("undefined"),
        }
    }
}

/// Plain object with instance variables.
#[derive(Debug)]
pub struct Object {
    pub class: Arc<RModule>,
    ivars: RwLock<FxHashMap<Arc<str>, Value>>,
}

impl Object {
    pub fn new(class: Arc<RModule>) -> Self {
        Self {
            class,
            ivars: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn ivar(&self, name: &str) -> Option<Value> {
        let ivars = self.ivars.read().unwrap_or_else(|e| e.into_inner());
        ivars.get(name).cloned()
    }

    pub fn set_ivar(&self, name: Arc<str>, value: Value) {
        let mut ivars = self.ivars.write().unwrap_or_else(|e| e.into_inner());
        ivars.insert(name, value);
    }

    pub fn ivar_names(&self) -> Vec<Arc<str>> {
        let ivars = self.ivars.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<Arc<str>> = ivars.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Language-level exception object.
#[derive(Debug)]
pub struct Exception {
    pub class: Arc<RModule>,
    pub message: Arc<str>,
}

impl Exception {
    pub fn new(class: Arc<RModule>, message: impl Into<Arc<str>>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_only_rejects_nil_and_false() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Int(0).is_truthy());
        assert!(Value::str("").is_truthy());
        assert!(Value::Undefined.is_truthy());
    }

    #[test]
    fn branch_eq_compares_booleans_by_truthiness() {
        assert!(Value::Int(3).branch_eq(&Value::Bool(true)));
        assert!(Value::Nil.branch_eq(&Value::Bool(false)));
        assert!(!Value::Nil.branch_eq(&Value::Bool(true)));
        assert!(!Value::Bool(false).branch_eq(&Value::Nil));
    }

    #[test]
    fn branch_eq_is_numeric_across_int_and_float() {
        assert!(Value::Int(2).branch_eq(&Value::Float(2.0)));
        assert!(!Value::Int(2).branch_eq(&Value::Float(2.5)));
        assert!(!Value::Int(2).branch_eq(&Value::str("2")));
    }

    #[test]
    fn inspect_renders_nested_collections() {
        let v = Value::array(vec![Value::Int(1), Value::str("a"), Value::sym("b"), Value::Nil]);
        assert_eq!(v.inspect(), "[1, \"a\", :b, nil]");
        let h = Value::hash(vec![(Value::sym("k"), Value::Int(1))]);
        assert_eq!(h.inspect(), "{k: 1}");
    }
}
