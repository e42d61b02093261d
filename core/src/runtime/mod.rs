//! The small object runtime the interpreter runs against: class table,
//! globals, generation counters, exception construction and the captured
//! output buffer.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

use dashmap::DashMap;
use tracing::trace;

use crate::{
    interp::Unwind,
    ir::Scope,
    value::{Block, Exception, Object, Value},
};

mod kernel;
mod module;

pub(crate) use kernel::compare;
pub use module::{Method, MethodBody, NativeFn, RModule, Visibility};

/// Builtin classes, created once per runtime.
#[derive(Debug)]
pub struct CoreClasses {
    pub object: Arc<RModule>,
    pub module: Arc<RModule>,
    pub class: Arc<RModule>,
    pub integer: Arc<RModule>,
    pub float: Arc<RModule>,
    pub string: Arc<RModule>,
    pub symbol: Arc<RModule>,
    pub array: Arc<RModule>,
    pub hash: Arc<RModule>,
    pub nil: Arc<RModule>,
    pub true_class: Arc<RModule>,
    pub false_class: Arc<RModule>,
    pub proc_class: Arc<RModule>,
    pub exception: Arc<RModule>,
    pub standard_error: Arc<RModule>,
    pub runtime_error: Arc<RModule>,
    pub argument_error: Arc<RModule>,
    pub type_error: Arc<RModule>,
    pub name_error: Arc<RModule>,
    pub no_method_error: Arc<RModule>,
    pub local_jump_error: Arc<RModule>,
    pub not_implemented_error: Arc<RModule>,
    pub zero_division_error: Arc<RModule>,
    pub range_error: Arc<RModule>,
    pub system_stack_error: Arc<RModule>,
}

impl CoreClasses {
    fn new() -> Self {
        let object = RModule::new_class("Object", None);
        let module = RModule::new_class("Module", Some(object.clone()));
        let class = RModule::new_class("Class", Some(module.clone()));
        let sub = |name: &str, parent: &Arc<RModule>| RModule::new_class(name, Some(parent.clone()));

        let exception = sub("Exception", &object);
        let standard_error = sub("StandardError", &exception);
        let name_error = sub("NameError", &standard_error);
        Self {
            integer: sub("Integer", &object),
            float: sub("Float", &object),
            string: sub("String", &object),
            symbol: sub("Symbol", &object),
            array: sub("Array", &object),
            hash: sub("Hash", &object),
            nil: sub("NilClass", &object),
            true_class: sub("TrueClass", &object),
            false_class: sub("FalseClass", &object),
            proc_class: sub("Proc", &object),
            runtime_error: sub("RuntimeError", &standard_error),
            argument_error: sub("ArgumentError", &standard_error),
            type_error: sub("TypeError", &standard_error),
            no_method_error: sub("NoMethodError", &name_error),
            local_jump_error: sub("LocalJumpError", &standard_error),
            not_implemented_error: sub("NotImplementedError", &standard_error),
            zero_division_error: sub("ZeroDivisionError", &standard_error),
            range_error: sub("RangeError", &standard_error),
            system_stack_error: sub("SystemStackError", &exception),
            name_error,
            standard_error,
            exception,
            object,
            module,
            class,
        }
    }

    fn all(&self) -> Vec<&Arc<RModule>> {
        vec![
            &self.object,
            &self.module,
            &self.class,
            &self.integer,
            &self.float,
            &self.string,
            &self.symbol,
            &self.array,
            &self.hash,
            &self.nil,
            &self.true_class,
            &self.false_class,
            &self.proc_class,
            &self.exception,
            &self.standard_error,
            &self.runtime_error,
            &self.argument_error,
            &self.type_error,
            &self.name_error,
            &self.no_method_error,
            &self.local_jump_error,
            &self.not_implemented_error,
            &self.zero_division_error,
            &self.range_error,
            &self.system_stack_error,
        ]
    }
}

/// Exception classes the interpreter raises itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Standard,
    Runtime,
    Argument,
    Type,
    Name,
    NoMethod,
    LocalJump,
    NotImplemented,
    ZeroDivision,
    Range,
    SystemStack,
}

pub struct Runtime {
    classes: CoreClasses,
    main: Value,
    globals: DashMap<Arc<str>, Value>,
    method_generation: AtomicU64,
    constant_generation: AtomicU64,
    output: Mutex<String>,
}

impl Runtime {
    pub fn new() -> Arc<Runtime> {
        let classes = CoreClasses::new();
        for class in classes.all() {
            classes.object.put_const(Arc::from(class.name()), Value::Module(class.clone()));
        }
        let main = Value::Object(Arc::new(Object::new(classes.object.clone())));
        let runtime = Runtime {
            classes,
            main,
            globals: DashMap::new(),
            method_generation: AtomicU64::new(1),
            constant_generation: AtomicU64::new(1),
            output: Mutex::new(String::new()),
        };
        kernel::install(&runtime);
        Arc::new(runtime)
    }

    pub fn classes(&self) -> &CoreClasses {
        &self.classes
    }

    pub fn object_class(&self) -> &Arc<RModule> {
        &self.classes.object
    }

    /// Top-level `self`.
    pub fn main(&self) -> &Value {
        &self.main
    }

    pub fn class_of(&self, value: &Value) -> Arc<RModule> {
        let c = &self.classes;
        match value {
            Value::Nil | Value::Undefined => c.nil.clone(),
            Value::Bool(true) => c.true_class.clone(),
            Value::Bool(false) => c.false_class.clone(),
            Value::Int(_) => c.integer.clone(),
            Value::Float(_) => c.float.clone(),
            Value::Str(_) => c.string.clone(),
            Value::Symbol(_) => c.symbol.clone(),
            Value::Array(_) => c.array.clone(),
            Value::Hash(_) => c.hash.clone(),
            Value::Object(o) => o.class.clone(),
            Value::Module(m) if m.is_class() => c.class.clone(),
            Value::Module(_) => c.module.clone(),
            Value::Proc(_) => c.proc_class.clone(),
            Value::Exception(e) => e.class.clone(),
            Value::Label(_) | Value::Signal(_) => c.object.clone(),
        }
    }

    pub fn is_a(&self, value: &Value, module: &RModule) -> bool {
        self.class_of(value).inherits_from(module)
    }

    /// Identity used as the call-site cache key. Module receivers get their
    /// own key since their singleton methods shadow the class's.
    pub fn receiver_key(&self, value: &Value) -> u64 {
        match value {
            Value::Module(m) => m.id() | (1 << 63),
            other => self.class_of(other).id(),
        }
    }

    /// Method visible on `receiver`, with its owner.
    pub fn find_method(&self, receiver: &Value, name: &str) -> Option<(Arc<Method>, Arc<RModule>)> {
        if let Value::Module(m) = receiver
            && let Some(found) = m.find_singleton_method(name)
        {
            return Some(found);
        }
        self.class_of(receiver).find_method(name)
    }

    pub fn method_generation(&self) -> u64 {
        self.method_generation.load(Ordering::Acquire)
    }

    pub fn constant_generation(&self) -> u64 {
        self.constant_generation.load(Ordering::Acquire)
    }

    fn bump_methods(&self) {
        let generation = self.method_generation.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(target: "irx::runtime", generation, "method generation bumped");
    }

    pub fn define_method(&self, module: &RModule, name: &str, body: MethodBody, visibility: Visibility) {
        module.put_method(Arc::new(Method {
            name: Arc::from(name),
            body,
            visibility,
        }));
        self.bump_methods();
    }

    pub fn define_singleton_method(&self, module: &RModule, name: &str, body: MethodBody) {
        module.put_singleton_method(Arc::new(Method {
            name: Arc::from(name),
            body,
            visibility: Visibility::Public,
        }));
        self.bump_methods();
    }

    pub fn define_ir_method(&self, module: &RModule, body: &Arc<Scope>, visibility: Visibility) {
        self.define_method(module, body.name(), MethodBody::Ir(body.clone()), visibility);
    }

    pub fn define_block_method(&self, module: &Arc<RModule>, name: &str, block: &Block) {
        let body = block.as_method_body(Arc::from(name), module.clone());
        self.define_method(module, name, MethodBody::Block(Arc::new(body)), Visibility::Public);
    }

    /// Lexical then inherited lookup starting at `module`, falling back to
    /// `Object`.
    pub fn search_const(&self, module: &RModule, name: &str) -> Option<Value> {
        module
            .inherited_const(name)
            .or_else(|| self.classes.object.own_const(name))
    }

    pub fn set_const(&self, module: &RModule, name: &str, value: Value) {
        module.put_const(Arc::from(name), value);
        self.constant_generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn global(&self, name: &str) -> Value {
        self.globals.get(name).map(|v| v.value().clone()).unwrap_or(Value::Nil)
    }

    pub fn set_global(&self, name: &str, value: Value) {
        self.globals.insert(Arc::from(name), value);
    }

    pub fn error_class(&self, class: ErrorClass) -> &Arc<RModule> {
        let c = &self.classes;
        match class {
            ErrorClass::Standard => &c.standard_error,
            ErrorClass::Runtime => &c.runtime_error,
            ErrorClass::Argument => &c.argument_error,
            ErrorClass::Type => &c.type_error,
            ErrorClass::Name => &c.name_error,
            ErrorClass::NoMethod => &c.no_method_error,
            ErrorClass::LocalJump => &c.local_jump_error,
            ErrorClass::NotImplemented => &c.not_implemented_error,
            ErrorClass::ZeroDivision => &c.zero_division_error,
            ErrorClass::Range => &c.range_error,
            ErrorClass::SystemStack => &c.system_stack_error,
        }
    }

    pub fn exception(&self, class: ErrorClass, message: impl Into<Arc<str>>) -> Arc<Exception> {
        Arc::new(Exception::new(self.error_class(class).clone(), message))
    }

    /// Language-level error signal.
    pub fn error(&self, class: ErrorClass, message: impl Into<Arc<str>>) -> Unwind {
        Unwind::Raise(self.exception(class, message))
    }

    pub fn no_method_error(&self, receiver: &Value, name: &str) -> Unwind {
        self.error(
            ErrorClass::NoMethod,
            format!("undefined method '{}' for {}", name, self.describe(receiver)),
        )
    }

    /// `an instance of Foo`, or the module itself.
    pub fn describe(&self, value: &Value) -> String {
        match value {
            Value::Nil => "nil".to_string(),
            Value::Module(m) => m.name().to_string(),
            other => format!("an instance of {}", self.class_of(other).name()),
        }
    }

    /// `==` as the builtins see it: numeric across Integer and Float,
    /// structural for collections, identity for objects.
    pub fn values_equal(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => (*x as f64) == *y,
            _ => a == b,
        }
    }

    /// `target === value` as used by `when` and `rescue`.
    pub fn case_eq(&self, target: &Value, value: &Value) -> bool {
        match target {
            Value::Module(m) => self.is_a(value, m),
            _ => self.values_equal(target, value),
        }
    }

    pub fn write_output(&self, text: &str) {
        let mut out = self.output.lock().unwrap_or_else(|e| e.into_inner());
        out.push_str(text);
    }

    pub fn output(&self) -> String {
        self.output.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn take_output(&self) -> String {
        std::mem::take(&mut *self.output.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_classes_are_constants_of_object() {
        let rt = Runtime::new();
        let Some(Value::Module(m)) = rt.search_const(rt.object_class(), "ArgumentError") else {
            panic!("ArgumentError missing");
        };
        assert!(m.inherits_from(&rt.classes().standard_error));
    }

    #[test]
    fn method_definition_bumps_the_generation() {
        let rt = Runtime::new();
        let before = rt.method_generation();
        rt.define_method(
            rt.object_class(),
            "noop",
            MethodBody::Native(|_, _, _, _| Ok(Value::Nil)),
            Visibility::Public,
        );
        assert!(rt.method_generation() > before);
    }

    #[test]
    fn class_of_literals() {
        let rt = Runtime::new();
        assert_eq!(rt.class_of(&Value::Int(1)).name(), "Integer");
        assert_eq!(rt.class_of(&Value::Nil).name(), "NilClass");
        assert_eq!(rt.class_of(&Value::Module(rt.classes().string.clone())).name(), "Class");
        assert!(rt.case_eq(&Value::Module(rt.classes().integer.clone()), &Value::Int(3)));
        assert!(rt.values_equal(&Value::Int(2), &Value::Float(2.0)));
    }

    #[test]
    fn output_is_captured() {
        let rt = Runtime::new();
        rt.write_output("hi\n");
        assert_eq!(rt.take_output(), "hi\n");
        assert_eq!(rt.output(), "");
    }
}
