//! Builtin methods installed on the core classes.

use std::sync::Arc;

use crate::{
    interp::{ExecutionContext, Unwind},
    ir::instr::{expected_arity, CallType, IntCmp},
    value::{Block, BlockKind, Exception, Object, Value},
};

use super::{ErrorClass, Method, NativeFn, RModule, Runtime};

type Args = Vec<Value>;
type Blk = Option<Arc<Block>>;

fn def(module: &RModule, name: &str, f: NativeFn) {
    module.put_method(Method::native(name, f));
}

fn def_all(module: &RModule, names: &[&str], f: NativeFn) {
    for name in names {
        def(module, name, f);
    }
}

pub(super) fn install(rt: &Runtime) {
    let c = rt.classes();

    // Object / Kernel
    def(&c.object, "puts", puts);
    def(&c.object, "print", print);
    def(&c.object, "p", p);
    def(&c.object, "raise", raise);
    def(&c.object, "block_given?", block_given);
    def_all(&c.object, &["send", "__send__"], send);
    def(&c.object, "public_send", public_send);
    def(&c.object, "eval", eval);
    def(&c.object, "lambda", lambda);
    def(&c.object, "proc", proc_new);
    def(&c.object, "class", class);
    def_all(&c.object, &["==", "equal?"], identical);
    def(&c.object, "!=", not_equal);
    def(&c.object, "!", not);
    def(&c.object, "nil?", is_nil);
    def(&c.object, "inspect", inspect);
    def(&c.object, "to_s", to_s);
    def_all(&c.object, &["is_a?", "kind_of?"], is_a);
    def(&c.object, "respond_to?", respond_to);
    def(&c.object, "instance_variable_get", ivar_get);
    def(&c.object, "instance_variable_set", ivar_set);

    // Module / Class
    def(&c.module, "name", module_name);
    def(&c.module, "to_s", module_name);
    def(&c.module, "===", module_eqq);
    def(&c.module, "define_method", define_method);
    def(&c.module, "ancestors", ancestors);
    def(&c.module, "const_get", const_get);
    def(&c.module, "private", private);
    def(&c.class, "new", class_new);
    def(&c.class, "superclass", superclass);

    // numbers
    for num in [&c.integer, &c.float] {
        def(num, "+", add);
        def(num, "-", sub);
        def(num, "*", mul);
        def(num, "/", div);
        def(num, "%", rem);
        def(num, "<", lt);
        def(num, ">", gt);
        def(num, "<=", le);
        def(num, ">=", ge);
        def(num, "==", num_eq);
        def(num, "<=>", spaceship);
        def(num, "-@", negate);
    }
    def(&c.integer, "succ", succ);
    def(&c.integer, "times", times);
    def(&c.integer, "to_f", to_f);
    def(&c.float, "to_i", to_i);

    // strings and symbols
    def(&c.string, "+", str_concat);
    def(&c.string, "*", str_repeat);
    def_all(&c.string, &["length", "size"], str_length);
    def(&c.string, "upcase", str_upcase);
    def(&c.string, "to_sym", to_sym);
    def(&c.string, "==", value_eq);
    def(&c.symbol, "to_sym", to_sym);
    def(&c.symbol, "==", value_eq);

    // arrays and hashes
    def(&c.array, "[]", array_at);
    def_all(&c.array, &["length", "size"], collection_size);
    def(&c.array, "first", array_first);
    def(&c.array, "last", array_last);
    def(&c.array, "each", array_each);
    def(&c.array, "map", array_map);
    def_all(&c.array, &["push", "<<"], array_push);
    def(&c.array, "+", array_concat);
    def(&c.array, "include?", array_include);
    def(&c.array, "join", array_join);
    def(&c.array, "==", value_eq);
    def(&c.array, "to_a", itself);
    def(&c.hash, "[]", hash_at);
    def_all(&c.hash, &["length", "size"], collection_size);
    def(&c.hash, "keys", hash_keys);
    def(&c.hash, "values", hash_values);
    def_all(&c.hash, &["key?", "has_key?"], hash_has_key);
    def(&c.hash, "each", hash_each);
    def(&c.hash, "==", value_eq);

    // nil and booleans
    def(&c.nil, "to_a", nil_to_a);
    def(&c.nil, "nil?", always_true);
    def(&c.true_class, "&", bool_and);
    def(&c.false_class, "&", bool_and);
    def(&c.true_class, "|", bool_or);
    def(&c.false_class, "|", bool_or);

    // procs
    def_all(&c.proc_class, &["call", "()", "yield", "[]"], proc_call);
    def(&c.proc_class, "lambda?", proc_is_lambda);
    def(&c.proc_class, "arity", proc_arity);
    def(&c.proc_class, "to_proc", itself);

    // exceptions
    def_all(&c.exception, &["message", "to_s"], exc_message);
}

fn arity(rt: &Runtime, args: &[Value], min: usize, max: usize) -> Result<(), Unwind> {
    if args.len() < min || args.len() > max {
        let expected = expected_arity(min as u32, (max - min) as u32, false);
        return Err(rt.error(
            ErrorClass::Argument,
            format!("wrong number of arguments (given {}, expected {})", args.len(), expected),
        ));
    }
    Ok(())
}

fn one(rt: &Runtime, args: &[Value]) -> Result<Value, Unwind> {
    arity(rt, args, 1, 1)?;
    Ok(args[0].clone())
}

fn need_block(rt: &Runtime, block: Blk) -> Result<Arc<Block>, Unwind> {
    block.ok_or_else(|| rt.error(ErrorClass::LocalJump, "no block given (yield)"))
}

fn name_arg(rt: &Runtime, value: &Value) -> Result<Arc<str>, Unwind> {
    value
        .as_name()
        .cloned()
        .ok_or_else(|| rt.error(ErrorClass::Type, format!("{} is not a symbol nor a string", value.inspect())))
}

// -- Object --------------------------------------------------------------

fn puts(ctx: &mut ExecutionContext, _: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    fn line(out: &mut String, value: &Value) {
        match value {
            Value::Array(items) => items.iter().for_each(|v| line(out, v)),
            other => {
                out.push_str(&other.to_string());
                out.push('\n');
            }
        }
    }
    let mut out = String::new();
    if args.is_empty() {
        out.push('\n');
    }
    for arg in &args {
        line(&mut out, arg);
    }
    ctx.runtime().write_output(&out);
    Ok(Value::Nil)
}

fn print(ctx: &mut ExecutionContext, _: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    let out: String = args.iter().map(Value::to_string).collect();
    ctx.runtime().write_output(&out);
    Ok(Value::Nil)
}

fn p(ctx: &mut ExecutionContext, _: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    for arg in &args {
        ctx.runtime().write_output(&format!("{}\n", arg.inspect()));
    }
    Ok(match args.len() {
        0 => Value::Nil,
        1 => args[0].clone(),
        _ => Value::array(args),
    })
}

/// `raise "msg"`, `raise Class`, `raise Class, "msg"` or `raise exc`.
fn raise(ctx: &mut ExecutionContext, _: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    let rt = ctx.runtime().clone();
    arity(&rt, &args, 0, 2)?;
    let exc = match (args.first(), args.get(1)) {
        (None, _) => rt.exception(ErrorClass::Runtime, "unhandled exception"),
        (Some(Value::Str(msg)), None) => rt.exception(ErrorClass::Runtime, msg.clone()),
        (Some(Value::Exception(e)), None) => e.clone(),
        (Some(Value::Module(m)), msg) if m.inherits_from(&rt.classes().exception) => {
            let message: Arc<str> = match msg {
                Some(v) => Arc::from(v.to_string()),
                None => Arc::from(m.name()),
            };
            Arc::new(Exception::new(m.clone(), message))
        }
        _ => return Err(rt.error(ErrorClass::Type, "exception class/object expected")),
    };
    Err(Unwind::Raise(exc))
}

fn block_given(ctx: &mut ExecutionContext, _: &Value, _: Args, _: Blk) -> Result<Value, Unwind> {
    let given = ctx.current_frame().is_some_and(|f| f.block.is_some());
    Ok(Value::Bool(given))
}

fn dispatch_send(ctx: &mut ExecutionContext, this: &Value, mut args: Args, block: Blk, call_type: CallType) -> Result<Value, Unwind> {
    let rt = ctx.runtime().clone();
    if args.is_empty() {
        return Err(rt.error(ErrorClass::Argument, "no method name given"));
    }
    let name = name_arg(&rt, &args.remove(0))?;
    ctx.call_method(this, &name, args, block, call_type)
}

fn send(ctx: &mut ExecutionContext, this: &Value, args: Args, block: Blk) -> Result<Value, Unwind> {
    dispatch_send(ctx, this, args, block, CallType::Functional)
}

fn public_send(ctx: &mut ExecutionContext, this: &Value, args: Args, block: Blk) -> Result<Value, Unwind> {
    dispatch_send(ctx, this, args, block, CallType::Normal)
}

fn eval(ctx: &mut ExecutionContext, _: &Value, _: Args, _: Blk) -> Result<Value, Unwind> {
    Err(ctx.runtime().error(ErrorClass::NotImplemented, "eval is not supported without a parser"))
}

fn lambda(ctx: &mut ExecutionContext, _: &Value, _: Args, block: Blk) -> Result<Value, Unwind> {
    let block = need_block(ctx.runtime(), block)?;
    Ok(Value::Proc(Arc::new(block.with_kind(BlockKind::Lambda))))
}

fn proc_new(ctx: &mut ExecutionContext, _: &Value, _: Args, block: Blk) -> Result<Value, Unwind> {
    let block = need_block(ctx.runtime(), block)?;
    if block.is_lambda() {
        return Ok(Value::Proc(block));
    }
    Ok(Value::Proc(Arc::new(block.with_kind(BlockKind::Proc))))
}

fn class(ctx: &mut ExecutionContext, this: &Value, _: Args, _: Blk) -> Result<Value, Unwind> {
    Ok(Value::Module(ctx.runtime().class_of(this)))
}

fn identical(ctx: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    let other = one(ctx.runtime(), &args)?;
    Ok(Value::Bool(*this == other))
}

fn value_eq(ctx: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    let rt = ctx.runtime().clone();
    let other = one(&rt, &args)?;
    Ok(Value::Bool(rt.values_equal(this, &other)))
}

fn not_equal(ctx: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    let eq = ctx.call_method(this, "==", args, None, CallType::Functional)?;
    Ok(Value::Bool(!eq.is_truthy()))
}

fn not(_: &mut ExecutionContext, this: &Value, _: Args, _: Blk) -> Result<Value, Unwind> {
    Ok(Value::Bool(!this.is_truthy()))
}

fn is_nil(_: &mut ExecutionContext, this: &Value, _: Args, _: Blk) -> Result<Value, Unwind> {
    Ok(Value::Bool(this.is_nil()))
}

fn always_true(_: &mut ExecutionContext, _: &Value, _: Args, _: Blk) -> Result<Value, Unwind> {
    Ok(Value::Bool(true))
}

fn inspect(_: &mut ExecutionContext, this: &Value, _: Args, _: Blk) -> Result<Value, Unwind> {
    Ok(Value::str(&this.inspect()))
}

fn to_s(_: &mut ExecutionContext, this: &Value, _: Args, _: Blk) -> Result<Value, Unwind> {
    Ok(Value::str(&this.to_string()))
}

fn itself(_: &mut ExecutionContext, this: &Value, _: Args, _: Blk) -> Result<Value, Unwind> {
    Ok(this.clone())
}

fn is_a(ctx: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    let rt = ctx.runtime().clone();
    match one(&rt, &args)? {
        Value::Module(m) => Ok(Value::Bool(rt.is_a(this, &m))),
        _ => Err(rt.error(ErrorClass::Type, "class or module required")),
    }
}

fn respond_to(ctx: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    let rt = ctx.runtime().clone();
    let name = name_arg(&rt, &one(&rt, &args)?)?;
    Ok(Value::Bool(rt.find_method(this, &name).is_some()))
}

fn ivar_get(ctx: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    let rt = ctx.runtime().clone();
    let name = name_arg(&rt, &one(&rt, &args)?)?;
    Ok(match this {
        Value::Object(o) => o.ivar(&name).unwrap_or(Value::Nil),
        _ => Value::Nil,
    })
}

fn ivar_set(ctx: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    let rt = ctx.runtime().clone();
    arity(&rt, &args, 2, 2)?;
    let name = name_arg(&rt, &args[0])?;
    let Value::Object(o) = this else {
        return Err(rt.error(ErrorClass::Runtime, format!("can't modify frozen {}", rt.class_of(this).name())));
    };
    o.set_ivar(name, args[1].clone());
    Ok(args[1].clone())
}

// -- Module / Class ------------------------------------------------------

fn this_module<'a>(rt: &Runtime, this: &'a Value) -> Result<&'a Arc<RModule>, Unwind> {
    this.as_module()
        .ok_or_else(|| rt.error(ErrorClass::Type, format!("{} is not a class/module", this.inspect())))
}

fn module_name(ctx: &mut ExecutionContext, this: &Value, _: Args, _: Blk) -> Result<Value, Unwind> {
    let m = this_module(ctx.runtime(), this)?;
    Ok(Value::str(m.name()))
}

fn module_eqq(ctx: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    let rt = ctx.runtime().clone();
    let value = one(&rt, &args)?;
    Ok(Value::Bool(rt.case_eq(this, &value)))
}

fn define_method(ctx: &mut ExecutionContext, this: &Value, args: Args, block: Blk) -> Result<Value, Unwind> {
    let rt = ctx.runtime().clone();
    let module = this_module(&rt, this)?;
    let name = name_arg(&rt, &one(&rt, &args)?)?;
    let block = block.ok_or_else(|| rt.error(ErrorClass::Argument, "tried to create Proc object without a block"))?;
    rt.define_block_method(module, &name, &block);
    Ok(Value::Symbol(name))
}

fn ancestors(ctx: &mut ExecutionContext, this: &Value, _: Args, _: Blk) -> Result<Value, Unwind> {
    let m = this_module(ctx.runtime(), this)?;
    Ok(Value::array(m.ancestors().into_iter().map(Value::Module).collect()))
}

fn const_get(ctx: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    let rt = ctx.runtime().clone();
    let m = this_module(&rt, this)?;
    let name = name_arg(&rt, &one(&rt, &args)?)?;
    rt.search_const(m, &name)
        .ok_or_else(|| rt.error(ErrorClass::Name, format!("uninitialized constant {}", name)))
}

fn private(_: &mut ExecutionContext, _: &Value, _: Args, _: Blk) -> Result<Value, Unwind> {
    Ok(Value::Nil)
}

fn class_new(ctx: &mut ExecutionContext, this: &Value, args: Args, block: Blk) -> Result<Value, Unwind> {
    let rt = ctx.runtime().clone();
    let class = this_module(&rt, this)?.clone();
    if class.inherits_from(&rt.classes().exception) {
        let message: Arc<str> = match args.first() {
            Some(v) => Arc::from(v.to_string()),
            None => Arc::from(class.name()),
        };
        return Ok(Value::Exception(Arc::new(Exception::new(class, message))));
    }
    let object = Value::Object(Arc::new(Object::new(class)));
    if rt.find_method(&object, "initialize").is_some() {
        ctx.call_method(&object, "initialize", args, block, CallType::Functional)?;
    }
    Ok(object)
}

fn superclass(ctx: &mut ExecutionContext, this: &Value, _: Args, _: Blk) -> Result<Value, Unwind> {
    let m = this_module(ctx.runtime(), this)?;
    Ok(m.superclass().cloned().map(Value::Module).unwrap_or(Value::Nil))
}

// -- numbers -------------------------------------------------------------

#[derive(Clone, Copy)]
enum Arith {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn int_arith(rt: &Runtime, a: i64, b: i64, op: Arith) -> Result<Value, Unwind> {
    let overflow = || rt.error(ErrorClass::Range, "integer overflow");
    if matches!(op, Arith::Div | Arith::Rem) && b == 0 {
        return Err(rt.error(ErrorClass::ZeroDivision, "divided by 0"));
    }
    let v = match op {
        Arith::Add => a.checked_add(b).ok_or_else(overflow)?,
        Arith::Sub => a.checked_sub(b).ok_or_else(overflow)?,
        Arith::Mul => a.checked_mul(b).ok_or_else(overflow)?,
        // floored, as the language rounds toward negative infinity
        Arith::Div => {
            let q = a.checked_div(b).ok_or_else(overflow)?;
            if a % b != 0 && ((a < 0) != (b < 0)) { q - 1 } else { q }
        }
        Arith::Rem => {
            let r = a.checked_rem(b).ok_or_else(overflow)?;
            if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r }
        }
    };
    Ok(Value::Int(v))
}

fn arith(ctx: &mut ExecutionContext, this: &Value, args: Args, op: Arith) -> Result<Value, Unwind> {
    let rt = ctx.runtime().clone();
    let rhs = one(&rt, &args)?;
    if let (Value::Int(a), Value::Int(b)) = (this, &rhs) {
        return int_arith(&rt, *a, *b, op);
    }
    match (as_f64(this), as_f64(&rhs)) {
        (Some(x), Some(y)) => Ok(Value::Float(match op {
            Arith::Add => x + y,
            Arith::Sub => x - y,
            Arith::Mul => x * y,
            Arith::Div => x / y,
            Arith::Rem => x - y * (x / y).floor(),
        })),
        _ => Err(rt.error(
            ErrorClass::Type,
            format!("{} can't be coerced into {}", rt.class_of(&rhs).name(), rt.class_of(this).name()),
        )),
    }
}

fn add(ctx: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    arith(ctx, this, args, Arith::Add)
}

fn sub(ctx: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    arith(ctx, this, args, Arith::Sub)
}

fn mul(ctx: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    arith(ctx, this, args, Arith::Mul)
}

fn div(ctx: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    arith(ctx, this, args, Arith::Div)
}

fn rem(ctx: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    arith(ctx, this, args, Arith::Rem)
}

/// Numeric comparison; non-numeric operands are an `ArgumentError`.
pub(crate) fn compare(rt: &Runtime, a: &Value, b: &Value, op: IntCmp) -> Result<bool, Unwind> {
    if let (Value::Int(x), Value::Int(y)) = (a, b) {
        return Ok(op.test(x, y));
    }
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => Ok(op.test(x, y)),
        _ => Err(rt.error(
            ErrorClass::Argument,
            format!("comparison of {} with {} failed", rt.class_of(a).name(), rt.class_of(b).name()),
        )),
    }
}

fn cmp(ctx: &mut ExecutionContext, this: &Value, args: Args, op: IntCmp) -> Result<Value, Unwind> {
    let rt = ctx.runtime().clone();
    let rhs = one(&rt, &args)?;
    compare(&rt, this, &rhs, op).map(Value::Bool)
}

fn lt(ctx: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    cmp(ctx, this, args, IntCmp::Lt)
}

fn gt(ctx: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    cmp(ctx, this, args, IntCmp::Gt)
}

fn le(ctx: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    cmp(ctx, this, args, IntCmp::Le)
}

fn ge(ctx: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    cmp(ctx, this, args, IntCmp::Ge)
}

fn num_eq(ctx: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    value_eq(ctx, this, args, None)
}

fn spaceship(ctx: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    let rt = ctx.runtime().clone();
    let rhs = one(&rt, &args)?;
    Ok(match (as_f64(this), as_f64(&rhs)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).map(|o| Value::Int(o as i64)).unwrap_or(Value::Nil),
        _ => Value::Nil,
    })
}

fn negate(ctx: &mut ExecutionContext, this: &Value, _: Args, _: Blk) -> Result<Value, Unwind> {
    match this {
        Value::Int(i) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| ctx.runtime().error(ErrorClass::Range, "integer overflow")),
        Value::Float(f) => Ok(Value::Float(-f)),
        _ => Ok(Value::Nil),
    }
}

fn succ(ctx: &mut ExecutionContext, this: &Value, _: Args, _: Blk) -> Result<Value, Unwind> {
    arith(ctx, this, vec![Value::Int(1)], Arith::Add)
}

fn times(ctx: &mut ExecutionContext, this: &Value, _: Args, block: Blk) -> Result<Value, Unwind> {
    let block = need_block(ctx.runtime(), block)?;
    let n = this.as_int().unwrap_or(0);
    for i in 0..n {
        ctx.call_block(&block, vec![Value::Int(i)], None)?;
    }
    Ok(this.clone())
}

fn to_f(_: &mut ExecutionContext, this: &Value, _: Args, _: Blk) -> Result<Value, Unwind> {
    Ok(as_f64(this).map(Value::Float).unwrap_or(Value::Nil))
}

fn to_i(_: &mut ExecutionContext, this: &Value, _: Args, _: Blk) -> Result<Value, Unwind> {
    Ok(match this {
        Value::Float(f) => Value::Int(f.trunc() as i64),
        other => other.clone(),
    })
}

// -- strings and symbols -------------------------------------------------

fn str_concat(ctx: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    let rt = ctx.runtime().clone();
    match (this, one(&rt, &args)?) {
        (Value::Str(a), Value::Str(b)) => Ok(Value::str(&format!("{}{}", a, b))),
        (_, other) => Err(rt.error(
            ErrorClass::Type,
            format!("no implicit conversion of {} into String", rt.class_of(&other).name()),
        )),
    }
}

fn str_repeat(ctx: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    let rt = ctx.runtime().clone();
    match (this, one(&rt, &args)?) {
        (Value::Str(s), Value::Int(n)) if n >= 0 => Ok(Value::str(&s.repeat(n as usize))),
        (_, Value::Int(_)) => Err(rt.error(ErrorClass::Argument, "negative argument")),
        (_, other) => Err(rt.error(
            ErrorClass::Type,
            format!("no implicit conversion of {} into Integer", rt.class_of(&other).name()),
        )),
    }
}

fn str_length(_: &mut ExecutionContext, this: &Value, _: Args, _: Blk) -> Result<Value, Unwind> {
    Ok(match this {
        Value::Str(s) => Value::Int(s.chars().count() as i64),
        _ => Value::Nil,
    })
}

fn str_upcase(_: &mut ExecutionContext, this: &Value, _: Args, _: Blk) -> Result<Value, Unwind> {
    Ok(Value::str(&this.to_string().to_uppercase()))
}

fn to_sym(_: &mut ExecutionContext, this: &Value, _: Args, _: Blk) -> Result<Value, Unwind> {
    Ok(match this {
        Value::Str(s) | Value::Symbol(s) => Value::Symbol(s.clone()),
        other => other.clone(),
    })
}

// -- arrays and hashes ---------------------------------------------------

fn items(this: &Value) -> &[Value] {
    match this {
        Value::Array(items) => items,
        _ => &[],
    }
}

fn pairs(this: &Value) -> &[(Value, Value)] {
    match this {
        Value::Hash(pairs) => pairs,
        _ => &[],
    }
}

fn array_at(ctx: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    let rt = ctx.runtime().clone();
    let items = items(this);
    let Value::Int(i) = one(&rt, &args)? else {
        return Err(rt.error(ErrorClass::Type, "no implicit conversion into Integer"));
    };
    let idx = if i < 0 { items.len() as i64 + i } else { i };
    Ok(usize::try_from(idx)
        .ok()
        .and_then(|i| items.get(i).cloned())
        .unwrap_or(Value::Nil))
}

fn collection_size(_: &mut ExecutionContext, this: &Value, _: Args, _: Blk) -> Result<Value, Unwind> {
    Ok(Value::Int(match this {
        Value::Hash(pairs) => pairs.len(),
        other => items(other).len(),
    } as i64))
}

fn array_first(_: &mut ExecutionContext, this: &Value, _: Args, _: Blk) -> Result<Value, Unwind> {
    Ok(items(this).first().cloned().unwrap_or(Value::Nil))
}

fn array_last(_: &mut ExecutionContext, this: &Value, _: Args, _: Blk) -> Result<Value, Unwind> {
    Ok(items(this).last().cloned().unwrap_or(Value::Nil))
}

fn array_each(ctx: &mut ExecutionContext, this: &Value, _: Args, block: Blk) -> Result<Value, Unwind> {
    let block = need_block(ctx.runtime(), block)?;
    for item in items(this).iter() {
        ctx.call_block(&block, vec![item.clone()], None)?;
    }
    Ok(this.clone())
}

fn array_map(ctx: &mut ExecutionContext, this: &Value, _: Args, block: Blk) -> Result<Value, Unwind> {
    let block = need_block(ctx.runtime(), block)?;
    let mut out = Vec::with_capacity(items(this).len());
    for item in items(this).iter() {
        out.push(ctx.call_block(&block, vec![item.clone()], None)?);
    }
    Ok(Value::array(out))
}

fn array_push(_: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    let mut out = items(this).to_vec();
    out.extend(args);
    Ok(Value::array(out))
}

fn array_concat(ctx: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    let rt = ctx.runtime().clone();
    let other = one(&rt, &args)?;
    let Value::Array(tail) = &other else {
        return Err(rt.error(
            ErrorClass::Type,
            format!("no implicit conversion of {} into Array", rt.class_of(&other).name()),
        ));
    };
    let mut out = items(this).to_vec();
    out.extend(tail.iter().cloned());
    Ok(Value::array(out))
}

fn array_include(ctx: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    let rt = ctx.runtime().clone();
    let needle = one(&rt, &args)?;
    Ok(Value::Bool(items(this).iter().any(|v| rt.values_equal(v, &needle))))
}

fn array_join(ctx: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    arity(ctx.runtime(), &args, 0, 1)?;
    let sep = args.first().map(Value::to_string).unwrap_or_default();
    let parts: Vec<String> = items(this).iter().map(Value::to_string).collect();
    Ok(Value::str(&parts.join(&sep)))
}

fn hash_at(ctx: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    let rt = ctx.runtime().clone();
    let key = one(&rt, &args)?;
    Ok(pairs(this)
        .iter()
        .find(|(k, _)| rt.values_equal(k, &key))
        .map(|(_, v)| v.clone())
        .unwrap_or(Value::Nil))
}

fn hash_keys(_: &mut ExecutionContext, this: &Value, _: Args, _: Blk) -> Result<Value, Unwind> {
    Ok(Value::array(pairs(this).iter().map(|(k, _)| k.clone()).collect()))
}

fn hash_values(_: &mut ExecutionContext, this: &Value, _: Args, _: Blk) -> Result<Value, Unwind> {
    Ok(Value::array(pairs(this).iter().map(|(_, v)| v.clone()).collect()))
}

fn hash_has_key(ctx: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    let rt = ctx.runtime().clone();
    let key = one(&rt, &args)?;
    Ok(Value::Bool(pairs(this).iter().any(|(k, _)| rt.values_equal(k, &key))))
}

fn hash_each(ctx: &mut ExecutionContext, this: &Value, _: Args, block: Blk) -> Result<Value, Unwind> {
    let block = need_block(ctx.runtime(), block)?;
    for (k, v) in pairs(this).iter() {
        ctx.call_block(&block, vec![Value::array(vec![k.clone(), v.clone()])], None)?;
    }
    Ok(this.clone())
}

// -- nil and booleans ----------------------------------------------------

fn nil_to_a(_: &mut ExecutionContext, _: &Value, _: Args, _: Blk) -> Result<Value, Unwind> {
    Ok(Value::empty_array())
}

fn bool_and(ctx: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    let other = one(ctx.runtime(), &args)?;
    Ok(Value::Bool(this.is_truthy() && other.is_truthy()))
}

fn bool_or(ctx: &mut ExecutionContext, this: &Value, args: Args, _: Blk) -> Result<Value, Unwind> {
    let other = one(ctx.runtime(), &args)?;
    Ok(Value::Bool(this.is_truthy() || other.is_truthy()))
}

// -- procs ---------------------------------------------------------------

fn proc_call(ctx: &mut ExecutionContext, this: &Value, args: Args, block: Blk) -> Result<Value, Unwind> {
    let Value::Proc(b) = this else {
        return Err(ctx.runtime().no_method_error(this, "call"));
    };
    let b = b.clone();
    ctx.call_block(&b, args, block)
}

fn proc_is_lambda(_: &mut ExecutionContext, this: &Value, _: Args, _: Blk) -> Result<Value, Unwind> {
    Ok(Value::Bool(this.as_proc().is_some_and(|b| b.is_lambda())))
}

fn proc_arity(_: &mut ExecutionContext, this: &Value, _: Args, _: Blk) -> Result<Value, Unwind> {
    let Some(b) = this.as_proc() else {
        return Ok(Value::Nil);
    };
    let sig = b.body().signature();
    let required = (sig.pre + sig.post) as i64;
    Ok(Value::Int(if sig.rest || sig.opt > 0 { -required - 1 } else { required }))
}

// -- exceptions ----------------------------------------------------------

fn exc_message(_: &mut ExecutionContext, this: &Value, _: Args, _: Blk) -> Result<Value, Unwind> {
    Ok(match this {
        Value::Exception(e) => Value::Str(e.message.clone()),
        other => Value::str(&other.to_string()),
    })
}
