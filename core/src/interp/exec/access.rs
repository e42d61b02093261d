use std::sync::Arc;

use tracing::debug;

use crate::{
    interp::{Activation, Frame},
    ir::{
        instr::{
            BuildCompoundArrayInstr, BuildCompoundStringInstr, BuildLambdaInstr, ConstLookupInstr, DefineClassInstr,
            DefineClassMethodInstr, DefineInstanceMethodInstr, GetClassVarInstr, GetFieldInstr, ProcessModuleBodyInstr,
            PutClassVarInstr, PutConstInstr, PutFieldInstr, ToAryInstr,
        },
        Operand, ScopeKind,
    },
    runtime::{ErrorClass, MethodBody, RModule, Visibility},
    value::{BlockKind, Value},
};

use super::{ExecutionContext, InterpState, Unwind};

fn module_operand(ctx: &mut ExecutionContext, state: &InterpState, operand: &Operand) -> Result<Arc<RModule>, Unwind> {
    match operand.retrieve(ctx, state)? {
        Value::Module(m) => Ok(m),
        other => Err(ctx.runtime().error(
            ErrorClass::Type,
            format!("{} is not a class/module", other.inspect()),
        )),
    }
}

pub(super) fn get_field(ctx: &mut ExecutionContext, state: &InterpState, i: &GetFieldInstr) -> Result<Value, Unwind> {
    Ok(match i.object.retrieve(ctx, state)? {
        Value::Object(o) => o.ivar(&i.name).unwrap_or(Value::Nil),
        _ => Value::Nil,
    })
}

pub(super) fn put_field(ctx: &mut ExecutionContext, state: &InterpState, i: &PutFieldInstr) -> Result<Value, Unwind> {
    let object = i.object.retrieve(ctx, state)?;
    let value = i.value.retrieve(ctx, state)?;
    match object {
        Value::Object(o) => {
            o.set_ivar(i.name.clone(), value);
            Ok(Value::Nil)
        }
        other => Err(ctx.runtime().error(
            ErrorClass::Runtime,
            format!("can't modify frozen {}", ctx.runtime().class_of(&other).name()),
        )),
    }
}

fn uninitialized_constant(ctx: &ExecutionContext, name: &str) -> Unwind {
    ctx.runtime().error(ErrorClass::Name, format!("uninitialized constant {}", name))
}

/// Full lexical-then-inherited search, cached per site under the constant
/// generation.
pub(super) fn search_const(
    ctx: &mut ExecutionContext,
    state: &InterpState,
    i: &ConstLookupInstr,
    ipc: Option<u32>,
) -> Result<Value, Unwind> {
    let generation = ctx.runtime().constant_generation();
    let site = ipc.map(|ipc| (state.scope().id(), ipc));
    if let Some(site) = site
        && let Some(hit) = ctx.cached_const(site, &i.name, generation)
    {
        return Ok(hit);
    }
    let module = module_operand(ctx, state, &i.module)?;
    let value = ctx
        .runtime()
        .search_const(&module, &i.name)
        .ok_or_else(|| uninitialized_constant(ctx, &i.name))?;
    if let Some(site) = site {
        ctx.cache_const(site, &i.name, value.clone(), generation);
    }
    Ok(value)
}

/// Only the module's own table; `undefined` tells the caller to keep looking.
pub(super) fn lexical_search_const(
    ctx: &mut ExecutionContext,
    state: &InterpState,
    i: &ConstLookupInstr,
) -> Result<Value, Unwind> {
    let module = module_operand(ctx, state, &i.module)?;
    Ok(module.own_const(&i.name).unwrap_or(Value::Undefined))
}

pub(super) fn inheritance_search_const(
    ctx: &mut ExecutionContext,
    state: &InterpState,
    i: &ConstLookupInstr,
) -> Result<Value, Unwind> {
    let module = module_operand(ctx, state, &i.module)?;
    module.inherited_const(&i.name).ok_or_else(|| uninitialized_constant(ctx, &i.name))
}

pub(super) fn put_const(ctx: &mut ExecutionContext, state: &InterpState, i: &PutConstInstr) -> Result<Value, Unwind> {
    let module = module_operand(ctx, state, &i.module)?;
    let value = i.value.retrieve(ctx, state)?;
    ctx.runtime().set_const(&module, &i.name, value);
    Ok(Value::Nil)
}

pub(super) fn get_class_var(ctx: &mut ExecutionContext, state: &InterpState, i: &GetClassVarInstr) -> Result<Value, Unwind> {
    let module = module_operand(ctx, state, &i.module)?;
    module.class_var(&i.name).ok_or_else(|| {
        ctx.runtime().error(
            ErrorClass::Name,
            format!("uninitialized class variable {} in {}", i.name, module.name()),
        )
    })
}

pub(super) fn put_class_var(ctx: &mut ExecutionContext, state: &InterpState, i: &PutClassVarInstr) -> Result<Value, Unwind> {
    let module = module_operand(ctx, state, &i.module)?;
    let value = i.value.retrieve(ctx, state)?;
    module.set_class_var(i.name.clone(), value);
    Ok(Value::Nil)
}

pub(super) fn build_compound_string(
    ctx: &mut ExecutionContext,
    state: &InterpState,
    i: &BuildCompoundStringInstr,
) -> Result<Value, Unwind> {
    let mut out = String::new();
    for piece in &i.pieces {
        out.push_str(&piece.retrieve(ctx, state)?.to_string());
    }
    Ok(Value::Str(Arc::from(out)))
}

/// `head + [tail]` for a push, `head + *tail` otherwise.
pub(super) fn build_compound_array(
    ctx: &mut ExecutionContext,
    state: &InterpState,
    i: &BuildCompoundArrayInstr,
) -> Result<Value, Unwind> {
    let head = i.head.retrieve(ctx, state)?;
    let tail = i.tail.retrieve(ctx, state)?;
    let mut items = ctx.splat(&head)?;
    if i.is_push {
        items.push(tail);
    } else {
        items.extend(ctx.splat(&tail)?);
    }
    Ok(Value::array(items))
}

pub(super) fn build_lambda(ctx: &mut ExecutionContext, state: &InterpState, i: &BuildLambdaInstr) -> Result<Value, Unwind> {
    match &i.body {
        Operand::Closure(body) => Ok(Value::Proc(state.make_block(body, BlockKind::Lambda)?)),
        other => match other.retrieve(ctx, state)? {
            Value::Proc(block) => Ok(Value::Proc(Arc::new(block.with_kind(BlockKind::Lambda)))),
            v => Err(ctx.runtime().error(
                ErrorClass::Type,
                format!("wrong argument type {} (expected Proc)", ctx.runtime().class_of(&v).name()),
            )),
        },
    }
}

pub(super) fn to_ary(ctx: &mut ExecutionContext, state: &InterpState, i: &ToAryInstr) -> Result<Value, Unwind> {
    Ok(match i.array.retrieve(ctx, state)? {
        v @ Value::Array(_) => v,
        other => Value::array(vec![other]),
    })
}

/// Opens or creates a class under its container. Reopening checks the
/// declared superclass against the existing one.
pub(super) fn define_class(ctx: &mut ExecutionContext, state: &InterpState, i: &DefineClassInstr) -> Result<Value, Unwind> {
    let rt = ctx.runtime().clone();
    let container = module_operand(ctx, state, &i.container)?;
    let superclass = match i.superclass.retrieve(ctx, state)? {
        Value::Nil | Value::Undefined => None,
        Value::Module(m) if m.is_class() => Some(m),
        other => {
            return Err(rt.error(
                ErrorClass::Type,
                format!("superclass must be a Class ({} given)", rt.class_of(&other).name()),
            ));
        }
    };

    if let Some(existing) = container.own_const(&i.name) {
        let Value::Module(class) = existing else {
            return Err(rt.error(ErrorClass::Type, format!("{} is not a class", i.name)));
        };
        if !class.is_class() {
            return Err(rt.error(ErrorClass::Type, format!("{} is not a class", i.name)));
        }
        if let Some(declared) = &superclass
            && class.superclass().is_none_or(|actual| actual.id() != declared.id())
        {
            return Err(rt.error(
                ErrorClass::Type,
                format!("superclass mismatch for class {}", i.name),
            ));
        }
        return Ok(Value::Module(class));
    }

    let name = if Arc::ptr_eq(&container, rt.object_class()) {
        i.name.to_string()
    } else {
        format!("{}::{}", container.name(), i.name)
    };
    let superclass = superclass.unwrap_or_else(|| rt.object_class().clone());
    let class = RModule::new_class(&name, Some(superclass));
    rt.set_const(&container, &i.name, Value::Module(class.clone()));
    debug!(target: "irx::runtime", class = %name, "class defined");
    Ok(Value::Module(class))
}

pub(super) fn define_instance_method(
    ctx: &mut ExecutionContext,
    state: &InterpState,
    i: &DefineInstanceMethodInstr,
) -> Result<Value, Unwind> {
    // top-level `def` defines private methods on Object
    let visibility = if state.scope().kind() == ScopeKind::Script {
        Visibility::Private
    } else {
        Visibility::Public
    };
    ctx.runtime().define_ir_method(state.module(), &i.body, visibility);
    Ok(Value::Symbol(i.body.name().clone()))
}

pub(super) fn define_class_method(
    ctx: &mut ExecutionContext,
    state: &InterpState,
    i: &DefineClassMethodInstr,
) -> Result<Value, Unwind> {
    let target = module_operand(ctx, state, &i.object)?;
    ctx.runtime()
        .define_singleton_method(&target, i.body.name(), MethodBody::Ir(i.body.clone()));
    Ok(Value::Symbol(i.body.name().clone()))
}

/// Runs a class or module body with the module as self and lexical scope.
pub(super) fn process_module_body(
    ctx: &mut ExecutionContext,
    state: &InterpState,
    i: &ProcessModuleBodyInstr,
) -> Result<Value, Unwind> {
    let module = module_operand(ctx, state, &i.module)?;
    let self_value = Value::Module(module.clone());
    let frame = Frame::new(
        Arc::from(format!("<class:{}>", module.name())),
        module.clone(),
        self_value.clone(),
        None,
    );
    ctx.invoke_scope(
        &i.body,
        Activation {
            self_value,
            module,
            frame,
            args: Vec::new(),
            block: None,
            binding: None,
            this_block: None,
        },
    )
}
