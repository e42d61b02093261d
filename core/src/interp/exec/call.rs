use std::sync::Arc;

use tracing::debug;

use crate::{
    error::IrError,
    interp::{
        args::{prepare_args, prepare_block, prepare_complex, prepare_simple},
        ScopeRole,
    },
    ir::instr::{build_splat_map, CallBase, EqqInstr, YieldInstr, ZSuperInstr},
    runtime::{ErrorClass, RModule},
    value::{Block, Value},
};

use super::{ExecutionContext, InterpState, Unwind};

/// A `break` out of a block created here lands at this call: the call's
/// value becomes the break value.
fn catch_break(state: &InterpState, base: &CallBase, result: Result<Value, Unwind>) -> Result<Value, Unwind> {
    match result {
        Err(Unwind::Break { target, value })
            if base.closure.is_some() && state.dyn_scope().is_some_and(|d| d.id() == target) =>
        {
            debug!(target: "irx::interp::unwind", method = %base.name, "break caught at call site");
            Ok(value)
        }
        other => other,
    }
}

fn send(
    ctx: &mut ExecutionContext,
    state: &InterpState,
    base: &CallBase,
    args: Vec<Value>,
    ipc: Option<u32>,
) -> Result<Value, Unwind> {
    let receiver = base.receiver.retrieve(ctx, state)?;
    let block = prepare_block(ctx, state, base.closure.as_ref())?;
    let site = ipc.map(|ipc| (state.scope().id(), ipc));
    let result = ctx.dispatch(
        site,
        base.potentially_refined,
        &receiver,
        &base.name,
        args,
        block,
        base.call_type,
    );
    catch_break(state, base, result)
}

pub(super) fn call(ctx: &mut ExecutionContext, state: &InterpState, base: &CallBase, ipc: Option<u32>) -> Result<Value, Unwind> {
    let args = prepare_args(ctx, state, base)?;
    send(ctx, state, base, args, ipc)
}

/// `recv.attr = value` evaluates to the assigned value, whatever the writer
/// returns.
pub(super) fn attr_assign(
    ctx: &mut ExecutionContext,
    state: &InterpState,
    base: &CallBase,
    ipc: Option<u32>,
) -> Result<Value, Unwind> {
    let args = prepare_args(ctx, state, base)?;
    let assigned = args.last().cloned().unwrap_or(Value::Nil);
    send(ctx, state, base, args, ipc)?;
    Ok(assigned)
}

pub(super) fn call_with_literal(
    ctx: &mut ExecutionContext,
    state: &InterpState,
    base: &CallBase,
    literal: Value,
    ipc: Option<u32>,
) -> Result<Value, Unwind> {
    send(ctx, state, base, vec![literal], ipc)
}

/// `super` whose defining module is known statically (the receiver operand).
pub(super) fn resolved_super(
    ctx: &mut ExecutionContext,
    state: &InterpState,
    base: &CallBase,
    singleton: bool,
) -> Result<Value, Unwind> {
    let module = match base.receiver.retrieve(ctx, state)? {
        Value::Module(m) => m,
        other => {
            return Err(ctx.runtime().error(
                ErrorClass::Type,
                format!("{} is not a class/module", other.inspect()),
            ));
        }
    };
    let args = prepare_args(ctx, state, base)?;
    let block = prepare_block(ctx, state, base.closure.as_ref())?;
    let result = ctx.dispatch_super(&module, &base.name, singleton, state.self_value(), args, block);
    catch_break(state, base, result)
}

// Singleton when self is the class the running method was found on (or
// one of its subclasses).
fn frame_target(state: &InterpState) -> (Arc<RModule>, Arc<str>, bool) {
    let frame = state.frame();
    let singleton = matches!(state.self_value(), Value::Module(m) if m.inherits_from(&frame.module));
    (frame.module.clone(), frame.name.clone(), singleton)
}

/// `super(...)` resolved against the running frame.
pub(super) fn unresolved_super(ctx: &mut ExecutionContext, state: &InterpState, base: &CallBase) -> Result<Value, Unwind> {
    let (module, name, singleton) = frame_target(state);
    let args = prepare_args(ctx, state, base)?;
    let block = prepare_block(ctx, state, base.closure.as_ref())?;
    let result = ctx.dispatch_super(&module, &name, singleton, state.self_value(), args, block);
    catch_break(state, base, result)
}

/// Bare `super`: forwards the arguments of the nearest method-like
/// activation, picking the operand level that matches how far out it is.
pub(super) fn zsuper(ctx: &mut ExecutionContext, state: &InterpState, i: &ZSuperInstr) -> Result<Value, Unwind> {
    let (level, method_scope) = state
        .dyn_scope()
        .and_then(|d| d.method_scope())
        .map_or((0, None), |(level, scope)| (level as usize, Some(scope)));
    if method_scope.is_some_and(|m| m.role() == ScopeRole::BlockMethod) {
        return Err(ctx.runtime().error(
            ErrorClass::Runtime,
            "implicit argument passing of super from method defined by define_method() is not supported. \
             Specify all arguments explicitly.",
        ));
    }
    let operands = i.level_args(level).ok_or_else(|| {
        Unwind::Bug(IrError::internal(format!(
            "{}: zsuper has no arguments recorded for level {}",
            state.scope().name(),
            level
        )))
    })?;
    let args = match build_splat_map(operands) {
        None => prepare_simple(ctx, state, operands)?,
        Some(map) => prepare_complex(ctx, state, operands, &map)?,
    };
    let block = match &i.base.closure {
        Some(closure) => prepare_block(ctx, state, Some(closure))?,
        None => state.frame().block.clone(),
    };
    let (module, name, singleton) = frame_target(state);
    let result = ctx.dispatch_super(&module, &name, singleton, state.self_value(), args, block);
    catch_break(state, &i.base, result)
}

fn yield_args(arg: Value, unwrap: bool) -> Vec<Value> {
    match arg {
        Value::Undefined => Vec::new(),
        Value::Array(items) if unwrap => items.to_vec(),
        other => vec![other],
    }
}

pub(super) fn yield_block(ctx: &mut ExecutionContext, state: &InterpState, i: &YieldInstr) -> Result<Value, Unwind> {
    let block: Arc<Block> = match i.block.retrieve(ctx, state)? {
        Value::Proc(b) => b,
        Value::Nil | Value::Undefined => {
            return Err(ctx.runtime().error(ErrorClass::LocalJump, "no block given (yield)"));
        }
        other => {
            return Err(ctx.runtime().error(
                ErrorClass::Type,
                format!("wrong argument type {} (expected Proc)", ctx.runtime().class_of(&other).name()),
            ));
        }
    };
    let arg = i.arg.retrieve(ctx, state)?;
    ctx.call_block(&block, yield_args(arg, i.unwrap), None)
}

pub(super) fn eqq(ctx: &mut ExecutionContext, state: &InterpState, i: &EqqInstr) -> Result<Value, Unwind> {
    let target = i.target.retrieve(ctx, state)?;
    let value = i.value.retrieve(ctx, state)?;
    let rt = ctx.runtime();
    let matched = if i.splatted {
        ctx.splat(&target)?.iter().any(|t| rt.case_eq(t, &value))
    } else {
        rt.case_eq(&target, &value)
    };
    Ok(Value::Bool(matched))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_yield_passes_no_arguments() {
        assert!(yield_args(Value::Undefined, false).is_empty());
        let pair = Value::array(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(yield_args(pair.clone(), true).len(), 2);
        assert_eq!(yield_args(pair.clone(), false), vec![pair]);
    }
}
