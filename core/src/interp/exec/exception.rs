use std::sync::Arc;

use tracing::trace;

use crate::{
    ir::instr::{
        BreakInstr, CheckForLjeInstr, HelperMethod, NonlocalReturnInstr, ReceiveExceptionInstr, RescueEqqInstr,
        RuntimeHelperInstr, ThrowInstr,
    },
    runtime::ErrorClass,
    value::Value,
};

use super::{ExecutionContext, InterpState, Unwind};

/// Hands the parked unwind to the handler. Language exceptions become
/// exception objects; jumps stay opaque signals unless `unwrap` asks for
/// the value a `rescue` clause would see.
pub(super) fn receive_exception(
    ctx: &mut ExecutionContext,
    state: &mut InterpState,
    i: &ReceiveExceptionInstr,
) -> Result<Value, Unwind> {
    let Some(pending) = state.pending.take() else {
        return Ok(Value::Nil);
    };
    let rt = ctx.runtime();
    Ok(match pending {
        Unwind::Raise(e) => Value::Exception(e),
        Unwind::Break { .. } if i.unwrap => Value::Exception(rt.exception(ErrorClass::LocalJump, "break from proc-closure")),
        Unwind::Return { .. } if i.unwrap => Value::Exception(rt.exception(ErrorClass::LocalJump, "unexpected return")),
        Unwind::Bug(e) if i.unwrap => Value::Exception(rt.exception(ErrorClass::Standard, e.to_string())),
        other => Value::Signal(Arc::new(other)),
    })
}

pub(super) fn throw(ctx: &mut ExecutionContext, state: &InterpState, i: &ThrowInstr) -> Result<Value, Unwind> {
    Err(match i.value.retrieve(ctx, state)? {
        Value::Exception(e) => Unwind::Raise(e),
        Value::Signal(signal) => (*signal).clone(),
        _ => ctx.runtime().error(ErrorClass::Type, "exception class/object expected"),
    })
}

/// `rescue A, B => e`: true when the exception is a kind of any listed class.
pub(super) fn rescue_eqq(ctx: &mut ExecutionContext, state: &InterpState, i: &RescueEqqInstr) -> Result<Value, Unwind> {
    let exception = i.exception.retrieve(ctx, state)?;
    if matches!(exception, Value::Signal(_)) {
        return Ok(Value::Bool(false));
    }
    let classes = i.classes.retrieve(ctx, state)?;
    let rt = ctx.runtime();
    let matched = match &classes {
        Value::Array(items) => items.iter().any(|c| rt.case_eq(c, &exception)),
        single => rt.case_eq(single, &exception),
    };
    Ok(Value::Bool(matched))
}

/// `break` in a block body. Inside a lambda it just leaves the lambda;
/// otherwise it unwinds to the call that passed the block.
pub(super) fn break_out(ctx: &mut ExecutionContext, state: &InterpState, i: &BreakInstr) -> Result<Value, Unwind> {
    let value = i.value.retrieve(ctx, state)?;
    if state.in_lambda() {
        return Ok(value);
    }
    let Some(block) = state.this_block() else {
        return Err(ctx.runtime().error(ErrorClass::LocalJump, "break from proc-closure"));
    };
    let target = block.binding();
    if !target.is_active() {
        return Err(ctx.runtime().error(ErrorClass::LocalJump, "break from proc-closure"));
    }
    trace!(target: "irx::interp::unwind", scope = %i.scope_name, target = target.id(), "break");
    Err(Unwind::Break {
        target: target.id(),
        value,
    })
}

/// `return` inside a block: leaves the defining method (or lambda).
pub(super) fn nonlocal_return(
    ctx: &mut ExecutionContext,
    state: &InterpState,
    i: &NonlocalReturnInstr,
) -> Result<Value, Unwind> {
    let value = i.value.retrieve(ctx, state)?;
    let Some(block) = state.this_block().filter(|_| !state.in_lambda()) else {
        return Ok(value);
    };
    match block.binding().return_target() {
        Some(target) if target.is_active() => {
            trace!(target: "irx::interp::unwind", method = %i.method_name, target = target.id(), "nonlocal return");
            Err(Unwind::Return {
                target: target.id(),
                value,
            })
        }
        _ => Err(ctx.runtime().error(ErrorClass::LocalJump, "unexpected return")),
    }
}

pub(super) fn check_for_lje(ctx: &mut ExecutionContext, state: &InterpState, i: &CheckForLjeInstr) -> Result<Value, Unwind> {
    if i.maybe_lambda && state.in_lambda() {
        return Ok(Value::Nil);
    }
    let Some(block) = state.this_block() else {
        return Ok(Value::Nil);
    };
    match block.binding().return_target() {
        Some(target) if target.is_active() => Ok(Value::Nil),
        _ => Err(ctx.runtime().error(ErrorClass::LocalJump, "unexpected return")),
    }
}

/// Handlers the builder places around bodies that may receive jumps. The
/// single argument is the value the handler caught.
pub(super) fn runtime_helper(ctx: &mut ExecutionContext, state: &InterpState, i: &RuntimeHelperInstr) -> Result<Value, Unwind> {
    let caught = match i.args.first() {
        Some(arg) => arg.retrieve(ctx, state)?,
        None => Value::Nil,
    };
    let own = state.dyn_scope().map(|d| d.id());
    let Value::Signal(signal) = &caught else {
        return match caught {
            Value::Exception(e) => Err(Unwind::Raise(e)),
            other => Ok(other),
        };
    };
    match (i.helper, signal.as_ref()) {
        (HelperMethod::HandlePropagatedBreak, Unwind::Break { target, value })
        | (HelperMethod::HandleNonlocalReturn, Unwind::Return { target, value })
            if Some(*target) == own =>
        {
            Ok(value.clone())
        }
        (HelperMethod::HandleBreakAndReturnsInLambdas, Unwind::Break { value, .. } | Unwind::Return { value, .. }) => {
            Ok(value.clone())
        }
        _ => Err((**signal).clone()),
    }
}
