use crate::{
    interp::{DynamicScope, ScopeRole},
    ir::{
        instr::{CheckArgsArrayArityInstr, CheckArityInstr, GuardInstr, RaiseArgumentErrorInstr},
        ScopeKind,
    },
    runtime::ErrorClass,
    value::Value,
};

use super::{ExecutionContext, InterpState, Unwind};

pub(super) fn push_frame(ctx: &mut ExecutionContext, state: &InterpState) -> Result<Value, Unwind> {
    ctx.push_frame(state.frame().clone());
    Ok(Value::Nil)
}

pub(super) fn pop_frame(ctx: &mut ExecutionContext) -> Result<Value, Unwind> {
    ctx.pop_frame();
    Ok(Value::Nil)
}

/// Explicit-protocol scopes allocate their own binding; scopes run with one
/// already (blocks, scripts) keep it.
pub(super) fn push_binding(_: &mut ExecutionContext, state: &mut InterpState) -> Result<Value, Unwind> {
    if state.dyn_scope().is_none() {
        let role = if state.scope().kind() == ScopeKind::Method {
            ScopeRole::Method
        } else {
            ScopeRole::Plain
        };
        let slots = state.scope().locals().len();
        state.install_dyn_scope(DynamicScope::new(slots, None, role));
    }
    Ok(Value::Nil)
}

pub(super) fn pop_binding(state: &InterpState) -> Result<Value, Unwind> {
    if let Some(d) = state.dyn_scope() {
        d.deactivate();
    }
    Ok(Value::Nil)
}

pub(super) fn check_arity(ctx: &mut ExecutionContext, state: &InterpState, i: &CheckArityInstr) -> Result<Value, Unwind> {
    state.args.check_arity(
        ctx,
        state.scope().signature(),
        i.required,
        i.opt,
        i.rest,
        i.receives_keywords,
        i.kwrest,
    )?;
    Ok(Value::Nil)
}

/// Arity of an array destructured into block parameters.
pub(super) fn check_args_array_arity(
    ctx: &mut ExecutionContext,
    state: &InterpState,
    i: &CheckArgsArrayArityInstr,
) -> Result<Value, Unwind> {
    let given = match i.array.retrieve(ctx, state)? {
        Value::Array(items) => items.len() as u32,
        _ => 1,
    };
    if given < i.required || (!i.rest && given > i.required + i.opt) {
        return Err(ctx.runtime().error(
            ErrorClass::Argument,
            format!(
                "wrong number of arguments (given {}, expected {})",
                given,
                crate::ir::instr::expected_arity(i.required, i.opt, i.rest)
            ),
        ));
    }
    Ok(Value::Nil)
}

pub(super) fn raise_argument_error(ctx: &mut ExecutionContext, i: &RaiseArgumentErrorInstr) -> Result<Value, Unwind> {
    Err(ctx.runtime().error(ErrorClass::Argument, i.message()))
}

pub(super) fn guard(ctx: &mut ExecutionContext, state: &InterpState, i: &GuardInstr) -> Result<Value, Unwind> {
    let value = i.value.retrieve(ctx, state)?;
    if i.expected.matches(&value) {
        Ok(Value::Nil)
    } else {
        Err(Unwind::Deopt)
    }
}
