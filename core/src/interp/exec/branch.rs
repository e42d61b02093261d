use crate::{
    error::IrError,
    ir::{
        instr::{BIntInstr, BSwitchInstr, IntCmp, JumpIndirectInstr, TwoOperandBranch},
        Label,
    },
    runtime::compare,
    value::Value,
};

use super::{ExecutionContext, InterpState, Unwind};

#[inline]
pub(super) fn when(taken: bool, target: Label) -> Option<Label> {
    taken.then_some(target)
}

pub(super) fn operands_equal(ctx: &mut ExecutionContext, state: &InterpState, i: &TwoOperandBranch) -> Result<bool, Unwind> {
    let a = i.arg1.retrieve(ctx, state)?;
    let b = i.arg2.retrieve(ctx, state)?;
    Ok(a.branch_eq(&b))
}

pub(super) fn indirect_target(ctx: &mut ExecutionContext, state: &InterpState, i: &JumpIndirectInstr) -> Result<Label, Unwind> {
    match i.address.retrieve(ctx, state)? {
        Value::Label(label) => Ok(label),
        other => Err(Unwind::Bug(IrError::internal(format!(
            "jump_indirect through a non-label value {}",
            other.inspect()
        )))),
    }
}

/// Numeric comparison branch. Equality tests fall back to branch equality
/// for non-numbers; ordering tests raise like `Comparable` does.
pub(super) fn b_int(ctx: &mut ExecutionContext, state: &InterpState, i: &BIntInstr) -> Result<Option<Label>, Unwind> {
    let a = i.arg1.retrieve(ctx, state)?;
    let b = i.arg2.retrieve(ctx, state)?;
    let taken = match (&a, &b) {
        (Value::Int(x), Value::Int(y)) => i.op.test(x, y),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => compare(ctx.runtime(), &a, &b, i.op)?,
        _ if i.op.is_equality() => a.branch_eq(&b) == (i.op == IntCmp::Eq),
        _ => compare(ctx.runtime(), &a, &b, i.op)?,
    };
    Ok(when(taken, i.target))
}

pub(super) fn b_switch(ctx: &mut ExecutionContext, state: &InterpState, i: &BSwitchInstr) -> Result<Label, Unwind> {
    Ok(match i.value.retrieve(ctx, state)? {
        Value::Int(n) => i.target_for(n),
        // non-fixnum scrutinees take the general `===` path
        _ => i.ruby_case,
    })
}
