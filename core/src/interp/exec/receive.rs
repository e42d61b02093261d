use std::sync::Arc;

use crate::{
    ir::{
        instr::{receive, MasgnOptInstr, MasgnReqdInstr, MasgnRestInstr, ReceiveKeywordArgInstr},
        Operand,
    },
    value::{Block, Value},
};

use super::{ExecutionContext, InterpState, Unwind};

pub(super) fn keyword(ctx: &mut ExecutionContext, state: &mut InterpState, i: &ReceiveKeywordArgInstr) -> Result<Value, Unwind> {
    state.args.keyword(ctx, &i.name, i.required)
}

pub(super) fn block_value(block: Option<&Arc<Block>>) -> Value {
    block.map_or(Value::Nil, |b| Value::Proc(b.clone()))
}

// Multiple assignment treats a non-array source as a one-element array.
fn masgn_items(ctx: &mut ExecutionContext, state: &InterpState, array: &Operand) -> Result<Arc<[Value]>, Unwind> {
    Ok(match array.retrieve(ctx, state)? {
        Value::Array(items) => items,
        other => Arc::from(vec![other]),
    })
}

pub(super) fn masgn_reqd(ctx: &mut ExecutionContext, state: &InterpState, i: &MasgnReqdInstr) -> Result<Value, Unwind> {
    let items = masgn_items(ctx, state, &i.array)?;
    Ok(receive::masgn_reqd_index(items.len(), i.pre, i.post, i.index)
        .and_then(|idx| items.get(idx).cloned())
        .unwrap_or(Value::Nil))
}

pub(super) fn masgn_opt(ctx: &mut ExecutionContext, state: &InterpState, i: &MasgnOptInstr) -> Result<Value, Unwind> {
    let items = masgn_items(ctx, state, &i.array)?;
    if items.len() as u32 <= i.min_args {
        return Ok(Value::Undefined);
    }
    Ok(items.get(i.index as usize).cloned().unwrap_or(Value::Undefined))
}

pub(super) fn masgn_rest(ctx: &mut ExecutionContext, state: &InterpState, i: &MasgnRestInstr) -> Result<Value, Unwind> {
    let items = masgn_items(ctx, state, &i.array)?;
    let range = receive::masgn_rest_range(items.len(), i.post, i.index);
    Ok(Value::array(items[range].to_vec()))
}
