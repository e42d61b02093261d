use tracing::{debug, trace, warn};

use crate::{
    error::IrError,
    ir::{InstrKind, InterpreterContext, OpClass},
    value::Value,
};

use super::{ExecutionContext, InterpState, Unwind};

enum Step {
    Next,
    Goto(usize),
    Leave(Value),
}

/// Runs one activation over its linear instruction list.
///
/// Instructions inside an exception region carry a rescue pointer; any
/// unwind raised there is parked in `state.pending` and control resumes at
/// the handler, which reads it back with `recv_exception`.
pub(crate) fn interpret(ctx: &mut ExecutionContext, state: &mut InterpState, ic: &InterpreterContext) -> Result<Value, Unwind> {
    let instrs = ic.instrs();
    let mut pc = 0;
    while pc < instrs.len() {
        let instr = &instrs[pc];
        let step = match instr.operation().op_class() {
            OpClass::Branch => instr
                .interpret_and_get_new_ipc(ctx, state, ic)
                .map(|target| target.map_or(Step::Next, Step::Goto)),
            OpClass::Return => instr.interpret(ctx, state).map(Step::Leave),
            _ if matches!(instr.kind, InstrKind::Break(_) | InstrKind::NonlocalReturn(_)) => {
                instr.interpret(ctx, state).map(Step::Leave)
            }
            _ => instr.interpret(ctx, state).and_then(|value| {
                if let Some(result) = instr.result()
                    && !instr.has_unused_result()
                {
                    state.set_var(result, value)?;
                }
                Ok(Step::Next)
            }),
        };

        match step {
            Ok(Step::Next) => pc += 1,
            Ok(Step::Goto(target)) => pc = target,
            Ok(Step::Leave(value)) => return Ok(value),
            Err(Unwind::Deopt) => {
                let InstrKind::Guard(guard) = &instr.kind else {
                    return Err(Unwind::Bug(IrError::internal(format!(
                        "{}: deoptimization outside a guard",
                        instr.operation()
                    ))));
                };
                ctx.note_deopt();
                if ctx.config().log_deopts {
                    warn!(target: "irx::interp::deopt", scope = %state.scope().name(), pc, expected = ?guard.expected, "guard failed");
                } else {
                    debug!(target: "irx::interp::deopt", scope = %state.scope().name(), pc, expected = ?guard.expected, "guard failed");
                }
                pc = ic
                    .pc_of(guard.resume)
                    .ok_or(Unwind::Bug(IrError::UnresolvedLabel(guard.resume.index())))?;
            }
            Err(unwind) => match instr.rpc() {
                Some(rpc) => {
                    trace!(target: "irx::interp::unwind", scope = %state.scope().name(), pc, rpc, %unwind, "entering handler");
                    state.pending = Some(unwind);
                    pc = rpc as usize;
                }
                None => return Err(unwind),
            },
        }
    }
    Ok(Value::Nil)
}
