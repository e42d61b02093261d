use anyhow::Result;
use tracing::trace;

use crate::ir::{Instr, InstrKind, Scope};

use super::Pass;

/// Rewrites generic calls into their narrower specialised variants.
pub struct SpecializeCallsPass;

impl Pass for SpecializeCallsPass {
    fn name(&self) -> &'static str {
        "specialize-calls"
    }

    fn run(&mut self, scope: &mut Scope) -> Result<()> {
        let mut rewritten = 0usize;
        for slot in scope.instrs_mut().iter_mut() {
            if !matches!(slot.kind, InstrKind::Call(_) | InstrKind::NoResultCall(_)) {
                continue;
            }
            let before = slot.operation();
            let instr = std::mem::replace(slot, Instr::new(InstrKind::Nop));
            *slot = instr.specialize();
            if slot.operation() != before {
                rewritten += 1;
            }
        }
        trace!(target: "irx::passes", scope = %scope.name(), rewritten, "specialised calls");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{builder::ScopeBuilder, Operand, Operation};

    #[test]
    fn specialises_by_argument_shape() {
        let mut b = ScopeBuilder::method("m", "t.rb");
        let x = b.temp();
        b.copy(x.clone(), Operand::Fixnum(1));
        b.call(Operand::Var(x.clone()), "succ", vec![]);
        b.call(Operand::Var(x.clone()), "+", vec![Operand::Fixnum(2)]);
        b.call(Operand::Var(x.clone()), "+", vec![Operand::Float(2.5)]);
        b.call(Operand::Var(x.clone()), "+", vec![Operand::Var(x.clone())]);
        b.send(Operand::Var(x.clone()), "push", vec![Operand::Var(x.clone())]);
        b.call(Operand::Var(x.clone()), "between?", vec![Operand::Fixnum(0), Operand::Fixnum(3)]);
        let mut scope = b.finish();
        SpecializeCallsPass.run(&mut scope).unwrap();
        let ops: Vec<Operation> = scope.instrs().iter().map(Instr::operation).collect();
        assert_eq!(
            ops,
            vec![
                Operation::Copy,
                Operation::ZeroOperandArgNoBlockCall,
                Operation::OneFixnumArgNoBlockCall,
                Operation::OneFloatArgNoBlockCall,
                Operation::OneOperandArgNoBlockCall,
                Operation::OneArgNoBlockNoResultCall,
                Operation::Call,
            ]
        );
    }
}
