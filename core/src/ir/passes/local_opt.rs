use anyhow::Result;

use crate::ir::{InstrKind, Operand, Scope, ValueMap, Variable};

use super::Pass;

/// Copy and constant propagation within straight-line runs of
/// instructions. The value map is reset at every label and after every
/// control transfer; calls forget what they may have clobbered.
pub struct LocalOptPass;

impl Pass for LocalOptPass {
    fn name(&self) -> &'static str {
        "local-opt"
    }

    fn run(&mut self, scope: &mut Scope) -> Result<()> {
        let mut map = ValueMap::default();
        for instr in scope.instrs_mut().iter_mut().filter(|i| !i.is_dead()) {
            if matches!(instr.kind, InstrKind::Label(_)) {
                map.clear();
                continue;
            }
            instr.simplify_operands(&map, false);

            if let Some(result) = instr.result().cloned() {
                forget(&mut map, &result);
            }
            let op = instr.operation();
            if op.is_call() {
                // callees may write captured locals through a block or binding
                map.retain(|k, v| !k.is_local() && !mentions_local(v));
            }
            if let InstrKind::Copy(copy) = &instr.kind {
                if is_propagatable(&copy.source) && Operand::Var(copy.result.clone()) != copy.source {
                    map.insert(copy.result.clone(), copy.source.clone());
                }
            }
            if op.transfers_control() {
                map.clear();
            }
        }
        Ok(())
    }
}

// drop `var` and everything computed from it
fn forget(map: &mut ValueMap, var: &Variable) {
    map.remove(var);
    map.retain(|_, v| !v.references(var));
}

fn is_propagatable(op: &Operand) -> bool {
    match op {
        Operand::Var(Variable::Local(l)) => l.depth == 0,
        Operand::Var(_) => true,
        Operand::Label(_) => false,
        other => other.is_constant(),
    }
}

fn mentions_local(op: &Operand) -> bool {
    let mut vars = Vec::new();
    op.add_used_variables(&mut vars);
    vars.iter().any(Variable::is_local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::ScopeBuilder;

    #[test]
    fn propagates_constants_into_calls() {
        let mut b = ScopeBuilder::method("m", "t.rb");
        let x = b.temp();
        b.copy(x.clone(), Operand::Fixnum(3));
        let y = b.call(Operand::Var(x), "+", vec![Operand::Fixnum(1)]);
        b.ret(Operand::Var(y));
        let mut scope = b.finish();
        LocalOptPass.run(&mut scope).unwrap();
        let call = scope.instrs()[1].call_base().unwrap();
        assert_eq!(call.receiver, Operand::Fixnum(3));
    }

    #[test]
    fn labels_reset_knowledge() {
        let mut b = ScopeBuilder::method("m", "t.rb");
        let x = b.temp();
        let l = b.label("l");
        b.copy(x.clone(), Operand::Fixnum(3));
        b.place(l);
        b.ret(Operand::Var(x.clone()));
        let mut scope = b.finish();
        LocalOptPass.run(&mut scope).unwrap();
        assert_eq!(scope.instrs()[2].operands(), vec![&Operand::Var(x)]);
    }

    #[test]
    fn reassignment_invalidates_dependents() {
        let mut b = ScopeBuilder::method("m", "t.rb");
        let (x, y) = (b.temp(), b.temp());
        b.copy(y.clone(), Operand::Var(x.clone()));
        b.copy(x.clone(), Operand::Fixnum(9));
        b.ret(Operand::Var(y.clone()));
        let mut scope = b.finish();
        LocalOptPass.run(&mut scope).unwrap();
        // y still holds the old x, which is no longer nameable
        assert_eq!(scope.instrs()[2].operands(), vec![&Operand::Var(y)]);
    }

    #[test]
    fn calls_clobber_locals() {
        let mut b = ScopeBuilder::method("m", "t.rb");
        let a = b.local("a");
        b.copy(a.clone(), Operand::Fixnum(1));
        b.fcall("mutate", vec![]);
        b.ret(Operand::Var(a.clone()));
        let mut scope = b.finish();
        LocalOptPass.run(&mut scope).unwrap();
        assert_eq!(scope.instrs()[2].operands(), vec![&Operand::Var(a)]);
    }

    #[test]
    fn running_twice_changes_nothing() {
        let mut b = ScopeBuilder::method("m", "t.rb");
        let (x, y) = (b.temp(), b.temp());
        b.copy(x.clone(), Operand::Fixnum(3));
        b.copy(y.clone(), Operand::Var(x));
        b.ret(Operand::Var(y));
        let mut scope = b.finish();
        LocalOptPass.run(&mut scope).unwrap();
        let once = scope.instrs().to_vec();
        LocalOptPass.run(&mut scope).unwrap();
        assert_eq!(scope.instrs(), once.as_slice());
    }
}
