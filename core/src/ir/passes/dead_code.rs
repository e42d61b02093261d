use anyhow::Result;
use rustc_hash::FxHashSet;

use crate::ir::{Scope, Variable};

use super::Pass;

/// Removes instructions whose result nobody reads and whose execution has no
/// observable effect. Iterates to a fixed point, then compacts the list.
pub struct DeadCodePass;

impl Pass for DeadCodePass {
    fn name(&self) -> &'static str {
        "dead-code"
    }

    fn run(&mut self, scope: &mut Scope) -> Result<()> {
        let has_closures = scope.instrs().iter().any(|i| !i.closures().is_empty());
        loop {
            let flags = scope.flags();
            let mut used: FxHashSet<Variable> = FxHashSet::default();
            for instr in scope.instrs().iter().filter(|i| !i.is_dead()) {
                used.extend(instr.used_variables());
            }
            let live = |v: &Variable| match v {
                // the enclosing scope reads these after the closure returns
                Variable::Local(l) if l.depth > 0 => true,
                // closures read locals through the binding
                Variable::Local(_) if has_closures => true,
                other => used.contains(other),
            };

            let mut changed = false;
            for instr in scope.instrs_mut().iter_mut().filter(|i| !i.is_dead()) {
                let Some(result) = instr.result() else {
                    continue;
                };
                if live(result) {
                    continue;
                }
                if instr.can_be_deleted(flags) {
                    instr.mark_dead();
                    changed = true;
                } else if !instr.has_unused_result() {
                    instr.mark_unused_result();
                }
            }
            if !changed {
                break;
            }
        }
        scope.compact();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{builder::ScopeBuilder, Operand, Operation};

    #[test]
    fn removes_unused_copies_transitively() {
        let mut b = ScopeBuilder::method("m", "t.rb");
        let (x, y) = (b.temp(), b.temp());
        b.copy(x.clone(), Operand::Fixnum(1));
        b.copy(y, Operand::Var(x));
        b.ret(Operand::Nil);
        let mut scope = b.finish();
        DeadCodePass.run(&mut scope).unwrap();
        assert_eq!(scope.instrs().len(), 1);
        assert_eq!(scope.instrs()[0].operation(), Operation::Return);
    }

    #[test]
    fn keeps_calls_but_marks_their_result() {
        let mut b = ScopeBuilder::method("m", "t.rb");
        b.fcall("side_effect", vec![]);
        b.ret(Operand::Nil);
        let mut scope = b.finish();
        DeadCodePass.run(&mut scope).unwrap();
        assert_eq!(scope.instrs().len(), 2);
        assert!(scope.instrs()[0].has_unused_result());
    }

    #[test]
    fn locals_survive_when_closures_exist() {
        let mut b = ScopeBuilder::method("m", "t.rb");
        let a = b.local("a");
        b.copy(a, Operand::Fixnum(1));
        let block = ScopeBuilder::closure(&b, "m_block").finish_arc();
        b.call_with_block(Operand::self_ref(), "each", vec![], Some(Operand::Closure(block)));
        b.ret(Operand::Nil);
        let mut scope = b.finish();
        DeadCodePass.run(&mut scope).unwrap();
        assert_eq!(scope.instrs()[0].operation(), Operation::Copy);
    }

    #[test]
    fn closure_writes_to_outer_locals_survive() {
        let mut b = ScopeBuilder::script("t.rb");
        let r = b.local("r");
        b.copy(r, Operand::Fixnum(0));
        let mut blk = ScopeBuilder::closure(&b, "block");
        let outer = blk.local("r");
        assert!(matches!(&outer, Variable::Local(l) if l.depth == 1));
        blk.copy(outer, Operand::Fixnum(7));
        blk.ret(Operand::Fixnum(0));
        let mut body = blk.finish();
        DeadCodePass.run(&mut body).unwrap();
        assert_eq!(body.instrs()[0].operation(), Operation::Copy);
        assert!(!body.instrs()[0].has_unused_result());
    }
}
