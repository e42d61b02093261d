//! Method and closure inlining, plus ensure-body duplication.

use std::{ops::Range, sync::Arc};

use anyhow::{bail, ensure, Context, Result};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::ir::{
    instr::{CallType, GuardInstr, GuardType},
    CloneContext, CloneMode, InlineArgs, InlineSite, Instr, InstrKind, Label, Operand, Operation, Scope, ScopeFlags,
    ScopeKind,
};

use super::Pass;

// Callee traits that cannot survive losing their own activation.
const NOT_INLINABLE: ScopeFlags = ScopeFlags::REQUIRES_FRAME
    .union(ScopeFlags::BINDING_HAS_ESCAPED)
    .union(ScopeFlags::USES_ZSUPER)
    .union(ScopeFlags::RECEIVES_KEYWORD_ARGS);

/// Inlines small methods into functional self-calls that follow their
/// definition in the same scope.
pub struct InlinePass {
    threshold: usize,
}

impl InlinePass {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    fn eligible(&self, name: &str, callee: &Scope) -> bool {
        let size = callee.instrs().iter().filter(|i| !i.is_dead()).count();
        size <= self.threshold
            && callee.nested_scopes().is_empty()
            && !callee.flags().intersects(NOT_INLINABLE)
            && !callee
                .instrs()
                .iter()
                .filter_map(Instr::call_base)
                .any(|c| c.name.as_ref() == name)
    }
}

impl Pass for InlinePass {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn run(&mut self, scope: &mut Scope) -> Result<()> {
        let mut defs: FxHashMap<Arc<str>, Option<(usize, Arc<Scope>)>> = FxHashMap::default();
        for (index, instr) in scope.instrs().iter().enumerate() {
            if let InstrKind::DefineInstanceMethod(def) = &instr.kind {
                defs.entry(def.body.name().clone())
                    .and_modify(|slot| *slot = None)
                    .or_insert_with(|| Some((index, def.body.clone())));
            }
        }
        if defs.is_empty() {
            return Ok(());
        }

        let mut sites = Vec::new();
        for (index, instr) in scope.instrs().iter().enumerate() {
            let Some(base) = instr.call_base() else {
                continue;
            };
            if base.call_type != CallType::Functional
                || base.receiver != Operand::self_ref()
                || base.has_splats()
                || !matches!(base.closure, None | Some(Operand::NullBlock))
                || !matches!(instr.operation(), Operation::Call | Operation::NoResultCall)
            {
                continue;
            }
            let Some(Some((def_index, body))) = defs.get(&base.name) else {
                continue;
            };
            if *def_index < index && self.eligible(&base.name, body) {
                sites.push((index, body.clone()));
            }
        }

        // back to front so earlier indices stay valid
        for (index, body) in sites.into_iter().rev() {
            inline_method(scope, index, &body, None)
                .with_context(|| format!("inlining {} into {}", body.name(), scope.name()))?;
            debug!(target: "irx::passes", host = %scope.name(), callee = %body.name(), "inlined method");
        }
        Ok(())
    }
}

/// Replaces the call at `call_index` with `callee`'s body.
///
/// With a guard, the body only runs when the receiver has the expected
/// shape; otherwise control resumes at the original call.
pub fn inline_method(host: &mut Scope, call_index: usize, callee: &Scope, guard: Option<GuardType>) -> Result<()> {
    let call = host
        .instrs()
        .get(call_index)
        .cloned()
        .with_context(|| format!("no instruction at {}", call_index))?;
    let Some(base) = call.call_base().cloned() else {
        bail!("{} at {} is not a call", call.operation(), call_index);
    };
    ensure!(callee.kind() == ScopeKind::Method, "{} is not a method body", callee.name());

    let mut prologue = Vec::new();
    let receiver = if base.receiver.is_composite() {
        let tmp = host.new_temp();
        prologue.push(Instr::copy(tmp.clone(), base.receiver.clone()));
        Operand::Var(tmp)
    } else {
        base.receiver.clone()
    };
    let args = if base.has_splats() {
        let tmp = host.new_temp();
        prologue.push(Instr::copy(tmp.clone(), Operand::array(base.args.clone())));
        InlineArgs::Array(Operand::Var(tmp))
    } else {
        InlineArgs::Known(base.args.clone())
    };
    let flags = callee.flags();
    let site = InlineSite {
        result: base.result.clone(),
        receiver: receiver.clone(),
        args,
        closure: base.closure.clone(),
        callee_needs_binding: flags.contains(ScopeFlags::BINDING_HAS_ESCAPED),
        callee_needs_frame: flags.contains(ScopeFlags::REQUIRES_FRAME),
    };

    let exit = host.new_label("inline_exit");
    let slow = guard.map(|_| host.new_label("inline_slow"));
    let body = {
        let mut ctx = CloneContext::new(CloneMode::MethodInline(site), host);
        clone_body(callee, &mut ctx, exit)?
    };

    let mut spliced = prologue;
    match (guard, slow) {
        (Some(expected), Some(slow)) => {
            spliced.push(Instr::new(InstrKind::Guard(GuardInstr {
                value: receiver,
                expected,
                resume: slow,
            })));
            spliced.extend(body);
            spliced.push(Instr::jump(exit));
            spliced.push(Instr::label(slow));
            spliced.push(call);
        }
        _ => spliced.extend(body),
    }
    spliced.push(Instr::label(exit));
    host.instrs_mut().splice(call_index..=call_index, spliced);
    Ok(())
}

/// Replaces the `yield` at `yield_index` with `closure`'s body.
pub fn inline_closure(host: &mut Scope, yield_index: usize, closure: &Scope) -> Result<()> {
    let Some(InstrKind::Yield(y)) = host.instrs().get(yield_index).map(|i| i.kind.clone()) else {
        bail!("no yield at {}", yield_index);
    };
    ensure!(closure.kind() == ScopeKind::Closure, "{} is not a closure body", closure.name());
    let args = match (&y.arg, y.unwrap) {
        (Operand::Undefined, _) => InlineArgs::Known(Vec::new()),
        (arg, false) => InlineArgs::Known(vec![arg.clone()]),
        (arg, true) => InlineArgs::Array(arg.clone()),
    };
    let site = InlineSite {
        result: y.result.clone(),
        receiver: Operand::self_ref(),
        args,
        closure: None,
        callee_needs_binding: false,
        callee_needs_frame: false,
    };
    let exit = host.new_label("yield_exit");
    let mut body = {
        let mut ctx = CloneContext::new(CloneMode::ClosureInline(site), host);
        clone_body(closure, &mut ctx, exit)?
    };
    body.push(Instr::label(exit));
    host.instrs_mut().splice(yield_index..=yield_index, body);
    Ok(())
}

/// Copy of `range` with fresh labels, for placing an ensure body on a
/// second exit path.
pub fn duplicate_ensure_block(scope: &mut Scope, range: Range<usize>) -> Result<Vec<Instr>> {
    let source = scope
        .instrs()
        .get(range.clone())
        .with_context(|| format!("ensure range {:?} outside {}", range, scope.name()))?
        .to_vec();
    let mut ctx = CloneContext::new(CloneMode::EnsureBlock, scope);
    let mut out = Vec::with_capacity(source.len());
    for instr in source.iter().filter(|i| !i.is_dead()) {
        if let Some(copy) = instr.clone_for_inlining(&mut ctx)? {
            out.push(copy);
        }
    }
    Ok(out)
}

// Clones every live instruction; exits that used to leave the body jump
// to `exit` instead.
fn clone_body(body: &Scope, ctx: &mut CloneContext<'_>, exit: Label) -> Result<Vec<Instr>> {
    let mut out = Vec::with_capacity(body.instrs().len() + 1);
    for instr in body.instrs().iter().filter(|i| !i.is_dead()) {
        let Some(copy) = instr.clone_for_inlining(ctx)? else {
            continue;
        };
        let leaves = match instr.operation() {
            Operation::Return => true,
            // breaks that stayed breaks still leave through the unwinder
            Operation::Break => copy.operation() != Operation::Break,
            _ => false,
        };
        out.push(copy);
        if leaves {
            out.push(Instr::jump(exit));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        builder::{Params, ScopeBuilder},
        instr::{BreakInstr, DefineInstanceMethodInstr, YieldInstr},
        Variable,
    };

    fn double() -> Arc<Scope> {
        let mut m = ScopeBuilder::method("double", "t.rb");
        m.receive(&Params::new().pre(&["x"]));
        let x = m.local("x");
        let r = m.call(Operand::Var(x.clone()), "+", vec![Operand::Var(x)]);
        m.ret(Operand::Var(r));
        m.finish_arc()
    }

    fn script_calling(body: Arc<Scope>, args: Vec<Operand>) -> Scope {
        let mut s = ScopeBuilder::script("t.rb");
        s.emit(InstrKind::DefineInstanceMethod(DefineInstanceMethodInstr { body }));
        let r = s.fcall("double", args);
        s.ret(Operand::Var(r));
        s.finish()
    }

    #[test]
    fn inlines_small_self_calls() {
        let mut scope = script_calling(double(), vec![Operand::Fixnum(21)]);
        InlinePass::new(24).run(&mut scope).unwrap();
        let ops: Vec<Operation> = scope.instrs().iter().map(Instr::operation).collect();
        // the callee's own `x + x` is all that remains of the call
        assert_eq!(
            ops,
            vec![
                Operation::DefineInstanceMethod,
                Operation::Copy,
                Operation::Call,
                Operation::Copy,
                Operation::Jump,
                Operation::Label,
                Operation::Return,
            ]
        );
        assert!(scope.linearize().is_ok());
    }

    #[test]
    fn threshold_blocks_large_callees() {
        let mut scope = script_calling(double(), vec![Operand::Fixnum(21)]);
        let before = scope.instrs().len();
        InlinePass::new(1).run(&mut scope).unwrap();
        assert_eq!(scope.instrs().len(), before);
    }

    #[test]
    fn wrong_arity_becomes_a_static_error() {
        let mut scope = script_calling(double(), vec![]);
        InlinePass::new(24).run(&mut scope).unwrap();
        assert!(scope
            .instrs()
            .iter()
            .any(|i| i.operation() == Operation::RaiseArgumentError));
    }

    #[test]
    fn guarded_inline_keeps_the_slow_call() {
        let callee = double();
        let mut host = script_calling(callee.clone(), vec![Operand::Fixnum(2)]);
        let index = host.instrs().iter().position(|i| i.operation() == Operation::Call).unwrap();
        inline_method(&mut host, index, &callee, Some(GuardType::Fixnum)).unwrap();
        let ops: Vec<Operation> = host.instrs().iter().map(Instr::operation).collect();
        let guard = ops.iter().position(|o| *o == Operation::Guard).unwrap();
        let slow_call = ops.iter().rposition(|o| *o == Operation::Call).unwrap();
        assert!(guard < slow_call);
        assert!(host.linearize().is_ok());
    }

    #[test]
    fn splatted_args_go_through_an_array() {
        let callee = double();
        let mut s = ScopeBuilder::script("t.rb");
        let list = s.temp();
        s.copy(list.clone(), Operand::array(vec![Operand::Fixnum(4)]));
        let r = s.fcall("double", vec![Operand::splat(Operand::Var(list))]);
        s.ret(Operand::Var(r));
        let mut host = s.finish();
        inline_method(&mut host, 1, &callee, None).unwrap();
        let ops: Vec<Operation> = host.instrs().iter().map(Instr::operation).collect();
        assert!(ops.contains(&Operation::CheckArgsArrayArity));
        assert!(ops.contains(&Operation::MasgnReqd));
    }

    #[test]
    fn closure_inline_turns_host_breaks_into_exits() {
        let mut host = Scope::new(ScopeKind::Method, "each_twice", "t.rb", 1);
        let result = host.new_temp();
        host.push(InstrKind::Yield(YieldInstr {
            result: Some(result.clone()),
            block: Operand::Var(Variable::Temp(0)),
            arg: Operand::Fixnum(5),
            unwrap: false,
        }));
        host.push(Instr::ret(Operand::Var(result)));

        let mut closure = Scope::new(ScopeKind::Closure, "blk", "t.rb", 1);
        closure.push(InstrKind::Break(BreakInstr {
            value: Operand::Fixnum(1),
            scope: host.id(),
            scope_name: "each_twice".into(),
        }));
        inline_closure(&mut host, 0, &closure).unwrap();
        let ops: Vec<Operation> = host.instrs().iter().map(Instr::operation).collect();
        assert_eq!(
            ops,
            vec![Operation::Copy, Operation::Jump, Operation::Label, Operation::Return]
        );
    }

    #[test]
    fn ensure_duplicates_get_fresh_labels() {
        let mut b = ScopeBuilder::method("m", "t.rb");
        let l = b.label("ens");
        b.place(l);
        b.fcall("cleanup", vec![]);
        let mut scope = b.finish();
        let copy = duplicate_ensure_block(&mut scope, 0..2).unwrap();
        assert_eq!(copy.len(), 2);
        assert_ne!(copy[0], scope.instrs()[0]);
        assert_eq!(copy[1].call_base().unwrap().name.as_ref(), "cleanup");
    }

    #[test]
    fn ensure_duplicates_read_registers_set_before_the_region() {
        let mut b = ScopeBuilder::method("m", "t.rb");
        let saved = b.temp();
        b.copy(saved.clone(), Operand::Fixnum(5));
        let l = b.label("ens");
        b.place(l);
        let out = b.fcall("puts", vec![Operand::Var(saved.clone())]);
        let mut scope = b.finish();
        let temps = scope.temp_count();

        let copy = duplicate_ensure_block(&mut scope, 1..3).unwrap();
        let call = copy[1].call_base().unwrap();
        assert_eq!(call.args, vec![Operand::Var(saved)]);
        assert_eq!(call.result.as_ref(), Some(&out));
        assert_eq!(scope.temp_count(), temps);
    }
}
