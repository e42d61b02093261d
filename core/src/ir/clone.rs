//! Instruction cloning for scope copies, ensure-block duplication and
//! inlining.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::{
    error::IrError,
    ir::{
        instr::{receive, CheckArgsArrayArityInstr, RaiseArgumentErrorInstr, ReturnInstr},
        Instr, InstrKind, Label, Operand, Scope, ScopeId, ScopeKind, Variable,
    },
};

/// Arguments available to an inlined body.
#[derive(Debug, Clone, PartialEq)]
pub enum InlineArgs {
    /// Positional operands known at the call site.
    Known(Vec<Operand>),
    /// Operand holding the args array, when splats hide the count.
    Array(Operand),
}

/// The call site an inlined body is spliced into.
#[derive(Debug, Clone)]
pub struct InlineSite {
    /// Where the inlined `return` stores its value.
    pub result: Option<Variable>,
    pub receiver: Operand,
    pub args: InlineArgs,
    pub closure: Option<Operand>,
    pub callee_needs_binding: bool,
    pub callee_needs_frame: bool,
}

#[derive(Debug, Clone)]
pub enum CloneMode {
    /// Plain copy into another scope.
    Normal,
    /// Duplicating an ensure body: only labels are refreshed.
    EnsureBlock,
    MethodInline(InlineSite),
    ClosureInline(InlineSite),
}

impl CloneMode {
    pub fn name(&self) -> &'static str {
        match self {
            CloneMode::Normal => "normal clone",
            CloneMode::EnsureBlock => "ensure-block clone",
            CloneMode::MethodInline(_) => "method inlining",
            CloneMode::ClosureInline(_) => "closure inlining",
        }
    }

    fn site(&self) -> Option<&InlineSite> {
        match self {
            CloneMode::MethodInline(site) | CloneMode::ClosureInline(site) => Some(site),
            _ => None,
        }
    }

    pub fn is_inline(&self) -> bool {
        self.site().is_some()
    }
}

/// Renaming state shared by every instruction cloned into one host.
pub struct CloneContext<'a> {
    mode: CloneMode,
    host: &'a mut Scope,
    vars: FxHashMap<Variable, Variable>,
    labels: FxHashMap<Label, Label>,
}

impl<'a> CloneContext<'a> {
    pub fn new(mode: CloneMode, host: &'a mut Scope) -> Self {
        Self {
            mode,
            host,
            vars: FxHashMap::default(),
            labels: FxHashMap::default(),
        }
    }

    pub fn mode(&self) -> &CloneMode {
        &self.mode
    }

    pub fn host(&mut self) -> &mut Scope {
        self.host
    }

    pub fn rename_label(&mut self, label: Label) -> Label {
        if let Some(renamed) = self.labels.get(&label) {
            return *renamed;
        }
        let fresh = self.host.new_label("cl");
        self.labels.insert(label, fresh);
        fresh
    }

    pub fn rename_var(&mut self, var: &Variable) -> Result<Variable, IrError> {
        if let Some(renamed) = self.vars.get(var) {
            return Ok(renamed.clone());
        }
        let renamed = match (var, &self.mode) {
            (Variable::SelfRef, _) => return Ok(Variable::SelfRef),
            // the duplicate runs in the same scope and reads the same registers
            (_, CloneMode::EnsureBlock) => return Ok(var.clone()),
            (Variable::Temp(_), _) => self.host.new_temp(),
            (Variable::Local(_), CloneMode::Normal) => return Ok(var.clone()),
            (Variable::Local(l), CloneMode::MethodInline(_)) => {
                if l.depth > 0 {
                    return Err(IrError::UnsupportedOperand {
                        operand: var.to_string(),
                        mode: self.mode.name(),
                    });
                }
                self.host.new_local(&l.name)
            }
            (Variable::Local(l), CloneMode::ClosureInline(_)) => {
                if l.depth > 0 {
                    // one level closer now that the body lives in its parent
                    return Ok(Variable::local(l.name.clone(), l.depth - 1, l.offset));
                }
                self.host.new_local(&l.name)
            }
        };
        self.vars.insert(var.clone(), renamed.clone());
        Ok(renamed)
    }

    pub fn rename_operand(&mut self, op: &Operand) -> Result<Operand, IrError> {
        Ok(match op {
            Operand::Var(Variable::SelfRef) => match &self.mode {
                CloneMode::MethodInline(site) => site.receiver.clone(),
                _ => op.clone(),
            },
            Operand::Var(v) => Operand::Var(self.rename_var(v)?),
            Operand::Label(l) => Operand::Label(self.rename_label(*l)),
            Operand::Array(items) => Operand::Array(
                items
                    .iter()
                    .map(|o| self.rename_operand(o))
                    .collect::<Result<Arc<[Operand]>, IrError>>()?,
            ),
            Operand::Hash(pairs) => Operand::Hash(
                pairs
                    .iter()
                    .map(|(k, v)| Ok((self.rename_operand(k)?, self.rename_operand(v)?)))
                    .collect::<Result<Arc<[(Operand, Operand)]>, IrError>>()?,
            ),
            Operand::Splat(inner) => Operand::splat(self.rename_operand(inner)?),
            Operand::Closure(_) if self.mode.is_inline() => {
                return Err(IrError::UnsupportedOperand {
                    operand: op.to_string(),
                    mode: self.mode.name(),
                })
            }
            _ => op.clone(),
        })
    }

    fn host_is_method(&self, id: ScopeId) -> bool {
        self.host.kind() == ScopeKind::Method && self.host.id() == id
    }
}

impl Instr {
    /// Copy of this instruction for `ctx`'s host, or `None` when the
    /// instruction has no counterpart there.
    pub fn clone_for_inlining(&self, ctx: &mut CloneContext<'_>) -> Result<Option<Instr>, IrError> {
        let op = self.operation();
        let inline = ctx.mode().site().cloned();
        let Some(site) = inline else {
            return self.renamed(ctx).map(Some);
        };
        let is_method = matches!(ctx.mode(), CloneMode::MethodInline(_));

        let replaced = match &self.kind {
            InstrKind::ThreadPoll => return Ok(None),
            InstrKind::PushBinding | InstrKind::PopBinding if !site.callee_needs_binding => return Ok(None),
            InstrKind::PushFrame | InstrKind::PopFrame if !site.callee_needs_frame => return Ok(None),
            InstrKind::CheckArity(check) => {
                if check.receives_keywords {
                    return Err(IrError::unsupported(op, "keyword arguments at an inlined call"));
                }
                match &site.args {
                    InlineArgs::Known(args) if check.accepts(args.len()) => return Ok(None),
                    InlineArgs::Known(args) => InstrKind::RaiseArgumentError(RaiseArgumentErrorInstr {
                        required: check.required,
                        opt: check.opt,
                        rest: check.rest,
                        given: args.len() as u32,
                    }),
                    InlineArgs::Array(array) => InstrKind::CheckArgsArrayArity(CheckArgsArrayArityInstr {
                        array: ctx.rename_operand(array)?,
                        required: check.required,
                        opt: check.opt,
                        rest: check.rest,
                    }),
                }
            }
            k if receive::is_narrowable(op) => {
                let result = match self.result() {
                    Some(r) => ctx.rename_var(r)?,
                    None => return Err(IrError::internal(format!("{} without result", op))),
                };
                receive::narrow(k, result, &site.args)?
            }
            InstrKind::ReceiveSelf(r) => {
                let source = if is_method { site.receiver.clone() } else { Operand::self_ref() };
                copy_kind(ctx.rename_var(r)?, source)
            }
            InstrKind::LoadImplicitClosure(r) => {
                let source = inlined_block(&site, is_method, op, ctx)?;
                copy_kind(ctx.rename_var(r)?, source)
            }
            InstrKind::LoadFrameClosure(r) if is_method => {
                let source = inlined_block(&site, is_method, op, ctx)?;
                copy_kind(ctx.rename_var(r)?, source)
            }
            InstrKind::Return(ret) => {
                let value = ctx.rename_operand(&ret.value)?;
                match &site.result {
                    Some(result) => copy_kind(result.clone(), value),
                    None => InstrKind::Nop,
                }
            }
            InstrKind::Break(brk) if !is_method && ctx.host.id() == brk.scope => {
                let value = ctx.rename_operand(&brk.value)?;
                match &site.result {
                    Some(result) => copy_kind(result.clone(), value),
                    None => InstrKind::Nop,
                }
            }
            InstrKind::NonlocalReturn(nl) if !is_method && ctx.host_is_method(nl.method) => {
                InstrKind::Return(ReturnInstr {
                    value: ctx.rename_operand(&nl.value)?,
                })
            }
            InstrKind::ZSuper(_) | InstrKind::UnresolvedSuper(_) => {
                return Err(IrError::unsupported(op, "inlining of implicit super"));
            }
            _ => return self.renamed(ctx).map(Some),
        };
        Ok(Some(Instr::new(replaced)))
    }

    // Generic clone: every variable, operand and label goes through `ctx`.
    fn renamed(&self, ctx: &mut CloneContext<'_>) -> Result<Instr, IrError> {
        let mut copy = Instr::new(self.kind.clone());
        for op in copy.operands_mut() {
            *op = ctx.rename_operand(op)?;
        }
        if let Some(result) = copy.result_mut() {
            *result = ctx.rename_var(result)?;
        }
        for label in copy.labels_mut() {
            *label = ctx.rename_label(*label);
        }
        copy.refresh_call();
        Ok(copy)
    }
}

fn copy_kind(result: Variable, source: Operand) -> InstrKind {
    InstrKind::Copy(crate::ir::instr::CopyInstr { result, source })
}

fn inlined_block(
    site: &InlineSite,
    is_method: bool,
    op: crate::ir::Operation,
    ctx: &mut CloneContext<'_>,
) -> Result<Operand, IrError> {
    if !is_method {
        // a closure's own block parameter is not known when it is inlined
        return Ok(Operand::NullBlock);
    }
    match &site.closure {
        None => Ok(Operand::NullBlock),
        Some(Operand::Closure(_)) => Err(IrError::unsupported(op, "inlining a method with a literal block")),
        Some(other) => ctx.rename_operand(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        instr::{
            BreakInstr, CallBase, CallType, CheckArityInstr, NonlocalReturnInstr, ReceiveOptArgInstr,
            ReceivePreReqdArgInstr,
        },
        Operation, ScopeKind,
    };

    fn site(args: InlineArgs) -> InlineSite {
        InlineSite {
            result: Some(Variable::Temp(99)),
            receiver: Operand::Var(Variable::Temp(50)),
            args,
            closure: None,
            callee_needs_binding: false,
            callee_needs_frame: false,
        }
    }

    fn host() -> Scope {
        Scope::new(ScopeKind::Method, "caller", "t.rb", 1)
    }

    #[test]
    fn normal_clone_renames_temps_and_labels_only() {
        let mut host = host();
        let l = Label::from_index(7);
        let instr = Instr::beq(Operand::Var(Variable::Temp(0)), Operand::Var(Variable::local("a", 0, 0)), l);
        let mut ctx = CloneContext::new(CloneMode::Normal, &mut host);
        let cloned = instr.clone_for_inlining(&mut ctx).unwrap().unwrap();
        let ops = cloned.operands();
        assert_eq!(ops[0], &Operand::Var(Variable::Temp(0)));
        assert_eq!(ops[1], &Operand::Var(Variable::local("a", 0, 0)));
        assert_ne!(cloned.referenced_labels(), vec![l]);
    }

    #[test]
    fn same_variable_renames_consistently() {
        let mut host = host();
        host.new_temp();
        let mut ctx = CloneContext::new(CloneMode::Normal, &mut host);
        let a = ctx.rename_var(&Variable::Temp(3)).unwrap();
        let b = ctx.rename_var(&Variable::Temp(3)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, Variable::Temp(1));
    }

    #[test]
    fn method_inline_substitutes_self_and_return() {
        let mut host = host();
        let mut ctx = CloneContext::new(CloneMode::MethodInline(site(InlineArgs::Known(vec![]))), &mut host);
        let call = Instr::call(CallBase::new(
            CallType::Functional,
            "helper",
            Operand::self_ref(),
            vec![],
            None,
            Some(Variable::Temp(0)),
        ));
        let cloned = call.clone_for_inlining(&mut ctx).unwrap().unwrap();
        assert_eq!(cloned.call_base().unwrap().receiver, Operand::Var(Variable::Temp(50)));

        let ret = Instr::ret(Operand::Fixnum(4)).clone_for_inlining(&mut ctx).unwrap().unwrap();
        assert_eq!(ret, Instr::copy(Variable::Temp(99), Operand::Fixnum(4)));
    }

    #[test]
    fn arity_check_is_resolved_statically() {
        let check = Instr::new(InstrKind::CheckArity(CheckArityInstr {
            required: 1,
            opt: 0,
            rest: false,
            receives_keywords: false,
            kwrest: false,
        }));
        let mut host1 = host();
        let mut ok = CloneContext::new(
            CloneMode::MethodInline(site(InlineArgs::Known(vec![Operand::Fixnum(1)]))),
            &mut host1,
        );
        assert_eq!(check.clone_for_inlining(&mut ok).unwrap(), None);

        let mut host2 = host();
        let mut bad = CloneContext::new(CloneMode::MethodInline(site(InlineArgs::Known(vec![]))), &mut host2);
        let raised = check.clone_for_inlining(&mut bad).unwrap().unwrap();
        assert_eq!(raised.operation(), Operation::RaiseArgumentError);

        let mut host3 = host();
        let mut arr = CloneContext::new(
            CloneMode::MethodInline(site(InlineArgs::Array(Operand::Var(Variable::Temp(7))))),
            &mut host3,
        );
        let dynamic = check.clone_for_inlining(&mut arr).unwrap().unwrap();
        assert_eq!(dynamic.operation(), Operation::CheckArgsArrayArity);
    }

    #[test]
    fn receives_narrow_to_copies() {
        let mut host = host();
        let args = InlineArgs::Known(vec![Operand::Fixnum(10)]);
        let mut ctx = CloneContext::new(CloneMode::MethodInline(site(args)), &mut host);
        let pre = Instr::new(InstrKind::ReceivePreReqdArg(ReceivePreReqdArgInstr {
            result: Variable::local("a", 0, 0),
            index: 0,
        }));
        let cloned = pre.clone_for_inlining(&mut ctx).unwrap().unwrap();
        let InstrKind::Copy(copy) = &cloned.kind else {
            panic!("expected copy, got {}", cloned.operation());
        };
        assert_eq!(copy.source, Operand::Fixnum(10));
        // fresh host local, not the callee's slot
        assert_ne!(copy.result, Variable::local("a", 0, 0));

        let opt = Instr::new(InstrKind::ReceiveOptArg(ReceiveOptArgInstr {
            result: Variable::local("b", 0, 1),
            index: 0,
            required: 1,
            pre: 1,
        }));
        let cloned = opt.clone_for_inlining(&mut ctx).unwrap().unwrap();
        assert_eq!(cloned.operands(), vec![&Operand::Undefined]);
    }

    #[test]
    fn closure_inline_breaks_into_host() {
        let mut host = host();
        let host_id = host.id();
        let mut ctx = CloneContext::new(CloneMode::ClosureInline(site(InlineArgs::Known(vec![]))), &mut host);
        let brk = Instr::new(InstrKind::Break(BreakInstr {
            value: Operand::Var(Variable::local("x", 1, 0)),
            scope: host_id,
            scope_name: "caller".into(),
        }));
        let cloned = brk.clone_for_inlining(&mut ctx).unwrap().unwrap();
        assert_eq!(cloned, Instr::copy(Variable::Temp(99), Operand::Var(Variable::local("x", 0, 0))));

        // same name, different scope
        let namesake = Scope::new(ScopeKind::Method, "caller", "other.rb", 1);
        let elsewhere = Instr::new(InstrKind::Break(BreakInstr {
            value: Operand::Nil,
            scope: namesake.id(),
            scope_name: "caller".into(),
        }));
        let kept = elsewhere.clone_for_inlining(&mut ctx).unwrap().unwrap();
        assert_eq!(kept.operation(), Operation::Break);
    }

    #[test]
    fn nonlocal_returns_match_the_host_by_identity() {
        let mut host = host();
        let host_id = host.id();
        let namesake = Scope::new(ScopeKind::Method, "caller", "other.rb", 1);
        let mut ctx = CloneContext::new(CloneMode::ClosureInline(site(InlineArgs::Known(vec![]))), &mut host);
        let ret = |method| {
            Instr::new(InstrKind::NonlocalReturn(NonlocalReturnInstr {
                value: Operand::Fixnum(1),
                method,
                method_name: "caller".into(),
            }))
        };
        let own = ret(host_id).clone_for_inlining(&mut ctx).unwrap().unwrap();
        assert_eq!(own.operation(), Operation::Return);
        let other = ret(namesake.id()).clone_for_inlining(&mut ctx).unwrap().unwrap();
        assert_eq!(other.operation(), Operation::NonlocalReturn);
    }

    #[test]
    fn inlining_rejects_literal_closures() {
        let body = Arc::new(Scope::new(ScopeKind::Closure, "blk", "t.rb", 1));
        let mut host = host();
        let mut ctx = CloneContext::new(CloneMode::MethodInline(site(InlineArgs::Known(vec![]))), &mut host);
        let instr = Instr::copy(Variable::Temp(1), Operand::Closure(body));
        assert!(matches!(
            instr.clone_for_inlining(&mut ctx),
            Err(IrError::UnsupportedOperand { .. })
        ));
    }

    #[test]
    fn frame_and_binding_markers_per_mode() {
        let markers = [
            Instr::new(InstrKind::PushFrame),
            Instr::new(InstrKind::PopFrame),
            Instr::new(InstrKind::PushBinding),
            Instr::new(InstrKind::PopBinding),
        ];
        let survivors = |mode: CloneMode| {
            let mut host = host();
            let mut ctx = CloneContext::new(mode, &mut host);
            markers
                .iter()
                .filter_map(|i| i.clone_for_inlining(&mut ctx).unwrap())
                .map(|i| i.operation())
                .collect::<Vec<_>>()
        };

        // plain copies keep every marker
        assert_eq!(survivors(CloneMode::Normal).len(), 4);
        assert_eq!(survivors(CloneMode::EnsureBlock).len(), 4);

        let plain = site(InlineArgs::Known(vec![]));
        assert!(survivors(CloneMode::MethodInline(plain.clone())).is_empty());
        assert!(survivors(CloneMode::ClosureInline(plain.clone())).is_empty());

        let needs_frame = InlineSite {
            callee_needs_frame: true,
            ..plain.clone()
        };
        assert_eq!(
            survivors(CloneMode::MethodInline(needs_frame)),
            vec![Operation::PushFrame, Operation::PopFrame]
        );
        let needs_binding = InlineSite {
            callee_needs_binding: true,
            ..plain
        };
        assert_eq!(
            survivors(CloneMode::ClosureInline(needs_binding)),
            vec![Operation::PushBinding, Operation::PopBinding]
        );
    }

    #[test]
    fn implicit_block_per_inline_mode() {
        let load = Instr::new(InstrKind::LoadImplicitClosure(Variable::Temp(4)));
        let with_block = InlineSite {
            closure: Some(Operand::Var(Variable::Temp(60))),
            ..site(InlineArgs::Known(vec![]))
        };

        let mut host1 = host();
        let mut ctx = CloneContext::new(CloneMode::MethodInline(with_block.clone()), &mut host1);
        let cloned = load.clone_for_inlining(&mut ctx).unwrap().unwrap();
        assert_eq!(cloned.operands(), vec![&Operand::Var(Variable::Temp(60))]);

        // an inlined closure body sees no block of its own, even when the
        // call site passed one
        let mut host2 = host();
        let mut ctx = CloneContext::new(CloneMode::ClosureInline(with_block), &mut host2);
        let cloned = load.clone_for_inlining(&mut ctx).unwrap().unwrap();
        assert_eq!(cloned.operands(), vec![&Operand::NullBlock]);

        let mut host3 = host();
        let mut ctx = CloneContext::new(CloneMode::MethodInline(site(InlineArgs::Known(vec![]))), &mut host3);
        let cloned = load.clone_for_inlining(&mut ctx).unwrap().unwrap();
        assert_eq!(cloned.operands(), vec![&Operand::NullBlock]);
    }

    #[test]
    fn normal_clones_agree_modulo_renaming() {
        let exit = Label::from_index(7);
        let source = vec![
            Instr::copy(Variable::Temp(3), Operand::Var(Variable::Temp(8))),
            Instr::call(CallBase::new(
                CallType::Normal,
                "foo",
                Operand::Var(Variable::Temp(3)),
                vec![Operand::Var(Variable::Temp(8)), Operand::Var(Variable::local("a", 0, 0))],
                None,
                Some(Variable::Temp(5)),
            )),
            Instr::jump(exit),
            Instr::label(exit),
        ];
        let clone_all = |instrs: &[Instr]| {
            let mut host = host();
            let mut ctx = CloneContext::new(CloneMode::Normal, &mut host);
            instrs
                .iter()
                .map(|i| i.clone_for_inlining(&mut ctx).unwrap().unwrap())
                .collect::<Vec<_>>()
        };

        let first = clone_all(&source);
        assert_eq!(clone_all(&source), first);
        // cloning the copy again only renames, so the shape is stable
        assert_eq!(clone_all(&first), first);
        assert_eq!(first[0].result(), first[1].operands().first().and_then(|o| match o {
            Operand::Var(v) => Some(v),
            _ => None,
        }));
    }
}
