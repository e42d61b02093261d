use std::sync::Arc;

use anyhow::{Context, Result, bail, ensure};

use crate::ir::{
    instr::*, Instr, InstrKind, Label, LabelTable, Operand, Operation, Scope, ScopeId, ScopeKind, Variable,
};

use super::{encoder::*, wire::*};

/// Reads one scope written by the encoder. Every scope, nested ones
/// included, gets a fresh identity.
pub(super) struct ScopeDecoder<'a> {
    bytes: &'a [u8],
    cursor: usize,
    label_count: u32,
    // fresh ids of the scopes being decoded, outermost first
    enclosing: Vec<ScopeId>,
}

/// Operands of one instruction, consumed in `operands()` order.
struct Operands {
    op: Operation,
    items: std::vec::IntoIter<Operand>,
}

impl Operands {
    fn next(&mut self) -> Result<Operand> {
        self.items
            .next()
            .with_context(|| format!("{}: missing operand", self.op))
    }

    fn take(&mut self, n: usize) -> Result<Vec<Operand>> {
        (0..n).map(|_| self.next()).collect()
    }

    fn finish(mut self) -> Result<()> {
        ensure!(self.items.next().is_none(), "{}: too many operands", self.op);
        Ok(())
    }
}

impl<'a> ScopeDecoder<'a> {
    pub(super) fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            cursor: 0,
            label_count: 0,
            enclosing: Vec::new(),
        }
    }

    pub(super) fn position(&self) -> usize {
        self.cursor
    }

    fn u8(&mut self) -> Result<u8> {
        read_u8(self.bytes, &mut self.cursor)
    }

    fn bool(&mut self) -> Result<bool> {
        read_bool(self.bytes, &mut self.cursor)
    }

    fn u32(&mut self) -> Result<u32> {
        read_u32(self.bytes, &mut self.cursor)
    }

    fn len(&mut self) -> Result<usize> {
        read_len(self.bytes, &mut self.cursor)
    }

    fn string(&mut self) -> Result<Arc<str>> {
        read_string(self.bytes, &mut self.cursor)
    }

    fn variable(&mut self) -> Result<Variable> {
        read_variable(self.bytes, &mut self.cursor)
    }

    // Targets outside the module's scopes get an id nothing else carries.
    fn scope_ref(&mut self) -> Result<ScopeId> {
        let distance = self.u32()?;
        if distance == NO_SCOPE {
            return Ok(ScopeId::fresh());
        }
        let index = self
            .enclosing
            .len()
            .checked_sub(distance as usize + 1)
            .with_context(|| format!("scope reference {} outside {} enclosing scopes", distance, self.enclosing.len()))?;
        Ok(self.enclosing[index])
    }

    fn label(&mut self) -> Result<Label> {
        let label = read_label(self.bytes, &mut self.cursor)?;
        ensure!(
            label.index() < self.label_count,
            "label L{} outside the scope's {} labels",
            label.index(),
            self.label_count
        );
        Ok(label)
    }

    pub(super) fn scope(&mut self) -> Result<Scope> {
        let tag = self.u8()?;
        let kind = ScopeKind::from_u8(tag).with_context(|| format!("unknown scope kind {}", tag))?;
        let name = self.string()?;
        let file = self.string()?;
        let line = self.u32()?;
        let id = ScopeId::fresh();
        self.enclosing.push(id);
        let mut scope = Scope::with_id(id, kind, name, file, line);
        scope.set_signature(read_signature(self.bytes, &mut self.cursor)?);

        let mut labels = LabelTable::new();
        for _ in 0..self.len()? {
            labels.push_named(self.string()?);
        }
        self.label_count = labels.len() as u32;
        scope.set_labels(labels);
        scope.set_temp_count(self.u32()?);

        let count = self.len()?;
        let mut locals = Vec::with_capacity(count);
        for _ in 0..count {
            locals.push(self.string()?);
        }
        scope.set_locals(locals);

        let count = self.len()?;
        for index in 0..count {
            let instr = self
                .instr()
                .with_context(|| format!("in scope '{}' at instruction {}", scope.name(), index))?;
            scope.push(instr);
        }
        Ok(scope)
    }

    // Nested bodies decode with their own cursor and label table.
    fn nested(&mut self) -> Result<Arc<Scope>> {
        let len = self.len()?;
        let end = self.cursor + len;
        let mut inner = ScopeDecoder::new(&self.bytes[self.cursor..end]);
        inner.enclosing = self.enclosing.clone();
        let scope = inner.scope()?;
        ensure!(inner.position() == len, "nested scope '{}' has trailing bytes", scope.name());
        self.cursor = end;
        Ok(Arc::new(scope))
    }

    fn operand(&mut self) -> Result<Operand> {
        Ok(match self.u8()? {
            OP_NIL => Operand::Nil,
            OP_BOOL => Operand::Boolean(self.bool()?),
            OP_UNDEFINED => Operand::Undefined,
            OP_FIXNUM => Operand::Fixnum(read_i64(self.bytes, &mut self.cursor)?),
            OP_FLOAT => Operand::Float(read_f64(self.bytes, &mut self.cursor)?),
            OP_STR => Operand::Str(self.string()?),
            OP_SYMBOL => Operand::Symbol(self.string()?),
            OP_ARRAY => {
                let count = self.len()?;
                let items = (0..count).map(|_| self.operand()).collect::<Result<Vec<_>>>()?;
                Operand::Array(Arc::from(items))
            }
            OP_HASH => {
                let count = self.len()?;
                let mut pairs = Vec::with_capacity(count);
                for _ in 0..count {
                    let key = self.operand()?;
                    let value = self.operand()?;
                    pairs.push((key, value));
                }
                Operand::Hash(Arc::from(pairs))
            }
            OP_SPLAT => Operand::Splat(Arc::new(self.operand()?)),
            OP_LABEL => Operand::Label(self.label()?),
            OP_VAR => Operand::Var(self.variable()?),
            OP_CLOSURE => Operand::Closure(self.nested()?),
            OP_SCOPE_MODULE => Operand::ScopeModule,
            OP_NULL_BLOCK => Operand::NullBlock,
            other => bail!("unknown operand tag {}", other),
        })
    }

    fn instr(&mut self) -> Result<Instr> {
        let tag = self.u8()?;
        let op = Operation::from_u8(tag).with_context(|| format!("unknown operation tag {}", tag))?;
        let flags = self.u8()?;
        let result = if self.bool()? { Some(self.variable()?) } else { None };
        let count = self.len()?;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(self.operand()?);
        }
        let mut operands = Operands {
            op,
            items: items.into_iter(),
        };
        let kind = self.kind(op, result, &mut operands)?;
        operands.finish()?;
        validate(&kind)?;

        let mut instr = Instr::new(kind);
        if flags & INSTR_DEAD != 0 {
            instr.mark_dead();
        }
        if flags & INSTR_UNUSED_RESULT != 0 {
            instr.mark_unused_result();
        }
        Ok(instr)
    }

    fn arity(&mut self) -> Result<(u32, u32, bool)> {
        Ok((self.u32()?, self.u32()?, self.bool()?))
    }

    fn call_base(&mut self, op: Operation, result: Option<Variable>, ops: &mut Operands) -> Result<CallBase> {
        let tag = self.u8()?;
        let call_type = CallType::from_u8(tag).with_context(|| format!("{}: unknown call type {}", op, tag))?;
        let name = self.string()?;
        // Not bounded by read_len: the arguments precede this field.
        let argc = self.u32()? as usize;
        let has_closure = self.bool()?;
        let refined = self.bool()?;
        let receiver = ops.next()?;
        let args = ops.take(argc)?;
        let closure = if has_closure { Some(ops.next()?) } else { None };
        Ok(CallBase::new(call_type, name, receiver, args, closure, result).refined(refined))
    }

    fn kind(&mut self, op: Operation, result: Option<Variable>, ops: &mut Operands) -> Result<InstrKind> {
        let needs = |result: Option<Variable>| result.with_context(|| format!("{} requires a result", op));

        Ok(match op {
            Operation::Label => InstrKind::Label(self.label()?),
            Operation::Nop => InstrKind::Nop,
            Operation::LineNum => InstrKind::LineNum(self.u32()?),
            Operation::ThreadPoll => InstrKind::ThreadPoll,
            Operation::PushFrame => InstrKind::PushFrame,
            Operation::PopFrame => InstrKind::PopFrame,
            Operation::PushBinding => InstrKind::PushBinding,
            Operation::PopBinding => InstrKind::PopBinding,
            Operation::CheckArity => {
                let (required, opt, rest) = self.arity()?;
                InstrKind::CheckArity(CheckArityInstr {
                    required,
                    opt,
                    rest,
                    receives_keywords: self.bool()?,
                    kwrest: self.bool()?,
                })
            }
            Operation::CheckArgsArrayArity => {
                let array = ops.next()?;
                let (required, opt, rest) = self.arity()?;
                InstrKind::CheckArgsArrayArity(CheckArgsArrayArityInstr {
                    array,
                    required,
                    opt,
                    rest,
                })
            }
            Operation::RaiseArgumentError => {
                let (required, opt, rest) = self.arity()?;
                InstrKind::RaiseArgumentError(RaiseArgumentErrorInstr {
                    required,
                    opt,
                    rest,
                    given: self.u32()?,
                })
            }
            Operation::Guard => {
                let value = ops.next()?;
                let tag = self.u8()?;
                let expected = GuardType::from_u8(tag).with_context(|| format!("unknown guard type {}", tag))?;
                InstrKind::Guard(GuardInstr {
                    value,
                    expected,
                    resume: self.label()?,
                })
            }

            Operation::Copy => InstrKind::Copy(CopyInstr {
                result: needs(result)?,
                source: ops.next()?,
            }),
            Operation::GetField => InstrKind::GetField(GetFieldInstr {
                result: needs(result)?,
                object: ops.next()?,
                name: self.string()?,
            }),
            Operation::PutField => InstrKind::PutField(PutFieldInstr {
                object: ops.next()?,
                value: ops.next()?,
                name: self.string()?,
            }),
            Operation::SearchConst | Operation::LexicalSearchConst | Operation::InheritanceSearchConst => {
                let lookup = ConstLookupInstr {
                    result: needs(result)?,
                    module: ops.next()?,
                    name: self.string()?,
                };
                match op {
                    Operation::SearchConst => InstrKind::SearchConst(lookup),
                    Operation::LexicalSearchConst => InstrKind::LexicalSearchConst(lookup),
                    _ => InstrKind::InheritanceSearchConst(lookup),
                }
            }
            Operation::PutConst => InstrKind::PutConst(PutConstInstr {
                module: ops.next()?,
                value: ops.next()?,
                name: self.string()?,
            }),
            Operation::GetClassVar => InstrKind::GetClassVar(GetClassVarInstr {
                result: needs(result)?,
                module: ops.next()?,
                name: self.string()?,
            }),
            Operation::PutClassVar => InstrKind::PutClassVar(PutClassVarInstr {
                module: ops.next()?,
                value: ops.next()?,
                name: self.string()?,
            }),
            Operation::GetGlobalVar => InstrKind::GetGlobalVar(GetGlobalVarInstr {
                result: needs(result)?,
                name: self.string()?,
            }),
            Operation::PutGlobalVar => InstrKind::PutGlobalVar(PutGlobalVarInstr {
                value: ops.next()?,
                name: self.string()?,
            }),
            Operation::BuildCompoundString => {
                let pieces = ops.items.by_ref().collect();
                InstrKind::BuildCompoundString(BuildCompoundStringInstr {
                    result: needs(result)?,
                    pieces,
                })
            }
            Operation::BuildSplat => InstrKind::BuildSplat(BuildSplatInstr {
                result: needs(result)?,
                array: ops.next()?,
            }),
            Operation::BuildCompoundArray => InstrKind::BuildCompoundArray(BuildCompoundArrayInstr {
                result: needs(result)?,
                head: ops.next()?,
                tail: ops.next()?,
                is_push: self.bool()?,
            }),
            Operation::BuildLambda => InstrKind::BuildLambda(BuildLambdaInstr {
                result: needs(result)?,
                body: ops.next()?,
            }),
            Operation::BlockGiven => InstrKind::BlockGiven(BlockGivenInstr {
                result: needs(result)?,
                block: ops.next()?,
            }),
            Operation::ToAry => InstrKind::ToAry(ToAryInstr {
                result: needs(result)?,
                array: ops.next()?,
            }),
            Operation::DefineClass => InstrKind::DefineClass(DefineClassInstr {
                result: needs(result)?,
                container: ops.next()?,
                superclass: ops.next()?,
                name: self.string()?,
            }),
            Operation::DefineInstanceMethod => {
                InstrKind::DefineInstanceMethod(DefineInstanceMethodInstr { body: self.nested()? })
            }
            Operation::DefineClassMethod => InstrKind::DefineClassMethod(DefineClassMethodInstr {
                object: ops.next()?,
                body: self.nested()?,
            }),
            Operation::ProcessModuleBody => InstrKind::ProcessModuleBody(ProcessModuleBodyInstr {
                result: needs(result)?,
                module: ops.next()?,
                body: self.nested()?,
            }),

            Operation::ReceiveSelf => InstrKind::ReceiveSelf(needs(result)?),
            Operation::ReceivePreReqdArg => InstrKind::ReceivePreReqdArg(ReceivePreReqdArgInstr {
                result: needs(result)?,
                index: self.u32()?,
            }),
            Operation::ReceivePostReqdArg => InstrKind::ReceivePostReqdArg(ReceivePostReqdArgInstr {
                result: needs(result)?,
                index: self.u32()?,
                pre: self.u32()?,
                post: self.u32()?,
            }),
            Operation::ReceiveOptArg => InstrKind::ReceiveOptArg(ReceiveOptArgInstr {
                result: needs(result)?,
                index: self.u32()?,
                required: self.u32()?,
                pre: self.u32()?,
            }),
            Operation::ReceiveRestArg => InstrKind::ReceiveRestArg(ReceiveRestArgInstr {
                result: needs(result)?,
                index: self.u32()?,
                required: self.u32()?,
            }),
            Operation::ReceiveKeywordArg => InstrKind::ReceiveKeywordArg(ReceiveKeywordArgInstr {
                result: needs(result)?,
                name: self.string()?,
                required: self.bool()?,
            }),
            Operation::ReceiveKeywordRestArg => {
                InstrKind::ReceiveKeywordRestArg(ReceiveKeywordRestArgInstr { result: needs(result)? })
            }
            Operation::LoadImplicitClosure => InstrKind::LoadImplicitClosure(needs(result)?),
            Operation::LoadFrameClosure => InstrKind::LoadFrameClosure(needs(result)?),
            Operation::MasgnReqd => {
                let result = needs(result)?;
                let array = ops.next()?;
                let pre = if self.bool()? { Some(self.u32()?) } else { None };
                InstrKind::MasgnReqd(MasgnReqdInstr {
                    result,
                    array,
                    pre,
                    post: self.u32()?,
                    index: self.u32()?,
                })
            }
            Operation::MasgnOpt => InstrKind::MasgnOpt(MasgnOptInstr {
                result: needs(result)?,
                array: ops.next()?,
                index: self.u32()?,
                min_args: self.u32()?,
            }),
            Operation::MasgnRest => InstrKind::MasgnRest(MasgnRestInstr {
                result: needs(result)?,
                array: ops.next()?,
                pre: self.u32()?,
                post: self.u32()?,
                index: self.u32()?,
            }),

            Operation::Jump => InstrKind::Jump(JumpInstr { target: self.label()? }),
            Operation::JumpIndirect => InstrKind::JumpIndirect(JumpIndirectInstr { address: ops.next()? }),
            Operation::Beq | Operation::Bne => {
                let branch = TwoOperandBranch {
                    arg1: ops.next()?,
                    arg2: ops.next()?,
                    target: self.label()?,
                };
                if op == Operation::Beq {
                    InstrKind::Beq(branch)
                } else {
                    InstrKind::Bne(branch)
                }
            }
            Operation::BTrue | Operation::BFalse | Operation::BNil | Operation::BUndef => {
                let branch = OneOperandBranch {
                    value: ops.next()?,
                    target: self.label()?,
                };
                match op {
                    Operation::BTrue => InstrKind::BTrue(branch),
                    Operation::BFalse => InstrKind::BFalse(branch),
                    Operation::BNil => InstrKind::BNil(branch),
                    _ => InstrKind::BUndef(branch),
                }
            }
            Operation::BInt => {
                let arg1 = ops.next()?;
                let arg2 = ops.next()?;
                let tag = self.u8()?;
                let cmp = IntCmp::from_u8(tag).with_context(|| format!("unknown integer comparison {}", tag))?;
                InstrKind::BInt(BIntInstr {
                    op: cmp,
                    arg1,
                    arg2,
                    target: self.label()?,
                })
            }
            Operation::BSwitch => {
                let value = ops.next()?;
                let count = self.len()?;
                ensure!(count > 0, "b_switch without cases");
                let mut cases = Vec::with_capacity(count);
                let mut targets = Vec::with_capacity(count);
                for _ in 0..count {
                    cases.push(read_i64(self.bytes, &mut self.cursor)?);
                    targets.push(self.label()?);
                }
                InstrKind::BSwitch(BSwitchInstr {
                    value,
                    cases,
                    targets,
                    ruby_case: self.label()?,
                    else_target: self.label()?,
                })
            }

            Operation::Call => InstrKind::Call(Box::new(self.call_base(op, result, ops)?)),
            Operation::NoResultCall => InstrKind::NoResultCall(Box::new(self.call_base(op, result, ops)?)),
            Operation::AttrAssign => InstrKind::AttrAssign(Box::new(self.call_base(op, result, ops)?)),
            Operation::ZeroOperandArgNoBlockCall => {
                InstrKind::ZeroOperandArgNoBlockCall(Box::new(self.call_base(op, result, ops)?))
            }
            Operation::OneOperandArgNoBlockCall => {
                InstrKind::OneOperandArgNoBlockCall(Box::new(self.call_base(op, result, ops)?))
            }
            Operation::OneOperandArgBlockCall => {
                InstrKind::OneOperandArgBlockCall(Box::new(self.call_base(op, result, ops)?))
            }
            Operation::OneFixnumArgNoBlockCall => {
                let base = Box::new(self.call_base(op, result, ops)?);
                InstrKind::OneFixnumArgNoBlockCall {
                    base,
                    value: read_i64(self.bytes, &mut self.cursor)?,
                }
            }
            Operation::OneFloatArgNoBlockCall => {
                let base = Box::new(self.call_base(op, result, ops)?);
                InstrKind::OneFloatArgNoBlockCall {
                    base,
                    value: read_f64(self.bytes, &mut self.cursor)?,
                }
            }
            Operation::OneArgNoBlockNoResultCall => {
                InstrKind::OneArgNoBlockNoResultCall(Box::new(self.call_base(op, result, ops)?))
            }
            Operation::InstanceSuper => InstrKind::InstanceSuper(Box::new(self.call_base(op, result, ops)?)),
            Operation::ClassSuper => InstrKind::ClassSuper(Box::new(self.call_base(op, result, ops)?)),
            Operation::UnresolvedSuper => InstrKind::UnresolvedSuper(Box::new(self.call_base(op, result, ops)?)),
            Operation::ZSuper => {
                let levels = self.len()?;
                let mut arg_counts = Vec::with_capacity(levels);
                for _ in 0..levels {
                    arg_counts.push(self.u32()?);
                }
                let has_closure = self.bool()?;
                let receiver = ops.next()?;
                let total: usize = arg_counts.iter().map(|c| *c as usize).sum();
                let args = ops.take(total)?;
                let closure = if has_closure { Some(ops.next()?) } else { None };
                InstrKind::ZSuper(Box::new(ZSuperInstr {
                    base: CallBase::new(CallType::Super, "super", receiver, args, closure, result),
                    arg_counts,
                }))
            }
            Operation::Yield => InstrKind::Yield(YieldInstr {
                result,
                block: ops.next()?,
                arg: ops.next()?,
                unwrap: self.bool()?,
            }),
            Operation::Eqq => InstrKind::Eqq(EqqInstr {
                result: needs(result)?,
                target: ops.next()?,
                value: ops.next()?,
                splatted: self.bool()?,
            }),

            Operation::ExcRegionStart => InstrKind::ExcRegionStart(ExcRegionStartInstr { rescue: self.label()? }),
            Operation::ExcRegionEnd => InstrKind::ExcRegionEnd,
            Operation::ReceiveException => InstrKind::ReceiveException(ReceiveExceptionInstr {
                result: needs(result)?,
                unwrap: self.bool()?,
            }),
            Operation::Throw => InstrKind::Throw(ThrowInstr { value: ops.next()? }),
            Operation::RescueEqq => InstrKind::RescueEqq(RescueEqqInstr {
                result: needs(result)?,
                exception: ops.next()?,
                classes: ops.next()?,
            }),
            Operation::Return => InstrKind::Return(ReturnInstr { value: ops.next()? }),
            Operation::Break => InstrKind::Break(BreakInstr {
                value: ops.next()?,
                scope: self.scope_ref()?,
                scope_name: self.string()?,
            }),
            Operation::NonlocalReturn => InstrKind::NonlocalReturn(NonlocalReturnInstr {
                value: ops.next()?,
                method: self.scope_ref()?,
                method_name: self.string()?,
            }),
            Operation::CheckForLocalJumpError => {
                InstrKind::CheckForLocalJumpError(CheckForLjeInstr { maybe_lambda: self.bool()? })
            }
            Operation::RuntimeHelper => {
                let args = ops.items.by_ref().collect();
                let tag = self.u8()?;
                let helper = HelperMethod::from_u8(tag).with_context(|| format!("unknown runtime helper {}", tag))?;
                InstrKind::RuntimeHelper(RuntimeHelperInstr {
                    result: needs(result)?,
                    helper,
                    args,
                })
            }
        })
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ScopeBuilder;

    fn encode(scope: &Scope) -> Vec<u8> {
        let mut encoder = ScopeEncoder::new();
        encoder.scope(scope).unwrap();
        encoder.finish()
    }

    #[test]
    fn labels_outside_the_table_are_rejected() {
        let mut b = ScopeBuilder::script("t.rb");
        let done = b.label("done");
        b.emit(Instr::jump(done));
        b.place(done);
        b.ret(Operand::Nil);
        let scope = b.finish();
        let bytes = encode(&scope);

        // kind, name, file, line, then a keyword-free signature (23 bytes).
        let at = 1 + 4 + scope.name().len() + 4 + scope.file().len() + 4 + 23;
        let names: usize = scope.labels().names().iter().map(|n| 4 + n.len()).sum();
        let mut forged = bytes[..at].to_vec();
        write_len(&mut forged, 0);
        forged.extend_from_slice(&bytes[at + 4 + names..]);

        let err = ScopeDecoder::new(&forged).scope().unwrap_err();
        assert!(format!("{:#}", err).contains("outside the scope"));
    }

    #[test]
    fn unknown_operation_tags_fail() {
        let scope = Scope::new(ScopeKind::Script, "<main>", "t.rb", 1);
        let mut bytes = encode(&scope);
        // Claim one instruction and give it an impossible tag.
        let len = bytes.len();
        bytes[len - 4..].copy_from_slice(&1u32.to_le_bytes());
        bytes.push(0xff);
        let err = ScopeDecoder::new(&bytes).scope().unwrap_err();
        assert!(format!("{:#}", err).contains("unknown operation tag"));
    }

    #[test]
    fn nested_bodies_get_fresh_identities() {
        let mut method = ScopeBuilder::method("greet", "t.rb");
        method.ret(Operand::str("hi"));
        let body = method.finish_arc();
        let mut script = ScopeBuilder::script("t.rb");
        script.emit(InstrKind::DefineInstanceMethod(DefineInstanceMethodInstr { body: body.clone() }));
        script.ret(Operand::Nil);
        let scope = script.finish();

        let decoded = ScopeDecoder::new(&encode(&scope)).scope().unwrap();
        let InstrKind::DefineInstanceMethod(def) = &decoded.instrs()[0].kind else {
            panic!("expected a method definition");
        };
        assert_ne!(def.body.id(), body.id());
        assert_eq!(def.body.instrs(), body.instrs());
        assert_eq!(def.body.name().as_ref(), "greet");
    }

    #[test]
    fn block_exit_targets_follow_the_fresh_identities() {
        let mut method = ScopeBuilder::method("find", "t.rb");
        let mut blk = ScopeBuilder::closure(&method, "find_block");
        blk.break_out(Operand::Nil).nonlocal_return(Operand::Nil);
        method.call_with_block(Operand::Nil, "each", vec![], Some(Operand::Closure(blk.finish_arc())));
        method.ret(Operand::Nil);
        let scope = method.finish();

        let decoded = ScopeDecoder::new(&encode(&scope)).scope().unwrap();
        assert_ne!(decoded.id(), scope.id());
        let Some(Operand::Closure(body)) = decoded.instrs()[0].call_base().and_then(|c| c.closure.clone()) else {
            panic!("expected a literal block");
        };
        match (&body.instrs()[0].kind, &body.instrs()[1].kind) {
            (InstrKind::Break(b), InstrKind::NonlocalReturn(r)) => {
                assert_eq!(b.scope, decoded.id());
                assert_eq!(r.method, decoded.id());
                assert_eq!(b.scope_name.as_ref(), "find");
            }
            other => panic!("unexpected instructions {other:?}"),
        }
    }
}
