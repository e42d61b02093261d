use crate::{
    error::IrError,
    ir::{instr::*, Instr, InstrVisitor, Label, Operand, Scope, ScopeId, Variable},
};

use super::wire::*;

pub(super) const OP_NIL: u8 = 0;
pub(super) const OP_BOOL: u8 = 1;
pub(super) const OP_UNDEFINED: u8 = 2;
pub(super) const OP_FIXNUM: u8 = 3;
pub(super) const OP_FLOAT: u8 = 4;
pub(super) const OP_STR: u8 = 5;
pub(super) const OP_SYMBOL: u8 = 6;
pub(super) const OP_ARRAY: u8 = 7;
pub(super) const OP_HASH: u8 = 8;
pub(super) const OP_SPLAT: u8 = 9;
pub(super) const OP_LABEL: u8 = 10;
pub(super) const OP_VAR: u8 = 11;
pub(super) const OP_CLOSURE: u8 = 12;
pub(super) const OP_SCOPE_MODULE: u8 = 13;
pub(super) const OP_NULL_BLOCK: u8 = 14;

/// Scope reference that names no enclosing scope.
pub(super) const NO_SCOPE: u32 = u32::MAX;

pub(super) const INSTR_DEAD: u8 = 1 << 0;
pub(super) const INSTR_UNUSED_RESULT: u8 = 1 << 1;

/// Writes scopes in the positional layout: header, then per instruction the
/// operation tag, flags, optional result, operands in `operands()` order and
/// finally the kind's own fields (through the visitor methods).
///
/// Scope ids do not survive a round trip, so break and return targets are
/// written as their distance up the lexical chain (0 is the scope itself).
pub(super) struct ScopeEncoder {
    out: Vec<u8>,
    // outermost first
    enclosing: Vec<ScopeId>,
}

impl ScopeEncoder {
    pub(super) fn new() -> Self {
        Self {
            out: Vec::new(),
            enclosing: Vec::new(),
        }
    }

    pub(super) fn finish(self) -> Vec<u8> {
        self.out
    }

    pub(super) fn scope(&mut self, scope: &Scope) -> Result<(), IrError> {
        self.enclosing.push(scope.id());
        let out = &mut self.out;
        write_u8(out, scope.kind().as_u8());
        write_str(out, scope.name());
        write_str(out, scope.file());
        write_u32(out, scope.line());
        write_signature(out, scope.signature());
        let labels = scope.labels().names();
        write_len(out, labels.len());
        for name in labels {
            write_str(out, name);
        }
        write_u32(out, scope.temp_count());
        write_len(out, scope.locals().len());
        for local in scope.locals() {
            write_str(out, local);
        }
        write_len(&mut self.out, scope.instrs().len());
        for instr in scope.instrs() {
            self.instr(instr)?;
        }
        Ok(())
    }

    fn instr(&mut self, instr: &Instr) -> Result<(), IrError> {
        write_u8(&mut self.out, instr.operation() as u8);
        let mut flags = 0;
        if instr.is_dead() {
            flags |= INSTR_DEAD;
        }
        if instr.has_unused_result() {
            flags |= INSTR_UNUSED_RESULT;
        }
        write_u8(&mut self.out, flags);
        match instr.result() {
            Some(var) => {
                write_bool(&mut self.out, true);
                write_variable(&mut self.out, var);
            }
            None => write_bool(&mut self.out, false),
        }
        let operands = instr.operands();
        write_len(&mut self.out, operands.len());
        for operand in operands {
            self.operand(operand)?;
        }
        self.visit(instr)
    }

    fn operand(&mut self, operand: &Operand) -> Result<(), IrError> {
        match operand {
            Operand::Nil => write_u8(&mut self.out, OP_NIL),
            Operand::Boolean(b) => {
                write_u8(&mut self.out, OP_BOOL);
                write_bool(&mut self.out, *b);
            }
            Operand::Undefined => write_u8(&mut self.out, OP_UNDEFINED),
            Operand::Fixnum(n) => {
                write_u8(&mut self.out, OP_FIXNUM);
                write_i64(&mut self.out, *n);
            }
            Operand::Float(f) => {
                write_u8(&mut self.out, OP_FLOAT);
                write_f64(&mut self.out, *f);
            }
            Operand::Str(s) => {
                write_u8(&mut self.out, OP_STR);
                write_str(&mut self.out, s);
            }
            Operand::Symbol(s) => {
                write_u8(&mut self.out, OP_SYMBOL);
                write_str(&mut self.out, s);
            }
            Operand::Array(items) => {
                write_u8(&mut self.out, OP_ARRAY);
                write_len(&mut self.out, items.len());
                for item in items.iter() {
                    self.operand(item)?;
                }
            }
            Operand::Hash(pairs) => {
                write_u8(&mut self.out, OP_HASH);
                write_len(&mut self.out, pairs.len());
                for (k, v) in pairs.iter() {
                    self.operand(k)?;
                    self.operand(v)?;
                }
            }
            Operand::Splat(inner) => {
                write_u8(&mut self.out, OP_SPLAT);
                self.operand(inner)?;
            }
            Operand::Label(l) => {
                write_u8(&mut self.out, OP_LABEL);
                write_label(&mut self.out, *l);
            }
            Operand::Var(v) => {
                write_u8(&mut self.out, OP_VAR);
                write_variable(&mut self.out, v);
            }
            Operand::Closure(body) => {
                write_u8(&mut self.out, OP_CLOSURE);
                self.nested(body)?;
            }
            Operand::ScopeModule => write_u8(&mut self.out, OP_SCOPE_MODULE),
            Operand::NullBlock => write_u8(&mut self.out, OP_NULL_BLOCK),
        }
        Ok(())
    }

    // Nested bodies are length prefixed so a reader can skip them.
    fn nested(&mut self, scope: &Scope) -> Result<(), IrError> {
        let mut inner = ScopeEncoder {
            out: Vec::new(),
            enclosing: self.enclosing.clone(),
        };
        inner.scope(scope)?;
        let bytes = inner.finish();
        write_len(&mut self.out, bytes.len());
        self.out.extend_from_slice(&bytes);
        Ok(())
    }

    fn label(&mut self, label: Label) -> Result<(), IrError> {
        write_label(&mut self.out, label);
        Ok(())
    }

    fn scope_ref(&mut self, id: ScopeId) {
        let distance = self
            .enclosing
            .iter()
            .rev()
            .position(|s| *s == id)
            .map_or(NO_SCOPE, |d| d as u32);
        write_u32(&mut self.out, distance);
    }

    fn name(&mut self, name: &str) -> Result<(), IrError> {
        write_str(&mut self.out, name);
        Ok(())
    }

    fn arity(&mut self, required: u32, opt: u32, rest: bool) {
        write_u32(&mut self.out, required);
        write_u32(&mut self.out, opt);
        write_bool(&mut self.out, rest);
    }

    fn call_fields(&mut self, base: &CallBase) -> Result<(), IrError> {
        write_u8(&mut self.out, base.call_type.as_u8());
        write_str(&mut self.out, &base.name);
        write_len(&mut self.out, base.args.len());
        write_bool(&mut self.out, base.closure.is_some());
        write_bool(&mut self.out, base.potentially_refined);
        Ok(())
    }

    fn none(&mut self) -> Result<(), IrError> {
        Ok(())
    }
}

impl InstrVisitor for ScopeEncoder {
    fn visit_label(&mut self, label: Label) -> Result<(), IrError> {
        self.label(label)
    }

    fn visit_nop(&mut self) -> Result<(), IrError> {
        self.none()
    }

    fn visit_line_num(&mut self, line: u32) -> Result<(), IrError> {
        write_u32(&mut self.out, line);
        Ok(())
    }

    fn visit_thread_poll(&mut self) -> Result<(), IrError> {
        self.none()
    }

    fn visit_push_frame(&mut self) -> Result<(), IrError> {
        self.none()
    }

    fn visit_pop_frame(&mut self) -> Result<(), IrError> {
        self.none()
    }

    fn visit_push_binding(&mut self) -> Result<(), IrError> {
        self.none()
    }

    fn visit_pop_binding(&mut self) -> Result<(), IrError> {
        self.none()
    }

    fn visit_check_arity(&mut self, i: &CheckArityInstr) -> Result<(), IrError> {
        self.arity(i.required, i.opt, i.rest);
        write_bool(&mut self.out, i.receives_keywords);
        write_bool(&mut self.out, i.kwrest);
        Ok(())
    }

    fn visit_check_args_array_arity(&mut self, i: &CheckArgsArrayArityInstr) -> Result<(), IrError> {
        self.arity(i.required, i.opt, i.rest);
        Ok(())
    }

    fn visit_raise_argument_error(&mut self, i: &RaiseArgumentErrorInstr) -> Result<(), IrError> {
        self.arity(i.required, i.opt, i.rest);
        write_u32(&mut self.out, i.given);
        Ok(())
    }

    fn visit_guard(&mut self, i: &GuardInstr) -> Result<(), IrError> {
        write_u8(&mut self.out, i.expected.as_u8());
        self.label(i.resume)
    }

    fn visit_copy(&mut self, _: &CopyInstr) -> Result<(), IrError> {
        self.none()
    }

    fn visit_get_field(&mut self, i: &GetFieldInstr) -> Result<(), IrError> {
        self.name(&i.name)
    }

    fn visit_put_field(&mut self, i: &PutFieldInstr) -> Result<(), IrError> {
        self.name(&i.name)
    }

    fn visit_search_const(&mut self, i: &ConstLookupInstr) -> Result<(), IrError> {
        self.name(&i.name)
    }

    fn visit_lexical_search_const(&mut self, i: &ConstLookupInstr) -> Result<(), IrError> {
        self.name(&i.name)
    }

    fn visit_inheritance_search_const(&mut self, i: &ConstLookupInstr) -> Result<(), IrError> {
        self.name(&i.name)
    }

    fn visit_put_const(&mut self, i: &PutConstInstr) -> Result<(), IrError> {
        self.name(&i.name)
    }

    fn visit_get_class_var(&mut self, i: &GetClassVarInstr) -> Result<(), IrError> {
        self.name(&i.name)
    }

    fn visit_put_class_var(&mut self, i: &PutClassVarInstr) -> Result<(), IrError> {
        self.name(&i.name)
    }

    fn visit_get_global_var(&mut self, i: &GetGlobalVarInstr) -> Result<(), IrError> {
        self.name(&i.name)
    }

    fn visit_put_global_var(&mut self, i: &PutGlobalVarInstr) -> Result<(), IrError> {
        self.name(&i.name)
    }

    fn visit_build_compound_string(&mut self, _: &BuildCompoundStringInstr) -> Result<(), IrError> {
        self.none()
    }

    fn visit_build_splat(&mut self, _: &BuildSplatInstr) -> Result<(), IrError> {
        self.none()
    }

    fn visit_build_compound_array(&mut self, i: &BuildCompoundArrayInstr) -> Result<(), IrError> {
        write_bool(&mut self.out, i.is_push);
        Ok(())
    }

    fn visit_build_lambda(&mut self, _: &BuildLambdaInstr) -> Result<(), IrError> {
        self.none()
    }

    fn visit_block_given(&mut self, _: &BlockGivenInstr) -> Result<(), IrError> {
        self.none()
    }

    fn visit_to_ary(&mut self, _: &ToAryInstr) -> Result<(), IrError> {
        self.none()
    }

    fn visit_define_class(&mut self, i: &DefineClassInstr) -> Result<(), IrError> {
        self.name(&i.name)
    }

    fn visit_define_instance_method(&mut self, i: &DefineInstanceMethodInstr) -> Result<(), IrError> {
        self.nested(&i.body)
    }

    fn visit_define_class_method(&mut self, i: &DefineClassMethodInstr) -> Result<(), IrError> {
        self.nested(&i.body)
    }

    fn visit_process_module_body(&mut self, i: &ProcessModuleBodyInstr) -> Result<(), IrError> {
        self.nested(&i.body)
    }

    fn visit_receive_self(&mut self, _: &Variable) -> Result<(), IrError> {
        self.none()
    }

    fn visit_receive_pre_reqd_arg(&mut self, i: &ReceivePreReqdArgInstr) -> Result<(), IrError> {
        write_u32(&mut self.out, i.index);
        Ok(())
    }

    fn visit_receive_post_reqd_arg(&mut self, i: &ReceivePostReqdArgInstr) -> Result<(), IrError> {
        write_u32(&mut self.out, i.index);
        write_u32(&mut self.out, i.pre);
        write_u32(&mut self.out, i.post);
        Ok(())
    }

    fn visit_receive_opt_arg(&mut self, i: &ReceiveOptArgInstr) -> Result<(), IrError> {
        write_u32(&mut self.out, i.index);
        write_u32(&mut self.out, i.required);
        write_u32(&mut self.out, i.pre);
        Ok(())
    }

    fn visit_receive_rest_arg(&mut self, i: &ReceiveRestArgInstr) -> Result<(), IrError> {
        write_u32(&mut self.out, i.index);
        write_u32(&mut self.out, i.required);
        Ok(())
    }

    fn visit_receive_keyword_arg(&mut self, i: &ReceiveKeywordArgInstr) -> Result<(), IrError> {
        write_str(&mut self.out, &i.name);
        write_bool(&mut self.out, i.required);
        Ok(())
    }

    fn visit_receive_keyword_rest_arg(&mut self, _: &ReceiveKeywordRestArgInstr) -> Result<(), IrError> {
        self.none()
    }

    fn visit_load_implicit_closure(&mut self, _: &Variable) -> Result<(), IrError> {
        self.none()
    }

    fn visit_load_frame_closure(&mut self, _: &Variable) -> Result<(), IrError> {
        self.none()
    }

    fn visit_masgn_reqd(&mut self, i: &MasgnReqdInstr) -> Result<(), IrError> {
        match i.pre {
            Some(pre) => {
                write_bool(&mut self.out, true);
                write_u32(&mut self.out, pre);
            }
            None => write_bool(&mut self.out, false),
        }
        write_u32(&mut self.out, i.post);
        write_u32(&mut self.out, i.index);
        Ok(())
    }

    fn visit_masgn_opt(&mut self, i: &MasgnOptInstr) -> Result<(), IrError> {
        write_u32(&mut self.out, i.index);
        write_u32(&mut self.out, i.min_args);
        Ok(())
    }

    fn visit_masgn_rest(&mut self, i: &MasgnRestInstr) -> Result<(), IrError> {
        write_u32(&mut self.out, i.pre);
        write_u32(&mut self.out, i.post);
        write_u32(&mut self.out, i.index);
        Ok(())
    }

    fn visit_jump(&mut self, i: &JumpInstr) -> Result<(), IrError> {
        self.label(i.target)
    }

    fn visit_jump_indirect(&mut self, _: &JumpIndirectInstr) -> Result<(), IrError> {
        self.none()
    }

    fn visit_beq(&mut self, i: &TwoOperandBranch) -> Result<(), IrError> {
        self.label(i.target)
    }

    fn visit_bne(&mut self, i: &TwoOperandBranch) -> Result<(), IrError> {
        self.label(i.target)
    }

    fn visit_b_true(&mut self, i: &OneOperandBranch) -> Result<(), IrError> {
        self.label(i.target)
    }

    fn visit_b_false(&mut self, i: &OneOperandBranch) -> Result<(), IrError> {
        self.label(i.target)
    }

    fn visit_b_nil(&mut self, i: &OneOperandBranch) -> Result<(), IrError> {
        self.label(i.target)
    }

    fn visit_b_undef(&mut self, i: &OneOperandBranch) -> Result<(), IrError> {
        self.label(i.target)
    }

    fn visit_b_int(&mut self, i: &BIntInstr) -> Result<(), IrError> {
        write_u8(&mut self.out, i.op.as_u8());
        self.label(i.target)
    }

    fn visit_b_switch(&mut self, i: &BSwitchInstr) -> Result<(), IrError> {
        write_len(&mut self.out, i.cases.len());
        for (case, target) in i.cases.iter().zip(&i.targets) {
            write_i64(&mut self.out, *case);
            write_label(&mut self.out, *target);
        }
        self.label(i.ruby_case)?;
        self.label(i.else_target)
    }

    fn visit_call(&mut self, base: &CallBase) -> Result<(), IrError> {
        self.call_fields(base)
    }

    fn visit_no_result_call(&mut self, base: &CallBase) -> Result<(), IrError> {
        self.call_fields(base)
    }

    fn visit_attr_assign(&mut self, base: &CallBase) -> Result<(), IrError> {
        self.call_fields(base)
    }

    fn visit_zero_operand_arg_no_block_call(&mut self, base: &CallBase) -> Result<(), IrError> {
        self.call_fields(base)
    }

    fn visit_one_operand_arg_no_block_call(&mut self, base: &CallBase) -> Result<(), IrError> {
        self.call_fields(base)
    }

    fn visit_one_operand_arg_block_call(&mut self, base: &CallBase) -> Result<(), IrError> {
        self.call_fields(base)
    }

    fn visit_one_fixnum_arg_no_block_call(&mut self, base: &CallBase, value: i64) -> Result<(), IrError> {
        self.call_fields(base)?;
        write_i64(&mut self.out, value);
        Ok(())
    }

    fn visit_one_float_arg_no_block_call(&mut self, base: &CallBase, value: f64) -> Result<(), IrError> {
        self.call_fields(base)?;
        write_f64(&mut self.out, value);
        Ok(())
    }

    fn visit_one_arg_no_block_no_result_call(&mut self, base: &CallBase) -> Result<(), IrError> {
        self.call_fields(base)
    }

    fn visit_instance_super(&mut self, base: &CallBase) -> Result<(), IrError> {
        self.call_fields(base)
    }

    fn visit_class_super(&mut self, base: &CallBase) -> Result<(), IrError> {
        self.call_fields(base)
    }

    fn visit_unresolved_super(&mut self, base: &CallBase) -> Result<(), IrError> {
        self.call_fields(base)
    }

    fn visit_zsuper(&mut self, i: &ZSuperInstr) -> Result<(), IrError> {
        write_len(&mut self.out, i.arg_counts.len());
        for count in &i.arg_counts {
            write_u32(&mut self.out, *count);
        }
        write_bool(&mut self.out, i.base.closure.is_some());
        Ok(())
    }

    fn visit_yield(&mut self, i: &YieldInstr) -> Result<(), IrError> {
        write_bool(&mut self.out, i.unwrap);
        Ok(())
    }

    fn visit_eqq(&mut self, i: &EqqInstr) -> Result<(), IrError> {
        write_bool(&mut self.out, i.splatted);
        Ok(())
    }

    fn visit_exc_region_start(&mut self, i: &ExcRegionStartInstr) -> Result<(), IrError> {
        self.label(i.rescue)
    }

    fn visit_exc_region_end(&mut self) -> Result<(), IrError> {
        self.none()
    }

    fn visit_receive_exception(&mut self, i: &ReceiveExceptionInstr) -> Result<(), IrError> {
        write_bool(&mut self.out, i.unwrap);
        Ok(())
    }

    fn visit_throw(&mut self, _: &ThrowInstr) -> Result<(), IrError> {
        self.none()
    }

    fn visit_rescue_eqq(&mut self, _: &RescueEqqInstr) -> Result<(), IrError> {
        self.none()
    }

    fn visit_return(&mut self, _: &ReturnInstr) -> Result<(), IrError> {
        self.none()
    }

    fn visit_break(&mut self, i: &BreakInstr) -> Result<(), IrError> {
        self.scope_ref(i.scope);
        self.name(&i.scope_name)
    }

    fn visit_nonlocal_return(&mut self, i: &NonlocalReturnInstr) -> Result<(), IrError> {
        self.scope_ref(i.method);
        self.name(&i.method_name)
    }

    fn visit_check_for_lje(&mut self, i: &CheckForLjeInstr) -> Result<(), IrError> {
        write_bool(&mut self.out, i.maybe_lambda);
        Ok(())
    }

    fn visit_runtime_helper(&mut self, i: &RuntimeHelperInstr) -> Result<(), IrError> {
        write_u8(&mut self.out, i.helper.as_u8());
        Ok(())
    }
}
