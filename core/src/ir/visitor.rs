//! Per-kind visitor used by the printer and the persistence encoder.
//!
//! Operands and results are handled generically through the instruction
//! contract; a visitor sees each kind's payload, which is where the
//! non-operand fields live. Every method defaults to an "unhandled
//! instruction" error, so a backend that forgets a kind fails loudly.

use crate::{
    error::IrError,
    ir::{instr::*, Instr, InstrKind, Label, Operation, Variable},
};

macro_rules! instr_visitor {
    ($($method:ident($($arg:ident: $ty:ty),*) => $op:ident;)*) => {
        pub trait InstrVisitor {
            $(
                fn $method(&mut self, $($arg: $ty),*) -> Result<(), IrError> {
                    let _ = ($($arg,)*);
                    Err(IrError::unsupported(Operation::$op, "this visitor"))
                }
            )*

            /// Dispatches on the instruction kind.
            fn visit(&mut self, instr: &Instr) -> Result<(), IrError> {
                walk(self, instr)
            }
        }
    };
}

instr_visitor! {
    visit_label(label: Label) => Label;
    visit_nop() => Nop;
    visit_line_num(line: u32) => LineNum;
    visit_thread_poll() => ThreadPoll;
    visit_push_frame() => PushFrame;
    visit_pop_frame() => PopFrame;
    visit_push_binding() => PushBinding;
    visit_pop_binding() => PopBinding;
    visit_check_arity(i: &CheckArityInstr) => CheckArity;
    visit_check_args_array_arity(i: &CheckArgsArrayArityInstr) => CheckArgsArrayArity;
    visit_raise_argument_error(i: &RaiseArgumentErrorInstr) => RaiseArgumentError;
    visit_guard(i: &GuardInstr) => Guard;

    visit_copy(i: &CopyInstr) => Copy;
    visit_get_field(i: &GetFieldInstr) => GetField;
    visit_put_field(i: &PutFieldInstr) => PutField;
    visit_search_const(i: &ConstLookupInstr) => SearchConst;
    visit_lexical_search_const(i: &ConstLookupInstr) => LexicalSearchConst;
    visit_inheritance_search_const(i: &ConstLookupInstr) => InheritanceSearchConst;
    visit_put_const(i: &PutConstInstr) => PutConst;
    visit_get_class_var(i: &GetClassVarInstr) => GetClassVar;
    visit_put_class_var(i: &PutClassVarInstr) => PutClassVar;
    visit_get_global_var(i: &GetGlobalVarInstr) => GetGlobalVar;
    visit_put_global_var(i: &PutGlobalVarInstr) => PutGlobalVar;
    visit_build_compound_string(i: &BuildCompoundStringInstr) => BuildCompoundString;
    visit_build_splat(i: &BuildSplatInstr) => BuildSplat;
    visit_build_compound_array(i: &BuildCompoundArrayInstr) => BuildCompoundArray;
    visit_build_lambda(i: &BuildLambdaInstr) => BuildLambda;
    visit_block_given(i: &BlockGivenInstr) => BlockGiven;
    visit_to_ary(i: &ToAryInstr) => ToAry;
    visit_define_class(i: &DefineClassInstr) => DefineClass;
    visit_define_instance_method(i: &DefineInstanceMethodInstr) => DefineInstanceMethod;
    visit_define_class_method(i: &DefineClassMethodInstr) => DefineClassMethod;
    visit_process_module_body(i: &ProcessModuleBodyInstr) => ProcessModuleBody;

    visit_receive_self(result: &Variable) => ReceiveSelf;
    visit_receive_pre_reqd_arg(i: &ReceivePreReqdArgInstr) => ReceivePreReqdArg;
    visit_receive_post_reqd_arg(i: &ReceivePostReqdArgInstr) => ReceivePostReqdArg;
    visit_receive_opt_arg(i: &ReceiveOptArgInstr) => ReceiveOptArg;
    visit_receive_rest_arg(i: &ReceiveRestArgInstr) => ReceiveRestArg;
    visit_receive_keyword_arg(i: &ReceiveKeywordArgInstr) => ReceiveKeywordArg;
    visit_receive_keyword_rest_arg(i: &ReceiveKeywordRestArgInstr) => ReceiveKeywordRestArg;
    visit_load_implicit_closure(result: &Variable) => LoadImplicitClosure;
    visit_load_frame_closure(result: &Variable) => LoadFrameClosure;
    visit_masgn_reqd(i: &MasgnReqdInstr) => MasgnReqd;
    visit_masgn_opt(i: &MasgnOptInstr) => MasgnOpt;
    visit_masgn_rest(i: &MasgnRestInstr) => MasgnRest;

    visit_jump(i: &JumpInstr) => Jump;
    visit_jump_indirect(i: &JumpIndirectInstr) => JumpIndirect;
    visit_beq(i: &TwoOperandBranch) => Beq;
    visit_bne(i: &TwoOperandBranch) => Bne;
    visit_b_true(i: &OneOperandBranch) => BTrue;
    visit_b_false(i: &OneOperandBranch) => BFalse;
    visit_b_nil(i: &OneOperandBranch) => BNil;
    visit_b_undef(i: &OneOperandBranch) => BUndef;
    visit_b_int(i: &BIntInstr) => BInt;
    visit_b_switch(i: &BSwitchInstr) => BSwitch;

    visit_call(base: &CallBase) => Call;
    visit_no_result_call(base: &CallBase) => NoResultCall;
    visit_attr_assign(base: &CallBase) => AttrAssign;
    visit_zero_operand_arg_no_block_call(base: &CallBase) => ZeroOperandArgNoBlockCall;
    visit_one_operand_arg_no_block_call(base: &CallBase) => OneOperandArgNoBlockCall;
    visit_one_operand_arg_block_call(base: &CallBase) => OneOperandArgBlockCall;
    visit_one_fixnum_arg_no_block_call(base: &CallBase, value: i64) => OneFixnumArgNoBlockCall;
    visit_one_float_arg_no_block_call(base: &CallBase, value: f64) => OneFloatArgNoBlockCall;
    visit_one_arg_no_block_no_result_call(base: &CallBase) => OneArgNoBlockNoResultCall;
    visit_instance_super(base: &CallBase) => InstanceSuper;
    visit_class_super(base: &CallBase) => ClassSuper;
    visit_unresolved_super(base: &CallBase) => UnresolvedSuper;
    visit_zsuper(i: &ZSuperInstr) => ZSuper;
    visit_yield(i: &YieldInstr) => Yield;
    visit_eqq(i: &EqqInstr) => Eqq;

    visit_exc_region_start(i: &ExcRegionStartInstr) => ExcRegionStart;
    visit_exc_region_end() => ExcRegionEnd;
    visit_receive_exception(i: &ReceiveExceptionInstr) => ReceiveException;
    visit_throw(i: &ThrowInstr) => Throw;
    visit_rescue_eqq(i: &RescueEqqInstr) => RescueEqq;
    visit_return(i: &ReturnInstr) => Return;
    visit_break(i: &BreakInstr) => Break;
    visit_nonlocal_return(i: &NonlocalReturnInstr) => NonlocalReturn;
    visit_check_for_lje(i: &CheckForLjeInstr) => CheckForLocalJumpError;
    visit_runtime_helper(i: &RuntimeHelperInstr) => RuntimeHelper;
}

fn walk<V: InstrVisitor + ?Sized>(v: &mut V, instr: &Instr) -> Result<(), IrError> {
    match &instr.kind {
        InstrKind::Label(l) => v.visit_label(*l),
        InstrKind::Nop => v.visit_nop(),
        InstrKind::LineNum(n) => v.visit_line_num(*n),
        InstrKind::ThreadPoll => v.visit_thread_poll(),
        InstrKind::PushFrame => v.visit_push_frame(),
        InstrKind::PopFrame => v.visit_pop_frame(),
        InstrKind::PushBinding => v.visit_push_binding(),
        InstrKind::PopBinding => v.visit_pop_binding(),
        InstrKind::CheckArity(i) => v.visit_check_arity(i),
        InstrKind::CheckArgsArrayArity(i) => v.visit_check_args_array_arity(i),
        InstrKind::RaiseArgumentError(i) => v.visit_raise_argument_error(i),
        InstrKind::Guard(i) => v.visit_guard(i),
        InstrKind::Copy(i) => v.visit_copy(i),
        InstrKind::GetField(i) => v.visit_get_field(i),
        InstrKind::PutField(i) => v.visit_put_field(i),
        InstrKind::SearchConst(i) => v.visit_search_const(i),
        InstrKind::LexicalSearchConst(i) => v.visit_lexical_search_const(i),
        InstrKind::InheritanceSearchConst(i) => v.visit_inheritance_search_const(i),
        InstrKind::PutConst(i) => v.visit_put_const(i),
        InstrKind::GetClassVar(i) => v.visit_get_class_var(i),
        InstrKind::PutClassVar(i) => v.visit_put_class_var(i),
        InstrKind::GetGlobalVar(i) => v.visit_get_global_var(i),
        InstrKind::PutGlobalVar(i) => v.visit_put_global_var(i),
        InstrKind::BuildCompoundString(i) => v.visit_build_compound_string(i),
        InstrKind::BuildSplat(i) => v.visit_build_splat(i),
        InstrKind::BuildCompoundArray(i) => v.visit_build_compound_array(i),
        InstrKind::BuildLambda(i) => v.visit_build_lambda(i),
        InstrKind::BlockGiven(i) => v.visit_block_given(i),
        InstrKind::ToAry(i) => v.visit_to_ary(i),
        InstrKind::DefineClass(i) => v.visit_define_class(i),
        InstrKind::DefineInstanceMethod(i) => v.visit_define_instance_method(i),
        InstrKind::DefineClassMethod(i) => v.visit_define_class_method(i),
        InstrKind::ProcessModuleBody(i) => v.visit_process_module_body(i),
        InstrKind::ReceiveSelf(r) => v.visit_receive_self(r),
        InstrKind::ReceivePreReqdArg(i) => v.visit_receive_pre_reqd_arg(i),
        InstrKind::ReceivePostReqdArg(i) => v.visit_receive_post_reqd_arg(i),
        InstrKind::ReceiveOptArg(i) => v.visit_receive_opt_arg(i),
        InstrKind::ReceiveRestArg(i) => v.visit_receive_rest_arg(i),
        InstrKind::ReceiveKeywordArg(i) => v.visit_receive_keyword_arg(i),
        InstrKind::ReceiveKeywordRestArg(i) => v.visit_receive_keyword_rest_arg(i),
        InstrKind::LoadImplicitClosure(r) => v.visit_load_implicit_closure(r),
        InstrKind::LoadFrameClosure(r) => v.visit_load_frame_closure(r),
        InstrKind::MasgnReqd(i) => v.visit_masgn_reqd(i),
        InstrKind::MasgnOpt(i) => v.visit_masgn_opt(i),
        InstrKind::MasgnRest(i) => v.visit_masgn_rest(i),
        InstrKind::Jump(i) => v.visit_jump(i),
        InstrKind::JumpIndirect(i) => v.visit_jump_indirect(i),
        InstrKind::Beq(i) => v.visit_beq(i),
        InstrKind::Bne(i) => v.visit_bne(i),
        InstrKind::BTrue(i) => v.visit_b_true(i),
        InstrKind::BFalse(i) => v.visit_b_false(i),
        InstrKind::BNil(i) => v.visit_b_nil(i),
        InstrKind::BUndef(i) => v.visit_b_undef(i),
        InstrKind::BInt(i) => v.visit_b_int(i),
        InstrKind::BSwitch(i) => v.visit_b_switch(i),
        InstrKind::Call(b) => v.visit_call(b),
        InstrKind::NoResultCall(b) => v.visit_no_result_call(b),
        InstrKind::AttrAssign(b) => v.visit_attr_assign(b),
        InstrKind::ZeroOperandArgNoBlockCall(b) => v.visit_zero_operand_arg_no_block_call(b),
        InstrKind::OneOperandArgNoBlockCall(b) => v.visit_one_operand_arg_no_block_call(b),
        InstrKind::OneOperandArgBlockCall(b) => v.visit_one_operand_arg_block_call(b),
        InstrKind::OneFixnumArgNoBlockCall { base, value } => v.visit_one_fixnum_arg_no_block_call(base, *value),
        InstrKind::OneFloatArgNoBlockCall { base, value } => v.visit_one_float_arg_no_block_call(base, *value),
        InstrKind::OneArgNoBlockNoResultCall(b) => v.visit_one_arg_no_block_no_result_call(b),
        InstrKind::InstanceSuper(b) => v.visit_instance_super(b),
        InstrKind::ClassSuper(b) => v.visit_class_super(b),
        InstrKind::UnresolvedSuper(b) => v.visit_unresolved_super(b),
        InstrKind::ZSuper(z) => v.visit_zsuper(z),
        InstrKind::Yield(i) => v.visit_yield(i),
        InstrKind::Eqq(i) => v.visit_eqq(i),
        InstrKind::ExcRegionStart(i) => v.visit_exc_region_start(i),
        InstrKind::ExcRegionEnd => v.visit_exc_region_end(),
        InstrKind::ReceiveException(i) => v.visit_receive_exception(i),
        InstrKind::Throw(i) => v.visit_throw(i),
        InstrKind::RescueEqq(i) => v.visit_rescue_eqq(i),
        InstrKind::Return(i) => v.visit_return(i),
        InstrKind::Break(i) => v.visit_break(i),
        InstrKind::NonlocalReturn(i) => v.visit_nonlocal_return(i),
        InstrKind::CheckForLocalJumpError(i) => v.visit_check_for_lje(i),
        InstrKind::RuntimeHelper(i) => v.visit_runtime_helper(i),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Operand;

    struct OnlyCopies(usize);

    impl InstrVisitor for OnlyCopies {
        fn visit_copy(&mut self, _: &CopyInstr) -> Result<(), IrError> {
            self.0 += 1;
            Ok(())
        }
    }

    #[test]
    fn unhandled_kinds_report_their_operation() {
        let mut v = OnlyCopies(0);
        v.visit(&Instr::copy(Variable::Temp(0), Operand::Nil)).unwrap();
        assert_eq!(v.0, 1);
        let err = v.visit(&Instr::jump(Label::from_index(0))).unwrap_err();
        assert_eq!(err, IrError::unsupported(Operation::Jump, "this visitor"));
    }
}
