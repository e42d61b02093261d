//! Per-instruction interpretation, split by instruction family.
//!
//! Value-producing instructions go through [`Instr::interpret`]; branches
//! through [`Instr::interpret_and_get_new_ipc`]. Each refuses the other
//! convention.

use crate::{
    error::IrError,
    ir::{Instr, InstrKind, InterpreterContext},
    value::Value,
};

use super::{ExecutionContext, InterpState, Unwind};

mod access;
mod bookkeeping;
mod branch;
mod call;
mod exception;
mod receive;

impl Instr {
    /// Executes a non-branch instruction and returns its value; the loop
    /// stores it into the result variable.
    pub fn interpret(&self, ctx: &mut ExecutionContext, state: &mut InterpState) -> Result<Value, Unwind> {
        match &self.kind {
            InstrKind::Label(_)
            | InstrKind::Nop
            | InstrKind::LineNum(_)
            | InstrKind::ThreadPoll
            | InstrKind::ExcRegionStart(_)
            | InstrKind::ExcRegionEnd => Ok(Value::Nil),
            InstrKind::PushFrame => bookkeeping::push_frame(ctx, state),
            InstrKind::PopFrame => bookkeeping::pop_frame(ctx),
            InstrKind::PushBinding => bookkeeping::push_binding(ctx, state),
            InstrKind::PopBinding => bookkeeping::pop_binding(state),
            InstrKind::CheckArity(i) => bookkeeping::check_arity(ctx, state, i),
            InstrKind::CheckArgsArrayArity(i) => bookkeeping::check_args_array_arity(ctx, state, i),
            InstrKind::RaiseArgumentError(i) => bookkeeping::raise_argument_error(ctx, i),
            InstrKind::Guard(i) => bookkeeping::guard(ctx, state, i),

            InstrKind::Copy(i) => i.source.retrieve(ctx, state),
            InstrKind::GetField(i) => access::get_field(ctx, state, i),
            InstrKind::PutField(i) => access::put_field(ctx, state, i),
            InstrKind::SearchConst(i) => access::search_const(ctx, state, i, self.ipc()),
            InstrKind::LexicalSearchConst(i) => access::lexical_search_const(ctx, state, i),
            InstrKind::InheritanceSearchConst(i) => access::inheritance_search_const(ctx, state, i),
            InstrKind::PutConst(i) => access::put_const(ctx, state, i),
            InstrKind::GetClassVar(i) => access::get_class_var(ctx, state, i),
            InstrKind::PutClassVar(i) => access::put_class_var(ctx, state, i),
            InstrKind::GetGlobalVar(i) => Ok(ctx.runtime().global(&i.name)),
            InstrKind::PutGlobalVar(i) => {
                let value = i.value.retrieve(ctx, state)?;
                ctx.runtime().set_global(&i.name, value);
                Ok(Value::Nil)
            }
            InstrKind::BuildCompoundString(i) => access::build_compound_string(ctx, state, i),
            InstrKind::BuildSplat(i) => {
                let v = i.array.retrieve(ctx, state)?;
                Ok(Value::array(ctx.splat(&v)?))
            }
            InstrKind::BuildCompoundArray(i) => access::build_compound_array(ctx, state, i),
            InstrKind::BuildLambda(i) => access::build_lambda(ctx, state, i),
            InstrKind::BlockGiven(i) => Ok(Value::Bool(matches!(i.block.retrieve(ctx, state)?, Value::Proc(_)))),
            InstrKind::ToAry(i) => access::to_ary(ctx, state, i),
            InstrKind::DefineClass(i) => access::define_class(ctx, state, i),
            InstrKind::DefineInstanceMethod(i) => access::define_instance_method(ctx, state, i),
            InstrKind::DefineClassMethod(i) => access::define_class_method(ctx, state, i),
            InstrKind::ProcessModuleBody(i) => access::process_module_body(ctx, state, i),

            InstrKind::ReceiveSelf(_) => Ok(state.self_value().clone()),
            InstrKind::ReceivePreReqdArg(i) => Ok(state.args.pre(i.index)),
            InstrKind::ReceivePostReqdArg(i) => Ok(state.args.post(i.index, i.pre, i.post)),
            InstrKind::ReceiveOptArg(i) => Ok(state.args.opt(i.index, i.required, i.pre)),
            InstrKind::ReceiveRestArg(i) => Ok(state.args.rest(i.index, i.required)),
            InstrKind::ReceiveKeywordArg(i) => receive::keyword(ctx, state, i),
            InstrKind::ReceiveKeywordRestArg(_) => Ok(state.args.keyword_rest()),
            InstrKind::LoadImplicitClosure(_) => Ok(receive::block_value(state.block())),
            InstrKind::LoadFrameClosure(_) => Ok(receive::block_value(state.frame().block.as_ref())),
            InstrKind::MasgnReqd(i) => receive::masgn_reqd(ctx, state, i),
            InstrKind::MasgnOpt(i) => receive::masgn_opt(ctx, state, i),
            InstrKind::MasgnRest(i) => receive::masgn_rest(ctx, state, i),

            InstrKind::Call(base)
            | InstrKind::NoResultCall(base)
            | InstrKind::ZeroOperandArgNoBlockCall(base)
            | InstrKind::OneOperandArgNoBlockCall(base)
            | InstrKind::OneOperandArgBlockCall(base)
            | InstrKind::OneArgNoBlockNoResultCall(base) => call::call(ctx, state, base, self.ipc()),
            InstrKind::AttrAssign(base) => call::attr_assign(ctx, state, base, self.ipc()),
            InstrKind::OneFixnumArgNoBlockCall { base, value } => {
                call::call_with_literal(ctx, state, base, Value::Int(*value), self.ipc())
            }
            InstrKind::OneFloatArgNoBlockCall { base, value } => {
                call::call_with_literal(ctx, state, base, Value::Float(*value), self.ipc())
            }
            InstrKind::InstanceSuper(base) => call::resolved_super(ctx, state, base, false),
            InstrKind::ClassSuper(base) => call::resolved_super(ctx, state, base, true),
            InstrKind::UnresolvedSuper(base) => call::unresolved_super(ctx, state, base),
            InstrKind::ZSuper(i) => call::zsuper(ctx, state, i),
            InstrKind::Yield(i) => call::yield_block(ctx, state, i),
            InstrKind::Eqq(i) => call::eqq(ctx, state, i),

            InstrKind::ReceiveException(i) => exception::receive_exception(ctx, state, i),
            InstrKind::Throw(i) => exception::throw(ctx, state, i),
            InstrKind::RescueEqq(i) => exception::rescue_eqq(ctx, state, i),
            InstrKind::Return(i) => i.value.retrieve(ctx, state),
            InstrKind::Break(i) => exception::break_out(ctx, state, i),
            InstrKind::NonlocalReturn(i) => exception::nonlocal_return(ctx, state, i),
            InstrKind::CheckForLocalJumpError(i) => exception::check_for_lje(ctx, state, i),
            InstrKind::RuntimeHelper(i) => exception::runtime_helper(ctx, state, i),

            InstrKind::Jump(_)
            | InstrKind::JumpIndirect(_)
            | InstrKind::Beq(_)
            | InstrKind::Bne(_)
            | InstrKind::BTrue(_)
            | InstrKind::BFalse(_)
            | InstrKind::BNil(_)
            | InstrKind::BUndef(_)
            | InstrKind::BInt(_)
            | InstrKind::BSwitch(_) => Err(IrError::unsupported(self.operation(), "value interpretation").into()),
        }
    }

    /// Executes a branch; `Some(pc)` when it is taken.
    pub fn interpret_and_get_new_ipc(
        &self,
        ctx: &mut ExecutionContext,
        state: &mut InterpState,
        ic: &InterpreterContext,
    ) -> Result<Option<usize>, Unwind> {
        let target = match &self.kind {
            InstrKind::Jump(i) => Some(i.target),
            InstrKind::JumpIndirect(i) => Some(branch::indirect_target(ctx, state, i)?),
            InstrKind::Beq(i) => branch::when(branch::operands_equal(ctx, state, i)?, i.target),
            InstrKind::Bne(i) => branch::when(!branch::operands_equal(ctx, state, i)?, i.target),
            InstrKind::BTrue(i) => branch::when(i.value.retrieve(ctx, state)?.is_truthy(), i.target),
            InstrKind::BFalse(i) => branch::when(!i.value.retrieve(ctx, state)?.is_truthy(), i.target),
            InstrKind::BNil(i) => branch::when(i.value.retrieve(ctx, state)?.is_nil(), i.target),
            InstrKind::BUndef(i) => branch::when(i.value.retrieve(ctx, state)?.is_undefined(), i.target),
            InstrKind::BInt(i) => branch::b_int(ctx, state, i)?,
            InstrKind::BSwitch(i) => Some(branch::b_switch(ctx, state, i)?),
            _ => return Err(IrError::unsupported(self.operation(), "branch interpretation").into()),
        };
        target
            .map(|label| ic.pc_of(label).ok_or(Unwind::Bug(IrError::UnresolvedLabel(label.index()))))
            .transpose()
    }
}
