//! Instruction nodes.
//!
//! Every kind is a variant of the closed [`InstrKind`] sum with its own
//! payload struct. The cross-cutting contract (operands, result, labels,
//! simplification, deletability, scope flags) is implemented here as
//! exhaustive matches so adding a kind forces every protocol to handle it.

use std::sync::Arc;

use crate::{
    error::IrError,
    ir::{Label, Operand, Operation, Scope, ScopeFlags, ValueMap, Variable},
};

mod access;
mod bookkeeping;
mod branch;
mod call;
mod exception;
pub mod receive;

pub use access::*;
pub use bookkeeping::*;
pub use branch::*;
pub use call::*;
pub use exception::*;
pub use receive::{
    MasgnOptInstr, MasgnReqdInstr, MasgnRestInstr, ReceiveKeywordArgInstr, ReceiveKeywordRestArgInstr,
    ReceiveOptArgInstr, ReceivePostReqdArgInstr, ReceivePreReqdArgInstr, ReceiveRestArgInstr,
};

#[cfg(test)]
mod instr_test;

/// Operand-count contract of a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    Variable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstrKind {
    // bookkeeping
    Label(Label),
    Nop,
    LineNum(u32),
    ThreadPoll,
    PushFrame,
    PopFrame,
    PushBinding,
    PopBinding,
    CheckArity(CheckArityInstr),
    CheckArgsArrayArity(CheckArgsArrayArityInstr),
    RaiseArgumentError(RaiseArgumentErrorInstr),
    Guard(GuardInstr),

    // access
    Copy(CopyInstr),
    GetField(GetFieldInstr),
    PutField(PutFieldInstr),
    SearchConst(ConstLookupInstr),
    LexicalSearchConst(ConstLookupInstr),
    InheritanceSearchConst(ConstLookupInstr),
    PutConst(PutConstInstr),
    GetClassVar(GetClassVarInstr),
    PutClassVar(PutClassVarInstr),
    GetGlobalVar(GetGlobalVarInstr),
    PutGlobalVar(PutGlobalVarInstr),
    BuildCompoundString(BuildCompoundStringInstr),
    BuildSplat(BuildSplatInstr),
    BuildCompoundArray(BuildCompoundArrayInstr),
    BuildLambda(BuildLambdaInstr),
    BlockGiven(BlockGivenInstr),
    ToAry(ToAryInstr),
    DefineClass(DefineClassInstr),
    DefineInstanceMethod(DefineInstanceMethodInstr),
    DefineClassMethod(DefineClassMethodInstr),
    ProcessModuleBody(ProcessModuleBodyInstr),

    // receive
    ReceiveSelf(Variable),
    ReceivePreReqdArg(ReceivePreReqdArgInstr),
    ReceivePostReqdArg(ReceivePostReqdArgInstr),
    ReceiveOptArg(ReceiveOptArgInstr),
    ReceiveRestArg(ReceiveRestArgInstr),
    ReceiveKeywordArg(ReceiveKeywordArgInstr),
    ReceiveKeywordRestArg(ReceiveKeywordRestArgInstr),
    LoadImplicitClosure(Variable),
    LoadFrameClosure(Variable),
    MasgnReqd(MasgnReqdInstr),
    MasgnOpt(MasgnOptInstr),
    MasgnRest(MasgnRestInstr),

    // branches
    Jump(JumpInstr),
    JumpIndirect(JumpIndirectInstr),
    Beq(TwoOperandBranch),
    Bne(TwoOperandBranch),
    BTrue(OneOperandBranch),
    BFalse(OneOperandBranch),
    BNil(OneOperandBranch),
    BUndef(OneOperandBranch),
    BInt(BIntInstr),
    BSwitch(BSwitchInstr),

    // calls
    Call(Box<CallBase>),
    NoResultCall(Box<CallBase>),
    AttrAssign(Box<CallBase>),
    ZeroOperandArgNoBlockCall(Box<CallBase>),
    OneOperandArgNoBlockCall(Box<CallBase>),
    OneOperandArgBlockCall(Box<CallBase>),
    OneFixnumArgNoBlockCall { base: Box<CallBase>, value: i64 },
    OneFloatArgNoBlockCall { base: Box<CallBase>, value: f64 },
    OneArgNoBlockNoResultCall(Box<CallBase>),
    InstanceSuper(Box<CallBase>),
    ClassSuper(Box<CallBase>),
    UnresolvedSuper(Box<CallBase>),
    ZSuper(Box<ZSuperInstr>),
    Yield(YieldInstr),
    Eqq(EqqInstr),

    // exceptions and nonlocal exits
    ExcRegionStart(ExcRegionStartInstr),
    ExcRegionEnd,
    ReceiveException(ReceiveExceptionInstr),
    Throw(ThrowInstr),
    RescueEqq(RescueEqqInstr),
    Return(ReturnInstr),
    Break(BreakInstr),
    NonlocalReturn(NonlocalReturnInstr),
    CheckForLocalJumpError(CheckForLjeInstr),
    RuntimeHelper(RuntimeHelperInstr),
}

// Expands to a match collecting references to every operand of a kind.
// `[&]` and `[&mut]` select the borrow flavour.
macro_rules! collect_operands {
    ($kind:expr, [$($r:tt)*]) => {{
        let mut out = Vec::new();
        match $kind {
            InstrKind::Label(_)
            | InstrKind::Nop
            | InstrKind::LineNum(_)
            | InstrKind::ThreadPoll
            | InstrKind::PushFrame
            | InstrKind::PopFrame
            | InstrKind::PushBinding
            | InstrKind::PopBinding
            | InstrKind::CheckArity(_)
            | InstrKind::RaiseArgumentError(_)
            | InstrKind::GetGlobalVar(_)
            | InstrKind::DefineInstanceMethod(_)
            | InstrKind::ReceiveSelf(_)
            | InstrKind::ReceivePreReqdArg(_)
            | InstrKind::ReceivePostReqdArg(_)
            | InstrKind::ReceiveOptArg(_)
            | InstrKind::ReceiveRestArg(_)
            | InstrKind::ReceiveKeywordArg(_)
            | InstrKind::ReceiveKeywordRestArg(_)
            | InstrKind::LoadImplicitClosure(_)
            | InstrKind::LoadFrameClosure(_)
            | InstrKind::Jump(_)
            | InstrKind::ExcRegionStart(_)
            | InstrKind::ExcRegionEnd
            | InstrKind::ReceiveException(_)
            | InstrKind::CheckForLocalJumpError(_) => {}
            InstrKind::CheckArgsArrayArity(i) => out.push($($r)* i.array),
            InstrKind::Guard(i) => out.push($($r)* i.value),
            InstrKind::Copy(i) => out.push($($r)* i.source),
            InstrKind::GetField(i) => out.push($($r)* i.object),
            InstrKind::PutField(i) => {
                out.push($($r)* i.object);
                out.push($($r)* i.value);
            }
            InstrKind::SearchConst(i) | InstrKind::LexicalSearchConst(i) | InstrKind::InheritanceSearchConst(i) => {
                out.push($($r)* i.module)
            }
            InstrKind::PutConst(i) => {
                out.push($($r)* i.module);
                out.push($($r)* i.value);
            }
            InstrKind::GetClassVar(i) => out.push($($r)* i.module),
            InstrKind::PutClassVar(i) => {
                out.push($($r)* i.module);
                out.push($($r)* i.value);
            }
            InstrKind::PutGlobalVar(i) => out.push($($r)* i.value),
            InstrKind::BuildCompoundString(i) => {
                for piece in $($r)* i.pieces {
                    out.push(piece);
                }
            }
            InstrKind::BuildSplat(i) => out.push($($r)* i.array),
            InstrKind::BuildCompoundArray(i) => {
                out.push($($r)* i.head);
                out.push($($r)* i.tail);
            }
            InstrKind::BuildLambda(i) => out.push($($r)* i.body),
            InstrKind::BlockGiven(i) => out.push($($r)* i.block),
            InstrKind::ToAry(i) => out.push($($r)* i.array),
            InstrKind::DefineClass(i) => {
                out.push($($r)* i.container);
                out.push($($r)* i.superclass);
            }
            InstrKind::DefineClassMethod(i) => out.push($($r)* i.object),
            InstrKind::ProcessModuleBody(i) => out.push($($r)* i.module),
            InstrKind::MasgnReqd(i) => out.push($($r)* i.array),
            InstrKind::MasgnOpt(i) => out.push($($r)* i.array),
            InstrKind::MasgnRest(i) => out.push($($r)* i.array),
            InstrKind::JumpIndirect(i) => out.push($($r)* i.address),
            InstrKind::Beq(i) | InstrKind::Bne(i) => {
                out.push($($r)* i.arg1);
                out.push($($r)* i.arg2);
            }
            InstrKind::BTrue(i) | InstrKind::BFalse(i) | InstrKind::BNil(i) | InstrKind::BUndef(i) => {
                out.push($($r)* i.value)
            }
            InstrKind::BInt(i) => {
                out.push($($r)* i.arg1);
                out.push($($r)* i.arg2);
            }
            InstrKind::BSwitch(i) => out.push($($r)* i.value),
            InstrKind::Call(b)
            | InstrKind::NoResultCall(b)
            | InstrKind::AttrAssign(b)
            | InstrKind::ZeroOperandArgNoBlockCall(b)
            | InstrKind::OneOperandArgNoBlockCall(b)
            | InstrKind::OneOperandArgBlockCall(b)
            | InstrKind::OneFixnumArgNoBlockCall { base: b, .. }
            | InstrKind::OneFloatArgNoBlockCall { base: b, .. }
            | InstrKind::OneArgNoBlockNoResultCall(b)
            | InstrKind::InstanceSuper(b)
            | InstrKind::ClassSuper(b)
            | InstrKind::UnresolvedSuper(b) => {
                out.push($($r)* b.receiver);
                for arg in $($r)* b.args {
                    out.push(arg);
                }
                if let Some(closure) = $($r)* b.closure {
                    out.push(closure);
                }
            }
            InstrKind::ZSuper(z) => {
                out.push($($r)* z.base.receiver);
                for arg in $($r)* z.base.args {
                    out.push(arg);
                }
                if let Some(closure) = $($r)* z.base.closure {
                    out.push(closure);
                }
            }
            InstrKind::Yield(i) => {
                out.push($($r)* i.block);
                out.push($($r)* i.arg);
            }
            InstrKind::Eqq(i) => {
                out.push($($r)* i.target);
                out.push($($r)* i.value);
            }
            InstrKind::Throw(i) => out.push($($r)* i.value),
            InstrKind::RescueEqq(i) => {
                out.push($($r)* i.exception);
                out.push($($r)* i.classes);
            }
            InstrKind::Return(i) => out.push($($r)* i.value),
            InstrKind::Break(i) => out.push($($r)* i.value),
            InstrKind::NonlocalReturn(i) => out.push($($r)* i.value),
            InstrKind::RuntimeHelper(i) => {
                for arg in $($r)* i.args {
                    out.push(arg);
                }
            }
        }
        out
    }};
}

// Same shape as `collect_operands!`, for the result variable.
macro_rules! result_of {
    ($kind:expr, [$($r:tt)*]) => {
        match $kind {
            InstrKind::Copy(i) => Some($($r)* i.result),
            InstrKind::GetField(i) => Some($($r)* i.result),
            InstrKind::SearchConst(i) | InstrKind::LexicalSearchConst(i) | InstrKind::InheritanceSearchConst(i) => {
                Some($($r)* i.result)
            }
            InstrKind::GetClassVar(i) => Some($($r)* i.result),
            InstrKind::GetGlobalVar(i) => Some($($r)* i.result),
            InstrKind::BuildCompoundString(i) => Some($($r)* i.result),
            InstrKind::BuildSplat(i) => Some($($r)* i.result),
            InstrKind::BuildCompoundArray(i) => Some($($r)* i.result),
            InstrKind::BuildLambda(i) => Some($($r)* i.result),
            InstrKind::BlockGiven(i) => Some($($r)* i.result),
            InstrKind::ToAry(i) => Some($($r)* i.result),
            InstrKind::DefineClass(i) => Some($($r)* i.result),
            InstrKind::ProcessModuleBody(i) => Some($($r)* i.result),
            InstrKind::ReceiveSelf(v) | InstrKind::LoadImplicitClosure(v) | InstrKind::LoadFrameClosure(v) => Some(v),
            InstrKind::ReceivePreReqdArg(i) => Some($($r)* i.result),
            InstrKind::ReceivePostReqdArg(i) => Some($($r)* i.result),
            InstrKind::ReceiveOptArg(i) => Some($($r)* i.result),
            InstrKind::ReceiveRestArg(i) => Some($($r)* i.result),
            InstrKind::ReceiveKeywordArg(i) => Some($($r)* i.result),
            InstrKind::ReceiveKeywordRestArg(i) => Some($($r)* i.result),
            InstrKind::MasgnReqd(i) => Some($($r)* i.result),
            InstrKind::MasgnOpt(i) => Some($($r)* i.result),
            InstrKind::MasgnRest(i) => Some($($r)* i.result),
            InstrKind::Call(b)
            | InstrKind::NoResultCall(b)
            | InstrKind::AttrAssign(b)
            | InstrKind::ZeroOperandArgNoBlockCall(b)
            | InstrKind::OneOperandArgNoBlockCall(b)
            | InstrKind::OneOperandArgBlockCall(b)
            | InstrKind::OneFixnumArgNoBlockCall { base: b, .. }
            | InstrKind::OneFloatArgNoBlockCall { base: b, .. }
            | InstrKind::OneArgNoBlockNoResultCall(b)
            | InstrKind::InstanceSuper(b)
            | InstrKind::ClassSuper(b)
            | InstrKind::UnresolvedSuper(b) => Option::from($($r)* b.result),
            InstrKind::ZSuper(z) => Option::from($($r)* z.base.result),
            InstrKind::Yield(i) => Option::from($($r)* i.result),
            InstrKind::Eqq(i) => Some($($r)* i.result),
            InstrKind::ReceiveException(i) => Some($($r)* i.result),
            InstrKind::RescueEqq(i) => Some($($r)* i.result),
            InstrKind::RuntimeHelper(i) => Some($($r)* i.result),
            _ => None,
        }
    };
}

impl InstrKind {
    pub fn operation(&self) -> Operation {
        match self {
            InstrKind::Label(_) => Operation::Label,
            InstrKind::Nop => Operation::Nop,
            InstrKind::LineNum(_) => Operation::LineNum,
            InstrKind::ThreadPoll => Operation::ThreadPoll,
            InstrKind::PushFrame => Operation::PushFrame,
            InstrKind::PopFrame => Operation::PopFrame,
            InstrKind::PushBinding => Operation::PushBinding,
            InstrKind::PopBinding => Operation::PopBinding,
            InstrKind::CheckArity(_) => Operation::CheckArity,
            InstrKind::CheckArgsArrayArity(_) => Operation::CheckArgsArrayArity,
            InstrKind::RaiseArgumentError(_) => Operation::RaiseArgumentError,
            InstrKind::Guard(_) => Operation::Guard,
            InstrKind::Copy(_) => Operation::Copy,
            InstrKind::GetField(_) => Operation::GetField,
            InstrKind::PutField(_) => Operation::PutField,
            InstrKind::SearchConst(_) => Operation::SearchConst,
            InstrKind::LexicalSearchConst(_) => Operation::LexicalSearchConst,
            InstrKind::InheritanceSearchConst(_) => Operation::InheritanceSearchConst,
            InstrKind::PutConst(_) => Operation::PutConst,
            InstrKind::GetClassVar(_) => Operation::GetClassVar,
            InstrKind::PutClassVar(_) => Operation::PutClassVar,
            InstrKind::GetGlobalVar(_) => Operation::GetGlobalVar,
            InstrKind::PutGlobalVar(_) => Operation::PutGlobalVar,
            InstrKind::BuildCompoundString(_) => Operation::BuildCompoundString,
            InstrKind::BuildSplat(_) => Operation::BuildSplat,
            InstrKind::BuildCompoundArray(_) => Operation::BuildCompoundArray,
            InstrKind::BuildLambda(_) => Operation::BuildLambda,
            InstrKind::BlockGiven(_) => Operation::BlockGiven,
            InstrKind::ToAry(_) => Operation::ToAry,
            InstrKind::DefineClass(_) => Operation::DefineClass,
            InstrKind::DefineInstanceMethod(_) => Operation::DefineInstanceMethod,
            InstrKind::DefineClassMethod(_) => Operation::DefineClassMethod,
            InstrKind::ProcessModuleBody(_) => Operation::ProcessModuleBody,
            InstrKind::ReceiveSelf(_) => Operation::ReceiveSelf,
            InstrKind::ReceivePreReqdArg(_) => Operation::ReceivePreReqdArg,
            InstrKind::ReceivePostReqdArg(_) => Operation::ReceivePostReqdArg,
            InstrKind::ReceiveOptArg(_) => Operation::ReceiveOptArg,
            InstrKind::ReceiveRestArg(_) => Operation::ReceiveRestArg,
            InstrKind::ReceiveKeywordArg(_) => Operation::ReceiveKeywordArg,
            InstrKind::ReceiveKeywordRestArg(_) => Operation::ReceiveKeywordRestArg,
            InstrKind::LoadImplicitClosure(_) => Operation::LoadImplicitClosure,
            InstrKind::LoadFrameClosure(_) => Operation::LoadFrameClosure,
            InstrKind::MasgnReqd(_) => Operation::MasgnReqd,
            InstrKind::MasgnOpt(_) => Operation::MasgnOpt,
            InstrKind::MasgnRest(_) => Operation::MasgnRest,
            InstrKind::Jump(_) => Operation::Jump,
            InstrKind::JumpIndirect(_) => Operation::JumpIndirect,
            InstrKind::Beq(_) => Operation::Beq,
            InstrKind::Bne(_) => Operation::Bne,
            InstrKind::BTrue(_) => Operation::BTrue,
            InstrKind::BFalse(_) => Operation::BFalse,
            InstrKind::BNil(_) => Operation::BNil,
            InstrKind::BUndef(_) => Operation::BUndef,
            InstrKind::BInt(_) => Operation::BInt,
            InstrKind::BSwitch(_) => Operation::BSwitch,
            InstrKind::Call(_) => Operation::Call,
            InstrKind::NoResultCall(_) => Operation::NoResultCall,
            InstrKind::AttrAssign(_) => Operation::AttrAssign,
            InstrKind::ZeroOperandArgNoBlockCall(_) => Operation::ZeroOperandArgNoBlockCall,
            InstrKind::OneOperandArgNoBlockCall(_) => Operation::OneOperandArgNoBlockCall,
            InstrKind::OneOperandArgBlockCall(_) => Operation::OneOperandArgBlockCall,
            InstrKind::OneFixnumArgNoBlockCall { .. } => Operation::OneFixnumArgNoBlockCall,
            InstrKind::OneFloatArgNoBlockCall { .. } => Operation::OneFloatArgNoBlockCall,
            InstrKind::OneArgNoBlockNoResultCall(_) => Operation::OneArgNoBlockNoResultCall,
            InstrKind::InstanceSuper(_) => Operation::InstanceSuper,
            InstrKind::ClassSuper(_) => Operation::ClassSuper,
            InstrKind::UnresolvedSuper(_) => Operation::UnresolvedSuper,
            InstrKind::ZSuper(_) => Operation::ZSuper,
            InstrKind::Yield(_) => Operation::Yield,
            InstrKind::Eqq(_) => Operation::Eqq,
            InstrKind::ExcRegionStart(_) => Operation::ExcRegionStart,
            InstrKind::ExcRegionEnd => Operation::ExcRegionEnd,
            InstrKind::ReceiveException(_) => Operation::ReceiveException,
            InstrKind::Throw(_) => Operation::Throw,
            InstrKind::RescueEqq(_) => Operation::RescueEqq,
            InstrKind::Return(_) => Operation::Return,
            InstrKind::Break(_) => Operation::Break,
            InstrKind::NonlocalReturn(_) => Operation::NonlocalReturn,
            InstrKind::CheckForLocalJumpError(_) => Operation::CheckForLocalJumpError,
            InstrKind::RuntimeHelper(_) => Operation::RuntimeHelper,
        }
    }

    pub fn call_base(&self) -> Option<&CallBase> {
        match self {
            InstrKind::Call(b)
            | InstrKind::NoResultCall(b)
            | InstrKind::AttrAssign(b)
            | InstrKind::ZeroOperandArgNoBlockCall(b)
            | InstrKind::OneOperandArgNoBlockCall(b)
            | InstrKind::OneOperandArgBlockCall(b)
            | InstrKind::OneFixnumArgNoBlockCall { base: b, .. }
            | InstrKind::OneFloatArgNoBlockCall { base: b, .. }
            | InstrKind::OneArgNoBlockNoResultCall(b)
            | InstrKind::InstanceSuper(b)
            | InstrKind::ClassSuper(b)
            | InstrKind::UnresolvedSuper(b) => Some(b),
            InstrKind::ZSuper(z) => Some(&z.base),
            _ => None,
        }
    }

    pub fn call_base_mut(&mut self) -> Option<&mut CallBase> {
        match self {
            InstrKind::Call(b)
            | InstrKind::NoResultCall(b)
            | InstrKind::AttrAssign(b)
            | InstrKind::ZeroOperandArgNoBlockCall(b)
            | InstrKind::OneOperandArgNoBlockCall(b)
            | InstrKind::OneOperandArgBlockCall(b)
            | InstrKind::OneFixnumArgNoBlockCall { base: b, .. }
            | InstrKind::OneFloatArgNoBlockCall { base: b, .. }
            | InstrKind::OneArgNoBlockNoResultCall(b)
            | InstrKind::InstanceSuper(b)
            | InstrKind::ClassSuper(b)
            | InstrKind::UnresolvedSuper(b) => Some(b),
            InstrKind::ZSuper(z) => Some(&mut z.base),
            _ => None,
        }
    }

    fn is_specialized_call(&self) -> bool {
        matches!(
            self,
            InstrKind::ZeroOperandArgNoBlockCall(_)
                | InstrKind::OneOperandArgNoBlockCall(_)
                | InstrKind::OneOperandArgBlockCall(_)
                | InstrKind::OneFixnumArgNoBlockCall { .. }
                | InstrKind::OneFloatArgNoBlockCall { .. }
                | InstrKind::OneArgNoBlockNoResultCall(_)
        )
    }
}

/// An instruction in a scope's list, plus the markers passes and
/// linearisation attach to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Instr {
    pub kind: InstrKind,
    dead: bool,
    has_unused_result: bool,
    ipc: Option<u32>,
    rpc: Option<u32>,
}

impl From<InstrKind> for Instr {
    fn from(kind: InstrKind) -> Self {
        Instr::new(kind)
    }
}

impl Instr {
    /// Wraps `kind`, enforcing its construction invariants.
    pub fn new(kind: InstrKind) -> Self {
        if let Err(err) = validate(&kind) {
            panic!("{}", err);
        }
        Self {
            kind,
            dead: false,
            has_unused_result: false,
            ipc: None,
            rpc: None,
        }
    }

    #[inline]
    pub fn operation(&self) -> Operation {
        self.kind.operation()
    }

    #[inline]
    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn mark_dead(&mut self) {
        self.dead = true;
    }

    #[inline]
    pub fn has_unused_result(&self) -> bool {
        self.has_unused_result
    }

    pub fn mark_unused_result(&mut self) {
        self.has_unused_result = true;
    }

    #[inline]
    pub fn ipc(&self) -> Option<u32> {
        self.ipc
    }

    #[inline]
    pub fn rpc(&self) -> Option<u32> {
        self.rpc
    }

    pub(crate) fn set_pointers(&mut self, ipc: u32, rpc: Option<u32>) {
        self.ipc = Some(ipc);
        self.rpc = rpc;
    }

    pub fn arity(&self) -> Arity {
        match &self.kind {
            InstrKind::BuildCompoundString(_) | InstrKind::RuntimeHelper(_) | InstrKind::ZSuper(_) => Arity::Variable,
            k if k.call_base().is_some() => Arity::Variable,
            _ => Arity::Fixed(self.operands().len()),
        }
    }

    /// Operands in declaration order: receiver, arguments, closure.
    pub fn operands(&self) -> Vec<&Operand> {
        collect_operands!(&self.kind, [&])
    }

    pub fn operands_mut(&mut self) -> Vec<&mut Operand> {
        collect_operands!(&mut self.kind, [&mut])
    }

    pub fn result(&self) -> Option<&Variable> {
        result_of!(&self.kind, [&])
    }

    pub fn result_mut(&mut self) -> Option<&mut Variable> {
        result_of!(&mut self.kind, [&mut])
    }

    /// Labels held outside operands: jump targets, region handlers, resume
    /// points, and the label a `label` instruction defines.
    pub fn labels_mut(&mut self) -> Vec<&mut Label> {
        match &mut self.kind {
            InstrKind::Label(l) => vec![l],
            InstrKind::Guard(g) => vec![&mut g.resume],
            InstrKind::Jump(j) => vec![&mut j.target],
            InstrKind::Beq(b) | InstrKind::Bne(b) => vec![&mut b.target],
            InstrKind::BTrue(b) | InstrKind::BFalse(b) | InstrKind::BNil(b) | InstrKind::BUndef(b) => vec![&mut b.target],
            InstrKind::BInt(b) => vec![&mut b.target],
            InstrKind::BSwitch(s) => {
                let mut out: Vec<&mut Label> = s.targets.iter_mut().collect();
                out.push(&mut s.ruby_case);
                out.push(&mut s.else_target);
                out
            }
            InstrKind::ExcRegionStart(r) => vec![&mut r.rescue],
            _ => Vec::new(),
        }
    }

    /// Every label this instruction may transfer control to, including
    /// label addresses carried in operands.
    pub fn referenced_labels(&self) -> Vec<Label> {
        let mut out = Vec::new();
        match &self.kind {
            InstrKind::Label(_) => {}
            InstrKind::Guard(g) => out.push(g.resume),
            InstrKind::Jump(j) => out.push(j.target),
            InstrKind::Beq(b) | InstrKind::Bne(b) => out.push(b.target),
            InstrKind::BTrue(b) | InstrKind::BFalse(b) | InstrKind::BNil(b) | InstrKind::BUndef(b) => out.push(b.target),
            InstrKind::BInt(b) => out.push(b.target),
            InstrKind::BSwitch(s) => {
                out.extend(s.targets.iter().copied());
                out.push(s.ruby_case);
                out.push(s.else_target);
            }
            InstrKind::ExcRegionStart(r) => out.push(r.rescue),
            _ => {}
        }
        for op in self.operands() {
            if let Operand::Label(l) = op {
                out.push(*l);
            }
        }
        out
    }

    pub fn used_variables(&self) -> Vec<Variable> {
        let mut out = Vec::new();
        for op in self.operands() {
            op.add_used_variables(&mut out);
        }
        out
    }

    pub fn call_base(&self) -> Option<&CallBase> {
        self.kind.call_base()
    }

    pub fn call_base_mut(&mut self) -> Option<&mut CallBase> {
        self.kind.call_base_mut()
    }

    /// Scopes embedded in this instruction (closure bodies, method bodies,
    /// module bodies).
    pub fn nested_scopes(&self) -> Vec<&Arc<Scope>> {
        match &self.kind {
            InstrKind::DefineInstanceMethod(d) => vec![&d.body],
            InstrKind::DefineClassMethod(d) => vec![&d.body],
            InstrKind::ProcessModuleBody(p) => vec![&p.body],
            other => collect_operands!(other, [&])
                .into_iter()
                .filter_map(|op| match op {
                    Operand::Closure(body) => Some(body),
                    _ => None,
                })
                .collect(),
        }
    }

    pub fn nested_scopes_mut(&mut self) -> Vec<&mut Arc<Scope>> {
        match &mut self.kind {
            InstrKind::DefineInstanceMethod(d) => vec![&mut d.body],
            InstrKind::DefineClassMethod(d) => vec![&mut d.body],
            InstrKind::ProcessModuleBody(p) => vec![&mut p.body],
            other => collect_operands!(other, [&mut])
                .into_iter()
                .filter_map(|op| match op {
                    Operand::Closure(body) => Some(body),
                    _ => None,
                })
                .collect(),
        }
    }

    /// Closure bodies only; these share the enclosing binding.
    pub fn closures(&self) -> Vec<&Arc<Scope>> {
        self.operands()
            .into_iter()
            .filter_map(|op| match op {
                Operand::Closure(body) => Some(body),
                _ => None,
            })
            .collect()
    }

    /// Routes every operand through [`Operand::simplified`]. Calls
    /// recompute their derived state afterwards.
    pub fn simplify_operands(&mut self, map: &ValueMap, force: bool) {
        for op in self.operands_mut() {
            let simplified = op.simplified(map, force);
            *op = simplified;
        }
        self.refresh_call();
    }

    /// Recomputes call-derived state; demotes specialised variants whose
    /// shape no longer fits.
    pub(crate) fn refresh_call(&mut self) {
        if let InstrKind::OneFixnumArgNoBlockCall { base, value } = &mut self.kind {
            if let Some(Operand::Fixnum(v)) = base.args.first() {
                *value = *v;
            }
        }
        let Some(base) = self.kind.call_base_mut() else {
            return;
        };
        base.refresh();
        if self.kind.is_specialized_call() && !fits_specialization(&self.kind) {
            if let Some(base) = self.kind.call_base() {
                let base = Box::new(base.clone());
                self.kind = if base.result.is_some() {
                    InstrKind::Call(base)
                } else {
                    InstrKind::NoResultCall(base)
                };
            }
        }
    }

    /// True when removing the instruction cannot change behaviour, given
    /// that its result (if any) is unused.
    pub fn can_be_deleted(&self, scope_flags: ScopeFlags) -> bool {
        let op = self.operation();
        if op == Operation::Label
            || op.has_side_effects()
            || op.can_raise_exception()
            || op.transfers_control()
            || op.is_debug_op()
        {
            return false;
        }
        match self.result() {
            // writes to an enclosing scope's slot escape this scope
            Some(Variable::Local(l)) if l.depth > 0 => false,
            Some(Variable::Local(_)) => !scope_flags.intersects(
                ScopeFlags::BINDING_HAS_ESCAPED | ScopeFlags::USES_EVAL | ScopeFlags::USES_ZSUPER,
            ),
            _ => true,
        }
    }

    /// Adds the scope-wide requirements of this instruction. Monotone;
    /// returns whether anything was added.
    pub fn compute_scope_flags(&self, flags: &mut ScopeFlags) -> bool {
        let mut changed = false;
        if let Some(base) = self.call_base() {
            changed |= base.compute_scope_flags(flags);
        }
        let extra = match &self.kind {
            InstrKind::ZSuper(_) => ScopeFlags::USES_ZSUPER | ScopeFlags::REQUIRES_FRAME,
            InstrKind::UnresolvedSuper(_) | InstrKind::InstanceSuper(_) | InstrKind::ClassSuper(_) => {
                ScopeFlags::REQUIRES_FRAME
            }
            InstrKind::Break(_) => ScopeFlags::HAS_BREAK_INSTRS | ScopeFlags::REQUIRES_DYNSCOPE,
            InstrKind::NonlocalReturn(_) => ScopeFlags::HAS_NONLOCAL_RETURNS | ScopeFlags::REQUIRES_DYNSCOPE,
            InstrKind::PushFrame | InstrKind::PushBinding => ScopeFlags::HAS_EXPLICIT_CALL_PROTOCOL,
            InstrKind::ReceiveKeywordArg(_) | InstrKind::ReceiveKeywordRestArg(_) => {
                ScopeFlags::RECEIVES_KEYWORD_ARGS
            }
            InstrKind::BuildLambda(_) => ScopeFlags::BINDING_HAS_ESCAPED,
            InstrKind::GetGlobalVar(g) if matches!(g.name.as_ref(), "$~" | "$_") => {
                ScopeFlags::USES_BACKREF_OR_LASTLINE
            }
            InstrKind::PutGlobalVar(g) if matches!(g.name.as_ref(), "$~" | "$_") => {
                ScopeFlags::USES_BACKREF_OR_LASTLINE
            }
            _ => ScopeFlags::NONE,
        };
        changed |= flags.insert(extra);
        let touches_parent = self
            .used_variables()
            .iter()
            .chain(self.result())
            .any(|v| v.as_local().is_some_and(|l| l.depth > 0));
        if touches_parent {
            changed |= flags.insert(ScopeFlags::ACCESS_PARENTS_LOCAL_VARIABLES);
        }
        changed
    }

    /// Narrower call variant with identical semantics, or `self` unchanged.
    pub fn specialize(self) -> Instr {
        let Instr {
            kind,
            dead,
            has_unused_result,
            ipc,
            rpc,
        } = self;
        Instr {
            kind: specialize_kind(kind),
            dead,
            has_unused_result,
            ipc,
            rpc,
        }
    }

    // Constructors for the kinds whose form is picked at construction time.

    /// Equality branch, specialised on `arg2`.
    pub fn beq(arg1: Operand, arg2: Operand, target: Label) -> Instr {
        let kind = match (&arg1, &arg2) {
            (_, Operand::Boolean(true)) => InstrKind::BTrue(OneOperandBranch { value: arg1, target }),
            (_, Operand::Boolean(false)) => InstrKind::BFalse(OneOperandBranch { value: arg1, target }),
            (_, Operand::Nil) => InstrKind::BNil(OneOperandBranch { value: arg1, target }),
            (_, Operand::Undefined) => InstrKind::BUndef(OneOperandBranch { value: arg1, target }),
            (Operand::Fixnum(_), Operand::Fixnum(_)) => InstrKind::BInt(BIntInstr {
                op: IntCmp::Eq,
                arg1,
                arg2,
                target,
            }),
            _ => InstrKind::Beq(TwoOperandBranch { arg1, arg2, target }),
        };
        Instr::new(kind)
    }

    /// Generic equality branch, never specialised.
    pub fn beq_generic(arg1: Operand, arg2: Operand, target: Label) -> Instr {
        Instr::new(InstrKind::Beq(TwoOperandBranch { arg1, arg2, target }))
    }

    pub fn bne(arg1: Operand, arg2: Operand, target: Label) -> Instr {
        Instr::new(InstrKind::Bne(TwoOperandBranch { arg1, arg2, target }))
    }

    pub fn jump(target: Label) -> Instr {
        Instr::new(InstrKind::Jump(JumpInstr { target }))
    }

    pub fn label(label: Label) -> Instr {
        Instr::new(InstrKind::Label(label))
    }

    pub fn copy(result: Variable, source: Operand) -> Instr {
        Instr::new(InstrKind::Copy(CopyInstr { result, source }))
    }

    pub fn ret(value: Operand) -> Instr {
        Instr::new(InstrKind::Return(ReturnInstr { value }))
    }

    pub fn call(base: CallBase) -> Instr {
        let base = Box::new(base);
        if base.result.is_some() {
            Instr::new(InstrKind::Call(base))
        } else {
            Instr::new(InstrKind::NoResultCall(base))
        }
    }
}

/// Construction invariants of `kind`. `Instr::new` treats a violation as a
/// bug; the decoder reports it as malformed input.
pub fn validate(kind: &InstrKind) -> Result<(), IrError> {
    let fail = |detail: String| {
        Err(IrError::Malformed {
            op: kind.operation(),
            detail,
        })
    };
    match kind {
        InstrKind::BSwitch(s) if s.cases.len() != s.targets.len() => {
            fail("b_switch needs one target per case".into())
        }
        InstrKind::Copy(c) if c.result == Variable::SelfRef => fail("copy cannot assign %self".into()),
        InstrKind::ReceivePostReqdArg(r) if r.index >= r.post => {
            fail(format!("post-required index {} outside post count {}", r.index, r.post))
        }
        InstrKind::ZSuper(z) if z.arg_counts.iter().map(|c| *c as usize).sum::<usize>() != z.base.args.len() => {
            fail("zsuper level counts must cover every argument".into())
        }
        InstrKind::OneFixnumArgNoBlockCall { base, value } if base.args.first() != Some(&Operand::Fixnum(*value)) => {
            fail("call_1f argument mismatch".into())
        }
        InstrKind::AttrAssign(b) if b.result.is_some() => fail("attr_assign has no result".into()),
        _ => Ok(()),
    }
}

fn fits_specialization(kind: &InstrKind) -> bool {
    let Some(base) = kind.call_base() else {
        return false;
    };
    if base.has_splats() {
        return false;
    }
    match kind {
        InstrKind::ZeroOperandArgNoBlockCall(_) => base.args.is_empty(),
        InstrKind::OneFixnumArgNoBlockCall { .. } => matches!(base.args.as_slice(), [Operand::Fixnum(_)]),
        InstrKind::OneFloatArgNoBlockCall { .. } => matches!(base.args.as_slice(), [Operand::Float(_)]),
        _ => base.args.len() == 1,
    }
}

enum ArgShape {
    Zero,
    Fixnum(i64),
    Float(f64),
    One,
    Many,
}

fn specialize_kind(kind: InstrKind) -> InstrKind {
    let base = match kind {
        InstrKind::Call(base) | InstrKind::NoResultCall(base) => base,
        other => return other,
    };
    if base.has_splats() || base.call_type == CallType::Super {
        return rebuild(base);
    }
    let shape = match base.args.as_slice() {
        [] => ArgShape::Zero,
        [Operand::Fixnum(v)] => ArgShape::Fixnum(*v),
        [Operand::Float(v)] => ArgShape::Float(*v),
        [_] => ArgShape::One,
        _ => ArgShape::Many,
    };
    let no_block = matches!(base.closure, None | Some(Operand::NullBlock));
    let literal_block = base.has_literal_closure();
    let has_result = base.result.is_some();
    match shape {
        ArgShape::Zero if has_result && no_block => InstrKind::ZeroOperandArgNoBlockCall(base),
        ArgShape::Fixnum(value) if has_result && no_block => InstrKind::OneFixnumArgNoBlockCall { base, value },
        ArgShape::Float(value) if has_result && no_block => InstrKind::OneFloatArgNoBlockCall { base, value },
        ArgShape::Fixnum(_) | ArgShape::Float(_) | ArgShape::One if has_result && no_block => {
            InstrKind::OneOperandArgNoBlockCall(base)
        }
        ArgShape::Fixnum(_) | ArgShape::Float(_) | ArgShape::One if has_result && literal_block => {
            InstrKind::OneOperandArgBlockCall(base)
        }
        ArgShape::Fixnum(_) | ArgShape::Float(_) | ArgShape::One if !has_result && no_block => {
            InstrKind::OneArgNoBlockNoResultCall(base)
        }
        _ => rebuild(base),
    }
}

fn rebuild(base: Box<CallBase>) -> InstrKind {
    if base.result.is_some() {
        InstrKind::Call(base)
    } else {
        InstrKind::NoResultCall(base)
    }
}
