use std::fmt;

/// Static, tag-derived predicates of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OpFlags(u16);

impl OpFlags {
    pub const NONE: OpFlags = OpFlags(0);
    pub const HAS_SIDE_EFFECTS: OpFlags = OpFlags(1 << 0);
    pub const CAN_RAISE: OpFlags = OpFlags(1 << 1);
    pub const TRANSFERS_CONTROL: OpFlags = OpFlags(1 << 2);
    pub const IS_RETURN: OpFlags = OpFlags(1 << 3);
    pub const IS_DEBUG: OpFlags = OpFlags(1 << 4);
    pub const IS_BOOKKEEPING: OpFlags = OpFlags(1 << 5);
    pub const IS_ARG_RECEIVE: OpFlags = OpFlags(1 << 6);
    pub const IS_CALL: OpFlags = OpFlags(1 << 7);
    pub const IS_BRANCH: OpFlags = OpFlags(1 << 8);

    #[inline]
    pub const fn bits(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn contains(self, other: OpFlags) -> bool {
        (self.0 & other.0) == other.0
    }

    #[inline]
    pub const fn union(self, other: OpFlags) -> OpFlags {
        OpFlags(self.0 | other.0)
    }
}

impl std::ops::BitOr for OpFlags {
    type Output = OpFlags;

    fn bitor(self, rhs: OpFlags) -> OpFlags {
        self.union(rhs)
    }
}

/// Dispatch class used by the interpreter loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpClass {
    Arg,
    Branch,
    Call,
    Return,
    BookKeeping,
    Other,
}

macro_rules! operations {
    ($($variant:ident => $name:literal, $flags:expr;)*) => {
        /// Closed enumeration of instruction tags.
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Operation {
            $($variant,)*
        }

        impl Operation {
            /// Every operation, in discriminant order.
            pub const ALL: &'static [Operation] = &[$(Operation::$variant,)*];

            pub const fn name(self) -> &'static str {
                match self {
                    $(Operation::$variant => $name,)*
                }
            }

            pub const fn flags(self) -> OpFlags {
                match self {
                    $(Operation::$variant => $flags,)*
                }
            }
        }
    };
}

const S: OpFlags = OpFlags::HAS_SIDE_EFFECTS;
const R: OpFlags = OpFlags::CAN_RAISE;
const T: OpFlags = OpFlags::TRANSFERS_CONTROL;
const B: OpFlags = OpFlags::IS_BOOKKEEPING;
const A: OpFlags = OpFlags::IS_ARG_RECEIVE;
const CALL: OpFlags = OpFlags::IS_CALL.union(S).union(R);
const BR: OpFlags = OpFlags::IS_BRANCH.union(T);
const NONE: OpFlags = OpFlags::NONE;

operations! {
    // bookkeeping
    Label => "label", B.union(S);
    Nop => "nop", B;
    LineNum => "line_num", B.union(S).union(OpFlags::IS_DEBUG);
    ThreadPoll => "thread_poll", B.union(S).union(R);
    PushFrame => "push_frame", B.union(S);
    PopFrame => "pop_frame", B.union(S);
    PushBinding => "push_binding", B.union(S);
    PopBinding => "pop_binding", B.union(S);
    CheckArity => "check_arity", B.union(S).union(R);
    CheckArgsArrayArity => "check_args_array_arity", B.union(S).union(R);
    RaiseArgumentError => "raise_argument_error", B.union(S).union(R);
    Guard => "guard", B.union(S).union(R);

    // variable, constant and field access
    Copy => "copy", NONE;
    GetField => "get_field", NONE;
    PutField => "put_field", S;
    SearchConst => "search_const", R;
    LexicalSearchConst => "lexical_search_const", R;
    InheritanceSearchConst => "inheritance_search_const", R;
    PutConst => "put_const", S.union(R);
    GetClassVar => "get_cvar", R;
    PutClassVar => "put_cvar", S.union(R);
    GetGlobalVar => "get_global_var", NONE;
    PutGlobalVar => "put_global_var", S;
    BuildCompoundString => "build_compound_string", R;
    BuildSplat => "build_splat", R;
    BuildCompoundArray => "build_compound_array", R;
    BuildLambda => "lambda", NONE;
    BlockGiven => "block_given", NONE;
    ToAry => "to_ary", R;
    DefineClass => "def_class", S.union(R);
    DefineInstanceMethod => "def_inst_meth", S.union(R);
    DefineClassMethod => "def_class_meth", S.union(R);
    ProcessModuleBody => "process_module_body", S.union(R);

    // argument receive and multiple assignment
    ReceiveSelf => "recv_self", A;
    ReceivePreReqdArg => "recv_pre_reqd_arg", A;
    ReceivePostReqdArg => "recv_post_reqd_arg", A;
    ReceiveOptArg => "recv_opt_arg", A;
    ReceiveRestArg => "recv_rest_arg", A;
    ReceiveKeywordArg => "recv_kw_arg", A.union(R);
    ReceiveKeywordRestArg => "recv_kw_rest_arg", A;
    LoadImplicitClosure => "load_implicit_closure", A;
    LoadFrameClosure => "load_frame_closure", A;
    MasgnReqd => "masgn_reqd", NONE;
    MasgnOpt => "masgn_opt", NONE;
    MasgnRest => "masgn_rest", NONE;

    // branches
    Jump => "jump", BR;
    JumpIndirect => "jump_indirect", BR;
    Beq => "beq", BR;
    Bne => "bne", BR;
    BTrue => "btrue", BR;
    BFalse => "bfalse", BR;
    BNil => "bnil", BR;
    BUndef => "bundef", BR;
    BInt => "b_int", BR.union(R);
    BSwitch => "b_switch", BR;

    // calls
    Call => "call", CALL;
    NoResultCall => "noresult_call", CALL;
    AttrAssign => "attr_assign", CALL;
    ZeroOperandArgNoBlockCall => "call_0o", CALL;
    OneOperandArgNoBlockCall => "call_1o", CALL;
    OneOperandArgBlockCall => "call_1ob", CALL;
    OneFixnumArgNoBlockCall => "call_1f", CALL;
    OneFloatArgNoBlockCall => "call_1d", CALL;
    OneArgNoBlockNoResultCall => "noresult_call_1o", CALL;
    InstanceSuper => "instance_super", CALL;
    ClassSuper => "class_super", CALL;
    UnresolvedSuper => "unresolved_super", CALL;
    ZSuper => "zsuper", CALL;
    Yield => "yield", CALL;
    Eqq => "eqq", CALL;

    // exceptions and nonlocal exits
    ExcRegionStart => "exc_region_start", B.union(S);
    ExcRegionEnd => "exc_region_end", B.union(S);
    ReceiveException => "recv_exception", NONE;
    Throw => "throw", S.union(R).union(T);
    RescueEqq => "rescue_eqq", R;
    Return => "return", T.union(OpFlags::IS_RETURN);
    Break => "break", S.union(R).union(T);
    NonlocalReturn => "nonlocal_return", S.union(R).union(T).union(OpFlags::IS_RETURN);
    CheckForLocalJumpError => "check_for_lje", S.union(R);
    RuntimeHelper => "runtime_helper", S.union(R);
}

impl Operation {
    #[inline]
    pub const fn has_side_effects(self) -> bool {
        self.flags().contains(OpFlags::HAS_SIDE_EFFECTS)
    }

    #[inline]
    pub const fn can_raise_exception(self) -> bool {
        self.flags().contains(OpFlags::CAN_RAISE)
    }

    #[inline]
    pub const fn transfers_control(self) -> bool {
        self.flags().contains(OpFlags::TRANSFERS_CONTROL)
    }

    #[inline]
    pub const fn is_debug_op(self) -> bool {
        self.flags().contains(OpFlags::IS_DEBUG)
    }

    #[inline]
    pub const fn is_return(self) -> bool {
        self.flags().contains(OpFlags::IS_RETURN)
    }

    #[inline]
    pub const fn is_arg_receive(self) -> bool {
        self.flags().contains(OpFlags::IS_ARG_RECEIVE)
    }

    #[inline]
    pub const fn is_call(self) -> bool {
        self.flags().contains(OpFlags::IS_CALL)
    }

    #[inline]
    pub const fn is_branch(self) -> bool {
        self.flags().contains(OpFlags::IS_BRANCH)
    }

    #[inline]
    pub const fn is_bookkeeping(self) -> bool {
        self.flags().contains(OpFlags::IS_BOOKKEEPING)
    }

    pub const fn op_class(self) -> OpClass {
        let flags = self.flags();
        if matches!(self, Operation::Return) {
            OpClass::Return
        } else if flags.contains(OpFlags::IS_BRANCH) {
            OpClass::Branch
        } else if flags.contains(OpFlags::IS_CALL) {
            OpClass::Call
        } else if flags.contains(OpFlags::IS_ARG_RECEIVE) {
            OpClass::Arg
        } else if flags.contains(OpFlags::IS_BOOKKEEPING) {
            OpClass::BookKeeping
        } else {
            OpClass::Other
        }
    }

    pub fn from_u8(tag: u8) -> Option<Operation> {
        Operation::ALL.get(tag as usize).copied()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_table_matches_discriminants() {
        for (idx, op) in Operation::ALL.iter().enumerate() {
            assert_eq!(*op as u8 as usize, idx, "{} out of order", op);
            assert_eq!(Operation::from_u8(idx as u8), Some(*op));
        }
        assert_eq!(Operation::from_u8(Operation::ALL.len() as u8), None);
    }

    #[test]
    fn names_are_unique() {
        let mut names: Vec<&str> = Operation::ALL.iter().map(|op| op.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Operation::ALL.len());
    }

    #[test]
    fn classes_follow_flags() {
        assert_eq!(Operation::Return.op_class(), OpClass::Return);
        assert_eq!(Operation::BSwitch.op_class(), OpClass::Branch);
        assert_eq!(Operation::ZSuper.op_class(), OpClass::Call);
        assert_eq!(Operation::ReceiveOptArg.op_class(), OpClass::Arg);
        assert_eq!(Operation::CheckArity.op_class(), OpClass::BookKeeping);
        assert_eq!(Operation::Copy.op_class(), OpClass::Other);
        assert!(Operation::LineNum.is_debug_op());
        assert!(!Operation::Copy.has_side_effects());
        assert!(Operation::Break.transfers_control());
    }
}
