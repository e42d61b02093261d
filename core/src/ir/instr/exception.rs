use std::{fmt, sync::Arc};

use crate::ir::{Label, Operand, ScopeId, Variable};

/// Opens a protected region whose exceptions land on `rescue`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExcRegionStartInstr {
    pub rescue: Label,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReceiveExceptionInstr {
    pub result: Variable,
    /// Coerce internal jumps into language exceptions.
    pub unwrap: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThrowInstr {
    pub value: Operand,
}

/// `rescue Foo, Bar => e`: does `exception` match any of `classes`?
#[derive(Debug, Clone, PartialEq)]
pub struct RescueEqqInstr {
    pub result: Variable,
    pub exception: Operand,
    pub classes: Operand,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnInstr {
    pub value: Operand,
}

/// `break` out of a block. `scope` is the scope that created the block, so
/// an inliner can tell when the break lands in its host; the name is only
/// for listings.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakInstr {
    pub value: Operand,
    pub scope: ScopeId,
    pub scope_name: Arc<str>,
}

/// `return` from inside a block: leaves the defining method.
#[derive(Debug, Clone, PartialEq)]
pub struct NonlocalReturnInstr {
    pub value: Operand,
    pub method: ScopeId,
    pub method_name: Arc<str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckForLjeInstr {
    pub maybe_lambda: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HelperMethod {
    /// A break aimed at this activation becomes its value; anything else
    /// keeps propagating.
    HandlePropagatedBreak,
    /// A return aimed at this method activation becomes its value.
    HandleNonlocalReturn,
    HandleBreakAndReturnsInLambdas,
}

impl HelperMethod {
    pub const ALL: [HelperMethod; 3] = [
        HelperMethod::HandlePropagatedBreak,
        HelperMethod::HandleNonlocalReturn,
        HelperMethod::HandleBreakAndReturnsInLambdas,
    ];

    pub fn as_u8(self) -> u8 {
        match self {
            HelperMethod::HandlePropagatedBreak => 0,
            HelperMethod::HandleNonlocalReturn => 1,
            HelperMethod::HandleBreakAndReturnsInLambdas => 2,
        }
    }

    pub fn from_u8(tag: u8) -> Option<HelperMethod> {
        HelperMethod::ALL.get(tag as usize).copied()
    }
}

impl fmt::Display for HelperMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HelperMethod::HandlePropagatedBreak => "handle_propagated_break",
            HelperMethod::HandleNonlocalReturn => "handle_nonlocal_return",
            HelperMethod::HandleBreakAndReturnsInLambdas => "handle_break_and_returns_in_lambdas",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeHelperInstr {
    pub result: Variable,
    pub helper: HelperMethod,
    pub args: Vec<Operand>,
}
