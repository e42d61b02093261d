use thiserror::Error;

use crate::ir::Operation;

/// Implementation-completeness failures raised by the IR layer itself.
///
/// These never describe user program errors. Language-level errors travel as
/// [`Unwind::Raise`](crate::interp::Unwind::Raise) instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IrError {
    #[error("{op} does not support {what}")]
    Unsupported { op: Operation, what: &'static str },

    #[error("operand {operand} cannot be cloned under {mode}")]
    UnsupportedOperand { operand: String, mode: &'static str },

    #[error("label L{0} was never placed in the instruction list")]
    UnresolvedLabel(u32),

    #[error("{op}: {detail}")]
    Malformed { op: Operation, detail: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl IrError {
    pub fn unsupported(op: Operation, what: &'static str) -> Self {
        IrError::Unsupported { op, what }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        IrError::Internal(detail.into())
    }
}
