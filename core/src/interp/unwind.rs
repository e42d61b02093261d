use std::sync::Arc;

use thiserror::Error;

use crate::{
    error::IrError,
    value::{Exception, Value},
};

/// Everything that leaves an activation other than a normal return.
#[derive(Debug, Clone, Error)]
pub enum Unwind {
    /// Language-level exception; rescuable.
    #[error("{}: {}", .0.class.name(), .0.message)]
    Raise(Arc<Exception>),

    /// `break` out of a block, aimed at the activation that created it.
    #[error("break to activation {target}")]
    Break { target: u64, value: Value },

    /// `return` from inside a block, aimed at the defining method.
    #[error("nonlocal return to activation {target}")]
    Return { target: u64, value: Value },

    /// Guard failure; caught by the loop that executed the guard.
    #[error("deoptimization")]
    Deopt,

    /// The IR itself is unsupported or malformed.
    #[error(transparent)]
    Bug(#[from] IrError),
}

impl Unwind {
    pub fn exception(&self) -> Option<&Arc<Exception>> {
        match self {
            Unwind::Raise(e) => Some(e),
            _ => None,
        }
    }

    /// Break and return jumps, as opposed to errors.
    pub fn is_jump(&self) -> bool {
        matches!(self, Unwind::Break { .. } | Unwind::Return { .. })
    }
}
