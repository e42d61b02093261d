//! Interpreter core: per-thread execution context, activation state,
//! argument handling, call-site caches and the instruction loop.
//!
//! Non-local control flow (exceptions, `break`, nonlocal `return`, guard
//! failures) travels as [`Unwind`] through `Result`; every instruction
//! returns `Result<_, Unwind>` and the loop routes errors to the rescue
//! pointer of the failing instruction.

mod args;
mod caches;
mod config;
mod context;
mod dynamic_scope;
mod engine;
mod exec;
mod frame;
mod state;
mod unwind;

#[cfg(test)]
mod interp_test;

pub use caches::CacheStats;
pub use config::{InterpConfig, DEFAULT_MAX_DEPTH};
pub(crate) use context::Activation;
pub use context::ExecutionContext;
pub use dynamic_scope::{DynamicScope, ScopeRole};
pub use frame::Frame;
pub use state::InterpState;
pub use unwind::Unwind;
