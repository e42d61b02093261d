//! The IR: operands, instructions, scopes and the passes over them.

pub mod builder;
pub mod clone;
mod flags;
pub mod instr;
mod operand;
mod operation;
pub mod passes;
pub mod printer;
mod scope;
pub mod visitor;

pub use builder::{Params, ScopeBuilder};
pub use clone::{CloneContext, CloneMode, InlineArgs, InlineSite};
pub use flags::ScopeFlags;
pub use instr::{Arity, Instr, InstrKind};
pub use operand::{Label, LabelTable, LocalVar, Operand, ValueMap, Variable};
pub use operation::{OpClass, OpFlags, Operation};
pub use scope::{ExceptionRegion, InterpreterContext, Scope, ScopeId, ScopeKind, Signature};
pub use visitor::InstrVisitor;
