use std::sync::Arc;

use crate::{
    runtime::RModule,
    value::{Block, Value},
};

/// Per-method-call information: what `super`, `block_given?` and backtraces
/// read.
#[derive(Debug, Clone)]
pub struct Frame {
    pub name: Arc<str>,
    /// Module the executing method was found in
    pub module: Arc<RModule>,
    pub self_value: Value,
    pub block: Option<Arc<Block>>,
}

impl Frame {
    pub fn new(name: Arc<str>, module: Arc<RModule>, self_value: Value, block: Option<Arc<Block>>) -> Self {
        Self {
            name,
            module,
            self_value,
            block,
        }
    }
}
