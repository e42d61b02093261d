use std::sync::Arc;

use crate::{
    error::IrError,
    ir::{Scope, Variable},
    runtime::RModule,
    value::{Block, BlockKind, Value},
};

use super::{args::ArgsState, DynamicScope, Frame, Unwind};

/// Per-activation interpreter state: self, temporaries, dynamic scope,
/// lexical module, frame and arguments.
pub struct InterpState {
    scope: Arc<Scope>,
    self_value: Value,
    module: Arc<RModule>,
    frame: Frame,
    dyn_scope: Option<DynamicScope>,
    temps: Vec<Value>,
    pub(crate) args: ArgsState,
    /// Block passed to this activation
    block: Option<Arc<Block>>,
    /// The block being executed, when this activation is a block body
    this_block: Option<Arc<Block>>,
    /// Signal being handled by the current rescue handler
    pub(crate) pending: Option<Unwind>,
}

impl InterpState {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        scope: Arc<Scope>,
        temp_count: u32,
        self_value: Value,
        module: Arc<RModule>,
        frame: Frame,
        dyn_scope: Option<DynamicScope>,
        args: ArgsState,
        block: Option<Arc<Block>>,
        this_block: Option<Arc<Block>>,
    ) -> Self {
        Self {
            scope,
            self_value,
            module,
            frame,
            dyn_scope,
            temps: vec![Value::Nil; temp_count as usize],
            args,
            block,
            this_block,
            pending: None,
        }
    }

    pub fn scope(&self) -> &Arc<Scope> {
        &self.scope
    }

    pub fn self_value(&self) -> &Value {
        &self.self_value
    }

    /// Lexically enclosing module: where `def` installs and constants
    /// resolve.
    pub fn module(&self) -> &Arc<RModule> {
        &self.module
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn dyn_scope(&self) -> Option<&DynamicScope> {
        self.dyn_scope.as_ref()
    }

    pub(crate) fn install_dyn_scope(&mut self, scope: DynamicScope) {
        self.dyn_scope = Some(scope);
    }

    pub fn block(&self) -> Option<&Arc<Block>> {
        self.block.as_ref()
    }

    pub fn this_block(&self) -> Option<&Arc<Block>> {
        self.this_block.as_ref()
    }

    pub fn in_lambda(&self) -> bool {
        self.this_block.as_ref().is_some_and(|b| b.is_lambda())
    }

    fn local_scope(&self, depth: u32) -> Result<&DynamicScope, Unwind> {
        self.dyn_scope
            .as_ref()
            .and_then(|d| d.ancestor(depth))
            .ok_or_else(|| {
                Unwind::Bug(IrError::internal(format!(
                    "{}: no dynamic scope at depth {}",
                    self.scope.name(),
                    depth
                )))
            })
    }

    pub fn get_var(&self, var: &Variable) -> Result<Value, Unwind> {
        match var {
            Variable::SelfRef => Ok(self.self_value.clone()),
            Variable::Temp(i) => self
                .temps
                .get(*i as usize)
                .cloned()
                .ok_or_else(|| Unwind::Bug(IrError::internal(format!("temporary %v_{} out of range", i)))),
            Variable::Local(l) => Ok(self.local_scope(l.depth)?.get(l.offset)),
        }
    }

    pub fn set_var(&mut self, var: &Variable, value: Value) -> Result<(), Unwind> {
        match var {
            Variable::SelfRef => Err(Unwind::Bug(IrError::internal("assignment to %self"))),
            Variable::Temp(i) => {
                let i = *i as usize;
                if i >= self.temps.len() {
                    // inlining may add temporaries after the context was sized
                    self.temps.resize(i + 1, Value::Nil);
                }
                self.temps[i] = value;
                Ok(())
            }
            Variable::Local(l) => {
                self.local_scope(l.depth)?.set(l.offset, value);
                Ok(())
            }
        }
    }

    /// Closure over the current activation.
    pub fn make_block(&self, body: &Arc<Scope>, kind: BlockKind) -> Result<Arc<Block>, Unwind> {
        let binding = self.dyn_scope.clone().ok_or_else(|| {
            Unwind::Bug(IrError::internal(format!(
                "{}: closure {} created without a binding",
                self.scope.name(),
                body.name()
            )))
        })?;
        Ok(Arc::new(Block::new(
            body.clone(),
            self.self_value.clone(),
            binding,
            self.frame.clone(),
            self.module.clone(),
            kind,
        )))
    }
}
