use std::{fmt, sync::Arc};

use crate::{
    interp::{DynamicScope, Frame},
    ir::Scope,
    runtime::RModule,
};

use super::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Literal block passed to a call
    Normal,
    /// Block reified with `proc`/`Proc.new` or `&blk`
    Proc,
    /// Lambda: strict arity, `return` and `break` leave the lambda itself
    Lambda,
}

/// A closure body bound to the activation that created it.
#[derive(Clone)]
pub struct Block {
    body: Arc<Scope>,
    self_value: Value,
    binding: DynamicScope,
    frame: Frame,
    module: Arc<RModule>,
    kind: BlockKind,
    /// Set for blocks installed with `define_method`; such a block is the
    /// method-like boundary for `zsuper` and nonlocal return.
    method_body: bool,
}

impl Block {
    pub fn new(
        body: Arc<Scope>,
        self_value: Value,
        binding: DynamicScope,
        frame: Frame,
        module: Arc<RModule>,
        kind: BlockKind,
    ) -> Self {
        Self {
            body,
            self_value,
            binding,
            frame,
            module,
            kind,
            method_body: false,
        }
    }

    pub fn body(&self) -> &Arc<Scope> {
        &self.body
    }

    pub fn self_value(&self) -> &Value {
        &self.self_value
    }

    pub fn binding(&self) -> &DynamicScope {
        &self.binding
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn module(&self) -> &Arc<RModule> {
        &self.module
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    #[inline]
    pub fn is_lambda(&self) -> bool {
        self.kind == BlockKind::Lambda
    }

    pub fn is_method_body(&self) -> bool {
        self.method_body
    }

    pub fn with_kind(&self, kind: BlockKind) -> Block {
        Block { kind, ..self.clone() }
    }

    /// Rebinds `self`, as `instance_eval`/`instance_exec` do.
    pub fn with_self(&self, self_value: Value) -> Block {
        Block {
            self_value,
            ..self.clone()
        }
    }

    /// The block as installed by `define_method`: lambda semantics, with the
    /// defining name and module as its frame.
    pub fn as_method_body(&self, name: Arc<str>, module: Arc<RModule>) -> Block {
        let mut frame = self.frame.clone();
        frame.name = name;
        frame.module = module;
        Block {
            kind: BlockKind::Lambda,
            frame,
            method_body: true,
            ..self.clone()
        }
    }

    /// Normal blocks and procs spread a lone array argument over several
    /// parameters; lambdas never do.
    pub fn spread_args(&self, args: Vec<Value>) -> Vec<Value> {
        if self.kind == BlockKind::Lambda || args.len() != 1 {
            return args;
        }
        let sig = self.body.signature();
        let wants_many = sig.pre + sig.opt + sig.post > 1 || (sig.rest && sig.pre + sig.post > 0);
        match (&args[0], wants_many) {
            (Value::Array(items), true) => items.to_vec(),
            _ => args,
        }
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("body", &self.body.name())
            .field("kind", &self.kind)
            .field("binding", &self.binding.id())
            .finish()
    }
}
