use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::{
    error::IrError,
    ir::{instr::CallType, Scope, ScopeFlags, ScopeId, ScopeKind},
    runtime::{ErrorClass, Method, MethodBody, RModule, Runtime, Visibility},
    value::{Block, Value},
};

use super::{
    args::ArgsState,
    caches::{CacheStats, CallEntry, CallSiteCache, ConstEntry, CacheCheck},
    dynamic_scope::ScopeRole,
    engine, DynamicScope, Frame, InterpConfig, InterpState, Unwind,
};

/// Call-site identity: owning scope and the instruction's `ipc`.
pub(crate) type SiteKey = (ScopeId, u32);

/// Per-thread interpreter context: the runtime, configuration, this
/// thread's cache slab and the frame stack.
pub struct ExecutionContext {
    runtime: Arc<Runtime>,
    config: InterpConfig,
    call_caches: FxHashMap<SiteKey, CallSiteCache>,
    const_caches: FxHashMap<SiteKey, ConstEntry>,
    frames: Vec<Frame>,
    depth: usize,
    stats: CacheStats,
}

/// Everything needed to start one activation of a scope.
pub(crate) struct Activation {
    pub(crate) self_value: Value,
    pub(crate) module: Arc<RModule>,
    pub(crate) frame: Frame,
    pub(crate) args: Vec<Value>,
    pub(crate) block: Option<Arc<Block>>,
    /// Binding of the block being run, if any
    pub(crate) binding: Option<DynamicScope>,
    pub(crate) this_block: Option<Arc<Block>>,
}

impl ExecutionContext {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self::with_config(runtime, InterpConfig::default())
    }

    pub fn with_config(runtime: Arc<Runtime>, config: InterpConfig) -> Self {
        Self {
            runtime,
            config,
            call_caches: FxHashMap::default(),
            const_caches: FxHashMap::default(),
            frames: Vec::new(),
            depth: 0,
            stats: CacheStats::default(),
        }
    }

    #[inline]
    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn config(&self) -> &InterpConfig {
        &self.config
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub(crate) fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub(crate) fn pop_frame(&mut self) {
        self.frames.pop();
    }

    pub(crate) fn note_deopt(&mut self) {
        self.stats.deopts += 1;
    }

    /// Elements a `*value` expands to.
    pub fn splat(&self, value: &Value) -> Result<Vec<Value>, Unwind> {
        Ok(match value {
            Value::Array(items) => items.to_vec(),
            Value::Nil => Vec::new(),
            other => vec![other.clone()],
        })
    }

    /// Cached constant for a site, valid only under `generation`.
    pub(crate) fn cached_const(&self, site: SiteKey, name: &str, generation: u64) -> Option<Value> {
        if !self.config.inline_caches {
            return None;
        }
        self.const_caches.get(&site).and_then(|entry| entry.get(name, generation))
    }

    pub(crate) fn cache_const(&mut self, site: SiteKey, name: &Arc<str>, value: Value, generation: u64) {
        if self.config.inline_caches {
            self.const_caches.insert(
                site,
                ConstEntry {
                    name: name.clone(),
                    value,
                    generation,
                },
            );
        }
    }

    fn lookup(
        &mut self,
        site: Option<SiteKey>,
        refined: bool,
        receiver: &Value,
        name: &str,
        call_type: CallType,
    ) -> Option<(Arc<Method>, Arc<RModule>)> {
        let rt = self.runtime.clone();
        let Some(site) = site.filter(|_| self.config.inline_caches && !refined) else {
            self.stats.bypassed += 1;
            return rt.find_method(receiver, name);
        };
        let key = rt.receiver_key(receiver);
        let generation = rt.method_generation();
        let cache = self.call_caches.entry(site).or_default();
        match cache.check(name, key, call_type, generation) {
            CacheCheck::Hit(method, owner) => {
                self.stats.hits += 1;
                return Some((method, owner));
            }
            CacheCheck::Stale => self.stats.invalidations += 1,
            CacheCheck::Miss => {}
        }
        self.stats.misses += 1;
        trace!(target: "irx::interp::slowpath", method = name, scope = site.0.get(), ipc = site.1, "call-site cache miss");
        let (method, owner) = rt.find_method(receiver, name)?;
        cache.store(CallEntry {
            name: Arc::from(name),
            receiver_key: key,
            call_type,
            generation,
            method: method.clone(),
            owner: owner.clone(),
        });
        Some((method, owner))
    }

    /// Method dispatch with visibility checks, through the site's cache when
    /// one is given.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn dispatch(
        &mut self,
        site: Option<SiteKey>,
        refined: bool,
        receiver: &Value,
        name: &str,
        args: Vec<Value>,
        block: Option<Arc<Block>>,
        call_type: CallType,
    ) -> Result<Value, Unwind> {
        let Some((method, owner)) = self.lookup(site, refined, receiver, name, call_type) else {
            return Err(self.runtime.no_method_error(receiver, name));
        };
        if method.visibility == Visibility::Private && !call_type.allows_private() {
            return Err(self.runtime.error(
                ErrorClass::NoMethod,
                format!("private method '{}' called for {}", name, self.runtime.describe(receiver)),
            ));
        }
        self.invoke_method(&method, &owner, receiver.clone(), args, block)
    }

    /// Uncached call, as builtins and embedders make it.
    pub fn call_method(
        &mut self,
        receiver: &Value,
        name: &str,
        args: Vec<Value>,
        block: Option<Arc<Block>>,
        call_type: CallType,
    ) -> Result<Value, Unwind> {
        self.dispatch(None, false, receiver, name, args, block, call_type)
    }

    pub fn invoke_method(
        &mut self,
        method: &Method,
        owner: &Arc<RModule>,
        receiver: Value,
        args: Vec<Value>,
        block: Option<Arc<Block>>,
    ) -> Result<Value, Unwind> {
        match &method.body {
            MethodBody::Native(f) => f(self, &receiver, args, block),
            MethodBody::Ir(body) => {
                let frame = Frame::new(method.name.clone(), owner.clone(), receiver.clone(), block.clone());
                self.invoke_scope(
                    body,
                    Activation {
                        self_value: receiver,
                        module: owner.clone(),
                        frame,
                        args,
                        block,
                        binding: None,
                        this_block: None,
                    },
                )
            }
            MethodBody::Block(b) => self.call_block_with(b, args, block, Some(receiver)),
        }
    }

    /// Calls a block or proc with already evaluated arguments.
    pub fn call_block(&mut self, block: &Arc<Block>, args: Vec<Value>, block_arg: Option<Arc<Block>>) -> Result<Value, Unwind> {
        self.call_block_with(block, args, block_arg, None)
    }

    pub(crate) fn call_block_with(
        &mut self,
        block: &Arc<Block>,
        args: Vec<Value>,
        block_arg: Option<Arc<Block>>,
        self_override: Option<Value>,
    ) -> Result<Value, Unwind> {
        let args = block.spread_args(args);
        let self_value = self_override.unwrap_or_else(|| block.self_value().clone());
        let mut frame = block.frame().clone();
        if block.is_method_body() {
            frame.self_value = self_value.clone();
            frame.block = block_arg.clone();
        }
        self.invoke_scope(
            block.body(),
            Activation {
                self_value,
                module: block.module().clone(),
                frame,
                args,
                block: block_arg,
                binding: Some(block.binding().clone()),
                this_block: Some(block.clone()),
            },
        )
    }

    /// Runs a top-level script with `main` as self.
    pub fn run_script(&mut self, scope: &Arc<Scope>) -> Result<Value, Unwind> {
        let rt = self.runtime.clone();
        let main = rt.main().clone();
        let object = rt.object_class().clone();
        let frame = Frame::new(scope.name().clone(), object.clone(), main.clone(), None);
        let result = self.invoke_scope(
            scope,
            Activation {
                self_value: main,
                module: object,
                frame,
                args: Vec::new(),
                block: None,
                binding: None,
                this_block: None,
            },
        );
        match result {
            Err(Unwind::Break { .. }) => Err(rt.error(ErrorClass::LocalJump, "break from proc-closure")),
            Err(Unwind::Return { .. }) => Err(rt.error(ErrorClass::LocalJump, "unexpected return")),
            Err(Unwind::Deopt) => Err(Unwind::Bug(IrError::internal("deoptimization escaped its guard"))),
            other => other,
        }
    }

    pub(crate) fn invoke_scope(&mut self, scope: &Arc<Scope>, act: Activation) -> Result<Value, Unwind> {
        if self.depth >= self.config.max_depth {
            return Err(self.runtime.error(ErrorClass::SystemStack, "stack level too deep"));
        }
        let ic = scope.interpreter_context()?;
        let flags = ic.flags();
        let slots = ic.local_count() as usize;

        let dyn_scope = match (&act.this_block, act.binding) {
            (Some(block), Some(parent)) => {
                let role = if block.is_method_body() {
                    ScopeRole::BlockMethod
                } else if block.is_lambda() {
                    ScopeRole::Lambda
                } else {
                    ScopeRole::Plain
                };
                Some(DynamicScope::new(slots, Some(parent), role))
            }
            _ if scope.kind() != ScopeKind::Method || flags.contains(ScopeFlags::REQUIRES_DYNSCOPE) => {
                let role = if scope.kind().is_method_like() {
                    ScopeRole::Method
                } else {
                    ScopeRole::Plain
                };
                Some(DynamicScope::new(slots, None, role))
            }
            _ => None,
        };
        let own_target = dyn_scope.as_ref().filter(|d| d.is_return_target()).map(DynamicScope::id);

        let strict = act.this_block.as_ref().is_some_and(|b| b.is_lambda());
        let args = ArgsState::new(act.args, scope.signature());
        let mut state = InterpState::new(
            scope.clone(),
            ic.temp_count(),
            act.self_value,
            act.module,
            act.frame,
            dyn_scope,
            args,
            act.block,
            act.this_block,
        );
        if strict {
            let sig = scope.signature();
            state
                .args
                .check_arity(self, sig, sig.required(), sig.opt, sig.rest, sig.accepts_keywords(), sig.kwrest)?;
        }

        // explicit-protocol bodies push their own frame; an unwind may skip
        // their pop, so the stack is restored to its height on entry
        let frames_on_entry = self.frames.len();
        if !flags.contains(ScopeFlags::HAS_EXPLICIT_CALL_PROTOCOL) {
            self.frames.push(state.frame().clone());
        }
        self.depth += 1;
        let result = engine::interpret(self, &mut state, &ic);
        self.depth -= 1;
        self.frames.truncate(frames_on_entry);
        if let Some(d) = state.dyn_scope() {
            d.deactivate();
        }

        match result {
            Err(Unwind::Return { target, value }) if Some(target) == own_target => {
                debug!(target: "irx::interp::unwind", scope = %scope.name(), "nonlocal return caught");
                Ok(value)
            }
            other => other,
        }
    }

    /// `super` dispatch starting above `module`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn dispatch_super(
        &mut self,
        module: &Arc<RModule>,
        name: &str,
        singleton: bool,
        receiver: &Value,
        args: Vec<Value>,
        block: Option<Arc<Block>>,
    ) -> Result<Value, Unwind> {
        let found = module.superclass().and_then(|parent| {
            if singleton {
                parent.find_singleton_method(name)
            } else {
                parent.find_method(name)
            }
        });
        trace!(
            target: "irx::interp::slowpath",
            module = module.name(),
            method = name,
            found = found.is_some(),
            "super resolution"
        );
        let Some((method, owner)) = found else {
            return Err(self.runtime.error(
                ErrorClass::NoMethod,
                format!("super: no superclass method '{}' for {}", name, self.runtime.describe(receiver)),
            ));
        };
        self.invoke_method(&method, &owner, receiver.clone(), args, block)
    }
}
