//! Scopes: the unit of IR. One per script, module body, method, closure or
//! eval string.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use once_cell::sync::OnceCell;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::{
    error::IrError,
    ir::{Instr, InstrKind, Label, LabelTable, Operation, ScopeFlags, Variable},
};

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique scope identity. Survives cloning so the interpreter can
/// match breaks and returns to the scope that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    pub fn fresh() -> ScopeId {
        ScopeId(NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Script,
    ModuleBody,
    Method,
    Closure,
    Eval,
}

impl ScopeKind {
    pub const ALL: [ScopeKind; 5] = [
        ScopeKind::Script,
        ScopeKind::ModuleBody,
        ScopeKind::Method,
        ScopeKind::Closure,
        ScopeKind::Eval,
    ];

    /// Method-like scopes receive arguments and own a frame.
    pub fn is_method_like(self) -> bool {
        matches!(self, ScopeKind::Method)
    }

    pub fn as_u8(self) -> u8 {
        match self {
            ScopeKind::Script => 0,
            ScopeKind::ModuleBody => 1,
            ScopeKind::Method => 2,
            ScopeKind::Closure => 3,
            ScopeKind::Eval => 4,
        }
    }

    pub fn from_u8(tag: u8) -> Option<ScopeKind> {
        ScopeKind::ALL.get(tag as usize).copied()
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScopeKind::Script => "script",
            ScopeKind::ModuleBody => "module",
            ScopeKind::Method => "method",
            ScopeKind::Closure => "closure",
            ScopeKind::Eval => "eval",
        })
    }
}

/// Parameter list of a method or closure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    pub pre: u32,
    pub opt: u32,
    pub rest: bool,
    pub post: u32,
    /// Declared keyword names, required ones first.
    pub keywords: Vec<Arc<str>>,
    pub required_keywords: u32,
    pub kwrest: bool,
    /// Explicit `&blk` parameter or any implicit block use.
    pub block: bool,
}

impl Signature {
    pub fn required(&self) -> u32 {
        self.pre + self.post
    }

    pub fn accepts_keywords(&self) -> bool {
        !self.keywords.is_empty() || self.kwrest
    }

    pub fn is_required_keyword(&self, name: &str) -> bool {
        self.keywords
            .iter()
            .take(self.required_keywords as usize)
            .any(|k| k.as_ref() == name)
    }

    pub fn knows_keyword(&self, name: &str) -> bool {
        self.keywords.iter().any(|k| k.as_ref() == name)
    }
}

/// A protected range of the linear instruction array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionRegion {
    pub start: u32,
    pub end: u32,
    pub rescue: u32,
}

/// Flat, interpretable form of a scope: markers removed, labels resolved to
/// instruction indices, each instruction carrying its rescue pointer.
#[derive(Debug, Clone)]
pub struct InterpreterContext {
    instrs: Vec<Instr>,
    label_pcs: FxHashMap<Label, u32>,
    regions: Vec<ExceptionRegion>,
    temp_count: u32,
    local_count: u32,
    flags: ScopeFlags,
}

impl InterpreterContext {
    #[inline]
    pub fn instrs(&self) -> &[Instr] {
        &self.instrs
    }

    #[inline]
    pub fn pc_of(&self, label: Label) -> Option<usize> {
        self.label_pcs.get(&label).map(|pc| *pc as usize)
    }

    pub fn regions(&self) -> &[ExceptionRegion] {
        &self.regions
    }

    pub fn temp_count(&self) -> u32 {
        self.temp_count
    }

    pub fn local_count(&self) -> u32 {
        self.local_count
    }

    pub fn flags(&self) -> ScopeFlags {
        self.flags
    }
}

#[derive(Debug, Clone)]
pub struct Scope {
    id: ScopeId,
    kind: ScopeKind,
    name: Arc<str>,
    file: Arc<str>,
    line: u32,
    signature: Signature,
    instrs: Vec<Instr>,
    labels: LabelTable,
    temp_count: u32,
    locals: Vec<Arc<str>>,
    flags: OnceCell<ScopeFlags>,
    interp: OnceCell<Arc<InterpreterContext>>,
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.instrs == other.instrs
    }
}

impl Scope {
    pub fn new(kind: ScopeKind, name: impl Into<Arc<str>>, file: impl Into<Arc<str>>, line: u32) -> Self {
        Self::with_id(ScopeId::fresh(), kind, name, file, line)
    }

    /// Rebuilds a scope under a known identity (decoder, scope copies).
    pub fn with_id(
        id: ScopeId,
        kind: ScopeKind,
        name: impl Into<Arc<str>>,
        file: impl Into<Arc<str>>,
        line: u32,
    ) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
            file: file.into(),
            line,
            signature: Signature::default(),
            instrs: Vec::new(),
            labels: LabelTable::new(),
            temp_count: 0,
            locals: Vec::new(),
            flags: OnceCell::new(),
            interp: OnceCell::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> ScopeId {
        self.id
    }

    #[inline]
    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    #[inline]
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn file(&self) -> &Arc<str> {
        &self.file
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    #[inline]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn set_signature(&mut self, signature: Signature) {
        self.signature = signature;
        self.invalidate();
    }

    #[inline]
    pub fn instrs(&self) -> &[Instr] {
        &self.instrs
    }

    /// Mutable instruction list. Cached flags and linear form are dropped.
    pub fn instrs_mut(&mut self) -> &mut Vec<Instr> {
        self.invalidate();
        &mut self.instrs
    }

    pub fn push(&mut self, instr: impl Into<Instr>) {
        self.invalidate();
        self.instrs.push(instr.into());
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub(crate) fn set_labels(&mut self, labels: LabelTable) {
        self.labels = labels;
    }

    pub fn new_label(&mut self, prefix: &str) -> Label {
        self.labels.fresh(prefix)
    }

    pub fn new_temp(&mut self) -> Variable {
        let v = Variable::Temp(self.temp_count);
        self.temp_count += 1;
        v
    }

    pub fn temp_count(&self) -> u32 {
        self.temp_count
    }

    pub(crate) fn set_temp_count(&mut self, count: u32) {
        self.temp_count = count;
    }

    pub fn locals(&self) -> &[Arc<str>] {
        &self.locals
    }

    pub(crate) fn set_locals(&mut self, locals: Vec<Arc<str>>) {
        self.locals = locals;
    }

    /// Depth-0 local named `name`, allocating a slot on first use.
    pub fn local_variable(&mut self, name: &str) -> Variable {
        let offset = match self.locals.iter().position(|l| l.as_ref() == name) {
            Some(offset) => offset,
            None => {
                self.locals.push(name.into());
                self.invalidate();
                self.locals.len() - 1
            }
        };
        Variable::local(name, 0, offset as u32)
    }

    /// Slot that cannot collide with any existing local (inlined code).
    pub fn new_local(&mut self, hint: &str) -> Variable {
        let mut n = self.locals.len();
        let name: Arc<str> = loop {
            let candidate = format!("{}%{}", hint, n);
            if !self.locals.iter().any(|l| l.as_ref() == candidate) {
                break candidate.into();
            }
            n += 1;
        };
        self.locals.push(name.clone());
        self.invalidate();
        Variable::local(name, 0, (self.locals.len() - 1) as u32)
    }

    /// Drops every cached derivation; called after any mutation.
    pub fn invalidate(&mut self) {
        self.flags = OnceCell::new();
        self.interp = OnceCell::new();
    }

    /// Scope flags, computed once per instruction-list version.
    pub fn flags(&self) -> ScopeFlags {
        *self.flags.get_or_init(|| self.compute_flags())
    }

    fn compute_flags(&self) -> ScopeFlags {
        let mut flags = ScopeFlags::NONE;
        if self.kind == ScopeKind::Eval {
            flags.insert(ScopeFlags::BINDING_HAS_ESCAPED);
        }
        if self.signature.block {
            flags.insert(ScopeFlags::RECEIVES_CLOSURE_ARG);
        }
        if self.signature.accepts_keywords() {
            flags.insert(ScopeFlags::RECEIVES_KEYWORD_ARGS);
        }
        let mut has_closures = false;
        for instr in self.instrs.iter().filter(|i| !i.is_dead()) {
            instr.compute_scope_flags(&mut flags);
            for closure in instr.closures() {
                has_closures = true;
                let child = closure.flags();
                if child.contains(ScopeFlags::USES_EVAL) {
                    flags.insert(
                        ScopeFlags::CAN_RECEIVE_BREAKS | ScopeFlags::CAN_RECEIVE_NONLOCAL_RETURNS | ScopeFlags::USES_ZSUPER,
                    );
                    continue;
                }
                if child.intersects(ScopeFlags::HAS_BREAK_INSTRS | ScopeFlags::CAN_RECEIVE_BREAKS) {
                    flags.insert(ScopeFlags::CAN_RECEIVE_BREAKS);
                }
                if child.intersects(ScopeFlags::HAS_NONLOCAL_RETURNS | ScopeFlags::CAN_RECEIVE_NONLOCAL_RETURNS) {
                    flags.insert(ScopeFlags::CAN_RECEIVE_NONLOCAL_RETURNS);
                }
                if child.contains(ScopeFlags::USES_ZSUPER) {
                    flags.insert(ScopeFlags::USES_ZSUPER);
                }
            }
        }
        if has_closures || !self.locals.is_empty() {
            flags.insert(ScopeFlags::REQUIRES_DYNSCOPE);
        }
        debug!(target: "irx::ir::flags", scope = %self.name, flags = %flags, "computed scope flags");
        flags
    }

    /// Every scope embedded in this one's instructions, in order.
    pub fn nested_scopes(&self) -> Vec<&Arc<Scope>> {
        self.instrs.iter().flat_map(|i| i.nested_scopes()).collect()
    }

    /// Removes instructions marked dead.
    pub fn compact(&mut self) -> usize {
        let before = self.instrs.len();
        self.instrs.retain(|i| !i.is_dead());
        let removed = before - self.instrs.len();
        if removed > 0 {
            self.invalidate();
        }
        removed
    }

    /// Linear form, built on first use and cached until the next mutation.
    pub fn interpreter_context(&self) -> Result<Arc<InterpreterContext>, IrError> {
        self.interp
            .get_or_try_init(|| self.linearize().map(Arc::new))
            .cloned()
    }

    /// Flattens the instruction list: labels become indices, region markers
    /// become per-instruction rescue pointers.
    pub fn linearize(&self) -> Result<InterpreterContext, IrError> {
        let mut instrs: Vec<Instr> = Vec::with_capacity(self.instrs.len());
        let mut rescue_labels: Vec<Option<Label>> = Vec::with_capacity(self.instrs.len());
        let mut label_pcs: FxHashMap<Label, u32> = FxHashMap::default();
        let mut open: Vec<(u32, Label)> = Vec::new();
        let mut closed: Vec<(u32, u32, Label)> = Vec::new();

        for instr in self.instrs.iter().filter(|i| !i.is_dead()) {
            let pc = instrs.len() as u32;
            match &instr.kind {
                InstrKind::Label(l) => {
                    label_pcs.insert(*l, pc);
                }
                InstrKind::ExcRegionStart(r) => open.push((pc, r.rescue)),
                InstrKind::ExcRegionEnd => {
                    let (start, rescue) = open.pop().ok_or(IrError::Malformed {
                        op: Operation::ExcRegionEnd,
                        detail: "region end without a matching start".into(),
                    })?;
                    closed.push((start, pc, rescue));
                }
                _ => {
                    instrs.push(instr.clone());
                    rescue_labels.push(open.last().map(|(_, rescue)| *rescue));
                }
            }
        }
        if !open.is_empty() {
            return Err(IrError::Malformed {
                op: Operation::ExcRegionStart,
                detail: format!("{} unterminated exception region(s)", open.len()),
            });
        }

        let resolve = |label: Label| label_pcs.get(&label).copied().ok_or(IrError::UnresolvedLabel(label.index()));
        for (pc, (instr, rescue)) in instrs.iter_mut().zip(rescue_labels).enumerate() {
            for target in instr.referenced_labels() {
                resolve(target)?;
            }
            let rpc = rescue.map(resolve).transpose()?;
            instr.set_pointers(pc as u32, rpc);
        }
        let regions = closed
            .into_iter()
            .map(|(start, end, rescue)| {
                Ok(ExceptionRegion {
                    start,
                    end,
                    rescue: resolve(rescue)?,
                })
            })
            .collect::<Result<Vec<_>, IrError>>()?;

        debug!(
            target: "irx::ir::linearize",
            scope = %self.name,
            instrs = instrs.len(),
            regions = regions.len(),
            "linearized scope"
        );
        Ok(InterpreterContext {
            instrs,
            label_pcs,
            regions,
            temp_count: self.temp_count,
            local_count: self.locals.len() as u32,
            flags: self.flags(),
        })
    }
}
