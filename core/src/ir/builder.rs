//! Programmatic scope construction.
//!
//! There is no source-language front end; tests, samples and the CLI build
//! IR through [`ScopeBuilder`], which tracks lexical local resolution and the
//! argument lists `zsuper` forwards.

use std::sync::Arc;

use crate::ir::{
    instr::{
        BreakInstr, CallBase, CallType, CheckArityInstr, NonlocalReturnInstr, ReceiveKeywordArgInstr,
        ReceiveKeywordRestArgInstr, ReceiveOptArgInstr, ReceivePostReqdArgInstr, ReceivePreReqdArgInstr,
        ReceiveRestArgInstr, ZSuperInstr,
    },
    Instr, InstrKind, Label, Operand, Scope, ScopeId, ScopeKind, Signature, Variable,
};

/// Parameter list in source order.
#[derive(Debug, Clone, Default)]
pub struct Params {
    pub pre: Vec<Arc<str>>,
    pub opt: Vec<(Arc<str>, Operand)>,
    pub rest: Option<Arc<str>>,
    pub post: Vec<Arc<str>>,
    /// `None` default marks a required keyword.
    pub keywords: Vec<(Arc<str>, Option<Operand>)>,
    pub kwrest: Option<Arc<str>>,
    pub block: Option<Arc<str>>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pre(mut self, names: &[&str]) -> Self {
        self.pre.extend(names.iter().map(|n| Arc::from(*n)));
        self
    }

    pub fn opt(mut self, name: &str, default: Operand) -> Self {
        self.opt.push((name.into(), default));
        self
    }

    pub fn rest(mut self, name: &str) -> Self {
        self.rest = Some(name.into());
        self
    }

    pub fn post(mut self, names: &[&str]) -> Self {
        self.post.extend(names.iter().map(|n| Arc::from(*n)));
        self
    }

    pub fn keyword(mut self, name: &str, default: Option<Operand>) -> Self {
        self.keywords.push((name.into(), default));
        self
    }

    pub fn kwrest(mut self, name: &str) -> Self {
        self.kwrest = Some(name.into());
        self
    }

    pub fn block(mut self, name: &str) -> Self {
        self.block = Some(name.into());
        self
    }

    pub fn signature(&self) -> Signature {
        // required keywords first, as receive order expects
        let mut keywords: Vec<Arc<str>> = self
            .keywords
            .iter()
            .filter(|(_, d)| d.is_none())
            .map(|(k, _)| k.clone())
            .collect();
        let required_keywords = keywords.len() as u32;
        keywords.extend(self.keywords.iter().filter(|(_, d)| d.is_some()).map(|(k, _)| k.clone()));
        Signature {
            pre: self.pre.len() as u32,
            opt: self.opt.len() as u32,
            rest: self.rest.is_some(),
            post: self.post.len() as u32,
            keywords,
            required_keywords,
            kwrest: self.kwrest.is_some(),
            block: self.block.is_some(),
        }
    }
}

pub struct ScopeBuilder {
    scope: Scope,
    // locals of enclosing scopes, innermost first
    outer: Vec<Vec<Arc<str>>>,
    // argument lists visible to zsuper, innermost first
    levels: Vec<Vec<Operand>>,
    // enclosing scopes, innermost first
    enclosing: Vec<(ScopeId, ScopeKind, Arc<str>)>,
}

impl ScopeBuilder {
    pub fn new(kind: ScopeKind, name: &str, file: &str) -> Self {
        Self {
            scope: Scope::new(kind, name, file, 1),
            outer: Vec::new(),
            levels: vec![Vec::new()],
            enclosing: Vec::new(),
        }
    }

    pub fn script(file: &str) -> Self {
        Self::new(ScopeKind::Script, "<main>", file)
    }

    pub fn method(name: &str, file: &str) -> Self {
        Self::new(ScopeKind::Method, name, file)
    }

    pub fn module_body(name: &str, file: &str) -> Self {
        Self::new(ScopeKind::ModuleBody, name, file)
    }

    /// Closure nested in `parent`: parent locals resolve at depth 1 and up.
    pub fn closure(parent: &ScopeBuilder, name: &str) -> Self {
        let mut outer = vec![parent.scope.locals().to_vec()];
        outer.extend(parent.outer.iter().cloned());
        let mut levels = vec![Vec::new()];
        levels.extend(parent.levels.iter().map(|level| level.iter().map(deepen).collect()));
        let mut enclosing = vec![(parent.scope.id(), parent.scope.kind(), parent.scope.name().clone())];
        enclosing.extend(parent.enclosing.iter().cloned());
        Self {
            scope: Scope::new(ScopeKind::Closure, name, parent.scope.file().clone(), parent.scope.line()),
            outer,
            levels,
            enclosing,
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn name(&self) -> &Arc<str> {
        self.scope.name()
    }

    pub fn temp(&mut self) -> Variable {
        self.scope.new_temp()
    }

    /// Lexically resolved local: own slot, enclosing slot, or a new own slot.
    pub fn local(&mut self, name: &str) -> Variable {
        if let Some(offset) = self.scope.locals().iter().position(|l| l.as_ref() == name) {
            return Variable::local(name, 0, offset as u32);
        }
        for (depth, locals) in self.outer.iter().enumerate() {
            if let Some(offset) = locals.iter().position(|l| l.as_ref() == name) {
                return Variable::local(name, depth as u32 + 1, offset as u32);
            }
        }
        self.scope.local_variable(name)
    }

    /// Own slot even when an enclosing scope has the same name (parameters).
    pub fn declare(&mut self, name: &str) -> Variable {
        self.scope.local_variable(name)
    }

    pub fn label(&mut self, prefix: &str) -> Label {
        self.scope.new_label(prefix)
    }

    pub fn place(&mut self, label: Label) -> &mut Self {
        self.emit(Instr::label(label))
    }

    pub fn emit(&mut self, instr: impl Into<Instr>) -> &mut Self {
        self.scope.push(instr);
        self
    }

    pub fn copy(&mut self, result: Variable, source: Operand) -> &mut Self {
        self.emit(Instr::copy(result, source))
    }

    pub fn ret(&mut self, value: Operand) -> &mut Self {
        self.emit(Instr::ret(value))
    }

    /// `break value` out of this closure, aimed at the scope that created it.
    pub fn break_out(&mut self, value: Operand) -> &mut Self {
        let (scope, scope_name) = match self.enclosing.first() {
            Some((id, _, name)) => (*id, name.clone()),
            None => (self.scope.id(), self.scope.name().clone()),
        };
        self.emit(InstrKind::Break(BreakInstr {
            value,
            scope,
            scope_name,
        }))
    }

    /// `return value` from inside a closure: leaves the nearest enclosing
    /// method, or the outermost scope when there is none.
    pub fn nonlocal_return(&mut self, value: Operand) -> &mut Self {
        let target = self
            .enclosing
            .iter()
            .find(|(_, kind, _)| *kind == ScopeKind::Method)
            .or(self.enclosing.last());
        let (method, method_name) = match target {
            Some((id, _, name)) => (*id, name.clone()),
            None => (self.scope.id(), self.scope.name().clone()),
        };
        self.emit(InstrKind::NonlocalReturn(NonlocalReturnInstr {
            value,
            method,
            method_name,
        }))
    }

    /// `recv.name(args)` into a fresh temp.
    pub fn call(&mut self, receiver: Operand, name: &str, args: Vec<Operand>) -> Variable {
        self.call_with_block(receiver, name, args, None)
    }

    pub fn call_with_block(&mut self, receiver: Operand, name: &str, args: Vec<Operand>, block: Option<Operand>) -> Variable {
        let result = self.temp();
        let call_type = if receiver == Operand::self_ref() {
            CallType::Functional
        } else {
            CallType::Normal
        };
        self.emit(Instr::call(CallBase::new(call_type, name, receiver, args, block, Some(result.clone()))));
        result
    }

    /// `name(args)` on self.
    pub fn fcall(&mut self, name: &str, args: Vec<Operand>) -> Variable {
        self.call(Operand::self_ref(), name, args)
    }

    /// Call whose result is discarded.
    pub fn send(&mut self, receiver: Operand, name: &str, args: Vec<Operand>) -> &mut Self {
        let call_type = if receiver == Operand::self_ref() {
            CallType::Functional
        } else {
            CallType::Normal
        };
        self.emit(Instr::call(CallBase::new(call_type, name, receiver, args, None, None)))
    }

    /// Implicit-argument `super`, forwarding every enclosing parameter list.
    pub fn zsuper(&mut self, block: Option<Operand>) -> Variable {
        let result = self.temp();
        let instr = ZSuperInstr::new(Some(result.clone()), Operand::self_ref(), self.levels.clone(), block);
        self.emit(InstrKind::ZSuper(Box::new(instr)));
        result
    }

    /// Emits the arity check and receive sequence for `params` and records
    /// the signature.
    pub fn receive(&mut self, params: &Params) -> &mut Self {
        let signature = params.signature();
        let required = signature.required();
        if self.scope.kind().is_method_like() {
            self.emit(InstrKind::CheckArity(CheckArityInstr {
                required,
                opt: signature.opt,
                rest: signature.rest,
                receives_keywords: signature.accepts_keywords(),
                kwrest: signature.kwrest,
            }));
        }
        let mut forwarded = Vec::new();
        for (index, name) in params.pre.iter().enumerate() {
            let result = self.declare(name);
            forwarded.push(Operand::Var(result.clone()));
            self.emit(InstrKind::ReceivePreReqdArg(ReceivePreReqdArgInstr {
                result,
                index: index as u32,
            }));
        }
        for (index, (name, default)) in params.opt.iter().enumerate() {
            let result = self.declare(name);
            forwarded.push(Operand::Var(result.clone()));
            self.emit(InstrKind::ReceiveOptArg(ReceiveOptArgInstr {
                result: result.clone(),
                index: index as u32,
                required,
                pre: signature.pre,
            }));
            self.fill_default(result, default.clone());
        }
        if let Some(name) = &params.rest {
            let result = self.declare(name);
            forwarded.push(Operand::splat(Operand::Var(result.clone())));
            self.emit(InstrKind::ReceiveRestArg(ReceiveRestArgInstr {
                result,
                index: signature.pre + signature.opt,
                required: required + signature.opt,
            }));
        }
        for (index, name) in params.post.iter().enumerate() {
            let result = self.declare(name);
            forwarded.push(Operand::Var(result.clone()));
            self.emit(InstrKind::ReceivePostReqdArg(ReceivePostReqdArgInstr {
                result,
                index: index as u32,
                pre: signature.pre,
                post: signature.post,
            }));
        }
        let mut kw_pairs = Vec::new();
        for (name, default) in &params.keywords {
            let result = self.declare(name);
            kw_pairs.push((Operand::sym(name), Operand::Var(result.clone())));
            self.emit(InstrKind::ReceiveKeywordArg(ReceiveKeywordArgInstr {
                result: result.clone(),
                name: name.clone(),
                required: default.is_none(),
            }));
            if let Some(default) = default {
                self.fill_default(result, default.clone());
            }
        }
        if !kw_pairs.is_empty() {
            forwarded.push(Operand::Hash(kw_pairs.into()));
        }
        if let Some(name) = &params.kwrest {
            let result = self.declare(name);
            self.emit(InstrKind::ReceiveKeywordRestArg(ReceiveKeywordRestArgInstr { result }));
        }
        if let Some(name) = &params.block {
            let result = self.declare(name);
            self.emit(InstrKind::LoadImplicitClosure(result));
        }
        self.levels[0] = forwarded;
        self.scope.set_signature(signature);
        self
    }

    /// Marks the scope as using its caller's block without naming it.
    pub fn uses_block(&mut self) -> &mut Self {
        let mut signature = self.scope.signature().clone();
        signature.block = true;
        self.scope.set_signature(signature);
        self
    }

    // x = default when the receive produced undefined
    fn fill_default(&mut self, var: Variable, default: Operand) {
        let fill = self.label("opt_fill");
        let done = self.label("opt_done");
        self.emit(Instr::beq(Operand::Var(var.clone()), Operand::Undefined, fill));
        self.emit(Instr::jump(done));
        self.place(fill);
        self.copy(var, default);
        self.place(done);
    }

    pub fn finish(self) -> Scope {
        self.scope
    }

    pub fn finish_arc(self) -> Arc<Scope> {
        Arc::new(self.scope)
    }
}

fn deepen(op: &Operand) -> Operand {
    match op {
        Operand::Var(Variable::Local(l)) => Operand::Var(Variable::Local(l.deeper(1))),
        Operand::Splat(inner) => Operand::splat(deepen(inner)),
        Operand::Hash(pairs) => Operand::Hash(pairs.iter().map(|(k, v)| (deepen(k), deepen(v))).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Operation;

    #[test]
    fn closure_locals_resolve_lexically() {
        let mut method = ScopeBuilder::method("m", "t.rb");
        let x = method.local("x");
        assert_eq!(x, Variable::local("x", 0, 0));
        let mut block = ScopeBuilder::closure(&method, "m_block");
        assert_eq!(block.local("x"), Variable::local("x", 1, 0));
        assert_eq!(block.local("y"), Variable::local("y", 0, 0));
        assert_eq!(block.declare("x"), Variable::local("x", 0, 1));
    }

    #[test]
    fn block_exits_target_their_lexical_owners() {
        let method = ScopeBuilder::method("m", "t.rb");
        let outer = ScopeBuilder::closure(&method, "outer");
        let mut inner = ScopeBuilder::closure(&outer, "inner");
        inner.break_out(Operand::Nil).nonlocal_return(Operand::Nil);
        let scope = inner.finish();
        match (&scope.instrs()[0].kind, &scope.instrs()[1].kind) {
            (InstrKind::Break(b), InstrKind::NonlocalReturn(r)) => {
                assert_eq!(b.scope, outer.scope().id());
                assert_eq!(b.scope_name.as_ref(), "outer");
                assert_eq!(r.method, method.scope().id());
                assert_eq!(r.method_name.as_ref(), "m");
            }
            other => panic!("unexpected instructions {other:?}"),
        }
    }

    #[test]
    fn receive_sequence_matches_signature() {
        let mut b = ScopeBuilder::method("m", "t.rb");
        b.receive(&Params::new().pre(&["a"]).opt("b", Operand::Fixnum(2)).rest("r").post(&["z"]));
        let scope = b.finish();
        let sig = scope.signature();
        assert_eq!((sig.pre, sig.opt, sig.rest, sig.post), (1, 1, true, 1));
        let ops: Vec<Operation> = scope.instrs().iter().map(Instr::operation).collect();
        assert_eq!(ops[0], Operation::CheckArity);
        assert_eq!(ops[1], Operation::ReceivePreReqdArg);
        assert_eq!(ops[2], Operation::ReceiveOptArg);
        assert!(ops.contains(&Operation::ReceiveRestArg));
        assert_eq!(*ops.last().unwrap(), Operation::ReceivePostReqdArg);
    }

    #[test]
    fn zsuper_levels_include_enclosing_method() {
        let mut method = ScopeBuilder::method("m", "t.rb");
        method.receive(&Params::new().pre(&["a", "b"]));
        let mut block = ScopeBuilder::closure(&method, "m_block");
        block.zsuper(None);
        let scope = block.finish();
        let InstrKind::ZSuper(z) = &scope.instrs()[0].kind else {
            panic!("expected zsuper");
        };
        assert_eq!(z.arg_counts, vec![0, 2]);
        assert_eq!(
            z.level_args(1).unwrap()[0],
            Operand::Var(Variable::local("a", 1, 0))
        );
    }
}
