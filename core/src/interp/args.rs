use std::{cell::OnceCell, sync::Arc};

use crate::{
    ir::{
        instr::{receive, CallBase},
        Operand, Signature,
    },
    runtime::ErrorClass,
    value::{Block, Value},
};

use super::{ExecutionContext, InterpState, Unwind};

type Pairs = Arc<[(Value, Value)]>;

/// Arguments of one activation. The trailing keyword hash is resolved
/// lazily, on the first receive or arity check that needs it.
#[derive(Debug)]
pub(crate) struct ArgsState {
    args: Arc<[Value]>,
    accepts_keywords: bool,
    required: u32,
    kwargs: OnceCell<Option<Pairs>>,
    consumed: Vec<Arc<str>>,
}

impl ArgsState {
    pub(crate) fn new(args: Vec<Value>, signature: &Signature) -> Self {
        Self {
            args: Arc::from(args),
            accepts_keywords: signature.accepts_keywords(),
            required: signature.required(),
            kwargs: OnceCell::new(),
            consumed: Vec::new(),
        }
    }

    pub(crate) fn empty() -> Self {
        Self::new(Vec::new(), &Signature::default())
    }

    fn keywords(&self) -> Option<&Pairs> {
        self.kwargs
            .get_or_init(|| {
                if !self.accepts_keywords || self.args.len() <= self.required as usize {
                    return None;
                }
                match self.args.last() {
                    Some(Value::Hash(pairs)) if pairs.iter().all(|(k, _)| matches!(k, Value::Symbol(_))) => {
                        Some(pairs.clone())
                    }
                    _ => None,
                }
            })
            .as_ref()
    }

    /// Positional arguments; excludes a resolved keyword hash.
    pub(crate) fn positional(&self) -> &[Value] {
        match self.keywords() {
            Some(_) => &self.args[..self.args.len() - 1],
            None => &self.args,
        }
    }

    pub(crate) fn all(&self) -> &Arc<[Value]> {
        &self.args
    }

    pub(crate) fn pre(&self, index: u32) -> Value {
        self.positional().get(index as usize).cloned().unwrap_or(Value::Nil)
    }

    pub(crate) fn post(&self, index: u32, pre: u32, post: u32) -> Value {
        let args = self.positional();
        receive::post_reqd_index(args.len(), pre, post, index)
            .and_then(|i| args.get(i).cloned())
            .unwrap_or(Value::Nil)
    }

    pub(crate) fn opt(&self, index: u32, required: u32, pre: u32) -> Value {
        let args = self.positional();
        receive::opt_index(args.len(), required, pre, index)
            .and_then(|i| args.get(i).cloned())
            .unwrap_or(Value::Undefined)
    }

    pub(crate) fn rest(&self, index: u32, required: u32) -> Value {
        if required == 0 && index == 0 && self.keywords().is_none() {
            return Value::Array(self.args.clone());
        }
        let args = self.positional();
        Value::array(args[receive::rest_range(args.len(), required, index)].to_vec())
    }

    /// Named keyword receive. Missing required keywords raise; missing
    /// optional ones yield `undefined` so the default fill runs.
    pub(crate) fn keyword(&mut self, ctx: &ExecutionContext, name: &Arc<str>, required: bool) -> Result<Value, Unwind> {
        self.consumed.push(name.clone());
        let found = self.keywords().and_then(|pairs| {
            pairs
                .iter()
                .find(|(k, _)| matches!(k, Value::Symbol(s) if s == name))
                .map(|(_, v)| v.clone())
        });
        match found {
            Some(v) => Ok(v),
            None if required => Err(ctx.runtime().error(ErrorClass::Argument, format!("missing keyword: :{}", name))),
            None => Ok(Value::Undefined),
        }
    }

    /// Keywords no named receive consumed.
    pub(crate) fn keyword_rest(&self) -> Value {
        let rest = self
            .keywords()
            .map(|pairs| {
                pairs
                    .iter()
                    .filter(|(k, _)| !matches!(k, Value::Symbol(s) if self.consumed.contains(s)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Value::hash(rest)
    }

    /// Arity plus unknown-keyword validation.
    pub(crate) fn check_arity(
        &self,
        ctx: &ExecutionContext,
        signature: &Signature,
        required: u32,
        opt: u32,
        rest: bool,
        receives_keywords: bool,
        kwrest: bool,
    ) -> Result<(), Unwind> {
        let given = self.positional().len() as u32;
        if given < required || (!rest && given > required + opt) {
            let expected = crate::ir::instr::expected_arity(required, opt, rest);
            return Err(ctx.runtime().error(
                ErrorClass::Argument,
                format!("wrong number of arguments (given {}, expected {})", given, expected),
            ));
        }
        if receives_keywords
            && !kwrest
            && let Some(pairs) = self.keywords()
        {
            let unknown: Vec<String> = pairs
                .iter()
                .filter_map(|(k, _)| match k {
                    Value::Symbol(s) if !signature.knows_keyword(s) => Some(format!(":{}", s)),
                    _ => None,
                })
                .collect();
            if !unknown.is_empty() {
                let noun = if unknown.len() == 1 { "keyword" } else { "keywords" };
                return Err(ctx.runtime().error(
                    ErrorClass::Argument,
                    format!("unknown {}: {}", noun, unknown.join(", ")),
                ));
            }
        }
        Ok(())
    }
}

/// Argument evaluation when the call has no splats.
pub(crate) fn prepare_simple(ctx: &mut ExecutionContext, state: &InterpState, args: &[Operand]) -> Result<Vec<Value>, Unwind> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        out.push(arg.retrieve(ctx, state)?);
    }
    Ok(out)
}

/// Argument evaluation expanding the positions flagged in `splat_map`.
pub(crate) fn prepare_complex(
    ctx: &mut ExecutionContext,
    state: &InterpState,
    args: &[Operand],
    splat_map: &[bool],
) -> Result<Vec<Value>, Unwind> {
    let mut out = Vec::with_capacity(args.len());
    for (arg, splatted) in args.iter().zip(splat_map) {
        match (arg, splatted) {
            (Operand::Splat(inner), true) => {
                let v = inner.retrieve(ctx, state)?;
                out.extend(ctx.splat(&v)?);
            }
            _ => out.push(arg.retrieve(ctx, state)?),
        }
    }
    Ok(out)
}

pub(crate) fn prepare_args(ctx: &mut ExecutionContext, state: &InterpState, call: &CallBase) -> Result<Vec<Value>, Unwind> {
    match call.splat_map() {
        None => prepare_simple(ctx, state, &call.args),
        Some(map) => prepare_complex(ctx, state, &call.args, map),
    }
}

/// Resolves the closure operand: nothing or `nil` is "no block", a proc
/// passes through, anything else is a `TypeError`.
pub(crate) fn prepare_block(
    ctx: &mut ExecutionContext,
    state: &InterpState,
    closure: Option<&Operand>,
) -> Result<Option<Arc<Block>>, Unwind> {
    let Some(closure) = closure else {
        return Ok(None);
    };
    match closure.retrieve(ctx, state)? {
        Value::Nil | Value::Undefined => Ok(None),
        Value::Proc(block) => Ok(Some(block)),
        other => Err(ctx.runtime().error(
            ErrorClass::Type,
            format!("wrong argument type {} (expected Proc)", ctx.runtime().class_of(&other).name()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        interp::Frame,
        ir::{Params, Scope, ScopeKind, Variable},
        runtime::Runtime,
    };

    fn sig(params: Params) -> Signature {
        params.signature()
    }

    #[test]
    fn post_required_reads_from_the_end() {
        let s = sig(Params::new().pre(&["a", "b"]).post(&["z"]));
        let args = ArgsState::new((1..=5).map(Value::Int).collect(), &s);
        assert_eq!(args.post(0, 2, 1), Value::Int(5));
        let short = ArgsState::new(vec![Value::Int(1), Value::Int(2)], &s);
        assert_eq!(short.post(0, 2, 1), Value::Nil);
    }

    #[test]
    fn rest_without_required_shares_the_argument_array() {
        let s = sig(Params::new().rest("r"));
        let args = ArgsState::new(vec![Value::Int(1), Value::Int(2)], &s);
        let Value::Array(rest) = args.rest(0, 0) else {
            panic!("rest must be an array");
        };
        assert!(Arc::ptr_eq(&rest, args.all()));
    }

    #[test]
    fn keyword_hash_is_only_split_off_when_accepted() {
        let kw = Value::hash(vec![(Value::sym("k"), Value::Int(1))]);
        let plain = ArgsState::new(vec![Value::Int(0), kw.clone()], &sig(Params::new().pre(&["a"]).opt("b", Operand::Nil)));
        assert_eq!(plain.positional().len(), 2);
        let keyed = ArgsState::new(
            vec![Value::Int(0), kw],
            &sig(Params::new().pre(&["a"]).keyword("k", None)),
        );
        assert_eq!(keyed.positional().len(), 1);
    }

    #[test]
    fn keyword_hash_needs_more_args_than_required() {
        let kw = Value::hash(vec![(Value::sym("k"), Value::Int(1))]);
        let s = sig(Params::new().pre(&["a"]).keyword("k", Some(Operand::Nil)));
        let args = ArgsState::new(vec![kw.clone()], &s);
        assert_eq!(args.positional(), &[kw]);
    }

    #[test]
    fn splat_free_arguments_prepare_the_same_either_way() {
        let rt = Runtime::new();
        let mut ctx = ExecutionContext::new(rt.clone());
        let scope = Arc::new(Scope::new(ScopeKind::Method, "m", "t.rb", 1));
        let object = rt.object_class().clone();
        let frame = Frame::new("m".into(), object.clone(), rt.main().clone(), None);
        let mut state = InterpState::new(
            scope,
            2,
            rt.main().clone(),
            object,
            frame,
            None,
            ArgsState::new(Vec::new(), &Signature::default()),
            None,
            None,
        );
        state.set_var(&Variable::Temp(1), Value::str("t")).unwrap();

        let args = vec![
            Operand::Fixnum(1),
            Operand::Var(Variable::Temp(1)),
            Operand::array(vec![Operand::Fixnum(2), Operand::Nil]),
            Operand::sym("k"),
            Operand::Var(Variable::SelfRef),
        ];
        let simple = prepare_simple(&mut ctx, &state, &args).unwrap();
        let complex = prepare_complex(&mut ctx, &state, &args, &vec![false; args.len()]).unwrap();
        assert_eq!(simple.len(), args.len());
        assert_eq!(simple, complex);
    }
}
