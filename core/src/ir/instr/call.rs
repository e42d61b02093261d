use std::{fmt, sync::Arc};

use crate::ir::{Operand, ScopeFlags, Variable};

/// How the receiver of a call was expressed at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallType {
    /// `recv.m(...)`: public methods only
    Normal,
    /// `m(...)` with implicit self: private methods allowed
    Functional,
    /// Bare identifier that was not a known local: `m`
    Variable,
    Super,
    Unknown,
}

impl CallType {
    pub const ALL: [CallType; 5] = [
        CallType::Normal,
        CallType::Functional,
        CallType::Variable,
        CallType::Super,
        CallType::Unknown,
    ];

    pub fn allows_private(self) -> bool {
        matches!(self, CallType::Functional | CallType::Variable)
    }

    pub fn as_u8(self) -> u8 {
        match self {
            CallType::Normal => 0,
            CallType::Functional => 1,
            CallType::Variable => 2,
            CallType::Super => 3,
            CallType::Unknown => 4,
        }
    }

    pub fn from_u8(tag: u8) -> Option<CallType> {
        CallType::ALL.get(tag as usize).copied()
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CallType::Normal => "NORMAL",
            CallType::Functional => "FUNCTIONAL",
            CallType::Variable => "VARIABLE",
            CallType::Super => "SUPER",
            CallType::Unknown => "UNKNOWN",
        })
    }
}

const EVAL_METHODS: &[&str] = &["eval", "module_eval", "class_eval", "instance_eval", "instance_exec"];

const SEND_METHODS: &[&str] = &["send", "__send__", "public_send"];

// Forwarded names that make a `send` potentially reach eval.
const SEND_FORWARDS_TO_EVAL: &[&str] = &[
    "eval",
    "module_eval",
    "class_eval",
    "instance_eval",
    "instance_exec",
    "call",
    "send",
    "__send__",
];

/// Methods that read or capture the caller's local variables.
pub const SCOPE_AWARE_METHODS: &[&str] = &[
    "eval",
    "module_eval",
    "class_eval",
    "instance_eval",
    "module_exec",
    "class_exec",
    "instance_exec",
    "binding",
    "local_variables",
];

/// Methods that read or modify the caller's frame.
pub const FRAME_AWARE_METHODS: &[&str] = &[
    "eval",
    "module_eval",
    "class_eval",
    "instance_eval",
    "binding",
    "public",
    "private",
    "protected",
    "module_function",
    "block_given?",
    "iterator?",
    "__method__",
    "__callee__",
];

/// Facts inferred from a call's name and argument shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallFlags {
    pub can_be_eval: bool,
    pub requires_binding: bool,
    pub requires_frame: bool,
}

/// Shared payload of every call-like instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct CallBase {
    pub call_type: CallType,
    pub name: Arc<str>,
    pub receiver: Operand,
    pub args: Vec<Operand>,
    pub closure: Option<Operand>,
    pub result: Option<Variable>,
    /// Refinement-sensitive sites resolve on every call.
    pub potentially_refined: bool,
    splat_map: Option<Box<[bool]>>,
    flags: CallFlags,
}

impl CallBase {
    pub fn new(
        call_type: CallType,
        name: impl Into<Arc<str>>,
        receiver: Operand,
        args: Vec<Operand>,
        closure: Option<Operand>,
        result: Option<Variable>,
    ) -> Self {
        let mut base = Self {
            call_type,
            name: name.into(),
            receiver,
            args,
            closure,
            result,
            potentially_refined: false,
            splat_map: None,
            flags: CallFlags::default(),
        };
        base.refresh();
        base
    }

    pub fn refined(mut self, potentially_refined: bool) -> Self {
        self.potentially_refined = potentially_refined;
        self
    }

    /// Recomputes everything derived from the operands. Must run after any
    /// operand rewrite.
    pub fn refresh(&mut self) {
        self.splat_map = build_splat_map(&self.args);
        let can_be_eval = self.compute_can_be_eval();
        let requires_binding = self.compute_requires_binding(can_be_eval);
        let requires_frame = requires_binding || FRAME_AWARE_METHODS.contains(&self.name.as_ref());
        self.flags = CallFlags {
            can_be_eval,
            requires_binding,
            requires_frame,
        };
    }

    #[inline]
    pub fn splat_map(&self) -> Option<&[bool]> {
        self.splat_map.as_deref()
    }

    #[inline]
    pub fn has_splats(&self) -> bool {
        self.splat_map.is_some()
    }

    pub fn flags(&self) -> CallFlags {
        self.flags
    }

    pub fn can_be_eval(&self) -> bool {
        self.flags.can_be_eval
    }

    pub fn requires_binding(&self) -> bool {
        self.flags.requires_binding
    }

    pub fn requires_frame(&self) -> bool {
        self.flags.requires_frame
    }

    pub fn has_literal_closure(&self) -> bool {
        matches!(self.closure, Some(Operand::Closure(_)))
    }

    fn is_send(&self) -> bool {
        SEND_METHODS.contains(&self.name.as_ref())
    }

    /// Name `send` forwards to, when it is a literal.
    fn forwarded_name(&self) -> Option<&str> {
        if self.is_send() {
            self.args.first().and_then(Operand::as_static_name)
        } else {
            None
        }
    }

    // Argument-less forms (`instance_eval { }`, `send`) carry no source string.
    fn compute_can_be_eval(&self) -> bool {
        let Some(first) = self.args.first() else {
            return false;
        };
        if EVAL_METHODS.contains(&self.name.as_ref()) {
            return true;
        }
        if !self.is_send() {
            return false;
        }
        match first.as_static_name() {
            None => true,
            Some(target) => SEND_FORWARDS_TO_EVAL.contains(&target),
        }
    }

    fn compute_requires_binding(&self, can_be_eval: bool) -> bool {
        if self.has_literal_closure() || can_be_eval {
            return true;
        }
        let name = self.forwarded_name().unwrap_or(self.name.as_ref());
        SCOPE_AWARE_METHODS.contains(&name)
    }

    /// Scope requirements implied by this call site.
    pub fn compute_scope_flags(&self, scope_flags: &mut ScopeFlags) -> bool {
        let mut changed = false;
        if self.flags.requires_binding {
            changed |= scope_flags.insert(ScopeFlags::BINDING_HAS_ESCAPED);
        }
        if self.flags.requires_frame {
            changed |= scope_flags.insert(ScopeFlags::REQUIRES_FRAME);
        }
        if self.flags.can_be_eval {
            changed |= scope_flags.insert(
                ScopeFlags::USES_EVAL | ScopeFlags::CAN_RECEIVE_BREAKS | ScopeFlags::CAN_RECEIVE_NONLOCAL_RETURNS,
            );
            if scope_flags.contains(ScopeFlags::RECEIVES_CLOSURE_ARG) && self.args.len() > 1 {
                changed |= scope_flags.insert(ScopeFlags::CAN_CAPTURE_CALLERS_BINDING);
            }
        }
        let name = self.forwarded_name().unwrap_or(self.name.as_ref());
        if name == "local_variables" || name == "binding" {
            changed |= scope_flags.insert(ScopeFlags::REQUIRES_DYNSCOPE);
        }
        changed
    }

    /// Single non-splat argument, if that is the whole argument list.
    pub fn single_plain_arg(&self) -> Option<&Operand> {
        match self.args.as_slice() {
            [only] if !only.is_splat() => Some(only),
            _ => None,
        }
    }
}

/// Positions of splat arguments, or `None` when every argument is plain.
pub fn build_splat_map(args: &[Operand]) -> Option<Box<[bool]>> {
    if args.iter().any(Operand::is_splat) {
        Some(args.iter().map(Operand::is_splat).collect())
    } else {
        None
    }
}

/// `zsuper`: forwards the implicit arguments of the nearest method-like
/// activation. `base.args` holds the flattened candidates of every
/// enclosing argument-receiving scope, innermost first; `arg_counts[i]` is
/// the length of level `i`'s slice.
#[derive(Debug, Clone, PartialEq)]
pub struct ZSuperInstr {
    pub base: CallBase,
    pub arg_counts: Vec<u32>,
}

impl ZSuperInstr {
    pub fn new(result: Option<Variable>, receiver: Operand, levels: Vec<Vec<Operand>>, closure: Option<Operand>) -> Self {
        let arg_counts = levels.iter().map(|level| level.len() as u32).collect();
        let args = levels.into_iter().flatten().collect();
        Self {
            base: CallBase::new(CallType::Super, "super", receiver, args, closure, result),
            arg_counts,
        }
    }

    /// Operands visible at `level`, or `None` past the last recorded level.
    pub fn level_args(&self, level: usize) -> Option<&[Operand]> {
        let count = *self.arg_counts.get(level)? as usize;
        let start: usize = self.arg_counts[..level].iter().map(|c| *c as usize).sum();
        self.base.args.get(start..start + count)
    }
}

/// `yield`: invokes the frame's block.
#[derive(Debug, Clone, PartialEq)]
pub struct YieldInstr {
    pub result: Option<Variable>,
    pub block: Operand,
    /// `Undefined` for a bare `yield`
    pub arg: Operand,
    /// Spread an array argument over several block parameters.
    pub unwrap: bool,
}

/// Case equality used by `when` clauses: `target === value`.
#[derive(Debug, Clone, PartialEq)]
pub struct EqqInstr {
    pub result: Variable,
    pub target: Operand,
    pub value: Operand,
    /// `when *list`: `target` is an array whose elements are tried in order.
    pub splatted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<Operand>) -> CallBase {
        CallBase::new(CallType::Normal, name, Operand::self_ref(), args, None, Some(Variable::Temp(0)))
    }

    #[test]
    fn eval_family_can_be_eval() {
        for name in ["eval", "module_eval", "class_eval", "instance_eval", "instance_exec"] {
            assert!(call(name, vec![Operand::str("1")]).can_be_eval(), "{}", name);
        }
        assert!(!call("puts", vec![Operand::str("1")]).can_be_eval());
    }

    #[test]
    fn eval_without_arguments_is_not_eval() {
        for name in ["eval", "instance_eval", "class_eval"] {
            assert!(!call(name, vec![]).can_be_eval(), "{}", name);
        }
        // the block form still needs the caller's binding
        let block = CallBase::new(
            CallType::Normal,
            "instance_eval",
            Operand::self_ref(),
            vec![],
            Some(Operand::Var(Variable::Temp(2))),
            None,
        );
        assert!(!block.can_be_eval());
        assert!(block.requires_binding());
    }

    #[test]
    fn send_forwarding_to_eval_can_be_eval() {
        assert!(call("send", vec![Operand::str("eval"), Operand::str("1+1")]).can_be_eval());
        assert!(call("__send__", vec![Operand::sym("eval")]).can_be_eval());
        assert!(call("public_send", vec![Operand::sym("call")]).can_be_eval());
        assert!(!call("send", vec![Operand::sym("puts")]).can_be_eval());
        assert!(!call("send", vec![]).can_be_eval());
    }

    #[test]
    fn send_with_unknown_name_is_conservative() {
        let c = call("send", vec![Operand::Var(Variable::Temp(3))]);
        assert!(c.can_be_eval());
        assert!(c.requires_binding());
        assert!(c.requires_frame());
    }

    #[test]
    fn scope_and_frame_awareness() {
        let lv = call("local_variables", vec![]);
        assert!(lv.requires_binding());
        assert!(lv.requires_frame());
        let bg = call("block_given?", vec![]);
        assert!(!bg.requires_binding());
        assert!(bg.requires_frame());
        let fwd = call("send", vec![Operand::sym("binding")]);
        assert!(fwd.requires_binding());
    }

    #[test]
    fn eval_sets_scope_flags() {
        let mut flags = ScopeFlags::RECEIVES_CLOSURE_ARG;
        let c = call("eval", vec![Operand::str("x"), Operand::Var(Variable::Temp(1))]);
        assert!(c.compute_scope_flags(&mut flags));
        assert!(flags.contains(ScopeFlags::USES_EVAL | ScopeFlags::CAN_RECEIVE_NONLOCAL_RETURNS));
        assert!(flags.contains(ScopeFlags::CAN_CAPTURE_CALLERS_BINDING));
        assert!(!c.compute_scope_flags(&mut flags));
    }

    #[test]
    fn splat_map_tracks_splat_positions() {
        let plain = call("m", vec![Operand::Fixnum(1)]);
        assert!(plain.splat_map().is_none());
        let splatted = call("m", vec![Operand::Fixnum(1), Operand::splat(Operand::Var(Variable::Temp(0)))]);
        assert_eq!(splatted.splat_map(), Some(&[false, true][..]));
    }

    #[test]
    fn zsuper_slices_levels() {
        let z = ZSuperInstr::new(
            None,
            Operand::self_ref(),
            vec![vec![Operand::Fixnum(1)], vec![Operand::Fixnum(2), Operand::Fixnum(3)]],
            None,
        );
        assert_eq!(z.level_args(0), Some(&[Operand::Fixnum(1)][..]));
        assert_eq!(z.level_args(1), Some(&[Operand::Fixnum(2), Operand::Fixnum(3)][..]));
        assert_eq!(z.level_args(2), None);
    }
}
