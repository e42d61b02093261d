//! Argument receive and multiple-assignment payloads.
//!
//! The index arithmetic lives in free functions so the interpreter and the
//! inliner's static narrowing share one definition.

use std::{ops::Range, sync::Arc};

use crate::{
    error::IrError,
    ir::{InlineArgs, Operand, Operation, Variable},
};

use super::{CopyInstr, InstrKind};

#[derive(Debug, Clone, PartialEq)]
pub struct ReceivePreReqdArgInstr {
    pub result: Variable,
    pub index: u32,
}

/// Required parameter after the rest parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivePostReqdArgInstr {
    pub result: Variable,
    pub index: u32,
    pub pre: u32,
    pub post: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReceiveOptArgInstr {
    pub result: Variable,
    /// Position among the optional parameters
    pub index: u32,
    /// Count of required (pre + post) parameters
    pub required: u32,
    pub pre: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReceiveRestArgInstr {
    pub result: Variable,
    /// First positional slot of the rest parameter (pre + opt)
    pub index: u32,
    /// Positional slots consumed by everything else (pre + opt + post)
    pub required: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReceiveKeywordArgInstr {
    pub result: Variable,
    pub name: Arc<str>,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReceiveKeywordRestArgInstr {
    pub result: Variable,
}

/// Element of a destructured array; `pre: None` is plain indexing.
#[derive(Debug, Clone, PartialEq)]
pub struct MasgnReqdInstr {
    pub result: Variable,
    pub array: Operand,
    pub pre: Option<u32>,
    pub post: u32,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MasgnOptInstr {
    pub result: Variable,
    pub array: Operand,
    /// Absolute position in the array
    pub index: u32,
    /// The element exists only when the array is longer than this
    pub min_args: u32,
}

/// Splat element of a destructured array: `array[index, n - index - post]`.
#[derive(Debug, Clone, PartialEq)]
pub struct MasgnRestInstr {
    pub result: Variable,
    pub array: Operand,
    pub pre: u32,
    pub post: u32,
    pub index: u32,
}

/// Slot picked by a post-required receive, `None` when too few arguments
/// were passed (arity errors are reported by `check_arity`).
pub fn post_reqd_index(n: usize, pre: u32, post: u32, index: u32) -> Option<usize> {
    let (pre, post, index) = (pre as i64, post as i64, index as i64);
    let n = n as i64;
    let remaining = n - pre;
    if remaining <= index {
        None
    } else if remaining > post {
        Some((n - post + index) as usize)
    } else {
        Some((pre + index) as usize)
    }
}

pub fn opt_index(n: usize, required: u32, pre: u32, index: u32) -> Option<usize> {
    if (required + index) as usize >= n {
        None
    } else {
        Some((pre + index) as usize)
    }
}

/// Slots swallowed by a rest parameter.
pub fn rest_range(n: usize, required: u32, index: u32) -> Range<usize> {
    let required = required as usize;
    let index = index as usize;
    if n <= required {
        return 0..0;
    }
    let start = index.min(n);
    let end = (index + (n - required)).min(n);
    start..end
}

pub fn masgn_reqd_index(n: usize, pre: Option<u32>, post: u32, index: u32) -> Option<usize> {
    match pre {
        None => ((index as usize) < n).then_some(index as usize),
        Some(pre) => post_reqd_index(n, pre, post, index),
    }
}

pub fn masgn_rest_range(n: usize, post: u32, index: u32) -> Range<usize> {
    let taken = index as usize + post as usize;
    if n <= taken {
        return 0..0;
    }
    index as usize..n - post as usize
}

fn copy(result: Variable, source: Operand) -> InstrKind {
    InstrKind::Copy(CopyInstr { result, source })
}

/// Rewrites a receive instruction for an inlined body whose arguments are
/// known at the call site. `result` is the already-renamed destination.
pub fn narrow(kind: &InstrKind, result: Variable, args: &InlineArgs) -> Result<InstrKind, IrError> {
    match args {
        InlineArgs::Known(ops) => narrow_known(kind, result, ops),
        InlineArgs::Array(array) => narrow_array(kind, result, array),
    }
}

fn narrow_known(kind: &InstrKind, result: Variable, ops: &[Operand]) -> Result<InstrKind, IrError> {
    let n = ops.len();
    let pick = |slot: Option<usize>, fallback: Operand| slot.and_then(|i| ops.get(i).cloned()).unwrap_or(fallback);
    Ok(match kind {
        InstrKind::ReceivePreReqdArg(r) => copy(result, pick(Some(r.index as usize), Operand::Nil)),
        InstrKind::ReceivePostReqdArg(r) => copy(result, pick(post_reqd_index(n, r.pre, r.post, r.index), Operand::Nil)),
        InstrKind::ReceiveOptArg(r) => copy(result, pick(opt_index(n, r.required, r.pre, r.index), Operand::Undefined)),
        InstrKind::ReceiveRestArg(r) => {
            let range = rest_range(n, r.required, r.index);
            copy(result, Operand::array(ops[range].to_vec()))
        }
        other => return Err(IrError::unsupported(other.operation(), "static argument narrowing")),
    })
}

fn narrow_array(kind: &InstrKind, result: Variable, array: &Operand) -> Result<InstrKind, IrError> {
    let array = array.clone();
    Ok(match kind {
        InstrKind::ReceivePreReqdArg(r) => InstrKind::MasgnReqd(MasgnReqdInstr {
            result,
            array,
            pre: None,
            post: 0,
            index: r.index,
        }),
        InstrKind::ReceivePostReqdArg(r) => InstrKind::MasgnReqd(MasgnReqdInstr {
            result,
            array,
            pre: Some(r.pre),
            post: r.post,
            index: r.index,
        }),
        InstrKind::ReceiveOptArg(r) => InstrKind::MasgnOpt(MasgnOptInstr {
            result,
            array,
            index: r.pre + r.index,
            min_args: r.required + r.index,
        }),
        InstrKind::ReceiveRestArg(r) => InstrKind::MasgnRest(MasgnRestInstr {
            result,
            array,
            pre: r.index,
            post: r.required.saturating_sub(r.index),
            index: r.index,
        }),
        other => return Err(IrError::unsupported(other.operation(), "args-array narrowing")),
    })
}

/// Whether narrowing applies to this operation at all.
pub fn is_narrowable(op: Operation) -> bool {
    matches!(
        op,
        Operation::ReceivePreReqdArg
            | Operation::ReceivePostReqdArg
            | Operation::ReceiveOptArg
            | Operation::ReceiveRestArg
            | Operation::ReceiveKeywordArg
            | Operation::ReceiveKeywordRestArg
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_required_counts_back_from_the_end() {
        // pre=2, post=1
        assert_eq!(post_reqd_index(5, 2, 1, 0), Some(4));
        assert_eq!(post_reqd_index(3, 2, 1, 0), Some(2));
        assert_eq!(post_reqd_index(2, 2, 1, 0), None);
        assert_eq!(post_reqd_index(0, 2, 1, 0), None);
    }

    #[test]
    fn post_required_falls_back_to_pre_offset_when_short() {
        // pre=1, post=2 with only two args: remaining == post
        assert_eq!(post_reqd_index(3, 1, 2, 0), Some(1));
        assert_eq!(post_reqd_index(3, 1, 2, 1), Some(2));
        assert_eq!(post_reqd_index(2, 1, 2, 1), None);
    }

    #[test]
    fn optional_needs_surplus_arguments() {
        // (a, b=1, *c, d): required=2, pre=1
        assert_eq!(opt_index(4, 2, 1, 0), Some(1));
        assert_eq!(opt_index(2, 2, 1, 0), None);
    }

    #[test]
    fn rest_takes_the_middle() {
        // (a, b=1, *c, d): required=3, index=2
        assert_eq!(rest_range(4, 3, 2), 2..3);
        assert_eq!(rest_range(2, 3, 2), 0..0);
        assert_eq!(rest_range(6, 3, 2), 2..5);
        assert_eq!(rest_range(3, 0, 0), 0..3);
    }

    #[test]
    fn masgn_variants_match_receive_arithmetic() {
        assert_eq!(masgn_reqd_index(3, None, 0, 2), Some(2));
        assert_eq!(masgn_reqd_index(2, None, 0, 2), None);
        assert_eq!(masgn_reqd_index(5, Some(2), 1, 0), post_reqd_index(5, 2, 1, 0));
        assert_eq!(masgn_rest_range(5, 1, 1), 1..4);
        assert_eq!(masgn_rest_range(2, 1, 1), 0..0);
    }

    #[test]
    fn narrowing_known_args_produces_copies() {
        let args = InlineArgs::Known(vec![Operand::Fixnum(10), Operand::Fixnum(20)]);
        let opt = InstrKind::ReceiveOptArg(ReceiveOptArgInstr {
            result: Variable::Temp(0),
            index: 0,
            required: 2,
            pre: 1,
        });
        let narrowed = narrow(&opt, Variable::Temp(9), &args).unwrap();
        assert_eq!(
            narrowed,
            InstrKind::Copy(CopyInstr {
                result: Variable::Temp(9),
                source: Operand::Undefined
            })
        );
    }

    #[test]
    fn narrowing_over_an_args_array_uses_masgn() {
        let array = Operand::Var(Variable::Temp(7));
        let post = InstrKind::ReceivePostReqdArg(ReceivePostReqdArgInstr {
            result: Variable::Temp(0),
            index: 0,
            pre: 2,
            post: 1,
        });
        let narrowed = narrow(&post, Variable::Temp(1), &InlineArgs::Array(array.clone())).unwrap();
        assert_eq!(
            narrowed,
            InstrKind::MasgnReqd(MasgnReqdInstr {
                result: Variable::Temp(1),
                array,
                pre: Some(2),
                post: 1,
                index: 0
            })
        );
    }

    #[test]
    fn keyword_receives_do_not_narrow() {
        let kw = InstrKind::ReceiveKeywordArg(ReceiveKeywordArgInstr {
            result: Variable::Temp(0),
            name: Arc::from("k"),
            required: true,
        });
        let err = narrow(&kw, Variable::Temp(1), &InlineArgs::Known(vec![])).unwrap_err();
        assert!(matches!(err, IrError::Unsupported { op: Operation::ReceiveKeywordArg, .. }));
    }
}
