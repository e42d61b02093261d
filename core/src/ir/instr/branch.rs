use std::fmt;

use crate::ir::{Label, Operand};

/// Relational operator of `b_int`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntCmp {
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
}

impl IntCmp {
    pub const ALL: [IntCmp; 6] = [IntCmp::Lt, IntCmp::Gt, IntCmp::Le, IntCmp::Ge, IntCmp::Eq, IntCmp::Ne];

    pub fn symbol(self) -> &'static str {
        match self {
            IntCmp::Lt => "<",
            IntCmp::Gt => ">",
            IntCmp::Le => "<=",
            IntCmp::Ge => ">=",
            IntCmp::Eq => "==",
            IntCmp::Ne => "!=",
        }
    }

    #[inline]
    pub fn test<T: PartialOrd>(self, a: T, b: T) -> bool {
        match self {
            IntCmp::Lt => a < b,
            IntCmp::Gt => a > b,
            IntCmp::Le => a <= b,
            IntCmp::Ge => a >= b,
            IntCmp::Eq => a == b,
            IntCmp::Ne => a != b,
        }
    }

    pub fn is_equality(self) -> bool {
        matches!(self, IntCmp::Eq | IntCmp::Ne)
    }

    pub fn as_u8(self) -> u8 {
        IntCmp::ALL.iter().position(|c| *c == self).unwrap_or(0) as u8
    }

    pub fn from_u8(tag: u8) -> Option<IntCmp> {
        IntCmp::ALL.get(tag as usize).copied()
    }
}

impl fmt::Display for IntCmp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JumpInstr {
    pub target: Label,
}

/// Jumps to the label address stored in a variable (ensure return address).
#[derive(Debug, Clone, PartialEq)]
pub struct JumpIndirectInstr {
    pub address: Operand,
}

/// `beq`/`bne`
#[derive(Debug, Clone, PartialEq)]
pub struct TwoOperandBranch {
    pub arg1: Operand,
    pub arg2: Operand,
    pub target: Label,
}

/// `btrue`/`bfalse`/`bnil`/`bundef`
#[derive(Debug, Clone, PartialEq)]
pub struct OneOperandBranch {
    pub value: Operand,
    pub target: Label,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BIntInstr {
    pub op: IntCmp,
    pub arg1: Operand,
    pub arg2: Operand,
    pub target: Label,
}

/// Multi-way integer dispatch, scanned in case order.
#[derive(Debug, Clone, PartialEq)]
pub struct BSwitchInstr {
    pub value: Operand,
    pub cases: Vec<i64>,
    pub targets: Vec<Label>,
    /// Taken when the scrutinee is not an integer
    pub ruby_case: Label,
    /// Taken for integers outside `cases`
    pub else_target: Label,
}

impl BSwitchInstr {
    pub fn new(value: Operand, cases: Vec<i64>, targets: Vec<Label>, ruby_case: Label, else_target: Label) -> Self {
        assert_eq!(cases.len(), targets.len(), "b_switch needs one target per case");
        assert!(!cases.is_empty(), "b_switch needs at least one case");
        Self {
            value,
            cases,
            targets,
            ruby_case,
            else_target,
        }
    }

    pub fn target_for(&self, scrutinee: i64) -> Label {
        self.cases
            .iter()
            .position(|c| *c == scrutinee)
            .map(|idx| self.targets[idx])
            .unwrap_or(self.else_target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_picks_else_for_unknown_cases() {
        let sw = BSwitchInstr::new(
            Operand::Fixnum(0),
            vec![1, 2, 3],
            vec![Label::from_index(1), Label::from_index(2), Label::from_index(3)],
            Label::from_index(8),
            Label::from_index(9),
        );
        assert_eq!(sw.target_for(2), Label::from_index(2));
        assert_eq!(sw.target_for(4), Label::from_index(9));
        assert_eq!(sw.target_for(-1), Label::from_index(9));
    }

    #[test]
    #[should_panic(expected = "one target per case")]
    fn switch_rejects_mismatched_tables() {
        BSwitchInstr::new(
            Operand::Fixnum(0),
            vec![1, 2],
            vec![Label::from_index(1)],
            Label::from_index(8),
            Label::from_index(9),
        );
    }

    #[test]
    fn int_cmp_round_trips_tags() {
        for cmp in IntCmp::ALL {
            assert_eq!(IntCmp::from_u8(cmp.as_u8()), Some(cmp));
        }
        assert!(IntCmp::Le.test(2, 2));
        assert!(!IntCmp::Ne.test(2.0, 2.0));
    }
}
