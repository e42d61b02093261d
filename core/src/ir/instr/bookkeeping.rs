use std::fmt;

use crate::{
    ir::{Label, Operand},
    value::Value,
};

/// Arity contract of the enclosing scope, checked once on entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckArityInstr {
    /// pre + post
    pub required: u32,
    pub opt: u32,
    pub rest: bool,
    pub receives_keywords: bool,
    pub kwrest: bool,
}

impl CheckArityInstr {
    pub fn accepts(&self, given: usize) -> bool {
        let given = given as u32;
        given >= self.required && (self.rest || given <= self.required + self.opt)
    }

    /// `expected` part of the arity error message.
    pub fn expected(&self) -> String {
        expected_arity(self.required, self.opt, self.rest)
    }
}

pub fn expected_arity(required: u32, opt: u32, rest: bool) -> String {
    if rest {
        format!("{}+", required)
    } else if opt > 0 {
        format!("{}..{}", required, required + opt)
    } else {
        required.to_string()
    }
}

/// Arity check against an args array, emitted by the inliner when the
/// call-site argument count is not statically known.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckArgsArrayArityInstr {
    pub array: Operand,
    pub required: u32,
    pub opt: u32,
    pub rest: bool,
}

/// Precomputed arity failure left behind by static narrowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaiseArgumentErrorInstr {
    pub required: u32,
    pub opt: u32,
    pub rest: bool,
    pub given: u32,
}

impl RaiseArgumentErrorInstr {
    pub fn message(&self) -> String {
        format!(
            "wrong number of arguments (given {}, expected {})",
            self.given,
            expected_arity(self.required, self.opt, self.rest)
        )
    }
}

/// Value shape assumed by speculative code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardType {
    Fixnum,
    Float,
    String,
    Symbol,
    Array,
    Hash,
    Nil,
    Proc,
}

impl GuardType {
    pub const ALL: [GuardType; 8] = [
        GuardType::Fixnum,
        GuardType::Float,
        GuardType::String,
        GuardType::Symbol,
        GuardType::Array,
        GuardType::Hash,
        GuardType::Nil,
        GuardType::Proc,
    ];

    pub fn matches(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (GuardType::Fixnum, Value::Int(_))
                | (GuardType::Float, Value::Float(_))
                | (GuardType::String, Value::Str(_))
                | (GuardType::Symbol, Value::Symbol(_))
                | (GuardType::Array, Value::Array(_))
                | (GuardType::Hash, Value::Hash(_))
                | (GuardType::Nil, Value::Nil)
                | (GuardType::Proc, Value::Proc(_))
        )
    }

    pub fn as_u8(self) -> u8 {
        GuardType::ALL.iter().position(|g| *g == self).unwrap_or(0) as u8
    }

    pub fn from_u8(tag: u8) -> Option<GuardType> {
        GuardType::ALL.get(tag as usize).copied()
    }
}

impl fmt::Display for GuardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GuardType::Fixnum => "fixnum",
            GuardType::Float => "float",
            GuardType::String => "string",
            GuardType::Symbol => "symbol",
            GuardType::Array => "array",
            GuardType::Hash => "hash",
            GuardType::Nil => "nil",
            GuardType::Proc => "proc",
        };
        f.write_str(name)
    }
}

/// Deoptimisation point: leaves the speculative path for `resume` when
/// `value` does not have the expected shape.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardInstr {
    pub value: Operand,
    pub expected: GuardType,
    pub resume: Label,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_accepts_ranges() {
        let check = CheckArityInstr {
            required: 2,
            opt: 1,
            rest: false,
            receives_keywords: false,
            kwrest: false,
        };
        assert!(!check.accepts(1));
        assert!(check.accepts(2));
        assert!(check.accepts(3));
        assert!(!check.accepts(4));
        assert_eq!(check.expected(), "2..3");
        let rest = CheckArityInstr { rest: true, ..check };
        assert!(rest.accepts(10));
        assert_eq!(rest.expected(), "2+");
    }

    #[test]
    fn guard_types_match_values() {
        assert!(GuardType::Fixnum.matches(&Value::Int(1)));
        assert!(!GuardType::Fixnum.matches(&Value::Float(1.0)));
        assert!(GuardType::Nil.matches(&Value::Nil));
        for g in GuardType::ALL {
            assert_eq!(GuardType::from_u8(g.as_u8()), Some(g));
        }
    }
}
