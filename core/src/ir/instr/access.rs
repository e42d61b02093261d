use std::sync::Arc;

use crate::ir::{Operand, Scope, Variable};

#[derive(Debug, Clone, PartialEq)]
pub struct CopyInstr {
    pub result: Variable,
    pub source: Operand,
}

/// Instance variable read; reads of unset fields yield nil.
#[derive(Debug, Clone, PartialEq)]
pub struct GetFieldInstr {
    pub result: Variable,
    pub object: Operand,
    pub name: Arc<str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PutFieldInstr {
    pub object: Operand,
    pub name: Arc<str>,
    pub value: Operand,
}

/// Payload shared by the three constant lookups.
///
/// * `search_const`: `module`, its ancestors, then `Object`; cached per site.
/// * `lexical_search_const`: `module`'s own table only; `undefined` if absent.
/// * `inheritance_search_const`: `module` and its ancestors.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstLookupInstr {
    pub result: Variable,
    pub module: Operand,
    pub name: Arc<str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PutConstInstr {
    pub module: Operand,
    pub name: Arc<str>,
    pub value: Operand,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetClassVarInstr {
    pub result: Variable,
    pub module: Operand,
    pub name: Arc<str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PutClassVarInstr {
    pub module: Operand,
    pub name: Arc<str>,
    pub value: Operand,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetGlobalVarInstr {
    pub result: Variable,
    pub name: Arc<str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PutGlobalVarInstr {
    pub name: Arc<str>,
    pub value: Operand,
}

/// String interpolation: every piece is converted with `to_s`.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildCompoundStringInstr {
    pub result: Variable,
    pub pieces: Vec<Operand>,
}

/// `[*value]`
#[derive(Debug, Clone, PartialEq)]
pub struct BuildSplatInstr {
    pub result: Variable,
    pub array: Operand,
}

/// `[*head, tail]` when `is_push`, `[*head, *tail]` otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildCompoundArrayInstr {
    pub result: Variable,
    pub head: Operand,
    pub tail: Operand,
    pub is_push: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildLambdaInstr {
    pub result: Variable,
    pub body: Operand,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockGivenInstr {
    pub result: Variable,
    pub block: Operand,
}

/// Implicit array conversion for destructuring.
#[derive(Debug, Clone, PartialEq)]
pub struct ToAryInstr {
    pub result: Variable,
    pub array: Operand,
}

/// Opens (or creates) a class under `container`. `superclass` is nil for the
/// default superclass; reopening with a different superclass is a `TypeError`.
#[derive(Debug, Clone, PartialEq)]
pub struct DefineClassInstr {
    pub result: Variable,
    pub name: Arc<str>,
    pub container: Operand,
    pub superclass: Operand,
}

/// `def name`: installs `body` on the current module.
#[derive(Debug, Clone, PartialEq)]
pub struct DefineInstanceMethodInstr {
    pub body: Arc<Scope>,
}

/// `def obj.name`: installs `body` as a singleton method of `object`.
#[derive(Debug, Clone, PartialEq)]
pub struct DefineClassMethodInstr {
    pub object: Operand,
    pub body: Arc<Scope>,
}

/// Runs a module body with the module as both `self` and lexical module.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessModuleBodyInstr {
    pub result: Variable,
    pub module: Operand,
    pub body: Arc<Scope>,
}
