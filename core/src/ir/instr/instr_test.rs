use rustc_hash::FxHashMap;

use super::*;
use crate::ir::{Label, Operand, Operation, ScopeFlags, Variable};

fn t(n: u32) -> Variable {
    Variable::Temp(n)
}

fn call(name: &str, args: Vec<Operand>, closure: Option<Operand>, result: Option<Variable>) -> Instr {
    Instr::call(CallBase::new(
        CallType::Normal,
        name,
        Operand::Var(t(0)),
        args,
        closure,
        result,
    ))
}

#[test]
fn operands_follow_declaration_order() {
    let instr = call(
        "foo",
        vec![Operand::Fixnum(1), Operand::Var(t(2))],
        Some(Operand::NullBlock),
        Some(t(3)),
    );
    let ops: Vec<String> = instr.operands().iter().map(|o| o.to_string()).collect();
    assert_eq!(ops, vec!["%v_0", "1", "%v_2", "null_block"]);
    assert_eq!(instr.result(), Some(&t(3)));
    assert_eq!(instr.arity(), Arity::Variable);

    let copy = Instr::copy(t(1), Operand::Fixnum(5));
    assert_eq!(copy.arity(), Arity::Fixed(1));
}

#[test]
fn beq_specializes_on_second_operand() {
    let l = Label::from_index(0);
    let x = Operand::Var(t(1));
    assert_eq!(Instr::beq(x.clone(), Operand::Boolean(true), l).operation(), Operation::BTrue);
    assert_eq!(Instr::beq(x.clone(), Operand::Boolean(false), l).operation(), Operation::BFalse);
    assert_eq!(Instr::beq(x.clone(), Operand::Nil, l).operation(), Operation::BNil);
    assert_eq!(Instr::beq(x.clone(), Operand::Undefined, l).operation(), Operation::BUndef);
    assert_eq!(
        Instr::beq(Operand::Fixnum(1), Operand::Fixnum(2), l).operation(),
        Operation::BInt
    );
    // only the second operand is inspected
    assert_eq!(Instr::beq(Operand::Nil, x.clone(), l).operation(), Operation::Beq);
    assert_eq!(Instr::beq_generic(x, Operand::Nil, l).operation(), Operation::Beq);
}

#[test]
fn specialize_picks_narrow_call_forms() {
    let zero = call("size", vec![], None, Some(t(1))).specialize();
    assert_eq!(zero.operation(), Operation::ZeroOperandArgNoBlockCall);

    let fix = call("+", vec![Operand::Fixnum(2)], None, Some(t(1))).specialize();
    match &fix.kind {
        InstrKind::OneFixnumArgNoBlockCall { value, .. } => assert_eq!(*value, 2),
        other => panic!("unexpected {:?}", other),
    }

    let flt = call("*", vec![Operand::Float(1.5)], None, Some(t(1))).specialize();
    assert_eq!(flt.operation(), Operation::OneFloatArgNoBlockCall);

    let one = call("push", vec![Operand::Var(t(4))], None, Some(t(1))).specialize();
    assert_eq!(one.operation(), Operation::OneOperandArgNoBlockCall);

    let noresult = call("puts", vec![Operand::str("x")], None, None).specialize();
    assert_eq!(noresult.operation(), Operation::OneArgNoBlockNoResultCall);

    let splatted = call("p", vec![Operand::splat(Operand::Var(t(2)))], None, Some(t(1))).specialize();
    assert_eq!(splatted.operation(), Operation::Call);

    let two = call("p", vec![Operand::Fixnum(1), Operand::Fixnum(2)], None, Some(t(1))).specialize();
    assert_eq!(two.operation(), Operation::Call);
}

#[test]
fn specialized_call_demotes_when_splat_appears() {
    let mut instr = call("p", vec![Operand::Var(t(2))], None, Some(t(1))).specialize();
    assert_eq!(instr.operation(), Operation::OneOperandArgNoBlockCall);
    let mut map = FxHashMap::default();
    map.insert(t(2), Operand::splat(Operand::Var(t(5))));
    // composite values only propagate when forced
    instr.simplify_operands(&map, false);
    assert_eq!(instr.operation(), Operation::OneOperandArgNoBlockCall);
    instr.simplify_operands(&map, true);
    assert_eq!(instr.operation(), Operation::Call);
    assert!(instr.call_base().is_some_and(|b| b.has_splats()));
}

#[test]
fn simplification_recomputes_call_flags() {
    let mut instr = call("send", vec![Operand::Var(t(2))], None, Some(t(1)));
    assert!(instr.call_base().is_some_and(|b| b.can_be_eval()));
    let mut map = FxHashMap::default();
    map.insert(t(2), Operand::sym("length"));
    instr.simplify_operands(&map, false);
    let base = instr.call_base().unwrap();
    assert!(!base.can_be_eval());
    assert!(!base.requires_binding());
}

#[test]
fn deletability() {
    let flags = ScopeFlags::NONE;
    assert!(Instr::copy(t(1), Operand::Fixnum(1)).can_be_deleted(flags));
    assert!(!call("foo", vec![], None, Some(t(1))).can_be_deleted(flags));
    assert!(!Instr::label(Label::from_index(0)).can_be_deleted(flags));
    assert!(!Instr::new(InstrKind::LineNum(3)).can_be_deleted(flags));

    let local = Instr::copy(Variable::local("a", 0, 0), Operand::Fixnum(1));
    assert!(local.can_be_deleted(flags));
    assert!(!local.can_be_deleted(ScopeFlags::BINDING_HAS_ESCAPED));
    assert!(!local.can_be_deleted(ScopeFlags::USES_EVAL));

    let outer = Instr::copy(Variable::local("a", 1, 0), Operand::Fixnum(1));
    assert!(!outer.can_be_deleted(flags));
}

#[test]
fn scope_flags_from_instructions() {
    let mut flags = ScopeFlags::NONE;
    let brk = Instr::new(InstrKind::Break(BreakInstr {
        value: Operand::Nil,
        scope: crate::ir::ScopeId::fresh(),
        scope_name: "main".into(),
    }));
    assert!(brk.compute_scope_flags(&mut flags));
    assert!(flags.contains(ScopeFlags::HAS_BREAK_INSTRS));
    // second visit adds nothing
    assert!(!brk.compute_scope_flags(&mut flags));

    let mut flags = ScopeFlags::NONE;
    call("eval", vec![Operand::str("1")], None, Some(t(1))).compute_scope_flags(&mut flags);
    assert!(flags.contains(ScopeFlags::USES_EVAL | ScopeFlags::BINDING_HAS_ESCAPED | ScopeFlags::REQUIRES_FRAME));

    let mut flags = ScopeFlags::NONE;
    Instr::copy(t(1), Operand::Var(Variable::local("x", 1, 0))).compute_scope_flags(&mut flags);
    assert!(flags.contains(ScopeFlags::ACCESS_PARENTS_LOCAL_VARIABLES));

    let mut flags = ScopeFlags::NONE;
    let z = Instr::new(InstrKind::ZSuper(Box::new(ZSuperInstr::new(
        Some(t(1)),
        Operand::self_ref(),
        vec![vec![Operand::Var(t(2))]],
        None,
    ))));
    z.compute_scope_flags(&mut flags);
    assert!(flags.contains(ScopeFlags::USES_ZSUPER | ScopeFlags::REQUIRES_FRAME));
}

#[test]
fn labels_are_collected_from_every_position() {
    let (a, b, c) = (Label::from_index(0), Label::from_index(1), Label::from_index(2));
    let sw = Instr::new(InstrKind::BSwitch(BSwitchInstr::new(
        Operand::Var(t(1)),
        vec![1, 2],
        vec![a, b],
        c,
        c,
    )));
    assert_eq!(sw.referenced_labels(), vec![a, b, c, c]);

    let addr = Instr::copy(t(1), Operand::Label(b));
    assert_eq!(addr.referenced_labels(), vec![b]);

    let mut j = Instr::jump(a);
    for l in j.labels_mut() {
        *l = c;
    }
    assert_eq!(j.referenced_labels(), vec![c]);
}

#[test]
#[should_panic(expected = "one target per case")]
fn b_switch_rejects_mismatched_targets() {
    let l = Label::from_index(0);
    Instr::new(InstrKind::BSwitch(BSwitchInstr {
        value: Operand::Nil,
        cases: vec![1, 2],
        targets: vec![l],
        ruby_case: l,
        else_target: l,
    }));
}

#[test]
#[should_panic(expected = "copy cannot assign %self")]
fn copy_rejects_self_result() {
    Instr::copy(Variable::SelfRef, Operand::Nil);
}

#[test]
fn validation_reports_without_panicking() {
    let bad = InstrKind::ReceivePostReqdArg(ReceivePostReqdArgInstr {
        result: t(1),
        index: 2,
        pre: 0,
        post: 2,
    });
    match validate(&bad) {
        Err(crate::error::IrError::Malformed { op, detail }) => {
            assert_eq!(op, Operation::ReceivePostReqdArg);
            assert!(detail.contains("outside post count 2"), "{detail}");
        }
        other => panic!("expected a malformed-instruction error, got {other:?}"),
    }
    assert!(validate(&InstrKind::Copy(CopyInstr {
        result: t(1),
        source: Operand::Nil,
    }))
    .is_ok());
}

#[test]
fn eval_detection_follows_name_and_first_argument() {
    let can_eval = |name: &str, args: Vec<Operand>| {
        call(name, args, None, Some(t(1))).call_base().is_some_and(|b| b.can_be_eval())
    };
    assert!(can_eval("instance_eval", vec![Operand::str("x")]));
    assert!(can_eval("send", vec![Operand::str("eval"), Operand::str("1+1")]));
    assert!(can_eval("__send__", vec![Operand::sym("eval")]));
    assert!(can_eval("public_send", vec![Operand::Var(t(2))]));
    assert!(can_eval("send", vec![Operand::sym("call")]));
    assert!(!can_eval("send", vec![]));
    assert!(!can_eval("send", vec![Operand::sym("length")]));
    assert!(!can_eval("length", vec![Operand::str("eval")]));
}

#[test]
fn simplifying_twice_with_one_map_changes_nothing_more() {
    let mut map: FxHashMap<Variable, Operand> = FxHashMap::default();
    map.insert(t(1), Operand::Fixnum(3));
    map.insert(t(2), Operand::Var(t(1)));
    map.insert(t(4), Operand::array(vec![Operand::Var(t(2))]));

    for force in [false, true] {
        let mut instr = call(
            "foo",
            vec![Operand::Var(t(2)), Operand::splat(Operand::Var(t(4))), Operand::Var(t(5))],
            None,
            Some(t(6)),
        );
        instr.simplify_operands(&map, force);
        let once = instr.clone();
        instr.simplify_operands(&map, force);
        assert_eq!(instr, once, "force = {force}");
        assert_eq!(once.operands()[1], &Operand::Fixnum(3));
    }
}
