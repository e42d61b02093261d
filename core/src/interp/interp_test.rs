use std::sync::Arc;

use crate::{
    interp::{ExecutionContext, InterpConfig, Unwind},
    ir::{
        instr::{
            BIntInstr, CallBase, CallType, DefineInstanceMethodInstr, GuardInstr, GuardType, IntCmp,
            OneOperandBranch,
        },
        passes::PassManager,
        printer::listing,
        Instr, InstrKind, Label, Operand, Params, Scope, ScopeBuilder, ScopeFlags, Variable,
    },
    persist::{self, IrModule},
    runtime::Runtime,
    samples::{self, Sample},
    value::Value,
};

fn var(v: &Variable) -> Operand {
    Operand::Var(v.clone())
}

fn def(b: &mut ScopeBuilder, body: Arc<Scope>) {
    b.emit(InstrKind::DefineInstanceMethod(DefineInstanceMethodInstr { body }));
}

fn run_with(scope: &Arc<Scope>, config: InterpConfig) -> (String, Result<Value, Unwind>, ExecutionContext) {
    let rt = Runtime::new();
    let mut ctx = ExecutionContext::with_config(rt.clone(), config);
    let result = ctx.run_script(scope);
    (rt.take_output(), result, ctx)
}

fn run(scope: &Arc<Scope>) -> (String, Value) {
    let (out, result, _) = run_with(scope, InterpConfig::default());
    (out, result.unwrap_or_else(|e| panic!("script failed: {e}")))
}

fn raised(result: Result<Value, Unwind>) -> (String, String) {
    match result {
        Err(Unwind::Raise(e)) => (e.class.name().to_string(), e.message.to_string()),
        other => panic!("expected an exception, got {other:?}"),
    }
}

fn check_sample(sample: &Sample, scope: &Arc<Scope>) {
    let (out, value) = run(scope);
    assert_eq!(out, sample.expected_output, "output of sample {}", sample.name);
    assert_eq!(value.inspect(), sample.expected_result, "result of sample {}", sample.name);
}

#[test]
fn samples_produce_expected_output() {
    for sample in samples::SAMPLES {
        check_sample(sample, &sample.build());
    }
}

#[test]
fn samples_survive_a_persistence_round_trip() {
    for sample in samples::SAMPLES {
        let scope = sample.build();
        let bytes = persist::encode_module(&IrModule::new(scope.clone()).with_source(sample.name)).unwrap();
        let module = persist::decode_module(&bytes).unwrap();
        assert_eq!(listing(&module.root), listing(&scope));
        check_sample(sample, &module.root);
    }
}

#[test]
fn samples_behave_the_same_after_the_pass_pipeline() {
    for sample in samples::SAMPLES {
        let mut scope = sample.build();
        PassManager::default().run(Arc::make_mut(&mut scope)).unwrap();
        check_sample(sample, &scope);
    }
}

#[test]
fn samples_run_without_inline_caches() {
    for sample in samples::SAMPLES {
        let (out, result, ctx) = run_with(&sample.build(), InterpConfig::default().without_caches());
        assert_eq!(out, sample.expected_output);
        assert_eq!(result.unwrap().inspect(), sample.expected_result);
        assert_eq!(ctx.stats().hits, 0);
        assert!(ctx.stats().bypassed > 0);
    }
}

fn collect_method() -> Arc<Scope> {
    let mut m = ScopeBuilder::method("collect", "t.rb");
    m.receive(&Params::new().pre(&["a"]).opt("b", Operand::Fixnum(1)).rest("c").post(&["d"]));
    let fields: Vec<Operand> = ["a", "b", "c", "d"].iter().map(|n| var(&m.local(n))).collect();
    m.ret(Operand::array(fields));
    m.finish_arc()
}

fn call_collect(args: Vec<Operand>) -> Result<Value, Unwind> {
    let mut b = ScopeBuilder::script("t.rb");
    def(&mut b, collect_method());
    let out = b.fcall("collect", args);
    b.ret(var(&out));
    run_with(&b.finish_arc(), InterpConfig::default()).1
}

#[test]
fn optional_and_post_parameters_bind_in_order() {
    let full = call_collect((1..=4).map(|n| Operand::Fixnum(n * 10)).collect()).unwrap();
    assert_eq!(full.inspect(), "[10, 20, [30], 40]");
    let short = call_collect(vec![Operand::Fixnum(10), Operand::Fixnum(20)]).unwrap();
    assert_eq!(short.inspect(), "[10, 1, [], 20]");
    let long = call_collect((1..=6).map(Operand::Fixnum).collect()).unwrap();
    assert_eq!(long.inspect(), "[1, 2, [3, 4, 5], 6]");
}

#[test]
fn splatted_arguments_bind_like_plain_ones() {
    let plain = call_collect((1..=4).map(Operand::Fixnum).collect()).unwrap();
    let whole = call_collect(vec![Operand::splat(Operand::array((1..=4).map(Operand::Fixnum).collect()))]).unwrap();
    let mixed = call_collect(vec![
        Operand::Fixnum(1),
        Operand::splat(Operand::array(vec![Operand::Fixnum(2), Operand::Fixnum(3)])),
        Operand::Fixnum(4),
    ])
    .unwrap();
    assert_eq!(plain.inspect(), "[1, 2, [3], 4]");
    assert_eq!(whole.inspect(), plain.inspect());
    assert_eq!(mixed.inspect(), plain.inspect());
}

#[test]
fn too_few_arguments_raise_argument_error() {
    let (class, message) = raised(call_collect(vec![Operand::Fixnum(1)]));
    assert_eq!(class, "ArgumentError");
    assert!(message.contains("wrong number of arguments"), "{message}");
}

#[test]
fn send_to_eval_marks_the_scope_and_raises_at_runtime() {
    let mut b = ScopeBuilder::script("t.rb");
    let out = b.fcall("send", vec![Operand::sym("eval"), Operand::str("1 + 1")]);
    b.ret(var(&out));
    let scope = b.finish_arc();

    let call = scope.instrs().iter().find_map(Instr::call_base).unwrap();
    assert!(call.can_be_eval());
    let flags = scope.flags();
    assert!(flags.contains(ScopeFlags::USES_EVAL));
    assert!(flags.contains(ScopeFlags::CAN_RECEIVE_NONLOCAL_RETURNS));

    let (class, _) = raised(run_with(&scope, InterpConfig::default()).1);
    assert_eq!(class, "NotImplementedError");
}

#[test]
fn send_to_a_plain_method_is_not_eval() {
    let mut b = ScopeBuilder::script("t.rb");
    b.fcall("send", vec![Operand::sym("puts"), Operand::str("x")]);
    b.ret(Operand::Nil);
    let scope = b.finish_arc();
    assert!(!scope.flags().contains(ScopeFlags::USES_EVAL));
    assert_eq!(run(&scope).0, "x\n");
}

/// `i = 0; while i < 3; r = value; (redefine value to 2 when i == 0); i += 1; end; r`
fn loop_calling_value(redefine: bool) -> Arc<Scope> {
    let method = |n: i64| {
        let mut m = ScopeBuilder::method("value", "t.rb");
        m.receive(&Params::new());
        m.ret(Operand::Fixnum(n));
        m.finish_arc()
    };
    let mut b = ScopeBuilder::script("t.rb");
    def(&mut b, method(1));
    let i = b.local("i");
    let r = b.local("r");
    b.copy(i.clone(), Operand::Fixnum(0));
    let top = b.label("loop");
    let done = b.label("done");
    let skip = b.label("skip");
    b.place(top);
    b.emit(InstrKind::BInt(BIntInstr {
        op: IntCmp::Ge,
        arg1: var(&i),
        arg2: Operand::Fixnum(3),
        target: done,
    }));
    let v = b.fcall("value", vec![]);
    b.copy(r.clone(), var(&v));
    if redefine {
        b.emit(InstrKind::BInt(BIntInstr {
            op: IntCmp::Ne,
            arg1: var(&i),
            arg2: Operand::Fixnum(0),
            target: skip,
        }));
        def(&mut b, method(2));
    }
    b.place(skip);
    let next = b.call(var(&i), "+", vec![Operand::Fixnum(1)]);
    b.copy(i.clone(), var(&next));
    b.emit(Instr::jump(top));
    b.place(done);
    b.ret(var(&r));
    b.finish_arc()
}

#[test]
fn call_sites_hit_after_the_first_lookup() {
    let (_, result, ctx) = run_with(&loop_calling_value(false), InterpConfig::default());
    assert_eq!(result.unwrap(), Value::Int(1));
    let stats = ctx.stats();
    // two sites (value and +), three iterations each
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.hits, 4);
    assert_eq!(stats.invalidations, 0);
}

#[test]
fn redefinition_invalidates_cached_sites() {
    let (_, result, ctx) = run_with(&loop_calling_value(true), InterpConfig::default());
    assert_eq!(result.unwrap(), Value::Int(2));
    assert!(ctx.stats().invalidations >= 1);
}

#[test]
fn unrescued_exceptions_reach_the_caller() {
    let mut b = ScopeBuilder::script("t.rb");
    b.fcall("raise", vec![Operand::str("boom")]);
    b.ret(Operand::Nil);
    let (class, message) = raised(run_with(&b.finish_arc(), InterpConfig::default()).1);
    assert_eq!(class, "RuntimeError");
    assert_eq!(message, "boom");
}

#[test]
fn return_from_a_block_leaves_the_defining_method() {
    // def find = ([1, 2, 3].each { |x| return x * 100 if x == 2 }; :none)
    let mut m = ScopeBuilder::method("find", "t.rb");
    m.receive(&Params::new());
    let mut blk = ScopeBuilder::closure(&m, "find_block");
    blk.receive(&Params::new().pre(&["x"]));
    let x = blk.local("x");
    let hit = blk.call(var(&x), "==", vec![Operand::Fixnum(2)]);
    let miss = blk.label("miss");
    blk.emit(InstrKind::BFalse(OneOperandBranch {
        value: var(&hit),
        target: miss,
    }));
    let scaled = blk.call(var(&x), "*", vec![Operand::Fixnum(100)]);
    blk.nonlocal_return(var(&scaled));
    blk.place(miss);
    blk.ret(Operand::Nil);
    let list = Operand::array((1..=3).map(Operand::Fixnum).collect());
    m.call_with_block(list, "each", vec![], Some(Operand::Closure(blk.finish_arc())));
    m.ret(Operand::sym("none"));
    let method = m.finish_arc();
    assert!(method.flags().contains(ScopeFlags::CAN_RECEIVE_NONLOCAL_RETURNS));

    let mut b = ScopeBuilder::script("t.rb");
    def(&mut b, method);
    let found = b.fcall("find", vec![]);
    b.ret(var(&found));
    assert_eq!(run(&b.finish_arc()).1, Value::Int(200));
}

#[test]
fn return_from_an_escaped_proc_is_a_local_jump_error() {
    // def make = proc { return 1 }; make.call
    let mut m = ScopeBuilder::method("make", "t.rb");
    m.receive(&Params::new());
    let mut blk = ScopeBuilder::closure(&m, "make_block");
    blk.receive(&Params::new());
    blk.nonlocal_return(Operand::Fixnum(1));
    let pr = m.call_with_block(Operand::self_ref(), "proc", vec![], Some(Operand::Closure(blk.finish_arc())));
    m.ret(var(&pr));

    let mut b = ScopeBuilder::script("t.rb");
    def(&mut b, m.finish_arc());
    let pr = b.fcall("make", vec![]);
    let out = b.call(var(&pr), "call", vec![]);
    b.ret(var(&out));
    let (class, message) = raised(run_with(&b.finish_arc(), InterpConfig::default()).1);
    assert_eq!(class, "LocalJumpError");
    assert_eq!(message, "unexpected return");
}

#[test]
fn failed_guards_resume_at_the_slow_path() {
    // guard x is fixnum else jump to slow; fast returns :fast
    let build = |x: Operand| {
        let mut b = ScopeBuilder::script("t.rb");
        let v = b.local("v");
        b.copy(v.clone(), x);
        let slow = b.label("slow");
        b.emit(InstrKind::Guard(GuardInstr {
            value: var(&v),
            expected: GuardType::Fixnum,
            resume: slow,
        }));
        b.ret(Operand::sym("fast"));
        b.place(slow);
        b.ret(Operand::sym("slow"));
        b.finish_arc()
    };

    let (_, result, ctx) = run_with(&build(Operand::Fixnum(3)), InterpConfig::default());
    assert_eq!(result.unwrap().inspect(), ":fast");
    assert_eq!(ctx.stats().deopts, 0);

    let (_, result, ctx) = run_with(&build(Operand::str("3")), InterpConfig::default());
    assert_eq!(result.unwrap().inspect(), ":slow");
    assert_eq!(ctx.stats().deopts, 1);
}

#[test]
fn unbounded_recursion_raises_system_stack_error() {
    // def down(n) = down(n + 1)
    let mut m = ScopeBuilder::method("down", "t.rb");
    m.receive(&Params::new().pre(&["n"]));
    let n = m.local("n");
    let next = m.call(var(&n), "+", vec![Operand::Fixnum(1)]);
    let out = m.fcall("down", vec![var(&next)]);
    m.ret(var(&out));

    let mut b = ScopeBuilder::script("t.rb");
    def(&mut b, m.finish_arc());
    let out = b.fcall("down", vec![Operand::Fixnum(0)]);
    b.ret(var(&out));

    let (_, result, ctx) = run_with(&b.finish_arc(), InterpConfig::default().with_max_depth(64));
    let (class, _) = raised(result);
    assert_eq!(class, "SystemStackError");
    assert_eq!(ctx.depth(), 0);
}

#[test]
fn yield_without_a_block_is_a_local_jump_error() {
    let blocks = samples::find("blocks").unwrap().build();
    let mut b = ScopeBuilder::script("t.rb");
    let method = blocks
        .nested_scopes()
        .into_iter()
        .find(|s| s.name().as_ref() == "each_twice")
        .cloned()
        .unwrap();
    def(&mut b, method);
    let out = b.fcall("each_twice", vec![]);
    b.ret(var(&out));
    let (class, message) = raised(run_with(&b.finish_arc(), InterpConfig::default()).1);
    assert_eq!(class, "LocalJumpError");
    assert!(message.contains("no block given"));
}

#[test]
fn modules_written_to_disk_run_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let sample = samples::find("params").unwrap();
    let path = dir.path().join("params.irxb");
    let module = IrModule::new(sample.build()).with_source(sample.name);
    std::fs::write(&path, persist::encode_module(&module).unwrap()).unwrap();

    let loaded = persist::decode_module(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(loaded.meta.and_then(|m| m.source).as_deref(), Some("params"));
    check_sample(sample, &loaded.root);
}

#[test]
fn closure_writes_to_outer_locals_survive_the_pass_pipeline() {
    // r = 0; [1].map { r = 7; 0 }; r
    let mut b = ScopeBuilder::script("t.rb");
    let r = b.local("r");
    b.copy(r.clone(), Operand::Fixnum(0));
    let mut blk = ScopeBuilder::closure(&b, "map_block");
    blk.receive(&Params::new());
    let outer = blk.local("r");
    blk.copy(outer, Operand::Fixnum(7));
    blk.ret(Operand::Fixnum(0));
    let list = Operand::array(vec![Operand::Fixnum(1)]);
    b.call_with_block(list, "map", vec![], Some(Operand::Closure(blk.finish_arc())));
    b.ret(var(&r));
    let mut scope = b.finish_arc();

    assert_eq!(run(&scope).1, Value::Int(7));
    PassManager::default().run(Arc::make_mut(&mut scope)).unwrap();
    assert_eq!(run(&scope).1, Value::Int(7));
}

#[test]
fn rewritten_call_sites_do_not_reuse_cached_methods() {
    let method = |name: &str, n: i64| {
        let mut m = ScopeBuilder::method(name, "t.rb");
        m.receive(&Params::new());
        m.ret(Operand::Fixnum(n));
        m.finish_arc()
    };
    let mut setup = ScopeBuilder::script("t.rb");
    def(&mut setup, method("foo", 1));
    def(&mut setup, method("bar", 2));
    setup.ret(Operand::Nil);

    let mut b = ScopeBuilder::script("t.rb");
    let out = b.fcall("foo", vec![]);
    b.ret(var(&out));
    let original = b.finish_arc();

    // same scope id, different callee at the same ipc
    let mut rewritten = (*original).clone();
    for instr in rewritten.instrs_mut() {
        if let Some(call) = instr.call_base_mut() {
            call.name = Arc::from("bar");
        }
    }
    let rewritten = Arc::new(rewritten);
    assert_eq!(rewritten.id(), original.id());

    let rt = Runtime::new();
    let mut ctx = ExecutionContext::new(rt.clone());
    ctx.run_script(&setup.finish_arc()).unwrap();
    assert_eq!(ctx.run_script(&original).unwrap(), Value::Int(1));
    assert_eq!(ctx.run_script(&rewritten).unwrap(), Value::Int(2));
    assert_eq!(ctx.run_script(&original).unwrap(), Value::Int(1));
}

#[test]
fn super_on_a_non_module_is_a_type_error() {
    for singleton in [false, true] {
        let mut b = ScopeBuilder::script("t.rb");
        let out = b.temp();
        let base = Box::new(CallBase::new(CallType::Super, "foo", Operand::Fixnum(3), vec![], None, Some(out.clone())));
        b.emit(if singleton {
            InstrKind::ClassSuper(base)
        } else {
            InstrKind::InstanceSuper(base)
        });
        b.ret(var(&out));
        let (class, message) = raised(run_with(&b.finish_arc(), InterpConfig::default()).1);
        assert_eq!(class, "TypeError");
        assert_eq!(message, "3 is not a class/module");
    }
}

fn branch_outcome(branch: fn(Operand, Operand, Label) -> Instr, a: Operand, b: Operand) -> Value {
    let mut s = ScopeBuilder::script("t.rb");
    let hit = s.label("hit");
    s.emit(branch(a, b, hit));
    s.ret(Operand::sym("miss"));
    s.place(hit);
    s.ret(Operand::sym("hit"));
    run(&s.finish_arc()).1
}

#[test]
fn specialized_branches_pick_the_generic_target() {
    let values = [
        Operand::Fixnum(3),
        Operand::Fixnum(0),
        Operand::Float(3.0),
        Operand::Nil,
        Operand::Boolean(true),
        Operand::Boolean(false),
        Operand::Undefined,
        Operand::str("x"),
        Operand::sym("s"),
    ];
    let literals = [
        Operand::Boolean(true),
        Operand::Boolean(false),
        Operand::Nil,
        Operand::Undefined,
        Operand::Fixnum(3),
    ];
    for value in &values {
        for literal in &literals {
            let special = branch_outcome(Instr::beq, value.clone(), literal.clone());
            let generic = branch_outcome(Instr::beq_generic, value.clone(), literal.clone());
            assert_eq!(special, generic, "beq {value} {literal}");
        }
    }
    assert_eq!(branch_outcome(Instr::beq, Operand::Fixnum(3), Operand::Boolean(true)).inspect(), ":hit");
}

