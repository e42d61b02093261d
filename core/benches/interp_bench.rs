use criterion::{Criterion, criterion_group, criterion_main};
use irx_core::{
    interp::{ExecutionContext, InterpConfig},
    ir::{
        instr::{BIntInstr, DefineInstanceMethodInstr, IntCmp},
        passes::PassManager,
        Instr, InstrKind, Operand, Params, Scope, ScopeBuilder,
    },
    persist::{self, IrModule},
    runtime::Runtime,
    samples,
};
use std::{hint::black_box, sync::Arc};

// def add(a, b) = a + b
// i = 0; acc = 0; while i < n; acc = add(acc, i); i += 1; end; acc
fn call_loop(n: i64) -> Arc<Scope> {
    let mut add = ScopeBuilder::method("add", "bench.rb");
    add.receive(&Params::new().pre(&["a", "b"]));
    let a = add.local("a");
    let b_ = add.local("b");
    let sum = add.call(Operand::Var(a), "+", vec![Operand::Var(b_)]);
    add.ret(Operand::Var(sum));

    let mut b = ScopeBuilder::script("bench.rb");
    b.emit(InstrKind::DefineInstanceMethod(DefineInstanceMethodInstr { body: add.finish_arc() }));
    let i = b.local("i");
    let acc = b.local("acc");
    b.copy(i.clone(), Operand::Fixnum(0));
    b.copy(acc.clone(), Operand::Fixnum(0));
    let top = b.label("loop");
    let done = b.label("done");
    b.place(top);
    b.emit(InstrKind::BInt(BIntInstr {
        op: IntCmp::Ge,
        arg1: Operand::Var(i.clone()),
        arg2: Operand::Fixnum(n),
        target: done,
    }));
    let next_acc = b.fcall("add", vec![Operand::Var(acc.clone()), Operand::Var(i.clone())]);
    b.copy(acc.clone(), Operand::Var(next_acc));
    let next_i = b.call(Operand::Var(i.clone()), "+", vec![Operand::Fixnum(1)]);
    b.copy(i, Operand::Var(next_i));
    b.emit(Instr::jump(top));
    b.place(done);
    b.ret(Operand::Var(acc));
    b.finish_arc()
}

fn run(scope: &Arc<Scope>, config: InterpConfig) {
    let mut ctx = ExecutionContext::with_config(Runtime::new(), config);
    let out = ctx.run_script(scope).unwrap();
    black_box(out);
}

fn interp_bench(c: &mut Criterion) {
    let scope = call_loop(1_000);

    c.bench_function("interp_call_loop_cached", |b| b.iter(|| run(&scope, InterpConfig::default())));
    c.bench_function("interp_call_loop_uncached", |b| {
        b.iter(|| run(&scope, InterpConfig::default().without_caches()))
    });

    let mut optimized = call_loop(1_000);
    PassManager::default().run(Arc::make_mut(&mut optimized)).unwrap();
    c.bench_function("interp_call_loop_optimized", |b| b.iter(|| run(&optimized, InterpConfig::default())));

    for sample in samples::SAMPLES {
        let scope = sample.build();
        c.bench_function(&format!("sample_{}", sample.name), |b| b.iter(|| run(&scope, InterpConfig::default())));
    }
}

fn persist_bench(c: &mut Criterion) {
    let module = IrModule::new(samples::find("super").unwrap().build());
    let bytes = persist::encode_module(&module).unwrap();

    c.bench_function("persist_encode_module", |b| b.iter(|| black_box(persist::encode_module(&module).unwrap())));
    c.bench_function("persist_decode_module", |b| b.iter(|| black_box(persist::decode_module(&bytes).unwrap())));
}

criterion_group!(benches, interp_bench, persist_bench);
criterion_main!(benches);
