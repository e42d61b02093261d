//! Built-in programs assembled with [`ScopeBuilder`].
//!
//! With no parser in the crate these are what the CLI writes and runs, and
//! what the integration tests and benches execute end to end.

use std::sync::Arc;

use crate::ir::{
    instr::{
        BIntInstr, BSwitchInstr, BuildLambdaInstr, CallBase, CallType, ConstLookupInstr,
        DefineClassInstr, DefineInstanceMethodInstr, ExcRegionStartInstr, IntCmp, OneOperandBranch,
        ProcessModuleBodyInstr, ReceiveExceptionInstr, RescueEqqInstr, ThrowInstr, YieldInstr,
    },
    Instr, InstrKind, Operand, Params, Scope, ScopeBuilder, Variable,
};

pub struct Sample {
    pub name: &'static str,
    pub summary: &'static str,
    /// Everything the program prints through `puts`/`p`.
    pub expected_output: &'static str,
    /// `inspect` of the script's value.
    pub expected_result: &'static str,
    build: fn() -> Arc<Scope>,
}

impl Sample {
    pub fn build(&self) -> Arc<Scope> {
        (self.build)()
    }
}

pub static SAMPLES: &[Sample] = &[
    Sample {
        name: "arith",
        summary: "integer arithmetic, a counted loop and a case/when switch",
        expected_output: "answer: 42\n10\nten\n",
        expected_result: "[42, 40, 10]",
        build: arith,
    },
    Sample {
        name: "params",
        summary: "optional, rest, post-required and keyword parameters",
        expected_output: "[10, 20, [30], 40]\n[10, 1, [], 20]\nhello, irx\nhi, irx\n",
        expected_result: "[1, 2, [], 3]",
        build: params,
    },
    Sample {
        name: "blocks",
        summary: "yield, closures writing outer locals, break out of each, lambdas",
        expected_output: "3\n[2, 4, 6]\n60\n81\n",
        expected_result: "3",
        build: blocks,
    },
    Sample {
        name: "rescue",
        summary: "raise and rescue by class through an exception region",
        expected_output: "rescued: bad input\nafter\n",
        expected_result: "8",
        build: rescue,
    },
    Sample {
        name: "super",
        summary: "class definitions, explicit super and implicit super from a block",
        expected_output: "derived/base 5\n50\n",
        expected_result: "50",
        build: superclass_calls,
    },
];

pub fn find(name: &str) -> Option<&'static Sample> {
    SAMPLES.iter().find(|s| s.name == name)
}

pub fn names() -> Vec<&'static str> {
    SAMPLES.iter().map(|s| s.name).collect()
}

const FILE: &str = "<sample>";

fn var(v: &Variable) -> Operand {
    Operand::Var(v.clone())
}

fn def(b: &mut ScopeBuilder, body: Arc<Scope>) {
    b.emit(InstrKind::DefineInstanceMethod(DefineInstanceMethodInstr { body }));
}

fn puts(b: &mut ScopeBuilder, value: Operand) {
    b.send(Operand::self_ref(), "puts", vec![value]);
}

fn p(b: &mut ScopeBuilder, value: Operand) {
    b.send(Operand::self_ref(), "p", vec![value]);
}

fn arith() -> Arc<Scope> {
    let mut b = ScopeBuilder::script(FILE);
    let x = b.local("x");
    let y = b.local("y");
    let i = b.local("i");
    let sum = b.local("sum");

    let product = b.call(Operand::Fixnum(6), "*", vec![Operand::Fixnum(7)]);
    b.copy(x.clone(), var(&product));
    let diff = b.call(var(&x), "-", vec![Operand::Fixnum(2)]);
    b.copy(y.clone(), var(&diff));
    let text = b.call(var(&x), "to_s", vec![]);
    let line = b.call(Operand::str("answer: "), "+", vec![var(&text)]);
    puts(&mut b, var(&line));

    b.copy(i.clone(), Operand::Fixnum(0));
    b.copy(sum.clone(), Operand::Fixnum(0));
    let top = b.label("loop");
    let done = b.label("loop_end");
    b.place(top);
    b.emit(InstrKind::BInt(BIntInstr {
        op: IntCmp::Ge,
        arg1: var(&i),
        arg2: Operand::Fixnum(5),
        target: done,
    }));
    let next_sum = b.call(var(&sum), "+", vec![var(&i)]);
    b.copy(sum.clone(), var(&next_sum));
    let next_i = b.call(var(&i), "+", vec![Operand::Fixnum(1)]);
    b.copy(i.clone(), var(&next_i));
    b.emit(Instr::jump(top));
    b.place(done);
    puts(&mut b, var(&sum));

    let ten = b.label("when_10");
    let twenty = b.label("when_20");
    let other = b.label("else");
    let after = b.label("case_end");
    b.emit(InstrKind::BSwitch(BSwitchInstr::new(
        var(&sum),
        vec![10, 20],
        vec![ten, twenty],
        other,
        other,
    )));
    b.place(ten);
    puts(&mut b, Operand::str("ten"));
    b.emit(Instr::jump(after));
    b.place(twenty);
    puts(&mut b, Operand::str("twenty"));
    b.emit(Instr::jump(after));
    b.place(other);
    puts(&mut b, Operand::str("other"));
    b.place(after);

    b.ret(Operand::array(vec![var(&x), var(&y), var(&sum)]));
    b.finish_arc()
}

fn params() -> Arc<Scope> {
    // def collect(a, b = 1, *c, d) = [a, b, c, d]
    let mut collect = ScopeBuilder::method("collect", FILE);
    collect.receive(&Params::new().pre(&["a"]).opt("b", Operand::Fixnum(1)).rest("c").post(&["d"]));
    let fields: Vec<Operand> = ["a", "b", "c", "d"].iter().map(|n| var(&collect.local(n))).collect();
    collect.ret(Operand::array(fields));

    // def greet(name:, greeting: "hello") = greeting + ", " + name
    let mut greet = ScopeBuilder::method("greet", FILE);
    greet.receive(&Params::new().keyword("name", None).keyword("greeting", Some(Operand::str("hello"))));
    let greeting = greet.local("greeting");
    let name = greet.local("name");
    let head = greet.call(var(&greeting), "+", vec![Operand::str(", ")]);
    let full = greet.call(var(&head), "+", vec![var(&name)]);
    greet.ret(var(&full));

    let mut b = ScopeBuilder::script(FILE);
    def(&mut b, collect.finish_arc());
    def(&mut b, greet.finish_arc());
    let all = b.fcall("collect", (1..=4).map(|n| Operand::Fixnum(n * 10)).collect());
    p(&mut b, var(&all));
    let short = b.fcall("collect", vec![Operand::Fixnum(10), Operand::Fixnum(20)]);
    p(&mut b, var(&short));
    let kw = |pairs: &[(&str, &str)]| {
        Operand::Hash(pairs.iter().map(|(k, v)| (Operand::sym(k), Operand::str(v))).collect())
    };
    let hello = b.fcall("greet", vec![kw(&[("name", "irx")])]);
    puts(&mut b, var(&hello));
    let hi = b.fcall("greet", vec![kw(&[("name", "irx"), ("greeting", "hi")])]);
    puts(&mut b, var(&hi));
    let last = b.fcall("collect", vec![Operand::Fixnum(1), Operand::Fixnum(2), Operand::Fixnum(3)]);
    b.ret(var(&last));
    b.finish_arc()
}

fn blocks() -> Arc<Scope> {
    // def each_twice = (yield 1; yield 2; :done)
    let mut twice = ScopeBuilder::method("each_twice", FILE);
    twice.receive(&Params::new()).uses_block();
    let blk = twice.temp();
    twice.emit(InstrKind::LoadImplicitClosure(blk.clone()));
    for n in [1, 2] {
        twice.emit(InstrKind::Yield(YieldInstr {
            result: None,
            block: var(&blk),
            arg: Operand::Fixnum(n),
            unwrap: false,
        }));
    }
    twice.ret(Operand::sym("done"));

    let mut b = ScopeBuilder::script(FILE);
    def(&mut b, twice.finish_arc());
    let total = b.local("total");
    b.copy(total.clone(), Operand::Fixnum(0));

    // each_twice { |x| total = total + x }
    let mut adder = ScopeBuilder::closure(&b, "add_block");
    adder.receive(&Params::new().pre(&["x"]));
    let x = adder.local("x");
    let outer_total = adder.local("total");
    let added = adder.call(var(&outer_total), "+", vec![var(&x)]);
    adder.copy(outer_total, var(&added));
    adder.ret(var(&added));
    let adder = adder.finish_arc();
    b.call_with_block(Operand::self_ref(), "each_twice", vec![], Some(Operand::Closure(adder)));
    puts(&mut b, var(&total));

    // [1, 2, 3].map { |x| x * 2 }
    let mut doubler = ScopeBuilder::closure(&b, "map_block");
    doubler.receive(&Params::new().pre(&["x"]));
    let x = doubler.local("x");
    let doubled = doubler.call(var(&x), "*", vec![Operand::Fixnum(2)]);
    doubler.ret(var(&doubled));
    let list = Operand::array((1..=3).map(Operand::Fixnum).collect());
    let mapped = b.call_with_block(list, "map", vec![], Some(Operand::Closure(doubler.finish_arc())));
    p(&mut b, var(&mapped));

    // [5, 6, 7].each { |x| break x * 10 if x == 6 }
    let mut finder = ScopeBuilder::closure(&b, "each_block");
    finder.receive(&Params::new().pre(&["x"]));
    let x = finder.local("x");
    let hit = finder.call(var(&x), "==", vec![Operand::Fixnum(6)]);
    let miss = finder.label("miss");
    finder.emit(InstrKind::BFalse(OneOperandBranch {
        value: var(&hit),
        target: miss,
    }));
    let scaled = finder.call(var(&x), "*", vec![Operand::Fixnum(10)]);
    finder.break_out(var(&scaled));
    finder.place(miss);
    finder.ret(Operand::Nil);
    let list = Operand::array((5..=7).map(Operand::Fixnum).collect());
    let found = b.call_with_block(list, "each", vec![], Some(Operand::Closure(finder.finish_arc())));
    p(&mut b, var(&found));

    // square = lambda { |n| n * n }; square.call(9)
    let mut square = ScopeBuilder::closure(&b, "square");
    square.receive(&Params::new().pre(&["n"]));
    let n = square.local("n");
    let sq = square.call(var(&n), "*", vec![var(&n)]);
    square.ret(var(&sq));
    let lambda = b.temp();
    b.emit(InstrKind::BuildLambda(BuildLambdaInstr {
        result: lambda.clone(),
        body: Operand::Closure(square.finish_arc()),
    }));
    let squared = b.call(var(&lambda), "call", vec![Operand::Fixnum(9)]);
    p(&mut b, var(&squared));

    b.ret(var(&total));
    b.finish_arc()
}

fn rescue() -> Arc<Scope> {
    // def risky(n) = n < 0 ? raise(ArgumentError, "bad input") : n * 2
    let mut risky = ScopeBuilder::method("risky", FILE);
    risky.receive(&Params::new().pre(&["n"]));
    let n = risky.local("n");
    let negative = risky.call(var(&n), "<", vec![Operand::Fixnum(0)]);
    let ok = risky.label("ok");
    risky.emit(InstrKind::BFalse(OneOperandBranch {
        value: var(&negative),
        target: ok,
    }));
    let class = risky.temp();
    risky.emit(InstrKind::SearchConst(ConstLookupInstr {
        result: class.clone(),
        module: Operand::ScopeModule,
        name: Arc::from("ArgumentError"),
    }));
    risky.send(Operand::self_ref(), "raise", vec![var(&class), Operand::str("bad input")]);
    risky.place(ok);
    let doubled = risky.call(var(&n), "*", vec![Operand::Fixnum(2)]);
    risky.ret(var(&doubled));

    let mut b = ScopeBuilder::script(FILE);
    def(&mut b, risky.finish_arc());

    // begin; risky(-1); rescue ArgumentError => e; puts "rescued: " + e.message; end
    let handler = b.label("rescue");
    let reraise = b.label("reraise");
    let after = b.label("after");
    b.emit(InstrKind::ExcRegionStart(ExcRegionStartInstr { rescue: handler }));
    b.fcall("risky", vec![Operand::Fixnum(-1)]);
    b.emit(InstrKind::ExcRegionEnd);
    b.emit(Instr::jump(after));
    b.place(handler);
    let e = b.local("e");
    b.emit(InstrKind::ReceiveException(ReceiveExceptionInstr {
        result: e.clone(),
        unwrap: true,
    }));
    let class = b.temp();
    b.emit(InstrKind::SearchConst(ConstLookupInstr {
        result: class.clone(),
        module: Operand::ScopeModule,
        name: Arc::from("ArgumentError"),
    }));
    let matched = b.temp();
    b.emit(InstrKind::RescueEqq(RescueEqqInstr {
        result: matched.clone(),
        exception: var(&e),
        classes: var(&class),
    }));
    b.emit(InstrKind::BFalse(OneOperandBranch {
        value: var(&matched),
        target: reraise,
    }));
    let message = b.call(var(&e), "message", vec![]);
    let line = b.call(Operand::str("rescued: "), "+", vec![var(&message)]);
    puts(&mut b, var(&line));
    b.emit(Instr::jump(after));
    b.place(reraise);
    b.emit(InstrKind::Throw(ThrowInstr { value: var(&e) }));
    b.place(after);
    puts(&mut b, Operand::str("after"));

    let fine = b.fcall("risky", vec![Operand::Fixnum(4)]);
    b.ret(var(&fine));
    b.finish_arc()
}

fn superclass_calls() -> Arc<Scope> {
    // class Base; def describe(x) = "base " + x.to_s; def plain(x) = x * 10; end
    let mut describe = ScopeBuilder::method("describe", FILE);
    describe.receive(&Params::new().pre(&["x"]));
    let x = describe.local("x");
    let text = describe.call(var(&x), "to_s", vec![]);
    let out = describe.call(Operand::str("base "), "+", vec![var(&text)]);
    describe.ret(var(&out));

    let mut plain = ScopeBuilder::method("plain", FILE);
    plain.receive(&Params::new().pre(&["x"]));
    let x = plain.local("x");
    let out = plain.call(var(&x), "*", vec![Operand::Fixnum(10)]);
    plain.ret(var(&out));

    let mut base_body = ScopeBuilder::module_body("Base", FILE);
    def(&mut base_body, describe.finish_arc());
    def(&mut base_body, plain.finish_arc());
    base_body.ret(Operand::Nil);

    // class Derived < Base
    //   def describe(x) = "derived/" + [0].map { super }.first
    //   def plain(x) = super(x + 1)
    // end
    let mut describe = ScopeBuilder::method("describe", FILE);
    describe.receive(&Params::new().pre(&["x"]));
    let mut forward = ScopeBuilder::closure(&describe, "describe_block");
    let up = forward.zsuper(None);
    forward.ret(var(&up));
    let inner = describe.call_with_block(
        Operand::array(vec![Operand::Fixnum(0)]),
        "map",
        vec![],
        Some(Operand::Closure(forward.finish_arc())),
    );
    let first = describe.call(var(&inner), "first", vec![]);
    let out = describe.call(Operand::str("derived/"), "+", vec![var(&first)]);
    describe.ret(var(&out));

    let mut plain = ScopeBuilder::method("plain", FILE);
    plain.receive(&Params::new().pre(&["x"]));
    let x = plain.local("x");
    let bumped = plain.call(var(&x), "+", vec![Operand::Fixnum(1)]);
    let out = plain.temp();
    plain.emit(InstrKind::UnresolvedSuper(Box::new(CallBase::new(
        CallType::Super,
        "plain",
        Operand::self_ref(),
        vec![var(&bumped)],
        None,
        Some(out.clone()),
    ))));
    plain.ret(var(&out));

    let mut derived_body = ScopeBuilder::module_body("Derived", FILE);
    def(&mut derived_body, describe.finish_arc());
    def(&mut derived_body, plain.finish_arc());
    derived_body.ret(Operand::Nil);

    let mut b = ScopeBuilder::script(FILE);
    let base = b.temp();
    b.emit(InstrKind::DefineClass(DefineClassInstr {
        result: base.clone(),
        name: Arc::from("Base"),
        container: Operand::ScopeModule,
        superclass: Operand::Nil,
    }));
    let ignored = b.temp();
    b.emit(InstrKind::ProcessModuleBody(ProcessModuleBodyInstr {
        result: ignored.clone(),
        module: var(&base),
        body: base_body.finish_arc(),
    }));
    let derived = b.temp();
    b.emit(InstrKind::DefineClass(DefineClassInstr {
        result: derived.clone(),
        name: Arc::from("Derived"),
        container: Operand::ScopeModule,
        superclass: var(&base),
    }));
    b.emit(InstrKind::ProcessModuleBody(ProcessModuleBodyInstr {
        result: ignored,
        module: var(&derived),
        body: derived_body.finish_arc(),
    }));

    let obj = b.call(var(&derived), "new", vec![]);
    let desc = b.call(var(&obj), "describe", vec![Operand::Fixnum(5)]);
    puts(&mut b, var(&desc));
    let bumped = b.call(var(&obj), "plain", vec![Operand::Fixnum(4)]);
    p(&mut b, var(&bumped));
    b.ret(var(&bumped));
    b.finish_arc()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique_and_findable() {
        let names = names();
        for name in &names {
            assert_eq!(find(name).map(|s| s.name), Some(*name));
        }
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), names.len());
        assert!(find("missing").is_none());
    }

    #[test]
    fn every_sample_linearizes() {
        for sample in SAMPLES {
            let scope = sample.build();
            scope.interpreter_context().unwrap();
            for nested in scope.nested_scopes() {
                nested.interpreter_context().unwrap();
            }
        }
    }
}
