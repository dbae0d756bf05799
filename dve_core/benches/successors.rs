use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use dve_core::*;

// `n` processes incrementing a shared counter modulo 100,
// each with a private counter, synchronizing pairwise on a channel.
#[inline(always)]
fn counters(n: usize, synchronicity: Synchronicity) -> ExplicitSystem {
    let mut builder = SystemBuilder::new();
    builder.set_synchronicity(synchronicity);
    let x = builder.add_variable("x", None, VariableInfo::scalar(VarType::Int), None);
    let c = builder.add_channel("c", ChannelInfo::untyped(), None);
    for i in 0..n {
        let p = builder.add_process(&format!("P{i}"), None, true);
        let s0 = builder.add_state("s0", p, None, true);
        let s1 = builder.add_state("s1", p, None, true);
        builder.process_mut(p).set_initial_state(0);
        let y = builder.add_variable("y", Some(p), VariableInfo::scalar(VarType::Byte), None);

        let mut t = Transition::new(p, (s0, 0), (s1, 1), None);
        t.set_guard(Expression::binary(
            BinaryOp::Lt,
            Expression::var(y, None),
            100.into(),
            None,
        ));
        t.add_effect(Expression::assign(
            Expression::var(x, None),
            Expression::binary(
                BinaryOp::Mod,
                Expression::binary(BinaryOp::Add, Expression::var(x, None), 1.into(), None),
                100.into(),
                None,
            ),
            None,
        ));
        builder.add_transition(t).unwrap();

        let mut t = Transition::new(p, (s1, 1), (s0, 0), None);
        t.add_effect(Expression::assign(
            Expression::var(y, None),
            Expression::binary(
                BinaryOp::Mod,
                Expression::binary(BinaryOp::Add, Expression::var(y, None), 1.into(), None),
                100.into(),
                None,
            ),
            None,
        ));
        builder.add_transition(t).unwrap();

        let mode = if i % 2 == 0 {
            SyncMode::Send
        } else {
            SyncMode::Receive
        };
        let mut t = Transition::new(p, (s1, 1), (s1, 1), None);
        t.set_sync(mode, c, Vec::new());
        builder.add_transition(t).unwrap();
    }
    let system = builder.build(&mut Diagnostics::new()).unwrap();
    ExplicitSystem::new(system).unwrap()
}

#[inline(always)]
fn explore(explicit: &ExplicitSystem, depth: usize) -> usize {
    let mut generator = explicit.new_instance();
    let mut frontier = vec![generator.initial_state()];
    let mut succs = Vec::new();
    let mut count = 0;
    for _ in 0..depth {
        let mut next = Vec::new();
        for state in &frontier {
            generator.successors(state, &mut succs);
            count += succs.len();
            next.extend(succs.drain(..).take(4));
        }
        frontier = next;
    }
    count
}

fn interleaving_bench(c: &mut Criterion) {
    for n in [2, 4, 8] {
        let explicit = counters(n, Synchronicity::Async);
        c.bench_with_input(BenchmarkId::new("interleaving", n), &explicit, |b, explicit| {
            b.iter(|| explore(explicit, 6))
        });
    }
}

fn synchronous_bench(c: &mut Criterion) {
    for n in [2, 4] {
        let explicit = counters(n, Synchronicity::Sync);
        c.bench_with_input(BenchmarkId::new("synchronous", n), &explicit, |b, explicit| {
            b.iter(|| explore(explicit, 6))
        });
    }
}

criterion_group!(benches, interleaving_bench, synchronous_bench);
criterion_main!(benches);
