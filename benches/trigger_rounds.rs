//! Benchmarks for trigger propagation rounds
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use stepgraph::graph::steps::{COUNTER, EXPRESSION, STATIC_GAIN, SUM};
use stepgraph::{Group, StepRegistry, StepTime, Trigger};

/// `counter -> gain0 -> gain1 -> ... -> gain{len-1}`, driven by `tick`.
fn chain(registry: &StepRegistry, len: usize) -> (Arc<Group>, Arc<Trigger>) {
    let group = Group::new("chain").unwrap();
    group.create_step(registry, COUNTER, "counter").unwrap();
    let mut previous = "counter".to_string();
    for i in 0..len {
        let name = format!("gain{}", i);
        group.create_step(registry, STATIC_GAIN, &name).unwrap();
        group
            .connect(&format!("{}.out", previous), &format!("{}.in", name))
            .unwrap();
        previous = name;
    }
    let tick = group.add_trigger("tick").unwrap();
    group.connect_trigger("tick", "counter").unwrap();
    (group, tick)
}

/// One counter feeding `width` gains whose outputs are summed pairwise.
fn fan_out(registry: &StepRegistry, width: usize) -> (Arc<Group>, Arc<Trigger>) {
    let group = Group::new("fan_out").unwrap();
    group.create_step(registry, COUNTER, "counter").unwrap();
    for i in 0..width {
        let name = format!("gain{}", i);
        group.create_step(registry, STATIC_GAIN, &name).unwrap();
        group.connect("counter.out", &format!("{}.in", name)).unwrap();
    }
    for i in 0..width / 2 {
        let name = format!("sum{}", i);
        group.create_step(registry, SUM, &name).unwrap();
        group
            .connect(&format!("gain{}.out", 2 * i), &format!("{}.a", name))
            .unwrap();
        group
            .connect(&format!("gain{}.out", 2 * i + 1), &format!("{}.b", name))
            .unwrap();
    }
    let tick = group.add_trigger("tick").unwrap();
    group.connect_trigger("tick", "counter").unwrap();
    (group, tick)
}

fn bench_chain_rounds(c: &mut Criterion) {
    let registry = StepRegistry::with_builtins();
    let mut group = c.benchmark_group("chain_rounds");

    for len in [1, 10, 100].iter() {
        let (_graph, tick) = chain(&registry, *len);
        group.throughput(Throughput::Elements(*len as u64 + 1));
        group.bench_with_input(BenchmarkId::new("fire", len), &tick, |b, tick| {
            b.iter(|| black_box(tick.fire(StepTime::default())));
        });
    }

    group.finish();
}

fn bench_fan_out_rounds(c: &mut Criterion) {
    let registry = StepRegistry::with_builtins();
    let mut group = c.benchmark_group("fan_out_rounds");

    for width in [2, 16, 128].iter() {
        let (_graph, tick) = fan_out(&registry, *width);
        group.throughput(Throughput::Elements(*width as u64));
        group.bench_with_input(BenchmarkId::new("fire", width), &tick, |b, tick| {
            b.iter(|| black_box(tick.fire(StepTime::default())));
        });
    }

    group.finish();
}

fn bench_expression_step(c: &mut Criterion) {
    let registry = StepRegistry::with_builtins();
    let graph = Group::new("expr").unwrap();
    graph.create_step(&registry, COUNTER, "counter").unwrap();
    let expr = graph.create_step(&registry, EXPRESSION, "expr").unwrap();
    expr.set_parameter("expression", "smooth(value, prev, 0.8)").unwrap();
    graph.connect("counter.out", "expr.in").unwrap();
    let tick = graph.add_trigger("tick").unwrap();
    graph.connect_trigger("tick", "counter").unwrap();

    c.bench_function("expression_round", |b| {
        b.iter(|| black_box(tick.fire(StepTime::default())));
    });
}

criterion_group!(
    benches,
    bench_chain_rounds,
    bench_fan_out_rounds,
    bench_expression_step,
);

criterion_main!(benches);
