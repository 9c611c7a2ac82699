//! Benchmarks for analogic-match
//!
//! Covers:
//! - Full pipeline over the classic flow analogy
//! - Hypothesis scaling with relation count
//! - Deeply nested structure

use analogic_core::{ConceptGraph, Entity, Predicate};
use analogic_match::{match_graphs, MatchOptions};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// A graph of `n` binary relations over `n + 1` entities, chained pairwise
fn relation_chain(name: &str, functor_prefix: &str, n: usize) -> ConceptGraph {
    let mut g = ConceptGraph::new(name);
    let entities: Vec<_> = (0..=n)
        .map(|i| g.add_entity(Entity::new(format!("e{i}"))))
        .collect();
    for i in 0..n {
        g.add_expression(
            Predicate::relation(format!("{functor_prefix}{i}"), 2),
            &[entities[i], entities[i + 1]],
        )
        .unwrap();
    }
    g
}

/// A tower of nested unary relations of the given depth
fn nested_tower(name: &str, depth: usize) -> ConceptGraph {
    let mut g = ConceptGraph::new(name);
    let mut current = g.add_entity(Entity::new("leaf"));
    for level in 0..depth {
        current = g
            .add_expression(Predicate::relation(format!("r{level}"), 1), &[current])
            .unwrap();
    }
    g
}

fn bench_flow_analogy(c: &mut Criterion) {
    let mut base = ConceptGraph::new("water-flow");
    let beaker = base.add_entity(Entity::new("beaker"));
    let vial = base.add_entity(Entity::new("vial"));
    let water = base.add_entity(Entity::new("water"));
    let pipe = base.add_entity(Entity::new("pipe"));
    let pressure = Predicate::function("pressure", 1);
    let p1 = base.add_expression(pressure.clone(), &[beaker]).unwrap();
    let p2 = base.add_expression(pressure, &[vial]).unwrap();
    let gt = base
        .add_expression(Predicate::relation("greater", 2), &[p1, p2])
        .unwrap();
    let flow = base
        .add_expression(Predicate::relation("flow", 4), &[beaker, vial, water, pipe])
        .unwrap();
    base.add_expression(Predicate::logical("cause", 2), &[gt, flow])
        .unwrap();

    let mut target = ConceptGraph::new("heat-flow");
    let coffee = target.add_entity(Entity::new("coffee"));
    let ice = target.add_entity(Entity::new("ice"));
    let heat = target.add_entity(Entity::new("heat"));
    let bar = target.add_entity(Entity::new("bar"));
    let temperature = Predicate::function("temperature", 1);
    let t1 = target.add_expression(temperature.clone(), &[coffee]).unwrap();
    let t2 = target.add_expression(temperature, &[ice]).unwrap();
    target
        .add_expression(Predicate::relation("greater", 2), &[t1, t2])
        .unwrap();
    target
        .add_expression(Predicate::relation("flow", 4), &[coffee, ice, heat, bar])
        .unwrap();

    let options = MatchOptions::default();
    c.bench_function("match_flow_analogy", |b| {
        b.iter(|| match_graphs(black_box(&base), black_box(&target), None, &options).unwrap())
    });
}

fn bench_relation_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("relation_scaling");
    let options = MatchOptions::default();
    for n in [2, 5, 10, 20].iter() {
        let base = relation_chain("base", "r", *n);
        let target = relation_chain("target", "r", *n);
        group.bench_with_input(BenchmarkId::new("relations", n), n, |b, _| {
            b.iter(|| match_graphs(black_box(&base), black_box(&target), None, &options).unwrap())
        });
    }
    group.finish();
}

fn bench_nested_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("nested_depth");
    let options = MatchOptions::default();
    for depth in [4, 8, 16].iter() {
        let base = nested_tower("base", *depth);
        let target = nested_tower("target", *depth);
        group.bench_with_input(BenchmarkId::new("depth", depth), depth, |b, _| {
            b.iter(|| match_graphs(black_box(&base), black_box(&target), None, &options).unwrap())
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_flow_analogy,
    bench_relation_scaling,
    bench_nested_depth,
);
criterion_main!(benches);
