//! Benchmarks for the push-style personalized PageRank hot loop.
//!
//! Run locally with `cargo bench --bench appr_bench`.

use std::collections::BTreeSet;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use lexgraph::{ApprConfig, EdgeView, GraphWeights};

fn ring_with_chords(n: usize) -> (graph::NormalizedAdjacency, String) {
    let mut edges = Vec::new();
    for i in 0..n {
        let a = format!("N{i:05}");
        let b = format!("N{:05}", (i + 1) % n);
        let c = format!("N{:05}", (i + 7) % n);
        edges.push(graph::TypedEdge::new(&a, &b, EdgeView::Citation, 1.0));
        edges.push(graph::TypedEdge::new(&a, &c, EdgeView::Hierarchy, 1.0));
    }
    let nodes: BTreeSet<String> = (0..n).map(|i| format!("N{i:05}")).collect();
    let adj = graph::row_normalize(
        &graph::mix_views(&edges, &GraphWeights::default()),
        &nodes,
    );
    (adj, "N00000".to_string())
}

fn bench_appr_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("appr_push");
    for &n in &[1_000usize, 5_000] {
        let (adj, seed) = ring_with_chords(n);
        let cfg = ApprConfig::default();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                relatedness::approx_ppr_push(&adj, &[(seed.clone(), 1.0)], &cfg, cfg.top_k)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_appr_push);
criterion_main!(benches);
