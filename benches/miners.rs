//! Apriori vs FP-Growth on a synthetic basket matrix.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use basket_rules::{generate_rules, Apriori, FpGrowth, PresenceMatrix, RuleMetric};

/// Skewed baskets from a fixed linear congruential sequence: low item ids are
/// far more popular than high ones, like real retail data.
fn synthetic(n_transactions: usize, n_items: u64) -> PresenceMatrix {
    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = move || {
        state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
        state >> 33
    };
    let baskets: Vec<(String, Vec<String>)> = (0..n_transactions)
        .map(|t| {
            let size = 2 + next() % 8;
            let items = (0..size)
                .map(|_| {
                    let a = next() % n_items;
                    let b = next() % n_items;
                    format!("sku{:03}", a.min(b))
                })
                .collect();
            (format!("inv{t}"), items)
        })
        .collect();
    PresenceMatrix::from_transactions(baskets).unwrap()
}

fn bench_miners(c: &mut Criterion) {
    let matrix = synthetic(5_000, 60);
    let mut group = c.benchmark_group("mine");
    for min_support in [0.05, 0.02, 0.01] {
        group.bench_with_input(BenchmarkId::new("apriori", min_support), &min_support, |b, &s| {
            b.iter(|| Apriori::new().mine(black_box(&matrix), s).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("fpgrowth", min_support), &min_support, |b, &s| {
            b.iter(|| FpGrowth::new().run(black_box(&matrix), s).unwrap())
        });
    }
    group.finish();
}

fn bench_rules(c: &mut Criterion) {
    let matrix = synthetic(5_000, 60);
    let itemsets = FpGrowth::new().run(&matrix, 0.01).unwrap();
    c.bench_function("generate_rules", |b| {
        b.iter(|| generate_rules(black_box(&itemsets), RuleMetric::Confidence, 0.3).unwrap())
    });
}

criterion_group!(benches, bench_miners, bench_rules);
criterion_main!(benches);
