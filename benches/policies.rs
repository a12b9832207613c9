//! Replacement policy micro-benchmarks.
//!
//! Run with: `cargo bench --bench policies`
//!
//! Drives each policy directly through `ReplacementPolicy`, the way the
//! bounded cache does: insert on miss, access on hit, pop a victim when full.

use std::collections::HashSet;
use std::hint::black_box;

use cellcache::policy::EvictionPolicy;
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

const CAPACITY: usize = 1_000;
const OPS: usize = 50_000;

const POLICIES: [EvictionPolicy; 3] = [
    EvictionPolicy::Lru,
    EvictionPolicy::Fifo,
    EvictionPolicy::Clock,
];

/// Keys drawn from a hot set of `CAPACITY / 2` with probability 0.8,
/// otherwise from a cold range ten times the capacity.
fn hotset_keys(seed: u64) -> Vec<u64> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let hot = (CAPACITY / 2) as u64;
    let universe = (CAPACITY * 10) as u64;
    (0..OPS)
        .map(|_| {
            if rng.gen_bool(0.8) {
                rng.gen_range(0..hot)
            } else {
                rng.gen_range(hot..universe)
            }
        })
        .collect()
}

/// Replays `keys` against a policy and returns the number of hits.
fn replay(policy: EvictionPolicy, keys: &[u64]) -> usize {
    let mut tracker = policy.build::<u64>(CAPACITY);
    let mut resident = HashSet::with_capacity(CAPACITY);
    let mut hits = 0;
    for &key in keys {
        if resident.contains(&key) {
            tracker.record_access(&key);
            hits += 1;
            continue;
        }
        if resident.len() == CAPACITY
            && let Some(victim) = tracker.pop_victim()
        {
            resident.remove(&victim);
        }
        tracker.record_insert(key);
        resident.insert(key);
    }
    hits
}

fn bench_hotset_replay(c: &mut Criterion) {
    let keys = hotset_keys(42);
    let mut group = c.benchmark_group("policy_hotset_replay");
    group.throughput(Throughput::Elements(OPS as u64));
    for policy in POLICIES {
        group.bench_with_input(BenchmarkId::from_parameter(format!("{policy:?}")), &keys, |b, keys| {
            b.iter(|| black_box(replay(policy, keys)))
        });
    }
    group.finish();
}

fn bench_eviction_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("policy_eviction_churn");
    group.throughput(Throughput::Elements(CAPACITY as u64));
    for policy in POLICIES {
        group.bench_function(format!("{policy:?}"), |b| {
            b.iter_batched(
                || {
                    let mut tracker = policy.build::<u64>(CAPACITY);
                    for key in 0..CAPACITY as u64 {
                        tracker.record_insert(key);
                    }
                    tracker
                },
                |mut tracker| {
                    for key in 0..CAPACITY as u64 {
                        let victim = tracker.pop_victim();
                        tracker.record_insert(black_box(key + 10_000));
                        black_box(victim);
                    }
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_hit_ratio_report(c: &mut Criterion) {
    // Not a timing benchmark: prints the hit ratio of each policy once.
    let keys = hotset_keys(7);
    for policy in POLICIES {
        let hits = replay(policy, &keys);
        println!(
            "{policy:?}: hit ratio {:.3} ({hits}/{OPS})",
            hits as f64 / OPS as f64
        );
    }
    c.bench_function("policy_build", |b| {
        b.iter(|| black_box(EvictionPolicy::Lru.build::<u64>(black_box(CAPACITY))))
    });
}

criterion_group!(
    benches,
    bench_hotset_replay,
    bench_eviction_churn,
    bench_hit_ratio_report
);
criterion_main!(benches);
