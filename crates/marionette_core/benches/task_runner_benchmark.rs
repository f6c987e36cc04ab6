//! # Task Runner Benchmark
//!
//! Measures submit + tick throughput for the command queue.
//!
//! Scenarios:
//! 1. Fire-and-forget submissions from one owner, drained in one tick
//! 2. Result submissions interleaved across many owners
//! 3. A delayed head item holding back its owner while others drain

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use marionette_core::{EntityId, TaskRunner};

const BATCH: u64 = 1_000;
const OWNERS: u64 = 64;

fn bench_fire_and_forget(c: &mut Criterion) {
    c.bench_function("submit_tick_1k_single_owner", |b| {
        b.iter_batched(
            TaskRunner::<u64>::new,
            |runner| {
                let owner = Some(EntityId::new(1));
                for n in 0..BATCH {
                    let _ = runner.submit(owner, 0, move |sum| {
                        *sum += n;
                        Ok(())
                    });
                }
                let mut sum = 0;
                runner.tick(&mut sum);
                black_box(sum)
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_results_many_owners(c: &mut Criterion) {
    c.bench_function("submit_for_result_1k_64_owners", |b| {
        b.iter_batched(
            TaskRunner::<u64>::new,
            |runner| {
                let futures: Vec<_> = (0..BATCH)
                    .map(|n| {
                        runner.submit_for_result(Some(EntityId::new(n % OWNERS)), 0, move |sum| {
                            *sum += n;
                            Ok(*sum)
                        })
                    })
                    .collect();
                let mut sum = 0;
                runner.tick(&mut sum);
                let last = futures.into_iter().filter_map(|f| f.wait().ok()).max();
                black_box(last)
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_held_owner_scan(c: &mut Criterion) {
    c.bench_function("tick_with_held_owner_1k", |b| {
        b.iter_batched(
            || {
                let runner = TaskRunner::<u64>::new();
                let held = Some(EntityId::new(0));
                let _ = runner.submit(held, 1_000, |_| Ok(()));
                for n in 0..BATCH {
                    let owner = if n % 2 == 0 { held } else { Some(EntityId::new(n)) };
                    let _ = runner.submit(owner, 0, move |sum| {
                        *sum += n;
                        Ok(())
                    });
                }
                runner
            },
            |runner| {
                let mut sum = 0;
                black_box(runner.tick(&mut sum))
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_fire_and_forget,
    bench_results_many_owners,
    bench_held_owner_scan
);
criterion_main!(benches);
