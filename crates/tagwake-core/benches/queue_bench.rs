//! Criterion benchmarks for [`PendingQueue`] matching.
//!
//! Measures the cost of splitting a full queue against a detected identity,
//! which runs under the dispatcher lock on every identity event.
//!
//! Run with:
//! ```bash
//! cargo bench --package tagwake-core --bench queue_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tagwake_core::{PendingMessage, PendingQueue};

/// Builds a full queue where every `stride`-th message is addressed to "T0".
///
/// A `stride` of zero addresses nothing to "T0".
fn build_queue(capacity: usize, stride: usize) -> PendingQueue {
    let mut queue = PendingQueue::with_capacity(capacity);
    for i in 0..capacity {
        let recipient = if stride != 0 && i % stride == 0 { "T0".to_string() } else { format!("T{}", i % 7 + 1) };
        queue
            .push(PendingMessage::new(recipient, format!("payload-{i}")))
            .expect("queue sized to fit");
    }
    queue
}

fn bench_take_addressed_to(c: &mut Criterion) {
    let mut group = c.benchmark_group("take_addressed_to");

    for &capacity in &[16usize, 64, 256] {
        group.bench_with_input(BenchmarkId::new("one_in_four", capacity), &capacity, |b, &cap| {
            b.iter_batched(
                || build_queue(cap, 4),
                |mut queue| black_box(queue.take_addressed_to(black_box("T0"))),
                criterion::BatchSize::SmallInput,
            );
        });
        group.bench_with_input(BenchmarkId::new("no_match", capacity), &capacity, |b, &cap| {
            b.iter_batched(
                || build_queue(cap, 0),
                |mut queue| black_box(queue.take_addressed_to(black_box("T0"))),
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_take_addressed_to);
criterion_main!(benches);
