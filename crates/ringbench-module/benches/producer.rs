//! Producer / consumer hot path over anonymous rings.
//!
//! Run with `cargo bench -p ringbench-module --features testing`.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ringbench_core::inflight::Inflight;
use ringbench_core::kernel::{RingKernel, ENTER_GETEVENTS};
use ringbench_core::stats::QueueStats;
use ringbench_module::testing::{anonymous_rings, FakeKernel};
use ringbench_module::{BufferPool, CompletionConsumer, SubmissionProducer, Target, TargetSet};

const BLOCK: u32 = 4096;

fn bench_prep_reap(c: &mut Criterion) {
    let mut group = c.benchmark_group("prep_reap");
    let file = tempfile::NamedTempFile::new().expect("tempfile");
    file.as_file().set_len(1 << 30).expect("set_len");
    let targets = Arc::new(
        TargetSet::from_targets(vec![Target::open(file.path(), BLOCK, true).expect("open")])
            .expect("targets"),
    );

    for &(depth, batch) in &[(32u32, 8u32), (128, 32), (1024, 64)] {
        let (rings, _) = anonymous_rings(depth).expect("rings");
        let pool = BufferPool::new(depth, BLOCK).expect("pool");
        let mut producer = SubmissionProducer::new(
            rings.sq.clone(),
            rings.sqes.clone(),
            targets.clone(),
            pool,
            false,
            1,
        )
        .expect("producer");
        let mut consumer = CompletionConsumer::new(rings.cq.clone(), BLOCK);
        let mut kernel = FakeKernel::new(rings, BLOCK as i32);
        let mut inflight = Inflight::new(depth);
        let stats = QueueStats::new();

        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::new("depth", depth), &batch, |b, &batch| {
            b.iter(|| {
                let n = producer.prep(batch);
                inflight.add(n);
                kernel.enter(n, 0, ENTER_GETEVENTS);
                black_box(consumer.reap(&mut inflight, &stats).expect("reap"));
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_prep_reap);
criterion_main!(benches);
