//! Benchmarks for the per-tick statistics path.

use criterion::{Criterion, criterion_group, criterion_main};
use rtcycle_stats::{Histogram, RunningStats, SnapshotCell};
use std::hint::black_box;

fn bench_running_stats(c: &mut Criterion) {
    let mut stats = RunningStats::new();
    let mut sample = 0_i64;
    c.bench_function("running_stats_update", |b| {
        b.iter(|| {
            sample = (sample + 7_919) % 500_000 - 250_000;
            stats.update(black_box(sample));
        });
    });
    c.bench_function("running_stats_summary", |b| {
        b.iter(|| black_box(stats.summary()));
    });
}

fn bench_histogram(c: &mut Criterion) {
    let Ok(mut hist) = Histogram::new(100, 10_000) else {
        return;
    };
    let mut value = 0_u64;
    c.bench_function("histogram_record", |b| {
        b.iter(|| {
            value = value.wrapping_add(13_331) % 2_000_000;
            hist.record(black_box(value));
        });
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let cell = SnapshotCell::new();
    let Ok(hist) = Histogram::new(100, 1_000) else {
        return;
    };
    c.bench_function("snapshot_publish_take", |b| {
        b.iter(|| {
            let _ = black_box(cell.publish(hist));
            black_box(cell.take())
        });
    });
}

criterion_group!(benches, bench_running_stats, bench_histogram, bench_snapshot);
criterion_main!(benches);
