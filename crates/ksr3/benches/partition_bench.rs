//! End-to-end partition throughput on seeded random inputs.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use ksr3::prelude::*;

fn draw_scene(count: u64) -> Vec<Vec<Vec3<f64>>> {
    (0..count)
        .map(|index| draw_polygon_3(PolyCfg::default(), ReplayToken { seed: 42, index }))
        .collect()
}

fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition");
    for count in [1u64, 2, 4] {
        group.bench_function(format!("random_{count}"), |b| {
            b.iter_batched(
                || draw_scene(count),
                |polys| {
                    let mut engine = KineticEngine::new(PartitionCfg::default());
                    let _ = engine.partition(&polys, |p| p.as_slice());
                    engine.events_applied()
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_partition);
criterion_main!(benches);
