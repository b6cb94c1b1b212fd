//! Benchmarks for the full tracking step

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use pointtrack::{AssociationAlgorithm, Observation, TrackManager, TrackerConfig};
use std::hint::black_box;

const FRAME: f64 = 1.0 / 30.0;

/// Objects spread along x, each drifting at its own speed
fn create_test_frames(n_objects: usize, n_frames: usize) -> Vec<Vec<Observation>> {
    (0..n_frames)
        .map(|frame| {
            let t = frame as f64 * FRAME;
            (0..n_objects)
                .map(|i| {
                    let speed = 0.2 + 0.05 * i as f64;
                    Observation::at(i as f64 * 0.5 + speed * t, 0.1 * t, 1.5, 0.9, t)
                })
                .collect()
        })
        .collect()
}

fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracking_step");

    for algorithm in [
        AssociationAlgorithm::GreedyNearestNeighbor,
        AssociationAlgorithm::OptimalAssignment,
    ] {
        let frames = create_test_frames(16, 30);
        let config = TrackerConfig {
            association_algorithm: algorithm,
            ..Default::default()
        };

        group.bench_function(BenchmarkId::new(algorithm.to_string(), 16), |b| {
            b.iter_batched(
                || TrackManager::new(config.clone()).unwrap(),
                |mut tracker| {
                    for (frame, observations) in frames.iter().enumerate() {
                        black_box(tracker.step(black_box(observations), frame as f64 * FRAME));
                    }
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_predict_at(c: &mut Criterion) {
    let frames = create_test_frames(16, 10);
    let mut tracker = TrackManager::new(TrackerConfig::default()).unwrap();
    for (frame, observations) in frames.iter().enumerate() {
        tracker.step(observations, frame as f64 * FRAME);
    }

    c.bench_function("predict_at_16_tracks", |b| {
        b.iter(|| tracker.predict_at(black_box(0.5)))
    });
}

criterion_group!(benches, bench_step, bench_predict_at);
criterion_main!(benches);
