use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nalgebra::Point3;
use pointtrack::{AssociationAlgorithm, Associator};
use rand::prelude::*;

fn generate_random_points(n: usize) -> Vec<Point3<f64>> {
    let mut rng = rand::rng();
    (0..n)
        .map(|_| {
            Point3::new(
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(0.5..3.0),
            )
        })
        .collect()
}

fn bench_association(c: &mut Criterion) {
    let mut group = c.benchmark_group("association");

    for size in [8, 16, 64] {
        let tracks = generate_random_points(size);
        let observations = generate_random_points(size);

        for algorithm in [
            AssociationAlgorithm::GreedyNearestNeighbor,
            AssociationAlgorithm::OptimalAssignment,
        ] {
            let associator = Associator::new(algorithm, 0.5);
            group.bench_with_input(
                BenchmarkId::new(algorithm.to_string(), size),
                &size,
                |b, _| b.iter(|| associator.associate(black_box(&tracks), black_box(&observations))),
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_association);
criterion_main!(benches);
