//! Benchmarks for filled contour generation.
//!
//! Run with: cargo bench --package contour --bench contour_benchmarks

use contour::{contour_lattice, contour_mesh, levels_for, LatticeField, MeshField};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use psa_common::ColorMapName;
use test_utils::{cone_lattice, radial_mesh};

fn bench_lattice(c: &mut Criterion) {
    let mut group = c.benchmark_group("contour_lattice");

    for size in [64usize, 128, 256] {
        let data = cone_lattice(size, 5.0);
        let field = LatticeField::from_axes(&data.lons, &data.lats, data.values.clone())
            .expect("valid lattice");
        let levels = levels_for(field.values(), 25).expect("non-empty field");

        group.throughput(Throughput::Elements((size * size) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| contour_lattice(black_box(&field), black_box(&levels), ColorMapName::Blues))
        });
    }

    group.finish();
}

fn bench_mesh(c: &mut Criterion) {
    let mut group = c.benchmark_group("contour_mesh");

    for rings in [20usize, 60, 120] {
        let data = radial_mesh(rings, 96, rings as f64 + 0.5);
        let field = MeshField::from_connectivity(
            data.xs.clone(),
            data.ys.clone(),
            data.values.clone(),
            &data.connectivity,
            data.start_index,
        )
        .expect("valid mesh");
        let levels = levels_for(field.values(), 25).expect("non-empty field");

        group.throughput(Throughput::Elements(data.triangle_count() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rings), &rings, |b, _| {
            b.iter(|| {
                contour_mesh(
                    black_box(&field),
                    black_box(&levels),
                    ColorMapName::Blues,
                    -9999.0,
                )
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_lattice, bench_mesh);
criterion_main!(benches);
