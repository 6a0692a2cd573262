use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use superfill::models::electrofill::geometry::geometry_for;
use superfill::numerics::transient::MovingBoundaryModel;
use superfill::physics::levelset::reinitialize;
use superfill::{ElectrofillSystem, SimulationParams};

fn resolutions() -> Vec<usize> {
    vec![10, 20, 40]
}

fn params(nx: usize) -> SimulationParams {
    SimulationParams {
        feature_depth: 8e-6,
        router: 2e-6,
        rboundary: 20e-6,
        delta: 30e-6,
        nx,
        ..Default::default()
    }
}

fn bench_mesh_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("mesh_build");
    for &nx in &resolutions() {
        let params = params(nx);
        let geometry = geometry_for(params.geometry);
        group.bench_with_input(BenchmarkId::from_parameter(nx), &nx, |b, &_| {
            b.iter(|| {
                let mesh = geometry.build_mesh(&params).unwrap();
                std::hint::black_box(mesh);
            });
        });
    }
    group.finish();
}

fn bench_reinitialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("reinitialize");
    for &nx in &resolutions() {
        let system = ElectrofillSystem::new(params(nx)).unwrap();
        let mesh = &system.mesh;
        // Sign-only level set so each pass does the full march.
        let phi: Vec<f64> = system.fields.distance.iter().map(|d| d.signum()).collect();
        group.bench_with_input(BenchmarkId::from_parameter(nx), &nx, |b, &_| {
            b.iter_batched(
                || phi.clone(),
                |mut phi| {
                    reinitialize(mesh, &mut phi);
                    std::hint::black_box(phi);
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("sweep");
    group.sample_size(10);
    for &nx in &resolutions() {
        let mut system = ElectrofillSystem::new(params(nx)).unwrap();
        system.update_old();
        system.snapshot_distance();
        system.extend();
        let dt = system.params.dt;
        group.bench_with_input(BenchmarkId::from_parameter(nx), &nx, |b, &_| {
            b.iter(|| {
                let residuals = system.sweep(dt).unwrap();
                system.rollback();
                std::hint::black_box(residuals);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_mesh_build, bench_reinitialize, bench_sweep);
criterion_main!(benches);
