use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use unilateral::*;

const H: f64 = 0.005;
const RADIUS: f64 = 0.1;

/// Row of resting spheres, each touching its neighbour and the ground.
fn sphere_row(count: usize, parallel: bool) -> Simulation {
    let mut config = SimulationConfig::default().with_time(0.0, 1.0e6, H);
    config.parallel = parallel;
    let mut builder = SimulationBuilder::new(config);
    let mut source = SphereContacts::new(NonSmoothLaw::newton_impact_friction(0.0, 0.5), 0.02)
        .with_plane(HalfSpace::new(DVec3::Z, 0.0));
    for i in 0..count {
        // Every fourth gap is left open so the row splits into islands.
        let x = i as f64 * 2.0 * RADIUS + (i / 4) as f64 * 0.5;
        let body = builder.add_body(Body::sphere([x, 0.0, RADIUS], [0.0; 6], 1.0, RADIUS));
        source = source.with_sphere(body, RADIUS);
    }
    builder.add_contact_source(source);
    builder.add_force(GravityForce::new(DVec3::new(0.0, 0.0, -9.81)));
    match builder.build() {
        Ok(simulation) => simulation,
        Err(err) => panic!("invalid benchmark scene: {err}"),
    }
}

fn coupled_problem(contacts: usize) -> FrictionContactProblem {
    let size = 3 * contacts;
    let w = DMatrix::from_fn(size, size, |i, j| {
        let coupling = 0.5 / size as f64 * ((i * 7 + j * 7) as f64).cos();
        if i == j {
            1.0 + coupling
        } else {
            coupling
        }
    });
    let q = DVector::from_fn(size, |i, _| if i % 3 == 0 { -1.0 } else { 0.2 });
    let laws: Vec<(NonSmoothLaw, u64)> = (0..contacts)
        .map(|i| (NonSmoothLaw::newton_impact_friction(0.0, 0.3), i as u64))
        .collect();
    FrictionContactProblem::new(w, q, ContactBlock::stack(&laws))
}

fn bench_simulation_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulation_step");
    for &count in &[8usize, 32, 64] {
        group.bench_with_input(BenchmarkId::new("sequential", count), &count, |b, &count| {
            let mut simulation = sphere_row(count, false);
            b.iter(|| black_box(simulation.step().ok()))
        });
        group.bench_with_input(BenchmarkId::new("parallel", count), &count, |b, &count| {
            let mut simulation = sphere_row(count, true);
            b.iter(|| black_box(simulation.step().ok()))
        });
    }
    group.finish();
}

fn bench_nsgs(c: &mut Criterion) {
    let mut group = c.benchmark_group("nsgs");
    for &contacts in &[4usize, 16, 64] {
        let problem = coupled_problem(contacts);
        group.bench_with_input(
            BenchmarkId::new("cold_start", contacts),
            &problem,
            |b, problem| {
                let solver = NsgsSolver::new(200, 1e-8);
                b.iter(|| {
                    let mut lambda = DVector::zeros(problem.size());
                    black_box(solver.solve(black_box(problem), &mut lambda))
                })
            },
        );
        group.bench_with_input(
            BenchmarkId::new("relaxed", contacts),
            &problem,
            |b, problem| {
                let solver = NsgsSolver::new(200, 1e-8)
                    .with_kind(SolverKind::NsgsRelaxed { omega: 1.3 });
                b.iter(|| {
                    let mut lambda = DVector::zeros(problem.size());
                    black_box(solver.solve(black_box(problem), &mut lambda))
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_simulation_step, bench_nsgs);
criterion_main!(benches);
