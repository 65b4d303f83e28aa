use unilateral::*;

const HALF_WIDTH: f64 = 0.5;
const HALF_HEIGHT: f64 = 0.25;

/// Bottom corner `(a, −HALF_HEIGHT)` of a planar block `(x, y, φ)` against
/// the ground `y = 0`, with one tangent direction.
fn corner(a: f64) -> NonlinearRelation {
    let b = HALF_HEIGHT;
    NonlinearRelation::builder(3, 2)
        .h(move |_t, q, _l, y| {
            let (s, c) = q[2].sin_cos();
            y[0] = q[1] + a * s - b * c;
            y[1] = q[0] + a * c + b * s;
        })
        .jac_h_x(move |_t, q, _l, jac| {
            let (s, c) = q[2].sin_cos();
            jac.copy_from_slice(&[0.0, 1.0, 1.0, 0.0, a * c + b * s, -a * s + b * c]);
        })
        .g(move |_t, q, l, r| {
            let (s, c) = q[2].sin_cos();
            r[0] = l[1];
            r[1] = l[0];
            r[2] = (a * c + b * s) * l[0] + (-a * s + b * c) * l[1];
        })
        .jac_g_lambda(move |_t, q, _l, jac| {
            let (s, c) = q[2].sin_cos();
            jac.copy_from_slice(&[0.0, 1.0, a * c + b * s, 1.0, 0.0, -a * s + b * c]);
        })
        .jac_g_x(move |_t, q, l, k| {
            let (s, c) = q[2].sin_cos();
            k.fill(0.0);
            k[(2, 2)] = (-a * s + b * c) * l[0] + (-a * c - b * s) * l[1];
        })
        .build()
}

fn simulate(multipoint: bool) -> Result<(Simulation, Recorder), SimulationError> {
    let mut config = SimulationConfig::default()
        .with_time(0.0, 1.5, 0.002)
        .with_solver_limits(1_000, 1e-8);
    config.multipoints_iterations = multipoint;
    config.verify_jacobians = true;
    config.output_frequency = 125;

    let mass = 2.0;
    let inertia = mass * (4.0 * HALF_WIDTH * HALF_WIDTH + 4.0 * HALF_HEIGHT * HALF_HEIGHT) / 12.0;
    let mut builder = SimulationBuilder::new(config);
    let block = builder.add_body(
        Body::new(
            DVector::from_vec(vec![0.0, 0.6, 0.2]),
            DVector::from_vec(vec![0.4, 0.0, 0.0]),
            DMatrix::from_diagonal(&DVector::from_vec(vec![mass, mass, inertia])),
        )
        .with_name("block"),
    );
    builder.add_force(GravityForce::new(DVec3::new(0.0, -9.81, 0.0)));
    let law = NonSmoothLaw::newton_impact_friction_2d(0.2, 0.5);
    // Both corners belong to the same face, so they share an interaction.
    builder.add_contact(Contact::ground(corner(-HALF_WIDTH), law, block, 1));
    builder.add_contact(Contact::ground(corner(HALF_WIDTH), law, block, 1));
    let recorder = Recorder::new();
    builder.add_observer(recorder.clone());

    let mut simulation = builder.build()?;
    simulation.run()?;
    Ok((simulation, recorder))
}

fn main() -> Result<(), SimulationError> {
    for multipoint in [true, false] {
        let (simulation, recorder) = simulate(multipoint)?;
        let sweeps: usize = recorder
            .steps()
            .iter()
            .map(|step| step.solver_iterations)
            .sum();
        let block = &simulation.bodies()[0];
        println!(
            "multipoint = {multipoint}: {sweeps} NSGS sweeps, final (x, y, φ) = ({:.4}, {:.4}, {:.4})",
            block.q[0], block.q[1], block.q[2]
        );
        for snapshot in recorder.snapshots() {
            println!("  t = {:.2}: q = {:.4?}", snapshot.t, snapshot.bodies[0].q);
        }
    }
    Ok(())
}
