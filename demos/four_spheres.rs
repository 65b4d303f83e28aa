use unilateral::*;

const RADIUS: f64 = 0.1;

fn main() -> Result<(), SimulationError> {
    let mut config = SimulationConfig::default().with_time(0.0, 2.0, 0.005);
    config.parallel = true;
    config.output_frequency = 50;
    let mut builder = SimulationBuilder::new(config);

    let mut source = SphereContacts::new(NonSmoothLaw::newton_impact_friction(0.3, 0.4), 0.05)
        .with_plane(HalfSpace::new(DVec3::Z, 0.0));
    let starts = [
        ([0.0, 0.0, RADIUS], [0.5, 0.0, 0.0]),
        ([0.0, 0.0, 3.5 * RADIUS], [0.0, 0.0, 0.0]),
        ([1.0, 0.0, 0.6], [-0.3, 0.0, 0.0]),
        ([1.05, 0.0, 1.0], [0.0, 0.1, 0.0]),
    ];
    for (index, (position, velocity)) in starts.into_iter().enumerate() {
        let mut v = [0.0; 6];
        v[..3].copy_from_slice(&velocity);
        let body = builder.add_body(
            Body::sphere(position, v, 1.0, RADIUS).with_name(format!("sphere {index}")),
        );
        source = source.with_sphere(body, RADIUS);
    }
    builder.add_contact_source(source);
    builder.add_force(GravityForce::new(DVec3::new(0.0, 0.0, -9.81)));
    let recorder = Recorder::new();
    builder.add_observer(recorder.clone());

    let mut simulation = builder.build()?;
    simulation.run()?;

    for snapshot in recorder.snapshots() {
        let heights: Vec<String> = snapshot
            .bodies
            .iter()
            .map(|body| format!("{:.3}", body.q[2]))
            .collect();
        println!("t = {:.2}: z = [{}]", snapshot.t, heights.join(", "));
    }
    if let Some(worst) = recorder
        .steps()
        .iter()
        .max_by(|a, b| a.max_violation.total_cmp(&b.max_violation))
    {
        println!(
            "deepest penetration {:.2e} at t = {:.3} ({} contacts, {} islands)",
            worst.max_violation, worst.t, worst.active_contacts, worst.islands
        );
    }
    Ok(())
}
