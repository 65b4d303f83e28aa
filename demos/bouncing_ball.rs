use unilateral::*;

fn main() -> Result<(), SimulationError> {
    let config = SimulationConfig::default().with_time(0.0, 3.0, 0.001);
    let mut builder = SimulationBuilder::new(config);
    let ball = builder.add_body(Body::point_mass(&[0.0, 0.0, 1.0], &[0.0; 3], 1.0).with_name("ball"));
    builder.add_force(GravityForce::new(DVec3::new(0.0, 0.0, -9.81)));
    builder.add_contact(Contact::ground(
        LinearRelation::sphere_on_plane(DVec3::Z, 0.0, 0.1, false, 1),
        NonSmoothLaw::newton_impact(0.9),
        ball,
        0,
    ));
    let recorder = Recorder::new();
    builder.add_observer(recorder.clone());

    let mut simulation = builder.build()?;
    let mut bounces = 0;
    while !simulation.is_finished() {
        let before = simulation.bodies()[0].v[2];
        simulation.step()?;
        let after = simulation.bodies()[0].v[2];
        if before < 0.0 && after > 0.0 {
            bounces += 1;
            println!(
                "bounce {bounces} at t = {:.3}: {:.4} -> {:.4} m/s",
                simulation.time(),
                before,
                after
            );
        }
    }

    let energy = simulation.bodies()[0].kinetic_energy() + 9.81 * simulation.bodies()[0].q[2];
    println!(
        "{} steps, {} snapshots, final energy {:.4} J",
        recorder.step_count(),
        recorder.snapshots().len(),
        energy
    );
    Ok(())
}
