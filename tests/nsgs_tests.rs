use approx::assert_abs_diff_eq;
use unilateral::*;

/// Two frictionless contacts that almost share a direction.
fn nearly_parallel(interactions: [u64; 2]) -> FrictionContactProblem {
    let law = NonSmoothLaw::newton_impact(0.0);
    FrictionContactProblem::new(
        DMatrix::from_row_slice(2, 2, &[1.0, 0.999, 0.999, 1.0]),
        DVector::from_vec(vec![-1.0, -1.0]),
        ContactBlock::stack(&[(law, interactions[0]), (law, interactions[1])]),
    )
}

/// Three frictional contacts with a dense, well-conditioned Delassus operator.
fn coupled_friction(interactions: [u64; 3]) -> FrictionContactProblem {
    let law = NonSmoothLaw::newton_impact_friction(0.0, 0.3);
    let w = DMatrix::from_fn(9, 9, |i, j| {
        let coupling = 0.1 * ((i + j) as f64).sin();
        if i == j {
            1.0 + coupling
        } else {
            coupling
        }
    });
    let q = DVector::from_vec(vec![-1.0, 0.4, -0.2, -0.5, -0.3, 0.1, -2.0, 0.0, 0.6]);
    let blocks = ContactBlock::stack(&[
        (law, interactions[0]),
        (law, interactions[1]),
        (law, interactions[2]),
    ]);
    FrictionContactProblem::new(w, q, blocks)
}

#[test]
fn stops_at_itermax() {
    let problem = nearly_parallel([0, 1]);
    let solver = NsgsSolver::new(5, 1e-14).with_multipoint(false);
    let mut lambda = DVector::zeros(2);
    let outcome = solver.solve(&problem, &mut lambda);
    assert!(!outcome.converged);
    assert_eq!(outcome.iterations, 5);
    assert!(outcome.error > 1e-14);
}

#[test]
fn converges_on_slow_coupling() {
    let problem = nearly_parallel([0, 1]);
    let solver = NsgsSolver::new(50_000, 1e-10).with_multipoint(false);
    let mut lambda = DVector::zeros(2);
    let outcome = solver.solve(&problem, &mut lambda);
    assert!(outcome.converged, "{outcome:?}");
    assert!(outcome.iterations <= 50_000);
    assert_abs_diff_eq!(lambda[0], 1.0 / 1.999, epsilon = 1e-5);
    assert_abs_diff_eq!(lambda[1], 1.0 / 1.999, epsilon = 1e-5);
}

#[test]
fn multipoint_block_reaches_the_same_solution() {
    let problem = nearly_parallel([9, 9]);
    let solver = NsgsSolver::new(50_000, 1e-10);
    let mut lambda = DVector::zeros(2);
    let outcome = solver.solve(&problem, &mut lambda);
    assert!(outcome.converged, "{outcome:?}");
    assert_abs_diff_eq!(lambda[0], 1.0 / 1.999, epsilon = 1e-5);
    assert_abs_diff_eq!(lambda[1], 1.0 / 1.999, epsilon = 1e-5);
}

#[test]
fn multipoint_is_inert_for_single_point_contacts() {
    let problem = coupled_friction([1, 2, 3]);
    let mut with = DVector::zeros(9);
    let mut without = DVector::zeros(9);
    let a = NsgsSolver::new(30, 1e-12)
        .with_multipoint(true)
        .solve(&problem, &mut with);
    let b = NsgsSolver::new(30, 1e-12)
        .with_multipoint(false)
        .solve(&problem, &mut without);
    assert_eq!(with, without);
    assert_eq!(a, b);
}

#[test]
fn every_iterate_respects_the_cone() {
    let problem = coupled_friction([1, 2, 3]);
    for itermax in [1, 2, 5, 50] {
        let mut lambda = DVector::zeros(9);
        NsgsSolver::new(itermax, 1e-12).solve(&problem, &mut lambda);
        for block in &problem.contacts {
            let o = block.offset;
            let tangent = (lambda[o + 1].powi(2) + lambda[o + 2].powi(2)).sqrt();
            assert!(lambda[o] >= 0.0);
            assert!(tangent <= 0.3 * lambda[o] + 1e-12, "itermax {itermax}: {lambda}");
        }
    }
}

#[test]
fn friction_problem_converges() {
    let problem = coupled_friction([1, 2, 3]);
    let mut lambda = DVector::zeros(9);
    let outcome = NsgsSolver::new(1_000, 1e-10).solve(&problem, &mut lambda);
    assert!(outcome.converged, "{outcome:?}");
    assert!(problem.error(&lambda) < 1e-10);

    // Normal velocities are non-negative at the solution.
    let u = problem.velocity(&lambda);
    for block in &problem.contacts {
        assert!(u[block.offset] > -1e-8);
    }
}

#[test]
fn warm_start_at_the_solution_needs_one_sweep() {
    let problem = coupled_friction([1, 2, 3]);
    let mut lambda = DVector::zeros(9);
    let first = NsgsSolver::new(1_000, 1e-12).solve(&problem, &mut lambda);
    assert!(first.converged);
    let outcome = NsgsSolver::new(1_000, 1e-8).solve(&problem, &mut lambda);
    assert!(outcome.converged);
    assert_eq!(outcome.iterations, 1);
}

#[test]
fn relaxation_speeds_up_slow_coupling() {
    let problem = nearly_parallel([0, 1]);
    let mut plain = DVector::zeros(2);
    let gs = NsgsSolver::new(50_000, 1e-10)
        .with_multipoint(false)
        .solve(&problem, &mut plain);

    let mut relaxed = DVector::zeros(2);
    let sor = NsgsSolver::new(50_000, 1e-10)
        .with_multipoint(false)
        .with_kind(SolverKind::NsgsRelaxed { omega: 1.5 })
        .solve(&problem, &mut relaxed);

    assert!(gs.converged && sor.converged);
    assert!(sor.iterations < gs.iterations, "{} vs {}", sor.iterations, gs.iterations);
    assert_abs_diff_eq!(relaxed[0], plain[0], epsilon = 1e-5);
}

#[test]
fn degenerate_contacts_are_skipped_and_reported() {
    let law = NonSmoothLaw::newton_impact(0.0);
    let problem = FrictionContactProblem::new(
        DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 0.0]),
        DVector::from_vec(vec![-1.0, -1.0]),
        ContactBlock::stack(&[(law, 4), (law, 5)]),
    );
    let mut lambda = DVector::from_vec(vec![0.0, 7.0]);
    let outcome = NsgsSolver::new(10, 1e-10).solve(&problem, &mut lambda);
    assert!(outcome.converged);
    assert_eq!(outcome.dropped, vec![1]);
    assert_abs_diff_eq!(lambda[0], 0.5, epsilon = 1e-15);
    assert_eq!(lambda[1], 0.0);
}

#[test]
fn empty_problem_is_trivially_solved() {
    let problem = FrictionContactProblem::new(DMatrix::zeros(0, 0), DVector::zeros(0), Vec::new());
    let mut lambda = DVector::zeros(0);
    let outcome = NsgsSolver::new(10, 1e-8).solve(&problem, &mut lambda);
    assert!(outcome.converged);
    assert_eq!(outcome.iterations, 0);
}
