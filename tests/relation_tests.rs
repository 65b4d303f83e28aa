use approx::assert_abs_diff_eq;
use unilateral::*;

/// Bead kept inside a circle of radius `radius`: `h = radius − ‖x‖`.
fn ring(radius: f64, with_k: bool) -> NonlinearRelation {
    let builder = NonlinearRelation::builder(2, 1)
        .h(move |_t, x, _l, y| y[0] = radius - x.norm())
        .g(|_t, x, l, r| *r = -x * (l[0] / x.norm()))
        .jac_h_x(|_t, x, _l, c| {
            let n = x.norm();
            c[(0, 0)] = -x[0] / n;
            c[(0, 1)] = -x[1] / n;
        })
        .jac_g_lambda(|_t, x, _l, b| {
            let n = x.norm();
            b[(0, 0)] = -x[0] / n;
            b[(1, 0)] = -x[1] / n;
        });
    if !with_k {
        return builder.build();
    }
    builder
        .jac_g_x(|_t, x, l, k| {
            let n = x.norm();
            let outer = x * x.transpose() / (n * n * n);
            *k = (DMatrix::identity(2, 2) / n - outer) * -l[0];
        })
        .build()
}

#[test]
fn linear_relation_is_exact() {
    let c = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 0.5, -1.0, 0.0, 3.0]);
    let relation = LinearRelation::lagrangian(c.clone());
    let x = DVector::from_vec(vec![0.3, -1.2, 2.0]);
    let lambda = DVector::from_vec(vec![1.5, -0.25]);

    let mut y = DVector::zeros(2);
    relation.compute_h(0.0, &x, &lambda, &mut y).unwrap();
    assert_eq!(y, &c * &x);

    let mut r = DVector::zeros(3);
    relation.compute_g(0.0, &x, &lambda, &mut r).unwrap();
    assert_eq!(r, c.transpose() * &lambda);

    let mut jac = DMatrix::zeros(2, 3);
    relation.compute_jac_h_x(0.0, &x, &lambda, &mut jac).unwrap();
    assert_eq!(jac, c);

    let mut b = DMatrix::zeros(3, 2);
    relation.compute_jac_g_lambda(0.0, &x, &lambda, &mut b).unwrap();
    assert_eq!(b, c.transpose());

    let report = check_relation(&relation, 0.0, &x, &lambda, 1e-6).unwrap();
    assert!(report.max_error() < 1e-8, "{report:?}");
}

#[test]
fn linear_offset_shifts_the_gap() {
    let relation = LinearRelation::lagrangian(DMatrix::from_row_slice(1, 2, &[0.0, 1.0]))
        .with_offset(DVector::from_element(1, -0.5));
    let x = DVector::from_vec(vec![3.0, 0.75]);
    let mut y = DVector::zeros(1);
    relation
        .compute_h(0.0, &x, &DVector::zeros(1), &mut y)
        .unwrap();
    assert_abs_diff_eq!(y[0], 0.25, epsilon = 1e-15);
}

#[test]
fn sphere_on_plane_gap_and_tangent_lever() {
    let relation = LinearRelation::sphere_on_plane(DVec3::Z, 0.0, 0.1, true, 3);
    let x = DVector::from_vec(vec![0.0, 0.0, 0.35, 0.0, 0.0, 0.0]);
    let mut y = DVector::zeros(3);
    relation
        .compute_h(0.0, &x, &DVector::zeros(3), &mut y)
        .unwrap();
    assert_abs_diff_eq!(y[0], 0.25, epsilon = 1e-15);

    // Spinning about x drags the contact point along y.
    let c = relation.c();
    let spin = DVector::from_vec(vec![0.0, 0.0, 0.0, 2.0, 0.0, 0.0]);
    let u = c * spin;
    assert_abs_diff_eq!(u[0], 0.0, epsilon = 1e-15);
    assert_abs_diff_eq!((u[1] * u[1] + u[2] * u[2]).sqrt(), 0.2, epsilon = 1e-12);
}

#[test]
fn nonlinear_jacobians_match_finite_differences() {
    let relation = ring(1.0, true);
    let x = DVector::from_vec(vec![0.6, -0.7]);
    let lambda = DVector::from_element(1, 1.3);
    let report = check_relation(&relation, 0.0, &x, &lambda, 1e-6).unwrap();
    assert!(report.max_error() < 1e-6, "{report:?}");
    assert!(report.first_violation(1e-4).is_none());
}

#[test]
fn hidden_dependence_of_g_on_x_is_reported() {
    let relation = ring(1.0, false);
    let x = DVector::from_vec(vec![0.6, -0.7]);
    let lambda = DVector::from_element(1, 1.0);
    let report = check_relation(&relation, 0.0, &x, &lambda, 1e-6).unwrap();
    assert!(report.jac_h_x < 1e-6);
    assert!(report.jac_g_x > 0.1, "{report:?}");
    assert_eq!(report.first_violation(1e-4).map(|(name, _)| name), Some("jac_g_x"));
}

#[test]
fn wrong_jacobian_is_reported() {
    let relation = NonlinearRelation::builder(2, 1)
        .h(|_t, x, _l, y| y[0] = x[0] * x[0] + x[1])
        .jac_h_x(|_t, x, _l, c| {
            c[(0, 0)] = x[0];
            c[(0, 1)] = 1.0;
        })
        .with_b(DMatrix::from_row_slice(2, 1, &[0.0, 1.0]))
        .build();
    let x = DVector::from_vec(vec![2.0, 0.0]);
    let report = check_relation(&relation, 0.0, &x, &DVector::zeros(1), 1e-6).unwrap();
    assert!(report.jac_h_x > 0.1, "{report:?}");
    assert!(report.jac_g_lambda < 1e-9);
}

#[test]
fn missing_callback_is_an_error() {
    let relation = NonlinearRelation::builder(2, 1).build();
    let x = DVector::zeros(2);
    let mut y = DVector::zeros(1);
    let err = relation
        .compute_h(0.0, &x, &DVector::zeros(1), &mut y)
        .unwrap_err();
    assert_eq!(err, RelationError::MissingCallback("h"));
}

#[test]
fn constant_operators_stand_in_for_missing_callbacks() {
    let c = DMatrix::from_row_slice(2, 3, &[0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
    let nonlinear = NonlinearRelation::builder(3, 2)
        .with_c(c.clone())
        .with_b(c.transpose())
        .build();
    let linear = LinearRelation::lagrangian(c);
    let x = DVector::from_vec(vec![0.4, 1.0, -2.0]);
    let lambda = DVector::from_vec(vec![0.5, 0.1]);

    let mut y_nl = DVector::zeros(2);
    let mut y_l = DVector::zeros(2);
    nonlinear.compute_h(0.0, &x, &lambda, &mut y_nl).unwrap();
    linear.compute_h(0.0, &x, &lambda, &mut y_l).unwrap();
    assert_eq!(y_nl, y_l);

    let mut r_nl = DVector::zeros(3);
    let mut r_l = DVector::zeros(3);
    nonlinear.compute_g(0.0, &x, &lambda, &mut r_nl).unwrap();
    linear.compute_g(0.0, &x, &lambda, &mut r_l).unwrap();
    assert_eq!(r_nl, r_l);

    let mut c_nl = DMatrix::zeros(2, 3);
    let mut c_l = DMatrix::zeros(2, 3);
    nonlinear.compute_jac_h_x(0.0, &x, &lambda, &mut c_nl).unwrap();
    linear.compute_jac_h_x(0.0, &x, &lambda, &mut c_l).unwrap();
    assert_eq!(c_nl, c_l);
}

#[test]
fn sphere_pair_reports_distance_minus_radii() {
    let relation = SphereSphereRelation::new(0.5, 3, 0.25, 3);
    let x = DVector::from_vec(vec![0.0, 0.0, 0.0, 0.0, 3.0, 4.0]);
    let mut y = DVector::zeros(1);
    relation
        .compute_h(0.0, &x, &DVector::zeros(1), &mut y)
        .unwrap();
    assert_abs_diff_eq!(y[0], 4.25, epsilon = 1e-12);

    let lambda = DVector::from_element(1, 0.8);
    let report = check_relation(&relation, 0.0, &x, &lambda, 1e-6).unwrap();
    assert!(report.max_error() < 1e-6, "{report:?}");
}
