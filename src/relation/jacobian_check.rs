//! Finite-difference consistency check for relation Jacobians.

use nalgebra::{DMatrix, DVector};
use serde::Serialize;

use super::Relation;
use crate::error::RelationError;

/// Max relative error of each reported Jacobian against central differences.
///
/// A relation that does not report `D` or `K` is compared against zero, so a
/// hidden dependence of `h` on `λ` or of `g` on `x` shows up here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct JacobianReport {
    pub jac_h_x: f64,
    pub jac_g_lambda: f64,
    pub jac_h_lambda: f64,
    pub jac_g_x: f64,
}

impl JacobianReport {
    pub fn max_error(&self) -> f64 {
        self.jac_h_x
            .max(self.jac_g_lambda)
            .max(self.jac_h_lambda)
            .max(self.jac_g_x)
    }

    /// First Jacobian whose error exceeds `tolerance`.
    pub fn first_violation(&self, tolerance: f64) -> Option<(&'static str, f64)> {
        [
            ("jac_h_x", self.jac_h_x),
            ("jac_g_lambda", self.jac_g_lambda),
            ("jac_h_lambda", self.jac_h_lambda),
            ("jac_g_x", self.jac_g_x),
        ]
        .into_iter()
        .find(|(_, error)| *error > tolerance)
    }
}

/// Compares every Jacobian of `relation` at `(t, x, λ)` with a central
/// finite difference of step `step`.
pub fn check_relation(
    relation: &dyn Relation,
    t: f64,
    x: &DVector<f64>,
    lambda: &DVector<f64>,
    step: f64,
) -> Result<JacobianReport, RelationError> {
    let (n, m) = (relation.input_size(), relation.output_size());

    let h = |x: &DVector<f64>, l: &DVector<f64>| -> Result<DVector<f64>, RelationError> {
        let mut y = DVector::zeros(m);
        relation.compute_h(t, x, l, &mut y)?;
        super::check_vector("h", &y, m)?;
        Ok(y)
    };
    let g = |x: &DVector<f64>, l: &DVector<f64>| -> Result<DVector<f64>, RelationError> {
        let mut r = DVector::zeros(n);
        relation.compute_g(t, x, l, &mut r)?;
        super::check_vector("g", &r, n)?;
        Ok(r)
    };

    let mut c = DMatrix::zeros(m, n);
    relation.compute_jac_h_x(t, x, lambda, &mut c)?;
    super::check_matrix("jac_h_x", &c, m, n)?;
    let mut b = DMatrix::zeros(n, m);
    relation.compute_jac_g_lambda(t, x, lambda, &mut b)?;
    super::check_matrix("jac_g_lambda", &b, n, m)?;
    let mut d = DMatrix::zeros(m, m);
    if !relation.compute_jac_h_lambda(t, x, lambda, &mut d)? {
        d = DMatrix::zeros(m, m);
    }
    super::check_matrix("jac_h_lambda", &d, m, m)?;
    let mut k = DMatrix::zeros(n, n);
    if !relation.compute_jac_g_x(t, x, lambda, &mut k)? {
        k = DMatrix::zeros(n, n);
    }
    super::check_matrix("jac_g_x", &k, n, n)?;

    let fd_c = central_difference(x, step, m, |xp| h(xp, lambda))?;
    let fd_b = central_difference(lambda, step, n, |lp| g(x, lp))?;
    let fd_d = central_difference(lambda, step, m, |lp| h(x, lp))?;
    let fd_k = central_difference(x, step, n, |xp| g(xp, lambda))?;

    Ok(JacobianReport {
        jac_h_x: relative_error(&c, &fd_c),
        jac_g_lambda: relative_error(&b, &fd_b),
        jac_h_lambda: relative_error(&d, &fd_d),
        jac_g_x: relative_error(&k, &fd_k),
    })
}

fn central_difference<F>(
    at: &DVector<f64>,
    step: f64,
    rows: usize,
    mut eval: F,
) -> Result<DMatrix<f64>, RelationError>
where
    F: FnMut(&DVector<f64>) -> Result<DVector<f64>, RelationError>,
{
    let mut jacobian = DMatrix::zeros(rows, at.len());
    let mut shifted = at.clone();
    for col in 0..at.len() {
        let delta = step * at[col].abs().max(1.0);
        shifted[col] = at[col] + delta;
        let forward = eval(&shifted)?;
        shifted[col] = at[col] - delta;
        let backward = eval(&shifted)?;
        shifted[col] = at[col];
        jacobian.set_column(col, &((forward - backward) / (2.0 * delta)));
    }
    Ok(jacobian)
}

/// `‖A − F‖_max / max(1, ‖F‖_max)`.
fn relative_error(reported: &DMatrix<f64>, estimate: &DMatrix<f64>) -> f64 {
    let scale = estimate.amax().max(1.0);
    (reported - estimate).amax() / scale
}
