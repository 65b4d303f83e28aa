//! Relations between body coordinates and contact-space variables.
//!
//! A relation maps the stacked generalized positions `x` of the bodies it
//! involves and the contact multiplier `λ` to
//!
//! - the output `y = h(t, x, λ)`, whose first entry is the normal gap, and
//! - the generalized input `R = g(t, x, λ)` fed back to the bodies,
//!
//! together with the Jacobians `C = ∂h/∂x`, `B = ∂g/∂λ` and, for fully
//! coupled relations, `D = ∂h/∂λ` and `K = ∂g/∂x`. The contact-space
//! velocity is `u = C·v + D·λ`.
//!
//! Every Jacobian must agree with its value callback; [`jacobian_check`]
//! measures that against central finite differences.

pub mod jacobian_check;
pub mod linear;
pub mod nonlinear;
pub mod sphere;

pub use jacobian_check::{check_relation, JacobianReport};
pub use linear::LinearRelation;
pub use nonlinear::{NonlinearRelation, NonlinearRelationBuilder};
pub use sphere::SphereSphereRelation;

use std::fmt;

use nalgebra::{DMatrix, DVector};

use crate::error::RelationError;

/// Capability interface for contact relations.
///
/// Implementations must not mutate themselves; every callback writes only
/// into the caller-supplied buffer, which arrives pre-sized.
pub trait Relation: Send + Sync + fmt::Debug {
    /// Size of `x`: sum of the dofs of the involved bodies.
    fn input_size(&self) -> usize;

    /// Size of `y` and `λ`.
    fn output_size(&self) -> usize;

    fn compute_h(
        &self,
        t: f64,
        x: &DVector<f64>,
        lambda: &DVector<f64>,
        y: &mut DVector<f64>,
    ) -> Result<(), RelationError>;

    fn compute_g(
        &self,
        t: f64,
        x: &DVector<f64>,
        lambda: &DVector<f64>,
        r: &mut DVector<f64>,
    ) -> Result<(), RelationError>;

    /// `C = ∂h/∂x`, `output_size × input_size`.
    fn compute_jac_h_x(
        &self,
        t: f64,
        x: &DVector<f64>,
        lambda: &DVector<f64>,
        c: &mut DMatrix<f64>,
    ) -> Result<(), RelationError>;

    /// `B = ∂g/∂λ`, `input_size × output_size`.
    fn compute_jac_g_lambda(
        &self,
        t: f64,
        x: &DVector<f64>,
        lambda: &DVector<f64>,
        b: &mut DMatrix<f64>,
    ) -> Result<(), RelationError>;

    /// `D = ∂h/∂λ`. Returns `false` when the relation has no such coupling.
    fn compute_jac_h_lambda(
        &self,
        _t: f64,
        _x: &DVector<f64>,
        _lambda: &DVector<f64>,
        _d: &mut DMatrix<f64>,
    ) -> Result<bool, RelationError> {
        Ok(false)
    }

    /// `K = ∂g/∂x`. Returns `false` when `g` does not depend on `x`.
    fn compute_jac_g_x(
        &self,
        _t: f64,
        _x: &DVector<f64>,
        _lambda: &DVector<f64>,
        _k: &mut DMatrix<f64>,
    ) -> Result<bool, RelationError> {
        Ok(false)
    }
}

/// Working buffers for one relation evaluation.
///
/// Owned by the step that evaluates the relation, never by the relation.
#[derive(Debug, Clone)]
pub struct RelationWorkspace {
    pub y: DVector<f64>,
    pub r: DVector<f64>,
    pub c: DMatrix<f64>,
    pub b: DMatrix<f64>,
    pub d: Option<DMatrix<f64>>,
    pub k: Option<DMatrix<f64>>,
}

impl RelationWorkspace {
    pub fn new(input_size: usize, output_size: usize) -> Self {
        Self {
            y: DVector::zeros(output_size),
            r: DVector::zeros(input_size),
            c: DMatrix::zeros(output_size, input_size),
            b: DMatrix::zeros(input_size, output_size),
            d: None,
            k: None,
        }
    }

    /// Evaluates `h` and `C` only (activation and violation checks).
    pub fn evaluate_output(
        &mut self,
        relation: &dyn Relation,
        t: f64,
        x: &DVector<f64>,
        lambda: &DVector<f64>,
    ) -> Result<(), RelationError> {
        let (n, m) = (relation.input_size(), relation.output_size());
        self.y = DVector::zeros(m);
        relation.compute_h(t, x, lambda, &mut self.y)?;
        check_vector("h", &self.y, m)?;
        self.c = DMatrix::zeros(m, n);
        relation.compute_jac_h_x(t, x, lambda, &mut self.c)?;
        check_matrix("jac_h_x", &self.c, m, n)?;
        Ok(())
    }

    /// Evaluates every value and Jacobian, checking shapes and finiteness.
    pub fn evaluate(
        &mut self,
        relation: &dyn Relation,
        t: f64,
        x: &DVector<f64>,
        lambda: &DVector<f64>,
    ) -> Result<(), RelationError> {
        let (n, m) = (relation.input_size(), relation.output_size());
        self.evaluate_output(relation, t, x, lambda)?;

        self.r = DVector::zeros(n);
        relation.compute_g(t, x, lambda, &mut self.r)?;
        check_vector("g", &self.r, n)?;

        self.b = DMatrix::zeros(n, m);
        relation.compute_jac_g_lambda(t, x, lambda, &mut self.b)?;
        check_matrix("jac_g_lambda", &self.b, n, m)?;

        let mut d = DMatrix::zeros(m, m);
        self.d = if relation.compute_jac_h_lambda(t, x, lambda, &mut d)? {
            check_matrix("jac_h_lambda", &d, m, m)?;
            Some(d)
        } else {
            None
        };

        let mut k = DMatrix::zeros(n, n);
        self.k = if relation.compute_jac_g_x(t, x, lambda, &mut k)? {
            check_matrix("jac_g_x", &k, n, n)?;
            Some(k)
        } else {
            None
        };
        Ok(())
    }
}

pub(crate) fn check_vector(
    slot: &'static str,
    value: &DVector<f64>,
    len: usize,
) -> Result<(), RelationError> {
    if value.len() != len {
        return Err(RelationError::Shape {
            slot,
            rows: len,
            cols: 1,
            got_rows: value.len(),
            got_cols: 1,
        });
    }
    if value.iter().any(|v| !v.is_finite()) {
        return Err(RelationError::NonFinite(slot));
    }
    Ok(())
}

pub(crate) fn check_matrix(
    slot: &'static str,
    value: &DMatrix<f64>,
    rows: usize,
    cols: usize,
) -> Result<(), RelationError> {
    if value.shape() != (rows, cols) {
        return Err(RelationError::Shape {
            slot,
            rows,
            cols,
            got_rows: value.nrows(),
            got_cols: value.ncols(),
        });
    }
    if value.iter().any(|v| !v.is_finite()) {
        return Err(RelationError::NonFinite(slot));
    }
    Ok(())
}
