use glam::{DMat3, DVec3};
use nalgebra::{DMatrix, DVector};

use super::Relation;
use crate::error::RelationError;

/// Frictionless contact between two spheres.
///
/// `x = [q_a; q_b]` where the first three coordinates of each body are the
/// sphere centre. `h = ‖p_b − p_a‖ − r_a − r_b` and `g = Cᵀ(x)·λ`, so the
/// input depends on the configuration and `K = ∂g/∂x` is reported.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereSphereRelation {
    pub radius_a: f64,
    pub radius_b: f64,
    pub ndof_a: usize,
    pub ndof_b: usize,
}

impl SphereSphereRelation {
    pub fn new(radius_a: f64, ndof_a: usize, radius_b: f64, ndof_b: usize) -> Self {
        Self {
            radius_a,
            radius_b,
            ndof_a,
            ndof_b,
        }
    }

    fn centres(&self, x: &DVector<f64>) -> Result<(DVec3, DVec3), RelationError> {
        if self.ndof_a < 3 || self.ndof_b < 3 || x.len() != self.ndof_a + self.ndof_b {
            return Err(RelationError::Shape {
                slot: "x",
                rows: self.ndof_a + self.ndof_b,
                cols: 1,
                got_rows: x.len(),
                got_cols: 1,
            });
        }
        let a = DVec3::new(x[0], x[1], x[2]);
        let o = self.ndof_a;
        let b = DVec3::new(x[o], x[o + 1], x[o + 2]);
        Ok((a, b))
    }

    /// Unit normal from a to b and the centre distance.
    fn normal(&self, x: &DVector<f64>) -> Result<(DVec3, f64), RelationError> {
        let (a, b) = self.centres(x)?;
        let delta = b - a;
        let distance = delta.length();
        if distance <= f64::EPSILON {
            return Ok((DVec3::Z, distance));
        }
        Ok((delta / distance, distance))
    }

    fn write_jacobian(&self, n: DVec3, c: &mut DMatrix<f64>) {
        *c = DMatrix::zeros(1, self.ndof_a + self.ndof_b);
        let o = self.ndof_a;
        for (axis, value) in n.to_array().into_iter().enumerate() {
            c[(0, axis)] = -value;
            c[(0, o + axis)] = value;
        }
    }
}

impl Relation for SphereSphereRelation {
    fn input_size(&self) -> usize {
        self.ndof_a + self.ndof_b
    }

    fn output_size(&self) -> usize {
        1
    }

    fn compute_h(
        &self,
        _t: f64,
        x: &DVector<f64>,
        _lambda: &DVector<f64>,
        y: &mut DVector<f64>,
    ) -> Result<(), RelationError> {
        let (_, distance) = self.normal(x)?;
        *y = DVector::from_element(1, distance - self.radius_a - self.radius_b);
        Ok(())
    }

    fn compute_g(
        &self,
        _t: f64,
        x: &DVector<f64>,
        lambda: &DVector<f64>,
        r: &mut DVector<f64>,
    ) -> Result<(), RelationError> {
        let (n, _) = self.normal(x)?;
        let mut c = DMatrix::zeros(1, self.input_size());
        self.write_jacobian(n, &mut c);
        *r = c.transpose() * lambda;
        Ok(())
    }

    fn compute_jac_h_x(
        &self,
        _t: f64,
        x: &DVector<f64>,
        _lambda: &DVector<f64>,
        c: &mut DMatrix<f64>,
    ) -> Result<(), RelationError> {
        let (n, _) = self.normal(x)?;
        self.write_jacobian(n, c);
        Ok(())
    }

    fn compute_jac_g_lambda(
        &self,
        _t: f64,
        x: &DVector<f64>,
        _lambda: &DVector<f64>,
        b: &mut DMatrix<f64>,
    ) -> Result<(), RelationError> {
        let (n, _) = self.normal(x)?;
        let mut c = DMatrix::zeros(1, self.input_size());
        self.write_jacobian(n, &mut c);
        *b = c.transpose();
        Ok(())
    }

    fn compute_jac_g_x(
        &self,
        _t: f64,
        x: &DVector<f64>,
        lambda: &DVector<f64>,
        k: &mut DMatrix<f64>,
    ) -> Result<bool, RelationError> {
        let (n, distance) = self.normal(x)?;
        let size = self.input_size();
        *k = DMatrix::zeros(size, size);
        if distance <= f64::EPSILON {
            return Ok(true);
        }
        // ∂n/∂p_b = (I − n·nᵀ) / ‖p_b − p_a‖
        let outer = DMat3::from_cols(n * n.x, n * n.y, n * n.z);
        let projector = (DMat3::IDENTITY - outer) * (lambda[0] / distance);
        let o = self.ndof_a;
        for row in 0..3 {
            for col in 0..3 {
                let value = projector.col(col)[row];
                k[(row, col)] = value;
                k[(row, o + col)] = -value;
                k[(o + row, col)] = -value;
                k[(o + row, o + col)] = value;
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gap_between_touching_spheres_is_zero() {
        let relation = SphereSphereRelation::new(0.5, 3, 0.25, 3);
        let x = DVector::from_vec(vec![0.0, 0.0, 0.0, 0.0, 0.75, 0.0]);
        let mut y = DVector::zeros(1);
        relation
            .compute_h(0.0, &x, &DVector::zeros(1), &mut y)
            .unwrap();
        assert!(y[0].abs() < 1e-12);
    }
}
