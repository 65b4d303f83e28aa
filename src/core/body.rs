use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Dense index of a body inside a [`Simulation`](crate::Simulation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyId(pub usize);

impl BodyId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A dynamical system described by generalized coordinates.
///
/// `q` and `v` share the same length; `mass` is a constant symmetric positive
/// definite operator of matching size.
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub name: String,
    pub q: DVector<f64>,
    pub v: DVector<f64>,
    pub mass: DMatrix<f64>,
    /// Generalized force accumulator, applied over the next step then cleared.
    pub f_ext: DVector<f64>,
}

impl Body {
    pub fn new(q: DVector<f64>, v: DVector<f64>, mass: DMatrix<f64>) -> Self {
        let ndof = q.len();
        Self {
            name: String::new(),
            q,
            v,
            mass,
            f_ext: DVector::zeros(ndof),
        }
    }

    /// Point mass with `ndof` translational coordinates and scalar mass.
    pub fn point_mass(position: &[f64], velocity: &[f64], mass: f64) -> Self {
        let ndof = position.len();
        Self::new(
            DVector::from_column_slice(position),
            DVector::from_column_slice(velocity),
            DMatrix::from_diagonal_element(ndof, ndof, mass),
        )
    }

    /// Six-dof sphere: position followed by small-rotation coordinates, with
    /// the inertia of a solid ball.
    pub fn sphere(position: [f64; 3], velocity: [f64; 6], mass: f64, radius: f64) -> Self {
        let inertia = 0.4 * mass * radius * radius;
        let mut diagonal = DVector::from_element(6, mass);
        diagonal.rows_mut(3, 3).fill(inertia);
        let q = DVector::from_iterator(6, position.into_iter().chain([0.0; 3]));
        Self::new(
            q,
            DVector::from_column_slice(&velocity),
            DMatrix::from_diagonal(&diagonal),
        )
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn ndof(&self) -> usize {
        self.q.len()
    }

    pub fn apply_force(&mut self, force: &DVector<f64>) {
        self.f_ext += force;
    }

    pub fn clear_forces(&mut self) {
        self.f_ext.fill(0.0);
    }

    pub fn kinetic_energy(&self) -> f64 {
        0.5 * self.v.dot(&(&self.mass * &self.v))
    }

    pub(crate) fn validate(&self, index: usize) -> Result<(), ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidBody { index, reason };
        let ndof = self.ndof();
        if ndof == 0 {
            return Err(invalid("body has no coordinates".into()));
        }
        if self.v.len() != ndof || self.f_ext.len() != ndof {
            return Err(invalid(format!(
                "q has {ndof} entries but v has {} and f_ext {}",
                self.v.len(),
                self.f_ext.len()
            )));
        }
        if self.mass.shape() != (ndof, ndof) {
            return Err(invalid(format!(
                "mass is {:?}, expected {ndof}x{ndof}",
                self.mass.shape()
            )));
        }
        if self.mass.clone().cholesky().is_none() {
            return Err(invalid("mass operator is not positive definite".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_has_ball_inertia() {
        let body = Body::sphere([0.0, 0.0, 1.0], [0.0; 6], 2.0, 0.5);
        assert_eq!(body.ndof(), 6);
        assert!((body.mass[(3, 3)] - 0.2).abs() < 1e-15);
        assert!((body.q[2] - 1.0).abs() < 1e-15);
        assert!(body.validate(0).is_ok());
    }

    #[test]
    fn rejects_singular_mass() {
        let body = Body::point_mass(&[0.0, 0.0], &[0.0, 0.0], 0.0);
        assert!(body.validate(3).is_err());
    }
}
