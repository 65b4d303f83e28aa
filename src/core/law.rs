use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::{
    config::DEGENERATE_CONTACT_EPSILON,
    error::{ConfigurationError, DegenerateContact},
};

/// Complementarity law enforced at a contact.
///
/// Component 0 of `(u, λ)` is the normal direction; the remaining
/// components are tangential. The normal part is a Newton impact law
/// `u_n⁺ + e·u_n⁻ ≥ 0 ⟂ λ_n ≥ 0`; the restitution shift is applied by the
/// time-stepping scheme, so the law itself sees an ordinary complementarity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonSmoothLaw {
    /// Frictionless unilateral contact.
    NewtonImpact { e: f64 },
    /// Unilateral contact with a Coulomb cone; `dim` is 2 (planar) or 3.
    NewtonImpactFriction { e: f64, mu: f64, dim: usize },
}

impl NonSmoothLaw {
    pub fn newton_impact(e: f64) -> Self {
        NonSmoothLaw::NewtonImpact { e }
    }

    /// Spatial friction: one normal and two tangent directions.
    pub fn newton_impact_friction(e: f64, mu: f64) -> Self {
        NonSmoothLaw::NewtonImpactFriction { e, mu, dim: 3 }
    }

    /// Planar friction: one normal and one tangent direction.
    pub fn newton_impact_friction_2d(e: f64, mu: f64) -> Self {
        NonSmoothLaw::NewtonImpactFriction { e, mu, dim: 2 }
    }

    /// Number of contact-space components.
    pub fn size(&self) -> usize {
        match self {
            NonSmoothLaw::NewtonImpact { .. } => 1,
            NonSmoothLaw::NewtonImpactFriction { dim, .. } => *dim,
        }
    }

    pub fn restitution(&self) -> f64 {
        match self {
            NonSmoothLaw::NewtonImpact { e } | NonSmoothLaw::NewtonImpactFriction { e, .. } => *e,
        }
    }

    pub fn friction(&self) -> f64 {
        match self {
            NonSmoothLaw::NewtonImpact { .. } => 0.0,
            NonSmoothLaw::NewtonImpactFriction { mu, .. } => *mu,
        }
    }

    /// The same law with friction removed.
    pub fn normal_part(&self) -> Self {
        NonSmoothLaw::NewtonImpact {
            e: self.restitution(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let e = self.restitution();
        if !(0.0..=1.0).contains(&e) {
            return Err(ConfigurationError::InvalidParameter {
                name: "e",
                value: e,
                reason: "restitution must lie in [0, 1]",
            });
        }
        let mu = self.friction();
        if !mu.is_finite() || mu < 0.0 {
            return Err(ConfigurationError::InvalidParameter {
                name: "mu",
                value: mu,
                reason: "friction must be finite and >= 0",
            });
        }
        if let NonSmoothLaw::NewtonImpactFriction { dim, .. } = self {
            if !(2..=3).contains(dim) {
                return Err(ConfigurationError::InvalidParameter {
                    name: "dim",
                    value: *dim as f64,
                    reason: "friction law dimension must be 2 or 3",
                });
            }
        }
        Ok(())
    }

    /// Replaces `lambda` by its projection onto the admissible set, given the
    /// local velocity `u = W_ii·λ + q'` evaluated at the current `lambda` and
    /// the diagonal Delassus block `w`.
    ///
    /// The normal multiplier is updated first with step `1/W_nn`; the
    /// tangential velocity is then refreshed and the tangential multiplier is
    /// projected onto the disk of radius `μ·λ_n`. Feasible points are fixed.
    ///
    /// # Panics
    ///
    /// If the law fails [`validate`](Self::validate) with a dimension above 3.
    pub fn project(
        &self,
        u: &[f64],
        lambda: &mut [f64],
        w: &DMatrix<f64>,
    ) -> Result<(), DegenerateContact> {
        let size = self.size();
        debug_assert!(u.len() == size && lambda.len() == size && w.shape() == (size, size));

        let w_nn = w[(0, 0)];
        if !(w_nn > DEGENERATE_CONTACT_EPSILON) {
            return Err(DegenerateContact { normal_entry: w_nn });
        }

        let previous = lambda[0];
        lambda[0] = (previous - u[0] / w_nn).max(0.0);
        if size == 1 {
            return Ok(());
        }
        let delta_n = lambda[0] - previous;

        let mut trace = 0.0;
        for k in 1..size {
            trace += w[(k, k)];
        }
        let rho = if trace > DEGENERATE_CONTACT_EPSILON {
            (size - 1) as f64 / trace
        } else {
            0.0
        };

        let mut tangent = [0.0; 2];
        for k in 1..size {
            let u_t = u[k] + w[(k, 0)] * delta_n;
            tangent[k - 1] = lambda[k] - rho * u_t;
        }
        let radius = self.friction() * lambda[0];
        clamp_to_disk(&mut tangent[..size - 1], radius);
        lambda[1..size].copy_from_slice(&tangent[..size - 1]);
        Ok(())
    }

    /// Euclidean projection onto the admissible set of multipliers
    /// (`λ_n ≥ 0` or the Coulomb cone `‖λ_t‖ ≤ μ·λ_n`).
    pub fn project_on_cone(&self, lambda: &mut [f64]) {
        let mu = self.friction();
        if lambda.len() == 1 {
            lambda[0] = lambda[0].max(0.0);
            return;
        }
        let normal = lambda[0];
        let tangent_norm = lambda[1..].iter().map(|v| v * v).sum::<f64>().sqrt();
        if normal >= 0.0 && tangent_norm <= mu * normal {
            return;
        }
        if mu * tangent_norm + normal <= 0.0 {
            lambda.iter_mut().for_each(|v| *v = 0.0);
            return;
        }
        let projected_normal = (mu * tangent_norm + normal) / (1.0 + mu * mu);
        lambda[0] = projected_normal;
        let scale = mu * projected_normal / tangent_norm;
        lambda[1..].iter_mut().for_each(|v| *v *= scale);
    }

    /// Natural-map residual `‖λ − Π_K(λ − û)‖` with the De Saxcé velocity
    /// `û = u + μ‖u_t‖·n`. Zero exactly when `(u, λ)` satisfies the law.
    ///
    /// # Panics
    ///
    /// If the law fails [`validate`](Self::validate) with a dimension above 3.
    pub fn natural_map_residual(&self, u: &[f64], lambda: &[f64]) -> f64 {
        let size = self.size();
        let mu = self.friction();
        let slip = u[1..size].iter().map(|v| v * v).sum::<f64>().sqrt();

        let mut trial = [0.0; 3];
        for k in 0..size {
            trial[k] = lambda[k] - u[k];
        }
        trial[0] -= mu * slip;
        self.project_on_cone(&mut trial[..size]);

        (0..size)
            .map(|k| (lambda[k] - trial[k]).powi(2))
            .sum::<f64>()
            .sqrt()
    }
}

fn clamp_to_disk(values: &mut [f64], radius: f64) {
    let norm = values.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm <= radius {
        return;
    }
    if radius <= 0.0 || norm == 0.0 {
        values.iter_mut().for_each(|v| *v = 0.0);
        return;
    }
    let scale = radius / norm;
    values.iter_mut().for_each(|v| *v *= scale);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separating_contact_releases_impulse() {
        let law = NonSmoothLaw::newton_impact_friction(0.0, 0.5);
        let w = DMatrix::identity(3, 3);
        let mut lambda = [1.0, 0.2, -0.1];
        let u = [5.0, 0.0, 0.0];
        law.project(&u, &mut lambda, &w).unwrap();
        assert_eq!(lambda, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn zero_normal_entry_is_degenerate() {
        let law = NonSmoothLaw::newton_impact(0.0);
        let w = DMatrix::zeros(1, 1);
        let mut lambda = [0.0];
        assert!(law.project(&[-1.0], &mut lambda, &w).is_err());
    }

    #[test]
    fn cone_projection_lands_on_boundary() {
        let law = NonSmoothLaw::newton_impact_friction(0.0, 0.5);
        let mut lambda = [1.0, 2.0, 0.0];
        law.project_on_cone(&mut lambda);
        let tangent = (lambda[1] * lambda[1] + lambda[2] * lambda[2]).sqrt();
        assert!((tangent - 0.5 * lambda[0]).abs() < 1e-12);
    }

    #[test]
    fn residual_vanishes_on_sliding_solution() {
        let law = NonSmoothLaw::newton_impact_friction(0.0, 0.4);
        let lambda = [2.0, -0.8, 0.0];
        let u = [0.0, 1.5, 0.0];
        assert!(law.natural_map_residual(&u, &lambda) < 1e-12);
    }

    #[test]
    fn rejects_out_of_range_restitution() {
        assert!(NonSmoothLaw::newton_impact(1.5).validate().is_err());
        assert!(NonSmoothLaw::newton_impact_friction(0.5, -0.1)
            .validate()
            .is_err());
    }
}
