use std::fmt;

use glam::DVec3;
use nalgebra::{DMatrix, DVector};

use crate::{
    core::body::{Body, BodyId},
    error::ConfigurationError,
};

/// Body quantities a force generator may read. `q` and `v` are the values at
/// the evaluation point, which inside a Newton iteration differ from the
/// body's committed state.
#[derive(Debug, Clone, Copy)]
pub struct ForceInput<'a> {
    pub mass: &'a DMatrix<f64>,
    pub q: &'a DVector<f64>,
    pub v: &'a DVector<f64>,
}

/// Trait describing a generalized force `f(t, q, v)` applied to a body.
///
/// Implementations add into the supplied buffers. The Jacobian methods
/// return `false` when they did not contribute, in which case the Newton
/// iteration matrix treats the force as explicit in that argument.
pub trait ForceGenerator: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Dofs the generator requires, or `None` for any body.
    fn dimension(&self) -> Option<usize> {
        None
    }

    fn accumulate(&self, t: f64, input: ForceInput<'_>, force: &mut DVector<f64>);

    fn accumulate_jacobian_q(
        &self,
        _t: f64,
        _input: ForceInput<'_>,
        _jacobian: &mut DMatrix<f64>,
    ) -> bool {
        false
    }

    fn accumulate_jacobian_v(
        &self,
        _t: f64,
        _input: ForceInput<'_>,
        _jacobian: &mut DMatrix<f64>,
    ) -> bool {
        false
    }
}

/// Uniform gravity `M·g`, where `g` fills the first (translational)
/// coordinates of the body.
#[derive(Debug, Clone, Copy)]
pub struct GravityForce {
    pub gravity: DVec3,
}

impl GravityForce {
    pub fn new(gravity: DVec3) -> Self {
        Self { gravity }
    }
}

impl ForceGenerator for GravityForce {
    fn name(&self) -> &'static str {
        "gravity"
    }

    fn accumulate(&self, _t: f64, input: ForceInput<'_>, force: &mut DVector<f64>) {
        let ndof = input.q.len();
        let mut g = DVector::zeros(ndof);
        for (axis, value) in self.gravity.to_array().into_iter().take(ndof).enumerate() {
            g[axis] = value;
        }
        *force += input.mass * g;
    }
}

/// Constant generalized force.
#[derive(Debug, Clone)]
pub struct ConstantForce {
    pub force: DVector<f64>,
}

impl ConstantForce {
    pub fn new(force: DVector<f64>) -> Self {
        Self { force }
    }
}

impl ForceGenerator for ConstantForce {
    fn name(&self) -> &'static str {
        "constant"
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.force.len())
    }

    fn accumulate(&self, _t: f64, _input: ForceInput<'_>, force: &mut DVector<f64>) {
        *force += &self.force;
    }
}

/// Linear spring-damper towards a rest configuration: `−k(q − q₀) − c·v`.
#[derive(Debug, Clone)]
pub struct SpringForce {
    pub rest: DVector<f64>,
    pub stiffness: f64,
    pub damping: f64,
}

impl SpringForce {
    pub fn new(rest: DVector<f64>, stiffness: f64, damping: f64) -> Self {
        Self {
            rest,
            stiffness,
            damping,
        }
    }
}

impl ForceGenerator for SpringForce {
    fn name(&self) -> &'static str {
        "spring"
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.rest.len())
    }

    fn accumulate(&self, _t: f64, input: ForceInput<'_>, force: &mut DVector<f64>) {
        *force -= (input.q - &self.rest) * self.stiffness + input.v * self.damping;
    }

    fn accumulate_jacobian_q(
        &self,
        _t: f64,
        _input: ForceInput<'_>,
        jacobian: &mut DMatrix<f64>,
    ) -> bool {
        for i in 0..self.rest.len() {
            jacobian[(i, i)] -= self.stiffness;
        }
        true
    }

    fn accumulate_jacobian_v(
        &self,
        _t: f64,
        _input: ForceInput<'_>,
        jacobian: &mut DMatrix<f64>,
    ) -> bool {
        for i in 0..self.rest.len() {
            jacobian[(i, i)] -= self.damping;
        }
        true
    }
}

/// Quadratic drag resisting the direction of motion: `−c·‖v‖·v`.
#[derive(Debug, Clone, Copy)]
pub struct DragForce {
    pub drag_coefficient: f64,
}

impl DragForce {
    pub fn new(drag_coefficient: f64) -> Self {
        Self { drag_coefficient }
    }
}

impl ForceGenerator for DragForce {
    fn name(&self) -> &'static str {
        "drag"
    }

    fn accumulate(&self, _t: f64, input: ForceInput<'_>, force: &mut DVector<f64>) {
        let speed = input.v.norm();
        *force -= input.v * (self.drag_coefficient * speed);
    }

    fn accumulate_jacobian_v(
        &self,
        _t: f64,
        input: ForceInput<'_>,
        jacobian: &mut DMatrix<f64>,
    ) -> bool {
        let speed = input.v.norm();
        if speed < 1e-12 {
            return true;
        }
        // ∂(‖v‖v)/∂v = ‖v‖·I + v·vᵀ/‖v‖
        let outer = input.v * input.v.transpose() / speed;
        *jacobian -= (DMatrix::identity(input.v.len(), input.v.len()) * speed + outer)
            * self.drag_coefficient;
        true
    }
}

/// Which bodies a registered generator acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceTarget {
    All,
    Body(BodyId),
}

impl ForceTarget {
    fn includes(&self, body: BodyId) -> bool {
        match self {
            ForceTarget::All => true,
            ForceTarget::Body(id) => *id == body,
        }
    }
}

/// Collection of force generators evaluated by the time-stepping scheme.
#[derive(Debug, Default)]
pub struct ForceRegistry {
    forces: Vec<(ForceTarget, Box<dyn ForceGenerator>)>,
}

impl ForceRegistry {
    pub fn new() -> Self {
        Self { forces: Vec::new() }
    }

    pub fn add_force<F: ForceGenerator + 'static>(&mut self, force: F) {
        self.forces.push((ForceTarget::All, Box::new(force)));
    }

    pub fn add_force_to<F: ForceGenerator + 'static>(&mut self, body: BodyId, force: F) {
        self.forces.push((ForceTarget::Body(body), Box::new(force)));
    }

    pub fn len(&self) -> usize {
        self.forces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forces.is_empty()
    }

    /// Checks every generator against the bodies it targets.
    pub fn validate(&self, bodies: &[Body]) -> Result<(), ConfigurationError> {
        for (target, force) in &self.forces {
            if let ForceTarget::Body(id) = target {
                if id.index() >= bodies.len() {
                    return Err(ConfigurationError::UnknownBody(id.index()));
                }
            }
            let Some(expected) = force.dimension() else {
                continue;
            };
            for (index, body) in bodies.iter().enumerate() {
                if target.includes(BodyId(index)) && body.ndof() != expected {
                    return Err(ConfigurationError::ForceDimension {
                        name: force.name(),
                        body: index,
                        expected,
                        actual: body.ndof(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Sum of every generator acting on `body`.
    pub fn force(&self, t: f64, body: BodyId, input: ForceInput<'_>) -> DVector<f64> {
        let mut force = DVector::zeros(input.q.len());
        for (target, generator) in &self.forces {
            if target.includes(body) {
                generator.accumulate(t, input, &mut force);
            }
        }
        force
    }

    /// `(∂f/∂q, ∂f/∂v)` summed over the generators acting on `body`.
    pub fn jacobians(
        &self,
        t: f64,
        body: BodyId,
        input: ForceInput<'_>,
    ) -> (DMatrix<f64>, DMatrix<f64>) {
        let ndof = input.q.len();
        let mut dq = DMatrix::zeros(ndof, ndof);
        let mut dv = DMatrix::zeros(ndof, ndof);
        for (target, generator) in &self.forces {
            if target.includes(body) {
                generator.accumulate_jacobian_q(t, input, &mut dq);
                generator.accumulate_jacobian_v(t, input, &mut dv);
            }
        }
        (dq, dv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gravity_scales_with_mass() {
        let body = Body::point_mass(&[0.0, 0.0], &[0.0, 0.0], 2.0);
        let mut registry = ForceRegistry::new();
        registry.add_force(GravityForce::new(DVec3::new(0.0, -9.81, 0.0)));
        let input = ForceInput {
            mass: &body.mass,
            q: &body.q,
            v: &body.v,
        };
        let f = registry.force(0.0, BodyId(0), input);
        assert!((f[1] + 19.62).abs() < 1e-12);
        assert_eq!(f[0], 0.0);
    }

    #[test]
    fn drag_jacobian_matches_difference() {
        let drag = DragForce::new(0.7);
        let mass = DMatrix::identity(2, 2);
        let q = DVector::zeros(2);
        let v = DVector::from_vec(vec![1.5, -0.5]);
        let mut jacobian = DMatrix::zeros(2, 2);
        drag.accumulate_jacobian_v(0.0, ForceInput { mass: &mass, q: &q, v: &v }, &mut jacobian);

        let eps = 1e-7;
        for col in 0..2 {
            let mut plus = v.clone();
            plus[col] += eps;
            let mut minus = v.clone();
            minus[col] -= eps;
            let mut f_plus = DVector::zeros(2);
            let mut f_minus = DVector::zeros(2);
            drag.accumulate(0.0, ForceInput { mass: &mass, q: &q, v: &plus }, &mut f_plus);
            drag.accumulate(0.0, ForceInput { mass: &mass, q: &q, v: &minus }, &mut f_minus);
            let column = (f_plus - f_minus) / (2.0 * eps);
            for row in 0..2 {
                assert!((column[row] - jacobian[(row, col)]).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn spring_acts_only_on_its_body() {
        let body = Body::point_mass(&[1.0, 2.0], &[0.5, 0.0], 1.0);
        let mut registry = ForceRegistry::new();
        let rest = DVector::from_vec(vec![1.0, 1.0]);
        registry.add_force_to(BodyId(1), SpringForce::new(rest, 4.0, 0.5));
        let input = ForceInput {
            mass: &body.mass,
            q: &body.q,
            v: &body.v,
        };

        let f = registry.force(0.0, BodyId(1), input);
        assert_eq!(f, DVector::from_vec(vec![-0.25, -4.0]));
        assert_eq!(registry.force(0.0, BodyId(0), input), DVector::zeros(2));

        let (dq, dv) = registry.jacobians(0.0, BodyId(1), input);
        assert_eq!(dq, DMatrix::identity(2, 2) * -4.0);
        assert_eq!(dv, DMatrix::identity(2, 2) * -0.5);
    }

    #[test]
    fn rejects_mismatched_spring() {
        let bodies = vec![Body::point_mass(&[0.0; 3], &[0.0; 3], 1.0)];
        let mut registry = ForceRegistry::new();
        registry.add_force_to(BodyId(0), SpringForce::new(DVector::zeros(2), 1.0, 0.0));
        assert!(matches!(
            registry.validate(&bodies),
            Err(ConfigurationError::ForceDimension { .. })
        ));
    }
}
