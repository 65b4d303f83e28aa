use std::ops::Range;

use nalgebra::{DMatrix, DVector, DVectorView};

use crate::core::{
    body::{Body, BodyId},
    contact::ContactBodies,
};
use crate::dynamics::forces::{ForceInput, ForceRegistry};

/// Offsets of each body inside the stacked generalized vectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DofLayout {
    offsets: Vec<usize>,
    total: usize,
}

impl DofLayout {
    pub fn from_bodies(bodies: &[Body]) -> Self {
        let mut offsets = Vec::with_capacity(bodies.len());
        let mut total = 0;
        for body in bodies {
            offsets.push(total);
            total += body.ndof();
        }
        Self { offsets, total }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn range(&self, body: BodyId) -> Range<usize> {
        let start = self.offsets[body.index()];
        let end = self
            .offsets
            .get(body.index() + 1)
            .copied()
            .unwrap_or(self.total);
        start..end
    }

    /// Global dof indices touched by a contact, in relation-input order.
    pub fn contact_dofs(&self, bodies: &ContactBodies) -> Vec<usize> {
        bodies.iter().flat_map(|id| self.range(id)).collect()
    }

    pub fn stack<'a, F>(&self, bodies: &'a [Body], select: F) -> DVector<f64>
    where
        F: Fn(&'a Body) -> &'a DVector<f64>,
    {
        let mut stacked = DVector::zeros(self.total);
        for (index, body) in bodies.iter().enumerate() {
            let range = self.range(BodyId(index));
            stacked.rows_mut(range.start, range.len()).copy_from(select(body));
        }
        stacked
    }

    /// Block-diagonal mass operator.
    pub fn mass(&self, bodies: &[Body]) -> DMatrix<f64> {
        let mut mass = DMatrix::zeros(self.total, self.total);
        for (index, body) in bodies.iter().enumerate() {
            let range = self.range(BodyId(index));
            mass.view_mut((range.start, range.start), (range.len(), range.len()))
                .copy_from(&body.mass);
        }
        mass
    }

    /// Rows of `stacked` belonging to `body`.
    pub fn rows<'a>(&self, stacked: &'a DVector<f64>, body: BodyId) -> DVectorView<'a, f64> {
        let range = self.range(body);
        stacked.rows(range.start, range.len())
    }
}

/// Moreau–Jean theta discretization of `M·dv = f(t, q, v)·dt + dR`.
///
/// Over a step `[t_k, t_k + h]`:
///
/// ```text
/// q(v)   = q_k + h·(θ·v + (1−θ)·v_k)
/// r(v,λ) = M·(v − v_k) − h·(θ·f(t_k+h, q(v), v) + (1−θ)·f_k) − R(q(v), λ)
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThetaScheme {
    pub theta: f64,
}

impl ThetaScheme {
    pub fn new(theta: f64) -> Self {
        Self { theta }
    }

    /// `q_k + h·(θ·v + (1−θ)·v_k)`.
    pub fn position(
        &self,
        h: f64,
        q_k: &DVector<f64>,
        v_k: &DVector<f64>,
        v: &DVector<f64>,
    ) -> DVector<f64> {
        q_k + (v * self.theta + v_k * (1.0 - self.theta)) * h
    }

    /// Stacked generalized force, external accumulators included.
    pub fn forces(
        &self,
        t: f64,
        bodies: &[Body],
        layout: &DofLayout,
        registry: &ForceRegistry,
        q: &DVector<f64>,
        v: &DVector<f64>,
    ) -> DVector<f64> {
        let mut stacked = DVector::zeros(layout.total());
        for (index, body) in bodies.iter().enumerate() {
            let id = BodyId(index);
            let range = layout.range(id);
            let q_body = q.rows(range.start, range.len()).clone_owned();
            let v_body = v.rows(range.start, range.len()).clone_owned();
            let input = ForceInput {
                mass: &body.mass,
                q: &q_body,
                v: &v_body,
            };
            let force = registry.force(t, id, input) + &body.f_ext;
            stacked.rows_mut(range.start, range.len()).copy_from(&force);
        }
        stacked
    }

    /// Stacked `(∂f/∂q, ∂f/∂v)`, block-diagonal over bodies.
    pub fn force_jacobians(
        &self,
        t: f64,
        bodies: &[Body],
        layout: &DofLayout,
        registry: &ForceRegistry,
        q: &DVector<f64>,
        v: &DVector<f64>,
    ) -> (DMatrix<f64>, DMatrix<f64>) {
        let n = layout.total();
        let mut dq = DMatrix::zeros(n, n);
        let mut dv = DMatrix::zeros(n, n);
        for (index, body) in bodies.iter().enumerate() {
            let id = BodyId(index);
            let range = layout.range(id);
            let (start, len) = (range.start, range.len());
            let q_body = q.rows(start, len).clone_owned();
            let v_body = v.rows(start, len).clone_owned();
            let input = ForceInput {
                mass: &body.mass,
                q: &q_body,
                v: &v_body,
            };
            let (body_dq, body_dv) = registry.jacobians(t, id, input);
            dq.view_mut((start, start), (len, len)).copy_from(&body_dq);
            dv.view_mut((start, start), (len, len)).copy_from(&body_dv);
        }
        (dq, dv)
    }

    /// Dynamics residual `r(v, λ)` given the blended force terms and the
    /// generalized contact input `R`.
    pub fn residual(
        &self,
        h: f64,
        mass: &DMatrix<f64>,
        v: &DVector<f64>,
        v_k: &DVector<f64>,
        f_new: &DVector<f64>,
        f_k: &DVector<f64>,
        contact_input: &DVector<f64>,
    ) -> DVector<f64> {
        mass * (v - v_k) - (f_new * self.theta + f_k * (1.0 - self.theta)) * h - contact_input
    }

    /// `W_it = M − hθ·∂f/∂v − h²θ²·∂f/∂q − hθ·K`.
    pub fn iteration_matrix(
        &self,
        h: f64,
        mass: &DMatrix<f64>,
        dfdq: &DMatrix<f64>,
        dfdv: &DMatrix<f64>,
        k: &DMatrix<f64>,
    ) -> DMatrix<f64> {
        let ht = h * self.theta;
        mass - dfdv * ht - dfdq * (ht * ht) - k * ht
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midpoint_position_update() {
        let scheme = ThetaScheme::new(0.5);
        let q_k = DVector::from_vec(vec![1.0]);
        let v_k = DVector::from_vec(vec![2.0]);
        let v = DVector::from_vec(vec![4.0]);
        let q = scheme.position(0.1, &q_k, &v_k, &v);
        assert!((q[0] - 1.3).abs() < 1e-12);
    }

    #[test]
    fn layout_stacks_bodies_in_order() {
        let bodies = vec![
            Body::point_mass(&[1.0, 2.0], &[0.0; 2], 1.0),
            Body::point_mass(&[3.0, 4.0, 5.0], &[0.0; 3], 2.0),
        ];
        let layout = DofLayout::from_bodies(&bodies);
        assert_eq!(layout.total(), 5);
        assert_eq!(layout.range(BodyId(1)), 2..5);
        let q = layout.stack(&bodies, |body| &body.q);
        assert_eq!(q.as_slice(), &[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(layout.mass(&bodies)[(3, 3)], 2.0);
    }
}
