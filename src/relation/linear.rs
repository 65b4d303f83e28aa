use glam::DVec3;
use nalgebra::{DMatrix, DVector};

use super::Relation;
use crate::error::RelationError;

/// Time-invariant linear relation: `h = C·x + D·λ + e`, `g = B·λ`.
///
/// Without `D` and `e`, `h` is exactly `C·x`. The Jacobians are the stored
/// operators themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearRelation {
    c: DMatrix<f64>,
    b: DMatrix<f64>,
    d: Option<DMatrix<f64>>,
    e: Option<DVector<f64>>,
}

impl LinearRelation {
    pub fn new(c: DMatrix<f64>, b: DMatrix<f64>) -> Self {
        Self {
            c,
            b,
            d: None,
            e: None,
        }
    }

    /// Lagrangian relation: the generalized impulse is `Cᵀ·λ`.
    pub fn lagrangian(c: DMatrix<f64>) -> Self {
        let b = c.transpose();
        Self::new(c, b)
    }

    /// Constant offset added to `h` (e.g. the gap at `x = 0`).
    #[must_use]
    pub fn with_offset(mut self, e: DVector<f64>) -> Self {
        self.e = Some(e);
        self
    }

    /// Compliance-like coupling `D = ∂h/∂λ`.
    #[must_use]
    pub fn with_coupling(mut self, d: DMatrix<f64>) -> Self {
        self.d = Some(d);
        self
    }

    pub fn c(&self) -> &DMatrix<f64> {
        &self.c
    }

    pub fn b(&self) -> &DMatrix<f64> {
        &self.b
    }

    /// Contact between a sphere and the fixed half-space `n·p ≥ offset`.
    ///
    /// The body's first three coordinates are the sphere centre; when
    /// `with_rotation` is set the next three are small-rotation coordinates
    /// whose rates are the angular velocity. `dimension` is 1 (normal only),
    /// 2 (one tangent) or 3 (two tangents).
    pub fn sphere_on_plane(
        normal: DVec3,
        offset: f64,
        radius: f64,
        with_rotation: bool,
        dimension: usize,
    ) -> Self {
        let n = normal.normalize_or_zero();
        let (t1, t2) = n.any_orthonormal_pair();
        let ndof = if with_rotation { 6 } else { 3 };
        let rows = dimension.clamp(1, 3);

        let mut c = DMatrix::zeros(rows, ndof);
        let directions = [n, t1, t2];
        for (row, dir) in directions.iter().take(rows).enumerate() {
            c[(row, 0)] = dir.x;
            c[(row, 1)] = dir.y;
            c[(row, 2)] = dir.z;
            if with_rotation && row > 0 {
                // Material point at p - r·n moves with ω × (-r·n).
                let lever = dir.cross(n) * radius;
                c[(row, 3)] = lever.x;
                c[(row, 4)] = lever.y;
                c[(row, 5)] = lever.z;
            }
        }

        let mut e = DVector::zeros(rows);
        e[0] = -offset - radius;
        Self::lagrangian(c).with_offset(e)
    }

    fn check_input(&self, x: &DVector<f64>, lambda: &DVector<f64>) -> Result<(), RelationError> {
        let (m, n) = self.c.shape();
        if x.len() != n {
            return Err(RelationError::Shape {
                slot: "x",
                rows: n,
                cols: 1,
                got_rows: x.len(),
                got_cols: 1,
            });
        }
        if lambda.len() != m {
            return Err(RelationError::Shape {
                slot: "lambda",
                rows: m,
                cols: 1,
                got_rows: lambda.len(),
                got_cols: 1,
            });
        }
        Ok(())
    }
}

impl Relation for LinearRelation {
    fn input_size(&self) -> usize {
        self.c.ncols()
    }

    fn output_size(&self) -> usize {
        self.c.nrows()
    }

    fn compute_h(
        &self,
        _t: f64,
        x: &DVector<f64>,
        lambda: &DVector<f64>,
        y: &mut DVector<f64>,
    ) -> Result<(), RelationError> {
        self.check_input(x, lambda)?;
        *y = &self.c * x;
        if let Some(d) = &self.d {
            if d.shape() != (lambda.len(), lambda.len()) {
                return Err(RelationError::Shape {
                    slot: "jac_h_lambda",
                    rows: lambda.len(),
                    cols: lambda.len(),
                    got_rows: d.nrows(),
                    got_cols: d.ncols(),
                });
            }
            *y += d * lambda;
        }
        if let Some(e) = &self.e {
            if e.len() != y.len() {
                return Err(RelationError::Shape {
                    slot: "e",
                    rows: y.len(),
                    cols: 1,
                    got_rows: e.len(),
                    got_cols: 1,
                });
            }
            *y += e;
        }
        Ok(())
    }

    fn compute_g(
        &self,
        _t: f64,
        x: &DVector<f64>,
        lambda: &DVector<f64>,
        r: &mut DVector<f64>,
    ) -> Result<(), RelationError> {
        self.check_input(x, lambda)?;
        if self.b.ncols() != lambda.len() {
            return Err(RelationError::Shape {
                slot: "jac_g_lambda",
                rows: x.len(),
                cols: lambda.len(),
                got_rows: self.b.nrows(),
                got_cols: self.b.ncols(),
            });
        }
        *r = &self.b * lambda;
        Ok(())
    }

    fn compute_jac_h_x(
        &self,
        _t: f64,
        _x: &DVector<f64>,
        _lambda: &DVector<f64>,
        c: &mut DMatrix<f64>,
    ) -> Result<(), RelationError> {
        c.clone_from(&self.c);
        Ok(())
    }

    fn compute_jac_g_lambda(
        &self,
        _t: f64,
        _x: &DVector<f64>,
        _lambda: &DVector<f64>,
        b: &mut DMatrix<f64>,
    ) -> Result<(), RelationError> {
        b.clone_from(&self.b);
        Ok(())
    }

    fn compute_jac_h_lambda(
        &self,
        _t: f64,
        _x: &DVector<f64>,
        _lambda: &DVector<f64>,
        d: &mut DMatrix<f64>,
    ) -> Result<bool, RelationError> {
        match &self.d {
            Some(stored) => {
                d.clone_from(stored);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_on_plane_gap_is_height_minus_radius() {
        let relation = LinearRelation::sphere_on_plane(DVec3::Z, 0.0, 0.5, true, 3);
        let x = DVector::from_vec(vec![0.3, -0.2, 2.0, 0.0, 0.0, 0.0]);
        let lambda = DVector::zeros(3);
        let mut y = DVector::zeros(3);
        relation.compute_h(0.0, &x, &lambda, &mut y).unwrap();
        assert!((y[0] - 1.5).abs() < 1e-12);
    }

    #[test]
    fn rolling_sphere_has_zero_tangential_slip() {
        // ω about y with v_x = ω·r is pure rolling on the z = 0 plane.
        let radius = 0.5;
        let relation = LinearRelation::sphere_on_plane(DVec3::Z, 0.0, radius, true, 3);
        let v = DVector::from_vec(vec![2.0 * radius, 0.0, 0.0, 0.0, 2.0, 0.0]);
        let u = relation.c() * v;
        assert!(u.iter().all(|value| value.abs() < 1e-12), "{u}");
    }
}
