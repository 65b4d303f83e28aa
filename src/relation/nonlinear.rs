use std::fmt;

use nalgebra::{DMatrix, DVector};

use super::Relation;
use crate::error::RelationError;

type VectorFn = Box<dyn Fn(f64, &DVector<f64>, &DVector<f64>, &mut DVector<f64>) + Send + Sync>;
type MatrixFn = Box<dyn Fn(f64, &DVector<f64>, &DVector<f64>, &mut DMatrix<f64>) + Send + Sync>;

/// Relation assembled from user callbacks.
///
/// Each slot may be overridden by a closure. When a slot is empty and the
/// matching constant operator (`C` for `h`/`∂h/∂x`, `B` for `g`/`∂g/∂λ`) was
/// supplied, the slot evaluates exactly as [`LinearRelation`](super::LinearRelation)
/// would. An empty required slot without a constant reports
/// [`RelationError::MissingCallback`].
pub struct NonlinearRelation {
    input_size: usize,
    output_size: usize,
    c: Option<DMatrix<f64>>,
    b: Option<DMatrix<f64>>,
    h: Option<VectorFn>,
    g: Option<VectorFn>,
    jac_h_x: Option<MatrixFn>,
    jac_g_lambda: Option<MatrixFn>,
    jac_h_lambda: Option<MatrixFn>,
    jac_g_x: Option<MatrixFn>,
}

impl NonlinearRelation {
    pub fn builder(input_size: usize, output_size: usize) -> NonlinearRelationBuilder {
        NonlinearRelationBuilder {
            relation: NonlinearRelation {
                input_size,
                output_size,
                c: None,
                b: None,
                h: None,
                g: None,
                jac_h_x: None,
                jac_g_lambda: None,
                jac_h_lambda: None,
                jac_g_x: None,
            },
        }
    }
}

impl fmt::Debug for NonlinearRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NonlinearRelation")
            .field("input_size", &self.input_size)
            .field("output_size", &self.output_size)
            .field("c", &self.c.as_ref().map(|c| c.shape()))
            .field("b", &self.b.as_ref().map(|b| b.shape()))
            .field("h", &self.h.is_some())
            .field("g", &self.g.is_some())
            .field("jac_h_x", &self.jac_h_x.is_some())
            .field("jac_g_lambda", &self.jac_g_lambda.is_some())
            .field("jac_h_lambda", &self.jac_h_lambda.is_some())
            .field("jac_g_x", &self.jac_g_x.is_some())
            .finish()
    }
}

/// Builder for [`NonlinearRelation`].
pub struct NonlinearRelationBuilder {
    relation: NonlinearRelation,
}

impl NonlinearRelationBuilder {
    /// Constant `C`, used by `h` and `∂h/∂x` when they are not overridden.
    #[must_use]
    pub fn with_c(mut self, c: DMatrix<f64>) -> Self {
        self.relation.c = Some(c);
        self
    }

    /// Constant `B`, used by `g` and `∂g/∂λ` when they are not overridden.
    #[must_use]
    pub fn with_b(mut self, b: DMatrix<f64>) -> Self {
        self.relation.b = Some(b);
        self
    }

    #[must_use]
    pub fn h<F>(mut self, f: F) -> Self
    where
        F: Fn(f64, &DVector<f64>, &DVector<f64>, &mut DVector<f64>) + Send + Sync + 'static,
    {
        self.relation.h = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn g<F>(mut self, f: F) -> Self
    where
        F: Fn(f64, &DVector<f64>, &DVector<f64>, &mut DVector<f64>) + Send + Sync + 'static,
    {
        self.relation.g = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn jac_h_x<F>(mut self, f: F) -> Self
    where
        F: Fn(f64, &DVector<f64>, &DVector<f64>, &mut DMatrix<f64>) + Send + Sync + 'static,
    {
        self.relation.jac_h_x = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn jac_g_lambda<F>(mut self, f: F) -> Self
    where
        F: Fn(f64, &DVector<f64>, &DVector<f64>, &mut DMatrix<f64>) + Send + Sync + 'static,
    {
        self.relation.jac_g_lambda = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn jac_h_lambda<F>(mut self, f: F) -> Self
    where
        F: Fn(f64, &DVector<f64>, &DVector<f64>, &mut DMatrix<f64>) + Send + Sync + 'static,
    {
        self.relation.jac_h_lambda = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn jac_g_x<F>(mut self, f: F) -> Self
    where
        F: Fn(f64, &DVector<f64>, &DVector<f64>, &mut DMatrix<f64>) + Send + Sync + 'static,
    {
        self.relation.jac_g_x = Some(Box::new(f));
        self
    }

    pub fn build(self) -> NonlinearRelation {
        self.relation
    }
}

fn constant_product(
    operator: &DMatrix<f64>,
    slot: &'static str,
    rhs: &DVector<f64>,
    out: &mut DVector<f64>,
) -> Result<(), RelationError> {
    if operator.ncols() != rhs.len() {
        return Err(RelationError::Shape {
            slot,
            rows: operator.nrows(),
            cols: rhs.len(),
            got_rows: operator.nrows(),
            got_cols: operator.ncols(),
        });
    }
    *out = operator * rhs;
    Ok(())
}

impl Relation for NonlinearRelation {
    fn input_size(&self) -> usize {
        self.input_size
    }

    fn output_size(&self) -> usize {
        self.output_size
    }

    fn compute_h(
        &self,
        t: f64,
        x: &DVector<f64>,
        lambda: &DVector<f64>,
        y: &mut DVector<f64>,
    ) -> Result<(), RelationError> {
        match (&self.h, &self.c) {
            (Some(h), _) => {
                h(t, x, lambda, y);
                Ok(())
            }
            (None, Some(c)) => constant_product(c, "h", x, y),
            (None, None) => Err(RelationError::MissingCallback("h")),
        }
    }

    fn compute_g(
        &self,
        t: f64,
        x: &DVector<f64>,
        lambda: &DVector<f64>,
        r: &mut DVector<f64>,
    ) -> Result<(), RelationError> {
        match (&self.g, &self.b) {
            (Some(g), _) => {
                g(t, x, lambda, r);
                Ok(())
            }
            (None, Some(b)) => constant_product(b, "g", lambda, r),
            (None, None) => Err(RelationError::MissingCallback("g")),
        }
    }

    fn compute_jac_h_x(
        &self,
        t: f64,
        x: &DVector<f64>,
        lambda: &DVector<f64>,
        c: &mut DMatrix<f64>,
    ) -> Result<(), RelationError> {
        match (&self.jac_h_x, &self.c) {
            (Some(f), _) => {
                f(t, x, lambda, c);
                Ok(())
            }
            (None, Some(stored)) => {
                c.clone_from(stored);
                Ok(())
            }
            (None, None) => Err(RelationError::MissingCallback("jac_h_x")),
        }
    }

    fn compute_jac_g_lambda(
        &self,
        t: f64,
        x: &DVector<f64>,
        lambda: &DVector<f64>,
        b: &mut DMatrix<f64>,
    ) -> Result<(), RelationError> {
        match (&self.jac_g_lambda, &self.b) {
            (Some(f), _) => {
                f(t, x, lambda, b);
                Ok(())
            }
            (None, Some(stored)) => {
                b.clone_from(stored);
                Ok(())
            }
            (None, None) => Err(RelationError::MissingCallback("jac_g_lambda")),
        }
    }

    fn compute_jac_h_lambda(
        &self,
        t: f64,
        x: &DVector<f64>,
        lambda: &DVector<f64>,
        d: &mut DMatrix<f64>,
    ) -> Result<bool, RelationError> {
        match &self.jac_h_lambda {
            Some(f) => {
                f(t, x, lambda, d);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn compute_jac_g_x(
        &self,
        t: f64,
        x: &DVector<f64>,
        lambda: &DVector<f64>,
        k: &mut DMatrix<f64>,
    ) -> Result<bool, RelationError> {
        match &self.jac_g_x {
            Some(f) => {
                f(t, x, lambda, k);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
