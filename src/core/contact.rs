use std::sync::Arc;

use nalgebra::DVector;

use super::{
    body::{Body, BodyId},
    law::NonSmoothLaw,
};
use crate::{error::ConfigurationError, relation::Relation};

/// Bodies a contact acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactBodies {
    /// One body against an immovable frame.
    Ground(BodyId),
    /// Two bodies; the relation input is `[q_a; q_b]`.
    Pair(BodyId, BodyId),
}

impl ContactBodies {
    pub fn first(&self) -> BodyId {
        match self {
            ContactBodies::Ground(a) | ContactBodies::Pair(a, _) => *a,
        }
    }

    pub fn second(&self) -> Option<BodyId> {
        match self {
            ContactBodies::Ground(_) => None,
            ContactBodies::Pair(_, b) => Some(*b),
        }
    }

    /// Involved bodies in relation-input order.
    pub fn iter(&self) -> impl Iterator<Item = BodyId> {
        std::iter::once(self.first()).chain(self.second())
    }
}

/// One relation bound to one nonsmooth law and the bodies it couples.
///
/// `interaction` groups the points of a single geometric contact patch so
/// multi-point sweeps can treat them as a block.
#[derive(Debug, Clone)]
pub struct Contact {
    pub relation: Arc<dyn Relation>,
    pub law: NonSmoothLaw,
    pub bodies: ContactBodies,
    pub interaction: u64,
}

impl Contact {
    pub fn new(
        relation: Arc<dyn Relation>,
        law: NonSmoothLaw,
        bodies: ContactBodies,
        interaction: u64,
    ) -> Self {
        Self {
            relation,
            law,
            bodies,
            interaction,
        }
    }

    /// Contact against the ground.
    pub fn ground<R: Relation + 'static>(
        relation: R,
        law: NonSmoothLaw,
        body: BodyId,
        interaction: u64,
    ) -> Self {
        Self::new(
            Arc::new(relation),
            law,
            ContactBodies::Ground(body),
            interaction,
        )
    }

    /// Contact between two bodies.
    pub fn pair<R: Relation + 'static>(
        relation: R,
        law: NonSmoothLaw,
        a: BodyId,
        b: BodyId,
        interaction: u64,
    ) -> Self {
        Self::new(
            Arc::new(relation),
            law,
            ContactBodies::Pair(a, b),
            interaction,
        )
    }

    pub fn size(&self) -> usize {
        self.law.size()
    }

    /// Checks the contact against the body set: bodies exist and differ, the
    /// relation's input matches their dofs and its output matches the law.
    pub fn validate(&self, bodies: &[Body]) -> Result<(), ConfigurationError> {
        let shape_error = |reason: String| ConfigurationError::ContactShape {
            interaction: self.interaction,
            reason,
        };

        let mut ndof = 0;
        for id in self.bodies.iter() {
            let body = bodies
                .get(id.index())
                .ok_or(ConfigurationError::UnknownBody(id.index()))?;
            ndof += body.ndof();
        }
        if let ContactBodies::Pair(a, b) = self.bodies {
            if a == b {
                return Err(shape_error(format!("body {} paired with itself", a.index())));
            }
        }

        self.law.validate()?;
        if self.relation.input_size() != ndof {
            return Err(shape_error(format!(
                "relation input size {} but bodies carry {ndof} dofs",
                self.relation.input_size()
            )));
        }
        if self.relation.output_size() != self.law.size() {
            return Err(shape_error(format!(
                "relation output size {} but law has size {}",
                self.relation.output_size(),
                self.law.size()
            )));
        }
        Ok(())
    }

    /// Stacks the involved bodies' entries of a per-body quantity.
    pub fn gather<'a, F>(&self, bodies: &'a [Body], select: F) -> DVector<f64>
    where
        F: Fn(&'a Body) -> &'a DVector<f64>,
    {
        let parts: Vec<&DVector<f64>> = self
            .bodies
            .iter()
            .map(|id| select(&bodies[id.index()]))
            .collect();
        let len = parts.iter().map(|part| part.len()).sum();
        DVector::from_iterator(len, parts.into_iter().flat_map(|part| part.iter().copied()))
    }
}
