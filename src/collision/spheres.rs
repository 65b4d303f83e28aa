use std::sync::Arc;

use glam::DVec3;

use super::ContactSource;
use crate::{
    core::{
        body::{Body, BodyId},
        contact::{Contact, ContactBodies},
        law::NonSmoothLaw,
    },
    relation::{LinearRelation, SphereSphereRelation},
};

/// Fixed half-space `normal·p ≥ offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HalfSpace {
    pub normal: DVec3,
    pub offset: f64,
}

impl HalfSpace {
    pub fn new(normal: DVec3, offset: f64) -> Self {
        Self {
            normal: normal.normalize_or_zero(),
            offset,
        }
    }

    /// Signed distance of `point` to the boundary.
    pub fn distance(&self, point: DVec3) -> f64 {
        self.normal.dot(point) - self.offset
    }
}

/// A sphere attached to a body whose first three coordinates are its centre.
/// Six-dof bodies also carry small-rotation coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereBinding {
    pub body: BodyId,
    pub radius: f64,
}

/// Sphere/half-space and sphere/sphere proximity source.
///
/// A contact is reported when the gap falls below `margin`. Sphere–plane
/// contacts use `law`; sphere–sphere contacts use its frictionless part.
#[derive(Debug, Clone)]
pub struct SphereContacts {
    spheres: Vec<SphereBinding>,
    planes: Vec<HalfSpace>,
    law: NonSmoothLaw,
    margin: f64,
}

/// Interaction ids of sphere pairs live above this bit.
const PAIR_INTERACTION_BIT: u64 = 1 << 63;

impl SphereContacts {
    pub fn new(law: NonSmoothLaw, margin: f64) -> Self {
        Self {
            spheres: Vec::new(),
            planes: Vec::new(),
            law,
            margin,
        }
    }

    #[must_use]
    pub fn with_sphere(mut self, body: BodyId, radius: f64) -> Self {
        self.spheres.push(SphereBinding { body, radius });
        self
    }

    #[must_use]
    pub fn with_plane(mut self, plane: HalfSpace) -> Self {
        self.planes.push(plane);
        self
    }

    pub fn spheres(&self) -> &[SphereBinding] {
        &self.spheres
    }

    pub fn planes(&self) -> &[HalfSpace] {
        &self.planes
    }
}

fn centre(body: &Body) -> DVec3 {
    let q = &body.q;
    DVec3::new(
        q.get(0).copied().unwrap_or(0.0),
        q.get(1).copied().unwrap_or(0.0),
        q.get(2).copied().unwrap_or(0.0),
    )
}

impl ContactSource for SphereContacts {
    fn contacts(&self, _t: f64, bodies: &[Body]) -> Vec<Contact> {
        let mut contacts = Vec::new();

        for (i, sphere) in self.spheres.iter().enumerate() {
            let Some(body) = bodies.get(sphere.body.index()) else {
                continue;
            };
            let position = centre(body);
            let with_rotation = body.ndof() == 6;

            for (j, plane) in self.planes.iter().enumerate() {
                if plane.distance(position) - sphere.radius >= self.margin {
                    continue;
                }
                let relation = LinearRelation::sphere_on_plane(
                    plane.normal,
                    plane.offset,
                    sphere.radius,
                    with_rotation,
                    self.law.size(),
                );
                contacts.push(Contact::new(
                    Arc::new(relation),
                    self.law,
                    ContactBodies::Ground(sphere.body),
                    ((i as u64) << 32) | j as u64,
                ));
            }

            for (k, other) in self.spheres.iter().enumerate().skip(i + 1) {
                let Some(other_body) = bodies.get(other.body.index()) else {
                    continue;
                };
                if other.body == sphere.body {
                    continue;
                }
                let gap = centre(other_body).distance(position) - sphere.radius - other.radius;
                if gap >= self.margin {
                    continue;
                }
                let relation = SphereSphereRelation::new(
                    sphere.radius,
                    body.ndof(),
                    other.radius,
                    other_body.ndof(),
                );
                contacts.push(Contact::new(
                    Arc::new(relation),
                    self.law.normal_part(),
                    ContactBodies::Pair(sphere.body, other.body),
                    PAIR_INTERACTION_BIT | ((i as u64) << 32) | k as u64,
                ));
            }
        }
        contacts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_only_close_pairs() {
        let bodies = vec![
            Body::sphere([0.0, 0.0, 0.5], [0.0; 6], 1.0, 0.5),
            Body::sphere([0.0, 0.0, 1.45], [0.0; 6], 1.0, 0.5),
            Body::sphere([5.0, 0.0, 3.0], [0.0; 6], 1.0, 0.5),
        ];
        let source = SphereContacts::new(NonSmoothLaw::newton_impact_friction(0.0, 0.3), 0.01)
            .with_sphere(BodyId(0), 0.5)
            .with_sphere(BodyId(1), 0.5)
            .with_sphere(BodyId(2), 0.5)
            .with_plane(HalfSpace::new(DVec3::Z, 0.0));
        let contacts = source.contacts(0.0, &bodies);
        assert_eq!(contacts.len(), 2);
        assert_eq!(contacts[0].bodies, ContactBodies::Ground(BodyId(0)));
        assert_eq!(contacts[0].size(), 3);
        assert_eq!(contacts[1].bodies, ContactBodies::Pair(BodyId(0), BodyId(1)));
        assert_eq!(contacts[1].size(), 1);
        assert!(contacts.iter().all(|contact| contact.validate(&bodies).is_ok()));
    }
}
