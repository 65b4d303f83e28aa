//! Contact sources: the collaborators that report candidate contacts each step.

pub mod spheres;

pub use spheres::{HalfSpace, SphereBinding, SphereContacts};

use std::fmt;

use crate::core::{body::Body, contact::Contact};

/// Produces the candidate contacts for the step starting at `t`.
///
/// Called once per step with a read-only view of the bodies. Whether a
/// reported contact is active is decided by the scheme, not the source.
pub trait ContactSource: Send + Sync + fmt::Debug {
    fn contacts(&self, t: f64, bodies: &[Body]) -> Vec<Contact>;
}

/// Fixed list of contacts, reported every step.
#[derive(Debug, Clone, Default)]
pub struct StaticContacts {
    contacts: Vec<Contact>,
}

impl StaticContacts {
    pub fn new(contacts: Vec<Contact>) -> Self {
        Self { contacts }
    }

    pub fn push(&mut self, contact: Contact) {
        self.contacts.push(contact);
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }
}

impl ContactSource for StaticContacts {
    fn contacts(&self, _t: f64, _bodies: &[Body]) -> Vec<Contact> {
        self.contacts.clone()
    }
}
