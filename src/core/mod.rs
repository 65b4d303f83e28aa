//! Core types describing bodies, nonsmooth laws, and contacts.

pub mod body;
pub mod contact;
pub mod law;

pub use body::{Body, BodyId};
pub use contact::{Contact, ContactBodies};
pub use law::NonSmoothLaw;
