//! Unilateral – nonsmooth contact dynamics for Rust.
//!
//! Multibody systems with unilateral contact and Coulomb friction, advanced
//! with a Moreau–Jean theta scheme. Each step runs a Newton loop over the
//! (possibly nonlinear) contact relations, with a projected nonsmooth
//! Gauss-Seidel solve for the contact impulses inside every iteration.
//!
//! ```no_run
//! use glam::DVec3;
//! use unilateral::{
//!     Body, GravityForce, HalfSpace, NonSmoothLaw, SimulationBuilder, SimulationConfig,
//!     SphereContacts,
//! };
//!
//! let config = SimulationConfig::default().with_time(0.0, 2.0, 0.005);
//! let mut builder = SimulationBuilder::new(config);
//! let ball = builder.add_body(Body::sphere([0.0, 0.0, 1.0], [0.0; 6], 1.0, 0.1));
//! builder.add_force(GravityForce::new(DVec3::new(0.0, 0.0, -9.81)));
//! builder.add_contact_source(
//!     SphereContacts::new(NonSmoothLaw::newton_impact_friction(0.8, 0.3), 0.05)
//!         .with_sphere(ball, 0.1)
//!         .with_plane(HalfSpace::new(DVec3::Z, 0.0)),
//! );
//! let mut simulation = builder.build()?;
//! simulation.run()?;
//! # Ok::<(), unilateral::SimulationError>(())
//! ```

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod output;
pub mod relation;
pub mod simulation;
pub mod utils;

pub use glam::DVec3;
pub use nalgebra::{DMatrix, DVector};

pub use collision::{ContactSource, HalfSpace, SphereContacts, StaticContacts};
pub use config::{DivergencePolicy, SimulationConfig, SolverKind};
pub use crate::core::{
    body::{Body, BodyId},
    contact::{Contact, ContactBodies},
    law::NonSmoothLaw,
};
pub use dynamics::{
    forces::{ConstantForce, DragForce, ForceGenerator, ForceInput, ForceRegistry, GravityForce, SpringForce},
    newton::NewtonStatus,
    solver::{ContactBlock, FrictionContactProblem, NsgsSolver, SolverOutcome},
};
pub use error::{ConfigurationError, DegenerateContact, RelationError, SimulationError};
pub use output::{Observer, Recorder, StateSnapshot, StepDiagnostics};
pub use relation::{
    check_relation, JacobianReport, LinearRelation, NonlinearRelation, Relation,
    SphereSphereRelation,
};
pub use simulation::{Simulation, SimulationBuilder};
