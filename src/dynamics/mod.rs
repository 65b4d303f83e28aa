//! Simulation dynamics: forces, theta integration, Newton loop, NSGS, and islands.

pub mod forces;
pub mod integrator;
pub mod island;
pub mod newton;
pub mod solver;

pub use forces::{
    ConstantForce, DragForce, ForceGenerator, ForceInput, ForceRegistry, ForceTarget,
    GravityForce, SpringForce,
};
pub use integrator::{DofLayout, ThetaScheme};
pub use island::{Island, IslandManager};
pub use newton::{ActiveContact, NewtonReport, NewtonSolver, NewtonStatus, StepProblem};
pub use solver::{ContactBlock, FrictionContactProblem, NsgsSolver, SolverOutcome};
