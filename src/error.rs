//! Error types for contact simulation.

use thiserror::Error;

/// Errors raised by a [`Relation`](crate::relation::Relation) callback.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RelationError {
    /// A callback slot has neither a user override nor a constant operator.
    #[error("relation has no callback or constant operator for `{0}`")]
    MissingCallback(&'static str),

    /// A callback wrote a buffer of the wrong shape.
    #[error("`{slot}` produced a {got_rows}x{got_cols} buffer, expected {rows}x{cols}")]
    Shape {
        /// Callback slot name.
        slot: &'static str,
        /// Expected rows.
        rows: usize,
        /// Expected columns.
        cols: usize,
        /// Rows actually written.
        got_rows: usize,
        /// Columns actually written.
        got_cols: usize,
    },

    /// A callback produced a non-finite value.
    #[error("`{0}` produced a non-finite value")]
    NonFinite(&'static str),
}

/// Invalid scheme parameters or malformed contacts. Fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    /// A numeric parameter is outside its admissible range.
    #[error("invalid parameter `{name}` = {value}: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: f64,
        /// Admissible range.
        reason: &'static str,
    },

    /// A body is malformed (mismatched vector sizes, non-square mass).
    #[error("body {index}: {reason}")]
    InvalidBody {
        /// Body index.
        index: usize,
        /// What is wrong.
        reason: String,
    },

    /// A contact references a body that does not exist.
    #[error("contact references unknown body {0}")]
    UnknownBody(usize),

    /// A contact's relation and law disagree on the contact dimension, or
    /// the relation input size does not match the bodies' dofs.
    #[error("contact on interaction {interaction}: {reason}")]
    ContactShape {
        /// Interaction id of the contact.
        interaction: u64,
        /// What is wrong.
        reason: String,
    },

    /// A relation callback failed while the contact was being activated.
    #[error("relation on interaction {interaction} rejected: {source}")]
    Relation {
        /// Interaction id of the contact.
        interaction: u64,
        /// Underlying relation error.
        #[source]
        source: RelationError,
    },

    /// A reported Jacobian disagrees with the finite-difference estimate.
    #[error("relation on interaction {interaction}: `{jacobian}` inconsistent (relative error {error:.3e})")]
    InconsistentJacobian {
        /// Interaction id of the contact.
        interaction: u64,
        /// Which Jacobian.
        jacobian: &'static str,
        /// Max relative error found.
        error: f64,
    },

    /// A force generator does not fit the body it is attached to.
    #[error("force generator `{name}` expects {expected} dofs, body {body} has {actual}")]
    ForceDimension {
        /// Generator name.
        name: &'static str,
        /// Body index.
        body: usize,
        /// Dofs expected by the generator.
        expected: usize,
        /// Dofs of the body.
        actual: usize,
    },

    /// Configuration text could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Top-level simulation error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    /// Configuration problem, reported before the first step or at contact activation.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Newton iteration budget exhausted without convergence.
    #[error("Newton iteration diverged at t = {t}: residual {residual:.3e} after {iterations} iterations")]
    NewtonDivergence {
        /// Start time of the failed step.
        t: f64,
        /// Iterations performed.
        iterations: usize,
        /// Last residual norm.
        residual: f64,
    },

    /// NSGS did not reach tolerance (escalated only in strict mode).
    #[error("friction-contact solver did not converge at t = {t}: error {error:.3e} after {iterations} sweeps")]
    SolverNonConvergence {
        /// Start time of the failed step.
        t: f64,
        /// Sweeps performed.
        iterations: usize,
        /// Final error.
        error: f64,
    },

    /// The Newton iteration matrix could not be factorized.
    #[error("singular iteration matrix at t = {t}")]
    SingularIterationMatrix {
        /// Start time of the failed step.
        t: f64,
    },

    /// The simulation already reached its end time.
    #[error("simulation finished at t = {0}")]
    Finished(f64),
}

/// A contact whose effective normal mass vanishes.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error("degenerate contact: diagonal normal entry {normal_entry:.3e}")]
pub struct DegenerateContact {
    /// Diagonal Delassus entry along the normal.
    pub normal_entry: f64,
}

impl From<toml::de::Error> for ConfigurationError {
    fn from(err: toml::de::Error) -> Self {
        ConfigurationError::Parse(err.to_string())
    }
}
