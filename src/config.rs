//! Default numerics and the simulation configuration surface.

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Default time step (in seconds).
pub const DEFAULT_TIME_STEP: f64 = 0.005;

/// Default theta blending. Slightly above the midpoint rule for numerical damping.
pub const DEFAULT_THETA: f64 = 0.50001;

/// Newton iteration budget per step.
pub const DEFAULT_NEWTON_MAX_ITER: usize = 20;

/// Absolute tolerance on the Newton residual norm.
pub const DEFAULT_NEWTON_TOLERANCE: f64 = 1e-8;

/// NSGS sweep cap.
pub const DEFAULT_SOLVER_ITERMAX: usize = 100;

/// NSGS tolerance on the natural-map error.
pub const DEFAULT_SOLVER_TOLERANCE: f64 = 1e-4;

/// Weight of the pre-impact velocity in the predicted gap used for activation.
pub const DEFAULT_ACTIVATION_GAMMA: f64 = 0.5;

/// Snapshot every N accepted steps.
pub const DEFAULT_OUTPUT_FREQUENCY: usize = 10;

/// Diagonal normal Delassus entries at or below this are treated as degenerate.
pub const DEGENERATE_CONTACT_EPSILON: f64 = 1e-12;

/// Relative perturbation of the finite-difference Jacobian check.
pub const JACOBIAN_CHECK_STEP: f64 = 1e-6;

/// Largest relative Jacobian error accepted by the activation check.
pub const JACOBIAN_CHECK_TOLERANCE: f64 = 1e-4;

/// Penetration depth above which a step logs a warning.
pub const VIOLATION_WARNING_THRESHOLD: f64 = 1e-2;

/// Friction-contact solver selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    /// Projected nonsmooth Gauss-Seidel.
    #[default]
    Nsgs,
    /// NSGS with over/under-relaxation of each local update.
    NsgsRelaxed {
        /// Relaxation factor in (0, 2).
        omega: f64,
    },
}

/// What the driver does with a step whose Newton loop did not converge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DivergencePolicy {
    /// Return [`SimulationError::NewtonDivergence`](crate::error::SimulationError).
    #[default]
    Abort,
    /// Retry the step with half the step size until `min_step` is reached.
    HalveStep {
        /// Smallest step attempted before aborting.
        min_step: f64,
    },
    /// Commit the last iterate; the step is flagged in diagnostics.
    Accept,
}

/// Numerics and driver configuration, validated once by the builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Start time.
    pub t0: f64,
    /// End time.
    pub t_end: f64,
    /// Nominal step size.
    pub h: f64,
    /// Implicit blending in [0, 1]: 0.5 midpoint, 1.0 fully implicit.
    pub theta: f64,
    /// Newton iteration budget per step.
    pub newton_max_iter: usize,
    /// Newton convergence threshold on the residual norm.
    pub newton_tolerance: f64,
    /// Friction-contact solver.
    pub solver: SolverKind,
    /// NSGS sweep cap.
    pub itermax: usize,
    /// NSGS tolerance.
    pub tolerance: f64,
    /// Sweep all points of one interaction together before moving on.
    pub multipoints_iterations: bool,
    /// Predicted-gap weight for contact activation, in [0, 1].
    pub activation_gamma: f64,
    /// Snapshot every N accepted steps.
    pub output_frequency: usize,
    /// Handling of Newton divergence.
    pub divergence_policy: DivergencePolicy,
    /// Escalate NSGS non-convergence to an error.
    pub strict_solver: bool,
    /// Finite-difference check of relation Jacobians on activation.
    pub verify_jacobians: bool,
    /// Solve contact islands concurrently (requires the `parallel` feature).
    pub parallel: bool,
    /// Per-sweep solver logging.
    pub numerics_verbose: bool,
    /// Per-step constraint-violation logging.
    pub violation_verbose: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            t0: 0.0,
            t_end: 1.0,
            h: DEFAULT_TIME_STEP,
            theta: DEFAULT_THETA,
            newton_max_iter: DEFAULT_NEWTON_MAX_ITER,
            newton_tolerance: DEFAULT_NEWTON_TOLERANCE,
            solver: SolverKind::Nsgs,
            itermax: DEFAULT_SOLVER_ITERMAX,
            tolerance: DEFAULT_SOLVER_TOLERANCE,
            multipoints_iterations: true,
            activation_gamma: DEFAULT_ACTIVATION_GAMMA,
            output_frequency: DEFAULT_OUTPUT_FREQUENCY,
            divergence_policy: DivergencePolicy::Abort,
            strict_solver: false,
            verify_jacobians: false,
            parallel: false,
            numerics_verbose: false,
            violation_verbose: false,
        }
    }
}

impl SimulationConfig {
    /// Parses a configuration from TOML. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigurationError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the time window.
    #[must_use]
    pub fn with_time(mut self, t0: f64, t_end: f64, h: f64) -> Self {
        self.t0 = t0;
        self.t_end = t_end;
        self.h = h;
        self
    }

    /// Sets theta.
    #[must_use]
    pub fn with_theta(mut self, theta: f64) -> Self {
        self.theta = theta;
        self
    }

    /// Sets the NSGS cap and tolerance.
    #[must_use]
    pub fn with_solver_limits(mut self, itermax: usize, tolerance: f64) -> Self {
        self.itermax = itermax;
        self.tolerance = tolerance;
        self
    }

    /// Number of whole steps between `t0` and `t_end` at the nominal step size.
    pub fn step_count(&self) -> usize {
        ((self.t_end - self.t0) / self.h + 1e-9).floor().max(0.0) as usize
    }

    /// Checks every parameter. Called by the builder before the first step.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        check(
            "h",
            self.h,
            self.h.is_finite() && self.h > 0.0,
            "must be finite and > 0",
        )?;
        check(
            "theta",
            self.theta,
            (0.0..=1.0).contains(&self.theta),
            "must lie in [0, 1]",
        )?;
        check("t0", self.t0, self.t0.is_finite(), "must be finite")?;
        check(
            "t_end",
            self.t_end,
            self.t_end.is_finite() && self.t_end >= self.t0,
            "must be finite and >= t0",
        )?;
        check(
            "tolerance",
            self.tolerance,
            self.tolerance.is_finite() && self.tolerance > 0.0,
            "must be > 0",
        )?;
        check(
            "newton_tolerance",
            self.newton_tolerance,
            self.newton_tolerance.is_finite() && self.newton_tolerance > 0.0,
            "must be > 0",
        )?;
        check(
            "itermax",
            self.itermax as f64,
            self.itermax > 0,
            "must be >= 1",
        )?;
        check(
            "newton_max_iter",
            self.newton_max_iter as f64,
            self.newton_max_iter > 0,
            "must be >= 1",
        )?;
        check(
            "output_frequency",
            self.output_frequency as f64,
            self.output_frequency > 0,
            "must be >= 1",
        )?;
        check(
            "activation_gamma",
            self.activation_gamma,
            (0.0..=1.0).contains(&self.activation_gamma),
            "must lie in [0, 1]",
        )?;
        if let SolverKind::NsgsRelaxed { omega } = self.solver {
            check(
                "omega",
                omega,
                omega > 0.0 && omega < 2.0,
                "must lie in (0, 2)",
            )?;
        }
        if let DivergencePolicy::HalveStep { min_step } = self.divergence_policy {
            check(
                "min_step",
                min_step,
                min_step > 0.0 && min_step <= self.h,
                "must lie in (0, h]",
            )?;
        }
        Ok(())
    }
}

fn check(
    name: &'static str,
    value: f64,
    ok: bool,
    reason: &'static str,
) -> Result<(), ConfigurationError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidParameter {
            name,
            value,
            reason,
        })
    }
}
