//! Per-step diagnostics, periodic state snapshots, and their observers.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::{
    core::body::Body, dynamics::newton::NewtonStatus, utils::profiling::StepProfile,
};

/// What happened during one accepted time step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepDiagnostics {
    /// Time at the end of the step.
    pub t: f64,
    /// Smallest step size used (below the nominal one after halving).
    pub h: f64,
    pub newton_status: NewtonStatus,
    /// Newton iterations summed over every attempt.
    pub newton_iterations: usize,
    pub newton_residual: f64,
    pub solver_iterations: usize,
    pub solver_error: f64,
    /// Whether the final NSGS solve of every attempt converged.
    pub solver_converged: bool,
    /// NSGS solves that stopped at `itermax`, counted over every Newton
    /// iteration and attempt.
    pub unconverged_solves: usize,
    pub active_contacts: usize,
    pub islands: usize,
    /// Interaction ids of contacts dropped as degenerate.
    pub dropped_contacts: Vec<u64>,
    /// Deepest penetration among the reported contacts at step start.
    pub max_violation: f64,
    /// Number of times the step was halved.
    pub retries: usize,
    /// A diverged Newton iterate was committed under the accept policy.
    pub accepted_divergence: bool,
    pub profile: StepProfile,
}

impl StepDiagnostics {
    pub(crate) fn new(t: f64, h: f64) -> Self {
        Self {
            t,
            h,
            newton_status: NewtonStatus::Converged,
            newton_iterations: 0,
            newton_residual: 0.0,
            solver_iterations: 0,
            solver_error: 0.0,
            solver_converged: true,
            unconverged_solves: 0,
            active_contacts: 0,
            islands: 0,
            dropped_contacts: Vec::new(),
            max_violation: 0.0,
            retries: 0,
            accepted_divergence: false,
            profile: StepProfile::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BodySnapshot {
    pub name: String,
    pub q: Vec<f64>,
    pub v: Vec<f64>,
}

/// Committed state `(t, q, v, λ)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    pub step: usize,
    pub t: f64,
    pub bodies: Vec<BodySnapshot>,
    pub lambda: Vec<f64>,
}

impl StateSnapshot {
    pub(crate) fn capture(step: usize, t: f64, bodies: &[Body], lambda: &[f64]) -> Self {
        Self {
            step,
            t,
            bodies: bodies
                .iter()
                .map(|body| BodySnapshot {
                    name: body.name.clone(),
                    q: body.q.iter().copied().collect(),
                    v: body.v.iter().copied().collect(),
                })
                .collect(),
            lambda: lambda.to_vec(),
        }
    }
}

/// Receives simulation output. Persistence is the observer's business.
pub trait Observer: Send + Sync {
    fn on_step(&mut self, _diagnostics: &StepDiagnostics) {}

    fn on_snapshot(&mut self, _snapshot: &StateSnapshot) {}
}

#[derive(Debug, Default)]
pub struct Recording {
    pub steps: Vec<StepDiagnostics>,
    pub snapshots: Vec<StateSnapshot>,
}

/// In-memory observer. Clones share the same recording, so one handle can be
/// registered with the simulation while another is read from elsewhere.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    inner: Arc<Mutex<Recording>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step_count(&self) -> usize {
        self.inner.lock().steps.len()
    }

    pub fn steps(&self) -> Vec<StepDiagnostics> {
        self.inner.lock().steps.clone()
    }

    pub fn last_step(&self) -> Option<StepDiagnostics> {
        self.inner.lock().steps.last().cloned()
    }

    pub fn snapshots(&self) -> Vec<StateSnapshot> {
        self.inner.lock().snapshots.clone()
    }

    pub fn clear(&self) {
        let mut recording = self.inner.lock();
        recording.steps.clear();
        recording.snapshots.clear();
    }
}

impl Observer for Recorder {
    fn on_step(&mut self, diagnostics: &StepDiagnostics) {
        self.inner.lock().steps.push(diagnostics.clone());
    }

    fn on_snapshot(&mut self, snapshot: &StateSnapshot) {
        self.inner.lock().snapshots.push(snapshot.clone());
    }
}
