//! Scene assembly and the time-stepping driver.

use std::{collections::HashSet, time::Instant};

use log::{info, warn};
use nalgebra::DVector;

use crate::{
    collision::{ContactSource, StaticContacts},
    config::{
        DivergencePolicy, SimulationConfig, JACOBIAN_CHECK_STEP, JACOBIAN_CHECK_TOLERANCE,
        VIOLATION_WARNING_THRESHOLD,
    },
    core::{
        body::{Body, BodyId},
        contact::Contact,
    },
    dynamics::{
        forces::{ForceGenerator, ForceRegistry},
        integrator::DofLayout,
        island::IslandManager,
        newton::{ActiveContact, NewtonReport, NewtonSolver, NewtonStatus, StepProblem},
    },
    error::{ConfigurationError, SimulationError},
    output::{Observer, StateSnapshot, StepDiagnostics},
    relation::{check_relation, RelationWorkspace},
    utils::{
        logging::{warn_if_violation_exceeds, ScopedTimer},
        profiling::{PhaseTimer, StepProfile},
    },
};

/// Collects bodies, forces, contact sources and observers, then validates
/// everything once in [`build`](Self::build).
pub struct SimulationBuilder {
    config: SimulationConfig,
    bodies: Vec<Body>,
    forces: ForceRegistry,
    contacts: StaticContacts,
    sources: Vec<Box<dyn ContactSource>>,
    observers: Vec<Box<dyn Observer>>,
}

impl SimulationBuilder {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            bodies: Vec::new(),
            forces: ForceRegistry::new(),
            contacts: StaticContacts::default(),
            sources: Vec::new(),
            observers: Vec::new(),
        }
    }

    pub fn add_body(&mut self, body: Body) -> BodyId {
        self.bodies.push(body);
        BodyId(self.bodies.len() - 1)
    }

    /// Force acting on every body.
    pub fn add_force<F: ForceGenerator + 'static>(&mut self, force: F) {
        self.forces.add_force(force);
    }

    pub fn add_force_to<F: ForceGenerator + 'static>(&mut self, body: BodyId, force: F) {
        self.forces.add_force_to(body, force);
    }

    /// Contact reported every step.
    pub fn add_contact(&mut self, contact: Contact) {
        self.contacts.push(contact);
    }

    pub fn add_contact_source<S: ContactSource + 'static>(&mut self, source: S) {
        self.sources.push(Box::new(source));
    }

    pub fn add_observer<O: Observer + 'static>(&mut self, observer: O) {
        self.observers.push(Box::new(observer));
    }

    pub fn build(self) -> Result<Simulation, ConfigurationError> {
        let SimulationBuilder {
            config,
            bodies,
            forces,
            contacts,
            mut sources,
            observers,
        } = self;

        config.validate()?;
        for (index, body) in bodies.iter().enumerate() {
            body.validate(index)?;
        }
        forces.validate(&bodies)?;
        for contact in contacts.contacts(config.t0, &bodies) {
            contact.validate(&bodies)?;
        }
        if !contacts.is_empty() {
            sources.insert(0, Box::new(contacts));
        }

        let layout = DofLayout::from_bodies(&bodies);
        Ok(Simulation {
            newton: NewtonSolver::from_config(&config),
            t: config.t0,
            config,
            bodies,
            forces,
            sources,
            observers,
            layout,
            islands: IslandManager::new(),
            lambda: DVector::zeros(0),
            steps_taken: 0,
            verified: HashSet::new(),
        })
    }
}

/// State saved before a step so a failed step leaves nothing behind.
struct Checkpoint {
    t: f64,
    q: Vec<DVector<f64>>,
    v: Vec<DVector<f64>>,
    lambda: DVector<f64>,
}

/// A running simulation: state `(t, q, v, λ)` plus everything needed to
/// advance it. Steps are strictly sequential; each accepted step commits
/// `q`, `v` and `λ` together.
pub struct Simulation {
    config: SimulationConfig,
    bodies: Vec<Body>,
    forces: ForceRegistry,
    sources: Vec<Box<dyn ContactSource>>,
    observers: Vec<Box<dyn Observer>>,
    layout: DofLayout,
    newton: NewtonSolver,
    islands: IslandManager,
    t: f64,
    lambda: DVector<f64>,
    steps_taken: usize,
    verified: HashSet<u64>,
}

impl Simulation {
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn time(&self) -> f64 {
        self.t
    }

    pub fn steps_taken(&self) -> usize {
        self.steps_taken
    }

    pub fn is_finished(&self) -> bool {
        self.steps_taken >= self.config.step_count()
    }

    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(id.index())
    }

    /// Multipliers of the last accepted step's active set.
    pub fn lambda(&self) -> &DVector<f64> {
        &self.lambda
    }

    /// Adds a generalized force to a body for the next step only.
    pub fn apply_force(&mut self, id: BodyId, force: &DVector<f64>) -> Result<(), ConfigurationError> {
        let body = self
            .bodies
            .get_mut(id.index())
            .ok_or(ConfigurationError::UnknownBody(id.index()))?;
        if force.len() != body.ndof() {
            return Err(ConfigurationError::InvalidBody {
                index: id.index(),
                reason: format!("force has {} entries, body has {} dofs", force.len(), body.ndof()),
            });
        }
        body.apply_force(force);
        Ok(())
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot::capture(self.steps_taken, self.t, &self.bodies, self.lambda.as_slice())
    }

    /// Advances until `t_end`, returning the number of steps taken.
    pub fn run(&mut self) -> Result<usize, SimulationError> {
        let start = self.steps_taken;
        while !self.is_finished() {
            self.step()?;
        }
        Ok(self.steps_taken - start)
    }

    /// Advances one nominal step of size `h`.
    ///
    /// On error the state is left exactly as it was before the call.
    pub fn step(&mut self) -> Result<StepDiagnostics, SimulationError> {
        if self.is_finished() {
            return Err(SimulationError::Finished(self.t));
        }
        let _timer = ScopedTimer::new("step", self.t);
        let start = Instant::now();
        let h = self.config.h;
        let mut diagnostics = StepDiagnostics::new(self.t + h, h);

        let checkpoint = self.checkpoint();
        if let Err(err) = self.advance(h, &mut diagnostics) {
            self.restore(checkpoint);
            return Err(err);
        }

        self.steps_taken += 1;
        self.t = self.config.t0 + self.steps_taken as f64 * h;
        for body in &mut self.bodies {
            body.clear_forces();
        }
        diagnostics.t = self.t;
        diagnostics.profile.total = start.elapsed();
        diagnostics.profile.report();

        if self.config.violation_verbose {
            info!(
                "t = {:.6}: {} active contacts, max violation {:.3e}",
                self.t, diagnostics.active_contacts, diagnostics.max_violation
            );
        }
        warn_if_violation_exceeds(self.t, diagnostics.max_violation, VIOLATION_WARNING_THRESHOLD);

        for observer in &mut self.observers {
            observer.on_step(&diagnostics);
        }
        if self.steps_taken % self.config.output_frequency == 0 {
            let snapshot = self.snapshot();
            for observer in &mut self.observers {
                observer.on_snapshot(&snapshot);
            }
        }
        Ok(diagnostics)
    }

    fn advance(&mut self, h: f64, diagnostics: &mut StepDiagnostics) -> Result<(), SimulationError> {
        let report = self.attempt(h, diagnostics)?;
        diagnostics.h = diagnostics.h.min(h);
        diagnostics.newton_iterations += report.iterations;
        diagnostics.newton_residual = report.residual;
        diagnostics.newton_status = report.status;
        diagnostics.solver_iterations = diagnostics.solver_iterations.max(report.solver.iterations);
        diagnostics.solver_error = diagnostics.solver_error.max(report.solver.error);
        diagnostics.solver_converged &= report.solver.converged;
        diagnostics.unconverged_solves += report.unconverged_solves;

        if report.status == NewtonStatus::Diverged {
            let divergence = SimulationError::NewtonDivergence {
                t: self.t,
                iterations: report.iterations,
                residual: report.residual,
            };
            match self.config.divergence_policy {
                DivergencePolicy::Abort => return Err(divergence),
                DivergencePolicy::Accept => {
                    warn!("{divergence}; accepting the last iterate");
                    diagnostics.accepted_divergence = true;
                }
                DivergencePolicy::HalveStep { min_step } => {
                    let half = 0.5 * h;
                    if half < min_step {
                        return Err(divergence);
                    }
                    warn!("{divergence}; retrying with h = {half:.3e}");
                    diagnostics.retries += 1;
                    self.advance(half, diagnostics)?;
                    return self.advance(half, diagnostics);
                }
            }
        }

        if !report.solver.converged {
            if self.config.strict_solver {
                return Err(SimulationError::SolverNonConvergence {
                    t: self.t,
                    iterations: report.solver.iterations,
                    error: report.solver.error,
                });
            }
            warn!(
                "friction-contact solver stopped at t = {:.6} after {} sweeps with error {:.3e}",
                self.t, report.solver.iterations, report.solver.error
            );
        } else if report.unconverged_solves > 0 {
            warn!(
                "friction-contact solver stopped early in {} Newton iterations at t = {:.6}",
                report.unconverged_solves, self.t
            );
        }

        self.commit(h, report);
        Ok(())
    }

    /// One Newton solve of size `h` from the current state. Nothing is committed.
    fn attempt(
        &mut self,
        h: f64,
        diagnostics: &mut StepDiagnostics,
    ) -> Result<NewtonReport, SimulationError> {
        let mut profile = StepProfile::default();
        let (active, violation) = {
            let _timer = PhaseTimer::new(&mut profile.activation);
            self.activate(h)?
        };
        diagnostics.max_violation = diagnostics.max_violation.max(violation);

        let connectivity: Vec<_> = active.iter().map(|a| a.contact.bodies).collect();
        self.islands.build_islands(self.bodies.len(), &connectivity);
        diagnostics.islands = diagnostics.islands.max(self.islands.islands().len());

        let size: usize = active.iter().map(|a| a.contact.size()).sum();
        let warm_start = if self.lambda.len() == size {
            self.lambda.clone()
        } else {
            DVector::zeros(size)
        };

        let problem = StepProblem {
            t: self.t,
            h,
            bodies: &self.bodies,
            layout: &self.layout,
            forces: &self.forces,
            contacts: &active,
            islands: &self.islands,
        };
        let report = self.newton.solve(&problem, warm_start, &mut profile)?;
        diagnostics.profile.accumulate(&profile);
        diagnostics.active_contacts = diagnostics
            .active_contacts
            .max(active.len() - report.dropped.len());

        for &index in &report.dropped {
            let interaction = active[index].contact.interaction;
            if !diagnostics.dropped_contacts.contains(&interaction) {
                warn!(
                    "dropping degenerate contact on interaction {interaction} at t = {:.6}",
                    self.t
                );
                diagnostics.dropped_contacts.push(interaction);
            }
        }
        Ok(report)
    }

    /// Queries every source, validates what it reports and keeps the contacts
    /// whose predicted gap `y_n + γ·h·u_n⁻` is non-positive. Also returns the
    /// deepest penetration among all reported contacts.
    fn activate(&mut self, h: f64) -> Result<(Vec<ActiveContact>, f64), SimulationError> {
        let t = self.t;
        let gamma = self.config.activation_gamma;
        let reported: Vec<Contact> = self
            .sources
            .iter()
            .flat_map(|source| source.contacts(t, &self.bodies))
            .collect();

        let mut active = Vec::new();
        let mut offset = 0;
        let mut violation: f64 = 0.0;
        for contact in reported {
            contact.validate(&self.bodies)?;
            let size = contact.size();
            let x = contact.gather(&self.bodies, |body| &body.q);
            let v = contact.gather(&self.bodies, |body| &body.v);
            let lambda = DVector::zeros(size);

            if self.config.verify_jacobians && !self.verified.contains(&contact.interaction) {
                verify_jacobians(&contact, t, &x)?;
                self.verified.insert(contact.interaction);
            }

            let mut workspace = RelationWorkspace::new(x.len(), size);
            workspace
                .evaluate_output(&*contact.relation, t, &x, &lambda)
                .map_err(|source| ConfigurationError::Relation {
                    interaction: contact.interaction,
                    source,
                })?;
            let gap = workspace.y[0];
            let normal_velocity = (&workspace.c * &v)[0];
            violation = violation.max(-gap);

            if gap + gamma * h * normal_velocity <= 0.0 {
                let dofs = self.layout.contact_dofs(&contact.bodies);
                active.push(ActiveContact {
                    contact,
                    offset,
                    dofs,
                    pre_impact_normal: normal_velocity,
                });
                offset += size;
            }
        }
        Ok((active, violation))
    }

    fn commit(&mut self, h: f64, report: NewtonReport) {
        for (index, body) in self.bodies.iter_mut().enumerate() {
            let id = BodyId(index);
            body.q.copy_from(&self.layout.rows(&report.q, id));
            body.v.copy_from(&self.layout.rows(&report.v, id));
        }
        self.lambda = report.lambda;
        self.t += h;
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            t: self.t,
            q: self.bodies.iter().map(|body| body.q.clone()).collect(),
            v: self.bodies.iter().map(|body| body.v.clone()).collect(),
            lambda: self.lambda.clone(),
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        self.t = checkpoint.t;
        for ((body, q), v) in self.bodies.iter_mut().zip(checkpoint.q).zip(checkpoint.v) {
            body.q = q;
            body.v = v;
        }
        self.lambda = checkpoint.lambda;
    }
}

/// Finite-difference check of a contact's relation at the current state,
/// with unit multipliers so `λ`-scaled terms are exercised.
fn verify_jacobians(contact: &Contact, t: f64, x: &DVector<f64>) -> Result<(), ConfigurationError> {
    let unit = DVector::from_element(contact.size(), 1.0);
    let report = check_relation(&*contact.relation, t, x, &unit, JACOBIAN_CHECK_STEP).map_err(
        |source| ConfigurationError::Relation {
            interaction: contact.interaction,
            source,
        },
    )?;
    match report.first_violation(JACOBIAN_CHECK_TOLERANCE) {
        Some((jacobian, error)) => Err(ConfigurationError::InconsistentJacobian {
            interaction: contact.interaction,
            jacobian,
            error,
        }),
        None => Ok(()),
    }
}
