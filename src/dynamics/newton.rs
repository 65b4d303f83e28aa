//! Newton iteration over one theta-method step with an inner NSGS solve.

use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::{
    config::SimulationConfig,
    core::{body::Body, contact::Contact},
    dynamics::{
        forces::ForceRegistry,
        integrator::{DofLayout, ThetaScheme},
        island::IslandManager,
        solver::{ContactBlock, FrictionContactProblem, NsgsSolver, SolverOutcome},
    },
    error::{ConfigurationError, SimulationError},
    relation::RelationWorkspace,
    utils::profiling::{PhaseTimer, StepProfile},
};

/// Contact admitted to the index set for one step.
#[derive(Debug, Clone)]
pub struct ActiveContact {
    pub contact: Contact,
    /// Row offset inside the stacked multiplier.
    pub offset: usize,
    /// Global dofs feeding the relation input, in order.
    pub dofs: Vec<usize>,
    /// Normal contact velocity `u_n⁻` at the start of the step.
    pub pre_impact_normal: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewtonStatus {
    Converged,
    Diverged,
}

/// Everything one step reads. Nothing here is mutated by the solve.
#[derive(Debug, Clone, Copy)]
pub struct StepProblem<'a> {
    pub t: f64,
    pub h: f64,
    pub bodies: &'a [Body],
    pub layout: &'a DofLayout,
    pub forces: &'a ForceRegistry,
    pub contacts: &'a [ActiveContact],
    pub islands: &'a IslandManager,
}

/// Candidate end-of-step state. Committed by the caller, or discarded.
#[derive(Debug, Clone)]
pub struct NewtonReport {
    pub status: NewtonStatus,
    pub iterations: usize,
    pub residual: f64,
    pub q: DVector<f64>,
    pub v: DVector<f64>,
    pub lambda: DVector<f64>,
    /// NSGS outcome of the last iteration.
    pub solver: SolverOutcome,
    /// NSGS solves, over all iterations, that stopped before the tolerance.
    pub unconverged_solves: usize,
    /// Active contacts dropped as degenerate in any iteration.
    pub dropped: Vec<usize>,
}

/// Stacked relation data at the current iterate.
struct Linearization {
    c: DMatrix<f64>,
    b: DMatrix<f64>,
    d: DMatrix<f64>,
    k: DMatrix<f64>,
    input: DVector<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewtonSolver {
    pub scheme: ThetaScheme,
    pub max_iter: usize,
    pub tolerance: f64,
    pub nsgs: NsgsSolver,
    pub parallel: bool,
    pub verbose: bool,
}

impl NewtonSolver {
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            scheme: ThetaScheme::new(config.theta),
            max_iter: config.newton_max_iter,
            tolerance: config.newton_tolerance,
            nsgs: NsgsSolver::from_config(config),
            parallel: config.parallel,
            verbose: config.numerics_verbose,
        }
    }

    /// Runs the Newton loop from `v = v_k`, warm-starting NSGS with `lambda`.
    ///
    /// At least one iteration is performed. Each pass re-evaluates every
    /// relation at `q(v)`, builds the residual and, unless converged or out
    /// of budget, linearizes, solves the contact problem per island and
    /// updates `v`.
    pub fn solve(
        &self,
        problem: &StepProblem<'_>,
        lambda: DVector<f64>,
        profile: &mut StepProfile,
    ) -> Result<NewtonReport, SimulationError> {
        let StepProblem {
            t,
            h,
            bodies,
            layout,
            forces,
            contacts,
            islands,
        } = *problem;
        let scheme = self.scheme;
        let size: usize = contacts.iter().map(|active| active.contact.size()).sum();

        let mass = layout.mass(bodies);
        let q_k = layout.stack(bodies, |body| &body.q);
        let v_k = layout.stack(bodies, |body| &body.v);
        let t_new = t + h;
        let f_k = scheme.forces(t, bodies, layout, forces, &q_k, &v_k);

        let blocks: Vec<ContactBlock> = contacts
            .iter()
            .map(|active| ContactBlock {
                law: active.contact.law,
                offset: active.offset,
                interaction: active.contact.interaction,
            })
            .collect();
        let mut workspaces: Vec<RelationWorkspace> = contacts
            .iter()
            .map(|active| RelationWorkspace::new(active.dofs.len(), active.contact.size()))
            .collect();

        let mut v = v_k.clone();
        let mut lambda = if lambda.len() == size {
            lambda
        } else {
            DVector::zeros(size)
        };
        let mut solver = SolverOutcome::default();
        let mut dropped = Vec::new();
        let mut unconverged_solves = 0;
        let mut iterations = 0;

        loop {
            let (q, linearization, residual) = {
                let _timer = PhaseTimer::new(&mut profile.assembly);
                let q = scheme.position(h, &q_k, &v_k, &v);
                let linearization = linearize(problem, t_new, &q, &lambda, &mut workspaces)?;
                let f_new = scheme.forces(t_new, bodies, layout, forces, &q, &v);
                let residual = scheme.residual(h, &mass, &v, &v_k, &f_new, &f_k, &linearization.input);
                (q, linearization, residual)
            };
            let norm = residual.norm();
            if self.verbose {
                debug!("Newton iteration {iterations} at t = {t:.6}: residual {norm:.3e}");
            }

            let status = if iterations > 0 && norm < self.tolerance {
                Some(NewtonStatus::Converged)
            } else if iterations >= self.max_iter {
                Some(NewtonStatus::Diverged)
            } else {
                None
            };
            if let Some(status) = status {
                dropped.sort_unstable();
                return Ok(NewtonReport {
                    status,
                    iterations,
                    residual: norm,
                    q,
                    v,
                    lambda,
                    solver,
                    unconverged_solves,
                    dropped,
                });
            }

            let (v_free, w_inv_b, delassus, local_offset) = {
                let _timer = PhaseTimer::new(&mut profile.assembly);
                let (dfdq, dfdv) = scheme.force_jacobians(t_new, bodies, layout, forces, &q, &v);
                let iteration_matrix =
                    scheme.iteration_matrix(h, &mass, &dfdq, &dfdv, &linearization.k);
                let lu = iteration_matrix.lu();
                let rhs = &residual + &linearization.b * &lambda;
                let (Some(correction), Some(w_inv_b)) = (lu.solve(&rhs), lu.solve(&linearization.b))
                else {
                    return Err(SimulationError::SingularIterationMatrix { t });
                };
                let v_free = &v - correction;
                let delassus = &linearization.c * &w_inv_b + &linearization.d;
                let mut local_offset = &linearization.c * &v_free;
                for active in contacts {
                    local_offset[active.offset] +=
                        active.contact.law.restitution() * active.pre_impact_normal;
                }
                (v_free, w_inv_b, delassus, local_offset)
            };

            if size > 0 {
                let _timer = PhaseTimer::new(&mut profile.solver);
                let contact_problem =
                    FrictionContactProblem::new(delassus, local_offset, blocks.clone());
                solver = islands.solve(&self.nsgs, &contact_problem, &mut lambda, self.parallel);
                if !solver.converged {
                    unconverged_solves += 1;
                }
                for &index in &solver.dropped {
                    if !dropped.contains(&index) {
                        dropped.push(index);
                    }
                }
            }

            {
                let _timer = PhaseTimer::new(&mut profile.update);
                v = v_free + w_inv_b * &lambda;
            }
            iterations += 1;
        }
    }
}

/// Evaluates every active relation at `q` and scatters the local blocks into
/// stacked `C`, `B`, `D`, `K` and the generalized contact input `R`.
fn linearize(
    problem: &StepProblem<'_>,
    t: f64,
    q: &DVector<f64>,
    lambda: &DVector<f64>,
    workspaces: &mut [RelationWorkspace],
) -> Result<Linearization, SimulationError> {
    let n = problem.layout.total();
    let m = lambda.len();
    let mut lin = Linearization {
        c: DMatrix::zeros(m, n),
        b: DMatrix::zeros(n, m),
        d: DMatrix::zeros(m, m),
        k: DMatrix::zeros(n, n),
        input: DVector::zeros(n),
    };

    for (active, workspace) in problem.contacts.iter().zip(workspaces.iter_mut()) {
        let (offset, size) = (active.offset, active.contact.size());
        let x = DVector::from_iterator(active.dofs.len(), active.dofs.iter().map(|&dof| q[dof]));
        let local_lambda = lambda.rows(offset, size).clone_owned();
        workspace
            .evaluate(&*active.contact.relation, t, &x, &local_lambda)
            .map_err(|source| ConfigurationError::Relation {
                interaction: active.contact.interaction,
                source,
            })?;

        for (col, &dof) in active.dofs.iter().enumerate() {
            for row in 0..size {
                lin.c[(offset + row, dof)] = workspace.c[(row, col)];
                lin.b[(dof, offset + row)] = workspace.b[(col, row)];
            }
            lin.input[dof] += workspace.r[col];
        }
        if let Some(d) = &workspace.d {
            lin.d.view_mut((offset, offset), (size, size)).copy_from(d);
        }
        if let Some(k) = &workspace.k {
            for (row, &dof_row) in active.dofs.iter().enumerate() {
                for (col, &dof_col) in active.dofs.iter().enumerate() {
                    lin.k[(dof_row, dof_col)] += k[(row, col)];
                }
            }
        }
    }
    Ok(lin)
}
