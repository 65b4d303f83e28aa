use std::collections::HashMap;

use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use serde::Serialize;

use crate::{
    config::{SimulationConfig, SolverKind, DEGENERATE_CONTACT_EPSILON},
    core::law::NonSmoothLaw,
    error::DegenerateContact,
};

/// One contact's rows inside a [`FrictionContactProblem`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactBlock {
    pub law: NonSmoothLaw,
    pub offset: usize,
    pub interaction: u64,
}

impl ContactBlock {
    /// Lays out consecutive blocks for `(law, interaction)` pairs.
    pub fn stack(laws: &[(NonSmoothLaw, u64)]) -> Vec<ContactBlock> {
        let mut offset = 0;
        laws.iter()
            .map(|&(law, interaction)| {
                let block = ContactBlock {
                    law,
                    offset,
                    interaction,
                };
                offset += law.size();
                block
            })
            .collect()
    }

    pub fn size(&self) -> usize {
        self.law.size()
    }
}

/// Local velocity `u = W·λ + q` subject to each contact's nonsmooth law.
#[derive(Debug, Clone, PartialEq)]
pub struct FrictionContactProblem {
    pub w: DMatrix<f64>,
    pub q: DVector<f64>,
    pub contacts: Vec<ContactBlock>,
}

impl FrictionContactProblem {
    pub fn new(w: DMatrix<f64>, q: DVector<f64>, contacts: Vec<ContactBlock>) -> Self {
        Self { w, q, contacts }
    }

    pub fn size(&self) -> usize {
        self.q.len()
    }

    pub fn velocity(&self, lambda: &DVector<f64>) -> DVector<f64> {
        &self.w * lambda + &self.q
    }

    /// Natural-map error `Σ_i ‖λ_i − Π_K(λ_i − û_i)‖ / (1 + ‖q‖)`. Contacts
    /// whose law fails validation are left out.
    pub fn error(&self, lambda: &DVector<f64>) -> f64 {
        let valid: Vec<usize> = (0..self.contacts.len())
            .filter(|&index| self.contacts[index].law.validate().is_ok())
            .collect();
        self.error_on(lambda, &valid)
    }

    fn error_on(&self, lambda: &DVector<f64>, contacts: &[usize]) -> f64 {
        let u = self.velocity(lambda);
        let total: f64 = contacts
            .iter()
            .map(|&index| {
                let block = self.contacts[index];
                let range = block.offset..block.offset + block.size();
                block
                    .law
                    .natural_map_residual(&u.as_slice()[range.clone()], &lambda.as_slice()[range])
            })
            .sum();
        total / (1.0 + self.q.norm())
    }

    /// Sub-problem over a subset of contacts, with the global rows it uses.
    pub fn restrict(&self, contacts: &[usize]) -> (FrictionContactProblem, Vec<usize>) {
        let mut rows = Vec::new();
        let mut blocks = Vec::with_capacity(contacts.len());
        for &index in contacts {
            let block = self.contacts[index];
            blocks.push(ContactBlock {
                offset: rows.len(),
                ..block
            });
            rows.extend(block.offset..block.offset + block.size());
        }
        let w = self.w.select_rows(rows.iter()).select_columns(rows.iter());
        let q = self.q.select_rows(rows.iter());
        (FrictionContactProblem::new(w, q, blocks), rows)
    }
}

/// Result of one NSGS solve. Non-convergence is reported, never raised.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolverOutcome {
    pub converged: bool,
    pub iterations: usize,
    pub error: f64,
    /// Contacts skipped because their normal Delassus entry vanished.
    pub dropped: Vec<usize>,
}

impl Default for SolverOutcome {
    fn default() -> Self {
        Self {
            converged: true,
            iterations: 0,
            error: 0.0,
            dropped: Vec::new(),
        }
    }
}

impl SolverOutcome {
    /// Combines independent sub-problem outcomes.
    pub fn merge(&mut self, other: &Self) {
        self.converged &= other.converged;
        self.iterations = self.iterations.max(other.iterations);
        self.error = self.error.max(other.error);
        self.dropped.extend_from_slice(&other.dropped);
    }
}

/// Projected nonsmooth Gauss-Seidel over contacts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NsgsSolver {
    pub kind: SolverKind,
    pub itermax: usize,
    pub tolerance: f64,
    /// Sweep the points of one interaction forward then backward as a block.
    pub multipoint: bool,
    /// Log the error after every sweep.
    pub verbose: bool,
}

impl NsgsSolver {
    pub fn new(itermax: usize, tolerance: f64) -> Self {
        Self {
            kind: SolverKind::Nsgs,
            itermax,
            tolerance,
            multipoint: true,
            verbose: false,
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            kind: config.solver,
            itermax: config.itermax,
            tolerance: config.tolerance,
            multipoint: config.multipoints_iterations,
            verbose: config.numerics_verbose,
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: SolverKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn with_multipoint(mut self, multipoint: bool) -> Self {
        self.multipoint = multipoint;
        self
    }

    /// Solves `problem` in place, starting from `lambda` as warm start.
    ///
    /// Returns the best iterate after at most `itermax` sweeps. Contacts with
    /// a degenerate normal entry, or whose law fails
    /// [`NonSmoothLaw::validate`], are left at zero and listed in `dropped`.
    pub fn solve(&self, problem: &FrictionContactProblem, lambda: &mut DVector<f64>) -> SolverOutcome {
        let mut outcome = SolverOutcome::default();
        if lambda.len() != problem.size() {
            *lambda = DVector::zeros(problem.size());
        }
        if problem.contacts.is_empty() {
            return outcome;
        }

        let mut diagonal = Vec::with_capacity(problem.contacts.len());
        let mut active = Vec::with_capacity(problem.contacts.len());
        for (index, block) in problem.contacts.iter().enumerate() {
            if let Err(err) = block.law.validate() {
                warn!("skipping contact {index} with an unusable law: {err}");
                lambda.rows_mut(block.offset, block.size()).fill(0.0);
                outcome.dropped.push(index);
                diagonal.push(DMatrix::zeros(0, 0));
                continue;
            }
            let w_ii = problem
                .w
                .view((block.offset, block.offset), (block.size(), block.size()))
                .clone_owned();
            if w_ii[(0, 0)] > DEGENERATE_CONTACT_EPSILON {
                active.push(index);
            } else {
                lambda.rows_mut(block.offset, block.size()).fill(0.0);
                outcome.dropped.push(index);
            }
            diagonal.push(w_ii);
        }
        if active.is_empty() {
            return outcome;
        }
        let sweeps = self.sweep_blocks(problem, &active);

        outcome.converged = false;
        for iteration in 1..=self.itermax {
            for block in &sweeps {
                for &index in block {
                    self.update(problem, &diagonal[index], index, lambda, &mut outcome);
                }
                if block.len() > 1 {
                    for &index in block.iter().rev() {
                        self.update(problem, &diagonal[index], index, lambda, &mut outcome);
                    }
                }
            }

            outcome.iterations = iteration;
            outcome.error = problem.error_on(lambda, &active);
            if self.verbose {
                debug!("NSGS sweep {iteration}: error {:.3e}", outcome.error);
            }
            if outcome.error < self.tolerance {
                outcome.converged = true;
                break;
            }
        }
        outcome
    }

    /// Sweep order: one block per interaction (first-appearance order) when
    /// multi-point sweeps are on, one block per contact otherwise.
    fn sweep_blocks(&self, problem: &FrictionContactProblem, active: &[usize]) -> Vec<Vec<usize>> {
        if !self.multipoint {
            return active.iter().map(|&index| vec![index]).collect();
        }
        let mut blocks: Vec<Vec<usize>> = Vec::new();
        let mut by_interaction: HashMap<u64, usize> = HashMap::new();
        for &index in active {
            let interaction = problem.contacts[index].interaction;
            let slot = *by_interaction.entry(interaction).or_insert_with(|| {
                blocks.push(Vec::new());
                blocks.len() - 1
            });
            blocks[slot].push(index);
        }
        blocks
    }

    fn update(
        &self,
        problem: &FrictionContactProblem,
        diagonal: &DMatrix<f64>,
        index: usize,
        lambda: &mut DVector<f64>,
        outcome: &mut SolverOutcome,
    ) {
        let block = problem.contacts[index];
        let (offset, size) = (block.offset, block.size());
        let u = problem.w.rows(offset, size) * &*lambda + problem.q.rows(offset, size);

        let mut local = [0.0; 3];
        local[..size].copy_from_slice(&lambda.as_slice()[offset..offset + size]);
        let previous = local;

        if let Err(DegenerateContact { normal_entry }) =
            block.law.project(u.as_slice(), &mut local[..size], diagonal)
        {
            debug!("contact {index} became degenerate (W_nn = {normal_entry:.3e})");
            local = [0.0; 3];
            if !outcome.dropped.contains(&index) {
                outcome.dropped.push(index);
            }
        } else if let SolverKind::NsgsRelaxed { omega } = self.kind {
            for k in 0..size {
                local[k] = (1.0 - omega) * previous[k] + omega * local[k];
            }
            block.law.project_on_cone(&mut local[..size]);
        }

        lambda
            .rows_mut(offset, size)
            .copy_from_slice(&local[..size]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_contact(law: NonSmoothLaw, w: DMatrix<f64>, q: Vec<f64>) -> FrictionContactProblem {
        FrictionContactProblem::new(w, DVector::from_vec(q), ContactBlock::stack(&[(law, 0)]))
    }

    #[test]
    fn frictionless_contact_cancels_approach() {
        let problem = single_contact(
            NonSmoothLaw::newton_impact(0.0),
            DMatrix::from_element(1, 1, 0.5),
            vec![-2.0],
        );
        let mut lambda = DVector::zeros(1);
        let outcome = NsgsSolver::new(50, 1e-10).solve(&problem, &mut lambda);
        assert!(outcome.converged);
        assert_eq!(outcome.iterations, 1);
        assert!((lambda[0] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn restrict_keeps_coupling_of_selected_rows() {
        let w = DMatrix::from_fn(3, 3, |i, j| (i * 3 + j) as f64);
        let problem = FrictionContactProblem::new(
            w,
            DVector::from_vec(vec![1.0, 2.0, 3.0]),
            ContactBlock::stack(&[
                (NonSmoothLaw::newton_impact(0.0), 0),
                (NonSmoothLaw::newton_impact(0.0), 1),
                (NonSmoothLaw::newton_impact(0.0), 2),
            ]),
        );
        let (sub, rows) = problem.restrict(&[0, 2]);
        assert_eq!(rows, vec![0, 2]);
        assert_eq!(sub.w[(0, 1)], 2.0);
        assert_eq!(sub.w[(1, 0)], 6.0);
        assert_eq!(sub.q[1], 3.0);
        assert_eq!(sub.contacts[1].offset, 1);
    }

    #[test]
    fn degenerate_contact_is_dropped() {
        let problem = single_contact(
            NonSmoothLaw::newton_impact(0.0),
            DMatrix::zeros(1, 1),
            vec![-1.0],
        );
        let mut lambda = DVector::from_element(1, 3.0);
        let outcome = NsgsSolver::new(10, 1e-8).solve(&problem, &mut lambda);
        assert_eq!(outcome.dropped, vec![0]);
        assert_eq!(lambda[0], 0.0);
    }

    #[test]
    fn contact_with_unusable_law_is_skipped() {
        let wide = NonSmoothLaw::NewtonImpactFriction {
            e: 0.0,
            mu: 0.3,
            dim: 5,
        };
        let problem = FrictionContactProblem::new(
            DMatrix::identity(6, 6),
            DVector::from_element(6, -1.0),
            ContactBlock::stack(&[(wide, 0), (NonSmoothLaw::newton_impact(0.0), 1)]),
        );
        let mut lambda = DVector::from_element(6, 2.0);
        let outcome = NsgsSolver::new(10, 1e-10).solve(&problem, &mut lambda);
        assert!(outcome.converged);
        assert_eq!(outcome.dropped, vec![0]);
        assert!(lambda.rows(0, 5).iter().all(|&v| v == 0.0));
        assert!((lambda[5] - 1.0).abs() < 1e-12);
        assert!(problem.error(&lambda) < 1e-12);
    }
}
