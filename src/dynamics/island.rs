use std::collections::{HashMap, HashSet};

use nalgebra::DVector;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    core::{body::BodyId, contact::ContactBodies},
    dynamics::solver::{FrictionContactProblem, NsgsSolver, SolverOutcome},
};

/// Connected set of bodies and the contacts between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Island {
    pub bodies: Vec<BodyId>,
    /// Indices into the active contact list, ascending.
    pub contacts: Vec<usize>,
}

/// Partitions the active contacts into independent islands each step.
#[derive(Debug, Default)]
pub struct IslandManager {
    islands: Vec<Island>,
    adjacency: HashMap<BodyId, Vec<BodyId>>,
}

impl IslandManager {
    pub fn new() -> Self {
        Self {
            islands: Vec::new(),
            adjacency: HashMap::new(),
        }
    }

    /// Rebuilds the islands from contact connectivity. Bodies without
    /// contacts do not form islands.
    pub fn build_islands(&mut self, body_count: usize, contacts: &[ContactBodies]) {
        self.islands.clear();
        self.adjacency.clear();

        for bodies in contacts {
            match *bodies {
                ContactBodies::Ground(a) => {
                    self.adjacency.entry(a).or_default();
                }
                ContactBodies::Pair(a, b) => {
                    self.adjacency.entry(a).or_default().push(b);
                    self.adjacency.entry(b).or_default().push(a);
                }
            }
        }

        let mut visited = HashSet::new();
        let mut island_of = HashMap::new();
        for index in 0..body_count {
            let body_id = BodyId(index);
            if visited.contains(&body_id) || !self.adjacency.contains_key(&body_id) {
                continue;
            }
            let mut bodies_in_island = self.depth_first_collect(body_id, &mut visited);
            bodies_in_island.sort_unstable();
            for body in &bodies_in_island {
                island_of.insert(*body, self.islands.len());
            }
            self.islands.push(Island {
                bodies: bodies_in_island,
                contacts: Vec::new(),
            });
        }

        for (index, bodies) in contacts.iter().enumerate() {
            if let Some(&island) = island_of.get(&bodies.first()) {
                self.islands[island].contacts.push(index);
            }
        }
    }

    fn depth_first_collect(&self, start: BodyId, visited: &mut HashSet<BodyId>) -> Vec<BodyId> {
        let mut stack = vec![start];
        let mut result = Vec::new();

        while let Some(node) = stack.pop() {
            if visited.insert(node) {
                result.push(node);
                if let Some(neighbors) = self.adjacency.get(&node) {
                    stack.extend(neighbors.iter().copied());
                }
            }
        }

        result
    }

    pub fn islands(&self) -> &[Island] {
        &self.islands
    }

    /// Solves each island as an independent sub-problem of `problem` and
    /// scatters the multipliers back into `lambda`.
    ///
    /// Islands are decoupled, so the concurrent path returns exactly what the
    /// sequential one does.
    pub fn solve(
        &self,
        solver: &NsgsSolver,
        problem: &FrictionContactProblem,
        lambda: &mut DVector<f64>,
        parallel: bool,
    ) -> SolverOutcome {
        let mut jobs: Vec<IslandJob> = self
            .islands
            .iter()
            .filter(|island| !island.contacts.is_empty())
            .map(|island| IslandJob::prepare(island, problem, lambda))
            .collect();

        run_jobs(&mut jobs, solver, parallel);

        let mut outcome = SolverOutcome::default();
        for job in jobs {
            for (local, &row) in job.rows.iter().enumerate() {
                lambda[row] = job.lambda[local];
            }
            let mut island_outcome = job.outcome;
            for dropped in &mut island_outcome.dropped {
                *dropped = job.contacts[*dropped];
            }
            outcome.merge(&island_outcome);
        }
        outcome.dropped.sort_unstable();
        outcome
    }
}

fn run_jobs(jobs: &mut [IslandJob], solver: &NsgsSolver, parallel: bool) {
    #[cfg(feature = "parallel")]
    {
        if parallel {
            jobs.par_iter_mut().for_each(|job| job.run(solver));
            return;
        }
    }
    #[cfg(not(feature = "parallel"))]
    let _ = parallel;

    for job in jobs.iter_mut() {
        job.run(solver);
    }
}

struct IslandJob {
    contacts: Vec<usize>,
    rows: Vec<usize>,
    problem: FrictionContactProblem,
    lambda: DVector<f64>,
    outcome: SolverOutcome,
}

impl IslandJob {
    fn prepare(island: &Island, problem: &FrictionContactProblem, lambda: &DVector<f64>) -> Self {
        let (sub, rows) = problem.restrict(&island.contacts);
        let warm = lambda.select_rows(rows.iter());
        Self {
            contacts: island.contacts.clone(),
            rows,
            problem: sub,
            lambda: warm,
            outcome: SolverOutcome::default(),
        }
    }

    fn run(&mut self, solver: &NsgsSolver) {
        self.outcome = solver.solve(&self.problem, &mut self.lambda);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chains_pairs_and_separates_grounded_bodies() {
        let contacts = [
            ContactBodies::Ground(BodyId(0)),
            ContactBodies::Pair(BodyId(1), BodyId(2)),
            ContactBodies::Ground(BodyId(2)),
            ContactBodies::Pair(BodyId(2), BodyId(3)),
        ];
        let mut manager = IslandManager::new();
        manager.build_islands(5, &contacts);
        let islands = manager.islands();
        assert_eq!(islands.len(), 2);
        assert_eq!(islands[0].bodies, vec![BodyId(0)]);
        assert_eq!(islands[0].contacts, vec![0]);
        assert_eq!(islands[1].bodies, vec![BodyId(1), BodyId(2), BodyId(3)]);
        assert_eq!(islands[1].contacts, vec![1, 2, 3]);
    }
}
