use std::time::{Duration, Instant};

use log::debug;
use serde::Serialize;

/// Wall-clock time spent in each phase of one time step.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct StepProfile {
    pub activation: Duration,
    pub assembly: Duration,
    pub solver: Duration,
    pub update: Duration,
    pub total: Duration,
}

impl StepProfile {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn accumulate(&mut self, other: &StepProfile) {
        self.activation += other.activation;
        self.assembly += other.assembly;
        self.solver += other.solver;
        self.update += other.update;
        self.total += other.total;
    }

    pub fn report(&self) {
        let total_us = self.total.as_micros() as f64;
        if total_us < 1.0 {
            return;
        }
        let share = |phase: Duration| phase.as_micros() as f64 / total_us * 100.0;
        debug!(
            "step {:.3} ms: activation {:.1}%, assembly {:.1}%, solver {:.1}%, update {:.1}%",
            self.total.as_secs_f64() * 1000.0,
            share(self.activation),
            share(self.assembly),
            share(self.solver),
            share(self.update)
        );
    }
}

/// Adds the lifetime of the guard to a phase duration.
pub struct PhaseTimer<'a> {
    start: Instant,
    output: &'a mut Duration,
}

impl<'a> PhaseTimer<'a> {
    pub fn new(output: &'a mut Duration) -> Self {
        Self {
            start: Instant::now(),
            output,
        }
    }
}

impl<'a> Drop for PhaseTimer<'a> {
    fn drop(&mut self) {
        *self.output += self.start.elapsed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_accumulates_into_phase() {
        let mut profile = StepProfile::default();
        {
            let _timer = PhaseTimer::new(&mut profile.solver);
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(profile.solver >= Duration::from_millis(1));
        assert_eq!(profile.assembly, Duration::ZERO);
    }
}
