use log::{log_enabled, warn, Level};
use std::time::Instant;

/// Traces the wall-clock duration of a section tagged with simulation time.
pub struct ScopedTimer {
    label: &'static str,
    t: f64,
    start: Instant,
}

impl ScopedTimer {
    pub fn new(label: &'static str, t: f64) -> Self {
        if log_enabled!(Level::Trace) {
            log::trace!("{label} from t = {t:.6}");
        }
        Self {
            label,
            t,
            start: Instant::now(),
        }
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        if log_enabled!(Level::Trace) {
            log::trace!(
                "{} from t = {:.6} done in {} µs",
                self.label,
                self.t,
                self.start.elapsed().as_micros()
            );
        }
    }
}

/// Warns when the deepest penetration of a step exceeds `threshold`.
pub fn warn_if_violation_exceeds(t: f64, violation: f64, threshold: f64) {
    if violation > threshold {
        warn!("constraint violation {violation:.3e} at t = {t:.6} exceeds {threshold:.3e}");
    }
}
