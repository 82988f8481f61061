//! Simulation time model.
//!
//! Macro steps are CFL-limited, so the time step varies from step to step.
//! Time is therefore a continuous `f64` in seconds, paired with an integer
//! step counter that observers use for output intervals.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Continuous simulation clock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimClock {
    /// Simulated seconds since the start of the run.
    pub time: f64,
    /// Number of completed steps.
    pub steps: u64,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock by one step of length `dt`.
    #[inline]
    pub fn advance(&mut self, dt: f64) {
        debug_assert!(dt.is_finite() && dt >= 0.0, "bad time step {dt}");
        self.time += dt;
        self.steps += 1;
    }

    /// Break elapsed time into (hour, minute, second) components.
    pub fn elapsed_hms(&self) -> (u64, u32, f64) {
        let total = self.time.max(0.0);
        let hours = (total / 3_600.0).floor();
        let minutes = ((total - hours * 3_600.0) / 60.0).floor();
        let seconds = total - hours * 3_600.0 - minutes * 60.0;
        (hours as u64, minutes as u32, seconds)
    }
}

impl fmt::Display for SimClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (h, m, s) = self.elapsed_hms();
        write!(f, "step {} ({:02}:{:02}:{:06.3})", self.steps, h, m, s)
    }
}
