//! Signal controller.
//!
//! ```text
//!            timer > duration                 all current connectors empty
//!  GREEN ──────────────────────────▶ check ──────────────────────────────▶ next phase, GREEN
//!                                      │ any occupied                           ▲
//!                                      ▼                                        │
//!                                   LOCKED ─────── re-checked every step ───────┘
//! ```
//!
//! While locked the intersection admits nothing: incoming lanes see a stop
//! and the current connectors drain.  Phases cycle forever.

use serde::{Deserialize, Serialize};

use hy_core::LaneId;
use hy_network::{IntersectionSpec, PhaseView};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalController {
    pub phase:      usize,
    /// Seconds since the current phase started.
    pub phase_time: f64,
    pub locked:     bool,
}

impl SignalController {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn view(&self) -> PhaseView {
        PhaseView { phase: self.phase, admitting: !self.locked }
    }

    /// Advance the timer by `dt` and switch or lock as needed.
    ///
    /// Returns `true` when the phase changed.
    pub fn advance(
        &mut self,
        dt: f64,
        spec: &IntersectionSpec,
        occupied: impl Fn(LaneId) -> bool,
    ) -> bool {
        self.phase_time += dt;
        if !self.locked && self.phase_time <= spec.phases[self.phase].duration {
            return false;
        }
        if spec.phase_lanes(self.phase).any(occupied) {
            self.locked = true;
            return false;
        }
        self.locked = false;
        self.phase = (self.phase + 1) % spec.phases.len();
        self.phase_time = 0.0;
        true
    }
}
