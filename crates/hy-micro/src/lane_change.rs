//! Lane changes.
//!
//! A car that moves to a neighbour lane is placed there immediately, at the
//! same parametric position, and carries a [`LaneChange`] until the
//! manoeuvre completes.  While the sub-state is present the car still
//! constrains followers in the lane it left.

use serde::{Deserialize, Serialize};

use hy_core::{LaneChangeParams, LaneId};

/// Duration scale of a lane change; the manoeuvre takes `11.5 / √v` seconds.
pub const DURATION_SCALE: f64 = 11.507_31;

/// In-progress lane change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LaneChange {
    /// Lane the car is leaving.
    pub from:          LaneId,
    /// The car's parametric position projected onto `from`.
    pub from_position: f64,
    /// Fraction of the manoeuvre completed, in `[0, 1]`.
    pub progress:      f64,
}

impl LaneChange {
    pub fn new(from: LaneId, from_position: f64) -> Self {
        Self { from, from_position, progress: 0.0 }
    }

    /// Seconds a lane change takes at velocity `v`.
    #[inline]
    pub fn duration(v: f64) -> f64 {
        DURATION_SCALE / v.sqrt()
    }

    /// Advance by `dt` at velocity `v`.  Returns `true` once complete.
    pub fn advance(&mut self, dt: f64, v: f64, from_length: f64) -> bool {
        // dt / duration(v), written so v = 0 makes no progress.
        self.progress += dt * v.max(0.0).sqrt() / DURATION_SCALE;
        self.from_position += v * dt / from_length;
        self.progress >= 1.0
    }
}

/// Outcome of evaluating one neighbour lane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LaneChangeDecision {
    /// The new follower would have to brake harder than politeness allows.
    Unsafe,
    /// Acceleration gained by changing, m/s² (may be negative).
    Gain(f64),
}

impl LaneChangeDecision {
    /// Weigh a candidate lane.
    ///
    /// `a_hat` is the car's acceleration behind its would-be leader,
    /// `current` its acceleration in its own lane, and `follower_decel` the
    /// acceleration the would-be follower would get behind the car.
    pub fn evaluate(
        params: &LaneChangeParams,
        a_hat: f64,
        current: f64,
        follower_decel: Option<f64>,
    ) -> Self {
        match follower_decel {
            Some(f) if f < -params.politeness * params.max_deceleration => Self::Unsafe,
            _ => Self::Gain(a_hat - current),
        }
    }

    /// Gain, if worth acting on.
    #[inline]
    pub fn worthwhile(self, params: &LaneChangeParams) -> Option<f64> {
        match self {
            Self::Gain(g) if g > params.threshold => Some(g),
            _ => None,
        }
    }
}
