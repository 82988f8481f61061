//! Car agent state.

use serde::{Deserialize, Serialize};

use hy_core::CarId;

use crate::LaneChange;

/// One vehicle on a micro lane.
///
/// `position` is parametric along the lane, in `[0, 1)`, and marks the
/// rear axle.  Velocities are m/s, acceleration m/s².
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Car {
    pub id:           CarId,
    pub position:     f64,
    pub velocity:     f64,
    pub acceleration: f64,
    /// Present while the car is still moving across from a neighbour lane.
    pub lane_change:  Option<LaneChange>,
}

impl Car {
    pub fn new(id: CarId, position: f64, velocity: f64) -> Self {
        Self { id, position, velocity, acceleration: 0.0, lane_change: None }
    }

    /// Explicit Euler step on a lane of `length` metres.
    ///
    /// Velocity is floored at zero, so cars never reverse.
    #[inline]
    pub fn integrate(&mut self, dt: f64, length: f64) {
        self.velocity = (self.velocity + self.acceleration * dt).max(0.0);
        self.position += self.velocity * dt / length;
    }

    /// Position in metres from the start of a lane of `length` metres.
    #[inline]
    pub fn distance_along(&self, length: f64) -> f64 {
        self.position * length
    }

    #[inline]
    pub fn is_changing_lane(&self) -> bool {
        self.lane_change.is_some()
    }
}
