//! `hy-micro` — the discrete side of the hybrid engine.
//!
//! # Crate layout
//!
//! | Module          | Contents                                                  |
//! |-----------------|-----------------------------------------------------------|
//! | [`car`]         | `Car` agent state and explicit-Euler integration          |
//! | [`model`]       | `CarFollowing` trait, `Idm`                               |
//! | [`lane_change`] | `LaneChange` sub-state, lane-change incentive             |
//! | [`poisson`]     | piecewise-constant intensity, inhomogeneous Poisson draws |
//!
//! Cars know nothing about lanes beyond the length of the one they are on;
//! which lane holds a car, and who its leader is, is decided in `hy-sim`.

pub mod car;
pub mod lane_change;
pub mod model;
pub mod poisson;

#[cfg(test)]
mod tests;

pub use car::Car;
pub use lane_change::{LaneChange, LaneChangeDecision};
pub use model::{CarFollowing, Idm, Leader};
pub use poisson::{InhomogeneousPoisson, PiecewiseIntensity, poisson_points};
