//! `hy-core` — foundational types for the hybrid macro/micro traffic engine.
//!
//! This crate is a dependency of every other `hy-*` crate.  It has no `hy-*`
//! dependencies of its own.
//!
//! # What lives here
//!
//! | Module          | Contents                                              |
//! |-----------------|-------------------------------------------------------|
//! | [`ids`]         | `LaneId`, `IntersectionId`, `CarId`                   |
//! | [`time`]        | `SimClock` (continuous time + step counter)           |
//! | [`rng`]         | `SimRng` (ChaCha8) and its serializable `RngState`    |
//! | [`config`]      | `SimConfig`, `MacroParams`, `IdmParams`, `CarGeometry` |
//! | [`error`]       | `HyError`, `HyResult`                                 |

pub mod config;
pub mod error;
pub mod ids;
pub mod rng;
pub mod time;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use config::{CarGeometry, IdmParams, LaneChangeParams, LookaheadParams, MacroParams, SimConfig};
pub use error::{HyError, HyResult};
pub use ids::{CarId, IntersectionId, LaneId};
pub use rng::{RngState, SimRng};
pub use time::SimClock;
