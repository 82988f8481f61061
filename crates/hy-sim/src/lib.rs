//! `hy-sim` — the hybrid macro/micro step loop.
//!
//! # Hybrid step
//!
//! ```text
//! hybrid_step():
//!   ① Absorb:    cars that crossed onto macro lanes join the first cells.
//!   ② Macro:     edges ← neighbour states (micro neighbours via mirror)
//!                collect_riemann per lane            ┐ parallel with the
//!                ── barrier: dt = cfl·min_h/max_speed │ `parallel` feature,
//!                update(dt) per lane                  ┘ one bucket per worker
//!                flux-capacitor cars → downstream micro lanes, room permitting
//!   ③ Micro:     accelerations (IDM + lookahead), lane changes,
//!                integration, lane-end crossings into `next` buffers.
//!   ④ Clock:     advance by dt.
//!   ⑤ Inflow:    source demand enters macro cells or as new cars.
//!   ⑥ Swap:      `next` buffers become resident.
//!   ⑦ Signals:   phase timers advance; expired phases lock until their
//!                connector lanes are empty, then switch.
//! ```
//!
//! # Cargo features
//!
//! | Feature    | Effect                                                   |
//! |------------|----------------------------------------------------------|
//! | `parallel` | Runs the macro phase on a dedicated Rayon thread pool.   |
//!
//! # Quick-start
//!
//! ```rust,ignore
//! use hy_core::SimConfig;
//! use hy_network::NetworkBuilder;
//! use hy_sim::{Fidelity, NoopObserver, SimBuilder};
//!
//! let mut b = NetworkBuilder::new();
//! let road = b.add_lane(1_000.0, 30.0);
//! let mut sim = SimBuilder::new(SimConfig::default(), b.build()?)
//!     .uniform(road, 0.3, 20.0)
//!     .build()?;
//! sim.run(100, &mut NoopObserver)?;
//! ```

pub mod builder;
pub mod convert;
pub mod error;
pub mod intersection;
pub mod lane;
pub mod macro_lane;
pub mod micro_lane;
pub mod observer;
pub mod scheduler;
pub mod sim;
pub mod snapshot;

mod lookahead;
mod micro;

#[cfg(test)]
mod tests;

pub use builder::SimBuilder;
pub use error::{SimError, SimResult};
pub use intersection::SignalController;
pub use lane::{Fidelity, Inflow, LaneState, Payload};
pub use macro_lane::{FluxCapacitor, MacroLane, OCCUPIED_DENSITY};
pub use micro::MAX_MICRO_DT;
pub use micro_lane::MicroLane;
pub use observer::{NoopObserver, SimObserver};
pub use scheduler::{Partition, Scheduler};
pub use sim::Simulator;
pub use snapshot::{LaneSnapshot, Snapshot};
