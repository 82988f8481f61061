//! `hy-arz` — numerics of the second-order ARZ traffic model.
//!
//! Everything here is a pure function of its inputs.  Lanes, cells and time
//! stepping live in `hy-sim`; this crate only knows about states, the
//! equilibrium relation and the Riemann problem between two states.
//!
//! # Crate layout
//!
//! | Module        | Contents                                                  |
//! |---------------|-----------------------------------------------------------|
//! | [`eq`]        | `Equilibrium`: `u_eq(ρ)`, its inverse and derivative      |
//! | [`state`]     | `Q` (conserved ρ, y) and `FullQ` (plus u_eq, u)           |
//! | [`fd`]        | fundamental diagram, demand/supply and their inverses     |
//! | [`riemann`]   | `RiemannSolution` and the interface/boundary solvers      |
//!
//! # Tolerances
//!
//! Two tolerances are shared by every comparison of their class so the
//! solver does not flip between cases near steady state:
//!
//! - [`EPSILON`] for velocity, flux and density clamping,
//! - [`VACUUM_EPS`] for vacuum detection.

pub mod eq;
pub mod fd;
pub mod riemann;
pub mod state;


/// Tolerance for velocity/flux comparisons and for `Q::fix` clamping.
pub const EPSILON: f64 = 1e-3;

/// A density below this counts as vacuum in the Riemann solver.
pub const VACUUM_EPS: f64 = 1e-4;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use eq::Equilibrium;
pub use riemann::RiemannSolution;
pub use state::{FullQ, Q};
