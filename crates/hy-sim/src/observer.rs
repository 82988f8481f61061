//! Simulation observer trait for progress reporting and data collection.

use hy_core::SimClock;

use crate::LaneState;

/// Callbacks invoked by [`Simulator::run`][crate::Simulator::run] around
/// every hybrid step.
///
/// All methods have default no-op implementations so implementors only
/// override what they care about.
///
/// # Example: progress printer
///
/// ```rust,ignore
/// struct Progress;
///
/// impl SimObserver for Progress {
///     fn on_step_end(&mut self, clock: &SimClock, dt: f64) {
///         if clock.steps % 100 == 0 {
///             println!("{clock}: dt = {dt:.3}s");
///         }
///     }
/// }
/// ```
pub trait SimObserver {
    /// Called before each step.
    fn on_step_start(&mut self, _clock: &SimClock) {}

    /// Called after each step with the time step it took.
    fn on_step_end(&mut self, _clock: &SimClock, _dt: f64) {}

    /// Called every `config.output_interval_steps` steps with read-only
    /// access to every lane.
    fn on_snapshot(&mut self, _clock: &SimClock, _lanes: &[LaneState]) {}

    /// Called once after the final step.
    fn on_sim_end(&mut self, _clock: &SimClock) {}
}

/// A [`SimObserver`] that does nothing.
pub struct NoopObserver;

impl SimObserver for NoopObserver {}
