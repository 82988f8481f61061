//! Plain data row types written by output backends.

use hy_sim::Fidelity;

/// Aggregate state of one lane at a snapshot step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneSampleRow {
    pub step:       u64,
    /// Simulated seconds.
    pub time:       f64,
    pub lane:       u32,
    pub fidelity:   Fidelity,
    /// Fractional on macro lanes.
    pub vehicles:   f64,
    /// Fraction of the lane covered by vehicles, in `[0, 1]`.
    pub density:    f64,
    /// Density-weighted mean velocity in m/s; the speed limit on an empty lane.
    pub mean_speed: f64,
}

/// Summary of one simulation step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepSummaryRow {
    pub step: u64,
    pub time: f64,
    pub dt:   f64,
}

/// Column value used for a fidelity by every backend.
pub fn fidelity_label(fidelity: Fidelity) -> &'static str {
    match fidelity {
        Fidelity::Macro => "macro",
        Fidelity::Micro => "micro",
    }
}
