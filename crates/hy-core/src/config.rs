//! Simulation configuration.
//!
//! Loaded from JSON by the application (or built in code from
//! `SimConfig::default()`) and passed to the simulator builder.  Every field
//! has a default, so a config file only needs to name what it changes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{HyError, HyResult};

// ── MacroParams ───────────────────────────────────────────────────────────────

/// Parameters of the continuum (ARZ) solver.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacroParams {
    /// Shape exponent γ of the equilibrium velocity `u_max(1 − ρ^γ)`.
    /// Must lie in `(0, 1]`.
    pub gamma: f64,

    /// Damping rate pulling the relative flow `y` towards equilibrium.
    pub relaxation_factor: f64,

    /// Courant number used by `hybrid_step`.  Must lie in `(0, 1]`.
    pub cfl: f64,

    /// Upper bound on the cell width in metres.  Each lane gets
    /// `N = ceil(length / target_cell_spacing)` cells.
    pub target_cell_spacing: f64,
}

impl Default for MacroParams {
    fn default() -> Self {
        Self {
            gamma:               0.5,
            relaxation_factor:   0.0,
            cfl:                 1.0,
            target_cell_spacing: 12.1 * 4.5,
        }
    }
}

// ── IdmParams ─────────────────────────────────────────────────────────────────

/// Intelligent-driver-model parameters for micro lanes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdmParams {
    /// Maximum acceleration, m/s².
    pub a_max: f64,
    /// Comfortable deceleration, m/s².
    pub a_comfort: f64,
    /// Preferred (desired) velocity, m/s.
    pub v_pref: f64,
    /// Acceleration exponent δ.
    pub delta: f64,
    /// Jam distance s0, metres.
    pub min_spacing: f64,
    /// Safe time headway T, seconds.
    pub time_headway: f64,
}

impl Default for IdmParams {
    fn default() -> Self {
        Self {
            a_max:        1.5,
            a_comfort:    2.0,
            v_pref:       33.0,
            delta:        4.0,
            min_spacing:  2.0,
            time_headway: 1.6,
        }
    }
}

// ── LaneChangeParams ──────────────────────────────────────────────────────────

/// Thresholds for the lane-change decision.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneChangeParams {
    /// Minimum acceleration gain (m/s²) that makes a change worthwhile.
    pub threshold: f64,
    /// Fraction of `max_deceleration` a new follower may be forced into.
    pub politeness: f64,
    /// Hard braking limit, m/s².
    pub max_deceleration: f64,
    /// Disable lane changes entirely.
    pub enabled: bool,
}

impl Default for LaneChangeParams {
    fn default() -> Self {
        Self {
            threshold:        0.2,
            politeness:       0.6,
            max_deceleration: 10.0,
            enabled:          true,
        }
    }
}

// ── CarGeometry ───────────────────────────────────────────────────────────────

/// Vehicle footprint.  A car's position is the position of its rear axle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarGeometry {
    /// Bumper-to-bumper length, metres.
    pub length: f64,
    /// Distance from the rear bumper forward to the rear axle, metres.
    pub rear_bumper_to_axle: f64,
}

impl CarGeometry {
    /// Offset (metres, along the lane) from the axle to the rear bumper.
    #[inline]
    pub fn rear_bumper_offset(&self) -> f64 {
        -self.rear_bumper_to_axle
    }

    /// Offset (metres, along the lane) from the axle to the front bumper.
    #[inline]
    pub fn front_bumper_offset(&self) -> f64 {
        self.length - self.rear_bumper_to_axle
    }
}

impl Default for CarGeometry {
    fn default() -> Self {
        Self { length: 4.5, rear_bumper_to_axle: 1.0 }
    }
}

// ── LookaheadParams ───────────────────────────────────────────────────────────

/// Bounds on the cross-lane leader search.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookaheadParams {
    /// Maximum number of downstream lanes inspected.
    pub max_depth: usize,
    /// Distance (metres) beyond which the road counts as free.
    pub max_distance: f64,
}

impl Default for LookaheadParams {
    fn default() -> Self {
        Self { max_depth: 8, max_distance: 1_000.0 }
    }
}

// ── SimConfig ─────────────────────────────────────────────────────────────────

/// Top-level simulation configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Master RNG seed.  The same seed always produces identical results.
    pub seed: u64,

    /// Worker count for the parallel macro phase.  `None` uses all logical
    /// cores.
    pub num_threads: Option<usize>,

    /// Call `SimObserver::on_snapshot` every N steps.  0 disables snapshots.
    pub output_interval_steps: u64,

    pub macro_params: MacroParams,
    pub idm:          IdmParams,
    pub lane_change:  LaneChangeParams,
    pub car:          CarGeometry,
    pub lookahead:    LookaheadParams,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed:                  42,
            num_threads:           None,
            output_interval_steps: 1,
            macro_params:          MacroParams::default(),
            idm:                   IdmParams::default(),
            lane_change:           LaneChangeParams::default(),
            car:                   CarGeometry::default(),
            lookahead:             LookaheadParams::default(),
        }
    }
}

impl SimConfig {
    /// Parse and validate a JSON config document.
    pub fn from_json_str(text: &str) -> HyResult<Self> {
        let config: SimConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a JSON config file.
    pub fn from_path(path: &Path) -> HyResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Reject parameter combinations the solver cannot run with.
    pub fn validate(&self) -> HyResult<()> {
        let m = &self.macro_params;
        if !(m.gamma > 0.0 && m.gamma <= 1.0) {
            return Err(HyError::Config(format!("gamma must lie in (0, 1], got {}", m.gamma)));
        }
        if !(m.cfl > 0.0 && m.cfl <= 1.0) {
            return Err(HyError::Config(format!("cfl must lie in (0, 1], got {}", m.cfl)));
        }
        if !(m.target_cell_spacing > 0.0 && m.target_cell_spacing.is_finite()) {
            return Err(HyError::Config(format!(
                "target_cell_spacing must be positive, got {}",
                m.target_cell_spacing
            )));
        }
        if !(m.relaxation_factor >= 0.0) {
            return Err(HyError::Config("relaxation_factor must be non-negative".into()));
        }

        let idm = &self.idm;
        if !(idm.a_max > 0.0 && idm.a_comfort > 0.0 && idm.v_pref > 0.0 && idm.delta > 0.0) {
            return Err(HyError::Config("IDM a_max, a_comfort, v_pref and delta must be positive".into()));
        }
        if idm.min_spacing < 0.0 || idm.time_headway < 0.0 {
            return Err(HyError::Config("IDM spacing and headway must be non-negative".into()));
        }

        let car = &self.car;
        if !(car.length > 0.0) || car.rear_bumper_to_axle < 0.0 || car.rear_bumper_to_axle > car.length {
            return Err(HyError::Config(format!(
                "car geometry invalid: length {} rear axle {}",
                car.length, car.rear_bumper_to_axle
            )));
        }

        if self.num_threads == Some(0) {
            return Err(HyError::Config("num_threads must be at least 1".into()));
        }
        if self.lookahead.max_depth == 0 {
            return Err(HyError::Config("lookahead.max_depth must be at least 1".into()));
        }
        Ok(())
    }
}
