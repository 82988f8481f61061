//! Serializable simulation state.
//!
//! A snapshot holds everything a step reads: cell arrays and flux
//! capacitors, cars, inflow backlogs, signal state, the RNG position, the
//! car-id counter, and the clock.  Interface solutions and edge states are
//! rebuilt at the start of every step, so they are not stored.
//!
//! JSON floats round-trip exactly, so a restored simulator steps to the
//! same bits as the one it was taken from.

use serde::{Deserialize, Serialize};

use hy_arz::Q;
use hy_core::{RngState, SimClock};
use hy_micro::Car;

use crate::{FluxCapacitor, Inflow, SignalController, SimResult};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LaneSnapshot {
    Macro {
        cells:     Vec<Q>,
        capacitor: FluxCapacitor,
        inbox:     Vec<Car>,
    },
    Micro {
        cars: Vec<Car>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub clock:       SimClock,
    pub rng:         RngState,
    pub next_car_id: u64,
    pub cars_exited: u64,
    /// Indexed by `LaneId`.
    pub lanes:       Vec<LaneSnapshot>,
    /// Indexed by `LaneId`.
    pub inflows:     Vec<Option<Inflow>>,
    /// Indexed by `IntersectionId`.
    pub signals:     Vec<SignalController>,
}

impl Snapshot {
    pub fn to_json(&self) -> SimResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> SimResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
