//! Per-lane simulation state.
//!
//! A lane keeps its identity, geometry and equilibrium curve for the whole
//! run; only its [`Payload`] changes when its fidelity is swapped.

use serde::{Deserialize, Serialize};

use hy_arz::Equilibrium;
use hy_core::LaneId;

use crate::{MacroLane, MicroLane};

/// Representation a lane is simulated at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fidelity {
    Macro,
    Micro,
}

/// Fidelity-specific lane contents.
#[derive(Clone, Debug)]
pub enum Payload {
    Macro(MacroLane),
    Micro(MicroLane),
}

/// Demand injected at a network source.
///
/// `backlog` counts cars that have arrived but not yet entered the lane.
/// Macro lanes treat it as a fractional quantity; micro lanes admit one
/// whole car at a time once the entrance is clear.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Inflow {
    /// Vehicles per second.
    pub rate:         f64,
    pub backlog:      f64,
    /// Absolute time of the next micro arrival.
    pub next_arrival: f64,
}

impl Inflow {
    pub fn new(rate: f64, next_arrival: f64) -> Self {
        Self { rate, backlog: 0.0, next_arrival }
    }
}

/// One lane of the running simulation.
#[derive(Clone, Debug)]
pub struct LaneState {
    pub id:      LaneId,
    /// Metres.
    pub length:  f64,
    pub eq:      Equilibrium,
    pub payload: Payload,
    pub inflow:  Option<Inflow>,
}

impl LaneState {
    #[inline]
    pub fn fidelity(&self) -> Fidelity {
        match self.payload {
            Payload::Macro(_) => Fidelity::Macro,
            Payload::Micro(_) => Fidelity::Micro,
        }
    }

    #[inline]
    pub fn speed_limit(&self) -> f64 {
        self.eq.u_max
    }

    pub fn as_macro(&self) -> Option<&MacroLane> {
        match &self.payload {
            Payload::Macro(m) => Some(m),
            Payload::Micro(_) => None,
        }
    }

    pub fn as_macro_mut(&mut self) -> Option<&mut MacroLane> {
        match &mut self.payload {
            Payload::Macro(m) => Some(m),
            Payload::Micro(_) => None,
        }
    }

    pub fn as_micro(&self) -> Option<&MicroLane> {
        match &self.payload {
            Payload::Micro(m) => Some(m),
            Payload::Macro(_) => None,
        }
    }

    pub fn as_micro_mut(&mut self) -> Option<&mut MicroLane> {
        match &mut self.payload {
            Payload::Micro(m) => Some(m),
            Payload::Macro(_) => None,
        }
    }

    /// Whether anything is on the lane.
    ///
    /// A macro lane counts as occupied when any cell is denser than
    /// `3 · EPSILON` or a car waits to be absorbed; a micro lane when it
    /// holds a resident or pending car.
    pub fn occupied(&self) -> bool {
        match &self.payload {
            Payload::Macro(m) => m.occupied(),
            Payload::Micro(m) => m.occupied(),
        }
    }

    /// Vehicles on the lane, fractional for macro lanes.  A macro lane
    /// counts the cars waiting in its inbox and its flux capacitor.
    pub fn vehicles(&self, car_length: f64) -> f64 {
        match &self.payload {
            Payload::Macro(m) => m.mass() / car_length + m.inbox.len() as f64 + m.capacitor.cars,
            Payload::Micro(m) => m.len() as f64,
        }
    }
}
