//! The corridor network: an arterial and a side street meeting at one
//! signal, the arterial continuing into a faster expressway.
//!
//! ```text
//!   arterial_in (800 m, 20 m/s) ─┐          ┌─ east_a (600 m, 20 m/s) ── east_b (1 km, 25 m/s) ─▶
//!                                ├── [X] ───┤
//!   side_in     (400 m, 14 m/s) ─┘          └─ north_out (500 m, 14 m/s) ─▶
//!
//!   phase 0 (35 s): arterial_in → east_a
//!   phase 1 (20 s): side_in     → north_out
//! ```

use anyhow::Result;

use hy_core::LaneId;
use hy_network::{Network, NetworkBuilder};

pub struct Corridor {
    pub network:     Network,
    pub arterial_in: LaneId,
    pub side_in:     LaneId,
    pub east_a:      LaneId,
    pub east_b:      LaneId,
    pub north_out:   LaneId,
    pub connectors:  [LaneId; 2],
}

pub fn build_corridor() -> Result<Corridor> {
    let mut b = NetworkBuilder::new();

    let arterial_in = b.add_lane(800.0, 20.0);
    let side_in     = b.add_lane(400.0, 14.0);
    let east_a      = b.add_lane(600.0, 20.0);
    let east_b      = b.add_lane(1_000.0, 25.0);
    let north_out   = b.add_lane(500.0, 14.0);
    b.connect(east_a, east_b)?;

    let signal = b.add_intersection(&[arterial_in, side_in], &[east_a, north_out])?;
    let main_phase = b.add_phase(signal, 35.0)?;
    let through = b.add_connector(signal, main_phase, 0, 0, 25.0)?;
    let side_phase = b.add_phase(signal, 20.0)?;
    let side = b.add_connector(signal, side_phase, 1, 1, 30.0)?;

    Ok(Corridor {
        network: b.build()?,
        arterial_in,
        side_in,
        east_a,
        east_b,
        north_out,
        connectors: [through, side],
    })
}
