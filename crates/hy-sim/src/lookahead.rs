//! Leaders beyond the end of a lane.
//!
//! The last car on a micro lane follows whatever comes first downstream:
//! a car on a micro lane, the first car's worth of density on a macro lane,
//! a stop at a closed end, or free road at a network exit.  The search is
//! a plain cursor over the link chain, bounded in depth and distance.

use hy_core::{CarGeometry, LaneId, LookaheadParams};
use hy_micro::Leader;
use hy_network::{Link, Network, PhaseView};

use crate::{LaneState, Payload};

/// Read-only view of everything a downstream search needs.
pub(crate) struct Lookahead<'a> {
    pub network:  &'a Network,
    pub views:    &'a [PhaseView],
    pub lanes:    &'a [LaneState],
    pub params:   LookaheadParams,
    pub geometry: CarGeometry,
}

impl Lookahead<'_> {
    /// Leader of a car whose rear axle is `to_end` metres before the end of
    /// `lane`.  Distances are axle to axle.
    pub fn leader_beyond(&self, lane: LaneId, to_end: f64) -> Leader {
        let mut distance = to_end;
        let mut at = lane;

        for _ in 0..self.params.max_depth {
            if distance >= self.params.max_distance {
                break;
            }
            match self.network.downstream(at, self.views) {
                Link::Boundary => break,
                // A standing obstacle whose rear is the lane end.
                Link::Closed => {
                    return Leader::new(distance + self.geometry.rear_bumper_to_axle, 0.0);
                }
                Link::Lane(next) => {
                    let state = &self.lanes[next.index()];
                    if let Some((x, v)) = self.first_on(state) {
                        return Leader::new(distance + x, v);
                    }
                    distance += state.length;
                    at = next;
                }
            }
        }

        Leader::new(
            distance.max(self.params.max_distance),
            self.lanes[at.index()].speed_limit(),
        )
    }

    /// Axle position and velocity of the rearmost vehicle on a lane.
    fn first_on(&self, lane: &LaneState) -> Option<(f64, f64)> {
        match &lane.payload {
            Payload::Micro(m) => m.rearmost().map(|c| (c.distance_along(lane.length), c.velocity)),
            Payload::Macro(m) => {
                if let Some(car) = m.inbox.iter().min_by(|a, b| a.position.total_cmp(&b.position)) {
                    return Some((car.distance_along(lane.length), car.velocity));
                }
                // The accumulation point is the virtual car's front bumper.
                m.virtual_leader(self.geometry.length)
                    .map(|(x, v)| ((x - self.geometry.front_bumper_offset()).max(0.0), v))
            }
        }
    }
}
