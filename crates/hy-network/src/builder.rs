//! Incremental network construction.

use log::debug;

use hy_core::{IntersectionId, LaneId};

use crate::network::{Connector, ConnectorOf, IntersectionSpec, LaneEnd, LaneSpec, Network, Phase};
use crate::{NetworkError, NetworkResult};

/// Construct a [`Network`] incrementally, then call [`build`](Self::build).
///
/// Lanes are added first, then joined to each other or to intersections.
/// Connector lanes are created per phase with [`add_connector`]; their
/// speed limit is the outgoing lane's.
///
/// # Example
///
/// ```
/// use hy_network::NetworkBuilder;
///
/// let mut b = NetworkBuilder::new();
/// let a = b.add_lane(200.0, 15.0);
/// let c = b.add_lane(150.0, 15.0);
/// b.connect(a, c).unwrap();
/// let net = b.build().unwrap();
/// assert_eq!(net.lane_count(), 2);
/// ```
///
/// [`add_connector`]: Self::add_connector
#[derive(Default)]
pub struct NetworkBuilder {
    lanes:         Vec<LaneSpec>,
    intersections: Vec<IntersectionSpec>,
}

impl NetworkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an unattached lane (both ends on the network boundary).
    pub fn add_lane(&mut self, length: f64, speed_limit: f64) -> LaneId {
        let id = LaneId(self.lanes.len() as u32);
        self.lanes.push(LaneSpec::new(length, speed_limit));
        id
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Join the end of `upstream` to the start of `downstream`.
    pub fn connect(&mut self, upstream: LaneId, downstream: LaneId) -> NetworkResult<()> {
        self.check_lane(upstream)?;
        self.check_lane(downstream)?;
        if self.lanes[upstream.index()].end != LaneEnd::Boundary {
            return Err(NetworkError::AlreadyAttached(upstream));
        }
        if self.lanes[downstream.index()].start != LaneEnd::Boundary {
            return Err(NetworkError::AlreadyAttached(downstream));
        }
        self.lanes[upstream.index()].end = LaneEnd::Lane(downstream);
        self.lanes[downstream.index()].start = LaneEnd::Lane(upstream);
        Ok(())
    }

    /// Make the end of `lane` a dead end.
    pub fn close_end(&mut self, lane: LaneId) -> NetworkResult<()> {
        self.check_lane(lane)?;
        self.lanes[lane.index()].end = LaneEnd::Closed;
        Ok(())
    }

    /// Record lane-change neighbours of `lane`.
    pub fn set_neighbors(
        &mut self,
        lane: LaneId,
        left: Option<LaneId>,
        right: Option<LaneId>,
    ) -> NetworkResult<()> {
        self.check_lane(lane)?;
        for n in left.iter().chain(right.iter()) {
            self.check_lane(*n)?;
        }
        let spec = &mut self.lanes[lane.index()];
        spec.left = left;
        spec.right = right;
        Ok(())
    }

    /// Add an intersection joining `incoming` lane ends to `outgoing` lane
    /// starts.  Slot numbers are positions in the two slices.
    pub fn add_intersection(
        &mut self,
        incoming: &[LaneId],
        outgoing: &[LaneId],
    ) -> NetworkResult<IntersectionId> {
        let id = IntersectionId(self.intersections.len() as u32);
        for &l in incoming {
            self.check_lane(l)?;
            if self.lanes[l.index()].end != LaneEnd::Boundary {
                return Err(NetworkError::AlreadyAttached(l));
            }
        }
        for &l in outgoing {
            self.check_lane(l)?;
            if self.lanes[l.index()].start != LaneEnd::Boundary {
                return Err(NetworkError::AlreadyAttached(l));
            }
        }
        for (slot, &l) in incoming.iter().enumerate() {
            self.lanes[l.index()].end = LaneEnd::Intersection { id, slot };
        }
        for (slot, &l) in outgoing.iter().enumerate() {
            self.lanes[l.index()].start = LaneEnd::Intersection { id, slot };
        }
        self.intersections.push(IntersectionSpec {
            incoming: incoming.to_vec(),
            outgoing: outgoing.to_vec(),
            phases:   Vec::new(),
        });
        Ok(id)
    }

    /// Append a phase of `duration` seconds and return its index.
    pub fn add_phase(&mut self, intersection: IntersectionId, duration: f64) -> NetworkResult<usize> {
        let spec = self
            .intersections
            .get_mut(intersection.index())
            .ok_or(NetworkError::UnknownIntersection(intersection))?;
        spec.phases.push(Phase { duration, connectors: Vec::new() });
        Ok(spec.phases.len() - 1)
    }

    /// Create the connector lane for movement `in_slot → out_slot` during
    /// `phase`.
    pub fn add_connector(
        &mut self,
        intersection: IntersectionId,
        phase: usize,
        in_slot: usize,
        out_slot: usize,
        length: f64,
    ) -> NetworkResult<LaneId> {
        let spec = self
            .intersections
            .get(intersection.index())
            .ok_or(NetworkError::UnknownIntersection(intersection))?;
        if phase >= spec.phases.len() {
            return Err(NetworkError::UnknownPhase { intersection, phase });
        }
        let &from = spec.incoming.get(in_slot).ok_or(NetworkError::BadSlot {
            intersection,
            side: "incoming",
            slot: in_slot,
        })?;
        let &to = spec.outgoing.get(out_slot).ok_or(NetworkError::BadSlot {
            intersection,
            side: "outgoing",
            slot: out_slot,
        })?;

        let speed_limit = self.lanes[to.index()].speed_limit;
        let lane = self.add_lane(length, speed_limit);
        let lane_spec = &mut self.lanes[lane.index()];
        lane_spec.start = LaneEnd::Lane(from);
        lane_spec.end = LaneEnd::Lane(to);
        lane_spec.connector = Some(ConnectorOf { intersection, phase });

        self.intersections[intersection.index()].phases[phase]
            .connectors
            .push(Connector { in_slot, out_slot, lane });
        Ok(lane)
    }

    /// Validate and produce the [`Network`].
    pub fn build(self) -> NetworkResult<Network> {
        for (i, lane) in self.lanes.iter().enumerate() {
            let id = LaneId(i as u32);
            if !(lane.length > 0.0 && lane.length.is_finite()) {
                return Err(NetworkError::BadLength { lane: id, length: lane.length });
            }
            if !(lane.speed_limit > 0.0 && lane.speed_limit.is_finite()) {
                return Err(NetworkError::BadSpeedLimit { lane: id, speed_limit: lane.speed_limit });
            }
        }

        for (i, spec) in self.intersections.iter().enumerate() {
            let id = IntersectionId(i as u32);
            if spec.phases.is_empty() {
                return Err(NetworkError::NoPhases(id));
            }
            for (p, phase) in spec.phases.iter().enumerate() {
                if !(phase.duration > 0.0 && phase.duration.is_finite()) {
                    return Err(NetworkError::BadDuration {
                        intersection: id,
                        phase:        p,
                        duration:     phase.duration,
                    });
                }
                check_unique_slots(id, p, phase.connectors.iter().map(|c| c.in_slot), "incoming")?;
                check_unique_slots(id, p, phase.connectors.iter().map(|c| c.out_slot), "outgoing")?;
            }
        }

        let connectors = self.lanes.iter().filter(|l| l.is_connector()).count();
        debug!(
            "network built: {} lanes ({} connectors), {} intersections",
            self.lanes.len(),
            connectors,
            self.intersections.len()
        );

        Ok(Network { lanes: self.lanes, intersections: self.intersections })
    }

    fn check_lane(&self, id: LaneId) -> NetworkResult<()> {
        if id.index() < self.lanes.len() {
            Ok(())
        } else {
            Err(NetworkError::UnknownLane(id))
        }
    }
}

fn check_unique_slots(
    intersection: IntersectionId,
    phase: usize,
    slots: impl Iterator<Item = usize>,
    side: &'static str,
) -> NetworkResult<()> {
    let mut seen: Vec<usize> = Vec::new();
    for slot in slots {
        if seen.contains(&slot) {
            return Err(NetworkError::ConflictingConnector { intersection, phase, side, slot });
        }
        seen.push(slot);
    }
    Ok(())
}
