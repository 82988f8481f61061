//! Network representation.
//!
//! # Data layout
//!
//! Lanes and intersections live in two dense arenas indexed by `LaneId` and
//! `IntersectionId`.  Intersection connector ("fictitious") lanes are
//! ordinary entries of the lane arena, appended after the road lanes by the
//! builder, so simulator payload arrays can be indexed by `LaneId` without
//! distinguishing the two.
//!
//! # Signal-dependent links
//!
//! A lane whose end touches an intersection is linked to whichever connector
//! of the *current* phase uses its slot.  While the intersection is not
//! admitting traffic (its phase expired and it waits for connectors to
//! clear), incoming lanes are closed.  A connector only draws from its
//! incoming lane while its phase is current and admitting.

use hy_core::{IntersectionId, LaneId};

// ── Lane ──────────────────────────────────────────────────────────────────────

/// What a lane end is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LaneEnd {
    /// Edge of the network: a source at the start, an exit at the end.
    Boundary,
    /// Dead end.  Traffic stops at a closed end; nothing enters a closed start.
    Closed,
    /// Directly joined to another lane.
    Lane(LaneId),
    /// Attached to an intersection at the given incoming/outgoing slot.
    Intersection { id: IntersectionId, slot: usize },
}

/// Marks a connector lane and the phase it belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectorOf {
    pub intersection: IntersectionId,
    pub phase:        usize,
}

/// Static description of one lane.
#[derive(Clone, Debug, PartialEq)]
pub struct LaneSpec {
    /// Length in metres.
    pub length:      f64,
    /// Speed limit in m/s; the `u_max` of the lane's equilibrium curve.
    pub speed_limit: f64,
    pub start:       LaneEnd,
    pub end:         LaneEnd,
    /// Adjacent lane to the left, for lane changes.
    pub left:        Option<LaneId>,
    /// Adjacent lane to the right, for lane changes.
    pub right:       Option<LaneId>,
    /// `Some` for intersection connector lanes.
    pub connector:   Option<ConnectorOf>,
}

impl LaneSpec {
    pub(crate) fn new(length: f64, speed_limit: f64) -> Self {
        Self {
            length,
            speed_limit,
            start:     LaneEnd::Boundary,
            end:       LaneEnd::Boundary,
            left:      None,
            right:     None,
            connector: None,
        }
    }

    #[inline]
    pub fn is_connector(&self) -> bool {
        self.connector.is_some()
    }
}

// ── Intersection ──────────────────────────────────────────────────────────────

/// One incoming-slot → outgoing-slot movement of a phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Connector {
    pub in_slot:  usize,
    pub out_slot: usize,
    /// The connector lane carrying the movement.
    pub lane:     LaneId,
}

/// A signal phase: the movements it permits and for how long.
#[derive(Clone, Debug, PartialEq)]
pub struct Phase {
    /// Green time in seconds before a switch is requested.
    pub duration:   f64,
    pub connectors: Vec<Connector>,
}

/// Static description of a signalised intersection.
#[derive(Clone, Debug, PartialEq)]
pub struct IntersectionSpec {
    /// Lanes ending at the intersection, by slot.
    pub incoming: Vec<LaneId>,
    /// Lanes starting at the intersection, by slot.
    pub outgoing: Vec<LaneId>,
    /// Phases in cycle order.
    pub phases:   Vec<Phase>,
}

impl IntersectionSpec {
    /// All connector lanes of `phase`.
    pub fn phase_lanes(&self, phase: usize) -> impl Iterator<Item = LaneId> + '_ {
        self.phases[phase].connectors.iter().map(|c| c.lane)
    }
}

/// Signal state of one intersection as seen by link resolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PhaseView {
    /// Index of the current phase.
    pub phase:     usize,
    /// False while the intersection is locked waiting for its connectors
    /// to clear.
    pub admitting: bool,
}

impl PhaseView {
    pub fn open(phase: usize) -> Self {
        Self { phase, admitting: true }
    }
}

// ── Link ──────────────────────────────────────────────────────────────────────

/// Resolved neighbour of a lane in one direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Link {
    Lane(LaneId),
    /// Network source (upstream) or exit (downstream).
    Boundary,
    /// Nothing flows across this end right now.
    Closed,
}

impl Link {
    #[inline]
    pub fn lane(self) -> Option<LaneId> {
        match self {
            Link::Lane(l) => Some(l),
            _ => None,
        }
    }
}

// ── Network ───────────────────────────────────────────────────────────────────

/// Immutable lane/intersection topology.
///
/// Do not construct directly; use [`NetworkBuilder`](crate::NetworkBuilder),
/// which validates every cross-reference.
#[derive(Clone, Debug, Default)]
pub struct Network {
    pub lanes:         Vec<LaneSpec>,
    pub intersections: Vec<IntersectionSpec>,
}

impl Network {
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    pub fn intersection_count(&self) -> usize {
        self.intersections.len()
    }

    #[inline]
    pub fn lane(&self, id: LaneId) -> &LaneSpec {
        &self.lanes[id.index()]
    }

    #[inline]
    pub fn intersection(&self, id: IntersectionId) -> &IntersectionSpec {
        &self.intersections[id.index()]
    }

    pub fn lane_ids(&self) -> impl Iterator<Item = LaneId> + '_ {
        (0..self.lanes.len()).map(|i| LaneId(i as u32))
    }

    /// Neighbour downstream of `lane` under the signal state `views`.
    pub fn downstream(&self, lane: LaneId, views: &[PhaseView]) -> Link {
        match self.lane(lane).end {
            LaneEnd::Boundary => Link::Boundary,
            LaneEnd::Closed => Link::Closed,
            LaneEnd::Lane(next) => Link::Lane(next),
            LaneEnd::Intersection { id, slot } => {
                let view = views[id.index()];
                if !view.admitting {
                    return Link::Closed;
                }
                self.intersection(id).phases[view.phase]
                    .connectors
                    .iter()
                    .find(|c| c.in_slot == slot)
                    .map_or(Link::Closed, |c| Link::Lane(c.lane))
            }
        }
    }

    /// Neighbour upstream of `lane` under the signal state `views`.
    pub fn upstream(&self, lane: LaneId, views: &[PhaseView]) -> Link {
        let spec = self.lane(lane);
        if let Some(of) = spec.connector {
            let view = views[of.intersection.index()];
            if view.phase != of.phase || !view.admitting {
                return Link::Closed;
            }
        }
        match spec.start {
            LaneEnd::Boundary => Link::Boundary,
            LaneEnd::Closed => Link::Closed,
            LaneEnd::Lane(prev) => Link::Lane(prev),
            LaneEnd::Intersection { id, slot } => {
                let view = views[id.index()];
                self.intersection(id).phases[view.phase]
                    .connectors
                    .iter()
                    .find(|c| c.out_slot == slot)
                    .map_or(Link::Closed, |c| Link::Lane(c.lane))
            }
        }
    }

    #[inline]
    pub fn left(&self, lane: LaneId) -> Option<LaneId> {
        self.lane(lane).left
    }

    #[inline]
    pub fn right(&self, lane: LaneId) -> Option<LaneId> {
        self.lane(lane).right
    }

    /// Lanes with a network-boundary start, i.e. where inflow can be injected.
    pub fn sources(&self) -> impl Iterator<Item = LaneId> + '_ {
        self.lane_ids().filter(|&l| self.lane(l).start == LaneEnd::Boundary)
    }
}
