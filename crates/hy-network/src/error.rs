//! Network-construction error type.

use thiserror::Error;

use hy_core::{IntersectionId, LaneId};

/// Errors produced while building a [`Network`](crate::Network).
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("lane {0} not found in network")]
    UnknownLane(LaneId),

    #[error("intersection {0} not found in network")]
    UnknownIntersection(IntersectionId),

    #[error("lane {lane} has invalid length {length}")]
    BadLength { lane: LaneId, length: f64 },

    #[error("lane {lane} has invalid speed limit {speed_limit}")]
    BadSpeedLimit { lane: LaneId, speed_limit: f64 },

    #[error("{intersection} has no {side} slot {slot}")]
    BadSlot { intersection: IntersectionId, side: &'static str, slot: usize },

    #[error("{intersection} has no phase {phase}")]
    UnknownPhase { intersection: IntersectionId, phase: usize },

    #[error("{0} has no phases")]
    NoPhases(IntersectionId),

    #[error("{intersection} phase {phase} has invalid duration {duration}")]
    BadDuration { intersection: IntersectionId, phase: usize, duration: f64 },

    #[error("{intersection} phase {phase} uses {side} slot {slot} more than once")]
    ConflictingConnector {
        intersection: IntersectionId,
        phase:        usize,
        side:         &'static str,
        slot:         usize,
    },

    #[error("lane {0} is already attached at that end")]
    AlreadyAttached(LaneId),
}

pub type NetworkResult<T> = Result<T, NetworkError>;
