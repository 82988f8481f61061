use thiserror::Error;

use hy_core::{HyError, LaneId};
use hy_network::NetworkError;

use crate::Fidelity;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("simulation configuration error: {0}")]
    Config(#[from] HyError),

    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("lane {0} not found")]
    UnknownLane(LaneId),

    #[error("lane {lane} is not a {expected:?} lane")]
    WrongFidelity { lane: LaneId, expected: Fidelity },

    #[error("lane {lane} has no room for a car at {position}")]
    LaneFull { lane: LaneId, position: f64 },

    #[error("lane {lane} would have no cells (length {length}, spacing {spacing})")]
    ZeroCells { lane: LaneId, length: f64, spacing: f64 },

    #[error("cannot allocate {cells} cells for lane {lane}")]
    Allocation { lane: LaneId, cells: usize },

    #[error("lane {lane} expects {expected} cells, got {got}")]
    CellCountMismatch { lane: LaneId, expected: usize, got: usize },

    #[error("lane {0} is not a network source")]
    NotASource(LaneId),

    #[error("snapshot does not match this network: {0}")]
    SnapshotMismatch(String),

    #[error("snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("thread pool error: {0}")]
    ThreadPool(String),
}

pub type SimResult<T> = Result<T, SimError>;
