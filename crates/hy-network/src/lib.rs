//! `hy-network` — lane/intersection topology consumed by the simulator.
//!
//! The network is immutable once built.  Which connector lanes are live
//! depends on the signal state, which the simulator owns; it is passed in
//! as a slice of [`PhaseView`]s whenever up- or downstream neighbours are
//! resolved.
//!
//! # Crate layout
//!
//! | Module      | Contents                                                     |
//! |-------------|--------------------------------------------------------------|
//! | [`network`] | `Network`, `LaneSpec`, `IntersectionSpec`, `Link` resolution |
//! | [`builder`] | `NetworkBuilder`                                             |
//! | [`error`]   | `NetworkError`, `NetworkResult<T>`                           |

pub mod builder;
pub mod error;
pub mod network;


pub use builder::NetworkBuilder;
pub use error::{NetworkError, NetworkResult};
pub use network::{Connector, ConnectorOf, IntersectionSpec, LaneEnd, LaneSpec, Link, Network, Phase, PhaseView};
