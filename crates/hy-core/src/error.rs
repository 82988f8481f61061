//! Framework error type.
//!
//! Sub-crates define their own error enums and wrap `HyError` as one variant
//! where they need configuration or I/O failures from this crate.

use thiserror::Error;

/// The top-level error type for `hy-core`.
#[derive(Debug, Error)]
pub enum HyError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shorthand result type for `hy-core`.
pub type HyResult<T> = Result<T, HyError>;
