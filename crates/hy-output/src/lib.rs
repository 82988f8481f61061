//! `hy-output` — simulation output writers for the hybrid traffic engine.
//!
//! Two backends are provided:
//!
//! | Feature   | Backend | Files created                              |
//! |-----------|---------|--------------------------------------------|
//! | *(none)*  | CSV     | `lane_samples.csv`, `step_summaries.csv`   |
//! | `sqlite`  | SQLite  | `output.db`                                |
//!
//! Both implement [`OutputWriter`] and are driven by [`SimOutputObserver`],
//! which implements `hy_sim::SimObserver`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use hy_output::{CsvWriter, SimOutputObserver};
//!
//! let writer = CsvWriter::new(Path::new("./output"))?;
//! let mut obs = SimOutputObserver::new(writer, &sim.config);
//! sim.run(1_000, &mut obs)?;
//! if let Some(e) = obs.take_error() {
//!     eprintln!("output error: {e}");
//! }
//! ```

pub mod csv;
pub mod error;
pub mod observer;
pub mod row;
pub mod writer;

#[cfg(feature = "sqlite")]
pub mod sqlite;


pub use csv::CsvWriter;
pub use error::{OutputError, OutputResult};
pub use observer::SimOutputObserver;
pub use row::{LaneSampleRow, StepSummaryRow};
pub use writer::OutputWriter;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteWriter;
