//! CSV output backend.
//!
//! Creates two files in the configured output directory:
//! - `lane_samples.csv`
//! - `step_summaries.csv`

use std::fs::File;
use std::path::Path;

use csv::Writer;

use crate::row::fidelity_label;
use crate::writer::OutputWriter;
use crate::{LaneSampleRow, OutputResult, StepSummaryRow};

pub const LANE_SAMPLE_HEADER: [&str; 7] =
    ["step", "time", "lane", "fidelity", "vehicles", "density", "mean_speed"];
pub const STEP_SUMMARY_HEADER: [&str; 3] = ["step", "time", "dt"];

/// Writes simulation output to two CSV files.
pub struct CsvWriter {
    samples:   Writer<File>,
    summaries: Writer<File>,
    finished:  bool,
}

impl CsvWriter {
    /// Create the two CSV files in `dir`, creating `dir` if needed, and write
    /// the header rows.
    pub fn new(dir: &Path) -> OutputResult<Self> {
        std::fs::create_dir_all(dir)?;

        let mut samples = Writer::from_path(dir.join("lane_samples.csv"))?;
        samples.write_record(LANE_SAMPLE_HEADER)?;

        let mut summaries = Writer::from_path(dir.join("step_summaries.csv"))?;
        summaries.write_record(STEP_SUMMARY_HEADER)?;

        Ok(Self { samples, summaries, finished: false })
    }
}

impl OutputWriter for CsvWriter {
    fn write_lane_samples(&mut self, rows: &[LaneSampleRow]) -> OutputResult<()> {
        for row in rows {
            self.samples.write_record(&[
                row.step.to_string(),
                row.time.to_string(),
                row.lane.to_string(),
                fidelity_label(row.fidelity).to_owned(),
                row.vehicles.to_string(),
                row.density.to_string(),
                row.mean_speed.to_string(),
            ])?;
        }
        Ok(())
    }

    fn write_step_summary(&mut self, row: &StepSummaryRow) -> OutputResult<()> {
        self.summaries
            .write_record(&[row.step.to_string(), row.time.to_string(), row.dt.to_string()])?;
        Ok(())
    }

    fn finish(&mut self) -> OutputResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.samples.flush()?;
        self.summaries.flush()?;
        Ok(())
    }
}
