//! SQLite output backend (feature `sqlite`).
//!
//! Creates a single `output.db` file in the output directory with two
//! tables: `lane_samples` and `step_summaries`.

use std::path::Path;

use rusqlite::Connection;

use crate::row::fidelity_label;
use crate::writer::OutputWriter;
use crate::{LaneSampleRow, OutputResult, StepSummaryRow};

/// Writes simulation output to an SQLite database.
pub struct SqliteWriter {
    conn:     Connection,
    finished: bool,
}

impl SqliteWriter {
    /// Open (or create) `output.db` in `dir` and initialise the schema.
    pub fn new(dir: &Path) -> OutputResult<Self> {
        std::fs::create_dir_all(dir)?;
        let conn = Connection::open(dir.join("output.db"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = NORMAL;
             CREATE TABLE IF NOT EXISTS lane_samples (
                 step       INTEGER NOT NULL,
                 time       REAL    NOT NULL,
                 lane       INTEGER NOT NULL,
                 fidelity   TEXT    NOT NULL,
                 vehicles   REAL    NOT NULL,
                 density    REAL    NOT NULL,
                 mean_speed REAL    NOT NULL
             );
             CREATE TABLE IF NOT EXISTS step_summaries (
                 step INTEGER PRIMARY KEY,
                 time REAL    NOT NULL,
                 dt   REAL    NOT NULL
             );",
        )?;

        Ok(Self { conn, finished: false })
    }
}

impl OutputWriter for SqliteWriter {
    fn write_lane_samples(&mut self, rows: &[LaneSampleRow]) -> OutputResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO lane_samples \
                 (step, time, lane, fidelity, vehicles, density, mean_speed) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for row in rows {
                stmt.execute(rusqlite::params![
                    row.step,
                    row.time,
                    row.lane,
                    fidelity_label(row.fidelity),
                    row.vehicles,
                    row.density,
                    row.mean_speed,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn write_step_summary(&mut self, row: &StepSummaryRow) -> OutputResult<()> {
        self.conn.execute(
            "INSERT INTO step_summaries (step, time, dt) VALUES (?1, ?2, ?3)",
            rusqlite::params![row.step, row.time, row.dt],
        )?;
        Ok(())
    }

    fn finish(&mut self) -> OutputResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}
