//! `SimOutputObserver<W>` — bridges `SimObserver` to an `OutputWriter`.

use hy_core::{SimClock, SimConfig};
use hy_sim::{LaneState, Payload, SimObserver};

use crate::row::{LaneSampleRow, StepSummaryRow};
use crate::writer::OutputWriter;
use crate::{OutputError, OutputResult};

/// A [`SimObserver`] that writes lane samples and step summaries to any
/// [`OutputWriter`] backend.
///
/// Errors from the writer are stored internally because `SimObserver`
/// methods have no return value.  After `sim.run()` returns, check for
/// errors with [`take_error`][Self::take_error].
pub struct SimOutputObserver<W: OutputWriter> {
    writer:     W,
    car_length: f64,
    last_error: Option<OutputError>,
}

impl<W: OutputWriter> SimOutputObserver<W> {
    /// Create an observer backed by `writer`; `config` supplies the car
    /// length that converts density to vehicles.
    pub fn new(writer: W, config: &SimConfig) -> Self {
        Self { writer, car_length: config.car.length, last_error: None }
    }

    /// Take the stored write error (if any) after `sim.run()` returns.
    pub fn take_error(&mut self) -> Option<OutputError> {
        self.last_error.take()
    }

    /// Unwrap the inner writer.
    pub fn into_writer(self) -> W {
        self.writer
    }

    fn store_err(&mut self, result: OutputResult<()>) {
        if let Err(e) = result {
            // Keep only the first error.
            if self.last_error.is_none() {
                self.last_error = Some(e);
            }
        }
    }
}

/// Aggregate one lane into a sample row.
pub fn sample_lane(clock: &SimClock, lane: &LaneState, car_length: f64) -> LaneSampleRow {
    let vehicles = lane.vehicles(car_length);
    let mean_speed = match &lane.payload {
        Payload::Macro(m) => {
            let (mass, momentum) = m.cells.iter().fold((0.0, 0.0), |(mass, momentum), q| {
                (mass + q.rho, momentum + q.rho * m.eq.u(q.rho, q.y))
            });
            if mass > 0.0 { momentum / mass } else { lane.speed_limit() }
        }
        Payload::Micro(m) if !m.current.is_empty() => {
            m.current.iter().map(|c| c.velocity).sum::<f64>() / m.current.len() as f64
        }
        Payload::Micro(_) => lane.speed_limit(),
    };
    LaneSampleRow {
        step: clock.steps,
        time: clock.time,
        lane: lane.id.0,
        fidelity: lane.fidelity(),
        vehicles,
        density: (vehicles * car_length / lane.length).min(1.0),
        mean_speed,
    }
}

impl<W: OutputWriter> SimObserver for SimOutputObserver<W> {
    fn on_step_end(&mut self, clock: &SimClock, dt: f64) {
        let row = StepSummaryRow { step: clock.steps, time: clock.time, dt };
        let result = self.writer.write_step_summary(&row);
        self.store_err(result);
    }

    fn on_snapshot(&mut self, clock: &SimClock, lanes: &[LaneState]) {
        let rows: Vec<LaneSampleRow> =
            lanes.iter().map(|lane| sample_lane(clock, lane, self.car_length)).collect();

        if !rows.is_empty() {
            let result = self.writer.write_lane_samples(&rows);
            self.store_err(result);
        }
    }

    fn on_sim_end(&mut self, _clock: &SimClock) {
        let result = self.writer.finish();
        self.store_err(result);
    }
}
