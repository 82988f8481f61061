//! corridor — a signalised arterial simulated at mixed fidelity.
//!
//! The approaches and the expressway run as finite-volume lanes; the lanes
//! right around the signal run car by car.  After a warm-up the expressway
//! is switched to cars as well, which exercises the macro → micro handoff
//! under load.
//!
//! Usage: `corridor [config.json]`.  Set `RUST_LOG=debug` to watch signal
//! phases and repartitioning.

mod network;

use std::path::Path;
use std::time::Instant;

use anyhow::Result;

use hy_core::{SimClock, SimConfig};
use hy_output::observer::sample_lane;
use hy_output::row::fidelity_label;
use hy_output::{CsvWriter, OutputWriter, SimOutputObserver};
use hy_sim::{Fidelity, LaneState, NoopObserver, SimBuilder, SimObserver};

use network::build_corridor;

// ── Constants ─────────────────────────────────────────────────────────────────

const SEED:                  u64 = 7;
const WARMUP_STEPS:          u64 = 200;
const MAIN_STEPS:            u64 = 1_500;
const OUTPUT_INTERVAL_STEPS: u64 = 10;
const OUTPUT_DIR:            &str = "output/corridor";

/// Vehicles per second entering each approach.
const ARTERIAL_DEMAND: f64 = 0.35;
const SIDE_DEMAND:     f64 = 0.12;

// ── Observer wrapper to count rows ────────────────────────────────────────────

struct CountingObserver<W: OutputWriter> {
    inner:        SimOutputObserver<W>,
    sample_rows:  usize,
    summary_rows: usize,
    slowest_dt:   f64,
}

impl<W: OutputWriter> CountingObserver<W> {
    fn new(inner: SimOutputObserver<W>) -> Self {
        Self { inner, sample_rows: 0, summary_rows: 0, slowest_dt: f64::INFINITY }
    }
}

impl<W: OutputWriter> SimObserver for CountingObserver<W> {
    fn on_step_end(&mut self, clock: &SimClock, dt: f64) {
        self.summary_rows += 1;
        self.slowest_dt = self.slowest_dt.min(dt);
        self.inner.on_step_end(clock, dt);
    }

    fn on_snapshot(&mut self, clock: &SimClock, lanes: &[LaneState]) {
        self.sample_rows += lanes.len();
        self.inner.on_snapshot(clock, lanes);
    }

    fn on_sim_end(&mut self, clock: &SimClock) {
        self.inner.on_sim_end(clock);
    }
}

// ── main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    env_logger::init();

    // 1. Configuration: a JSON file if given, defaults otherwise.
    let mut config = match std::env::args().nth(1) {
        Some(path) => SimConfig::from_path(Path::new(&path))?,
        None => SimConfig::default(),
    };
    config.seed = SEED;
    config.output_interval_steps = OUTPUT_INTERVAL_STEPS;
    config.macro_params.target_cell_spacing = 25.0;
    config.macro_params.cfl = 0.9;

    println!("=== corridor — hybrid traffic simulation ===");
    println!("Seed: {SEED}  |  Warm-up: {WARMUP_STEPS} steps  |  Run: {MAIN_STEPS} steps");
    println!();

    // 2. Network and simulator.
    let corridor = build_corridor()?;
    println!(
        "Network: {} lanes, {} intersection(s)",
        corridor.network.lane_count(),
        corridor.network.intersection_count()
    );

    let mut builder = SimBuilder::new(config.clone(), corridor.network)
        .fidelity(corridor.side_in, Fidelity::Micro)
        .fidelity(corridor.east_a, Fidelity::Micro)
        .uniform(corridor.east_b, 0.08, 20.0)
        .inflow(corridor.arterial_in, ARTERIAL_DEMAND)
        .inflow(corridor.side_in, SIDE_DEMAND);
    for connector in corridor.connectors {
        builder = builder.fidelity(connector, Fidelity::Micro);
    }
    let mut sim = builder.build()?;

    // 3. Warm up, then hand the expressway to the car-following model.
    sim.run(WARMUP_STEPS, &mut NoopObserver)?;
    let cars = sim.convert_to_micro(corridor.east_b)?;
    let removed = sim.settle(0.1);
    println!(
        "Warm-up done at {}: expressway now {cars} cars ({removed} removed while settling)",
        sim.clock()
    );

    // 4. Output.
    let writer = CsvWriter::new(Path::new(OUTPUT_DIR))?;
    let mut obs = CountingObserver::new(SimOutputObserver::new(writer, &config));

    // 5. Run.
    let t0 = Instant::now();
    sim.run(MAIN_STEPS, &mut obs)?;
    let elapsed = t0.elapsed();

    if let Some(e) = obs.inner.take_error() {
        eprintln!("output error: {e}");
    }

    std::fs::write(Path::new(OUTPUT_DIR).join("snapshot.json"), sim.snapshot().to_json()?)?;

    // 6. Summary.
    println!("Simulation complete in {:.3} s, reached {}", elapsed.as_secs_f64(), sim.clock());
    println!("  lane_samples.csv   : {} rows", obs.sample_rows);
    println!("  step_summaries.csv : {} rows (smallest dt {:.3} s)", obs.summary_rows, obs.slowest_dt);
    println!("  cars exited        : {}", sim.cars_exited());
    println!("  vehicles on network: {:.1}", sim.total_vehicles());
    println!();

    let names = [
        (corridor.arterial_in, "arterial_in"),
        (corridor.side_in, "side_in"),
        (corridor.east_a, "east_a"),
        (corridor.east_b, "east_b"),
        (corridor.north_out, "north_out"),
    ];
    println!("{:<12} {:<8} {:>9} {:>10}", "Lane", "Model", "Vehicles", "Speed m/s");
    println!("{}", "-".repeat(42));
    for (id, name) in names {
        let row = sample_lane(sim.clock(), sim.lane(id)?, config.car.length);
        println!(
            "{:<12} {:<8} {:>9.1} {:>10.1}",
            name,
            fidelity_label(row.fidelity),
            row.vehicles,
            row.mean_speed,
        );
    }

    Ok(())
}
