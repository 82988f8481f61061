//! Fluent builder for constructing a [`Simulator`].

use hy_arz::Equilibrium;
use hy_core::{LaneId, SimConfig};
use hy_network::Network;

use crate::{Fidelity, LaneState, MacroLane, MicroLane, Payload, Scheduler, SimError, SimResult, Simulator};

/// Fluent builder for [`Simulator`].
///
/// # Required inputs
///
/// - [`SimConfig`]: solver, car and lookahead parameters, seed, workers
/// - [`Network`]: from [`hy_network::NetworkBuilder`]
///
/// # Optional inputs (have defaults)
///
/// | Method                       | Default                  |
/// |------------------------------|--------------------------|
/// | `.default_fidelity(f)`       | `Fidelity::Macro`        |
/// | `.fidelity(lane, f)`         | the default fidelity     |
/// | `.uniform(lane, rho, u)`     | empty road               |
/// | `.inflow(lane, rate)`        | no inflow                |
///
/// # Example
///
/// ```rust,ignore
/// let mut sim = SimBuilder::new(config, network)
///     .fidelity(side_street, Fidelity::Micro)
///     .inflow(main_road, 0.4)
///     .build()?;
/// sim.run(3_600, &mut NoopObserver)?;
/// ```
pub struct SimBuilder {
    config:           SimConfig,
    network:          Network,
    default_fidelity: Fidelity,
    fidelity:         Vec<(LaneId, Fidelity)>,
    uniform:          Vec<(LaneId, f64, f64)>,
    inflows:          Vec<(LaneId, f64)>,
}

impl SimBuilder {
    pub fn new(config: SimConfig, network: Network) -> Self {
        Self {
            config,
            network,
            default_fidelity: Fidelity::Macro,
            fidelity: Vec::new(),
            uniform: Vec::new(),
            inflows: Vec::new(),
        }
    }

    /// Fidelity of every lane not named by [`fidelity`](Self::fidelity).
    pub fn default_fidelity(mut self, fidelity: Fidelity) -> Self {
        self.default_fidelity = fidelity;
        self
    }

    pub fn fidelity(mut self, lane: LaneId, fidelity: Fidelity) -> Self {
        self.fidelity.push((lane, fidelity));
        self
    }

    /// Start a macro lane at density `rho` moving at `u`.
    pub fn uniform(mut self, lane: LaneId, rho: f64, u: f64) -> Self {
        self.uniform.push((lane, rho, u));
        self
    }

    /// Vehicles per second entering at a source lane.
    pub fn inflow(mut self, lane: LaneId, rate: f64) -> Self {
        self.inflows.push((lane, rate));
        self
    }

    /// Validate inputs, mesh the macro lanes, and return a ready-to-run
    /// [`Simulator`].
    pub fn build(self) -> SimResult<Simulator> {
        self.config.validate()?;

        let mut fidelity = vec![self.default_fidelity; self.network.lane_count()];
        for &(lane, f) in &self.fidelity {
            *fidelity.get_mut(lane.index()).ok_or(SimError::UnknownLane(lane))? = f;
        }

        // ── Lane payloads ─────────────────────────────────────────────────
        let gamma = self.config.macro_params.gamma;
        let spacing = self.config.macro_params.target_cell_spacing;
        let mut lanes = Vec::with_capacity(self.network.lane_count());
        for (id, f) in self.network.lane_ids().zip(fidelity) {
            let spec = self.network.lane(id);
            let eq = Equilibrium::new(spec.speed_limit, gamma);
            let payload = match f {
                Fidelity::Macro => Payload::Macro(MacroLane::new(id, spec.length, eq, spacing)?),
                Fidelity::Micro => Payload::Micro(MicroLane::new()),
            };
            lanes.push(LaneState { id, length: spec.length, eq, payload, inflow: None });
        }

        let workers = self.config.num_threads.unwrap_or_else(default_workers);
        let scheduler = Scheduler::new(workers)?;
        let mut sim = Simulator::from_parts(self.config, self.network, lanes, scheduler);

        for (lane, rho, u) in self.uniform {
            sim.set_uniform(lane, rho, u)?;
        }
        for (lane, rate) in self.inflows {
            sim.set_inflow(lane, rate)?;
        }

        log::info!(
            "simulator ready: {} lanes ({} macro, {} cells), {} intersections, {} workers, min h = {:.2} m",
            sim.lanes().len(),
            sim.partition().lane_count(),
            sim.partition().loads.iter().sum::<usize>(),
            sim.network().intersection_count(),
            workers,
            sim.min_cell_width()
        );
        Ok(sim)
    }
}

#[cfg(feature = "parallel")]
fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

#[cfg(not(feature = "parallel"))]
fn default_workers() -> usize {
    1
}
