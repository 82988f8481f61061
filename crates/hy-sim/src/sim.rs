//! The `Simulator` struct and its step loop.

use hy_arz::Q;
use hy_core::{CarId, HyError, IdmParams, LaneId, SimClock, SimConfig, SimRng};
use hy_micro::{Car, Idm};
use hy_network::{Link, Network, PhaseView};

use crate::convert::{mirror_start, sample_cars, splat};
use crate::lookahead::Lookahead;
use crate::macro_lane::Edge;
use crate::micro_lane::sort_cars;
use crate::scheduler::MacroStep;
use crate::{
    Fidelity, FluxCapacitor, Inflow, LaneSnapshot, LaneState, MacroLane, MicroLane, Partition,
    Payload, Scheduler, SignalController, SimError, SimObserver, SimResult, Snapshot,
};

// ── Simulator ─────────────────────────────────────────────────────────────────

/// The hybrid simulation runner.
///
/// Holds every lane payload (indexed by `LaneId`), one signal controller
/// per intersection, the clock, the RNG and the worker partition.  One
/// [`hybrid_step`](Self::hybrid_step) runs:
///
/// 1. **Absorption**: cars that drove onto macro lanes are folded into
///    the first cells.
/// 2. **Macro phase** (parallel with the `parallel` feature): neighbour
///    states are copied into each macro lane's edges, every interface is
///    solved, the global `dt` is reduced from the fastest wave, every
///    lane is updated.  Cars released by flux capacitors are handed to
///    their micro lanes.
/// 3. **Micro phase** (single-threaded): accelerations, lane changes,
///    integration, and lane-end crossings.
/// 4. **Clock** advance, **inflow** injection, **buffer swap**, and
///    **signal** advance.
///
/// Create via [`SimBuilder`][crate::SimBuilder].
pub struct Simulator {
    pub config: SimConfig,

    pub(crate) network:     Network,
    pub(crate) lanes:       Vec<LaneState>,
    pub(crate) signals:     Vec<SignalController>,
    /// Link-resolution view of `signals`, kept in step.
    pub(crate) views:       Vec<PhaseView>,
    pub(crate) clock:       SimClock,
    pub(crate) rng:         SimRng,
    pub(crate) idm:         Idm,
    pub(crate) scheduler:   Scheduler,
    pub(crate) next_car_id: u64,
    pub(crate) cars_exited: u64,
}

impl Simulator {
    /// Assemble a simulator.  Called by the builder once every lane exists.
    pub(crate) fn from_parts(
        config: SimConfig,
        network: Network,
        lanes: Vec<LaneState>,
        scheduler: Scheduler,
    ) -> Self {
        let signals = vec![SignalController::new(); network.intersection_count()];
        let views = signals.iter().map(SignalController::view).collect();
        let mut sim = Self {
            rng: SimRng::new(config.seed),
            idm: Idm::new(config.idm, config.car.length),
            config,
            network,
            lanes,
            signals,
            views,
            clock: SimClock::new(),
            scheduler,
            next_car_id: 0,
            cars_exited: 0,
        };
        sim.scheduler.repartition(&sim.lanes);
        sim
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    #[inline]
    pub fn network(&self) -> &Network {
        &self.network
    }

    #[inline]
    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    #[inline]
    pub fn lanes(&self) -> &[LaneState] {
        &self.lanes
    }

    pub fn lane(&self, id: LaneId) -> SimResult<&LaneState> {
        self.lanes.get(id.index()).ok_or(SimError::UnknownLane(id))
    }

    fn lane_mut(&mut self, id: LaneId) -> SimResult<&mut LaneState> {
        self.lanes.get_mut(id.index()).ok_or(SimError::UnknownLane(id))
    }

    #[inline]
    pub fn signals(&self) -> &[SignalController] {
        &self.signals
    }

    #[inline]
    pub fn partition(&self) -> &Partition {
        self.scheduler.partition()
    }

    /// Cars that have left the network through an exit.
    #[inline]
    pub fn cars_exited(&self) -> u64 {
        self.cars_exited
    }

    pub fn lane_occupied(&self, id: LaneId) -> SimResult<bool> {
        Ok(self.lane(id)?.occupied())
    }

    /// Vehicles on a lane; fractional on macro lanes.
    pub fn lane_vehicles(&self, id: LaneId) -> SimResult<f64> {
        Ok(self.lane(id)?.vehicles(self.config.car.length))
    }

    /// Vehicles on the whole network.
    pub fn total_vehicles(&self) -> f64 {
        self.lanes.iter().map(|l| l.vehicles(self.config.car.length)).sum()
    }

    /// Smallest macro cell width, or the target spacing when no lane is macro.
    pub fn min_cell_width(&self) -> f64 {
        self.lanes
            .iter()
            .filter_map(LaneState::as_macro)
            .map(|m| m.h)
            .reduce(f64::min)
            .unwrap_or(self.config.macro_params.target_cell_spacing)
    }

    // ── Setup ─────────────────────────────────────────────────────────────

    /// Re-mesh every macro lane with cells no wider than `target_cell_spacing`.
    ///
    /// Cell contents are discarded.
    pub fn initialize(&mut self, target_cell_spacing: f64) -> SimResult<()> {
        for lane in &mut self.lanes {
            if let Payload::Macro(_) = lane.payload {
                lane.payload = Payload::Macro(MacroLane::new(
                    lane.id,
                    lane.length,
                    lane.eq,
                    target_cell_spacing,
                )?);
            }
        }
        self.config.macro_params.target_cell_spacing = target_cell_spacing;
        self.scheduler.repartition(&self.lanes);
        log::info!(
            "initialized {} macro lanes, {} cells, min h = {:.2} m",
            self.lanes.iter().filter(|l| l.fidelity() == Fidelity::Macro).count(),
            self.lanes.iter().filter_map(LaneState::as_macro).map(MacroLane::len).sum::<usize>(),
            self.min_cell_width()
        );
        Ok(())
    }

    /// Replace the car-following parameters of every micro lane.
    pub fn micro_initialize(&mut self, params: IdmParams) {
        self.config.idm = params;
        self.idm = Idm::new(params, self.config.car.length);
    }

    /// Overwrite the cells of a macro lane.  Each state is clamped.
    pub fn set_cells(&mut self, id: LaneId, cells: &[Q]) -> SimResult<()> {
        let lane = self.lane_mut(id)?;
        let m = lane
            .as_macro_mut()
            .ok_or(SimError::WrongFidelity { lane: id, expected: Fidelity::Macro })?;
        if cells.len() != m.len() {
            return Err(SimError::CellCountMismatch { lane: id, expected: m.len(), got: cells.len() });
        }
        for (cell, q) in m.cells.iter_mut().zip(cells) {
            *cell = q.fixed();
        }
        Ok(())
    }

    /// Fill a macro lane with density `rho` moving at `u`.
    pub fn set_uniform(&mut self, id: LaneId, rho: f64, u: f64) -> SimResult<()> {
        let lane = self.lane_mut(id)?;
        let eq = lane.eq;
        let m = lane
            .as_macro_mut()
            .ok_or(SimError::WrongFidelity { lane: id, expected: Fidelity::Macro })?;
        m.cells.fill(Q::from_rho_u(rho, u, &eq).fixed());
        Ok(())
    }

    /// Place a car on a micro lane at parametric `position`.
    ///
    /// Fails when another car's axle is within one car length.
    pub fn add_car(&mut self, id: LaneId, position: f64, velocity: f64) -> SimResult<CarId> {
        if !(0.0..1.0).contains(&position) || !(velocity >= 0.0 && velocity.is_finite()) {
            return Err(HyError::Config(format!(
                "car must have position in [0, 1) and non-negative velocity, got {position}, {velocity}"
            ))
            .into());
        }
        let car_length = self.config.car.length;
        let car_id = CarId(self.next_car_id);
        let lane = self.lane_mut(id)?;
        let length = lane.length;
        let m = lane
            .as_micro_mut()
            .ok_or(SimError::WrongFidelity { lane: id, expected: Fidelity::Micro })?;
        let blocked = m
            .current
            .iter()
            .chain(m.next.iter())
            .any(|c| ((c.position - position) * length).abs() < car_length);
        if blocked {
            return Err(SimError::LaneFull { lane: id, position });
        }
        m.insert(Car::new(car_id, position, velocity));
        self.next_car_id += 1;
        Ok(car_id)
    }

    /// Demand, in vehicles per second, entering at a source lane.  A rate of
    /// zero removes it.
    pub fn set_inflow(&mut self, id: LaneId, rate: f64) -> SimResult<()> {
        if !(rate >= 0.0 && rate.is_finite()) {
            return Err(HyError::Config(format!("inflow rate must be non-negative, got {rate}")).into());
        }
        self.lane(id)?;
        if self.network.upstream(id, &self.views) != Link::Boundary {
            return Err(SimError::NotASource(id));
        }
        self.lanes[id.index()].inflow = if rate > 0.0 {
            Some(Inflow::new(rate, self.clock.time + self.rng.exponential() / rate))
        } else {
            None
        };
        Ok(())
    }

    // ── Fidelity swaps ────────────────────────────────────────────────────

    /// Replace a macro lane's density by sampled cars.  Returns the number
    /// of cars on the lane afterwards.
    pub fn convert_to_micro(&mut self, id: LaneId) -> SimResult<usize> {
        let lane = self.lanes.get(id.index()).ok_or(SimError::UnknownLane(id))?;
        let m = lane
            .as_macro()
            .ok_or(SimError::WrongFidelity { lane: id, expected: Fidelity::Macro })?;

        let length = lane.length;
        let mut cars = sample_cars(m, length, &self.config.car, &mut self.rng, &mut self.next_car_id);
        cars.extend(m.inbox.iter().cloned());
        sort_cars(&mut cars);
        let count = cars.len();

        self.lanes[id.index()].payload = Payload::Micro(MicroLane::with_cars(cars));
        self.scheduler.repartition(&self.lanes);
        log::debug!("lane {id} → micro with {count} cars");
        Ok(count)
    }

    /// Replace a micro lane's cars by their density.
    pub fn convert_to_macro(&mut self, id: LaneId) -> SimResult<()> {
        let spacing = self.config.macro_params.target_cell_spacing;
        let geometry = self.config.car;
        let lane = self.lane(id)?;
        let m = lane
            .as_micro()
            .ok_or(SimError::WrongFidelity { lane: id, expected: Fidelity::Micro })?;

        let mut macro_lane = MacroLane::new(id, lane.length, lane.eq, spacing)?;
        let cells = splat(
            m.current.iter().chain(m.next.iter()),
            lane.length,
            macro_lane.h,
            macro_lane.len(),
            &geometry,
            &lane.eq,
        );
        let cars = m.len();
        macro_lane.cells = cells;

        self.lanes[id.index()].payload = Payload::Macro(macro_lane);
        self.scheduler.repartition(&self.lanes);
        log::debug!("lane {id} → macro from {cars} cars");
        Ok(())
    }

    // ── Stepping ──────────────────────────────────────────────────────────

    /// One step of the macro lanes only, at Courant number `cfl`.
    ///
    /// Micro lanes stand still, though cars released into them are
    /// delivered.  Returns the time step taken.
    pub fn step(&mut self, cfl: f64) -> SimResult<f64> {
        check_cfl(cfl)?;
        self.absorb_inboxes();
        let dt = self.macro_substep(cfl);
        self.finish_step(dt);
        Ok(dt)
    }

    /// One step of the micro lanes only, of length `dt`.
    pub fn update(&mut self, dt: f64) -> SimResult<()> {
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(HyError::Config(format!("time step must be positive, got {dt}")).into());
        }
        self.micro_substep(dt);
        self.finish_step(dt);
        Ok(())
    }

    /// One full hybrid step at the configured Courant number.  Returns the
    /// time step taken.
    pub fn hybrid_step(&mut self) -> SimResult<f64> {
        let cfl = self.config.macro_params.cfl;
        check_cfl(cfl)?;
        self.absorb_inboxes();
        let dt = self.macro_substep(cfl);
        self.micro_substep(dt);
        self.finish_step(dt);
        Ok(dt)
    }

    /// Run `n` hybrid steps, reporting to `observer`.
    pub fn run<O: SimObserver>(&mut self, n: u64, observer: &mut O) -> SimResult<()> {
        let interval = self.config.output_interval_steps;
        for _ in 0..n {
            observer.on_step_start(&self.clock);
            let dt = self.hybrid_step()?;
            observer.on_step_end(&self.clock, dt);
            if interval > 0 && self.clock.steps.is_multiple_of(interval) {
                observer.on_snapshot(&self.clock, &self.lanes);
            }
        }
        observer.on_sim_end(&self.clock);
        Ok(())
    }

    // ── Snapshot ──────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> Snapshot {
        let lanes = self
            .lanes
            .iter()
            .map(|lane| match &lane.payload {
                Payload::Macro(m) => LaneSnapshot::Macro {
                    cells:     m.cells.clone(),
                    capacitor: m.capacitor,
                    inbox:     m.inbox.clone(),
                },
                Payload::Micro(m) => {
                    let mut cars: Vec<Car> = m.current.iter().chain(m.next.iter()).cloned().collect();
                    sort_cars(&mut cars);
                    LaneSnapshot::Micro { cars }
                }
            })
            .collect();

        Snapshot {
            clock:       self.clock,
            rng:         self.rng.state(),
            next_car_id: self.next_car_id,
            cars_exited: self.cars_exited,
            lanes,
            inflows:     self.lanes.iter().map(|l| l.inflow.clone()).collect(),
            signals:     self.signals.clone(),
        }
    }

    /// Replace the whole simulation state with `snapshot`.
    ///
    /// The snapshot must come from a simulator over the same network.
    pub fn restore(&mut self, snapshot: &Snapshot) -> SimResult<()> {
        if snapshot.lanes.len() != self.lanes.len() || snapshot.inflows.len() != self.lanes.len() {
            return Err(SimError::SnapshotMismatch(format!(
                "{} lanes in snapshot, {} in network",
                snapshot.lanes.len(),
                self.lanes.len()
            )));
        }
        if snapshot.signals.len() != self.signals.len() {
            return Err(SimError::SnapshotMismatch(format!(
                "{} signals in snapshot, {} in network",
                snapshot.signals.len(),
                self.signals.len()
            )));
        }
        for (i, signal) in snapshot.signals.iter().enumerate() {
            if signal.phase >= self.network.intersections[i].phases.len() {
                return Err(SimError::SnapshotMismatch(format!("intersection {i} has no phase {}", signal.phase)));
            }
        }

        let spacing = self.config.macro_params.target_cell_spacing;
        let mut payloads = Vec::with_capacity(self.lanes.len());
        for (lane, saved) in self.lanes.iter().zip(&snapshot.lanes) {
            payloads.push(match saved {
                LaneSnapshot::Macro { cells, capacitor, inbox } => {
                    let mut m = MacroLane::new(lane.id, lane.length, lane.eq, spacing)?;
                    if cells.len() != m.len() {
                        return Err(SimError::SnapshotMismatch(format!(
                            "lane {} has {} cells, snapshot has {}",
                            lane.id,
                            m.len(),
                            cells.len()
                        )));
                    }
                    m.cells.clone_from(cells);
                    m.capacitor = *capacitor;
                    m.inbox.clone_from(inbox);
                    Payload::Macro(m)
                }
                LaneSnapshot::Micro { cars } => Payload::Micro(MicroLane::with_cars(cars.clone())),
            });
        }

        for ((lane, payload), inflow) in self.lanes.iter_mut().zip(payloads).zip(&snapshot.inflows) {
            lane.payload = payload;
            lane.inflow = inflow.clone();
        }
        self.signals.clone_from(&snapshot.signals);
        self.views = self.signals.iter().map(SignalController::view).collect();
        self.clock = snapshot.clock;
        self.rng = SimRng::from_state(&snapshot.rng);
        self.next_car_id = snapshot.next_car_id;
        self.cars_exited = snapshot.cars_exited;
        self.scheduler.repartition(&self.lanes);
        Ok(())
    }

    // ── Step phases ───────────────────────────────────────────────────────

    pub(crate) fn lookahead(&self) -> Lookahead<'_> {
        Lookahead {
            network:  &self.network,
            views:    &self.views,
            lanes:    &self.lanes,
            params:   self.config.lookahead,
            geometry: self.config.car,
        }
    }

    fn absorb_inboxes(&mut self) {
        let car_length = self.config.car.length;
        for lane in &mut self.lanes {
            if let Some(m) = lane.as_macro_mut() {
                if !m.inbox.is_empty() {
                    m.absorb_inbox(car_length);
                }
            }
        }
    }

    /// Edges, parallel collect/update, capacitor delivery.
    fn macro_substep(&mut self, cfl: f64) -> f64 {
        self.gather_edges();

        let step = MacroStep {
            cfl,
            min_h:      self.min_cell_width(),
            floor:      self.fastest_car(),
            relaxation: self.config.macro_params.relaxation_factor,
            car_length: self.config.car.length,
        };
        let dt = self.scheduler.macro_step(&mut self.lanes, step);

        self.deliver_capacitors();
        dt
    }

    /// Copy neighbour states into every macro lane's edges.
    ///
    /// A micro lane upstream contributes nothing here: its cars enter by
    /// absorption.  A micro lane downstream is seen through a one-cell
    /// mirror of its first `h` metres.
    fn gather_edges(&mut self) {
        let edges: Vec<Option<(Edge, Edge, bool)>> = self
            .lanes
            .iter()
            .map(|lane| lane.as_macro().map(|m| self.edges_of(lane, m)))
            .collect();

        for (lane, edges) in self.lanes.iter_mut().zip(edges) {
            if let (Some(m), Some((up, down, feeds_micro))) = (lane.as_macro_mut(), edges) {
                m.upstream = up;
                m.downstream = down;
                m.feeds_micro = feeds_micro;
            }
        }
    }

    fn edges_of(&self, lane: &LaneState, m: &MacroLane) -> (Edge, Edge, bool) {
        let up = match self.network.upstream(lane.id, &self.views) {
            Link::Lane(u) => {
                let other = &self.lanes[u.index()];
                match &other.payload {
                    Payload::Macro(um) => Edge::Neighbor { q: um.full_q(um.len() - 1), eq: other.eq },
                    Payload::Micro(_) => Edge::Closed,
                }
            }
            Link::Boundary | Link::Closed => Edge::Closed,
        };

        let (down, feeds_micro) = match self.network.downstream(lane.id, &self.views) {
            Link::Boundary => (Edge::Exit, false),
            Link::Closed => (Edge::Closed, false),
            Link::Lane(d) => {
                let other = &self.lanes[d.index()];
                match &other.payload {
                    Payload::Macro(dm) => (Edge::Neighbor { q: dm.full_q(0), eq: other.eq }, false),
                    Payload::Micro(dm) => {
                        let cars = dm.current.iter().chain(dm.next.iter());
                        let q = mirror_start(cars, other.length, m.h, &self.config.car, &other.eq);
                        (Edge::Neighbor { q, eq: other.eq }, true)
                    }
                }
            }
        };
        (up, down, feeds_micro)
    }

    /// Speed of the fastest car, so the shared time step suits micro lanes.
    fn fastest_car(&self) -> f64 {
        self.lanes
            .iter()
            .filter_map(LaneState::as_micro)
            .flat_map(|m| m.current.iter().chain(m.next.iter()))
            .map(|c| c.velocity)
            .fold(0.0, f64::max)
    }

    /// Hand whole cars held by flux capacitors to the lane downstream.
    ///
    /// A micro lane takes a car only while its rearmost car is at least
    /// one jam spacing (`length + s0`) in; cars released together are
    /// queued that far apart, the earliest furthest in but no deeper than
    /// half the lane, and none enters faster than the car ahead of it.
    /// What does not fit stays in the capacitor.  If the lane below has
    /// turned macro, the capacitor is emptied into its first cells.
    fn deliver_capacitors(&mut self) {
        let spacing = self.config.car.length + self.config.idm.min_spacing;
        let car_length = self.config.car.length;

        for idx in 0..self.lanes.len() {
            let Some(mut capacitor) = self.lanes[idx].as_macro().map(|m| m.capacitor) else {
                continue;
            };
            if capacitor.cars <= 0.0 {
                continue;
            }
            let id = self.lanes[idx].id;
            let Some(target) = self.network.downstream(id, &self.views).lane() else {
                continue;
            };
            let length = self.lanes[target.index()].length;

            match &mut self.lanes[target.index()].payload {
                Payload::Micro(micro) => {
                    let ready = capacitor.ready();
                    if ready == 0 {
                        continue;
                    }
                    let mut slot = ((ready - 1) as f64 * spacing).min(0.5 * length);
                    let mut ahead =
                        micro.rearmost().map(|c| (c.distance_along(length), c.velocity));
                    if let Some((x, _)) = ahead {
                        slot = slot.min(x - spacing);
                    }
                    let mut delivered = 0;
                    while slot >= 0.0 {
                        let Some(mut velocity) = capacitor.emit() else {
                            break;
                        };
                        if let Some((_, v)) = ahead {
                            velocity = velocity.min(v);
                        }
                        micro.next.push(Car::new(CarId(self.next_car_id), slot / length, velocity));
                        self.next_car_id += 1;
                        delivered += 1;
                        ahead = Some((slot, velocity));
                        slot -= spacing;
                    }
                    if delivered < ready {
                        log::trace!("lane {id} holds {} cars for lane {target}", ready - delivered);
                    }
                }
                Payload::Macro(below) => {
                    let left = below.deposit(0, capacitor.cars * car_length, capacitor.velocity());
                    let velocity = capacitor.velocity();
                    capacitor = FluxCapacitor::default();
                    capacitor.accumulate(left / car_length, velocity);
                }
            }

            if let Some(m) = self.lanes[idx].as_macro_mut() {
                m.capacitor = capacitor;
            }
        }
    }

    fn finish_step(&mut self, dt: f64) {
        self.clock.advance(dt);
        self.inject_inflows(dt);
        for lane in &mut self.lanes {
            if let Some(m) = lane.as_micro_mut() {
                m.swap();
            }
        }
        self.advance_signals(dt);
    }

    fn inject_inflows(&mut self, dt: f64) {
        let geometry = self.config.car;
        let entry_gap = geometry.length + self.config.idm.min_spacing;
        let now = self.clock.time;

        for lane in &mut self.lanes {
            let Some(inflow) = lane.inflow.as_mut() else {
                continue;
            };
            let speed_limit = lane.eq.u_max;
            match &mut lane.payload {
                Payload::Macro(m) => {
                    inflow.backlog += inflow.rate * dt;
                    let left = m.deposit(0, inflow.backlog * geometry.length, speed_limit);
                    inflow.backlog = left / geometry.length;
                }
                Payload::Micro(m) => {
                    while inflow.next_arrival <= now {
                        inflow.backlog += 1.0;
                        inflow.next_arrival += self.rng.exponential() / inflow.rate;
                    }
                    if inflow.backlog < 1.0 {
                        continue;
                    }
                    let mut velocity = self.idm.params.v_pref.min(speed_limit);
                    if let Some(first) = m.rearmost() {
                        if first.distance_along(lane.length) < entry_gap {
                            continue;
                        }
                        velocity = velocity.min(first.velocity);
                    }
                    m.next.push(Car::new(CarId(self.next_car_id), 0.0, velocity));
                    self.next_car_id += 1;
                    inflow.backlog -= 1.0;
                }
            }
        }
    }

    fn advance_signals(&mut self, dt: f64) {
        let lanes = &self.lanes;
        for (i, signal) in self.signals.iter_mut().enumerate() {
            let spec = &self.network.intersections[i];
            let was_locked = signal.locked;
            if signal.advance(dt, spec, |l| lanes[l.index()].occupied()) {
                log::debug!("intersection {i} → phase {} at {}", signal.phase, self.clock);
            } else if signal.locked && !was_locked {
                log::debug!("intersection {i} locked in phase {} at {}", signal.phase, self.clock);
            }
            self.views[i] = signal.view();
        }
    }
}

fn check_cfl(cfl: f64) -> SimResult<()> {
    if !(cfl > 0.0 && cfl <= 1.0) {
        return Err(HyError::Config(format!("cfl must lie in (0, 1], got {cfl}")).into());
    }
    Ok(())
}
