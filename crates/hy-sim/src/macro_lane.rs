//! Finite-volume lane payload.
//!
//! A macro lane of length `L` holds `N = ⌈L / h_target⌉` cells of width
//! `h = L / N` and `N + 1` interface solutions, the first and last of which
//! sit on the lane ends.  A step is two calls, separated by the global
//! time-step reduction:
//!
//! ```text
//! collect_riemann()   solve every interface, report the fastest wave
//! update(dt)          q_i ← q_i − dt/h (A⁺Δq_{i−½} + A⁻Δq_{i+½}), relax y, fix
//! ```
//!
//! Both only touch this lane.  Whatever the lane needs to know about its
//! neighbours is copied into its [`Edge`]s beforehand.

use serde::{Deserialize, Serialize};

use hy_arz::{EPSILON, Equilibrium, FullQ, Q, RiemannSolution};
use hy_core::LaneId;
use hy_micro::Car;

use crate::{SimError, SimResult};

/// A macro cell denser than this is occupied.
pub const OCCUPIED_DENSITY: f64 = 3.0 * EPSILON;

// ── Edge ──────────────────────────────────────────────────────────────────────

/// Boundary condition at one lane end for the current step.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Edge {
    /// Nothing crosses.  Starvation at the start, a stop at the end.
    #[default]
    Closed,
    /// Network exit: traffic leaves into empty road.
    Exit,
    /// State just across the end, from a macro neighbour's end cell or a
    /// micro neighbour's mirror.
    Neighbor { q: FullQ, eq: Equilibrium },
}

// ── FluxCapacitor ─────────────────────────────────────────────────────────────

/// Accumulates the vehicles leaving a macro lane into a micro lane until a
/// whole car is available and the micro lane has room for it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FluxCapacitor {
    /// Fractional vehicles accumulated.
    pub cars:     f64,
    /// `Σ cars · velocity` over the accumulated fraction.
    pub momentum: f64,
}

impl FluxCapacitor {
    #[inline]
    pub fn accumulate(&mut self, cars: f64, velocity: f64) {
        self.cars += cars;
        self.momentum += cars * velocity;
    }

    /// Release one car if a whole one has accumulated, returning its
    /// velocity (the mean of what went in).
    pub fn emit(&mut self) -> Option<f64> {
        if self.cars < 1.0 - EPSILON {
            return None;
        }
        let velocity = self.momentum / self.cars;
        self.cars -= 1.0;
        self.momentum = velocity * self.cars.max(0.0);
        Some(velocity)
    }

    /// Number of whole cars [`emit`](Self::emit) would release.
    pub fn ready(&self) -> usize {
        let mut rest = *self;
        let mut n = 0;
        while rest.emit().is_some() {
            n += 1;
        }
        n
    }

    /// Mean velocity of the accumulated fraction.
    #[inline]
    pub fn velocity(&self) -> f64 {
        if self.cars > 0.0 { self.momentum / self.cars } else { 0.0 }
    }
}

// ── MacroLane ─────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct MacroLane {
    pub eq:        Equilibrium,
    /// Cell width in metres.
    pub h:         f64,
    pub cells:     Vec<Q>,
    pub capacitor: FluxCapacitor,
    /// Cars that drove in from a micro lane and wait to be absorbed.
    pub inbox:     Vec<Car>,

    rs:                     Vec<RiemannSolution>,
    pub(crate) upstream:    Edge,
    pub(crate) downstream:  Edge,
    /// Downstream neighbour is a micro lane; the capacitor runs.
    pub(crate) feeds_micro: bool,
}

impl MacroLane {
    /// Empty lane of `length` metres with cells no wider than `target_spacing`.
    pub fn new(id: LaneId, length: f64, eq: Equilibrium, target_spacing: f64) -> SimResult<Self> {
        let zero = || SimError::ZeroCells { lane: id, length, spacing: target_spacing };
        if !(length > 0.0 && length.is_finite() && target_spacing > 0.0) {
            return Err(zero());
        }
        let n = (length / target_spacing).ceil() as usize;
        if n == 0 {
            return Err(zero());
        }

        let mut cells = Vec::new();
        cells
            .try_reserve_exact(n)
            .map_err(|_| SimError::Allocation { lane: id, cells: n })?;
        cells.resize(n, Q::ZERO);
        let mut rs = Vec::new();
        rs.try_reserve_exact(n + 1)
            .map_err(|_| SimError::Allocation { lane: id, cells: n + 1 })?;
        rs.resize(n + 1, RiemannSolution::default());

        Ok(Self {
            eq,
            h: length / n as f64,
            cells,
            capacitor: FluxCapacitor::default(),
            inbox: Vec::new(),
            rs,
            upstream: Edge::Closed,
            downstream: Edge::Closed,
            feeds_micro: false,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Lane length in metres.
    #[inline]
    pub fn length(&self) -> f64 {
        self.h * self.cells.len() as f64
    }

    #[inline]
    pub fn full_q(&self, i: usize) -> FullQ {
        FullQ::from_q(self.cells[i], &self.eq)
    }

    /// Interface solutions from the last `collect_riemann`.
    #[inline]
    pub fn riemann_solutions(&self) -> &[RiemannSolution] {
        &self.rs
    }

    /// Cell containing `x` metres from the lane start.
    #[inline]
    pub fn which_cell(&self, x: f64) -> usize {
        ((x.max(0.0) / self.h) as usize).min(self.cells.len() - 1)
    }

    /// Solve every interface and return the fastest wave speed on the lane.
    pub fn collect_riemann(&mut self) -> f64 {
        let n = self.cells.len();

        let first = self.full_q(0);
        self.rs[0] = match self.upstream {
            Edge::Neighbor { q, eq } => RiemannSolution::between(&q, &first, &eq, &self.eq),
            Edge::Closed | Edge::Exit => RiemannSolution::starvation(&first),
        };

        let mut left = first;
        for i in 1..n {
            let right = self.full_q(i);
            self.rs[i] = RiemannSolution::riemann(&left, &right, &self.eq);
            left = right;
        }

        self.rs[n] = match self.downstream {
            Edge::Closed => RiemannSolution::stop(&left, &self.eq),
            Edge::Exit => RiemannSolution::riemann(&left, &FullQ::vacuum(&self.eq), &self.eq),
            Edge::Neighbor { q, eq } => RiemannSolution::between(&left, &q, &self.eq, &eq),
        };

        debug_assert!(self.rs.iter().all(RiemannSolution::check), "non-finite interface solution");
        self.rs.iter().map(RiemannSolution::max_speed).fold(0.0, f64::max)
    }

    /// Advance the cells by `dt` using the solutions from `collect_riemann`.
    pub fn update(&mut self, dt: f64, relaxation: f64, car_length: f64) {
        let n = self.cells.len();
        let coef = dt / self.h;

        if self.feeds_micro {
            let last = self.full_q(n - 1);
            let out = dt * (last.flux_0() + self.rs[n].left_fluctuation.rho);
            let velocity = match self.downstream {
                Edge::Neighbor { eq, .. } => {
                    let q_0 = self.rs[n].q_0.fixed();
                    eq.u(q_0.rho, q_0.y)
                }
                _ => last.u,
            };
            self.capacitor.accumulate(out.max(0.0) / car_length, velocity);
        }

        for i in 0..n {
            let fluctuation = self.rs[i].right_fluctuation + self.rs[i + 1].left_fluctuation;
            let cell = &mut self.cells[i];
            *cell -= fluctuation * coef;
            cell.y -= cell.y * coef * relaxation;
            cell.fix();
        }
    }

    /// `Σ ρ h`: metres of road covered by vehicles.
    pub fn mass(&self) -> f64 {
        self.cells.iter().map(|q| q.rho).sum::<f64>() * self.h
    }

    pub fn occupied(&self) -> bool {
        !self.inbox.is_empty() || self.cells.iter().any(|q| q.rho > OCCUPIED_DENSITY)
    }

    /// Room left before every cell from `start` on is at jam density, in
    /// metres of vehicle.
    pub fn room(&self, start: usize) -> f64 {
        self.cells[start..]
            .iter()
            .map(|q| (1.0 - EPSILON - q.rho).max(0.0))
            .sum::<f64>()
            * self.h
    }

    /// Add `amount` metres of vehicles moving at `velocity`, filling cells
    /// from `start` downstream.  Returns what did not fit.
    ///
    /// An amount too thin to survive `fix` in an empty cell is held back.
    pub fn deposit(&mut self, start: usize, amount: f64, velocity: f64) -> f64 {
        let mut remaining = amount;
        for cell in &mut self.cells[start..] {
            if remaining <= 0.0 {
                break;
            }
            let added = remaining.min((1.0 - EPSILON - cell.rho).max(0.0) * self.h);
            if added <= 0.0 {
                continue;
            }
            if cell.rho <= EPSILON && added / self.h <= EPSILON {
                break;
            }
            let old_u = self.eq.u(cell.rho, cell.y);
            let rho = cell.rho + added / self.h;
            let u = (cell.rho * old_u + added / self.h * velocity) / rho;
            *cell = Q::from_rho_u(rho, u, &self.eq).fixed();
            remaining -= added;
        }
        remaining
    }

    /// Fold waiting cars into the cells.  A car stays in the inbox while
    /// the lane has no room for it.  Returns the number absorbed.
    pub fn absorb_inbox(&mut self, car_length: f64) -> usize {
        let waiting = std::mem::take(&mut self.inbox);
        let mut absorbed = 0;
        for car in waiting {
            let cell = self.which_cell(car.distance_along(self.length()));
            if self.room(cell) >= car_length {
                let left = self.deposit(cell, car_length, car.velocity);
                debug_assert!(left < 1e-9, "absorption lost {left} m");
                absorbed += 1;
            } else {
                self.inbox.push(car);
            }
        }
        absorbed
    }

    /// First point, measured from the lane start, by which one vehicle's
    /// worth of density has accumulated, with the density-weighted velocity
    /// of that vehicle.
    pub fn virtual_leader(&self, car_length: f64) -> Option<(f64, f64)> {
        let mut cars = 0.0;
        let mut momentum = 0.0;
        for (i, q) in self.cells.iter().enumerate() {
            if q.rho <= 0.0 {
                continue;
            }
            let u = self.eq.u(q.rho, q.y);
            let here = q.rho * self.h / car_length;
            if cars + here >= 1.0 {
                let need = 1.0 - cars;
                let x = (i as f64 + need / here) * self.h;
                return Some((x, momentum + need * u));
            }
            cars += here;
            momentum += here * u;
        }
        None
    }
}
