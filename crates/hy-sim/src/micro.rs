//! The single-threaded micro phase.
//!
//! ```text
//! for each sub-step of at most MAX_MICRO_DT:
//!   accelerations   IDM behind the same-lane leader, the downstream
//!                   lookahead, and cars still merging out of the lane
//!   lane changes    decided on the pre-move state, applied one by one
//!   integrate       explicit Euler, lane-change progress
//!   move            cars past the lane end go downstream, into a macro
//!                   inbox, or out of the network
//! ```

use hy_core::{CarId, LaneChangeParams, LaneId};
use hy_micro::{Car, CarFollowing, Idm, LaneChange, LaneChangeDecision, Leader};
use hy_network::Link;

use crate::lookahead::Lookahead;
use crate::{LaneState, MicroLane, Payload, Simulator};

/// Longest time step a micro lane is integrated with; longer steps are
/// split.
pub const MAX_MICRO_DT: f64 = 0.25;

/// Largest parametric position strictly before the lane end.
const LANE_END: f64 = 1.0 - f64::EPSILON / 2.0;

// ── settle ────────────────────────────────────────────────────────────────────

/// `settle` stops iterating a car below this acceleration magnitude, m/s².
const SETTLE_EPSILON: f64 = 1.0;
/// A car whose acceleration changes by less than this between iterations
/// while still above `SETTLE_EPSILON` cannot settle.
const SETTLE_DELTA: f64 = 0.01;
const SETTLE_MAX_ITER: usize = 1_000;
const SETTLE_MAX_PASSES: usize = 100;

impl Simulator {
    pub(crate) fn micro_substep(&mut self, dt: f64) {
        if !self.lanes.iter().any(|l| l.as_micro().is_some()) {
            return;
        }
        let pieces = (dt / MAX_MICRO_DT).ceil().max(1.0) as usize;
        let h = dt / pieces as f64;
        for piece in 0..pieces {
            if piece > 0 {
                for lane in &mut self.lanes {
                    if let Some(m) = lane.as_micro_mut() {
                        m.swap();
                    }
                }
            }
            self.compute_accelerations();
            if self.config.lane_change.enabled {
                self.change_lanes();
            }
            self.integrate(h);
            self.move_cars();
        }
    }

    // ── Accelerations ─────────────────────────────────────────────────────

    fn compute_accelerations(&mut self) {
        let accelerations: Vec<Vec<f64>> = {
            let ctx = self.lookahead();
            self.lanes
                .iter()
                .map(|lane| match &lane.payload {
                    Payload::Micro(m) => {
                        let merging = merging_out_of(&ctx, lane.id);
                        (0..m.current.len())
                            .map(|i| acceleration_of(&ctx, &self.idm, lane, m, &merging, i))
                            .collect()
                    }
                    Payload::Macro(_) => Vec::new(),
                })
                .collect()
        };

        for (lane, values) in self.lanes.iter_mut().zip(accelerations) {
            if let Some(m) = lane.as_micro_mut() {
                for (car, a) in m.current.iter_mut().zip(values) {
                    car.acceleration = a;
                }
            }
        }
    }

    // ── Lane changes ──────────────────────────────────────────────────────

    fn change_lanes(&mut self) {
        let moves: Vec<(LaneId, CarId, LaneId)> = {
            let ctx = self.lookahead();
            let params = &self.config.lane_change;
            let mut moves = Vec::new();
            for lane in &self.lanes {
                let Payload::Micro(m) = &lane.payload else {
                    continue;
                };
                let sides = [self.network.left(lane.id), self.network.right(lane.id)];
                for car in m.current.iter().filter(|c| !c.is_changing_lane()) {
                    let mut best: Option<(f64, LaneId)> = None;
                    for target in sides.into_iter().flatten() {
                        let other = &self.lanes[target.index()];
                        let Payload::Micro(tm) = &other.payload else {
                            continue;
                        };
                        let decision = evaluate_lane(&ctx, &self.idm, params, car, other, tm);
                        if let Some(gain) = decision.worthwhile(params) {
                            if best.is_none_or(|(g, _)| gain > g) {
                                best = Some((gain, target));
                            }
                        }
                    }
                    if let Some((_, target)) = best {
                        moves.push((lane.id, car.id, target));
                    }
                }
            }
            moves
        };

        for (from, car, to) in moves {
            self.apply_lane_change(from, car, to);
        }
    }

    /// Move `car` from `from` to `to` unless the spot was taken meanwhile.
    fn apply_lane_change(&mut self, from: LaneId, car: CarId, to: LaneId) {
        let car_length = self.config.car.length;
        let Some(index) = self.lanes[from.index()]
            .as_micro()
            .and_then(|m| m.current.iter().position(|c| c.id == car))
        else {
            return;
        };
        let position = self.lanes[from.index()].as_micro().map_or(0.0, |m| m.current[index].position);

        let target = &self.lanes[to.index()];
        let Some(tm) = target.as_micro() else {
            return;
        };
        let taken = tm
            .current
            .iter()
            .any(|c| ((c.position - position) * target.length).abs() < car_length);
        if taken {
            return;
        }

        let Some(mut moved) = self.lanes[from.index()].as_micro_mut().map(|m| m.current.remove(index)) else {
            return;
        };
        moved.lane_change = Some(LaneChange::new(from, position));
        if let Some(tm) = self.lanes[to.index()].as_micro_mut() {
            tm.insert(moved);
        }
    }

    // ── Integration and lane ends ─────────────────────────────────────────

    fn integrate(&mut self, dt: f64) {
        let network = &self.network;
        for lane in &mut self.lanes {
            let length = lane.length;
            let Some(m) = lane.as_micro_mut() else {
                continue;
            };
            for car in &mut m.current {
                car.integrate(dt, length);
                let velocity = car.velocity;
                if let Some(change) = car.lane_change.as_mut() {
                    if change.advance(dt, velocity, network.lane(change.from).length) {
                        car.lane_change = None;
                    }
                }
            }
        }
    }

    fn move_cars(&mut self) {
        for idx in 0..self.lanes.len() {
            let id = self.lanes[idx].id;
            let Some(m) = self.lanes[idx].as_micro_mut() else {
                continue;
            };
            let cars = std::mem::take(&mut m.current);
            for car in cars {
                self.route_car(id, car);
            }
        }
    }

    /// Put a car that was on `lane` wherever its position now says it is.
    fn route_car(&mut self, mut lane: LaneId, mut car: Car) {
        for _ in 0..=self.config.lookahead.max_depth {
            if car.position < 1.0 {
                break;
            }
            match self.network.downstream(lane, &self.views) {
                Link::Boundary => {
                    self.cars_exited += 1;
                    return;
                }
                Link::Closed => {
                    car.position = LANE_END;
                    car.velocity = 0.0;
                    break;
                }
                Link::Lane(next) => {
                    let overshoot = (car.position - 1.0) * self.lanes[lane.index()].length;
                    let next_state = &mut self.lanes[next.index()];
                    car.position = overshoot / next_state.length;
                    car.lane_change = None;
                    lane = next;
                    if let Some(m) = next_state.as_macro_mut() {
                        m.inbox.push(car);
                        return;
                    }
                }
            }
        }
        car.position = car.position.min(LANE_END);
        if let Some(m) = self.lanes[lane.index()].as_micro_mut() {
            m.next.push(car);
        }
    }

    // ── settle ────────────────────────────────────────────────────────────

    /// Relax the velocities of every micro car towards a steady state,
    /// leaving positions alone.
    ///
    /// Cars are visited front to back.  Each is accelerated in steps of `dt`
    /// until its acceleration falls below 1 m/s²; it is removed instead if
    /// its acceleration grows, stalls above that bound, or its front
    /// overhangs the lane end.  Returns the number of cars removed.
    pub fn settle(&mut self, dt: f64) -> usize {
        let front_offset = self.config.car.front_bumper_offset();
        let mut removed = 0;

        for _ in 0..SETTLE_MAX_PASSES {
            for idx in 0..self.lanes.len() {
                let Some(count) = self.lanes[idx].as_micro().map(|m| m.current.len()) else {
                    continue;
                };
                let length = self.lanes[idx].length;
                for i in (0..count).rev() {
                    let mut last = f64::INFINITY;
                    for _ in 0..SETTLE_MAX_ITER {
                        let a = self.acceleration_at(idx, i);
                        let Some(m) = self.lanes[idx].as_micro_mut() else {
                            break;
                        };
                        let car = &mut m.current[i];
                        car.acceleration = a;
                        let overhangs = car.distance_along(length) + front_offset > length;
                        if a.abs() > last.abs()
                            || overhangs
                            || ((a - last).abs() < SETTLE_DELTA && a.abs() > SETTLE_EPSILON)
                        {
                            m.current.remove(i);
                            removed += 1;
                            break;
                        }
                        if a.abs() < SETTLE_EPSILON {
                            break;
                        }
                        car.velocity = (car.velocity + a * dt).max(0.0);
                        last = a;
                    }
                }
            }

            self.compute_accelerations();
            let worst = self
                .lanes
                .iter()
                .filter_map(LaneState::as_micro)
                .flat_map(|m| m.current.iter())
                .map(|c| c.acceleration.abs())
                .fold(0.0, f64::max);
            if worst <= SETTLE_EPSILON {
                break;
            }
        }
        if removed > 0 {
            log::info!("settle removed {removed} cars");
        }
        removed
    }

    fn acceleration_at(&self, lane_index: usize, car_index: usize) -> f64 {
        let ctx = self.lookahead();
        let lane = &self.lanes[lane_index];
        let Payload::Micro(m) = &lane.payload else {
            return 0.0;
        };
        let merging = merging_out_of(&ctx, lane.id);
        acceleration_of(&ctx, &self.idm, lane, m, &merging, car_index)
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// `(position on lane, velocity)` of cars in neighbouring micro lanes that
/// are still changing out of `lane`, by position.
fn merging_out_of(ctx: &Lookahead<'_>, lane: LaneId) -> Vec<(f64, f64)> {
    let mut merging: Vec<(f64, f64)> = [ctx.network.left(lane), ctx.network.right(lane)]
        .into_iter()
        .flatten()
        .filter_map(|n| ctx.lanes[n.index()].as_micro())
        .flat_map(|m| m.current.iter())
        .filter_map(|c| {
            c.lane_change
                .as_ref()
                .filter(|lc| lc.from == lane)
                .map(|lc| (lc.from_position, c.velocity))
        })
        .collect();
    merging.sort_by(|a, b| a.0.total_cmp(&b.0));
    merging
}

/// Acceleration of car `i` of a micro lane.
fn acceleration_of(
    ctx: &Lookahead<'_>,
    idm: &Idm,
    lane: &LaneState,
    m: &MicroLane,
    merging: &[(f64, f64)],
    i: usize,
) -> f64 {
    let idm = idm.for_speed_limit(lane.speed_limit());
    let car = &m.current[i];
    let leader = match m.current.get(i + 1) {
        Some(l) => Leader::new((l.position - car.position) * lane.length, l.velocity),
        None => ctx.leader_beyond(lane.id, (1.0 - car.position) * lane.length),
    };
    let mut a = idm.acceleration(car.velocity, leader);
    if let Some(&(p, v)) = merging.iter().find(|(p, _)| *p > car.position) {
        a = a.min(idm.acceleration(car.velocity, Leader::new((p - car.position) * lane.length, v)));
    }
    a
}

/// Weigh moving `car` to the micro lane `target`, at the same parametric
/// position.
fn evaluate_lane(
    ctx: &Lookahead<'_>,
    idm: &Idm,
    params: &LaneChangeParams,
    car: &Car,
    target: &LaneState,
    tm: &MicroLane,
) -> LaneChangeDecision {
    let idm = idm.for_speed_limit(target.speed_limit());
    let p = car.position;
    let ahead = tm.first_ahead(p);

    let leader = match tm.current.get(ahead) {
        Some(l) => Leader::new((l.position - p) * target.length, l.velocity),
        None => ctx.leader_beyond(target.id, (1.0 - p) * target.length),
    };
    let a_hat = idm.acceleration(car.velocity, leader);

    let follower = ahead.checked_sub(1).map(|j| &tm.current[j]);
    let follower_decel = follower.map(|f| {
        idm.acceleration(f.velocity, Leader::new((p - f.position) * target.length, car.velocity))
    });

    LaneChangeDecision::evaluate(params, a_hat, car.acceleration, follower_decel)
}
