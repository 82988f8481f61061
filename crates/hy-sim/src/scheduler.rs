//! Worker partition and the parallel macro phase.
//!
//! Macro lanes are dealt to workers greedily, largest first, each going to
//! the worker with the fewest cells so far.  The partition only changes
//! when the set of macro lanes does.
//!
//! One macro sub-step is two passes over the worker buckets:
//!
//! ```text
//! collect_riemann on every lane ─▶ barrier ─▶ reduce max speed → dt
//!                                              │
//! update(dt) on every lane ◀───────────────────┘ ─▶ barrier
//! ```
//!
//! Each lane belongs to exactly one bucket, so a pass never shares a lane
//! between workers.

use hy_arz::EPSILON;
use hy_core::LaneId;

use crate::{LaneState, MacroLane, Payload, SimResult};

// ── Partition ─────────────────────────────────────────────────────────────────

/// Assignment of macro lanes to workers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Partition {
    pub buckets: Vec<Vec<LaneId>>,
    /// Total cells per bucket.
    pub loads:   Vec<usize>,
}

impl Partition {
    /// Greedy least-loaded assignment of `(lane, cells)` pairs.
    ///
    /// Lanes are placed in decreasing cell count, ties by id; a lane goes
    /// to the lowest-numbered worker among those with the smallest load.
    pub fn greedy(lanes: impl IntoIterator<Item = (LaneId, usize)>, workers: usize) -> Self {
        let workers = workers.max(1);
        let mut lanes: Vec<(LaneId, usize)> = lanes.into_iter().collect();
        lanes.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut buckets = vec![Vec::new(); workers];
        let mut loads = vec![0usize; workers];
        for (lane, cells) in lanes {
            let w = (0..workers).min_by_key(|&w| (loads[w], w)).unwrap_or(0);
            buckets[w].push(lane);
            loads[w] += cells;
        }
        Self { buckets, loads }
    }

    #[inline]
    pub fn workers(&self) -> usize {
        self.buckets.len()
    }

    pub fn lane_count(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }
}

// ── Scheduler ─────────────────────────────────────────────────────────────────

/// Per-worker maximum wave speed, one cache line each.
#[repr(C, align(64))]
#[derive(Clone, Copy, Debug, Default)]
struct MaxSpeedSlot {
    value: f64,
}

/// Parameters of one macro sub-step.
#[derive(Clone, Copy, Debug)]
pub(crate) struct MacroStep {
    pub cfl:        f64,
    /// Smallest cell width in the network.
    pub min_h:      f64,
    /// A speed the time step must also respect, e.g. the fastest car.
    pub floor:      f64,
    pub relaxation: f64,
    pub car_length: f64,
}

pub struct Scheduler {
    partition:  Partition,
    /// Worker of each lane, indexed by `LaneId`; `None` for micro lanes.
    assignment: Vec<Option<usize>>,
    scratch:    Vec<MaxSpeedSlot>,
    #[cfg(feature = "parallel")]
    pool:       rayon::ThreadPool,
}

impl Scheduler {
    pub fn new(workers: usize) -> SimResult<Self> {
        let workers = workers.max(1);

        #[cfg(feature = "parallel")]
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("hy-macro-{i}"))
            .build()
            .map_err(|e| crate::SimError::ThreadPool(e.to_string()))?;

        Ok(Self {
            partition: Partition::greedy(std::iter::empty(), workers),
            assignment: Vec::new(),
            scratch: vec![MaxSpeedSlot::default(); workers],
            #[cfg(feature = "parallel")]
            pool,
        })
    }

    #[inline]
    pub fn workers(&self) -> usize {
        self.scratch.len()
    }

    #[inline]
    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// Recompute the partition from the current macro lanes.
    pub fn repartition(&mut self, lanes: &[LaneState]) {
        let macro_lanes = lanes
            .iter()
            .filter_map(|l| l.as_macro().map(|m| (l.id, m.len())));
        self.partition = Partition::greedy(macro_lanes, self.workers());

        self.assignment = vec![None; lanes.len()];
        for (w, bucket) in self.partition.buckets.iter().enumerate() {
            for lane in bucket {
                self.assignment[lane.index()] = Some(w);
            }
        }
        log::debug!(
            "partitioned {} macro lanes over {} workers, loads {:?}",
            self.partition.lane_count(),
            self.workers(),
            self.partition.loads
        );
    }

    /// Run one macro sub-step over `lanes` and return the time step used.
    pub(crate) fn macro_step(&mut self, lanes: &mut [LaneState], step: MacroStep) -> f64 {
        let mut buckets: Vec<Vec<&mut MacroLane>> = (0..self.workers()).map(|_| Vec::new()).collect();
        for lane in lanes.iter_mut() {
            let worker = self.assignment.get(lane.id.index()).copied().flatten();
            if let (Payload::Macro(m), Some(w)) = (&mut lane.payload, worker) {
                buckets[w].push(m);
            }
        }

        self.collect(&mut buckets);
        let max_speed = self.scratch.iter().map(|s| s.value).fold(step.floor, f64::max);
        let max_speed = if max_speed < EPSILON { step.min_h } else { max_speed };
        let dt = step.cfl * step.min_h / max_speed;
        debug_assert!(dt.is_finite() && dt > 0.0, "bad time step {dt}");

        self.update(&mut buckets, dt, step.relaxation, step.car_length);
        dt
    }

    fn collect(&mut self, buckets: &mut [Vec<&mut MacroLane>]) {
        #[cfg(not(feature = "parallel"))]
        for (bucket, slot) in buckets.iter_mut().zip(self.scratch.iter_mut()) {
            slot.value = collect_bucket(bucket);
        }

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;

            let pool = &self.pool;
            let scratch = &mut self.scratch;
            pool.install(|| {
                buckets
                    .par_iter_mut()
                    .zip(scratch.par_iter_mut())
                    .for_each(|(bucket, slot)| slot.value = collect_bucket(bucket));
            });
        }
    }

    fn update(&mut self, buckets: &mut [Vec<&mut MacroLane>], dt: f64, relaxation: f64, car_length: f64) {
        #[cfg(not(feature = "parallel"))]
        for bucket in buckets.iter_mut() {
            update_bucket(bucket, dt, relaxation, car_length);
        }

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;

            self.pool.install(|| {
                buckets
                    .par_iter_mut()
                    .for_each(|bucket| update_bucket(bucket, dt, relaxation, car_length));
            });
        }
    }
}

fn collect_bucket(bucket: &mut [&mut MacroLane]) -> f64 {
    bucket.iter_mut().map(|lane| lane.collect_riemann()).fold(0.0, f64::max)
}

fn update_bucket(bucket: &mut [&mut MacroLane], dt: f64, relaxation: f64, car_length: f64) {
    for lane in bucket.iter_mut() {
        lane.update(dt, relaxation, car_length);
    }
}
