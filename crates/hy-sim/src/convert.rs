//! Moving vehicles between the continuum and the discrete representation.
//!
//! Micro → macro splats each car's footprint onto the cells it overlaps;
//! coverage becomes density and coverage-weighted velocity becomes the
//! cell velocity.  Macro → micro draws car positions from an inhomogeneous
//! Poisson process whose intensity follows the cell densities.

use hy_arz::{EPSILON, Equilibrium, FullQ, Q};
use hy_core::{CarGeometry, CarId, SimRng};
use hy_micro::{Car, PiecewiseIntensity, poisson_points};

use crate::MacroLane;

/// Cells of width `h` covering `[0, n·h]` with the footprints of `cars`
/// on a lane of `length` metres.
///
/// Footprints are shifted to lie within the lane, so every car adds
/// exactly one car length of mass when `n·h = length`.
pub fn splat<'a>(
    cars: impl IntoIterator<Item = &'a Car>,
    length: f64,
    h: f64,
    n: usize,
    geometry: &CarGeometry,
    eq: &Equilibrium,
) -> Vec<Q> {
    let mut coverage = vec![0.0; n];
    let mut momentum = vec![0.0; n];
    let extent = n as f64 * h;

    for car in cars {
        let rear = (car.distance_along(length) + geometry.rear_bumper_offset())
            .clamp(0.0, (length - geometry.length).max(0.0));
        let front = rear + geometry.length;
        if rear >= extent {
            continue;
        }
        let first = ((rear / h) as usize).min(n - 1);
        let last = ((front / h) as usize).min(n - 1);
        for i in first..=last {
            let lo = (i as f64 * h).max(rear);
            let hi = ((i + 1) as f64 * h).min(front);
            if hi > lo {
                coverage[i] += hi - lo;
                momentum[i] += (hi - lo) * car.velocity;
            }
        }
    }

    coverage
        .iter()
        .zip(&momentum)
        .map(|(&cov, &mom)| fill_y(cov / h, if cov > 0.0 { mom / cov } else { 0.0 }, eq))
        .collect()
}

/// Conserved state for a density and velocity, clamped to the valid domain.
#[inline]
pub fn fill_y(rho: f64, u: f64, eq: &Equilibrium) -> Q {
    if rho <= 0.0 {
        return Q::ZERO;
    }
    Q::from_rho_u(rho.min(1.0), u, eq).fixed()
}

/// One cell of width `width` at the start of a micro lane, as seen by a
/// macro lane feeding into it.
pub fn mirror_start<'a>(
    cars: impl IntoIterator<Item = &'a Car>,
    length: f64,
    width: f64,
    geometry: &CarGeometry,
    eq: &Equilibrium,
) -> FullQ {
    let width = width.min(length);
    let cell = splat(cars, length, width, 1, geometry, eq)[0];
    FullQ::from_q(cell, eq)
}

/// Cars standing in for the density of `lane`.
///
/// The lane's vehicle count, `Σρh / car_length` rounded, is the quota.  The
/// Poisson intensity `ρ / (car_length (1 − ρ))` per cell makes the mean gap
/// of a process with one-car-length exclusion match the cell density;
/// should the draw still fall short of the quota, the remaining cars go in
/// the middle of the widest free gaps.  Every footprint lies on the lane.
pub fn sample_cars(
    lane: &MacroLane,
    length: f64,
    geometry: &CarGeometry,
    rng: &mut SimRng,
    next_id: &mut u64,
) -> Vec<Car> {
    let start = geometry.rear_bumper_to_axle;
    let end = length - geometry.front_bumper_offset();
    if end <= start {
        return Vec::new();
    }

    let quota = (lane.mass() / geometry.length).round() as usize;
    let intensity = PiecewiseIntensity::new(
        lane.h,
        lane.cells
            .iter()
            .map(|q| {
                let rho = q.rho.min(1.0 - EPSILON);
                rho / (geometry.length * (1.0 - rho))
            })
            .collect(),
        0.0,
    );

    let mut xs = poisson_points(start, end, quota, geometry.length, &intensity, rng);
    fill_gaps(&mut xs, quota, start, end, geometry.length);

    xs.into_iter()
        .map(|x| {
            let velocity = lane.full_q(lane.which_cell(x)).u;
            let id = CarId(*next_id);
            *next_id += 1;
            Car::new(id, x / length, velocity)
        })
        .collect()
}

/// Insert points into sorted `xs` until there are `quota`, each at the
/// middle of the widest interval of `[lo, hi]` that keeps `sep` from every
/// existing point.  Stops early when no such interval is left.
pub(crate) fn fill_gaps(xs: &mut Vec<f64>, quota: usize, lo: f64, hi: f64, sep: f64) {
    while xs.len() < quota {
        let mut best: Option<(f64, f64)> = None;
        for i in 0..=xs.len() {
            let a = if i == 0 { lo } else { xs[i - 1] + sep };
            let b = if i < xs.len() { xs[i] - sep } else { hi };
            if b >= a && best.is_none_or(|(s, e)| b - a > e - s) {
                best = Some((a, b));
            }
        }
        let Some((a, b)) = best else {
            break;
        };
        let x = 0.5 * (a + b);
        let at = xs.partition_point(|&p| p < x);
        xs.insert(at, x);
    }
}
