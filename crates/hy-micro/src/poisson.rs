//! Inhomogeneous Poisson sampling over a piecewise-constant intensity.
//!
//! Car positions for macro→micro conversion are drawn by time-rescaling: a
//! unit-rate exponential variate is added to the running integral of the
//! intensity, and the next point is where the integral reaches that value.

use hy_core::SimRng;

/// Bound on consecutive rejected candidates in [`poisson_points`].
const MAX_REJECTIONS: usize = 10_000;

// ── PiecewiseIntensity ────────────────────────────────────────────────────────

/// Intensity that is constant on cells of width `dx` starting at 0, and
/// equal to `beyond` past the last cell.
#[derive(Clone, Debug, PartialEq)]
pub struct PiecewiseIntensity {
    dx:     f64,
    data:   Vec<f64>,
    beyond: f64,
    /// `cumulative[i]` is the integral over `[0, i·dx]`; length `data.len() + 1`.
    cumulative: Vec<f64>,
}

impl PiecewiseIntensity {
    pub fn new(dx: f64, data: Vec<f64>, beyond: f64) -> Self {
        debug_assert!(dx > 0.0);
        debug_assert!(data.iter().all(|&d| d >= 0.0 && d.is_finite()));
        let mut cumulative = Vec::with_capacity(data.len() + 1);
        let mut sum = 0.0;
        cumulative.push(sum);
        for &d in &data {
            sum += d * dx;
            cumulative.push(sum);
        }
        Self { dx, data, beyond, cumulative }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Extent of the cell data, `len · dx`.
    #[inline]
    pub fn extent(&self) -> f64 {
        self.data.len() as f64 * self.dx
    }

    /// Integral over the whole cell data.
    #[inline]
    pub fn total(&self) -> f64 {
        self.cumulative[self.data.len()]
    }

    /// `∫₀ˣ λ`.
    pub fn integrate(&self, x: f64) -> f64 {
        let x = x.max(0.0);
        if x >= self.extent() {
            return self.total() + (x - self.extent()) * self.beyond;
        }
        let cell = ((x / self.dx) as usize).min(self.data.len() - 1);
        self.cumulative[cell] + (x - cell as f64 * self.dx) * self.data[cell]
    }

    /// Smallest `x` with `∫₀ˣ λ = v`, or `None` if the integral never gets
    /// there.
    pub fn inv_integrate(&self, v: f64) -> Option<f64> {
        let v = v.max(0.0);
        if v > self.total() {
            if self.beyond <= 0.0 {
                return None;
            }
            return Some(self.extent() + (v - self.total()) / self.beyond);
        }
        // First cell whose cumulative end reaches v and that has positive
        // intensity; zero-intensity cells are skipped over.
        let cell = self.cumulative[1..].partition_point(|&c| c < v);
        let cell = (cell..self.data.len()).find(|&i| self.data[i] > 0.0)?;
        let local = (v - self.cumulative[cell]).max(0.0) / self.data[cell];
        Some(cell as f64 * self.dx + local.min(self.dx))
    }
}

// ── InhomogeneousPoisson ──────────────────────────────────────────────────────

/// Point process over a [`PiecewiseIntensity`].
///
/// Cloning captures the process state, so a caller can draw a candidate
/// and discard it by restoring the clone.
#[derive(Clone, Debug)]
pub struct InhomogeneousPoisson<'a> {
    intensity: &'a PiecewiseIntensity,
    /// Integrated intensity at the last point.
    arg:       f64,
    /// Last point.
    pub t:     f64,
}

impl<'a> InhomogeneousPoisson<'a> {
    pub fn new(start: f64, intensity: &'a PiecewiseIntensity) -> Self {
        Self { intensity, arg: intensity.integrate(start), t: start }
    }

    /// Draw the next point, or `None` if the intensity is exhausted.
    pub fn next(&mut self, rng: &mut SimRng) -> Option<f64> {
        let arg = self.arg + rng.exponential();
        let t = self.intensity.inv_integrate(arg)?;
        self.arg = arg;
        self.t = t;
        Some(t)
    }
}

/// Up to `quota` points in `[start, end)` with consecutive points at least
/// `sep` apart.
///
/// A candidate too close to the previous accepted point is discarded and a
/// fresh one drawn from the same process state; earlier points are never
/// revised.
pub fn poisson_points(
    start: f64,
    end: f64,
    quota: usize,
    sep: f64,
    intensity: &PiecewiseIntensity,
    rng: &mut SimRng,
) -> Vec<f64> {
    let mut process = InhomogeneousPoisson::new(start, intensity);
    let mut points = Vec::new();

    let Some(mut candidate) = process.next(rng) else {
        return points;
    };
    while points.len() < quota && candidate < end {
        points.push(candidate);

        let mut accepted = None;
        for _ in 0..MAX_REJECTIONS {
            let saved = process.clone();
            match process.next(rng) {
                None => break,
                Some(c) if c - candidate >= sep => {
                    accepted = Some(c);
                    break;
                }
                Some(_) => process = saved,
            }
        }
        match accepted {
            Some(c) => candidate = c,
            None => {
                log::debug!("poisson sampling stopped at {candidate:.1} m with {} of {quota} points", points.len());
                break;
            }
        }
    }
    points
}
