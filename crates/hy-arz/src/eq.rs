//! The equilibrium velocity relation `u_eq(ρ) = u_max (1 − ρ^γ)`.

use serde::{Deserialize, Serialize};

use crate::EPSILON;

/// Equilibrium velocity curve of one lane.
///
/// `u_max` is the lane's speed limit and `gamma ∈ (0, 1]` the shape
/// exponent.  Lanes with different speed limits carry different values.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Equilibrium {
    pub u_max: f64,
    pub gamma: f64,
}

impl Equilibrium {
    pub fn new(u_max: f64, gamma: f64) -> Self {
        debug_assert!(u_max > 0.0 && u_max.is_finite(), "bad speed limit {u_max}");
        debug_assert!(gamma > 0.0 && gamma <= 1.0, "bad gamma {gamma}");
        Self { u_max, gamma }
    }

    /// `u_max (1 − ρ^γ)`, with ρ clamped to `[0, 1]`.
    #[inline]
    pub fn u_eq(&self, rho: f64) -> f64 {
        self.u_max * (1.0 - rho.clamp(0.0, 1.0).powf(self.gamma))
    }

    /// Density whose equilibrium velocity is `u_eq`, with `u_eq` clamped to
    /// `[0, u_max]`.
    #[inline]
    pub fn inv_u_eq(&self, u_eq: f64) -> f64 {
        let ratio = (1.0 - u_eq.clamp(0.0, self.u_max) / self.u_max).max(0.0);
        ratio.powf(1.0 / self.gamma)
    }

    /// `d u_eq / d ρ`.  Singular at ρ = 0 for γ < 1, so it is taken as 0
    /// below [`EPSILON`].
    #[inline]
    pub fn u_eq_prime(&self, rho: f64) -> f64 {
        if rho < EPSILON {
            return 0.0;
        }
        -self.u_max * self.gamma * rho.powf(self.gamma - 1.0)
    }

    /// Relative flow `y = ρ (u − u_eq(ρ))`.
    #[inline]
    pub fn y(&self, rho: f64, u: f64) -> f64 {
        rho * (u - self.u_eq(rho))
    }

    /// Velocity recovered from `(ρ, y)`; `u_max` in (near) vacuum.
    #[inline]
    pub fn u(&self, rho: f64, y: f64) -> f64 {
        if rho < EPSILON {
            return self.u_max;
        }
        (y / rho + self.u_eq(rho)).max(0.0)
    }
}
