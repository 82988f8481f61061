//! Traffic states.
//!
//! [`Q`] is the conserved pair `(ρ, y)` stored in every cell.  [`FullQ`]
//! additionally carries the derived equilibrium velocity and actual velocity
//! so the Riemann solver does not recompute them per case.
//!
//! Valid states satisfy `ρ ∈ [0, 1]`, `y ≤ 0` and, for full states,
//! `0 ≤ u ≤ u_eq ≤ u_max`.

use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

use crate::{EPSILON, Equilibrium};

// ── Q ────────────────────────────────────────────────────────────────────────

/// Conserved state: density `rho` and relative flow `y`.
///
/// Also used for wave jumps and flux fluctuations, which are differences of
/// states and need not lie in the valid domain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Q {
    pub rho: f64,
    pub y:   f64,
}

impl Q {
    pub const ZERO: Q = Q { rho: 0.0, y: 0.0 };

    #[inline]
    pub const fn new(rho: f64, y: f64) -> Self {
        Self { rho, y }
    }

    /// Build from density and velocity, keeping `y ≤ 0`.
    #[inline]
    pub fn from_rho_u(rho: f64, u: f64, eq: &Equilibrium) -> Self {
        Self { rho, y: eq.y(rho, u).min(0.0) }
    }

    /// Clamp into the valid domain.
    ///
    /// Near-vacuum collapses to exact vacuum, near-jam is capped at
    /// `1 − EPSILON`, and a slightly positive `y` is zeroed.  Idempotent.
    #[inline]
    pub fn fix(&mut self) {
        if self.rho <= EPSILON {
            self.rho = 0.0;
            self.y = 0.0;
        } else if self.rho > 1.0 - EPSILON {
            self.rho = 1.0 - EPSILON;
        }
        if self.y > -EPSILON {
            self.y = 0.0;
        }
        debug_assert!(self.check(), "fix produced invalid state {self:?}");
    }

    /// `fix` by value.
    #[inline]
    pub fn fixed(mut self) -> Self {
        self.fix();
        self
    }

    /// True when the state is finite and inside the valid domain.
    #[inline]
    pub fn check(&self) -> bool {
        self.rho.is_finite()
            && (0.0..=1.0).contains(&self.rho)
            && self.y.is_finite()
            && self.y <= 0.0
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.rho.is_finite() && self.y.is_finite()
    }
}

impl Add for Q {
    type Output = Q;
    #[inline]
    fn add(self, o: Q) -> Q {
        Q::new(self.rho + o.rho, self.y + o.y)
    }
}

impl Sub for Q {
    type Output = Q;
    #[inline]
    fn sub(self, o: Q) -> Q {
        Q::new(self.rho - o.rho, self.y - o.y)
    }
}

impl Neg for Q {
    type Output = Q;
    #[inline]
    fn neg(self) -> Q {
        Q::new(-self.rho, -self.y)
    }
}

impl Mul<f64> for Q {
    type Output = Q;
    #[inline]
    fn mul(self, s: f64) -> Q {
        Q::new(self.rho * s, self.y * s)
    }
}

impl AddAssign for Q {
    #[inline]
    fn add_assign(&mut self, o: Q) {
        self.rho += o.rho;
        self.y += o.y;
    }
}

impl SubAssign for Q {
    #[inline]
    fn sub_assign(&mut self, o: Q) {
        self.rho -= o.rho;
        self.y -= o.y;
    }
}

// ── FullQ ─────────────────────────────────────────────────────────────────────

/// Conserved state plus its equilibrium velocity and velocity.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FullQ {
    pub rho:  f64,
    pub y:    f64,
    pub u_eq: f64,
    pub u:    f64,
}

impl FullQ {
    /// Derive the velocities of a conserved state.
    #[inline]
    pub fn from_q(q: Q, eq: &Equilibrium) -> Self {
        let u_eq = eq.u_eq(q.rho);
        let u = if q.rho <= f64::EPSILON {
            eq.u_max
        } else {
            (q.y / q.rho + u_eq).max(0.0)
        };
        let full = Self { rho: q.rho, y: q.y, u_eq, u };
        debug_assert!(full.check(), "invalid full state {full:?} from {q:?}");
        full
    }

    /// State of density `rho` moving at `u`, with `u` capped at `u_eq(rho)`.
    #[inline]
    pub fn from_rho_u(rho: f64, u: f64, eq: &Equilibrium) -> Self {
        let u_eq = eq.u_eq(rho);
        let u = u.min(u_eq);
        Self { rho, y: rho * (u - u_eq), u_eq, u }
    }

    /// Empty road: zero density moving at the speed limit.
    #[inline]
    pub fn vacuum(eq: &Equilibrium) -> Self {
        Self { rho: 0.0, y: 0.0, u_eq: eq.u_max, u: eq.u_max }
    }

    #[inline]
    pub fn q(&self) -> Q {
        Q::new(self.rho, self.y)
    }

    /// `(ρu, yu)`.
    #[inline]
    pub fn flux(&self) -> Q {
        Q::new(self.rho * self.u, self.y * self.u)
    }

    /// Density flux `ρu`.
    #[inline]
    pub fn flux_0(&self) -> f64 {
        self.rho * self.u
    }

    /// Acoustic (genuinely nonlinear) characteristic speed `u + ρ u_eq′(ρ)`.
    #[inline]
    pub fn lambda_0(&self, eq: &Equilibrium) -> f64 {
        self.u + self.rho * eq.u_eq_prime(self.rho)
    }

    /// Contact characteristic speed; the car velocity itself.
    #[inline]
    pub fn lambda_1(&self) -> f64 {
        self.u
    }

    /// `u − u_eq`, which is invariant along an acoustic wave.
    #[inline]
    pub fn relative_velocity(&self) -> f64 {
        self.u - self.u_eq
    }

    pub fn check(&self) -> bool {
        self.q().check()
            && self.u.is_finite()
            && self.u >= 0.0
            && self.u_eq.is_finite()
            && self.u_eq >= 0.0
    }
}

impl Sub for FullQ {
    type Output = Q;
    /// Jump in conserved variables between two full states.
    #[inline]
    fn sub(self, o: FullQ) -> Q {
        self.q() - o.q()
    }
}
