//! Fundamental diagram along an acoustic wave, and its inverses.
//!
//! Along a 1-wave the relative velocity `relv = u − u_eq` is constant, so
//! the flow through a point is a function of density alone:
//!
//! ```text
//! fd(ρ) = ρ (u_eq(ρ) + relv)
//! ```
//!
//! For γ ∈ (0, 1] `fd` is strictly concave.  It rises from 0 at ρ = 0 to
//! its maximum at the critical density and falls back to 0 at
//! `ρ_zero = ((u_max + relv) / u_max)^(1/γ)`.  Demand is the rising branch
//! (capped at the maximum), supply the falling branch.  Each branch is
//! monotone, so the inverses below have exactly one root in their bracket.

use log::trace;

use crate::Equilibrium;

/// Absolute tolerance on `|fd(ρ) − flow|` for the inverse solves.
pub const INVERSE_TOLERANCE: f64 = 5e-8;

/// Iteration cap for the inverse solves.
pub const INVERSE_MAX_ITER: usize = 500;

/// Flows within this of the maximum flow invert to the critical density.
const MAX_FLOW_SLACK: f64 = 1e-3;

#[inline]
pub fn fundamental_diagram(rho: f64, relv: f64, eq: &Equilibrium) -> f64 {
    rho * (eq.u_eq(rho) + relv)
}

/// Density of maximum flow.
#[inline]
pub fn critical_density(relv: f64, eq: &Equilibrium) -> f64 {
    let base = ((eq.u_max + relv) / (eq.u_max * (1.0 + eq.gamma))).max(0.0);
    base.powf(1.0 / eq.gamma).min(1.0)
}

/// Second zero of the fundamental diagram.
#[inline]
pub fn zero_density(relv: f64, eq: &Equilibrium) -> f64 {
    let base = ((eq.u_max + relv) / eq.u_max).max(0.0);
    base.powf(1.0 / eq.gamma).min(1.0)
}

#[inline]
pub fn max_flow(relv: f64, eq: &Equilibrium) -> f64 {
    fundamental_diagram(critical_density(relv, eq), relv, eq)
}

/// Flow the upstream side can send: `fd(min(ρ, ρ_crit))`.
#[inline]
pub fn demand(rho: f64, relv: f64, eq: &Equilibrium) -> f64 {
    fundamental_diagram(rho.min(critical_density(relv, eq)), relv, eq)
}

/// Flow the downstream side can take: `fd(max(ρ, ρ_crit))`.
#[inline]
pub fn supply(rho: f64, relv: f64, eq: &Equilibrium) -> f64 {
    fundamental_diagram(rho.max(critical_density(relv, eq)), relv, eq)
}

/// Density on the free-flow branch `[0, ρ_crit]` carrying `flow`.
pub fn inv_demand(flow: f64, relv: f64, eq: &Equilibrium) -> f64 {
    let crit = critical_density(relv, eq);
    if flow + MAX_FLOW_SLACK >= fundamental_diagram(crit, relv, eq) {
        return crit;
    }
    if flow <= 0.0 {
        return 0.0;
    }
    solve_bracketed(|rho| fundamental_diagram(rho, relv, eq) - flow, 0.0, crit)
}

/// Density on the congested branch `[ρ_crit, ρ_zero]` carrying `flow`.
pub fn inv_supply(flow: f64, relv: f64, eq: &Equilibrium) -> f64 {
    let crit = critical_density(relv, eq);
    if flow + MAX_FLOW_SLACK >= fundamental_diagram(crit, relv, eq) {
        return crit;
    }
    let zero = zero_density(relv, eq);
    if flow <= 0.0 {
        return zero;
    }
    solve_bracketed(|rho| fundamental_diagram(rho, relv, eq) - flow, crit, zero)
}

/// Root of `f` in `[lo, hi]` by secant steps that never leave the bracket.
///
/// This is regula falsi with the Illinois modification: whenever the same
/// endpoint is retained twice in a row its function value is halved, which
/// restores superlinear convergence on concave branches.  If `f` does not
/// change sign over the bracket the endpoint with the smaller residual is
/// returned.  After [`INVERSE_MAX_ITER`] steps the last iterate is returned.
pub fn solve_bracketed(f: impl Fn(f64) -> f64, mut lo: f64, mut hi: f64) -> f64 {
    let mut f_lo = f(lo);
    let mut f_hi = f(hi);
    if f_lo.abs() <= INVERSE_TOLERANCE {
        return lo;
    }
    if f_hi.abs() <= INVERSE_TOLERANCE {
        return hi;
    }
    if f_lo * f_hi > 0.0 {
        return if f_lo.abs() < f_hi.abs() { lo } else { hi };
    }

    // Which endpoint moved last: -1 for lo, +1 for hi.
    let mut last = 0i8;
    let mut x = 0.5 * (lo + hi);
    for _ in 0..INVERSE_MAX_ITER {
        let denom = f_hi - f_lo;
        x = if denom.abs() > f64::MIN_POSITIVE {
            (lo * f_hi - hi * f_lo) / denom
        } else {
            0.5 * (lo + hi)
        };
        let fx = f(x);
        if fx.abs() <= INVERSE_TOLERANCE || (hi - lo).abs() <= f64::EPSILON * hi.abs().max(1.0) {
            return x;
        }
        if fx * f_hi > 0.0 {
            hi = x;
            f_hi = fx;
            if last == 1 {
                f_lo *= 0.5;
            }
            last = 1;
        } else {
            lo = x;
            f_lo = fx;
            if last == -1 {
                f_hi *= 0.5;
            }
            last = -1;
        }
    }
    trace!("inverse fundamental diagram did not converge; returning {x}");
    x
}
