//! Riemann solvers for the ARZ system.
//!
//! A [`RiemannSolution`] describes what happens at one cell interface: the
//! two waves leaving it (acoustic family 0, contact family 1), their
//! speeds, and the flux fluctuations that the finite-volume update applies
//! to the cells on each side.  For every solver
//!
//! ```text
//! left_fluctuation + right_fluctuation == flux(q_r) − flux(q_l)
//! ```
//!
//! where a missing boundary side has zero flux.

use serde::{Deserialize, Serialize};

use crate::fd::{critical_density, demand, inv_demand, inv_supply, supply};
use crate::{EPSILON, Equilibrium, FullQ, Q, VACUUM_EPS};

/// Result of one interface solve.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RiemannSolution {
    pub speeds:            [f64; 2],
    pub waves:             [Q; 2],
    pub left_fluctuation:  Q,
    pub right_fluctuation: Q,
    /// State at the interface itself (the Godunov state).
    pub q_0:               Q,
}

impl RiemannSolution {
    /// Solve at an interface, choosing the inhomogeneous solver only when the
    /// two speed limits differ.
    pub fn between(q_l: &FullQ, q_r: &FullQ, eq_l: &Equilibrium, eq_r: &Equilibrium) -> Self {
        if (eq_l.u_max - eq_r.u_max).abs() > EPSILON {
            Self::inhomogeneous(q_l, q_r, eq_l, eq_r)
        } else {
            Self::riemann(q_l, q_r, eq_l)
        }
    }

    /// Homogeneous Riemann problem between two states sharing `eq`.
    pub fn riemann(q_l: &FullQ, q_r: &FullQ, eq: &Equilibrium) -> Self {
        if q_l.rho < VACUUM_EPS && q_r.rho < VACUUM_EPS {
            return Self::default();
        }

        let mut speeds = [0.0; 2];
        let mut waves = [Q::ZERO; 2];
        let fq_0: FullQ;

        if q_l.rho < VACUUM_EPS {
            // Left vacuum: the right state drifts away, nothing fills in.
            speeds[1] = q_r.lambda_1();
            waves[1] = q_r.q();
            fq_0 = FullQ::default();
        } else if q_r.rho < VACUUM_EPS {
            // Right vacuum: acoustic rarefaction into empty road.
            let q_m = FullQ::from_rho_u(0.0, free_speed(q_l, eq), eq);
            let lambda_0_l = q_l.lambda_0(eq);
            speeds[0] = 0.5 * (lambda_0_l + q_m.u);
            speeds[1] = speeds[0];
            waves[0] = q_m - *q_l;
            fq_0 = if lambda_0_l > 0.0 { *q_l } else { centered_rarefaction(q_l, eq) };
        } else if (q_l.u - q_r.u).abs() < EPSILON {
            // Same velocity: a pure contact discontinuity.
            speeds[0] = q_l.lambda_0(eq);
            speeds[1] = q_r.lambda_1();
            waves[1] = *q_r - *q_l;
            fq_0 = *q_l;
        } else if q_l.u > q_r.u {
            // Faster cars behind slower ones: acoustic shock.
            let q_m = rho_middle(q_l, q_r, eq);
            let flux_diff = q_m.flux_0() - q_l.flux_0();
            let rho_diff = q_m.rho - q_l.rho;
            speeds[0] = if flux_diff.abs() < EPSILON || rho_diff.abs() < VACUUM_EPS {
                0.0
            } else {
                flux_diff / rho_diff
            };
            speeds[1] = q_r.lambda_1();
            waves[0] = q_m - *q_l;
            waves[1] = *q_r - q_m;
            fq_0 = if speeds[0] >= 0.0 { *q_l } else { q_m };
        } else if free_speed(q_l, eq) > q_r.u {
            // Rarefaction towards a non-vacuum middle state.
            let q_m = rho_middle(q_l, q_r, eq);
            let lambda_0_l = q_l.lambda_0(eq);
            let lambda_0_m = q_m.lambda_0(eq);
            speeds[0] = 0.5 * (lambda_0_l + lambda_0_m);
            speeds[1] = q_r.lambda_1();
            waves[0] = q_m - *q_l;
            waves[1] = *q_r - q_m;
            fq_0 = if lambda_0_l >= 0.0 {
                *q_l
            } else if lambda_0_m < 0.0 {
                q_m
            } else {
                centered_rarefaction(q_l, eq)
            };
        } else {
            // The right state outruns the left's acoustic reach: vacuum middle.
            let q_m = FullQ { rho: 0.0, y: 0.0, u_eq: eq.u_max, u: free_speed(q_l, eq) };
            let lambda_0_l = q_l.lambda_0(eq);
            speeds[0] = 0.5 * (lambda_0_l + q_m.u);
            speeds[1] = q_r.lambda_1();
            waves[0] = q_m - *q_l;
            waves[1] = *q_r - q_m;
            fq_0 = if lambda_0_l >= 0.0 { *q_l } else { centered_rarefaction(q_l, eq) };
        }

        let solution = Self {
            speeds,
            waves,
            left_fluctuation:  fq_0.flux() - q_l.flux(),
            right_fluctuation: q_r.flux() - fq_0.flux(),
            q_0:               fq_0.q(),
        };
        debug_assert!(solution.check(), "non-finite riemann solution {solution:?}");
        solution
    }

    /// Upstream network boundary: nothing enters from the left.
    pub fn starvation(q_r: &FullQ) -> Self {
        if q_r.rho < VACUUM_EPS {
            return Self::default();
        }
        Self {
            speeds:            [0.0, q_r.lambda_1()],
            waves:             [Q::ZERO, q_r.q()],
            left_fluctuation:  Q::ZERO,
            right_fluctuation: q_r.flux(),
            q_0:               q_r.q(),
        }
    }

    /// Downstream wall: cars queue against a standing obstacle.
    pub fn stop(q_l: &FullQ, eq: &Equilibrium) -> Self {
        if q_l.rho < VACUUM_EPS {
            return Self::default();
        }
        let u_eq_m = q_l.u_eq - q_l.u;
        let rho_m = eq.inv_u_eq(u_eq_m);
        let rho_diff = rho_m - q_l.rho;
        let speed = if rho_diff < VACUUM_EPS { 0.0 } else { -q_l.flux_0() / rho_diff };
        Self {
            speeds:            [speed, 0.0],
            waves:             [-q_l.q(), Q::ZERO],
            left_fluctuation:  -q_l.flux(),
            right_fluctuation: Q::ZERO,
            q_0:               Q::ZERO,
        }
    }

    /// Riemann problem across a speed-limit discontinuity.
    ///
    /// Flow through the interface is `min(demand_l, supply_r)` evaluated at
    /// the left state's relative velocity.  Each side's interface density is
    /// the one that carries exactly that flow on its own equilibrium curve:
    /// the free-flow branch downstream when demand limits, the congested
    /// branch upstream when supply limits.
    pub fn inhomogeneous(
        q_l: &FullQ,
        q_r: &FullQ,
        eq_l: &Equilibrium,
        eq_r: &Equilibrium,
    ) -> Self {
        if q_l.rho < VACUUM_EPS && q_r.rho < VACUUM_EPS {
            return Self::default();
        }
        let relv = q_l.relative_velocity();
        let rho_m = eq_r.inv_u_eq(q_r.u - q_l.u + q_l.u_eq).min(1.0);

        let demand_l = demand(q_l.rho, relv, eq_l).max(0.0);
        let supply_r = supply(rho_m, relv, eq_r).max(0.0);
        let flow = demand_l.min(supply_r);

        let (m_l_rho, m_r_rho) = if demand_l <= supply_r {
            (q_l.rho.min(critical_density(relv, eq_l)), inv_demand(flow, relv, eq_r))
        } else {
            (inv_supply(flow, relv, eq_l), rho_m.max(critical_density(relv, eq_r)))
        };
        debug_assert!((0.0..=1.0).contains(&m_l_rho) && (0.0..=1.0).contains(&m_r_rho));

        let q_m_l = interface_state(m_l_rho, flow, relv, eq_l);
        let q_m_r = interface_state(m_r_rho, flow, relv, eq_r);

        let rho_diff = q_m_l.rho - q_l.rho;
        let speed_0 = if rho_diff.abs() < 100.0 * EPSILON {
            0.0
        } else {
            (q_m_l.flux_0() - q_l.flux_0()) / rho_diff
        };

        let solution = Self {
            speeds:            [speed_0, q_r.lambda_1()],
            waves:             [q_m_l - *q_l, *q_r - q_m_r],
            left_fluctuation:  q_m_l.flux() - q_l.flux(),
            right_fluctuation: q_r.flux() - q_m_r.flux(),
            q_0:               q_m_r.q(),
        };
        debug_assert!(solution.check(), "non-finite inhomogeneous solution {solution:?}");
        solution
    }

    /// Largest absolute wave speed, which bounds the stable time step.
    #[inline]
    pub fn max_speed(&self) -> f64 {
        self.speeds[0].abs().max(self.speeds[1].abs())
    }

    /// True when every field is finite.
    pub fn check(&self) -> bool {
        self.speeds.iter().all(|s| s.is_finite())
            && self.waves.iter().all(Q::is_finite)
            && self.left_fluctuation.is_finite()
            && self.right_fluctuation.is_finite()
            && self.q_0.is_finite()
    }
}

// ── Middle states ─────────────────────────────────────────────────────────────

/// Velocity the left state reaches when fully rarefied to vacuum.
#[inline]
fn free_speed(q_l: &FullQ, eq: &Equilibrium) -> f64 {
    q_l.u + (eq.u_max - q_l.u_eq)
}

/// State of density `rho` carrying `flow`, so both sides of an
/// inhomogeneous interface see the same density flux.
fn interface_state(rho: f64, flow: f64, relv: f64, eq: &Equilibrium) -> FullQ {
    let u = if rho > VACUUM_EPS { flow / rho } else { (relv + eq.u_eq(rho)).max(0.0) };
    FullQ::from_rho_u(rho, u, eq)
}

/// State connected to `q_l` by a 1-wave and to `q_r` by a contact.
fn rho_middle(q_l: &FullQ, q_r: &FullQ, eq: &Equilibrium) -> FullQ {
    let u_eq = (q_r.u - q_l.u + q_l.u_eq).clamp(0.0, eq.u_max);
    let rho = eq.inv_u_eq(u_eq);
    let u = q_r.u;
    FullQ { rho, y: (rho * (u - u_eq)).min(0.0), u_eq, u }
}

/// Sonic point of the 1-rarefaction fanning out of `q_l`, where `λ0 = 0`.
///
/// With `W = u_l + u_max − u_eq_l`:
/// `ρ = (W / (u_max (1 + γ)))^(1/γ)`, `u = γ W / (1 + γ)`.
fn centered_rarefaction(q_l: &FullQ, eq: &Equilibrium) -> FullQ {
    let relv = q_l.relative_velocity();
    let w = free_speed(q_l, eq);
    let rho = critical_density(relv, eq);
    let u = eq.gamma * w / (1.0 + eq.gamma);
    let u_eq = eq.u_eq(rho);
    FullQ { rho, y: (rho * (u - u_eq)).min(0.0), u_eq, u }
}
