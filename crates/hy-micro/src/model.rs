//! Car-following models.

use hy_core::IdmParams;

/// Distance floor substituted for a zero gap.
const MIN_GAP: f64 = 1e-6;

/// What a follower sees ahead of it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Leader {
    /// Rear-axle to rear-axle distance in metres.
    pub distance: f64,
    pub velocity: f64,
}

impl Leader {
    pub fn new(distance: f64, velocity: f64) -> Self {
        Self { distance, velocity }
    }
}

/// Acceleration law of a follower behind a leader.
///
/// Implementations must be pure: the same inputs always give the same
/// acceleration.
pub trait CarFollowing: Send + Sync {
    fn acceleration(&self, follower_velocity: f64, leader: Leader) -> f64;
}

/// Intelligent driver model.
///
/// ```text
/// s* = s0 + T v + v (v − v_l) / (2 √(a_max a_comf))
/// a  = a_max (1 − (v / v_pref)^δ − (s* / gap)²)
/// ```
///
/// The gap is the axle distance minus one car length when that is
/// positive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Idm {
    pub params:     IdmParams,
    pub car_length: f64,
}

impl Idm {
    pub fn new(params: IdmParams, car_length: f64) -> Self {
        Self { params, car_length }
    }

    /// Copy of this model whose preferred velocity does not exceed a lane's
    /// speed limit.
    #[inline]
    pub fn for_speed_limit(&self, speed_limit: f64) -> Self {
        let mut model = *self;
        model.params.v_pref = model.params.v_pref.min(speed_limit);
        model
    }

    /// Desired spacing `s*` for a follower at `v` behind a leader at `v_l`.
    #[inline]
    pub fn desired_spacing(&self, v: f64, v_l: f64) -> f64 {
        let p = &self.params;
        p.min_spacing + p.time_headway * v + v * (v - v_l) / (2.0 * (p.a_max * p.a_comfort).sqrt())
    }
}

impl CarFollowing for Idm {
    fn acceleration(&self, v: f64, leader: Leader) -> f64 {
        let p = &self.params;
        let mut gap = leader.distance;
        if gap > self.car_length {
            gap -= self.car_length;
        }
        if gap <= 0.0 {
            gap = MIN_GAP;
        }
        let s_star = self.desired_spacing(v, leader.velocity);
        p.a_max * (1.0 - (v / p.v_pref).powf(p.delta) - (s_star / gap).powi(2))
    }
}
