//! Unit tests for hy-micro.

#[cfg(test)]
mod helpers {
    use hy_core::IdmParams;

    use crate::Idm;

    pub fn idm() -> Idm {
        Idm::new(IdmParams::default(), 4.5)
    }
}

#[cfg(test)]
mod car {
    use hy_core::CarId;

    use crate::Car;

    #[test]
    fn euler_step() {
        let mut c = Car::new(CarId(1), 0.0, 10.0);
        c.acceleration = 2.0;
        c.integrate(0.5, 100.0);
        assert_eq!(c.velocity, 11.0);
        assert!((c.position - 0.055).abs() < 1e-12);
    }

    #[test]
    fn velocity_floored_at_zero() {
        let mut c = Car::new(CarId(1), 0.5, 1.0);
        c.acceleration = -10.0;
        c.integrate(1.0, 100.0);
        assert_eq!(c.velocity, 0.0);
        assert_eq!(c.position, 0.5);
    }
}

#[cfg(test)]
mod idm {
    use super::helpers::idm;
    use crate::{CarFollowing, Leader};

    #[test]
    fn free_road_accelerates() {
        let m = idm();
        let a = m.acceleration(0.0, Leader::new(1_000.0, 30.0));
        assert!(a > 0.0 && a <= m.params.a_max);
    }

    #[test]
    fn at_preferred_speed_on_free_road_is_near_zero() {
        let m = idm();
        let v = m.params.v_pref;
        let a = m.acceleration(v, Leader::new(1.0e6, v));
        assert!(a.abs() < 1e-3, "got {a}");
    }

    #[test]
    fn close_leader_brakes_hard() {
        let m = idm();
        let a = m.acceleration(15.0, Leader::new(6.0, 0.0));
        assert!(a < -10.0, "got {a}");
    }

    #[test]
    fn zero_gap_is_finite() {
        let m = idm();
        let a = m.acceleration(5.0, Leader::new(0.0, 0.0));
        assert!(a.is_finite() && a < 0.0);
    }

    #[test]
    fn desired_spacing_grows_with_closing_speed() {
        let m = idm();
        assert!(m.desired_spacing(10.0, 0.0) > m.desired_spacing(10.0, 10.0));
        assert_eq!(m.desired_spacing(0.0, 5.0), m.params.min_spacing);
    }

    #[test]
    fn speed_limit_caps_preference() {
        let m = idm().for_speed_limit(12.0);
        assert_eq!(m.params.v_pref, 12.0);
        let a = m.acceleration(12.0, Leader::new(1.0e6, 12.0));
        assert!(a.abs() < 1e-3);
        assert_eq!(idm().for_speed_limit(100.0).params.v_pref, idm().params.v_pref);
    }
}

#[cfg(test)]
mod lane_change {
    use hy_core::{LaneChangeParams, LaneId};

    use crate::{LaneChange, LaneChangeDecision};

    #[test]
    fn duration_shrinks_with_speed() {
        assert!(LaneChange::duration(4.0) > LaneChange::duration(16.0));
        assert!((LaneChange::duration(4.0) - 11.507_31 / 2.0).abs() < 1e-12);
    }

    #[test]
    fn progress_completes() {
        let mut lc = LaneChange::new(LaneId(0), 0.2);
        let v = 16.0;
        let steps = (LaneChange::duration(v) / 0.1).ceil() as usize;
        let mut done = false;
        for _ in 0..steps {
            done = lc.advance(0.1, v, 100.0);
        }
        assert!(done);
        assert!(lc.from_position > 0.2);
    }

    #[test]
    fn standing_car_makes_no_progress() {
        let mut lc = LaneChange::new(LaneId(0), 0.2);
        assert!(!lc.advance(1.0, 0.0, 100.0));
        assert_eq!(lc.progress, 0.0);
    }

    #[test]
    fn politeness_blocks_unsafe_change() {
        let p = LaneChangeParams::default();
        let d = LaneChangeDecision::evaluate(&p, 1.0, 0.0, Some(-7.0));
        assert_eq!(d, LaneChangeDecision::Unsafe);
        assert_eq!(d.worthwhile(&p), None);
    }

    #[test]
    fn threshold_filters_small_gains() {
        let p = LaneChangeParams::default();
        let small = LaneChangeDecision::evaluate(&p, 0.15, 0.0, None);
        assert_eq!(small.worthwhile(&p), None);
        let big = LaneChangeDecision::evaluate(&p, 1.0, 0.2, Some(-1.0));
        assert_eq!(big.worthwhile(&p), Some(0.8));
    }
}

#[cfg(test)]
mod poisson {
    use hy_core::SimRng;

    use crate::{InhomogeneousPoisson, PiecewiseIntensity, poisson_points};

    #[test]
    fn integrate_piecewise() {
        let pc = PiecewiseIntensity::new(2.0, vec![1.0, 0.0, 3.0], 0.5);
        assert_eq!(pc.integrate(0.0), 0.0);
        assert_eq!(pc.integrate(1.0), 1.0);
        assert_eq!(pc.integrate(3.0), 2.0);
        assert_eq!(pc.integrate(5.0), 5.0);
        assert_eq!(pc.total(), 8.0);
        assert_eq!(pc.integrate(8.0), 9.0);
    }

    #[test]
    fn inverse_matches_integral() {
        let pc = PiecewiseIntensity::new(2.0, vec![1.0, 0.0, 3.0], 0.0);
        for &x in &[0.5, 1.5, 4.5, 5.9] {
            let v = pc.integrate(x);
            let back = pc.inv_integrate(v).unwrap();
            assert!((back - x).abs() < 1e-12, "x={x} back={back}");
        }
        // The integral first reaches 2 at the end of the first cell.
        assert_eq!(pc.inv_integrate(2.0), Some(2.0));
    }

    #[test]
    fn exhausted_intensity_yields_none() {
        let pc = PiecewiseIntensity::new(1.0, vec![0.5, 0.5], 0.0);
        assert_eq!(pc.inv_integrate(2.0), None);
        let mut rng = SimRng::new(1);
        let mut p = InhomogeneousPoisson::new(0.0, &pc);
        let mut n = 0;
        while p.next(&mut rng).is_some() {
            n += 1;
            assert!(n < 1_000);
        }
    }

    #[test]
    fn points_respect_separation_and_range() {
        let pc = PiecewiseIntensity::new(10.0, vec![0.2; 50], 0.0);
        let mut rng = SimRng::new(7);
        let pts = poisson_points(0.0, 500.0, usize::MAX, 4.5, &pc, &mut rng);
        assert!(!pts.is_empty());
        for w in pts.windows(2) {
            assert!(w[1] - w[0] >= 4.5);
        }
        assert!(pts.iter().all(|&p| (0.0..500.0).contains(&p)));
    }

    #[test]
    fn quota_limits_count() {
        let pc = PiecewiseIntensity::new(10.0, vec![0.2; 50], 0.0);
        let mut rng = SimRng::new(7);
        assert_eq!(poisson_points(0.0, 500.0, 3, 4.5, &pc, &mut rng).len(), 3);
    }

    #[test]
    fn expected_count_tracks_intensity() {
        // 0.05 cars/m over 2 km.  Redrawing too-close candidates makes every gap
        // 4.5 m plus an exponential of mean 20 m, so about 2000 / 24.5 points.
        let pc = PiecewiseIntensity::new(20.0, vec![0.05; 100], 0.0);
        let mut total = 0;
        for seed in 0..20 {
            let mut rng = SimRng::new(seed);
            total += poisson_points(0.0, 2_000.0, usize::MAX, 4.5, &pc, &mut rng).len();
        }
        let mean = total as f64 / 20.0;
        assert!(mean > 72.0 && mean < 92.0, "mean {mean}");
    }

    #[test]
    fn empty_intensity_gives_no_points() {
        let pc = PiecewiseIntensity::new(10.0, vec![0.0; 5], 0.0);
        let mut rng = SimRng::new(3);
        assert!(poisson_points(0.0, 50.0, 10, 4.5, &pc, &mut rng).is_empty());
    }

    #[test]
    fn deterministic_for_seed() {
        let pc = PiecewiseIntensity::new(10.0, vec![0.1; 30], 0.0);
        let a = poisson_points(0.0, 300.0, 100, 4.5, &pc, &mut SimRng::new(11));
        let b = poisson_points(0.0, 300.0, 100, 4.5, &pc, &mut SimRng::new(11));
        assert_eq!(a, b);
    }
}
