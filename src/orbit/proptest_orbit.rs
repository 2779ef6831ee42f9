//! Property-based tests for orbit element conversion and propagation.

use std::f64::consts::{PI, TAU};

use bevy::math::DVec3;
use proptest::prelude::*;

use super::{Confidence, OrbitElements, propagate_state};
use crate::config::EngineConfig;
use crate::physics::{GravityState, Integrator};
use crate::test_utils::assertions;
use crate::types::BodyState;

/// Elements with the true anomaly kept inside a hyperbola's asymptotes.
fn arbitrary_elements() -> impl Strategy<Value = OrbitElements> {
    (
        0.5f64..5.0,
        prop_oneof![0.0f64..0.95, 1.05f64..3.0],
        0.0f64..PI,
        0.0f64..TAU,
        0.0f64..TAU,
        0.0f64..1.0,
        0.1f64..10.0,
    )
        .prop_map(|(p, e, i, node, argp, phase, mu)| {
            // For open orbits map the phase into 90% of the reachable range
            let true_anomaly = if e < 1.0 {
                phase * TAU
            } else {
                let limit = (-1.0 / e).acos() * 0.9;
                (phase * 2.0 - 1.0) * limit
            };
            OrbitElements {
                semi_parameter: p,
                eccentricity: e,
                inclination: i,
                ascending_node: node,
                argument_of_periapsis: argp,
                true_anomaly,
                mu,
                center: None,
                epoch: 0.0,
            }
        })
}

/// Open and closed orbits within 1e-6 of parabolic, plus the exact parabola.
fn near_parabolic_eccentricity() -> impl Strategy<Value = f64> {
    prop_oneof![
        (1.0 - 1e-6)..(1.0 - 1e-10),
        (1.0 + 1e-10)..(1.0 + 1e-6),
        Just(1.0),
    ]
}

/// Elements at `true_anomaly` in a fixed tilted plane.
fn planar_elements(p: f64, e: f64, true_anomaly: f64, mu: f64) -> OrbitElements {
    OrbitElements {
        semi_parameter: p,
        eccentricity: e,
        inclination: 0.4,
        ascending_node: 1.1,
        argument_of_periapsis: 0.3,
        true_anomaly,
        mu,
        center: None,
        epoch: 0.0,
    }
}

fn assert_returns(r: DVec3, v: DVec3, mu: f64, dt: f64) -> Result<(), TestCaseError> {
    let there = propagate_state(r, v, mu, dt);
    let back = propagate_state(there.pos, there.vel, mu, -dt);
    prop_assert_eq!(there.confidence, Confidence::High);
    prop_assert_eq!(back.confidence, Confidence::High);

    let scale = r.length().max(there.pos.length());
    prop_assert!((back.pos - r).length() <= 1e-8 * scale, "position {:?} vs {:?}", back.pos, r);
    prop_assert!((back.vel - v).length() <= 1e-8 * v.length().max(there.vel.length()));
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Near-parabolic orbits come back to the start after a step there and back.
    #[test]
    fn prop_near_parabolic_there_and_back(
        p in 0.5f64..5.0,
        e in near_parabolic_eccentricity(),
        true_anomaly in -2.0f64..2.0,
        mu in 0.1f64..10.0,
        dt in 0.1f64..100.0,
    ) {
        let (r, v) = planar_elements(p, e, true_anomaly, mu).to_cartesian().unwrap();
        assert_returns(r, v, mu, dt)?;
        assert_returns(r, v, mu, -dt)?;
    }

    /// Strongly hyperbolic orbits propagated backwards first.
    #[test]
    fn prop_hyperbolic_backward_then_forward(
        p in 0.5f64..5.0,
        e in 3.0f64..20.0,
        phase in -0.9f64..0.9,
        mu in 0.1f64..10.0,
        dt in 0.01f64..20.0,
    ) {
        let true_anomaly = phase * (-1.0 / e).acos();
        let (r, v) = planar_elements(p, e, true_anomaly, mu).to_cartesian().unwrap();
        assert_returns(r, v, mu, -dt)?;
    }

    /// Cartesian → elements → Cartesian reproduces the state.
    #[test]
    fn prop_cartesian_roundtrip(el in arbitrary_elements()) {
        let (r, v) = el.to_cartesian().unwrap();
        let back = OrbitElements::from_cartesian(r, v, el.mu, None, 0.0).unwrap();
        let (r2, v2) = back.to_cartesian().unwrap();

        prop_assert!((r2 - r).length() <= 1e-6 * r.length(), "position {:?} vs {:?}", r2, r);
        prop_assert!((v2 - v).length() <= 1e-6 * v.length(), "velocity {:?} vs {:?}", v2, v);
        prop_assert!((back.semi_parameter - el.semi_parameter).abs() <= 1e-6 * el.semi_parameter);
        prop_assert!((back.eccentricity - el.eccentricity).abs() <= 1e-6);
    }

    /// Analytic propagation conserves energy and angular momentum.
    #[test]
    fn prop_propagation_conserves_invariants(el in arbitrary_elements(), dt in 0.0f64..20.0) {
        let (r, v) = el.to_cartesian().unwrap();
        let later = propagate_state(r, v, el.mu, dt);
        prop_assert_eq!(later.confidence, Confidence::High);

        let e0 = assertions::orbital_energy(r, v, el.mu);
        let e1 = assertions::orbital_energy(later.pos, later.vel, el.mu);
        let scale = e0.abs().max(el.mu / r.length());
        prop_assert!((e1 - e0).abs() <= 1e-7 * scale, "energy {} vs {}", e1, e0);

        let h0 = assertions::angular_momentum(r, v);
        let h1 = assertions::angular_momentum(later.pos, later.vel);
        prop_assert!((h1 - h0).length() <= 1e-7 * h0.length());
    }

    /// Time-to-anomaly lands on the requested anomaly when propagated.
    #[test]
    fn prop_time_to_anomaly_consistent(
        p in 0.5f64..3.0,
        e in 0.0f64..0.9,
        start in 0.0f64..TAU,
        advance in 0.01f64..6.0,
    ) {
        let el = OrbitElements {
            semi_parameter: p,
            eccentricity: e,
            inclination: 0.3,
            ascending_node: 1.0,
            argument_of_periapsis: 2.0,
            true_anomaly: start,
            mu: 1.0,
            center: None,
            epoch: 0.0,
        };
        let target = start + advance;
        let t = el.time_to_true_anomaly(target).unwrap();
        prop_assert!(t >= 0.0 && t < el.period().unwrap());

        let (expected, _) = el.state_at_true_anomaly(target).unwrap();
        let reached = el.state_after(t).unwrap();
        prop_assert!((reached.pos - expected).length() <= 1e-6 * expected.length());
    }
}

#[cfg(test)]
mod deterministic_tests {
    use super::*;

    /// Elements derived from an integrated trajectory match analytic propagation.
    #[test]
    fn test_integrated_trajectory_matches_analytic() {
        let r0 = DVec3::new(1.0, 0.0, 0.0);
        let v0 = DVec3::new(0.0, 1.1, 0.2);

        let mut state = GravityState::new();
        state.add(BodyState::new(DVec3::ZERO, DVec3::ZERO, 1.0));
        let ship = state.add(BodyState::massless(r0, v0));
        let mut integrator = Integrator::new(&EngineConfig::default());

        let dt = 0.001;
        for _ in 0..3000 {
            integrator.evolve(&mut state, dt);
        }

        let body = state.get(ship).unwrap();
        let numeric = OrbitElements::from_cartesian(body.pos, body.vel, 1.0, None, state.time()).unwrap();
        let analytic = OrbitElements::from_cartesian(r0, v0, 1.0, None, 0.0)
            .unwrap()
            .propagate(state.time())
            .unwrap()
            .0;

        assert!((numeric.semi_parameter - analytic.semi_parameter).abs() < 1e-6);
        assert!((numeric.eccentricity - analytic.eccentricity).abs() < 1e-6);
        assert!((numeric.true_anomaly - analytic.true_anomaly).abs() < 1e-5);
    }
}
