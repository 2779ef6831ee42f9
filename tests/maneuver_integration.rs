//! Integration tests for maneuver scheduling through the simulation.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use approx::assert_relative_eq;
use bevy::math::DVec3;
use orbital_engine::maneuver::{DeltaV, Maneuver, ManeuverTrigger};
use orbital_engine::{EngineConfig, EngineError};

#[test]
fn test_maneuver_fires_exactly_once_across_uneven_ticks() {
    let (mut sim, star) = common::star_system(EngineConfig::default());
    let ship = sim.add_body(common::circular(1.0, 1.0, 0.0));
    let fired = Arc::new(AtomicUsize::new(0));
    let seen = fired.clone();
    let fired_at = Arc::new(std::sync::Mutex::new(None));
    let record = fired_at.clone();

    sim.schedule(
        Maneuver::new(ship, ManeuverTrigger::At(5.0), DeltaV::Boost(0.05))
            .relative_to(star)
            .labeled("kick")
            .on_complete(move |report| {
                seen.fetch_add(1, Ordering::SeqCst);
                *record.lock().unwrap() = Some(report.time);
            }),
    )
    .unwrap();
    sim.start();

    // Get to t = 3, then cross t = 5 with uneven steps up to t = 7
    for _ in 0..30 {
        sim.advance(0.1);
    }
    let mut fired_reports = 0;
    for dt in [0.7, 0.45, 0.05, 0.33, 0.27, 0.2] {
        fired_reports += sim.advance(dt).maneuvers.len();
    }

    assert_relative_eq!(sim.time(), 5.0, epsilon = 1e-9);
    for dt in [0.6, 0.9, 0.5] {
        fired_reports += sim.advance(dt).maneuvers.len();
    }
    assert_relative_eq!(sim.time(), 7.0, epsilon = 1e-9);

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(fired_reports, 1);
    assert_relative_eq!(fired_at.lock().unwrap().unwrap(), 5.0, epsilon = 1e-9);
    assert_eq!(sim.pending_maneuvers().count(), 0);
}

#[test]
fn test_prograde_boost_raises_apoapsis() {
    let (mut sim, star) = common::star_system(EngineConfig::default());
    let ship = sim.add_body(common::circular(1.0, 1.0, 0.0));
    sim.schedule(Maneuver::new(ship, ManeuverTrigger::At(0.0), DeltaV::Boost(0.1)).relative_to(star))
        .unwrap();
    sim.start();
    let report = sim.advance(0.01);
    assert_eq!(report.maneuvers.len(), 1);

    let elements = sim.orbit_elements(ship, star).unwrap();
    assert_relative_eq!(elements.periapsis(), 1.0, max_relative = 1e-3);
    // Vis-viva with v = 1.1 at r = 1
    let a = 1.0 / (2.0 - 1.1 * 1.1);
    assert_relative_eq!(elements.apoapsis().unwrap(), 2.0 * a - 1.0, max_relative = 1e-3);
}

#[test]
fn test_apoapsis_trigger_circularizes() {
    let (mut sim, star) = common::star_system(EngineConfig::default());
    // Periapsis 1, e = 0.5: apoapsis 3
    let v_peri = (1.0f64 * (2.0 - 1.0 / 2.0)).sqrt();
    let ship = sim.add_body(orbital_engine::BodyState::massless(DVec3::X, DVec3::new(0.0, v_peri, 0.0)));
    let v_apo = v_peri / 3.0;
    let v_circ = (1.0f64 / 3.0).sqrt();
    sim.schedule(
        Maneuver::new(ship, ManeuverTrigger::NextApoapsis, DeltaV::Boost(v_circ - v_apo)).relative_to(star),
    )
    .unwrap();
    sim.start();

    let half_period = std::f64::consts::PI * 2f64.powf(1.5);
    let mut fired = 0;
    while sim.time() < half_period + 1.0 {
        fired += sim.advance(0.01).maneuvers.len();
    }
    assert_eq!(fired, 1);
    let elements = sim.orbit_elements(ship, star).unwrap();
    assert!(elements.eccentricity < 1e-3, "e = {}", elements.eccentricity);
    assert_relative_eq!(elements.semi_parameter, 3.0, max_relative = 1e-3);
}

#[test]
fn test_cancelled_maneuver_never_fires() {
    let (mut sim, _) = common::star_system(EngineConfig::default());
    let ship = sim.add_body(common::circular(1.0, 1.0, 0.0));
    let id = sim
        .schedule(Maneuver::new(ship, ManeuverTrigger::At(0.5), DeltaV::Vector(DVec3::Z)))
        .unwrap();
    sim.cancel(id).unwrap();
    assert_eq!(sim.cancel(id).unwrap_err(), EngineError::UnknownManeuver(id));

    sim.start();
    for _ in 0..10 {
        assert!(sim.advance(0.1).maneuvers.is_empty());
    }
    assert!(sim.body_state(ship).unwrap().vel.z.abs() < 1e-12);
}

#[test]
fn test_paused_simulation_holds_maneuvers() {
    let (mut sim, _) = common::star_system(EngineConfig::default());
    let ship = sim.add_body(common::circular(1.0, 1.0, 0.0));
    sim.schedule(Maneuver::new(ship, ManeuverTrigger::At(0.2), DeltaV::Vector(DVec3::Z)))
        .unwrap();
    sim.start();
    sim.pause();
    for _ in 0..5 {
        assert!(sim.advance(0.1).maneuvers.is_empty());
    }
    assert_eq!(sim.time(), 0.0);
    sim.resume();
    let fired: usize = (0..5).map(|_| sim.advance(0.1).maneuvers.len()).sum();
    assert_eq!(fired, 1);
}
