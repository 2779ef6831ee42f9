//! Common test utilities for integration tests.
//!
//! Dimensionless units throughout: G = 1, unit-mass star at the origin.

#![allow(dead_code)]

use std::time::{Duration, Instant};

use bevy::math::DVec3;
use orbital_engine::{BodyHandle, BodyState, EngineConfig, Simulation};

/// Fresh running simulation with a unit-mass star at the origin.
pub fn star_system(config: EngineConfig) -> (Simulation, BodyHandle) {
    let mut sim = Simulation::new(config).expect("valid config");
    let star = sim.add_body(BodyState::new(DVec3::ZERO, DVec3::ZERO, 1.0));
    (sim, star)
}

/// Massless body on a circular xy-plane orbit of radius `r` at angle `theta`.
pub fn circular(mu: f64, r: f64, theta: f64) -> BodyState {
    let (s, c) = theta.sin_cos();
    let v = (mu / r).sqrt();
    BodyState::massless(DVec3::new(r * c, r * s, 0.0), DVec3::new(-v * s, v * c, 0.0))
}

/// Compute specific orbital energy.
pub fn orbital_energy(pos: DVec3, vel: DVec3, mu: f64) -> f64 {
    0.5 * vel.length_squared() - mu / pos.length()
}

/// Compute orbital period for elliptical orbit.
pub fn orbital_period(semi_major_axis: f64, mu: f64) -> f64 {
    std::f64::consts::TAU * (semi_major_axis.powi(3) / mu).sqrt()
}

/// Tick with zero advance until `done` holds or ten seconds pass.
///
/// Worker results are only handled inside a tick, so this is how tests wait
/// for asynchronous jobs.
pub fn pump_until(sim: &mut Simulation, mut done: impl FnMut(&Simulation) -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        sim.process_completions();
        if done(sim) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}
