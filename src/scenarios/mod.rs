//! Preset systems for the demo binary and tests.
//!
//! Every preset is in dimensionless units (G = 1) and is built into an
//! existing [`Simulation`] through its public API, so loading a scenario
//! exercises the same paths a caller would.

pub mod presets;

use bevy::log::info;
use bevy::math::DVec3;

use crate::engine::Simulation;
use crate::error::EngineError;
use crate::orbit::OrbitElements;
use crate::types::{BodyHandle, BodyState};

pub use presets::SCENARIOS;

/// A predefined scenario.
#[derive(Clone, Copy, Debug)]
pub struct Scenario {
    /// Unique identifier for the scenario.
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    /// Simulation time per real second.
    pub time_scale: f64,
    pub layout: Layout,
}

/// Body layout of a scenario.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Layout {
    /// Star plus a massless ship on a circular orbit.
    CircularShip { star_mass: f64, radius: f64 },
    /// Star with a ship and a target on coplanar circular orbits.
    TransferPair { star_mass: f64, ship_radius: f64, target_radius: f64, target_lead: f64 },
    /// Star, a planet on a circular orbit and a ship in a parking orbit about the star.
    StarPlanetShip { star_mass: f64, planet_mass: f64, planet_radius: f64, ship_radius: f64 },
    /// Star plus a massless visitor on a hyperbolic path.
    Flyby { star_mass: f64, periapsis: f64, excess_speed: f64 },
}

/// Named handles of the bodies a scenario created.
#[derive(Clone, Debug, Default)]
pub struct ScenarioBodies {
    bodies: Vec<(&'static str, BodyHandle)>,
}

impl ScenarioBodies {
    fn push(&mut self, name: &'static str, handle: BodyHandle) -> BodyHandle {
        self.bodies.push((name, handle));
        handle
    }

    pub fn get(&self, name: &str) -> Option<BodyHandle> {
        self.bodies.iter().find(|(n, _)| *n == name).map(|&(_, h)| h)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, BodyHandle)> + '_ {
        self.bodies.iter().copied()
    }
}

/// Circular speed about a point mass at distance `r`.
fn circular_speed(mu: f64, r: f64) -> f64 {
    (mu / r).sqrt()
}

/// Position and velocity on a circular xy-plane orbit at angle `theta`.
fn circular_state(mu: f64, r: f64, theta: f64) -> (DVec3, DVec3) {
    let (s, c) = theta.sin_cos();
    let v = circular_speed(mu, r);
    (DVec3::new(r * c, r * s, 0.0), DVec3::new(-v * s, v * c, 0.0))
}

impl Scenario {
    /// Add this scenario's bodies to `sim`.
    ///
    /// The simulation is not cleared first; call this on a fresh one.
    pub fn load(&self, sim: &mut Simulation) -> Result<ScenarioBodies, EngineError> {
        let g = sim.config().gravitational_constant;
        let mut bodies = ScenarioBodies::default();
        match self.layout {
            Layout::CircularShip { star_mass, radius } => {
                bodies.push("star", sim.add_body(BodyState::new(DVec3::ZERO, DVec3::ZERO, star_mass)));
                let (pos, vel) = circular_state(g * star_mass, radius, 0.0);
                bodies.push("ship", sim.add_body(BodyState::massless(pos, vel)));
            }
            Layout::TransferPair {
                star_mass,
                ship_radius,
                target_radius,
                target_lead,
            } => {
                bodies.push("star", sim.add_body(BodyState::new(DVec3::ZERO, DVec3::ZERO, star_mass)));
                let mu = g * star_mass;
                let (pos, vel) = circular_state(mu, ship_radius, 0.0);
                bodies.push("ship", sim.add_body(BodyState::massless(pos, vel)));
                let (pos, vel) = circular_state(mu, target_radius, target_lead);
                bodies.push("target", sim.add_body(BodyState::massless(pos, vel)));
            }
            Layout::StarPlanetShip {
                star_mass,
                planet_mass,
                planet_radius,
                ship_radius,
            } => {
                bodies.push("star", sim.add_body(BodyState::new(DVec3::ZERO, DVec3::ZERO, star_mass)));
                // Planet orbits the pair's combined mass
                let (pos, vel) = circular_state(g * (star_mass + planet_mass), planet_radius, 0.0);
                bodies.push("planet", sim.add_body(BodyState::new(pos, vel, planet_mass)));
                let (pos, vel) = circular_state(g * star_mass, ship_radius, 0.0);
                bodies.push("ship", sim.add_body(BodyState::massless(pos, vel)));
            }
            Layout::Flyby {
                star_mass,
                periapsis,
                excess_speed,
            } => {
                let star = bodies.push("star", sim.add_body(BodyState::new(DVec3::ZERO, DVec3::ZERO, star_mass)));
                let mu = g * star_mass;
                // Start well before periapsis by running the hyperbola backwards
                let speed = (excess_speed * excess_speed + 2.0 * mu / periapsis).sqrt();
                let at_periapsis = OrbitElements::from_cartesian(
                    DVec3::new(periapsis, 0.0, 0.0),
                    DVec3::new(0.0, speed, 0.0),
                    mu,
                    Some(star),
                    sim.time(),
                )?;
                let approach_time = 4.0 * periapsis / speed.max(f64::EPSILON);
                let incoming = at_periapsis.state_after(-approach_time)?;
                bodies.push("visitor", sim.add_body(BodyState::massless(incoming.pos, incoming.vel)));
            }
        }
        info!("Loaded scenario '{}' with {} bodies", self.id, bodies.bodies.len());
        Ok(bodies)
    }
}

/// Get a scenario by ID.
pub fn get_scenario(id: &str) -> Option<&'static Scenario> {
    SCENARIOS.iter().find(|s| s.id == id)
}
