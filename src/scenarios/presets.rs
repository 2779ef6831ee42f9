//! Preset scenario definitions.

use super::{Layout, Scenario};

/// All available preset scenarios.
pub static SCENARIOS: &[Scenario] = &[CIRCULAR, HOHMANN, STAR_PLANET, FLYBY];

/// A ship on a unit circular orbit. Good for conservation checks.
pub static CIRCULAR: Scenario = Scenario {
    id: "circular",
    name: "Circular Orbit",
    description: "One massless ship on a unit circular orbit about a unit-mass star.",
    time_scale: 1.0,
    layout: Layout::CircularShip {
        star_mass: 1.0,
        radius: 1.0,
    },
};

/// Ship at r = 25 and a target at r = 40, the target leading by 60°.
pub static HOHMANN: Scenario = Scenario {
    id: "hohmann",
    name: "Hohmann Rendezvous",
    description: "Coplanar circular orbits at r = 25 and r = 40. Plan a transfer and phase for rendezvous.",
    time_scale: 20.0,
    layout: Layout::TransferPair {
        star_mass: 1.0,
        ship_radius: 25.0,
        target_radius: 40.0,
        target_lead: std::f64::consts::FRAC_PI_3,
    },
};

/// Planet of mass 1e-3 at r = 100; ship in a parking orbit at r = 10.
///
/// The planet's SOI radius is 100 · (1e-3)^0.4 ≈ 6.3.
pub static STAR_PLANET: Scenario = Scenario {
    id: "star_planet",
    name: "Patched Conic",
    description: "Depart a low parking orbit for a planet's sphere of influence and watch the handoff.",
    time_scale: 50.0,
    layout: Layout::StarPlanetShip {
        star_mass: 1.0,
        planet_mass: 1e-3,
        planet_radius: 100.0,
        ship_radius: 10.0,
    },
};

/// Massless visitor on a hyperbola with periapsis 2.
pub static FLYBY: Scenario = Scenario {
    id: "flyby",
    name: "Hyperbolic Flyby",
    description: "An unbound visitor swings past the star.",
    time_scale: 5.0,
    layout: Layout::Flyby {
        star_mass: 1.0,
        periapsis: 2.0,
        excess_speed: 0.5,
    },
};
