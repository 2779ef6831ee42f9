//! Core physics types and constants for the gravity engine.

use std::fmt;

use bevy::math::DVec3;

/// Physical constants

/// Gravitational constant in SI units (m³·kg⁻¹·s⁻²).
///
/// The engine itself runs in whatever units the configuration chooses;
/// this is only used by scenarios that want SI values.
pub const G_SI: f64 = 6.67430e-11;

/// Degrees to radians conversion factor
pub const DEG_TO_RAD: f64 = std::f64::consts::PI / 180.0;

/// Radians to degrees conversion factor
pub const RAD_TO_DEG: f64 = 180.0 / std::f64::consts::PI;

/// Stable identifier of a registered body.
///
/// Handles are never reused and stay valid while other bodies are added or
/// removed, even though the underlying storage is compacted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(pub(crate) u32);

impl BodyHandle {
    /// Raw numeric id (useful for logging and opaque persistence records).
    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for BodyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Physical state of a body in the simulation.
/// Uses f64 (DVec3) in internal units regardless of display scale.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BodyState {
    /// Position in internal length units (world frame)
    pub pos: DVec3,
    /// Velocity in internal length per internal time
    pub vel: DVec3,
    /// Mass in internal mass units (0 for massless bodies)
    pub mass: f64,
    /// Inactive bodies are frozen and excluded from force sums
    pub active: bool,
}

impl BodyState {
    /// Create a new active body state
    pub fn new(pos: DVec3, vel: DVec3, mass: f64) -> Self {
        Self {
            pos,
            vel,
            mass,
            active: true,
        }
    }

    /// Create an active massless body (a test particle).
    pub fn massless(pos: DVec3, vel: DVec3) -> Self {
        Self::new(pos, vel, 0.0)
    }

    /// Whether this body exerts no gravitational force.
    pub fn is_massless(&self) -> bool {
        self.mass <= 0.0
    }

    /// Linear momentum m·v.
    pub fn momentum(&self) -> DVec3 {
        self.vel * self.mass
    }

    /// Kinetic energy ½·m·v².
    pub fn kinetic_energy(&self) -> f64 {
        0.5 * self.mass * self.vel.length_squared()
    }
}

/// Wrap an angle to [0, 2π).
#[inline]
pub fn wrap_two_pi(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(std::f64::consts::TAU);
    // rem_euclid can return exactly TAU for tiny negative inputs
    if wrapped >= std::f64::consts::TAU {
        0.0
    } else {
        wrapped
    }
}
