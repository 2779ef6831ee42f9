//! Engine configuration and display-scale conversion.
//!
//! All physics runs in double precision internal units. The scale factors
//! here are only applied at the boundary, when a display layer reads state
//! or supplies positions in scene units.

use bevy::math::DVec3;
use bevy::prelude::Resource;

use crate::error::EngineError;
use crate::physics::ForceLaw;

/// Configuration supplied once at setup.
///
/// Immutable while the simulation runs, except through
/// [`Simulation::rescale`](crate::engine::Simulation::rescale).
#[derive(Resource, Clone, Debug)]
pub struct EngineConfig {
    /// Internal mass units per display mass unit. Default: 1.
    pub mass_scale: f64,
    /// Internal length units per display length unit. Default: 1.
    pub length_scale: f64,
    /// Simulation time advanced per second of real (frame) time. Default: 1.
    pub time_scale: f64,
    /// Velocity-Verlet substeps per tick for massive bodies. Default: 8.
    pub steps_per_frame_massive: u32,
    /// Velocity-Verlet substeps per tick for massless bodies. Default: 4.
    pub steps_per_frame_massless: u32,
    /// Gravitational constant in internal units. Default: 1 (dimensionless).
    pub gravitational_constant: f64,
    /// Pairwise force law, chosen once. Default: Newtonian.
    pub force_law: ForceLaw,
    /// Separations below this are clamped to avoid the singularity. Default: 1e-9.
    pub min_separation: f64,
    /// Relative energy / angular momentum drift that triggers a warning. Default: 1e-3.
    pub drift_tolerance: f64,
    /// Fractional hysteresis band around an SOI boundary. Default: 0.01.
    pub soi_hysteresis: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mass_scale: 1.0,
            length_scale: 1.0,
            time_scale: 1.0,
            steps_per_frame_massive: 8,
            steps_per_frame_massless: 4,
            gravitational_constant: 1.0,
            force_law: ForceLaw::Newtonian,
            min_separation: 1e-9,
            drift_tolerance: 1e-3,
            soi_hysteresis: 0.01,
        }
    }
}

impl EngineConfig {
    /// Check every field for a usable value.
    pub fn validate(&self) -> Result<(), EngineError> {
        let positive = [
            ("mass_scale", self.mass_scale),
            ("length_scale", self.length_scale),
            ("time_scale", self.time_scale),
            ("gravitational_constant", self.gravitational_constant),
            ("drift_tolerance", self.drift_tolerance),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(EngineError::InvalidConfig(format!(
                    "{name} must be positive and finite, got {value}"
                )));
            }
        }
        if self.steps_per_frame_massive == 0 || self.steps_per_frame_massless == 0 {
            return Err(EngineError::InvalidConfig(
                "substeps per frame must be at least 1".to_string(),
            ));
        }
        if !(self.min_separation >= 0.0 && self.min_separation.is_finite()) {
            return Err(EngineError::InvalidConfig(format!(
                "min_separation must be non-negative, got {}",
                self.min_separation
            )));
        }
        if !(0.0..0.5).contains(&self.soi_hysteresis) {
            return Err(EngineError::InvalidConfig(format!(
                "soi_hysteresis must be in [0, 0.5), got {}",
                self.soi_hysteresis
            )));
        }
        Ok(())
    }

    /// Boundary conversion between internal and display units.
    pub fn display_scale(&self) -> DisplayScale {
        DisplayScale {
            mass_scale: self.mass_scale,
            length_scale: self.length_scale,
            time_scale: self.time_scale,
        }
    }

    /// Simulation time covered by a frame of `real_dt` seconds.
    pub fn frame_dt(&self, real_dt: f64) -> f64 {
        real_dt * self.time_scale
    }
}

/// Scale factors applied only when state crosses to or from a display layer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayScale {
    pub mass_scale: f64,
    pub length_scale: f64,
    pub time_scale: f64,
}

impl DisplayScale {
    pub fn position_to_display(&self, pos: DVec3) -> DVec3 {
        pos / self.length_scale
    }

    pub fn position_from_display(&self, pos: DVec3) -> DVec3 {
        pos * self.length_scale
    }

    /// Display velocity is display length per real second.
    pub fn velocity_to_display(&self, vel: DVec3) -> DVec3 {
        vel * self.time_scale / self.length_scale
    }

    pub fn velocity_from_display(&self, vel: DVec3) -> DVec3 {
        vel * self.length_scale / self.time_scale
    }

    pub fn mass_to_display(&self, mass: f64) -> f64 {
        mass / self.mass_scale
    }

    pub fn mass_from_display(&self, mass: f64) -> f64 {
        mass * self.mass_scale
    }
}
