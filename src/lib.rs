//! Orbital Engine - N-body and two-body orbital mechanics
//!
//! A library crate providing a symplectic N-body integrator, universal-variable
//! orbit elements, a maneuver scheduler, transfer planners, sphere-of-influence
//! handoff and an asynchronous course-correction search, all driven through a
//! [`engine::Simulation`] context object.

pub mod config;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod maneuver;
pub mod orbit;
pub mod physics;
pub mod plugin;
pub mod prediction;
pub mod scenarios;
pub mod search;
pub mod soi;
pub mod transfer;
pub mod types;

pub use config::EngineConfig;
pub use engine::{Simulation, TickReport};
pub use error::EngineError;
pub use plugin::OrbitalEnginePlugin;
pub use types::{BodyHandle, BodyState};

#[cfg(test)]
pub mod test_utils;
