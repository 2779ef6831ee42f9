//! Gravity simulation: body storage, force laws, the Verlet integrator and
//! conservation diagnostics.
//!
//! The live simulation and every speculative fork share these types; a fork
//! is just a cloned [`GravityState`] driven by its own [`Integrator`].

mod conservation;
mod gravity;
mod integrator;
mod state;

#[cfg(test)]
mod proptest_physics;

pub use conservation::{ConservationMonitor, Drift, total_angular_momentum, total_energy};
pub use gravity::{ForceLaw, SourceLanes, acceleration_from_sources, massive_accelerations};
pub use integrator::{Integrator, IntegratorMode, RunPhase};
pub use state::{CompositeMember, GravityState};
