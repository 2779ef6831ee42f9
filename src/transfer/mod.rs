//! Transfer planners.
//!
//! Planners are pure: they read orbit elements and return a [`Transfer`]
//! holding ordinary maneuvers. Scheduling them is the engine's job.

mod hohmann;
mod patched_conic;

use bevy::math::DVec3;

pub use hohmann::plan_hohmann;
pub use patched_conic::{PatchedConicRequest, plan_patched_conic, soi_radius};

use crate::error::EngineError;
use crate::maneuver::Maneuver;
use crate::orbit::OrbitElements;
use crate::types::wrap_two_pi;

/// Plane normals closer than this (radians) count as coplanar.
pub const COPLANAR_TOLERANCE: f64 = 1e-6;

/// Which planner produced a transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferKind {
    Hohmann,
    PatchedConic,
}

/// Arrival geometry of a patched-conic transfer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PatchedConicArrival {
    /// λ₁, the arrival angle at the secondary (radians)
    pub arrival_angle: f64,
    /// r₁, distance from the primary at SOI entry
    pub radius: f64,
    /// ν₁, true anomaly on the transfer ellipse at SOI entry
    pub true_anomaly: f64,
    /// γ₁, angle at the primary between the entry point and the secondary
    pub phase_angle: f64,
    /// Rs, SOI radius of the secondary
    pub soi_radius: f64,
}

/// Planned multi-impulse transfer.
#[derive(Debug)]
pub struct Transfer {
    pub kind: TransferKind,
    /// Burns in firing order.
    pub maneuvers: Vec<Maneuver>,
    /// Time from the departure burn to arrival.
    pub time_of_flight: f64,
    /// Time to wait before the departure burn.
    pub wait_time: f64,
    /// Sum of burn magnitudes.
    pub total_delta_v: f64,
    /// Semi-major axis of the transfer ellipse.
    pub transfer_semi_major_axis: f64,
    pub arrival: Option<PatchedConicArrival>,
}

impl Transfer {
    /// Simulation time of the departure burn, given the planning time.
    pub fn departure_time(&self, now: f64) -> f64 {
        now + self.wait_time
    }

    /// Simulation time of arrival, given the planning time.
    pub fn arrival_time(&self, now: f64) -> f64 {
        now + self.wait_time + self.time_of_flight
    }
}

/// Wait until the target leads the ship by `required` radians.
///
/// `separation` is the current lead of the target over the ship. The
/// separation closes at `n_ship − n_target`, so the wait is the wrapped
/// angular gap over that rate.
pub fn phase_wait(separation: f64, required: f64, n_ship: f64, n_target: f64) -> Result<f64, EngineError> {
    let relative_rate = n_ship - n_target;
    if relative_rate.abs() <= 1e-12 * n_ship.abs().max(n_target.abs()) {
        return Err(EngineError::PhasingImpossible);
    }
    let wait = if relative_rate > 0.0 {
        wrap_two_pi(separation - required) / relative_rate
    } else {
        wrap_two_pi(required - separation) / -relative_rate
    };
    Ok(wait)
}

/// Current lead of `target` over `ship`, measured in the ship's direction of motion.
pub fn angular_separation(ship: &OrbitElements, target: &OrbitElements) -> Result<f64, EngineError> {
    let (r_ship, _) = ship.to_cartesian()?;
    let (r_target, _) = target.to_cartesian()?;
    Ok(signed_angle_about(r_ship, r_target, ship.plane_normal()))
}

/// Angle between two orbital planes.
pub fn plane_angle_between(a: &OrbitElements, b: &OrbitElements) -> f64 {
    a.plane_normal().dot(b.plane_normal()).clamp(-1.0, 1.0).acos()
}

/// Angle from `from` to `to` about `axis`, in [0, 2π).
fn signed_angle_about(from: DVec3, to: DVec3, axis: DVec3) -> f64 {
    let from = from.reject_from_normalized(axis);
    let to = to.reject_from_normalized(axis);
    let angle = from.cross(to).dot(axis).atan2(from.dot(to));
    wrap_two_pi(angle)
}

fn check_centers(origin: &OrbitElements, destination: &OrbitElements) -> Result<(), EngineError> {
    if origin.center != destination.center {
        return Err(EngineError::CenterMismatch {
            origin: origin.center,
            destination: destination.center,
        });
    }
    Ok(())
}

/// Mean motion of a circular orbit of radius `r`.
fn circular_mean_motion(mu: f64, r: f64) -> f64 {
    (mu / (r * r * r)).sqrt()
}
