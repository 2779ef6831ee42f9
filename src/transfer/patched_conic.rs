//! Patched-conic departure from a circular parking orbit to a secondary's SOI.
//!
//! The transfer ellipse has its periapsis on the parking orbit and reaches
//! the secondary's sphere of influence at the point fixed by the arrival
//! angle λ₁. Only the departure burn is planned; the SOI monitor picks up
//! the crossing.

use std::f64::consts::FRAC_PI_2;

use bevy::log::info;

use super::{
    COPLANAR_TOLERANCE, PatchedConicArrival, Transfer, TransferKind, angular_separation,
    check_centers, circular_mean_motion, phase_wait, plane_angle_between,
};
use crate::error::EngineError;
use crate::maneuver::{DeltaV, Maneuver, ManeuverTrigger};
use crate::orbit::OrbitElements;
use crate::types::{BodyHandle, RAD_TO_DEG};

/// Parking orbits more eccentric than this are rejected.
pub const MAX_ORIGIN_ECCENTRICITY: f64 = 0.05;

/// Laplace sphere-of-influence radius D·(m_s/m_p)^(2/5).
pub fn soi_radius(distance: f64, secondary_mass: f64, primary_mass: f64) -> f64 {
    distance * (secondary_mass / primary_mass).powf(0.4)
}

/// Inputs of [`plan_patched_conic`].
#[derive(Clone, Copy, Debug)]
pub struct PatchedConicRequest<'a> {
    pub ship: BodyHandle,
    /// Ship's parking orbit about the primary (epoch = planning time)
    pub origin: &'a OrbitElements,
    /// Secondary's orbit about the same primary (epoch = planning time)
    pub secondary: &'a OrbitElements,
    pub primary_mass: f64,
    pub secondary_mass: f64,
    /// λ₁ in radians, in [0, π/2)
    pub arrival_angle: f64,
}

/// Plan the departure burn of a patched-conic transfer.
pub fn plan_patched_conic(request: PatchedConicRequest<'_>, now: f64) -> Result<Transfer, EngineError> {
    let PatchedConicRequest {
        ship,
        origin,
        secondary,
        primary_mass,
        secondary_mass,
        arrival_angle,
    } = request;

    if !(0.0..FRAC_PI_2).contains(&arrival_angle) {
        return Err(EngineError::ArrivalAngleOutOfRange(arrival_angle * RAD_TO_DEG));
    }
    if origin.eccentricity > MAX_ORIGIN_ECCENTRICITY {
        return Err(EngineError::NonCircularOrigin(origin.eccentricity));
    }
    check_centers(origin, secondary)?;
    let plane_angle = plane_angle_between(origin, secondary);
    if plane_angle > COPLANAR_TOLERANCE {
        return Err(EngineError::NonCoplanarRendezvous(plane_angle));
    }
    if primary_mass <= 0.0 || secondary_mass <= 0.0 {
        return Err(EngineError::InvalidElements(format!(
            "patched conic needs positive masses, got primary {primary_mass} and secondary {secondary_mass}"
        )));
    }

    let mu = origin.mu;
    let r0 = origin.semi_parameter;
    let distance = secondary.semi_parameter;
    let rs = soi_radius(distance, secondary_mass, primary_mass);

    // Law of cosines in the primary–secondary–entry triangle
    let r1 = (distance * distance + rs * rs - 2.0 * distance * rs * arrival_angle.cos()).sqrt();
    if r1 <= r0 {
        return Err(EngineError::InvalidElements(format!(
            "SOI entry radius {r1:.6} does not lie outside the parking orbit {r0:.6}"
        )));
    }

    let r_apo = distance.max(r1);
    let a = 0.5 * (r0 + r_apo);
    let e = (r_apo - r0) / (r_apo + r0);
    let p = a * (1.0 - e * e);

    let true_anomaly = ((p / r1 - 1.0) / e).clamp(-1.0, 1.0).acos();
    let ecc_anomaly = 2.0 * (((1.0 - e) / (1.0 + e)).sqrt() * (0.5 * true_anomaly).tan()).atan();
    let n_transfer = (mu / (a * a * a)).sqrt();
    let time_of_flight = (ecc_anomaly - e * ecc_anomaly.sin()) / n_transfer;

    let phase_angle = (rs * arrival_angle.sin() / r1).clamp(-1.0, 1.0).asin();
    let n_ship = circular_mean_motion(mu, r0);
    let n_secondary = circular_mean_motion(secondary.mu, distance);
    let required_lead = true_anomaly + phase_angle - n_secondary * time_of_flight;
    let wait_time = phase_wait(
        angular_separation(origin, secondary)?,
        required_lead,
        n_ship,
        n_secondary,
    )?;

    let v_periapsis = (mu * (2.0 / r0 - 1.0 / a)).sqrt();
    let v_circular = (mu / r0).sqrt();
    let dv = v_periapsis - v_circular;

    let mut departure = Maneuver::new(ship, ManeuverTrigger::At(now + wait_time), DeltaV::Boost(dv))
        .labeled("patched-conic departure");
    if let Some(center) = origin.center {
        departure = departure.relative_to(center);
    }

    info!(
        "Planned patched-conic transfer for {}: λ₁ {:.2}°, r₁ {:.4}, Rs {:.4}, Δv {:.6}, TOF {:.3}, wait {:.3}",
        ship,
        arrival_angle * RAD_TO_DEG,
        r1,
        rs,
        dv,
        time_of_flight,
        wait_time
    );

    Ok(Transfer {
        kind: TransferKind::PatchedConic,
        maneuvers: vec![departure],
        time_of_flight,
        wait_time,
        total_delta_v: dv.abs(),
        transfer_semi_major_axis: a,
        arrival: Some(PatchedConicArrival {
            arrival_angle,
            radius: r1,
            true_anomaly,
            phase_angle,
            soi_radius: rs,
        }),
    })
}
