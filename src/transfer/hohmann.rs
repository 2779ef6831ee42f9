//! Two-burn Hohmann transfer between orbits about a shared center.

use std::f64::consts::PI;

use bevy::log::info;
use bevy::math::DVec3;

use super::{
    COPLANAR_TOLERANCE, Transfer, TransferKind, angular_separation, check_centers,
    circular_mean_motion, phase_wait, plane_angle_between,
};
use crate::error::EngineError;
use crate::maneuver::{DeltaV, Maneuver, ManeuverTrigger};
use crate::orbit::OrbitElements;
use crate::types::{BodyHandle, RAD_TO_DEG};

/// Plan a Hohmann transfer for `ship` from `origin` to `destination`.
///
/// Orbit radii are taken as the semi-parameters, which for circular orbits
/// is the radius. Coplanar transfers use two tangential boosts. Otherwise
/// the departure burn waits for the nearer node of the two planes and the
/// plane change is folded into the arrival burn.
///
/// With `rendezvous`, the departure waits until `destination`'s body will be
/// at the arrival point when the ship gets there (coplanar orbits only).
///
/// # Arguments
/// * `ship` - Body performing the burns
/// * `origin` - Ship's current orbit (epoch = `now`)
/// * `destination` - Target orbit; for rendezvous, the target body's orbit at `now`
/// * `rendezvous` - Phase the departure with the target body
/// * `now` - Current simulation time
pub fn plan_hohmann(
    ship: BodyHandle,
    origin: &OrbitElements,
    destination: &OrbitElements,
    rendezvous: bool,
    now: f64,
) -> Result<Transfer, EngineError> {
    check_centers(origin, destination)?;

    let mu = origin.mu;
    let r1 = origin.semi_parameter;
    let r2 = destination.semi_parameter;
    let a = 0.5 * (r1 + r2);

    let dv1 = (mu / r1).sqrt() * ((2.0 * r2 / (r1 + r2)).sqrt() - 1.0);
    let dv2 = (mu / r2).sqrt() * (1.0 - (2.0 * r1 / (r1 + r2)).sqrt());
    let time_of_flight = PI * (a.powi(3) / mu).sqrt();

    let plane_angle = plane_angle_between(origin, destination);
    let coplanar = plane_angle <= COPLANAR_TOLERANCE;

    let mut transfer = if coplanar {
        let wait_time = if rendezvous {
            let n1 = circular_mean_motion(mu, r1);
            let n2 = circular_mean_motion(mu, r2);
            let required = PI - n2 * time_of_flight;
            phase_wait(angular_separation(origin, destination)?, required, n1, n2)?
        } else {
            0.0
        };
        coplanar_burns(ship, origin, dv1, dv2, wait_time, time_of_flight, now)
    } else {
        if rendezvous {
            return Err(EngineError::NonCoplanarRendezvous(plane_angle));
        }
        plane_change_burns(ship, origin, destination, dv1, time_of_flight, now)?
    };
    transfer.transfer_semi_major_axis = a;

    info!(
        "Planned Hohmann transfer for {}: r {:.4} → {:.4}, Δv {:.6} + {:.6}, TOF {:.3}, wait {:.3}, plane change {:.3}°",
        ship,
        r1,
        r2,
        dv1,
        dv2,
        time_of_flight,
        transfer.wait_time,
        plane_angle * RAD_TO_DEG
    );
    Ok(transfer)
}

fn coplanar_burns(
    ship: BodyHandle,
    origin: &OrbitElements,
    dv1: f64,
    dv2: f64,
    wait_time: f64,
    time_of_flight: f64,
    now: f64,
) -> Transfer {
    let depart = now + wait_time;
    let mut maneuvers = vec![
        Maneuver::new(ship, ManeuverTrigger::At(depart), DeltaV::Boost(dv1)).labeled("hohmann departure"),
        Maneuver::new(ship, ManeuverTrigger::At(depart + time_of_flight), DeltaV::Boost(dv2))
            .labeled("hohmann arrival"),
    ];
    if let Some(center) = origin.center {
        maneuvers = maneuvers.into_iter().map(|m| m.relative_to(center)).collect();
    }

    Transfer {
        kind: TransferKind::Hohmann,
        maneuvers,
        time_of_flight,
        wait_time,
        total_delta_v: dv1.abs() + dv2.abs(),
        transfer_semi_major_axis: 0.0,
        arrival: None,
    }
}

fn plane_change_burns(
    ship: BodyHandle,
    origin: &OrbitElements,
    destination: &OrbitElements,
    dv1: f64,
    time_of_flight: f64,
    now: f64,
) -> Result<Transfer, EngineError> {
    let h1 = origin.plane_normal();
    let h2 = destination.plane_normal();
    let line = h1.cross(h2).normalize();

    // The ship crosses the node line twice per orbit; depart at whichever comes first
    let node_anomaly = |dir: DVec3| {
        let local = origin.perifocal_rotation().inverse() * dir;
        local.y.atan2(local.x)
    };
    let candidates = [line, -line].map(|dir| (dir, origin.time_to_true_anomaly(node_anomaly(dir))));
    let (node_dir, wait_time) = candidates
        .into_iter()
        .filter_map(|(dir, t)| t.map(|t| (dir, t)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .ok_or_else(|| {
            EngineError::UnresolvableTrigger("ship never reaches the node line".to_string())
        })?;

    // Arrival happens on the opposite side of the center
    let arrival_dir = -node_dir;
    let r1 = origin.semi_parameter;
    let r2 = destination.semi_parameter;
    let mu = origin.mu;
    let arrival_speed = (mu / r2).sqrt();
    let transfer_speed = (mu / r2).sqrt() * (2.0 * r1 / (r1 + r2)).sqrt();
    let plane_change =
        h2.cross(arrival_dir) * arrival_speed - h1.cross(arrival_dir) * transfer_speed;

    let depart = now + wait_time;
    let mut departure =
        Maneuver::new(ship, ManeuverTrigger::At(depart), DeltaV::Boost(dv1)).labeled("hohmann departure");
    if let Some(center) = origin.center {
        departure = departure.relative_to(center);
    }
    let arrival = Maneuver::new(
        ship,
        ManeuverTrigger::At(depart + time_of_flight),
        DeltaV::Vector(plane_change),
    )
    .labeled("hohmann arrival + plane change");

    Ok(Transfer {
        kind: TransferKind::Hohmann,
        maneuvers: vec![departure, arrival],
        time_of_flight,
        wait_time,
        total_delta_v: dv1.abs() + plane_change.length(),
        transfer_semi_major_axis: 0.0,
        arrival: None,
    })
}
