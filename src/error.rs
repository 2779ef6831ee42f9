//! Error type shared by the engine's public API.

use crate::maneuver::ManeuverId;
use crate::types::BodyHandle;

/// Misuse of the engine API.
///
/// Degenerate geometry (circular or equatorial orbits, coincident bodies)
/// is not an error; those cases are handled by fallback formulas.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("body {0} is not registered")]
    UnknownBody(BodyHandle),

    #[error("body {0} is inactive")]
    InactiveBody(BodyHandle),

    #[error("body {0} cannot be its own reference center")]
    SelfReference(BodyHandle),

    #[error("maneuver {0} is not pending")]
    UnknownManeuver(ManeuverId),

    #[error("orbits have different reference centers (origin {origin:?}, destination {destination:?})")]
    CenterMismatch {
        origin: Option<BodyHandle>,
        destination: Option<BodyHandle>,
    },

    #[error("gravitational parameter must be positive, got {0}")]
    NonPositiveMu(f64),

    #[error("invalid orbit elements: {0}")]
    InvalidElements(String),

    #[error("true anomaly {anomaly:.4} rad is beyond the asymptote of an open orbit (e = {eccentricity:.4})")]
    UnreachableAnomaly { anomaly: f64, eccentricity: f64 },

    #[error("maneuver trigger cannot be resolved: {0}")]
    UnresolvableTrigger(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("patched-conic arrival angle {0:.3} deg outside [0, 90)")]
    ArrivalAngleOutOfRange(f64),

    #[error("transfer requires a near-circular origin orbit (e = {0:.4})")]
    NonCircularOrigin(f64),

    #[error("phasing impossible: origin and destination have equal mean motion")]
    PhasingImpossible,

    #[error("rendezvous requires coplanar orbits (plane angle {0:.4} rad)")]
    NonCoplanarRendezvous(f64),

    #[error("body {0} is not a composite")]
    NotComposite(BodyHandle),

    #[error("composite needs at least two active massive members")]
    CompositeTooSmall,
}
