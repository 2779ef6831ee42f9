//! Orbit elements in the universal formulation.
//!
//! Elements are built from a relative Cartesian state and converted back
//! through the perifocal frame. Ellipses, parabolas and hyperbolas share one
//! representation based on the semi-parameter `p`, which stays finite for
//! every conic.

mod universal;

#[cfg(test)]
mod proptest_orbit;

use std::f64::consts::{PI, TAU};

use bevy::math::{DQuat, DVec3};

pub use universal::{
    CONVERGENCE_TOLERANCE, Confidence, KeplerSolution, MAX_ITERATIONS, PropagatedState,
    propagate_state, solve_universal_kepler, stumpff_c, stumpff_s, universal_time,
};

use crate::error::EngineError;
use crate::physics::GravityState;
use crate::types::{BodyHandle, wrap_two_pi};

/// Eccentricities below this are treated as circular (ω folds into the phase).
pub const CIRCULAR_EPS: f64 = 1e-10;

/// Node vectors shorter than this fraction of |h| are treated as equatorial.
pub const EQUATORIAL_EPS: f64 = 1e-10;

/// |e − 1| below this is treated as parabolic.
pub const PARABOLIC_EPS: f64 = 1e-9;

/// Semi-parameter of rectilinear (zero angular momentum) motion, as a fraction of the radius.
const RECTILINEAR_P_FRACTION: f64 = 1e-6;

/// Conic section classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Conic {
    Elliptic,
    Parabolic,
    Hyperbolic,
}

/// Orbit of a body about a reference center.
///
/// All angles in radians. Degenerate cases fold the undefined angle into its
/// neighbour: equatorial orbits have Ω = 0 with ω measured from +x, circular
/// orbits have ω = 0 with the phase measured from the node (or +x).
#[derive(Clone, Debug, PartialEq)]
pub struct OrbitElements {
    /// Semi-parameter p = h²/μ (> 0)
    pub semi_parameter: f64,
    /// Eccentricity (≥ 0)
    pub eccentricity: f64,
    /// Inclination in [0, π]
    pub inclination: f64,
    /// Longitude of the ascending node Ω in [0, 2π)
    pub ascending_node: f64,
    /// Argument of periapsis ω in [0, 2π)
    pub argument_of_periapsis: f64,
    /// True anomaly ν at `epoch`, in [0, 2π)
    pub true_anomaly: f64,
    /// Gravitational parameter G·(m_center + m_body) (> 0)
    pub mu: f64,
    /// Reference center, `None` for the world origin
    pub center: Option<BodyHandle>,
    /// Simulation time the phase refers to
    pub epoch: f64,
}

impl OrbitElements {
    /// Derive elements from a state relative to the center.
    ///
    /// # Arguments
    /// * `r` - Position relative to the center
    /// * `v` - Velocity relative to the center
    /// * `mu` - Gravitational parameter
    /// * `center` - Reference center handle (for bookkeeping only)
    /// * `epoch` - Simulation time of the state
    pub fn from_cartesian(
        r: DVec3,
        v: DVec3,
        mu: f64,
        center: Option<BodyHandle>,
        epoch: f64,
    ) -> Result<Self, EngineError> {
        if !(mu > 0.0 && mu.is_finite()) {
            return Err(EngineError::NonPositiveMu(mu));
        }
        let r_mag = r.length();
        if !(r_mag > 0.0 && r.is_finite() && v.is_finite()) {
            return Err(EngineError::InvalidElements(format!(
                "state must be finite with non-zero radius (r = {r:?}, v = {v:?})"
            )));
        }

        let h = r.cross(v);
        let h_mag = h.length();
        if h_mag <= 1e-14 * r_mag * v.length().max(f64::MIN_POSITIVE) || h_mag == 0.0 {
            return Ok(Self::rectilinear(r, v, mu, center, epoch));
        }

        let e_vec = v.cross(h) / mu - r / r_mag;
        let eccentricity = e_vec.length();
        let semi_parameter = h_mag * h_mag / mu;
        let inclination = (h.z / h_mag).clamp(-1.0, 1.0).acos();

        let node = DVec3::Z.cross(h);
        let ascending_node = if node.length() > EQUATORIAL_EPS * h_mag {
            wrap_two_pi(node.y.atan2(node.x))
        } else {
            0.0
        };

        let plane = plane_rotation(ascending_node, inclination);
        let argument_of_periapsis = if eccentricity > CIRCULAR_EPS {
            wrap_two_pi(plane_angle(plane, e_vec))
        } else {
            0.0
        };
        let true_anomaly = wrap_two_pi(plane_angle(plane, r) - argument_of_periapsis);

        Ok(Self {
            semi_parameter,
            eccentricity,
            inclination,
            ascending_node,
            argument_of_periapsis,
            true_anomaly,
            mu,
            center,
            epoch,
        })
    }

    /// Radial fallback: a degenerate parabola through the current position.
    ///
    /// Describes the direction and radius but not the speed, so it does not
    /// round-trip through [`to_cartesian`](Self::to_cartesian).
    fn rectilinear(r: DVec3, v: DVec3, mu: f64, center: Option<BodyHandle>, epoch: f64) -> Self {
        let r_mag = r.length();
        let r_hat = r / r_mag;
        // Any plane containing r will do; prefer one containing +z
        let mut normal = r_hat.cross(DVec3::Z);
        if normal.length_squared() < 1e-20 {
            normal = r_hat.cross(DVec3::X);
        }
        let normal = normal.normalize();

        let inclination = normal.z.clamp(-1.0, 1.0).acos();
        let node = DVec3::Z.cross(normal);
        let ascending_node = if node.length() > EQUATORIAL_EPS {
            wrap_two_pi(node.y.atan2(node.x))
        } else {
            0.0
        };

        let semi_parameter = RECTILINEAR_P_FRACTION * r_mag;
        let cos_nu = (RECTILINEAR_P_FRACTION - 1.0).clamp(-1.0, 1.0);
        let nu = if r.dot(v) >= 0.0 { cos_nu.acos() } else { -cos_nu.acos() };
        let plane = plane_rotation(ascending_node, inclination);

        Self {
            semi_parameter,
            eccentricity: 1.0,
            inclination,
            ascending_node,
            argument_of_periapsis: wrap_two_pi(plane_angle(plane, r) - nu),
            true_anomaly: wrap_two_pi(nu),
            mu,
            center,
            epoch,
        }
    }

    /// Relative state at the element epoch.
    pub fn to_cartesian(&self) -> Result<(DVec3, DVec3), EngineError> {
        self.state_at_true_anomaly(self.true_anomaly)
    }

    /// Relative state at an arbitrary true anomaly on this conic.
    ///
    /// Fails with [`EngineError::UnreachableAnomaly`] beyond a hyperbola's asymptote.
    pub fn state_at_true_anomaly(&self, nu: f64) -> Result<(DVec3, DVec3), EngineError> {
        let e = self.eccentricity;
        let p = self.semi_parameter;
        let (sin_nu, cos_nu) = nu.sin_cos();
        let denom = 1.0 + e * cos_nu;
        if denom <= 1e-12 {
            return Err(EngineError::UnreachableAnomaly {
                anomaly: nu,
                eccentricity: e,
            });
        }

        let r = p / denom;
        let pos = DVec3::new(r * cos_nu, r * sin_nu, 0.0);
        let vel = DVec3::new(-sin_nu, e + cos_nu, 0.0) * (self.mu / p).sqrt();

        let q = self.perifocal_rotation();
        Ok((q * pos, q * vel))
    }

    /// Rotation Rz(Ω)·Rx(i)·Rz(ω) from the perifocal frame to the reference frame.
    pub fn perifocal_rotation(&self) -> DQuat {
        plane_rotation(self.ascending_node, self.inclination)
            * DQuat::from_rotation_z(self.argument_of_periapsis)
    }

    /// Unit normal of the orbital plane (direction of h).
    pub fn plane_normal(&self) -> DVec3 {
        plane_rotation(self.ascending_node, self.inclination) * DVec3::Z
    }

    /// Unit vector toward periapsis.
    pub fn periapsis_direction(&self) -> DVec3 {
        self.perifocal_rotation() * DVec3::X
    }

    /// Same orbit, re-tagged with another center.
    pub fn with_center(mut self, center: Option<BodyHandle>) -> Self {
        self.center = center;
        self
    }

    pub fn conic(&self) -> Conic {
        if (self.eccentricity - 1.0).abs() < PARABOLIC_EPS {
            Conic::Parabolic
        } else if self.eccentricity < 1.0 {
            Conic::Elliptic
        } else {
            Conic::Hyperbolic
        }
    }

    /// 1/a; negative for hyperbolas, zero for parabolas.
    pub fn alpha(&self) -> f64 {
        if self.conic() == Conic::Parabolic {
            0.0
        } else {
            (1.0 - self.eccentricity * self.eccentricity) / self.semi_parameter
        }
    }

    /// Semi-major axis; infinite for a parabola, negative for a hyperbola.
    pub fn semi_major_axis(&self) -> f64 {
        match self.conic() {
            Conic::Parabolic => f64::INFINITY,
            _ => self.semi_parameter / (1.0 - self.eccentricity * self.eccentricity),
        }
    }

    pub fn periapsis(&self) -> f64 {
        self.semi_parameter / (1.0 + self.eccentricity)
    }

    /// Apoapsis radius; `None` for open orbits.
    pub fn apoapsis(&self) -> Option<f64> {
        (self.conic() == Conic::Elliptic).then(|| self.semi_parameter / (1.0 - self.eccentricity))
    }

    /// Orbital period; `None` for open orbits.
    pub fn period(&self) -> Option<f64> {
        (self.conic() == Conic::Elliptic).then(|| TAU / self.mean_motion())
    }

    /// Mean motion √(μ/|a|³). For a parabola, the Barker rate 2√(μ/p³).
    pub fn mean_motion(&self) -> f64 {
        match self.conic() {
            Conic::Parabolic => 2.0 * (self.mu / self.semi_parameter.powi(3)).sqrt(),
            _ => (self.mu / self.semi_major_axis().abs().powi(3)).sqrt(),
        }
    }

    /// Specific orbital energy −μ(1 − e²)/(2p).
    pub fn specific_energy(&self) -> f64 {
        -0.5 * self.mu * self.alpha()
    }

    /// Specific angular momentum √(μp).
    pub fn specific_angular_momentum(&self) -> f64 {
        (self.mu * self.semi_parameter).sqrt()
    }

    /// Radius at the element epoch.
    pub fn radius(&self) -> f64 {
        self.semi_parameter / (1.0 + self.eccentricity * self.true_anomaly.cos())
    }

    /// Time from the epoch until the body reaches true anomaly `nu`.
    ///
    /// Closed ellipses always give a value in [0, period). Open orbits
    /// give `None` when the anomaly was already passed or is unreachable.
    pub fn time_to_true_anomaly(&self, nu: f64) -> Option<f64> {
        let e = self.eccentricity;
        let nu0 = self.true_anomaly;
        let chi = match self.conic() {
            Conic::Elliptic => {
                let a = self.semi_major_axis();
                let delta = wrap_two_pi(eccentric_anomaly(nu, e) - eccentric_anomaly(nu0, e));
                a.sqrt() * delta
            }
            Conic::Hyperbolic => {
                if 1.0 + e * nu.cos() <= 1e-12 {
                    return None;
                }
                let a = self.semi_major_axis();
                let delta = hyperbolic_anomaly(nu, e) - hyperbolic_anomaly(nu0, e);
                if delta < 0.0 {
                    return None;
                }
                (-a).sqrt() * delta
            }
            Conic::Parabolic => {
                let target = signed_angle(nu);
                if target.abs() >= PI {
                    return None;
                }
                let delta = (target / 2.0).tan() - (signed_angle(nu0) / 2.0).tan();
                if delta < 0.0 {
                    return None;
                }
                self.semi_parameter.sqrt() * delta
            }
        };
        if !chi.is_finite() {
            return None;
        }

        let r0 = self.radius();
        let sqrt_mu = self.mu.sqrt();
        let rdotv = r0 * (self.mu / self.semi_parameter).sqrt() * e * nu0.sin();
        Some(universal_time(chi, r0, rdotv, self.alpha(), sqrt_mu) / sqrt_mu)
    }

    /// Time until the next periapsis passage.
    pub fn time_to_periapsis(&self) -> Option<f64> {
        self.time_to_true_anomaly(0.0)
    }

    /// Time until the next apoapsis passage (closed orbits only).
    pub fn time_to_apoapsis(&self) -> Option<f64> {
        if self.conic() != Conic::Elliptic {
            return None;
        }
        self.time_to_true_anomaly(PI)
    }

    /// Relative state after `dt`, propagated analytically.
    pub fn state_after(&self, dt: f64) -> Result<PropagatedState, EngineError> {
        let (r, v) = self.to_cartesian()?;
        Ok(propagate_state(r, v, self.mu, dt))
    }

    /// Elements at `epoch + dt`.
    pub fn propagate(&self, dt: f64) -> Result<(Self, Confidence), EngineError> {
        let state = self.state_after(dt)?;
        let elements = Self::from_cartesian(state.pos, state.vel, self.mu, self.center, self.epoch + dt)?;
        Ok((elements, state.confidence))
    }
}

/// Elements of `body` about `center`, taken from the world state.
///
/// μ = G·(m_center + m_body).
pub fn relative_elements(
    state: &GravityState,
    body: BodyHandle,
    center: BodyHandle,
    gravitational_constant: f64,
) -> Result<OrbitElements, EngineError> {
    if body == center {
        return Err(EngineError::SelfReference(body));
    }
    let b = state.try_get(body)?;
    let c = state.try_get(center)?;
    let mu = gravitational_constant * (c.mass + b.mass);
    OrbitElements::from_cartesian(b.pos - c.pos, b.vel - c.vel, mu, Some(center), state.time())
}

/// Rz(Ω)·Rx(i): takes the reference frame onto the orbital plane.
fn plane_rotation(ascending_node: f64, inclination: f64) -> DQuat {
    DQuat::from_rotation_z(ascending_node) * DQuat::from_rotation_x(inclination)
}

/// Angle of `v` in the orbital plane, measured from the node line.
fn plane_angle(plane: DQuat, v: DVec3) -> f64 {
    let local = plane.inverse() * v;
    local.y.atan2(local.x)
}

/// Angle in (−π, π].
fn signed_angle(angle: f64) -> f64 {
    let wrapped = wrap_two_pi(angle);
    if wrapped > PI { wrapped - TAU } else { wrapped }
}

fn eccentric_anomaly(nu: f64, e: f64) -> f64 {
    let (sin_nu, cos_nu) = nu.sin_cos();
    ((1.0 - e * e).sqrt() * sin_nu).atan2(e + cos_nu)
}

fn hyperbolic_anomaly(nu: f64, e: f64) -> f64 {
    let half = signed_angle(nu) / 2.0;
    2.0 * (((e - 1.0) / (e + 1.0)).sqrt() * half.tan()).atanh()
}
