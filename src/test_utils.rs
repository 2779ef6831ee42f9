//! Test utilities for orbital mechanics tests.
//!
//! Fixtures use dimensionless units: a central body of mass 1 with G = 1,
//! so μ = 1 unless stated otherwise.

use bevy::math::DVec3;

use crate::types::BodyState;

/// Fixtures for creating test orbital states.
pub mod fixtures {
    use super::*;

    /// Body on a circular orbit of radius `r` in the xy plane.
    ///
    /// Placed on +x moving toward +y.
    pub fn circular_orbit(r: f64, mu: f64) -> BodyState {
        let v = (mu / r).sqrt();
        BodyState::massless(DVec3::new(r, 0.0, 0.0), DVec3::new(0.0, v, 0.0))
    }

    /// Body at periapsis of an ellipse with the given eccentricity.
    pub fn elliptical_orbit(periapsis: f64, eccentricity: f64, mu: f64) -> BodyState {
        assert!(
            (0.0..1.0).contains(&eccentricity),
            "Eccentricity must be in [0, 1) for elliptical orbit"
        );
        let a = periapsis / (1.0 - eccentricity);
        // Vis-viva at periapsis
        let v = (mu * (2.0 / periapsis - 1.0 / a)).sqrt();
        BodyState::massless(DVec3::new(periapsis, 0.0, 0.0), DVec3::new(0.0, v, 0.0))
    }

    /// Circular orbit of radius `r` tilted by `inclination` about the x axis.
    pub fn inclined_circular_orbit(r: f64, inclination: f64, mu: f64) -> BodyState {
        let v = (mu / r).sqrt();
        BodyState::massless(
            DVec3::new(r, 0.0, 0.0),
            DVec3::new(0.0, v * inclination.cos(), v * inclination.sin()),
        )
    }

    /// Hyperbolic trajectory starting at `r` with `factor` × escape velocity.
    pub fn escape_trajectory(r: f64, factor: f64, mu: f64) -> BodyState {
        let v = (2.0 * mu / r).sqrt() * factor;
        BodyState::massless(DVec3::new(r, 0.0, 0.0), DVec3::new(0.0, v, 0.0))
    }
}

/// Assertions for verifying physical invariants.
pub mod assertions {
    use super::*;

    /// Specific orbital energy v²/2 − μ/r.
    pub fn orbital_energy(pos: DVec3, vel: DVec3, mu: f64) -> f64 {
        0.5 * vel.length_squared() - mu / pos.length()
    }

    /// Specific angular momentum r × v.
    pub fn angular_momentum(pos: DVec3, vel: DVec3) -> DVec3 {
        pos.cross(vel)
    }

    /// Kepler's third law T = 2π·√(a³/μ).
    pub fn orbital_period(semi_major_axis: f64, mu: f64) -> f64 {
        std::f64::consts::TAU * (semi_major_axis.powi(3) / mu).sqrt()
    }

    /// Assert two vectors agree to a relative tolerance of their scale.
    ///
    /// # Panics
    /// Panics if `|a - b| > tolerance * max(|a|, |b|, 1e-12)`.
    pub fn assert_vec_close(a: DVec3, b: DVec3, tolerance: f64, what: &str) {
        let scale = a.length().max(b.length()).max(1e-12);
        let error = (a - b).length() / scale;
        assert!(
            error <= tolerance,
            "{what} mismatch: {a:?} vs {b:?} (relative error {error:.3e}, tolerance {tolerance:.1e})"
        );
    }

    /// Assert that energy is conserved within tolerance.
    ///
    /// # Panics
    /// Panics if relative energy drift exceeds tolerance.
    pub fn assert_energy_conserved(initial_energy: f64, final_energy: f64, tolerance: f64) {
        let drift = if initial_energy.abs() > 1e-10 {
            ((final_energy - initial_energy) / initial_energy).abs()
        } else {
            (final_energy - initial_energy).abs()
        };
        assert!(
            drift <= tolerance,
            "Energy not conserved: initial={initial_energy:.6e}, final={final_energy:.6e}, drift={drift:.6e}, tolerance={tolerance:.6e}"
        );
    }
}

/// Utilities for creating headless Bevy apps for testing.
pub mod bevy_test {
    use bevy::prelude::*;

    /// Create a minimal Bevy app for testing without rendering.
    pub fn headless_app() -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_circular_orbit_has_correct_velocity() {
        let state = fixtures::circular_orbit(4.0, 1.0);
        assert_relative_eq!(state.vel.length(), 0.5, epsilon = 1e-15);
    }

    #[test]
    fn test_escape_trajectory_is_unbound() {
        let state = fixtures::escape_trajectory(2.0, 1.1, 1.0);
        assert!(assertions::orbital_energy(state.pos, state.vel, 1.0) > 0.0);
    }

    #[test]
    fn test_inclined_orbit_keeps_speed() {
        let state = fixtures::inclined_circular_orbit(1.0, 0.7, 1.0);
        assert_relative_eq!(state.vel.length(), 1.0, epsilon = 1e-15);
        assert!(assertions::angular_momentum(state.pos, state.vel).y < 0.0);
    }

    #[test]
    fn test_orbital_period_unit_circle() {
        assert_relative_eq!(
            assertions::orbital_period(1.0, 1.0),
            std::f64::consts::TAU,
            epsilon = 1e-15
        );
    }
}
