//! Universal-variable Kepler solver.
//!
//! One formulation covers ellipses, parabolas and hyperbolas through the
//! Stumpff functions C(z) and S(z), with z = α·χ² and α = 1/a.

use bevy::log::debug;
use bevy::math::DVec3;

/// Newton–Raphson iteration cap.
pub const MAX_ITERATIONS: u32 = 50;

/// Convergence when |Δχ| ≤ `CONVERGENCE_TOLERANCE`·(1 + |χ|).
pub const CONVERGENCE_TOLERANCE: f64 = 1e-10;

/// Largest tolerated deviation of the Lagrange identity f·ġ − ḟ·g = 1.
pub const LAGRANGE_TOLERANCE: f64 = 1e-6;

/// Whether a solver result met its convergence criterion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Confidence {
    #[default]
    High,
    /// Iteration cap reached; the value is the best estimate found.
    Low,
}

/// Stumpff function C(z) - handles elliptic/parabolic/hyperbolic cases.
pub fn stumpff_c(z: f64) -> f64 {
    if z > 1e-4 {
        // Elliptic
        let sqrt_z = z.sqrt();
        (1.0 - sqrt_z.cos()) / z
    } else if z < -1e-4 {
        // Hyperbolic
        let sqrt_neg_z = (-z).sqrt();
        (sqrt_neg_z.cosh() - 1.0) / (-z)
    } else {
        // Parabolic limit: Taylor expansion for numerical stability
        1.0 / 2.0 - z / 24.0 + z * z / 720.0 - z * z * z / 40320.0
    }
}

/// Stumpff function S(z) - handles elliptic/parabolic/hyperbolic cases.
pub fn stumpff_s(z: f64) -> f64 {
    if z > 1e-4 {
        let sqrt_z = z.sqrt();
        (sqrt_z - sqrt_z.sin()) / (sqrt_z * z)
    } else if z < -1e-4 {
        let sqrt_neg_z = (-z).sqrt();
        (sqrt_neg_z.sinh() - sqrt_neg_z) / (sqrt_neg_z * -z)
    } else {
        1.0 / 6.0 - z / 120.0 + z * z / 5040.0 - z * z * z / 362880.0
    }
}

/// √μ·t as a function of the universal anomaly χ.
///
/// # Arguments
/// * `chi` - Universal anomaly
/// * `r0` - Initial radius
/// * `rdotv` - r₀·v₀ at the initial point
/// * `alpha` - 1/a (negative for hyperbolas, zero for parabolas)
/// * `sqrt_mu` - √μ
pub fn universal_time(chi: f64, r0: f64, rdotv: f64, alpha: f64, sqrt_mu: f64) -> f64 {
    let chi2 = chi * chi;
    let z = alpha * chi2;
    r0 * chi * (1.0 - z * stumpff_s(z)) + rdotv / sqrt_mu * chi2 * stumpff_c(z) + chi2 * chi * stumpff_s(z)
}

/// Radius at universal anomaly χ (the derivative of √μ·t with respect to χ).
fn universal_radius(chi: f64, r0: f64, rdotv: f64, alpha: f64, sqrt_mu: f64) -> f64 {
    let chi2 = chi * chi;
    let z = alpha * chi2;
    chi2 * stumpff_c(z) + rdotv / sqrt_mu * chi * (1.0 - z * stumpff_s(z)) + r0 * (1.0 - z * stumpff_c(z))
}

/// Outcome of a universal Kepler solve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KeplerSolution {
    pub chi: f64,
    pub iterations: u32,
    pub confidence: Confidence,
}

/// Solve the universal Kepler equation for χ after time `dt`.
///
/// Non-convergence within [`MAX_ITERATIONS`] is not an error: the best
/// estimate is returned with [`Confidence::Low`].
pub fn solve_universal_kepler(r0: f64, rdotv: f64, alpha: f64, mu: f64, dt: f64) -> KeplerSolution {
    let sqrt_mu = mu.sqrt();
    let target = sqrt_mu * dt;

    let mut chi = initial_guess(r0, rdotv, alpha, mu, dt);

    for iteration in 1..=MAX_ITERATIONS {
        let f = universal_time(chi, r0, rdotv, alpha, sqrt_mu) - target;
        let df = universal_radius(chi, r0, rdotv, alpha, sqrt_mu);
        if !(df.is_finite() && df.abs() > f64::MIN_POSITIVE) {
            break;
        }

        let delta = f / df;
        let next = chi - delta;
        if !next.is_finite() {
            break;
        }
        chi = next;

        if delta.abs() <= CONVERGENCE_TOLERANCE * (1.0 + chi.abs()) {
            return KeplerSolution {
                chi,
                iterations: iteration,
                confidence: Confidence::High,
            };
        }
    }

    debug!(
        "Universal Kepler solver did not converge (dt={dt:.6e}, alpha={alpha:.6e}); using best estimate"
    );
    KeplerSolution {
        chi,
        iterations: MAX_ITERATIONS,
        confidence: Confidence::Low,
    }
}

fn initial_guess(r0: f64, rdotv: f64, alpha: f64, mu: f64, dt: f64) -> f64 {
    let sqrt_mu = mu.sqrt();
    let guess = if alpha * r0 > 1e-6 {
        // Elliptic, not near-parabolic
        sqrt_mu * dt * alpha
    } else if alpha < -1e-12 {
        // Hyperbolic
        let a = 1.0 / alpha;
        let sign_dt = dt.signum();
        sign_dt
            * (-a).sqrt()
            * ((-2.0 * mu * alpha * dt * dt)
                / (rdotv + sign_dt * (-mu * a).sqrt() * (1.0 - r0 * alpha)))
                .ln()
    } else {
        // Near-parabolic
        sqrt_mu * dt / r0
    };

    if guess.is_finite() {
        guess
    } else {
        sqrt_mu * dt / r0
    }
}

/// State after two-body propagation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PropagatedState {
    pub pos: DVec3,
    pub vel: DVec3,
    pub confidence: Confidence,
}

/// Propagate a relative state by `dt` under two-body dynamics using the
/// Lagrange f and g functions.
///
/// The result is tagged [`Confidence::Low`] when the solver hit its
/// iteration cap or the f and g coefficients violate their identity.
pub fn propagate_state(r0: DVec3, v0: DVec3, mu: f64, dt: f64) -> PropagatedState {
    let r0_mag = r0.length();
    if dt == 0.0 || r0_mag == 0.0 {
        return PropagatedState {
            pos: r0,
            vel: v0,
            confidence: Confidence::High,
        };
    }

    let sqrt_mu = mu.sqrt();
    let rdotv = r0.dot(v0);
    let alpha = 2.0 / r0_mag - v0.length_squared() / mu;

    // Whole periods change nothing on an ellipse; the direction of travel is kept
    let dt = if alpha > 1e-12 {
        let period = std::f64::consts::TAU / (sqrt_mu * alpha.powf(1.5));
        if dt.abs() >= period { dt % period } else { dt }
    } else {
        dt
    };

    let solution = solve_universal_kepler(r0_mag, rdotv, alpha, mu, dt);
    let chi = solution.chi;
    let chi2 = chi * chi;
    let z = alpha * chi2;
    let c = stumpff_c(z);
    let s = stumpff_s(z);

    let f = 1.0 - chi2 / r0_mag * c;
    let g = dt - chi2 * chi / sqrt_mu * s;
    let pos = r0 * f + v0 * g;
    let r = pos.length();

    let f_dot = sqrt_mu / (r * r0_mag) * chi * (z * s - 1.0);
    let g_dot = 1.0 - chi2 / r * c;
    let vel = r0 * f_dot + v0 * g_dot;

    let identity = f * g_dot - f_dot * g;
    let confidence = if (identity - 1.0).abs() <= LAGRANGE_TOLERANCE {
        solution.confidence
    } else {
        debug!("Lagrange identity off by {:.3e} after dt={dt:.6e}", identity - 1.0);
        Confidence::Low
    };

    PropagatedState { pos, vel, confidence }
}
