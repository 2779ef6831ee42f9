//! Energy and angular momentum bookkeeping for the massive pool.

use bevy::log::warn;
use bevy::math::DVec3;

use super::gravity::ForceLaw;
use super::state::GravityState;

/// Total mechanical energy of the active massive bodies.
pub fn total_energy(state: &GravityState, law: ForceLaw, gravitational_constant: f64) -> f64 {
    let massive: Vec<_> = state
        .bodies()
        .iter()
        .filter(|b| b.active && !b.is_massless())
        .collect();

    let kinetic: f64 = massive.iter().map(|b| b.kinetic_energy()).sum();
    let mut potential = 0.0;
    for i in 0..massive.len() {
        for j in (i + 1)..massive.len() {
            let r = (massive[j].pos - massive[i].pos).length();
            if r > 0.0 {
                potential += gravitational_constant * massive[i].mass * massive[j].mass * law.potential(r);
            }
        }
    }
    kinetic + potential
}

/// Total angular momentum Σ m·(r × v) of the active massive bodies about the origin.
pub fn total_angular_momentum(state: &GravityState) -> DVec3 {
    state
        .bodies()
        .iter()
        .filter(|b| b.active && !b.is_massless())
        .map(|b| b.pos.cross(b.vel) * b.mass)
        .sum()
}

/// Relative drift against the captured baseline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Drift {
    pub energy: f64,
    pub angular_momentum: f64,
}

impl Drift {
    pub fn max(&self) -> f64 {
        self.energy.max(self.angular_momentum)
    }
}

/// Watches the massive pool for drift in the conserved quantities.
///
/// Only reports; never corrects the state.
#[derive(Clone, Debug)]
pub struct ConservationMonitor {
    tolerance: f64,
    baseline_energy: f64,
    baseline_momentum: DVec3,
    warned: bool,
}

impl ConservationMonitor {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            baseline_energy: 0.0,
            baseline_momentum: DVec3::ZERO,
            warned: false,
        }
    }

    /// Capture a fresh baseline. Call after any deliberate change (maneuver, add/remove).
    pub fn resync(&mut self, state: &GravityState, law: ForceLaw, gravitational_constant: f64) {
        self.baseline_energy = total_energy(state, law, gravitational_constant);
        self.baseline_momentum = total_angular_momentum(state);
        self.warned = false;
    }

    /// Measure drift and warn once the first time it exceeds the tolerance.
    pub fn check(&mut self, state: &GravityState, law: ForceLaw, gravitational_constant: f64) -> Drift {
        let energy = total_energy(state, law, gravitational_constant);
        let momentum = total_angular_momentum(state);

        let drift = Drift {
            energy: relative(energy - self.baseline_energy, self.baseline_energy),
            angular_momentum: relative(
                (momentum - self.baseline_momentum).length(),
                self.baseline_momentum.length(),
            ),
        };

        if drift.max() > self.tolerance && !self.warned {
            warn!(
                "Conservation drift exceeds tolerance {:.1e} at t={:.3}: energy {:.2e}, angular momentum {:.2e}",
                self.tolerance,
                state.time(),
                drift.energy,
                drift.angular_momentum
            );
            self.warned = true;
        }
        drift
    }

    pub fn has_warned(&self) -> bool {
        self.warned
    }
}

fn relative(delta: f64, baseline: f64) -> f64 {
    let scale = baseline.abs();
    if scale > f64::EPSILON {
        delta.abs() / scale
    } else {
        delta.abs()
    }
}
