//! Velocity-Verlet integration of the body pools.
//!
//! Massive bodies are advanced together with pairwise accelerations.
//! Massless bodies follow in a second pass that only samples the massive
//! trajectory, so they can use a different substep count.
//!
//! Velocity Verlet (kick-drift-kick) is:
//! - 2nd order accurate
//! - Symplectic (bounded energy error over long runs)
//! - Time-reversible

use bevy::math::DVec3;

use super::gravity::{ForceLaw, SourceLanes, massive_accelerations};
use super::state::GravityState;
use crate::config::EngineConfig;

// =============================================================================
// Lifecycle
// =============================================================================

/// What a running integrator is doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunPhase {
    /// Live time advances every tick.
    Evolve,
    /// A forward prediction is being computed; live time holds.
    TrajectoryRecompute,
    /// Live time holds until resumed.
    Paused,
}

/// Integrator lifecycle: `NotRunning → Running(phase) → NotRunning`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IntegratorMode {
    #[default]
    NotRunning,
    Running(RunPhase),
}

impl IntegratorMode {
    /// Whether a tick should advance live time.
    pub fn advances_time(self) -> bool {
        self == IntegratorMode::Running(RunPhase::Evolve)
    }

    pub fn is_running(self) -> bool {
        matches!(self, IntegratorMode::Running(_))
    }
}

// =============================================================================
// Integrator
// =============================================================================

/// Fixed-substep velocity-Verlet integrator.
///
/// Owns only settings and scratch buffers; all body data lives in
/// [`GravityState`], so one integrator can drive any number of forks.
#[derive(Clone, Debug)]
pub struct Integrator {
    pub force_law: ForceLaw,
    pub gravitational_constant: f64,
    pub min_separation: f64,
    pub steps_massive: u32,
    pub steps_massless: u32,
    mode: IntegratorMode,

    // Scratch, reused between calls
    massive: Vec<usize>,
    massless: Vec<usize>,
    gms: Vec<f64>,
    positions: Vec<DVec3>,
    acc_scratch: Vec<DVec3>,
    /// Massive positions at each massive substep boundary, `steps_massive + 1` rows.
    snapshots: Vec<DVec3>,
    sources: Vec<(DVec3, f64)>,
    lanes: SourceLanes,
}

impl Integrator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            force_law: config.force_law,
            gravitational_constant: config.gravitational_constant,
            min_separation: config.min_separation,
            steps_massive: config.steps_per_frame_massive.max(1),
            steps_massless: config.steps_per_frame_massless.max(1),
            mode: IntegratorMode::NotRunning,
            massive: Vec::new(),
            massless: Vec::new(),
            gms: Vec::new(),
            positions: Vec::new(),
            acc_scratch: Vec::new(),
            snapshots: Vec::new(),
            sources: Vec::new(),
            lanes: SourceLanes::default(),
        }
    }

    pub fn mode(&self) -> IntegratorMode {
        self.mode
    }

    /// NotRunning → Running(Evolve). No effect if already running.
    pub fn start(&mut self) {
        if !self.mode.is_running() {
            self.mode = IntegratorMode::Running(RunPhase::Evolve);
        }
    }

    /// Any state → NotRunning.
    pub fn stop(&mut self) {
        self.mode = IntegratorMode::NotRunning;
    }

    pub fn pause(&mut self) {
        if self.mode.is_running() {
            self.mode = IntegratorMode::Running(RunPhase::Paused);
        }
    }

    pub fn resume(&mut self) {
        if self.mode == IntegratorMode::Running(RunPhase::Paused) {
            self.mode = IntegratorMode::Running(RunPhase::Evolve);
        }
    }

    /// Enter TrajectoryRecompute. Only possible while evolving.
    pub fn begin_recompute(&mut self) -> bool {
        if self.mode == IntegratorMode::Running(RunPhase::Evolve) {
            self.mode = IntegratorMode::Running(RunPhase::TrajectoryRecompute);
            true
        } else {
            false
        }
    }

    pub fn end_recompute(&mut self) {
        if self.mode == IntegratorMode::Running(RunPhase::TrajectoryRecompute) {
            self.mode = IntegratorMode::Running(RunPhase::Evolve);
        }
    }

    fn min_sep_sq(&self) -> f64 {
        self.min_separation * self.min_separation
    }

    /// Advance every active body in `state` by `dt`.
    ///
    /// Massive bodies take `steps_massive` kick-drift-kick substeps. Massless
    /// bodies take `steps_massless` substeps against massive positions linearly
    /// interpolated between the recorded massive snapshots.
    pub fn evolve(&mut self, state: &mut GravityState, dt: f64) {
        if dt <= 0.0 || !dt.is_finite() {
            return;
        }

        self.partition(state);
        if !state.acc_valid {
            self.refresh_accelerations(state);
        }

        self.evolve_massive(state, dt);
        self.evolve_massless(state, dt);

        state.advance_time(dt);
        state.acc_valid = true;
    }

    /// Split active bodies into the two pools and cache G·m per massive body.
    fn partition(&mut self, state: &GravityState) {
        self.massive.clear();
        self.massless.clear();
        self.gms.clear();
        for (slot, body) in state.bodies().iter().enumerate() {
            if !body.active {
                continue;
            }
            if body.is_massless() {
                self.massless.push(slot);
            } else {
                self.massive.push(slot);
                self.gms.push(self.gravitational_constant * body.mass);
            }
        }
    }

    fn load_positions(&mut self, state: &GravityState) {
        let bodies = state.bodies();
        self.positions.clear();
        self.positions
            .extend(self.massive.iter().map(|&slot| bodies[slot].pos));
    }

    fn compute_massive_acc(&mut self) {
        self.acc_scratch.clear();
        self.acc_scratch.resize(self.positions.len(), DVec3::ZERO);
        massive_accelerations(
            &self.positions,
            &self.gms,
            self.force_law,
            self.min_sep_sq(),
            &mut self.acc_scratch,
        );
    }

    /// Recompute cached accelerations of all active bodies at their current positions.
    fn refresh_accelerations(&mut self, state: &mut GravityState) {
        self.load_positions(state);
        self.compute_massive_acc();

        self.sources.clear();
        self.sources
            .extend(self.positions.iter().copied().zip(self.gms.iter().copied()));
        self.lanes.load(&self.sources);

        let min_sep_sq = self.min_sep_sq();
        let (bodies, acc) = state.bodies_and_acc_mut();
        for (k, &slot) in self.massive.iter().enumerate() {
            acc[slot] = self.acc_scratch[k];
        }
        for &slot in &self.massless {
            acc[slot] = self
                .lanes
                .acceleration(bodies[slot].pos, self.force_law, min_sep_sq);
        }
    }

    fn evolve_massive(&mut self, state: &mut GravityState, dt: f64) {
        let steps = self.steps_massive as usize;
        let h = dt / steps as f64;

        self.load_positions(state);
        self.snapshots.clear();
        self.snapshots.extend_from_slice(&self.positions);

        if self.massive.is_empty() {
            return;
        }

        for _ in 0..steps {
            {
                let (bodies, acc) = state.bodies_and_acc_mut();
                for &slot in &self.massive {
                    let body = &mut bodies[slot];
                    body.vel += acc[slot] * (0.5 * h);
                    body.pos += body.vel * h;
                }
            }

            self.load_positions(state);
            self.compute_massive_acc();
            self.snapshots.extend_from_slice(&self.positions);

            let (bodies, acc) = state.bodies_and_acc_mut();
            for (k, &slot) in self.massive.iter().enumerate() {
                acc[slot] = self.acc_scratch[k];
                bodies[slot].vel += acc[slot] * (0.5 * h);
            }
        }
    }

    /// Load the SIMD lanes with massive positions at fraction `f ∈ [0, 1]` of the tick.
    fn load_interpolated_sources(&mut self, f: f64) {
        let n = self.gms.len();
        self.sources.clear();
        if n == 0 {
            self.lanes.load(&self.sources);
            return;
        }

        let rows = self.snapshots.len() / n;
        let last = rows.saturating_sub(1);
        let x = f.clamp(0.0, 1.0) * last as f64;
        let row = (x.floor() as usize).min(last.saturating_sub(1));
        let w = if last == 0 { 0.0 } else { x - row as f64 };
        let next = (row + 1).min(last);

        for k in 0..n {
            let a = self.snapshots[row * n + k];
            let b = self.snapshots[next * n + k];
            self.sources.push((a.lerp(b, w), self.gms[k]));
        }
        self.lanes.load(&self.sources);
    }

    fn evolve_massless(&mut self, state: &mut GravityState, dt: f64) {
        if self.massless.is_empty() {
            return;
        }
        let steps = self.steps_massless as usize;
        let h = dt / steps as f64;
        let law = self.force_law;
        let min_sep_sq = self.min_sep_sq();

        for step in 0..steps {
            {
                let (bodies, acc) = state.bodies_and_acc_mut();
                for &slot in &self.massless {
                    let body = &mut bodies[slot];
                    body.vel += acc[slot] * (0.5 * h);
                    body.pos += body.vel * h;
                }
            }

            self.load_interpolated_sources((step + 1) as f64 / steps as f64);

            let (bodies, acc) = state.bodies_and_acc_mut();
            for &slot in &self.massless {
                let a = self.lanes.acceleration(bodies[slot].pos, law, min_sep_sq);
                acc[slot] = a;
                bodies[slot].vel += a * (0.5 * h);
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BodyState;
    use std::f64::consts::TAU;

    fn integrator(massive: u32, massless: u32) -> Integrator {
        Integrator::new(&EngineConfig {
            steps_per_frame_massive: massive,
            steps_per_frame_massless: massless,
            ..Default::default()
        })
    }

    fn specific_energy(state: &BodyState, mu: f64) -> f64 {
        0.5 * state.vel.length_squared() - mu / state.pos.length()
    }

    #[test]
    fn test_circular_orbit_one_period() {
        // Test particle on a unit circular orbit around a unit mass, μ = 1
        let mut state = GravityState::new();
        state.add(BodyState::new(DVec3::ZERO, DVec3::ZERO, 1.0));
        let ship = state.add(BodyState::massless(DVec3::X, DVec3::Y));

        let mut integrator = integrator(8, 4);
        let dt = 0.01;
        let ticks = (TAU / dt).round() as usize;
        for _ in 0..ticks {
            integrator.evolve(&mut state, dt);
            let r = state.get(ship).unwrap().pos.length();
            assert!((r - 1.0).abs() < 1e-4, "radius drifted to {r}");
        }

        // Back near the start after one period
        let end = state.get(ship).unwrap().pos;
        let pos_error = (end - DVec3::X).length();
        assert!(
            pos_error < 1e-2,
            "Position error after 1 orbit: {:.2e}",
            pos_error
        );
    }

    #[test]
    fn test_energy_conservation_ten_orbits() {
        // Elliptical orbit with e=0.3 as a massive two-body system
        let r_peri: f64 = 1.0;
        let e = 0.3;
        let a = r_peri / (1.0 - e);
        let mu = 1.0;
        let v = (mu * (2.0 / r_peri - 1.0 / a)).sqrt();

        let mut state = GravityState::new();
        let center = state.add(BodyState::new(DVec3::ZERO, DVec3::ZERO, 1.0));
        // Tiny mass so the central body stays essentially fixed
        let ship = state.add(BodyState::new(DVec3::X * r_peri, DVec3::Y * v, 1e-12));

        let relative = |s: &GravityState| {
            let c = s.get(center).unwrap();
            let b = s.get(ship).unwrap();
            BodyState::new(b.pos - c.pos, b.vel - c.vel, 0.0)
        };
        let energy_initial = specific_energy(&relative(&state), mu);

        let mut integrator = integrator(8, 4);
        let period = TAU * (a.powi(3) / mu).sqrt();
        let dt = 0.01;
        let ticks = (10.0 * period / dt) as usize;
        for _ in 0..ticks {
            integrator.evolve(&mut state, dt);
        }

        let energy_final = specific_energy(&relative(&state), mu);
        let relative_error = (energy_final - energy_initial).abs() / energy_initial.abs();
        assert!(
            relative_error < 1e-4,
            "Energy error after 10 orbits: {:.2e} (should be < 1e-4)",
            relative_error
        );
    }

    #[test]
    fn test_massless_follows_massive_equivalent() {
        // A massless particle and a negligible-mass particle on the same orbit
        // must agree: the two passes implement the same dynamics.
        let start = (DVec3::new(2.0, 0.0, 0.0), DVec3::new(0.0, 0.6, 0.1));

        let mut heavy = GravityState::new();
        heavy.add(BodyState::new(DVec3::ZERO, DVec3::ZERO, 1.0));
        let light = heavy.add(BodyState::new(start.0, start.1, 1e-15));

        let mut ghostly = GravityState::new();
        ghostly.add(BodyState::new(DVec3::ZERO, DVec3::ZERO, 1.0));
        let ghost = ghostly.add(BodyState::massless(start.0, start.1));

        let mut integrator = integrator(8, 8);
        for _ in 0..500 {
            integrator.evolve(&mut heavy, 0.01);
            integrator.evolve(&mut ghostly, 0.01);
        }

        let a = heavy.get(light).unwrap().pos;
        let b = ghostly.get(ghost).unwrap().pos;
        assert!((a - b).length() < 1e-9, "massless pass diverged: {a:?} vs {b:?}");
    }

    #[test]
    fn test_momentum_conserved_by_massive_pass() {
        let mut state = GravityState::new();
        state.add(BodyState::new(DVec3::ZERO, DVec3::new(0.0, -0.1, 0.0), 1.0));
        state.add(BodyState::new(DVec3::X, DVec3::new(0.0, 1.0, 0.0), 0.1));
        state.add(BodyState::new(DVec3::new(-3.0, 0.0, 0.5), DVec3::new(0.0, -0.5, 0.0), 0.05));

        let momentum = |s: &GravityState| -> DVec3 { s.iter().map(|(_, b)| b.momentum()).sum() };
        let before = momentum(&state);

        let mut integrator = integrator(8, 4);
        for _ in 0..1000 {
            integrator.evolve(&mut state, 0.005);
        }
        let after = momentum(&state);
        assert!((after - before).length() < 1e-12, "momentum drift {:?}", after - before);
    }

    #[test]
    fn test_inactive_bodies_are_frozen() {
        let mut state = GravityState::new();
        state.add(BodyState::new(DVec3::ZERO, DVec3::ZERO, 1.0));
        let frozen = state.add(BodyState::new(DVec3::X, DVec3::Y, 1.0));
        state.inactivate(frozen).unwrap();

        let mut integrator = integrator(4, 4);
        integrator.evolve(&mut state, 1.0);

        let body = state.get(frozen).unwrap();
        assert_eq!(body.pos, DVec3::X);
        assert_eq!(body.vel, DVec3::Y);
        assert!((state.time() - 1.0).abs() < 1e-15);
    }

    #[test]
    fn test_non_positive_dt_is_a_no_op() {
        let mut state = GravityState::new();
        let body = state.add(BodyState::new(DVec3::X, DVec3::Y, 1.0));
        let mut integrator = integrator(4, 4);
        integrator.evolve(&mut state, 0.0);
        integrator.evolve(&mut state, -1.0);
        assert_eq!(state.time(), 0.0);
        assert_eq!(state.get(body).unwrap().pos, DVec3::X);
    }

    #[test]
    fn test_mode_transitions() {
        let mut integrator = integrator(1, 1);
        assert_eq!(integrator.mode(), IntegratorMode::NotRunning);
        assert!(!integrator.begin_recompute(), "cannot recompute when stopped");

        integrator.start();
        assert!(integrator.mode().advances_time());

        assert!(integrator.begin_recompute());
        assert!(!integrator.mode().advances_time());
        integrator.pause();
        integrator.resume();
        assert!(integrator.mode().advances_time());

        integrator.begin_recompute();
        integrator.end_recompute();
        assert_eq!(integrator.mode(), IntegratorMode::Running(RunPhase::Evolve));

        integrator.stop();
        assert!(!integrator.mode().is_running());
    }
}
