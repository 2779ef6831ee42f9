//! Forward trajectory prediction.
//!
//! A prediction runs on a deep copy of the simulation (pending maneuvers
//! included, callbacks stripped) and records decimated points per body.
//! It never touches the live state; the engine collects the finished
//! [`Prediction`] from its completion queue.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bevy::math::DVec3;

use crate::jobs::AbortFlag;
use crate::maneuver::ManeuverScheduler;
use crate::physics::{GravityState, Integrator};
use crate::types::BodyHandle;

/// Configuration for trajectory prediction.
#[derive(Clone, Debug)]
pub struct PredictionSettings {
    /// Maximum number of integration steps per prediction.
    pub max_steps: usize,
    /// Maximum simulation time to predict ahead.
    pub max_time: f64,
    /// Simulation time per integration step.
    pub step: f64,
    /// Store a point every N steps (trajectory decimation).
    pub point_interval: usize,
    /// Wall-clock cap for the whole run.
    pub wall_clock: Duration,
    /// Bodies to record; `None` records every active body.
    pub bodies: Option<Vec<BodyHandle>>,
}

impl Default for PredictionSettings {
    fn default() -> Self {
        Self {
            max_steps: 20_000,
            max_time: 100.0,
            step: 0.01,
            point_interval: 10,
            wall_clock: Duration::from_secs(2),
            bodies: None,
        }
    }
}

/// A single point on a predicted trajectory.
#[derive(Clone, Debug, PartialEq)]
pub struct TrajectoryPoint {
    /// World-frame position in internal units.
    pub pos: DVec3,
    pub vel: DVec3,
    pub time: f64,
    /// Massive body whose pull is strongest here (excluding the body itself).
    pub dominant_body: Option<BodyHandle>,
}

/// Predicted path of one body.
#[derive(Clone, Debug, Default)]
pub struct TrajectoryPath {
    pub points: Vec<TrajectoryPoint>,
}

/// Why a prediction stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PredictionEnd {
    /// Reached `max_time`.
    Horizon,
    /// Ran out of `max_steps`.
    StepBudget,
    /// Exceeded the wall-clock cap.
    WallClock,
    /// Abort flag was raised.
    Aborted,
}

/// Finished forward prediction.
#[derive(Clone, Debug)]
pub struct Prediction {
    pub start_time: f64,
    pub end_time: f64,
    pub steps: usize,
    pub end: PredictionEnd,
    pub paths: HashMap<BodyHandle, TrajectoryPath>,
}

impl Prediction {
    pub fn path(&self, body: BodyHandle) -> Option<&TrajectoryPath> {
        self.paths.get(&body)
    }
}

/// Run a prediction to completion on the calling thread.
///
/// `state` and `scheduler` are consumed: callers hand in forks.
pub fn predict(
    mut state: GravityState,
    mut scheduler: ManeuverScheduler,
    mut integrator: Integrator,
    settings: &PredictionSettings,
    abort: &AbortFlag,
) -> Prediction {
    let started = Instant::now();
    let start_time = state.time();
    let horizon = start_time + settings.max_time.max(0.0);
    let interval = settings.point_interval.max(1);

    let tracked: Vec<BodyHandle> = match &settings.bodies {
        Some(bodies) => bodies.iter().copied().filter(|&b| state.contains(b)).collect(),
        None => state
            .iter()
            .filter(|(_, body)| body.active)
            .map(|(handle, _)| handle)
            .collect(),
    };
    let mut paths: HashMap<BodyHandle, TrajectoryPath> =
        tracked.iter().map(|&b| (b, TrajectoryPath::default())).collect();
    record(&state, &tracked, &mut paths);

    let mut steps = 0;
    let end = loop {
        if abort.is_aborted() {
            break PredictionEnd::Aborted;
        }
        if state.time() >= horizon {
            break PredictionEnd::Horizon;
        }
        if steps >= settings.max_steps {
            break PredictionEnd::StepBudget;
        }
        if started.elapsed() > settings.wall_clock {
            break PredictionEnd::WallClock;
        }

        let dt = settings.step.min(horizon - state.time());
        scheduler.advance(&mut integrator, &mut state, dt);
        steps += 1;

        if steps % interval == 0 {
            record(&state, &tracked, &mut paths);
        }
    };

    // Always finish on the final state
    if steps % interval != 0 {
        record(&state, &tracked, &mut paths);
    }

    Prediction {
        start_time,
        end_time: state.time(),
        steps,
        end,
        paths,
    }
}

fn record(state: &GravityState, tracked: &[BodyHandle], paths: &mut HashMap<BodyHandle, TrajectoryPath>) {
    let sources: Vec<(BodyHandle, DVec3, f64)> = state
        .iter()
        .filter(|(_, b)| b.active && !b.is_massless())
        .map(|(h, b)| (h, b.pos, b.mass))
        .collect();

    for &handle in tracked {
        let (Some(body), Some(path)) = (state.get(handle), paths.get_mut(&handle)) else {
            continue;
        };
        path.points.push(TrajectoryPoint {
            pos: body.pos,
            vel: body.vel,
            time: state.time(),
            dominant_body: find_dominant_body(handle, body.pos, &sources),
        });
    }
}

/// Find the body whose gravity dominates at a given position.
///
/// Compares m/r² (G is common to all sources). Coincident sources win outright.
fn find_dominant_body(own: BodyHandle, pos: DVec3, sources: &[(BodyHandle, DVec3, f64)]) -> Option<BodyHandle> {
    let mut best: Option<(BodyHandle, f64)> = None;
    for &(handle, source_pos, mass) in sources {
        if handle == own {
            continue;
        }
        let r_sq = (source_pos - pos).length_squared();
        if r_sq == 0.0 {
            return Some(handle);
        }
        let pull = mass / r_sq;
        if best.is_none_or(|(_, strongest)| pull > strongest) {
            best = Some((handle, pull));
        }
    }
    best.map(|(handle, _)| handle)
}
