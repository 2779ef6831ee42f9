//! Asynchronous course-correction search.
//!
//! The search scales the ship's velocity (relative to a reference center)
//! by three candidate factors, runs each candidate forward on a fork until
//! the closest approach to the target, fits a line through the resulting
//! distances and solves it for the requested distance. One more fork
//! verifies the solution before the result is handed to the caller.

use std::fmt;
use std::time::{Duration, Instant};

use bevy::math::DVec3;

use crate::jobs::AbortFlag;
use crate::maneuver::ManeuverScheduler;
use crate::physics::{GravityState, Integrator};
use crate::types::BodyHandle;

/// Number of forked samples before the fit.
pub const SAMPLE_COUNT: usize = 3;

/// Step reduction applied at each refinement level.
const REFINE_FACTOR: f64 = 10.0;

/// Identifier of a running search.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SearchId(pub(crate) u64);

impl fmt::Display for SearchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Configuration for one course-correction search.
#[derive(Clone, Debug)]
pub struct SearchSettings {
    /// Desired closest-approach distance to the target.
    pub target_distance: f64,
    /// Minima farther than this do not count as an approach.
    pub approach_threshold: f64,
    /// Samples use velocity scales 1 − δ, 1 and 1 + δ.
    pub scale_delta: f64,
    /// Frame the velocity is scaled in. `None` scales the world velocity.
    pub center: Option<BodyHandle>,
    /// Simulated-time cap per forked run.
    pub max_sim_time: f64,
    /// Wall-clock cap per forked run.
    pub wall_clock: Duration,
    /// Coarse integration step.
    pub step: f64,
    /// How many times the step is cut by 10 around a detected minimum.
    pub refinement_levels: u32,
    /// Accepted |verified − target| distance.
    pub tolerance: f64,
    /// Apply the corrected velocity to the live ship on success.
    pub apply_on_success: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            target_distance: 0.0,
            approach_threshold: f64::INFINITY,
            scale_delta: 0.01,
            center: None,
            max_sim_time: 100.0,
            wall_clock: Duration::from_secs(5),
            step: 0.01,
            refinement_levels: 4,
            tolerance: 1e-3,
            apply_on_success: false,
        }
    }
}

/// Why a search produced no correction.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CorrectionError {
    #[error("forked run exceeded its wall-clock cap of {0:?}")]
    WallClockExceeded(Duration),

    #[error("no approach within the threshold before the time cap (closest {closest:.6})")]
    NoApproach { closest: f64 },

    #[error("approach distance does not respond to the velocity scale")]
    FlatResponse,

    #[error("verified distance {achieved:.6} misses the target {target:.6}")]
    OutOfTolerance { achieved: f64, target: f64 },

    #[error("worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("body {0} vanished from the forked state")]
    UnknownBody(BodyHandle),
}

/// Successful course correction.
#[derive(Clone, Debug, PartialEq)]
pub struct Correction {
    pub ship: BodyHandle,
    /// Simulation time the search forked from.
    pub epoch: f64,
    /// Velocity scale that hits the target distance.
    pub scale: f64,
    /// Corrected world-frame velocity at `epoch`.
    pub velocity: DVec3,
    /// Closest approach reached by the verification run.
    pub closest_approach: f64,
    /// Simulation time of that closest approach.
    pub approach_time: f64,
    /// (scale, closest approach) of the fitted samples.
    pub samples: [(f64, f64); SAMPLE_COUNT],
}

pub type CorrectionResult = Result<Correction, CorrectionError>;

pub type CorrectionCallback = Box<dyn FnOnce(&CorrectionResult) + Send + Sync + 'static>;

/// Closest approach found by one forked run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Approach {
    pub distance: f64,
    pub time: f64,
}

/// How a forked run ended without an approach.
#[derive(Clone, Debug, PartialEq)]
pub enum RunFailure {
    /// The abort flag was raised; the result is discarded silently.
    Aborted,
    Failed(CorrectionError),
}

impl From<CorrectionError> for RunFailure {
    fn from(err: CorrectionError) -> Self {
        RunFailure::Failed(err)
    }
}

/// Fork inputs shared by every run of one search.
#[derive(Clone, Debug)]
pub struct SearchFork {
    pub state: GravityState,
    pub scheduler_seed: ForkedManeuvers,
    pub integrator: Integrator,
}

/// Pending maneuvers captured at request time, re-forked for every run.
#[derive(Debug, Default)]
pub struct ForkedManeuvers(ManeuverScheduler);

impl ForkedManeuvers {
    pub fn capture(scheduler: &ManeuverScheduler) -> Self {
        Self(scheduler.fork())
    }

    pub fn fork(&self) -> ManeuverScheduler {
        self.0.fork()
    }
}

impl Clone for ForkedManeuvers {
    fn clone(&self) -> Self {
        Self(self.0.fork())
    }
}

/// Velocity of `ship` scaled by `scale` relative to `center`'s velocity.
pub fn scaled_velocity(
    state: &GravityState,
    ship: BodyHandle,
    center: Option<BodyHandle>,
    scale: f64,
) -> Result<DVec3, CorrectionError> {
    let vel = state.get(ship).ok_or(CorrectionError::UnknownBody(ship))?.vel;
    let frame = match center {
        Some(center) => state.get(center).ok_or(CorrectionError::UnknownBody(center))?.vel,
        None => DVec3::ZERO,
    };
    Ok(frame + (vel - frame) * scale)
}

/// Distance between two bodies and its rate of change.
fn separation(state: &GravityState, ship: BodyHandle, target: BodyHandle) -> Result<(f64, f64), CorrectionError> {
    let s = state.get(ship).ok_or(CorrectionError::UnknownBody(ship))?;
    let t = state.get(target).ok_or(CorrectionError::UnknownBody(target))?;
    let r = s.pos - t.pos;
    let v = s.vel - t.vel;
    let d = r.length();
    let rate = if d > 0.0 { r.dot(v) / d } else { 0.0 };
    Ok((d, rate))
}

/// Steps between refinement checkpoints.
const CHECKPOINT_STRIDE: u32 = 16;

/// Fork of a run, kept so refinement can re-run from it.
struct Checkpoint {
    state: GravityState,
    scheduler: ManeuverScheduler,
    distance: f64,
    rate: f64,
}

impl Checkpoint {
    fn take(state: &GravityState, scheduler: &ManeuverScheduler, distance: f64, rate: f64) -> Self {
        Self {
            state: state.clone(),
            scheduler: scheduler.fork(),
            distance,
            rate,
        }
    }
}

/// Run one fork forward until the closest approach of `ship` to `target`.
///
/// The approach is a sign change of d' from negative to non-negative while
/// the distance is inside the threshold. On detection the run goes back to
/// its latest checkpoint and repeats with a step ten times smaller,
/// `refinement_levels` times. Checkpoints are taken every
/// [`CHECKPOINT_STRIDE`] steps. Both caps are checked between steps, as is
/// the abort flag.
pub fn closest_approach(
    mut state: GravityState,
    mut scheduler: ManeuverScheduler,
    mut integrator: Integrator,
    ship: BodyHandle,
    target: BodyHandle,
    settings: &SearchSettings,
    abort: &AbortFlag,
) -> Result<Approach, RunFailure> {
    let started = Instant::now();
    let limit = state.time() + settings.max_sim_time;
    let mut dt = settings.step;
    let mut level = 0;

    let (mut distance, mut rate) = separation(&state, ship, target)?;
    let mut closest = distance;
    let mut checkpoint = Checkpoint::take(&state, &scheduler, distance, rate);
    let mut since_checkpoint = 0;

    loop {
        if abort.is_aborted() {
            return Err(RunFailure::Aborted);
        }
        if started.elapsed() > settings.wall_clock {
            return Err(CorrectionError::WallClockExceeded(settings.wall_clock).into());
        }
        if state.time() >= limit {
            return Err(CorrectionError::NoApproach { closest }.into());
        }

        let before = state.time();
        let step = dt.min(limit - before);
        scheduler.advance(&mut integrator, &mut state, step);
        let (d, r) = separation(&state, ship, target)?;
        closest = closest.min(d);

        let turned = rate < 0.0 && r >= 0.0;
        if turned && distance.min(d) < settings.approach_threshold {
            if level >= settings.refinement_levels {
                let (distance, time) = if d < distance {
                    (d, state.time())
                } else {
                    (distance, before)
                };
                return Ok(Approach { distance, time });
            }
            // Minimum lies after the checkpoint: re-run from there, finer
            state = checkpoint.state.clone();
            scheduler = checkpoint.scheduler.fork();
            distance = checkpoint.distance;
            rate = checkpoint.rate;
            since_checkpoint = 0;
            dt /= REFINE_FACTOR;
            level += 1;
            continue;
        }

        distance = d;
        rate = r;
        since_checkpoint += 1;
        if since_checkpoint >= CHECKPOINT_STRIDE {
            checkpoint = Checkpoint::take(&state, &scheduler, distance, rate);
            since_checkpoint = 0;
        }
    }
}

/// Least-squares line `distance = intercept + slope · scale`.
///
/// `None` when the scales do not spread or the slope vanishes.
pub fn fit_line(samples: &[(f64, f64)]) -> Option<(f64, f64)> {
    let n = samples.len() as f64;
    if samples.len() < 2 {
        return None;
    }
    let mean_s = samples.iter().map(|s| s.0).sum::<f64>() / n;
    let mean_d = samples.iter().map(|s| s.1).sum::<f64>() / n;
    let sxx: f64 = samples.iter().map(|s| (s.0 - mean_s).powi(2)).sum();
    let sxy: f64 = samples.iter().map(|s| (s.0 - mean_s) * (s.1 - mean_d)).sum();
    if sxx <= f64::EPSILON * mean_s.abs().max(1.0) {
        return None;
    }
    let slope = sxy / sxx;
    if !slope.is_finite() || slope.abs() <= f64::EPSILON * mean_d.abs().max(1.0) {
        return None;
    }
    Some((mean_d - slope * mean_s, slope))
}

/// Scale at which the fitted line reaches `target_distance`.
pub fn solve_scale(samples: &[(f64, f64)], target_distance: f64) -> Result<f64, CorrectionError> {
    let (intercept, slope) = fit_line(samples).ok_or(CorrectionError::FlatResponse)?;
    Ok((target_distance - intercept) / slope)
}

/// What the owner should do after feeding a run result to [`ActiveSearch`].
#[derive(Debug, PartialEq)]
pub enum SearchStep {
    /// More sample runs outstanding.
    Waiting,
    /// Spawn the verification run with this scale.
    Verify(f64),
    /// Search finished; deliver the result.
    Done(CorrectionResult),
}

#[derive(Debug)]
enum Phase {
    Sampling([Option<Approach>; SAMPLE_COUNT]),
    Verifying { scale: f64, samples: [(f64, f64); SAMPLE_COUNT] },
}

/// Bookkeeping of one search on the owning thread.
pub struct ActiveSearch {
    pub id: SearchId,
    pub ship: BodyHandle,
    pub target: BodyHandle,
    pub settings: SearchSettings,
    pub abort: AbortFlag,
    pub fork: SearchFork,
    pub scales: [f64; SAMPLE_COUNT],
    phase: Phase,
    callback: Option<CorrectionCallback>,
}

impl ActiveSearch {
    pub fn new(
        id: SearchId,
        ship: BodyHandle,
        target: BodyHandle,
        settings: SearchSettings,
        fork: SearchFork,
        callback: Option<CorrectionCallback>,
    ) -> Self {
        let delta = settings.scale_delta;
        Self {
            id,
            ship,
            target,
            scales: [1.0 - delta, 1.0, 1.0 + delta],
            settings,
            abort: AbortFlag::new(),
            fork,
            phase: Phase::Sampling([None; SAMPLE_COUNT]),
            callback,
        }
    }

    pub fn is_verifying(&self) -> bool {
        matches!(self.phase, Phase::Verifying { .. })
    }

    /// Number of sample runs that have reported back.
    pub fn samples_done(&self) -> usize {
        match &self.phase {
            Phase::Sampling(done) => done.iter().flatten().count(),
            Phase::Verifying { .. } => SAMPLE_COUNT,
        }
    }

    /// Record the result of sample run `slot`.
    pub fn on_sample(&mut self, slot: usize, outcome: Result<Approach, CorrectionError>) -> SearchStep {
        let Phase::Sampling(done) = &mut self.phase else {
            return SearchStep::Waiting;
        };
        let approach = match outcome {
            Ok(approach) => approach,
            Err(err) => return SearchStep::Done(Err(err)),
        };
        if let Some(entry) = done.get_mut(slot) {
            *entry = Some(approach);
        }
        if done.iter().any(Option::is_none) {
            return SearchStep::Waiting;
        }

        let mut samples = [(0.0, 0.0); SAMPLE_COUNT];
        for (k, sample) in samples.iter_mut().enumerate() {
            let distance = done[k].map_or(f64::NAN, |a| a.distance);
            *sample = (self.scales[k], distance);
        }
        match solve_scale(&samples, self.settings.target_distance) {
            Ok(scale) => {
                self.phase = Phase::Verifying { scale, samples };
                SearchStep::Verify(scale)
            }
            Err(err) => SearchStep::Done(Err(err)),
        }
    }

    /// Record the verification run.
    pub fn on_verification(&mut self, outcome: Result<Approach, CorrectionError>) -> SearchStep {
        let Phase::Verifying { scale, samples } = self.phase else {
            return SearchStep::Waiting;
        };
        let approach = match outcome {
            Ok(approach) => approach,
            Err(err) => return SearchStep::Done(Err(err)),
        };
        let target = self.settings.target_distance;
        if (approach.distance - target).abs() > self.settings.tolerance {
            return SearchStep::Done(Err(CorrectionError::OutOfTolerance {
                achieved: approach.distance,
                target,
            }));
        }
        let velocity = match scaled_velocity(&self.fork.state, self.ship, self.settings.center, scale) {
            Ok(velocity) => velocity,
            Err(err) => return SearchStep::Done(Err(err)),
        };
        SearchStep::Done(Ok(Correction {
            ship: self.ship,
            epoch: self.fork.state.time(),
            scale,
            velocity,
            closest_approach: approach.distance,
            approach_time: approach.time,
            samples,
        }))
    }

    /// Hand the result to the callback, if any. Consumes the callback.
    pub fn complete(&mut self, result: &CorrectionResult) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }

    /// Inputs for a forked run at velocity scale `scale`.
    pub fn run_inputs(&self, scale: f64) -> Result<(GravityState, ManeuverScheduler, Integrator), CorrectionError> {
        let mut state = self.fork.state.clone();
        let vel = scaled_velocity(&state, self.ship, self.settings.center, scale)?;
        state
            .set_velocity(self.ship, vel)
            .map_err(|_| CorrectionError::UnknownBody(self.ship))?;
        Ok((state, self.fork.scheduler_seed.fork(), self.fork.integrator.clone()))
    }
}

impl fmt::Debug for ActiveSearch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveSearch")
            .field("id", &self.id)
            .field("ship", &self.ship)
            .field("target", &self.target)
            .field("phase", &self.phase)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}
