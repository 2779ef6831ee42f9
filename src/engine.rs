//! The simulation context object.
//!
//! [`Simulation`] owns the live [`GravityState`] and everything that acts on
//! it: the integrator, the maneuver scheduler, the SOI and conservation
//! monitors, and the worker jobs that explore forks of the state. Every
//! collaborator goes through it; there is no global engine.

use std::collections::HashMap;

use bevy::log::{debug, info, warn};
use bevy::math::DVec3;
use bevy::prelude::Resource;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::jobs::{AbortFlag, JobRunner};
use crate::maneuver::{Maneuver, ManeuverId, ManeuverReport, ManeuverScheduler, ManeuverTrigger, PendingManeuver, resolve_trigger};
use crate::orbit::{OrbitElements, relative_elements};
use crate::physics::{ConservationMonitor, Drift, GravityState, Integrator, IntegratorMode};
use crate::prediction::{Prediction, PredictionEnd, PredictionSettings, TrajectoryPath, predict};
use crate::search::{
    ActiveSearch, Approach, CorrectionError, CorrectionResult, ForkedManeuvers, RunFailure, SAMPLE_COUNT,
    SearchFork, SearchId, SearchSettings, SearchStep, closest_approach, scaled_velocity,
};
use crate::soi::{SoiMonitor, SoiState, SoiTransition};
use crate::transfer::{self, PatchedConicRequest, Transfer};
use crate::types::{BodyHandle, BodyState};

/// Which run of a search a job result belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunKind {
    Sample(usize),
    Verification,
}

/// Everything a worker can send back.
enum JobOutput {
    Run {
        search: SearchId,
        kind: RunKind,
        outcome: Result<Approach, RunFailure>,
    },
    Prediction {
        generation: u64,
        result: Result<Prediction, String>,
    },
}

struct PredictionJob {
    generation: u64,
    abort: AbortFlag,
}

/// What one tick did.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Simulation time advanced (0 when the integrator is not evolving).
    pub advanced: f64,
    pub maneuvers: Vec<ManeuverReport>,
    pub handoffs: Vec<SoiTransition>,
    pub drift: Option<Drift>,
    /// Job results handled at the start of the tick.
    pub completions: usize,
}

/// A running orbital simulation.
#[derive(Resource)]
pub struct Simulation {
    config: EngineConfig,
    state: GravityState,
    integrator: Integrator,
    scheduler: ManeuverScheduler,
    conservation: ConservationMonitor,
    soi: SoiMonitor,
    jobs: JobRunner<JobOutput>,
    searches: HashMap<SearchId, ActiveSearch>,
    next_search: u64,
    prediction: Option<Prediction>,
    prediction_job: Option<PredictionJob>,
    next_prediction: u64,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::build(EngineConfig::default())
    }
}

impl Simulation {
    /// Create an empty simulation. The integrator starts out not running.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: EngineConfig) -> Self {
        Self {
            integrator: Integrator::new(&config),
            conservation: ConservationMonitor::new(config.drift_tolerance),
            soi: SoiMonitor::new(config.soi_hysteresis),
            config,
            state: GravityState::new(),
            scheduler: ManeuverScheduler::new(),
            jobs: JobRunner::new(),
            searches: HashMap::new(),
            next_search: 0,
            prediction: None,
            prediction_job: None,
            next_prediction: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn time(&self) -> f64 {
        self.state.time()
    }

    /// Read-only view of the live state.
    pub fn state(&self) -> &GravityState {
        &self.state
    }

    fn g(&self) -> f64 {
        self.config.gravitational_constant
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    pub fn integrator_mode(&self) -> IntegratorMode {
        self.integrator.mode()
    }

    /// Start evolving. Captures the conservation baseline.
    pub fn start(&mut self) {
        self.integrator.start();
        self.resync_conservation();
        info!("Simulation started at t={:.3} with {} bodies", self.time(), self.state.len());
    }

    pub fn stop(&mut self) {
        self.cancel_prediction();
        self.integrator.stop();
        info!("Simulation stopped at t={:.3}", self.time());
    }

    pub fn pause(&mut self) {
        self.integrator.pause();
    }

    pub fn resume(&mut self) {
        self.integrator.resume();
    }

    /// Apply a new configuration.
    ///
    /// Internal state stays in internal units; only the display scales,
    /// substep counts, force settings and monitor thresholds change.
    pub fn rescale(&mut self, config: EngineConfig) -> Result<(), EngineError> {
        config.validate()?;
        self.integrator.force_law = config.force_law;
        self.integrator.gravitational_constant = config.gravitational_constant;
        self.integrator.min_separation = config.min_separation;
        self.integrator.steps_massive = config.steps_per_frame_massive;
        self.integrator.steps_massless = config.steps_per_frame_massless;
        self.state.acc_valid = false;

        self.soi.set_hysteresis(config.soi_hysteresis);
        self.conservation = ConservationMonitor::new(config.drift_tolerance);
        self.config = config;
        self.resync_conservation();
        info!(
            "Rescaled: length ×{}, mass ×{}, time ×{}, substeps {}/{}",
            self.config.length_scale,
            self.config.mass_scale,
            self.config.time_scale,
            self.config.steps_per_frame_massive,
            self.config.steps_per_frame_massless
        );
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Bodies
    // -------------------------------------------------------------------------

    /// Register a body from its world-frame state.
    pub fn add_body(&mut self, body: BodyState) -> BodyHandle {
        let mass = body.mass;
        let handle = self.state.add(body);
        info!("Registered body {handle} (mass {mass})");
        self.resync_conservation();
        handle
    }

    /// Register a body on the orbit described by `elements` about its center.
    pub fn add_body_from_elements(&mut self, elements: &OrbitElements, mass: f64) -> Result<BodyHandle, EngineError> {
        let center = elements
            .center
            .ok_or_else(|| EngineError::InvalidElements("elements need a registered center".to_string()))?;
        let c = self.state.try_get(center)?;
        let (center_pos, center_vel) = (c.pos, c.vel);
        let (r, v) = elements.to_cartesian()?;
        Ok(self.add_body(BodyState::new(center_pos + r, center_vel + v, mass)))
    }

    /// Remove a body. Maneuvers targeting it or measured against it are dropped.
    pub fn remove_body(&mut self, handle: BodyHandle) -> Result<BodyState, EngineError> {
        let removed = self.state.remove(handle)?;
        for dropped in self.scheduler.drop_body(handle) {
            info!(
                "Dropped maneuver {} ({}) due at t={:.3}: body {handle} removed",
                dropped.id,
                dropped.describe(),
                dropped.time
            );
        }
        self.soi.drop_body(handle);
        info!("Removed body {handle}");
        self.resync_conservation();
        Ok(removed)
    }

    pub fn body_state(&self, handle: BodyHandle) -> Result<&BodyState, EngineError> {
        self.state.try_get(handle)
    }

    /// Body state converted to display units.
    pub fn display_state(&self, handle: BodyHandle) -> Result<BodyState, EngineError> {
        let body = self.state.try_get(handle)?;
        let scale = self.config.display_scale();
        Ok(BodyState {
            pos: scale.position_to_display(body.pos),
            vel: scale.velocity_to_display(body.vel),
            mass: scale.mass_to_display(body.mass),
            active: body.active,
        })
    }

    pub fn set_velocity(&mut self, handle: BodyHandle, vel: DVec3) -> Result<(), EngineError> {
        self.state.set_velocity(handle, vel)?;
        self.resync_conservation();
        Ok(())
    }

    pub fn inactivate(&mut self, handle: BodyHandle) -> Result<(), EngineError> {
        self.state.inactivate(handle)?;
        self.resync_conservation();
        Ok(())
    }

    /// Bring a frozen body back. Reactivating the last member of a composite
    /// removes the composite along with its maneuvers and SOI watches.
    pub fn reactivate(&mut self, handle: BodyHandle) -> Result<(), EngineError> {
        if let Some(composite) = self.state.reactivate(handle)? {
            self.forget_body(composite);
            info!("Composite {composite} dissolved with its last member");
        }
        self.resync_conservation();
        Ok(())
    }

    /// Replace `members` by one body at their barycenter.
    pub fn fold_composite(&mut self, members: &[BodyHandle]) -> Result<BodyHandle, EngineError> {
        let composite = self.state.fold_composite(members)?;
        info!("Folded {} bodies into composite {composite}", members.len());
        self.resync_conservation();
        Ok(composite)
    }

    /// Restore the members of a composite and remove it.
    pub fn unfold_composite(&mut self, composite: BodyHandle) -> Result<Vec<BodyHandle>, EngineError> {
        let members = self.state.unfold_composite(composite)?;
        self.forget_body(composite);
        info!("Unfolded composite {composite} into {} bodies", members.len());
        self.resync_conservation();
        Ok(members)
    }

    /// Drop the maneuvers and SOI watches of a body that left the state.
    fn forget_body(&mut self, handle: BodyHandle) {
        for dropped in self.scheduler.drop_body(handle) {
            info!("Dropped maneuver {} ({}): body {handle} is gone", dropped.id, dropped.describe());
        }
        self.soi.drop_body(handle);
    }

    /// Orbit of `body` about `center`, from the current world state.
    pub fn orbit_elements(&self, body: BodyHandle, center: BodyHandle) -> Result<OrbitElements, EngineError> {
        relative_elements(&self.state, body, center, self.g())
    }

    // -------------------------------------------------------------------------
    // Maneuvers
    // -------------------------------------------------------------------------

    /// Queue a maneuver. Event triggers are resolved against the orbit about
    /// the maneuver's center at the current time.
    pub fn schedule(&mut self, maneuver: Maneuver) -> Result<ManeuverId, EngineError> {
        let target = maneuver.target;
        self.state.try_get(target)?;
        if let Some(center) = maneuver.center {
            if center == target {
                return Err(EngineError::SelfReference(target));
            }
            self.state.try_get(center)?;
        }

        let elements = match (maneuver.trigger, maneuver.center) {
            (ManeuverTrigger::At(_), _) | (_, None) => None,
            (_, Some(center)) => Some(self.orbit_elements(target, center)?),
        };
        let time = resolve_trigger(maneuver.trigger, elements.as_ref(), self.time())?;
        let id = self.scheduler.schedule(maneuver, time);
        info!("Scheduled maneuver {id} on {target} for t={time:.6}");
        Ok(id)
    }

    pub fn cancel(&mut self, id: ManeuverId) -> Result<Maneuver, EngineError> {
        let maneuver = self.scheduler.cancel(id)?;
        info!("Cancelled maneuver {id}");
        Ok(maneuver)
    }

    /// Pending maneuvers in firing order.
    pub fn pending_maneuvers(&self) -> impl Iterator<Item = &PendingManeuver> {
        self.scheduler.pending()
    }

    // -------------------------------------------------------------------------
    // Transfers
    // -------------------------------------------------------------------------

    /// Hohmann transfer of `ship` onto `target`'s orbit about `center`.
    pub fn plan_hohmann(
        &self,
        ship: BodyHandle,
        center: BodyHandle,
        target: BodyHandle,
        rendezvous: bool,
    ) -> Result<Transfer, EngineError> {
        let origin = self.orbit_elements(ship, center)?;
        let destination = self.orbit_elements(target, center)?;
        transfer::plan_hohmann(ship, &origin, &destination, rendezvous, self.time())
    }

    /// Hohmann transfer of `ship` onto an arbitrary orbit about a registered center.
    pub fn plan_hohmann_to_orbit(&self, ship: BodyHandle, destination: &OrbitElements) -> Result<Transfer, EngineError> {
        let center = destination
            .center
            .ok_or_else(|| EngineError::InvalidElements("destination orbit needs a registered center".to_string()))?;
        let origin = self.orbit_elements(ship, center)?;
        transfer::plan_hohmann(ship, &origin, destination, false, self.time())
    }

    /// Patched-conic departure from `ship`'s parking orbit about `primary`
    /// toward `secondary`'s SOI, arriving at angle `arrival_angle` (radians).
    pub fn plan_patched_conic(
        &self,
        ship: BodyHandle,
        primary: BodyHandle,
        secondary: BodyHandle,
        arrival_angle: f64,
    ) -> Result<Transfer, EngineError> {
        let origin = self.orbit_elements(ship, primary)?;
        let secondary_orbit = self.orbit_elements(secondary, primary)?;
        let request = PatchedConicRequest {
            ship,
            origin: &origin,
            secondary: &secondary_orbit,
            primary_mass: self.state.try_get(primary)?.mass,
            secondary_mass: self.state.try_get(secondary)?.mass,
            arrival_angle,
        };
        transfer::plan_patched_conic(request, self.time())
    }

    /// Hand a planned transfer's maneuvers to the scheduler unchanged.
    ///
    /// All burns are validated first, so either every burn is queued or none is.
    pub fn schedule_transfer(&mut self, transfer: Transfer) -> Result<Vec<ManeuverId>, EngineError> {
        for maneuver in &transfer.maneuvers {
            self.state.try_get(maneuver.target)?;
            if let Some(center) = maneuver.center {
                self.state.try_get(center)?;
            }
        }
        transfer
            .maneuvers
            .into_iter()
            .map(|maneuver| self.schedule(maneuver))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Sphere of influence
    // -------------------------------------------------------------------------

    /// Watch `body` for handoffs between `primary` and `secondary`.
    pub fn watch_soi(&mut self, body: BodyHandle, primary: BodyHandle, secondary: BodyHandle) -> Result<SoiState, EngineError> {
        let g = self.g();
        self.soi.watch(&self.state, body, primary, secondary, g)
    }

    pub fn unwatch_soi(&mut self, body: BodyHandle) -> bool {
        self.soi.unwatch(body)
    }

    /// Current reference center of a watched body.
    pub fn soi_center(&self, body: BodyHandle) -> Option<BodyHandle> {
        self.soi.center_of(body)
    }

    /// Orbit of a watched body about its current center.
    pub fn soi_elements(&self, body: BodyHandle) -> Option<&OrbitElements> {
        self.soi.elements_of(body)
    }

    pub fn on_soi_transition(&mut self, listener: impl FnMut(&SoiTransition) + Send + Sync + 'static) {
        self.soi.add_listener(listener);
    }

    // -------------------------------------------------------------------------
    // Conservation
    // -------------------------------------------------------------------------

    /// Take the current energy and angular momentum as the new baseline.
    pub fn resync_conservation(&mut self) {
        let (law, g) = (self.config.force_law, self.g());
        self.conservation.resync(&self.state, law, g);
    }

    /// Drift against the baseline, warning once past tolerance.
    pub fn check_conservation(&mut self) -> Drift {
        let (law, g) = (self.config.force_law, self.g());
        self.conservation.check(&self.state, law, g)
    }

    // -------------------------------------------------------------------------
    // Prediction
    // -------------------------------------------------------------------------

    /// Start a forward prediction on a fork of the current state.
    ///
    /// While it runs an evolving integrator holds live time. A new request
    /// supersedes one still in flight.
    pub fn request_prediction(&mut self, settings: PredictionSettings) -> Result<(), EngineError> {
        if !(settings.step > 0.0 && settings.step.is_finite()) {
            return Err(EngineError::InvalidConfig(format!(
                "prediction step must be positive, got {}",
                settings.step
            )));
        }
        if let Some(job) = self.prediction_job.take() {
            job.abort.abort();
        }

        let generation = self.next_prediction;
        self.next_prediction += 1;
        let abort = AbortFlag::new();
        let worker_abort = abort.clone();
        let state = self.state.clone();
        let scheduler = self.scheduler.fork();
        let integrator = self.integrator.clone();

        self.jobs.spawn(
            move || JobOutput::Prediction {
                generation,
                result: Ok(predict(state, scheduler, integrator, &settings, &worker_abort)),
            },
            move |msg| JobOutput::Prediction {
                generation,
                result: Err(msg),
            },
        );
        self.prediction_job = Some(PredictionJob { generation, abort });
        self.integrator.begin_recompute();
        debug!("Prediction {generation} requested at t={:.3}", self.time());
        Ok(())
    }

    /// Abort the running prediction, if any, and release live time.
    pub fn cancel_prediction(&mut self) {
        if let Some(job) = self.prediction_job.take() {
            job.abort.abort();
        }
        self.integrator.end_recompute();
    }

    pub fn is_predicting(&self) -> bool {
        self.prediction_job.is_some()
    }

    /// Latest completed prediction.
    pub fn prediction(&self) -> Option<&Prediction> {
        self.prediction.as_ref()
    }

    pub fn predicted_trajectory(&self, body: BodyHandle) -> Option<&TrajectoryPath> {
        self.prediction.as_ref()?.path(body)
    }

    fn finish_prediction(&mut self, generation: u64, result: Result<Prediction, String>) {
        if self.prediction_job.as_ref().map(|job| job.generation) != Some(generation) {
            return;
        }
        self.prediction_job = None;
        self.integrator.end_recompute();
        match result {
            Ok(prediction) if prediction.end == PredictionEnd::Aborted => {}
            Ok(prediction) => {
                debug!(
                    "Prediction {generation} done: t {:.3} → {:.3} in {} steps ({:?})",
                    prediction.start_time, prediction.end_time, prediction.steps, prediction.end
                );
                self.prediction = Some(prediction);
            }
            Err(msg) => warn!("Prediction {generation} failed: {msg}"),
        }
    }

    // -------------------------------------------------------------------------
    // Course-correction search
    // -------------------------------------------------------------------------

    /// Search for the velocity scale that brings `ship` to
    /// `settings.target_distance` from `target` at closest approach.
    ///
    /// The callback runs on the owning thread during a later tick, with the
    /// correction or the reason none was found. It never runs for an
    /// aborted search.
    pub fn request_correction(
        &mut self,
        ship: BodyHandle,
        target: BodyHandle,
        settings: SearchSettings,
        callback: impl FnOnce(&CorrectionResult) + Send + Sync + 'static,
    ) -> Result<SearchId, EngineError> {
        self.state.try_get(ship)?;
        self.state.try_get(target)?;
        if ship == target {
            return Err(EngineError::SelfReference(ship));
        }
        if let Some(center) = settings.center {
            self.state.try_get(center)?;
        }
        let positive = [
            ("step", settings.step),
            ("max_sim_time", settings.max_sim_time),
            ("scale_delta", settings.scale_delta),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(EngineError::InvalidConfig(format!("search {name} must be positive, got {value}")));
            }
        }

        let id = SearchId(self.next_search);
        self.next_search += 1;
        let fork = SearchFork {
            state: self.state.clone(),
            scheduler_seed: ForkedManeuvers::capture(&self.scheduler),
            integrator: self.integrator.clone(),
        };
        let search = ActiveSearch::new(id, ship, target, settings, fork, Some(Box::new(callback)));

        for slot in 0..SAMPLE_COUNT {
            if let Err(err) = spawn_run(&self.jobs, &search, RunKind::Sample(slot), search.scales[slot]) {
                return Err(EngineError::InvalidConfig(format!("search {id} could not fork: {err}")));
            }
        }
        info!(
            "Course-correction search {id}: {ship} → {target}, target distance {:.6}, scales {:?}",
            search.settings.target_distance, search.scales
        );
        self.searches.insert(id, search);
        Ok(id)
    }

    /// Abort a search. Its workers stop at their next step and its callback
    /// is dropped without running.
    pub fn abort_search(&mut self, id: SearchId) -> bool {
        match self.searches.remove(&id) {
            Some(search) => {
                search.abort.abort();
                info!("Course-correction search {id} aborted");
                true
            }
            None => false,
        }
    }

    pub fn is_searching(&self, id: SearchId) -> bool {
        self.searches.contains_key(&id)
    }

    pub fn active_searches(&self) -> usize {
        self.searches.len()
    }

    /// Worker jobs spawned but not yet delivered.
    pub fn jobs_in_flight(&self) -> usize {
        self.jobs.in_flight()
    }

    fn handle_run(&mut self, id: SearchId, kind: RunKind, outcome: Result<Approach, RunFailure>) {
        let Some(search) = self.searches.get_mut(&id) else {
            return;
        };
        let outcome = match outcome {
            Ok(approach) => Ok(approach),
            Err(RunFailure::Aborted) => return,
            Err(RunFailure::Failed(err)) => Err(err),
        };
        let step = match kind {
            RunKind::Sample(slot) => search.on_sample(slot, outcome),
            RunKind::Verification => search.on_verification(outcome),
        };
        match step {
            SearchStep::Waiting => {}
            SearchStep::Verify(scale) => {
                debug!("Search {id}: verifying scale {scale:.9}");
                if let Err(err) = spawn_run(&self.jobs, search, RunKind::Verification, scale) {
                    self.finish_search(id, Err(err));
                }
            }
            SearchStep::Done(result) => self.finish_search(id, result),
        }
    }

    fn finish_search(&mut self, id: SearchId, result: CorrectionResult) {
        let Some(mut search) = self.searches.remove(&id) else {
            return;
        };
        // Stop sibling runs still in flight
        search.abort.abort();

        match &result {
            Ok(correction) => {
                info!(
                    "Course-correction search {id} converged: scale {:.9}, closest approach {:.6} at t={:.3}",
                    correction.scale, correction.closest_approach, correction.approach_time
                );
                if search.settings.apply_on_success {
                    self.apply_correction(&search, correction.scale);
                }
            }
            Err(err) => warn!("Course-correction search {id} failed: {err}"),
        }
        search.complete(&result);
    }

    /// Scale the ship's current velocity the same way the search scaled the fork.
    fn apply_correction(&mut self, search: &ActiveSearch, scale: f64) {
        let applied = scaled_velocity(&self.state, search.ship, search.settings.center, scale)
            .map_err(|err| err.to_string())
            .and_then(|vel| self.state.set_velocity(search.ship, vel).map_err(|err| err.to_string()));
        match applied {
            Ok(()) => {
                info!("Applied correction scale {scale:.9} to {}", search.ship);
                self.resync_conservation();
            }
            Err(err) => warn!("Could not apply correction to {}: {err}", search.ship),
        }
    }

    // -------------------------------------------------------------------------
    // Tick
    // -------------------------------------------------------------------------

    /// Handle every job result delivered since the last call.
    ///
    /// Callbacks run here, before the state is advanced.
    pub fn process_completions(&mut self) -> usize {
        let outputs = self.jobs.drain();
        let count = outputs.len();
        for output in outputs {
            match output {
                JobOutput::Run { search, kind, outcome } => self.handle_run(search, kind, outcome),
                JobOutput::Prediction { generation, result } => self.finish_prediction(generation, result),
            }
        }
        count
    }

    /// One frame of `real_dt` seconds; advances `time_scale · real_dt`.
    pub fn tick(&mut self, real_dt: f64) -> TickReport {
        let dt = self.config.frame_dt(real_dt);
        self.advance(dt)
    }

    /// Drain completions, then advance simulation time by `dt` if evolving,
    /// firing due maneuvers and updating the monitors.
    pub fn advance(&mut self, dt: f64) -> TickReport {
        let mut report = TickReport {
            completions: self.process_completions(),
            ..Default::default()
        };
        if !self.integrator.mode().advances_time() {
            return report;
        }

        let start = self.time();
        report.maneuvers = self.scheduler.advance(&mut self.integrator, &mut self.state, dt);
        report.advanced = self.time() - start;
        if !report.maneuvers.is_empty() {
            self.resync_conservation();
        }
        let g = self.g();
        report.handoffs = self.soi.update(&self.state, g);
        report.drift = Some(self.check_conservation());
        report
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        for search in self.searches.values() {
            search.abort.abort();
        }
        if let Some(job) = &self.prediction_job {
            job.abort.abort();
        }
    }
}

fn spawn_run(
    jobs: &JobRunner<JobOutput>,
    search: &ActiveSearch,
    kind: RunKind,
    scale: f64,
) -> Result<(), CorrectionError> {
    let (state, scheduler, integrator) = search.run_inputs(scale)?;
    let id = search.id;
    let (ship, target) = (search.ship, search.target);
    let settings = search.settings.clone();
    let abort = search.abort.clone();
    jobs.spawn(
        move || JobOutput::Run {
            search: id,
            kind,
            outcome: closest_approach(state, scheduler, integrator, ship, target, &settings, &abort),
        },
        move |msg| JobOutput::Run {
            search: id,
            kind,
            outcome: Err(RunFailure::Failed(CorrectionError::WorkerPanicked(msg))),
        },
    );
    Ok(())
}
