//! Impulsive maneuvers and the time-ordered scheduler that fires them.
//!
//! A maneuver is resolved to an absolute trigger time when it is scheduled.
//! While advancing, the scheduler lands the integrator on each trigger time
//! and pops due maneuvers one at a time, so each fires exactly once even if
//! its callback schedules more work.

use std::fmt;

use bevy::log::{info, warn};
use bevy::math::DVec3;

use crate::error::EngineError;
use crate::orbit::OrbitElements;
use crate::physics::{GravityState, Integrator};
use crate::types::BodyHandle;

/// Stable identifier of a scheduled maneuver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManeuverId(pub(crate) u64);

impl fmt::Display for ManeuverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// When a maneuver fires.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ManeuverTrigger {
    /// Absolute simulation time.
    At(f64),
    /// Next periapsis passage about the maneuver's center.
    NextPeriapsis,
    /// Next apoapsis passage (closed orbits only).
    NextApoapsis,
    /// Next time the body reaches this true anomaly (radians).
    TrueAnomaly(f64),
}

/// Velocity change applied when a maneuver fires.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DeltaV {
    /// Scalar boost along the velocity relative to the center (negative = retrograde).
    Boost(f64),
    /// Explicit world-frame velocity delta.
    Vector(DVec3),
    /// Absolute velocity relative to the center.
    SetVelocity(DVec3),
}

impl DeltaV {
    /// New world-frame velocity for a body moving at `vel` about a center moving at `center_vel`.
    pub fn apply(&self, vel: DVec3, center_vel: DVec3) -> DVec3 {
        match *self {
            DeltaV::Boost(dv) => {
                let relative = vel - center_vel;
                match relative.try_normalize() {
                    Some(dir) => vel + dir * dv,
                    // No direction to boost along
                    None => vel,
                }
            }
            DeltaV::Vector(dv) => vel + dv,
            DeltaV::SetVelocity(v) => center_vel + v,
        }
    }
}

/// Summary handed to completion callbacks and logs.
#[derive(Clone, Debug, PartialEq)]
pub struct ManeuverReport {
    pub id: ManeuverId,
    pub target: BodyHandle,
    pub time: f64,
    pub label: Option<String>,
    /// Velocity change actually applied (world frame).
    pub applied: DVec3,
    /// Velocity after the burn (world frame).
    pub velocity: DVec3,
}

pub type ManeuverCallback = Box<dyn FnOnce(&ManeuverReport) + Send + Sync + 'static>;

/// A velocity impulse waiting to be scheduled.
pub struct Maneuver {
    pub target: BodyHandle,
    pub trigger: ManeuverTrigger,
    pub delta_v: DeltaV,
    /// Frame for boosts, absolute sets and event triggers. `None` = world origin.
    pub center: Option<BodyHandle>,
    pub label: Option<String>,
    pub executed: bool,
    callback: Option<ManeuverCallback>,
}

impl Maneuver {
    pub fn new(target: BodyHandle, trigger: ManeuverTrigger, delta_v: DeltaV) -> Self {
        Self {
            target,
            trigger,
            delta_v,
            center: None,
            label: None,
            executed: false,
            callback: None,
        }
    }

    /// Measure boosts and event triggers relative to `center`.
    pub fn relative_to(mut self, center: BodyHandle) -> Self {
        self.center = Some(center);
        self
    }

    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Run `callback` once, right after the burn is applied.
    pub fn on_complete(mut self, callback: impl FnOnce(&ManeuverReport) + Send + Sync + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// Copy for a speculative fork. Forks never run completion callbacks.
    pub fn fork(&self) -> Self {
        Self {
            target: self.target,
            trigger: self.trigger,
            delta_v: self.delta_v,
            center: self.center,
            label: self.label.clone(),
            executed: self.executed,
            callback: None,
        }
    }

    fn describe(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| format!("{:?}", self.delta_v))
    }
}

impl fmt::Debug for Maneuver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Maneuver")
            .field("target", &self.target)
            .field("trigger", &self.trigger)
            .field("delta_v", &self.delta_v)
            .field("center", &self.center)
            .field("label", &self.label)
            .field("executed", &self.executed)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Resolve a trigger to an absolute simulation time.
///
/// Event triggers need the target's elements about the maneuver center.
pub fn resolve_trigger(
    trigger: ManeuverTrigger,
    elements: Option<&OrbitElements>,
    now: f64,
) -> Result<f64, EngineError> {
    let event = |name: &str, dt: Option<f64>| -> Result<f64, EngineError> {
        dt.map(|dt| now + dt).ok_or_else(|| {
            EngineError::UnresolvableTrigger(format!("{name} is never reached on the current orbit"))
        })
    };

    match trigger {
        ManeuverTrigger::At(time) if time.is_finite() => Ok(time),
        ManeuverTrigger::At(time) => Err(EngineError::UnresolvableTrigger(format!(
            "trigger time {time} is not finite"
        ))),
        ManeuverTrigger::NextPeriapsis => event("periapsis", require(elements)?.time_to_periapsis()),
        ManeuverTrigger::NextApoapsis => event("apoapsis", require(elements)?.time_to_apoapsis()),
        ManeuverTrigger::TrueAnomaly(nu) => {
            event("true anomaly", require(elements)?.time_to_true_anomaly(nu))
        }
    }
}

fn require(elements: Option<&OrbitElements>) -> Result<&OrbitElements, EngineError> {
    elements.ok_or_else(|| {
        EngineError::UnresolvableTrigger("event trigger needs an orbit about a center".to_string())
    })
}

/// A maneuver with its resolved trigger time.
#[derive(Debug)]
pub struct PendingManeuver {
    pub id: ManeuverId,
    pub time: f64,
    pub maneuver: Maneuver,
}

impl PendingManeuver {
    /// Apply the burn to `state`, mark it executed and run the callback.
    pub fn execute(mut self, state: &mut GravityState) -> Result<ManeuverReport, EngineError> {
        let body = state.try_get(self.maneuver.target)?;
        let center_vel = match self.maneuver.center {
            Some(center) => state.try_get(center)?.vel,
            None => DVec3::ZERO,
        };
        let old = body.vel;
        let new = self.maneuver.delta_v.apply(old, center_vel);
        state.set_velocity(self.maneuver.target, new)?;
        self.maneuver.executed = true;

        let report = ManeuverReport {
            id: self.id,
            target: self.maneuver.target,
            time: state.time(),
            label: self.maneuver.label.take(),
            applied: new - old,
            velocity: new,
        };
        if let Some(callback) = self.maneuver.callback.take() {
            callback(&report);
        }
        Ok(report)
    }

    pub fn describe(&self) -> String {
        self.maneuver.describe()
    }
}

/// Relative tolerance for treating a trigger as reached.
const TRIGGER_SLACK: f64 = 1e-12;

/// Time-ordered queue of pending maneuvers.
///
/// Ordered by (trigger time, scheduling order), so coincident triggers fire
/// in the order they were scheduled.
#[derive(Debug, Default)]
pub struct ManeuverScheduler {
    queue: Vec<PendingManeuver>,
    next_id: u64,
}

impl ManeuverScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a maneuver at its resolved trigger time.
    pub fn schedule(&mut self, maneuver: Maneuver, time: f64) -> ManeuverId {
        let id = ManeuverId(self.next_id);
        self.next_id += 1;
        let slot = self.queue.partition_point(|m| m.time <= time);
        self.queue.insert(slot, PendingManeuver { id, time, maneuver });
        id
    }

    /// Remove a pending maneuver and hand it back.
    pub fn cancel(&mut self, id: ManeuverId) -> Result<Maneuver, EngineError> {
        let slot = self
            .queue
            .iter()
            .position(|m| m.id == id)
            .ok_or(EngineError::UnknownManeuver(id))?;
        Ok(self.queue.remove(slot).maneuver)
    }

    /// Trigger time of the earliest pending maneuver.
    pub fn next_time(&self) -> Option<f64> {
        self.queue.first().map(|m| m.time)
    }

    /// Pop the earliest maneuver if it is due at `time`.
    pub fn pop_due(&mut self, time: f64) -> Option<PendingManeuver> {
        if self.queue.first()?.time <= time {
            Some(self.queue.remove(0))
        } else {
            None
        }
    }

    /// Drop every maneuver that targets `body` or is measured relative to it.
    pub fn drop_body(&mut self, body: BodyHandle) -> Vec<PendingManeuver> {
        let (dropped, kept) = std::mem::take(&mut self.queue)
            .into_iter()
            .partition(|m| m.maneuver.target == body || m.maneuver.center == Some(body));
        self.queue = kept;
        dropped
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingManeuver> {
        self.queue.iter()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Copy for a speculative fork, without callbacks.
    pub fn fork(&self) -> Self {
        Self {
            queue: self
                .queue
                .iter()
                .map(|m| PendingManeuver {
                    id: m.id,
                    time: m.time,
                    maneuver: m.maneuver.fork(),
                })
                .collect(),
            next_id: self.next_id,
        }
    }

    /// Evolve `state` by `dt`, stopping exactly on every trigger inside the
    /// interval and firing the maneuvers due there.
    ///
    /// Overdue maneuvers fire before the first step. Maneuvers due exactly at
    /// the end of the interval fire before returning. A maneuver whose burn
    /// cannot be applied is still consumed and logged.
    pub fn advance(&mut self, integrator: &mut Integrator, state: &mut GravityState, dt: f64) -> Vec<ManeuverReport> {
        let end = state.time() + dt.max(0.0);
        let mut reports = Vec::new();
        loop {
            self.fire_due(state, &mut reports);
            let now = state.time();
            match self.next_time() {
                Some(trigger) if trigger < end => integrator.evolve(state, trigger - now),
                _ => {
                    integrator.evolve(state, end - now);
                    break;
                }
            }
        }
        self.fire_due(state, &mut reports);
        reports
    }

    fn fire_due(&mut self, state: &mut GravityState, reports: &mut Vec<ManeuverReport>) {
        let now = state.time();
        // Landing on a trigger can leave the clock an ulp short of it
        let horizon = now + TRIGGER_SLACK * (1.0 + now.abs());
        while let Some(pending) = self.pop_due(horizon) {
            let id = pending.id;
            let name = pending.describe();
            let scheduled = pending.time;
            match pending.execute(state) {
                Ok(report) => {
                    info!(
                        "Maneuver {} ({}) fired on {} at t={:.6}: |Δv| = {:.6}",
                        id,
                        name,
                        report.target,
                        report.time,
                        report.applied.length()
                    );
                    reports.push(report);
                }
                Err(err) => warn!("Maneuver {id} ({name}) due at t={scheduled:.6} dropped: {err}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BodyState;
    use approx::assert_relative_eq;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn burn(target: BodyHandle, time: f64, label: &str) -> Maneuver {
        Maneuver::new(target, ManeuverTrigger::At(time), DeltaV::Boost(0.1)).labeled(label)
    }

    #[test]
    fn test_boost_is_relative_to_center() {
        let vel = DVec3::new(1.0, 3.0, 0.0);
        let center_vel = DVec3::new(1.0, 0.0, 0.0);
        let new = DeltaV::Boost(0.5).apply(vel, center_vel);
        // Relative velocity is +y, so the boost goes entirely into y
        assert_relative_eq!(new.x, 1.0);
        assert_relative_eq!(new.y, 3.5);

        let set = DeltaV::SetVelocity(DVec3::Z).apply(vel, center_vel);
        assert_eq!(set, DVec3::new(1.0, 0.0, 1.0));
        // Boosting a body at rest relative to its center does nothing
        assert_eq!(DeltaV::Boost(1.0).apply(center_vel, center_vel), center_vel);
    }

    #[test]
    fn test_queue_orders_by_time_then_scheduling() {
        let target = BodyHandle(0);
        let mut scheduler = ManeuverScheduler::new();
        scheduler.schedule(burn(target, 5.0, "late"), 5.0);
        scheduler.schedule(burn(target, 2.0, "first"), 2.0);
        scheduler.schedule(burn(target, 2.0, "second"), 2.0);

        let order: Vec<_> = scheduler.pending().map(|m| m.describe()).collect();
        assert_eq!(order, vec!["first", "second", "late"]);
        assert_eq!(scheduler.next_time(), Some(2.0));
    }

    #[test]
    fn test_pop_due_respects_time() {
        let mut scheduler = ManeuverScheduler::new();
        scheduler.schedule(burn(BodyHandle(0), 3.0, "a"), 3.0);
        assert!(scheduler.pop_due(2.999).is_none());
        assert!(scheduler.pop_due(3.0).is_some());
        assert!(scheduler.pop_due(100.0).is_none());
    }

    #[test]
    fn test_cancel_returns_maneuver() {
        let mut scheduler = ManeuverScheduler::new();
        let id = scheduler.schedule(burn(BodyHandle(1), 1.0, "x"), 1.0);
        let maneuver = scheduler.cancel(id).unwrap();
        assert_eq!(maneuver.target, BodyHandle(1));
        assert_eq!(scheduler.cancel(id).unwrap_err(), EngineError::UnknownManeuver(id));
    }

    #[test]
    fn test_execute_runs_callback_once() {
        let mut state = GravityState::new();
        let ship = state.add(BodyState::massless(DVec3::X, DVec3::Y));
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();

        let mut scheduler = ManeuverScheduler::new();
        scheduler.schedule(
            Maneuver::new(ship, ManeuverTrigger::At(0.0), DeltaV::Vector(DVec3::Z)).on_complete(move |report| {
                assert_eq!(report.applied, DVec3::Z);
                seen.fetch_add(1, Ordering::SeqCst);
            }),
            0.0,
        );

        let due = scheduler.pop_due(0.0).unwrap();
        let report = due.execute(&mut state).unwrap();
        assert_eq!(report.velocity, DVec3::new(0.0, 1.0, 1.0));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(scheduler.pop_due(0.0).is_none());
    }

    #[test]
    fn test_fork_drops_callbacks() {
        let mut scheduler = ManeuverScheduler::new();
        scheduler.schedule(burn(BodyHandle(0), 1.0, "a").on_complete(|_| {}), 1.0);
        let fork = scheduler.fork();
        assert_eq!(fork.len(), 1);
        assert!(!fork.pending().next().unwrap().maneuver.has_callback());
        assert!(scheduler.pending().next().unwrap().maneuver.has_callback());
    }

    #[test]
    fn test_drop_body_removes_targets_and_centers() {
        let mut scheduler = ManeuverScheduler::new();
        scheduler.schedule(burn(BodyHandle(1), 1.0, "target"), 1.0);
        scheduler.schedule(burn(BodyHandle(2), 1.0, "centered").relative_to(BodyHandle(1)), 1.0);
        scheduler.schedule(burn(BodyHandle(2), 1.0, "other"), 1.0);

        let dropped = scheduler.drop_body(BodyHandle(1));
        assert_eq!(dropped.len(), 2);
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_resolve_event_triggers() {
        let el = OrbitElements::from_cartesian(DVec3::X, DVec3::Y * 1.2, 1.0, None, 10.0).unwrap();
        let apo = resolve_trigger(ManeuverTrigger::NextApoapsis, Some(&el), 10.0).unwrap();
        assert_relative_eq!(apo - 10.0, el.period().unwrap() / 2.0, max_relative = 1e-10);

        assert_eq!(resolve_trigger(ManeuverTrigger::At(4.0), None, 10.0), Ok(4.0));
        assert!(matches!(
            resolve_trigger(ManeuverTrigger::NextPeriapsis, None, 0.0),
            Err(EngineError::UnresolvableTrigger(_))
        ));

        let escape = OrbitElements::from_cartesian(DVec3::X, DVec3::Y * 2.0, 1.0, None, 0.0).unwrap();
        assert!(resolve_trigger(ManeuverTrigger::NextApoapsis, Some(&escape), 0.0).is_err());
    }

    #[test]
    fn test_advance_lands_on_trigger() {
        let mut state = GravityState::new();
        let ship = state.add(BodyState::massless(DVec3::ZERO, DVec3::X));
        let mut integrator = Integrator::new(&crate::config::EngineConfig::default());
        let mut scheduler = ManeuverScheduler::new();
        scheduler.schedule(Maneuver::new(ship, ManeuverTrigger::At(0.25), DeltaV::Vector(DVec3::Y)), 0.25);

        let reports = scheduler.advance(&mut integrator, &mut state, 1.0);
        assert_eq!(reports.len(), 1);
        assert_relative_eq!(reports[0].time, 0.25, epsilon = 1e-12);
        assert_relative_eq!(state.time(), 1.0, epsilon = 1e-12);

        // Free drift: 0.25 along x, then 0.75 along x + y
        let body = state.get(ship).unwrap();
        assert_relative_eq!(body.pos.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(body.pos.y, 0.75, epsilon = 1e-12);
    }

    #[test]
    fn test_advance_fires_once_under_uneven_steps() {
        let mut state = GravityState::new();
        let ship = state.add(BodyState::massless(DVec3::ZERO, DVec3::ZERO));
        let mut integrator = Integrator::new(&crate::config::EngineConfig::default());
        let mut scheduler = ManeuverScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        scheduler.schedule(
            burn(ship, 5.0, "kick").on_complete(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            5.0,
        );

        for dt in [3.0, 0.7, 0.3, 1.0, 0.4, 1.6] {
            scheduler.advance(&mut integrator, &mut state, dt);
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_overdue_maneuver_fires_first() {
        let mut state = GravityState::new();
        let ship = state.add(BodyState::massless(DVec3::ZERO, DVec3::ZERO));
        let mut integrator = Integrator::new(&crate::config::EngineConfig::default());
        integrator.evolve(&mut state, 2.0);

        let mut scheduler = ManeuverScheduler::new();
        scheduler.schedule(burn(ship, 1.0, "late"), 1.0);
        let reports = scheduler.advance(&mut integrator, &mut state, 0.5);
        assert_eq!(reports.len(), 1);
        assert_relative_eq!(reports[0].time, 2.0);
    }
}
