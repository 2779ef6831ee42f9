//! Sphere-of-influence handoff.
//!
//! Each watched body is either under its primary's influence or inside a
//! secondary's SOI. The classification uses a hysteresis band around the
//! Laplace radius so a body skimming the boundary does not flip back and
//! forth. Only the reference center of the body's orbit elements changes on a
//! handoff; the world-frame state is never touched.

use bevy::log::{debug, info};

use crate::error::EngineError;
use crate::orbit::{OrbitElements, relative_elements};
use crate::physics::GravityState;
use crate::transfer::soi_radius;
use crate::types::BodyHandle;

/// Which body currently dominates a watched body's orbit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SoiState {
    Primary,
    Secondary,
}

/// A completed handoff, delivered to listeners.
#[derive(Clone, Debug, PartialEq)]
pub struct SoiTransition {
    pub body: BodyHandle,
    pub new_center: BodyHandle,
    pub old_center: BodyHandle,
    pub state: SoiState,
    pub time: f64,
    /// Orbit re-expressed against `new_center`
    pub elements: OrbitElements,
}

pub type SoiListener = Box<dyn FnMut(&SoiTransition) + Send + Sync + 'static>;

#[derive(Clone, Debug)]
struct SoiWatch {
    body: BodyHandle,
    primary: BodyHandle,
    secondary: BodyHandle,
    state: SoiState,
    elements: OrbitElements,
}

impl SoiWatch {
    fn center(&self) -> BodyHandle {
        match self.state {
            SoiState::Primary => self.primary,
            SoiState::Secondary => self.secondary,
        }
    }
}

/// Geometry of one classification step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SoiGeometry {
    /// D, primary–secondary distance
    pub separation: f64,
    /// d, body–secondary distance
    pub distance: f64,
    /// Rs
    pub radius: f64,
}

impl SoiGeometry {
    pub fn measure(
        state: &GravityState,
        body: BodyHandle,
        primary: BodyHandle,
        secondary: BodyHandle,
    ) -> Result<Self, EngineError> {
        let b = state.try_get(body)?;
        let p = state.try_get(primary)?;
        let s = state.try_get(secondary)?;
        let separation = (s.pos - p.pos).length();
        Ok(Self {
            separation,
            distance: (b.pos - s.pos).length(),
            radius: soi_radius(separation, s.mass, p.mass),
        })
    }

    /// Classification after this step, given the current one.
    pub fn classify(&self, current: SoiState, hysteresis: f64) -> SoiState {
        match current {
            SoiState::Primary if self.distance < self.radius * (1.0 - hysteresis) => SoiState::Secondary,
            SoiState::Secondary if self.distance > self.radius * (1.0 + hysteresis) => SoiState::Primary,
            unchanged => unchanged,
        }
    }
}

/// Watches bodies against primary/secondary pairs and re-bases their orbits.
pub struct SoiMonitor {
    hysteresis: f64,
    watches: Vec<SoiWatch>,
    listeners: Vec<SoiListener>,
}

impl SoiMonitor {
    pub fn new(hysteresis: f64) -> Self {
        Self {
            hysteresis,
            watches: Vec::new(),
            listeners: Vec::new(),
        }
    }

    pub fn hysteresis(&self) -> f64 {
        self.hysteresis
    }

    /// Change the band width. Existing classifications are kept.
    pub fn set_hysteresis(&mut self, hysteresis: f64) {
        self.hysteresis = hysteresis;
    }

    /// Start watching `body` against a primary/secondary pair.
    ///
    /// The initial state is taken from the current geometry without the
    /// hysteresis band. Watching a body again replaces its previous pair.
    pub fn watch(
        &mut self,
        state: &GravityState,
        body: BodyHandle,
        primary: BodyHandle,
        secondary: BodyHandle,
        gravitational_constant: f64,
    ) -> Result<SoiState, EngineError> {
        if primary == secondary {
            return Err(EngineError::SelfReference(primary));
        }
        let geometry = SoiGeometry::measure(state, body, primary, secondary)?;
        let soi_state = if geometry.distance < geometry.radius {
            SoiState::Secondary
        } else {
            SoiState::Primary
        };
        let center = match soi_state {
            SoiState::Primary => primary,
            SoiState::Secondary => secondary,
        };
        let elements = relative_elements(state, body, center, gravitational_constant)?;

        self.unwatch(body);
        self.watches.push(SoiWatch {
            body,
            primary,
            secondary,
            state: soi_state,
            elements,
        });
        debug!("SOI watch on {body}: primary {primary}, secondary {secondary}, starts in {soi_state:?}");
        Ok(soi_state)
    }

    /// Stop watching `body`. Returns whether it was watched.
    pub fn unwatch(&mut self, body: BodyHandle) -> bool {
        let before = self.watches.len();
        self.watches.retain(|w| w.body != body);
        self.watches.len() != before
    }

    /// Drop every watch that involves `body` in any role.
    pub fn drop_body(&mut self, body: BodyHandle) {
        self.watches
            .retain(|w| w.body != body && w.primary != body && w.secondary != body);
    }

    pub fn add_listener(&mut self, listener: impl FnMut(&SoiTransition) + Send + Sync + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn state_of(&self, body: BodyHandle) -> Option<SoiState> {
        self.find(body).map(|w| w.state)
    }

    /// Current reference center of a watched body.
    pub fn center_of(&self, body: BodyHandle) -> Option<BodyHandle> {
        self.find(body).map(SoiWatch::center)
    }

    /// Latest elements of a watched body against its current center.
    pub fn elements_of(&self, body: BodyHandle) -> Option<&OrbitElements> {
        self.find(body).map(|w| &w.elements)
    }

    pub fn len(&self) -> usize {
        self.watches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    /// Reclassify every watched body, refresh its elements and notify
    /// listeners of handoffs. Watches whose bodies are gone or inactive are
    /// skipped this step.
    pub fn update(&mut self, state: &GravityState, gravitational_constant: f64) -> Vec<SoiTransition> {
        let mut transitions = Vec::new();
        for watch in &mut self.watches {
            let Ok(geometry) = SoiGeometry::measure(state, watch.body, watch.primary, watch.secondary) else {
                continue;
            };
            let next = geometry.classify(watch.state, self.hysteresis);
            let old_center = watch.center();
            let new_center = match next {
                SoiState::Primary => watch.primary,
                SoiState::Secondary => watch.secondary,
            };

            // Hold the old classification until the new center gives valid elements
            let elements = match relative_elements(state, watch.body, new_center, gravitational_constant) {
                Ok(elements) => elements,
                Err(err) => {
                    debug!("SOI elements for {} unavailable: {err}", watch.body);
                    continue;
                }
            };
            watch.state = next;
            watch.elements = elements;

            if new_center != old_center {
                info!(
                    "SOI handoff at t={:.3}: {} now orbits {} (was {}), d {:.4} vs Rs {:.4}",
                    state.time(),
                    watch.body,
                    new_center,
                    old_center,
                    geometry.distance,
                    geometry.radius
                );
                transitions.push(SoiTransition {
                    body: watch.body,
                    new_center,
                    old_center,
                    state: next,
                    time: state.time(),
                    elements: watch.elements.clone(),
                });
            }
        }

        for transition in &transitions {
            for listener in &mut self.listeners {
                listener(transition);
            }
        }
        transitions
    }

    fn find(&self, body: BodyHandle) -> Option<&SoiWatch> {
        self.watches.iter().find(|w| w.body == body)
    }
}

impl std::fmt::Debug for SoiMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoiMonitor")
            .field("hysteresis", &self.hysteresis)
            .field("watches", &self.watches)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
