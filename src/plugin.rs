//! Drives a [`Simulation`] resource from bevy's frame clock.

use bevy::prelude::*;

use crate::config::EngineConfig;
use crate::engine::Simulation;

/// Plugin inserting a [`Simulation`] and ticking it once per frame.
///
/// # Panics
/// Building the plugin panics when `config` fails [`EngineConfig::validate`].
#[derive(Clone, Debug, Default)]
pub struct OrbitalEnginePlugin {
    pub config: EngineConfig,
    /// Start the integrator as soon as the plugin is built.
    pub autostart: bool,
}

impl Plugin for OrbitalEnginePlugin {
    fn build(&self, app: &mut App) {
        let mut sim = Simulation::new(self.config.clone())
            .unwrap_or_else(|err| panic!("Invalid engine configuration: {err}"));
        if self.autostart {
            sim.start();
        }
        app.insert_resource(sim.config().clone())
            .insert_resource(sim)
            .add_systems(Update, tick_simulation);
    }
}

/// Advance the simulation by the real time elapsed since the last frame.
///
/// The time scale is applied inside [`Simulation::tick`].
fn tick_simulation(mut sim: ResMut<Simulation>, time: Res<Time>) {
    let report = sim.tick(time.delta_secs_f64());
    if !report.handoffs.is_empty() || !report.maneuvers.is_empty() {
        debug!(
            "Frame at t={:.3}: {} maneuvers, {} SOI handoffs",
            sim.time(),
            report.maneuvers.len(),
            report.handoffs.len()
        );
    }
}
