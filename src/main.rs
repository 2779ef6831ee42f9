//! Orbital Engine - headless demo
//!
//! Loads a preset, plans a Hohmann rendezvous, runs a course-correction
//! search and lets bevy's frame loop drive the simulation for a while.
//!
//! Usage: `orbital-engine [scenario-id]` (default `hohmann`).

use std::time::Duration;

use bevy::app::ScheduleRunnerPlugin;
use bevy::log::LogPlugin;
use bevy::prelude::*;

use orbital_engine::scenarios::{SCENARIOS, get_scenario};
use orbital_engine::search::SearchSettings;
use orbital_engine::{EngineConfig, OrbitalEnginePlugin, Simulation};

/// Frames to run before exiting.
const DEMO_FRAMES: u32 = 600;

#[derive(Resource, Default)]
struct FrameCount(u32);

fn main() {
    let id = std::env::args().nth(1).unwrap_or_else(|| "hohmann".to_string());
    let Some(scenario) = get_scenario(&id) else {
        let known: Vec<_> = SCENARIOS.iter().map(|s| s.id).collect();
        eprintln!("Unknown scenario '{id}'. Available: {}", known.join(", "));
        std::process::exit(2);
    };

    let config = EngineConfig {
        time_scale: scenario.time_scale,
        ..Default::default()
    };

    let mut app = App::new();
    app.add_plugins((
        MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_secs_f64(1.0 / 60.0))),
        LogPlugin::default(),
    ))
    .add_plugins(OrbitalEnginePlugin { config, autostart: false })
    .init_resource::<FrameCount>()
    .add_systems(Update, stop_after_demo);

    let setup = {
        let mut sim = app.world_mut().resource_mut::<Simulation>();
        setup_demo(&mut sim, scenario)
    };
    if let Err(err) = setup {
        error!("Scenario '{}' failed to load: {err}", scenario.id);
        std::process::exit(1);
    }
    app.run();
}

fn setup_demo(sim: &mut Simulation, scenario: &orbital_engine::scenarios::Scenario) -> Result<(), orbital_engine::EngineError> {
    info!("Scenario: {} - {}", scenario.name, scenario.description);
    let bodies = scenario.load(sim)?;
    let (Some(star), Some(ship)) = (bodies.get("star"), bodies.get("ship")) else {
        sim.start();
        return Ok(());
    };

    if let Some(target) = bodies.get("target") {
        let transfer = sim.plan_hohmann(ship, star, target, true)?;
        info!(
            "Hohmann rendezvous: wait {:.2}, flight {:.2}, Δv {:.4}",
            transfer.wait_time, transfer.time_of_flight, transfer.total_delta_v
        );
        sim.schedule_transfer(transfer)?;
    }

    if let Some(planet) = bodies.get("planet") {
        let transfer = sim.plan_patched_conic(ship, star, planet, 30f64.to_radians())?;
        info!(
            "Patched conic: wait {:.2}, flight {:.2}, Δv {:.4}",
            transfer.wait_time, transfer.time_of_flight, transfer.total_delta_v
        );
        sim.schedule_transfer(transfer)?;
        sim.watch_soi(ship, star, planet)?;
        sim.on_soi_transition(|t| info!("{} entered the domain of {} at t={:.2}", t.body, t.new_center, t.time));

        let settings = SearchSettings {
            target_distance: 1.0,
            center: Some(star),
            max_sim_time: 400.0,
            step: 0.05,
            ..Default::default()
        };
        sim.request_correction(ship, planet, settings, |result| match result {
            Ok(correction) => info!("Correction found: scale velocity by {:.6}", correction.scale),
            Err(err) => warn!("No correction: {err}"),
        })?;
    }

    sim.start();
    Ok(())
}

fn stop_after_demo(mut frames: ResMut<FrameCount>, sim: Res<Simulation>, mut exit: MessageWriter<AppExit>) {
    frames.0 += 1;
    if frames.0 >= DEMO_FRAMES {
        info!(
            "Demo finished at t={:.2}, {} maneuvers pending, {} jobs in flight",
            sim.time(),
            sim.pending_maneuvers().count(),
            sim.jobs_in_flight()
        );
        exit.write(AppExit::Success);
    }
}
