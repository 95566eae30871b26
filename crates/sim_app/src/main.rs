//! # sim_app — demo embedder
//!
//! Loads a small world description, brings two systems online, runs the
//! simulation for a stretch of ticks, and prints the final poses plus the
//! last tick's timing report as JSON.

mod components;
mod systems;
mod worldgen;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sim_runtime::{Manager, ManagerConfig, TimingDiagnostics};
use sim_world::WorldLoader;

use components::{Odometry, Pose};
use systems::{MotionSystem, TelemetrySystem};
use worldgen::RobotComponentizer;

const WORLD: &str = r#"<?xml version="1.0"?>
<world name="yard">
  <model name="rover">
    <pose>0 0 0.2</pose>
    <velocity>0.4 0.3 0</velocity>
    <odometry/>
  </model>
  <model name="drone">
    <pose>5 5 1 1.57</pose>
    <velocity>-0.2 0 0.1</velocity>
    <odometry/>
  </model>
  <model name="beacon">
    <pose>10 0 0</pose>
  </model>
</world>"#;

const TICKS: u64 = 300;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sim_app=info".parse()?))
        .init();

    info!("simulator starting");

    let diagnostics = Arc::new(TimingDiagnostics::new());
    let diagnostics_hook: Arc<dyn sim_runtime::Diagnostics> = diagnostics.clone();
    let manager = Manager::with_diagnostics(ManagerConfig { worker_threads: 2 }, diagnostics_hook)?;

    let mut loader = WorldLoader::new();
    loader.load_componentizer(&manager, RobotComponentizer);
    let entities = loader.load_world_from_string(&manager, WORLD)?;
    info!(entities = entities.len(), "world populated");

    manager.load_system(MotionSystem);
    manager.load_system(TelemetrySystem);

    for _ in 0..TICKS {
        manager.update_once();
    }
    info!(
        ticks = manager.tick_count(),
        sim_time = manager.simulation_time(),
        "simulation finished"
    );

    // Freeze the database while reading out final state.
    let handle = manager.data_handle();
    for entity in &entities {
        let view = handle.entity(*entity);
        if let Some(pose) = view.get::<Pose>() {
            let distance = view.get::<Odometry>().map_or(0.0, |o| o.distance);
            info!(entity = %entity, position = ?pose.position, distance, "final state");
        }
    }
    drop(handle);

    if let Some(report) = diagnostics.last_report() {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}
