//! Demo systems: velocity integration and odometry telemetry.

use sim_component::{ComponentTypeId, Diff, QueryDescriptor};
use sim_runtime::{Registrar, System};
use tracing::info;

use crate::components::{Odometry, Pose, Velocity};

/// Simulation step per tick, in seconds.
pub const STEP: f64 = 0.01;

/// Integrates `Pose` from `Velocity` and advances simulation time by one
/// fixed step per tick. Sole writer of `Pose`.
pub struct MotionSystem;

impl System for MotionSystem {
    fn name(&self) -> &str {
        "motion"
    }

    fn init(&mut self, registrar: &mut Registrar<'_>) {
        let desc = QueryDescriptor::from_types(&[
            ComponentTypeId::of::<Pose>(),
            ComponentTypeId::of::<Velocity>(),
        ]);
        let _ = registrar.register(desc, |view, manager| {
            for entity in view.entities() {
                let Some(velocity) = view.get::<Velocity>(*entity) else {
                    continue;
                };
                if let Some(mut pose) = view.get_mut::<Pose>(*entity) {
                    pose.position += velocity.linear * STEP;
                }
            }
            manager.set_simulation_time(manager.simulation_time() + STEP);
        });
    }
}

/// Tracks per-entity travelled distance in `Odometry` and logs it once a
/// simulated second. Sole writer of `Odometry`.
pub struct TelemetrySystem;

impl System for TelemetrySystem {
    fn name(&self) -> &str {
        "telemetry"
    }

    fn init(&mut self, registrar: &mut Registrar<'_>) {
        let desc = QueryDescriptor::from_types(&[
            ComponentTypeId::of::<Pose>(),
            ComponentTypeId::of::<Odometry>(),
        ]);
        let _ = registrar.register(desc, |view, manager| {
            let at_second = (manager.simulation_time() / STEP).round() as u64 % 100 == 0;
            for entity in view.entities() {
                let Some(pose) = view.get::<Pose>(*entity) else {
                    continue;
                };
                let Some(mut odometry) = view.get_mut::<Odometry>(*entity) else {
                    continue;
                };
                if view.diff(*entity, ComponentTypeId::of::<Odometry>()) == Diff::Created {
                    // Freshly loaded: rebase instead of counting the jump
                    // from the origin as travelled distance.
                    odometry.last_position = pose.position;
                    continue;
                }
                odometry.distance += pose.position.distance(odometry.last_position);
                odometry.last_position = pose.position;
                if at_second {
                    info!(
                        entity = %entity,
                        distance = odometry.distance,
                        sim_time = manager.simulation_time(),
                        "odometry"
                    );
                }
            }
        });
    }
}
