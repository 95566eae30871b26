//! Componentizer for the demo robot schema.

use sim_component::{ComponentRegistry, Entity};
use sim_runtime::DataHandle;
use sim_world::{Componentizer, Element, ElementEntityMap};
use tracing::warn;

use crate::components::{Odometry, Pose, Velocity};

/// Maps `<pose>`, `<velocity>`, and `<odometry>` elements onto the demo
/// components.
#[derive(Default)]
pub struct RobotComponentizer;

impl Componentizer for RobotComponentizer {
    fn name(&self) -> &str {
        "robot"
    }

    fn init(&mut self, registry: &ComponentRegistry) {
        registry.register::<Pose>().expect("Pose registration");
        registry.register::<Velocity>().expect("Velocity registration");
        registry.register::<Odometry>().expect("Odometry registration");
    }

    fn componentize(
        &mut self,
        handle: &DataHandle<'_>,
        element: &Element,
        entity: Entity,
        _entities: &ElementEntityMap,
    ) {
        match element.name.as_str() {
            "pose" => match element.text_floats().as_deref() {
                Some([x, y, z]) => {
                    if let Some(mut pose) = handle.entity(entity).add::<Pose>() {
                        pose.position = glam::DVec3::new(*x, *y, *z);
                    }
                }
                Some([x, y, z, yaw]) => {
                    if let Some(mut pose) = handle.entity(entity).add::<Pose>() {
                        pose.position = glam::DVec3::new(*x, *y, *z);
                        pose.yaw = *yaw;
                    }
                }
                _ => warn!(entity = %entity, text = %element.text, "malformed <pose>, skipped"),
            },
            "velocity" => match element.text_floats().as_deref() {
                Some([x, y, z]) => {
                    if let Some(mut velocity) = handle.entity(entity).add::<Velocity>() {
                        velocity.linear = glam::DVec3::new(*x, *y, *z);
                    }
                }
                _ => {
                    warn!(entity = %entity, text = %element.text, "malformed <velocity>, skipped");
                }
            },
            "odometry" => {
                // Starts zeroed; the telemetry system rebases on first run.
                let _ = handle.entity(entity).add::<Odometry>();
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use sim_runtime::{Manager, ManagerConfig};
    use sim_world::WorldLoader;

    use super::*;

    #[test]
    fn test_componentizer_maps_elements() {
        let manager = Manager::new(ManagerConfig::default()).unwrap();
        let mut loader = WorldLoader::new();
        loader.load_componentizer(&manager, RobotComponentizer);

        let entities = loader
            .load_world_from_string(
                &manager,
                r#"<world>
                     <model name="cart">
                       <pose>1 0 0 1.57</pose>
                       <velocity>0.5 0 0</velocity>
                       <odometry/>
                     </model>
                   </world>"#,
            )
            .unwrap();
        manager.update_once();

        let cart = manager.entity(entities[0]);
        let pose = cart.get::<Pose>().unwrap();
        assert_eq!(pose.position.x, 1.0);
        assert_eq!(pose.yaw, 1.57);
        assert_eq!(cart.get::<Velocity>().unwrap().linear.x, 0.5);
        assert!(cart.has::<Odometry>());
    }
}
