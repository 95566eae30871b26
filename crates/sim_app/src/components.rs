//! Demo robot components.
//!
//! The core treats these as opaque bytes; only the app and its systems
//! interpret them.

use glam::DVec3;
use serde::{Deserialize, Serialize};
use sim_component::Component;

/// World-frame position and yaw of a body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: DVec3,
    pub yaw: f64,
}

impl Component for Pose {
    fn type_name() -> &'static str {
        "Pose"
    }
}

/// Linear velocity of a body, in metres per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub linear: DVec3,
}

impl Component for Velocity {
    fn type_name() -> &'static str {
        "Velocity"
    }
}

/// Accumulated motion statistics, written by the telemetry system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Odometry {
    pub distance: f64,
    pub last_position: DVec3,
}

impl Component for Odometry {
    fn type_name() -> &'static str {
        "Odometry"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_component::ComponentTypeId;

    #[test]
    fn test_type_ids_are_distinct() {
        let ids = [
            ComponentTypeId::of::<Pose>(),
            ComponentTypeId::of::<Velocity>(),
            ComponentTypeId::of::<Odometry>(),
        ];
        assert!(ids.iter().all(|id| id.is_valid()));
        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[1], ids[2]);
        assert_ne!(ids[0], ids[2]);
    }
}
