//! World Components
//!
//! Spatial transform and the fixed-step simulation clock.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::math::{yaw_to_dir, Vec3};

/// World-space position and horizontal facing of an agent.
///
/// Owned by the physics/transform layer in the full game; here it is advanced
/// by the movement facade and read by perception.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub yaw_deg: f32,
}

impl Transform {
    pub fn at(position: Vec3) -> Self {
        Self { position, yaw_deg: 0.0 }
    }

    pub fn facing(&self) -> Vec3 {
        yaw_to_dir(self.yaw_deg)
    }
}

/// Fixed-step simulation clock shared by all agents.
///
/// All timeouts in the engine are counters against `time`; nothing waits on
/// wall-clock time.
#[derive(Resource, Debug, Clone, Copy)]
pub struct SimClock {
    pub tick: u64,
    /// Accumulated simulation time in seconds
    pub time: f32,
    /// Fixed step duration in seconds
    pub dt: f32,
}

impl SimClock {
    pub fn new(dt: f32) -> Self {
        Self { tick: 0, time: 0.0, dt }
    }

    pub fn advance(&mut self) {
        self.tick += 1;
        self.time += self.dt;
    }
}

/// System advancing the clock once per schedule run.
pub fn advance_clock(mut clock: ResMut<SimClock>) {
    clock.advance();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advance() {
        let mut clock = SimClock::new(0.25);
        clock.advance();
        clock.advance();
        assert_eq!(clock.tick, 2);
        assert!((clock.time - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_facing_default_is_plus_z() {
        let tf = Transform::at(Vec3::ZERO);
        let f = tf.facing();
        assert!((f.z - 1.0).abs() < 1e-5 && f.x.abs() < 1e-5);
    }
}
