//! Stealth Simulation Engine
//!
//! Fixed-step enemy perception and behavior simulation: vision cones with a
//! confidence meter, attenuated hearing through a central noise bus, alert
//! relaying between agents, and a seven-state behavior machine for guards
//! and citizens reacting to a single external target.

pub mod components;
pub mod config;
pub mod events;
pub mod math;
pub mod nav;
pub mod routines;
pub mod services;
pub mod setup;
pub mod systems;
pub mod target;

use bevy_ecs::prelude::*;
use rand::rngs::SmallRng;

/// Deterministic simulation RNG. All randomness flows through this resource
/// so a seed fully reproduces a run.
#[derive(Resource)]
pub struct SimRng(pub SmallRng);

/// Builds the per-tick schedule. Order is fixed: clock, target, snapshot,
/// perception, message routing, detection, transitions, state logic,
/// locomotion, cleanup.
pub fn build_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.add_systems(
        (
            components::advance_clock,
            target::drive_target,
            systems::behavior::build_agent_index,
            systems::perception::update_vision,
            systems::perception::update_hearing_proximity,
            services::noise::route_noise,
            services::alert::deliver_alerts,
            systems::detection::update_detection,
            systems::behavior::apply_detection_transitions,
            systems::behavior::apply_noise_and_alerts,
            systems::behavior::drive_states,
            nav::advance_movement,
            services::noise::expire_noise_events,
        )
            .chain(),
    );
    schedule
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::math::Vec3;

    #[test]
    fn test_schedule_runs_on_fresh_world() {
        let mut world = World::new();
        setup::insert_core_resources(&mut world, Config::default(), 1, 0.1);
        setup::spawn_citizen(&mut world, "c", Vec3::ZERO, Vec3::ZERO);
        let mut schedule = build_schedule();
        for _ in 0..10 {
            schedule.run(&mut world);
        }
        assert_eq!(world.resource::<components::SimClock>().tick, 10);
    }
}
