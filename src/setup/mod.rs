//! World Setup
//!
//! Resource insertion and agent spawning, plus the demo scene the binary
//! runs headless.

use bevy_ecs::prelude::*;
use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::components::{
    AgentId, AgentKind, AlertInbox, Behavior, Detection, HearingSensor, Nervousness, NoiseInbox,
    PatrolPolicy, PatrolRoute, Sight, SimClock, Suspicion, Transform, VisionSensor, WanderArea,
};
use crate::config::Config;
use crate::events::EventLog;
use crate::math::Vec3;
use crate::nav::{Aabb, HidingCategory, HidingSpotInfo, Movement, SceneIndex};
use crate::routines::ProtectionRequests;
use crate::services::{AlertRelay, NoiseBus};
use crate::systems::behavior::AgentIndex;
use crate::target::{Distraction, Gait, TargetScript, TargetState};
use crate::SimRng;

/// Inserts every resource the schedule expects.
pub fn insert_core_resources(world: &mut World, cfg: Config, seed: u64, dt: f32) {
    world.insert_resource(SimClock::new(dt));
    world.insert_resource(SimRng(SmallRng::seed_from_u64(seed)));
    world.insert_resource(NoiseBus::new(cfg.noise.default_duration));
    world.insert_resource(AlertRelay::new(cfg.alert.cooldown));
    world.insert_resource(EventLog::default());
    world.insert_resource(AgentIndex::default());
    world.insert_resource(ProtectionRequests::default());
    world.insert_resource(TargetState::absent());
    world.insert_resource(SceneIndex::default());
    world.insert_resource(cfg);
}

/// Spawns a patrolling guard and registers it with the noise bus.
pub fn spawn_guard(
    world: &mut World,
    id: &str,
    position: Vec3,
    route: Vec<Vec3>,
    policy: PatrolPolicy,
) -> Entity {
    let cfg = world.resource::<Config>().clone();
    let entity = world
        .spawn((
            AgentId::new(id),
            AgentKind::Guard,
            Transform::at(position),
            Movement::new(cfg.behavior.speed, cfg.behavior.arrival_epsilon),
            VisionSensor::from_config(&cfg),
            HearingSensor::from_config(&cfg),
            Sight::default(),
            Detection::default(),
            Behavior::new(AgentKind::Guard.baseline()),
            Suspicion::from_config(&cfg.suspicion),
            NoiseInbox::default(),
            PatrolRoute::new(route, policy, cfg.behavior.patrol_dwell),
        ))
        .id();
    world.resource_mut::<NoiseBus>().register(entity);
    entity
}

/// Spawns a wandering citizen and registers it with the noise bus.
pub fn spawn_citizen(world: &mut World, id: &str, position: Vec3, wander_center: Vec3) -> Entity {
    let cfg = world.resource::<Config>().clone();
    let entity = world
        .spawn((
            AgentId::new(id),
            AgentKind::Citizen,
            Transform::at(position),
            Movement::new(cfg.behavior.speed, cfg.behavior.arrival_epsilon),
            VisionSensor::from_config(&cfg),
            HearingSensor::from_config(&cfg),
            Sight::default(),
            Detection::default(),
            Behavior::new(AgentKind::Citizen.baseline()),
            Nervousness::default(),
            NoiseInbox::default(),
            AlertInbox::default(),
            WanderArea::new(wander_center, cfg.behavior.wander_radius),
        ))
        .id();
    world.resource_mut::<NoiseBus>().register(entity);
    entity
}

/// Small courtyard scene: two guards on crossing patrols, three citizens,
/// a few walls, tagged hiding spots, and a scripted target sneaking through.
pub fn demo_scene(world: &mut World) {
    world.insert_resource(SceneIndex {
        bounds: Some(Aabb::new(
            Vec3::new(-30.0, 0.0, -30.0),
            Vec3::new(30.0, 5.0, 30.0),
        )),
        obstacles: vec![
            Aabb::new(Vec3::new(-8.0, 0.0, 4.0), Vec3::new(-4.0, 3.0, 6.0)),
            Aabb::new(Vec3::new(4.0, 0.0, -6.0), Vec3::new(6.0, 3.0, -2.0)),
            Aabb::new(Vec3::new(-2.0, 0.0, 14.0), Vec3::new(2.0, 3.0, 16.0)),
        ],
        hiding_spots: vec![
            HidingSpotInfo { position: Vec3::new(-10.0, 0.0, 8.0), category: HidingCategory::Bushes },
            HidingSpotInfo { position: Vec3::new(8.0, 0.0, -8.0), category: HidingCategory::Cover },
            HidingSpotInfo { position: Vec3::new(-14.0, 0.0, -10.0), category: HidingCategory::Hiding },
        ],
    });

    spawn_guard(
        world,
        "guard-1",
        Vec3::new(-12.0, 0.0, -12.0),
        vec![
            Vec3::new(-12.0, 0.0, -12.0),
            Vec3::new(12.0, 0.0, -12.0),
            Vec3::new(12.0, 0.0, 12.0),
            Vec3::new(-12.0, 0.0, 12.0),
        ],
        PatrolPolicy::Loop,
    );
    spawn_guard(
        world,
        "guard-2",
        Vec3::new(0.0, 0.0, -18.0),
        vec![Vec3::new(0.0, 0.0, -18.0), Vec3::new(0.0, 0.0, 18.0)],
        PatrolPolicy::BackAndForth,
    );

    spawn_citizen(world, "citizen-1", Vec3::new(-6.0, 0.0, 0.0), Vec3::new(-6.0, 0.0, 0.0));
    spawn_citizen(world, "citizen-2", Vec3::new(6.0, 0.0, 6.0), Vec3::new(6.0, 0.0, 6.0));
    spawn_citizen(world, "citizen-3", Vec3::new(0.0, 0.0, 10.0), Vec3::new(0.0, 0.0, 10.0));

    world.insert_resource(TargetState::at(Vec3::new(-20.0, 0.0, -20.0)));
    let mut script = TargetScript::new(
        vec![
            Vec3::new(-20.0, 0.0, 0.0),
            Vec3::new(-6.0, 0.0, 4.0),
            Vec3::new(8.0, 0.0, 4.0),
            Vec3::new(20.0, 0.0, 20.0),
        ],
        Gait::Sneak,
    );
    // A thrown rock to pull the patrols east while the target slips past.
    script.distractions.push(Distraction {
        tick: 150,
        position: Vec3::new(14.0, 0.0, -4.0),
        intensity: 8.0,
    });
    world.insert_resource(script);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::BehaviorState;

    #[test]
    fn test_spawned_guard_patrols() {
        let mut world = World::new();
        insert_core_resources(&mut world, Config::default(), 7, 0.1);
        let guard = spawn_guard(
            &mut world,
            "g",
            Vec3::ZERO,
            vec![Vec3::ZERO, Vec3::new(5.0, 0.0, 0.0)],
            PatrolPolicy::Loop,
        );
        let behavior = world.get::<Behavior>(guard).expect("behavior");
        assert_eq!(behavior.state, BehaviorState::Patrolling);
        assert!(world.resource::<NoiseBus>().is_registered(guard));
        assert!(world.get::<Suspicion>(guard).is_some());
        assert!(world.get::<AlertInbox>(guard).is_none());
    }

    #[test]
    fn test_spawned_citizen_wanders() {
        let mut world = World::new();
        insert_core_resources(&mut world, Config::default(), 7, 0.1);
        let citizen = spawn_citizen(&mut world, "c", Vec3::ZERO, Vec3::ZERO);
        let behavior = world.get::<Behavior>(citizen).expect("behavior");
        assert_eq!(behavior.state, BehaviorState::Wandering);
        assert!(world.get::<Nervousness>(citizen).is_some());
        assert!(world.get::<PatrolRoute>(citizen).is_none());
    }
}
