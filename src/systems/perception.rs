//! Perception Systems
//!
//! Interval-gated vision checks against the target snapshot and the
//! close-range hearing channel that works regardless of emitted noise.

use bevy_ecs::prelude::*;

use crate::components::{
    Behavior, BehaviorState, ConeZone, HearingSensor, NoiseInbox, Sight, SightResult, SimClock,
    Transform, VisionSensor,
};
use crate::math::{angle_between_deg, Vec3};
use crate::nav::SceneIndex;
use crate::target::TargetState;

/// Height above the target's transform the occlusion ray is aimed at.
const TARGET_CHEST_HEIGHT: f32 = 1.0;

/// Radius of the approximate sphere cast used by proximity hearing.
const HEARING_PROBE_RADIUS: f32 = 0.5;

/// Runs each agent's vision check when its interval elapses and stores the
/// result in [`Sight`]. Between checks the previous result is held, so the
/// detection meter keeps integrating against it.
pub fn update_vision(
    clock: Res<SimClock>,
    scene: Res<SceneIndex>,
    target: Res<TargetState>,
    mut agents: Query<(&mut VisionSensor, &Transform, &mut Sight, &Behavior)>,
) {
    for (mut sensor, transform, mut sight, behavior) in agents.iter_mut() {
        let interval = if behavior.state == BehaviorState::Chasing {
            sensor.chase_interval
        } else {
            sensor.interval
        };
        if clock.time - sensor.last_check < interval {
            continue;
        }
        sensor.last_check = clock.time;

        sight.result = check_sight(&sensor, transform, &scene, &target);
        if sight.result.visible {
            sight.last_visible_at = Some(clock.time);
            sight.last_seen_pos = Some(target.position);
        }
    }
}

/// A single vision check: range, cone zone, then occlusion.
fn check_sight(
    sensor: &VisionSensor,
    transform: &Transform,
    scene: &SceneIndex,
    target: &TargetState,
) -> SightResult {
    if !sensor.enabled || !target.present {
        return SightResult::none();
    }

    let to_target = target.position - transform.position;
    let distance = to_target.length();
    if distance > sensor.distance {
        return SightResult::none();
    }

    // Cone test is horizontal; height differences don't push a target out
    // of view.
    let flat = Vec3::new(to_target.x, 0.0, to_target.z);
    let angle_deg = angle_between_deg(transform.facing(), flat);
    let zone = if angle_deg <= sensor.cone_deg / 2.0 {
        ConeZone::Primary
    } else if angle_deg <= sensor.peripheral_deg / 2.0 {
        ConeZone::Peripheral
    } else {
        return SightResult::none();
    };

    let eye = transform.position + Vec3::UP * sensor.eye_height;
    let aim = target.position + Vec3::UP * TARGET_CHEST_HEIGHT;
    if scene.occluded(eye, aim) {
        return SightResult::none();
    }

    SightResult { visible: true, angle_deg, distance, zone }
}

/// Close-range hearing: a present target inside the hearing radius is heard
/// every tick, scaled down with distance, unless solid geometry sits between
/// them. This is what makes sneaking right past an agent impossible.
pub fn update_hearing_proximity(
    scene: Res<SceneIndex>,
    target: Res<TargetState>,
    mut agents: Query<(&Transform, &HearingSensor, &mut NoiseInbox)>,
) {
    if !target.present {
        return;
    }
    for (transform, hearing, mut inbox) in agents.iter_mut() {
        if !hearing.enabled {
            continue;
        }
        let d = transform.position.distance(target.position);
        if d > hearing.distance {
            continue;
        }
        let from = transform.position + Vec3::UP * TARGET_CHEST_HEIGHT;
        let to = target.position + Vec3::UP * TARGET_CHEST_HEIGHT;
        if scene.sphere_occluded(from, to, HEARING_PROBE_RADIUS) {
            continue;
        }
        let level = (hearing.threshold + 1.0) * (1.0 - d / hearing.distance);
        inbox.offer(target.position, level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::nav::Aabb;

    fn sensor() -> VisionSensor {
        VisionSensor::from_config(&Config::default())
    }

    #[test]
    fn test_sight_in_primary_cone() {
        let scene = SceneIndex::default();
        let target = TargetState::at(Vec3::new(0.0, 0.0, 5.0));
        let tf = Transform::at(Vec3::ZERO);
        let result = check_sight(&sensor(), &tf, &scene, &target);
        assert!(result.visible);
        assert_eq!(result.zone, ConeZone::Primary);
        assert!((result.distance - 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_sight_peripheral_zone() {
        let scene = SceneIndex::default();
        // 45 degrees off forward: outside the 45-degree full primary cone,
        // inside the 110-degree peripheral cone.
        let target = TargetState::at(Vec3::new(5.0, 0.0, 5.0));
        let tf = Transform::at(Vec3::ZERO);
        let result = check_sight(&sensor(), &tf, &scene, &target);
        assert!(result.visible);
        assert_eq!(result.zone, ConeZone::Peripheral);
    }

    #[test]
    fn test_sight_blocked_by_range_angle_occlusion() {
        let tf = Transform::at(Vec3::ZERO);
        let scene = SceneIndex::default();

        let far = TargetState::at(Vec3::new(0.0, 0.0, 50.0));
        assert!(!check_sight(&sensor(), &tf, &scene, &far).visible);

        let behind = TargetState::at(Vec3::new(0.0, 0.0, -5.0));
        assert!(!check_sight(&sensor(), &tf, &scene, &behind).visible);

        let walled = SceneIndex {
            obstacles: vec![Aabb::new(Vec3::new(-2.0, 0.0, 2.0), Vec3::new(2.0, 3.0, 3.0))],
            ..SceneIndex::default()
        };
        let ahead = TargetState::at(Vec3::new(0.0, 0.0, 5.0));
        assert!(!check_sight(&sensor(), &tf, &walled, &ahead).visible);
    }

    #[test]
    fn test_absent_target_is_invisible() {
        let scene = SceneIndex::default();
        let mut target = TargetState::at(Vec3::new(0.0, 0.0, 2.0));
        target.present = false;
        let tf = Transform::at(Vec3::ZERO);
        assert!(!check_sight(&sensor(), &tf, &scene, &target).visible);
    }
}
