//! Target State
//!
//! Snapshot of the single external target the agents perceive, plus an
//! optional script that drives it along waypoints for headless runs.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::components::SimClock;
use crate::events::{EventLog, SimEvent};
use crate::math::Vec3;
use crate::services::NoiseBus;

/// How fast movement noise decays back toward zero, per second.
const NOISE_DECAY_PER_SEC: f32 = 5.0;

/// Published state of the target. The engine never controls the target; it
/// only reads this snapshot, refreshed before perception each tick.
#[derive(Resource, Debug, Clone)]
pub struct TargetState {
    /// False when the target has despawned or left the simulated area
    pub present: bool,
    pub position: Vec3,
    pub velocity: Vec3,
    /// Current movement-noise level, in the same units as emitted noise
    pub noise_level: f32,
    /// True while the target carries an active light source
    pub emits_light: bool,
}

impl TargetState {
    pub fn absent() -> Self {
        Self {
            present: false,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            noise_level: 0.0,
            emits_light: false,
        }
    }

    pub fn at(position: Vec3) -> Self {
        Self { present: true, position, ..Self::absent() }
    }

    pub fn speed(&self) -> f32 {
        self.velocity.length()
    }
}

/// Movement gait of a scripted target. Each gait pairs a speed with the
/// noise level it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gait {
    Sneak,
    Walk,
    Run,
}

impl Gait {
    pub fn speed(self) -> f32 {
        match self {
            Self::Sneak => 1.5,
            Self::Walk => 3.0,
            Self::Run => 6.0,
        }
    }

    pub fn noise(self) -> f32 {
        match self {
            Self::Sneak => 2.0,
            Self::Walk => 5.0,
            Self::Run => 10.0,
        }
    }
}

/// A scripted one-off noise, e.g. a thrown object.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Distraction {
    pub tick: u64,
    pub position: Vec3,
    pub intensity: f32,
}

/// Waypoint script that moves the target for headless simulation runs.
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
pub struct TargetScript {
    pub waypoints: Vec<Vec3>,
    pub current: usize,
    pub gait: Gait,
    #[serde(default)]
    pub distractions: Vec<Distraction>,
}

impl TargetScript {
    pub fn new(waypoints: Vec<Vec3>, gait: Gait) -> Self {
        Self { waypoints, current: 0, gait, distractions: Vec::new() }
    }
}

/// Drives the scripted target one step and publishes its state. Without a
/// script the snapshot belongs to an external publisher and is left alone.
pub fn drive_target(
    clock: Res<SimClock>,
    mut target: ResMut<TargetState>,
    mut bus: ResMut<NoiseBus>,
    mut log: ResMut<EventLog>,
    script: Option<ResMut<TargetScript>>,
) {
    let Some(mut script) = script else {
        return;
    };

    for d in &script.distractions {
        if d.tick == clock.tick {
            bus.emit(d.position, d.intensity);
            log.push(SimEvent::Distraction {
                position: d.position,
                intensity: d.intensity,
                at: clock.time,
            });
        }
    }

    if !target.present || script.current >= script.waypoints.len() {
        target.velocity = Vec3::ZERO;
        target.noise_level = (target.noise_level - NOISE_DECAY_PER_SEC * clock.dt).max(0.0);
        return;
    }

    let goal = script.waypoints[script.current];
    let to_goal = goal - target.position;
    let dist = to_goal.length();
    let step = script.gait.speed() * clock.dt;
    if dist <= step {
        target.position = goal;
        target.velocity = Vec3::ZERO;
        script.current += 1;
    } else {
        let dir = to_goal.normalized_or_zero();
        target.position += dir * step;
        target.velocity = dir * script.gait.speed();
    }

    if target.velocity.length() > 0.0 {
        target.noise_level = script.gait.noise();
        bus.emit(target.position, script.gait.noise());
    } else {
        target.noise_level = (target.noise_level - NOISE_DECAY_PER_SEC * clock.dt).max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::advance_clock;
    use crate::events::EventLog;

    #[test]
    fn test_scripted_distraction_fires_once() {
        let mut world = World::new();
        world.insert_resource(SimClock::new(0.1));
        world.insert_resource(TargetState::at(Vec3::ZERO));
        world.insert_resource(NoiseBus::new(3.0));
        world.insert_resource(EventLog::default());
        let mut script = TargetScript::new(Vec::new(), Gait::Sneak);
        let thrown_at = Vec3::new(5.0, 0.0, 5.0);
        script.distractions.push(Distraction { tick: 2, position: thrown_at, intensity: 8.0 });
        world.insert_resource(script);

        let mut schedule = Schedule::default();
        schedule.add_systems((advance_clock, drive_target).chain());
        for _ in 0..5 {
            schedule.run(&mut world);
        }

        let fired: Vec<_> = world
            .resource::<EventLog>()
            .iter()
            .filter_map(|e| match e {
                SimEvent::Distraction { position, intensity, .. } => Some((*position, *intensity)),
                _ => None,
            })
            .collect();
        assert_eq!(fired, vec![(thrown_at, 8.0)]);
    }

    #[test]
    fn test_gait_ordering() {
        assert!(Gait::Sneak.noise() < Gait::Walk.noise());
        assert!(Gait::Walk.noise() < Gait::Run.noise());
        assert!(Gait::Sneak.speed() < Gait::Run.speed());
    }

    #[test]
    fn test_target_speed() {
        let mut t = TargetState::at(Vec3::ZERO);
        t.velocity = Vec3::new(3.0, 0.0, 4.0);
        assert!((t.speed() - 5.0).abs() < 1e-5);
    }
}
