//! Navigation and Scene Queries
//!
//! Straight-line movement facade standing in for a navmesh agent, plus the
//! static scene index used for occlusion raycasts, hiding-spot lookup, and
//! destination sampling.

use bevy_ecs::prelude::*;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::components::{SimClock, Transform};
use crate::math::{dir_to_yaw, Vec3};

/// Cap on the recorded command history per agent.
const COMMAND_HISTORY_CAP: usize = 64;

/// Movement facade. Behaviors issue destinations through it and poll
/// arrival; actual locomotion is a straight-line step per tick.
#[derive(Component, Debug, Clone)]
pub struct Movement {
    destination: Option<Vec3>,
    /// True for the tick between a command and its first locomotion step,
    /// mirroring a path request in flight.
    pending: bool,
    pub speed: f32,
    pub base_speed: f32,
    pub arrival_epsilon: f32,
    /// Recent destination commands, newest last.
    commands: Vec<Vec3>,
}

impl Movement {
    pub fn new(speed: f32, arrival_epsilon: f32) -> Self {
        Self {
            destination: None,
            pending: false,
            speed,
            base_speed: speed,
            arrival_epsilon,
            commands: Vec::new(),
        }
    }

    pub fn destination(&self) -> Option<Vec3> {
        self.destination
    }

    /// Issue a new destination. Supersedes any current one.
    pub fn set_destination(&mut self, point: Vec3) {
        self.destination = Some(point);
        self.pending = true;
        if self.commands.len() == COMMAND_HISTORY_CAP {
            self.commands.remove(0);
        }
        self.commands.push(point);
    }

    /// Cancel the current destination, halting in place.
    pub fn stop(&mut self) {
        self.destination = None;
        self.pending = false;
    }

    /// Remaining distance to the destination, or 0.0 when idle.
    pub fn remaining(&self, position: Vec3) -> f32 {
        self.destination.map_or(0.0, |d| position.distance(d))
    }

    /// Arrival check: no path pending and remaining distance below the
    /// epsilon. An idle facade reports arrived.
    pub fn has_arrived(&self, position: Vec3) -> bool {
        !self.pending && self.remaining(position) < self.arrival_epsilon
    }

    pub fn commands(&self) -> &[Vec3] {
        &self.commands
    }

    fn step(&mut self, position: Vec3, dt: f32) -> Option<Vec3> {
        let dest = self.destination?;
        self.pending = false;
        let to_dest = dest - position;
        let dist = to_dest.length();
        let step = self.speed * dt;
        if dist <= step {
            self.destination = None;
            return Some(dest);
        }
        Some(position + to_dest.normalized_or_zero() * step)
    }
}

/// Advances every moving agent one straight-line step and turns it toward
/// its motion.
pub fn advance_movement(clock: Res<SimClock>, mut query: Query<(&mut Transform, &mut Movement)>) {
    for (mut transform, mut movement) in query.iter_mut() {
        let from = transform.position;
        if let Some(next) = movement.step(from, clock.dt) {
            let motion = next - from;
            if motion.length() > f32::EPSILON {
                transform.yaw_deg = dir_to_yaw(motion);
            }
            transform.position = next;
        }
    }
}

/// Axis-aligned box used for scene bounds and occluders.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    pub fn inflated(&self, by: f32) -> Self {
        let d = Vec3::new(by, by, by);
        Self { min: self.min - d, max: self.max + d }
    }

    /// Slab test against the segment `from -> to`. Returns the entry
    /// parameter in [0, 1] when the segment hits the box.
    pub fn segment_hit(&self, from: Vec3, to: Vec3) -> Option<f32> {
        let dir = to - from;
        let mut t_min = 0.0f32;
        let mut t_max = 1.0f32;
        for (origin, delta, lo, hi) in [
            (from.x, dir.x, self.min.x, self.max.x),
            (from.y, dir.y, self.min.y, self.max.y),
            (from.z, dir.z, self.min.z, self.max.z),
        ] {
            if delta.abs() < f32::EPSILON {
                if origin < lo || origin > hi {
                    return None;
                }
            } else {
                let inv = 1.0 / delta;
                let (t0, t1) = {
                    let a = (lo - origin) * inv;
                    let b = (hi - origin) * inv;
                    if a < b {
                        (a, b)
                    } else {
                        (b, a)
                    }
                };
                t_min = t_min.max(t0);
                t_max = t_max.min(t1);
                if t_min > t_max {
                    return None;
                }
            }
        }
        Some(t_min)
    }
}

/// Category tag on a hiding spot, mirroring the scene markup the spots are
/// authored with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HidingCategory {
    Cover,
    Bushes,
    Hiding,
}

/// A tagged scene position a citizen can hide at.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HidingSpotInfo {
    pub position: Vec3,
    pub category: HidingCategory,
}

/// Static scene geometry: walkable bounds, occluders, and hiding spots.
///
/// Built once at setup and never mutated during a run.
#[derive(Resource, Debug, Clone, Default)]
pub struct SceneIndex {
    pub bounds: Option<Aabb>,
    pub obstacles: Vec<Aabb>,
    pub hiding_spots: Vec<HidingSpotInfo>,
}

impl SceneIndex {
    /// True when any obstacle blocks the segment `from -> to`.
    pub fn occluded(&self, from: Vec3, to: Vec3) -> bool {
        self.obstacles.iter().any(|o| o.segment_hit(from, to).is_some())
    }

    /// Occlusion test with the obstacles inflated by `radius`, approximating
    /// a sphere cast.
    pub fn sphere_occluded(&self, from: Vec3, to: Vec3, radius: f32) -> bool {
        self.obstacles
            .iter()
            .any(|o| o.inflated(radius).segment_hit(from, to).is_some())
    }

    /// Clamp a desired destination into the walkable bounds and nudge it out
    /// of any obstacle footprint.
    pub fn sample_position(&self, desired: Vec3) -> Vec3 {
        let mut point = match self.bounds {
            Some(b) => desired.clamped(b.min, b.max),
            None => desired,
        };
        for obstacle in &self.obstacles {
            if obstacle.contains(point) {
                let center = (obstacle.min + obstacle.max) * 0.5;
                let away = (point - center).normalized_or_zero();
                let half = (obstacle.max - obstacle.min) * 0.5;
                let reach = half.length() + 0.5;
                point = if away == Vec3::ZERO {
                    center + Vec3::new(reach, 0.0, 0.0)
                } else {
                    center + away * reach
                };
            }
        }
        point
    }

    /// All hiding spots within `radius` of `center`.
    pub fn hiding_spots_within(&self, center: Vec3, radius: f32) -> Vec<HidingSpotInfo> {
        self.hiding_spots
            .iter()
            .copied()
            .filter(|s| s.position.distance(center) <= radius)
            .collect()
    }

    /// Uniform random point in a disc around `center`, clamped walkable.
    pub fn random_point_around(&self, rng: &mut impl Rng, center: Vec3, radius: f32) -> Vec3 {
        let angle = rng.gen_range(0.0..std::f32::consts::TAU);
        let r = radius * rng.gen_range(0.0f32..1.0).sqrt();
        let desired = center + Vec3::new(angle.cos() * r, 0.0, angle.sin() * r);
        self.sample_position(desired)
    }
}
