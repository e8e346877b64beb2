//! Noise Bus
//!
//! Central registry of noise emissions. Emitters post (position, intensity)
//! pairs; routing attenuates each by distance per listener and delivers the
//! result to the listener's inbox in the same tick.

use bevy_ecs::prelude::*;
use std::collections::HashSet;

use crate::components::{HearingSensor, NoiseInbox, SimClock, Transform};
use crate::math::Vec3;

/// A noise that stays observable for a short window, e.g. for debug
/// visualization or late queries.
#[derive(Debug, Clone, Copy)]
pub struct NoiseEvent {
    pub position: Vec3,
    pub intensity: f32,
    pub created_at: f32,
    pub duration: f32,
}

impl NoiseEvent {
    pub fn expired(&self, now: f32) -> bool {
        now - self.created_at >= self.duration
    }
}

/// Central noise service. Listeners register once at spawn; emissions are
/// queued and routed in a fixed point of the tick so delivery order never
/// depends on emitter order.
#[derive(Resource, Debug, Default)]
pub struct NoiseBus {
    registered: HashSet<Entity>,
    queue: Vec<(Vec3, f32)>,
    events: Vec<NoiseEvent>,
    pub default_duration: f32,
}

impl NoiseBus {
    pub fn new(default_duration: f32) -> Self {
        Self { default_duration, ..Self::default() }
    }

    /// Register a listener. Registering twice is a no-op.
    pub fn register(&mut self, listener: Entity) {
        self.registered.insert(listener);
    }

    /// Remove a listener. Unknown entities are ignored.
    pub fn unregister(&mut self, listener: Entity) {
        self.registered.remove(&listener);
    }

    pub fn is_registered(&self, listener: Entity) -> bool {
        self.registered.contains(&listener)
    }

    /// Post a noise for routing this tick.
    pub fn emit(&mut self, position: Vec3, intensity: f32) {
        self.queue.push((position, intensity));
    }

    /// Attenuated level at `listener_pos` for a noise of `intensity` at
    /// `source`, given the listener's hearing radius. Zero outside it.
    pub fn attenuate(source: Vec3, intensity: f32, listener_pos: Vec3, hearing: f32) -> f32 {
        if hearing <= 0.0 {
            return 0.0;
        }
        let d = source.distance(listener_pos);
        intensity * (1.0 - d / hearing).max(0.0)
    }

    pub fn active_events(&self) -> &[NoiseEvent] {
        &self.events
    }

    fn take_queue(&mut self) -> Vec<(Vec3, f32)> {
        std::mem::take(&mut self.queue)
    }
}

/// Drains the emission queue and delivers attenuated noise to every
/// registered listener's inbox.
pub fn route_noise(
    clock: Res<SimClock>,
    mut bus: ResMut<NoiseBus>,
    mut listeners: Query<(Entity, &Transform, &HearingSensor, &mut NoiseInbox)>,
) {
    let pending = bus.take_queue();
    if pending.is_empty() {
        return;
    }
    let default_duration = bus.default_duration;
    for &(position, intensity) in &pending {
        bus.events.push(NoiseEvent {
            position,
            intensity,
            created_at: clock.time,
            duration: default_duration,
        });
    }
    for (entity, transform, hearing, mut inbox) in listeners.iter_mut() {
        if !hearing.enabled || !bus.is_registered(entity) {
            continue;
        }
        for &(position, intensity) in &pending {
            let level =
                NoiseBus::attenuate(position, intensity, transform.position, hearing.distance);
            inbox.offer(position, level);
        }
    }
}

/// Drops noise events whose observation window has passed.
pub fn expire_noise_events(clock: Res<SimClock>, mut bus: ResMut<NoiseBus>) {
    let now = clock.time;
    bus.events.retain(|e| !e.expired(now));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attenuation_is_linear_in_distance() {
        let src = Vec3::ZERO;
        let hearing = 8.0;
        let at = |d: f32| {
            NoiseBus::attenuate(src, 12.0, Vec3::new(d, 0.0, 0.0), hearing)
        };
        assert_eq!(at(0.0), 12.0);
        assert_eq!(at(4.0), 6.0);
        assert_eq!(at(12.0), 0.0);
    }

    #[test]
    fn test_register_idempotent() {
        let mut bus = NoiseBus::new(3.0);
        let e = Entity::from_raw(7);
        bus.register(e);
        bus.register(e);
        assert!(bus.is_registered(e));
        bus.unregister(e);
        bus.unregister(e);
        assert!(!bus.is_registered(e));
    }

    #[test]
    fn test_event_expiry() {
        let e = NoiseEvent { position: Vec3::ZERO, intensity: 5.0, created_at: 1.0, duration: 3.0 };
        assert!(!e.expired(3.9));
        assert!(e.expired(4.0));
    }
}
