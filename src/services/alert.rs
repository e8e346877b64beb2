//! Alert Relay
//!
//! Broadcast channel for danger warnings. Guards shout when they spot the
//! target; scared citizens relay weaker warnings to other citizens. Delivery
//! is queued and resolved at a fixed point of the tick.

use bevy_ecs::prelude::*;
use std::collections::HashMap;

use crate::components::{
    AgentId, AgentKind, AlertCue, AlertInbox, HearingSensor, NoiseInbox, SimClock, Transform,
};
use crate::config::Config;
use crate::events::{EventLog, SimEvent};
use crate::math::Vec3;
use crate::services::NoiseBus;

/// Who a broadcast reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertScope {
    All,
    CitizensOnly,
}

/// A queued broadcast awaiting delivery.
#[derive(Debug, Clone)]
pub struct PendingAlert {
    pub origin: Entity,
    pub origin_id: String,
    pub origin_pos: Vec3,
    pub danger: Vec3,
    pub intensity: f32,
    pub scope: AlertScope,
}

/// Cooldown-gated broadcast service.
#[derive(Resource, Debug)]
pub struct AlertRelay {
    /// Seconds an origin must wait between broadcasts
    pub cooldown: f32,
    last_broadcast: HashMap<Entity, f32>,
    pending: Vec<PendingAlert>,
}

impl AlertRelay {
    pub fn new(cooldown: f32) -> Self {
        Self { cooldown, last_broadcast: HashMap::new(), pending: Vec::new() }
    }

    /// Whether `origin` may broadcast at time `now`.
    pub fn can_broadcast(&self, origin: Entity, now: f32) -> bool {
        self.last_broadcast
            .get(&origin)
            .map_or(true, |last| now - last >= self.cooldown)
    }

    /// Queue a guard broadcast. Returns false and drops the alert when the
    /// origin is still cooling down.
    pub fn broadcast(&mut self, alert: PendingAlert, now: f32) -> bool {
        if !self.can_broadcast(alert.origin, now) {
            return false;
        }
        self.last_broadcast.insert(alert.origin, now);
        self.pending.push(alert);
        true
    }

    /// Queue a citizen chain warning. Chains bypass the cooldown; the impact
    /// halving per hop bounds the cascade instead.
    pub fn chain(&mut self, alert: PendingAlert) {
        self.pending.push(alert);
    }

    fn take_pending(&mut self) -> Vec<PendingAlert> {
        std::mem::take(&mut self.pending)
    }
}

type RecipientQuery<'w, 's> = Query<
    'w,
    's,
    (
        Entity,
        &'static AgentKind,
        &'static Transform,
        Option<&'static HearingSensor>,
        Option<&'static mut NoiseInbox>,
        Option<&'static mut AlertInbox>,
    ),
>;

/// Delivers queued alerts to every agent within the broadcast radius.
///
/// Guards receive the danger as a strong noise through their hearing so the
/// ordinary investigation path handles it; citizens receive an [`AlertCue`]
/// attenuated by their distance to the danger.
pub fn deliver_alerts(
    clock: Res<SimClock>,
    cfg: Res<Config>,
    mut relay: ResMut<AlertRelay>,
    mut log: ResMut<EventLog>,
    mut recipients: RecipientQuery<'_, '_>,
) {
    let pending = relay.take_pending();
    for alert in pending {
        let mut notified = 0usize;
        for (entity, kind, transform, hearing, noise_inbox, alert_inbox) in recipients.iter_mut() {
            if entity == alert.origin {
                continue;
            }
            if transform.position.distance(alert.origin_pos) > cfg.alert.radius {
                continue;
            }
            match kind {
                AgentKind::Guard => {
                    if alert.scope == AlertScope::CitizensOnly {
                        continue;
                    }
                    notified += 1;
                    // The danger itself must be within the guard's own
                    // hearing for the cue to register.
                    if let (Some(hearing), Some(mut inbox)) = (hearing, noise_inbox) {
                        let level = NoiseBus::attenuate(
                            alert.danger,
                            alert.intensity,
                            transform.position,
                            hearing.distance,
                        );
                        if level > 0.0 {
                            inbox.offer(alert.danger, level);
                        }
                    }
                }
                AgentKind::Citizen => {
                    notified += 1;
                    let d_danger = transform.position.distance(alert.danger);
                    if d_danger > cfg.alert.response_radius {
                        continue;
                    }
                    let impact =
                        alert.intensity * (1.0 - d_danger / cfg.alert.response_radius).max(0.0);
                    if impact <= 0.0 {
                        continue;
                    }
                    if let Some(mut inbox) = alert_inbox {
                        inbox.push(AlertCue { danger: alert.danger, impact });
                    }
                }
            }
        }
        log.push(SimEvent::AlertBroadcast {
            origin: alert.origin_id.clone(),
            notified,
            at: clock.time,
        });
        tracing::debug!(origin = %alert.origin_id, notified, "alert delivered");
    }
}

/// Convenience constructor for a guard's spotted-target broadcast.
pub fn guard_alert(origin: Entity, id: &AgentId, origin_pos: Vec3, danger: Vec3) -> PendingAlert {
    PendingAlert {
        origin,
        origin_id: id.0.clone(),
        origin_pos,
        danger,
        intensity: 10.0,
        scope: AlertScope::All,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert_from(origin: Entity) -> PendingAlert {
        PendingAlert {
            origin,
            origin_id: "guard-1".into(),
            origin_pos: Vec3::ZERO,
            danger: Vec3::new(1.0, 0.0, 0.0),
            intensity: 10.0,
            scope: AlertScope::All,
        }
    }

    #[test]
    fn test_cooldown_gates_rebroadcast() {
        let mut relay = AlertRelay::new(8.0);
        let origin = Entity::from_raw(1);
        assert!(relay.broadcast(alert_from(origin), 0.0));
        assert!(!relay.broadcast(alert_from(origin), 4.0));
        assert!(relay.broadcast(alert_from(origin), 8.0));
    }

    #[test]
    fn test_cooldown_is_per_origin() {
        let mut relay = AlertRelay::new(8.0);
        assert!(relay.broadcast(alert_from(Entity::from_raw(1)), 0.0));
        assert!(relay.broadcast(alert_from(Entity::from_raw(2)), 0.0));
    }

    #[test]
    fn test_chain_bypasses_cooldown() {
        let mut relay = AlertRelay::new(8.0);
        let origin = Entity::from_raw(1);
        assert!(relay.broadcast(alert_from(origin), 0.0));
        relay.chain(alert_from(origin));
        assert_eq!(relay.take_pending().len(), 2);
    }

    #[test]
    fn test_guard_cue_attenuates_over_own_hearing() {
        let cfg = Config::default();
        let mut world = World::new();
        world.insert_resource(SimClock::new(0.1));
        world.insert_resource(EventLog::default());

        let danger = Vec3::ZERO;
        let origin = world.spawn_empty().id();
        let mut relay = AlertRelay::new(cfg.alert.cooldown);
        relay.broadcast(
            PendingAlert {
                origin,
                origin_id: "guard-0".into(),
                origin_pos: danger,
                danger,
                intensity: 10.0,
                scope: AlertScope::All,
            },
            0.0,
        );
        world.insert_resource(relay);

        // Both guards are inside the broadcast radius, but only the near one
        // has the danger inside its own hearing range.
        let near = world
            .spawn((
                AgentKind::Guard,
                Transform::at(Vec3::new(4.0, 0.0, 0.0)),
                HearingSensor::from_config(&cfg),
                NoiseInbox::default(),
            ))
            .id();
        let far = world
            .spawn((
                AgentKind::Guard,
                Transform::at(Vec3::new(10.0, 0.0, 0.0)),
                HearingSensor::from_config(&cfg),
                NoiseInbox::default(),
            ))
            .id();
        world.insert_resource(cfg);

        let mut schedule = Schedule::default();
        schedule.add_systems(deliver_alerts);
        schedule.run(&mut world);

        let heard = world.get_mut::<NoiseInbox>(near).unwrap().take().expect("near guard hears");
        assert!((heard.level - 5.0).abs() < 1e-4, "falloff over hearing range, got {}", heard.level);
        assert!(world.get_mut::<NoiseInbox>(far).unwrap().take().is_none());
    }
}
