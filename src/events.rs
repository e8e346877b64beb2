//! Simulation Events
//!
//! Telemetry log of the notable things agents do. Serialized to JSON at the
//! end of a headless run and asserted on by the scenario tests.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::components::BehaviorState;
use crate::math::Vec3;

/// A notable simulation occurrence, stamped with simulation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SimEvent {
    StateChanged {
        agent: String,
        from: BehaviorState,
        to: BehaviorState,
        at: f32,
    },
    Spotted {
        agent: String,
        target_pos: Vec3,
        at: f32,
    },
    NoiseHeard {
        agent: String,
        level: f32,
        at: f32,
    },
    AlertBroadcast {
        origin: String,
        notified: usize,
        at: f32,
    },
    TargetCaught {
        agent: String,
        at: f32,
    },
    Distraction {
        position: Vec3,
        intensity: f32,
        at: f32,
    },
}

/// Append-only event log resource.
#[derive(Resource, Debug, Default)]
pub struct EventLog {
    events: Vec<SimEvent>,
}

impl EventLog {
    pub fn push(&mut self, event: SimEvent) {
        self.events.push(event);
    }

    pub fn iter(&self) -> impl Iterator<Item = &SimEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn drain(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.events)
    }

    /// Count of state changes into `state`, optionally for one agent.
    pub fn transitions_into(&self, state: BehaviorState, agent: Option<&str>) -> usize {
        self.events
            .iter()
            .filter(|e| match e {
                SimEvent::StateChanged { agent: a, to, .. } => {
                    *to == state && agent.map_or(true, |want| a == want)
                }
                _ => false,
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_counting() {
        let mut log = EventLog::default();
        log.push(SimEvent::StateChanged {
            agent: "guard-1".into(),
            from: BehaviorState::Patrolling,
            to: BehaviorState::Chasing,
            at: 1.0,
        });
        log.push(SimEvent::StateChanged {
            agent: "guard-2".into(),
            from: BehaviorState::Patrolling,
            to: BehaviorState::Investigating,
            at: 2.0,
        });
        assert_eq!(log.transitions_into(BehaviorState::Chasing, None), 1);
        assert_eq!(log.transitions_into(BehaviorState::Chasing, Some("guard-2")), 0);
        assert_eq!(log.transitions_into(BehaviorState::Investigating, Some("guard-2")), 1);
    }

    #[test]
    fn test_events_serialize_tagged() {
        let e = SimEvent::NoiseHeard { agent: "g".into(), level: 6.0, at: 0.5 };
        let json = serde_json::to_string(&e).expect("serialize");
        assert!(json.contains("\"kind\":\"NoiseHeard\""));
    }
}
