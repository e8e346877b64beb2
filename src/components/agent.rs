//! Agent Components
//!
//! Everything a simulated non-player agent carries: identity and variant,
//! sensor parameters, the detection meter, the behavior state machine data,
//! and the fear/suspicion accumulators of the two agent variants.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{Config, SuspicionConfig};
use crate::math::Vec3;
use crate::routines::Routine;

/// Unique agent identifier
#[derive(Component, Debug, Clone, PartialEq, Eq, Hash)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// Agent variant. Guards patrol fixed routes, alert others, and protect
/// citizens; citizens wander a confined area and flee or hide when scared.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentKind {
    Guard,
    Citizen,
}

impl AgentKind {
    /// The idle state this variant falls back to after interruptions.
    pub fn baseline(self) -> BehaviorState {
        match self {
            Self::Guard => BehaviorState::Patrolling,
            Self::Citizen => BehaviorState::Wandering,
        }
    }

    /// Whether this variant can occupy the given state at all.
    pub fn supports(self, state: BehaviorState) -> bool {
        match self {
            Self::Guard => !matches!(state, BehaviorState::Hiding | BehaviorState::RunningAway),
            Self::Citizen => {
                !matches!(state, BehaviorState::Patrolling | BehaviorState::Protecting)
            }
        }
    }
}

/// Vision cone parameters and the perception-check interval state.
#[derive(Component, Debug, Clone)]
pub struct VisionSensor {
    pub enabled: bool,
    pub distance: f32,
    /// Full primary cone angle in degrees
    pub cone_deg: f32,
    /// Full peripheral cone angle in degrees
    pub peripheral_deg: f32,
    pub peripheral_multiplier: f32,
    /// Seconds between checks
    pub interval: f32,
    /// Seconds between checks while chasing
    pub chase_interval: f32,
    pub eye_height: f32,
    /// Simulation time of the last executed check
    pub last_check: f32,
}

impl VisionSensor {
    pub fn from_config(cfg: &Config) -> Self {
        let p = &cfg.perception;
        Self {
            enabled: true,
            distance: p.vision_distance,
            cone_deg: p.vision_angle_deg,
            peripheral_deg: p.peripheral_angle_deg,
            peripheral_multiplier: p.peripheral_multiplier,
            interval: p.perception_interval,
            chase_interval: p.chase_perception_interval,
            eye_height: p.eye_height,
            last_check: f32::NEG_INFINITY,
        }
    }
}

/// Hearing radius and reaction threshold.
#[derive(Component, Debug, Clone)]
pub struct HearingSensor {
    pub enabled: bool,
    pub distance: f32,
    pub threshold: f32,
}

impl HearingSensor {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            enabled: true,
            distance: cfg.perception.hearing_distance,
            threshold: cfg.perception.hearing_threshold,
        }
    }
}

/// Which part of the vision cone a sighting landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConeZone {
    Primary,
    Peripheral,
    Outside,
}

/// Outcome of a single vision check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SightResult {
    pub visible: bool,
    pub angle_deg: f32,
    pub distance: f32,
    pub zone: ConeZone,
}

impl SightResult {
    pub fn none() -> Self {
        Self { visible: false, angle_deg: 0.0, distance: 0.0, zone: ConeZone::Outside }
    }
}

/// Latest vision check result plus the sighting history the chase logic needs.
#[derive(Component, Debug, Clone)]
pub struct Sight {
    pub result: SightResult,
    /// Simulation time of the last confirmed sighting
    pub last_visible_at: Option<f32>,
    /// Target position at the last confirmed sighting
    pub last_seen_pos: Option<Vec3>,
}

impl Default for Sight {
    fn default() -> Self {
        Self { result: SightResult::none(), last_visible_at: None, last_seen_pos: None }
    }
}

/// Discretized detection confidence, derived from the meter by fixed
/// breakpoints. Ordering matters: `Normal < Suspicious < Alert < Confirmed`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub enum AlertLevel {
    #[default]
    Normal,
    Suspicious,
    Alert,
    Confirmed,
}

impl AlertLevel {
    /// Pure meter-to-level mapping. The meter and level are kept consistent
    /// by routing every meter write through [`Detection::set_meter`].
    pub fn from_meter(meter: f32) -> Self {
        if meter >= 1.0 {
            Self::Confirmed
        } else if meter >= 0.75 {
            Self::Alert
        } else if meter >= 0.5 {
            Self::Suspicious
        } else {
            Self::Normal
        }
    }
}

/// Continuous detection confidence in [0, 1] and the spotted latch.
#[derive(Component, Debug, Clone, Default)]
pub struct Detection {
    meter: f32,
    level: AlertLevel,
    /// Latched when the meter first reaches 1.0; cleared when a chase ends.
    pub spotted: bool,
}

impl Detection {
    pub fn meter(&self) -> f32 {
        self.meter
    }

    pub fn level(&self) -> AlertLevel {
        self.level
    }

    /// Write the meter, clamping to [0, 1] and recomputing the alert level.
    pub fn set_meter(&mut self, value: f32) {
        self.meter = value.clamp(0.0, 1.0);
        self.level = AlertLevel::from_meter(self.meter);
    }
}

/// Discrete activity states of the behavior machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BehaviorState {
    Patrolling,
    Wandering,
    Investigating,
    Chasing,
    RunningAway,
    Protecting,
    Hiding,
}

/// Behavior state machine data: current and previous state, the timers the
/// transitions depend on, and at most one background routine.
#[derive(Component, Debug)]
pub struct Behavior {
    pub state: BehaviorState,
    /// Previous state and transition time, kept for telemetry only
    pub previous: BehaviorState,
    pub changed_at: f32,
    /// Countdown while Investigating; expiry resumes the baseline state
    pub investigation_timer: f32,
    /// Valid only while investigating, chasing, or searching
    pub last_known_target_pos: Option<Vec3>,
    /// The single background routine slot. Replacing it is the cancellation
    /// mechanism: the old routine is dropped before the new one ever runs.
    pub routine: Option<Routine>,
    /// Latched once per chase when the target is reached
    pub caught: bool,
}

impl Behavior {
    pub fn new(initial: BehaviorState) -> Self {
        Self {
            state: initial,
            previous: initial,
            changed_at: 0.0,
            investigation_timer: 0.0,
            last_known_target_pos: None,
            routine: None,
            caught: false,
        }
    }

    /// Transition to `state`. Re-entering the current state is a no-op (no
    /// timestamp reset, no routine cancellation). A genuine change drops any
    /// running routine before the caller installs a replacement.
    pub fn set_state(&mut self, state: BehaviorState, now: f32) -> bool {
        if self.state == state {
            return false;
        }
        self.previous = self.state;
        self.state = state;
        self.changed_at = now;
        self.routine = None;
        self.caught = false;
        true
    }
}

/// Fear accumulator for citizens. Decays over time; panicking boosts speed.
#[derive(Component, Debug, Clone, Default)]
pub struct Nervousness {
    pub value: f32,
    pub panicking: bool,
}

/// Guard suspicion accumulator fed by partial detection.
#[derive(Component, Debug, Clone)]
pub struct Suspicion {
    pub value: f32,
    pub suspicious: bool,
    pub max: f32,
    pub increase_rate: f32,
    pub decay_rate: f32,
    pub threshold: f32,
}

impl Suspicion {
    pub fn from_config(cfg: &SuspicionConfig) -> Self {
        Self {
            value: 0.0,
            suspicious: false,
            max: cfg.max,
            increase_rate: cfg.increase_rate,
            decay_rate: cfg.decay_rate,
            threshold: cfg.suspicious_threshold,
        }
    }
}

/// How a guard walks its patrol route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatrolPolicy {
    /// Cycle through the points, wrapping at the end
    Loop,
    /// Reverse direction at the first and last point
    BackAndForth,
}

/// Ordered patrol points plus the walk cursor. Supplied as configuration
/// data; there is no interactive point placement here.
#[derive(Component, Debug, Clone)]
pub struct PatrolRoute {
    pub points: Vec<Vec3>,
    pub policy: PatrolPolicy,
    pub index: usize,
    pub reversing: bool,
    /// Dwell seconds at each point
    pub dwell: f32,
    pub wait_counter: f32,
}

impl PatrolRoute {
    pub fn new(points: Vec<Vec3>, policy: PatrolPolicy, dwell: f32) -> Self {
        Self { points, policy, index: 0, reversing: false, dwell, wait_counter: dwell }
    }

    pub fn current_point(&self) -> Option<Vec3> {
        self.points.get(self.index).copied()
    }

    /// Advance the cursor one step according to the policy.
    pub fn advance(&mut self) {
        if self.points.len() < 2 {
            return;
        }
        match self.policy {
            PatrolPolicy::Loop => {
                self.index = (self.index + 1) % self.points.len();
            }
            PatrolPolicy::BackAndForth => {
                if self.index == 0 {
                    self.reversing = false;
                } else if self.index == self.points.len() - 1 {
                    self.reversing = true;
                }
                self.index = if self.reversing { self.index - 1 } else { self.index + 1 };
            }
        }
    }

    /// Re-anchor to the nearest point when resuming patrol far from the
    /// current one.
    pub fn resume_from(&mut self, position: Vec3, resume_distance: f32) {
        if self.points.is_empty() {
            return;
        }
        if self.index >= self.points.len() {
            self.index = 0;
        }
        let current = self.points[self.index];
        if position.distance(current) > resume_distance {
            let mut closest = 0;
            let mut best = f32::INFINITY;
            for (i, p) in self.points.iter().enumerate() {
                let d = position.distance(*p);
                if d < best {
                    best = d;
                    closest = i;
                }
            }
            self.index = closest;
        }
    }
}

/// Confined wander area of a citizen and the idle gap between sessions.
#[derive(Component, Debug, Clone)]
pub struct WanderArea {
    pub center: Vec3,
    pub radius: f32,
    /// Simulation time at which the next wander session may start
    pub next_start: f32,
}

impl WanderArea {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius, next_start: 0.0 }
    }
}

/// A noise contribution delivered to this agent this step.
#[derive(Debug, Clone, Copy)]
pub struct HeardNoise {
    pub position: Vec3,
    pub level: f32,
}

/// Per-agent mailbox for distance-attenuated noise. Only the strongest
/// contribution of a step is kept.
#[derive(Component, Debug, Default)]
pub struct NoiseInbox {
    strongest: Option<HeardNoise>,
}

impl NoiseInbox {
    pub fn offer(&mut self, position: Vec3, level: f32) {
        if level <= 0.0 {
            return;
        }
        if self.strongest.map_or(true, |n| level > n.level) {
            self.strongest = Some(HeardNoise { position, level });
        }
    }

    pub fn take(&mut self) -> Option<HeardNoise> {
        self.strongest.take()
    }
}

/// A danger warning delivered to a citizen, already attenuated by distance.
#[derive(Debug, Clone, Copy)]
pub struct AlertCue {
    pub danger: Vec3,
    pub impact: f32,
}

/// Per-agent mailbox for alert cues (citizens only).
#[derive(Component, Debug, Default)]
pub struct AlertInbox {
    cues: Vec<AlertCue>,
}

impl AlertInbox {
    pub fn push(&mut self, cue: AlertCue) {
        self.cues.push(cue);
    }

    pub fn drain(&mut self) -> Vec<AlertCue> {
        std::mem::take(&mut self.cues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_level_breakpoints() {
        let expected = [
            (0.0, AlertLevel::Normal),
            (0.49, AlertLevel::Normal),
            (0.5, AlertLevel::Suspicious),
            (0.74, AlertLevel::Suspicious),
            (0.75, AlertLevel::Alert),
            (0.99, AlertLevel::Alert),
            (1.0, AlertLevel::Confirmed),
        ];
        for (meter, level) in expected {
            assert_eq!(AlertLevel::from_meter(meter), level, "meter {meter}");
        }
    }

    #[test]
    fn test_alert_level_ordering() {
        assert!(AlertLevel::Normal < AlertLevel::Suspicious);
        assert!(AlertLevel::Suspicious < AlertLevel::Alert);
        assert!(AlertLevel::Alert < AlertLevel::Confirmed);
    }

    #[test]
    fn test_detection_meter_clamps_and_tracks_level() {
        let mut det = Detection::default();
        det.set_meter(50.0);
        assert_eq!(det.meter(), 1.0);
        assert_eq!(det.level(), AlertLevel::Confirmed);
        det.set_meter(-3.0);
        assert_eq!(det.meter(), 0.0);
        assert_eq!(det.level(), AlertLevel::Normal);
        det.set_meter(0.6);
        assert_eq!(det.level(), AlertLevel::Suspicious);
    }

    #[test]
    fn test_set_state_reentrant_noop() {
        let mut b = Behavior::new(BehaviorState::Patrolling);
        b.changed_at = 5.0;
        b.routine = Some(Routine::investigate(Vec3::ZERO));
        assert!(!b.set_state(BehaviorState::Patrolling, 9.0));
        assert_eq!(b.changed_at, 5.0);
        assert!(b.routine.is_some(), "re-entry must not cancel the routine");
        assert!(b.set_state(BehaviorState::Investigating, 9.0));
        assert_eq!(b.previous, BehaviorState::Patrolling);
        assert_eq!(b.changed_at, 9.0);
        assert!(b.routine.is_none(), "a real transition cancels the routine");
    }

    #[test]
    fn test_patrol_loop_wraps() {
        let pts = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
        ];
        let mut route = PatrolRoute::new(pts, PatrolPolicy::Loop, 1.0);
        route.advance();
        route.advance();
        route.advance();
        assert_eq!(route.index, 0);
    }

    #[test]
    fn test_patrol_back_and_forth_reverses() {
        let pts = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
        ];
        let mut route = PatrolRoute::new(pts, PatrolPolicy::BackAndForth, 1.0);
        let mut seen = vec![route.index];
        for _ in 0..6 {
            route.advance();
            seen.push(route.index);
        }
        assert_eq!(seen, vec![0, 1, 2, 1, 0, 1, 2]);
    }

    #[test]
    fn test_patrol_resume_picks_nearest_point() {
        let pts = vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(30.0, 0.0, 0.0)];
        let mut route = PatrolRoute::new(pts, PatrolPolicy::Loop, 1.0);
        route.resume_from(Vec3::new(28.0, 0.0, 0.0), 10.0);
        assert_eq!(route.index, 1);
        // Close enough to the current point: keep it.
        route.resume_from(Vec3::new(27.0, 0.0, 0.0), 10.0);
        assert_eq!(route.index, 1);
    }

    #[test]
    fn test_noise_inbox_keeps_strongest() {
        let mut inbox = NoiseInbox::default();
        inbox.offer(Vec3::ZERO, 2.0);
        inbox.offer(Vec3::new(1.0, 0.0, 0.0), 5.0);
        inbox.offer(Vec3::ZERO, 3.0);
        let heard = inbox.take().expect("noise");
        assert_eq!(heard.level, 5.0);
        assert!(inbox.take().is_none());
    }

    #[test]
    fn test_variant_state_support() {
        assert!(AgentKind::Guard.supports(BehaviorState::Protecting));
        assert!(!AgentKind::Guard.supports(BehaviorState::Hiding));
        assert!(AgentKind::Citizen.supports(BehaviorState::Hiding));
        assert!(!AgentKind::Citizen.supports(BehaviorState::Patrolling));
    }
}
