//! Configuration System
//!
//! Loads tuning parameters from tuning.toml for easy adjustment without recompiling.
//! Defaults mirror the values the behaviors were balanced against.

use bevy_ecs::prelude::*;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Default tuning file path
pub const DEFAULT_TUNING_PATH: &str = "tuning.toml";

/// Top-level configuration structure
#[derive(Debug, Clone, Deserialize, Resource)]
pub struct Config {
    pub perception: PerceptionConfig,
    pub detection: DetectionConfig,
    pub behavior: BehaviorConfig,
    pub noise: NoiseConfig,
    pub alert: AlertConfig,
    pub suspicion: SuspicionConfig,
}

/// Vision cone and hearing radius parameters
#[derive(Debug, Clone, Deserialize)]
pub struct PerceptionConfig {
    /// Maximum sight distance
    pub vision_distance: f32,
    /// Full primary cone angle in degrees
    pub vision_angle_deg: f32,
    /// Full peripheral cone angle in degrees (wider than the primary cone)
    pub peripheral_angle_deg: f32,
    /// Detection rate multiplier for peripheral sightings (< 1.0)
    pub peripheral_multiplier: f32,
    /// Seconds between perception checks
    pub perception_interval: f32,
    /// Seconds between perception checks while chasing (same or tighter)
    pub chase_perception_interval: f32,
    /// Height above the transform the occlusion ray is cast from
    pub eye_height: f32,
    /// Hearing radius
    pub hearing_distance: f32,
    /// Minimum received noise level that triggers a reaction
    pub hearing_threshold: f32,
}

/// Detection meter accumulation parameters
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Seconds of ideal-condition sighting needed to fill the meter
    pub detection_time: f32,
    /// Meter decay per second while the target is not visible
    pub decay_rate: f32,
    /// Weight of the superlinear target-speed term
    pub movement_weight: f32,
    /// Target noise level below which spotting becomes disproportionately hard
    pub quiet_threshold: f32,
    /// Base light factor
    pub light_factor: f32,
    /// Multiplier applied when the target carries a light source
    pub light_boost: f32,
    /// Seconds without a confirmed sighting before a chase is broken off
    pub player_visibility_timeout: f32,
}

/// State machine and routine parameters
#[derive(Debug, Clone, Deserialize)]
pub struct BehaviorConfig {
    /// Base movement speed
    pub speed: f32,
    /// Movement speed while a citizen is panicking
    pub panic_speed: f32,
    /// Movement speed while escorting a citizen
    pub escort_speed: f32,
    /// Seconds an investigation lasts before returning to baseline
    pub investigation_time: f32,
    /// Seconds spent sweeping the view at an investigation point
    pub look_around_time: f32,
    /// Total seconds a wander routine runs before handing back control
    pub wander_time: f32,
    /// Radius of the wander area
    pub wander_radius: f32,
    /// Idle seconds between citizen wander sessions
    pub wander_interval: f32,
    /// Dwell seconds at each patrol point
    pub patrol_dwell: f32,
    /// Remaining distance below which the movement facade reports arrival
    pub arrival_epsilon: f32,
    /// Distance from the current patrol point beyond which resuming patrol
    /// re-anchors to the nearest point
    pub patrol_resume_distance: f32,
    /// Seconds a post-escort area search lasts
    pub search_duration: f32,
    /// Escorted citizens are safe once twice this far from the danger
    pub protection_radius: f32,
}

/// Noise bus parameters
#[derive(Debug, Clone, Deserialize)]
pub struct NoiseConfig {
    /// Seconds an emitted noise event stays observable
    pub default_duration: f32,
}

/// Alert relay and fear response parameters
#[derive(Debug, Clone, Deserialize)]
pub struct AlertConfig {
    /// Broadcast radius around the alerting agent
    pub radius: f32,
    /// Seconds an origin must wait between broadcasts
    pub cooldown: f32,
    /// Radius within which a citizen reacts to an alert
    pub response_radius: f32,
    /// Nervousness above which a citizen runs away
    pub nervousness_threshold: f32,
    /// Nervousness above which a citizen panics and hides
    pub panic_threshold: f32,
    /// Nervousness decay per second
    pub nervousness_decay: f32,
    /// Radius searched for tagged hiding spots
    pub hide_search_radius: f32,
    /// Base seconds spent holding at a hiding spot (plus nervousness / 2)
    pub hide_hold_base: f32,
}

/// Guard suspicion accumulator parameters
#[derive(Debug, Clone, Deserialize)]
pub struct SuspicionConfig {
    /// Accumulator cap; reaching it forces a spotted transition
    pub max: f32,
    /// Growth per second of partial detection
    pub increase_rate: f32,
    /// Decay per second while the target is not seen
    pub decay_rate: f32,
    /// Crossing this value sends a patrolling guard investigating
    pub suspicious_threshold: f32,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load configuration from default path, or use defaults if not found
    pub fn load_or_default() -> Self {
        Self::load(DEFAULT_TUNING_PATH).unwrap_or_else(|e| {
            tracing::warn!("could not load {DEFAULT_TUNING_PATH}: {e}; using defaults");
            Self::default()
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            perception: PerceptionConfig {
                vision_distance: 10.0,
                vision_angle_deg: 45.0,
                peripheral_angle_deg: 110.0,
                peripheral_multiplier: 0.4,
                perception_interval: 0.25,
                chase_perception_interval: 0.15,
                eye_height: 1.6,
                hearing_distance: 8.0,
                hearing_threshold: 3.0,
            },
            detection: DetectionConfig {
                detection_time: 2.0,
                decay_rate: 0.35,
                movement_weight: 0.08,
                quiet_threshold: 3.0,
                light_factor: 1.0,
                light_boost: 1.5,
                player_visibility_timeout: 7.0,
            },
            behavior: BehaviorConfig {
                speed: 2.0,
                panic_speed: 4.0,
                escort_speed: 3.0,
                investigation_time: 10.0,
                look_around_time: 2.0,
                wander_time: 5.0,
                wander_radius: 5.0,
                wander_interval: 5.0,
                patrol_dwell: 2.0,
                arrival_epsilon: 0.5,
                patrol_resume_distance: 10.0,
                search_duration: 30.0,
                protection_radius: 10.0,
            },
            noise: NoiseConfig {
                default_duration: 3.0,
            },
            alert: AlertConfig {
                radius: 15.0,
                cooldown: 8.0,
                response_radius: 10.0,
                nervousness_threshold: 5.0,
                panic_threshold: 7.0,
                nervousness_decay: 0.5,
                hide_search_radius: 15.0,
                hide_hold_base: 10.0,
            },
            suspicion: SuspicionConfig {
                max: 10.0,
                increase_rate: 2.5,
                decay_rate: 0.5,
                suspicious_threshold: 5.0,
            },
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}
