//! Detection Meter
//!
//! Integrates sighting conditions into the per-agent detection confidence
//! meter and the guard suspicion accumulator.

use bevy_ecs::prelude::*;

use crate::components::{ConeZone, Detection, Sight, SightResult, SimClock, Suspicion, VisionSensor};
use crate::config::DetectionConfig;
use crate::target::TargetState;

/// Detection meter growth per second for the given sighting conditions.
///
/// Every factor multiplies a base rate of `1 / detection_time`, so a target
/// standing in the open under ideal conditions fills the meter in roughly
/// `detection_time` seconds and anything conspicuous fills it faster.
pub fn detection_rate(
    cfg: &DetectionConfig,
    sensor: &VisionSensor,
    sight: &SightResult,
    target: &TargetState,
) -> f32 {
    let base = 1.0 / cfg.detection_time;

    // Closer targets are spotted faster, floored so a sighting at maximum
    // range still counts.
    let distance_factor = (1.0 - 0.6 * sight.distance / sensor.distance).max(0.4);

    // Superlinear in speed: sprinting is far more conspicuous than walking.
    let movement_factor = 1.0 + target.speed().powf(1.5) * cfg.movement_weight;

    let light_factor = cfg.light_factor * if target.emits_light { cfg.light_boost } else { 1.0 };

    let mut noise_factor = 1.0 + target.noise_level * 0.1;
    if target.noise_level < cfg.quiet_threshold {
        noise_factor *= 0.25;
    }

    let mut directness = if sight.angle_deg < 15.0 {
        2.0
    } else if sight.angle_deg < sensor.cone_deg / 3.0 {
        1.5
    } else {
        1.0
    };
    // Right in front of the agent's face: nearly instant.
    if sight.distance < 0.3 * sensor.distance && sight.angle_deg < 30.0 {
        directness *= 1.5;
    }

    let cone_multiplier = match sight.zone {
        ConeZone::Primary => 1.0,
        ConeZone::Peripheral => sensor.peripheral_multiplier,
        ConeZone::Outside => 0.0,
    };

    base * distance_factor * movement_factor * light_factor * noise_factor * directness
        * cone_multiplier
}

/// Integrates the meter each tick against the held sight result and runs the
/// suspicion accumulator for agents that carry one.
pub fn update_detection(
    clock: Res<SimClock>,
    cfg: Res<crate::config::Config>,
    target: Res<TargetState>,
    mut agents: Query<(&VisionSensor, &Sight, &mut Detection, Option<&mut Suspicion>)>,
) {
    let dt = clock.dt;
    for (sensor, sight, mut detection, suspicion) in agents.iter_mut() {
        let visible = sight.result.visible && target.present;
        if visible {
            let rate = detection_rate(&cfg.detection, sensor, &sight.result, &target);
            let meter = detection.meter();
            detection.set_meter(meter + rate * dt);
        } else {
            let meter = detection.meter();
            detection.set_meter(meter - cfg.detection.decay_rate * dt);
        }

        if let Some(mut susp) = suspicion {
            if visible && !detection.spotted {
                susp.value = (susp.value + susp.increase_rate * dt).min(susp.max);
            } else {
                susp.value = (susp.value - susp.decay_rate * dt).max(0.0);
            }
            susp.suspicious = susp.value >= susp.threshold;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::math::Vec3;

    fn sensor() -> VisionSensor {
        VisionSensor::from_config(&Config::default())
    }

    fn sighting(distance: f32, angle_deg: f32, zone: ConeZone) -> SightResult {
        SightResult { visible: true, distance, angle_deg, zone }
    }

    #[test]
    fn test_rate_close_direct_noisy() {
        // Stationary target two meters dead ahead, making walking-level
        // noise: 0.5 * 0.88 * 1.5 * (2.0 * 1.5) = 1.98 per second.
        let cfg = Config::default();
        let mut target = TargetState::at(Vec3::new(0.0, 0.0, 2.0));
        target.noise_level = 5.0;
        let rate = detection_rate(
            &cfg.detection,
            &sensor(),
            &sighting(2.0, 0.0, ConeZone::Primary),
            &target,
        );
        assert!((rate - 1.98).abs() < 1e-3, "rate {rate}");
    }

    #[test]
    fn test_quiet_target_is_much_harder_to_spot() {
        let cfg = Config::default();
        let mut loud = TargetState::at(Vec3::new(0.0, 0.0, 8.0));
        loud.noise_level = 5.0;
        let mut quiet = loud.clone();
        quiet.noise_level = 1.0;
        let s = sighting(8.0, 10.0, ConeZone::Primary);
        let loud_rate = detection_rate(&cfg.detection, &sensor(), &s, &loud);
        let quiet_rate = detection_rate(&cfg.detection, &sensor(), &s, &quiet);
        assert!(quiet_rate < loud_rate * 0.25, "{quiet_rate} vs {loud_rate}");
    }

    #[test]
    fn test_peripheral_sightings_accumulate_slower() {
        let cfg = Config::default();
        let target = TargetState::at(Vec3::new(0.0, 0.0, 8.0));
        let primary = detection_rate(
            &cfg.detection,
            &sensor(),
            &sighting(8.0, 20.0, ConeZone::Primary),
            &target,
        );
        let peripheral = detection_rate(
            &cfg.detection,
            &sensor(),
            &sighting(8.0, 40.0, ConeZone::Peripheral),
            &target,
        );
        assert!((peripheral - primary * 0.4).abs() < 1e-5);
    }

    #[test]
    fn test_sprinting_beats_standing() {
        let cfg = Config::default();
        let still = TargetState::at(Vec3::new(0.0, 0.0, 8.0));
        let mut sprinting = still.clone();
        sprinting.velocity = Vec3::new(6.0, 0.0, 0.0);
        let s = sighting(8.0, 0.0, ConeZone::Primary);
        let slow = detection_rate(&cfg.detection, &sensor(), &s, &still);
        let fast = detection_rate(&cfg.detection, &sensor(), &s, &sprinting);
        assert!(fast > slow * 2.0);
    }

    #[test]
    fn test_light_source_boosts_rate() {
        let cfg = Config::default();
        let dark = TargetState::at(Vec3::new(0.0, 0.0, 8.0));
        let mut lit = dark.clone();
        lit.emits_light = true;
        let s = sighting(8.0, 0.0, ConeZone::Primary);
        let dark_rate = detection_rate(&cfg.detection, &sensor(), &s, &dark);
        let lit_rate = detection_rate(&cfg.detection, &sensor(), &s, &lit);
        assert!((lit_rate - dark_rate * 1.5).abs() < 1e-5);
    }
}
