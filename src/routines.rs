//! Behavior Routines
//!
//! Resumable multi-step activities that run inside a behavior state: wander
//! sessions, point investigations, area searches, escorts, hiding, fleeing,
//! and guard-seeking. Each agent holds at most one routine; installing a new
//! one drops the old mid-step, which is the only cancellation mechanism.

use bevy_ecs::prelude::*;
use rand::rngs::SmallRng;
use rand::Rng;

use crate::components::{Nervousness, Transform};
use crate::config::Config;
use crate::math::{dir_to_yaw, Vec3};
use crate::nav::{HidingSpotInfo, Movement, SceneIndex};
use crate::systems::behavior::AgentIndex;

/// How close a citizen must get to a guard to hand over a protection request.
const GUARD_REACH: f32 = 2.0;

/// How far behind the escorted citizen (relative to the danger) the guard
/// posts up.
const ESCORT_OFFSET: f32 = 2.0;

/// How far behind a hiding spot (relative to the danger) the agent stands.
const HIDE_OFFSET: f32 = 2.0;

/// Arrival slack for hiding spots; tighter epsilons fight over spot geometry.
const HIDE_ARRIVE_SLACK: f32 = 1.5;

/// Outcome of one routine step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutineStatus {
    Running,
    Complete,
    Failed,
}

/// A citizen asking a guard for protection, handed over face to face.
#[derive(Debug, Clone, Copy)]
pub struct ProtectionRequest {
    pub guard: Entity,
    pub citizen: Entity,
    pub danger: Vec3,
}

/// Queue of pending protection requests, drained by the guard logic.
#[derive(Resource, Debug, Default)]
pub struct ProtectionRequests {
    queue: Vec<ProtectionRequest>,
}

impl ProtectionRequests {
    pub fn push(&mut self, request: ProtectionRequest) {
        self.queue.push(request);
    }

    /// Remove and return the first request addressed to `guard`.
    pub fn take_for(&mut self, guard: Entity) -> Option<ProtectionRequest> {
        let idx = self.queue.iter().position(|r| r.guard == guard)?;
        Some(self.queue.remove(idx))
    }
}

/// Everything a routine step may read or drive for its agent.
pub struct RoutineCtx<'a> {
    pub now: f32,
    pub dt: f32,
    pub me: Entity,
    pub cfg: &'a Config,
    pub scene: &'a SceneIndex,
    pub index: &'a AgentIndex,
    pub rng: &'a mut SmallRng,
    pub transform: &'a mut Transform,
    pub movement: &'a mut Movement,
    pub nervousness: Option<&'a mut Nervousness>,
    pub requests: &'a mut ProtectionRequests,
}

#[derive(Debug, Clone, Copy)]
pub enum InvestigatePhase {
    MoveTo { issued: bool },
    LookAround { started: f32, base_yaw: f32 },
}

#[derive(Debug, Clone, Copy)]
pub enum SearchPhase {
    Pick,
    Travel,
    Look { until: f32, base_yaw: f32 },
}

#[derive(Debug, Clone, Copy)]
pub enum HidePhase {
    Seek,
    MoveTo { spot: Vec3 },
    Hold { until: f32 },
}

/// A resumable activity. State lives in the variant fields, so a routine
/// dropped mid-step leaves no residue behind.
#[derive(Debug)]
pub enum Routine {
    /// Timed session of short random walks with pauses in between.
    Wander {
        center: Vec3,
        radius: f32,
        total: f32,
        elapsed: f32,
        pause_until: Option<f32>,
    },
    /// Walk to a point, then sweep the view there.
    Investigate { point: Vec3, phase: InvestigatePhase },
    /// Endless cycle of random look-points around a center. Terminated by
    /// the investigation timer, never by the routine itself.
    Search { center: Vec3, radius: f32, phase: SearchPhase },
    /// Shadow a citizen, covering them from behind relative to the danger.
    Escort { citizen: Entity, danger: Vec3 },
    /// Pick the best tagged hiding spot, move behind it, hold until calm.
    Hide { danger: Vec3, phase: HidePhase },
    /// Flee to a precomputed safe point.
    RunAway { to: Vec3, issued: bool },
    /// Walk to the nearest guard and hand over a protection request.
    SeekGuard { danger: Vec3, guard: Option<Entity> },
}

impl Routine {
    pub fn wander(center: Vec3, radius: f32, total: f32) -> Self {
        Self::Wander { center, radius, total, elapsed: 0.0, pause_until: None }
    }

    pub fn investigate(point: Vec3) -> Self {
        Self::Investigate { point, phase: InvestigatePhase::MoveTo { issued: false } }
    }

    pub fn search(center: Vec3, radius: f32) -> Self {
        Self::Search { center, radius, phase: SearchPhase::Pick }
    }

    pub fn escort(citizen: Entity, danger: Vec3) -> Self {
        Self::Escort { citizen, danger }
    }

    pub fn hide(danger: Vec3) -> Self {
        Self::Hide { danger, phase: HidePhase::Seek }
    }

    pub fn run_away(to: Vec3) -> Self {
        Self::RunAway { to, issued: false }
    }

    pub fn seek_guard(danger: Vec3) -> Self {
        Self::SeekGuard { danger, guard: None }
    }

    /// Advance the routine one fixed step.
    pub fn tick(&mut self, ctx: &mut RoutineCtx) -> RoutineStatus {
        match self {
            Self::Wander { center, radius, total, elapsed, pause_until } => {
                *elapsed += ctx.dt;
                if *elapsed >= *total {
                    ctx.movement.stop();
                    return RoutineStatus::Complete;
                }
                if ctx.movement.destination().is_none() {
                    match *pause_until {
                        None => {
                            *pause_until = Some(ctx.now + ctx.rng.gen_range(0.5..1.5));
                        }
                        Some(until) if ctx.now >= until => {
                            let p = ctx.scene.random_point_around(ctx.rng, *center, *radius);
                            ctx.movement.set_destination(p);
                            *pause_until = None;
                        }
                        Some(_) => {}
                    }
                }
                RoutineStatus::Running
            }

            Self::Investigate { point, phase } => {
                match phase {
                    InvestigatePhase::MoveTo { issued } => {
                        if !*issued {
                            ctx.movement.set_destination(ctx.scene.sample_position(*point));
                            *issued = true;
                        } else if ctx.movement.has_arrived(ctx.transform.position) {
                            *phase = InvestigatePhase::LookAround {
                                started: ctx.now,
                                base_yaw: ctx.transform.yaw_deg,
                            };
                        }
                    }
                    InvestigatePhase::LookAround { started, base_yaw } => {
                        let t = ctx.now - *started;
                        ctx.transform.yaw_deg = *base_yaw + (t * 3.0).sin() * 90.0;
                        if t >= ctx.cfg.behavior.look_around_time {
                            return RoutineStatus::Complete;
                        }
                    }
                }
                RoutineStatus::Running
            }

            Self::Search { center, radius, phase } => {
                match phase {
                    SearchPhase::Pick => {
                        let p = ctx.scene.random_point_around(ctx.rng, *center, *radius);
                        ctx.movement.set_destination(p);
                        *phase = SearchPhase::Travel;
                    }
                    SearchPhase::Travel => {
                        if ctx.movement.has_arrived(ctx.transform.position) {
                            *phase = SearchPhase::Look {
                                until: ctx.now + ctx.cfg.behavior.look_around_time,
                                base_yaw: ctx.transform.yaw_deg,
                            };
                        }
                    }
                    SearchPhase::Look { until, base_yaw } => {
                        ctx.transform.yaw_deg = *base_yaw + (ctx.now * 3.0).sin() * 120.0;
                        if ctx.now >= *until {
                            *phase = SearchPhase::Pick;
                        }
                    }
                }
                RoutineStatus::Running
            }

            Self::Escort { citizen, danger } => {
                let Some(snap) = ctx.index.get(*citizen) else {
                    ctx.movement.stop();
                    return RoutineStatus::Complete;
                };
                if snap.position.distance(*danger) > 2.0 * ctx.cfg.behavior.protection_radius {
                    ctx.movement.stop();
                    return RoutineStatus::Complete;
                }
                // Post up behind the citizen, shielded side away from the
                // danger.
                let toward_danger = (*danger - snap.position).normalized_or_zero();
                let protect = snap.position - toward_danger * ESCORT_OFFSET;
                if ctx
                    .movement
                    .destination()
                    .map_or(true, |d| d.distance(protect) > 0.5)
                {
                    ctx.movement.set_destination(protect);
                }
                RoutineStatus::Running
            }

            Self::Hide { danger, phase } => {
                match phase {
                    HidePhase::Seek => {
                        let spots = ctx.scene.hiding_spots_within(
                            ctx.transform.position,
                            ctx.cfg.alert.hide_search_radius,
                        );
                        let Some(best) =
                            best_hiding_spot(&spots, ctx.transform.position, *danger)
                        else {
                            return RoutineStatus::Failed;
                        };
                        let behind = best.position
                            + (best.position - *danger).normalized_or_zero() * HIDE_OFFSET;
                        let dest = ctx.scene.sample_position(behind);
                        ctx.movement.set_destination(dest);
                        *phase = HidePhase::MoveTo { spot: dest };
                    }
                    HidePhase::MoveTo { spot } => {
                        if ctx.transform.position.distance(*spot) < HIDE_ARRIVE_SLACK
                            && ctx.movement.destination().is_none()
                        {
                            // Face away from the danger while holding.
                            ctx.transform.yaw_deg =
                                dir_to_yaw(ctx.transform.position - *danger);
                            let fear =
                                ctx.nervousness.as_ref().map_or(0.0, |n| n.value);
                            *phase = HidePhase::Hold {
                                until: ctx.now + ctx.cfg.alert.hide_hold_base + fear / 2.0,
                            };
                        }
                    }
                    HidePhase::Hold { until } => {
                        let calm = ctx.nervousness.as_ref().map_or(true, |n| {
                            n.value <= ctx.cfg.alert.nervousness_threshold / 2.0
                        });
                        if ctx.now >= *until || calm {
                            if let Some(n) = ctx.nervousness.as_deref_mut() {
                                n.value = (n.value - 3.0).max(0.0);
                            }
                            return RoutineStatus::Complete;
                        }
                    }
                }
                RoutineStatus::Running
            }

            Self::RunAway { to, issued } => {
                if !*issued {
                    ctx.movement.set_destination(ctx.scene.sample_position(*to));
                    *issued = true;
                } else if ctx.movement.has_arrived(ctx.transform.position) {
                    return RoutineStatus::Complete;
                }
                RoutineStatus::Running
            }

            Self::SeekGuard { danger, guard } => {
                if guard.is_none() {
                    *guard = ctx
                        .index
                        .nearest_guard(ctx.transform.position)
                        .map(|g| g.entity);
                }
                let Some(guard_entity) = *guard else {
                    return RoutineStatus::Failed;
                };
                let Some(snap) = ctx.index.get(guard_entity) else {
                    return RoutineStatus::Failed;
                };
                if ctx.transform.position.distance(snap.position) <= GUARD_REACH {
                    ctx.requests.push(ProtectionRequest {
                        guard: guard_entity,
                        citizen: ctx.me,
                        danger: *danger,
                    });
                    ctx.movement.stop();
                    return RoutineStatus::Complete;
                }
                if ctx
                    .movement
                    .destination()
                    .map_or(true, |d| d.distance(snap.position) > 0.5)
                {
                    ctx.movement.set_destination(snap.position);
                }
                RoutineStatus::Running
            }
        }
    }
}

/// Score and pick the best hiding spot: far from the danger, not too far
/// from the agent, and roughly in the direction away from the danger.
fn best_hiding_spot(
    spots: &[HidingSpotInfo],
    position: Vec3,
    danger: Vec3,
) -> Option<HidingSpotInfo> {
    spots
        .iter()
        .copied()
        .map(|s| {
            let to_spot = (s.position - position).normalized_or_zero();
            let away = (position - danger).normalized_or_zero();
            let score = s.position.distance(danger) * 2.0 - s.position.distance(position) * 0.5
                + to_spot.dot(away) * 5.0;
            (s, score)
        })
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(s, _)| s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nav::HidingCategory;
    use crate::systems::behavior::AgentIndex;
    use rand::SeedableRng;

    fn spot(x: f32, z: f32) -> HidingSpotInfo {
        HidingSpotInfo { position: Vec3::new(x, 0.0, z), category: HidingCategory::Cover }
    }

    #[test]
    fn test_hiding_spot_prefers_away_from_danger() {
        let danger = Vec3::new(10.0, 0.0, 0.0);
        let me = Vec3::ZERO;
        // One spot toward the danger, one away.
        let spots = vec![spot(5.0, 0.0), spot(-5.0, 0.0)];
        let best = best_hiding_spot(&spots, me, danger).expect("spot");
        assert_eq!(best.position.x, -5.0);
    }

    #[test]
    fn test_hiding_spot_none_when_empty() {
        assert!(best_hiding_spot(&[], Vec3::ZERO, Vec3::ZERO).is_none());
    }

    #[test]
    fn test_investigate_runs_to_completion() {
        let cfg = Config::default();
        let scene = SceneIndex::default();
        let index = AgentIndex::default();
        let mut rng = SmallRng::seed_from_u64(1);
        let mut transform = Transform::at(Vec3::ZERO);
        let mut movement = Movement::new(cfg.behavior.speed, cfg.behavior.arrival_epsilon);
        let mut requests = ProtectionRequests::default();
        let mut routine = Routine::investigate(Vec3::new(2.0, 0.0, 0.0));

        let dt = 0.25;
        let mut now = 0.0;
        let mut status = RoutineStatus::Running;
        for _ in 0..100 {
            now += dt;
            let mut ctx = RoutineCtx {
                now,
                dt,
                me: Entity::from_raw(0),
                cfg: &cfg,
                scene: &scene,
                index: &index,
                rng: &mut rng,
                transform: &mut transform,
                movement: &mut movement,
                nervousness: None,
                requests: &mut requests,
            };
            status = routine.tick(&mut ctx);
            // Stand-in for the movement system.
            if let Some(dest) = movement.destination() {
                let to_dest = dest - transform.position;
                if to_dest.length() <= 0.5 {
                    transform.position = dest;
                    movement.stop();
                } else {
                    transform.position += to_dest.normalized_or_zero() * 0.5;
                }
            }
            if status != RoutineStatus::Running {
                break;
            }
        }
        assert_eq!(status, RoutineStatus::Complete);
    }

    #[test]
    fn test_protection_request_queue() {
        let mut q = ProtectionRequests::default();
        let g1 = Entity::from_raw(1);
        let g2 = Entity::from_raw(2);
        q.push(ProtectionRequest { guard: g1, citizen: Entity::from_raw(9), danger: Vec3::ZERO });
        assert!(q.take_for(g2).is_none());
        assert!(q.take_for(g1).is_some());
        assert!(q.take_for(g1).is_none());
    }
}
