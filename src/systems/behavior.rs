//! Behavior State Machine
//!
//! Transitions driven by the detection meter, heard noise, and alert cues,
//! plus the per-state logic that keeps agents patrolling, wandering,
//! investigating, chasing, fleeing, escorting, and hiding.

use bevy_ecs::prelude::*;

use crate::components::{
    AgentId, AgentKind, AlertInbox, Behavior, BehaviorState, Detection, HearingSensor,
    Nervousness, NoiseInbox, PatrolRoute, Sight, SimClock, Suspicion, Transform, WanderArea,
};
use crate::config::Config;
use crate::events::{EventLog, SimEvent};
use crate::math::Vec3;
use crate::nav::{Movement, SceneIndex};
use crate::routines::{ProtectionRequests, Routine, RoutineCtx, RoutineStatus};
use crate::services::{guard_alert, AlertRelay, AlertScope, PendingAlert};
use crate::target::TargetState;
use crate::SimRng;

/// Distance at which a chasing agent has caught the target.
const CATCH_DISTANCE: f32 = 1.0;

/// How far a fleeing citizen runs from the danger.
const FLEE_DISTANCE: f32 = 15.0;

/// Intensity of a citizen's relayed warning.
const CITIZEN_CHAIN_INTENSITY: f32 = 5.0;

/// Chain warnings weaker than this are not re-relayed.
const CHAIN_CUTOFF: f32 = 1.0;

/// Read-only snapshot of one agent, taken before the behavior systems run.
#[derive(Debug, Clone)]
pub struct AgentSnapshot {
    pub entity: Entity,
    pub id: String,
    pub kind: AgentKind,
    pub position: Vec3,
    pub state: BehaviorState,
}

/// Per-tick snapshot of all agents, for cross-agent lookups that would
/// otherwise alias the mutable agent query.
#[derive(Resource, Debug, Default)]
pub struct AgentIndex {
    agents: Vec<AgentSnapshot>,
}

impl AgentIndex {
    pub fn get(&self, entity: Entity) -> Option<&AgentSnapshot> {
        self.agents.iter().find(|a| a.entity == entity)
    }

    pub fn nearest_guard(&self, from: Vec3) -> Option<&AgentSnapshot> {
        self.agents
            .iter()
            .filter(|a| a.kind == AgentKind::Guard)
            .min_by(|a, b| {
                let da = a.position.distance(from);
                let db = b.position.distance(from);
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentSnapshot> {
        self.agents.iter()
    }
}

/// Rebuilds the agent snapshot at the start of each tick.
pub fn build_agent_index(
    mut index: ResMut<AgentIndex>,
    agents: Query<(Entity, &AgentId, &AgentKind, &Transform, &Behavior)>,
) {
    index.agents.clear();
    for (entity, id, kind, transform, behavior) in agents.iter() {
        index.agents.push(AgentSnapshot {
            entity,
            id: id.0.clone(),
            kind: *kind,
            position: transform.position,
            state: behavior.state,
        });
    }
}

/// Transition an agent, enforcing the variant's state support and logging
/// the change. Returns false for no-ops and unsupported targets.
fn change_state(
    behavior: &mut Behavior,
    movement: &mut Movement,
    id: &AgentId,
    kind: AgentKind,
    state: BehaviorState,
    now: f32,
    log: &mut EventLog,
) -> bool {
    if !kind.supports(state) {
        tracing::warn!(agent = %id.0, ?kind, ?state, "unsupported state requested");
        return false;
    }
    let from = behavior.state;
    if !behavior.set_state(state, now) {
        return false;
    }
    movement.stop();
    log.push(SimEvent::StateChanged { agent: id.0.clone(), from, to: state, at: now });
    tracing::debug!(agent = %id.0, ?from, ?state, "state change");
    true
}

/// Point an agent at an investigation target: timer, memory, and routine.
fn begin_investigation(behavior: &mut Behavior, cfg: &Config, point: Vec3) {
    behavior.investigation_timer = cfg.behavior.investigation_time;
    behavior.last_known_target_pos = Some(point);
    behavior.routine = Some(Routine::investigate(point));
}

type DetectionQuery<'w, 's> = Query<
    'w,
    's,
    (
        Entity,
        &'static AgentId,
        &'static AgentKind,
        &'static Transform,
        &'static Sight,
        &'static mut Behavior,
        &'static mut Detection,
        &'static mut Movement,
        (Option<&'static mut Suspicion>, Option<&'static mut Nervousness>),
    ),
>;

/// Applies the transitions the detection meter and suspicion accumulator
/// demand: spotted latching, chase entry, guard broadcasts, citizen flight,
/// and suspicion-driven investigations.
pub fn apply_detection_transitions(
    clock: Res<SimClock>,
    cfg: Res<Config>,
    target: Res<TargetState>,
    mut relay: ResMut<AlertRelay>,
    mut log: ResMut<EventLog>,
    mut agents: DetectionQuery<'_, '_>,
) {
    let now = clock.time;
    for (entity, id, kind, transform, sight, mut behavior, mut detection, mut movement, extras) in
        agents.iter_mut()
    {
        let (suspicion, nervousness) = extras;

        // A maxed suspicion accumulator forces a full detection.
        if let Some(mut susp) = suspicion {
            if susp.value >= susp.max && !detection.spotted {
                detection.set_meter(1.0);
                susp.value = 0.0;
                susp.suspicious = false;
            } else if susp.suspicious && behavior.state == BehaviorState::Patrolling {
                let point = sight.last_seen_pos.unwrap_or(target.position);
                if change_state(
                    &mut behavior,
                    &mut movement,
                    id,
                    *kind,
                    BehaviorState::Investigating,
                    now,
                    &mut log,
                ) {
                    begin_investigation(&mut behavior, &cfg, point);
                }
            }
        }

        if detection.meter() < 1.0 || detection.spotted {
            continue;
        }
        detection.spotted = true;
        log.push(SimEvent::Spotted { agent: id.0.clone(), target_pos: target.position, at: now });

        match kind {
            AgentKind::Guard => {
                change_state(
                    &mut behavior,
                    &mut movement,
                    id,
                    *kind,
                    BehaviorState::Chasing,
                    now,
                    &mut log,
                );
                behavior.last_known_target_pos = Some(target.position);
                relay.broadcast(guard_alert(entity, id, transform.position, target.position), now);
            }
            // A citizen's chase is a dash to the nearest guard; the Chasing
            // state shields the run from noise interruptions.
            AgentKind::Citizen => {
                if let Some(mut nerv) = nervousness {
                    nerv.value = (nerv.value + 5.0).min(10.0);
                    nerv.panicking = nerv.value > cfg.alert.panic_threshold;
                }
                change_state(
                    &mut behavior,
                    &mut movement,
                    id,
                    *kind,
                    BehaviorState::Chasing,
                    now,
                    &mut log,
                );
                behavior.last_known_target_pos = Some(target.position);
                behavior.routine = Some(Routine::seek_guard(target.position));
                relay.chain(PendingAlert {
                    origin: entity,
                    origin_id: id.0.clone(),
                    origin_pos: transform.position,
                    danger: target.position,
                    intensity: CITIZEN_CHAIN_INTENSITY,
                    scope: AlertScope::CitizensOnly,
                });
            }
        }
    }
}

type ReactionQuery<'w, 's> = Query<
    'w,
    's,
    (
        Entity,
        &'static AgentId,
        &'static AgentKind,
        &'static Transform,
        &'static HearingSensor,
        &'static mut NoiseInbox,
        Option<&'static mut AlertInbox>,
        &'static mut Behavior,
        &'static mut Movement,
        Option<&'static mut Nervousness>,
    ),
>;

/// Reacts to delivered noise and alert cues: investigations for noise above
/// the hearing threshold, fear responses for citizen alert cues.
pub fn apply_noise_and_alerts(
    clock: Res<SimClock>,
    cfg: Res<Config>,
    scene: Res<SceneIndex>,
    mut relay: ResMut<AlertRelay>,
    mut log: ResMut<EventLog>,
    mut agents: ReactionQuery<'_, '_>,
) {
    let now = clock.time;
    for (
        entity,
        id,
        kind,
        transform,
        hearing,
        mut noise_inbox,
        alert_inbox,
        mut behavior,
        mut movement,
        mut nervousness,
    ) in agents.iter_mut()
    {
        if let Some(heard) = noise_inbox.take() {
            // A live chase outranks any noise; everything else drops what it
            // is doing and investigates.
            if heard.level > hearing.threshold && behavior.state != BehaviorState::Chasing {
                log.push(SimEvent::NoiseHeard { agent: id.0.clone(), level: heard.level, at: now });
                let entered = change_state(
                    &mut behavior,
                    &mut movement,
                    id,
                    *kind,
                    BehaviorState::Investigating,
                    now,
                    &mut log,
                );
                // A fresh noise re-aims an investigation already underway.
                if entered || behavior.state == BehaviorState::Investigating {
                    begin_investigation(&mut behavior, &cfg, heard.position);
                }
            }
        }

        let Some(mut alert_inbox) = alert_inbox else {
            continue;
        };
        for cue in alert_inbox.drain() {
            let Some(nerv) = nervousness.as_deref_mut() else {
                continue;
            };
            nerv.value = (nerv.value + cue.impact).min(10.0);
            nerv.panicking = nerv.value > cfg.alert.panic_threshold;

            // Scared citizens pass the warning on, at half strength so the
            // cascade dies out.
            let relayed = cue.impact * 0.5;
            if nerv.value > cfg.alert.nervousness_threshold && relayed >= CHAIN_CUTOFF {
                relay.chain(PendingAlert {
                    origin: entity,
                    origin_id: id.0.clone(),
                    origin_pos: transform.position,
                    danger: cue.danger,
                    intensity: relayed,
                    scope: AlertScope::CitizensOnly,
                });
            }

            if nerv.panicking
                && matches!(
                    behavior.state,
                    BehaviorState::Wandering | BehaviorState::Investigating
                )
            {
                if change_state(
                    &mut behavior,
                    &mut movement,
                    id,
                    *kind,
                    BehaviorState::Hiding,
                    now,
                    &mut log,
                ) {
                    behavior.routine = Some(Routine::hide(cue.danger));
                }
            } else if nerv.value > cfg.alert.nervousness_threshold
                && behavior.state == BehaviorState::Wandering
            {
                if change_state(
                    &mut behavior,
                    &mut movement,
                    id,
                    *kind,
                    BehaviorState::RunningAway,
                    now,
                    &mut log,
                ) {
                    let away = (transform.position - cue.danger).normalized_or_zero();
                    let flee = scene.sample_position(transform.position + away * FLEE_DISTANCE);
                    behavior.routine = Some(Routine::run_away(flee));
                }
            }
        }
    }
}

type StateQuery<'w, 's> = Query<
    'w,
    's,
    (
        Entity,
        &'static AgentId,
        &'static AgentKind,
        &'static mut Transform,
        &'static mut Movement,
        &'static mut Behavior,
        &'static mut Detection,
        &'static Sight,
        (
            Option<&'static mut Nervousness>,
            Option<&'static mut PatrolRoute>,
            Option<&'static mut WanderArea>,
        ),
    ),
>;

/// Runs each agent's current state for one tick: routine stepping, timers,
/// patrol driving, chase pursuit, and fear decay.
#[allow(clippy::too_many_arguments)]
pub fn drive_states(
    clock: Res<SimClock>,
    cfg: Res<Config>,
    scene: Res<SceneIndex>,
    target: Res<TargetState>,
    index: Res<AgentIndex>,
    mut rng: ResMut<SimRng>,
    mut requests: ResMut<ProtectionRequests>,
    mut relay: ResMut<AlertRelay>,
    mut log: ResMut<EventLog>,
    mut agents: StateQuery<'_, '_>,
) {
    let now = clock.time;
    let dt = clock.dt;

    for (entity, id, kind, mut transform, mut movement, mut behavior, mut detection, sight, extras) in
        agents.iter_mut()
    {
        let (mut nervousness, mut route, mut wander) = extras;

        // Fear decay and speed selection happen every tick, state-independent.
        if let Some(nerv) = nervousness.as_deref_mut() {
            nerv.value = (nerv.value - cfg.alert.nervousness_decay * dt).max(0.0);
            nerv.panicking = nerv.value > cfg.alert.panic_threshold;
        }
        let seeking_guard = *kind == AgentKind::Citizen && behavior.state == BehaviorState::Chasing;
        let speed = if nervousness.as_deref().is_some_and(|n| n.panicking) || seeking_guard {
            cfg.behavior.panic_speed
        } else if behavior.state == BehaviorState::Protecting {
            cfg.behavior.escort_speed
        } else {
            movement.base_speed
        };
        movement.speed = speed;

        // Guards pick up protection requests unless already escorting.
        if *kind == AgentKind::Guard && behavior.state != BehaviorState::Protecting {
            if let Some(req) = requests.take_for(entity) {
                if change_state(
                    &mut behavior,
                    &mut movement,
                    id,
                    *kind,
                    BehaviorState::Protecting,
                    now,
                    &mut log,
                ) {
                    behavior.last_known_target_pos = Some(req.danger);
                    behavior.routine = Some(Routine::escort(req.citizen, req.danger));
                }
            }
        }

        // Step the routine, if any, and dispatch its outcome.
        if let Some(mut routine) = behavior.routine.take() {
            let status = {
                let mut ctx = RoutineCtx {
                    now,
                    dt,
                    me: entity,
                    cfg: &cfg,
                    scene: &scene,
                    index: &index,
                    rng: &mut rng.0,
                    transform: &mut transform,
                    movement: &mut movement,
                    nervousness: nervousness.as_deref_mut(),
                    requests: &mut requests,
                };
                routine.tick(&mut ctx)
            };
            match status {
                RoutineStatus::Running => behavior.routine = Some(routine),
                RoutineStatus::Complete => on_routine_complete(
                    &routine,
                    &cfg,
                    id,
                    *kind,
                    &transform,
                    &mut behavior,
                    &mut movement,
                    wander.as_deref_mut(),
                    now,
                    &mut log,
                ),
                RoutineStatus::Failed => on_routine_failed(
                    &routine,
                    id,
                    *kind,
                    &transform,
                    &mut behavior,
                    &mut movement,
                    now,
                    &mut log,
                ),
            }
        }

        match behavior.state {
            BehaviorState::Patrolling => {
                if let Some(route) = route.as_deref_mut() {
                    drive_patrol(route, &transform, &mut movement, dt);
                }
            }

            BehaviorState::Wandering => {
                if behavior.routine.is_none() {
                    if let Some(area) = wander.as_deref_mut() {
                        if now >= area.next_start {
                            behavior.routine = Some(Routine::wander(
                                area.center,
                                area.radius,
                                cfg.behavior.wander_time,
                            ));
                        }
                    }
                }
            }

            BehaviorState::Investigating => {
                behavior.investigation_timer -= dt;
                if behavior.investigation_timer <= 0.0 {
                    detection.spotted = false;
                    behavior.last_known_target_pos = None;
                    if change_state(
                        &mut behavior,
                        &mut movement,
                        id,
                        *kind,
                        kind.baseline(),
                        now,
                        &mut log,
                    ) {
                        if let Some(route) = route.as_deref_mut() {
                            route.resume_from(
                                transform.position,
                                cfg.behavior.patrol_resume_distance,
                            );
                        }
                    }
                }
            }

            BehaviorState::Chasing => {
                if !target.present {
                    detection.spotted = false;
                    change_state(
                        &mut behavior,
                        &mut movement,
                        id,
                        *kind,
                        kind.baseline(),
                        now,
                        &mut log,
                    );
                    if let Some(route) = route.as_deref_mut() {
                        route.resume_from(transform.position, cfg.behavior.patrol_resume_distance);
                    }
                    continue;
                }

                if sight.result.visible {
                    behavior.last_known_target_pos = Some(target.position);
                    if *kind == AgentKind::Guard {
                        // Periodic re-alert while the chase is live; the
                        // relay's cooldown spaces these out.
                        relay.broadcast(
                            guard_alert(entity, id, transform.position, target.position),
                            now,
                        );
                    }
                }

                // Guards pursue; a chasing citizen is driven by its
                // seek-guard routine instead.
                if *kind == AgentKind::Guard {
                    // Pursue the live position only while the target is in
                    // sight; otherwise head for where it was last seen.
                    let pursue = if sight.result.visible {
                        target.position
                    } else {
                        behavior.last_known_target_pos.unwrap_or(transform.position)
                    };
                    if movement.destination().map_or(true, |d| d.distance(pursue) > 0.5) {
                        movement.set_destination(pursue);
                    }

                    if transform.position.distance(target.position) <= CATCH_DISTANCE
                        && !behavior.caught
                    {
                        behavior.caught = true;
                        log.push(SimEvent::TargetCaught { agent: id.0.clone(), at: now });
                        tracing::info!(agent = %id.0, "target caught");
                    }
                }

                let last_seen = sight.last_visible_at.unwrap_or(behavior.changed_at);
                if now - last_seen > cfg.detection.player_visibility_timeout {
                    let lost_at = behavior.last_known_target_pos.unwrap_or(transform.position);
                    match kind {
                        AgentKind::Guard => {
                            if change_state(
                                &mut behavior,
                                &mut movement,
                                id,
                                *kind,
                                BehaviorState::Investigating,
                                now,
                                &mut log,
                            ) {
                                behavior.investigation_timer = cfg.behavior.search_duration;
                                behavior.last_known_target_pos = Some(lost_at);
                                behavior.routine =
                                    Some(Routine::search(lost_at, cfg.behavior.wander_radius));
                            }
                        }
                        AgentKind::Citizen => {
                            if change_state(
                                &mut behavior,
                                &mut movement,
                                id,
                                *kind,
                                BehaviorState::Hiding,
                                now,
                                &mut log,
                            ) {
                                behavior.routine = Some(Routine::hide(lost_at));
                            }
                        }
                    }
                }
            }

            // Routine-driven states. An empty routine slot here means the
            // dispatch already ran or the routine was dropped; fall back to
            // baseline rather than standing forever.
            BehaviorState::RunningAway | BehaviorState::Hiding | BehaviorState::Protecting => {
                if behavior.routine.is_none() {
                    change_state(
                        &mut behavior,
                        &mut movement,
                        id,
                        *kind,
                        kind.baseline(),
                        now,
                        &mut log,
                    );
                }
            }
        }
    }
}

/// Walks a patrol route: travel to the current point, dwell, advance.
fn drive_patrol(route: &mut PatrolRoute, transform: &Transform, movement: &mut Movement, dt: f32) {
    let Some(point) = route.current_point() else {
        return;
    };
    if movement.destination().is_some() {
        return;
    }
    if movement.has_arrived(transform.position) && transform.position.distance(point) < 1.0 {
        route.wait_counter -= dt;
        if route.wait_counter <= 0.0 {
            route.advance();
            route.wait_counter = route.dwell;
            if let Some(next) = route.current_point() {
                movement.set_destination(next);
            }
        }
    } else {
        movement.set_destination(point);
    }
}

#[allow(clippy::too_many_arguments)]
fn on_routine_complete(
    routine: &Routine,
    cfg: &Config,
    id: &AgentId,
    kind: AgentKind,
    transform: &Transform,
    behavior: &mut Behavior,
    movement: &mut Movement,
    wander: Option<&mut WanderArea>,
    now: f32,
    log: &mut EventLog,
) {
    match routine {
        // A finished wander session idles until the next one may start.
        Routine::Wander { .. } => {
            if let Some(area) = wander {
                area.next_start = now + cfg.behavior.wander_interval;
            }
        }

        // Look-around done; the investigation timer decides when to leave.
        Routine::Investigate { .. } | Routine::Search { .. } => {}

        // The citizen is safe: sweep the area before resuming patrol.
        Routine::Escort { danger, .. } => {
            if change_state(behavior, movement, id, kind, BehaviorState::Investigating, now, log) {
                behavior.investigation_timer = cfg.behavior.search_duration;
                behavior.last_known_target_pos = Some(*danger);
                behavior.routine = Some(Routine::search(*danger, cfg.behavior.wander_radius));
            }
        }

        Routine::Hide { .. } | Routine::RunAway { .. } => {
            change_state(behavior, movement, id, kind, kind.baseline(), now, log);
        }

        // Request handed over; run clear while the guard moves in.
        Routine::SeekGuard { danger, .. } => {
            if change_state(behavior, movement, id, kind, BehaviorState::RunningAway, now, log) {
                let away = (transform.position - *danger).normalized_or_zero();
                let flee = transform.position + away * FLEE_DISTANCE;
                behavior.routine = Some(Routine::run_away(flee));
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn on_routine_failed(
    routine: &Routine,
    id: &AgentId,
    kind: AgentKind,
    transform: &Transform,
    behavior: &mut Behavior,
    movement: &mut Movement,
    now: f32,
    log: &mut EventLog,
) {
    match routine {
        // Nowhere to hide and nobody to run to: just run.
        Routine::Hide { danger, .. } | Routine::SeekGuard { danger, .. } => {
            if change_state(behavior, movement, id, kind, BehaviorState::RunningAway, now, log)
                || behavior.state == BehaviorState::RunningAway
            {
                let away = (transform.position - *danger).normalized_or_zero();
                behavior.routine =
                    Some(Routine::run_away(transform.position + away * FLEE_DISTANCE));
            }
        }
        _ => {
            change_state(behavior, movement, id, kind, kind.baseline(), now, log);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn run_escort_tick(citizen_pos: Vec3, danger: Vec3) -> (RoutineStatus, Movement) {
        let cfg = Config::default();
        let scene = SceneIndex::default();
        let citizen = Entity::from_raw(7);
        let index = AgentIndex {
            agents: vec![AgentSnapshot {
                entity: citizen,
                id: "citizen-1".into(),
                kind: AgentKind::Citizen,
                position: citizen_pos,
                state: BehaviorState::RunningAway,
            }],
        };
        let mut rng = SmallRng::seed_from_u64(1);
        let mut transform = Transform::at(Vec3::new(0.0, 0.0, -6.0));
        let mut movement = Movement::new(cfg.behavior.speed, cfg.behavior.arrival_epsilon);
        let mut requests = ProtectionRequests::default();
        let mut routine = Routine::escort(citizen, danger);
        let status = {
            let mut ctx = RoutineCtx {
                now: 1.0,
                dt: 0.1,
                me: Entity::from_raw(1),
                cfg: &cfg,
                scene: &scene,
                index: &index,
                rng: &mut rng,
                transform: &mut transform,
                movement: &mut movement,
                nervousness: None,
                requests: &mut requests,
            };
            routine.tick(&mut ctx)
        };
        (status, movement)
    }

    #[test]
    fn test_escort_point_sits_behind_the_citizen() {
        // Citizen at the origin, danger to the north: the guard posts up
        // two meters south of the citizen, on the sheltered side.
        let (status, movement) = run_escort_tick(Vec3::ZERO, Vec3::new(0.0, 0.0, 10.0));
        assert_eq!(status, RoutineStatus::Running);
        let dest = movement.destination().expect("escort destination");
        assert!((dest.z + 2.0).abs() < 1e-4, "got {dest:?}");
        assert!(dest.x.abs() < 1e-4);
    }

    #[test]
    fn test_escort_completes_once_citizen_is_clear() {
        // Citizen more than twice the protection radius from the danger.
        let (status, movement) = run_escort_tick(Vec3::new(0.0, 0.0, -25.0), Vec3::ZERO);
        assert_eq!(status, RoutineStatus::Complete);
        assert!(movement.destination().is_none());
    }
}
