// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The per-tick AI executor.
//!
//! NPCs are visited in id order. Blackboard bookkeeping (stuck detection,
//! waypoint progress) updates every tick even for NPCs whose decision
//! cadence skips them; decisions themselves are capped per tick with
//! overflow deferred to the next tick. Rats bypass the FSM entirely.

use crate::actor::ABILITY_SLOTS;
use crate::ai::{
    ActionKind, CompiledBehavior, ConditionKind, CooldownSlot, MoveTarget, TransitionRef,
};
use crate::command::{Command, CommandPayload};
use crate::world::World;

/// FSM decisions evaluated per tick before overflow defers to the next.
pub const MAX_DECISIONS_PER_TICK: usize = 64;

/// Stall ticks after which `reachedWaypoint` relaxes to "close enough".
pub const WAYPOINT_STALL_RELAX_TICKS: u32 = 120;

/// Slack added to the best achieved distance during stall relaxation.
const WAYPOINT_STALL_SLACK: f64 = 2.0;

/// Rat perception radius for non-rat threats, world units.
const RAT_FLEE_RADIUS: f64 = 140.0;

/// Rat flee duration, seconds.
const RAT_FLEE_SECONDS: f64 = 4.0;

/// Rat wander envelope around home, world units.
const RAT_WANDER_RADIUS: f64 = 200.0;

/// Runs the executor for one tick, returning the commands it decided on.
pub fn run_executor(world: &mut World) -> Vec<Command> {
    let tick = world.tick();
    let mut commands = Vec::new();
    let mut decisions = 0usize;
    let npc_ids: Vec<String> = world.npcs.keys().cloned().collect();

    for id in npc_ids {
        update_bookkeeping(world, &id);
        let Some(npc) = world.npcs.get(&id) else {
            continue;
        };
        let due = npc.blackboard.next_decision_at <= tick;
        if !due {
            continue;
        }
        if decisions >= MAX_DECISIONS_PER_TICK {
            // Deferred: next_decision_at untouched, so the NPC is due again
            // next tick.
            continue;
        }
        decisions += 1;
        if npc.npc_type == "rat" {
            rat_decide(world, &id, tick, &mut commands);
        } else if let Some(config_id) = npc.ai_config.clone() {
            if let Some(behavior) = world.behaviors.get(&config_id).cloned() {
                fsm_decide(world, &id, &behavior, tick, &mut commands);
            }
        }
    }
    commands
}

impl World {
    /// Human-readable FSM state name for an NPC (diagnostics, tests).
    #[must_use]
    pub fn npc_ai_state(&self, id: &str) -> Option<&str> {
        let npc = self.npcs.get(id)?;
        let behavior = self.behaviors.get(npc.ai_config.as_deref()?)?;
        behavior
            .states
            .get(npc.state_index)
            .map(|s| s.name.as_str())
    }
}

/// Per-tick blackboard upkeep: stuck detection and waypoint progress.
fn update_bookkeeping(world: &mut World, id: &str) {
    let Some(npc) = world.npcs.get_mut(id) else {
        return;
    };
    let pos = (npc.actor.x, npc.actor.y);
    let bb = &mut npc.blackboard;

    let delta = ((pos.0 - bb.last_pos.0).powi(2) + (pos.1 - bb.last_pos.1).powi(2)).sqrt();
    bb.last_move_delta = delta;
    if delta < bb.stuck_epsilon {
        bb.stuck_counter = bb.stuck_counter.saturating_add(1);
    } else {
        bb.stuck_counter = 0;
    }
    bb.last_pos = pos;

    if !npc.waypoints.is_empty() {
        let (wx, wy) = npc.waypoints[bb.waypoint_index % npc.waypoints.len()];
        let dist = ((wx - pos.0).powi(2) + (wy - pos.1).powi(2)).sqrt();
        if dist + 0.5 < bb.waypoint_best_dist {
            bb.waypoint_best_dist = dist;
            bb.waypoint_stall = 0;
        } else {
            bb.waypoint_stall = bb.waypoint_stall.saturating_add(1);
        }
        bb.waypoint_last_dist = dist;
    }
}

fn resolve_anchor(world: &World, id: &str, target: MoveTarget) -> Option<(f64, f64)> {
    let npc = world.npcs.get(id)?;
    match target {
        MoveTarget::Waypoint => {
            if npc.waypoints.is_empty() {
                Some(npc.home)
            } else {
                Some(npc.waypoints[npc.blackboard.waypoint_index % npc.waypoints.len()])
            }
        }
        MoveTarget::Home => Some(npc.home),
        MoveTarget::WanderTarget => npc.blackboard.wander_target,
        MoveTarget::TargetActor => {
            let target_id = npc.blackboard.target_actor_id.as_deref()?;
            world.actor(target_id).map(|a| (a.x, a.y))
        }
    }
}

fn fsm_decide(
    world: &mut World,
    id: &str,
    behavior: &CompiledBehavior,
    tick: u64,
    commands: &mut Vec<Command>,
) {
    let Some(npc) = world.npcs.get(id) else {
        return;
    };
    let mut state_index = npc.state_index.min(behavior.states.len() - 1);

    // Transitions first; the first true condition wins.
    let transitions = behavior.states[state_index].transitions.clone();
    for transition in &transitions {
        if eval_condition(world, id, behavior, transition, tick) {
            state_index = transition.to_state;
            let enter_timer = behavior.states[state_index].enter_timer;
            if let Some(npc) = world.npcs.get_mut(id) {
                npc.state_index = state_index;
                npc.blackboard.state_entered_tick = tick;
                if enter_timer > 0 {
                    npc.blackboard.wait_until = tick + u64::from(enter_timer);
                }
            }
            break;
        }
    }

    let state = behavior.states[state_index].clone();
    let entered_this_tick = world
        .npcs
        .get(id)
        .is_some_and(|n| n.blackboard.state_entered_tick == tick);

    for action in &state.actions {
        match action.kind {
            ActionKind::MoveToward => {
                let target = behavior.pools.moves[action.param_idx].target;
                move_toward(world, id, target, tick, commands);
            }
            ActionKind::MoveAway => {
                let target = behavior.pools.moves[action.param_idx].target;
                move_away(world, id, target, tick, commands);
            }
            ActionKind::Face => {
                let target = behavior.pools.moves[action.param_idx].target;
                if let Some((tx, ty)) = resolve_anchor(world, id, target) {
                    let Some(npc) = world.npcs.get(id) else {
                        continue;
                    };
                    let facing =
                        crate::actor::Facing::from_vec(tx - npc.actor.x, ty - npc.actor.y);
                    commands.push(Command {
                        actor_id: id.to_owned(),
                        origin_tick: tick,
                        issued_at: commands.len() as u64,
                        payload: CommandPayload::Move {
                            dx: 0.0,
                            dy: 0.0,
                            facing,
                        },
                    });
                }
            }
            ActionKind::UseAbility => {
                let params = &behavior.pools.abilities[action.param_idx];
                let slot = params.slot.min(ABILITY_SLOTS - 1);
                let ready = world
                    .npcs
                    .get(id)
                    .map_or(u64::MAX, |n| n.blackboard.next_ability_ready[slot]);
                if tick >= ready || ready == 0 {
                    if let Some(npc) = world.npcs.get_mut(id) {
                        npc.blackboard.next_ability_ready[slot] =
                            tick + u64::from(params.cooldown_ticks);
                    }
                    commands.push(Command {
                        actor_id: id.to_owned(),
                        origin_tick: tick,
                        issued_at: commands.len() as u64,
                        payload: CommandPayload::Action {
                            name: params.ability.clone(),
                        },
                    });
                }
            }
            // Entry-only actions: they apply on the tick the state was
            // entered and are inert afterwards.
            ActionKind::SetTimer => {
                if entered_this_tick {
                    let ticks = behavior.pools.timers[action.param_idx].ticks;
                    if let Some(npc) = world.npcs.get_mut(id) {
                        npc.blackboard.wait_until = tick + u64::from(ticks);
                    }
                }
            }
            ActionKind::SetWaypoint => {
                if entered_this_tick {
                    let advance = behavior.pools.waypoints[action.param_idx].advance;
                    if let Some(npc) = world.npcs.get_mut(id) {
                        let len = npc.waypoints.len().max(1) as i64;
                        let next = (npc.blackboard.waypoint_index as i64 + advance)
                            .rem_euclid(len) as usize;
                        npc.blackboard.waypoint_index = next;
                        npc.blackboard.reset_waypoint_progress();
                    }
                }
            }
            ActionKind::RandomDestination => {
                if entered_this_tick {
                    let radius = behavior.pools.destinations[action.param_idx].radius;
                    let home = world.npcs.get(id).map(|n| n.home);
                    if let Some((hx, hy)) = home {
                        let dest = world.rat_rng.next_point_near(hx, hy, radius);
                        if let Some(npc) = world.npcs.get_mut(id) {
                            npc.blackboard.wander_target = Some(dest);
                        }
                    }
                }
            }
        }
    }

    if let Some(npc) = world.npcs.get_mut(id) {
        npc.blackboard.next_decision_at = tick + u64::from(state.cadence.max(1));
    }
}

fn move_toward(
    world: &mut World,
    id: &str,
    target: MoveTarget,
    tick: u64,
    commands: &mut Vec<Command>,
) {
    let Some((tx, ty)) = resolve_anchor(world, id, target) else {
        return;
    };
    // Home returns go through the navmesh; everything else steers direct.
    if target == MoveTarget::Home {
        let has_path = world.npcs.get(id).is_some_and(|n| n.path.is_some());
        if !has_path {
            commands.push(Command {
                actor_id: id.to_owned(),
                origin_tick: tick,
                issued_at: commands.len() as u64,
                payload: CommandPayload::SetPath { x: tx, y: ty },
            });
        }
        return;
    }
    let Some(npc) = world.npcs.get(id) else {
        return;
    };
    let dx = tx - npc.actor.x;
    let dy = ty - npc.actor.y;
    let dist = (dx * dx + dy * dy).sqrt();
    let payload = if dist < 1.0 {
        CommandPayload::Stop
    } else {
        CommandPayload::Move {
            dx: dx / dist,
            dy: dy / dist,
            facing: None,
        }
    };
    commands.push(Command {
        actor_id: id.to_owned(),
        origin_tick: tick,
        issued_at: commands.len() as u64,
        payload,
    });
}

fn move_away(
    world: &mut World,
    id: &str,
    target: MoveTarget,
    tick: u64,
    commands: &mut Vec<Command>,
) {
    let Some((tx, ty)) = resolve_anchor(world, id, target) else {
        return;
    };
    let Some(npc) = world.npcs.get(id) else {
        return;
    };
    let dx = npc.actor.x - tx;
    let dy = npc.actor.y - ty;
    let dist = (dx * dx + dy * dy).sqrt();
    if dist < 1e-9 {
        return;
    }
    commands.push(Command {
        actor_id: id.to_owned(),
        origin_tick: tick,
        issued_at: commands.len() as u64,
        payload: CommandPayload::Move {
            dx: dx / dist,
            dy: dy / dist,
            facing: None,
        },
    });
}

fn eval_condition(
    world: &mut World,
    id: &str,
    behavior: &CompiledBehavior,
    transition: &TransitionRef,
    tick: u64,
) -> bool {
    match transition.kind {
        ConditionKind::ReachedWaypoint => {
            let params = behavior.pools.arrivals[transition.param_idx];
            let Some((tx, ty)) = resolve_anchor(world, id, params.target) else {
                return false;
            };
            let Some(npc) = world.npcs.get(id) else {
                return false;
            };
            let dist =
                ((tx - npc.actor.x).powi(2) + (ty - npc.actor.y).powi(2)).sqrt();
            if dist <= params.arrive_radius {
                return true;
            }
            // Hysteresis: hopeless stall against an unreachable waypoint
            // counts as arrival so patrols cannot wedge forever.
            params.target == MoveTarget::Waypoint
                && npc.blackboard.waypoint_stall >= WAYPOINT_STALL_RELAX_TICKS
                && npc.blackboard.waypoint_last_dist
                    <= npc.blackboard.waypoint_best_dist + WAYPOINT_STALL_SLACK
        }
        ConditionKind::PlayerWithin => {
            let radius = behavior.pools.proximities[transition.param_idx].radius;
            let found = nearest_player_within(world, id, radius);
            if let Some(target) = found {
                if let Some(npc) = world.npcs.get_mut(id) {
                    npc.blackboard.target_actor_id = Some(target);
                }
                true
            } else {
                false
            }
        }
        ConditionKind::NonRatWithin => {
            let radius = behavior.pools.proximities[transition.param_idx].radius;
            nearest_non_rat_within(world, id, radius).is_some()
        }
        ConditionKind::LostSight => {
            let params = behavior.pools.sights[transition.param_idx];
            lost_sight(world, id, params.radius, params.grace_ticks, tick)
        }
        ConditionKind::CooldownReady => {
            let slot = behavior.pools.cooldowns[transition.param_idx].slot;
            let Some(npc) = world.npcs.get(id) else {
                return false;
            };
            match slot {
                CooldownSlot::Wait => tick >= npc.blackboard.wait_until,
                CooldownSlot::Ability(i) => {
                    tick >= npc.blackboard.next_ability_ready[i.min(ABILITY_SLOTS - 1)]
                }
            }
        }
        ConditionKind::Stuck => {
            let threshold = behavior.pools.stucks[transition.param_idx].threshold;
            let Some(npc) = world.npcs.get(id) else {
                return false;
            };
            npc.blackboard.stuck_counter >= threshold
                && npc.blackboard.last_move_delta < npc.blackboard.stuck_epsilon
        }
    }
}

/// Nearest player within `radius`; ties break toward the smaller id.
fn nearest_player_within(world: &World, id: &str, radius: f64) -> Option<String> {
    let npc = world.npcs.get(id)?;
    let (x, y) = (npc.actor.x, npc.actor.y);
    let mut best: Option<(String, f64)> = None;
    for player in world.players.values() {
        let d = (player.actor.x - x).powi(2) + (player.actor.y - y).powi(2);
        if d > radius * radius {
            continue;
        }
        let better = match &best {
            Some((bid, bd)) => d < *bd || (d == *bd && player.actor.id < *bid),
            None => true,
        };
        if better {
            best = Some((player.actor.id.clone(), d));
        }
    }
    best.map(|(id, _)| id)
}

/// Nearest non-rat actor (player or NPC) within `radius`.
fn nearest_non_rat_within(world: &World, id: &str, radius: f64) -> Option<String> {
    let npc = world.npcs.get(id)?;
    let (x, y) = (npc.actor.x, npc.actor.y);
    let mut best: Option<(String, f64)> = None;
    let candidates = world
        .players
        .values()
        .map(|p| (&p.actor, false))
        .chain(world.npcs.values().map(|n| (&n.actor, n.npc_type == "rat")));
    for (actor, is_rat) in candidates {
        if is_rat || actor.id == id {
            continue;
        }
        let d = (actor.x - x).powi(2) + (actor.y - y).powi(2);
        if d > radius * radius {
            continue;
        }
        let better = match &best {
            Some((bid, bd)) => d < *bd || (d == *bd && actor.id < *bid),
            None => true,
        };
        if better {
            best = Some((actor.id.clone(), d));
        }
    }
    best.map(|(id, _)| id)
}

/// True when the pinned target is gone, or out of `radius` for longer than
/// the grace window. Clears the pin when sight is truly lost.
fn lost_sight(world: &mut World, id: &str, radius: f64, grace_ticks: u32, tick: u64) -> bool {
    let (target_id, chase_until, x, y) = {
        let Some(npc) = world.npcs.get(id) else {
            return false;
        };
        (
            npc.blackboard.target_actor_id.clone(),
            npc.blackboard.chase_until,
            npc.actor.x,
            npc.actor.y,
        )
    };
    let Some(target_id) = target_id else {
        return true;
    };
    let Some(target) = world.actor(&target_id) else {
        if let Some(npc) = world.npcs.get_mut(id) {
            npc.blackboard.target_actor_id = None;
            npc.blackboard.chase_until = 0;
        }
        return true;
    };
    let d = (target.x - x).powi(2) + (target.y - y).powi(2);
    if d <= radius * radius {
        if let Some(npc) = world.npcs.get_mut(id) {
            npc.blackboard.chase_until = 0;
        }
        return false;
    }
    if grace_ticks == 0 {
        if let Some(npc) = world.npcs.get_mut(id) {
            npc.blackboard.target_actor_id = None;
            npc.blackboard.chase_until = 0;
        }
        return true;
    }
    if chase_until == 0 {
        if let Some(npc) = world.npcs.get_mut(id) {
            npc.blackboard.chase_until = tick + u64::from(grace_ticks);
        }
        return false;
    }
    if tick >= chase_until {
        if let Some(npc) = world.npcs.get_mut(id) {
            npc.blackboard.target_actor_id = None;
            npc.blackboard.chase_until = 0;
        }
        return true;
    }
    false
}

/// Rat behavior, outside the FSM: wander near home, flee non-rats at full
/// speed for a few seconds.
fn rat_decide(world: &mut World, id: &str, tick: u64, commands: &mut Vec<Command>) {
    let flee_ticks = u64::from(world.config().duration_to_ticks(RAT_FLEE_SECONDS));
    let threat = nearest_non_rat_within(world, id, RAT_FLEE_RADIUS);

    if let Some(threat_id) = threat {
        if let Some(npc) = world.npcs.get_mut(id) {
            npc.blackboard.target_actor_id = Some(threat_id);
            npc.blackboard.chase_until = tick + flee_ticks;
        }
    }

    let fleeing = world
        .npcs
        .get(id)
        .is_some_and(|n| n.blackboard.chase_until > tick && n.blackboard.target_actor_id.is_some());

    if fleeing {
        move_away(world, id, MoveTarget::TargetActor, tick, commands);
    } else {
        let needs_new_target = {
            let Some(npc) = world.npcs.get(id) else {
                return;
            };
            match npc.blackboard.wander_target {
                None => true,
                Some((wx, wy)) => {
                    let d = ((wx - npc.actor.x).powi(2) + (wy - npc.actor.y).powi(2)).sqrt();
                    d <= 12.0 || npc.blackboard.stuck_counter > 30
                }
            }
        };
        if needs_new_target {
            let home = world.npcs.get(id).map(|n| n.home);
            if let Some((hx, hy)) = home {
                let dest = world.rat_rng.next_point_near(hx, hy, RAT_WANDER_RADIUS);
                if let Some(npc) = world.npcs.get_mut(id) {
                    npc.blackboard.wander_target = Some(dest);
                    npc.blackboard.stuck_counter = 0;
                }
            }
        }
        // Wander at reduced speed.
        let Some((tx, ty)) = resolve_anchor(world, id, MoveTarget::WanderTarget) else {
            return;
        };
        let Some(npc) = world.npcs.get(id) else {
            return;
        };
        let dx = tx - npc.actor.x;
        let dy = ty - npc.actor.y;
        let dist = (dx * dx + dy * dy).sqrt();
        if dist >= 1.0 {
            commands.push(Command {
                actor_id: id.to_owned(),
                origin_tick: tick,
                issued_at: commands.len() as u64,
                payload: CommandPayload::Move {
                    dx: dx / dist * 0.6,
                    dy: dy / dist * 0.6,
                    facing: None,
                },
            });
        }
    }

    if let Some(npc) = world.npcs.get_mut(id) {
        npc.blackboard.next_decision_at = tick + 5;
    }
}
