// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Built-in hook behaviors, dispatched by typed [`HookId`] values bound at
//! contract registration. No string lookups on the hot path.

use tracing::debug;

use crate::contract::HookId;
use crate::coord::quantize_world;
use crate::effect::intent::EffectIntent;
use crate::effect::manager::geometry_hits_actor;
use crate::journal::EffectUpdateFields;
use crate::world::{World, CONDITION_BURNING};

/// Runs a contract's `onSpawn` hook for a just-created instance.
pub(crate) fn dispatch_on_spawn(world: &mut World, effect_id: &str, hook: HookId) {
    match hook {
        HookId::MeleeSpawn => melee_spawn(world, effect_id),
        HookId::StatusBurningDamage => burning_damage(world, effect_id),
        HookId::VisualBloodSplatter => blood_splatter_spawn(world, effect_id),
        HookId::ProjectileLifecycle | HookId::StatusBurningVisual => {}
    }
}

/// Runs a contract's `onTick` hook for a live instance.
pub(crate) fn dispatch_on_tick(world: &mut World, effect_id: &str, hook: HookId) {
    match hook {
        HookId::StatusBurningVisual => burning_visual_sync(world, effect_id),
        HookId::MeleeSpawn
        | HookId::ProjectileLifecycle
        | HookId::StatusBurningDamage
        | HookId::VisualBloodSplatter => {}
    }
}

/// Runs a contract's `onHit` hook for one impact candidate.
pub(crate) fn dispatch_on_hit(world: &mut World, effect_id: &str, target_id: &str, hook: HookId) {
    match hook {
        HookId::ProjectileLifecycle => projectile_hit(world, effect_id, target_id),
        HookId::MeleeSpawn
        | HookId::StatusBurningDamage
        | HookId::StatusBurningVisual
        | HookId::VisualBloodSplatter => {}
    }
}

/// Runs a contract's `onExpire` hook. No built-in contract binds one yet;
/// the dispatch seam exists so new contracts can.
pub(crate) fn dispatch_on_expire(world: &mut World, effect_id: &str, hook: HookId) {
    let _ = (world, effect_id);
    match hook {
        HookId::MeleeSpawn
        | HookId::ProjectileLifecycle
        | HookId::StatusBurningDamage
        | HookId::StatusBurningVisual
        | HookId::VisualBloodSplatter => {}
    }
}

/// Swing rectangle in front of the owner: damage everyone inside and
/// splatter each victim.
fn melee_spawn(world: &mut World, effect_id: &str) {
    let Some(effect) = world.effect(effect_id) else {
        return;
    };
    let geometry = effect.delivery.geometry;
    let owner = effect.owner_actor_id.clone();
    let delta = effect
        .behavior
        .extra
        .get("healthDelta")
        .copied()
        .unwrap_or(0);
    let half = world.config().player_half_extent;

    let bodies: Vec<(String, f64, f64)> = world
        .players
        .values()
        .map(|p| (p.actor.id.clone(), p.actor.x, p.actor.y))
        .chain(
            world
                .npcs
                .values()
                .map(|n| (n.actor.id.clone(), n.actor.x, n.actor.y)),
        )
        .collect();
    let mut victims: Vec<String> = bodies
        .into_iter()
        .filter(|(id, x, y)| {
            Some(id.as_str()) != owner.as_deref() && geometry_hits_actor(&geometry, *x, *y, half)
        })
        .map(|(id, _, _)| id)
        .collect();
    victims.sort_unstable();

    for victim in victims {
        world.apply_health_delta(&victim, delta);
        if let Some(effect) = world.effects.get_mut(effect_id) {
            effect.behavior.accumulated_damage += delta.abs();
        }
        if let Some(target) = world.actor(&victim).cloned() {
            let intent = EffectIntent::blood_splatter(owner.as_deref(), &target);
            world.queue_intent(intent);
        }
    }
}

/// Projectile impact: damage the target and splatter it.
fn projectile_hit(world: &mut World, effect_id: &str, target_id: &str) {
    let Some(effect) = world.effect(effect_id) else {
        return;
    };
    let delta = effect
        .behavior
        .extra
        .get("healthDelta")
        .copied()
        .unwrap_or(0);
    let owner = effect.owner_actor_id.clone();
    world.apply_health_delta(target_id, delta);
    if let Some(effect) = world.effects.get_mut(effect_id) {
        effect.behavior.accumulated_damage += delta.abs();
    }
    if let Some(target) = world.actor(target_id).cloned() {
        let intent = EffectIntent::blood_splatter(owner.as_deref(), &target);
        world.queue_intent(intent);
    }
    debug!(effect = %effect_id, target = %target_id, delta, "projectile hit");
}

/// Periodic burn damage: apply the delta the condition computed, carried
/// in behavior extras. A carrier without one is malformed and does nothing.
fn burning_damage(world: &mut World, effect_id: &str) {
    let Some(effect) = world.effect(effect_id) else {
        return;
    };
    let Some(target) = effect.follow_actor_id.clone() else {
        return;
    };
    let Some(delta) = effect.behavior.extra.get("healthDelta").copied() else {
        return;
    };
    world.apply_health_delta(&target, delta);
    if let Some(effect) = world.effects.get_mut(effect_id) {
        effect.behavior.accumulated_damage += delta.abs();
    }
}

/// Keeps the burn visual's `remaining` parameter in sync with its source
/// condition.
fn burning_visual_sync(world: &mut World, effect_id: &str) {
    let Some(effect) = world.effect(effect_id) else {
        return;
    };
    let Some(target) = effect.follow_actor_id.clone() else {
        return;
    };
    let Some(condition) = world.condition(&target, CONDITION_BURNING) else {
        return;
    };
    if condition.attached_effect.as_deref() != Some(effect_id) {
        return;
    }
    let remaining = condition.expires_at.saturating_sub(world.tick()) as i64;
    let mut params = effect.params.clone();
    if params.get("remaining") == Some(&remaining) {
        return;
    }
    params.insert("remaining".to_owned(), remaining);
    if world.set_effect_params(effect_id, params.clone()) {
        world.stage_effect_update(effect_id, move |e| EffectUpdateFields {
            params: Some(params),
            ticks_remaining: Some(e.behavior.ticks_remaining),
            ..EffectUpdateFields::default()
        });
    }
}

/// Decal placement: jitter the splatter off-center with the
/// `effects.blood` stream so repeated hits do not stack pixel-perfectly.
fn blood_splatter_spawn(world: &mut World, effect_id: &str) {
    let jitter_x = world.blood_rng.next_int(-6, 6) as f64;
    let jitter_y = world.blood_rng.next_int(-6, 6) as f64;
    let Some(effect) = world.effects.get_mut(effect_id) else {
        return;
    };
    effect.delivery.geometry.x += quantize_world(jitter_x);
    effect.delivery.geometry.y += quantize_world(jitter_y);
}
