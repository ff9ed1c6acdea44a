// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The effect manager: intent translation, motion, impact, and end policy.
//!
//! All geometry runs in quantized sub-units so impact ordering is
//! bit-stable. Instances are visited in id order everywhere; the only
//! randomness (decal jitter) draws from the `effects.blood` stream.

use tracing::debug;

use crate::contract::{EndKind, ImpactPolicy, MotionKind, ShapeKind};
use crate::coord::{
    capsule_rect, circle_rect, int_hypot, quantize_world, rect_rect, QCapsule, QCircle, QPoint,
    QRect, QSegment,
};
use crate::effect::hooks;
use crate::effect::instance::{
    BehaviorState, DeliveryState, EffectGeometry, EffectInstance, FollowMode,
};
use crate::effect::intent::EffectIntent;
use crate::events::EffectEndReason;
use crate::journal::EffectUpdateFields;
use crate::spatial::Aabb;
use crate::world::World;

impl World {
    /// Queues an intent for the next spawn pass.
    pub fn queue_intent(&mut self, intent: EffectIntent) {
        self.intents.push(intent);
    }

    /// Drains queued intents into live instances.
    pub(crate) fn spawn_pending_intents(&mut self) {
        let intents = std::mem::take(&mut self.intents);
        for intent in intents {
            let _ = self.spawn_effect_now(intent);
        }
    }

    /// Spawns an instance immediately. Returns its id, or `None` when the
    /// contract is unknown or the spatial index rejected the spawn.
    pub(crate) fn spawn_effect_now(&mut self, intent: EffectIntent) -> Option<String> {
        let Some(def) = self.registry.get(&intent.effect_type).cloned() else {
            debug!(effect_type = %intent.effect_type, "intent for unknown contract dropped");
            return None;
        };
        let (id, entry_id) = self.alloc_effect_id();
        let tick = self.tick;
        let lifetime = u32::max(intent.lifetime_ticks, 1);

        let mut behavior = BehaviorState {
            ticks_remaining: lifetime,
            ..BehaviorState::default()
        };
        // Hooks resolve damage deltas from behavior extras.
        if let Some(delta) = intent.params.get("healthDelta") {
            behavior.extra.insert("healthDelta".to_owned(), *delta);
        }

        let instance = EffectInstance {
            id: id.clone(),
            entry_id,
            definition_id: def.type_id.clone(),
            start_tick: tick,
            expires_at: tick + u64::from(lifetime),
            delivery: DeliveryState {
                geometry: intent.geometry,
                motion: intent.motion,
                attached_actor_id: intent.follow_actor_id.clone(),
                follow: intent.follow,
            },
            behavior,
            params: intent.params,
            colors: intent.colors,
            owner_actor_id: intent.owner_actor_id,
            follow_actor_id: intent.follow_actor_id,
            replication: def.replication.clone(),
            end: def.end,
            hit_actors: std::collections::BTreeSet::new(),
            pierce_count: 3,
        };

        if !self.spatial.upsert(&id, effect_aabb(&instance.delivery.geometry)) {
            // Cell saturated: surface the failed spawn and retire the id.
            debug!(effect = %id, effect_type = %def.type_id, "spatial index rejected spawn");
            if def.replication.send_spawn {
                self.journal.record_effect_spawn(tick, instance.snapshot());
                if def.replication.send_end {
                    let _ = self
                        .journal
                        .record_effect_end(tick, &id, EffectEndReason::Cancelled);
                }
            }
            return None;
        }

        self.effects.insert(id.clone(), instance);

        // Spawn hooks run before the spawn event is journaled so the
        // replicated snapshot reflects post-hook state (e.g. decal jitter).
        if let Some(hook) = def.hooks.on_spawn {
            hooks::dispatch_on_spawn(self, &id, hook);
        }
        if let Some(instance) = self.effects.get(&id) {
            let snapshot = instance.snapshot();
            if def.replication.send_spawn {
                self.journal.record_effect_spawn(tick, snapshot.clone());
            }
            if def.replication.managed_by_client {
                self.effect_triggers.push(snapshot);
            }
        }
        Some(id)
    }

    /// Ends effects whose lifetime elapsed as of this tick.
    pub(crate) fn prune_expired_effects(&mut self) {
        let tick = self.tick;
        let expired: Vec<String> = self
            .effects
            .values()
            .filter(|e| e.expires_at <= tick)
            .map(|e| e.id.clone())
            .collect();
        for id in expired {
            self.end_effect(&id, EffectEndReason::Expired);
        }
    }

    /// Advances motion and follow positions for every live effect.
    pub(crate) fn advance_effect_motion(&mut self) {
        let ids: Vec<String> = self.effects.keys().cloned().collect();
        for id in ids {
            let Some(effect) = self.effects.get(&id) else {
                continue;
            };
            let Some(def) = self.registry.get(&effect.definition_id) else {
                continue;
            };
            let motion = def.motion;
            let on_tick = def.hooks.on_tick;
            match motion {
                MotionKind::None | MotionKind::Instant => {}
                MotionKind::Linear | MotionKind::Parabolic => {
                    self.advance_ballistic(&id, motion == MotionKind::Parabolic);
                }
                MotionKind::Follow => {
                    self.advance_follow(&id);
                }
            }
            if let Some(hook) = on_tick {
                hooks::dispatch_on_tick(self, &id, hook);
            }
            if let Some(effect) = self.effects.get_mut(&id) {
                effect.behavior.ticks_remaining = effect.behavior.ticks_remaining.saturating_sub(1);
            }
        }
    }

    fn advance_ballistic(&mut self, id: &str, parabolic: bool) {
        let Some(effect) = self.effects.get_mut(id) else {
            return;
        };
        if parabolic {
            // Gravity pulls the y velocity every tick.
            effect.delivery.motion.vel.y += effect.delivery.motion.gravity;
        }
        let vel = effect.delivery.motion.vel;
        let step = int_hypot(vel.x, vel.y);
        let next_x = effect.delivery.geometry.x + vel.x;
        let next_y = effect.delivery.geometry.y + vel.y;
        let range_exhausted = {
            let m = &mut effect.delivery.motion;
            if m.range_remaining > 0 {
                m.range_remaining -= step;
            }
            m.range_remaining <= 0 && !parabolic
        };
        let moved = self.set_effect_pos(id, next_x, next_y);
        if moved {
            self.stage_effect_update(id, |e| EffectUpdateFields {
                x: Some(e.delivery.geometry.x),
                y: Some(e.delivery.geometry.y),
                ..EffectUpdateFields::default()
            });
            let aabb = self
                .effects
                .get(id)
                .map(|e| effect_aabb(&e.delivery.geometry));
            if let Some(aabb) = aabb {
                if !self.spatial.upsert(id, aabb) {
                    debug!(effect = %id, "spatial index rejected move; keeping stale cells");
                }
            }
        }
        if range_exhausted {
            self.pending_effect_ends
                .push((id.to_owned(), EffectEndReason::Expired));
        }
    }

    fn advance_follow(&mut self, id: &str) {
        let Some(effect) = self.effects.get(id) else {
            return;
        };
        let followed = match effect.delivery.follow {
            FollowMode::Owner => effect.owner_actor_id.clone(),
            FollowMode::Target => effect.follow_actor_id.clone(),
            FollowMode::None => None,
        };
        let Some(actor_id) = followed else {
            return;
        };
        match self.actor(&actor_id) {
            Some(actor) => {
                let x = quantize_world(actor.x);
                let y = quantize_world(actor.y);
                if self.set_effect_pos(id, x, y) {
                    self.stage_effect_update(id, |e| EffectUpdateFields {
                        x: Some(e.delivery.geometry.x),
                        y: Some(e.delivery.geometry.y),
                        ..EffectUpdateFields::default()
                    });
                    let aabb = self
                        .effects
                        .get(id)
                        .map(|e| effect_aabb(&e.delivery.geometry));
                    if let Some(aabb) = aabb {
                        let _ = self.spatial.upsert(id, aabb);
                    }
                }
            }
            None => {
                if self.effects.get(id).is_some_and(|e| e.end.on_owner_lost) {
                    self.pending_effect_ends
                        .push((id.to_owned(), EffectEndReason::OwnerLost));
                }
            }
        }
    }

    /// Resolves impact per policy and dispatches `on_hit` hooks.
    pub(crate) fn resolve_effect_impacts(&mut self) {
        let ids: Vec<String> = self.effects.keys().cloned().collect();
        for id in ids {
            let Some(effect) = self.effects.get(&id) else {
                continue;
            };
            let Some(def) = self.registry.get(&effect.definition_id) else {
                continue;
            };
            let impact = def.impact;
            let on_hit = def.hooks.on_hit;
            if impact == ImpactPolicy::None {
                continue;
            }
            let owner = effect.owner_actor_id.clone();
            let geometry = effect.delivery.geometry;
            let already_hit = effect.hit_actors.clone();
            let pierce_count = effect.pierce_count;

            let half = self.config.player_half_extent;
            let mut candidates: Vec<String> = Vec::new();
            for (actor_id, actor) in self
                .players
                .iter()
                .map(|(k, v)| (k, &v.actor))
                .chain(self.npcs.iter().map(|(k, v)| (k, &v.actor)))
            {
                if Some(actor_id.as_str()) == owner.as_deref() {
                    continue;
                }
                if geometry_hits_actor(&geometry, actor.x, actor.y, half) {
                    candidates.push(actor_id.clone());
                }
            }
            candidates.sort_unstable();

            match impact {
                ImpactPolicy::None => {}
                ImpactPolicy::FirstHit => {
                    if let Some(target) = candidates.first() {
                        if let Some(hook) = on_hit {
                            hooks::dispatch_on_hit(self, &id, target, hook);
                        }
                        self.pending_effect_ends
                            .push((id.clone(), EffectEndReason::Cancelled));
                    }
                }
                ImpactPolicy::AllInPath => {
                    for target in &candidates {
                        if let Some(hook) = on_hit {
                            hooks::dispatch_on_hit(self, &id, target, hook);
                        }
                    }
                }
                ImpactPolicy::Pierce => {
                    for target in &candidates {
                        if already_hit.contains(target) {
                            continue;
                        }
                        if let Some(hook) = on_hit {
                            hooks::dispatch_on_hit(self, &id, target, hook);
                        }
                        if let Some(effect) = self.effects.get_mut(&id) {
                            effect.hit_actors.insert(target.clone());
                            if effect.hit_actors.len() > pierce_count as usize {
                                self.pending_effect_ends
                                    .push((id.clone(), EffectEndReason::Cancelled));
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Applies pending ends and retires instant-ended instances.
    pub(crate) fn evaluate_effect_ends(&mut self) {
        let instants: Vec<String> = self
            .effects
            .values()
            .filter(|e| e.end.kind == EndKind::Instant)
            .map(|e| e.id.clone())
            .collect();
        for id in instants {
            self.end_effect(&id, EffectEndReason::Expired);
        }
        let pending = std::mem::take(&mut self.pending_effect_ends);
        for (id, reason) in pending {
            self.end_effect(&id, reason);
        }
    }

    /// Removes an instance, dispatching `on_expire` and journaling the end
    /// per the replication policy. No-op when the id is already gone.
    pub(crate) fn end_effect(&mut self, id: &str, reason: EffectEndReason) {
        let Some(effect) = self.effects.get(id) else {
            return;
        };
        let def = self.registry.get(&effect.definition_id).cloned();
        if let Some(def) = &def {
            if let Some(hook) = def.hooks.on_expire {
                hooks::dispatch_on_expire(self, id, hook);
            }
        }
        let Some(effect) = self.effects.remove(id) else {
            return;
        };
        self.spatial.remove(id);
        let send_end = def.is_some_and(|d| d.replication.send_end);
        if send_end && effect.replication.send_spawn {
            let _ = self.journal.record_effect_end(self.tick, id, reason);
        }
    }

    /// Pushes an effect's duration out to at least `expires_at` (condition
    /// refresh keeps its visual alive).
    pub(crate) fn extend_effect_lifetime(&mut self, id: &str, expires_at: u64) {
        let tick = self.tick;
        if let Some(effect) = self.effects.get_mut(id) {
            if expires_at > effect.expires_at {
                effect.expires_at = expires_at;
                effect.behavior.ticks_remaining = (expires_at - tick) as u32;
            }
        }
    }

    /// Stages a journal update for tracked-field changes, honoring the
    /// replication policy and its whitelist.
    pub(crate) fn stage_effect_update(
        &mut self,
        id: &str,
        fields: impl FnOnce(&EffectInstance) -> EffectUpdateFields,
    ) {
        let Some(effect) = self.effects.get(id) else {
            return;
        };
        if !effect.replication.send_updates {
            return;
        }
        let mut update = fields(effect);
        let whitelist = &effect.replication.update_fields;
        if !whitelist.is_empty() {
            if !whitelist.iter().any(|f| f == "pos") {
                update.x = None;
                update.y = None;
            }
            if !whitelist.iter().any(|f| f == "params") {
                update.params = None;
                update.ticks_remaining = None;
            }
        }
        if update.is_empty() {
            return;
        }
        let tick = self.tick;
        let _ = self.journal.record_effect_update(tick, id, update);
    }
}

/// World-unit AABB for a quantized effect geometry.
pub(crate) fn effect_aabb(geometry: &EffectGeometry) -> Aabb {
    let to_world = crate::coord::dequantize_world;
    let (cx, cy) = (to_world(geometry.x), to_world(geometry.y));
    let (half_w, half_h) = match geometry.shape {
        ShapeKind::Circle => (to_world(geometry.radius), to_world(geometry.radius)),
        ShapeKind::Rect => (to_world(geometry.half_w), to_world(geometry.half_h)),
        ShapeKind::Arc | ShapeKind::Segment | ShapeKind::Capsule => {
            let ex = to_world(geometry.x2) - cx;
            let ey = to_world(geometry.y2) - cy;
            let r = to_world(geometry.radius);
            (ex.abs() + r, ey.abs() + r)
        }
    };
    Aabb::from_center(cx, cy, half_w.max(1.0), half_h.max(1.0))
}

/// Shape-aware intersection between an effect and an actor's body square.
pub(crate) fn geometry_hits_actor(
    geometry: &EffectGeometry,
    actor_x: f64,
    actor_y: f64,
    half_extent: f64,
) -> bool {
    let actor_rect = QRect::from_center(
        QPoint::new(quantize_world(actor_x), quantize_world(actor_y)),
        quantize_world(half_extent),
        quantize_world(half_extent),
    );
    match geometry.shape {
        ShapeKind::Circle => circle_rect(
            &QCircle {
                center: geometry.center(),
                radius: geometry.radius,
            },
            &actor_rect,
        ),
        ShapeKind::Rect => rect_rect(
            &QRect::from_center(geometry.center(), geometry.half_w, geometry.half_h),
            &actor_rect,
        ),
        ShapeKind::Arc | ShapeKind::Segment | ShapeKind::Capsule => capsule_rect(
            &QCapsule {
                segment: QSegment {
                    a: geometry.center(),
                    b: QPoint::new(geometry.x2, geometry.y2),
                },
                radius: geometry.radius,
            },
            &actor_rect,
        ),
    }
}
