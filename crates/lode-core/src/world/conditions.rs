// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Status conditions on actors.
//!
//! A condition is owned by the world, keyed by `(actor_id, type)`. It fires
//! its periodic hook on a fixed cadence, keeps an optional follow-visual
//! effect alive, and expires at a pinned tick. Re-application refreshes the
//! expiry rather than stacking.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::effect::intent::EffectIntent;
use crate::events::EffectEndReason;
use crate::world::World;

/// Burning condition type tag.
pub const CONDITION_BURNING: &str = "burning";

/// Parameters for applying a condition.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionSpec {
    /// Condition type tag (e.g. `burning`).
    pub condition_type: String,
    /// Attribution id (an actor id or a world source like `lava`).
    pub source_id: Option<String>,
    /// Total duration in seconds; must be positive.
    pub duration_s: f64,
    /// Interval between periodic ticks in seconds.
    pub tick_interval_s: f64,
    /// Damage per second carried by periodic ticks.
    pub damage_per_second: i64,
}

impl ConditionSpec {
    /// The standard burning spec used by lava and fire effects.
    #[must_use]
    pub fn burning(source_id: Option<String>, duration_s: f64, damage_per_second: i64) -> Self {
        Self {
            condition_type: CONDITION_BURNING.to_owned(),
            source_id,
            duration_s,
            tick_interval_s: 0.2,
            damage_per_second,
        }
    }
}

/// Rejection reasons for [`World::apply_condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConditionError {
    /// Durations must be positive.
    #[error("condition duration must be positive")]
    NonPositiveDuration,
    /// The target actor does not exist.
    #[error("unknown_actor")]
    UnknownActor,
}

/// A live condition on one actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Condition type tag.
    pub condition_type: String,
    /// Attribution id.
    pub source_id: Option<String>,
    /// Tick the condition was applied.
    pub applied_at: u64,
    /// Tick the condition expires.
    pub expires_at: u64,
    /// Next periodic-tick firing.
    pub next_tick: u64,
    /// Last periodic-tick firing, 0 before the first.
    pub last_tick: u64,
    /// Interval between periodic ticks, in ticks.
    pub interval_ticks: u32,
    /// Damage per second, resolved to a per-firing delta by the hook.
    pub damage_per_second: i64,
    /// Follow-visual instance bound to this condition, when any.
    pub attached_effect: Option<String>,
}

impl World {
    /// Applies (or refreshes) a condition on an actor.
    ///
    /// # Errors
    /// [`ConditionError::NonPositiveDuration`] for `duration_s <= 0`;
    /// [`ConditionError::UnknownActor`] when the target is gone.
    pub fn apply_condition(
        &mut self,
        actor_id: &str,
        spec: &ConditionSpec,
    ) -> Result<(), ConditionError> {
        if spec.duration_s <= 0.0 {
            return Err(ConditionError::NonPositiveDuration);
        }
        if self.actor(actor_id).is_none() {
            return Err(ConditionError::UnknownActor);
        }
        let duration_ticks = self.config.duration_to_ticks(spec.duration_s);
        let interval_ticks = self.config.duration_to_ticks(spec.tick_interval_s);
        let tick = self.tick;
        let key = (actor_id.to_owned(), spec.condition_type.clone());

        if let Some(existing) = self.conditions.get_mut(&key) {
            // Refresh: push the expiry out, keep the cadence phase.
            existing.expires_at = tick + u64::from(duration_ticks);
            existing.source_id.clone_from(&spec.source_id);
            let attached = existing.attached_effect.clone();
            let expires_at = existing.expires_at;
            if let Some(effect_id) = attached {
                self.extend_effect_lifetime(&effect_id, expires_at);
            }
            return Ok(());
        }

        let condition = Condition {
            condition_type: spec.condition_type.clone(),
            source_id: spec.source_id.clone(),
            applied_at: tick,
            expires_at: tick + u64::from(duration_ticks),
            next_tick: tick + u64::from(interval_ticks),
            last_tick: 0,
            interval_ticks,
            damage_per_second: spec.damage_per_second,
            attached_effect: None,
        };
        self.conditions.insert(key.clone(), condition);

        // Burning carries a follow-visual for its whole lifetime.
        if spec.condition_type == CONDITION_BURNING {
            if let Some(actor) = self.actor(actor_id).cloned() {
                let intent = EffectIntent::burning_visual(
                    &actor,
                    spec.source_id.as_deref(),
                    duration_ticks,
                );
                if let Some(effect_id) = self.spawn_effect_now(intent) {
                    if let Some(cond) = self.conditions.get_mut(&key) {
                        cond.attached_effect = Some(effect_id);
                    }
                }
            }
        }
        Ok(())
    }

    /// True when the actor currently has the condition.
    #[must_use]
    pub fn has_condition(&self, actor_id: &str, condition_type: &str) -> bool {
        self.conditions
            .contains_key(&(actor_id.to_owned(), condition_type.to_owned()))
    }

    /// The condition on an actor, when present.
    #[must_use]
    pub fn condition(&self, actor_id: &str, condition_type: &str) -> Option<&Condition> {
        self.conditions
            .get(&(actor_id.to_owned(), condition_type.to_owned()))
    }

    /// Per-tick condition upkeep: fire periodic hooks, expire, and tear
    /// down attached visuals in the expiry tick.
    pub(crate) fn advance_conditions(&mut self) {
        let tick = self.tick;
        let keys: Vec<(String, String)> = self.conditions.keys().cloned().collect();
        for key in keys {
            let Some(cond) = self.conditions.get(&key).cloned() else {
                continue;
            };
            let (actor_id, _) = &key;

            // Owner loss tears the condition down without a final tick.
            if self.actor(actor_id).is_none() {
                if let Some(effect_id) = &cond.attached_effect {
                    self.end_effect(effect_id, EffectEndReason::OwnerLost);
                }
                self.conditions.remove(&key);
                continue;
            }

            // The periodic hook still fires in the expiry tick, so a
            // full-duration burn deals exactly dps × duration.
            if tick >= cond.next_tick && tick <= cond.expires_at {
                if cond.condition_type == CONDITION_BURNING {
                    let interval_s =
                        f64::from(cond.interval_ticks) * self.config.tick_duration();
                    let delta =
                        -((cond.damage_per_second as f64 * interval_s).round() as i64).max(1);
                    if let Some(actor) = self.actor(actor_id).cloned() {
                        let intent = EffectIntent::burning_tick(
                            &actor,
                            cond.source_id.as_deref(),
                            delta,
                        );
                        self.queue_intent(intent);
                    }
                }
                if let Some(live) = self.conditions.get_mut(&key) {
                    live.last_tick = tick;
                    live.next_tick = tick + u64::from(live.interval_ticks);
                }
            }

            if tick >= cond.expires_at {
                if let Some(effect_id) = &cond.attached_effect {
                    self.end_effect(effect_id, EffectEndReason::Expired);
                }
                self.conditions.remove(&key);
            }
        }
    }
}
