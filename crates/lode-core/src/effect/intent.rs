// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Effect intents: the manager's input vocabulary.
//!
//! Every gameplay system that wants an effect builds an intent in world
//! units; the constructors quantize geometry and write integer params so
//! everything downstream is deterministic.

use crate::actor::{Actor, Facing};
use crate::contract::{
    EFFECT_ATTACK, EFFECT_BLOOD_SPLATTER, EFFECT_BURNING_TICK, EFFECT_BURNING_VISUAL,
    EFFECT_FIREBALL,
};
use crate::coord::{quantize_world, QVec};
use crate::effect::instance::{EffectGeometry, FollowMode, MotionState};
use crate::patch::ParamMap;

/// Melee swing reach in world units.
pub const MELEE_RANGE: f64 = 40.0;
/// Melee swing width in world units.
pub const MELEE_WIDTH: f64 = 30.0;
/// Melee health delta per hit (negative damages).
pub const MELEE_HEALTH_DELTA: i64 = -10;
/// Melee cooldown in ticks.
pub const MELEE_COOLDOWN_TICKS: u32 = 15;

/// Projectile template: the tunable half of a projectile intent.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectileTemplate {
    /// Contract type id.
    pub effect_type: String,
    /// Muzzle speed, world units per second.
    pub speed: f64,
    /// Collision radius, world units.
    pub radius: f64,
    /// Maximum travel, world units.
    pub range: f64,
    /// Health delta applied on hit (negative damages).
    pub health_delta: i64,
    /// Lifetime in ticks.
    pub lifetime_ticks: u32,
    /// Cooldown in ticks.
    pub cooldown_ticks: u32,
}

impl ProjectileTemplate {
    /// The standard fireball template.
    #[must_use]
    pub fn fireball() -> Self {
        Self {
            effect_type: EFFECT_FIREBALL.to_owned(),
            speed: 180.0,
            radius: 10.0,
            range: 240.0,
            health_delta: -25,
            lifetime_ticks: 45,
            cooldown_ticks: 30,
        }
    }
}

/// A request for the manager to create one effect instance.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectIntent {
    /// Contract type id.
    pub effect_type: String,
    /// Owning actor, by id.
    pub owner_actor_id: Option<String>,
    /// Followed actor, by id.
    pub follow_actor_id: Option<String>,
    /// Follow mode for the instance.
    pub follow: FollowMode,
    /// Quantized spawn geometry.
    pub geometry: EffectGeometry,
    /// Initial motion state.
    pub motion: MotionState,
    /// Integer params replicated to clients.
    pub params: ParamMap,
    /// Cosmetic tint hints.
    pub colors: Vec<String>,
    /// Lifetime in ticks, at least one.
    pub lifetime_ticks: u32,
}

fn facing_offsets(facing: Facing, reach: f64, width: f64) -> (f64, f64, f64, f64) {
    // (center_dx, center_dy, half_w, half_h) of a reach×width box in front.
    let (dx, dy) = facing.as_vec();
    if dy == 0.0 {
        (dx * reach / 2.0, 0.0, reach / 2.0, width / 2.0)
    } else {
        (0.0, dy * reach / 2.0, width / 2.0, reach / 2.0)
    }
}

impl EffectIntent {
    /// Melee swing in front of `owner`, anchored at its current facing.
    #[must_use]
    pub fn melee(owner: &Actor) -> Self {
        let (cdx, cdy, half_w, half_h) = facing_offsets(owner.facing, MELEE_RANGE, MELEE_WIDTH);
        let mut params = ParamMap::new();
        params.insert("healthDelta".to_owned(), MELEE_HEALTH_DELTA);
        params.insert("range".to_owned(), quantize_world(MELEE_RANGE));
        params.insert("width".to_owned(), quantize_world(MELEE_WIDTH));
        Self {
            effect_type: EFFECT_ATTACK.to_owned(),
            owner_actor_id: Some(owner.id.clone()),
            follow_actor_id: None,
            follow: FollowMode::None,
            geometry: EffectGeometry {
                x: quantize_world(owner.x + cdx),
                y: quantize_world(owner.y + cdy),
                half_w: quantize_world(half_w),
                half_h: quantize_world(half_h),
                ..EffectGeometry::default()
            },
            motion: MotionState::default(),
            params,
            colors: Vec::new(),
            lifetime_ticks: 3,
        }
    }

    /// Projectile launched from `owner` along its facing.
    #[must_use]
    pub fn projectile(owner: &Actor, template: &ProjectileTemplate, tick_rate: u32) -> Self {
        let (dx, dy) = owner.facing.as_vec();
        let per_tick = template.speed / f64::from(tick_rate.max(1));
        // Muzzle offset: spawn just outside the owner's body.
        let muzzle = 14.0;
        let mut params = ParamMap::new();
        params.insert("healthDelta".to_owned(), template.health_delta);
        params.insert("radius".to_owned(), quantize_world(template.radius));
        params.insert("speed".to_owned(), quantize_world(per_tick));
        params.insert("range".to_owned(), quantize_world(template.range));
        params.insert("dx".to_owned(), dx as i64);
        params.insert("dy".to_owned(), dy as i64);
        Self {
            effect_type: template.effect_type.clone(),
            owner_actor_id: Some(owner.id.clone()),
            follow_actor_id: None,
            follow: FollowMode::None,
            geometry: EffectGeometry {
                shape: crate::contract::ShapeKind::Circle,
                x: quantize_world(owner.x + dx * muzzle),
                y: quantize_world(owner.y + dy * muzzle),
                radius: quantize_world(template.radius),
                ..EffectGeometry::default()
            },
            motion: MotionState {
                vel: QVec::new(
                    quantize_world(dx * per_tick),
                    quantize_world(dy * per_tick),
                ),
                range_remaining: quantize_world(template.range),
                gravity: 0,
            },
            params,
            colors: Vec::new(),
            lifetime_ticks: template.lifetime_ticks.max(1),
        }
    }

    /// Follow-visual anchored to `target` for `lifetime_ticks`.
    #[must_use]
    pub fn status_visual(
        target: &Actor,
        source_id: Option<&str>,
        effect_type: &str,
        lifetime_ticks: u32,
    ) -> Self {
        let mut params = ParamMap::new();
        params.insert("remaining".to_owned(), i64::from(lifetime_ticks.max(1)));
        Self {
            effect_type: effect_type.to_owned(),
            owner_actor_id: source_id.map(str::to_owned),
            follow_actor_id: Some(target.id.clone()),
            follow: FollowMode::Target,
            geometry: EffectGeometry {
                x: quantize_world(target.x),
                y: quantize_world(target.y),
                half_w: quantize_world(12.0),
                half_h: quantize_world(12.0),
                ..EffectGeometry::default()
            },
            motion: MotionState::default(),
            params,
            colors: vec!["#ff6a00".to_owned()],
            lifetime_ticks: lifetime_ticks.max(1),
        }
    }

    /// One-tick burn damage carrier for `target`.
    ///
    /// `health_delta` is negative; it lands in `behaviorState.extra` via
    /// params so the damage hook resolves it without recomputation.
    #[must_use]
    pub fn burning_tick(target: &Actor, source_id: Option<&str>, health_delta: i64) -> Self {
        let mut params = ParamMap::new();
        params.insert("healthDelta".to_owned(), health_delta);
        Self {
            effect_type: EFFECT_BURNING_TICK.to_owned(),
            owner_actor_id: source_id.map(str::to_owned),
            follow_actor_id: Some(target.id.clone()),
            follow: FollowMode::Target,
            geometry: EffectGeometry {
                x: quantize_world(target.x),
                y: quantize_world(target.y),
                half_w: quantize_world(8.0),
                half_h: quantize_world(8.0),
                ..EffectGeometry::default()
            },
            motion: MotionState::default(),
            params,
            colors: Vec::new(),
            lifetime_ticks: 1,
        }
    }

    /// Client-managed blood decal centered on `target`.
    #[must_use]
    pub fn blood_splatter(source_id: Option<&str>, target: &Actor) -> Self {
        let mut params = ParamMap::new();
        params.insert("radius".to_owned(), quantize_world(9.0));
        Self {
            effect_type: EFFECT_BLOOD_SPLATTER.to_owned(),
            owner_actor_id: source_id.map(str::to_owned),
            follow_actor_id: None,
            follow: FollowMode::None,
            geometry: EffectGeometry {
                x: quantize_world(target.x),
                y: quantize_world(target.y),
                half_w: quantize_world(9.0),
                half_h: quantize_world(9.0),
                ..EffectGeometry::default()
            },
            motion: MotionState::default(),
            params,
            colors: vec!["#7a0e0e".to_owned()],
            lifetime_ticks: 18,
        }
    }

    /// The burning follow-visual for a condition lasting `lifetime_ticks`.
    #[must_use]
    pub fn burning_visual(target: &Actor, source_id: Option<&str>, lifetime_ticks: u32) -> Self {
        Self::status_visual(target, source_id, EFFECT_BURNING_VISUAL, lifetime_ticks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Inventory;

    fn actor_at(x: f64, y: f64, facing: Facing) -> Actor {
        let mut actor = Actor::new("a-1".to_owned(), x, y, 100, Inventory::with_capacity(4));
        actor.facing = facing;
        actor
    }

    #[test]
    fn melee_swing_sits_in_front_of_owner() {
        let owner = actor_at(100.0, 100.0, Facing::Right);
        let intent = EffectIntent::melee(&owner);
        assert!(intent.geometry.x > quantize_world(100.0));
        assert_eq!(intent.geometry.y, quantize_world(100.0));
        assert_eq!(intent.params["healthDelta"], MELEE_HEALTH_DELTA);
    }

    #[test]
    fn melee_swing_rotates_with_facing() {
        let owner = actor_at(100.0, 100.0, Facing::Up);
        let intent = EffectIntent::melee(&owner);
        assert!(intent.geometry.y < quantize_world(100.0));
        // Up/down swings are taller than wide.
        assert!(intent.geometry.half_h > intent.geometry.half_w);
    }

    #[test]
    fn projectile_velocity_matches_facing() {
        let owner = actor_at(0.0, 0.0, Facing::Left);
        let intent = EffectIntent::projectile(&owner, &ProjectileTemplate::fireball(), 15);
        assert!(intent.motion.vel.x < 0);
        assert_eq!(intent.motion.vel.y, 0);
        assert!(intent.motion.range_remaining > 0);
    }

    #[test]
    fn burning_tick_is_single_tick_and_negative() {
        let target = actor_at(0.0, 0.0, Facing::Down);
        let intent = EffectIntent::burning_tick(&target, Some("lava"), -2);
        assert_eq!(intent.lifetime_ticks, 1);
        assert_eq!(intent.params["healthDelta"], -2);
    }
}
