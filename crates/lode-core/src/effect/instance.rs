// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Live effect instances and their replicated snapshot view.
//!
//! Instances hold non-owning actor references by id only; ownership loss is
//! detected by lookup failure during motion, never by back-pointers.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::contract::{EndPolicy, ReplicationPolicy, ShapeKind};
use crate::coord::{QPoint, QVec};
use crate::patch::ParamMap;

/// Who an effect's position tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowMode {
    /// Fixed in the world.
    #[default]
    None,
    /// Tracks the owning actor.
    Owner,
    /// Tracks the targeted actor.
    Target,
}

/// Quantized geometry of an instance. The center always applies; the other
/// fields are meaningful per shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EffectGeometry {
    /// Geometry family.
    pub shape: ShapeKind,
    /// Center x, sub-units.
    pub x: i64,
    /// Center y, sub-units.
    pub y: i64,
    /// Rect half-width, sub-units.
    pub half_w: i64,
    /// Rect half-height, sub-units.
    pub half_h: i64,
    /// Circle/capsule radius, sub-units.
    pub radius: i64,
    /// Segment/capsule endpoint x, sub-units.
    pub x2: i64,
    /// Segment/capsule endpoint y, sub-units.
    pub y2: i64,
}

impl EffectGeometry {
    /// Center as a quantized point.
    #[must_use]
    pub fn center(&self) -> QPoint {
        QPoint::new(self.x, self.y)
    }
}

/// Per-tick motion bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MotionState {
    /// Velocity, sub-units per tick.
    pub vel: QVec,
    /// Remaining travel range, sub-units. Linear motion ends at zero.
    pub range_remaining: i64,
    /// Per-tick gravity added to the y velocity (parabolic motion).
    pub gravity: i64,
}

/// Delivery-side state: where the effect is and what it tracks.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeliveryState {
    /// Quantized geometry.
    pub geometry: EffectGeometry,
    /// Motion bookkeeping.
    pub motion: MotionState,
    /// Actor this effect is anchored to, when any.
    pub attached_actor_id: Option<String>,
    /// Follow mode.
    pub follow: FollowMode,
}

/// Behavior-side state mutated by hooks.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BehaviorState {
    /// Ticks until expiry, mirrored from the end policy.
    pub ticks_remaining: u32,
    /// Hook-defined cooldown counter.
    pub cooldown_ticks: u32,
    /// Total damage dealt through this instance.
    pub accumulated_damage: i64,
    /// Stack count for stacking statuses.
    pub stacks: u32,
    /// Hook-defined extras (e.g. `healthDelta` for burn carriers).
    pub extra: ParamMap,
}

/// A live effect instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectInstance {
    /// Unique instance id (`effect-N`).
    pub id: String,
    /// Monotonic allocation counter, unique per world run.
    pub entry_id: u64,
    /// Contract type id.
    pub definition_id: String,
    /// Tick the instance spawned.
    pub start_tick: u64,
    /// Tick at which the duration end policy fires.
    pub expires_at: u64,
    /// Delivery-side state.
    pub delivery: DeliveryState,
    /// Behavior-side state.
    pub behavior: BehaviorState,
    /// Integer parameters replicated to clients.
    pub params: ParamMap,
    /// Cosmetic tint hints.
    pub colors: Vec<String>,
    /// Owning actor, by id.
    pub owner_actor_id: Option<String>,
    /// Followed actor, by id (targets for target/visual deliveries).
    pub follow_actor_id: Option<String>,
    /// Replication policy copied from the contract.
    pub replication: ReplicationPolicy,
    /// End policy copied from the contract.
    pub end: EndPolicy,
    /// Actors already hit (pierce bookkeeping).
    pub hit_actors: BTreeSet<String>,
    /// Pierce bound; the instance ends when `hit_actors` exceeds it.
    pub pierce_count: u32,
}

impl EffectInstance {
    /// The replicated snapshot view of this instance.
    #[must_use]
    pub fn snapshot(&self) -> EffectSnapshot {
        EffectSnapshot {
            id: self.id.clone(),
            effect_type: self.definition_id.clone(),
            x: self.delivery.geometry.x,
            y: self.delivery.geometry.y,
            params: self.params.clone(),
            colors: self.colors.clone(),
            owner: self.owner_actor_id.clone(),
            follows: self.follow_actor_id.clone(),
        }
    }
}

/// Replicated view of an effect, carried by spawn events and snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectSnapshot {
    /// Instance id.
    pub id: String,
    /// Contract type id.
    #[serde(rename = "type")]
    pub effect_type: String,
    /// Quantized center x.
    pub x: i64,
    /// Quantized center y.
    pub y: i64,
    /// Integer parameters.
    pub params: ParamMap,
    /// Cosmetic tint hints.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub colors: Vec<String>,
    /// Owning actor id, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Followed actor id, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follows: Option<String>,
}

impl EffectSnapshot {
    /// Folds the snapshot into a canonical digest stream.
    pub fn digest_into(&self, h: &mut blake3::Hasher) {
        digest_str(h, &self.id);
        digest_str(h, &self.effect_type);
        h.update(&self.x.to_le_bytes());
        h.update(&self.y.to_le_bytes());
        h.update(&(self.params.len() as u64).to_le_bytes());
        for (key, value) in &self.params {
            digest_str(h, key);
            h.update(&value.to_le_bytes());
        }
        h.update(&(self.colors.len() as u64).to_le_bytes());
        for color in &self.colors {
            digest_str(h, color);
        }
        digest_opt_str(h, self.owner.as_deref());
        digest_opt_str(h, self.follows.as_deref());
    }
}

pub(crate) fn digest_str(h: &mut blake3::Hasher, s: &str) {
    h.update(&(s.len() as u64).to_le_bytes());
    h.update(s.as_bytes());
}

pub(crate) fn digest_opt_str(h: &mut blake3::Hasher, s: Option<&str>) {
    match s {
        Some(s) => {
            h.update(&[1u8]);
            digest_str(h, s);
        }
        None => {
            h.update(&[0u8]);
        }
    }
}
