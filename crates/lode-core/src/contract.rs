// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Effect contracts: the validated catalog of effect definitions.
//!
//! A contract pins everything the manager needs to run an effect type:
//! delivery, shape, motion, impact policy, lifetime, hook bindings,
//! replication policy, and end policy. Hooks are resolved to typed
//! [`HookId`] values at registration, so the hot path never consults a
//! string-keyed table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How an effect reaches its targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryKind {
    /// Spatial query against the world.
    Area,
    /// Anchored to a specific actor.
    Target,
    /// Cosmetic only; no gameplay consequences.
    Visual,
}

/// Geometry family used for the effect's extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    /// Circle around the effect position.
    Circle,
    /// Axis-aligned rectangle.
    #[default]
    Rect,
    /// Arc sector (evaluated as a capped capsule fan).
    Arc,
    /// Line segment.
    Segment,
    /// Segment swept by a radius.
    Capsule,
}

/// Per-tick motion model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionKind {
    /// No movement at all.
    None,
    /// Position fixed at spawn.
    Instant,
    /// Constant velocity, bounded by remaining range.
    Linear,
    /// Constant velocity with gravity applied to the Y component.
    Parabolic,
    /// Position copied from a followed actor.
    Follow,
}

/// Collision resolution policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImpactPolicy {
    /// Stop at the first intersecting non-owner actor.
    FirstHit,
    /// Hit every candidate each tick until lifetime expires.
    AllInPath,
    /// Accumulate hits; end when the hit set exceeds the pierce count.
    Pierce,
    /// No collision at all.
    None,
}

/// Built-in hook implementations, bound at contract registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HookId {
    /// Swing rectangle in front of the owner; damages and splatters.
    MeleeSpawn,
    /// Projectile advance/collide lifecycle.
    ProjectileLifecycle,
    /// Periodic damage applied to the attached actor.
    StatusBurningDamage,
    /// Follow-visual kept in sync with its source condition.
    StatusBurningVisual,
    /// One-shot persistent decal at the target position.
    VisualBloodSplatter,
}

/// Hook bindings for the four lifecycle moments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookSet {
    /// Runs once when the instance is created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_spawn: Option<HookId>,
    /// Runs every tick while the instance is alive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_tick: Option<HookId>,
    /// Runs for each impact candidate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_hit: Option<HookId>,
    /// Runs when the instance ends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_expire: Option<HookId>,
}

/// Which lifecycle envelopes replicate to clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationPolicy {
    /// Emit a spawn envelope.
    pub send_spawn: bool,
    /// Emit update envelopes when tracked fields change.
    pub send_updates: bool,
    /// Emit an end envelope.
    pub send_end: bool,
    /// The client owns teardown visuals; the journal still records ends.
    pub managed_by_client: bool,
    /// Update whitelist; empty means all tracked fields.
    #[serde(default)]
    pub update_fields: Vec<String>,
}

/// What terminates an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndKind {
    /// Lives until `lifetime_ticks` elapse.
    Duration,
    /// Ends the tick it resolves (melee swings, status ticks).
    Instant,
    /// Ends when an external condition (status effect) expires.
    Condition,
}

/// End policy: the terminating rule plus ownership flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndPolicy {
    /// Terminating rule.
    pub kind: EndKind,
    /// End with reason `ownerLost` when the owner actor disappears.
    pub on_owner_lost: bool,
}

/// A validated effect definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectDefinition {
    /// Unique type identifier (e.g. `fireball`).
    pub type_id: String,
    /// Delivery kind.
    pub delivery: DeliveryKind,
    /// Geometry family.
    pub shape: ShapeKind,
    /// Motion model.
    pub motion: MotionKind,
    /// Impact policy.
    pub impact: ImpactPolicy,
    /// Default lifetime in ticks.
    pub lifetime_ticks: u32,
    /// Hook bindings.
    pub hooks: HookSet,
    /// Replication policy.
    pub replication: ReplicationPolicy,
    /// End policy.
    pub end: EndPolicy,
}

/// Errors produced while registering a definition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContractError {
    /// The type id was empty.
    #[error("effect definition requires a non-empty type id")]
    EmptyTypeId,
    /// A definition with the same id is already registered.
    #[error("duplicate effect definition: {0}")]
    Duplicate(String),
    /// Duration-ended effects need a positive lifetime.
    #[error("effect {0}: duration end policy requires lifetime_ticks > 0")]
    InvalidLifetime(String),
    /// Client-managed definitions must not request server updates.
    #[error("effect {0}: managed_by_client excludes send_updates")]
    ClientManagedUpdates(String),
}

/// Validated catalog of effect definitions, keyed by type id.
#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    defs: BTreeMap<String, EffectDefinition>,
}

impl ContractRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry seeded with the built-in catalog.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for def in builtin_catalog() {
            // Catalog entries are validated by the registration tests.
            let _ = registry.register(def);
        }
        registry
    }

    /// Registers `def` after validation.
    ///
    /// # Errors
    /// Returns a [`ContractError`] when the definition is malformed or its
    /// id collides with an existing entry.
    pub fn register(&mut self, def: EffectDefinition) -> Result<(), ContractError> {
        if def.type_id.is_empty() {
            return Err(ContractError::EmptyTypeId);
        }
        if self.defs.contains_key(&def.type_id) {
            return Err(ContractError::Duplicate(def.type_id));
        }
        if def.end.kind == EndKind::Duration && def.lifetime_ticks == 0 {
            return Err(ContractError::InvalidLifetime(def.type_id));
        }
        if def.replication.managed_by_client && def.replication.send_updates {
            return Err(ContractError::ClientManagedUpdates(def.type_id));
        }
        self.defs.insert(def.type_id.clone(), def);
        Ok(())
    }

    /// Looks up a definition by type id.
    #[must_use]
    pub fn get(&self, type_id: &str) -> Option<&EffectDefinition> {
        self.defs.get(type_id)
    }

    /// Number of registered definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// True when no definitions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Iterates definitions in type-id order.
    pub fn iter(&self) -> impl Iterator<Item = &EffectDefinition> + '_ {
        self.defs.values()
    }
}

/// Melee swing type id.
pub const EFFECT_ATTACK: &str = "attack";
/// Projectile type id.
pub const EFFECT_FIREBALL: &str = "fireball";
/// Periodic burn damage carrier type id.
pub const EFFECT_BURNING_TICK: &str = "burning-tick";
/// Burn follow-visual type id.
pub const EFFECT_BURNING_VISUAL: &str = "burning-visual";
/// Blood decal type id.
pub const EFFECT_BLOOD_SPLATTER: &str = "blood-splatter";

fn builtin_catalog() -> Vec<EffectDefinition> {
    vec![
        EffectDefinition {
            type_id: EFFECT_ATTACK.to_owned(),
            delivery: DeliveryKind::Area,
            shape: ShapeKind::Rect,
            motion: MotionKind::Instant,
            impact: ImpactPolicy::AllInPath,
            lifetime_ticks: 3,
            hooks: HookSet {
                on_spawn: Some(HookId::MeleeSpawn),
                ..HookSet::default()
            },
            replication: ReplicationPolicy {
                send_spawn: true,
                send_updates: false,
                send_end: true,
                managed_by_client: false,
                update_fields: Vec::new(),
            },
            end: EndPolicy {
                kind: EndKind::Duration,
                on_owner_lost: false,
            },
        },
        EffectDefinition {
            type_id: EFFECT_FIREBALL.to_owned(),
            delivery: DeliveryKind::Area,
            shape: ShapeKind::Circle,
            motion: MotionKind::Linear,
            impact: ImpactPolicy::FirstHit,
            lifetime_ticks: 45,
            hooks: HookSet {
                on_spawn: Some(HookId::ProjectileLifecycle),
                on_tick: Some(HookId::ProjectileLifecycle),
                on_hit: Some(HookId::ProjectileLifecycle),
                ..HookSet::default()
            },
            replication: ReplicationPolicy {
                send_spawn: true,
                send_updates: true,
                send_end: true,
                managed_by_client: false,
                update_fields: vec!["pos".to_owned()],
            },
            end: EndPolicy {
                kind: EndKind::Duration,
                on_owner_lost: true,
            },
        },
        EffectDefinition {
            type_id: EFFECT_BURNING_TICK.to_owned(),
            delivery: DeliveryKind::Target,
            shape: ShapeKind::Rect,
            motion: MotionKind::Instant,
            impact: ImpactPolicy::None,
            lifetime_ticks: 1,
            hooks: HookSet {
                on_spawn: Some(HookId::StatusBurningDamage),
                ..HookSet::default()
            },
            replication: ReplicationPolicy {
                send_spawn: false,
                send_updates: false,
                send_end: false,
                managed_by_client: false,
                update_fields: Vec::new(),
            },
            end: EndPolicy {
                kind: EndKind::Instant,
                on_owner_lost: false,
            },
        },
        EffectDefinition {
            type_id: EFFECT_BURNING_VISUAL.to_owned(),
            delivery: DeliveryKind::Target,
            shape: ShapeKind::Rect,
            motion: MotionKind::Follow,
            impact: ImpactPolicy::None,
            lifetime_ticks: 45,
            hooks: HookSet {
                on_tick: Some(HookId::StatusBurningVisual),
                ..HookSet::default()
            },
            replication: ReplicationPolicy {
                send_spawn: true,
                send_updates: true,
                send_end: true,
                managed_by_client: false,
                update_fields: vec!["pos".to_owned(), "params".to_owned()],
            },
            end: EndPolicy {
                kind: EndKind::Condition,
                on_owner_lost: true,
            },
        },
        EffectDefinition {
            type_id: EFFECT_BLOOD_SPLATTER.to_owned(),
            delivery: DeliveryKind::Visual,
            shape: ShapeKind::Rect,
            motion: MotionKind::None,
            impact: ImpactPolicy::None,
            lifetime_ticks: 18,
            hooks: HookSet {
                on_spawn: Some(HookId::VisualBloodSplatter),
                ..HookSet::default()
            },
            replication: ReplicationPolicy {
                send_spawn: true,
                send_updates: false,
                send_end: true,
                managed_by_client: true,
                update_fields: Vec::new(),
            },
            end: EndPolicy {
                kind: EndKind::Duration,
                on_owner_lost: false,
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_registers_cleanly() {
        let mut registry = ContractRegistry::new();
        for def in builtin_catalog() {
            registry.register(def).expect("builtin catalog is valid");
        }
        assert_eq!(registry.len(), 5);
        assert!(registry.get(EFFECT_FIREBALL).is_some());
    }

    #[test]
    fn register_rejects_empty_id() {
        let mut registry = ContractRegistry::new();
        let mut def = builtin_catalog().remove(0);
        def.type_id = String::new();
        assert_eq!(registry.register(def), Err(ContractError::EmptyTypeId));
    }

    #[test]
    fn register_rejects_duplicates() {
        let mut registry = ContractRegistry::builtin();
        let def = builtin_catalog().remove(0);
        assert_eq!(
            registry.register(def),
            Err(ContractError::Duplicate(EFFECT_ATTACK.to_owned()))
        );
    }

    #[test]
    fn register_rejects_zero_lifetime_duration() {
        let mut registry = ContractRegistry::new();
        let mut def = builtin_catalog().remove(0);
        def.type_id = "broken".to_owned();
        def.lifetime_ticks = 0;
        assert_eq!(
            registry.register(def),
            Err(ContractError::InvalidLifetime("broken".to_owned()))
        );
    }

    #[test]
    fn register_rejects_client_managed_updates() {
        let mut registry = ContractRegistry::new();
        let mut def = builtin_catalog().remove(4);
        def.type_id = "broken-visual".to_owned();
        def.replication.send_updates = true;
        assert_eq!(
            registry.register(def),
            Err(ContractError::ClientManagedUpdates("broken-visual".to_owned()))
        );
    }
}
