// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The effect system: intents in, instances out, hooks in between.
//!
//! Data flow per tick: queued [`intent::EffectIntent`]s become
//! [`instance::EffectInstance`]s, motion advances them, impact policies
//! resolve collisions, and end policies retire them. Every observable
//! transition is mirrored into the journal under the contract's
//! replication policy.

pub mod instance;
pub mod intent;

mod hooks;
mod manager;

pub use instance::{
    BehaviorState, DeliveryState, EffectGeometry, EffectInstance, EffectSnapshot, FollowMode,
    MotionState,
};
pub use intent::{EffectIntent, ProjectileTemplate};
