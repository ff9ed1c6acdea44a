// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! lode-core: deterministic world simulation engine and replication plane
//! for the mine-and-die server.
//!
//! One task owns a [`World`] through an [`Engine`] and steps it at a fixed
//! rate; everything observable — patches, effect-lifecycle events,
//! keyframes — flows out through the [`Journal`]. No I/O, no wall clock,
//! no global state: the clock is injected and all randomness derives from
//! the world seed through named streams.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::unreadable_literal,
    clippy::missing_const_for_fn,
    clippy::suboptimal_flops,
    clippy::redundant_pub_crate,
    clippy::many_single_char_names,
    clippy::module_name_repetitions,
    clippy::use_self,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::float_cmp
)]

/// Actor state: players, NPCs, blackboards.
pub mod actor;
/// AI library and executor.
pub mod ai;
/// Typed commands and the bounded queue.
pub mod command;
/// World configuration.
pub mod config;
/// Effect contracts and the validated registry.
pub mod contract;
/// Quantized coordinates and integer geometry.
pub mod coord;
/// The effect system.
pub mod effect;
/// The simulation engine.
pub mod engine;
/// Effect-lifecycle event shapes.
pub mod events;
/// Items, inventories, equipment, ground items.
pub mod item;
/// The journal and keyframe ring.
pub mod journal;
/// Tile navmesh and A*.
pub mod nav;
/// Replication patches.
pub mod patch;
/// Seeded determinism streams.
pub mod prng;
/// Snapshot and keyframe values.
pub mod snapshot;
/// The uniform spatial grid.
pub mod spatial;
/// The world model.
pub mod world;

pub use actor::{Actor, Blackboard, Facing, NpcState, PlayerState};
pub use command::{Command, CommandPayload, CommandQueue, ConsoleCmd, EnqueueError};
pub use config::{ConfigError, ResetRequest, WorldConfig};
pub use contract::{ContractRegistry, EffectDefinition};
pub use effect::{EffectInstance, EffectIntent, EffectSnapshot};
pub use engine::Engine;
pub use events::{EffectEndEvent, EffectEndReason, EffectEventBatch, EffectSpawnEvent, EffectUpdateEvent};
pub use item::{Equipment, GroundItem, Inventory, InventorySlot, ItemStack};
pub use journal::{Journal, ResyncHint};
pub use patch::Patch;
pub use snapshot::{Keyframe, TickSnapshot};
pub use world::{ConsoleOutcome, Obstacle, ObstacleKind, World};
