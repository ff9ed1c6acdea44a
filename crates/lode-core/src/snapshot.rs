// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Snapshot values handed across the simulation boundary.
//!
//! A [`TickSnapshot`] is the per-tick broadcast payload; a [`Keyframe`] is
//! the full world image stored in the journal's bounded ring and served on
//! explicit client request.

use serde::{Deserialize, Serialize};

use crate::actor::{NpcState, PlayerState};
use crate::config::WorldConfig;
use crate::effect::instance::EffectSnapshot;
use crate::events::EffectEventBatch;
use crate::item::GroundItem;
use crate::patch::Patch;
use crate::world::Obstacle;

/// The engine's per-tick output: live views plus the staged diffs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickSnapshot {
    /// Tick this snapshot describes.
    pub tick: u64,
    /// All connected players.
    pub players: Vec<PlayerState>,
    /// All live NPCs.
    pub npcs: Vec<NpcState>,
    /// All live effects, replicated view.
    pub effects: Vec<EffectSnapshot>,
    /// One-shot effect triggers for this tick (client-managed visuals).
    pub effect_triggers: Vec<EffectSnapshot>,
    /// All ground items.
    pub ground_items: Vec<GroundItem>,
    /// Patches staged during this tick.
    pub patches: Vec<Patch>,
    /// Lifecycle events staged during this tick.
    pub effect_events: EffectEventBatch,
}

/// Full world image at a tick, addressable by ring sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keyframe {
    /// Ring sequence, assigned by the journal.
    pub sequence: u64,
    /// Tick the frame captures.
    pub tick: u64,
    /// All connected players.
    pub players: Vec<PlayerState>,
    /// All live NPCs.
    pub npcs: Vec<NpcState>,
    /// Static obstacles.
    pub obstacles: Vec<Obstacle>,
    /// All ground items.
    pub ground_items: Vec<GroundItem>,
    /// World configuration echoed for rehydration.
    pub config: WorldConfig,
    /// Loop time the frame was recorded, milliseconds.
    #[serde(rename = "recordedAt")]
    pub recorded_at_ms: u64,
}
