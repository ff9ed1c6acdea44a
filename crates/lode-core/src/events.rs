// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Effect-lifecycle events.
//!
//! Every spawned effect id yields exactly one spawn event and at most one
//! end event per incarnation; sequence numbers are strictly monotonic per
//! id, starting at 1 on spawn. The journal enforces these invariants; this
//! module only defines the shapes.

use serde::{Deserialize, Serialize};

use crate::effect::instance::{digest_str, EffectSnapshot};
use crate::patch::ParamMap;

/// Why an effect instance ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EffectEndReason {
    /// Lifetime elapsed.
    Expired,
    /// The owner or followed actor disappeared.
    OwnerLost,
    /// Terminated by impact or spawn rejection.
    Cancelled,
    /// The world was reset under the instance.
    MapChange,
}

impl EffectEndReason {
    fn code(self) -> u8 {
        match self {
            Self::Expired => 1,
            Self::OwnerLost => 2,
            Self::Cancelled => 3,
            Self::MapChange => 4,
        }
    }
}

/// An effect entered the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectSpawnEvent {
    /// Tick of the spawn.
    pub tick: u64,
    /// Per-id sequence number; always 1 for a spawn.
    pub seq: u64,
    /// Replicated view of the new instance.
    pub instance: EffectSnapshot,
}

/// Tracked fields of a live effect changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectUpdateEvent {
    /// Tick of the change.
    pub tick: u64,
    /// Per-id sequence number.
    pub seq: u64,
    /// Instance id.
    pub id: String,
    /// New quantized x, when the position changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i64>,
    /// New quantized y, when the position changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<i64>,
    /// New parameter map, when parameters changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<ParamMap>,
    /// New remaining-ticks counter, when behavior state changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticks_remaining: Option<u32>,
}

/// An effect left the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectEndEvent {
    /// Tick of the end.
    pub tick: u64,
    /// Per-id sequence number.
    pub seq: u64,
    /// Instance id.
    pub id: String,
    /// Why the instance ended.
    pub reason: EffectEndReason,
}

/// One tick's worth of staged lifecycle events.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EffectEventBatch {
    /// Spawns, in append order.
    pub spawns: Vec<EffectSpawnEvent>,
    /// Updates, in append order.
    pub updates: Vec<EffectUpdateEvent>,
    /// Ends, in append order.
    pub ends: Vec<EffectEndEvent>,
}

impl EffectEventBatch {
    /// Total staged events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.spawns.len() + self.updates.len() + self.ends.len()
    }

    /// True when nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Folds the batch into a canonical digest stream.
    pub fn digest_into(&self, h: &mut blake3::Hasher) {
        h.update(&(self.spawns.len() as u64).to_le_bytes());
        for spawn in &self.spawns {
            h.update(&spawn.tick.to_le_bytes());
            h.update(&spawn.seq.to_le_bytes());
            spawn.instance.digest_into(h);
        }
        h.update(&(self.updates.len() as u64).to_le_bytes());
        for update in &self.updates {
            h.update(&update.tick.to_le_bytes());
            h.update(&update.seq.to_le_bytes());
            digest_str(h, &update.id);
            digest_opt_i64(h, update.x);
            digest_opt_i64(h, update.y);
            match &update.params {
                Some(params) => {
                    h.update(&[1u8]);
                    h.update(&(params.len() as u64).to_le_bytes());
                    for (key, value) in params {
                        digest_str(h, key);
                        h.update(&value.to_le_bytes());
                    }
                }
                None => {
                    h.update(&[0u8]);
                }
            }
            digest_opt_i64(h, update.ticks_remaining.map(i64::from));
        }
        h.update(&(self.ends.len() as u64).to_le_bytes());
        for end in &self.ends {
            h.update(&end.tick.to_le_bytes());
            h.update(&end.seq.to_le_bytes());
            digest_str(h, &end.id);
            h.update(&[end.reason.code()]);
        }
    }
}

fn digest_opt_i64(h: &mut blake3::Hasher, v: Option<i64>) {
    match v {
        Some(v) => {
            h.update(&[1u8]);
            h.update(&v.to_le_bytes());
        }
        None => {
            h.update(&[0u8]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_reason_wire_names_are_camel_case() {
        assert_eq!(
            serde_json::to_string(&EffectEndReason::OwnerLost).unwrap(),
            "\"ownerLost\""
        );
        assert_eq!(
            serde_json::to_string(&EffectEndReason::MapChange).unwrap(),
            "\"mapChange\""
        );
    }

    #[test]
    fn batch_digest_covers_all_sections() {
        let mut batch = EffectEventBatch::default();
        let mut h0 = blake3::Hasher::new();
        batch.digest_into(&mut h0);
        batch.ends.push(EffectEndEvent {
            tick: 3,
            seq: 2,
            id: "effect-1".to_owned(),
            reason: EffectEndReason::Expired,
        });
        let mut h1 = blake3::Hasher::new();
        batch.digest_into(&mut h1);
        assert_ne!(h0.finalize(), h1.finalize());
    }
}
