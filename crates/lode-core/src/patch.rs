// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Typed replication patches.
//!
//! A patch is a per-entity field diff, emitted by the world's write
//! barriers only when the underlying value actually changed. Payloads are
//! strongly shaped per kind; clients apply them over their last snapshot.
//!
//! Digest encoding is explicit little-endian with length prefixes so the
//! determinism harness hashes identical bytes on every platform.

use blake3::Hasher;
use serde::{Deserialize, Serialize};

use crate::actor::Facing;
use crate::item::{EquipSlot, InventorySlot, ItemStack};

/// Replicated effect parameter map, deterministic iteration order.
pub type ParamMap = std::collections::BTreeMap<String, i64>;

/// A typed diff that mutates a single entity field on the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Patch {
    /// Player moved; quantized sub-unit coordinates.
    PlayerPos {
        /// Player id.
        id: String,
        /// Quantized x.
        x: i64,
        /// Quantized y.
        y: i64,
    },
    /// Player facing changed.
    PlayerFacing {
        /// Player id.
        id: String,
        /// New facing.
        facing: Facing,
    },
    /// Player movement intent changed.
    PlayerIntent {
        /// Player id.
        id: String,
        /// Intent x, normalized.
        dx: f64,
        /// Intent y, normalized.
        dy: f64,
    },
    /// Player health changed.
    PlayerHealth {
        /// Player id.
        id: String,
        /// Hit points.
        health: i64,
        /// Maximum hit points.
        max_health: i64,
    },
    /// Player inventory replaced.
    PlayerInventory {
        /// Player id.
        id: String,
        /// Full new slot list.
        slots: Vec<InventorySlot>,
    },
    /// Player equipment replaced.
    PlayerEquipment {
        /// Player id.
        id: String,
        /// Full new `(slot, stack)` list.
        entries: Vec<(EquipSlot, ItemStack)>,
    },
    /// Player left the world. Always last for a given entity in a batch.
    PlayerRemoved {
        /// Player id.
        id: String,
    },
    /// NPC moved; quantized sub-unit coordinates.
    NpcPos {
        /// NPC id.
        id: String,
        /// Quantized x.
        x: i64,
        /// Quantized y.
        y: i64,
    },
    /// NPC facing changed.
    NpcFacing {
        /// NPC id.
        id: String,
        /// New facing.
        facing: Facing,
    },
    /// NPC health changed.
    NpcHealth {
        /// NPC id.
        id: String,
        /// Hit points.
        health: i64,
        /// Maximum hit points.
        max_health: i64,
    },
    /// NPC inventory replaced.
    NpcInventory {
        /// NPC id.
        id: String,
        /// Full new slot list.
        slots: Vec<InventorySlot>,
    },
    /// NPC equipment replaced.
    NpcEquipment {
        /// NPC id.
        id: String,
        /// Full new `(slot, stack)` list.
        entries: Vec<(EquipSlot, ItemStack)>,
    },
    /// Effect moved; quantized sub-unit coordinates.
    EffectPos {
        /// Effect id.
        id: String,
        /// Quantized x.
        x: i64,
        /// Quantized y.
        y: i64,
    },
    /// Effect parameters changed.
    EffectParams {
        /// Effect id.
        id: String,
        /// Full new parameter map.
        params: ParamMap,
    },
    /// Ground item moved; quantized sub-unit coordinates.
    GroundItemPos {
        /// Ground item id.
        id: String,
        /// Quantized x.
        x: i64,
        /// Quantized y.
        y: i64,
    },
    /// Ground item quantity changed. Zero means removed.
    GroundItemQty {
        /// Ground item id.
        id: String,
        /// New quantity.
        qty: u32,
    },
}

impl Patch {
    /// The entity id this patch targets.
    #[must_use]
    pub fn entity_id(&self) -> &str {
        match self {
            Self::PlayerPos { id, .. }
            | Self::PlayerFacing { id, .. }
            | Self::PlayerIntent { id, .. }
            | Self::PlayerHealth { id, .. }
            | Self::PlayerInventory { id, .. }
            | Self::PlayerEquipment { id, .. }
            | Self::PlayerRemoved { id }
            | Self::NpcPos { id, .. }
            | Self::NpcFacing { id, .. }
            | Self::NpcHealth { id, .. }
            | Self::NpcInventory { id, .. }
            | Self::NpcEquipment { id, .. }
            | Self::EffectPos { id, .. }
            | Self::EffectParams { id, .. }
            | Self::GroundItemPos { id, .. }
            | Self::GroundItemQty { id, .. } => id,
        }
    }

    fn kind_code(&self) -> u8 {
        match self {
            Self::PlayerPos { .. } => 1,
            Self::PlayerFacing { .. } => 2,
            Self::PlayerIntent { .. } => 3,
            Self::PlayerHealth { .. } => 4,
            Self::PlayerInventory { .. } => 5,
            Self::PlayerEquipment { .. } => 6,
            Self::PlayerRemoved { .. } => 7,
            Self::NpcPos { .. } => 8,
            Self::NpcFacing { .. } => 9,
            Self::NpcHealth { .. } => 10,
            Self::NpcInventory { .. } => 11,
            Self::NpcEquipment { .. } => 12,
            Self::EffectPos { .. } => 13,
            Self::EffectParams { .. } => 14,
            Self::GroundItemPos { .. } => 15,
            Self::GroundItemQty { .. } => 16,
        }
    }

    /// Folds this patch into a canonical digest stream.
    pub fn digest_into(&self, h: &mut Hasher) {
        h.update(&[self.kind_code()]);
        digest_str(h, self.entity_id());
        match self {
            Self::PlayerPos { x, y, .. }
            | Self::NpcPos { x, y, .. }
            | Self::EffectPos { x, y, .. }
            | Self::GroundItemPos { x, y, .. } => {
                h.update(&x.to_le_bytes());
                h.update(&y.to_le_bytes());
            }
            Self::PlayerFacing { facing, .. } | Self::NpcFacing { facing, .. } => {
                h.update(&[facing_code(*facing)]);
            }
            Self::PlayerIntent { dx, dy, .. } => {
                h.update(&dx.to_bits().to_le_bytes());
                h.update(&dy.to_bits().to_le_bytes());
            }
            Self::PlayerHealth {
                health, max_health, ..
            }
            | Self::NpcHealth {
                health, max_health, ..
            } => {
                h.update(&health.to_le_bytes());
                h.update(&max_health.to_le_bytes());
            }
            Self::PlayerInventory { slots, .. } | Self::NpcInventory { slots, .. } => {
                h.update(&(slots.len() as u64).to_le_bytes());
                for slot in slots {
                    h.update(&slot.index.to_le_bytes());
                    digest_stack(h, &slot.stack);
                }
            }
            Self::PlayerEquipment { entries, .. } | Self::NpcEquipment { entries, .. } => {
                h.update(&(entries.len() as u64).to_le_bytes());
                for (slot, stack) in entries {
                    h.update(&[equip_code(*slot)]);
                    digest_stack(h, stack);
                }
            }
            Self::PlayerRemoved { .. } => {}
            Self::EffectParams { params, .. } => {
                h.update(&(params.len() as u64).to_le_bytes());
                for (key, value) in params {
                    digest_str(h, key);
                    h.update(&value.to_le_bytes());
                }
            }
            Self::GroundItemQty { qty, .. } => {
                h.update(&qty.to_le_bytes());
            }
        }
    }
}

fn digest_str(h: &mut Hasher, s: &str) {
    h.update(&(s.len() as u64).to_le_bytes());
    h.update(s.as_bytes());
}

fn digest_stack(h: &mut Hasher, stack: &ItemStack) {
    digest_str(h, &stack.item_type);
    digest_str(h, &stack.fungibility_key);
    h.update(&stack.quantity.to_le_bytes());
}

fn facing_code(facing: Facing) -> u8 {
    match facing {
        Facing::Up => 1,
        Facing::Down => 2,
        Facing::Left => 3,
        Facing::Right => 4,
    }
}

fn equip_code(slot: EquipSlot) -> u8 {
    match slot {
        EquipSlot::MainHand => 1,
        EquipSlot::OffHand => 2,
        EquipSlot::Head => 3,
        EquipSlot::Body => 4,
        EquipSlot::Gloves => 5,
        EquipSlot::Boots => 6,
        EquipSlot::Accessory => 7,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_is_kind_tagged() {
        let patch = Patch::PlayerPos {
            id: "player-1".to_owned(),
            x: 160,
            y: 120,
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json["kind"], "playerPos");
        assert_eq!(json["id"], "player-1");
        assert_eq!(json["x"], 160);
    }

    #[test]
    fn digest_distinguishes_kinds_with_same_payload() {
        let a = Patch::PlayerPos {
            id: "x".to_owned(),
            x: 1,
            y: 2,
        };
        let b = Patch::NpcPos {
            id: "x".to_owned(),
            x: 1,
            y: 2,
        };
        let mut ha = Hasher::new();
        let mut hb = Hasher::new();
        a.digest_into(&mut ha);
        b.digest_into(&mut hb);
        assert_ne!(ha.finalize(), hb.finalize());
    }

    #[test]
    fn digest_is_stable_for_equal_patches() {
        let make = || Patch::EffectParams {
            id: "effect-1".to_owned(),
            params: [("radius".to_owned(), 4i64), ("speed".to_owned(), 12i64)]
                .into_iter()
                .collect(),
        };
        let mut ha = Hasher::new();
        let mut hb = Hasher::new();
        make().digest_into(&mut ha);
        make().digest_into(&mut hb);
        assert_eq!(ha.finalize(), hb.finalize());
    }
}
