// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Ground items: dual-indexed by id and by tile for O(1) merge lookups.
//!
//! Two stacks merge into one pile iff they share a tile and a fungibility
//! key; everything else stays separate even on the same tile.

use tracing::debug;

use crate::coord::{quantize_world, TILE_SIZE};
use crate::item::{GroundItem, ItemStack, ITEM_GOLD};
use crate::patch::Patch;
use crate::world::{ConsoleOutcome, World, PICKUP_RANGE};

/// Failure reasons for ground-item operations; the `Display` strings are
/// the wire reason codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GroundItemFailure {
    /// No matching pile exists.
    #[error("not_found")]
    NotFound,
    /// The nearest pile is beyond reach.
    #[error("out_of_range")]
    OutOfRange,
    /// The player holds less than the requested quantity.
    #[error("insufficient_gold")]
    InsufficientGold,
    /// The inventory rejected the stack.
    #[error("inventory_error")]
    InventoryError,
    /// Zero or nonsense quantity.
    #[error("invalid_quantity")]
    InvalidQuantity,
}

/// Tile coordinates for a world position.
#[must_use]
pub fn tile_of(x: f64, y: f64) -> (i64, i64) {
    (
        (x / TILE_SIZE).floor() as i64,
        (y / TILE_SIZE).floor() as i64,
    )
}

impl World {
    /// Drops a stack on the ground, merging into an existing same-key pile
    /// on the same tile. Returns the pile id.
    pub fn upsert_ground_item(
        &mut self,
        item_type: &str,
        fungibility_key: &str,
        x: f64,
        y: f64,
        qty: u32,
    ) -> String {
        let tile = tile_of(x, y);
        if let Some(ids) = self.tile_index.get(&tile) {
            let mut merge_target: Option<String> = None;
            for id in ids {
                if let Some(existing) = self.ground_items.get(id) {
                    if existing.fungibility_key == fungibility_key {
                        let candidate = match &merge_target {
                            Some(best) => id < best,
                            None => true,
                        };
                        if candidate {
                            merge_target = Some(id.clone());
                        }
                    }
                }
            }
            if let Some(id) = merge_target {
                if let Some(existing) = self.ground_items.get_mut(&id) {
                    existing.qty = existing.qty.saturating_add(qty);
                    let new_qty = existing.qty;
                    self.journal.record_patch(Patch::GroundItemQty {
                        id: id.clone(),
                        qty: new_qty,
                    });
                }
                return id;
            }
        }

        let id = self.alloc_ground_item_id();
        let item = GroundItem {
            id: id.clone(),
            item_type: item_type.to_owned(),
            fungibility_key: fungibility_key.to_owned(),
            x,
            y,
            qty,
            tile,
        };
        self.ground_items.insert(id.clone(), item);
        self.tile_index.entry(tile).or_default().push(id.clone());
        id
    }

    /// Removes a pile outright. Returns whether it existed.
    pub fn remove_ground_item(&mut self, id: &str) -> bool {
        let Some(item) = self.ground_items.remove(id) else {
            debug!(item = %id, reason = "not_found", "ground item remove failed");
            return false;
        };
        if let Some(ids) = self.tile_index.get_mut(&item.tile) {
            ids.retain(|i| i != id);
            if ids.is_empty() {
                self.tile_index.remove(&item.tile);
            }
        }
        self.journal.record_patch(Patch::GroundItemQty {
            id: id.to_owned(),
            qty: 0,
        });
        true
    }

    /// Nearest pile of `item_type` within `range` of `(x, y)`; ties break
    /// toward the smaller id.
    #[must_use]
    pub fn nearest_ground_item(
        &self,
        x: f64,
        y: f64,
        item_type: &str,
        range: f64,
    ) -> Option<&GroundItem> {
        let mut best: Option<(&GroundItem, f64)> = None;
        for item in self.ground_items.values() {
            if item.item_type != item_type {
                continue;
            }
            let d = (item.x - x).powi(2) + (item.y - y).powi(2);
            if d > range * range {
                continue;
            }
            let better = match best {
                Some((b, bd)) => d < bd || (d == bd && item.id < b.id),
                None => true,
            };
            if better {
                best = Some((item, d));
            }
        }
        best.map(|(item, _)| item)
    }

    /// `drop_gold` console command: moves `qty` gold from the player's
    /// inventory to a pile at their feet.
    pub(crate) fn drop_gold(&mut self, player_id: &str, qty: u32) -> ConsoleOutcome {
        let fail = |reason: GroundItemFailure| ConsoleOutcome {
            player_id: player_id.to_owned(),
            cmd: crate::command::ConsoleCmd::DropGold,
            ok: false,
            qty: 0,
            reason: reason.to_string(),
            stack_id: None,
        };
        if qty == 0 {
            return fail(GroundItemFailure::InvalidQuantity);
        }
        let Some(gold) = self.catalog.get(ITEM_GOLD).cloned() else {
            return fail(GroundItemFailure::NotFound);
        };
        let key = gold.fungibility_key();
        let Some(player) = self.players.get(player_id) else {
            return fail(GroundItemFailure::NotFound);
        };
        let (x, y) = (player.actor.x, player.actor.y);
        let mut inventory = player.actor.inventory.clone();
        if inventory.remove_qty(&key, u64::from(qty)).is_err() {
            debug!(player = %player_id, qty, reason = "insufficient_gold", "drop_gold failed");
            return fail(GroundItemFailure::InsufficientGold);
        }
        self.set_player_inventory(player_id, inventory);
        let stack_id = self.upsert_ground_item(ITEM_GOLD, &key, x, y, qty);
        ConsoleOutcome {
            player_id: player_id.to_owned(),
            cmd: crate::command::ConsoleCmd::DropGold,
            ok: true,
            qty,
            reason: String::new(),
            stack_id: Some(stack_id),
        }
    }

    /// `pickup_gold` console command: moves the nearest in-range pile into
    /// the player's inventory.
    pub(crate) fn pickup_gold(&mut self, player_id: &str) -> ConsoleOutcome {
        let fail = |reason: GroundItemFailure| ConsoleOutcome {
            player_id: player_id.to_owned(),
            cmd: crate::command::ConsoleCmd::PickupGold,
            ok: false,
            qty: 0,
            reason: reason.to_string(),
            stack_id: None,
        };
        let Some(player) = self.players.get(player_id) else {
            return fail(GroundItemFailure::NotFound);
        };
        let (x, y) = (player.actor.x, player.actor.y);
        let Some(item) = self.nearest_ground_item(x, y, ITEM_GOLD, PICKUP_RANGE) else {
            let any_gold = self
                .ground_items
                .values()
                .any(|i| i.item_type == ITEM_GOLD);
            let reason = if any_gold {
                GroundItemFailure::OutOfRange
            } else {
                GroundItemFailure::NotFound
            };
            debug!(player = %player_id, reason = %reason, "pickup_gold failed");
            return fail(reason);
        };
        let item = item.clone();
        let Some(gold) = self.catalog.get(ITEM_GOLD).cloned() else {
            return fail(GroundItemFailure::NotFound);
        };
        let mut inventory = player.actor.inventory.clone();
        let stack = ItemStack {
            item_type: item.item_type.clone(),
            fungibility_key: item.fungibility_key.clone(),
            quantity: item.qty,
        };
        if inventory.insert(stack, gold.stackable).is_err() {
            debug!(player = %player_id, reason = "inventory_error", "pickup_gold failed");
            return fail(GroundItemFailure::InventoryError);
        }
        self.set_player_inventory(player_id, inventory);
        let qty = item.qty;
        self.remove_ground_item(&item.id);
        ConsoleOutcome {
            player_id: player_id.to_owned(),
            cmd: crate::command::ConsoleCmd::PickupGold,
            ok: true,
            qty,
            reason: String::new(),
            stack_id: Some(item.id),
        }
    }

    /// Re-indexes piles whose position drifted across a tile boundary and
    /// records position patches for moved piles.
    pub(crate) fn sync_ground_item_tiles(&mut self) {
        let moved: Vec<(String, (i64, i64), (i64, i64))> = self
            .ground_items
            .values()
            .filter_map(|item| {
                let current = tile_of(item.x, item.y);
                (current != item.tile).then(|| (item.id.clone(), item.tile, current))
            })
            .collect();
        for (id, old_tile, new_tile) in moved {
            if let Some(ids) = self.tile_index.get_mut(&old_tile) {
                ids.retain(|i| i != &id);
                if ids.is_empty() {
                    self.tile_index.remove(&old_tile);
                }
            }
            self.tile_index.entry(new_tile).or_default().push(id.clone());
            let (x, y) = {
                let item = &self.ground_items[&id];
                (item.x, item.y)
            };
            if let Some(item) = self.ground_items.get_mut(&id) {
                item.tile = new_tile;
            }
            self.journal.record_patch(Patch::GroundItemPos {
                id,
                x: quantize_world(x),
                y: quantize_world(y),
            });
        }
    }
}
