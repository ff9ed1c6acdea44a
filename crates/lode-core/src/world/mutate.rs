// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Write barriers: every mutation of replicated state goes through these
//! setters, which clamp, compare, and record a patch only when the value
//! actually changed (diff-after-mutate).

use tracing::debug;

use crate::actor::Facing;
use crate::coord::quantize_world;
use crate::item::{EquipSlot, Equipment, Inventory, ItemStack};
use crate::patch::{ParamMap, Patch};
use crate::world::World;

impl World {
    /// Moves an actor, clamping to `[half, extent - half]` on both axes.
    /// Records a position patch only when the quantized position moved.
    pub fn set_actor_pos(&mut self, id: &str, x: f64, y: f64) {
        let half = self.config.player_half_extent;
        let x = x.clamp(half, self.config.width - half);
        let y = y.clamp(half, self.config.height - half);
        let patch = if let Some(player) = self.players.get_mut(id) {
            let moved = quantize_world(player.actor.x) != quantize_world(x)
                || quantize_world(player.actor.y) != quantize_world(y);
            player.actor.x = x;
            player.actor.y = y;
            if moved {
                player.version += 1;
                Some(Patch::PlayerPos {
                    id: id.to_owned(),
                    x: quantize_world(x),
                    y: quantize_world(y),
                })
            } else {
                None
            }
        } else if let Some(npc) = self.npcs.get_mut(id) {
            let moved = quantize_world(npc.actor.x) != quantize_world(x)
                || quantize_world(npc.actor.y) != quantize_world(y);
            npc.actor.x = x;
            npc.actor.y = y;
            moved.then(|| Patch::NpcPos {
                id: id.to_owned(),
                x: quantize_world(x),
                y: quantize_world(y),
            })
        } else {
            None
        };
        if let Some(patch) = patch {
            self.journal.record_patch(patch);
        }
    }

    /// Turns an actor. Records a facing patch only on change.
    pub fn set_actor_facing(&mut self, id: &str, facing: Facing) {
        let patch = if let Some(player) = self.players.get_mut(id) {
            if player.actor.facing == facing {
                None
            } else {
                player.actor.facing = facing;
                player.version += 1;
                Some(Patch::PlayerFacing {
                    id: id.to_owned(),
                    facing,
                })
            }
        } else if let Some(npc) = self.npcs.get_mut(id) {
            if npc.actor.facing == facing {
                None
            } else {
                npc.actor.facing = facing;
                Some(Patch::NpcFacing {
                    id: id.to_owned(),
                    facing,
                })
            }
        } else {
            None
        };
        if let Some(patch) = patch {
            self.journal.record_patch(patch);
        }
    }

    /// Sets a player's movement intent, normalized to length ≤ 1. Records
    /// an intent patch only on change.
    pub fn set_player_intent(&mut self, id: &str, dx: f64, dy: f64) {
        let (dx, dy) = normalize_intent(dx, dy);
        let Some(player) = self.players.get_mut(id) else {
            return;
        };
        if player.intent_x == dx && player.intent_y == dy {
            return;
        }
        player.intent_x = dx;
        player.intent_y = dy;
        player.version += 1;
        self.journal.record_patch(Patch::PlayerIntent {
            id: id.to_owned(),
            dx,
            dy,
        });
    }

    /// Applies a health delta, clamping to `[0, max]`. Records a health
    /// patch only on change.
    pub fn apply_health_delta(&mut self, id: &str, delta: i64) {
        let Some(actor) = self.actor(id) else {
            return;
        };
        let next = (actor.health + delta).clamp(0, actor.max_health);
        self.set_actor_health(id, next);
    }

    /// Sets absolute health, clamping to `[0, max]`.
    pub fn set_actor_health(&mut self, id: &str, health: i64) {
        let patch = if let Some(player) = self.players.get_mut(id) {
            let next = health.clamp(0, player.actor.max_health);
            if next == player.actor.health {
                None
            } else {
                player.actor.health = next;
                player.version += 1;
                debug!(player = %id, health = next, "player health changed");
                Some(Patch::PlayerHealth {
                    id: id.to_owned(),
                    health: next,
                    max_health: player.actor.max_health,
                })
            }
        } else if let Some(npc) = self.npcs.get_mut(id) {
            let next = health.clamp(0, npc.actor.max_health);
            if next == npc.actor.health {
                None
            } else {
                npc.actor.health = next;
                Some(Patch::NpcHealth {
                    id: id.to_owned(),
                    health: next,
                    max_health: npc.actor.max_health,
                })
            }
        } else {
            None
        };
        if let Some(patch) = patch {
            self.journal.record_patch(patch);
        }
    }

    /// Replaces a player's inventory. Compares slot-by-slot and records a
    /// patch carrying the full new slot list only when something differs.
    pub fn set_player_inventory(&mut self, id: &str, inventory: Inventory) {
        let Some(player) = self.players.get_mut(id) else {
            return;
        };
        if player.actor.inventory == inventory {
            return;
        }
        player.actor.inventory = inventory;
        player.version += 1;
        let slots = player.actor.inventory.slots().to_vec();
        self.journal.record_patch(Patch::PlayerInventory {
            id: id.to_owned(),
            slots,
        });
    }

    /// Replaces a player's equipment; patch on structural change only.
    pub fn set_player_equipment(&mut self, id: &str, equipment: Equipment) {
        let Some(player) = self.players.get_mut(id) else {
            return;
        };
        if player.actor.equipment == equipment {
            return;
        }
        player.actor.equipment = equipment;
        player.version += 1;
        let entries: Vec<(EquipSlot, ItemStack)> = player.actor.equipment.entries();
        self.journal.record_patch(Patch::PlayerEquipment {
            id: id.to_owned(),
            entries,
        });
    }

    /// Moves a live effect. Records an effect position patch on change and
    /// returns whether the quantized position moved.
    pub(crate) fn set_effect_pos(&mut self, id: &str, x: i64, y: i64) -> bool {
        let Some(effect) = self.effects.get_mut(id) else {
            return false;
        };
        if effect.delivery.geometry.x == x && effect.delivery.geometry.y == y {
            return false;
        }
        effect.delivery.geometry.x = x;
        effect.delivery.geometry.y = y;
        self.journal.record_patch(Patch::EffectPos {
            id: id.to_owned(),
            x,
            y,
        });
        true
    }

    /// Replaces a live effect's params. Patch on change only; returns
    /// whether anything differed.
    pub(crate) fn set_effect_params(&mut self, id: &str, params: ParamMap) -> bool {
        let Some(effect) = self.effects.get_mut(id) else {
            return false;
        };
        if effect.params == params {
            return false;
        }
        effect.params = params.clone();
        self.journal
            .record_patch(Patch::EffectParams { id: id.to_owned(), params });
        true
    }
}

/// Clamps an intent vector to unit length, zeroing non-finite input.
#[must_use]
pub fn normalize_intent(dx: f64, dy: f64) -> (f64, f64) {
    if !dx.is_finite() || !dy.is_finite() {
        return (0.0, 0.0);
    }
    let len_sq = dx * dx + dy * dy;
    if len_sq <= 1.0 {
        return (dx, dy);
    }
    let len = len_sq.sqrt();
    (dx / len, dy / len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;

    fn quiet_world() -> World {
        let config = WorldConfig {
            obstacles: false,
            gold_mines: false,
            lava: false,
            npcs: false,
            ..WorldConfig::default()
        };
        World::new(config).unwrap()
    }

    #[test]
    fn normalize_caps_diagonals() {
        let (dx, dy) = normalize_intent(3.0, 4.0);
        assert!((dx - 0.6).abs() < 1e-9);
        assert!((dy - 0.8).abs() < 1e-9);
        assert_eq!(normalize_intent(0.5, 0.0), (0.5, 0.0));
        assert_eq!(normalize_intent(f64::NAN, 1.0), (0.0, 0.0));
    }

    #[test]
    fn position_patch_only_on_quantized_change() {
        let mut world = quiet_world();
        let player = world.add_player();
        let id = player.actor.id;
        let before = world.journal().staged_patches();
        // A sub-quantum nudge changes no replicated field.
        let (x, y) = {
            let a = world.actor(&id).unwrap();
            (a.x, a.y)
        };
        world.set_actor_pos(&id, x + 0.01, y);
        assert_eq!(world.journal().staged_patches(), before);
        world.set_actor_pos(&id, x + 10.0, y);
        assert_eq!(world.journal().staged_patches(), before + 1);
    }

    #[test]
    fn position_clamps_to_world_bounds() {
        let mut world = quiet_world();
        let player = world.add_player();
        let id = player.actor.id;
        world.set_actor_pos(&id, -100.0, 1.0e9);
        let actor = world.actor(&id).unwrap();
        assert_eq!(actor.x, world.config().player_half_extent);
        assert_eq!(
            actor.y,
            world.config().height - world.config().player_half_extent
        );
    }

    #[test]
    fn health_clamps_and_patches_once() {
        let mut world = quiet_world();
        let player = world.add_player();
        let id = player.actor.id;
        let before = world.journal().staged_patches();
        world.apply_health_delta(&id, -3000);
        let actor = world.actor(&id).unwrap();
        assert_eq!(actor.health, 0);
        assert_eq!(world.journal().staged_patches(), before + 1);
        // Already at the floor: no further patch.
        world.apply_health_delta(&id, -5);
        assert_eq!(world.journal().staged_patches(), before + 1);
    }

    #[test]
    fn equipment_patch_carries_full_entry_list() {
        use crate::item::{EquipSlot, Equipment, ItemCatalog, ItemStack, ITEM_RUSTY_SWORD};
        let mut world = quiet_world();
        let player = world.add_player();
        let id = player.actor.id;
        let sword = ItemCatalog::builtin().get(ITEM_RUSTY_SWORD).cloned().unwrap();
        let mut equipment = Equipment::default();
        equipment
            .equip(EquipSlot::MainHand, ItemStack::of(&sword, 1), &sword)
            .unwrap();
        let before = world.journal().staged_patches();
        world.set_player_equipment(&id, equipment.clone());
        assert_eq!(world.journal().staged_patches(), before + 1);
        // Re-applying the identical equipment changes nothing.
        world.set_player_equipment(&id, equipment);
        assert_eq!(world.journal().staged_patches(), before + 1);
    }

    #[test]
    fn inventory_patch_requires_structural_change() {
        let mut world = quiet_world();
        let player = world.add_player();
        let id = player.actor.id.clone();
        let before = world.journal().staged_patches();
        world.set_player_inventory(&id, player.actor.inventory.clone());
        assert_eq!(world.journal().staged_patches(), before);
    }
}
