// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Items: definitions, stacks, inventories, equipment, ground items.
//!
//! Stack merging is governed entirely by the fungibility key: equality is
//! necessary and sufficient for two stacks of the same item to merge, both
//! in inventories and on the ground within one tile.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Equipment slots. Each slot holds at most one stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EquipSlot {
    /// Primary weapon hand.
    MainHand,
    /// Secondary hand.
    OffHand,
    /// Head armor.
    Head,
    /// Body armor.
    Body,
    /// Hand armor.
    Gloves,
    /// Foot armor.
    Boots,
    /// Trinket slot.
    Accessory,
}

/// Broad item family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemClass {
    /// Currency and crafting input.
    Currency,
    /// One-shot usables.
    Consumable,
    /// Equippable gear.
    Equipment,
}

/// Stat modifier granted by an item, sorted by `(kind, magnitude, duration)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemModifier {
    /// Modifier kind tag.
    pub kind: String,
    /// Signed magnitude.
    pub magnitude: i64,
    /// Duration in ticks; 0 means passive.
    pub duration_ticks: u32,
}

/// Static item definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDefinition {
    /// Unique item id.
    pub id: String,
    /// Item family.
    pub class: ItemClass,
    /// Quality tier.
    pub tier: u8,
    /// Whether stacks of this item merge.
    pub stackable: bool,
    /// Quality tags feeding the fungibility key.
    pub tags: Vec<String>,
    /// Slot this item equips into, when any.
    pub equip_slot: Option<EquipSlot>,
    /// Action names, sorted and unique.
    pub actions: Vec<String>,
    /// Modifiers, sorted by `(kind, magnitude, duration)`.
    pub modifiers: Vec<ItemModifier>,
    /// Gold returned when recycled.
    pub recycle_value: i64,
}

impl ItemDefinition {
    /// The deterministic fungibility key for this definition.
    #[must_use]
    pub fn fungibility_key(&self) -> String {
        compose_key(&self.id, self.tier, &self.tags)
    }
}

/// Composes a fungibility key from id, tier, and sorted quality tags.
#[must_use]
pub fn compose_key(id: &str, tier: u8, tags: &[String]) -> String {
    let mut sorted: Vec<&str> = tags.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.dedup();
    let mut key = format!("{id}#t{tier}");
    for tag in sorted {
        key.push('+');
        key.push_str(tag);
    }
    key
}

/// A quantity of one fungible item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemStack {
    /// Item id.
    #[serde(rename = "type")]
    pub item_type: String,
    /// Fungibility key controlling merges.
    pub fungibility_key: String,
    /// Stack size, always positive.
    pub quantity: u32,
}

impl ItemStack {
    /// Builds a stack of `quantity` from a definition.
    #[must_use]
    pub fn of(def: &ItemDefinition, quantity: u32) -> Self {
        Self {
            item_type: def.id.clone(),
            fungibility_key: def.fungibility_key(),
            quantity,
        }
    }
}

/// One occupied inventory slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySlot {
    /// Slot index, unique within the inventory.
    pub index: u32,
    /// Stack held in the slot.
    pub stack: ItemStack,
}

/// Item-system failures, surfaced to console acks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ItemError {
    /// All slots occupied.
    #[error("inventory_error")]
    InventoryFull,
    /// Item id absent from the catalog.
    #[error("not_found")]
    UnknownItem,
    /// Not enough quantity to remove.
    #[error("insufficient_gold")]
    InsufficientQuantity,
    /// Item cannot occupy the requested equipment slot.
    #[error("inventory_error")]
    NotEquippable,
}

/// Default inventory capacity in slots.
pub const DEFAULT_INVENTORY_CAPACITY: usize = 24;

/// Ordered slot sequence with a capacity bound.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Inventory {
    slots: Vec<InventorySlot>,
    capacity: usize,
}

impl Inventory {
    /// Creates an empty inventory with the given slot capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            capacity,
        }
    }

    /// Normalizes a slot list: sorts by index, drops duplicates and empty
    /// stacks. Idempotent — feeding the output back yields the same value.
    #[must_use]
    pub fn from_slots(mut slots: Vec<InventorySlot>, capacity: usize) -> Self {
        slots.retain(|s| s.stack.quantity > 0);
        slots.sort_by_key(|s| s.index);
        slots.dedup_by_key(|s| s.index);
        slots.truncate(capacity);
        Self { slots, capacity }
    }

    /// Slots in index order.
    #[must_use]
    pub fn slots(&self) -> &[InventorySlot] {
        &self.slots
    }

    /// Slot capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total quantity across stacks matching `fungibility_key`.
    #[must_use]
    pub fn total_of(&self, fungibility_key: &str) -> u64 {
        self.slots
            .iter()
            .filter(|s| s.stack.fungibility_key == fungibility_key)
            .map(|s| u64::from(s.stack.quantity))
            .sum()
    }

    /// Adds a stack, merging onto an existing stack when the definition is
    /// stackable and the fungibility keys match.
    ///
    /// # Errors
    /// [`ItemError::InventoryFull`] when a fresh slot is needed and none is
    /// free.
    pub fn insert(&mut self, stack: ItemStack, stackable: bool) -> Result<u32, ItemError> {
        if stack.quantity == 0 {
            return Err(ItemError::InsufficientQuantity);
        }
        if stackable {
            if let Some(slot) = self
                .slots
                .iter_mut()
                .find(|s| s.stack.fungibility_key == stack.fungibility_key)
            {
                slot.stack.quantity = slot.stack.quantity.saturating_add(stack.quantity);
                return Ok(slot.index);
            }
        }
        if self.slots.len() >= self.capacity {
            return Err(ItemError::InventoryFull);
        }
        let index = self.first_free_index();
        self.slots.push(InventorySlot { index, stack });
        self.slots.sort_by_key(|s| s.index);
        Ok(index)
    }

    /// Removes `qty` of the given fungibility key, draining stacks from the
    /// lowest slot index upward.
    ///
    /// # Errors
    /// [`ItemError::InsufficientQuantity`] when the inventory holds less
    /// than `qty`; nothing is removed in that case.
    pub fn remove_qty(&mut self, fungibility_key: &str, qty: u64) -> Result<(), ItemError> {
        if self.total_of(fungibility_key) < qty {
            return Err(ItemError::InsufficientQuantity);
        }
        let mut remaining = qty;
        for slot in &mut self.slots {
            if remaining == 0 {
                break;
            }
            if slot.stack.fungibility_key != fungibility_key {
                continue;
            }
            let take = u64::from(slot.stack.quantity).min(remaining) as u32;
            slot.stack.quantity -= take;
            remaining -= u64::from(take);
        }
        self.slots.retain(|s| s.stack.quantity > 0);
        Ok(())
    }

    fn first_free_index(&self) -> u32 {
        let mut index = 0u32;
        for slot in &self.slots {
            if slot.index == index {
                index += 1;
            } else if slot.index > index {
                break;
            }
        }
        index
    }
}

/// Equipment: at most one stack per slot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Equipment {
    slots: BTreeMap<EquipSlot, ItemStack>,
}

impl Equipment {
    /// Equips `stack` into `slot`, returning whatever was displaced.
    ///
    /// # Errors
    /// [`ItemError::NotEquippable`] when the definition does not target
    /// `slot`.
    pub fn equip(
        &mut self,
        slot: EquipSlot,
        stack: ItemStack,
        def: &ItemDefinition,
    ) -> Result<Option<ItemStack>, ItemError> {
        if def.equip_slot != Some(slot) {
            return Err(ItemError::NotEquippable);
        }
        Ok(self.slots.insert(slot, stack))
    }

    /// Removes and returns the stack in `slot`.
    pub fn unequip(&mut self, slot: EquipSlot) -> Option<ItemStack> {
        self.slots.remove(&slot)
    }

    /// The stack currently in `slot`.
    #[must_use]
    pub fn get(&self, slot: EquipSlot) -> Option<&ItemStack> {
        self.slots.get(&slot)
    }

    /// `(slot, stack)` entries in slot order.
    #[must_use]
    pub fn entries(&self) -> Vec<(EquipSlot, ItemStack)> {
        self.slots.iter().map(|(s, v)| (*s, v.clone())).collect()
    }
}

/// An item stack lying in the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundItem {
    /// Unique ground-item id.
    pub id: String,
    /// Item id.
    #[serde(rename = "type")]
    pub item_type: String,
    /// Fungibility key controlling tile merges.
    pub fungibility_key: String,
    /// World x.
    pub x: f64,
    /// World y.
    pub y: f64,
    /// Stack size.
    pub qty: u32,
    /// Tile coordinates, kept in sync with the position.
    pub tile: (i64, i64),
}

/// Catalog of item definitions keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ItemCatalog {
    defs: BTreeMap<String, ItemDefinition>,
}

/// Gold item id.
pub const ITEM_GOLD: &str = "gold";
/// Health potion item id.
pub const ITEM_HEALTH_POTION: &str = "health-potion";
/// Starter weapon item id.
pub const ITEM_RUSTY_SWORD: &str = "rusty-sword";

impl ItemCatalog {
    /// Catalog seeded with the built-in items.
    #[must_use]
    pub fn builtin() -> Self {
        let mut defs = BTreeMap::new();
        for def in [
            ItemDefinition {
                id: ITEM_GOLD.to_owned(),
                class: ItemClass::Currency,
                tier: 1,
                stackable: true,
                tags: Vec::new(),
                equip_slot: None,
                actions: Vec::new(),
                modifiers: Vec::new(),
                recycle_value: 1,
            },
            ItemDefinition {
                id: ITEM_HEALTH_POTION.to_owned(),
                class: ItemClass::Consumable,
                tier: 1,
                stackable: true,
                tags: Vec::new(),
                equip_slot: None,
                actions: vec!["drink".to_owned()],
                modifiers: vec![ItemModifier {
                    kind: "heal".to_owned(),
                    magnitude: 25,
                    duration_ticks: 0,
                }],
                recycle_value: 2,
            },
            ItemDefinition {
                id: ITEM_RUSTY_SWORD.to_owned(),
                class: ItemClass::Equipment,
                tier: 1,
                stackable: false,
                tags: vec!["worn".to_owned()],
                equip_slot: Some(EquipSlot::MainHand),
                actions: vec!["attack".to_owned()],
                modifiers: vec![ItemModifier {
                    kind: "damage".to_owned(),
                    magnitude: 2,
                    duration_ticks: 0,
                }],
                recycle_value: 3,
            },
        ] {
            defs.insert(def.id.clone(), def);
        }
        Self { defs }
    }

    /// Looks up a definition by item id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ItemDefinition> {
        self.defs.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gold() -> ItemDefinition {
        ItemCatalog::builtin().get(ITEM_GOLD).cloned().unwrap()
    }

    #[test]
    fn compose_key_sorts_and_dedups_tags() {
        let tags = vec!["b".to_owned(), "a".to_owned(), "b".to_owned()];
        assert_eq!(compose_key("ore", 2, &tags), "ore#t2+a+b");
        assert_eq!(compose_key("ore", 2, &[]), "ore#t2");
    }

    #[test]
    fn stackable_inserts_merge_on_key() {
        let def = gold();
        let mut inv = Inventory::with_capacity(4);
        inv.insert(ItemStack::of(&def, 10), true).unwrap();
        inv.insert(ItemStack::of(&def, 5), true).unwrap();
        assert_eq!(inv.slots().len(), 1);
        assert_eq!(inv.total_of(&def.fungibility_key()), 15);
    }

    #[test]
    fn unstackable_inserts_take_fresh_slots() {
        let sword = ItemCatalog::builtin().get(ITEM_RUSTY_SWORD).cloned().unwrap();
        let mut inv = Inventory::with_capacity(2);
        inv.insert(ItemStack::of(&sword, 1), false).unwrap();
        inv.insert(ItemStack::of(&sword, 1), false).unwrap();
        assert_eq!(inv.slots().len(), 2);
        assert_eq!(
            inv.insert(ItemStack::of(&sword, 1), false),
            Err(ItemError::InventoryFull)
        );
    }

    #[test]
    fn remove_qty_is_all_or_nothing() {
        let def = gold();
        let mut inv = Inventory::with_capacity(4);
        inv.insert(ItemStack::of(&def, 10), true).unwrap();
        assert_eq!(
            inv.remove_qty(&def.fungibility_key(), 11),
            Err(ItemError::InsufficientQuantity)
        );
        assert_eq!(inv.total_of(&def.fungibility_key()), 10);
        inv.remove_qty(&def.fungibility_key(), 10).unwrap();
        assert!(inv.slots().is_empty());
    }

    #[test]
    fn from_slots_is_idempotent() {
        let def = gold();
        let slots = vec![
            InventorySlot {
                index: 3,
                stack: ItemStack::of(&def, 2),
            },
            InventorySlot {
                index: 1,
                stack: ItemStack::of(&def, 7),
            },
            InventorySlot {
                index: 3,
                stack: ItemStack::of(&def, 9),
            },
        ];
        let once = Inventory::from_slots(slots, DEFAULT_INVENTORY_CAPACITY);
        let twice = Inventory::from_slots(once.slots().to_vec(), DEFAULT_INVENTORY_CAPACITY);
        assert_eq!(once, twice);
        assert_eq!(once.slots().len(), 2);
    }

    #[test]
    fn first_free_index_fills_gaps() {
        let def = gold();
        let sword = ItemCatalog::builtin().get(ITEM_RUSTY_SWORD).cloned().unwrap();
        let mut inv = Inventory::with_capacity(4);
        inv.insert(ItemStack::of(&sword, 1), false).unwrap(); // index 0
        inv.insert(ItemStack::of(&sword, 1), false).unwrap(); // index 1
        inv.remove_qty(&sword.fungibility_key(), 1).unwrap(); // drains index 0 first
        let idx = inv.insert(ItemStack::of(&def, 1), true).unwrap();
        assert_eq!(idx, 0);
    }

    #[test]
    fn equipment_enforces_slot_compatibility() {
        let sword = ItemCatalog::builtin().get(ITEM_RUSTY_SWORD).cloned().unwrap();
        let mut eq = Equipment::default();
        assert_eq!(
            eq.equip(EquipSlot::Head, ItemStack::of(&sword, 1), &sword),
            Err(ItemError::NotEquippable)
        );
        let displaced = eq
            .equip(EquipSlot::MainHand, ItemStack::of(&sword, 1), &sword)
            .unwrap();
        assert!(displaced.is_none());
        let displaced = eq
            .equip(EquipSlot::MainHand, ItemStack::of(&sword, 1), &sword)
            .unwrap();
        assert!(displaced.is_some());
    }
}
