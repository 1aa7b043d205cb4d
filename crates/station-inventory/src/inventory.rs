//! [`Inventory`] – table of dispensing slots.
//!
//! Slots are kept ordered by id, so multi-slot withdrawals always drain the
//! smallest matching slot id first.
//!
//! # Example
//!
//! ```
//! use station_inventory::Inventory;
//! use station_types::ItemType;
//!
//! let mut inv = Inventory::new();
//! inv.set(3, ItemType::Widget, 5);
//!
//! assert!(inv.has_enough(ItemType::Widget, 2));
//! let taken = inv.take(ItemType::Widget, 2).unwrap();
//! assert_eq!(taken[0].slot_id, 3);
//! assert_eq!(inv.get(3).unwrap().quantity, 3);
//! ```

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use station_types::{ItemType, SlotRecord, StationError, Withdrawal};
use tracing::{debug, warn};

use crate::store::{InventoryStore, SlotEntry, StoreError};

/// In-memory slot table keyed by slot id.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Inventory {
    slots: BTreeMap<i32, SlotRecord>,
}

impl Inventory {
    /// Create an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an inventory from persisted records.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateSlot`] when two records share a slot id.
    pub fn from_entries(entries: impl IntoIterator<Item = SlotEntry>) -> Result<Self, StoreError> {
        let mut slots = BTreeMap::new();
        for entry in entries {
            match slots.entry(entry.slot_id) {
                Entry::Occupied(_) => return Err(StoreError::DuplicateSlot(entry.slot_id)),
                Entry::Vacant(v) => {
                    v.insert(SlotRecord {
                        item_type: entry.item_type,
                        quantity: entry.quantity,
                    });
                }
            }
        }
        Ok(Self { slots })
    }

    /// Load the whole table from `store`.
    pub fn load(store: &dyn InventoryStore) -> Result<Self, StoreError> {
        let inventory = Self::from_entries(store.load()?)?;
        debug!(slots = inventory.len(), "inventory loaded");
        Ok(inventory)
    }

    /// Overwrite `store` with the whole table.
    pub fn save(&self, store: &dyn InventoryStore) -> Result<(), StoreError> {
        store.save(&self.entries())
    }

    /// One persisted record per slot, ascending slot id.
    pub fn entries(&self) -> Vec<SlotEntry> {
        self.slots()
            .map(|(slot_id, record)| SlotEntry {
                slot_id,
                item_type: record.item_type,
                quantity: record.quantity,
            })
            .collect()
    }

    pub fn get(&self, slot_id: i32) -> Option<SlotRecord> {
        self.slots.get(&slot_id).copied()
    }

    /// Insert or overwrite a slot.
    pub fn set(&mut self, slot_id: i32, item_type: ItemType, quantity: u32) {
        self.slots.insert(
            slot_id,
            SlotRecord {
                item_type,
                quantity,
            },
        );
    }

    /// Slots in ascending id order.
    pub fn slots(&self) -> impl Iterator<Item = (i32, SlotRecord)> + '_ {
        self.slots.iter().map(|(id, record)| (*id, *record))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Units of `item_type` across all slots.  [`ItemType::Empty`] never
    /// counts as stock.
    pub fn total(&self, item_type: ItemType) -> u64 {
        if item_type == ItemType::Empty {
            return 0;
        }
        self.slots
            .values()
            .filter(|r| r.item_type == item_type)
            .map(|r| u64::from(r.quantity))
            .sum()
    }

    pub fn has_enough(&self, item_type: ItemType, quantity: u32) -> bool {
        self.total(item_type) >= u64::from(quantity)
    }

    /// Remove `quantity` units of `item_type`, draining the smallest slot
    /// ids first.
    ///
    /// All or nothing: on error no slot is touched.
    ///
    /// # Errors
    ///
    /// Returns [`StationError::InsufficientStock`] when the matching slots
    /// hold fewer than `quantity` units in total.
    pub fn take(
        &mut self,
        item_type: ItemType,
        quantity: u32,
    ) -> Result<Vec<Withdrawal>, StationError> {
        let available = self.total(item_type);
        if available < u64::from(quantity) {
            return Err(StationError::InsufficientStock {
                item_type,
                requested: quantity,
                available,
            });
        }

        let mut remaining = quantity;
        let mut withdrawals = Vec::new();
        for (&slot_id, record) in self.slots.iter_mut() {
            if remaining == 0 {
                break;
            }
            if record.item_type != item_type || record.quantity == 0 {
                continue;
            }
            let taken = remaining.min(record.quantity);
            record.quantity -= taken;
            remaining -= taken;
            withdrawals.push(Withdrawal {
                slot_id,
                item_type,
                quantity: taken,
            });
        }
        Ok(withdrawals)
    }

    /// Return withdrawn units to their slots.
    ///
    /// A slot whose item type has since been changed by an update is left
    /// alone; the update is authoritative.
    pub fn restock(&mut self, withdrawals: &[Withdrawal]) {
        for w in withdrawals {
            match self.slots.entry(w.slot_id) {
                Entry::Occupied(mut o) => {
                    let record = o.get_mut();
                    if record.item_type == w.item_type {
                        record.quantity = record.quantity.saturating_add(w.quantity);
                    } else {
                        warn!(
                            slot_id = w.slot_id,
                            "slot changed item type since withdrawal; not restocking"
                        );
                    }
                }
                Entry::Vacant(v) => {
                    v.insert(SlotRecord {
                        item_type: w.item_type,
                        quantity: w.quantity,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn stocked() -> Inventory {
        let mut inv = Inventory::new();
        inv.set(5, ItemType::Widget, 4);
        inv.set(2, ItemType::Widget, 3);
        inv.set(9, ItemType::Gadget, 10);
        inv
    }

    #[test]
    fn get_missing_slot_is_none() {
        assert_eq!(Inventory::new().get(1), None);
    }

    #[test]
    fn set_upserts() {
        let mut inv = Inventory::new();
        inv.set(1, ItemType::Widget, 2);
        inv.set(1, ItemType::Gadget, 7);
        assert_eq!(inv.len(), 1);
        assert_eq!(
            inv.get(1),
            Some(SlotRecord {
                item_type: ItemType::Gadget,
                quantity: 7
            })
        );
    }

    #[test]
    fn total_sums_matching_slots_only() {
        let inv = stocked();
        assert_eq!(inv.total(ItemType::Widget), 7);
        assert_eq!(inv.total(ItemType::Gadget), 10);
        assert_eq!(inv.total(ItemType::Sprocket), 0);
    }

    #[test]
    fn empty_slots_are_never_stock() {
        let mut inv = Inventory::new();
        inv.set(1, ItemType::Empty, 50);
        assert!(!inv.has_enough(ItemType::Empty, 1));
        assert!(inv.take(ItemType::Empty, 1).is_err());
    }

    #[test]
    fn take_drains_smallest_slot_first() {
        let mut inv = stocked();
        let taken = inv.take(ItemType::Widget, 5).unwrap();
        assert_eq!(
            taken,
            vec![
                Withdrawal {
                    slot_id: 2,
                    item_type: ItemType::Widget,
                    quantity: 3
                },
                Withdrawal {
                    slot_id: 5,
                    item_type: ItemType::Widget,
                    quantity: 2
                },
            ]
        );
        assert_eq!(inv.get(2).unwrap().quantity, 0);
        assert_eq!(inv.get(5).unwrap().quantity, 2);
        assert_eq!(inv.get(9).unwrap().quantity, 10);
    }

    #[test]
    fn take_is_all_or_nothing() {
        let mut inv = stocked();
        let before = inv.clone();
        let err = inv.take(ItemType::Widget, 8).unwrap_err();
        assert!(matches!(
            err,
            StationError::InsufficientStock {
                requested: 8,
                available: 7,
                ..
            }
        ));
        assert_eq!(inv, before);
    }

    #[test]
    fn has_enough_agrees_with_take() {
        for qty in 0..=9 {
            let mut inv = stocked();
            let predicted = inv.has_enough(ItemType::Widget, qty);
            assert_eq!(predicted, inv.take(ItemType::Widget, qty).is_ok(), "qty {qty}");
            assert!(inv.total(ItemType::Widget) <= 7);
            assert_eq!(inv.total(ItemType::Gadget), 10);
        }
    }

    #[test]
    fn take_skips_exhausted_slots() {
        let mut inv = Inventory::new();
        inv.set(1, ItemType::Widget, 0);
        inv.set(2, ItemType::Widget, 1);
        let taken = inv.take(ItemType::Widget, 1).unwrap();
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].slot_id, 2);
    }

    #[test]
    fn restock_reverses_take() {
        let mut inv = stocked();
        let before = inv.clone();
        let taken = inv.take(ItemType::Widget, 6).unwrap();
        inv.restock(&taken);
        assert_eq!(inv, before);
    }

    #[test]
    fn restock_respects_retyped_slot() {
        let mut inv = stocked();
        let taken = inv.take(ItemType::Widget, 1).unwrap();
        inv.set(2, ItemType::Sprocket, 8);
        inv.restock(&taken);
        assert_eq!(
            inv.get(2),
            Some(SlotRecord {
                item_type: ItemType::Sprocket,
                quantity: 8
            })
        );
    }

    #[test]
    fn duplicate_entries_are_rejected() {
        let entries = vec![
            SlotEntry {
                slot_id: 1,
                item_type: ItemType::Widget,
                quantity: 1,
            },
            SlotEntry {
                slot_id: 1,
                item_type: ItemType::Gadget,
                quantity: 2,
            },
        ];
        assert!(matches!(
            Inventory::from_entries(entries),
            Err(StoreError::DuplicateSlot(1))
        ));
    }

    #[test]
    fn save_then_load_through_store() {
        let store = MemoryStore::new();
        let inv = stocked();
        inv.save(&store).unwrap();
        assert_eq!(Inventory::load(&store).unwrap(), inv);
    }
}
