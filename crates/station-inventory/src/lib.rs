//! `station-inventory` – the dispensing-slot table and its backing store.
//!
//! # Modules
//!
//! - [`inventory`] – [`Inventory`][inventory::Inventory]: in-memory slot
//!   table with stock checks and multi-slot withdrawals.  Not synchronised;
//!   the owner serialises access.
//! - [`store`] – [`InventoryStore`][store::InventoryStore]: the persistence
//!   seam, with a JSON file implementation and an in-memory one.

pub mod inventory;
pub mod store;

pub use inventory::Inventory;
pub use store::{InventoryStore, JsonFileStore, MemoryStore, SlotEntry, StoreError};
