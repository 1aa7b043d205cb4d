//! [`InventoryStore`] – where the slot table lives between runs.
//!
//! The table is loaded wholesale at startup and overwritten wholesale at
//! shutdown; there is no incremental write path.
//!
//! # File layout ([`JsonFileStore`])
//!
//! A JSON array with one object per slot:
//!
//! ```json
//! [
//!   { "slot_id": 3, "item_type": "widget", "quantity": 5 }
//! ]
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use station_types::ItemType;
use thiserror::Error;
use tracing::info;

/// Errors raised while reading or writing the inventory.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Slot {0} appears more than once")]
    DuplicateSlot(i32),
}

/// One persisted slot record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotEntry {
    pub slot_id: i32,
    pub item_type: ItemType,
    pub quantity: u32,
}

/// Backing storage for the inventory.
pub trait InventoryStore: Send + Sync {
    /// Read every persisted slot record.
    fn load(&self) -> Result<Vec<SlotEntry>, StoreError>;

    /// Replace the persisted contents with `entries`.
    fn save(&self, entries: &[SlotEntry]) -> Result<(), StoreError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// JsonFileStore
// ─────────────────────────────────────────────────────────────────────────────

/// Inventory persisted as a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl InventoryStore for JsonFileStore {
    /// A missing file is a first run and yields an empty table.
    fn load(&self) -> Result<Vec<SlotEntry>, StoreError> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "no inventory file yet; starting empty");
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Writes a sibling temp file and renames it over the target so a crash
    /// mid-write never leaves a truncated inventory behind.
    fn save(&self, entries: &[SlotEntry]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(entries)?;
        let tmp = self.temp_path();
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)?;
        info!(path = %self.path.display(), slots = entries.len(), "inventory saved");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryStore
// ─────────────────────────────────────────────────────────────────────────────

/// Volatile store, useful for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Vec<SlotEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `entries`.
    pub fn with_entries(entries: Vec<SlotEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Copy of what was last saved.
    pub fn snapshot(&self) -> Vec<SlotEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl InventoryStore for MemoryStore {
    fn load(&self) -> Result<Vec<SlotEntry>, StoreError> {
        Ok(self.snapshot())
    }

    fn save(&self, entries: &[SlotEntry]) -> Result<(), StoreError> {
        *self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = entries.to_vec();
        Ok(())
    }
}
