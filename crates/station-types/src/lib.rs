//! `station-types` – shared vocabulary of the base station.
//!
//! Plain value types only: item kinds, slot records, orders, the platform
//! state pair, and the error taxonomy every other crate reports through.

pub mod status;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use status::{PlatformStatus, State};

/// Kind of product a slot holds.
///
/// The discriminant is the value written on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum ItemType {
    /// The slot holds nothing dispensable.
    Empty = 0,
    Widget = 1,
    Gadget = 2,
    Sprocket = 3,
}

impl ItemType {
    /// Every variant, in discriminant order.
    pub const ALL: [ItemType; 4] = [
        ItemType::Empty,
        ItemType::Widget,
        ItemType::Gadget,
        ItemType::Sprocket,
    ];

    /// Wire discriminant of this item type.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Inverse of [`ItemType::as_i32`]; `None` for unknown discriminants.
    pub fn from_i32(value: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_i32() == value)
    }

    fn as_str(self) -> &'static str {
        match self {
            ItemType::Empty => "empty",
            ItemType::Widget => "widget",
            ItemType::Gadget => "gadget",
            ItemType::Sprocket => "sprocket",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = StationError;

    /// Case-insensitive item name, e.g. `"WIDGET"` or `"widget"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| StationError::Parse(format!("unknown item type '{s}'")))
    }
}

/// Contents of one dispensing slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRecord {
    pub item_type: ItemType,
    pub quantity: u32,
}

/// Units removed from a single slot while fulfilling an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub slot_id: i32,
    pub item_type: ItemType,
    pub quantity: u32,
}

/// A pending dispense request.
///
/// Orders are never edited once admitted; a queue pass either fulfils one
/// and drops it or leaves it where it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub item_type: ItemType,
    pub quantity: u32,
    /// Wall-clock time at which the order was admitted.
    pub received_at: DateTime<Utc>,
}

impl Order {
    /// Stamp a new order with a fresh id and the current UTC time.
    pub fn new(item_type: ItemType, quantity: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_type,
            quantity,
            received_at: Utc::now(),
        }
    }
}

/// Error taxonomy shared across the station crates.
#[derive(Error, Debug)]
pub enum StationError {
    /// A textual request could not be understood.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Expected, non-fatal: the order stays queued.
    #[error("Insufficient stock of {item_type}: requested {requested}, available {available}")]
    InsufficientStock {
        item_type: ItemType,
        requested: u32,
        available: u64,
    },

    #[error("Invalid quantity {0}")]
    InvalidQuantity(i32),

    #[error("Station is shutting down")]
    ShuttingDown,

    #[error("Inventory store error: {0}")]
    Store(String),

    #[error("Platform link error: {0}")]
    Link(String),
}
