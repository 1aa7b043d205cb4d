//! Administrative commands carried by `'c'` requests.
//!
//! A command request is the discriminator byte followed by UTF-8 text, e.g.
//! `c status` or `cstock widget`.  Words are whitespace-separated and
//! case-insensitive.

use std::str::FromStr;

use station_types::{ItemType, StationError};

/// Leading byte of a command request.
pub const REQUEST_COMMAND: u8 = b'c';

/// A parsed administrative command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Current / expected platform state and queue length.
    Status,
    /// Every slot of the inventory.
    Inventory,
    /// Pending orders, oldest first.
    Queue,
    /// Total units of one item type.
    Stock(ItemType),
    Ping,
}

impl Command {
    /// Parse the text that follows the discriminator byte.
    pub fn parse_bytes(raw: &[u8]) -> Result<Self, StationError> {
        std::str::from_utf8(raw)
            .map_err(|_| StationError::Parse("command is not valid UTF-8".to_string()))?
            .parse()
    }
}

impl FromStr for Command {
    type Err = StationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(StationError::Parse("empty command".to_string()));
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "status" => Command::Status,
            "inventory" => Command::Inventory,
            "queue" => Command::Queue,
            "ping" => Command::Ping,
            "stock" => {
                let item = words
                    .next()
                    .ok_or_else(|| StationError::Parse("usage: stock <item>".to_string()))?;
                Command::Stock(item.parse()?)
            }
            other => return Err(StationError::Parse(format!("unknown command '{other}'"))),
        };

        if let Some(extra) = words.next() {
            return Err(StationError::Parse(format!(
                "unexpected argument '{extra}' to '{verb}'"
            )));
        }
        Ok(command)
    }
}
