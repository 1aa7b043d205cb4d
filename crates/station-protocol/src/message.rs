//! [`Message`] – every frame exchanged over the listener and the platform
//! link.
//!
//! | tag | variant | fields |
//! |---|---|---|
//! | `u` | [`Message::Update`] | `slot_id`, `new_type`, `new_quant` |
//! | `o` | [`Message::OrderRequest`] | `item_type`, `quantity` |
//! | `d` | [`Message::Dispense`] | `slot_id`, `quantity` |
//! | `s` | [`Message::StateReport`] | `state` |
//!
//! Adding a message kind means adding a variant and its arm in [`Message::tag`],
//! [`payload_len`], [`Message::encode`] and [`Message::decode`]; the compiler
//! flags any arm that is missed.

use bytes::{Buf, BufMut, BytesMut};
use station_types::{ItemType, State};
use thiserror::Error;

pub const TAG_UPDATE: u8 = b'u';
pub const TAG_ORDER: u8 = b'o';
pub const TAG_DISPENSE: u8 = b'd';
pub const TAG_STATE_REPORT: u8 = b's';

const FIELD_WIDTH: usize = 4;

/// Why a frame could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Unknown message type tag 0x{0:02x}")]
    UnknownType(u8),

    #[error("Malformed frame: {0}")]
    Malformed(String),
}

/// A single typed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// Slot `slot_id` now holds `new_quant` units of `new_type`.
    Update {
        slot_id: i32,
        new_type: ItemType,
        new_quant: i32,
    },
    /// Request to dispense `quantity` units of `item_type`.
    OrderRequest { item_type: ItemType, quantity: i32 },
    /// Command to the platform: take `quantity` units out of `slot_id`.
    Dispense { slot_id: i32, quantity: i32 },
    /// Heartbeat from the platform carrying its current state.
    StateReport { state: State },
}

/// Payload length in bytes for `tag`, or `None` when the tag is unknown.
pub fn payload_len(tag: u8) -> Option<usize> {
    let fields = match tag {
        TAG_UPDATE => 3,
        TAG_ORDER => 2,
        TAG_DISPENSE => 2,
        TAG_STATE_REPORT => 1,
        _ => return None,
    };
    Some(fields * FIELD_WIDTH)
}

impl Message {
    pub fn tag(&self) -> u8 {
        match self {
            Message::Update { .. } => TAG_UPDATE,
            Message::OrderRequest { .. } => TAG_ORDER,
            Message::Dispense { .. } => TAG_DISPENSE,
            Message::StateReport { .. } => TAG_STATE_REPORT,
        }
    }

    /// Encode into a complete frame: tag byte followed by the payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(1 + payload_len(self.tag()).unwrap_or(0));
        self.encode_into(&mut buf);
        buf.to_vec()
    }

    /// Append this message's frame to `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut) {
        dst.put_u8(self.tag());
        match *self {
            Message::Update {
                slot_id,
                new_type,
                new_quant,
            } => {
                dst.put_i32_le(slot_id);
                dst.put_i32_le(new_type.as_i32());
                dst.put_i32_le(new_quant);
            }
            Message::OrderRequest {
                item_type,
                quantity,
            } => {
                dst.put_i32_le(item_type.as_i32());
                dst.put_i32_le(quantity);
            }
            Message::Dispense { slot_id, quantity } => {
                dst.put_i32_le(slot_id);
                dst.put_i32_le(quantity);
            }
            Message::StateReport { state } => {
                dst.put_i32_le(state.as_i32());
            }
        }
    }

    /// Decode exactly one frame.
    ///
    /// The whole frame is validated before any field is read, so a failure
    /// never yields a partially filled message.
    pub fn decode(frame: &[u8]) -> Result<Message, DecodeError> {
        let (&tag, payload) = frame
            .split_first()
            .ok_or_else(|| DecodeError::Malformed("empty frame".to_string()))?;
        let expected = payload_len(tag).ok_or(DecodeError::UnknownType(tag))?;
        if payload.len() != expected {
            return Err(DecodeError::Malformed(format!(
                "tag '{}' expects {expected} payload bytes, got {}",
                tag as char,
                payload.len()
            )));
        }

        let mut fields = payload;
        let message = match tag {
            TAG_UPDATE => Message::Update {
                slot_id: fields.get_i32_le(),
                new_type: item_type(fields.get_i32_le())?,
                new_quant: fields.get_i32_le(),
            },
            TAG_ORDER => Message::OrderRequest {
                item_type: item_type(fields.get_i32_le())?,
                quantity: fields.get_i32_le(),
            },
            TAG_DISPENSE => Message::Dispense {
                slot_id: fields.get_i32_le(),
                quantity: fields.get_i32_le(),
            },
            TAG_STATE_REPORT => {
                let raw = fields.get_i32_le();
                let state = State::from_i32(raw).ok_or_else(|| {
                    DecodeError::Malformed(format!("unknown state discriminant {raw}"))
                })?;
                Message::StateReport { state }
            }
            other => return Err(DecodeError::UnknownType(other)),
        };
        Ok(message)
    }
}

fn item_type(raw: i32) -> Result<ItemType, DecodeError> {
    ItemType::from_i32(raw)
        .ok_or_else(|| DecodeError::Malformed(format!("unknown item type discriminant {raw}")))
}
