//! `station-protocol` – the tagged binary wire format.
//!
//! Every frame is a one-byte type tag followed by the message's fields in
//! fixed declared order, each a little-endian `i32`.  No field names travel on
//! the wire, so position defines meaning and the payload length is fixed per
//! tag.
//!
//! # Modules
//!
//! - [`message`] – [`Message`][message::Message], the closed set of frames,
//!   with [`encode`][message::Message::encode] and
//!   [`decode`][message::Message::decode].
//! - [`codec`] – [`FrameCodec`][codec::FrameCodec]: splits a byte stream
//!   into frames for `tokio_util::codec::Framed` transports.

pub mod codec;
pub mod message;

pub use codec::FrameCodec;
pub use message::{DecodeError, Message};
