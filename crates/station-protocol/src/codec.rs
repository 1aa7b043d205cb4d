//! [`FrameCodec`] – stream framing for [`Message`] frames.
//!
//! Payload length is fixed per tag, so no length prefix is needed: the codec
//! reads the tag, waits until the whole payload has arrived, then splits the
//! frame off the buffer.
//!
//! Each decoded item is itself a `Result`.  A bad frame is reported to the
//! consumer without tearing the stream down; an unknown tag byte is dropped
//! so decoding can resume at the next byte.

use std::io;

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::message::{DecodeError, Message, payload_len};

/// `tokio_util` codec for the tagged frame format.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl FrameCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for FrameCodec {
    type Item = Result<Message, DecodeError>;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(&tag) = src.first() else {
            return Ok(None);
        };

        let Some(len) = payload_len(tag) else {
            src.advance(1);
            warn!(tag, "skipping byte with unknown frame tag");
            return Ok(Some(Err(DecodeError::UnknownType(tag))));
        };

        let frame_len = 1 + len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let frame = src.split_to(frame_len);
        Ok(Some(Message::decode(&frame)))
    }
}

impl Encoder<Message> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst);
        Ok(())
    }
}
