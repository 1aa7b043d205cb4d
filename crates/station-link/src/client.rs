//! [`PlatformClient`] – contract for the link to the mobile platform.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use station_protocol::{DecodeError, Message};
use thiserror::Error;

/// Failures on the platform link.  All of them are recoverable from the
/// station's point of view; the watchdog degrades the platform state and
/// keeps listening.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("No message from the platform within {0:?}")]
    Timeout(Duration),

    #[error("Platform link closed")]
    Closed,

    #[error("Undecodable frame from the platform: {0}")]
    Decode(#[from] DecodeError),

    #[error("Platform link I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Bidirectional message link to the mobile platform.
///
/// # Contract
///
/// * `send` – deliver one frame to the platform.
/// * `receive` – wait at most `timeout` for the next frame.  Only one caller
///   (the heartbeat watchdog) receives at a time.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn send(&self, message: Message) -> Result<(), LinkError>;

    async fn receive(&self, timeout: Duration) -> Result<Message, LinkError>;
}
