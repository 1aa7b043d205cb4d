//! In-process platform link over Tokio mpsc channels.
//!
//! [`channel_link`] returns both halves: the station keeps the
//! [`ChannelClient`], and whoever plays the robot (a test, or the
//! [`SimulatedPlatform`][crate::sim::SimulatedPlatform]) drives the
//! [`PlatformEnd`].

use std::time::Duration;

use async_trait::async_trait;
use station_protocol::{DecodeError, Message};
use tokio::sync::{Mutex, mpsc};

use crate::client::{LinkError, PlatformClient};

/// Build a connected client/platform pair whose channels buffer up to
/// `capacity` frames in each direction.
pub fn channel_link(capacity: usize) -> (ChannelClient, PlatformEnd) {
    let (command_tx, command_rx) = mpsc::channel(capacity);
    let (report_tx, report_rx) = mpsc::channel(capacity);
    (
        ChannelClient {
            commands: command_tx,
            reports: Mutex::new(report_rx),
        },
        PlatformEnd {
            commands: command_rx,
            reports: report_tx,
        },
    )
}

/// Station side of an in-process link.
pub struct ChannelClient {
    commands: mpsc::Sender<Message>,
    reports: Mutex<mpsc::Receiver<Result<Message, DecodeError>>>,
}

#[async_trait]
impl PlatformClient for ChannelClient {
    async fn send(&self, message: Message) -> Result<(), LinkError> {
        self.commands
            .send(message)
            .await
            .map_err(|_| LinkError::Closed)
    }

    async fn receive(&self, timeout: Duration) -> Result<Message, LinkError> {
        let mut reports = self.reports.lock().await;
        match tokio::time::timeout(timeout, reports.recv()).await {
            Err(_) => Err(LinkError::Timeout(timeout)),
            Ok(None) => Err(LinkError::Closed),
            Ok(Some(Ok(message))) => Ok(message),
            Ok(Some(Err(e))) => Err(LinkError::Decode(e)),
        }
    }
}

/// Robot side of an in-process link.
pub struct PlatformEnd {
    commands: mpsc::Receiver<Message>,
    reports: mpsc::Sender<Result<Message, DecodeError>>,
}

impl PlatformEnd {
    /// Send a message to the station.
    pub async fn report(&self, message: Message) -> Result<(), LinkError> {
        self.reports
            .send(Ok(message))
            .await
            .map_err(|_| LinkError::Closed)
    }

    /// Send raw bytes to the station as one frame, exactly as a wire
    /// transport would deliver them, including frames that fail to decode.
    pub async fn report_frame(&self, frame: &[u8]) -> Result<(), LinkError> {
        self.reports
            .send(Message::decode(frame))
            .await
            .map_err(|_| LinkError::Closed)
    }

    /// Wait for the next command from the station.  `None` once the station
    /// side has been dropped.
    pub async fn next_command(&mut self) -> Option<Message> {
        self.commands.recv().await
    }

    /// Take a command only if one is already buffered.
    pub fn try_next_command(&mut self) -> Option<Message> {
        self.commands.try_recv().ok()
    }
}
