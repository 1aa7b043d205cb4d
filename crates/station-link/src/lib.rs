//! `station-link` – the station's two connections to the outside world.
//!
//! The orchestrator only ever talks to the traits defined here, so the
//! transports can be swapped without touching queue or inventory logic.
//!
//! # Modules
//!
//! - [`client`] – [`PlatformClient`][client::PlatformClient]: the
//!   bidirectional link to the mobile platform.
//! - [`server`] – [`RequestServer`][server::RequestServer] and
//!   [`RequestHandler`][server::RequestHandler]: the inbound listener and its
//!   single callback.
//! - [`signal`] – [`ShutdownSignal`][signal::ShutdownSignal]: cancellation
//!   shared by every long-running loop.
//! - [`channel`] – in-process platform link over Tokio mpsc channels.
//! - [`tcp`] – TCP implementations of both seams.
//! - [`sim`] – [`SimulatedPlatform`][sim::SimulatedPlatform]: a stand-in
//!   robot for headless runs and tests.

pub mod channel;
pub mod client;
pub mod server;
pub mod signal;
pub mod sim;
pub mod tcp;

pub use channel::{ChannelClient, PlatformEnd, channel_link};
pub use client::{LinkError, PlatformClient};
pub use server::{RequestHandler, RequestServer};
pub use signal::{ShutdownSignal, ShutdownTrigger, shutdown_channel};
pub use sim::SimulatedPlatform;
pub use tcp::{TcpPlatformClient, TcpRequestServer};
