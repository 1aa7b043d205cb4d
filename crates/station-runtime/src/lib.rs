//! `station-runtime` – the base station's coordinator.
//!
//! # Modules
//!
//! - [`manager`] – [`BaseManager`][manager::BaseManager]: classifies inbound
//!   requests, admits orders, applies inventory updates and drives the
//!   lifecycle (`run` / `shutdown`).
//! - [`queue`] – the mutex-guarded aggregate and the FIFO queue pass that
//!   turns pending orders into dispense commands.
//! - [`heartbeat`] – the platform-link watchdog.
//! - [`command`] – the textual administrative commands.
//! - [`telemetry`] – `tracing` subscriber and optional OTLP exporter setup.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use station_inventory::JsonFileStore;
//! use station_link::{TcpPlatformClient, TcpRequestServer};
//! use station_runtime::{BaseManager, ManagerConfig};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let client = TcpPlatformClient::new("127.0.0.1:7071");
//! let manager = Arc::new(BaseManager::new(
//!     Arc::new(JsonFileStore::new("inventory.json")),
//!     Arc::new(client),
//!     ManagerConfig::default(),
//! )?);
//! let server = TcpRequestServer::bind("0.0.0.0:7070").await?;
//! manager.clone().run(&server).await?;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod heartbeat;
pub mod manager;
pub mod queue;
pub mod telemetry;

pub use command::Command;
pub use manager::{BaseManager, ManagerConfig, RequestError};
