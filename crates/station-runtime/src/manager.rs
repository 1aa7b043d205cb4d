//! [`BaseManager`] – request classification, order admission, inventory
//! updates and the station lifecycle.
//!
//! Every request goes through [`BaseManager::handle_input`], which looks at
//! the leading byte:
//!
//! | Byte | Request | Handler |
//! |---|---|---|
//! | `'c'` | UTF-8 command text | [`BaseManager::handle_command`] |
//! | `'o'` | `OrderRequest` frame | [`BaseManager::handle_order`] |
//! | `'u'` | `Update` frame | [`BaseManager::handle_update`] |
//!
//! Replies are UTF-8 text, `OK ...` or `ERR <reason>`.  A bad request only
//! ever costs its sender an error reply.
//!
//! All mutable state sits in one [`Shared`] behind a `std::sync::Mutex`.
//! The guard is never held across an `.await`: queue passes return
//! [`Dispatch`]es that are sent to the platform after the lock is released.

use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use station_inventory::{Inventory, InventoryStore};
use station_link::{
    PlatformClient, RequestHandler, RequestServer, ShutdownSignal, ShutdownTrigger,
    shutdown_channel,
};
use station_protocol::message::{TAG_ORDER, TAG_UPDATE};
use station_protocol::{DecodeError, Message};
use station_types::{ItemType, Order, PlatformStatus, StationError};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::command::{Command, REQUEST_COMMAND};
use crate::queue::{Dispatch, Shared};

const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_millis(2000);

// ─────────────────────────────────────────────────────────────────────────────
// Configuration and errors
// ─────────────────────────────────────────────────────────────────────────────

/// Tunables for a [`BaseManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Longest silence tolerated from the platform before it is marked
    /// `Disconnected`.
    pub heartbeat_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
        }
    }
}

/// Why a single request was refused.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("{0}")]
    Decode(#[from] DecodeError),

    #[error("{0}")]
    Station(#[from] StationError),

    #[error("expected {expected} frame, got tag '{got}'")]
    WrongKind { expected: &'static str, got: char },
}

// ─────────────────────────────────────────────────────────────────────────────
// BaseManager
// ─────────────────────────────────────────────────────────────────────────────

/// The base station's coordinator.
///
/// Shared between the request listener and the heartbeat watchdog through
/// an `Arc`.
pub struct BaseManager {
    shared: Mutex<Shared>,
    pub(crate) client: Arc<dyn PlatformClient>,
    store: Arc<dyn InventoryStore>,
    pub(crate) config: ManagerConfig,
    shutdown: ShutdownTrigger,
}

impl BaseManager {
    /// Load the inventory from `store` and wire up the platform link.
    ///
    /// # Errors
    ///
    /// Returns [`StationError::Store`] when the stored inventory cannot be
    /// read.
    pub fn new(
        store: Arc<dyn InventoryStore>,
        client: Arc<dyn PlatformClient>,
        config: ManagerConfig,
    ) -> Result<Self, StationError> {
        let inventory =
            Inventory::load(store.as_ref()).map_err(|e| StationError::Store(e.to_string()))?;
        info!(
            slots = inventory.len(),
            heartbeat_timeout_ms = config.heartbeat_timeout.as_millis() as u64,
            "base manager ready"
        );
        let (shutdown, _) = shutdown_channel();
        Ok(Self {
            shared: Mutex::new(Shared::new(inventory)),
            client,
            store,
            config,
            shutdown,
        })
    }

    /// Lock the shared aggregate.
    ///
    /// # Panics
    ///
    /// A poisoned lock means a panic while the aggregate was mid-update;
    /// there is no consistent state to continue from.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().expect("station state mutex poisoned")
    }

    pub(crate) fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.subscribe()
    }

    // ── Snapshots ────────────────────────────────────────────────────────

    pub fn status(&self) -> PlatformStatus {
        self.lock().status
    }

    pub fn inventory(&self) -> Inventory {
        self.lock().inventory.clone()
    }

    /// Orders still waiting, oldest first.
    pub fn pending_orders(&self) -> Vec<Order> {
        self.lock().queue.iter().cloned().collect()
    }

    /// `true` once [`BaseManager::shutdown`] has persisted the inventory.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    // ── Request handling ─────────────────────────────────────────────────

    /// Classify `raw` by its leading byte and answer it.
    #[instrument(skip(self, raw), fields(len = raw.len()))]
    pub async fn handle_input(&self, raw: &[u8]) -> Vec<u8> {
        let reply = match raw.first().copied() {
            Some(REQUEST_COMMAND) => self.handle_command(&raw[1..]),
            Some(TAG_ORDER) => match self.admit_order(raw).await {
                Ok(id) => format!("OK queued {id}"),
                Err(e) => error_reply(&e),
            },
            Some(TAG_UPDATE) => self.handle_update(raw).await,
            Some(other) => {
                debug!(tag = other, "unclassifiable request");
                format!("ERR unknown request type 0x{other:02x}")
            }
            None => "ERR empty request".to_string(),
        };
        reply.into_bytes()
    }

    /// Admit an `OrderRequest` frame.
    ///
    /// Returns `false`, touching nothing, when the frame does not parse or
    /// the quantity is not positive.  An admitted order is queued and the
    /// queue is re-run straight away.
    pub async fn handle_order(&self, raw: &[u8]) -> bool {
        match self.admit_order(raw).await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "order rejected");
                false
            }
        }
    }

    async fn admit_order(&self, raw: &[u8]) -> Result<Uuid, RequestError> {
        let message = Message::decode(raw)?;
        let Message::OrderRequest {
            item_type,
            quantity,
        } = message
        else {
            return Err(RequestError::WrongKind {
                expected: "order",
                got: char::from(message.tag()),
            });
        };
        if item_type == ItemType::Empty {
            return Err(StationError::Parse("cannot order empty slots".to_string()).into());
        }
        let quantity = u32::try_from(quantity)
            .ok()
            .filter(|q| *q > 0)
            .ok_or(StationError::InvalidQuantity(quantity))?;

        let order = Order::new(item_type, quantity);
        let id = order.id;
        let dispatches = {
            let mut shared = self.lock();
            if shared.closed {
                return Err(StationError::ShuttingDown.into());
            }
            shared.queue.push_back(order);
            info!(
                order_id = %id,
                item = %item_type,
                quantity,
                pending = shared.queue.len(),
                "order admitted"
            );
            shared.process_queue()
        };
        self.dispatch(dispatches).await;
        Ok(id)
    }

    /// Apply an `Update` frame from a client to the inventory.
    pub async fn handle_update(&self, raw: &[u8]) -> String {
        match self.parse_update(raw).await {
            Ok(()) => "OK".to_string(),
            Err(e) => error_reply(&e),
        }
    }

    async fn parse_update(&self, raw: &[u8]) -> Result<(), RequestError> {
        let message = Message::decode(raw)?;
        let Message::Update {
            slot_id,
            new_type,
            new_quant,
        } = message
        else {
            return Err(RequestError::WrongKind {
                expected: "update",
                got: char::from(message.tag()),
            });
        };
        self.apply_update(slot_id, new_type, new_quant).await
    }

    /// Overwrite one slot and re-run the queue.  Shared by client updates
    /// and platform-originated corrections.
    pub(crate) async fn apply_update(
        &self,
        slot_id: i32,
        item_type: ItemType,
        new_quant: i32,
    ) -> Result<(), RequestError> {
        let quantity =
            u32::try_from(new_quant).map_err(|_| StationError::InvalidQuantity(new_quant))?;
        let dispatches = {
            let mut shared = self.lock();
            if shared.closed {
                return Err(StationError::ShuttingDown.into());
            }
            shared.inventory.set(slot_id, item_type, quantity);
            info!(slot_id, item = %item_type, quantity, "inventory slot updated");
            shared.process_queue()
        };
        self.dispatch(dispatches).await;
        Ok(())
    }

    /// Answer an administrative command.  `raw` is the text after the
    /// discriminator byte.  Read-only; allowed after shutdown.
    pub fn handle_command(&self, raw: &[u8]) -> String {
        let command = match Command::parse_bytes(raw) {
            Ok(command) => command,
            Err(e) => return format!("ERR {e}"),
        };

        let shared = self.lock();
        match command {
            Command::Ping => "OK pong".to_string(),
            Command::Status => format!(
                "OK current={} expected={} ready={} queued={}",
                shared.status.current(),
                shared.status.expected(),
                shared.status.is_ready(),
                shared.queue.len()
            ),
            Command::Stock(item_type) => {
                format!("OK {item_type} {}", shared.inventory.total(item_type))
            }
            Command::Inventory => {
                let mut reply = format!("OK slots={}", shared.inventory.len());
                for (slot_id, record) in shared.inventory.slots() {
                    let _ = write!(reply, " {slot_id}:{}:{}", record.item_type, record.quantity);
                }
                reply
            }
            Command::Queue => {
                let mut reply = format!("OK pending={}", shared.queue.len());
                for order in &shared.queue {
                    let _ = write!(reply, " {}:{}:{}", order.id, order.item_type, order.quantity);
                }
                reply
            }
        }
    }

    /// Send each dispatch to the platform; roll back any that fail.
    pub(crate) async fn dispatch(&self, dispatches: Vec<Dispatch>) {
        for dispatch in dispatches {
            let mut failure = None;
            for frame in dispatch.frames() {
                if let Err(e) = self.client.send(frame).await {
                    failure = Some(e);
                    break;
                }
            }

            match failure {
                None => info!(
                    order_id = %dispatch.order.id,
                    item = %dispatch.order.item_type,
                    quantity = dispatch.order.quantity,
                    slots = dispatch.withdrawals.len(),
                    "dispense command sent"
                ),
                Some(e) => {
                    warn!(
                        order_id = %dispatch.order.id,
                        error = %e,
                        "dispense command not delivered; order requeued"
                    );
                    self.lock().rollback(dispatch);
                }
            }
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Serve requests through `server` and watch the platform link until
    /// [`BaseManager::shutdown`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`StationError::Link`] when the listener fails; the watchdog
    /// is stopped as well in that case.
    pub async fn run(self: Arc<Self>, server: &dyn RequestServer) -> Result<(), StationError> {
        let handler: Arc<dyn RequestHandler> = self.clone();
        let serving = async {
            let served = server.serve(handler, self.shutdown_signal()).await;
            if served.is_err() {
                self.shutdown.trigger();
            }
            served
        };

        info!("station running");
        let (served, ()) = tokio::join!(serving, self.listen_heartbeat());
        served.map_err(|e| StationError::Link(e.to_string()))?;
        info!("station stopped");
        Ok(())
    }

    /// Stop the listener and the watchdog and persist the inventory.
    ///
    /// Idempotent.  Once this has succeeded, requests that would change the
    /// inventory or the queue get `ERR shutting down`.
    ///
    /// # Errors
    ///
    /// Returns [`StationError::Store`] when the save fails; a later call
    /// retries it.
    pub fn shutdown(&self) -> Result<(), StationError> {
        self.shutdown.trigger();

        let mut shared = self.lock();
        if shared.closed {
            return Ok(());
        }
        shared
            .inventory
            .save(self.store.as_ref())
            .map_err(|e| StationError::Store(e.to_string()))?;
        shared.closed = true;
        info!(
            slots = shared.inventory.len(),
            pending = shared.queue.len(),
            "inventory persisted; station shut down"
        );
        Ok(())
    }
}

#[async_trait]
impl RequestHandler for BaseManager {
    async fn handle(&self, request: &[u8]) -> Vec<u8> {
        self.handle_input(request).await
    }
}

fn error_reply(e: &RequestError) -> String {
    match e {
        RequestError::Station(StationError::ShuttingDown) => "ERR shutting down".to_string(),
        other => format!("ERR {other}"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use station_inventory::{MemoryStore, SlotEntry};
    use station_link::{PlatformEnd, channel_link};
    use station_types::{SlotRecord, State};

    fn slot(slot_id: i32, item_type: ItemType, quantity: u32) -> SlotEntry {
        SlotEntry {
            slot_id,
            item_type,
            quantity,
        }
    }

    fn manager_with(entries: Vec<SlotEntry>) -> (Arc<BaseManager>, PlatformEnd, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::with_entries(entries));
        let (client, platform) = channel_link(32);
        let manager = BaseManager::new(
            store.clone(),
            Arc::new(client),
            ManagerConfig {
                heartbeat_timeout: Duration::from_millis(50),
            },
        )
        .unwrap();
        (Arc::new(manager), platform, store)
    }

    async fn report(manager: &BaseManager, state: State) {
        manager
            .on_platform_message(Message::StateReport { state })
            .await;
    }

    fn order(item_type: ItemType, quantity: i32) -> Vec<u8> {
        Message::OrderRequest {
            item_type,
            quantity,
        }
        .encode()
    }

    fn update(slot_id: i32, new_type: ItemType, new_quant: i32) -> Vec<u8> {
        Message::Update {
            slot_id,
            new_type,
            new_quant,
        }
        .encode()
    }

    fn command(text: &str) -> Vec<u8> {
        let mut raw = vec![REQUEST_COMMAND];
        raw.extend_from_slice(text.as_bytes());
        raw
    }

    async fn reply(manager: &BaseManager, raw: &[u8]) -> String {
        String::from_utf8(manager.handle_input(raw).await).unwrap()
    }

    // ── Orders ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn order_with_stock_is_fulfilled_and_commanded() {
        let (manager, mut platform, _) = manager_with(vec![slot(3, ItemType::Widget, 5)]);
        report(&manager, State::Idle).await;

        assert!(manager.handle_order(&order(ItemType::Widget, 2)).await);

        assert_eq!(
            manager.inventory().get(3),
            Some(SlotRecord {
                item_type: ItemType::Widget,
                quantity: 3
            })
        );
        assert!(manager.pending_orders().is_empty());
        assert_eq!(
            platform.try_next_command(),
            Some(Message::Dispense {
                slot_id: 3,
                quantity: 2
            })
        );
        assert_eq!(manager.status().expected(), State::Dispensing);
    }

    #[tokio::test]
    async fn short_order_waits_for_restock() {
        let (manager, mut platform, _) = manager_with(vec![slot(3, ItemType::Widget, 5)]);
        report(&manager, State::Idle).await;

        assert!(manager.handle_order(&order(ItemType::Widget, 10)).await);
        assert_eq!(manager.pending_orders().len(), 1);
        assert_eq!(platform.try_next_command(), None);

        assert_eq!(manager.handle_update(&update(3, ItemType::Widget, 12)).await, "OK");

        assert!(manager.pending_orders().is_empty());
        assert_eq!(manager.inventory().get(3).map(|s| s.quantity), Some(2));
        assert_eq!(
            platform.try_next_command(),
            Some(Message::Dispense {
                slot_id: 3,
                quantity: 10
            })
        );
    }

    #[tokio::test]
    async fn emptied_slot_leaves_orders_queued() {
        let (manager, mut platform, _) = manager_with(vec![slot(3, ItemType::Widget, 5)]);
        report(&manager, State::Idle).await;

        assert_eq!(manager.handle_update(&update(3, ItemType::Widget, 0)).await, "OK");
        assert_eq!(
            manager.inventory().get(3),
            Some(SlotRecord {
                item_type: ItemType::Widget,
                quantity: 0
            })
        );

        assert!(manager.handle_order(&order(ItemType::Widget, 1)).await);
        assert_eq!(manager.pending_orders().len(), 1);
        assert_eq!(platform.try_next_command(), None);
        assert!(matches!(
            manager.inventory().take(ItemType::Widget, 1),
            Err(StationError::InsufficientStock { available: 0, .. })
        ));
    }

    #[tokio::test]
    async fn orders_are_served_strictly_in_arrival_order() {
        let (manager, mut platform, _) = manager_with(vec![
            slot(1, ItemType::Widget, 5),
            slot(2, ItemType::Gadget, 5),
        ]);
        report(&manager, State::Idle).await;

        assert!(manager.handle_order(&order(ItemType::Widget, 10)).await);
        assert!(manager.handle_order(&order(ItemType::Gadget, 1)).await);
        assert_eq!(platform.try_next_command(), None);
        let queued: Vec<_> = manager
            .pending_orders()
            .iter()
            .map(|o| o.item_type)
            .collect();
        assert_eq!(queued, vec![ItemType::Widget, ItemType::Gadget]);

        manager.handle_update(&update(1, ItemType::Widget, 10)).await;
        assert_eq!(
            platform.try_next_command(),
            Some(Message::Dispense {
                slot_id: 1,
                quantity: 10
            })
        );
        // The gadget order waits for the widget dispense to complete.
        assert_eq!(platform.try_next_command(), None);

        report(&manager, State::Dispensing).await;
        assert_eq!(platform.try_next_command(), None);
        report(&manager, State::Idle).await;
        assert_eq!(
            platform.try_next_command(),
            Some(Message::Dispense {
                slot_id: 2,
                quantity: 1
            })
        );
        assert!(manager.pending_orders().is_empty());
    }

    #[tokio::test]
    async fn orders_wait_for_first_heartbeat() {
        let (manager, mut platform, _) = manager_with(vec![slot(3, ItemType::Widget, 5)]);

        assert!(manager.handle_order(&order(ItemType::Widget, 1)).await);
        assert_eq!(platform.try_next_command(), None);
        assert_eq!(manager.inventory().get(3).map(|s| s.quantity), Some(5));

        report(&manager, State::Idle).await;
        assert_eq!(
            platform.try_next_command(),
            Some(Message::Dispense {
                slot_id: 3,
                quantity: 1
            })
        );
    }

    #[tokio::test]
    async fn bad_orders_are_refused_without_side_effects() {
        let (manager, mut platform, _) = manager_with(vec![slot(3, ItemType::Widget, 5)]);
        report(&manager, State::Idle).await;

        let mut truncated = order(ItemType::Widget, 1);
        truncated.truncate(5);
        for raw in [
            order(ItemType::Widget, 0),
            order(ItemType::Widget, -4),
            order(ItemType::Empty, 1),
            truncated,
            update(3, ItemType::Widget, 1),
            Vec::new(),
        ] {
            assert!(!manager.handle_order(&raw).await, "{raw:?} must be refused");
        }

        assert!(manager.pending_orders().is_empty());
        assert_eq!(manager.inventory().get(3).map(|s| s.quantity), Some(5));
        assert_eq!(platform.try_next_command(), None);
    }

    #[tokio::test]
    async fn undeliverable_command_is_rolled_back() {
        let (manager, platform, _) = manager_with(vec![slot(3, ItemType::Widget, 5)]);
        report(&manager, State::Idle).await;
        drop(platform);

        assert!(manager.handle_order(&order(ItemType::Widget, 2)).await);

        assert_eq!(manager.inventory().get(3).map(|s| s.quantity), Some(5));
        assert_eq!(manager.pending_orders().len(), 1);
        let status = manager.status();
        assert_eq!(status.current(), State::Disconnected);
        assert_eq!(status.expected(), State::Idle);
    }

    // ── Updates and commands ─────────────────────────────────────────────

    #[tokio::test]
    async fn negative_update_is_refused() {
        let (manager, _platform, _) = manager_with(vec![slot(3, ItemType::Widget, 5)]);

        let answer = manager.handle_update(&update(3, ItemType::Widget, -1)).await;
        assert!(answer.starts_with("ERR"), "{answer}");
        assert!(answer.contains("-1"));
        assert_eq!(manager.inventory().get(3).map(|s| s.quantity), Some(5));

        let answer = manager.handle_update(&order(ItemType::Widget, 1)).await;
        assert!(answer.starts_with("ERR expected update frame"), "{answer}");
    }

    #[tokio::test]
    async fn input_is_classified_by_leading_byte() {
        let (manager, _platform, _) = manager_with(vec![
            slot(3, ItemType::Widget, 5),
            slot(4, ItemType::Gadget, 2),
        ]);

        assert_eq!(reply(&manager, &command("ping")).await, "OK pong");
        assert_eq!(
            reply(&manager, &command("status")).await,
            "OK current=disconnected expected=idle ready=false queued=0"
        );
        assert_eq!(
            reply(&manager, &command("inventory")).await,
            "OK slots=2 3:widget:5 4:gadget:2"
        );
        assert_eq!(reply(&manager, &command("stock widget")).await, "OK widget 5");

        let queued = reply(&manager, &order(ItemType::Gadget, 1)).await;
        assert!(queued.starts_with("OK queued "), "{queued}");
        let listing = reply(&manager, &command("queue")).await;
        assert!(listing.starts_with("OK pending=1 "), "{listing}");
        assert!(listing.ends_with(":gadget:1"), "{listing}");

        assert_eq!(reply(&manager, &update(5, ItemType::Sprocket, 9)).await, "OK");
        assert_eq!(reply(&manager, &command("stock sprocket")).await, "OK sprocket 9");

        assert!(reply(&manager, &command("dance")).await.starts_with("ERR"));
        assert!(reply(&manager, &command("stock doohickey")).await.starts_with("ERR"));
        assert!(reply(&manager, &order(ItemType::Widget, 0)).await.starts_with("ERR"));
        assert_eq!(reply(&manager, b"").await, "ERR empty request");
        assert_eq!(
            reply(&manager, b"x123").await,
            "ERR unknown request type 0x78"
        );
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn shutdown_persists_and_refuses_mutations() {
        let (manager, _platform, store) = manager_with(vec![slot(3, ItemType::Widget, 5)]);
        manager.handle_update(&update(8, ItemType::Gadget, 4)).await;

        manager.shutdown().unwrap();
        assert!(manager.is_closed());
        assert_eq!(
            store.snapshot(),
            vec![slot(3, ItemType::Widget, 5), slot(8, ItemType::Gadget, 4)]
        );

        assert!(!manager.handle_order(&order(ItemType::Widget, 1)).await);
        assert_eq!(
            manager.handle_update(&update(3, ItemType::Widget, 0)).await,
            "ERR shutting down"
        );
        assert_eq!(reply(&manager, &order(ItemType::Widget, 1)).await, "ERR shutting down");
        assert_eq!(manager.inventory().get(3).map(|s| s.quantity), Some(5));
        assert_eq!(reply(&manager, &command("ping")).await, "OK pong");

        manager.shutdown().unwrap();
    }

    #[tokio::test]
    async fn construction_fails_on_bad_store() {
        let store = Arc::new(MemoryStore::with_entries(vec![
            slot(1, ItemType::Widget, 1),
            slot(1, ItemType::Gadget, 1),
        ]));
        let (client, _platform) = channel_link(4);
        let result = BaseManager::new(store, Arc::new(client), ManagerConfig::default());
        assert!(matches!(result, Err(StationError::Store(_))));
    }

    #[tokio::test]
    async fn full_station_over_tcp_with_simulated_platform() -> Result<(), Box<dyn std::error::Error>>
    {
        use bytes::Bytes;
        use futures_util::{SinkExt, StreamExt};
        use station_link::{SimulatedPlatform, TcpRequestServer};
        use tokio::net::TcpStream;
        use tokio_util::codec::{Framed, LengthDelimitedCodec};

        let store = Arc::new(MemoryStore::with_entries(vec![slot(3, ItemType::Widget, 5)]));
        let (client, platform) = channel_link(32);
        let (sim_trigger, sim_signal) = shutdown_channel();
        let sim = tokio::spawn(
            SimulatedPlatform::new(platform)
                .with_heartbeat(Duration::from_millis(10))
                .with_dispense_time(Duration::from_millis(5))
                .run(sim_signal),
        );

        let manager = Arc::new(BaseManager::new(
            store.clone(),
            Arc::new(client),
            ManagerConfig {
                heartbeat_timeout: Duration::from_millis(200),
            },
        )?);
        let server = TcpRequestServer::bind("127.0.0.1:0").await?;
        let addr = server.local_addr()?;
        let running = tokio::spawn({
            let manager = manager.clone();
            async move { manager.run(&server).await }
        });

        let mut conn = Framed::new(TcpStream::connect(addr).await?, LengthDelimitedCodec::new());
        conn.send(Bytes::from(order(ItemType::Widget, 2))).await?;
        let answer = conn.next().await.ok_or("no reply")??;
        assert!(answer.starts_with(b"OK queued "));

        let mut served = false;
        for _ in 0..200 {
            if manager.pending_orders().is_empty() && manager.status().is_ready() {
                served = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(served, "order was not dispensed");
        assert_eq!(manager.inventory().total(ItemType::Widget), 3);

        conn.send(Bytes::from(command("stock widget"))).await?;
        let answer = conn.next().await.ok_or("no reply")??;
        assert_eq!(&answer[..], b"OK widget 3");

        manager.shutdown()?;
        tokio::time::timeout(Duration::from_secs(1), running).await???;
        assert_eq!(store.snapshot(), vec![slot(3, ItemType::Widget, 3)]);

        sim_trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), sim).await??;
        Ok(())
    }

    // ── Concurrency ──────────────────────────────────────────────────────

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_keep_one_command_in_flight() {
        let (client, mut platform) = channel_link(32);
        let manager = Arc::new(
            BaseManager::new(
                Arc::new(MemoryStore::with_entries(vec![slot(1, ItemType::Widget, 100)])),
                Arc::new(client),
                ManagerConfig {
                    heartbeat_timeout: Duration::from_millis(500),
                },
            )
            .unwrap(),
        );
        let watchdog = tokio::spawn({
            let manager = manager.clone();
            async move { manager.listen_heartbeat().await }
        });
        platform
            .report(Message::StateReport { state: State::Idle })
            .await
            .unwrap();

        let mut requests = Vec::new();
        for _ in 0..16 {
            let manager = manager.clone();
            requests.push(tokio::spawn(async move {
                assert!(manager.handle_order(&order(ItemType::Widget, 1)).await);
            }));
        }
        for slot_id in 10..14 {
            let orders = manager.clone();
            requests.push(tokio::spawn(async move {
                assert!(orders.handle_order(&order(ItemType::Sprocket, 2)).await);
            }));
            let updates = manager.clone();
            requests.push(tokio::spawn(async move {
                let outcome = updates
                    .handle_update(&update(slot_id, ItemType::Sprocket, 2))
                    .await;
                assert_eq!(outcome, "OK");
            }));
        }

        // Acknowledge each command; heartbeat while nothing is in flight.
        let mut dispensed = 0;
        let mut acks = 0;
        tokio::time::timeout(Duration::from_secs(10), async {
            while dispensed < 24 {
                let Ok(command) =
                    tokio::time::timeout(Duration::from_millis(30), platform.next_command()).await
                else {
                    platform
                        .report(Message::StateReport { state: State::Idle })
                        .await
                        .unwrap();
                    continue;
                };
                match command {
                    Some(Message::Dispense { quantity, .. }) => dispensed += quantity,
                    other => panic!("unexpected command {other:?}"),
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
                assert_eq!(
                    platform.try_next_command(),
                    None,
                    "second command sent before acknowledgement"
                );
                acks += 1;
                for state in [State::Dispensing, State::Idle] {
                    platform
                        .report(Message::StateReport { state })
                        .await
                        .unwrap();
                }
            }
        })
        .await
        .expect("every order must be dispatched");

        for request in requests {
            request.await.unwrap();
        }
        assert_eq!(acks, 20);
        assert!(manager.pending_orders().is_empty());
        assert_eq!(manager.inventory().total(ItemType::Widget), 84);
        assert_eq!(manager.inventory().total(ItemType::Sprocket), 0);

        manager.shutdown().unwrap();
        tokio::time::timeout(Duration::from_secs(1), watchdog)
            .await
            .expect("watchdog must stop on shutdown")
            .unwrap();
    }
}
