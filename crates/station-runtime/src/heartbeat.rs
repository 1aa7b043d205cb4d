//! Platform-link watchdog.
//!
//! [`BaseManager::listen_heartbeat`] waits on the platform link with the
//! configured timeout, over and over, until the shutdown signal fires.
//! Nothing the link does ends the loop:
//!
//! | Outcome | Effect |
//! |---|---|
//! | `StateReport` | `current` updated; queue re-run if the platform became ready |
//! | `Update` | slot overwritten; queue re-run |
//! | any other message | `current = Error` |
//! | undecodable frame | `current = Error` |
//! | timeout | `current = Disconnected` |
//! | link closed / I/O error | `current = Disconnected`, back off one timeout |

use station_link::LinkError;
use station_protocol::Message;
use station_types::State;
use tracing::{debug, info, warn};

use crate::manager::BaseManager;

impl BaseManager {
    /// Run the watchdog until shutdown.
    pub async fn listen_heartbeat(&self) {
        let mut shutdown = self.shutdown_signal();
        let timeout = self.config.heartbeat_timeout;
        info!(timeout_ms = timeout.as_millis() as u64, "heartbeat watchdog started");

        loop {
            let received = tokio::select! {
                _ = shutdown.triggered() => break,
                received = self.client.receive(timeout) => received,
            };

            match received {
                Ok(message) => self.on_platform_message(message).await,
                Err(LinkError::Timeout(_)) => self.mark_disconnected("heartbeat timed out"),
                Err(LinkError::Decode(e)) => {
                    warn!(error = %e, "undecodable frame from platform");
                    self.mark_error("undecodable frame");
                }
                Err(e) => {
                    self.mark_disconnected("platform link down");
                    debug!(error = %e, "waiting before the next receive");
                    tokio::select! {
                        _ = shutdown.triggered() => break,
                        _ = tokio::time::sleep(timeout) => {}
                    }
                }
            }
        }

        info!("heartbeat watchdog stopped");
    }

    /// React to one valid message from the platform.
    pub(crate) async fn on_platform_message(&self, message: Message) {
        match message {
            Message::StateReport { state } => {
                let dispatches = {
                    let mut shared = self.lock();
                    let before = shared.status;
                    let became_ready = shared.status.observe(state);
                    if before.current() != state {
                        info!(from = %before.current(), to = %state, "platform state changed");
                    }
                    if became_ready && !shared.closed {
                        shared.process_queue()
                    } else {
                        Vec::new()
                    }
                };
                self.dispatch(dispatches).await;
            }
            Message::Update {
                slot_id,
                new_type,
                new_quant,
            } => {
                if let Err(e) = self.apply_update(slot_id, new_type, new_quant).await {
                    warn!(slot_id, error = %e, "inventory correction from platform ignored");
                }
            }
            other => {
                warn!(tag = %char::from(other.tag()), "unexpected message from platform");
                self.mark_error("unexpected message kind");
            }
        }
    }

    fn mark_disconnected(&self, reason: &str) {
        if self.lock().status.mark_disconnected() {
            warn!(state = %State::Disconnected, reason, "platform link degraded");
        }
    }

    fn mark_error(&self, reason: &str) {
        if self.lock().status.mark_error() {
            warn!(state = %State::Error, reason, "platform link degraded");
        }
    }
}
