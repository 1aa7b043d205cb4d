//! The guarded aggregate and the queue pass.
//!
//! [`Shared`] is everything the listener and the watchdog both touch.  It
//! lives behind the manager's single mutex, so a `&mut Shared` is proof the
//! lock is held; [`Shared::process_queue`] is only reachable that way.
//!
//! The pass does no I/O.  It hands back [`Dispatch`]es that the caller sends
//! after releasing the lock, and [`Shared::rollback`] undoes one whose frames
//! could not be delivered.
//!
//! Policy is FIFO-strict: the pass stops at the first order it cannot serve,
//! so a later order never overtakes an earlier one.

use std::collections::VecDeque;

use station_inventory::Inventory;
use station_protocol::Message;
use station_types::{Order, PlatformStatus, State, Withdrawal};
use tracing::{debug, warn};

/// State shared between request handling and the heartbeat watchdog.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub(crate) inventory: Inventory,
    pub(crate) queue: VecDeque<Order>,
    pub(crate) status: PlatformStatus,
    /// Set once the final inventory has been persisted.
    pub(crate) closed: bool,
}

/// One order taken off the queue, with everything needed to command the
/// platform or to undo it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Dispatch {
    pub(crate) order: Order,
    pub(crate) withdrawals: Vec<Withdrawal>,
    pub(crate) previous_expected: State,
}

impl Dispatch {
    /// One `Dispense` frame per withdrawal, in ascending slot order.
    pub(crate) fn frames(&self) -> Vec<Message> {
        self.withdrawals
            .iter()
            .map(|w| Message::Dispense {
                slot_id: w.slot_id,
                // Bounded by the order quantity, which arrived as an i32.
                quantity: i32::try_from(w.quantity).unwrap_or(i32::MAX),
            })
            .collect()
    }
}

impl Shared {
    pub(crate) fn new(inventory: Inventory) -> Self {
        Self {
            inventory,
            ..Self::default()
        }
    }

    /// Serve queued orders, oldest first, for as long as the platform is
    /// ready and stock allows.
    pub(crate) fn process_queue(&mut self) -> Vec<Dispatch> {
        let mut dispatches = Vec::new();

        while let Some((item_type, quantity)) =
            self.queue.front().map(|o| (o.item_type, o.quantity))
        {
            if !self.status.is_ready() {
                debug!(
                    current = %self.status.current(),
                    expected = %self.status.expected(),
                    pending = self.queue.len(),
                    "platform not ready; queue pass stopped"
                );
                break;
            }
            if !self.inventory.has_enough(item_type, quantity) {
                debug!(
                    item = %item_type,
                    quantity,
                    available = self.inventory.total(item_type),
                    pending = self.queue.len(),
                    "head of queue lacks stock; queue pass stopped"
                );
                break;
            }

            let withdrawals = match self.inventory.take(item_type, quantity) {
                Ok(withdrawals) => withdrawals,
                Err(e) => {
                    warn!(error = %e, "stock check and withdrawal disagree");
                    break;
                }
            };
            let Some(previous_expected) = self.status.begin_dispense() else {
                self.inventory.restock(&withdrawals);
                break;
            };
            let Some(order) = self.queue.pop_front() else {
                break;
            };

            dispatches.push(Dispatch {
                order,
                withdrawals,
                previous_expected,
            });
        }

        dispatches
    }

    /// Undo a dispatch whose command never reached the platform.
    ///
    /// Stock goes back, the order returns to the head of the queue and the
    /// link is considered lost.
    pub(crate) fn rollback(&mut self, dispatch: Dispatch) {
        self.inventory.restock(&dispatch.withdrawals);
        self.status.abort_dispense(dispatch.previous_expected);
        self.queue.push_front(dispatch.order);
    }
}
