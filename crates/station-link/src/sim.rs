//! In-process stand-in for the mobile platform, for headless runs and tests.
//!
//! [`SimulatedPlatform`] drives the [`PlatformEnd`] of a
//! [`channel_link`][crate::channel::channel_link] the way the real robot
//! drives its radio link:
//!
//! * heartbeats its current [`State`] at a fixed interval;
//! * on a `Dispense` command reports `Dispensing`, works through every
//!   buffered dispense frame (one `dispense_time` each), then reports `Idle`.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use station_link::{channel_link, shutdown_channel, SimulatedPlatform};
//!
//! # async fn demo() {
//! let (client, platform) = channel_link(32);
//! let (trigger, signal) = shutdown_channel();
//! tokio::spawn(
//!     SimulatedPlatform::new(platform)
//!         .with_heartbeat(Duration::from_millis(200))
//!         .run(signal),
//! );
//! // ... hand `client` to the station ...
//! trigger.trigger();
//! # }
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use station_protocol::Message;
use station_types::State;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep_until};
use tracing::{debug, info, warn};

use crate::channel::PlatformEnd;
use crate::signal::ShutdownSignal;

const DEFAULT_HEARTBEAT: Duration = Duration::from_millis(500);
const DEFAULT_DISPENSE_TIME: Duration = Duration::from_millis(100);

/// A simulated robot that always succeeds.
pub struct SimulatedPlatform {
    end: PlatformEnd,
    heartbeat: Duration,
    dispense_time: Duration,
}

impl SimulatedPlatform {
    pub fn new(end: PlatformEnd) -> Self {
        Self {
            end,
            heartbeat: DEFAULT_HEARTBEAT,
            dispense_time: DEFAULT_DISPENSE_TIME,
        }
    }

    /// Interval between state reports (builder-style).
    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Time spent on each dispense frame (builder-style).
    pub fn with_dispense_time(mut self, dispense_time: Duration) -> Self {
        self.dispense_time = dispense_time;
        self
    }

    /// Run until `shutdown` fires or the station drops its side of the link.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) {
        let mut state = State::Idle;
        let mut pending: VecDeque<(i32, i32)> = VecDeque::new();
        let mut busy_until = Instant::now();

        let mut ticker = interval(self.heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("simulated platform online");
        loop {
            tokio::select! {
                _ = shutdown.triggered() => break,

                _ = ticker.tick() => {
                    if self.end.report(Message::StateReport { state }).await.is_err() {
                        break;
                    }
                }

                command = self.end.next_command() => match command {
                    Some(Message::Dispense { slot_id, quantity }) => {
                        debug!(slot_id, quantity, "sim: dispense queued");
                        pending.push_back((slot_id, quantity));
                        if state == State::Idle {
                            state = State::Dispensing;
                            busy_until = Instant::now() + self.dispense_time;
                            if self.end.report(Message::StateReport { state }).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(other) => warn!(?other, "sim: ignoring unexpected command"),
                    None => break,
                },

                _ = sleep_until(busy_until), if state == State::Dispensing => {
                    if let Some((slot_id, quantity)) = pending.pop_front() {
                        info!(slot_id, quantity, "sim: dispensed");
                    }
                    if pending.is_empty() {
                        state = State::Idle;
                        if self.end.report(Message::StateReport { state }).await.is_err() {
                            break;
                        }
                    } else {
                        busy_until = Instant::now() + self.dispense_time;
                    }
                }
            }
        }
        info!("simulated platform offline");
    }
}
