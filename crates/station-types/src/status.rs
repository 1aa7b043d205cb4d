//! [`PlatformStatus`] – the base's view of the mobile platform.
//!
//! Two values are tracked: `current`, the last state the platform reported,
//! and `expected`, the state the base commanded it towards.  A dispense
//! command may only be issued while the pair is synchronised in
//! [`State::Idle`]; the platform then has to acknowledge by reporting
//! `Dispensing` and finish by reporting `Idle` again before the next command.
//!
//! ```text
//!   Idle ──command──▶ (expected = Dispensing)
//!   report Dispensing ──▶ synchronised, command acknowledged
//!   report Idle ──▶ completion, expected = Idle
//!   timeout ──▶ current = Disconnected
//!   bad frame ──▶ current = Error
//!   Error/Disconnected ──valid report──▶ resync, expected = reported
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Operational status of the mobile platform.
///
/// The discriminant is the value written on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum State {
    Idle = 0,
    Moving = 1,
    Dispensing = 2,
    Error = 3,
    Disconnected = 4,
}

impl State {
    pub const ALL: [State; 5] = [
        State::Idle,
        State::Moving,
        State::Dispensing,
        State::Error,
        State::Disconnected,
    ];

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_i32() == value)
    }

    /// `Error` and `Disconnected` are degraded; the link must resync.
    pub fn is_degraded(self) -> bool {
        matches!(self, State::Error | State::Disconnected)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Idle => "idle",
            State::Moving => "moving",
            State::Dispensing => "dispensing",
            State::Error => "error",
            State::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// The `current_state` / `expected_state` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformStatus {
    current: State,
    expected: State,
}

impl Default for PlatformStatus {
    /// Nothing has been heard from the platform yet.
    fn default() -> Self {
        Self {
            current: State::Disconnected,
            expected: State::Idle,
        }
    }
}

impl PlatformStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> State {
        self.current
    }

    pub fn expected(&self) -> State {
        self.expected
    }

    pub fn is_synchronized(&self) -> bool {
        self.current == self.expected
    }

    /// Synchronised and idle: the only condition under which a new command
    /// may be issued.
    pub fn is_ready(&self) -> bool {
        self.is_synchronized() && self.current == State::Idle
    }

    /// Advance `expected` to [`State::Dispensing`].
    ///
    /// Returns the replaced `expected` value, or `None` (leaving the pair
    /// untouched) when the platform is not ready for a command.
    pub fn begin_dispense(&mut self) -> Option<State> {
        if !self.is_ready() {
            return None;
        }
        let previous = self.expected;
        self.expected = State::Dispensing;
        Some(previous)
    }

    /// Undo [`PlatformStatus::begin_dispense`] after the command failed to
    /// reach the platform.  The link is treated as lost.
    pub fn abort_dispense(&mut self, previous: State) {
        self.expected = previous;
        self.current = State::Disconnected;
    }

    /// Apply a state report from the platform.
    ///
    /// Returns `true` when the report made the platform ready for a command
    /// after it previously was not, i.e. the caller should re-run the queue.
    pub fn observe(&mut self, reported: State) -> bool {
        let was_ready = self.is_ready();

        if self.current.is_degraded() {
            if !reported.is_degraded() {
                self.expected = reported;
            }
        } else if self.is_synchronized()
            && self.expected == State::Dispensing
            && reported == State::Idle
        {
            self.expected = State::Idle;
        }
        self.current = reported;

        !was_ready && self.is_ready()
    }

    /// Heartbeat silence or a closed link.  Returns `true` on transition.
    pub fn mark_disconnected(&mut self) -> bool {
        self.degrade(State::Disconnected)
    }

    /// Malformed or unexpected input from the platform.  Returns `true` on
    /// transition.
    pub fn mark_error(&mut self) -> bool {
        self.degrade(State::Error)
    }

    fn degrade(&mut self, to: State) -> bool {
        let changed = self.current != to;
        self.current = to;
        changed
    }
}
