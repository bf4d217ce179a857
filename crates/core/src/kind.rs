// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log kinds and the entry state machine

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of logs written alongside business data.
///
/// Each kind implies two properties that drive reading, trimming and
/// statistics: whether every host sees every entry (`is_broadcast`) and
/// whether rows carry an explicit [`LogEntryState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    /// Committed operations, indexed and co-processed by every host
    Operations,
    /// Outbox events, claimed by exactly one host
    Events,
    /// Deferred commands that fire at a given time, claimed by exactly one host
    Timers,
}

impl LogKind {
    pub const ALL: [LogKind; 3] = [LogKind::Operations, LogKind::Events, LogKind::Timers];

    /// Every host processes every entry
    pub fn is_broadcast(self) -> bool {
        matches!(self, LogKind::Operations)
    }

    /// Entries carry a `New → Processed | Discarded` state
    pub fn has_explicit_state(self) -> bool {
        !self.is_broadcast()
    }

    pub fn is_co_processed(self) -> bool {
        self.is_broadcast()
    }

    pub fn is_uno_processed(self) -> bool {
        !self.is_broadcast()
    }

    pub fn name(self) -> &'static str {
        match self {
            LogKind::Operations => "operations",
            LogKind::Events => "events",
            LogKind::Timers => "timers",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// State of an event or timer row
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEntryState {
    #[default]
    New,
    Processed,
    Discarded,
}

impl LogEntryState {
    /// Transitions are monotonic: only `New` may move, and only forward.
    pub fn can_transition_to(self, next: LogEntryState) -> bool {
        self == LogEntryState::New && next != LogEntryState::New
    }

    pub fn is_final(self) -> bool {
        self != LogEntryState::New
    }
}

impl fmt::Display for LogEntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogEntryState::New => f.write_str("new"),
            LogEntryState::Processed => f.write_str("processed"),
            LogEntryState::Discarded => f.write_str("discarded"),
        }
    }
}

#[cfg(test)]
#[path = "kind_tests.rs"]
mod tests;
