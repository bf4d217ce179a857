// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Utc};
use oplog_core::LogKind;
use serde::{Deserialize, Serialize};

/// Point-in-time counts for one log of one shard.
///
/// Operation logs only fill `total` and the age bounds; event and timer
/// logs also break the total down by state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogStats {
    pub kind: LogKind,
    pub total: u64,
    pub oldest_logged_at: Option<DateTime<Utc>>,
    pub newest_logged_at: Option<DateTime<Utc>>,
    /// `New` entries whose delay has not passed yet
    pub queued: u64,
    /// `New` entries ready for processing
    pub pending: u64,
    pub processed: u64,
    pub discarded: u64,
}

impl LogStats {
    pub fn empty(kind: LogKind) -> Self {
        Self {
            kind,
            total: 0,
            oldest_logged_at: None,
            newest_logged_at: None,
            queued: 0,
            pending: 0,
            processed: 0,
            discarded: 0,
        }
    }

    /// Average write rate over the retained window
    pub fn entries_per_second(&self, now: DateTime<Utc>) -> f64 {
        let Some(oldest) = self.oldest_logged_at else {
            return 0.0;
        };
        let span = (now - oldest).num_milliseconds() as f64 / 1000.0;
        if span <= 0.0 {
            return self.total as f64;
        }
        self.total as f64 / span
    }
}
