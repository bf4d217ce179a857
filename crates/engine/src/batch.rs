// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Result of one batch pass over a shard's log

/// What one `process_batch` call did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Rows read or claimed
    pub read: usize,
    /// Rows whose handler succeeded in the batch itself
    pub processed: usize,
    /// Reprocessing tasks started for gaps and failures
    pub reprocessing: usize,
    /// The batch was full, so more rows are probably waiting
    pub full: bool,
    /// Too many reprocessing tasks in flight to claim anything
    pub busy: bool,
}

impl BatchOutcome {
    pub(crate) fn busy() -> Self {
        Self {
            busy: true,
            ..Self::default()
        }
    }
}
