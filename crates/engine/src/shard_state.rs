// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State owned by one shard of one log reader

use crate::reprocess::ReprocessRegistry;
use chrono::{DateTime, Utc};
use oplog_core::Shard;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Cursor and reprocessing tasks of one shard.
///
/// The cursor is written only by the shard's batch loop; the registry is
/// shared with the reprocessing tasks the loop spawns.
pub struct ShardState {
    shard: Shard,
    next_index: Mutex<Option<u64>>,
    first_lookup: Mutex<Option<DateTime<Utc>>>,
    reprocess: ReprocessRegistry,
}

impl ShardState {
    fn new(shard: Shard) -> Self {
        Self {
            shard,
            next_index: Mutex::new(None),
            first_lookup: Mutex::new(None),
            reprocess: ReprocessRegistry::new(),
        }
    }

    pub fn shard(&self) -> &Shard {
        &self.shard
    }

    /// Next index the reader expects; `None` until first initialized
    pub fn next_index(&self) -> Option<u64> {
        *self.next_index.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_next_index(&self, index: u64) {
        *self.next_index.lock().unwrap_or_else(|e| e.into_inner()) = Some(index);
    }

    /// Time of the first cursor lookup, recorded as `now` on the first call.
    ///
    /// An uninitialized cursor keeps searching from this point, so rows
    /// committed while the log was empty are not skipped.
    pub fn first_lookup(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        *self
            .first_lookup
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_or_insert(now)
    }

    pub fn reprocess(&self) -> &ReprocessRegistry {
        &self.reprocess
    }
}

/// Per-shard states, created on first use
#[derive(Clone, Default)]
pub struct ShardMap {
    states: Arc<Mutex<HashMap<Shard, Arc<ShardState>>>>,
}

impl ShardMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, shard: &Shard) -> Arc<ShardState> {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            states
                .entry(shard.clone())
                .or_insert_with(|| Arc::new(ShardState::new(shard.clone()))),
        )
    }

    pub fn all(&self) -> Vec<Arc<ShardState>> {
        let states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        states.values().cloned().collect()
    }

    /// Join every shard's reprocessing tasks; returns how many were abandoned
    pub async fn drain(&self, timeout: Duration) -> usize {
        let mut abandoned = 0;
        for state in self.all() {
            abandoned += state.reprocess.join_all(timeout).await;
        }
        abandoned
    }
}
