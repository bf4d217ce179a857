// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{ChangeWaiter, LogWatcher, ShardSignals, WatchError};
use async_trait::async_trait;
use oplog_core::Shard;

/// In-process watcher: writers and processors share one set of signals
#[derive(Clone, Debug, Default)]
pub struct LocalLogWatcher {
    signals: ShardSignals,
}

impl LocalLogWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self, shard: &Shard) -> u64 {
        self.signals.generation(shard)
    }
}

#[async_trait]
impl LogWatcher for LocalLogWatcher {
    async fn notify_changed(&self, shard: &Shard) -> Result<(), WatchError> {
        self.signals.bump(shard);
        Ok(())
    }

    fn when_changed(&self, shard: &Shard) -> ChangeWaiter {
        self.signals.subscribe(shard)
    }
}
