// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{ChangeWaiter, LogWatcher, WatchError};
use async_trait::async_trait;
use oplog_core::Shard;

/// Watcher that never signals; processors fall back to their check period
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpLogWatcher;

impl NoOpLogWatcher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LogWatcher for NoOpLogWatcher {
    async fn notify_changed(&self, _shard: &Shard) -> Result<(), WatchError> {
        Ok(())
    }

    fn when_changed(&self, _shard: &Shard) -> ChangeWaiter {
        ChangeWaiter::never()
    }
}
