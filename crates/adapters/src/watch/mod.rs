// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-shard "log may have changed" signals

mod file;
mod local;
mod noop;

pub use file::FileLogWatcher;
pub use local::LocalLogWatcher;
pub use noop::NoOpLogWatcher;

use async_trait::async_trait;
use oplog_core::Shard;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::watch;

/// Errors from watcher operations
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("marker io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wakes log processors when a shard's log may hold new entries.
///
/// `when_changed` observes only notifications that happen after the call, so
/// processors subscribe first and read second.
#[async_trait]
pub trait LogWatcher: Clone + Send + Sync + 'static {
    async fn notify_changed(&self, shard: &Shard) -> Result<(), WatchError>;

    fn when_changed(&self, shard: &Shard) -> ChangeWaiter;
}

/// Pending wait for the next change of one shard
#[derive(Debug)]
pub struct ChangeWaiter {
    rx: Option<watch::Receiver<u64>>,
}

impl ChangeWaiter {
    /// A waiter that never completes
    pub fn never() -> Self {
        Self { rx: None }
    }

    /// True if a change already happened since the waiter was created
    pub fn has_changed(&self) -> bool {
        self.rx
            .as_ref()
            .is_some_and(|rx| rx.has_changed().unwrap_or(false))
    }

    /// Complete on the first change after this waiter was created
    pub async fn changed(self) {
        match self.rx {
            Some(mut rx) => {
                if rx.changed().await.is_err() {
                    // Watcher dropped; nothing will ever signal again
                    std::future::pending::<()>().await;
                }
            }
            None => std::future::pending::<()>().await,
        }
    }
}

/// Generation counter per shard, shared by clones
#[derive(Clone, Debug, Default)]
pub struct ShardSignals {
    senders: Arc<Mutex<HashMap<Shard, watch::Sender<u64>>>>,
}

impl ShardSignals {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_sender<R>(&self, shard: &Shard, f: impl FnOnce(&watch::Sender<u64>) -> R) -> R {
        let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        let sender = senders
            .entry(shard.clone())
            .or_insert_with(|| watch::channel(0).0);
        f(sender)
    }

    /// Advance the shard's generation, waking every current waiter
    pub fn bump(&self, shard: &Shard) {
        self.with_sender(shard, |tx| tx.send_modify(|generation| *generation += 1));
    }

    pub fn subscribe(&self, shard: &Shard) -> ChangeWaiter {
        ChangeWaiter {
            rx: Some(self.with_sender(shard, |tx| tx.subscribe())),
        }
    }

    pub fn generation(&self, shard: &Shard) -> u64 {
        self.with_sender(shard, |tx| *tx.borrow())
    }
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod tests;
