// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-process completion notifiers

mod file;
mod noop;

pub use file::FileTouchNotifier;
pub use noop::NoOpNotifier;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeNotifier, NotifyCall};

use async_trait::async_trait;
use oplog_core::{LogKind, Shard};
use thiserror::Error;

/// Errors from notifier operations
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("marker io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("notification failed: {0}")]
    Failed(String),
}

/// Tells other processes that `kind` in `shard` has new entries
#[async_trait]
pub trait CompletionNotifier: Clone + Send + Sync + 'static {
    async fn notify(&self, shard: &Shard, kind: LogKind) -> Result<(), NotifyError>;
}
