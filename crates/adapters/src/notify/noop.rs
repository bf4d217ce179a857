// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{CompletionNotifier, NotifyError};
use async_trait::async_trait;
use oplog_core::{LogKind, Shard};

/// Notifier for single-process deployments
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpNotifier;

impl NoOpNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CompletionNotifier for NoOpNotifier {
    async fn notify(&self, _shard: &Shard, _kind: LogKind) -> Result<(), NotifyError> {
        Ok(())
    }
}
