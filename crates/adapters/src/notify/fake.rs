// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake notifier for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{CompletionNotifier, NotifyError};
use async_trait::async_trait;
use oplog_core::{LogKind, Shard};
use std::sync::{Arc, Mutex};

/// Recorded notification attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyCall {
    pub shard: Shard,
    pub kind: LogKind,
    pub succeeded: bool,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<NotifyCall>,
    failures: u32,
}

/// Fake notifier that records calls and can fail on demand
#[derive(Clone, Default)]
pub struct FakeNotifier {
    state: Arc<Mutex<FakeState>>,
}

impl FakeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` notifications
    pub fn fail_next(&self, count: u32) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).failures = count;
    }

    /// Get all recorded attempts
    pub fn calls(&self) -> Vec<NotifyCall> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .calls
            .clone()
    }

    /// Successful notifications only
    pub fn delivered(&self) -> Vec<NotifyCall> {
        self.calls().into_iter().filter(|c| c.succeeded).collect()
    }
}

#[async_trait]
impl CompletionNotifier for FakeNotifier {
    async fn notify(&self, shard: &Shard, kind: LogKind) -> Result<(), NotifyError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let succeeded = state.failures == 0;
        state.failures = state.failures.saturating_sub(1);
        state.calls.push(NotifyCall {
            shard: shard.clone(),
            kind,
            succeeded,
        });
        if succeeded {
            Ok(())
        } else {
            Err(NotifyError::Failed("injected failure".to_string()))
        }
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
