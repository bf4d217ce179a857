// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervised retry-forever loops

use oplog_core::{RetryDelays, Shard};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sleep for `duration`; returns `false` if cancelled first
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Run `cycle` until `cancel` fires.
///
/// A cycle that fails is logged and restarted after a backoff from
/// `delays`; a cycle that returns `Ok` is restarted immediately.
pub async fn run_supervised<F, Fut, E>(
    name: &'static str,
    shard: &Shard,
    delays: RetryDelays,
    cancel: &CancellationToken,
    mut cycle: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    let mut failures: u32 = 0;
    tracing::debug!(name, %shard, "loop started");
    while !cancel.is_cancelled() {
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = cycle() => result,
        };
        match result {
            Ok(()) => failures = 0,
            Err(e) => {
                failures = failures.saturating_add(1);
                let delay = delays.delay(failures);
                tracing::error!(
                    name,
                    %shard,
                    error = %e,
                    failures,
                    retry_in_ms = delay.as_millis() as u64,
                    "loop failed"
                );
                if !sleep_or_cancel(delay, cancel).await {
                    break;
                }
            }
        }
    }
    tracing::debug!(name, %shard, "loop stopped");
}
