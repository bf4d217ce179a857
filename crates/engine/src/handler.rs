// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handler contracts for log entries

use crate::error::HandlerError;
use async_trait::async_trait;
use oplog_core::{EventEntry, Operation, Shard};
use std::sync::Arc;

/// Side effect for co-processed operations.
///
/// Every host runs it for every operation, and restarts redeliver, so
/// implementations must be idempotent.
#[async_trait]
pub trait OperationHandler: Send + Sync + 'static {
    async fn handle(&self, shard: &Shard, operation: &Operation) -> Result<(), HandlerError>;
}

/// Side effect for an exclusively claimed event or timer.
///
/// Runs while the claiming transaction holds the row lock; the entry is
/// marked processed only if this returns `Ok`.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, shard: &Shard, entry: &EventEntry) -> Result<(), HandlerError>;
}

#[async_trait]
impl<H: OperationHandler + ?Sized> OperationHandler for Arc<H> {
    async fn handle(&self, shard: &Shard, operation: &Operation) -> Result<(), HandlerError> {
        (**self).handle(shard, operation).await
    }
}

#[async_trait]
impl<H: EventHandler + ?Sized> EventHandler for Arc<H> {
    async fn handle(&self, shard: &Shard, entry: &EventEntry) -> Result<(), HandlerError> {
        (**self).handle(shard, entry).await
    }
}
