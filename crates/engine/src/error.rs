// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for scopes and log processing

use crate::fault::InjectedFault;
use oplog_core::{LogKind, Shard};
use oplog_storage::StoreError;
use std::fmt;
use thiserror::Error;

/// Terminal state of an operation scope
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeOutcome {
    Committed,
    RolledBack,
}

impl fmt::Display for ScopeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeOutcome::Committed => f.write_str("committed"),
            ScopeOutcome::RolledBack => f.write_str("rolled back"),
        }
    }
}

/// Errors surfaced to the code running an operation scope
#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("scope is bound to shard {bound}, cannot use shard {requested}")]
    WrongShard { bound: Shard, requested: Shard },
    #[error("operation {0} has no command")]
    NoCommand(String),
    #[error("scope already {0}")]
    AlreadyClosed(ScopeOutcome),
    #[error("{kind} entry {uuid} is no longer new")]
    EntryNotNew { kind: LogKind, uuid: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("cannot serialize operation: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Injected(#[from] InjectedFault),
}

/// Errors raised by a log handler
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Worth retrying later
    #[error("transient handler failure: {0}")]
    Transient(String),
    #[error("handler failed: {0}")]
    Failed(String),
}

impl HandlerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, HandlerError::Transient(_))
    }
}

/// Errors from reading, dispatching and trimming logs
#[derive(Debug, Error)]
pub enum LogError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{kind} entry {key} not found")]
    EntryNotFound { kind: LogKind, key: String },
    #[error(transparent)]
    Handler(#[from] HandlerError),
    #[error("{0} entries cannot be discarded")]
    CannotDiscard(LogKind),
    #[error("cannot decode entry: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Injected(#[from] InjectedFault),
}

impl LogError {
    /// Classify using the store's own transient-fault rules for store errors
    pub fn is_transient_with(&self, store_transient: impl Fn(&StoreError) -> bool) -> bool {
        match self {
            LogError::Store(e) => store_transient(e),
            LogError::EntryNotFound { .. } => true,
            LogError::Handler(e) => e.is_transient(),
            LogError::Injected(f) => f.transient,
            LogError::CannotDiscard(_) | LogError::Decode(_) => false,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.is_transient_with(StoreError::is_transient)
    }
}
