// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store error taxonomy

use oplog_core::LogKind;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("transient store failure: {0}")]
    Transient(String),
    #[error("lock timeout on {kind} entry {key}")]
    LockTimeout { kind: LogKind, key: String },
    #[error("connection failure: {0}")]
    Connection(String),
    #[error("concurrency conflict on {kind} entry {key}")]
    ConcurrencyConflict { kind: LogKind, key: String },
    #[error("duplicate {kind} entry {key}")]
    DuplicateKey { kind: LogKind, key: String },
    #[error("commit failed: {0}")]
    CommitFailed(String),
    #[error("{kind} entry {key} not found")]
    NotFound { kind: LogKind, key: String },
    #[error("internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Built-in classifier for faults worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Transient(_)
                | StoreError::LockTimeout { .. }
                | StoreError::Connection(_)
                | StoreError::ConcurrencyConflict { .. }
                | StoreError::CommitFailed(_)
        )
    }
}
