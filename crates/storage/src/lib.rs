// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! oplog-storage: the relational store contract behind the logs
//!
//! `LogStore` / `LogTransaction` describe what the log layer needs from a
//! database: transactions with an isolation level, store-generated per-shard
//! sequence values, skip-locked reads and batched deletes. `MemoryLogStore`
//! implements the contract in memory for tests and single-process use.

mod error;
mod memory;
mod store;
mod types;

pub use error::StoreError;
pub use memory::{MemoryLogStore, MemoryTransaction};
pub use store::{LogStore, LogTransaction};
pub use types::LogStats;
