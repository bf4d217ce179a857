// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shard key partitioning the database

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque key of an independent database partition.
///
/// The empty key is the single-shard deployment. All log state (cursor,
/// watcher, reprocess registry) is tracked per shard, and shards are never
/// ordered against each other.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Shard(String);

impl Shard {
    /// The single-shard deployment key
    pub const NONE: Shard = Shard(String::new());

    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_none(&self) -> bool {
        self.0.is_empty()
    }

    /// A file-name safe rendering of the key
    pub fn file_stem(&self) -> String {
        if self.is_none() {
            return "_default".to_string();
        }
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("<none>")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<&str> for Shard {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Shard {
    fn from(s: String) -> Self {
        Self(s)
    }
}
