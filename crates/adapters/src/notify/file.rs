// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{CompletionNotifier, NotifyError};
use crate::marker::{marker_path, touch_marker};
use async_trait::async_trait;
use oplog_core::{LogKind, Shard};
use std::path::{Path, PathBuf};

/// Touches the marker file watched by `FileLogWatcher` instances
#[derive(Clone, Debug)]
pub struct FileTouchNotifier {
    dir: PathBuf,
}

impl FileTouchNotifier {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl CompletionNotifier for FileTouchNotifier {
    async fn notify(&self, shard: &Shard, kind: LogKind) -> Result<(), NotifyError> {
        let path = marker_path(&self.dir, kind, shard);
        tokio::task::spawn_blocking(move || touch_marker(&path))
            .await
            .map_err(|e| NotifyError::Failed(e.to_string()))??;
        Ok(())
    }
}
