// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-shard marker files shared by processes on one machine

use oplog_core::{LogKind, Shard};
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Marker file for `kind` in `shard`, e.g. `<dir>/operations-eu-west.marker`
pub fn marker_path(dir: &Path, kind: LogKind, shard: &Shard) -> PathBuf {
    dir.join(format!("{}-{}.marker", kind.name(), shard.file_stem()))
}

/// Create the marker or bump its modification time; returns the time stored
pub fn touch_marker(path: &Path) -> io::Result<SystemTime> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)?;
    file.set_modified(SystemTime::now())?;
    file.metadata()?.modified()
}
