// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use supervisord_log::{LogHandle, read_range, tail_range};

use crate::errors::Result;
use crate::runtime::LogStore;

/// A child's stdout or stderr log file.
#[derive(Debug, Clone)]
pub struct FileLogStore {
    path: PathBuf,
}

impl FileLogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogStore for FileLogStore {
    fn read_log(&self, offset: i64, length: i64) -> Result<String> {
        Ok(read_range(&self.path, offset, length)?)
    }

    fn read_tail_log(&self, offset: i64, length: i64) -> Result<(String, u64, bool)> {
        Ok(tail_range(&self.path, offset, length)?)
    }

    fn clear_log(&self) -> Result<()> {
        match OpenOptions::new().write(true).truncate(true).open(&self.path) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// The daemon's own log.
impl LogStore for LogHandle {
    fn read_log(&self, offset: i64, length: i64) -> Result<String> {
        Ok(self.read(offset, length)?)
    }

    fn read_tail_log(&self, offset: i64, length: i64) -> Result<(String, u64, bool)> {
        Ok(self.tail(offset, length)?)
    }

    fn clear_log(&self) -> Result<()> {
        Ok(self.clear()?)
    }
}
