// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Collaborators driven by the daemon and the RPC surface.
//!
//! [`ProcessRuntime`] owns the processes; [`LogStore`] gives access to one
//! log file. The daemon only talks to these traits.

use async_trait::async_trait;
use nix::sys::signal::Signal;
use std::fmt;
use std::sync::Arc;

use crate::errors::Result;
use crate::program::ProgramDescriptor;
use crate::state::ProcessState;

/// Identifies one process known to a runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessHandle(String);

impl ProcessHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// Point-in-time view of one process. Times are unix seconds, 0 when unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub name: String,
    pub group: String,
    pub description: String,
    pub start: i64,
    pub stop: i64,
    pub now: i64,
    pub state: ProcessState,
    pub spawnerr: String,
    pub exitstatus: i32,
    pub logfile: String,
    pub stdout_logfile: String,
    pub stderr_logfile: String,
    pub pid: u32,
}

#[async_trait]
pub trait ProcessRuntime: Send + Sync {
    fn find(&self, name: &str) -> Option<ProcessHandle>;

    /// Every process, in the runtime's iteration order.
    fn handles(&self) -> Vec<ProcessHandle>;

    fn for_each(&self, f: &mut dyn FnMut(&ProcessHandle)) {
        for handle in self.handles() {
            f(&handle);
        }
    }

    /// Register `descriptor`, replacing the settings of a process with the
    /// same name. A running process keeps running.
    async fn create_or_update(&self, descriptor: ProgramDescriptor) -> Result<ProcessHandle>;

    /// Stop and forget `name`.
    async fn remove(&self, name: &str) -> Result<()>;

    /// With `wait`, returns once the process left STARTING/BACKOFF.
    async fn start(&self, handle: &ProcessHandle, wait: bool) -> Result<()>;

    /// With `wait`, returns once the process left STOPPING.
    async fn stop(&self, handle: &ProcessHandle, wait: bool) -> Result<()>;

    async fn signal(&self, handle: &ProcessHandle, signal: Signal) -> Result<()>;

    fn state(&self, handle: &ProcessHandle) -> ProcessState;

    fn info(&self, handle: &ProcessHandle) -> Result<ProcessInfo>;

    async fn send_stdin(&self, handle: &ProcessHandle, chars: &str) -> Result<()>;

    fn log(&self, handle: &ProcessHandle, stream: LogStream) -> Result<Arc<dyn LogStore>>;
}

/// Random access to one log.
pub trait LogStore: Send + Sync {
    /// Negative `offset` reads the last `|offset|` bytes; zero `length` reads
    /// to the end.
    fn read_log(&self, offset: i64, length: i64) -> Result<String>;

    /// Returns `(data, next_offset, overflowed)`.
    fn read_tail_log(&self, offset: i64, length: i64) -> Result<(String, u64, bool)>;

    fn clear_log(&self) -> Result<()>;
}
