// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use log::{info, warn};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::process::{Child, ChildStdin, Command};

use crate::errors::{Error, Result};
use crate::program::ProgramDescriptor;
use crate::runtime::ProcessInfo;
use crate::state::ProcessState;

pub(crate) fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Bookkeeping for one supervised program instance. The child itself is
/// owned by the task waiting on it.
pub struct ManagedProcess {
    pub name: String,
    descriptor: ProgramDescriptor,
    state: ProcessState,
    pid: Option<u32>,
    stdin: Option<Arc<tokio::sync::Mutex<ChildStdin>>>,
    start_time: i64,
    stop_time: i64,
    exit_status: i32,
    spawn_error: String,
    /// Failed starts since the last successful one.
    pub(crate) retries: u32,
    /// Bumped on every launch and cancelled retry; timers holding an older
    /// value are stale.
    pub(crate) generation: u64,
}

impl ManagedProcess {
    pub fn new(descriptor: ProgramDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            descriptor,
            state: ProcessState::Stopped,
            pid: None,
            stdin: None,
            start_time: 0,
            stop_time: 0,
            exit_status: 0,
            spawn_error: String::new(),
            retries: 0,
            generation: 0,
        }
    }

    pub fn descriptor(&self) -> &ProgramDescriptor {
        &self.descriptor
    }

    pub fn set_descriptor(&mut self, descriptor: ProgramDescriptor) {
        self.descriptor = descriptor;
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Move to `next`. Illegal transitions are logged and ignored.
    pub(crate) fn transition(&mut self, next: ProcessState) -> bool {
        if !self.state.can_transition_to(next) {
            warn!("[{}] ignoring transition {} -> {next}", self.name, self.state);
            return false;
        }
        info!("[{}] {} -> {next}", self.name, self.state);
        self.state = next;
        true
    }

    pub fn spawn(&mut self) -> Result<Child> {
        let argv = self.descriptor.argv.clone();
        let Some(program) = argv.first() else {
            return Err(self.spawn_failed("empty command".to_string()));
        };
        let mut cmd = Command::new(program);
        cmd.args(&argv[1..]);
        for (k, v) in &self.descriptor.environment {
            cmd.env(k, v);
        }
        cmd.env("SUPERVISOR_PROCESS_NAME", &self.name);
        cmd.env("SUPERVISOR_GROUP_NAME", &self.descriptor.group);
        if let Some(ref dir) = self.descriptor.directory {
            cmd.current_dir(dir);
        }

        let stdout = open_log(self.descriptor.stdout_logfile.as_deref())
            .map_err(|e| self.spawn_failed(format!("stdout_logfile: {e}")))?;
        let stderr = if self.descriptor.redirect_stderr {
            match &stdout {
                Some(f) => Some(
                    f.try_clone()
                        .map_err(|e| self.spawn_failed(format!("stdout_logfile: {e}")))?,
                ),
                None => None,
            }
        } else {
            open_log(self.descriptor.stderr_logfile.as_deref())
                .map_err(|e| self.spawn_failed(format!("stderr_logfile: {e}")))?
        };
        cmd.stdout(stdout.map_or_else(Stdio::null, Stdio::from));
        cmd.stderr(stderr.map_or_else(Stdio::null, Stdio::from));
        cmd.stdin(Stdio::piped());
        cmd.kill_on_drop(false);

        let mut child = cmd
            .spawn()
            .map_err(|e| self.spawn_failed(format!("{program}: {e}")))?;

        let pid = child.id().unwrap_or(0);
        info!(
            "[{}] spawned (pid={pid}, cmd={})",
            self.name, self.descriptor.command
        );
        self.pid = Some(pid);
        self.stdin = child
            .stdin
            .take()
            .map(|s| Arc::new(tokio::sync::Mutex::new(s)));
        self.start_time = now();
        self.spawn_error.clear();
        Ok(child)
    }

    fn spawn_failed(&mut self, reason: String) -> Error {
        warn!("[{}] spawn error: {reason}", self.name);
        self.spawn_error = reason.clone();
        Error::Spawn {
            name: self.name.clone(),
            reason,
        }
    }

    pub fn spawn_error(&self) -> &str {
        &self.spawn_error
    }

    /// Record the child's exit.
    pub(crate) fn exited(&mut self, code: Option<i32>) {
        self.pid = None;
        self.stdin = None;
        self.stop_time = now();
        self.exit_status = code.unwrap_or(-1);
    }

    pub fn send_signal(&self, sig: Signal) -> Result<()> {
        let Some(pid) = self.pid else {
            return Err(Error::NotRunning {
                name: self.name.clone(),
            });
        };
        let pid = i32::try_from(pid).map_err(|_| Error::NotRunning {
            name: self.name.clone(),
        })?;
        if let Err(e) = signal::kill(Pid::from_raw(pid), sig) {
            warn!("[{}] failed to send {sig}: {e}", self.name);
            return Err(Error::Io(std::io::Error::from(e)));
        }
        Ok(())
    }

    pub(crate) fn stdin(&self) -> Option<Arc<tokio::sync::Mutex<ChildStdin>>> {
        self.stdin.clone()
    }

    fn description(&self) -> String {
        match self.state {
            ProcessState::Running => {
                let uptime = (now() - self.start_time).max(0);
                format!(
                    "pid {}, uptime {}:{:02}:{:02}",
                    self.pid.unwrap_or(0),
                    uptime / 3600,
                    (uptime / 60) % 60,
                    uptime % 60
                )
            }
            ProcessState::Fatal | ProcessState::Backoff if !self.spawn_error.is_empty() => {
                self.spawn_error.clone()
            }
            ProcessState::Fatal | ProcessState::Backoff => {
                "Exited too quickly (process log may have details)".to_string()
            }
            ProcessState::Stopped if self.start_time == 0 => "Not started".to_string(),
            _ => self.descriptor.description.clone().unwrap_or_default(),
        }
    }

    pub fn info(&self) -> ProcessInfo {
        let path = |p: &Option<std::path::PathBuf>| {
            p.as_ref()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        let stdout_logfile = path(&self.descriptor.stdout_logfile);
        ProcessInfo {
            name: self.name.clone(),
            group: self.descriptor.group.clone(),
            description: self.description(),
            start: self.start_time,
            stop: self.stop_time,
            now: now(),
            state: self.state,
            spawnerr: self.spawn_error.clone(),
            exitstatus: self.exit_status,
            logfile: stdout_logfile.clone(),
            stdout_logfile,
            stderr_logfile: path(&self.descriptor.stderr_logfile),
            pid: self.pid.unwrap_or(0),
        }
    }
}

fn open_log(path: Option<&Path>) -> std::io::Result<Option<File>> {
    path.map(|p| OpenOptions::new().create(true).append(true).open(p))
        .transpose()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn make_descriptor(name: &str, command: &str) -> ProgramDescriptor {
        let mut d = ProgramDescriptor::new(name, command).unwrap();
        d.startsecs = 0;
        d
    }

    #[tokio::test]
    async fn test_spawn_with_env_and_args() {
        let mut d = make_descriptor("env-test", "/bin/sh -c 'exit $MY_EXIT_CODE'");
        d.environment.push(("MY_EXIT_CODE".to_string(), "42".to_string()));
        let mut proc = ManagedProcess::new(d);
        let mut child = proc.spawn().unwrap();
        assert!(proc.pid().is_some());
        let status = child.wait().await.unwrap();
        assert_eq!(status.code(), Some(42));
        proc.exited(status.code());
        assert_eq!(proc.info().exitstatus, 42);
        assert_eq!(proc.info().pid, 0);
    }

    #[tokio::test]
    async fn test_spawn_nonexistent_binary() {
        let mut proc = ManagedProcess::new(make_descriptor("bad", "/nonexistent/binary"));
        assert!(matches!(proc.spawn(), Err(Error::Spawn { .. })));
        assert!(proc.pid().is_none());
        assert!(proc.spawn_error().contains("/nonexistent/binary"));
    }

    #[tokio::test]
    async fn test_stdout_goes_to_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("out.log");
        let mut d = make_descriptor("echo", "/bin/sh -c 'echo hello; echo oops >&2'");
        d.stdout_logfile = Some(log.clone());
        d.redirect_stderr = true;
        let mut proc = ManagedProcess::new(d);
        proc.spawn().unwrap().wait().await.unwrap();
        let contents = std::fs::read_to_string(&log).unwrap();
        assert!(contents.contains("hello"));
        assert!(contents.contains("oops"));
    }

    #[tokio::test]
    async fn test_send_signal() {
        let mut proc = ManagedProcess::new(make_descriptor("sig-test", "/bin/sleep 60"));
        assert!(matches!(
            proc.send_signal(Signal::SIGTERM),
            Err(Error::NotRunning { .. })
        ));
        let mut child = proc.spawn().unwrap();
        proc.send_signal(Signal::SIGTERM).unwrap();
        let status = child.wait().await.unwrap();
        assert!(!status.success());
    }

    #[test]
    fn test_transition_rules() {
        let mut proc = ManagedProcess::new(make_descriptor("t", "/bin/true"));
        assert!(!proc.transition(ProcessState::Running));
        assert_eq!(proc.state(), ProcessState::Stopped);
        assert!(proc.transition(ProcessState::Starting));
        assert!(proc.transition(ProcessState::Running));
        assert_eq!(proc.info().state, ProcessState::Running);
    }

    #[test]
    fn test_info_not_started() {
        let proc = ManagedProcess::new(make_descriptor("idle", "/bin/true"));
        let info = proc.info();
        assert_eq!(info.name, "idle");
        assert_eq!(info.group, "idle");
        assert_eq!(info.description, "Not started");
        assert_eq!(info.start, 0);
    }
}
