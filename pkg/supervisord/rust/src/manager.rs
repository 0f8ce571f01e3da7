// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! [`ProcessRuntime`] backed by local tokio child processes.
//!
//! Every request (spawn, signal, state change) is issued while holding the
//! process's `std::sync::Mutex`, with no await point in between, so a caller
//! that is dropped mid-call has either issued its request fully or not at
//! all. Waiting happens afterwards on a `watch` channel carrying the state.

use async_trait::async_trait;
use log::{debug, info, warn};
use nix::sys::signal::Signal;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::io::AsyncWriteExt;
use tokio::process::Child;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

use crate::errors::{Error, Result};
use crate::logstore::FileLogStore;
use crate::process::ManagedProcess;
use crate::program::ProgramDescriptor;
use crate::runtime::{LogStore, LogStream, ProcessHandle, ProcessInfo, ProcessRuntime};
use crate::signal::parse_signal;
use crate::state::ProcessState;

struct ProcessSlot {
    process: Mutex<ManagedProcess>,
    state: watch::Sender<ProcessState>,
}

impl ProcessSlot {
    fn lock(&self) -> MutexGuard<'_, ManagedProcess> {
        self.process.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transition(&self, process: &mut ManagedProcess, next: ProcessState) -> bool {
        if process.transition(next) {
            self.state.send_replace(next);
            return true;
        }
        false
    }
}

#[derive(Default)]
pub struct LocalRuntime {
    slots: RwLock<BTreeMap<String, Arc<ProcessSlot>>>,
}

impl LocalRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, name: &str) -> Result<Arc<ProcessSlot>> {
        self.slots
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(name))
    }

    pub fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Spawn the process and arm its start timer and exit watcher.
fn launch(slot: &Arc<ProcessSlot>, process: &mut ManagedProcess) {
    process.generation += 1;
    let generation = process.generation;
    if !slot.transition(process, ProcessState::Starting) {
        return;
    }

    let child = match process.spawn() {
        Ok(child) => child,
        Err(_) => {
            backoff(slot, process);
            return;
        }
    };
    tokio::spawn(watch_exit(Arc::clone(slot), child, generation));

    let startsecs = process.descriptor().startsecs;
    if startsecs == 0 {
        slot.transition(process, ProcessState::Running);
        process.retries = 0;
        return;
    }
    let slot = Arc::clone(slot);
    tokio::spawn(async move {
        sleep(Duration::from_secs(startsecs)).await;
        let mut process = slot.lock();
        if process.generation == generation && process.state() == ProcessState::Starting {
            slot.transition(&mut process, ProcessState::Running);
            process.retries = 0;
        }
    });
}

/// A start attempt failed: retry after a growing delay or give up.
fn backoff(slot: &Arc<ProcessSlot>, process: &mut ManagedProcess) {
    slot.transition(process, ProcessState::Backoff);
    process.retries += 1;
    if process.retries > process.descriptor().startretries {
        warn!(
            "[{}] gave up after {} start attempts",
            process.name, process.retries
        );
        slot.transition(process, ProcessState::Fatal);
        return;
    }

    let generation = process.generation;
    let delay = Duration::from_secs(u64::from(process.retries));
    debug!("[{}] retrying in {}s", process.name, delay.as_secs());
    let slot = Arc::clone(slot);
    tokio::spawn(async move {
        sleep(delay).await;
        let mut process = slot.lock();
        if process.generation == generation && process.state() == ProcessState::Backoff {
            launch(&slot, &mut process);
        }
    });
}

async fn watch_exit(slot: Arc<ProcessSlot>, mut child: Child, generation: u64) {
    let code = match child.wait().await {
        Ok(status) => {
            info!("[{}] exited with {status}", slot.lock().name);
            status.code()
        }
        Err(e) => {
            warn!("[{}] wait failed: {e}", slot.lock().name);
            None
        }
    };

    let mut process = slot.lock();
    if process.generation != generation {
        return;
    }
    process.exited(code);
    match process.state() {
        ProcessState::Stopping => {
            slot.transition(&mut process, ProcessState::Stopped);
        }
        ProcessState::Starting => backoff(&slot, &mut process),
        ProcessState::Running => {
            slot.transition(&mut process, ProcessState::Exited);
            if process.descriptor().should_restart(code) {
                info!("[{}] restarting", process.name);
                process.retries = 0;
                launch(&slot, &mut process);
            }
        }
        state => debug!("[{}] exit observed in state {state}", process.name),
    }
}

/// Send the stop signal and arm the SIGKILL escalation.
fn request_stop(slot: &Arc<ProcessSlot>, process: &mut ManagedProcess) {
    match process.state() {
        ProcessState::Running | ProcessState::Starting => {}
        ProcessState::Backoff => {
            process.generation += 1;
            slot.transition(process, ProcessState::Stopped);
            return;
        }
        _ => return,
    }

    slot.transition(process, ProcessState::Stopping);
    let sig = parse_signal(&process.descriptor().stopsignal);
    info!("[{}] sending {sig}", process.name);
    if let Err(e) = process.send_signal(sig) {
        debug!("[{}] stop signal not delivered: {e}", process.name);
    }

    let generation = process.generation;
    let wait = Duration::from_secs(process.descriptor().stopwaitsecs);
    let slot = Arc::clone(slot);
    tokio::spawn(async move {
        sleep(wait).await;
        let process = slot.lock();
        if process.generation == generation && process.state() == ProcessState::Stopping {
            warn!(
                "[{}] stop timeout ({}s) reached, sending SIGKILL",
                process.name,
                wait.as_secs()
            );
            let _ = process.send_signal(Signal::SIGKILL);
        }
    });
}

#[async_trait]
impl ProcessRuntime for LocalRuntime {
    fn find(&self, name: &str) -> Option<ProcessHandle> {
        self.slot(name).ok().map(|_| ProcessHandle::new(name))
    }

    fn handles(&self) -> Vec<ProcessHandle> {
        self.slots
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .map(ProcessHandle::new)
            .collect()
    }

    async fn create_or_update(&self, descriptor: ProgramDescriptor) -> Result<ProcessHandle> {
        let handle = ProcessHandle::new(&descriptor.name);
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        match slots.get(&descriptor.name) {
            Some(slot) => {
                debug!("[{}] updating settings", descriptor.name);
                slot.lock().set_descriptor(descriptor);
            }
            None => {
                debug!("[{}] created", descriptor.name);
                let (state, _) = watch::channel(ProcessState::Stopped);
                slots.insert(
                    descriptor.name.clone(),
                    Arc::new(ProcessSlot {
                        process: Mutex::new(ManagedProcess::new(descriptor)),
                        state,
                    }),
                );
            }
        }
        Ok(handle)
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let handle = ProcessHandle::new(name);
        self.stop(&handle, true).await?;
        self.slots
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
        info!("[{name}] removed");
        Ok(())
    }

    async fn start(&self, handle: &ProcessHandle, wait: bool) -> Result<()> {
        let slot = self.slot(handle.name())?;
        let mut rx = {
            let mut process = slot.lock();
            match process.state() {
                ProcessState::Stopping => {
                    return Err(Error::Spawn {
                        name: process.name.clone(),
                        reason: "process is stopping".to_string(),
                    });
                }
                state if state.has_child() || state.is_starting() => {}
                _ => {
                    process.retries = 0;
                    launch(&slot, &mut process);
                }
            }
            slot.state.subscribe()
        };
        if !wait {
            return Ok(());
        }

        let state = *rx
            .wait_for(|s| !s.is_starting())
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        if state == ProcessState::Fatal {
            let process = slot.lock();
            return Err(Error::Spawn {
                name: process.name.clone(),
                reason: process.info().description,
            });
        }
        Ok(())
    }

    async fn stop(&self, handle: &ProcessHandle, wait: bool) -> Result<()> {
        let slot = self.slot(handle.name())?;
        let mut rx = {
            let mut process = slot.lock();
            request_stop(&slot, &mut process);
            slot.state.subscribe()
        };
        if wait {
            rx.wait_for(|s| *s != ProcessState::Stopping)
                .await
                .map_err(|e| Error::Transport(e.to_string()))?;
        }
        Ok(())
    }

    async fn signal(&self, handle: &ProcessHandle, signal: Signal) -> Result<()> {
        let slot = self.slot(handle.name())?;
        let process = slot.lock();
        info!("[{}] sending {signal}", process.name);
        process.send_signal(signal)
    }

    fn state(&self, handle: &ProcessHandle) -> ProcessState {
        self.slot(handle.name())
            .map(|slot| slot.lock().state())
            .unwrap_or(ProcessState::Unknown)
    }

    fn info(&self, handle: &ProcessHandle) -> Result<ProcessInfo> {
        Ok(self.slot(handle.name())?.lock().info())
    }

    async fn send_stdin(&self, handle: &ProcessHandle, chars: &str) -> Result<()> {
        let slot = self.slot(handle.name())?;
        let stdin = {
            let process = slot.lock();
            if !process.state().is_running() {
                return Err(Error::NotRunning {
                    name: process.name.clone(),
                });
            }
            process.stdin()
        };
        let Some(stdin) = stdin else {
            return Err(Error::NotRunning {
                name: handle.name().to_string(),
            });
        };
        let mut stdin = stdin.lock().await;
        stdin.write_all(chars.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    fn log(&self, handle: &ProcessHandle, stream: LogStream) -> Result<Arc<dyn LogStore>> {
        let slot = self.slot(handle.name())?;
        let process = slot.lock();
        let descriptor = process.descriptor();
        let path = match stream {
            LogStream::Stdout => descriptor.stdout_logfile.clone(),
            LogStream::Stderr if descriptor.redirect_stderr => descriptor.stdout_logfile.clone(),
            LogStream::Stderr => descriptor.stderr_logfile.clone(),
        };
        let path = path.ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} has no {stream:?} log file", process.name),
            ))
        })?;
        Ok(Arc::new(FileLogStore::new(path)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::process::tests::make_descriptor;

    async fn runtime_with(descriptors: Vec<ProgramDescriptor>) -> LocalRuntime {
        let runtime = LocalRuntime::new();
        for d in descriptors {
            runtime.create_or_update(d).await.unwrap();
        }
        runtime
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let runtime = runtime_with(vec![make_descriptor("sleeper", "/bin/sleep 60")]).await;
        let h = runtime.find("sleeper").unwrap();
        assert_eq!(runtime.state(&h), ProcessState::Stopped);

        runtime.start(&h, true).await.unwrap();
        assert_eq!(runtime.state(&h), ProcessState::Running);
        assert!(runtime.info(&h).unwrap().pid > 0);

        runtime.stop(&h, true).await.unwrap();
        assert_eq!(runtime.state(&h), ProcessState::Stopped);
        assert_eq!(runtime.info(&h).unwrap().pid, 0);
    }

    #[tokio::test]
    async fn test_startsecs_waits_for_running() {
        let mut d = make_descriptor("slow", "/bin/sleep 60");
        d.startsecs = 1;
        let runtime = runtime_with(vec![d]).await;
        let h = runtime.find("slow").unwrap();

        runtime.start(&h, false).await.unwrap();
        assert_eq!(runtime.state(&h), ProcessState::Starting);
        runtime.start(&h, true).await.unwrap();
        assert_eq!(runtime.state(&h), ProcessState::Running);
        runtime.stop(&h, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_start_failure_goes_fatal() {
        let mut d = make_descriptor("bad", "/nonexistent/binary");
        d.startretries = 0;
        let runtime = runtime_with(vec![d]).await;
        let h = runtime.find("bad").unwrap();

        let err = runtime.start(&h, true).await.unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
        assert_eq!(runtime.state(&h), ProcessState::Fatal);
        assert!(!runtime.info(&h).unwrap().spawnerr.is_empty());
    }

    #[tokio::test]
    async fn test_quick_exit_while_starting_backs_off_then_fatal() {
        let mut d = make_descriptor("flappy", "/bin/sh -c 'exit 1'");
        d.startsecs = 5;
        d.startretries = 1;
        let runtime = runtime_with(vec![d]).await;
        let h = runtime.find("flappy").unwrap();

        assert!(runtime.start(&h, true).await.is_err());
        assert_eq!(runtime.state(&h), ProcessState::Fatal);
    }

    #[tokio::test]
    async fn test_autorestart_on_unexpected_exit() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("runs");
        let mut d = make_descriptor(
            "restarts",
            &format!("/bin/sh -c 'echo x >> {}; sleep 0.2; exit 3'", marker.display()),
        );
        d.stopwaitsecs = 1;
        let runtime = runtime_with(vec![d]).await;
        let h = runtime.find("restarts").unwrap();
        runtime.start(&h, true).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let runs = std::fs::read_to_string(&marker).unwrap().lines().count();
        assert!(runs >= 2, "expected a restart, got {runs} run(s)");
        runtime.stop(&h, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_expected_exit_is_not_restarted() {
        let runtime = runtime_with(vec![make_descriptor("once", "/bin/sh -c 'exit 0'")]).await;
        let h = runtime.find("once").unwrap();
        runtime.start(&h, true).await.unwrap();

        let slot = runtime.slot("once").unwrap();
        let mut rx = slot.state.subscribe();
        tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|s| *s == ProcessState::Exited),
        )
        .await
        .unwrap()
        .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(runtime.state(&h), ProcessState::Exited);
        assert_eq!(runtime.info(&h).unwrap().exitstatus, 0);
    }

    #[tokio::test]
    async fn test_stop_escalates_to_sigkill() {
        let mut d = make_descriptor("stubborn", "/bin/sh -c \"trap '' TERM; sleep 60\"");
        d.stopwaitsecs = 1;
        let runtime = runtime_with(vec![d]).await;
        let h = runtime.find("stubborn").unwrap();
        runtime.start(&h, true).await.unwrap();
        // Give the shell time to install its trap.
        tokio::time::sleep(Duration::from_millis(200)).await;

        tokio::time::timeout(Duration::from_secs(10), runtime.stop(&h, true))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(runtime.state(&h), ProcessState::Stopped);
    }

    #[tokio::test]
    async fn test_missing_process() {
        let runtime = LocalRuntime::new();
        let h = ProcessHandle::new("ghost");
        assert!(runtime.find("ghost").is_none());
        assert!(matches!(
            runtime.stop(&h, true).await,
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            runtime.start(&h, true).await,
            Err(Error::NotFound { .. })
        ));
        assert_eq!(runtime.state(&h), ProcessState::Unknown);
        assert!(runtime.is_empty());
    }

    #[tokio::test]
    async fn test_update_keeps_running_process() {
        let runtime = runtime_with(vec![make_descriptor("svc", "/bin/sleep 60")]).await;
        let h = runtime.find("svc").unwrap();
        runtime.start(&h, true).await.unwrap();
        let pid = runtime.info(&h).unwrap().pid;

        let mut updated = make_descriptor("svc", "/bin/sleep 60");
        updated.group = "core".to_string();
        runtime.create_or_update(updated).await.unwrap();
        let info = runtime.info(&h).unwrap();
        assert_eq!(info.pid, pid);
        assert_eq!(info.group, "core");
        assert_eq!(runtime.len(), 1);

        runtime.remove("svc").await.unwrap();
        assert!(runtime.find("svc").is_none());
    }

    #[tokio::test]
    async fn test_stdin_and_logs() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = make_descriptor("cat", "/bin/cat");
        d.stdout_logfile = Some(dir.path().join("cat.out"));
        let runtime = runtime_with(vec![d]).await;
        let h = runtime.find("cat").unwrap();

        assert!(matches!(
            runtime.send_stdin(&h, "x").await,
            Err(Error::NotRunning { .. })
        ));
        runtime.start(&h, true).await.unwrap();
        runtime.send_stdin(&h, "hello\n").await.unwrap();

        let log = runtime.log(&h, LogStream::Stdout).unwrap();
        let mut data = String::new();
        for _ in 0..50 {
            data = log.read_log(0, 0).unwrap();
            if !data.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(data, "hello\n");
        assert!(runtime.log(&h, LogStream::Stderr).is_err());
        runtime.stop(&h, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_handles_are_name_ordered() {
        let runtime = runtime_with(vec![
            make_descriptor("b", "/bin/true"),
            make_descriptor("a", "/bin/true"),
        ])
        .await;
        let names: Vec<String> = runtime
            .handles()
            .iter()
            .map(|h| h.name().to_string())
            .collect();
        assert_eq!(names, ["a", "b"]);

        let mut seen = Vec::new();
        runtime.for_each(&mut |h| seen.push(h.name().to_string()));
        assert_eq!(seen, names);
    }
}
