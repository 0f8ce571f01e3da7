// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! The daemon: published configuration snapshot, reload exclusion, daemon
//! state and the main loop.

use anyhow::Context;
use log::{error, info, warn};
use std::fs::{DirBuilder, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use supervisord_log::LogHandle;
use tokio::net::TcpListener;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{Notify, watch};
use tokio::time::{Duration, sleep};

use crate::config::ConfigStore;
use crate::errors::Result;
use crate::group::GroupDiff;
use crate::reconcile::reconcile;
use crate::rpc::server;
use crate::rpc::surface::ControlSurface;
use crate::runtime::{ProcessHandle, ProcessRuntime};
use crate::settings::{DaemonSettings, InetServerSettings, UnixServerSettings};
use crate::shutdown::shutdown_all;

/// How often the main loop looks at the restart flag.
pub const RESTART_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Delay between a `shutdown()` reply and the daemon stopping.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonStatus {
    Restarting,
    Running,
    Fatal,
}

impl DaemonStatus {
    pub fn code(self) -> i64 {
        match self {
            DaemonStatus::Restarting => 0,
            DaemonStatus::Running => 1,
            DaemonStatus::Fatal => 2,
        }
    }

    fn from_code(code: i64) -> Self {
        match code {
            0 => DaemonStatus::Restarting,
            1 => DaemonStatus::Running,
            _ => DaemonStatus::Fatal,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DaemonStatus::Restarting => "RESTARTING",
            DaemonStatus::Running => "RUNNING",
            DaemonStatus::Fatal => "FATAL",
        }
    }
}

/// Flags shared by the RPC surface and the main loop.
pub struct DaemonState {
    status: AtomicI64,
    restart: AtomicBool,
    shutdown: AtomicBool,
    shutdown_notify: Notify,
}

impl Default for DaemonState {
    fn default() -> Self {
        Self {
            status: AtomicI64::new(DaemonStatus::Running.code()),
            restart: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
        }
    }
}

impl DaemonState {
    pub fn status(&self) -> DaemonStatus {
        DaemonStatus::from_code(self.status.load(Ordering::SeqCst))
    }

    pub fn set_status(&self, status: DaemonStatus) {
        self.status.store(status.code(), Ordering::SeqCst);
    }

    pub fn request_restart(&self) {
        self.restart.store(true, Ordering::SeqCst);
    }

    /// Clear the restart flag, returning whether it was set.
    pub fn take_restart(&self) -> bool {
        self.restart.swap(false, Ordering::SeqCst)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.shutdown_notify.notify_one();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub async fn shutdown_requested(&self) {
        if self.is_shutting_down() {
            return;
        }
        self.shutdown_notify.notified().await;
    }
}

fn write_pid_file(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(parent)
            .context("Failed to create PID file parent directory")?;
    }

    let pid = std::process::id();
    let mut file = OpenOptions::new()
        .write(true)
        .mode(0o644)
        .truncate(true)
        .create(true)
        .open(path)
        .context("Failed to write PID file")?;
    file.write_all(pid.to_string().as_bytes())
        .context("Failed to write PID to file")?;

    info!("Created PID file at {}", path.display());
    Ok(())
}

fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        error!("Failed to remove PID file: {}", e);
    } else {
        info!("Removed PID file at {}", path.display());
    }
}

pub struct Supervisor {
    config_path: PathBuf,
    runtime: Arc<dyn ProcessRuntime>,
    store: RwLock<Arc<ConfigStore>>,
    reload_lock: tokio::sync::Mutex<()>,
    state: DaemonState,
    log: LogHandle,
    pidfile: Mutex<Option<PathBuf>>,
}

impl Supervisor {
    /// Nothing is loaded until the first [`Supervisor::reload`].
    pub fn new(
        config_path: impl Into<PathBuf>,
        runtime: Arc<dyn ProcessRuntime>,
        log: LogHandle,
    ) -> Self {
        let config_path = config_path.into();
        Self {
            store: RwLock::new(Arc::new(ConfigStore::empty(&config_path))),
            config_path,
            runtime,
            reload_lock: tokio::sync::Mutex::new(()),
            state: DaemonState::default(),
            log,
            pidfile: Mutex::new(None),
        }
    }

    pub fn runtime(&self) -> &dyn ProcessRuntime {
        self.runtime.as_ref()
    }

    /// The configuration in effect.
    pub fn snapshot(&self) -> Arc<ConfigStore> {
        Arc::clone(&self.store.read().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn state(&self) -> &DaemonState {
        &self.state
    }

    pub fn main_log(&self) -> &LogHandle {
        &self.log
    }

    pub fn identification(&self) -> String {
        DaemonSettings::from_store(&self.snapshot()).identifier
    }

    /// Re-read the configuration file and move the runtime to it. On a load
    /// error nothing changes.
    pub async fn reload(&self) -> Result<GroupDiff> {
        self.reload_with(false).await
    }

    async fn reload_with(&self, start_all: bool) -> Result<GroupDiff> {
        let _guard = self.reload_lock.lock().await;
        let store = ConfigStore::load(&self.config_path).inspect_err(|e| {
            error!("reload failed, keeping the previous configuration: {e}");
        })?;
        let diff = store.group_index().diff(self.snapshot().group_index());

        let known: Vec<String> = self
            .runtime
            .handles()
            .iter()
            .map(|h| h.name().to_string())
            .collect();
        let plan = reconcile(&known, &store);
        for name in &plan.to_remove {
            if let Err(e) = self.runtime.remove(name).await {
                warn!("[{name}] remove failed: {e}");
            }
        }

        let mut to_start = Vec::new();
        for descriptor in plan.to_create {
            let name = descriptor.name.clone();
            let is_new = self.runtime.find(&name).is_none();
            let autostart = descriptor.autostart;
            match self.runtime.create_or_update(descriptor).await {
                Ok(handle) if is_new || start_all => {
                    if autostart {
                        to_start.push(handle);
                    } else {
                        info!("[{name}] autostart=false, skipping");
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("[{name}] not applied: {e}"),
            }
        }

        let store = Arc::new(store);
        *self.store.write().unwrap_or_else(|e| e.into_inner()) = Arc::clone(&store);
        self.apply_settings(&store);
        info!(
            "loaded {}: added={:?} changed={:?} removed={:?}",
            self.config_path.display(),
            diff.added,
            diff.changed,
            diff.removed
        );

        for handle in to_start {
            if let Err(e) = self.runtime.start(&handle, false).await {
                warn!("[{handle}] autostart failed: {e}");
            }
        }
        Ok(diff)
    }

    fn apply_settings(&self, store: &ConfigStore) {
        let settings = DaemonSettings::from_store(store);
        if let Err(e) = self.log.reconfigure(&settings.log_config()) {
            warn!("could not switch the daemon log: {e}");
        }

        let mut current = self.pidfile.lock().unwrap_or_else(|e| e.into_inner());
        if *current == settings.pidfile {
            return;
        }
        if let Some(old) = current.take() {
            remove_pid_file(&old);
        }
        if let Some(path) = settings.pidfile {
            match write_pid_file(&path) {
                Ok(()) => *current = Some(path),
                Err(e) => warn!("{e:#}"),
            }
        }
    }

    /// Processes in stop order: reverse start order, then anything else the
    /// runtime knows.
    fn stop_order(&self) -> Vec<ProcessHandle> {
        let mut names = self.snapshot().process_names();
        names.reverse();
        names.into_iter().map(ProcessHandle::new).collect()
    }

    pub async fn stop_all(&self) {
        shutdown_all(self.runtime(), &self.stop_order()).await;
    }

    /// Stop everything, reload and start every autostart process.
    pub async fn restart(&self) {
        self.state.set_status(DaemonStatus::Restarting);
        info!("restarting");
        self.stop_all().await;
        if self.reload_with(true).await.is_err() {
            // Keep the previous configuration but bring its processes back.
            let store = self.snapshot();
            for descriptor in reconcile(&[], &store).to_create {
                if !descriptor.autostart {
                    continue;
                }
                let handle = ProcessHandle::new(&descriptor.name);
                if let Err(e) = self.runtime.start(&handle, false).await {
                    warn!("[{handle}] autostart failed: {e}");
                }
            }
        }
        self.state.set_status(DaemonStatus::Running);
    }

    async fn wait_for_exit(&self) -> anyhow::Result<()> {
        let mut sigterm = signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
        let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;
        let mut sighup = signal(SignalKind::hangup()).context("Failed to setup SIGHUP handler")?;
        let mut poll = tokio::time::interval(RESTART_POLL_INTERVAL);

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down");
                    return Ok(());
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down");
                    return Ok(());
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, restarting");
                    self.state.request_restart();
                }
                _ = self.state.shutdown_requested() => {
                    info!("shutdown requested");
                    sleep(SHUTDOWN_GRACE).await;
                    return Ok(());
                }
                _ = poll.tick() => {
                    if self.state.take_restart() {
                        self.restart().await;
                    }
                }
            }
        }
    }

    /// Load the configuration, serve RPC and supervise until asked to stop.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        self.reload()
            .await
            .with_context(|| format!("cannot start with {}", self.config_path.display()))?;
        let store = self.snapshot();
        let surface = Arc::new(ControlSurface::new(Arc::clone(&self)));
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut servers = Vec::new();

        let unix = UnixServerSettings::from_store(&store);
        if let Some(unix) = &unix {
            let listener = server::bind_unix(&unix.file, unix.chmod)?;
            info!("RPC listening on unix://{}", unix.file.display());
            servers.push(tokio::spawn(server::serve_unix(
                listener,
                Arc::clone(&surface),
                unix.auth.clone(),
                stop_rx.clone(),
            )));
        }
        if let Some(inet) = InetServerSettings::from_store(&store) {
            let listener = TcpListener::bind(inet.address())
                .await
                .with_context(|| format!("could not listen on {}", inet.address()))?;
            info!("RPC listening on http://{}", inet.address());
            servers.push(tokio::spawn(server::serve_tcp(
                listener,
                Arc::clone(&surface),
                inet.auth.clone(),
                stop_rx.clone(),
            )));
        }
        if servers.is_empty() {
            warn!("no unix_http_server or inet_http_server section, RPC disabled");
        }

        let result = self.wait_for_exit().await;

        self.stop_all().await;
        let _ = stop_tx.send(true);
        for task in servers {
            match task.await {
                Ok(Err(e)) => warn!("RPC server failed: {e:#}"),
                Err(e) => warn!("RPC server task failed: {e}"),
                Ok(Ok(())) => {}
            }
        }
        if let Some(unix) = unix
            && let Err(e) = std::fs::remove_file(&unix.file)
        {
            warn!("could not remove {}: {e}", unix.file.display());
        }
        if let Some(path) = self
            .pidfile
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            remove_pid_file(&path);
        }
        info!("exiting");
        result
    }
}
