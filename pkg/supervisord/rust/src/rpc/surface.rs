// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! The XML-RPC method table.
//!
//! Every method decodes its positional parameters into a record, drives the
//! runtime and encodes a reply record. Fan-out over a group or over every
//! process runs sequentially in runtime order, and a failure on one target
//! never stops the others.

use log::{debug, info, warn};
use nix::sys::signal::Signal;
use std::sync::Arc;

use super::faults;
use super::records::{
    DaemonStateReply, LifecycleArgs, NameArgs, NoArgs, Params, ProcessLogArgs, ProcessStatus,
    ReadLogArgs, SignalAllArgs, SignalArgs, StdinArgs, TailReply, WaitArgs,
};
use super::reply::reload_value;
use super::value::{self, Value};
use super::{API_VERSION, SUPERVISOR_VERSION};
use crate::daemon::Supervisor;
use crate::errors::{Error, Result};
use crate::runtime::{LogStore, LogStream, ProcessHandle};
use crate::signal::parse_signal;
use crate::state::ProcessState;

pub const METHODS: &[&str] = &[
    "system.listMethods",
    "supervisor.getAPIVersion",
    "supervisor.getVersion",
    "supervisor.getSupervisorVersion",
    "supervisor.getIdentification",
    "supervisor.getState",
    "supervisor.getPID",
    "supervisor.getProcessInfo",
    "supervisor.getAllProcessInfo",
    "supervisor.startProcess",
    "supervisor.stopProcess",
    "supervisor.startProcessGroup",
    "supervisor.stopProcessGroup",
    "supervisor.signalProcessGroup",
    "supervisor.startAllProcesses",
    "supervisor.stopAllProcesses",
    "supervisor.signalAllProcesses",
    "supervisor.signalProcess",
    "supervisor.reloadConfig",
    "supervisor.shutdown",
    "supervisor.restart",
    "supervisor.sendProcessStdin",
    "supervisor.readLog",
    "supervisor.readMainLog",
    "supervisor.clearLog",
    "supervisor.readProcessStdoutLog",
    "supervisor.readProcessStderrLog",
    "supervisor.tailProcessStdoutLog",
    "supervisor.tailProcessStderrLog",
    "supervisor.clearProcessLogs",
    "supervisor.clearAllProcessLogs",
];

/// Fault code and string reported for `err`.
pub fn fault_of(err: &Error) -> (i32, String) {
    let (code, label) = match err {
        Error::Fault { code, message } => return (*code, message.clone()),
        Error::NotFound { .. } => (faults::BAD_NAME, "BAD_NAME"),
        Error::NotRunning { .. } => (faults::NOT_RUNNING, "NOT_RUNNING"),
        Error::Spawn { .. } => (faults::SPAWN_ERROR, "SPAWN_ERROR"),
        Error::ConfigLoad { .. }
        | Error::UnknownPlaceholder { .. }
        | Error::MalformedPlaceholder { .. } => (faults::CANT_REREAD, "CANT_REREAD"),
        Error::BadArguments(_) => (faults::BAD_ARGUMENTS, "BAD_ARGUMENTS"),
        Error::MalformedReply(_) => (faults::INCORRECT_PARAMETERS, "INCORRECT_PARAMETERS"),
        Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound => (faults::NO_FILE, "NO_FILE"),
        Error::Io(_) | Error::Transport(_) => (faults::FAILED, "FAILED"),
    };
    (code, format!("{label}: {err}"))
}

/// Signal named by `name`: a number or a symbolic name.
fn signal_of(name: &str) -> Result<Signal> {
    match name.trim().parse::<i32>() {
        Ok(n) => Signal::try_from(n).map_err(|_| Error::BadArguments(format!("bad signal {n}"))),
        Err(_) => Ok(parse_signal(name)),
    }
}

pub struct ControlSurface {
    supervisor: Arc<Supervisor>,
}

impl ControlSurface {
    pub fn new(supervisor: Arc<Supervisor>) -> Self {
        Self { supervisor }
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Answer one XML-RPC request body with a response or fault document.
    pub async fn handle(&self, body: &str) -> String {
        let (method, params) = match value::decode_call(body) {
            Ok(call) => call,
            Err(e) => {
                warn!("undecodable request: {e}");
                let (code, message) = fault_of(&e);
                return value::encode_fault(code, &message);
            }
        };
        match self.dispatch(&method, &params).await {
            Ok(reply) => value::encode_response(&reply),
            Err(e) => {
                debug!("{method} failed: {e}");
                let (code, message) = fault_of(&e);
                value::encode_fault(code, &message)
            }
        }
    }

    pub async fn dispatch(&self, method: &str, params: &[Value]) -> Result<Value> {
        if self.supervisor.state().is_shutting_down()
            && matches!(
                method,
                "supervisor.startProcess"
                    | "supervisor.startProcessGroup"
                    | "supervisor.startAllProcesses"
                    | "supervisor.reloadConfig"
                    | "supervisor.restart"
            )
        {
            return Err(Error::Fault {
                code: faults::SHUTDOWN_STATE,
                message: "SHUTDOWN_STATE".to_string(),
            });
        }

        match method {
            "system.listMethods" => {
                NoArgs::from_params(params)?;
                Ok(Value::from(METHODS.to_vec()))
            }
            "supervisor.getAPIVersion" | "supervisor.getVersion" => {
                NoArgs::from_params(params)?;
                Ok(API_VERSION.into())
            }
            "supervisor.getSupervisorVersion" => {
                NoArgs::from_params(params)?;
                Ok(SUPERVISOR_VERSION.into())
            }
            "supervisor.getIdentification" => {
                NoArgs::from_params(params)?;
                Ok(self.supervisor.identification().into())
            }
            "supervisor.getState" => {
                NoArgs::from_params(params)?;
                let status = self.supervisor.state().status();
                Ok(Value::from(&DaemonStateReply {
                    statecode: status.code(),
                    statename: status.name().to_string(),
                }))
            }
            "supervisor.getPID" => {
                NoArgs::from_params(params)?;
                Ok(std::process::id().into())
            }
            "supervisor.getProcessInfo" => {
                let args = NameArgs::from_params(params)?;
                let handle = self.resolve(&args.name)?;
                Ok(Value::from(&self.supervisor.runtime().info(&handle)?))
            }
            "supervisor.getAllProcessInfo" => {
                NoArgs::from_params(params)?;
                self.infos(&self.supervisor.runtime().handles())
            }
            "supervisor.startProcess" => {
                let args = LifecycleArgs::from_params(params)?;
                self.start_process(&args).await?;
                Ok(true.into())
            }
            "supervisor.stopProcess" => {
                let args = LifecycleArgs::from_params(params)?;
                self.stop_process(&args).await?;
                Ok(true.into())
            }
            "supervisor.startProcessGroup" => {
                let args = LifecycleArgs::from_params(params)?;
                let members = self.group_members(&args.name);
                for handle in &members {
                    if let Err(e) = self.supervisor.runtime().start(handle, args.wait).await {
                        warn!("[{handle}] start failed: {e}");
                    }
                }
                self.infos(&members)
            }
            "supervisor.stopProcessGroup" => {
                let args = LifecycleArgs::from_params(params)?;
                let members = self.group_members(&args.name);
                for handle in &members {
                    if let Err(e) = self.supervisor.runtime().stop(handle, args.wait).await {
                        warn!("[{handle}] stop failed: {e}");
                    }
                }
                self.infos(&members)
            }
            "supervisor.signalProcessGroup" => {
                let args = SignalArgs::from_params(params)?;
                let signal = signal_of(&args.signal)?;
                let members = self.group_members(&args.name);
                for handle in &members {
                    if let Err(e) = self.supervisor.runtime().signal(handle, signal).await {
                        warn!("[{handle}] signal failed: {e}");
                    }
                }
                self.infos(&members)
            }
            "supervisor.startAllProcesses" => {
                let args = WaitArgs::from_params(params)?;
                let mut statuses = Vec::new();
                for handle in self.supervisor.runtime().handles() {
                    let result = self.supervisor.runtime().start(&handle, args.wait).await;
                    statuses.push(self.status(&handle, result));
                }
                Ok(Value::Array(statuses.iter().map(Value::from).collect()))
            }
            "supervisor.stopAllProcesses" => {
                let args = WaitArgs::from_params(params)?;
                let mut statuses = Vec::new();
                for handle in self.supervisor.runtime().handles() {
                    let result = self.supervisor.runtime().stop(&handle, args.wait).await;
                    statuses.push(self.status(&handle, result));
                }
                Ok(Value::Array(statuses.iter().map(Value::from).collect()))
            }
            "supervisor.signalAllProcesses" => {
                let args = SignalAllArgs::from_params(params)?;
                let signal = signal_of(&args.signal)?;
                let mut statuses = Vec::new();
                for handle in self.supervisor.runtime().handles() {
                    let result = self.supervisor.runtime().signal(&handle, signal).await;
                    statuses.push(self.status(&handle, result));
                }
                Ok(Value::Array(statuses.iter().map(Value::from).collect()))
            }
            "supervisor.signalProcess" => {
                let args = SignalArgs::from_params(params)?;
                let signal = signal_of(&args.signal)?;
                let handle = self.resolve(&args.name)?;
                self.supervisor.runtime().signal(&handle, signal).await?;
                Ok(true.into())
            }
            "supervisor.reloadConfig" => {
                NoArgs::from_params(params)?;
                let diff = self.supervisor.reload().await?;
                Ok(reload_value(&diff))
            }
            "supervisor.shutdown" => {
                NoArgs::from_params(params)?;
                info!("shutdown requested over RPC");
                self.supervisor.state().request_shutdown();
                self.supervisor.stop_all().await;
                Ok(true.into())
            }
            "supervisor.restart" => {
                NoArgs::from_params(params)?;
                info!("restart requested over RPC");
                self.supervisor.state().request_restart();
                Ok(true.into())
            }
            "supervisor.sendProcessStdin" => {
                let args = StdinArgs::from_params(params)?;
                let handle = self.resolve(&args.name)?;
                self.supervisor
                    .runtime()
                    .send_stdin(&handle, &args.chars)
                    .await?;
                Ok(true.into())
            }
            "supervisor.readLog" | "supervisor.readMainLog" => {
                let args = ReadLogArgs::from_params(params)?;
                Ok(self
                    .supervisor
                    .main_log()
                    .read_log(args.offset, args.length)?
                    .into())
            }
            "supervisor.clearLog" => {
                NoArgs::from_params(params)?;
                self.supervisor.main_log().clear_log()?;
                Ok(true.into())
            }
            "supervisor.readProcessStdoutLog" | "supervisor.readProcessStderrLog" => {
                let args = ProcessLogArgs::from_params(params)?;
                let log = self.process_log(&args.name, stream_of(method))?;
                Ok(log.read_log(args.offset, args.length)?.into())
            }
            "supervisor.tailProcessStdoutLog" | "supervisor.tailProcessStderrLog" => {
                let args = ProcessLogArgs::from_params(params)?;
                let log = self.process_log(&args.name, stream_of(method))?;
                let (data, offset, overflow) = log.read_tail_log(args.offset, args.length)?;
                Ok(Value::from(&TailReply {
                    data,
                    offset,
                    overflow,
                }))
            }
            "supervisor.clearProcessLogs" => {
                let args = NameArgs::from_params(params)?;
                let handle = self.resolve(&args.name)?;
                self.clear_logs(&handle)?;
                Ok(true.into())
            }
            "supervisor.clearAllProcessLogs" => {
                NoArgs::from_params(params)?;
                let statuses: Vec<ProcessStatus> = self
                    .supervisor
                    .runtime()
                    .handles()
                    .iter()
                    .map(|handle| self.status(handle, self.clear_logs(handle)))
                    .collect();
                Ok(Value::Array(statuses.iter().map(Value::from).collect()))
            }
            _ => Err(Error::Fault {
                code: faults::UNKNOWN_METHOD,
                message: format!("UNKNOWN_METHOD: {method}"),
            }),
        }
    }

    /// Accepts `name` and `group:name`.
    fn resolve(&self, name: &str) -> Result<ProcessHandle> {
        let runtime = self.supervisor.runtime();
        if let Some(handle) = runtime.find(name) {
            return Ok(handle);
        }
        if let Some((group, process)) = name.split_once(':')
            && let Some(handle) = runtime.find(process)
            && runtime.info(&handle).is_ok_and(|info| info.group == group)
        {
            return Ok(handle);
        }
        Err(Error::NotFound {
            name: name.to_string(),
        })
    }

    /// Processes of `group` in runtime order. `group:*` names the group too.
    fn group_members(&self, group: &str) -> Vec<ProcessHandle> {
        let group = group.strip_suffix(":*").unwrap_or(group);
        let runtime = self.supervisor.runtime();
        runtime
            .handles()
            .into_iter()
            .filter(|h| runtime.info(h).is_ok_and(|info| info.group == group))
            .collect()
    }

    fn infos(&self, handles: &[ProcessHandle]) -> Result<Value> {
        let runtime = self.supervisor.runtime();
        let mut infos = Vec::with_capacity(handles.len());
        for handle in handles {
            infos.push(Value::from(&runtime.info(handle)?));
        }
        Ok(Value::Array(infos))
    }

    fn status(&self, handle: &ProcessHandle, result: Result<()>) -> ProcessStatus {
        let group = self
            .supervisor
            .runtime()
            .info(handle)
            .map(|info| info.group)
            .unwrap_or_default();
        match result {
            Ok(()) => ProcessStatus::success(handle.name(), &group),
            Err(e) => {
                let (code, message) = fault_of(&e);
                ProcessStatus::failed(handle.name(), &group, code, message)
            }
        }
    }

    async fn start_process(&self, args: &LifecycleArgs) -> Result<()> {
        if let Some(group) = args.name.strip_suffix(":*") {
            let mut first = None;
            for handle in self.group_members(group) {
                if let Err(e) = self.supervisor.runtime().start(&handle, args.wait).await {
                    warn!("[{handle}] start failed: {e}");
                    first.get_or_insert(e);
                }
            }
            return first.map_or(Ok(()), Err);
        }
        let handle = self.resolve(&args.name)?;
        self.supervisor.runtime().start(&handle, args.wait).await
    }

    async fn stop_process(&self, args: &LifecycleArgs) -> Result<()> {
        if let Some(group) = args.name.strip_suffix(":*") {
            let mut first = None;
            for handle in self.group_members(group) {
                if let Err(e) = self.supervisor.runtime().stop(&handle, args.wait).await {
                    warn!("[{handle}] stop failed: {e}");
                    first.get_or_insert(e);
                }
            }
            return first.map_or(Ok(()), Err);
        }
        let handle = self.resolve(&args.name)?;
        let state = self.supervisor.runtime().state(&handle);
        if !state.has_child() && state != ProcessState::Backoff {
            return Err(Error::NotRunning {
                name: args.name.clone(),
            });
        }
        self.supervisor.runtime().stop(&handle, args.wait).await
    }

    fn process_log(&self, name: &str, stream: LogStream) -> Result<Arc<dyn LogStore>> {
        let handle = self.resolve(name)?;
        self.supervisor.runtime().log(&handle, stream)
    }

    fn clear_logs(&self, handle: &ProcessHandle) -> Result<()> {
        for stream in [LogStream::Stdout, LogStream::Stderr] {
            match self.supervisor.runtime().log(handle, stream) {
                Ok(log) => log.clear_log()?,
                Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

fn stream_of(method: &str) -> LogStream {
    if method.contains("Stderr") {
        LogStream::Stderr
    } else {
        LogStream::Stdout
    }
}
