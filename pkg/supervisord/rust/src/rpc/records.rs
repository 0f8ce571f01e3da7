// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Typed argument and reply records. Only parameter positions travel on the
//! wire; these records give them names and defaults.

use super::faults;
use super::value::{Value, malformed};
use crate::errors::{Error, Result};
use crate::runtime::ProcessInfo;
use crate::state::ProcessState;

/// Conversion between a record and a positional parameter list.
pub trait Params: Sized {
    fn from_params(params: &[Value]) -> Result<Self>;
    fn to_params(&self) -> Vec<Value>;
}

fn arity(params: &[Value], min: usize, max: usize) -> Result<()> {
    if params.len() < min || params.len() > max {
        return Err(Error::Fault {
            code: faults::INCORRECT_PARAMETERS,
            message: format!(
                "INCORRECT_PARAMETERS: expected {min}..={max} parameters, got {}",
                params.len()
            ),
        });
    }
    Ok(())
}

fn string_at(params: &[Value], index: usize) -> Result<String> {
    match params.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(Error::BadArguments(format!(
            "parameter {index} must be a string, got {}",
            other.type_name()
        ))),
        None => Err(Error::BadArguments(format!("parameter {index} is missing"))),
    }
}

fn int_at(params: &[Value], index: usize) -> Result<i64> {
    match params.get(index) {
        Some(Value::Int(n)) => Ok(*n),
        Some(other) => Err(Error::BadArguments(format!(
            "parameter {index} must be an int, got {}",
            other.type_name()
        ))),
        None => Err(Error::BadArguments(format!("parameter {index} is missing"))),
    }
}

fn bool_at(params: &[Value], index: usize, default: bool) -> Result<bool> {
    match params.get(index) {
        None => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::Int(n)) => Ok(*n != 0),
        Some(other) => Err(Error::BadArguments(format!(
            "parameter {index} must be a boolean, got {}",
            other.type_name()
        ))),
    }
}

/// Methods without parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoArgs;

impl Params for NoArgs {
    fn from_params(params: &[Value]) -> Result<Self> {
        arity(params, 0, 0)?;
        Ok(NoArgs)
    }

    fn to_params(&self) -> Vec<Value> {
        Vec::new()
    }
}

/// `getProcessInfo`, `clearProcessLogs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameArgs {
    pub name: String,
}

impl Params for NameArgs {
    fn from_params(params: &[Value]) -> Result<Self> {
        arity(params, 1, 1)?;
        Ok(Self {
            name: string_at(params, 0)?,
        })
    }

    fn to_params(&self) -> Vec<Value> {
        vec![self.name.as_str().into()]
    }
}

/// `startProcess`, `stopProcess` and their group variants. `wait` defaults
/// to true.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleArgs {
    pub name: String,
    pub wait: bool,
}

impl LifecycleArgs {
    pub fn new(name: impl Into<String>, wait: bool) -> Self {
        Self {
            name: name.into(),
            wait,
        }
    }
}

impl Params for LifecycleArgs {
    fn from_params(params: &[Value]) -> Result<Self> {
        arity(params, 1, 2)?;
        Ok(Self {
            name: string_at(params, 0)?,
            wait: bool_at(params, 1, true)?,
        })
    }

    fn to_params(&self) -> Vec<Value> {
        vec![self.name.as_str().into(), self.wait.into()]
    }
}

/// `startAllProcesses`, `stopAllProcesses`. `wait` defaults to true.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitArgs {
    pub wait: bool,
}

impl Default for WaitArgs {
    fn default() -> Self {
        Self { wait: true }
    }
}

impl Params for WaitArgs {
    fn from_params(params: &[Value]) -> Result<Self> {
        arity(params, 0, 1)?;
        Ok(Self {
            wait: bool_at(params, 0, true)?,
        })
    }

    fn to_params(&self) -> Vec<Value> {
        vec![self.wait.into()]
    }
}

/// `signalProcess`, `signalProcessGroup`. The signal is a name (`HUP`) or a
/// number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalArgs {
    pub name: String,
    pub signal: String,
}

fn signal_at(params: &[Value], index: usize) -> Result<String> {
    match params.get(index) {
        Some(Value::Int(n)) => Ok(n.to_string()),
        _ => string_at(params, index),
    }
}

impl Params for SignalArgs {
    fn from_params(params: &[Value]) -> Result<Self> {
        arity(params, 2, 2)?;
        Ok(Self {
            name: string_at(params, 0)?,
            signal: signal_at(params, 1)?,
        })
    }

    fn to_params(&self) -> Vec<Value> {
        vec![self.name.as_str().into(), self.signal.as_str().into()]
    }
}

/// `signalAllProcesses`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalAllArgs {
    pub signal: String,
}

impl Params for SignalAllArgs {
    fn from_params(params: &[Value]) -> Result<Self> {
        arity(params, 1, 1)?;
        Ok(Self {
            signal: signal_at(params, 0)?,
        })
    }

    fn to_params(&self) -> Vec<Value> {
        vec![self.signal.as_str().into()]
    }
}

/// `sendProcessStdin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StdinArgs {
    pub name: String,
    pub chars: String,
}

impl Params for StdinArgs {
    fn from_params(params: &[Value]) -> Result<Self> {
        arity(params, 2, 2)?;
        Ok(Self {
            name: string_at(params, 0)?,
            chars: string_at(params, 1)?,
        })
    }

    fn to_params(&self) -> Vec<Value> {
        vec![self.name.as_str().into(), self.chars.as_str().into()]
    }
}

/// `readLog`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadLogArgs {
    pub offset: i64,
    pub length: i64,
}

impl Params for ReadLogArgs {
    fn from_params(params: &[Value]) -> Result<Self> {
        arity(params, 2, 2)?;
        Ok(Self {
            offset: int_at(params, 0)?,
            length: int_at(params, 1)?,
        })
    }

    fn to_params(&self) -> Vec<Value> {
        vec![self.offset.into(), self.length.into()]
    }
}

/// `readProcessStdoutLog` and friends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessLogArgs {
    pub name: String,
    pub offset: i64,
    pub length: i64,
}

impl Params for ProcessLogArgs {
    fn from_params(params: &[Value]) -> Result<Self> {
        arity(params, 3, 3)?;
        Ok(Self {
            name: string_at(params, 0)?,
            offset: int_at(params, 1)?,
            length: int_at(params, 2)?,
        })
    }

    fn to_params(&self) -> Vec<Value> {
        vec![
            self.name.as_str().into(),
            self.offset.into(),
            self.length.into(),
        ]
    }
}

fn member<'a>(value: &'a Value, name: &str) -> Result<&'a Value> {
    value
        .get(name)
        .ok_or_else(|| malformed(format!("missing struct member {name}")))
}

fn member_str(value: &Value, name: &str) -> Result<String> {
    member(value, name)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| malformed(format!("{name} is not a string")))
}

fn member_int(value: &Value, name: &str) -> Result<i64> {
    member(value, name)?
        .as_int()
        .ok_or_else(|| malformed(format!("{name} is not an int")))
}

impl From<&ProcessInfo> for Value {
    fn from(info: &ProcessInfo) -> Self {
        Value::members([
            ("name", Value::from(info.name.as_str())),
            ("group", info.group.as_str().into()),
            ("description", info.description.as_str().into()),
            ("start", info.start.into()),
            ("stop", info.stop.into()),
            ("now", info.now.into()),
            ("state", info.state.code().into()),
            ("statename", info.state.name().into()),
            ("spawnerr", info.spawnerr.as_str().into()),
            ("exitstatus", info.exitstatus.into()),
            ("logfile", info.logfile.as_str().into()),
            ("stdout_logfile", info.stdout_logfile.as_str().into()),
            ("stderr_logfile", info.stderr_logfile.as_str().into()),
            ("pid", info.pid.into()),
        ])
    }
}

impl TryFrom<&Value> for ProcessInfo {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        Ok(ProcessInfo {
            name: member_str(value, "name")?,
            group: member_str(value, "group")?,
            description: member_str(value, "description")?,
            start: member_int(value, "start")?,
            stop: member_int(value, "stop")?,
            now: member_int(value, "now")?,
            state: ProcessState::from_code(member_int(value, "state")?),
            spawnerr: member_str(value, "spawnerr")?,
            exitstatus: i32::try_from(member_int(value, "exitstatus")?).unwrap_or(-1),
            logfile: member_str(value, "logfile")?,
            stdout_logfile: member_str(value, "stdout_logfile")?,
            stderr_logfile: member_str(value, "stderr_logfile")?,
            pid: u32::try_from(member_int(value, "pid")?).unwrap_or(0),
        })
    }
}

/// Outcome of one target of an all-processes operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessStatus {
    pub name: String,
    pub group: String,
    /// `SUCCESS` or a fault code.
    pub status: i32,
    pub description: String,
}

impl ProcessStatus {
    pub fn success(name: &str, group: &str) -> Self {
        Self {
            name: name.to_string(),
            group: group.to_string(),
            status: faults::SUCCESS,
            description: "OK".to_string(),
        }
    }

    pub fn failed(name: &str, group: &str, status: i32, description: String) -> Self {
        Self {
            name: name.to_string(),
            group: group.to_string(),
            status,
            description,
        }
    }
}

impl From<&ProcessStatus> for Value {
    fn from(status: &ProcessStatus) -> Self {
        Value::members([
            ("name", Value::from(status.name.as_str())),
            ("group", status.group.as_str().into()),
            ("status", status.status.into()),
            ("description", status.description.as_str().into()),
        ])
    }
}

impl TryFrom<&Value> for ProcessStatus {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        Ok(ProcessStatus {
            name: member_str(value, "name")?,
            group: member_str(value, "group")?,
            status: i32::try_from(member_int(value, "status")?).unwrap_or(faults::FAILED),
            description: member_str(value, "description")?,
        })
    }
}

/// Reply of `getState`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonStateReply {
    pub statecode: i64,
    pub statename: String,
}

impl From<&DaemonStateReply> for Value {
    fn from(state: &DaemonStateReply) -> Self {
        Value::members([
            ("statecode", Value::from(state.statecode)),
            ("statename", state.statename.as_str().into()),
        ])
    }
}

impl TryFrom<&Value> for DaemonStateReply {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        Ok(Self {
            statecode: member_int(value, "statecode")?,
            statename: member_str(value, "statename")?,
        })
    }
}

/// Reply of the tail operations: `[data, next_offset, overflowed]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailReply {
    pub data: String,
    pub offset: u64,
    pub overflow: bool,
}

impl From<&TailReply> for Value {
    fn from(tail: &TailReply) -> Self {
        Value::Array(vec![
            tail.data.as_str().into(),
            i64::try_from(tail.offset).unwrap_or(i64::MAX).into(),
            tail.overflow.into(),
        ])
    }
}

impl TryFrom<&Value> for TailReply {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        match value.as_array() {
            Some([Value::String(data), Value::Int(offset), Value::Bool(overflow)]) => Ok(Self {
                data: data.clone(),
                offset: u64::try_from(*offset).unwrap_or(0),
                overflow: *overflow,
            }),
            _ => Err(malformed("tail reply is not [data, offset, overflow]")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_defaults_to_true() {
        let args = LifecycleArgs::from_params(&["web".into()]).unwrap();
        assert_eq!(args, LifecycleArgs::new("web", true));
        let args = LifecycleArgs::from_params(&["web".into(), false.into()]).unwrap();
        assert!(!args.wait);
        assert!(WaitArgs::from_params(&[]).unwrap().wait);
        assert!(WaitArgs::default().wait);
    }

    #[test]
    fn test_arity_and_types() {
        let err = LifecycleArgs::from_params(&[]).unwrap_err();
        assert!(matches!(
            err,
            Error::Fault {
                code: faults::INCORRECT_PARAMETERS,
                ..
            }
        ));
        let err = NameArgs::from_params(&[Value::Int(3)]).unwrap_err();
        assert!(matches!(err, Error::BadArguments(_)));
        assert!(NoArgs::from_params(&["x".into()]).is_err());
    }

    #[test]
    fn test_signal_accepts_numbers() {
        let args = SignalArgs::from_params(&["web".into(), Value::Int(1)]).unwrap();
        assert_eq!(args.signal, "1");
        let args = SignalAllArgs::from_params(&["HUP".into()]).unwrap();
        assert_eq!(args.signal, "HUP");
    }

    #[test]
    fn test_params_round_trip() {
        let args = ProcessLogArgs {
            name: "web".to_string(),
            offset: -100,
            length: 0,
        };
        assert_eq!(ProcessLogArgs::from_params(&args.to_params()).unwrap(), args);
        let args = StdinArgs {
            name: "cat".to_string(),
            chars: "hi\n".to_string(),
        };
        assert_eq!(StdinArgs::from_params(&args.to_params()).unwrap(), args);
    }

    #[test]
    fn test_process_info_value() {
        let info = ProcessInfo {
            name: "web_0".to_string(),
            group: "web".to_string(),
            description: "pid 12, uptime 0:00:05".to_string(),
            start: 100,
            stop: 0,
            now: 105,
            state: ProcessState::Running,
            spawnerr: String::new(),
            exitstatus: 0,
            logfile: "/var/log/web.log".to_string(),
            stdout_logfile: "/var/log/web.log".to_string(),
            stderr_logfile: String::new(),
            pid: 12,
        };
        let value = Value::from(&info);
        assert_eq!(value.get("statename"), Some(&Value::from("RUNNING")));
        assert_eq!(value.get("state"), Some(&Value::Int(20)));
        assert_eq!(ProcessInfo::try_from(&value).unwrap(), info);
    }

    #[test]
    fn test_tail_reply() {
        let tail = TailReply {
            data: "abc".to_string(),
            offset: 42,
            overflow: true,
        };
        assert_eq!(TailReply::try_from(&Value::from(&tail)).unwrap(), tail);
        assert!(TailReply::try_from(&Value::Nil).is_err());
    }
}
