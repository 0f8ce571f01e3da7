// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! XML-RPC client over TCP (`http://host:port`) or a Unix socket
//! (`unix:///path`).

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use http_body_util::{BodyExt, Full};
use hyper::Request;
use hyper::body::Bytes;
use hyper::client::conn::http1;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE, HOST};
use hyper_util::rt::TokioIo;
use log::debug;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};

use super::faults;
use super::records::{
    DaemonStateReply, LifecycleArgs, NameArgs, NoArgs, Params, ProcessLogArgs, ProcessStatus,
    ReadLogArgs, SignalAllArgs, SignalArgs, StdinArgs, TailReply, WaitArgs,
};
use super::reply;
use super::server::RPC_PATH;
use super::value::{self, Value, malformed};
use crate::errors::{Error, Result};
use crate::group::GroupDiff;
use crate::runtime::ProcessInfo;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Endpoint {
    Tcp { authority: String },
    Unix { path: PathBuf },
}

#[derive(Debug, Clone)]
pub struct RpcClient {
    endpoint: Endpoint,
    auth: Option<(String, String)>,
    timeout: Option<Duration>,
}

impl RpcClient {
    pub fn new(url: &str) -> Result<Self> {
        let endpoint = if let Some(path) = url.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(Error::Transport(format!("no socket path in {url}")));
            }
            Endpoint::Unix {
                path: PathBuf::from(path),
            }
        } else if let Some(rest) = url.strip_prefix("http://") {
            let authority = rest.split('/').next().unwrap_or_default();
            if authority.is_empty() {
                return Err(Error::Transport(format!("no host in {url}")));
            }
            let authority = if authority.contains(':') {
                authority.to_string()
            } else {
                format!("{authority}:80")
            };
            Endpoint::Tcp { authority }
        } else {
            return Err(Error::Transport(format!("unsupported server url {url}")));
        };
        Ok(Self {
            endpoint,
            auth: None,
            timeout: None,
        })
    }

    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some((username.into(), password.into()));
        self
    }

    /// Bounds the whole round trip: connect, send and read.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// POST a call and return the raw response body.
    pub async fn call_raw(&self, method: &str, params: &[Value]) -> Result<String> {
        let body = value::encode_call(method, params);
        debug!("calling {method}");
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.round_trip(body))
                .await
                .map_err(|_| Error::Transport(format!("{method} timed out after {limit:?}")))?,
            None => self.round_trip(body).await,
        }
    }

    pub async fn call(&self, method: &str, params: &[Value]) -> Result<Value> {
        value::decode_response(&self.call_raw(method, params).await?)
    }

    async fn round_trip(&self, body: String) -> Result<String> {
        match &self.endpoint {
            Endpoint::Tcp { authority } => {
                let stream = TcpStream::connect(authority.as_str())
                    .await
                    .map_err(|e| Error::Transport(format!("connect {authority}: {e}")))?;
                self.send(stream, authority, body).await
            }
            Endpoint::Unix { path } => {
                let stream = UnixStream::connect(path)
                    .await
                    .map_err(|e| Error::Transport(format!("connect {}: {e}", path.display())))?;
                self.send(stream, "localhost", body).await
            }
        }
    }

    async fn send<S>(&self, stream: S, host: &str, body: String) -> Result<String>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sender, conn) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| Error::Transport(format!("handshake failed: {e}")))?;
        tokio::task::spawn(async move {
            if let Err(err) = conn.await {
                debug!("RPC connection closed: {err}");
            }
        });

        let mut request = Request::post(RPC_PATH)
            .header(HOST, host)
            .header(CONTENT_TYPE, "text/xml");
        if let Some((username, password)) = &self.auth {
            let token = STANDARD.encode(format!("{username}:{password}"));
            request = request.header(AUTHORIZATION, format!("Basic {token}"));
        }
        let request = request
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| Error::Transport(format!("failed to build request: {e}")))?;

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| Error::Transport(format!("request failed: {e}")))?;
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| Error::Transport(format!("failed to read response: {e}")))?
            .to_bytes();
        if !status.is_success() {
            return Err(Error::Transport(format!("server answered {status}")));
        }
        String::from_utf8(bytes.to_vec()).map_err(|_| malformed("response is not UTF-8"))
    }

    async fn call_named(&self, method: &str, name: &str, params: &[Value]) -> Result<Value> {
        self.call(method, params)
            .await
            .map_err(|e| named_error(e, name))
    }

    pub async fn get_state(&self) -> Result<DaemonStateReply> {
        let reply = self
            .call("supervisor.getState", &NoArgs.to_params())
            .await?;
        DaemonStateReply::try_from(&reply)
    }

    pub async fn get_pid(&self) -> Result<i64> {
        let reply = self.call("supervisor.getPID", &NoArgs.to_params()).await?;
        reply.as_int().ok_or_else(|| malformed("pid is not an int"))
    }

    pub async fn get_supervisor_version(&self) -> Result<String> {
        let reply = self
            .call("supervisor.getSupervisorVersion", &NoArgs.to_params())
            .await?;
        string_of(reply)
    }

    pub async fn get_identification(&self) -> Result<String> {
        let reply = self
            .call("supervisor.getIdentification", &NoArgs.to_params())
            .await?;
        string_of(reply)
    }

    pub async fn get_process_info(&self, name: &str) -> Result<ProcessInfo> {
        let args = NameArgs {
            name: name.to_string(),
        };
        let reply = self
            .call_named("supervisor.getProcessInfo", name, &args.to_params())
            .await?;
        ProcessInfo::try_from(&reply)
    }

    pub async fn get_all_process_info(&self) -> Result<Vec<ProcessInfo>> {
        let reply = self
            .call("supervisor.getAllProcessInfo", &NoArgs.to_params())
            .await?;
        list_of(&reply)
    }

    pub async fn start_process(&self, name: &str, wait: bool) -> Result<()> {
        let args = LifecycleArgs::new(name, wait);
        self.call_named("supervisor.startProcess", name, &args.to_params())
            .await?;
        Ok(())
    }

    pub async fn stop_process(&self, name: &str, wait: bool) -> Result<()> {
        let args = LifecycleArgs::new(name, wait);
        self.call_named("supervisor.stopProcess", name, &args.to_params())
            .await?;
        Ok(())
    }

    pub async fn start_process_group(&self, name: &str, wait: bool) -> Result<Vec<ProcessInfo>> {
        let args = LifecycleArgs::new(name, wait);
        let reply = self
            .call("supervisor.startProcessGroup", &args.to_params())
            .await?;
        list_of(&reply)
    }

    pub async fn stop_process_group(&self, name: &str, wait: bool) -> Result<Vec<ProcessInfo>> {
        let args = LifecycleArgs::new(name, wait);
        let reply = self
            .call("supervisor.stopProcessGroup", &args.to_params())
            .await?;
        list_of(&reply)
    }

    pub async fn start_all(&self, wait: bool) -> Result<Vec<ProcessStatus>> {
        let reply = self
            .call("supervisor.startAllProcesses", &WaitArgs { wait }.to_params())
            .await?;
        list_of(&reply)
    }

    pub async fn stop_all(&self, wait: bool) -> Result<Vec<ProcessStatus>> {
        let reply = self
            .call("supervisor.stopAllProcesses", &WaitArgs { wait }.to_params())
            .await?;
        list_of(&reply)
    }

    pub async fn signal_process(&self, name: &str, signal: &str) -> Result<()> {
        let args = SignalArgs {
            name: name.to_string(),
            signal: signal.to_string(),
        };
        self.call_named("supervisor.signalProcess", name, &args.to_params())
            .await?;
        Ok(())
    }

    pub async fn signal_process_group(&self, name: &str, signal: &str) -> Result<Vec<ProcessInfo>> {
        let args = SignalArgs {
            name: name.to_string(),
            signal: signal.to_string(),
        };
        let reply = self
            .call("supervisor.signalProcessGroup", &args.to_params())
            .await?;
        list_of(&reply)
    }

    pub async fn signal_all(&self, signal: &str) -> Result<Vec<ProcessStatus>> {
        let args = SignalAllArgs {
            signal: signal.to_string(),
        };
        let reply = self
            .call("supervisor.signalAllProcesses", &args.to_params())
            .await?;
        list_of(&reply)
    }

    /// Returns the `(added, changed, removed)` group names.
    pub async fn reload_config(&self) -> Result<GroupDiff> {
        let body = self
            .call_raw("supervisor.reloadConfig", &NoArgs.to_params())
            .await?;
        reply::decode_reload(&body)
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.call("supervisor.shutdown", &NoArgs.to_params())
            .await?;
        Ok(())
    }

    pub async fn restart(&self) -> Result<()> {
        self.call("supervisor.restart", &NoArgs.to_params())
            .await?;
        Ok(())
    }

    pub async fn send_stdin(&self, name: &str, chars: &str) -> Result<()> {
        let args = StdinArgs {
            name: name.to_string(),
            chars: chars.to_string(),
        };
        self.call_named("supervisor.sendProcessStdin", name, &args.to_params())
            .await?;
        Ok(())
    }

    pub async fn read_main_log(&self, offset: i64, length: i64) -> Result<String> {
        let reply = self
            .call("supervisor.readLog", &ReadLogArgs { offset, length }.to_params())
            .await?;
        string_of(reply)
    }

    pub async fn read_process_log(
        &self,
        name: &str,
        stderr: bool,
        offset: i64,
        length: i64,
    ) -> Result<String> {
        let method = if stderr {
            "supervisor.readProcessStderrLog"
        } else {
            "supervisor.readProcessStdoutLog"
        };
        let args = ProcessLogArgs {
            name: name.to_string(),
            offset,
            length,
        };
        let reply = self.call_named(method, name, &args.to_params()).await?;
        string_of(reply)
    }

    pub async fn tail_process_log(
        &self,
        name: &str,
        stderr: bool,
        offset: i64,
        length: i64,
    ) -> Result<TailReply> {
        let method = if stderr {
            "supervisor.tailProcessStderrLog"
        } else {
            "supervisor.tailProcessStdoutLog"
        };
        let args = ProcessLogArgs {
            name: name.to_string(),
            offset,
            length,
        };
        let reply = self.call_named(method, name, &args.to_params()).await?;
        TailReply::try_from(&reply)
    }

    pub async fn clear_process_logs(&self, name: &str) -> Result<()> {
        let args = NameArgs {
            name: name.to_string(),
        };
        self.call_named("supervisor.clearProcessLogs", name, &args.to_params())
            .await?;
        Ok(())
    }

    pub async fn clear_all_process_logs(&self) -> Result<Vec<ProcessStatus>> {
        let reply = self
            .call("supervisor.clearAllProcessLogs", &NoArgs.to_params())
            .await?;
        list_of(&reply)
    }
}

/// Single-target faults come back as the matching library error.
fn named_error(err: Error, name: &str) -> Error {
    match err {
        Error::Fault { code, .. } if code == faults::BAD_NAME => Error::not_found(name),
        Error::Fault { code, .. } if code == faults::NOT_RUNNING => Error::NotRunning {
            name: name.to_string(),
        },
        other => other,
    }
}

fn string_of(value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(malformed(format!(
            "expected a string, got {}",
            other.type_name()
        ))),
    }
}

fn list_of<T>(value: &Value) -> Result<Vec<T>>
where
    for<'a> T: TryFrom<&'a Value, Error = Error>,
{
    value
        .as_array()
        .ok_or_else(|| malformed("expected an array"))?
        .iter()
        .map(T::try_from)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_urls() {
        let client = RpcClient::new("http://127.0.0.1:9001").unwrap();
        assert_eq!(
            client.endpoint,
            Endpoint::Tcp {
                authority: "127.0.0.1:9001".to_string()
            }
        );
        let client = RpcClient::new("http://localhost/RPC2").unwrap();
        assert_eq!(
            client.endpoint,
            Endpoint::Tcp {
                authority: "localhost:80".to_string()
            }
        );
        let client = RpcClient::new("unix:///tmp/supervisord.sock").unwrap();
        assert_eq!(
            client.endpoint,
            Endpoint::Unix {
                path: PathBuf::from("/tmp/supervisord.sock")
            }
        );

        assert!(RpcClient::new("ftp://host").is_err());
        assert!(RpcClient::new("unix://").is_err());
        assert!(RpcClient::new("http://").is_err());
    }

    #[test]
    fn test_named_error() {
        let err = named_error(
            Error::Fault {
                code: faults::BAD_NAME,
                message: "BAD_NAME: ghost".to_string(),
            },
            "ghost",
        );
        assert!(matches!(err, Error::NotFound { name } if name == "ghost"));

        let err = named_error(
            Error::Fault {
                code: faults::NOT_RUNNING,
                message: String::new(),
            },
            "web",
        );
        assert!(matches!(err, Error::NotRunning { name } if name == "web"));

        let err = named_error(
            Error::Fault {
                code: faults::FAILED,
                message: String::new(),
            },
            "web",
        );
        assert!(matches!(err, Error::Fault { code: 30, .. }));
    }

    #[tokio::test]
    async fn test_connect_failure_is_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("unix://{}", dir.path().join("missing.sock").display());
        let client = RpcClient::new(&url).unwrap();
        assert!(matches!(
            client.get_state().await,
            Err(Error::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout_covers_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silent.sock");
        let listener = tokio::net::UnixListener::bind(&path).unwrap();
        let holder = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(stream);
        });

        let client = RpcClient::new(&format!("unix://{}", path.display()))
            .unwrap()
            .with_timeout(Duration::from_millis(200));
        let started = std::time::Instant::now();
        assert!(matches!(client.get_pid().await, Err(Error::Transport(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
        holder.abort();
    }
}
