// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::cast_possible_wrap)]

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use supervisord::rpc::RpcClient;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle to a running supervisord process.
pub struct DaemonHandle {
    child: Child,
    socket: PathBuf,
    log_lines: Arc<Mutex<Vec<String>>>,
    _reader_thread: std::thread::JoinHandle<()>,
}

impl DaemonHandle {
    /// Write `programs` after a `[unix_http_server]` section into
    /// `dir/supervisord.conf`, start the daemon on it and wait for the socket.
    pub fn start(dir: &Path, programs: &str) -> Self {
        write_config(dir, programs);
        let socket = socket_path(dir);
        let bin = env!("CARGO_BIN_EXE_supervisord");
        let mut child = Command::new(bin)
            .arg("-c")
            .arg(dir.join("supervisord.conf"))
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .expect("failed to start supervisord");

        let stdout = child.stdout.take().expect("failed to capture stdout");
        let log_lines = Arc::new(Mutex::new(Vec::<String>::new()));
        let lines_clone = Arc::clone(&log_lines);
        let reader_thread = std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                match line {
                    Ok(l) => {
                        eprintln!("[daemon] {l}");
                        lines_clone.lock().unwrap().push(l);
                    }
                    Err(_) => break,
                }
            }
        });

        let handle = Self {
            child,
            socket,
            log_lines,
            _reader_thread: reader_thread,
        };
        assert!(
            handle.wait_for_socket(DEFAULT_TIMEOUT),
            "supervisord never created {}",
            handle.socket.display()
        );
        handle
    }

    pub fn url(&self) -> String {
        format!("unix://{}", self.socket.display())
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    fn wait_for_socket(&self, timeout: Duration) -> bool {
        wait_until(timeout, || self.socket.exists())
    }

    /// Wait until a log line containing `pattern` appears, or timeout.
    pub fn wait_for_log(&self, pattern: &str, timeout: Duration) -> bool {
        wait_until(timeout, || {
            self.log_lines
                .lock()
                .unwrap()
                .iter()
                .any(|l| l.contains(pattern))
        })
    }

    pub fn send_signal(&self, sig: Signal) {
        let pid = self.child.id() as i32;
        signal::kill(Pid::from_raw(pid), sig).expect("failed to send signal to daemon");
    }

    /// Send SIGTERM and wait for the daemon to exit.
    pub fn stop(&mut self) -> std::process::ExitStatus {
        self.send_signal(Signal::SIGTERM);
        self.wait_with_timeout(DEFAULT_TIMEOUT)
    }

    /// Wait for the daemon to exit within `timeout`, killing it after.
    pub fn wait_with_timeout(&mut self, timeout: Duration) -> std::process::ExitStatus {
        let deadline = Instant::now() + timeout;
        loop {
            match self
                .child
                .try_wait()
                .expect("failed to check daemon status")
            {
                Some(status) => return status,
                None => {
                    if Instant::now() >= deadline {
                        self.child.kill().ok();
                        return self.child.wait().expect("failed to wait on killed daemon");
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
            }
        }
    }

    /// Run supervisorctl against this daemon.
    pub fn ctl(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_supervisorctl"))
            .arg("-s")
            .arg(self.url())
            .arg("-t")
            .arg("10")
            .args(args)
            .output()
            .expect("failed to run supervisorctl")
    }

    /// Run supervisorctl and return its stdout, asserting success.
    pub fn ctl_ok(&self, args: &[&str]) -> String {
        let output = self.ctl(args);
        assert!(
            output.status.success(),
            "supervisorctl {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8(output.stdout).unwrap()
    }

    /// PID of a managed process, read over RPC.
    pub fn process_pid(&self, name: &str) -> u32 {
        let client = RpcClient::new(&self.url()).unwrap();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(client.get_process_info(name)).unwrap().pid
    }

    /// Poll `supervisorctl status name` until it reports `state`.
    pub fn wait_for_state(&self, name: &str, state: &str) -> bool {
        wait_until(DEFAULT_TIMEOUT, || {
            let output = self.ctl(&["status", name]);
            String::from_utf8_lossy(&output.stdout)
                .split_whitespace()
                .nth(1)
                == Some(state)
        })
    }
}

impl Drop for DaemonHandle {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn socket_path(dir: &Path) -> PathBuf {
    dir.join("supervisord.sock")
}

/// Write `dir/supervisord.conf` with a unix socket in `dir` followed by
/// `programs`.
pub fn write_config(dir: &Path, programs: &str) {
    let contents = format!(
        "[unix_http_server]\nfile = {}\n\n[supervisord]\nlogfile = /dev/stdout\npidfile = {}\n\n{programs}",
        socket_path(dir).display(),
        dir.join("supervisord.pid").display(),
    );
    let path = dir.join("supervisord.conf");
    std::fs::write(&path, contents)
        .unwrap_or_else(|e| panic!("failed to write {}: {e}", path.display()));
}

pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

/// Check if a PID is still alive.
pub fn pid_is_alive(pid: u32) -> bool {
    signal::kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Wait until a PID is no longer alive, or timeout.
pub fn wait_for_pid_gone(pid: u32, timeout: Duration) -> bool {
    wait_until(timeout, || !pid_is_alive(pid))
}
