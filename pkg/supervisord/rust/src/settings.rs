// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Typed views of the `[supervisord]`, `[unix_http_server]` and
//! `[inet_http_server]` sections.

use log::{LevelFilter, warn};
use std::path::{Path, PathBuf};
use supervisord_log::{DEFAULT_BACKUPS, DEFAULT_MAX_BYTES, LogConfig, Target};

use crate::config::ConfigStore;
use crate::entry::ConfigEntry;

pub const DEFAULT_IDENTIFIER: &str = "supervisor";
pub const DEFAULT_SOCKET: &str = "/tmp/supervisord.sock";
const DEFAULT_SOCKET_MODE: u32 = 0o700;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSettings {
    /// `None` logs to standard output.
    pub logfile: Option<PathBuf>,
    pub logfile_maxbytes: u64,
    pub logfile_backups: usize,
    pub loglevel: LevelFilter,
    pub pidfile: Option<PathBuf>,
    pub identifier: String,
}

impl DaemonSettings {
    pub fn from_store(store: &ConfigStore) -> Self {
        let Some(entry) = store.supervisord() else {
            return Self::stdout();
        };
        let dir = entry.config_dir();

        let logfile = entry.get_string_expression("logfile", "supervisord.log");
        let logfile = if supervisord_log::is_stdout_path(Path::new(&logfile)) {
            None
        } else {
            Some(dir.join(logfile))
        };
        let pidfile = dir.join(entry.get_string_expression("pidfile", "supervisord.pid"));

        Self {
            logfile,
            logfile_maxbytes: entry.get_bytes("logfile_maxbytes", DEFAULT_MAX_BYTES),
            logfile_backups: usize::try_from(
                entry.get_int("logfile_backups", DEFAULT_BACKUPS as i64),
            )
            .unwrap_or(DEFAULT_BACKUPS),
            loglevel: supervisord_log::parse_level(&entry.get_string("loglevel", "info")),
            pidfile: Some(pidfile),
            identifier: entry.get_string("identifier", DEFAULT_IDENTIFIER),
        }
    }

    fn stdout() -> Self {
        Self {
            logfile: None,
            logfile_maxbytes: DEFAULT_MAX_BYTES,
            logfile_backups: DEFAULT_BACKUPS,
            loglevel: LevelFilter::Info,
            pidfile: None,
            identifier: DEFAULT_IDENTIFIER.to_string(),
        }
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.loglevel,
            target: match &self.logfile {
                None => Target::Stdout,
                Some(path) => Target::File {
                    path: path.clone(),
                    max_bytes: self.logfile_maxbytes,
                    backups: self.logfile_backups,
                },
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    fn from_entry(entry: &ConfigEntry) -> Option<Self> {
        let username = entry.get_string("username", "");
        if username.is_empty() {
            return None;
        }
        Some(Self {
            username,
            password: entry.get_string("password", ""),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnixServerSettings {
    pub file: PathBuf,
    pub chmod: u32,
    pub auth: Option<Credentials>,
}

impl UnixServerSettings {
    pub fn from_store(store: &ConfigStore) -> Option<Self> {
        let entry = store.unix_http_server()?;
        let chmod = entry.get_string("chmod", "0700");
        let chmod = u32::from_str_radix(chmod.trim_start_matches("0o"), 8).unwrap_or_else(|_| {
            warn!("invalid unix_http_server chmod {chmod:?}, using 0700");
            DEFAULT_SOCKET_MODE
        });
        Some(Self {
            file: entry
                .config_dir()
                .join(entry.get_string_expression("file", DEFAULT_SOCKET)),
            chmod,
            auth: Credentials::from_entry(entry),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InetServerSettings {
    pub host: String,
    pub port: u16,
    pub auth: Option<Credentials>,
}

impl InetServerSettings {
    pub fn from_store(store: &ConfigStore) -> Option<Self> {
        let entry = store.inet_http_server()?;
        let raw = entry.get_string("port", "");
        let Some((host, port)) = raw.rsplit_once(':') else {
            warn!("inet_http_server port {raw:?} is not host:port");
            return None;
        };
        let Ok(port) = port.trim().parse::<u16>() else {
            warn!("inet_http_server port {raw:?} is not host:port");
            return None;
        };
        let host = match host.trim() {
            "" | "*" => "0.0.0.0".to_string(),
            h => h.to_string(),
        };
        Some(Self {
            host,
            port,
            auth: Credentials::from_entry(entry),
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
