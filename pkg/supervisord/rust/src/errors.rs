// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to load {}: {reason}", path.display())]
    ConfigLoad { path: PathBuf, reason: String },

    #[error("unknown placeholder %({name})")]
    UnknownPlaceholder { name: String },

    #[error("malformed placeholder in {expr:?}")]
    MalformedPlaceholder { expr: String },

    #[error("no process named {name}")]
    NotFound { name: String },

    #[error("process {name} is not running")]
    NotRunning { name: String },

    #[error("spawn error for {name}: {reason}")]
    Spawn { name: String, reason: String },

    #[error("malformed reply: {0}")]
    MalformedReply(String),

    #[error("fault {code}: {message}")]
    Fault { code: i32, message: String },

    #[error("bad arguments: {0}")]
    BadArguments(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn config_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::ConfigLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn not_found(name: impl Into<String>) -> Self {
        Error::NotFound { name: name.into() }
    }
}
