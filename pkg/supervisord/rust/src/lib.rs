// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

// Correctness
#![deny(clippy::undocumented_unsafe_blocks)]
// Panicking code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unimplemented)]
#![deny(clippy::todo)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]

pub mod config;
pub mod daemon;
pub mod entry;
pub mod errors;
pub mod expand;
pub mod expr;
pub mod group;
pub mod ini;
pub mod logstore;
pub mod manager;
pub mod process;
pub mod program;
pub mod reconcile;
pub mod rpc;
pub mod runtime;
pub mod settings;
pub mod shutdown;
pub mod signal;
pub mod state;

pub use daemon::{DaemonState, DaemonStatus, Supervisor};
pub use errors::{Error, Result};
pub use manager::LocalRuntime;
pub use runtime::{LogStore, LogStream, ProcessHandle, ProcessInfo, ProcessRuntime};
pub use state::ProcessState;
