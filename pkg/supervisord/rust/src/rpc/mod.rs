// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! XML-RPC control plane: wire values, the `/RPC2` HTTP endpoint, the
//! method table and a client.

pub mod client;
pub mod records;
pub mod reply;
pub mod server;
pub mod surface;
pub mod value;
pub mod xmlpath;

pub use client::RpcClient;
pub use surface::ControlSurface;
pub use value::Value;

/// Fault codes, numbered as supervisord numbers them.
pub mod faults {
    pub const UNKNOWN_METHOD: i32 = 1;
    pub const INCORRECT_PARAMETERS: i32 = 2;
    pub const BAD_ARGUMENTS: i32 = 3;
    pub const SHUTDOWN_STATE: i32 = 6;
    pub const BAD_NAME: i32 = 10;
    pub const NO_FILE: i32 = 20;
    pub const FAILED: i32 = 30;
    pub const SPAWN_ERROR: i32 = 50;
    pub const NOT_RUNNING: i32 = 70;
    pub const SUCCESS: i32 = 80;
    pub const CANT_REREAD: i32 = 92;
}

pub const API_VERSION: &str = "3.0";
pub const SUPERVISOR_VERSION: &str = env!("CARGO_PKG_VERSION");
