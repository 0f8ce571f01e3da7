// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};
use supervisord::{LocalRuntime, Supervisor};
use supervisord_log::LogConfig;

/// Process control daemon
#[derive(Parser, Debug)]
#[command(name = "supervisord")]
#[command(about = "Run and supervise the programs of a configuration file")]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long = "configuration", default_value = "supervisord.conf")]
    configuration: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Stdout until the [supervisord] section is read.
    let log = supervisord_log::init(LogConfig::stdout(LevelFilter::Info))
        .context("failed to install logger")?;
    info!(
        "supervisord {} starting with {}",
        env!("CARGO_PKG_VERSION"),
        args.configuration.display()
    );

    let supervisor = Arc::new(Supervisor::new(
        args.configuration,
        Arc::new(LocalRuntime::new()),
        log,
    ));
    supervisor.run().await
}
