// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use supervisord::ProcessInfo;
use supervisord::rpc::RpcClient;
use supervisord::rpc::faults;
use supervisord::rpc::records::ProcessStatus;

/// Control a running supervisord over XML-RPC
#[derive(Parser, Debug)]
#[command(name = "supervisorctl")]
struct Args {
    /// Server URL, `http://host:port` or `unix:///path`
    #[arg(short = 's', long = "serverurl", default_value = "unix:///tmp/supervisord.sock")]
    serverurl: String,

    #[arg(short, long)]
    username: Option<String>,

    #[arg(short, long)]
    password: Option<String>,

    /// Timeout in seconds for each call
    #[arg(short, long)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show process states
    Status { names: Vec<String> },
    /// Start `name`, `group:*` or `all`
    Start { target: String },
    /// Stop `name`, `group:*` or `all`
    Stop { target: String },
    /// Send a signal to `name`, `group:*` or `all`
    Signal { signal: String, target: String },
    /// Re-read the configuration and apply it
    Reload,
    /// Restart the daemon's processes
    Restart,
    /// Stop every process and exit the daemon
    Shutdown,
    /// Daemon version
    Version,
    /// Daemon PID
    Pid,
    /// Last bytes of a process log
    Tail {
        name: String,
        #[arg(default_value = "1600")]
        bytes: i64,
        #[arg(long)]
        stderr: bool,
    },
    /// Clear the logs of `name` or `all`
    Clear { target: String },
}

enum Target<'a> {
    All,
    Group(&'a str),
    Process(&'a str),
}

fn target(spec: &str) -> Target<'_> {
    if spec == "all" {
        Target::All
    } else if let Some(group) = spec.strip_suffix(":*") {
        Target::Group(group)
    } else {
        Target::Process(spec)
    }
}

fn print_info(info: &ProcessInfo) {
    println!(
        "{:<32} {:<10} {}",
        qualified(&info.group, &info.name),
        info.state.name(),
        info.description
    );
}

fn print_status(status: &ProcessStatus) -> bool {
    let name = qualified(&status.group, &status.name);
    if status.status == faults::SUCCESS {
        println!("{name}: {}", status.description);
        true
    } else {
        println!("{name}: ERROR ({})", status.description);
        false
    }
}

fn qualified(group: &str, name: &str) -> String {
    if group.is_empty() || group == name {
        name.to_string()
    } else {
        format!("{group}:{name}")
    }
}

fn all_ok(statuses: &[ProcessStatus]) -> Result<()> {
    let failed = statuses.iter().filter(|s| !print_status(s)).count();
    if failed > 0 {
        bail!("{failed} process(es) failed");
    }
    Ok(())
}

async fn run(client: &RpcClient, command: Command) -> Result<()> {
    match command {
        Command::Status { names } => {
            let infos = client.get_all_process_info().await?;
            for info in infos.iter().filter(|info| {
                names.is_empty()
                    || names.iter().any(|n| {
                        *n == info.name
                            || *n == qualified(&info.group, &info.name)
                            || n.strip_suffix(":*") == Some(info.group.as_str())
                    })
            }) {
                print_info(info);
            }
        }
        Command::Start { target: spec } => match target(&spec) {
            Target::All => all_ok(&client.start_all(true).await?)?,
            Target::Group(group) => {
                for info in client.start_process_group(group, true).await? {
                    print_info(&info);
                }
            }
            Target::Process(name) => {
                client.start_process(name, true).await?;
                println!("{name}: started");
            }
        },
        Command::Stop { target: spec } => match target(&spec) {
            Target::All => all_ok(&client.stop_all(true).await?)?,
            Target::Group(group) => {
                for info in client.stop_process_group(group, true).await? {
                    print_info(&info);
                }
            }
            Target::Process(name) => {
                client.stop_process(name, true).await?;
                println!("{name}: stopped");
            }
        },
        Command::Signal {
            signal,
            target: spec,
        } => match target(&spec) {
            Target::All => all_ok(&client.signal_all(&signal).await?)?,
            Target::Group(group) => {
                for info in client.signal_process_group(group, &signal).await? {
                    print_info(&info);
                }
            }
            Target::Process(name) => {
                client.signal_process(name, &signal).await?;
                println!("{name}: signalled");
            }
        },
        Command::Reload => {
            let diff = client.reload_config().await?;
            for name in &diff.added {
                println!("{name}: added");
            }
            for name in &diff.changed {
                println!("{name}: changed");
            }
            for name in &diff.removed {
                println!("{name}: removed");
            }
        }
        Command::Restart => {
            client.restart().await?;
            println!("Restarted supervisord");
        }
        Command::Shutdown => {
            client.shutdown().await?;
            println!("Shut down");
        }
        Command::Version => println!("{}", client.get_supervisor_version().await?),
        Command::Pid => println!("{}", client.get_pid().await?),
        Command::Tail {
            name,
            bytes,
            stderr,
        } => {
            let tail = client.tail_process_log(&name, stderr, 0, bytes).await?;
            print!("{}", tail.data);
        }
        Command::Clear { target: spec } => match target(&spec) {
            Target::All => all_ok(&client.clear_all_process_logs().await?)?,
            Target::Group(group) => {
                for info in client.get_all_process_info().await? {
                    if info.group == group {
                        client.clear_process_logs(&info.name).await?;
                        println!("{}: cleared", qualified(&info.group, &info.name));
                    }
                }
            }
            Target::Process(name) => {
                client.clear_process_logs(name).await?;
                println!("{name}: cleared");
            }
        },
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut client = RpcClient::new(&args.serverurl)
        .with_context(|| format!("invalid server url {}", args.serverurl))?;
    if let Some(username) = args.username {
        client = client.with_auth(username, args.password.unwrap_or_default());
    }
    if let Some(secs) = args.timeout {
        client = client.with_timeout(Duration::from_secs(secs));
    }

    run(&client, args.command)
        .await
        .with_context(|| format!("request to {} failed", args.serverurl))
}
