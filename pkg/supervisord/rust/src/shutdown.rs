// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use log::{info, warn};
use tokio::time::{Duration, timeout};

use crate::runtime::{ProcessHandle, ProcessRuntime};

/// Upper bound on waiting for one process once its stop was requested. The
/// runtime escalates to SIGKILL on its own before this.
const STOP_WAIT_LIMIT: Duration = Duration::from_secs(60);

/// Ask every process to stop, then wait for each in turn. `order` lists the
/// processes in stop order; anything the runtime knows beyond it follows.
pub async fn shutdown_all(runtime: &dyn ProcessRuntime, order: &[ProcessHandle]) {
    let mut handles: Vec<ProcessHandle> = order.to_vec();
    for handle in runtime.handles() {
        if !handles.contains(&handle) {
            handles.push(handle);
        }
    }

    for handle in &handles {
        if runtime.state(handle).has_child() {
            info!("[{handle}] stopping");
        }
        if let Err(e) = runtime.stop(handle, false).await {
            warn!("[{handle}] stop failed: {e}");
        }
    }

    for handle in &handles {
        match timeout(STOP_WAIT_LIMIT, runtime.stop(handle, true)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("[{handle}] stop failed: {e}"),
            Err(_) => warn!("[{handle}] still running after shutdown, giving up"),
        }
    }
}
