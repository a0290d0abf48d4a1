//! kagan core daemon — the single long-running process behind the IPC
//! surface (§4.F-§4.I).
//!
//! Grounded on `at-daemon/src/main.rs`'s startup-guard-then-bind-then-
//! lockfile-then-run-loops sequencing and ctrl-c → graceful-shutdown wiring,
//! with the axum HTTP server and Leptos frontend-serving dropped (no UI in
//! this spec's scope).

use anyhow::Result;
use kagan_core::{lockfile, CoreConfig};
use tracing::{error, info};

mod api;
mod daemon;
mod ipc;
mod plugins;
mod review_service;
mod runtime_service;
mod scheduler;
mod task_service;

use daemon::{AppContext, Daemon};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), pid = std::process::id(), "kagan-core-daemon starting");

    let config = CoreConfig::default();
    let ctx = AppContext::bootstrap(config).await?;
    let daemon = Daemon::new(ctx);

    let shutdown = daemon.shutdown_handle();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            return;
        }
        info!("ctrl-c received, initiating shutdown");
        lockfile::remove_all();
        let _ = shutdown.send(());
    });

    let result = daemon.run().await;
    lockfile::remove_all();

    if let Err(err) = &result {
        error!(error = %err, "daemon exited with error");
    }
    result
}
