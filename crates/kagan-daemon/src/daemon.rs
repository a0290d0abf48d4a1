//! `AppContext` construction and the daemon's background-loop bootstrap
//! (§9's "replace global mutable state with AppContext" design note).
//!
//! Grounded on `at-daemon/src/daemon.rs`'s `Daemon` struct — the cloneable
//! shutdown handle and `spawn_background_loops`/`run_loops` split survive
//! directly; the axum HTTP server and frontend-serving code are dropped (no
//! UI in this spec's scope) in favor of driving the IPC listener instead.

use std::sync::Arc;

use anyhow::{Context, Result};
use kagan_core::store::Store;
use kagan_core::worktree_manager::WorktreeManager;
use kagan_core::{paths, CoreConfig};
use tokio::sync::broadcast;
use tracing::info;

use crate::api::dispatch::Dispatcher;
use crate::ipc::server::{IpcServer, StartupOutcome};
use crate::scheduler::Scheduler;

/// Everything a running core needs, constructed once at startup and shared
/// by reference (or `Arc`) with every background loop and connection
/// handler — the single mutable-state owner the design note calls for.
pub struct AppContext {
    pub store: Arc<Store>,
    pub worktrees: Arc<WorktreeManager>,
    pub scheduler: Arc<Scheduler>,
    pub dispatcher: Arc<Dispatcher>,
    pub config: CoreConfig,
}

impl AppContext {
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        paths::ensure_directories().context("failed to create data/config/cache/runtime directories")?;

        let store = Arc::new(Store::open(paths::database_path()).await.context("failed to open store")?);
        let worktrees = Arc::new(WorktreeManager::with_default_runner(paths::worktree_base_dir()));
        let scheduler = Arc::new(Scheduler::new(store.clone(), worktrees.clone(), config.clone()));
        let dispatcher = Arc::new(Dispatcher::new(store.clone(), scheduler.clone(), config.scratchpad_cap_bytes));

        Ok(Self {
            store,
            worktrees,
            scheduler,
            dispatcher,
            config,
        })
    }
}

/// Owns the shutdown broadcast and the background loops driven from it.
/// Mirrors the teacher's `ShutdownSignal` clone-and-trigger idiom with
/// `tokio::sync::broadcast` instead of a custom type.
pub struct Daemon {
    ctx: AppContext,
    shutdown_tx: broadcast::Sender<()>,
}

impl Daemon {
    pub fn new(ctx: AppContext) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self { ctx, shutdown_tx }
    }

    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Acquire the singleton lock, then run the scheduler loop and IPC
    /// server concurrently until `shutdown` fires or the listener errors
    /// (§4.F, §4.I).
    pub async fn run(&self) -> Result<()> {
        let ipc_server = IpcServer::new(
            self.ctx.dispatcher.clone(),
            self.ctx.config.heartbeat_interval_secs,
            self.ctx.config.stale_after_secs,
        );

        match ipc_server.acquire_singleton()? {
            StartupOutcome::Owner => {}
            StartupOutcome::AlreadyRunning(lease) => {
                anyhow::bail!(
                    "core already running (pid={}, host={}) — use `core stop` first",
                    lease.owner_pid,
                    lease.owner_hostname
                );
            }
        }

        info!(pid = std::process::id(), "kagan core starting");

        let startup_context = crate::runtime_service::RuntimeService::new(&self.ctx.store)
            .decide_startup()
            .await
            .context("failed to reconcile runtime context at startup")?;
        info!(?startup_context, "runtime context reconciled");

        let scheduler = self.ctx.scheduler.clone();
        let scheduler_shutdown = self.shutdown_tx.subscribe();
        let scheduler_loop = tokio::spawn(async move {
            scheduler.run_loops(scheduler_shutdown).await;
        });

        // Flip the store's closing flag as soon as shutdown is requested, not
        // after the IPC listener finishes draining — in-flight store calls
        // racing the broadcast get `StoreError::Closing` instead of panicking
        // on a torn-down connection (§4.A, §7).
        let store_for_shutdown = self.ctx.store.clone();
        let mut store_shutdown = self.shutdown_tx.subscribe();
        let closing_watcher = tokio::spawn(async move {
            let _ = store_shutdown.recv().await;
            store_for_shutdown.mark_closing();
        });

        let ipc_shutdown = self.shutdown_tx.subscribe();
        let ipc_result = ipc_server.run(ipc_shutdown).await;

        scheduler_loop.abort();
        closing_watcher.abort();
        self.ctx.store.mark_closing();
        ipc_result
    }
}
