//! Transport listener, singleton lease lifecycle, and the per-connection
//! request/response loop (§4.F).
//!
//! Grounded on `at-daemon/src/daemon.rs`'s bootstrap/shutdown-signal idiom
//! (kept: spawn background loops, a cloneable shutdown handle, graceful
//! teardown on ctrl-c; dropped: the axum HTTP/websocket transport, replaced
//! with this spec's raw framed socket) plus
//! `original_source/src/kagan/core/request_context.py` for binding each
//! accepted connection to a `SessionBinding`.

use std::sync::Arc;

use kagan_api_types::{ApiError, ErrorCode, IpcRequest, IpcResponse};
use kagan_core::lockfile::{self, AcquireResult, CoreLease, Endpoint};
use kagan_core::paths;
use kagan_core::store::Store;
use kagan_core::types::{TaskStatus, TaskType};
use tokio::io::BufReader;
use tracing::{info, warn};

use crate::api::dispatch::Dispatcher;
use crate::ipc::framing::{read_frame, write_frame, FramingError};
use crate::ipc::session_binding::SessionBinding;


pub struct IpcServer {
    dispatcher: Arc<Dispatcher>,
    heartbeat_interval_secs: u64,
    stale_after_secs: u64,
}

/// Why startup did not result in this process owning the core instance lock.
pub enum StartupOutcome {
    /// This process holds the lock and should run the accept loop.
    Owner,
    /// Another live process already owns the lock; the caller should exit.
    AlreadyRunning(CoreLease),
}

impl IpcServer {
    pub fn new(dispatcher: Arc<Dispatcher>, heartbeat_interval_secs: u64, stale_after_secs: u64) -> Self {
        Self {
            dispatcher,
            heartbeat_interval_secs,
            stale_after_secs,
        }
    }

    /// Acquire the singleton lock, reclaiming a stale lease (§4.F.2, §4.I).
    /// A live competing instance is reported, not retried — the caller (CLI
    /// or `main`) decides whether that is an error or a normal "already up".
    pub fn acquire_singleton(&self) -> Result<StartupOutcome, lockfile::LeaseError> {
        match lockfile::acquire_core_lock()? {
            AcquireResult::Acquired => Ok(StartupOutcome::Owner),
            AcquireResult::StaleRemoved => match lockfile::acquire_core_lock()? {
                AcquireResult::Acquired => Ok(StartupOutcome::Owner),
                AcquireResult::AlreadyRunning(lease) => Ok(StartupOutcome::AlreadyRunning(lease)),
                AcquireResult::StaleRemoved => Ok(StartupOutcome::Owner),
            },
            AcquireResult::AlreadyRunning(lease) => Ok(StartupOutcome::AlreadyRunning(lease)),
        }
    }

    /// Run until `shutdown` fires: bind the transport, write the
    /// endpoint/token/lease files, start the heartbeat, and accept
    /// connections. Removes all lease files on the way out regardless of how
    /// the loop ended (§4.F.3).
    pub async fn run(&self, mut shutdown: tokio::sync::broadcast::Receiver<()>) -> anyhow::Result<()> {
        paths::ensure_directories()?;
        let token = generate_token();
        lockfile::write_token(&token)?;

        let lease = CoreLease::new(self.heartbeat_interval_secs, self.stale_after_secs);
        lockfile::write_lease(&lease)?;

        let result = self.run_transport(&token, shutdown.resubscribe()).await;

        lockfile::remove_all();
        result
    }

    #[cfg(unix)]
    async fn run_transport(
        &self,
        token: &str,
        mut shutdown: tokio::sync::broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let socket_path = paths::core_runtime_dir().join("core.sock");
        std::fs::remove_file(&socket_path).ok();
        let listener = tokio::net::UnixListener::bind(&socket_path)?;
        lockfile::write_endpoint(&Endpoint::Socket {
            address: socket_path.display().to_string(),
        })?;
        info!(path = %socket_path.display(), "ipc listener bound");

        self.spawn_heartbeat();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _addr) = accepted?;
                    let dispatcher = self.dispatcher.clone();
                    let token = token.to_string();
                    tokio::spawn(async move {
                        if let Err(err) = serve_connection(stream, dispatcher, token).await {
                            warn!(error = %err, "ipc connection ended with error");
                        }
                    });
                }
                _ = shutdown.recv() => break,
            }
        }
        Ok(())
    }

    #[cfg(windows)]
    async fn run_transport(
        &self,
        token: &str,
        mut shutdown: tokio::sync::broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        lockfile::write_endpoint(&Endpoint::Tcp {
            address: "127.0.0.1".to_string(),
            port,
        })?;
        info!(port, "ipc listener bound");

        self.spawn_heartbeat();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _addr) = accepted?;
                    let dispatcher = self.dispatcher.clone();
                    let token = token.to_string();
                    tokio::spawn(async move {
                        if let Err(err) = serve_connection(stream, dispatcher, token).await {
                            warn!(error = %err, "ipc connection ended with error");
                        }
                    });
                }
                _ = shutdown.recv() => break,
            }
        }
        Ok(())
    }

    fn spawn_heartbeat(&self) {
        let interval_secs = self.heartbeat_interval_secs.max(1);
        let stale_after_secs = self.stale_after_secs;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            loop {
                ticker.tick().await;
                if let Some(mut lease) = lockfile::read_lease() {
                    lease.last_heartbeat_at = chrono::Utc::now();
                    lease.stale_after_seconds = stale_after_secs;
                    if let Err(err) = lockfile::write_lease(&lease) {
                        warn!(error = %err, "failed to refresh core lease");
                    }
                }
            }
        });
    }
}

/// Drive one accepted connection: authenticate the first frame's bearer
/// token, resolve its capability floor, then serve requests strictly in
/// arrival order (§5's "responses are issued in request order") until EOF.
async fn serve_connection<S>(stream: S, dispatcher: Arc<Dispatcher>, token: String) -> Result<(), FramingError>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    loop {
        let request: IpcRequest = match read_frame(&mut reader).await? {
            Some(request) => request,
            None => return Ok(()),
        };

        if request.token != token {
            let response = IpcResponse::failure(
                request.request_id.clone(),
                ApiError::new(ErrorCode::AuthenticationDenied, "bearer token mismatch"),
            );
            write_frame(&mut write_half, &response).await?;
            continue;
        }

        let binding = resolve_binding(dispatcher.store(), &request).await;
        let response = dispatcher.dispatch(&request, &binding).await;
        write_frame(&mut write_half, &response).await?;
    }
}

/// Resolve the capability profile bound to this request's session. Identity
/// resolution beyond the bearer token (multi-user auth, SSO) is out of scope
/// (§1). The reserved `planner` session id gets the unscoped-read-only
/// `Planner` tier (§4.D); a session id that names an in-progress `PAIR` task
/// — the convention a paired UI connection uses to join that task's live
/// session — gets `PairWorker`; everyone else gets `Maintainer`.
async fn resolve_binding(store: &Store, request: &IpcRequest) -> SessionBinding {
    let capability = if request.session_id == "planner" {
        kagan_api_types::CapabilityProfile::Planner
    } else if is_active_pair_session(store, &request.session_id).await {
        kagan_api_types::CapabilityProfile::PairWorker
    } else {
        kagan_api_types::CapabilityProfile::Maintainer
    };
    SessionBinding::new(request.session_id.clone(), capability, request.session_id.clone())
}

async fn is_active_pair_session(store: &Store, session_id: &str) -> bool {
    let Ok(task_id) = uuid::Uuid::parse_str(session_id) else {
        return false;
    };
    matches!(
        store.get_task(task_id).await,
        Ok(Some(task)) if task.task_type == TaskType::Pair && task.status == TaskStatus::InProgress
    )
}

/// An opaque bearer token (§6): two concatenated v4 UUIDs give 256 bits of
/// entropy without pulling in a dedicated RNG crate the rest of the
/// workspace has no other use for.
fn generate_token() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}
