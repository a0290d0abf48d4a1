//! Core instance lease and repository/project lock (§4.F, §4.I).
//!
//! Grounded on `at-core/src/lockfile.rs` (`DaemonLockfile`, `AcquireResult`,
//! `create_new(true)` acquisition) generalized to the dual-platform PID
//! liveness algorithm of `original_source/src/kagan/core/process_liveness.py`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::atomic::atomic_write;
use crate::paths;

#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// `{owner_pid, hostname, acquired_at, last_heartbeat_at, stale_after_seconds}` (§4.F.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreLease {
    pub version: u32,
    pub owner_pid: u32,
    pub owner_hostname: String,
    pub acquired_at: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
    pub heartbeat_interval_seconds: u64,
    pub stale_after_seconds: u64,
}

impl CoreLease {
    pub fn new(heartbeat_interval_seconds: u64, stale_after_seconds: u64) -> Self {
        let now = Utc::now();
        Self {
            version: 1,
            owner_pid: std::process::id(),
            owner_hostname: hostname(),
            acquired_at: now,
            last_heartbeat_at: now,
            heartbeat_interval_seconds,
            stale_after_seconds,
        }
    }

    pub fn is_stale(&self) -> bool {
        let elapsed = Utc::now().signed_duration_since(self.last_heartbeat_at);
        elapsed.num_seconds() > self.stale_after_seconds as i64
    }

    /// A lease is reclaimable when it is stale *and* its owning PID is dead.
    /// A live PID on the same host is never reclaimed even past staleness,
    /// per §4.I's "holder from a different PID but same host is treated as
    /// live until proven otherwise".
    pub fn is_reclaimable(&self) -> bool {
        self.is_stale() && !pid_alive(self.owner_pid)
    }
}

pub fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "localhost".to_string())
}

/// Endpoint descriptor persisted alongside the lease (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum Endpoint {
    Socket { address: String },
    Tcp { address: String, port: u16 },
}

pub enum AcquireResult {
    Acquired,
    AlreadyRunning(CoreLease),
    StaleRemoved,
}

/// Acquire the core instance lock at `paths::core_instance_lock_path()`.
///
/// Uses `O_CREAT|O_EXCL` so at most one process wins the race; a losing
/// process consults the existing lease to decide whether it is stale.
pub fn acquire_core_lock() -> Result<AcquireResult, LeaseError> {
    let lock_path = paths::core_instance_lock_path();
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    match OpenOptions::new().create_new(true).write(true).open(&lock_path) {
        Ok(mut f) => {
            write!(f, "{}", std::process::id())?;
            Ok(AcquireResult::Acquired)
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            match read_lease() {
                Some(lease) if lease.is_reclaimable() => {
                    std::fs::remove_file(&lock_path).ok();
                    Ok(AcquireResult::StaleRemoved)
                }
                Some(lease) => Ok(AcquireResult::AlreadyRunning(lease)),
                None => {
                    // Lock file exists but no lease yet written (race at startup);
                    // treat conservatively as running.
                    Ok(AcquireResult::AlreadyRunning(CoreLease::new(0, 0)))
                }
            }
        }
        Err(e) => Err(e.into()),
    }
}

pub fn write_lease(lease: &CoreLease) -> Result<(), LeaseError> {
    let bytes = serde_json::to_vec_pretty(lease)?;
    atomic_write(&paths::core_lease_path(), &bytes).map_err(|e| LeaseError::Io(e.into()))?;
    Ok(())
}

pub fn write_endpoint(endpoint: &Endpoint) -> Result<(), LeaseError> {
    let bytes = serde_json::to_vec_pretty(endpoint)?;
    atomic_write(&paths::endpoint_path(), &bytes).map_err(|e| LeaseError::Io(e.into()))?;
    Ok(())
}

pub fn write_token(token: &str) -> Result<(), LeaseError> {
    atomic_write(&paths::token_path(), token.as_bytes()).map_err(|e| LeaseError::Io(e.into()))?;
    Ok(())
}

pub fn read_lease() -> Option<CoreLease> {
    let bytes = std::fs::read(paths::core_lease_path()).ok()?;
    serde_json::from_slice(&bytes).ok()
}

pub fn read_endpoint() -> Option<Endpoint> {
    let bytes = std::fs::read(paths::endpoint_path()).ok()?;
    serde_json::from_slice(&bytes).ok()
}

pub fn read_token() -> Option<String> {
    std::fs::read_to_string(paths::token_path()).ok()
}

/// Remove all lease-related files on shutdown (§4.F.3).
pub fn remove_all() {
    for path in [
        paths::core_instance_lock_path(),
        paths::core_lease_path(),
        paths::endpoint_path(),
        paths::token_path(),
    ] {
        std::fs::remove_file(path).ok();
    }
}

/// §4.F.4 discovery: read endpoint + token, validate lease freshness and PID
/// liveness. Reachability probing (TCP/socket connect) is the IPC server's
/// job; this function covers the filesystem/PID half of discovery.
pub fn discover() -> Option<(Endpoint, String, CoreLease)> {
    let endpoint = read_endpoint()?;
    let token = read_token()?;
    let lease = read_lease()?;
    if lease.is_stale() || !pid_alive(lease.owner_pid) {
        return None;
    }
    Some((endpoint, token, lease))
}

// ---------------------------------------------------------------------------
// Repository / project lock (§4.I)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoLockInfo {
    pub pid: u32,
    pub hostname: String,
    pub repo_path: String,
}

pub enum RepoLockResult {
    Acquired,
    HeldByLivePeer(RepoLockInfo),
}

fn repo_lock_path(repo_path: &Path) -> PathBuf {
    let digest = blake3::hash(repo_path.to_string_lossy().as_bytes());
    paths::core_runtime_dir()
        .join("repo-locks")
        .join(format!("{}.lock", digest.to_hex()))
}

/// Acquire the per-project repository lock (§4.I): at most one client
/// workspace per project root on this host.
pub fn acquire_repo_lock(repo_path: &Path) -> Result<RepoLockResult, LeaseError> {
    let lock_path = repo_lock_path(repo_path);
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let info = RepoLockInfo {
        pid: std::process::id(),
        hostname: hostname(),
        repo_path: repo_path.display().to_string(),
    };

    match OpenOptions::new().create_new(true).write(true).open(&lock_path) {
        Ok(mut f) => {
            f.write_all(&serde_json::to_vec(&info)?)?;
            Ok(RepoLockResult::Acquired)
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            let existing: RepoLockInfo = serde_json::from_slice(&std::fs::read(&lock_path)?)?;
            let same_host = existing.hostname == hostname();
            if same_host && !pid_alive(existing.pid) {
                std::fs::remove_file(&lock_path).ok();
                return acquire_repo_lock(repo_path);
            }
            Ok(RepoLockResult::HeldByLivePeer(existing))
        }
        Err(e) => Err(e.into()),
    }
}

pub fn release_repo_lock(repo_path: &Path) {
    std::fs::remove_file(repo_lock_path(repo_path)).ok();
}

// ---------------------------------------------------------------------------
// Cross-platform PID liveness (§2.B, §4.F, §4.I)
// ---------------------------------------------------------------------------

#[cfg(unix)]
pub fn pid_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    // SAFETY: kill(pid, 0) performs no action beyond existence/permission
    // checking; it sends no signal.
    let result = unsafe { libc::kill(pid as libc::pid_t, 0) };
    if result == 0 {
        return true;
    }
    // EPERM means the process exists but we lack permission to signal it.
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(windows)]
pub fn pid_alive(pid: u32) -> bool {
    use windows_sys::Win32::Foundation::{CloseHandle, GetLastError, ERROR_ACCESS_DENIED};
    use windows_sys::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

    if pid == 0 {
        return false;
    }
    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle != 0 {
            CloseHandle(handle);
            return true;
        }
        GetLastError() == ERROR_ACCESS_DENIED
    }
}

#[cfg(not(any(unix, windows)))]
pub fn pid_alive(_pid: u32) -> bool {
    true
}
