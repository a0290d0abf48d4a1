//! Runtime-directory and lease/endpoint/token file path resolution, with the
//! `KAGAN_*` environment overrides of §6. Grounded on
//! `original_source/src/kagan/core/paths.py`; general config-file/XDG
//! resolution policy is out of scope (§1) — only what §4.F/§4.I need.

use std::path::PathBuf;

fn env_override(var: &str) -> Option<PathBuf> {
    std::env::var_os(var).map(PathBuf::from)
}

fn home_subdir(leaf: &str) -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kagan")
        .join(leaf)
}

pub fn data_dir() -> PathBuf {
    env_override("KAGAN_DATA_DIR").unwrap_or_else(|| home_subdir("data"))
}

pub fn config_dir() -> PathBuf {
    env_override("KAGAN_CONFIG_DIR").unwrap_or_else(|| home_subdir("config"))
}

pub fn cache_dir() -> PathBuf {
    env_override("KAGAN_CACHE_DIR").unwrap_or_else(|| home_subdir("cache"))
}

/// Base directory under which per-task worktrees are created (§4.B.3).
pub fn worktree_base_dir() -> PathBuf {
    if let Some(p) = env_override("KAGAN_WORKTREE_BASE") {
        return p;
    }
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/tmp/kagan")
    }
    #[cfg(not(target_os = "linux"))]
    {
        std::env::temp_dir().join("kagan")
    }
}

/// Runtime directory holding the endpoint/token/lease files (§4.F, §6).
pub fn core_runtime_dir() -> PathBuf {
    env_override("KAGAN_CORE_RUNTIME_DIR").unwrap_or_else(|| home_subdir("run"))
}

pub fn database_path() -> PathBuf {
    data_dir().join("kagan.db")
}

pub fn endpoint_path() -> PathBuf {
    core_runtime_dir().join("endpoint.json")
}

pub fn token_path() -> PathBuf {
    core_runtime_dir().join("token")
}

pub fn core_lease_path() -> PathBuf {
    core_runtime_dir().join("core.lease.json")
}

pub fn core_instance_lock_path() -> PathBuf {
    core_runtime_dir().join("core.instance.lock")
}

/// Ensure every directory this module resolves actually exists on disk.
pub fn ensure_directories() -> std::io::Result<()> {
    for dir in [data_dir(), config_dir(), cache_dir(), core_runtime_dir()] {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

pub fn debug_enabled() -> bool {
    std::env::var("KAGAN_DEBUG")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
