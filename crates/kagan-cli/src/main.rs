//! `kagan-core` CLI — `start`/`stop`/`status` only (§6: "CLI surface for the
//! core daemon only").
//!
//! Grounded on `at-cli/src/main.rs`'s `clap` derive `Parser`/`Subcommand`
//! structure and lockfile-driven default endpoint resolution, with every
//! bead/skill/ideation/agent subcommand dropped as out of this spec's scope.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use kagan_core::lockfile;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// kagan core daemon control.
#[derive(Parser)]
#[command(name = "kagan-core", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the core daemon (spawns or runs the daemon; exit 0 on success).
    Start {
        /// Run in the foreground instead of detaching.
        #[arg(long)]
        foreground: bool,
        /// Override the config directory.
        #[arg(long = "config-path")]
        config_path: Option<PathBuf>,
        /// Override the database path.
        #[arg(long = "db-path")]
        db_path: Option<PathBuf>,
    },
    /// Stop the running core daemon.
    Stop,
    /// Print the discovered endpoint, or explain why discovery failed.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Status) {
        Commands::Start {
            foreground,
            config_path,
            db_path,
        } => start(foreground, config_path, db_path).await,
        Commands::Stop => stop().await,
        Commands::Status => status().await,
    }
}

/// Locate the daemon binary next to this CLI binary (both ship from the same
/// workspace build/install step).
fn daemon_binary_path() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("failed to resolve current executable path")?;
    let dir = exe.parent().context("executable has no parent directory")?;
    let name = if cfg!(windows) { "kagan-core-daemon.exe" } else { "kagan-core-daemon" };
    Ok(dir.join(name))
}

async fn start(foreground: bool, config_path: Option<PathBuf>, db_path: Option<PathBuf>) -> Result<()> {
    if let Some((_, _, lease)) = lockfile::discover() {
        println!("core already running (pid={}, host={})", lease.owner_pid, lease.owner_hostname);
        return Ok(());
    }

    let daemon_bin = daemon_binary_path()?;
    let mut command = Command::new(&daemon_bin);
    if let Some(config_path) = &config_path {
        command.env("KAGAN_CONFIG_DIR", config_path);
    }
    if let Some(db_path) = &db_path {
        if let Some(parent) = db_path.parent() {
            command.env("KAGAN_DATA_DIR", parent);
        }
    }

    if foreground {
        let status = command.status().with_context(|| format!("failed to run {}", daemon_bin.display()))?;
        if !status.success() {
            bail!("daemon exited with {status}");
        }
        return Ok(());
    }

    command.spawn().with_context(|| format!("failed to spawn {}", daemon_bin.display()))?;

    for _ in 0..50 {
        if lockfile::discover().is_some() {
            println!("core started");
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    bail!("daemon did not become reachable within the startup window")
}

async fn stop() -> Result<()> {
    let Some(lease) = lockfile::read_lease() else {
        println!("core is not running");
        return Ok(());
    };

    if !lockfile::pid_alive(lease.owner_pid) {
        println!("core lease is stale (pid {} is not alive); cleaning up", lease.owner_pid);
        lockfile::remove_all();
        return Ok(());
    }

    terminate(lease.owner_pid)?;
    println!("sent stop signal to core (pid={})", lease.owner_pid);
    Ok(())
}

#[cfg(unix)]
fn terminate(pid: u32) -> Result<()> {
    // SAFETY: kill() with SIGTERM is the standard graceful-shutdown request;
    // the process decides how to react, it is not forcibly killed here.
    let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if result != 0 {
        bail!("failed to signal pid {pid}: {}", std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(windows)]
fn terminate(pid: u32) -> Result<()> {
    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::System::Threading::{OpenProcess, TerminateProcess, PROCESS_TERMINATE};
    unsafe {
        let handle = OpenProcess(PROCESS_TERMINATE, 0, pid);
        if handle == 0 {
            bail!("failed to open pid {pid} for termination");
        }
        let ok = TerminateProcess(handle, 1);
        CloseHandle(handle);
        if ok == 0 {
            bail!("failed to terminate pid {pid}");
        }
    }
    Ok(())
}

async fn status() -> Result<()> {
    match lockfile::discover() {
        Some((endpoint, _token, lease)) => {
            println!("core running (pid={}, host={})", lease.owner_pid, lease.owner_hostname);
            match endpoint {
                lockfile::Endpoint::Socket { address } => println!("transport: socket {address}"),
                lockfile::Endpoint::Tcp { address, port } => println!("transport: tcp {address}:{port}"),
            }
            Ok(())
        }
        None => {
            // §6: exit 2 when metadata is incomplete but a PID is alive.
            if let Some(lease) = lockfile::read_lease() {
                if lockfile::pid_alive(lease.owner_pid) {
                    eprintln!(
                        "core lease found (pid={}) but endpoint/token metadata is incomplete or stale",
                        lease.owner_pid
                    );
                    std::process::exit(2);
                }
            }
            println!("core is not running");
            Ok(())
        }
    }
}
