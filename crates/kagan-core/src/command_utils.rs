//! PATH/PATHEXT resolution for spawning agent and git binaries, grounded on
//! `original_source/src/kagan/core/command_utils.py`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use once_cell::sync::Lazy;
use std::collections::HashMap;

const WIN_DEFAULT_PATHEXT: &str = ".COM;.EXE;.BAT;.CMD;.VBS;.JS;.WS;.MSC";

static WHICH_CACHE: Lazy<Mutex<HashMap<String, Option<PathBuf>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// `which`-style PATH lookup, cached for the life of the process (PATH does
/// not change mid-session).
pub fn cached_which(name: &str) -> Option<PathBuf> {
    if let Some(hit) = WHICH_CACHE.lock().unwrap().get(name) {
        return hit.clone();
    }
    let found = which_uncached(name);
    WHICH_CACHE
        .lock()
        .unwrap()
        .insert(name.to_string(), found.clone());
    found
}

/// Clear the cache. Intended for tests.
pub fn clear_which_cache() {
    WHICH_CACHE.lock().unwrap().clear();
}

fn which_uncached(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if is_executable_file(&candidate) {
            return Some(candidate);
        }
    }
    None
}

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(windows)]
fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}

pub fn is_windows() -> bool {
    cfg!(windows)
}

/// Resolve a command's executable to a concrete path when possible, walking
/// `PATHEXT` on Windows. Leaves the command untouched when it already looks
/// like a path (contains a separator) or cannot be resolved.
pub fn resolve_command_path(command: &[String]) -> Vec<String> {
    let Some((cmd, args)) = command.split_first() else {
        return Vec::new();
    };

    if Path::new(cmd).file_name().map(|n| n != cmd.as_str()).unwrap_or(true) {
        let mut out = vec![cmd.clone()];
        out.extend(args.iter().cloned());
        return out;
    }

    if is_windows() {
        let pathext =
            std::env::var("PATHEXT").unwrap_or_else(|_| WIN_DEFAULT_PATHEXT.to_string());
        for ext in pathext.split(';') {
            if let Some(found) = cached_which(&format!("{cmd}{ext}")) {
                let mut out = vec![found.display().to_string()];
                out.extend(args.iter().cloned());
                return out;
            }
        }
    }

    if let Some(found) = cached_which(cmd) {
        let mut out = vec![found.display().to_string()];
        out.extend(args.iter().cloned());
        return out;
    }

    let mut out = vec![cmd.clone()];
    out.extend(args.iter().cloned());
    out
}

/// Format `command` + `args` as a shell-ready string for display/logging.
pub fn format_command_for_shell(command: &str, args: &[String]) -> String {
    if args.is_empty() {
        return command.to_string();
    }
    let joined = args
        .iter()
        .map(|a| shell_quote(a))
        .collect::<Vec<_>>()
        .join(" ");
    format!("{command} {joined}")
}

fn shell_quote(arg: &str) -> String {
    if arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || "\"'$`\\".contains(c)) {
        format!("'{}'", arg.replace('\'', "'\\''"))
    } else {
        arg.to_string()
    }
}
