//! Numeric limits shared across the scheduler, session, and store layers.
//!
//! These resolve the spec's "configured cap" / "documented limits" language
//! to concrete constants, grounded on `original_source/src/kagan/limits.py`.

use std::time::Duration;

/// Default timeout for a single agent turn.
pub const AGENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longer timeout for operations known to be slow (e.g. review runs).
pub const AGENT_TIMEOUT_LONG: Duration = Duration::from_secs(60);

/// Grace period allowed for a cooperative shutdown before escalating.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Capacity of the per-session response character ring buffer.
pub const RESPONSE_BUFFER: usize = 10_000;

/// Capacity of the per-session message ring buffer.
pub const MESSAGE_BUFFER: usize = 500;

/// Per-stream byte budget for a spawned agent's stdout/stderr.
pub const SUBPROCESS_LIMIT: usize = 10 * 1024 * 1024;

/// Maximum scratchpad size, in bytes, after any update (§3 invariant 6).
pub const SCRATCHPAD_LIMIT: usize = 50_000;

/// Maximum tool calls tracked for a single execution before older entries drop.
pub const MAX_TOOL_CALLS: usize = 500;

/// Maximum log entries retained per execution before older entries drop.
pub const MAX_CONVERSATION_HISTORY: usize = 100;

/// Maximum length of a single logged message before truncation.
pub const MAX_LOG_MESSAGE_LENGTH: usize = 4_096;

/// Maximum newline-delimited IPC frame size (§6), including the newline.
pub const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;
