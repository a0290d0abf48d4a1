//! Agent session: owns a child process and the line-framed ACP wire (§4.C).
//!
//! Grounded on `at-session/src/session.rs` for the session-ownership shape
//! (an opaque identity plus a handle plus a `Debug` impl that never blocks),
//! adapted from a PTY handle to a plain piped child process since agents here
//! speak a JSON-RPC-ish protocol over stdio rather than a terminal. Permission
//! prompting borrows `at-agents/src/approval.rs`'s pending-request/resolve
//! shape, replacing its polling `ApprovalStatus` with a one-shot future so a
//! timeout can race it directly.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use kagan_api_types::{AgentPermissionScope, CapabilityProfile};
use kagan_core::command_utils::resolve_command_path;
use kagan_core::limits::{AGENT_TIMEOUT, AGENT_TIMEOUT_LONG, SHUTDOWN_TIMEOUT, SUBPROCESS_LIMIT};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::buffers::SessionBuffers;
use crate::permission_policy::{resolve_auto_approve, resolve_mcp_capability, resolve_permission_decision};
use crate::protocol::{OutboundFrame, SessionUpdate};
use crate::state_machine::{SessionEvent, SessionStateMachine};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to spawn agent process: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("agent output line exceeded the {SUBPROCESS_LIMIT} byte budget")]
    OutputTooLarge,
    #[error("malformed ACP frame: {0}")]
    Protocol(#[from] serde_json::Error),
    #[error("agent process has already exited")]
    AlreadyExited,
    #[error("permission request {0} timed out waiting for a UI answer")]
    PermissionTimedOut(u64),
    #[error(transparent)]
    StateMachine(#[from] crate::state_machine::StateMachineError),
}

/// Whether a session's exit was caused by our own cancellation, set the
/// instant the cancel path fires — *before* the child's exit status is
/// observed — so a later nonzero exit code from a process we asked to die
/// is never misclassified as a failure (§9 "agent exit classification").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TerminationOrigin {
    #[default]
    Natural,
    Requested,
}

#[derive(Debug, Clone)]
pub struct ExitOutcome {
    pub origin: TerminationOrigin,
    pub exit_code: Option<i32>,
}

impl ExitOutcome {
    /// A failed run is a *natural* exit with a nonzero code. A requested
    /// cancellation is never a failure regardless of what the OS reports.
    pub fn is_failure(&self) -> bool {
        self.origin == TerminationOrigin::Natural && self.exit_code.map(|c| c != 0).unwrap_or(false)
    }
}

struct PendingPermission {
    responder: oneshot::Sender<bool>,
}

/// Ties together a spawned agent's child process, its ACP framing, and the
/// session-lifecycle state machine.
pub struct AgentSession {
    pub session_id: Uuid,
    scope: AgentPermissionScope,
    capability: CapabilityProfile,
    planner_auto_approve: bool,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<tokio::process::ChildStdout>,
    state: SessionStateMachine,
    buffers: SessionBuffers,
    termination_origin: TerminationOrigin,
    next_permission_id: u64,
    pending_permissions: HashMap<u64, PendingPermission>,
}

impl AgentSession {
    /// Spawn a new agent session. `command` is the argv (`command[0]` is
    /// resolved via PATH/PATHEXT); `workdir` becomes the child's cwd, which
    /// for a task-scoped session is the task's worktree. `planner_auto_approve`
    /// is `CoreConfig::planner_auto_approve`, consulted only when `scope` is
    /// `Planner` (§4.C.3; every other scope always auto-approves).
    pub async fn spawn(
        command: &[String],
        workdir: &std::path::Path,
        scope: AgentPermissionScope,
        task_id: &str,
        read_only: bool,
        planner_auto_approve: bool,
    ) -> Result<Self, SessionError> {
        let resolved = resolve_command_path(command);
        let (program, args) = resolved.split_first().expect("resolve_command_path never returns empty");

        info!(program, ?args, ?workdir, "spawning agent session");

        let mut child = Command::new(program)
            .args(args)
            .current_dir(workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = BufReader::new(child.stdout.take().expect("piped stdout"));

        let capability = resolve_mcp_capability(task_id, read_only);

        Ok(Self {
            session_id: Uuid::new_v4(),
            scope,
            capability,
            planner_auto_approve,
            child,
            stdin,
            stdout,
            state: SessionStateMachine::new(),
            buffers: SessionBuffers::new(),
            termination_origin: TerminationOrigin::Natural,
            next_permission_id: 0,
            pending_permissions: HashMap::new(),
        })
    }

    pub fn capability(&self) -> CapabilityProfile {
        self.capability
    }

    pub fn state(&self) -> crate::state_machine::SessionState {
        self.state.state()
    }

    /// Send a prompt to the agent, transitioning Ready -> Running.
    pub async fn send_prompt(&mut self, text: impl Into<String>) -> Result<(), SessionError> {
        self.write_frame(&OutboundFrame::prompt(text)).await?;
        self.state.transition(SessionEvent::Prompt)?;
        Ok(())
    }

    /// Read the next ACP frame off stdout, coalescing it into the session's
    /// buffers, blocking up to `SUBPROCESS_LIMIT` bytes before giving up.
    pub async fn next_update(&mut self) -> Result<Option<SessionUpdate>, SessionError> {
        let mut line = String::new();
        let n = self.stdout.read_line(&mut line).await?;
        if n == 0 {
            return Ok(None);
        }
        if line.len() > SUBPROCESS_LIMIT {
            return Err(SessionError::OutputTooLarge);
        }

        self.buffers.append_response(line.clone());
        let update: SessionUpdate = serde_json::from_str(line.trim_end())?;
        self.buffers.buffer_message(update.clone());

        match &update {
            SessionUpdate::Ready => {
                self.state.transition(SessionEvent::Spawned)?;
            }
            SessionUpdate::Complete | SessionUpdate::Fail { .. } => {
                if self.state.can_transition(SessionEvent::Complete) {
                    self.state.transition(SessionEvent::Complete)?;
                }
            }
            _ => {}
        }

        Ok(Some(update))
    }

    /// Resolve whether a `RequestPermission` update should auto-approve
    /// without prompting, per §4.C.3's centralized policy.
    pub fn should_auto_approve(&self, has_message_target: bool) -> bool {
        let auto_approve_enabled = resolve_auto_approve(self.scope, self.planner_auto_approve);
        resolve_permission_decision(auto_approve_enabled, has_message_target).auto_approve
    }

    /// Register a pending permission prompt and wait for either a UI answer
    /// or `AGENT_TIMEOUT`, denying on timeout.
    pub async fn await_permission_answer(&mut self) -> (u64, oneshot::Receiver<bool>) {
        let id = self.next_permission_id;
        self.next_permission_id += 1;
        let (tx, rx) = oneshot::channel();
        self.pending_permissions.insert(id, PendingPermission { responder: tx });
        (id, rx)
    }

    /// Resolve a previously-registered permission prompt from the UI side.
    pub fn answer_permission(&mut self, id: u64, approved: bool) -> bool {
        match self.pending_permissions.remove(&id) {
            Some(pending) => pending.responder.send(approved).is_ok(),
            None => false,
        }
    }

    /// How long to wait for a UI answer before denying a permission prompt.
    /// Review sessions get `AGENT_TIMEOUT_LONG` since a human weighing a diff
    /// legitimately takes longer than an automation run waiting on itself.
    pub fn permission_wait_timeout(&self) -> Duration {
        match self.scope {
            AgentPermissionScope::AutomationReviewer => AGENT_TIMEOUT_LONG,
            _ => AGENT_TIMEOUT,
        }
    }

    pub async fn wait_for_permission(rx: oneshot::Receiver<bool>, wait: Duration) -> bool {
        match timeout(wait, rx).await {
            Ok(Ok(answer)) => answer,
            Ok(Err(_)) | Err(_) => false,
        }
    }

    /// Send the resolved verdict for `id` back to the agent over stdin.
    pub async fn respond_permission(&mut self, id: u64, approved: bool) -> Result<(), SessionError> {
        self.write_frame(&OutboundFrame::permission_response(id, approved)).await
    }

    /// Cooperative cancel: send `session/cancel`, mark the origin as
    /// requested *before* the child exits, then wait briefly before the
    /// caller escalates to `terminate`.
    pub async fn cancel(&mut self) -> Result<(), SessionError> {
        self.termination_origin = TerminationOrigin::Requested;
        if self.state.can_transition(SessionEvent::Cancel) {
            self.state.transition(SessionEvent::Cancel)?;
        }
        self.write_frame(&OutboundFrame::cancel()).await.ok();
        Ok(())
    }

    /// Escalate to OS-level termination and drain the child, returning the
    /// exit classification. Safe to call whether or not `cancel` ran first.
    pub async fn terminate(&mut self) -> ExitOutcome {
        let waited = timeout(SHUTDOWN_TIMEOUT, self.child.wait()).await;
        let exit_code = match waited {
            Ok(Ok(status)) => status.code(),
            Ok(Err(err)) => {
                warn!(error = %err, "error waiting for agent child");
                None
            }
            Err(_) => {
                warn!("agent child did not exit within shutdown timeout, killing");
                self.child.kill().await.ok();
                self.child.wait().await.ok().and_then(|s| s.code())
            }
        };

        if self.state.can_transition(SessionEvent::Exit) {
            let _ = self.state.transition(SessionEvent::Exit);
        }

        debug!(
            session_id = %self.session_id,
            origin = ?self.termination_origin,
            exit_code,
            "agent session terminated"
        );

        ExitOutcome {
            origin: self.termination_origin,
            exit_code,
        }
    }

    async fn write_frame(&mut self, frame: &OutboundFrame) -> Result<(), SessionError> {
        let mut encoded = serde_json::to_vec(frame)?;
        encoded.push(b'\n');
        self.stdin.write_all(&encoded).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    pub fn buffers(&self) -> &SessionBuffers {
        &self.buffers
    }
}

impl std::fmt::Debug for AgentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSession")
            .field("session_id", &self.session_id)
            .field("scope", &self.scope)
            .field("capability", &self.capability)
            .field("state", &self.state.state())
            .field("termination_origin", &self.termination_origin)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requested_exit_with_nonzero_code_is_not_a_failure() {
        let outcome = ExitOutcome {
            origin: TerminationOrigin::Requested,
            exit_code: Some(-15),
        };
        assert!(!outcome.is_failure());
    }

    #[test]
    fn natural_nonzero_exit_is_a_failure() {
        let outcome = ExitOutcome {
            origin: TerminationOrigin::Natural,
            exit_code: Some(1),
        };
        assert!(outcome.is_failure());
    }

    #[test]
    fn natural_zero_exit_is_not_a_failure() {
        let outcome = ExitOutcome {
            origin: TerminationOrigin::Natural,
            exit_code: Some(0),
        };
        assert!(!outcome.is_failure());
    }

    #[test]
    fn missing_exit_code_is_not_treated_as_failure() {
        let outcome = ExitOutcome {
            origin: TerminationOrigin::Natural,
            exit_code: None,
        };
        assert!(!outcome.is_failure());
    }

    #[tokio::test]
    async fn planner_session_auto_approves_only_when_configured() {
        let mut denying = AgentSession::spawn(
            &["cat".to_string()],
            std::env::temp_dir().as_path(),
            AgentPermissionScope::Planner,
            "",
            true,
            false,
        )
        .await
        .expect("spawn cat");
        assert!(!denying.should_auto_approve(true));
        denying.cancel().await.ok();
        denying.terminate().await;

        let mut allowing = AgentSession::spawn(
            &["cat".to_string()],
            std::env::temp_dir().as_path(),
            AgentPermissionScope::Planner,
            "",
            true,
            true,
        )
        .await
        .expect("spawn cat");
        assert!(allowing.should_auto_approve(true));
        allowing.cancel().await.ok();
        allowing.terminate().await;
    }

    #[tokio::test]
    async fn review_scope_gets_the_longer_permission_timeout() {
        let mut session = AgentSession::spawn(
            &["cat".to_string()],
            std::env::temp_dir().as_path(),
            AgentPermissionScope::AutomationReviewer,
            "",
            true,
            false,
        )
        .await
        .expect("spawn cat");
        assert_eq!(session.permission_wait_timeout(), AGENT_TIMEOUT_LONG);
        session.cancel().await.ok();
        session.terminate().await;

        let mut runner = AgentSession::spawn(
            &["cat".to_string()],
            std::env::temp_dir().as_path(),
            AgentPermissionScope::AutomationRunner,
            "",
            true,
            false,
        )
        .await
        .expect("spawn cat");
        assert_eq!(runner.permission_wait_timeout(), AGENT_TIMEOUT);
        runner.cancel().await.ok();
        runner.terminate().await;
    }

    #[tokio::test]
    async fn spawn_echo_and_read_ready_frame() {
        // `cat` mirrors stdin to stdout, so writing a `ready` frame to its
        // stdin and reading it back exercises the framing round-trip without
        // needing a real agent binary.
        let mut session = AgentSession::spawn(
            &["cat".to_string()],
            std::env::temp_dir().as_path(),
            AgentPermissionScope::AutomationRunner,
            "task-1",
            false,
            false,
        )
        .await
        .expect("spawn cat");

        session
            .write_frame(&OutboundFrame::notification("probe", serde_json::json!({})))
            .await
            .ok();

        session.stdin.write_all(b"{\"type\":\"ready\"}\n").await.unwrap();
        session.stdin.flush().await.unwrap();

        let update = session.next_update().await.unwrap();
        assert!(matches!(update, Some(SessionUpdate::Ready)));

        session.cancel().await.ok();
        let outcome = session.terminate().await;
        assert_eq!(outcome.origin, TerminationOrigin::Requested);
    }
}
