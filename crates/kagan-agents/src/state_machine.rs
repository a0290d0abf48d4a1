//! Agent session lifecycle FSM (§4.C.5). Grounded on
//! `at-agents/src/state_machine.rs`'s `AgentState`/`AgentEvent` shape — state
//! names are renamed to the session lifecycle this spec actually needs, and
//! the transition table/history trail carry over directly.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Spawning,
    Ready,
    Running,
    Cancelling,
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Spawning => "Spawning",
            SessionState::Ready => "Ready",
            SessionState::Running => "Running",
            SessionState::Cancelling => "Cancelling",
            SessionState::Terminated => "Terminated",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    /// The child process confirmed it is ready to accept a prompt.
    Spawned,
    /// A prompt frame was sent.
    Prompt,
    /// The agent emitted a `complete`/`continue`/`blocked` lifecycle event.
    Complete,
    /// `session/cancel` was sent to the child.
    Cancel,
    /// The child process exited, gracefully or otherwise.
    Exit,
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionEvent::Spawned => "Spawned",
            SessionEvent::Prompt => "Prompt",
            SessionEvent::Complete => "Complete",
            SessionEvent::Cancel => "Cancel",
            SessionEvent::Exit => "Exit",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateMachineError {
    #[error("invalid transition: cannot apply {event} in state {state}")]
    InvalidTransition {
        state: SessionState,
        event: SessionEvent,
    },
}

#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    current: SessionState,
    history: Vec<(SessionState, SessionEvent, SessionState)>,
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self {
            current: SessionState::Spawning,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.current
    }

    pub fn history(&self) -> &[(SessionState, SessionEvent, SessionState)] {
        &self.history
    }

    /// Valid transitions:
    /// - Spawning + Spawned  -> Ready
    /// - Ready    + Prompt   -> Running
    /// - Running  + Complete -> Ready
    /// - Ready    + Cancel   -> Cancelling
    /// - Running  + Cancel   -> Cancelling
    /// - {Spawning, Ready, Running, Cancelling} + Exit -> Terminated
    pub fn transition(&mut self, event: SessionEvent) -> Result<SessionState, StateMachineError> {
        use SessionEvent::*;
        use SessionState::*;

        let next = match (self.current, event) {
            (Spawning, Spawned) => Ready,
            (Ready, Prompt) => Running,
            (Running, Complete) => Ready,
            (Ready, Cancel) => Cancelling,
            (Running, Cancel) => Cancelling,
            (Spawning, Exit) | (Ready, Exit) | (Running, Exit) | (Cancelling, Exit) => Terminated,
            _ => {
                return Err(StateMachineError::InvalidTransition {
                    state: self.current,
                    event,
                })
            }
        };

        let from = self.current;
        self.current = next;
        self.history.push((from, event, next));
        tracing::debug!(from = %from, event = %event, to = %next, "session state transition");
        Ok(next)
    }

    pub fn can_transition(&self, event: SessionEvent) -> bool {
        use SessionEvent::*;
        use SessionState::*;
        matches!(
            (self.current, event),
            (Spawning, Spawned)
                | (Ready, Prompt)
                | (Running, Complete)
                | (Ready, Cancel)
                | (Running, Cancel)
                | (Spawning, Exit)
                | (Ready, Exit)
                | (Running, Exit)
                | (Cancelling, Exit)
        )
    }
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
