pub mod buffers;
pub mod permission_policy;
pub mod protocol;
pub mod session;
pub mod signals;
pub mod state_machine;

pub use session::{AgentSession, ExitOutcome, SessionError, TerminationOrigin};
pub use state_machine::{SessionEvent, SessionState, SessionStateMachine, StateMachineError};
