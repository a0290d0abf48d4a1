//! Wire-level types shared by the IPC server, API boundary, and CLI clients.
//!
//! Nothing in this crate depends on `tokio` — it is the vocabulary both sides
//! of the IPC boundary serialize over, not the transport itself.

pub mod capability;
pub mod error;
pub mod ipc;

pub use capability::{AgentPermissionScope, CapabilityProfile};
pub use error::{ApiError, ErrorCode};
pub use ipc::{IpcRequest, IpcResponse, IpcResponseBody};
