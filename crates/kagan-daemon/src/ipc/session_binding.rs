//! Per-connection identity (§4.F).
//!
//! Grounded on `original_source/src/kagan/core/request_context.py`'s
//! resolved-identity shape; its `ContextVar`-based propagation is not carried
//! over, since `Dispatcher::dispatch` already takes `&SessionBinding` as an
//! explicit parameter and every handler reaches it through that, not through
//! ambient per-task context.

use kagan_api_types::CapabilityProfile;

/// Resolved identity of one accepted IPC connection.
#[derive(Debug, Clone)]
pub struct SessionBinding {
    pub session_id: String,
    pub capability: CapabilityProfile,
    pub identity: String,
}

impl SessionBinding {
    pub fn new(session_id: impl Into<String>, capability: CapabilityProfile, identity: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            capability,
            identity: identity.into(),
        }
    }
}
