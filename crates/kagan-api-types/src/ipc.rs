use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Maximum size of a single newline-delimited frame (§6), including the
/// trailing newline. Oversized frames close the connection.
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// One logical request frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcRequest {
    pub request_id: String,
    pub session_id: String,
    pub capability: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    pub token: String,
}

/// The `ok:true` / `ok:false` reply body; kept as a tagged enum so serde
/// produces exactly the `{request_id, ok, result}` / `{request_id, ok, error}`
/// shape of §6 rather than a struct with both fields present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IpcResponseBody {
    Ok { result: serde_json::Value },
    Err { error: ApiError },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcResponse {
    pub request_id: String,
    pub ok: bool,
    #[serde(flatten)]
    pub body: IpcResponseBody,
}

impl IpcResponse {
    pub fn success(request_id: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            request_id: request_id.into(),
            ok: true,
            body: IpcResponseBody::Ok { result },
        }
    }

    pub fn failure(request_id: impl Into<String>, error: ApiError) -> Self {
        Self {
            request_id: request_id.into(),
            ok: false,
            body: IpcResponseBody::Err { error },
        }
    }

    /// The "effective" success used by the audit log (§3 invariant 8,
    /// testable property §8.10): unwrap a nested `result.success` boolean
    /// when present, otherwise fall back to transport-level `ok`.
    pub fn effective_success(&self) -> bool {
        match &self.body {
            IpcResponseBody::Err { .. } => false,
            IpcResponseBody::Ok { result } => result
                .get("success")
                .and_then(|v| v.as_bool())
                .unwrap_or(self.ok),
        }
    }
}
