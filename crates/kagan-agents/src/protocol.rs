//! The ACP wire (§4.C, §6): outbound notification/request frames and the
//! inbound `session/update` content sum type.
//!
//! Grounded on `original_source/src/kagan/acp/messages.py` (the dataclass
//! shapes here become variants) translated to the tagged-enum design named
//! in SPEC_FULL.md §9 ("dynamic protocol payloads"): content kinds this
//! crate doesn't need to interpret travel as an opaque `serde_json::Value`
//! instead of being silently dropped.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A frame sent *to* the agent's stdin. Requests carry an `id` the agent is
/// expected to echo back; notifications do not (§4.C).
#[derive(Debug, Clone, Serialize)]
pub struct OutboundFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    pub params: Value,
}

impl OutboundFrame {
    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Self {
            id: None,
            method: method.into(),
            params,
        }
    }

    pub fn request(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    pub fn prompt(text: impl Into<String>) -> Self {
        Self::notification("session/prompt", serde_json::json!({ "text": text.into() }))
    }

    pub fn cancel() -> Self {
        Self::notification("session/cancel", Value::Null)
    }

    /// Answer a `RequestPermission` update, correlated by the id the agent
    /// assigned when it sent the request (§4.C.3).
    pub fn permission_response(id: u64, approved: bool) -> Self {
        Self::notification("session/permission_response", serde_json::json!({ "id": id, "approved": approved }))
    }
}

/// A frame received *from* the agent's stdout, parsed out of
/// `session/update` notifications plus the standalone lifecycle
/// notifications (`ready`, `complete`, `fail`) §4.C names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionUpdate {
    Ready,
    Complete,
    Fail {
        message: String,
        #[serde(default)]
        details: String,
    },
    ContentChunk {
        content_type: String,
        text: String,
    },
    ThinkingChunk {
        content_type: String,
        text: String,
    },
    ToolCall {
        tool_call: Value,
    },
    ToolCallUpdate {
        tool_call: Value,
        update: Value,
    },
    Plan {
        entries: Vec<Value>,
    },
    RequestPermission {
        id: u64,
        options: Vec<Value>,
        tool_call: Value,
    },
    ModesCatalog {
        current_mode: String,
        modes: Value,
    },
    ModeUpdate {
        current_mode: String,
    },
    ModelsCatalog {
        current_model: String,
        models: Value,
    },
    ModelUpdate {
        current_model: String,
    },
    AvailableCommandsUpdate {
        commands: Vec<Value>,
    },
    /// Forward compatibility: a content kind this crate doesn't model yet,
    /// preserved verbatim and handed to the UI without interpretation.
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_frame_serializes_with_id() {
        let frame = OutboundFrame::request(1, "session/prompt", serde_json::json!({}));
        let encoded = serde_json::to_string(&frame).unwrap();
        assert!(encoded.contains("\"id\":1"));
    }

    #[test]
    fn notification_frame_omits_id() {
        let frame = OutboundFrame::notification("session/cancel", Value::Null);
        let encoded = serde_json::to_string(&frame).unwrap();
        assert!(!encoded.contains("\"id\""));
    }

    #[test]
    fn permission_response_is_a_notification_carrying_the_correlated_id() {
        let frame = OutboundFrame::permission_response(7, true);
        assert!(frame.id.is_none());
        assert_eq!(frame.params["id"], serde_json::json!(7));
        assert_eq!(frame.params["approved"], serde_json::json!(true));
    }

    #[test]
    fn request_permission_parses_its_id() {
        let raw = r#"{"type":"request_permission","id":3,"options":[],"tool_call":{}}"#;
        let parsed: SessionUpdate = serde_json::from_str(raw).unwrap();
        assert!(matches!(parsed, SessionUpdate::RequestPermission { id: 3, .. }));
    }

    #[test]
    fn unknown_content_kind_round_trips_without_error() {
        let raw = r#"{"type":"some_future_kind","payload":"anything"}"#;
        let parsed: SessionUpdate = serde_json::from_str(raw).unwrap();
        assert!(matches!(parsed, SessionUpdate::Unknown));
    }
}
