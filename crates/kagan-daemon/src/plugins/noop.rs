//! `example.noop` — validates plugin scaffold wiring only (§4.H).
//!
//! Grounded on `original_source/src/kagan/core/plugins/examples/noop.py`:
//! one read-only `plugins.noop_ping` operation that echoes a param back, and
//! a policy hook denying the call when `params.disabled == true`.

use kagan_api_types::{ApiError, CapabilityProfile};
use serde_json::{json, Value};

use super::{PluginOperation, PluginPolicyContext, PluginPolicyDecision, PluginRegistry};

const PLUGIN_ID: &str = "example.noop";

pub fn register(registry: &mut PluginRegistry) {
    registry.register_operation(PluginOperation {
        plugin_id: PLUGIN_ID,
        capability: "plugins",
        method: "noop_ping",
        handler: noop_ping,
        minimum_profile: CapabilityProfile::Maintainer,
        mutating: false,
        description: "No-op operation for plugin wiring validation.",
    });
    registry.register_policy_hook(PLUGIN_ID, "plugins", "noop_ping", policy_hook);
}

fn noop_ping(params: &Value) -> Result<Value, ApiError> {
    Ok(json!({
        "success": true,
        "plugin_id": PLUGIN_ID,
        "echo": params.get("echo").cloned().unwrap_or(Value::Null),
    }))
}

fn policy_hook(context: &PluginPolicyContext) -> Option<PluginPolicyDecision> {
    if context.params.get("disabled").and_then(Value::as_bool) == Some(true) {
        return Some(PluginPolicyDecision {
            allowed: false,
            code: "PLUGIN_POLICY_DENIED",
            message: format!("Plugin '{}' denied request because disabled=true", context.plugin_id),
        });
    }
    None
}
