//! In-process plugin registry (§4.H).
//!
//! Grounded on `original_source/src/kagan/core/plugins/sdk.py` and
//! `.../plugins/github/plugin.py`: no code loading or filesystem scanning,
//! registration happens once at startup from statically linked plugins, and
//! a capability/method pair resolves to at most one operation.

pub mod noop;

use std::collections::HashMap;

use kagan_api_types::{ApiError, CapabilityProfile, ErrorCode};
use serde_json::Value;

pub type PluginHandler = fn(&Value) -> Result<Value, ApiError>;
pub type PolicyHook = fn(&PluginPolicyContext) -> Option<PluginPolicyDecision>;

#[derive(Debug, Clone)]
pub struct PluginManifest {
    pub id: &'static str,
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
}

#[derive(Clone)]
pub struct PluginOperation {
    pub plugin_id: &'static str,
    pub capability: &'static str,
    pub method: &'static str,
    pub handler: PluginHandler,
    pub minimum_profile: CapabilityProfile,
    pub mutating: bool,
    pub description: &'static str,
}

/// Params a policy hook evaluates before the handler runs.
pub struct PluginPolicyContext<'a> {
    pub plugin_id: &'static str,
    pub capability: &'static str,
    pub method: &'static str,
    pub params: &'a Value,
}

#[derive(Debug, Clone)]
pub struct PluginPolicyDecision {
    pub allowed: bool,
    pub code: &'static str,
    pub message: String,
}

struct RegisteredHook {
    plugin_id: &'static str,
    capability: &'static str,
    method: &'static str,
    hook: PolicyHook,
}

#[derive(Default)]
pub struct PluginRegistry {
    operations: HashMap<(&'static str, &'static str), PluginOperation>,
    hooks: Vec<RegisteredHook>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bundled registry: `example.noop` validates scaffold wiring (§4.H).
    /// Additional statically linked plugins are registered here as they are
    /// written; there is no dynamic discovery.
    pub fn bootstrap() -> Self {
        let mut registry = Self::new();
        noop::register(&mut registry);
        registry
    }

    pub fn register_operation(&mut self, op: PluginOperation) {
        self.operations.insert((op.capability, op.method), op);
    }

    pub fn register_policy_hook(
        &mut self,
        plugin_id: &'static str,
        capability: &'static str,
        method: &'static str,
        hook: PolicyHook,
    ) {
        self.hooks.push(RegisteredHook {
            plugin_id,
            capability,
            method,
            hook,
        });
    }

    pub fn resolve_operation(&self, capability: &str, method: &str) -> Option<&PluginOperation> {
        self.operations.get(&(capability, method)).or_else(|| {
            self.operations
                .iter()
                .find(|((c, m), _)| *c == capability && *m == method)
                .map(|(_, op)| op)
        })
    }

    /// Dispatch `capability.method` (§4.H): authorize, run policy hooks in
    /// registration order, then invoke the handler. A hook short-circuits on
    /// the first denial it returns.
    pub fn dispatch(
        &self,
        capability: &str,
        method: &str,
        params: &Value,
        caller: CapabilityProfile,
    ) -> Result<Value, ApiError> {
        let op = self.resolve_operation(capability, method).ok_or_else(|| {
            ApiError::new(
                ErrorCode::UnknownMethod,
                format!("no plugin operation registered for {capability}.{method}"),
            )
        })?;

        if !caller.satisfies(op.minimum_profile) {
            return Err(ApiError::new(
                ErrorCode::AuthorizationDenied,
                format!("{capability}.{method} requires at least {:?}", op.minimum_profile),
            ));
        }

        for hook in self
            .hooks
            .iter()
            .filter(|h| h.plugin_id == op.plugin_id && h.capability == capability && h.method == method)
        {
            let context = PluginPolicyContext {
                plugin_id: op.plugin_id,
                capability,
                method,
                params,
            };
            if let Some(decision) = (hook.hook)(&context) {
                if !decision.allowed {
                    return Err(ApiError::new(ErrorCode::PluginPolicyDenied, decision.message));
                }
            }
        }

        let result = (op.handler)(params)?;
        if !result.is_object() {
            return Err(ApiError::new(
                ErrorCode::PluginPayloadInvalid,
                format!("plugin operation {capability}.{method} returned a non-object payload"),
            ));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_operation_is_unknown_method() {
        let registry = PluginRegistry::new();
        let err = registry
            .dispatch("plugins", "noop_ping", &Value::Null, CapabilityProfile::Maintainer)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownMethod);
    }

    #[test]
    fn bootstrap_registers_noop_plugin() {
        let registry = PluginRegistry::bootstrap();
        assert!(registry.resolve_operation("plugins", "noop_ping").is_some());
    }
}
