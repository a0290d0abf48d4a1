//! Centralized policy for agent permission-prompt and MCP-capability
//! resolution (§4.C.3). Ported near-verbatim from
//! `original_source/src/kagan/core/services/permission_policy.py` — these are
//! pure functions on purpose, kept free of `Session`/`Store` so they stay
//! trivially testable.

use kagan_api_types::{AgentPermissionScope, CapabilityProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionDecisionReason {
    AutoApproveEnabled,
    NoMessageTarget,
    WaitForUser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionDecision {
    pub auto_approve: bool,
    pub reason: PermissionDecisionReason,
}

/// Whether `scope` should auto-approve ACP permission requests. Only the
/// planner scope is conditional on the caller's `planner_auto_approve`
/// setting; every automation scope always auto-approves.
pub fn resolve_auto_approve(scope: AgentPermissionScope, planner_auto_approve: bool) -> bool {
    match scope {
        AgentPermissionScope::Planner => planner_auto_approve,
        _ => true,
    }
}

/// Resolve permission-prompt behavior for the current runtime context. A
/// session with nowhere to forward an interactive prompt (no message target)
/// must not block on one, so it auto-approves regardless of the scope's own
/// setting.
pub fn resolve_permission_decision(
    auto_approve_enabled: bool,
    has_message_target: bool,
) -> PermissionDecision {
    if auto_approve_enabled {
        return PermissionDecision {
            auto_approve: true,
            reason: PermissionDecisionReason::AutoApproveEnabled,
        };
    }
    if !has_message_target {
        return PermissionDecision {
            auto_approve: true,
            reason: PermissionDecisionReason::NoMessageTarget,
        };
    }
    PermissionDecision {
        auto_approve: false,
        reason: PermissionDecisionReason::WaitForUser,
    }
}

/// Resolve the MCP capability profile for an ACP-backed agent session.
///
/// - The planner entrypoint (read-only, unscoped) gets `Planner`.
/// - Task-scoped read-only sessions remain `Viewer`.
/// - Task-scoped writable sessions get `PairWorker`.
/// - All other unscoped sessions default to `Viewer`.
pub fn resolve_mcp_capability(task_id: &str, read_only: bool) -> CapabilityProfile {
    let normalized = task_id.trim();
    if read_only && normalized.is_empty() {
        return CapabilityProfile::Planner;
    }
    if read_only {
        return CapabilityProfile::Viewer;
    }
    if !normalized.is_empty() {
        return CapabilityProfile::PairWorker;
    }
    CapabilityProfile::Viewer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_planner_scopes_always_auto_approve() {
        assert!(resolve_auto_approve(AgentPermissionScope::AutomationRunner, false));
        assert!(resolve_auto_approve(AgentPermissionScope::AutomationReviewer, false));
        assert!(resolve_auto_approve(AgentPermissionScope::PromptRefiner, false));
    }

    #[test]
    fn planner_scope_follows_setting() {
        assert!(resolve_auto_approve(AgentPermissionScope::Planner, true));
        assert!(!resolve_auto_approve(AgentPermissionScope::Planner, false));
    }

    #[test]
    fn no_message_target_forces_auto_approve() {
        let decision = resolve_permission_decision(false, false);
        assert!(decision.auto_approve);
        assert_eq!(decision.reason, PermissionDecisionReason::NoMessageTarget);
    }

    #[test]
    fn with_message_target_and_no_auto_approve_waits_for_user() {
        let decision = resolve_permission_decision(false, true);
        assert!(!decision.auto_approve);
        assert_eq!(decision.reason, PermissionDecisionReason::WaitForUser);
    }

    #[test]
    fn auto_approve_enabled_wins_regardless_of_message_target() {
        let decision = resolve_permission_decision(true, true);
        assert!(decision.auto_approve);
        assert_eq!(decision.reason, PermissionDecisionReason::AutoApproveEnabled);
    }

    #[test]
    fn mcp_capability_resolution_matrix() {
        assert_eq!(resolve_mcp_capability("", true), CapabilityProfile::Planner);
        assert_eq!(resolve_mcp_capability("  ", true), CapabilityProfile::Planner);
        assert_eq!(resolve_mcp_capability("task-1", true), CapabilityProfile::Viewer);
        assert_eq!(resolve_mcp_capability("task-1", false), CapabilityProfile::PairWorker);
        assert_eq!(resolve_mcp_capability("", false), CapabilityProfile::Viewer);
    }
}
