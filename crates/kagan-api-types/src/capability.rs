use serde::{Deserialize, Serialize};

/// Authorization tier gating API methods, bound to an IPC connection at
/// accept time and carried by the request-context for the life of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CapabilityProfile {
    /// Read-only: task board, logs, audit history.
    Viewer,
    /// A human paired with a PAIR task's workspace; can act on that task.
    PairWorker,
    /// Full mutation rights over the project (task/workspace/execution lifecycle).
    Maintainer,
    /// The planner entrypoint: unscoped, read-only, outside any single task.
    Planner,
}

impl CapabilityProfile {
    /// Whether `self` satisfies a method's minimum-profile floor.
    ///
    /// Profiles are not a strict hierarchy in this domain (`Planner` is not a
    /// superset of `Maintainer`), so satisfaction is table-driven rather than
    /// an ordinal comparison.
    pub fn satisfies(self, floor: CapabilityProfile) -> bool {
        use CapabilityProfile::*;
        match floor {
            Viewer => matches!(self, Viewer | PairWorker | Maintainer | Planner),
            PairWorker => matches!(self, PairWorker | Maintainer | Planner),
            Maintainer => matches!(self, Maintainer | Planner),
            Planner => matches!(self, Planner),
        }
    }
}

/// Scope an agent session was launched under; drives permission-prompt policy
/// (`kagan_agents::permission_policy`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentPermissionScope {
    Planner,
    AutomationRunner,
    AutomationReviewer,
    PromptRefiner,
}
