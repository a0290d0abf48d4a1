use serde::{Deserialize, Serialize};

/// Operator-tunable knobs the core needs to start and run (§2.A). General
/// config-file loading/parsing is out of scope; this struct is what such a
/// file would eventually populate, plus its environment-variable overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default = "default_max_concurrent_agents")]
    pub max_concurrent_agents: usize,
    #[serde(default = "default_max_runs_per_task")]
    pub max_runs_per_task: u32,
    #[serde(default)]
    pub planner_auto_approve: bool,
    #[serde(default = "default_true")]
    pub auto_review_enabled: bool,
    #[serde(default = "default_scratchpad_cap_bytes")]
    pub scratchpad_cap_bytes: usize,
    #[serde(default = "default_review_diff_cap_bytes")]
    pub review_diff_cap_bytes: usize,
    #[serde(default = "default_review_followup_cap_bytes")]
    pub review_followup_cap_bytes: usize,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_concurrent_agents: default_max_concurrent_agents(),
            max_runs_per_task: default_max_runs_per_task(),
            planner_auto_approve: false,
            auto_review_enabled: default_true(),
            scratchpad_cap_bytes: default_scratchpad_cap_bytes(),
            review_diff_cap_bytes: default_review_diff_cap_bytes(),
            review_followup_cap_bytes: default_review_followup_cap_bytes(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

fn default_max_concurrent_agents() -> usize {
    4
}
fn default_max_runs_per_task() -> u32 {
    10
}
fn default_true() -> bool {
    true
}
fn default_scratchpad_cap_bytes() -> usize {
    crate::limits::SCRATCHPAD_LIMIT
}
fn default_review_diff_cap_bytes() -> usize {
    20_000
}
fn default_review_followup_cap_bytes() -> usize {
    4_000
}
fn default_heartbeat_interval_secs() -> u64 {
    10
}
fn default_stale_after_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let cfg = CoreConfig::default();
        assert!(cfg.max_concurrent_agents > 0);
        assert!(cfg.review_followup_cap_bytes < cfg.review_diff_cap_bytes);
    }
}
