//! Core data model (§3). Enums carry their own transition tables the same
//! way the teacher's `BeadStatus`/`TaskPhase` do, so illegal transitions are
//! a compile-time-checked match rather than scattered `if` chains.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ProjectId = Uuid;
pub type RepoId = Uuid;
pub type TaskId = Uuid;
pub type WorkspaceId = Uuid;
pub type ExecutionId = Uuid;
pub type SessionRecordId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Backlog,
    InProgress,
    Review,
    Done,
}

impl TaskStatus {
    /// The permitted-edge table of §4.5 / §8.1. Anything not listed here is
    /// a no-op, not an error: stale clients cannot corrupt state.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Backlog, InProgress)
                | (InProgress, Review)
                | (InProgress, Backlog)
                | (Review, Done)
                | (Review, InProgress)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    Auto,
    Pair,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkspaceStatus {
    Active,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionType {
    Tmux,
    Acp,
    Script,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Active,
    Closed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

/// Classification of an execution-log entry; supplemented from §2.B, used
/// by the Scheduler and Store to avoid ad hoc log "kind" strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentTurnKind {
    Prompt,
    Response,
    Summary,
    Log,
    Event,
}

/// Merge-risk classification surfaced to review consumers; supplemented
/// from §2.B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeReadiness {
    Ready,
    Risk,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repo {
    pub id: RepoId,
    pub project_id: ProjectId,
    pub path: String,
    pub display_name: String,
    pub default_branch: Option<String>,
    pub display_order: i64,
    #[serde(default)]
    pub scripts: std::collections::BTreeMap<String, String>,
}

impl Repo {
    pub fn new(project_id: ProjectId, path: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            path: path.into(),
            display_name: display_name.into(),
            default_branch: None,
            display_order: 0,
            scripts: Default::default(),
        }
    }

    pub fn is_primary(&self) -> bool {
        self.display_order == 0
    }
}

/// Acceptance-criteria input may arrive as a single string or a list; the
/// Task Service normalizes either into this ordered sequence (§4.E).
pub type AcceptanceCriteria = Vec<String>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub project_id: ProjectId,
    pub parent_id: Option<TaskId>,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub task_type: TaskType,
    pub agent_backend: Option<String>,
    pub base_branch: Option<String>,
    pub acceptance_criteria: AcceptanceCriteria,
    pub terminal_backend: Option<String>,
    /// Per-task mutable note (§3 Scratchpad), newest-tail truncated at
    /// `SCRATCHPAD_LIMIT` bytes by `TaskService` before it is persisted.
    #[serde(default)]
    pub scratchpad: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(project_id: ProjectId, title: impl Into<String>, task_type: TaskType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id,
            parent_id: None,
            title: title.into(),
            description: String::new(),
            status: TaskStatus::Backlog,
            priority: TaskPriority::Medium,
            task_type,
            agent_backend: None,
            base_branch: None,
            acceptance_criteria: Vec::new(),
            terminal_backend: None,
            scratchpad: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceRepoEntry {
    pub repo_id: RepoId,
    pub worktree_path: String,
    pub branch_name: String,
    pub target_branch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub task_id: TaskId,
    pub status: WorkspaceStatus,
    pub repos: Vec<WorkspaceRepoEntry>,
}

impl Workspace {
    pub fn new(task_id: TaskId, repos: Vec<WorkspaceRepoEntry>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            status: WorkspaceStatus::Active,
            repos,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub task_id: TaskId,
    pub workspace_id: WorkspaceId,
    pub status: ExecutionStatus,
    pub exit_code: Option<i32>,
    pub run_index: u32,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub log: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Execution {
    pub fn new(task_id: TaskId, workspace_id: WorkspaceId, run_index: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            workspace_id,
            status: ExecutionStatus::Pending,
            exit_code: None,
            run_index,
            metadata: Default::default(),
            log: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn append_log(&mut self, entry: impl Into<String>) {
        self.log.push(entry.into());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionRecordId,
    pub workspace_id: WorkspaceId,
    pub session_type: SessionType,
    pub status: SessionStatus,
    pub external_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn new(workspace_id: WorkspaceId, session_type: SessionType) -> Self {
        Self {
            id: Uuid::new_v4(),
            workspace_id,
            session_type,
            status: SessionStatus::Active,
            external_id: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub request_id: String,
    pub session_id: String,
    pub capability: String,
    pub method: String,
    pub params_digest: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeContext {
    pub active_project_id: Option<ProjectId>,
    pub active_repo_id: Option<RepoId>,
    pub last_active_context: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_follow_permitted_edges_only() {
        assert!(TaskStatus::Backlog.can_transition_to(TaskStatus::InProgress));
        assert!(TaskStatus::InProgress.can_transition_to(TaskStatus::Review));
        assert!(TaskStatus::Review.can_transition_to(TaskStatus::Done));
        assert!(TaskStatus::Review.can_transition_to(TaskStatus::InProgress));
        assert!(!TaskStatus::Backlog.can_transition_to(TaskStatus::Done));
        assert!(!TaskStatus::Done.can_transition_to(TaskStatus::Backlog));
        assert!(!TaskStatus::Review.can_transition_to(TaskStatus::Backlog));
    }

    #[test]
    fn primary_repo_is_display_order_zero() {
        let repo = Repo::new(Uuid::new_v4(), "/repo", "repo");
        assert!(repo.is_primary());
    }

    #[test]
    fn execution_run_index_is_caller_assigned_and_monotonic_by_convention() {
        let task = Uuid::new_v4();
        let ws = Uuid::new_v4();
        let e1 = Execution::new(task, ws, 1);
        let e2 = Execution::new(task, ws, 2);
        assert_eq!(e1.run_index, 1);
        assert_eq!(e2.run_index, 2);
    }
}
