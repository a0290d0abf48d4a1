//! Thin service over `Store` enforcing the task invariants of §4.E.
//!
//! Grounded on `at-core/src/types.rs`'s `can_transition_to` table (reused
//! here via `kagan_core::types::TaskStatus`) generalized from the teacher's
//! bead-lane domain to this spec's task lifecycle.

use kagan_core::store::{Store, StoreError};
use kagan_core::truncate::truncate;
use kagan_core::types::{AcceptanceCriteria, Task, TaskId, TaskStatus};
use serde_json::Value;
use tracing::{debug, warn};

const SCRATCHPAD_PREFIX: &str = "";

pub struct TaskService<'a> {
    store: &'a Store,
    scratchpad_cap_bytes: usize,
}

impl<'a> TaskService<'a> {
    pub fn new(store: &'a Store, scratchpad_cap_bytes: usize) -> Self {
        Self {
            store,
            scratchpad_cap_bytes,
        }
    }

    /// Apply a status transition, but only along a permitted edge. Any other
    /// request is a silent no-op — a stale client retrying an old command
    /// must not be able to corrupt state (§4.E).
    pub async fn set_status(&self, task: &Task, next: TaskStatus) -> Result<bool, StoreError> {
        if !task.status.can_transition_to(next) {
            debug!(task_id = %task.id, from = ?task.status, to = ?next, "ignored non-permitted transition");
            return Ok(false);
        }
        self.store.set_task_status(task.id, next).await?;
        Ok(true)
    }

    /// `sync_status_from_agent_complete`: only advances the task when the
    /// caller explicitly signals success. The reverse direction (failure
    /// pushing a task backwards) is never triggered automatically — a failed
    /// run just leaves the task `IN_PROGRESS` for the operator to inspect.
    pub async fn sync_status_from_agent_complete(
        &self,
        task: &Task,
        success: bool,
    ) -> Result<bool, StoreError> {
        if !success {
            return Ok(false);
        }
        self.set_status(task, TaskStatus::Review).await
    }

    /// Normalize acceptance-criteria input: a bare string becomes a
    /// one-element list, a list is preserved in order.
    pub fn normalize_acceptance_criteria(input: &Value) -> AcceptanceCriteria {
        match input {
            Value::String(s) => vec![s.clone()],
            Value::Array(items) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => {
                warn!("acceptance_criteria input was neither a string nor a list; ignoring");
                Vec::new()
            }
        }
    }

    /// Append to a task's scratchpad tail, applying the shared truncation
    /// rule before persisting so the tail never grows unbounded.
    pub fn apply_scratchpad_truncation(&self, existing: &str, addition: &str) -> String {
        let combined = format!("{existing}{addition}");
        truncate(SCRATCHPAD_PREFIX, &combined, self.scratchpad_cap_bytes)
    }

    /// Append `addition` to a task's persisted scratchpad, truncating the
    /// tail to `scratchpad_cap_bytes` (the review loop calls this to attach
    /// its approve/reject summary, §4.D.7).
    pub async fn append_scratchpad(&self, task_id: TaskId, addition: &str) -> Result<(), StoreError> {
        let existing = self.store.get_scratchpad(task_id).await?;
        let truncated = self.apply_scratchpad_truncation(&existing, addition);
        self.store.update_scratchpad(task_id, truncated).await
    }

    pub async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        self.store.get_task(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kagan_core::types::{Project, TaskType};

    async fn seeded_store() -> (Store, Task) {
        let store = Store::open_in_memory().await.unwrap();
        let project = Project::new("proj");
        store.upsert_project(&project).await.unwrap();
        let task = Task::new(project.id, "do the thing", TaskType::Auto);
        store.upsert_task(&task).await.unwrap();
        (store, task)
    }

    #[tokio::test]
    async fn permitted_transition_applies() {
        let (store, task) = seeded_store().await;
        let service = TaskService::new(&store, 1_000);
        let applied = service
            .set_status(&task, TaskStatus::InProgress)
            .await
            .unwrap();
        assert!(applied);
        let reloaded = service.get(task.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn non_permitted_transition_is_a_silent_no_op() {
        let (store, task) = seeded_store().await;
        let service = TaskService::new(&store, 1_000);
        let applied = service.set_status(&task, TaskStatus::Done).await.unwrap();
        assert!(!applied);
        let reloaded = service.get(task.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, TaskStatus::Backlog);
    }

    #[tokio::test]
    async fn agent_failure_never_advances_status() {
        let (store, mut task) = seeded_store().await;
        task.status = TaskStatus::InProgress;
        store.set_task_status(task.id, TaskStatus::InProgress).await.unwrap();
        let service = TaskService::new(&store, 1_000);
        let advanced = service.sync_status_from_agent_complete(&task, false).await.unwrap();
        assert!(!advanced);
    }

    #[test]
    fn acceptance_criteria_wraps_bare_string() {
        let wrapped = TaskService::normalize_acceptance_criteria(&Value::String("logs in".into()));
        assert_eq!(wrapped, vec!["logs in".to_string()]);
    }

    #[test]
    fn acceptance_criteria_preserves_list_order() {
        let list = serde_json::json!(["a", "b", "c"]);
        let normalized = TaskService::normalize_acceptance_criteria(&list);
        assert_eq!(normalized, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn scratchpad_truncation_keeps_newest_tail() {
        let (store, _task) = seeded_store().await;
        let service = TaskService::new(&store, 10);
        let result = service.apply_scratchpad_truncation("0123456", "789");
        assert!(result.len() <= 10);
        assert!(result.ends_with("789"));
    }

    #[tokio::test]
    async fn append_scratchpad_persists_and_truncates() {
        let (store, task) = seeded_store().await;
        let service = TaskService::new(&store, 1_000);
        service.append_scratchpad(task.id, "first note").await.unwrap();
        service.append_scratchpad(task.id, " second note").await.unwrap();

        let reloaded = service.get(task.id).await.unwrap().unwrap();
        assert_eq!(reloaded.scratchpad, "first note second note");
    }
}
