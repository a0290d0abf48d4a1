//! Manual review approval flow (§4.D.7).
//!
//! Grounded line-for-line on `kagan/core/services/reviews.py`'s
//! `ReviewServiceImpl`: the execution-log note format
//! (`{"messages": [{"type": "response", "content": ...}]}`) and the
//! scratchpad review header are reproduced exactly, since downstream
//! tooling parses the log for that shape.

use chrono::Utc;
use kagan_core::store::{Store, StoreError};
use kagan_core::types::{ExecutionId, TaskId, TaskStatus};
use serde_json::json;

use crate::task_service::TaskService;

pub struct ReviewService<'a> {
    tasks: TaskService<'a>,
    store: &'a Store,
}

impl<'a> ReviewService<'a> {
    pub fn new(store: &'a Store, scratchpad_cap_bytes: usize) -> Self {
        Self {
            tasks: TaskService::new(store, scratchpad_cap_bytes),
            store,
        }
    }

    /// Move a task into `REVIEW` and record a "review requested" note on its
    /// execution log. A non-permitted transition (task already past review)
    /// leaves the status untouched but the note is still appended, matching
    /// the Python implementation's unconditional `set_status` + log call.
    pub async fn start_review(&self, task_id: TaskId, execution_id: ExecutionId) -> Result<(), StoreError> {
        if let Some(task) = self.tasks.get(task_id).await? {
            self.tasks.set_status(&task, TaskStatus::Review).await?;
        }
        let note = format!("Review requested for task {task_id}.");
        self.store.append_execution_log(execution_id, serialize_note(&note)).await
    }

    /// Record an approve/reject decision: log a note, attach a
    /// `review_result` entry to the execution's metadata, and — if a summary
    /// was given — append a review header and the summary to the task's
    /// scratchpad.
    pub async fn record_review_response(
        &self,
        task_id: TaskId,
        execution_id: ExecutionId,
        approved: bool,
        summary: &str,
    ) -> Result<(), StoreError> {
        let status_label = if approved { "approved" } else { "rejected" };
        let note = if summary.is_empty() {
            format!("Review {status_label}.")
        } else {
            format!("Review {status_label}: {summary}")
        };
        self.store.append_execution_log(execution_id, serialize_note(&note)).await?;

        let mut updates = serde_json::Map::new();
        updates.insert(
            "review_result".to_string(),
            json!({
                "approved": approved,
                "summary": summary,
                "completed_at": Utc::now().to_rfc3339(),
            }),
        );
        self.store.merge_execution_metadata(execution_id, updates).await?;

        if !summary.is_empty() {
            let header = format!("\n\n--- REVIEW ({}) ---\n", status_label.to_uppercase());
            self.tasks.append_scratchpad(task_id, &format!("{header}{summary}")).await?;
        }
        Ok(())
    }
}

fn serialize_note(note: &str) -> String {
    json!({
        "messages": [{ "type": "response", "content": note }]
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kagan_core::types::{Execution, Project, Task, TaskType, Workspace};

    async fn seeded() -> (Store, Task, Execution) {
        let store = Store::open_in_memory().await.unwrap();
        let project = Project::new("proj");
        store.upsert_project(&project).await.unwrap();
        let mut task = Task::new(project.id, "t", TaskType::Auto);
        task.status = TaskStatus::InProgress;
        store.upsert_task(&task).await.unwrap();
        let workspace = Workspace::new(task.id, Vec::new());
        store.insert_workspace(&workspace).await.unwrap();
        let execution = Execution::new(task.id, workspace.id, 1);
        store.insert_execution(&execution).await.unwrap();
        (store, task, execution)
    }

    #[tokio::test]
    async fn start_review_transitions_and_logs_note() {
        let (store, task, execution) = seeded().await;
        let service = ReviewService::new(&store, 1_000);
        service.start_review(task.id, execution.id).await.unwrap();

        let reloaded = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, TaskStatus::Review);

        let fetched = store.get_execution(execution.id).await.unwrap().unwrap();
        assert_eq!(fetched.log.len(), 1);
        assert!(fetched.log[0].contains("Review requested for task"));
        assert!(fetched.log[0].contains("\"type\":\"response\""));
    }

    #[tokio::test]
    async fn record_review_response_with_summary_updates_metadata_and_scratchpad() {
        let (store, task, execution) = seeded().await;
        let service = ReviewService::new(&store, 1_000);
        service
            .record_review_response(task.id, execution.id, true, "looks good")
            .await
            .unwrap();

        let fetched = store.get_execution(execution.id).await.unwrap().unwrap();
        assert_eq!(fetched.log.len(), 1);
        assert!(fetched.log[0].contains("Review approved: looks good"));

        let review_result = fetched.metadata.get("review_result").unwrap();
        assert_eq!(review_result["approved"], json!(true));
        assert_eq!(review_result["summary"], json!("looks good"));

        let scratchpad = store.get_scratchpad(task.id).await.unwrap();
        assert!(scratchpad.contains("--- REVIEW (APPROVED) ---"));
        assert!(scratchpad.contains("looks good"));
    }

    #[tokio::test]
    async fn record_review_response_without_summary_skips_scratchpad() {
        let (store, task, execution) = seeded().await;
        let service = ReviewService::new(&store, 1_000);
        service.record_review_response(task.id, execution.id, false, "").await.unwrap();

        let fetched = store.get_execution(execution.id).await.unwrap().unwrap();
        assert!(fetched.log[0].contains("Review rejected."));
        assert_eq!(store.get_scratchpad(task.id).await.unwrap(), "");
    }
}
