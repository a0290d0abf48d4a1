//! Startup reconciliation and active-context bookkeeping for the `runtime.*`
//! operation family (§4.G).
//!
//! Grounded on `ReviewService`/`TaskService`'s thin-service-over-`Store`
//! shape; the orphaned-execution sweep is this spec's answer to
//! `original_source/src/kagan/core/services/runtime_context.py`'s startup
//! hook, since an agent session never survives a daemon restart (§4.A, §7).

use kagan_core::store::{Store, StoreError};
use kagan_core::types::{ExecutionStatus, RuntimeContext, Task, TaskStatus};
use tracing::info;

pub struct RuntimeService<'a> {
    store: &'a Store,
}

impl<'a> RuntimeService<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Sweep every `IN_PROGRESS` task's executions for one stuck `RUNNING`,
    /// marking it `FAILED` with an explanatory log note. Called once at boot
    /// — a `RUNNING` execution found here belonged to the previous process,
    /// whose child agent died along with it.
    pub async fn reconcile_running(&self) -> Result<u32, StoreError> {
        let mut reconciled = 0;
        let in_progress = self.store.list_tasks_by_status(TaskStatus::InProgress).await?;
        for task in in_progress {
            for execution in self.store.list_executions_for_task(task.id).await? {
                if execution.status == ExecutionStatus::Running {
                    self.store.set_execution_status(execution.id, ExecutionStatus::Failed, None).await?;
                    self.store
                        .append_execution_log(
                            execution.id,
                            "orphaned at startup: no agent process survives a daemon restart".to_string(),
                        )
                        .await?;
                    reconciled += 1;
                }
            }
        }
        if reconciled > 0 {
            info!(count = reconciled, "reconciled orphaned in-flight executions at startup");
        }
        Ok(reconciled)
    }

    /// Startup entrypoint (`runtime.decide_startup`): reconcile first, then
    /// hand back the runtime context the caller should resume into.
    pub async fn decide_startup(&self) -> Result<RuntimeContext, StoreError> {
        self.reconcile_running().await?;
        self.store.get_runtime_context().await
    }

    /// `runtime.set_last_active_context`: record the label the UI last
    /// focused without disturbing `active_project_id`/`active_repo_id`.
    pub async fn set_last_active_context(&self, label: impl Into<String>) -> Result<RuntimeContext, StoreError> {
        let mut context = self.store.get_runtime_context().await?;
        context.last_active_context = Some(label.into());
        self.store.set_runtime_context(&context).await?;
        Ok(context)
    }

    /// `runtime.get_runtime_task`: the oldest `IN_PROGRESS` task belonging to
    /// the active project, or `None` when no project is active or none of
    /// its tasks are in flight.
    pub async fn get_runtime_task(&self) -> Result<Option<Task>, StoreError> {
        let context = self.store.get_runtime_context().await?;
        let Some(project_id) = context.active_project_id else {
            return Ok(None);
        };
        let tasks = self.store.list_tasks_by_project(project_id).await?;
        Ok(tasks.into_iter().find(|t| t.status == TaskStatus::InProgress))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kagan_core::types::{Execution, Project, TaskType, Workspace};

    async fn seeded() -> (Store, Task) {
        let store = Store::open_in_memory().await.unwrap();
        let project = Project::new("proj");
        store.upsert_project(&project).await.unwrap();
        let mut task = Task::new(project.id, "t", TaskType::Auto);
        task.status = TaskStatus::InProgress;
        store.upsert_task(&task).await.unwrap();
        (store, task)
    }

    #[tokio::test]
    async fn reconcile_marks_stuck_running_executions_failed() {
        let (store, task) = seeded().await;
        let workspace = Workspace::new(task.id, Vec::new());
        store.insert_workspace(&workspace).await.unwrap();
        let execution = Execution::new(task.id, workspace.id, 1);
        store.insert_execution(&execution).await.unwrap();
        store.set_execution_status(execution.id, ExecutionStatus::Running, None).await.unwrap();

        let service = RuntimeService::new(&store);
        let count = service.reconcile_running().await.unwrap();
        assert_eq!(count, 1);

        let reloaded = store.get_execution(execution.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, ExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn reconcile_leaves_completed_executions_untouched() {
        let (store, task) = seeded().await;
        let workspace = Workspace::new(task.id, Vec::new());
        store.insert_workspace(&workspace).await.unwrap();
        let execution = Execution::new(task.id, workspace.id, 1);
        store.insert_execution(&execution).await.unwrap();
        store.set_execution_status(execution.id, ExecutionStatus::Succeeded, Some(0)).await.unwrap();

        let service = RuntimeService::new(&store);
        assert_eq!(service.reconcile_running().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn get_runtime_task_finds_in_progress_task_for_active_project() {
        let (store, task) = seeded().await;
        store
            .set_runtime_context(&RuntimeContext {
                active_project_id: Some(task.project_id),
                active_repo_id: None,
                last_active_context: None,
            })
            .await
            .unwrap();

        let service = RuntimeService::new(&store);
        let found = service.get_runtime_task().await.unwrap().unwrap();
        assert_eq!(found.id, task.id);
    }

    #[tokio::test]
    async fn get_runtime_task_is_none_without_an_active_project() {
        let (store, _task) = seeded().await;
        let service = RuntimeService::new(&store);
        assert!(service.get_runtime_task().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_last_active_context_preserves_active_project() {
        let (store, task) = seeded().await;
        store
            .set_runtime_context(&RuntimeContext {
                active_project_id: Some(task.project_id),
                active_repo_id: None,
                last_active_context: None,
            })
            .await
            .unwrap();

        let service = RuntimeService::new(&store);
        let updated = service.set_last_active_context("backend").await.unwrap();
        assert_eq!(updated.active_project_id, Some(task.project_id));
        assert_eq!(updated.last_active_context.as_deref(), Some("backend"));
    }
}
