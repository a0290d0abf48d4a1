use rusqlite::Row;

use crate::types::{ProjectId, Task, TaskId, TaskStatus};

use super::{enum_from_sql, enum_to_sql, Store, StoreError};

struct TaskRow {
    task: Task,
    status: String,
    priority: String,
    task_type: String,
    acceptance_criteria: String,
}

// Column order fixed by TASK_COLUMNS below: id, project_id, parent_id, title,
// description, status, priority, task_type, agent_backend, base_branch,
// acceptance_criteria, terminal_backend, scratchpad, created_at, updated_at.
fn row_to_task(row: &Row) -> rusqlite::Result<TaskRow> {
    let id: String = row.get(0)?;
    let project_id: String = row.get(1)?;
    let parent_id: Option<String> = row.get(2)?;
    let status: String = row.get(5)?;
    let priority: String = row.get(6)?;
    let task_type: String = row.get(7)?;
    let acceptance_criteria: String = row.get(10)?;
    let created_at: String = row.get(13)?;
    let updated_at: String = row.get(14)?;

    Ok(TaskRow {
        task: Task {
            id: uuid::Uuid::parse_str(&id).unwrap_or_default(),
            project_id: uuid::Uuid::parse_str(&project_id).unwrap_or_default(),
            parent_id: parent_id.as_deref().and_then(|s| uuid::Uuid::parse_str(s).ok()),
            title: row.get(3)?,
            description: row.get(4)?,
            status: TaskStatus::Backlog,
            priority: crate::types::TaskPriority::Medium,
            task_type: crate::types::TaskType::Auto,
            agent_backend: row.get(8)?,
            base_branch: row.get(9)?,
            acceptance_criteria: Vec::new(),
            terminal_backend: row.get(11)?,
            scratchpad: row.get(12)?,
            created_at: created_at.parse().unwrap_or_else(|_| chrono::Utc::now()),
            updated_at: updated_at.parse().unwrap_or_else(|_| chrono::Utc::now()),
        },
        status,
        priority,
        task_type,
        acceptance_criteria,
    })
}

fn finish_task(row: TaskRow) -> Result<Task, StoreError> {
    let mut task = row.task;
    task.status = enum_from_sql(&row.status)?;
    task.priority = enum_from_sql(&row.priority)?;
    task.task_type = enum_from_sql(&row.task_type)?;
    task.acceptance_criteria = serde_json::from_str(&row.acceptance_criteria)?;
    Ok(task)
}

const TASK_COLUMNS: &str = "id, project_id, parent_id, title, description, status, priority,
                             task_type, agent_backend, base_branch, acceptance_criteria,
                             terminal_backend, scratchpad, created_at, updated_at";

impl Store {
    pub async fn upsert_task(&self, task: &Task) -> Result<(), StoreError> {
        self.ensure_open()?;
        let task = task.clone();
        let status = enum_to_sql(&task.status);
        let priority = enum_to_sql(&task.priority);
        let task_type = enum_to_sql(&task.task_type);
        let acceptance_criteria = serde_json::to_string(&task.acceptance_criteria)?;

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO tasks (id, project_id, parent_id, title, description, status,
                        priority, task_type, agent_backend, base_branch, acceptance_criteria,
                        terminal_backend, scratchpad, created_at, updated_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)
                     ON CONFLICT(id) DO UPDATE SET
                        title=excluded.title, description=excluded.description,
                        status=excluded.status, priority=excluded.priority,
                        task_type=excluded.task_type, agent_backend=excluded.agent_backend,
                        base_branch=excluded.base_branch,
                        acceptance_criteria=excluded.acceptance_criteria,
                        terminal_backend=excluded.terminal_backend,
                        scratchpad=excluded.scratchpad, updated_at=excluded.updated_at",
                    rusqlite::params![
                        task.id.to_string(),
                        task.project_id.to_string(),
                        task.parent_id.map(|p| p.to_string()),
                        task.title,
                        task.description,
                        status,
                        priority,
                        task_type,
                        task.agent_backend,
                        task.base_branch,
                        acceptance_criteria,
                        task.terminal_backend,
                        task.scratchpad,
                        task.created_at.to_rfc3339(),
                        task.updated_at.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get_task(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        self.ensure_open()?;
        let id_str = id.to_string();
        let row = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"))?;
                let mut rows = stmt.query(rusqlite::params![id_str])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row_to_task(row)?)),
                    None => Ok(None),
                }
            })
            .await?;
        row.map(finish_task).transpose()
    }

    pub async fn list_tasks_by_project(&self, project_id: ProjectId) -> Result<Vec<Task>, StoreError> {
        self.ensure_open()?;
        let project_id_str = project_id.to_string();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE project_id = ?1 ORDER BY created_at ASC"
                ))?;
                let mut rows = stmt.query(rusqlite::params![project_id_str])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_task(row)?);
                }
                Ok(out)
            })
            .await?;

        rows.into_iter().map(finish_task).collect()
    }

    pub async fn list_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, StoreError> {
        self.ensure_open()?;
        let status_str = enum_to_sql(&status);
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE status = ?1 ORDER BY priority DESC, created_at ASC"
                ))?;
                let mut rows = stmt.query(rusqlite::params![status_str])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_task(row)?);
                }
                Ok(out)
            })
            .await?;

        rows.into_iter().map(finish_task).collect()
    }

    /// Persist a status change without checking `can_transition_to` — that
    /// invariant belongs to the service layer, which knows the caller's
    /// intent (§4.E); the store is a dumb persistence layer.
    pub async fn set_task_status(&self, id: TaskId, status: TaskStatus) -> Result<(), StoreError> {
        self.ensure_open()?;
        let id_str = id.to_string();
        let status_str = enum_to_sql(&status);
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
                    rusqlite::params![status_str, now, id_str],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Fetch a task's scratchpad text directly, without loading the rest of
    /// the row (the review loop reads this on every approve/reject, §4.D.7).
    pub async fn get_scratchpad(&self, id: TaskId) -> Result<String, StoreError> {
        self.ensure_open()?;
        let id_str = id.to_string();
        let scratchpad = self
            .conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT scratchpad FROM tasks WHERE id = ?1",
                    rusqlite::params![id_str],
                    |row| row.get(0),
                )
            })
            .await?;
        Ok(scratchpad)
    }

    /// Overwrite a task's scratchpad with an already-truncated value (callers
    /// apply `TaskService::apply_scratchpad_truncation` before persisting).
    pub async fn update_scratchpad(&self, id: TaskId, scratchpad: impl Into<String>) -> Result<(), StoreError> {
        self.ensure_open()?;
        let id_str = id.to_string();
        let scratchpad = scratchpad.into();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE tasks SET scratchpad = ?1 WHERE id = ?2",
                    rusqlite::params![scratchpad, id_str],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Project, TaskType};

    async fn store_with_project() -> (Store, ProjectId) {
        let store = Store::open_in_memory().await.unwrap();
        let project = Project::new("proj");
        store.upsert_project(&project).await.unwrap();
        (store, project.id)
    }

    #[tokio::test]
    async fn upsert_then_get_roundtrips() {
        let (store, project_id) = store_with_project().await;
        let mut task = Task::new(project_id, "Fix login", TaskType::Auto);
        task.acceptance_criteria = vec!["logs in".to_string()];
        store.upsert_task(&task).await.unwrap();

        let fetched = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Fix login");
        assert_eq!(fetched.status, TaskStatus::Backlog);
        assert_eq!(fetched.acceptance_criteria, vec!["logs in".to_string()]);
    }

    #[tokio::test]
    async fn set_task_status_updates_in_place() {
        let (store, project_id) = store_with_project().await;
        let task = Task::new(project_id, "t", TaskType::Auto);
        store.upsert_task(&task).await.unwrap();
        store.set_task_status(task.id, TaskStatus::InProgress).await.unwrap();
        let fetched = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn list_tasks_by_project_returns_only_that_projects_tasks() {
        let store = Store::open_in_memory().await.unwrap();
        let project_a = Project::new("a");
        let project_b = Project::new("b");
        store.upsert_project(&project_a).await.unwrap();
        store.upsert_project(&project_b).await.unwrap();
        store.upsert_task(&Task::new(project_a.id, "a", TaskType::Auto)).await.unwrap();
        store.upsert_task(&Task::new(project_b.id, "b", TaskType::Auto)).await.unwrap();

        let tasks = store.list_tasks_by_project(project_a.id).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "a");
    }

    #[tokio::test]
    async fn scratchpad_round_trips_and_defaults_empty() {
        let (store, project_id) = store_with_project().await;
        let task = Task::new(project_id, "t", TaskType::Auto);
        store.upsert_task(&task).await.unwrap();

        assert_eq!(store.get_scratchpad(task.id).await.unwrap(), "");

        store.update_scratchpad(task.id, "progress notes").await.unwrap();
        assert_eq!(store.get_scratchpad(task.id).await.unwrap(), "progress notes");

        let fetched = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(fetched.scratchpad, "progress notes");
    }
}
