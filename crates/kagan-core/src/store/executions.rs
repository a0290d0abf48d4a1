use rusqlite::Row;

use crate::limits::{MAX_CONVERSATION_HISTORY, MAX_LOG_MESSAGE_LENGTH};
use crate::types::{Execution, ExecutionId, ExecutionStatus, TaskId, WorkspaceId};

use super::{enum_from_sql, enum_to_sql, Store, StoreError};

struct ExecutionRow {
    execution: Execution,
    status: String,
}

// Column order: id, task_id, workspace_id, status, exit_code, run_index,
// metadata, log, created_at.
fn row_to_execution(row: &Row) -> rusqlite::Result<ExecutionRow> {
    let id: String = row.get(0)?;
    let task_id: String = row.get(1)?;
    let workspace_id: String = row.get(2)?;
    let status: String = row.get(3)?;
    let exit_code: Option<i64> = row.get(4)?;
    let run_index: i64 = row.get(5)?;
    let metadata: String = row.get(6)?;
    let log: String = row.get(7)?;
    let created_at: String = row.get(8)?;

    Ok(ExecutionRow {
        execution: Execution {
            id: uuid::Uuid::parse_str(&id).unwrap_or_default(),
            task_id: uuid::Uuid::parse_str(&task_id).unwrap_or_default(),
            workspace_id: uuid::Uuid::parse_str(&workspace_id).unwrap_or_default(),
            status: ExecutionStatus::Pending,
            exit_code: exit_code.map(|c| c as i32),
            run_index: run_index as u32,
            metadata: serde_json::from_str(&metadata).unwrap_or_default(),
            log: serde_json::from_str(&log).unwrap_or_default(),
            created_at: created_at.parse().unwrap_or_else(|_| chrono::Utc::now()),
        },
        status,
    })
}

fn finish(row: ExecutionRow) -> Result<Execution, StoreError> {
    let mut execution = row.execution;
    execution.status = enum_from_sql(&row.status)?;
    Ok(execution)
}

const EXECUTION_COLUMNS: &str =
    "id, task_id, workspace_id, status, exit_code, run_index, metadata, log, created_at";

impl Store {
    pub async fn insert_execution(&self, execution: &Execution) -> Result<(), StoreError> {
        self.ensure_open()?;
        let execution = execution.clone();
        let status = enum_to_sql(&execution.status);
        let metadata = serde_json::to_string(&execution.metadata)?;
        let log = serde_json::to_string(&execution.log)?;

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO executions
                        (id, task_id, workspace_id, status, exit_code, run_index, metadata, log, created_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
                    rusqlite::params![
                        execution.id.to_string(),
                        execution.task_id.to_string(),
                        execution.workspace_id.to_string(),
                        status,
                        execution.exit_code,
                        execution.run_index,
                        metadata,
                        log,
                        execution.created_at.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get_execution(&self, id: ExecutionId) -> Result<Option<Execution>, StoreError> {
        self.ensure_open()?;
        let id_str = id.to_string();
        let row = self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare(&format!("SELECT {EXECUTION_COLUMNS} FROM executions WHERE id = ?1"))?;
                let mut rows = stmt.query(rusqlite::params![id_str])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row_to_execution(row)?)),
                    None => Ok(None),
                }
            })
            .await?;
        row.map(finish).transpose()
    }

    pub async fn list_executions_for_task(&self, task_id: TaskId) -> Result<Vec<Execution>, StoreError> {
        self.ensure_open()?;
        let task_id_str = task_id.to_string();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {EXECUTION_COLUMNS} FROM executions WHERE task_id = ?1 ORDER BY run_index ASC"
                ))?;
                let mut rows = stmt.query(rusqlite::params![task_id_str])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_execution(row)?);
                }
                Ok(out)
            })
            .await?;
        rows.into_iter().map(finish).collect()
    }

    /// `MAX(run_index) + 1` for a task, starting at 1; used by the scheduler
    /// to enforce `max_runs_per_task` (§4.D, §4.E) before calling
    /// `insert_execution`.
    pub async fn next_run_index(&self, task_id: TaskId) -> Result<u32, StoreError> {
        self.ensure_open()?;
        let task_id_str = task_id.to_string();
        let max: Option<i64> = self
            .conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT MAX(run_index) FROM executions WHERE task_id = ?1",
                    rusqlite::params![task_id_str],
                    |row| row.get(0),
                )
            })
            .await?;
        Ok(max.unwrap_or(0) as u32 + 1)
    }

    pub async fn set_execution_status(
        &self,
        id: ExecutionId,
        status: ExecutionStatus,
        exit_code: Option<i32>,
    ) -> Result<(), StoreError> {
        self.ensure_open()?;
        let id_str = id.to_string();
        let status_str = enum_to_sql(&status);
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE executions SET status = ?1, exit_code = ?2 WHERE id = ?3",
                    rusqlite::params![status_str, exit_code, id_str],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Merge `updates` into an execution's `metadata` JSON object, overwriting
    /// any keys present in both (the review loop uses this to attach a
    /// `review_result` entry without disturbing the rest of the metadata).
    pub async fn merge_execution_metadata(
        &self,
        id: ExecutionId,
        updates: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), StoreError> {
        self.ensure_open()?;
        let id_str = id.to_string();
        self.conn
            .call(move |conn| {
                let existing: String = conn.query_row(
                    "SELECT metadata FROM executions WHERE id = ?1",
                    rusqlite::params![id_str],
                    |row| row.get(0),
                )?;
                let mut metadata: serde_json::Map<String, serde_json::Value> =
                    serde_json::from_str(&existing).unwrap_or_default();
                metadata.extend(updates);
                let encoded = serde_json::to_string(&metadata)
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                conn.execute(
                    "UPDATE executions SET metadata = ?1 WHERE id = ?2",
                    rusqlite::params![encoded, id_str],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Append a log entry by read-modify-write; executions log volume is
    /// small enough that this is cheaper than a normalized child table
    /// (§4.A, mirroring the JSON blob columns in `at-core/src/cache.rs`).
    /// Each entry is truncated to `MAX_LOG_MESSAGE_LENGTH` and the log itself
    /// capped at `MAX_CONVERSATION_HISTORY` entries, oldest first dropped —
    /// an unhandled-exception storm or a long-running task otherwise grows
    /// this column without bound (§7's bounded-logging requirement).
    pub async fn append_execution_log(&self, id: ExecutionId, entry: impl Into<String>) -> Result<(), StoreError> {
        self.ensure_open()?;
        let id_str = id.to_string();
        let entry = truncate_log_message(entry.into());
        self.conn
            .call(move |conn| {
                let existing: String =
                    conn.query_row("SELECT log FROM executions WHERE id = ?1", rusqlite::params![id_str], |row| {
                        row.get(0)
                    })?;
                let mut log: Vec<String> = serde_json::from_str(&existing).unwrap_or_default();
                log.push(entry);
                if log.len() > MAX_CONVERSATION_HISTORY {
                    let drop = log.len() - MAX_CONVERSATION_HISTORY;
                    log.drain(0..drop);
                }
                let encoded = serde_json::to_string(&log).map_err(|e| {
                    rusqlite::Error::ToSqlConversionFailure(Box::new(e))
                })?;
                conn.execute(
                    "UPDATE executions SET log = ?1 WHERE id = ?2",
                    rusqlite::params![encoded, id_str],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

fn truncate_log_message(mut entry: String) -> String {
    if entry.len() > MAX_LOG_MESSAGE_LENGTH {
        let mut boundary = MAX_LOG_MESSAGE_LENGTH;
        while !entry.is_char_boundary(boundary) {
            boundary -= 1;
        }
        entry.truncate(boundary);
        entry.push_str("...(truncated)");
    }
    entry
}
