use rusqlite::Row;

use crate::types::{TaskId, Workspace, WorkspaceId, WorkspaceRepoEntry, WorkspaceStatus};

use super::{enum_from_sql, enum_to_sql, Store, StoreError};

fn row_to_repo_entry(row: &Row) -> rusqlite::Result<WorkspaceRepoEntry> {
    let repo_id: String = row.get(0)?;
    Ok(WorkspaceRepoEntry {
        repo_id: uuid::Uuid::parse_str(&repo_id).unwrap_or_default(),
        worktree_path: row.get(1)?,
        branch_name: row.get(2)?,
        target_branch: row.get(3)?,
    })
}

impl Store {
    /// Insert a workspace and its repo entries in a single transaction, so a
    /// partially-written workspace is never observable (§4.A, §4.B).
    pub async fn insert_workspace(&self, workspace: &Workspace) -> Result<(), StoreError> {
        self.ensure_open()?;
        let workspace = workspace.clone();
        let status = enum_to_sql(&workspace.status);

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO workspaces (id, task_id, status) VALUES (?1, ?2, ?3)",
                    rusqlite::params![workspace.id.to_string(), workspace.task_id.to_string(), status],
                )?;
                for entry in &workspace.repos {
                    tx.execute(
                        "INSERT INTO workspace_repos
                            (workspace_id, repo_id, worktree_path, branch_name, target_branch)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        rusqlite::params![
                            workspace.id.to_string(),
                            entry.repo_id.to_string(),
                            entry.worktree_path,
                            entry.branch_name,
                            entry.target_branch,
                        ],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get_workspace(&self, id: WorkspaceId) -> Result<Option<Workspace>, StoreError> {
        self.ensure_open()?;
        let id_str = id.to_string();
        let row = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT id, task_id, status FROM workspaces WHERE id = ?1")?;
                let mut rows = stmt.query(rusqlite::params![id_str])?;
                let header = match rows.next()? {
                    Some(row) => {
                        let id: String = row.get(0)?;
                        let task_id: String = row.get(1)?;
                        let status: String = row.get(2)?;
                        Some((id, task_id, status))
                    }
                    None => None,
                };
                let Some((id, task_id, status)) = header else {
                    return Ok(None);
                };

                let mut repo_stmt = conn.prepare(
                    "SELECT repo_id, worktree_path, branch_name, target_branch
                     FROM workspace_repos WHERE workspace_id = ?1",
                )?;
                let mut repo_rows = repo_stmt.query(rusqlite::params![id])?;
                let mut repos = Vec::new();
                while let Some(row) = repo_rows.next()? {
                    repos.push(row_to_repo_entry(row)?);
                }

                Ok(Some((id, task_id, status, repos)))
            })
            .await?;

        let Some((id, task_id, status, repos)) = row else {
            return Ok(None);
        };
        Ok(Some(Workspace {
            id: uuid::Uuid::parse_str(&id).unwrap_or_default(),
            task_id: uuid::Uuid::parse_str(&task_id).unwrap_or_default(),
            status: enum_from_sql(&status)?,
            repos,
        }))
    }

    pub async fn list_active_workspaces_for_task(&self, task_id: TaskId) -> Result<Vec<Workspace>, StoreError> {
        self.ensure_open()?;
        let task_id_str = task_id.to_string();
        let ids = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id FROM workspaces WHERE task_id = ?1 AND status = 'ACTIVE'",
                )?;
                let mut rows = stmt.query(rusqlite::params![task_id_str])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row.get::<_, String>(0)?);
                }
                Ok(out)
            })
            .await?;

        let mut workspaces = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(ws) = self.get_workspace(uuid::Uuid::parse_str(&id).unwrap_or_default()).await? {
                workspaces.push(ws);
            }
        }
        Ok(workspaces)
    }

    pub async fn set_workspace_status(&self, id: WorkspaceId, status: WorkspaceStatus) -> Result<(), StoreError> {
        self.ensure_open()?;
        let id_str = id.to_string();
        let status_str = enum_to_sql(&status);
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE workspaces SET status = ?1 WHERE id = ?2",
                    rusqlite::params![status_str, id_str],
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
    use crate::types::{Project, Repo, Task, TaskType};

    async fn store_with_task_and_repo() -> (Store, TaskId, uuid::Uuid) {
        let store = Store::open_in_memory().await.unwrap();
        let project = Project::new("proj");
        store.upsert_project(&project).await.unwrap();
        let repo = Repo::new(project.id, "/repo", "repo");
        store.upsert_repo(&repo).await.unwrap();
        let task = Task::new(project.id, "t", TaskType::Auto);
        store.upsert_task(&task).await.unwrap();
        (store, task.id, repo.id)
    }

    #[tokio::test]
    async fn insert_then_get_roundtrips_repo_entries() {
        let (store, task_id, repo_id) = store_with_task_and_repo().await;
        let workspace = Workspace::new(
            task_id,
            vec![WorkspaceRepoEntry {
                repo_id,
                worktree_path: "/tmp/wt".to_string(),
                branch_name: "task/fix-login".to_string(),
                target_branch: "main".to_string(),
            }],
        );
        store.insert_workspace(&workspace).await.unwrap();

        let fetched = store.get_workspace(workspace.id).await.unwrap().unwrap();
        assert_eq!(fetched.repos.len(), 1);
        assert_eq!(fetched.repos[0].branch_name, "task/fix-login");
    }

    #[tokio::test]
    async fn archived_workspaces_excluded_from_active_list() {
        let (store, task_id, _repo_id) = store_with_task_and_repo().await;
        let workspace = Workspace::new(task_id, Vec::new());
        store.insert_workspace(&workspace).await.unwrap();
        store
            .set_workspace_status(workspace.id, WorkspaceStatus::Archived)
            .await
            .unwrap();

        let active = store.list_active_workspaces_for_task(task_id).await.unwrap();
        assert!(active.is_empty());
    }
}
