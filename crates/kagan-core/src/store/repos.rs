use rusqlite::Row;

use crate::types::{ProjectId, Repo, RepoId};

use super::Store;
use super::StoreError;

fn row_to_repo(row: &Row) -> rusqlite::Result<Repo> {
    let id: String = row.get(0)?;
    let project_id: String = row.get(1)?;
    let scripts: String = row.get(6)?;
    Ok(Repo {
        id: uuid::Uuid::parse_str(&id).unwrap_or_default(),
        project_id: uuid::Uuid::parse_str(&project_id).unwrap_or_default(),
        path: row.get(2)?,
        display_name: row.get(3)?,
        default_branch: row.get(4)?,
        display_order: row.get(5)?,
        scripts: serde_json::from_str(&scripts).unwrap_or_default(),
    })
}

const REPO_COLUMNS: &str = "id, project_id, path, display_name, default_branch, display_order, scripts";

impl Store {
    pub async fn upsert_repo(&self, repo: &Repo) -> Result<(), StoreError> {
        self.ensure_open()?;
        let repo = repo.clone();
        let scripts = serde_json::to_string(&repo.scripts)?;
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO repos (id, project_id, path, display_name, default_branch,
                        display_order, scripts)
                     VALUES (?1,?2,?3,?4,?5,?6,?7)
                     ON CONFLICT(id) DO UPDATE SET
                        path=excluded.path, display_name=excluded.display_name,
                        default_branch=excluded.default_branch,
                        display_order=excluded.display_order, scripts=excluded.scripts",
                    rusqlite::params![
                        repo.id.to_string(),
                        repo.project_id.to_string(),
                        repo.path,
                        repo.display_name,
                        repo.default_branch,
                        repo.display_order,
                        scripts,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get_repo(&self, id: RepoId) -> Result<Option<Repo>, StoreError> {
        self.ensure_open()?;
        let id_str = id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!("SELECT {REPO_COLUMNS} FROM repos WHERE id = ?1"))?;
                let mut rows = stmt.query(rusqlite::params![id_str])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row_to_repo(row)?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(StoreError::from)
    }

    /// Repos for a project, ordered for display (primary repo, `display_order
    /// == 0`, first).
    pub async fn list_repos_by_project(&self, project_id: ProjectId) -> Result<Vec<Repo>, StoreError> {
        self.ensure_open()?;
        let project_id_str = project_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {REPO_COLUMNS} FROM repos WHERE project_id = ?1 ORDER BY display_order ASC"
                ))?;
                let mut rows = stmt.query(rusqlite::params![project_id_str])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_repo(row)?);
                }
                Ok(out)
            })
            .await
            .map_err(StoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Project;

    #[tokio::test]
    async fn upsert_then_get_roundtrips_with_scripts() {
        let store = Store::open_in_memory().await.unwrap();
        let project = Project::new("proj");
        store.upsert_project(&project).await.unwrap();

        let mut repo = Repo::new(project.id, "/repo", "repo");
        repo.scripts.insert("test".to_string(), "cargo test".to_string());
        store.upsert_repo(&repo).await.unwrap();

        let fetched = store.get_repo(repo.id).await.unwrap().unwrap();
        assert_eq!(fetched.scripts.get("test").map(String::as_str), Some("cargo test"));
    }

    #[tokio::test]
    async fn list_repos_by_project_orders_by_display_order() {
        let store = Store::open_in_memory().await.unwrap();
        let project = Project::new("proj");
        store.upsert_project(&project).await.unwrap();

        let mut secondary = Repo::new(project.id, "/b", "b");
        secondary.display_order = 1;
        let primary = Repo::new(project.id, "/a", "a");

        store.upsert_repo(&secondary).await.unwrap();
        store.upsert_repo(&primary).await.unwrap();

        let repos = store.list_repos_by_project(project.id).await.unwrap();
        assert_eq!(repos[0].display_name, "a");
        assert_eq!(repos[1].display_name, "b");
    }
}
