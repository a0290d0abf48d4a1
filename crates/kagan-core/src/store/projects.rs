use rusqlite::Row;

use crate::types::{Project, ProjectId};

use super::Store;
use super::StoreError;

fn row_to_project(row: &Row) -> rusqlite::Result<Project> {
    let id: String = row.get(0)?;
    let name: String = row.get(1)?;
    let created_at: String = row.get(2)?;
    Ok(Project {
        id: uuid::Uuid::parse_str(&id).unwrap_or_default(),
        name,
        created_at: created_at.parse().unwrap_or_else(|_| chrono::Utc::now()),
    })
}

impl Store {
    pub async fn upsert_project(&self, project: &Project) -> Result<(), StoreError> {
        self.ensure_open()?;
        let project = project.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO projects (id, name, created_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET name = excluded.name",
                    rusqlite::params![
                        project.id.to_string(),
                        project.name,
                        project.created_at.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get_project(&self, id: ProjectId) -> Result<Option<Project>, StoreError> {
        self.ensure_open()?;
        let id_str = id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT id, name, created_at FROM projects WHERE id = ?1")?;
                let mut rows = stmt.query(rusqlite::params![id_str])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row_to_project(row)?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(StoreError::from)
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        self.ensure_open()?;
        self.conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT id, name, created_at FROM projects ORDER BY created_at ASC")?;
                let mut rows = stmt.query([])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(row_to_project(row)?);
                }
                Ok(out)
            })
            .await
            .map_err(StoreError::from)
    }
}
