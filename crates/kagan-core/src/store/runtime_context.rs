use rusqlite::OptionalExtension;

use crate::types::RuntimeContext;

use super::Store;
use super::StoreError;

impl Store {
    /// Read the singleton runtime-context row (§4.G, `context.get`), falling
    /// back to the zero value when nothing has been set yet.
    pub async fn get_runtime_context(&self) -> Result<RuntimeContext, StoreError> {
        self.ensure_open()?;
        let row = self
            .conn
            .call(|conn| {
                conn.query_row(
                    "SELECT active_project_id, active_repo_id, last_active_context
                     FROM runtime_context WHERE id = 0",
                    [],
                    |row| {
                        Ok((
                            row.get::<_, Option<String>>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, Option<String>>(2)?,
                        ))
                    },
                )
                .optional()
            })
            .await?;

        let Some((project, repo, last_active)) = row else {
            return Ok(RuntimeContext::default());
        };
        Ok(RuntimeContext {
            active_project_id: project.and_then(|s| uuid::Uuid::parse_str(&s).ok()),
            active_repo_id: repo.and_then(|s| uuid::Uuid::parse_str(&s).ok()),
            last_active_context: last_active,
        })
    }

    pub async fn set_runtime_context(&self, context: &RuntimeContext) -> Result<(), StoreError> {
        self.ensure_open()?;
        let context = context.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO runtime_context (id, active_project_id, active_repo_id, last_active_context)
                     VALUES (0, ?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET
                        active_project_id=excluded.active_project_id,
                        active_repo_id=excluded.active_repo_id,
                        last_active_context=excluded.last_active_context",
                    rusqlite::params![
                        context.active_project_id.map(|id| id.to_string()),
                        context.active_repo_id.map(|id| id.to_string()),
                        context.last_active_context,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}
