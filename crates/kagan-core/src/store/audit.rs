use crate::types::AuditEntry;

use super::Store;
use super::StoreError;

impl Store {
    /// Record one API dispatch outcome (§4.G). `params_digest` is a hash, not
    /// the raw params, so the audit log never grows unboundedly sensitive.
    pub async fn record_audit_entry(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        self.ensure_open()?;
        let entry = entry.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO audit_log (request_id, session_id, capability, method,
                        params_digest, success, timestamp)
                     VALUES (?1,?2,?3,?4,?5,?6,?7)",
                    rusqlite::params![
                        entry.request_id,
                        entry.session_id,
                        entry.capability,
                        entry.method,
                        entry.params_digest,
                        entry.success,
                        entry.timestamp.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn list_recent_audit_entries(&self, limit: u32) -> Result<Vec<AuditEntry>, StoreError> {
        self.ensure_open()?;
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT request_id, session_id, capability, method, params_digest, success, timestamp
                     FROM audit_log ORDER BY timestamp DESC LIMIT ?1",
                )?;
                let mut rows = stmt.query(rusqlite::params![limit])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    let timestamp: String = row.get(6)?;
                    out.push(AuditEntry {
                        request_id: row.get(0)?,
                        session_id: row.get(1)?,
                        capability: row.get(2)?,
                        method: row.get(3)?,
                        params_digest: row.get(4)?,
                        success: row.get(5)?,
                        timestamp: timestamp.parse().unwrap_or_else(|_| chrono::Utc::now()),
                    });
                }
                Ok(out)
            })
            .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recent_entries_come_back_newest_first() {
        let store = Store::open_in_memory().await.unwrap();
        for (method, offset) in [("task.create", 2), ("task.update", 1), ("task.delete", 0)] {
            store
                .record_audit_entry(&AuditEntry {
                    request_id: method.to_string(),
                    session_id: "s1".to_string(),
                    capability: "MAINTAINER".to_string(),
                    method: method.to_string(),
                    params_digest: "abc".to_string(),
                    success: true,
                    timestamp: chrono::Utc::now() - chrono::Duration::seconds(offset),
                })
                .await
                .unwrap();
        }

        let recent = store.list_recent_audit_entries(10).await.unwrap();
        assert_eq!(recent[0].method, "task.delete");
        assert_eq!(recent.len(), 3);
    }
}
