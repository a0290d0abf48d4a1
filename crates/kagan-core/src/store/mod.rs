//! Embedded SQL store (§4.A). Grounded on `at-core/src/cache.rs`'s
//! `CacheDb`/`tokio_rusqlite::Connection` pattern; the WAL + foreign-key
//! pragma choice additionally follows
//! `original_source/src/kagan/core/adapters/db/engine.py`.

mod audit;
mod error;
mod executions;
mod projects;
mod repos;
mod runtime_context;
mod schema;
mod tasks;
mod workspaces;

pub use error::StoreError;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_rusqlite::Connection;

pub struct Store {
    conn: Connection,
    closing: AtomicBool,
}

impl Store {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path.as_ref()).await?;
        let store = Self { conn, closing: AtomicBool::new(false) };
        store.init_schema().await?;
        Ok(store)
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        let store = Self { conn, closing: AtomicBool::new(false) };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(schema::DDL)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Flip the shutdown flag (§4.A, §7). Called from the daemon's shutdown
    /// broadcast so in-flight and newly arriving store calls fail fast with
    /// `StoreError::Closing` instead of racing the connection handle going away.
    pub fn mark_closing(&self) {
        self.closing.store(true, Ordering::SeqCst);
    }

    pub(crate) fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closing.load(Ordering::SeqCst) {
            return Err(StoreError::Closing);
        }
        Ok(())
    }
}

pub(crate) fn enum_to_sql<T: serde::Serialize>(val: &T) -> String {
    serde_json::to_string(val)
        .expect("enum serialization is infallible")
        .trim_matches('"')
        .to_string()
}

pub(crate) fn enum_from_sql<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, StoreError> {
    Ok(serde_json::from_str(&format!("\"{raw}\""))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_in_memory_and_applies_schema_idempotently() {
        let store = Store::open_in_memory().await.unwrap();
        store.init_schema().await.unwrap();
    }

    #[tokio::test]
    async fn mark_closing_fails_subsequent_calls() {
        let store = Store::open_in_memory().await.unwrap();
        store.list_projects().await.unwrap();
        store.mark_closing();
        assert!(matches!(store.list_projects().await, Err(StoreError::Closing)));
    }
}
