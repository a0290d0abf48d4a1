use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] tokio_rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// The underlying connection's background thread has shut down; returned
    /// instead of panicking so callers racing daemon shutdown get a typed
    /// error back (§4.A).
    #[error("store is closing")]
    Closing,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
