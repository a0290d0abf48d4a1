//! Atomic file writes: tempfile in the same directory, fsync, rename
//! (§5, §2.B). Grounded on `original_source/src/kagan/atomic.py`; this
//! version adds the fsync the Python original omits, per the spec text.

use std::fs;
use std::io::Write;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AtomicWriteError {
    #[error("failed to create parent directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write temp file: {0}")]
    Write(#[source] std::io::Error),
    #[error("failed to rename temp file into place: {0}")]
    Rename(#[source] std::io::Error),
}

/// Write `content` to `path` atomically: a sibling tempfile is created,
/// written, fsynced, then renamed over the destination. On any failure the
/// tempfile is removed and the destination is left untouched.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), AtomicWriteError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|source| AtomicWriteError::CreateDir {
        path: parent.display().to_string(),
        source,
    })?;

    let tmp = tempfile::Builder::new()
        .prefix(".tmp_")
        .tempfile_in(parent)
        .map_err(AtomicWriteError::Write)?;

    let result = (|| -> std::io::Result<()> {
        let mut file = tmp.as_file();
        file.write_all(content)?;
        file.sync_all()?;
        Ok(())
    })();

    match result {
        Ok(()) => tmp
            .persist(path)
            .map(|_| ())
            .map_err(|e| AtomicWriteError::Rename(e.error)),
        Err(e) => Err(AtomicWriteError::Write(e)),
    }
}
