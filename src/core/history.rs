//! Append-only history of converted posts.
//!
//! One identifier per line in a plain text file. The file is only ever
//! appended to; the set of seen posts is rebuilt by reading it back.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Errors that can occur with the history store
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("History I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Identifier cannot be stored as a single line: {0:?}")]
    InvalidIdentifier(String),
}

/// File-backed record of processed post identifiers
#[derive(Debug, Clone)]
pub struct HistoryStore {
    /// Path to the history file
    path: PathBuf,
}

impl HistoryStore {
    /// Create a store over `path` (the file is created on first record)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the path to the history file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every recorded identifier
    pub async fn load(&self) -> Result<HashSet<String>, HistoryError> {
        let mut seen = HashSet::new();

        if !fs::try_exists(&self.path).await.map_err(|e| self.io_error(e))? {
            return Ok(seen);
        }

        let file = File::open(&self.path).await.map_err(|e| self.io_error(e))?;
        let mut lines = BufReader::new(file).lines();

        while let Some(line) = lines.next_line().await.map_err(|e| self.io_error(e))? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            seen.insert(line.to_string());
        }

        Ok(seen)
    }

    /// Append one identifier and sync it to disk
    pub async fn record(&self, identifier: &str) -> Result<(), HistoryError> {
        if !is_storable(identifier) {
            return Err(HistoryError::InvalidIdentifier(identifier.to_string()));
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        file.write_all(format!("{}\n", identifier).as_bytes())
            .await
            .map_err(|e| self.io_error(e))?;
        file.flush().await.map_err(|e| self.io_error(e))?;
        file.sync_data().await.map_err(|e| self.io_error(e))?;

        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> HistoryError {
        HistoryError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// Whether an identifier survives a write/load round trip unchanged
pub fn is_storable(identifier: &str) -> bool {
    !identifier.trim().is_empty()
        && identifier.trim() == identifier
        && !identifier.contains(['\n', '\r'])
}
