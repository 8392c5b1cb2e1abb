//! Staging store
//!
//! Holds the bytes of a transfer, addressed by transfer id, for as long as the
//! transfer is in flight. The same store type backs the inbox where received
//! files are kept until the local observer downloads them.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StagingError {
    #[error("Invalid transfer id: {0}")]
    InvalidId(String),
    #[error("Staging I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Directory-backed byte store keyed by transfer id
#[derive(Debug, Clone)]
pub struct StagingStore {
    root: PathBuf,
}

impl StagingStore {
    /// Open (creating if needed) a store rooted at `root`
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StagingError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Store bytes for a transfer, replacing anything already there
    pub async fn put(&self, transfer_id: &str, bytes: &[u8]) -> Result<(), StagingError> {
        let path = self.path_for(transfer_id)?;
        let partial = path.with_extension("part");

        // Readers never observe a half-written file
        tokio::fs::write(&partial, bytes).await?;
        tokio::fs::rename(&partial, &path).await?;

        debug!(transfer_id, size = bytes.len(), "Staged bytes");
        Ok(())
    }

    /// Bytes for a transfer, or `None` when nothing is staged.
    ///
    /// `None` is the normal state after completion or rejection; callers that
    /// race with cleanup must treat it as such.
    pub async fn get(&self, transfer_id: &str) -> Result<Option<Vec<u8>>, StagingError> {
        let path = self.path_for(transfer_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a transfer's bytes. Returns whether anything was removed.
    pub async fn delete(&self, transfer_id: &str) -> Result<bool, StagingError> {
        let path = self.path_for(transfer_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(transfer_id, "Removed staged bytes");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn path_for(&self, transfer_id: &str) -> Result<PathBuf, StagingError> {
        // Ids arrive from the network; keep them inside the root
        let valid = !transfer_id.is_empty()
            && transfer_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StagingError::InvalidId(transfer_id.to_string()));
        }
        Ok(self.root.join(format!("{}.bin", transfer_id)))
    }
}
