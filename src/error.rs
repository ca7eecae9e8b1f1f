use std::path::PathBuf;

use thiserror::Error;

use crate::store_lock::StoreLockInfo;

pub type Result<T> = std::result::Result<T, ExplorerError>;

#[derive(Error, Debug)]
pub enum ExplorerError {
    #[error("Invalid path {path:?}: {reason}")]
    PathInvalid { path: PathBuf, reason: String },

    #[error("{path:?} is already part of project {project}")]
    DuplicateReference { project: u64, path: PathBuf },

    #[error("Tag already exists: {0}")]
    DuplicateTag(String),

    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Corrupt store: {0}")]
    CorruptStore(String),

    #[error("File not available: {0:?}")]
    Unavailable(PathBuf),

    #[error("Store is locked by {} (pid {}), stale: {stale}", holder.hostname, holder.pid)]
    StoreLocked { holder: StoreLockInfo, stale: bool },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ExplorerError {
    pub(crate) fn path_invalid(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ExplorerError::PathInvalid {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Rejected requests that leave the catalog untouched.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ExplorerError::PathInvalid { .. }
                | ExplorerError::DuplicateReference { .. }
                | ExplorerError::DuplicateTag(_)
                | ExplorerError::InvalidName(_)
                | ExplorerError::InvalidOrder(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ExplorerError::NotFound(_))
    }
}
