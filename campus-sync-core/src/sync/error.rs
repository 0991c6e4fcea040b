use thiserror::Error;

use crate::source::{RecordKind, SourceError};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The request was rejected before any phase ran.
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("{kind} record \"{title}\" references unknown {prerequisite}")]
    UnresolvedPrerequisite {
        kind: RecordKind,
        title: String,
        prerequisite: String,
    },

    #[error("Record \"{title}\" rejected: {message}")]
    Record { title: String, message: String },
}

impl SyncError {
    pub fn is_validation(&self) -> bool {
        matches!(self, SyncError::Validation(_))
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
