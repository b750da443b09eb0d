use thiserror::Error;

use crate::remote::DocId;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure taxonomy for store operations.
///
/// `Validation` is raised before any remote call is attempted. `Remote`
/// leaves the local cache untouched; the store confirms mutations only
/// through its own subscription push. `NotFound` is a benign race against a
/// concurrent delete and callers may skip the operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("remote store call failed: {0}")]
    Remote(String),

    #[error("no document with id {0}")]
    NotFound(DocId),

    #[error("edit session: {0}")]
    State(String),
}

impl StoreError {
    pub fn is_benign(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
