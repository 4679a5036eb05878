use std::collections::BTreeMap;
use thiserror::Error;

use crate::auth::password::PasswordError;
use crate::database::StoreError;
use crate::storage::StorageError;

/// Failures of the create/update/delete/restore pipelines
#[derive(Debug, Error)]
pub enum DomainError {
    /// Missing fields, disallowed fields, dangling references
    #[error("{0}")]
    Validation(String),

    /// Field rule failures, one entry per offending field
    #[error("{message}")]
    FieldRules {
        message: String,
        field_errors: BTreeMap<String, String>,
    },

    /// Id or email already taken
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    /// Lifecycle transition that is not available from the current state
    #[error("{0}")]
    InvalidState(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Password(#[from] PasswordError),
}

pub type DomainResult<T> = Result<T, DomainError>;
