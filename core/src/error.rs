use chrono::NaiveDate;
use rusqlite::ErrorCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Batch-level failures. Any of these aborts the batch and rolls back
/// every write made inside its transaction.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Store unreachable: {0}")]
    Connectivity(rusqlite::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(rusqlite::Error),

    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Batch of {records} records exceeds the configured limit of {limit}")]
    BatchTooLarge { records: usize, limit: usize },

    #[error(
        "Processing date {as_of} precedes current version of sale '{source_sale_id}' (valid from {valid_from})"
    )]
    ProcessingDateRegression {
        source_sale_id: String,
        valid_from: NaiveDate,
        as_of: NaiveDate,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LoadError {
    /// True for failures that mean the store itself went away.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, LoadError::Connectivity(_))
    }
}

impl From<rusqlite::Error> for LoadError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => LoadError::ConstraintViolation(err),
            Some(
                ErrorCode::CannotOpen
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
                | ErrorCode::NotADatabase,
            ) => LoadError::Connectivity(err),
            _ => LoadError::Database(err),
        }
    }
}

pub type LoadResult<T> = Result<T, LoadError>;

/// Record-level failures. These never abort a batch; the record is
/// excluded and reported.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    #[error("unresolved customer reference: {detail}")]
    UnresolvedReference { detail: String },

    #[error("malformed record: {detail}")]
    MalformedRecord { detail: String },
}

impl RejectReason {
    pub fn unresolved(detail: impl Into<String>) -> Self {
        RejectReason::UnresolvedReference { detail: detail.into() }
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        RejectReason::MalformedRecord { detail: detail.into() }
    }
}
