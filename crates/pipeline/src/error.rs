//! Error taxonomy for the synchronization pipeline.
//!
//! Run-fatal errors surface as [`SyncError`]. Everything scoped to a single
//! record is counted in the run log instead of being raised.

use syncbridge_db::{is_infrastructure_error, is_unique_violation, violated_constraint};

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// The legacy source could not produce a complete record set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("Legacy source unreachable: {0}")]
    Connectivity(String),

    #[error("Legacy source rejected credentials: {0}")]
    Authentication(String),

    #[error("Unknown legacy table '{0}'")]
    UnknownTable(String),

    #[error("Malformed legacy response: {0}")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Errors raised by configuration, run log and load backends.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unknown target model '{0}'")]
    UnknownModel(String),

    /// The store refused this record's data (type error, check constraint).
    #[error("Write rejected: {0}")]
    Rejected(String),

    /// The store itself is unreachable. Fatal to the run.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether this error must abort the whole run rather than one record.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if is_unique_violation(&err) {
            let constraint = violated_constraint(&err).unwrap_or("unknown");
            return Self::DuplicateKey(format!(
                "Duplicate value violates unique constraint: {constraint}"
            ));
        }
        if is_infrastructure_error(&err) {
            return Self::Unavailable(err.to_string());
        }
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("Row not found".to_string()),
            other => Self::Rejected(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

/// Fatal outcome of one `run_sync` invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// No usable configuration. Not retried automatically.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// Infrastructure failure outside the scope of a single record.
    #[error("Sync failed: {0}")]
    Failure(String),
}

impl SyncError {
    /// Whether an external retry policy should try the run again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Configuration(_))
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Errors from the administrative catalog helpers.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for CatalogError {
    fn from(err: sqlx::Error) -> Self {
        if is_unique_violation(&err) {
            let constraint = violated_constraint(&err).unwrap_or("unknown");
            return Self::Conflict(format!(
                "Duplicate value violates unique constraint: {constraint}"
            ));
        }
        Self::Database(err)
    }
}

impl From<syncbridge_core::error::CoreError> for CatalogError {
    fn from(err: syncbridge_core::error::CoreError) -> Self {
        use syncbridge_core::error::CoreError;
        match err {
            CoreError::NotFound { entity, key } => Self::NotFound(format!("{entity} '{key}'")),
            CoreError::Conflict(msg) => Self::Conflict(msg),
            CoreError::Validation(msg) | CoreError::Internal(msg) => Self::Validation(msg),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
