//! Error types for tacit.
//!
//! The variants form a closed taxonomy. Access-control and input errors abort
//! an operation before any external I/O, enrichment errors are converted to
//! fallbacks by the pipeline, and adapter errors never leave the adapter
//! boundary except as data.

use thiserror::Error;

use crate::models::{PlanTier, Role};

/// Result type alias using tacit's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for tacit operations.
#[derive(Error, Debug)]
pub enum Error {
    /// No active tenant matches the host, domain or id.
    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    /// Caller has no membership in the resolved tenant.
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// Caller is a member but their role is below the operation minimum.
    #[error("Insufficient role: requires {required}, has {actual}")]
    InsufficientRole { required: Role, actual: Role },

    /// Feature or quota requires a higher plan tier.
    #[error("Plan upgrade required: requires {required}, tenant is on {current}")]
    PlanUpgradeRequired { required: PlanTier, current: PlanTier },

    /// Caller supplied invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Tenant-scoped entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Enrichment provider call failed (timeout, quota, malformed response)
    #[error("Enrichment error: {0}")]
    Enrichment(String),

    /// Persistence layer failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Integration adapter could not reach its platform
    #[error("Adapter connection error: {0}")]
    AdapterConnection(String),

    /// Export adapter rejected or failed the write
    #[error("Export failure: {0}")]
    ExportFailure(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for the access-control class (tenant, membership, role, plan).
    pub fn is_access_denied(&self) -> bool {
        matches!(
            self,
            Error::TenantNotFound(_)
                | Error::NotAuthorized(_)
                | Error::InsufficientRole { .. }
                | Error::PlanUpgradeRequired { .. }
        )
    }

    /// Whether the caller may retry the whole operation.
    ///
    /// Access-control and input errors never succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Persistence(_)
                | Error::Enrichment(_)
                | Error::AdapterConnection(_)
                | Error::Request(_)
        )
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
