// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Scan root is not contained in any allowed library root. Raised before any I/O.
    #[error("Path violation: {0}")]
    PathViolation(String),

    #[error("Database error: {0}")]
    Database(String),

    /// A batch write failed. The writer's buffer is left intact.
    #[error("Flush failed: {0}")]
    Flush(String),

    #[error("Ingestion failed: {0}")]
    Ingestion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Mutation attempted on a job or scan in a state that forbids it.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
