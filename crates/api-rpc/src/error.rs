//! RPC Error Types
//!
//! Maps application errors to JSON-RPC error codes.

use cratedig_core::domain::DomainError;
use cratedig_core::error::AppError;
use jsonrpsee::types::ErrorObjectOwned;

/// RPC Error Codes
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const NOT_FOUND: i32 = 4001;
    pub const CONFLICT: i32 = 4002;
    pub const THROTTLED: i32 = 4003;
    pub const PATH_VIOLATION: i32 = 4004;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const DB_ERROR: i32 = 5001;
    pub const SYSTEM_ERROR: i32 = 5002;
}

fn owned(code: i32, message: impl Into<String>) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(code, message.into(), None::<()>)
}

pub fn throttled() -> ErrorObjectOwned {
    owned(code::THROTTLED, "Rate limit exceeded. Please slow down.")
}

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    match err {
        AppError::Validation(msg) => owned(code::VALIDATION_ERROR, msg),
        AppError::PathViolation(msg) => owned(code::PATH_VIOLATION, msg),
        AppError::NotFound(msg) => owned(code::NOT_FOUND, msg),
        AppError::InvalidState(msg) => owned(code::CONFLICT, msg),
        AppError::Domain(e @ DomainError::InvalidStateTransition { .. }) => {
            owned(code::CONFLICT, e.to_string())
        }
        AppError::Domain(e @ (DomainError::JobNotFound(_) | DomainError::ScanNotFound(_))) => {
            owned(code::NOT_FOUND, e.to_string())
        }
        AppError::Domain(e) => owned(code::VALIDATION_ERROR, e.to_string()),
        AppError::Serialization(e) => owned(code::VALIDATION_ERROR, e.to_string()),
        AppError::Database(msg) | AppError::Flush(msg) => owned(code::DB_ERROR, msg),
        AppError::Io(e) => owned(code::SYSTEM_ERROR, e.to_string()),
        AppError::Ingestion(msg) | AppError::Config(msg) | AppError::Internal(msg) => {
            owned(code::INTERNAL_ERROR, msg)
        }
    }
}
