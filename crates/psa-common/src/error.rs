//! Error types shared by the ingestion crates.

use thiserror::Error;

/// Result type alias using PsaError.
pub type PsaResult<T> = Result<T, PsaError>;

/// Primary error type for PSA ingestion operations.
#[derive(Debug, Error)]
pub enum PsaError {
    // === Input Errors ===
    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Invalid geometry: {0}")]
    Geometry(String),

    // === Data Errors ===
    #[error("Failed to read data: {0}")]
    DataReadError(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // === Storage Errors ===
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Queue error: {0}")]
    QueueError(String),

    // === Infrastructure Errors ===
    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Operation timed out")]
    Timeout,
}

impl PsaError {
    /// Whether the failure is transient and the operation may be retried.
    ///
    /// Store, queue and timeout failures are transient; everything else
    /// points at the input data and will fail the same way again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PsaError::DatabaseError(_) | PsaError::QueueError(_) | PsaError::Timeout
        )
    }
}

impl From<std::io::Error> for PsaError {
    fn from(err: std::io::Error) -> Self {
        PsaError::InternalError(err.to_string())
    }
}

impl From<serde_json::Error> for PsaError {
    fn from(err: serde_json::Error) -> Self {
        PsaError::Serialization(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for PsaError {
    fn from(err: serde_yaml::Error) -> Self {
        PsaError::Serialization(format!("YAML error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(PsaError::DatabaseError("connection reset".into()).is_transient());
        assert!(PsaError::Timeout.is_transient());
        assert!(!PsaError::UnknownVariable("foo".into()).is_transient());
        assert!(!PsaError::Geometry("bow-tie".into()).is_transient());
    }
}
