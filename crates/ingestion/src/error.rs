//! Error types for the ingestion crate.

use thiserror::Error;

use contour::ContourError;
use netcdf_parser::NetCdfError;
use psa_common::PsaError;

use crate::validator::ValidationReport;

/// Errors that can occur during ingestion.
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Dataset failed validation: {0}")]
    Validation(ValidationReport),

    #[error("Failed to read dataset: {0}")]
    Dataset(#[from] NetCdfError),

    #[error("Contouring failed: {0}")]
    Contour(#[from] ContourError),

    #[error("Store operation failed: {0}")]
    Store(#[from] PsaError),

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Invalid unit {unit}: {message}")]
    InvalidUnit { unit: String, message: String },

    #[error("Field {variable} does not fit its coordinates: {message}")]
    InvalidField { variable: String, message: String },

    #[error("Date {0} not found on the time axis")]
    DateNotFound(String),

    #[error("Missing required metadata: {0}")]
    MissingMetadata(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Worker task failed: {0}")]
    Task(String),
}

impl IngestionError {
    /// Whether another attempt at the same unit could succeed.
    ///
    /// Only transient store and queue failures qualify; validation and
    /// data problems fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        match self {
            IngestionError::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(IngestionError::Store(PsaError::DatabaseError("gone".into())).is_retryable());
        assert!(IngestionError::Store(PsaError::Timeout).is_retryable());
        assert!(!IngestionError::Store(PsaError::UnknownVariable("x".into())).is_retryable());
        assert!(!IngestionError::DateNotFound("2012-10-29".into()).is_retryable());
        assert!(!IngestionError::Contour(ContourError::EmptyField).is_retryable());
    }
}
