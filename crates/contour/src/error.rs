//! Error types for contour generation.

use thiserror::Error;

/// Result type for contour operations.
pub type ContourResult<T> = Result<T, ContourError>;

#[derive(Debug, Error)]
pub enum ContourError {
    /// Coordinates and values disagree in size or layout
    #[error("Invalid field: {0}")]
    InvalidField(String),

    /// Mesh connectivity references nodes that do not exist
    #[error("Invalid connectivity: {0}")]
    InvalidConnectivity(String),

    /// The field has no non-null values to derive levels from
    #[error("Field contains no valid values")]
    EmptyField,

    /// Geometry could not be repaired or clipped
    #[error("Geometry error: {0}")]
    Geometry(String),
}
