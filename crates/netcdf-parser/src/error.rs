//! Error types for NetCDF reading operations.

use thiserror::Error;

/// Result type for NetCDF parser operations.
pub type NetCdfResult<T> = Result<T, NetCdfError>;

/// Error types for NetCDF reading.
#[derive(Error, Debug)]
pub enum NetCdfError {
    /// File I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The file could not be opened as a dataset
    #[error("Failed to open {path}: {message}")]
    Open { path: String, message: String },

    /// Missing required variable or attribute
    #[error("Missing required data: {0}")]
    MissingData(String),

    /// Invalid data format
    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    /// Time axis units or values that cannot be decoded
    #[error("Invalid time axis: {0}")]
    InvalidTime(String),

    /// Error reported by the netcdf library
    #[error("NetCDF library error: {0}")]
    Library(String),
}

impl From<netcdf::Error> for NetCdfError {
    fn from(err: netcdf::Error) -> Self {
        NetCdfError::Library(err.to_string())
    }
}
