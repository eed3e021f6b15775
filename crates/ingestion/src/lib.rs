//! Storm PSA ingestion library.
//!
//! Turns the NetCDF output of a storm simulation into stored map features:
//! filled contour polygons clipped to the storm boundary, raw point samples,
//! color bars and dataset metadata.
//!
//! # Architecture
//!
//! A PSA is split into units of work (one per variable and date). Each unit
//! runs through the same pipeline:
//!
//! - Validation of the dataset file against the variable catalog
//! - Contouring of the lattice or mesh field
//! - Clipping of every band polygon to the storm boundary
//! - Loading, which replaces the unit's records in the result store
//!
//! The `ingester` service drives units from a Redis queue; [`DatasetProcessor::run_psa`]
//! runs a whole PSA in-process.

pub mod config;
pub mod error;
pub mod field;
pub mod metadata;
pub mod plan;
pub mod processor;
pub mod samples;
pub mod state;
pub mod validator;

// Re-exports
pub use config::{AxisNames, IngestConfig, RetryPolicy};
pub use error::{IngestionError, Result};
pub use field::{FieldData, FieldLayout};
pub use metadata::{extract_metadata, variable_metadata, DatasetMetadata};
pub use plan::{plan_units, PsaManifest};
pub use processor::{DatasetProcessor, PsaOutcome, UnitFailure, UnitReport};
pub use samples::extract_samples;
pub use state::{UnitProgress, UnitState};
pub use validator::{
    validate_dataset, validate_path, validate_psa, PsaValidation, ValidationReport, Violation,
};
