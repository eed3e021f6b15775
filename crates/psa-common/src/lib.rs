//! Common types and utilities shared across the storm PSA ingestion crates.

pub mod bbox;
pub mod color;
pub mod error;
pub mod manifest;
pub mod variable;

pub use bbox::BoundingBox;
pub use color::{Color, ColorMap, ColorMapName, ColorScale, ColorStop};
pub use error::{PsaError, PsaResult};
pub use manifest::{IngestUnit, ManifestDataset, StormContext};
pub use variable::{DataType, ElementType, GeoType, VariableCatalog, VariableSpec};
