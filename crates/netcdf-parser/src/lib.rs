//! Dataset access for storm simulation output.
//!
//! Ingestion never talks to a file format directly; it goes through the
//! [`DatasetReader`] trait, which exposes a dataset as named variables with
//! dimensions, attributes and `f64` values (fill values already mapped to
//! `NaN`, CF `scale_factor`/`add_offset` already applied).
//!
//! Two implementations are provided:
//! - [`NetCdfDataset`], backed by the native netcdf library.
//! - [`MemoryDataset`], an in-memory builder used by tests and dry runs.
//!
//! Datasets follow the xarray convention for telling coordinates from data:
//! a variable is a coordinate when its name matches a dimension or when it is
//! listed in another variable's `coordinates` attribute.

pub mod dataset;
pub mod error;
pub mod memory;
pub mod native;
pub mod time;

pub use dataset::{AttrValue, DatasetOpener, DatasetReader, VariableInfo};
pub use error::{NetCdfError, NetCdfResult};
pub use memory::{MemoryDataset, MemoryOpener};
pub use native::{silence_hdf5_errors, write_netcdf, NetCdfDataset, NetCdfOpener};
pub use time::decode_cf_time;
