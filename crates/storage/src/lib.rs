//! Storage for storm PSA ingestion.
//!
//! Provides:
//! - [`ResultStore`]: variables, contour polygons and samples, written per
//!   (variable, date) slot with atomic replace
//! - [`PgStore`]: PostgreSQL/PostGIS implementation
//! - [`MemoryStore`]: in-process implementation for tests and dry runs
//! - [`IngestQueue`]: Redis Streams queue of ingest units with retry and a
//!   failed-unit registry

pub mod memory;
pub mod postgres;
pub mod queue;
pub mod store;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use queue::{ClaimedJob, FailedUnit, IngestJob, IngestQueue, IngestTask};
pub use store::{ContourRecord, RecordQuery, ResultStore, SampleRecord, VariableRecord};
