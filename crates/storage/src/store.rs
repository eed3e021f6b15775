//! Result store interface and the records it holds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geo::{MultiPolygon, Point};
use serde::{Deserialize, Serialize};

use psa_common::{
    BoundingBox, Color, ColorMapName, ColorScale, DataType, ElementType, GeoType, PsaResult,
    VariableSpec,
};

/// A variable registered for one PSA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableRecord {
    pub id: i64,
    pub psa_id: i64,
    pub name: String,
    pub display_name: String,
    pub units: String,
    pub geo_type: GeoType,
    pub data_type: DataType,
    pub element_type: ElementType,
    pub auto_displayed: bool,
    pub color_map: Option<ColorMapName>,
    /// Empty until the first contoured unit has been loaded.
    pub color_bar: ColorScale,
    /// Min/max values and whatever else the loader records.
    pub metadata: serde_json::Value,
}

impl VariableRecord {
    /// Record for `spec` before it has an id.
    pub fn from_spec(id: i64, psa_id: i64, spec: &VariableSpec) -> Self {
        Self {
            id,
            psa_id,
            name: spec.name.clone(),
            display_name: spec.display_name.clone(),
            units: spec.units.clone(),
            geo_type: spec.geo_type,
            data_type: spec.data_type,
            element_type: spec.element_type,
            auto_displayed: spec.auto_displayed,
            color_map: spec.color_map,
            color_bar: ColorScale::default(),
            metadata: serde_json::json!({}),
        }
    }
}

/// One clipped contour polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourRecord {
    pub variable_id: i64,
    /// `None` for max-values variables.
    pub date: Option<DateTime<Utc>>,
    pub geometry: MultiPolygon<f64>,
    /// Lower bound of the band the polygon came from.
    pub value: f64,
    pub color: Color,
}

/// One raw node value inside the storm boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub variable_id: i64,
    pub date: Option<DateTime<Utc>>,
    pub point: Point<f64>,
    pub value: f64,
}

/// Selects the records of one (variable, date) slot, optionally limited to
/// those touching a bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordQuery {
    pub variable_id: i64,
    pub date: Option<DateTime<Utc>>,
    pub bbox: Option<BoundingBox>,
}

impl RecordQuery {
    pub fn new(variable_id: i64, date: Option<DateTime<Utc>>) -> Self {
        Self {
            variable_id,
            date,
            bbox: None,
        }
    }

    pub fn within(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }
}

/// Persistence for variables, contour polygons and samples.
///
/// Contours and samples are written per (variable, date) slot. A replace
/// removes every existing record of the slot and inserts the new set as
/// one atomic step, so re-running a unit never duplicates its output and a
/// failed write leaves the previous set in place.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Fetch the variable named `spec.name` for `psa_id`, creating it from
    /// `spec` when it does not exist yet.
    async fn get_or_create_variable(
        &self,
        psa_id: i64,
        spec: &VariableSpec,
    ) -> PsaResult<VariableRecord>;

    /// Persist the color bar and metadata of an existing variable.
    async fn update_variable(&self, record: &VariableRecord) -> PsaResult<()>;

    /// Replace all contour records of `(variable_id, date)`.
    async fn replace_contours(
        &self,
        variable_id: i64,
        date: Option<DateTime<Utc>>,
        records: &[ContourRecord],
    ) -> PsaResult<u64>;

    /// Replace all sample records of `(variable_id, date)`.
    async fn replace_samples(
        &self,
        variable_id: i64,
        date: Option<DateTime<Utc>>,
        records: &[SampleRecord],
    ) -> PsaResult<u64>;

    /// Contour records of a slot ordered by value.
    async fn find_contours(&self, query: &RecordQuery) -> PsaResult<Vec<ContourRecord>>;

    async fn find_samples(&self, query: &RecordQuery) -> PsaResult<Vec<SampleRecord>>;

    /// Store the metadata extracted from a dataset file.
    async fn save_dataset_metadata(
        &self,
        dataset_id: i64,
        metadata: &serde_json::Value,
    ) -> PsaResult<()>;

    async fn dataset_metadata(&self, dataset_id: i64) -> PsaResult<Option<serde_json::Value>>;
}
