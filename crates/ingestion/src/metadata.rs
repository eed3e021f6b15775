//! Metadata captured from dataset files for post-processing.

use serde::{Deserialize, Serialize};

use netcdf_parser::{dataset::attributes_json, DatasetReader};

use crate::config::AxisNames;

/// Global and coordinate attributes of one dataset file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub meta: serde_json::Value,
    pub meta_time: serde_json::Value,
    pub meta_lat: serde_json::Value,
    pub meta_lon: serde_json::Value,
}

impl DatasetMetadata {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "meta": self.meta,
            "meta_time": self.meta_time,
            "meta_lat": self.meta_lat,
            "meta_lon": self.meta_lon,
        })
    }
}

/// Attributes of `name` as a JSON object; empty when the variable is absent.
pub fn variable_metadata(reader: &dyn DatasetReader, name: &str) -> serde_json::Value {
    reader
        .variable(name)
        .map(|info| attributes_json(&info.attributes))
        .unwrap_or_else(|| serde_json::json!({}))
}

pub fn extract_metadata(reader: &dyn DatasetReader, axes: &AxisNames) -> DatasetMetadata {
    DatasetMetadata {
        meta: attributes_json(&reader.global_attributes()),
        meta_time: variable_metadata(reader, &axes.time),
        meta_lat: variable_metadata(reader, &axes.lat),
        meta_lon: variable_metadata(reader, &axes.lon),
    }
}
