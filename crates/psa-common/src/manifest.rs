//! Dataset manifests, storm context and units of ingestion work.

use chrono::{DateTime, Utc};
use geo::Polygon;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

fn default_topology_name() -> String {
    "element".to_string()
}

/// A dataset file registered for a PSA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestDataset {
    pub id: i64,
    pub psa_id: i64,
    pub path: PathBuf,
    /// Variable names the file provides.
    pub variables: Vec<String>,
    /// Regular lattice (`true`) or triangulated mesh (`false`).
    pub structured: bool,
    /// Mesh connectivity variable, only consulted for unstructured files.
    #[serde(default = "default_topology_name")]
    pub topology_name: String,
    /// Metadata captured from the source file after ingestion.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl ManifestDataset {
    pub fn new(id: i64, psa_id: i64, path: impl Into<PathBuf>, structured: bool) -> Self {
        Self {
            id,
            psa_id,
            path: path.into(),
            variables: Vec::new(),
            structured,
            topology_name: default_topology_name(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_variables<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables = variables.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_topology(mut self, name: impl Into<String>) -> Self {
        self.topology_name = name.into();
        self
    }
}

/// The storm a PSA belongs to: clipping boundary and expected dates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StormContext {
    pub name: String,
    /// Storm boundary in WGS84 lon/lat.
    pub boundary: Polygon<f64>,
    /// Dates every time-series variable is ingested for.
    pub dates: Vec<DateTime<Utc>>,
}

/// One `(dataset, variable, optional date)` unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestUnit {
    pub dataset: ManifestDataset,
    pub variable: String,
    /// `None` for max-value variables.
    pub date: Option<DateTime<Utc>>,
}

impl IngestUnit {
    /// Stable identifier used in logs and the failed-unit registry.
    pub fn key(&self) -> String {
        match &self.date {
            Some(date) => format!(
                "{}:{}:{}:{}",
                self.dataset.psa_id,
                self.dataset.id,
                self.variable,
                date.format("%Y%m%dT%H%M%SZ")
            ),
            None => format!(
                "{}:{}:{}:max",
                self.dataset.psa_id, self.dataset.id, self.variable
            ),
        }
    }
}

impl fmt::Display for IngestUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_manifest_defaults_from_json() {
        let json = r#"{"id": 3, "psa_id": 1, "path": "/data/fort.63.nc",
                       "variables": ["water_level"], "structured": false}"#;
        let ds: ManifestDataset = serde_json::from_str(json).unwrap();
        assert_eq!(ds.topology_name, "element");
        assert!(ds.metadata.is_null());
    }

    #[test]
    fn test_unit_key() {
        let ds = ManifestDataset::new(3, 1, "/data/a.nc", true);
        let unit = IngestUnit {
            dataset: ds.clone(),
            variable: "wind_speed".into(),
            date: Some(Utc.with_ymd_and_hms(2012, 10, 29, 6, 0, 0).unwrap()),
        };
        assert_eq!(unit.key(), "1:3:wind_speed:20121029T060000Z");

        let max = IngestUnit {
            dataset: ds,
            variable: "water_level_max".into(),
            date: None,
        };
        assert_eq!(max.to_string(), "1:3:water_level_max:max");
    }
}
