//! Dataset validation.
//!
//! A dataset is ingested only when every check passes. Violations are
//! collected, never short-circuited, so one report lists everything wrong
//! with a file.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{info, instrument, warn};

use netcdf_parser::{DatasetOpener, DatasetReader};
use psa_common::{DataType, ManifestDataset, VariableCatalog};

use crate::config::AxisNames;

/// One failed check.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Violation {
    #[error("dataset could not be opened: {0}")]
    Unreadable(String),

    #[error("missing required coordinate '{0}'")]
    MissingCoordinate(String),

    #[error("manifest variable '{0}' not found in dataset")]
    MissingVariable(String),

    #[error("variable '{0}' is not in the variable catalog")]
    UnknownVariable(String),

    #[error("time axis could not be decoded: {0}")]
    UndecodableTime(String),

    #[error("manifest date {0} not found in dataset")]
    MissingDate(String),

    #[error("structured variable '{variable}' has {found} spatial dimension(s), expected at least 2")]
    TooFewDimensions { variable: String, found: usize },

    #[error("structured variable '{variable}' has spatial dimensions ({}), expected ({})", .found.join(", "), .expected.join(", "))]
    UnexpectedDimensions {
        variable: String,
        found: Vec<String>,
        expected: Vec<String>,
    },

    #[error("topology variable '{0}' missing from dataset")]
    MissingTopology(String),

    #[error("start_index attribute missing from topology variable '{0}'")]
    MissingStartIndex(String),
}

/// Outcome of validating one dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub dataset_id: i64,
    pub path: String,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn messages(&self) -> Vec<String> {
        self.violations.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.messages().join("; "))
    }
}

/// Check an open dataset against its manifest entry and the PSA dates.
pub fn validate_dataset(
    reader: &dyn DatasetReader,
    dataset: &ManifestDataset,
    catalog: &VariableCatalog,
    dates: &[DateTime<Utc>],
    axes: &AxisNames,
) -> ValidationReport {
    let mut violations = Vec::new();

    let coords = reader.coordinate_names();
    for axis in [&axes.time, &axes.lat, &axes.lon] {
        if !coords.contains(axis) {
            violations.push(Violation::MissingCoordinate(axis.clone()));
        }
    }

    let data_vars = reader.data_variable_names();
    for name in &dataset.variables {
        if !data_vars.contains(name) {
            violations.push(Violation::MissingVariable(name.clone()));
        }
        if catalog.get(name).is_none() {
            violations.push(Violation::UnknownVariable(name.clone()));
        }
    }

    if coords.contains(&axes.time) {
        match reader.time_values(&axes.time) {
            Ok(times) => {
                for date in dates {
                    if !times.contains(date) {
                        violations.push(Violation::MissingDate(date.to_rfc3339()));
                    }
                }
            }
            Err(e) => violations.push(Violation::UndecodableTime(e.to_string())),
        }
    }

    if dataset.structured {
        let expected = vec![axes.lat.clone(), axes.lon.clone()];
        for name in &dataset.variables {
            let Some(info) = reader.variable(name) else {
                continue;
            };
            let is_time_series = catalog
                .get(name)
                .is_some_and(|spec| spec.data_type == DataType::TimeSeries);
            let spatial: Vec<String> = info
                .dims
                .iter()
                .filter(|d| **d != axes.time)
                .cloned()
                .collect();
            if spatial.len() < 2 {
                if is_time_series {
                    violations.push(Violation::TooFewDimensions {
                        variable: name.clone(),
                        found: spatial.len(),
                    });
                }
            } else if spatial != expected {
                violations.push(Violation::UnexpectedDimensions {
                    variable: name.clone(),
                    found: spatial,
                    expected: expected.clone(),
                });
            }
        }
    } else {
        match reader.variable(&dataset.topology_name) {
            None => violations.push(Violation::MissingTopology(dataset.topology_name.clone())),
            Some(topology) if topology.attr("start_index").is_none() => {
                violations.push(Violation::MissingStartIndex(dataset.topology_name.clone()))
            }
            Some(_) => {}
        }
    }

    ValidationReport {
        dataset_id: dataset.id,
        path: dataset.path.display().to_string(),
        violations,
    }
}

/// Open and validate one dataset. An unreadable file is a violation.
pub fn validate_path(
    opener: &dyn DatasetOpener,
    dataset: &ManifestDataset,
    catalog: &VariableCatalog,
    dates: &[DateTime<Utc>],
    axes: &AxisNames,
) -> ValidationReport {
    match opener.open(&dataset.path) {
        Ok(reader) => validate_dataset(reader.as_ref(), dataset, catalog, dates, axes),
        Err(e) => ValidationReport {
            dataset_id: dataset.id,
            path: dataset.path.display().to_string(),
            violations: vec![Violation::Unreadable(e.to_string())],
        },
    }
}

/// Validation of every dataset of a PSA.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PsaValidation {
    /// Problems with the PSA as a whole.
    pub global: Vec<String>,
    pub reports: Vec<ValidationReport>,
}

impl PsaValidation {
    pub fn is_valid(&self) -> bool {
        self.global.is_empty() && self.reports.iter().all(ValidationReport::is_valid)
    }

    /// Ids of datasets that passed every check.
    pub fn valid_datasets(&self) -> Vec<i64> {
        self.reports
            .iter()
            .filter(|r| r.is_valid())
            .map(|r| r.dataset_id)
            .collect()
    }

    /// `{"global": [...], "files": {path: [...]}}` listing only failing files.
    pub fn exceptions(&self) -> serde_json::Value {
        let files: BTreeMap<&str, Vec<String>> = self
            .reports
            .iter()
            .filter(|r| !r.is_valid())
            .map(|r| (r.path.as_str(), r.messages()))
            .collect();
        serde_json::json!({ "global": self.global, "files": files })
    }
}

/// Validate every dataset of a PSA.
#[instrument(skip_all, fields(datasets = datasets.len(), dates = dates.len()))]
pub fn validate_psa(
    opener: &dyn DatasetOpener,
    datasets: &[ManifestDataset],
    catalog: &VariableCatalog,
    dates: &[DateTime<Utc>],
    axes: &AxisNames,
) -> PsaValidation {
    let reports: Vec<ValidationReport> = datasets
        .iter()
        .map(|dataset| validate_path(opener, dataset, catalog, dates, axes))
        .collect();

    for report in reports.iter().filter(|r| !r.is_valid()) {
        warn!(path = %report.path, violations = ?report.messages(), "Dataset rejected");
    }

    let mut global = Vec::new();
    if !reports.iter().any(ValidationReport::is_valid) {
        global.push("no valid files found".to_string());
    }

    let validation = PsaValidation { global, reports };
    info!(valid = validation.is_valid(), "PSA validated");
    validation
}

#[cfg(test)]
mod tests {
    use super::*;
    use netcdf_parser::{MemoryDataset, MemoryOpener};
    use test_utils::{dates_at, linear_lattice, strip_mesh, structured_dataset, unstructured_dataset};

    fn lattice_manifest() -> ManifestDataset {
        ManifestDataset::new(1, 1, "/psa/grid.nc", true).with_variables(["water_level"])
    }

    fn mesh_manifest() -> ManifestDataset {
        ManifestDataset::new(2, 1, "/psa/mesh.nc", false).with_variables(["water_level"])
    }

    fn check(ds: &MemoryDataset, manifest: &ManifestDataset, hours: &[f64]) -> ValidationReport {
        validate_dataset(
            ds,
            manifest,
            &VariableCatalog::default(),
            &dates_at(hours),
            &AxisNames::default(),
        )
    }

    #[test]
    fn test_valid_structured() {
        let ds = structured_dataset(&linear_lattice(4, 4), &[0.0, 1.0], &["water_level"], &[]);
        let report = check(&ds, &lattice_manifest(), &[0.0, 1.0]);
        assert!(report.is_valid(), "{}", report);
    }

    #[test]
    fn test_valid_unstructured() {
        let ds = unstructured_dataset(&strip_mesh(None), &[0.0], &["water_level"], &[]);
        let report = check(&ds, &mesh_manifest(), &[0.0]);
        assert!(report.is_valid(), "{}", report);
    }

    #[test]
    fn test_missing_date_and_variable() {
        let ds = structured_dataset(&linear_lattice(4, 4), &[0.0, 1.0], &["wave_height"], &[]);
        let report = check(&ds, &lattice_manifest(), &[0.0, 2.5]);

        assert_eq!(report.violations.len(), 2);
        assert!(matches!(&report.violations[0], Violation::MissingVariable(v) if v == "water_level"));
        assert!(matches!(&report.violations[1], Violation::MissingDate(_)));
    }

    #[test]
    fn test_missing_coordinates() {
        let ds = MemoryDataset::new()
            .dimension("node", 2)
            .variable("water_level", &["node"], vec![1.0, 2.0]);
        let report = check(&ds, &lattice_manifest(), &[]);
        let missing: Vec<_> = report
            .violations
            .iter()
            .filter(|v| matches!(v, Violation::MissingCoordinate(_)))
            .collect();
        assert_eq!(missing.len(), 3);
    }

    #[test]
    fn test_structured_needs_two_spatial_dims() {
        let mesh = strip_mesh(None);
        let ds = unstructured_dataset(&mesh, &[0.0], &["water_level"], &[]);
        let manifest = ManifestDataset::new(2, 1, "/psa/mesh.nc", true).with_variables(["water_level"]);
        let report = check(&ds, &manifest, &[0.0]);
        assert_eq!(
            report.violations,
            vec![Violation::TooFewDimensions {
                variable: "water_level".to_string(),
                found: 1
            }]
        );
    }

    #[test]
    fn test_structured_dimension_order() {
        let lattice = linear_lattice(4, 4);
        let ds = structured_dataset(&lattice, &[0.0], &["water_level"], &[]).variable(
            "water_level",
            &["time", "lon", "lat"],
            lattice.values.clone(),
        );
        let report = check(&ds, &lattice_manifest(), &[0.0]);
        assert_eq!(
            report.violations,
            vec![Violation::UnexpectedDimensions {
                variable: "water_level".to_string(),
                found: vec!["lon".to_string(), "lat".to_string()],
                expected: vec!["lat".to_string(), "lon".to_string()],
            }]
        );
        assert!(report.messages()[0].contains("(lon, lat)"));
    }

    #[test]
    fn test_structured_extra_dimension() {
        let lattice = linear_lattice(4, 4);
        let ds = structured_dataset(&lattice, &[0.0], &["water_level"], &[])
            .dimension("depth", 2)
            .variable(
                "water_level",
                &["time", "depth", "lat", "lon"],
                lattice.values.repeat(2),
            );
        let report = check(&ds, &lattice_manifest(), &[0.0]);
        assert!(matches!(
            &report.violations[..],
            [Violation::UnexpectedDimensions { found, .. }] if found.len() == 3
        ));
    }

    #[test]
    fn test_topology_checks() {
        let ds = unstructured_dataset(&strip_mesh(None), &[0.0], &["water_level"], &[]);
        let manifest = mesh_manifest().with_topology("mesh2d");
        let report = check(&ds, &manifest, &[0.0]);
        assert_eq!(report.violations, vec![Violation::MissingTopology("mesh2d".to_string())]);
    }

    #[test]
    fn test_start_index_checked_only_when_topology_exists() {
        let mesh = strip_mesh(None);
        let ds = MemoryDataset::new()
            .dimension("time", 1)
            .dimension("node", mesh.xs.len())
            .dimension("nele", mesh.triangle_count())
            .dimension("nvertex", 3)
            .variable("time", &["time"], vec![0.0])
            .attribute("time", "units", test_utils::TIME_UNITS)
            .variable("lon", &["node"], mesh.xs.clone())
            .variable("lat", &["node"], mesh.ys.clone())
            .variable(
                "element",
                &["nele", "nvertex"],
                mesh.connectivity.iter().map(|&i| i as f64).collect(),
            )
            .variable("water_level", &["time", "node"], mesh.values.clone())
            .attribute("water_level", "coordinates", "time lat lon");

        let report = check(&ds, &mesh_manifest(), &[0.0]);
        assert_eq!(report.violations, vec![Violation::MissingStartIndex("element".to_string())]);
    }

    #[test]
    fn test_psa_with_no_valid_files() {
        let opener = MemoryOpener::new();
        let validation = validate_psa(
            &opener,
            &[lattice_manifest()],
            &VariableCatalog::default(),
            &[],
            &AxisNames::default(),
        );

        assert!(!validation.is_valid());
        assert_eq!(validation.global, vec!["no valid files found".to_string()]);
        assert!(matches!(validation.reports[0].violations[0], Violation::Unreadable(_)));

        let exceptions = validation.exceptions();
        assert_eq!(exceptions["files"]["/psa/grid.nc"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_psa_partially_valid() {
        let opener = MemoryOpener::new().with(
            "/psa/grid.nc",
            structured_dataset(&linear_lattice(3, 3), &[0.0], &["water_level"], &[]),
        );
        let validation = validate_psa(
            &opener,
            &[lattice_manifest(), mesh_manifest()],
            &VariableCatalog::default(),
            &dates_at(&[0.0]),
            &AxisNames::default(),
        );

        assert!(validation.global.is_empty());
        assert!(!validation.is_valid());
        assert_eq!(validation.valid_datasets(), vec![1]);
    }
}
