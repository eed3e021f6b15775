//! Splitting a PSA into units of work.

use serde::{Deserialize, Serialize};

use psa_common::{DataType, IngestUnit, ManifestDataset, StormContext, VariableCatalog};

use crate::error::{IngestionError, Result};

/// Everything needed to ingest one PSA: its storm and its dataset files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsaManifest {
    pub storm: StormContext,
    pub datasets: Vec<ManifestDataset>,
}

impl PsaManifest {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| IngestionError::InvalidConfig(format!("Invalid manifest: {}", e)))
    }

    pub fn units(&self, catalog: &VariableCatalog) -> Result<Vec<IngestUnit>> {
        plan_units(&self.datasets, catalog, &self.storm)
    }
}

/// One unit per max-value variable and one per (time-series variable, date).
pub fn plan_units(
    datasets: &[ManifestDataset],
    catalog: &VariableCatalog,
    storm: &StormContext,
) -> Result<Vec<IngestUnit>> {
    let mut units = Vec::new();
    for dataset in datasets {
        for variable in &dataset.variables {
            let spec = catalog
                .get(variable)
                .ok_or_else(|| IngestionError::UnknownVariable(variable.clone()))?;
            match spec.data_type {
                DataType::MaxValues => units.push(IngestUnit {
                    dataset: dataset.clone(),
                    variable: variable.clone(),
                    date: None,
                }),
                DataType::TimeSeries => {
                    units.extend(storm.dates.iter().map(|date| IngestUnit {
                        dataset: dataset.clone(),
                        variable: variable.clone(),
                        date: Some(*date),
                    }));
                }
            }
        }
    }
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{dates_at, storm};

    #[test]
    fn test_plan_units() {
        let storm = storm(dates_at(&[0.0, 1.0, 2.0]));
        let datasets = vec![
            ManifestDataset::new(1, 1, "/psa/fort.63.nc", false)
                .with_variables(["water_level", "water_level_max"]),
            ManifestDataset::new(2, 1, "/psa/wind.nc", true).with_variables(["wind_direction"]),
        ];

        let units = plan_units(&datasets, &VariableCatalog::default(), &storm).unwrap();
        assert_eq!(units.len(), 3 + 1 + 3);
        assert_eq!(units.iter().filter(|u| u.date.is_none()).count(), 1);
        assert!(units
            .iter()
            .filter(|u| u.variable == "wind_direction")
            .all(|u| u.dataset.id == 2 && u.date.is_some()));
    }

    #[test]
    fn test_unknown_variable_rejected() {
        let datasets =
            vec![ManifestDataset::new(1, 1, "/psa/a.nc", true).with_variables(["salinity"])];
        let result = plan_units(&datasets, &VariableCatalog::default(), &storm(vec![]));
        assert!(matches!(result, Err(IngestionError::UnknownVariable(v)) if v == "salinity"));
    }

    #[test]
    fn test_manifest_json() {
        let manifest = PsaManifest {
            storm: storm(dates_at(&[6.0])),
            datasets: vec![ManifestDataset::new(4, 2, "/psa/a.nc", true).with_variables(["wave_height"])],
        };
        let json = serde_json::to_string(&manifest).unwrap();
        let parsed = PsaManifest::from_json(&json).unwrap();
        assert_eq!(parsed, manifest);
        assert_eq!(parsed.units(&VariableCatalog::default()).unwrap().len(), 1);
    }
}
