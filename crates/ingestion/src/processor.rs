//! Per-unit ingestion pipeline and whole-PSA runs.
//!
//! A unit goes through validation, contouring, clipping and loading. The
//! CPU-bound part (dataset read, contouring, clipping) runs on the blocking
//! pool with its own read-only dataset handle; only store writes happen on
//! the async side.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use geo::{MultiPolygon, Point, Polygon};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use contour::{clip_to_boundary, levels_for, value_range, ContourBand, ContourError};
use netcdf_parser::DatasetOpener;
use psa_common::{
    Color, ColorScale, DataType, IngestUnit, ManifestDataset, StormContext, VariableCatalog,
    VariableSpec,
};
use storage::{ContourRecord, ResultStore, SampleRecord};

use crate::config::IngestConfig;
use crate::error::{IngestionError, Result};
use crate::field::FieldData;
use crate::metadata::{extract_metadata, variable_metadata, DatasetMetadata};
use crate::plan::{plan_units, PsaManifest};
use crate::samples::extract_samples;
use crate::state::{UnitProgress, UnitState};
use crate::validator::{validate_dataset, validate_psa, PsaValidation};

/// What a loaded unit wrote.
#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub unit: String,
    pub variable_id: i64,
    pub history: Vec<UnitState>,
    /// Bands produced by the contour generator.
    pub bands: usize,
    /// Bands that left no polygon inside the storm boundary.
    pub skipped_bands: usize,
    pub contours: u64,
    pub samples: u64,
}

/// A unit that could not be loaded.
#[derive(Debug, Clone, Serialize)]
pub struct UnitFailure {
    pub unit: String,
    pub attempts: u32,
    pub error: String,
}

/// Result of running a whole PSA locally.
#[derive(Debug, Clone, Serialize)]
pub struct PsaOutcome {
    pub validation: PsaValidation,
    pub loaded: Vec<UnitReport>,
    pub failed: Vec<UnitFailure>,
    pub metadata: BTreeMap<i64, DatasetMetadata>,
}

impl PsaOutcome {
    pub fn success(&self) -> bool {
        self.validation.global.is_empty() && self.failed.is_empty()
    }
}

struct ContourPiece {
    geometry: MultiPolygon<f64>,
    value: f64,
    color: Color,
}

struct ComputedUnit {
    progress: UnitProgress,
    bands: usize,
    skipped_bands: usize,
    pieces: Vec<ContourPiece>,
    samples: Vec<(Point<f64>, f64)>,
    /// Min/max over every time step of the variable.
    range: Option<(f64, f64)>,
    attributes: serde_json::Value,
}

/// Runs ingest units against a result store.
pub struct DatasetProcessor<S> {
    store: Arc<S>,
    opener: Arc<dyn DatasetOpener>,
    catalog: Arc<VariableCatalog>,
    config: IngestConfig,
}

impl<S: ResultStore + 'static> DatasetProcessor<S> {
    pub fn new(
        store: Arc<S>,
        opener: Arc<dyn DatasetOpener>,
        catalog: Arc<VariableCatalog>,
        config: IngestConfig,
    ) -> Self {
        Self {
            store,
            opener,
            catalog,
            config,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn catalog(&self) -> &VariableCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Ingest one unit: validate, contour, clip and replace its records.
    #[instrument(skip(self, unit, storm), fields(unit = %unit, storm = %storm.name))]
    pub async fn ingest_unit(&self, unit: &IngestUnit, storm: &StormContext) -> Result<UnitReport> {
        let spec = self.check_unit(unit)?.clone();

        let computed = {
            let opener = Arc::clone(&self.opener);
            let catalog = Arc::clone(&self.catalog);
            let config = self.config.clone();
            let spec = spec.clone();
            let unit = unit.clone();
            let storm = storm.clone();
            tokio::task::spawn_blocking(move || {
                compute_unit(opener.as_ref(), &catalog, &config, &spec, &unit, &storm)
            })
            .await
            .map_err(|e| IngestionError::Task(e.to_string()))??
        };
        let mut progress = computed.progress;

        let mut variable = self
            .store
            .get_or_create_variable(unit.dataset.psa_id, &spec)
            .await?;

        let contours = if spec.is_contoured() {
            let records: Vec<ContourRecord> = computed
                .pieces
                .into_iter()
                .map(|piece| ContourRecord {
                    variable_id: variable.id,
                    date: unit.date,
                    geometry: piece.geometry,
                    value: piece.value,
                    color: piece.color,
                })
                .collect();
            self.store
                .replace_contours(variable.id, unit.date, &records)
                .await?
        } else {
            0
        };

        let samples: Vec<SampleRecord> = computed
            .samples
            .into_iter()
            .map(|(point, value)| SampleRecord {
                variable_id: variable.id,
                date: unit.date,
                point,
                value,
            })
            .collect();
        let samples = self
            .store
            .replace_samples(variable.id, unit.date, &samples)
            .await?;

        if let (Some(color_map), Some((min, max))) = (spec.color_map, computed.range) {
            if spec.is_contoured() {
                variable.color_bar = ColorScale::build(color_map, min, max, self.config.color_steps);
            }
        }
        variable.metadata = computed.attributes;
        self.store.update_variable(&variable).await?;
        progress.advance(UnitState::Loaded);

        info!(
            variable_id = variable.id,
            bands = computed.bands,
            contours,
            samples,
            "Unit loaded"
        );

        Ok(UnitReport {
            unit: unit.key(),
            variable_id: variable.id,
            history: progress.history().to_vec(),
            bands: computed.bands,
            skipped_bands: computed.skipped_bands,
            contours,
            samples,
        })
    }

    /// Ingest a unit, retrying transient failures per the retry policy.
    pub async fn ingest_with_retry(
        &self,
        unit: &IngestUnit,
        storm: &StormContext,
    ) -> std::result::Result<UnitReport, UnitFailure> {
        let policy = &self.config.retry;
        let mut attempt = 0;
        loop {
            match self.ingest_unit(unit, storm).await {
                Ok(report) => return Ok(report),
                Err(e) if e.is_retryable() && policy.allows_retry(attempt) => {
                    warn!(unit = %unit, attempt, error = %e, "Unit failed, retrying");
                    tokio::time::sleep(policy.delay()).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(unit = %unit, attempt, error = %e, "Unit failed");
                    return Err(UnitFailure {
                        unit: unit.key(),
                        attempts: attempt + 1,
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    /// Extract a dataset's metadata and store it with the dataset.
    #[instrument(skip(self, dataset), fields(dataset = dataset.id))]
    pub async fn process_metadata(&self, dataset: &ManifestDataset) -> Result<DatasetMetadata> {
        let opener = Arc::clone(&self.opener);
        let axes = self.config.axes.clone();
        let path = dataset.path.clone();
        let metadata = tokio::task::spawn_blocking(move || {
            let reader = opener.open(&path)?;
            Ok::<_, IngestionError>(extract_metadata(reader.as_ref(), &axes))
        })
        .await
        .map_err(|e| IngestionError::Task(e.to_string()))??;

        self.store
            .save_dataset_metadata(dataset.id, &metadata.to_json())
            .await?;
        Ok(metadata)
    }

    /// Validate every dataset of a PSA.
    pub async fn validate(&self, manifest: &PsaManifest) -> Result<PsaValidation> {
        let opener = Arc::clone(&self.opener);
        let catalog = Arc::clone(&self.catalog);
        let axes = self.config.axes.clone();
        let manifest = manifest.clone();
        tokio::task::spawn_blocking(move || {
            validate_psa(
                opener.as_ref(),
                &manifest.datasets,
                &catalog,
                &manifest.storm.dates,
                &axes,
            )
        })
        .await
        .map_err(|e| IngestionError::Task(e.to_string()))
    }

    /// Validate a PSA, ingest every unit of its valid datasets with up to
    /// `concurrency` units in flight, then capture dataset metadata.
    #[instrument(skip(self, manifest), fields(storm = %manifest.storm.name))]
    pub async fn run_psa(&self, manifest: &PsaManifest, concurrency: usize) -> Result<PsaOutcome> {
        let validation = self.validate(manifest).await?;
        let valid = validation.valid_datasets();
        let datasets: Vec<ManifestDataset> = manifest
            .datasets
            .iter()
            .filter(|d| valid.contains(&d.id))
            .cloned()
            .collect();

        let units = plan_units(&datasets, &self.catalog, &manifest.storm)?;
        info!(units = units.len(), datasets = datasets.len(), "Planned PSA");

        let results: Vec<_> = stream::iter(units.iter())
            .map(|unit| self.ingest_with_retry(unit, &manifest.storm))
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        let mut loaded = Vec::new();
        let mut failed = Vec::new();
        for result in results {
            match result {
                Ok(report) => loaded.push(report),
                Err(failure) => failed.push(failure),
            }
        }
        loaded.sort_by(|a, b| a.unit.cmp(&b.unit));
        failed.sort_by(|a, b| a.unit.cmp(&b.unit));

        let mut metadata = BTreeMap::new();
        for dataset in &datasets {
            metadata.insert(dataset.id, self.process_metadata(dataset).await?);
        }

        let outcome = PsaOutcome {
            validation,
            loaded,
            failed,
            metadata,
        };
        info!(
            success = outcome.success(),
            loaded = outcome.loaded.len(),
            failed = outcome.failed.len(),
            "PSA ingested"
        );
        Ok(outcome)
    }

    /// Reject units that can never succeed before any work is done.
    fn check_unit(&self, unit: &IngestUnit) -> Result<&VariableSpec> {
        let spec = self
            .catalog
            .get(&unit.variable)
            .ok_or_else(|| IngestionError::UnknownVariable(unit.variable.clone()))?;

        let invalid = |message: &str| IngestionError::InvalidUnit {
            unit: unit.key(),
            message: message.to_string(),
        };
        if !unit.dataset.variables.contains(&unit.variable) {
            return Err(invalid("variable is not listed in the dataset manifest"));
        }
        match (spec.data_type, unit.date) {
            (DataType::TimeSeries, None) => Err(invalid("time-series variable requires a date")),
            (DataType::MaxValues, Some(_)) => Err(invalid("max-value variable takes no date")),
            _ => Ok(spec),
        }
    }
}

/// The blocking part of a unit.
fn compute_unit(
    opener: &dyn DatasetOpener,
    catalog: &VariableCatalog,
    config: &IngestConfig,
    spec: &VariableSpec,
    unit: &IngestUnit,
    storm: &StormContext,
) -> Result<ComputedUnit> {
    let mut progress = UnitProgress::default();
    let reader = opener.open(&unit.dataset.path)?;

    let report = validate_dataset(
        reader.as_ref(),
        &unit.dataset,
        catalog,
        &storm.dates,
        &config.axes,
    );
    if !report.is_valid() {
        return Err(IngestionError::Validation(report));
    }
    progress.advance(UnitState::Validated);

    let field = FieldData::read(
        reader.as_ref(),
        &unit.dataset,
        &unit.variable,
        unit.date,
        &config.axes,
    )?;
    let attributes = variable_metadata(reader.as_ref(), &unit.variable);

    let mut bands = Vec::new();
    let mut range = None;
    if spec.is_contoured() {
        let color_map = spec.color_map.ok_or_else(|| {
            IngestionError::MissingMetadata(format!("color map for {}", spec.name))
        })?;
        range = value_range(&reader.read_values(&unit.variable)?);

        match levels_for(&field.values, config.band_count) {
            Ok(levels) => {
                bands = field.contour(&levels, color_map, config.null_fill_value)?;
            }
            Err(ContourError::EmptyField) => {
                warn!(variable = %spec.name, date = ?unit.date, "Field has no values, nothing to contour");
            }
            Err(e) => return Err(e.into()),
        }
    }
    progress.advance(UnitState::Contoured);

    let (pieces, skipped_bands) = clip_bands(&bands, &storm.boundary);
    progress.advance(UnitState::Clipped);

    let samples = extract_samples(&field, &storm.boundary);
    debug!(
        pieces = pieces.len(),
        samples = samples.len(),
        "Unit computed"
    );

    Ok(ComputedUnit {
        progress,
        bands: bands.len(),
        skipped_bands,
        pieces,
        samples,
        range,
        attributes,
    })
}

/// Assemble, repair and clip every band. Returns the surviving pieces and
/// the number of bands that left nothing.
fn clip_bands(bands: &[ContourBand], boundary: &Polygon<f64>) -> (Vec<ContourPiece>, usize) {
    let mut pieces = Vec::new();
    let mut skipped = 0;

    for band in bands {
        let assembly = band.assemble();
        if !assembly.unattached.is_empty() {
            warn!(
                band = band.index,
                unattached = assembly.unattached.len(),
                "Interior rings without an exterior"
            );
        }
        if assembly.polygons.is_empty() {
            warn!(band = band.index, value = band.value, "Skipping band with no valid polygon");
            skipped += 1;
            continue;
        }

        let before = pieces.len();
        for polygon in &assembly.polygons {
            if let Some(clipped) = clip_to_boundary(polygon, boundary) {
                pieces.push(ContourPiece {
                    geometry: clipped,
                    value: band.value,
                    color: band.color,
                });
            }
        }
        if pieces.len() == before {
            debug!(band = band.index, "Band lies outside the storm boundary");
            skipped += 1;
        }
    }

    (pieces, skipped)
}
