//! Ingestion from real NetCDF files on disk.

use std::sync::Arc;

use ingestion::{extract_metadata, AxisNames, DatasetProcessor, IngestConfig, PsaManifest};
use netcdf_parser::{write_netcdf, DatasetOpener, NetCdfOpener};
use psa_common::{ManifestDataset, VariableCatalog};
use storage::{MemoryStore, ResultStore};
use test_utils::{
    dates_at, linear_lattice, require_test_file, storm, strip_mesh, structured_dataset, temp_dir,
    unstructured_dataset,
};

#[tokio::test]
async fn test_psa_from_written_files() {
    let dir = temp_dir();
    let lattice_path = dir.path().join("lattice.nc");
    let mesh_path = dir.path().join("fort.63.nc");
    write_netcdf(
        &structured_dataset(&linear_lattice(4, 4), &[0.0, 1.0], &["wave_height"], &[]),
        &lattice_path,
    )
    .unwrap();
    write_netcdf(
        &unstructured_dataset(&strip_mesh(None), &[0.0, 1.0], &[], &["water_level_max"]),
        &mesh_path,
    )
    .unwrap();

    let store = Arc::new(MemoryStore::new());
    let processor = DatasetProcessor::new(
        Arc::clone(&store),
        Arc::new(NetCdfOpener),
        Arc::new(VariableCatalog::default()),
        IngestConfig {
            band_count: 5,
            ..IngestConfig::default()
        },
    );
    let manifest = PsaManifest {
        storm: storm(dates_at(&[0.0, 1.0])),
        datasets: vec![
            ManifestDataset::new(1, 3, &lattice_path, true).with_variables(["wave_height"]),
            ManifestDataset::new(2, 3, &mesh_path, false).with_variables(["water_level_max"]),
        ],
    };

    let outcome = processor.run_psa(&manifest, 2).await.unwrap();
    assert!(outcome.validation.is_valid(), "{}", outcome.validation.exceptions());
    assert!(outcome.success());
    // Two dates of wave height plus one max-value unit
    assert_eq!(outcome.loaded.len(), 3);
    assert!(outcome.loaded.iter().all(|r| r.contours > 0));

    let mesh_meta = store.dataset_metadata(2).await.unwrap().unwrap();
    assert_eq!(mesh_meta["meta"]["model"], "ADCIRC");
}

#[test]
fn test_real_storm_output_metadata() {
    let path = require_test_file!("fort.63.nc");
    let reader = NetCdfOpener.open(&path).unwrap();
    let metadata = extract_metadata(reader.as_ref(), &AxisNames::default());
    assert!(metadata.meta.is_object());
}
