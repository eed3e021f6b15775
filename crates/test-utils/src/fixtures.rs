//! Common fixtures: storm boundaries, PSA dates and in-memory datasets.

use chrono::{DateTime, Duration, TimeZone, Utc};
use geo::{LineString, Polygon};
use netcdf_parser::MemoryDataset;
use psa_common::StormContext;

use crate::generators::{LatticeData, MeshData};

/// Reference time every fixture time axis counts hours from.
pub const TIME_UNITS: &str = "hours since 2012-10-29 00:00:00";

/// The reference time of [`TIME_UNITS`].
pub fn reference_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2012, 10, 29, 0, 0, 0)
        .single()
        .expect("valid reference time")
}

/// `reference_time() + hours` for each entry.
pub fn dates_at(hours: &[f64]) -> Vec<DateTime<Utc>> {
    hours
        .iter()
        .map(|h| reference_time() + Duration::minutes((h * 60.0).round() as i64))
        .collect()
}

/// Axis-aligned rectangle as a counter-clockwise polygon.
pub fn rect_boundary(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Polygon<f64> {
    Polygon::new(
        LineString::from(vec![
            (min_x, min_y),
            (max_x, min_y),
            (max_x, max_y),
            (min_x, max_y),
            (min_x, min_y),
        ]),
        vec![],
    )
}

/// A storm whose boundary comfortably covers every generator's extent.
pub fn storm(dates: Vec<DateTime<Utc>>) -> StormContext {
    StormContext {
        name: "Sandy".to_string(),
        boundary: rect_boundary(-1000.0, -1000.0, 1000.0, 1000.0),
        dates,
    }
}

/// A lattice dataset with `time`, `lat` and `lon` axes.
///
/// Each name in `time_series` gets a `(time, lat, lon)` variable whose step
/// `t` equals the lattice values plus `t`; each name in `max_values` gets a
/// `(lat, lon)` variable equal to the lattice values.
pub fn structured_dataset(
    field: &LatticeData,
    hours: &[f64],
    time_series: &[&str],
    max_values: &[&str],
) -> MemoryDataset {
    let mut ds = MemoryDataset::new()
        .dimension("time", hours.len())
        .dimension("lat", field.ny())
        .dimension("lon", field.nx())
        .variable("time", &["time"], hours.to_vec())
        .attribute("time", "units", TIME_UNITS)
        .attribute("time", "standard_name", "time")
        .variable("lat", &["lat"], field.lats.clone())
        .attribute("lat", "units", "degrees_north")
        .variable("lon", &["lon"], field.lons.clone())
        .attribute("lon", "units", "degrees_east")
        .global_attribute("title", "synthetic lattice");

    for name in time_series {
        let values = (0..hours.len())
            .flat_map(|t| field.values.iter().map(move |v| v + t as f64))
            .collect();
        ds = ds
            .variable(name, &["time", "lat", "lon"], values)
            .attribute(name, "units", "m");
    }
    for name in max_values {
        ds = ds
            .variable(name, &["lat", "lon"], field.values.clone())
            .attribute(name, "units", "m");
    }
    ds
}

/// A mesh dataset in the ADCIRC layout: node coordinates `lon`/`lat`,
/// connectivity `element` with a `start_index` attribute.
///
/// Time-series variables repeat the mesh values at every step; max-value
/// variables are stored without a time dimension.
pub fn unstructured_dataset(
    mesh: &MeshData,
    hours: &[f64],
    time_series: &[&str],
    max_values: &[&str],
) -> MemoryDataset {
    let mut ds = MemoryDataset::new()
        .dimension("time", hours.len())
        .dimension("node", mesh.xs.len())
        .dimension("nele", mesh.triangle_count())
        .dimension("nvertex", 3)
        .variable("time", &["time"], hours.to_vec())
        .attribute("time", "units", TIME_UNITS)
        .variable("lon", &["node"], mesh.xs.clone())
        .variable("lat", &["node"], mesh.ys.clone())
        .variable(
            "element",
            &["nele", "nvertex"],
            mesh.connectivity.iter().map(|&i| i as f64).collect(),
        )
        .attribute("element", "start_index", mesh.start_index as f64)
        .attribute("element", "cf_role", "face_node_connectivity")
        .global_attribute("model", "ADCIRC");

    for name in time_series {
        let values = (0..hours.len()).flat_map(|_| mesh.values.iter().copied()).collect();
        ds = ds
            .variable(name, &["time", "node"], values)
            .attribute(name, "coordinates", "time lat lon")
            .attribute(name, "units", "m");
    }
    for name in max_values {
        ds = ds
            .variable(name, &["node"], mesh.values.clone())
            .attribute(name, "coordinates", "lat lon")
            .attribute(name, "units", "m");
    }
    ds
}
