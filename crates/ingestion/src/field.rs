//! Scalar fields read from a dataset for one unit.

use chrono::{DateTime, Utc};
use geo::Point;
use tracing::debug;

use contour::{contour_lattice, contour_mesh, ContourBand, LatticeField, MeshField};
use netcdf_parser::{AttrValue, DatasetReader};
use psa_common::{ColorMapName, ManifestDataset};

use crate::config::AxisNames;
use crate::error::{IngestionError, Result};

/// How the nodes of a field are arranged.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldLayout {
    /// `xs` is the longitude axis, `ys` the latitude axis, values are
    /// row-major `(lat, lon)`.
    Lattice,
    /// `xs`/`ys` are per-node coordinates; triangles come from the
    /// topology variable.
    Mesh {
        connectivity: Vec<i64>,
        start_index: i64,
    },
}

/// One time step (or the snapshot) of a variable with its coordinates.
#[derive(Debug, Clone)]
pub struct FieldData {
    pub layout: FieldLayout,
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
    pub values: Vec<f64>,
}

impl FieldData {
    /// Read `variable` from `reader`.
    ///
    /// With a date, the time step that exactly matches it is read. Without
    /// one, the first time step is used if the variable has a time
    /// dimension and the whole variable otherwise.
    pub fn read(
        reader: &dyn DatasetReader,
        dataset: &ManifestDataset,
        variable: &str,
        date: Option<DateTime<Utc>>,
        axes: &AxisNames,
    ) -> Result<Self> {
        let values = read_slice(reader, variable, date, axes)?;
        let xs = reader.read_values(&axes.lon)?;
        let ys = reader.read_values(&axes.lat)?;

        let layout = if dataset.structured {
            check_lattice(reader, variable, values.len(), xs.len(), ys.len(), axes)?;
            FieldLayout::Lattice
        } else {
            let topology = reader.variable(&dataset.topology_name).ok_or_else(|| {
                IngestionError::MissingMetadata(format!(
                    "topology variable '{}'",
                    dataset.topology_name
                ))
            })?;
            let start_index = topology
                .attr("start_index")
                .and_then(AttrValue::as_f64)
                .ok_or_else(|| {
                    IngestionError::MissingMetadata(format!(
                        "start_index on '{}'",
                        dataset.topology_name
                    ))
                })?;
            FieldLayout::Mesh {
                connectivity: reader.read_indices(&dataset.topology_name)?,
                start_index: start_index as i64,
            }
        };

        debug!(
            variable,
            nodes = values.len(),
            nulls = values.iter().filter(|v| v.is_nan()).count(),
            "Field read"
        );
        Ok(Self {
            layout,
            xs,
            ys,
            values,
        })
    }

    /// Filled contour bands for the given levels.
    pub fn contour(
        &self,
        levels: &[f64],
        color_map: ColorMapName,
        null_fill: f64,
    ) -> Result<Vec<ContourBand>> {
        match &self.layout {
            FieldLayout::Lattice => {
                let field = LatticeField::from_axes(&self.xs, &self.ys, self.values.clone())?;
                Ok(contour_lattice(&field, levels, color_map))
            }
            FieldLayout::Mesh {
                connectivity,
                start_index,
            } => {
                let field = MeshField::from_connectivity(
                    self.xs.clone(),
                    self.ys.clone(),
                    self.values.clone(),
                    connectivity,
                    *start_index,
                )?;
                Ok(contour_mesh(&field, levels, color_map, null_fill))
            }
        }
    }

    /// Every node with its value, nulls included.
    pub fn points(&self) -> Box<dyn Iterator<Item = (Point<f64>, f64)> + '_> {
        match self.layout {
            FieldLayout::Lattice => {
                let nx = self.xs.len();
                Box::new(self.values.iter().enumerate().map(move |(i, &v)| {
                    (Point::new(self.xs[i % nx], self.ys[i / nx]), v)
                }))
            }
            FieldLayout::Mesh { .. } => Box::new(
                self.xs
                    .iter()
                    .zip(&self.ys)
                    .zip(&self.values)
                    .map(|((&x, &y), &v)| (Point::new(x, y), v)),
            ),
        }
    }
}

/// A lattice slice must be laid out `(lat, lon)` and hold one value per node.
fn check_lattice(
    reader: &dyn DatasetReader,
    variable: &str,
    count: usize,
    nx: usize,
    ny: usize,
    axes: &AxisNames,
) -> Result<()> {
    let invalid = |message: String| IngestionError::InvalidField {
        variable: variable.to_string(),
        message,
    };
    let info = reader
        .variable(variable)
        .ok_or_else(|| IngestionError::MissingMetadata(format!("variable '{}'", variable)))?;

    let spatial: Vec<&str> = info
        .dims
        .iter()
        .map(String::as_str)
        .filter(|d| *d != axes.time)
        .collect();
    if spatial != [axes.lat.as_str(), axes.lon.as_str()] {
        return Err(invalid(format!(
            "dimensions ({}) are not ({}, {})",
            spatial.join(", "),
            axes.lat,
            axes.lon
        )));
    }
    if count != nx * ny {
        return Err(invalid(format!(
            "{} values for a {}x{} lattice",
            count, nx, ny
        )));
    }
    Ok(())
}

/// Values of one time step of `variable`, or its snapshot when `date` is `None`.
pub fn read_slice(
    reader: &dyn DatasetReader,
    variable: &str,
    date: Option<DateTime<Utc>>,
    axes: &AxisNames,
) -> Result<Vec<f64>> {
    let info = reader.variable(variable).ok_or_else(|| {
        IngestionError::MissingMetadata(format!("variable '{}'", variable))
    })?;
    let has_time = info.dim_index(&axes.time).is_some();

    match date {
        Some(date) => {
            let times = reader.time_values(&axes.time)?;
            let index = times
                .iter()
                .position(|t| *t == date)
                .ok_or_else(|| IngestionError::DateNotFound(date.to_rfc3339()))?;
            if !has_time {
                return Err(IngestionError::InvalidUnit {
                    unit: variable.to_string(),
                    message: "dated unit for a variable without a time dimension".to_string(),
                });
            }
            Ok(reader.read_along(variable, &axes.time, index)?)
        }
        None if has_time => Ok(reader.read_along(variable, &axes.time, 0)?),
        None => Ok(reader.read_values(variable)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contour::levels_for;
    use test_utils::{dates_at, linear_lattice, strip_mesh, structured_dataset, unstructured_dataset};

    #[test]
    fn test_read_time_step() {
        let ds = structured_dataset(&linear_lattice(3, 2), &[0.0, 1.0], &["water_level"], &[]);
        let manifest = ManifestDataset::new(1, 1, "/grid.nc", true);
        let date = dates_at(&[1.0])[0];

        let field = FieldData::read(&ds, &manifest, "water_level", Some(date), &AxisNames::default())
            .unwrap();
        assert_eq!(field.layout, FieldLayout::Lattice);
        // Step 1 is the lattice plus one
        assert_eq!(field.values, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_max_values_use_first_step() {
        let ds = structured_dataset(&linear_lattice(2, 2), &[0.0, 1.0], &["water_level_max"], &[]);
        let values = read_slice(&ds, "water_level_max", None, &AxisNames::default()).unwrap();
        assert_eq!(values, vec![0.0, 1.0, 2.0, 3.0]);

        let ds = structured_dataset(&linear_lattice(2, 2), &[0.0], &[], &["water_level_max"]);
        let values = read_slice(&ds, "water_level_max", None, &AxisNames::default()).unwrap();
        assert_eq!(values, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_unknown_date() {
        let ds = structured_dataset(&linear_lattice(2, 2), &[0.0], &["water_level"], &[]);
        let date = dates_at(&[7.0])[0];
        let result = read_slice(&ds, "water_level", Some(date), &AxisNames::default());
        assert!(matches!(result, Err(IngestionError::DateNotFound(_))));
    }

    #[test]
    fn test_lattice_points_row_major() {
        let ds = structured_dataset(&linear_lattice(3, 2), &[0.0], &[], &["water_level_max"]);
        let manifest = ManifestDataset::new(1, 1, "/grid.nc", true);
        let field =
            FieldData::read(&ds, &manifest, "water_level_max", None, &AxisNames::default()).unwrap();

        let points: Vec<_> = field.points().collect();
        assert_eq!(points.len(), 6);
        assert_eq!(points[4].0, Point::new(field.xs[1], field.ys[1]));
        assert_eq!(points[4].1, 4.0);
    }

    #[test]
    fn test_transposed_lattice_rejected() {
        let lattice = linear_lattice(3, 3);
        let ds = structured_dataset(&lattice, &[0.0], &[], &[]).variable(
            "water_level_max",
            &["lon", "lat"],
            lattice.values.clone(),
        );
        let manifest = ManifestDataset::new(1, 1, "/grid.nc", true);

        let result = FieldData::read(&ds, &manifest, "water_level_max", None, &AxisNames::default());
        assert!(matches!(
            result,
            Err(IngestionError::InvalidField { ref variable, .. }) if variable == "water_level_max"
        ));
    }

    #[test]
    fn test_extra_dimension_rejected_without_panic() {
        let lattice = linear_lattice(3, 2);
        let ds = structured_dataset(&lattice, &[0.0], &[], &[])
            .dimension("depth", 2)
            .variable(
                "water_level",
                &["time", "depth", "lat", "lon"],
                lattice.values.repeat(2),
            );
        let manifest = ManifestDataset::new(1, 1, "/grid.nc", true);
        let date = dates_at(&[0.0])[0];

        let result = FieldData::read(&ds, &manifest, "water_level", Some(date), &AxisNames::default());
        assert!(matches!(result, Err(IngestionError::InvalidField { .. })));
    }

    #[test]
    fn test_mesh_contours() {
        let mesh = strip_mesh(Some(3));
        let ds = unstructured_dataset(&mesh, &[0.0], &["water_level"], &[]);
        let manifest = ManifestDataset::new(2, 1, "/mesh.nc", false);
        let field = FieldData::read(
            &ds,
            &manifest,
            "water_level",
            Some(dates_at(&[0.0])[0]),
            &AxisNames::default(),
        )
        .unwrap();

        assert!(matches!(field.layout, FieldLayout::Mesh { start_index: 1, .. }));
        assert_eq!(field.points().filter(|(_, v)| v.is_nan()).count(), 1);

        let levels = levels_for(&field.values, 4).unwrap();
        let bands = field.contour(&levels, ColorMapName::Blues, -9999.0).unwrap();
        assert_eq!(bands.len(), 4);
    }
}
