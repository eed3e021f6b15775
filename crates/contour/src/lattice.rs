//! Filled contours on a regular lattice.
//!
//! Every cell is split into four triangles around its center, whose value is
//! the mean of the four corners. The center value settles saddle cells the
//! same way for every band, so neighbouring bands never overlap. Triangle
//! pieces of a band are unioned into polygons with their holes attached,
//! and polygons that touch themselves are split at the touching vertex.

use geo::{unary_union, MultiPolygon, Polygon};
use psa_common::ColorMapName;
use tracing::{debug, instrument};

use crate::band::{build_bands, clip_triangle, orient_ccw, BandGeometry, ContourBand, Node};
use crate::clip::repair_all;
use crate::error::{ContourError, ContourResult};

/// A scalar field on an `nx` x `ny` lattice, row-major (`row * nx + col`).
#[derive(Debug, Clone)]
pub struct LatticeField {
    nx: usize,
    ny: usize,
    xs: Vec<f64>,
    ys: Vec<f64>,
    values: Vec<f64>,
}

impl LatticeField {
    /// Build from 1-D longitude (columns) and latitude (rows) axes.
    pub fn from_axes(lons: &[f64], lats: &[f64], values: Vec<f64>) -> ContourResult<Self> {
        let (nx, ny) = (lons.len(), lats.len());
        let mut xs = Vec::with_capacity(nx * ny);
        let mut ys = Vec::with_capacity(nx * ny);
        for &lat in lats {
            for &lon in lons {
                xs.push(lon);
                ys.push(lat);
            }
        }
        Self::from_grid(nx, ny, xs, ys, values)
    }

    fn from_grid(
        nx: usize,
        ny: usize,
        xs: Vec<f64>,
        ys: Vec<f64>,
        values: Vec<f64>,
    ) -> ContourResult<Self> {
        let n = nx * ny;
        if nx < 2 || ny < 2 {
            return Err(ContourError::InvalidField(format!(
                "lattice must be at least 2x2, got {}x{}",
                nx, ny
            )));
        }
        if xs.len() != n || ys.len() != n || values.len() != n {
            return Err(ContourError::InvalidField(format!(
                "expected {} nodes, got {} x / {} y / {} values",
                n,
                xs.len(),
                ys.len(),
                values.len()
            )));
        }
        Ok(Self {
            nx,
            ny,
            xs,
            ys,
            values,
        })
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.nx, self.ny)
    }

    fn node(&self, id: usize) -> Node {
        Node {
            id,
            x: self.xs[id],
            y: self.ys[id],
            v: self.values[id],
        }
    }

    /// The four center-split triangles of every cell without a null corner.
    fn triangles(&self) -> Vec<[Node; 3]> {
        let mut out = Vec::with_capacity((self.nx - 1) * (self.ny - 1) * 4);
        let n_nodes = self.nx * self.ny;

        for row in 0..self.ny - 1 {
            for col in 0..self.nx - 1 {
                let tl = self.node(row * self.nx + col);
                let tr = self.node(row * self.nx + col + 1);
                let br = self.node((row + 1) * self.nx + col + 1);
                let bl = self.node((row + 1) * self.nx + col);
                let corners = [tl, tr, br, bl];
                if corners.iter().any(|c| c.v.is_nan()) {
                    continue;
                }

                let center = Node {
                    id: n_nodes + row * (self.nx - 1) + col,
                    x: corners.iter().map(|c| c.x).sum::<f64>() / 4.0,
                    y: corners.iter().map(|c| c.y).sum::<f64>() / 4.0,
                    v: corners.iter().map(|c| c.v).sum::<f64>() / 4.0,
                };

                for i in 0..4 {
                    if let Some(tri) = orient_ccw([corners[i], corners[(i + 1) % 4], center]) {
                        out.push(tri);
                    }
                }
            }
        }
        out
    }
}

/// Filled contour bands over a lattice for the given levels.
#[instrument(skip(field, levels), fields(nx = field.nx, ny = field.ny, bands = levels.len().saturating_sub(1)))]
pub fn contour_lattice(
    field: &LatticeField,
    levels: &[f64],
    color_map: ColorMapName,
) -> Vec<ContourBand> {
    let triangles = field.triangles();
    debug!(triangles = triangles.len(), "Lattice triangulated");

    build_bands(levels, color_map, |band, is_last| {
        let pieces: Vec<Polygon<f64>> = triangles
            .iter()
            .filter_map(|tri| clip_triangle(tri, band, is_last))
            .map(|piece| Polygon::new(piece.ring(), vec![]))
            .collect();

        let merged = if pieces.is_empty() {
            MultiPolygon::new(vec![])
        } else {
            repair_all(unary_union(&pieces))
        };
        BandGeometry::Polygons(merged)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::linear_levels;
    use geo::Area;

    fn ramp(nx: usize, ny: usize) -> LatticeField {
        let lons: Vec<f64> = (0..nx).map(|c| c as f64).collect();
        let lats: Vec<f64> = (0..ny).map(|r| r as f64).collect();
        let values = (0..nx * ny).map(|i| i as f64).collect();
        LatticeField::from_axes(&lons, &lats, values).unwrap()
    }

    #[test]
    fn test_rejects_bad_shapes() {
        assert!(LatticeField::from_axes(&[0.0], &[0.0, 1.0], vec![1.0, 2.0]).is_err());
        assert!(LatticeField::from_axes(&[0.0, 1.0], &[0.0, 1.0], vec![1.0]).is_err());
    }

    #[test]
    fn test_bands_cover_valid_area() {
        let field = ramp(4, 4);
        let bands = contour_lattice(&field, &linear_levels(0.0, 15.0, 10), ColorMapName::Blues);
        assert_eq!(bands.len(), 10);

        let total: f64 = bands
            .iter()
            .map(|b| match &b.geometry {
                BandGeometry::Polygons(mp) => mp.unsigned_area(),
                BandGeometry::Rings(_) => 0.0,
            })
            .sum();
        assert!((total - 9.0).abs() < 1e-6, "total area {}", total);
    }

    #[test]
    fn test_null_corner_skips_cell() {
        let mut values: Vec<f64> = (0..9).map(|i| i as f64).collect();
        values[0] = f64::NAN;
        let field = LatticeField::from_axes(&[0.0, 1.0, 2.0], &[0.0, 1.0, 2.0], values).unwrap();
        let bands = contour_lattice(&field, &linear_levels(1.0, 8.0, 4), ColorMapName::Reds);

        let total: f64 = bands
            .iter()
            .map(|b| match &b.geometry {
                BandGeometry::Polygons(mp) => mp.unsigned_area(),
                BandGeometry::Rings(_) => 0.0,
            })
            .sum();
        assert!((total - 3.0).abs() < 1e-6, "total area {}", total);
    }

    #[test]
    fn test_descending_latitudes() {
        let values: Vec<f64> = (0..9).map(|i| i as f64).collect();
        let field = LatticeField::from_axes(&[0.0, 1.0, 2.0], &[2.0, 1.0, 0.0], values).unwrap();
        let bands = contour_lattice(&field, &linear_levels(0.0, 8.0, 2), ColorMapName::Greens);
        for band in &bands {
            assert!(!band.geometry.is_empty());
        }
    }
}
