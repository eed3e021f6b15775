//! Filled contours on an unstructured triangular mesh.

use psa_common::ColorMapName;
use tracing::{debug, instrument};

use crate::band::{build_bands, clip_triangle, orient_ccw, BandGeometry, ContourBand, Node};
use crate::error::{ContourError, ContourResult};
use crate::rings::trace_rings;

/// A per-node scalar field over a triangulation.
#[derive(Debug, Clone)]
pub struct MeshField {
    xs: Vec<f64>,
    ys: Vec<f64>,
    values: Vec<f64>,
    triangles: Vec<[usize; 3]>,
}

impl MeshField {
    /// Build from node coordinates, node values and flat connectivity
    /// (three node indices per triangle, counted from `start_index`).
    pub fn from_connectivity(
        xs: Vec<f64>,
        ys: Vec<f64>,
        values: Vec<f64>,
        connectivity: &[i64],
        start_index: i64,
    ) -> ContourResult<Self> {
        let n = xs.len();
        if ys.len() != n || values.len() != n {
            return Err(ContourError::InvalidField(format!(
                "{} x / {} y / {} values",
                n,
                ys.len(),
                values.len()
            )));
        }
        if connectivity.len() % 3 != 0 {
            return Err(ContourError::InvalidConnectivity(format!(
                "{} indices is not a whole number of triangles",
                connectivity.len()
            )));
        }

        let triangles = connectivity
            .chunks_exact(3)
            .enumerate()
            .map(|(element, chunk)| {
                let mut tri = [0usize; 3];
                for (slot, &raw) in tri.iter_mut().zip(chunk) {
                    let idx = raw - start_index;
                    if idx < 0 || idx as usize >= n {
                        return Err(ContourError::InvalidConnectivity(format!(
                            "element {} references node {} (start index {}, {} nodes)",
                            element, raw, start_index, n
                        )));
                    }
                    *slot = idx as usize;
                }
                Ok(tri)
            })
            .collect::<ContourResult<Vec<_>>>()?;

        Ok(Self {
            xs,
            ys,
            values,
            triangles,
        })
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    pub fn node_count(&self) -> usize {
        self.xs.len()
    }

    /// `true` for every triangle with a null vertex.
    pub fn mask(&self) -> Vec<bool> {
        self.triangles
            .iter()
            .map(|tri| tri.iter().any(|&i| self.values[i].is_nan()))
            .collect()
    }
}

/// Filled contour bands over a mesh for the given levels.
///
/// Triangles with a null vertex are masked out; remaining nulls are then
/// replaced by `null_fill` so no band computation ever sees a missing value.
#[instrument(skip(field, levels), fields(nodes = field.node_count(), bands = levels.len().saturating_sub(1)))]
pub fn contour_mesh(
    field: &MeshField,
    levels: &[f64],
    color_map: ColorMapName,
    null_fill: f64,
) -> Vec<ContourBand> {
    let mask = field.mask();
    let filled: Vec<f64> = field
        .values
        .iter()
        .map(|&v| if v.is_nan() { null_fill } else { v })
        .collect();

    let triangles: Vec<[Node; 3]> = field
        .triangles
        .iter()
        .zip(&mask)
        .filter(|(_, masked)| !**masked)
        .filter_map(|(tri, _)| {
            orient_ccw(tri.map(|id| Node {
                id,
                x: field.xs[id],
                y: field.ys[id],
                v: filled[id],
            }))
        })
        .collect();

    debug!(
        triangles = triangles.len(),
        masked = mask.iter().filter(|m| **m).count(),
        "Mesh masked"
    );

    build_bands(levels, color_map, |band, is_last| {
        let pieces: Vec<_> = triangles
            .iter()
            .filter_map(|tri| clip_triangle(tri, band, is_last))
            .collect();
        BandGeometry::Rings(trace_rings(&pieces))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::linear_levels;

    #[test]
    fn test_connectivity_one_based() {
        let field = MeshField::from_connectivity(
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
            vec![1.0, 2.0, 3.0],
            &[1, 2, 3],
            1,
        )
        .unwrap();
        assert_eq!(field.triangles(), &[[0, 1, 2]]);
    }

    #[test]
    fn test_connectivity_out_of_range() {
        let result = MeshField::from_connectivity(
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
            vec![1.0, 2.0, 3.0],
            &[0, 1, 3],
            0,
        );
        assert!(matches!(result, Err(ContourError::InvalidConnectivity(_))));

        let ragged = MeshField::from_connectivity(vec![0.0], vec![0.0], vec![0.0], &[0, 0], 0);
        assert!(ragged.is_err());
    }

    #[test]
    fn test_mask() {
        let field = MeshField::from_connectivity(
            vec![0.0, 1.0, 0.0, 1.0],
            vec![0.0, 0.0, 1.0, 1.0],
            vec![1.0, 2.0, f64::NAN, 4.0],
            &[0, 1, 3, 0, 3, 2],
            0,
        )
        .unwrap();
        assert_eq!(field.mask(), vec![false, true]);
    }

    #[test]
    fn test_single_triangle_bands() {
        let field = MeshField::from_connectivity(
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
            vec![0.0, 10.0, 0.0],
            // clockwise on purpose
            &[0, 2, 1],
            0,
        )
        .unwrap();
        let bands = contour_mesh(&field, &linear_levels(0.0, 10.0, 5), ColorMapName::Blues, -9999.0);
        assert_eq!(bands.len(), 5);
        for band in &bands {
            match &band.geometry {
                BandGeometry::Rings(rings) => {
                    assert_eq!(rings.len(), 1);
                    assert!(crate::rings::signed_area(&rings[0]) > 0.0);
                }
                BandGeometry::Polygons(_) => panic!("mesh path yields rings"),
            }
        }
    }
}
