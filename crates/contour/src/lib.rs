//! Filled contour bands for storm fields.
//!
//! Two contour paths share one triangle clipper:
//!
//! - [`lattice`]: regular grids. Cells are split around their center and the
//!   band pieces are unioned into finished polygons.
//! - [`mesh`]: unstructured triangular meshes with null masking. Band pieces
//!   are merged by cancelling shared edges and traced into an unordered set
//!   of rings, which [`assemble`] turns into polygons with holes.
//!
//! [`clip`] repairs invalid polygons and cuts them to the storm boundary.
//! Bands are computed independently and in parallel.

pub mod assemble;
pub mod band;
pub mod clip;
pub mod error;
pub mod lattice;
pub mod levels;
pub mod mesh;
pub mod rings;

pub use assemble::{assemble_rings, Assembly};
pub use band::{BandGeometry, ContourBand, VertexKey};
pub use clip::{clip_to_boundary, repair, repair_all, split_touching};
pub use error::{ContourError, ContourResult};
pub use lattice::{contour_lattice, LatticeField};
pub use levels::{bands, linear_levels, value_range, Band};
pub use mesh::{contour_mesh, MeshField};
pub use rings::{classify, signed_area, split_pinches, RingKind};

/// Levels for `band_count` bands spanning the non-null values of a field.
pub fn levels_for(values: &[f64], band_count: usize) -> ContourResult<Vec<f64>> {
    let (min, max) = value_range(values).ok_or(ContourError::EmptyField)?;
    Ok(linear_levels(min, max, band_count))
}
