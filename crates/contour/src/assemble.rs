//! Polygon assembly from unordered rings.
//!
//! The mesh path yields a band as a flat set of rings. Assembly gives every
//! exterior the holes it directly contains:
//!
//! 1. Rings with non-negative signed area are exteriors, the rest interiors.
//! 2. Interiors are visited largest first.
//! 3. Each exterior, in input order, takes every remaining interior it
//!    contains, unless that interior sits inside a hole it has already taken
//!    (a hole of a hole belongs to a different polygon).
//! 4. Taken interiors leave the pool, so no hole is shared by two exteriors.

use geo::{Contains, LineString, Polygon};
use tracing::debug;

use crate::band::{BandGeometry, ContourBand};
use crate::rings::{classify, signed_area, RingKind};

/// Polygons built from one band, plus interiors no exterior claimed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assembly {
    pub polygons: Vec<Polygon<f64>>,
    pub unattached: Vec<LineString<f64>>,
}

/// Assemble polygons-with-holes from a flat list of closed rings.
pub fn assemble_rings(rings: &[LineString<f64>]) -> Assembly {
    let mut exteriors = Vec::new();
    let mut interiors: Vec<(f64, &LineString<f64>)> = Vec::new();
    for ring in rings {
        match classify(ring) {
            RingKind::Exterior => exteriors.push(ring),
            RingKind::Interior => interiors.push((signed_area(ring).abs(), ring)),
        }
    }

    interiors.sort_by(|a, b| b.0.total_cmp(&a.0));
    let mut pool: Vec<Option<&LineString<f64>>> = interiors.into_iter().map(|(_, r)| Some(r)).collect();

    let mut polygons = Vec::with_capacity(exteriors.len());
    for exterior in exteriors {
        let shell = Polygon::new(exterior.clone(), vec![]);
        let mut holes: Vec<Polygon<f64>> = Vec::new();

        for slot in pool.iter_mut() {
            let Some(interior) = *slot else {
                continue;
            };
            if !shell.contains(interior) {
                continue;
            }
            if holes.iter().any(|hole| hole.contains(interior)) {
                continue;
            }
            holes.push(Polygon::new(interior.clone(), vec![]));
            *slot = None;
        }

        polygons.push(Polygon::new(
            exterior.clone(),
            holes.into_iter().map(|h| h.into_inner().0).collect(),
        ));
    }

    let unattached: Vec<LineString<f64>> = pool.into_iter().flatten().cloned().collect();
    if !unattached.is_empty() {
        debug!(count = unattached.len(), "Interior rings left without an exterior");
    }

    Assembly {
        polygons,
        unattached,
    }
}

impl ContourBand {
    /// Polygons of this band regardless of which contour path produced it.
    pub fn assemble(&self) -> Assembly {
        match &self.geometry {
            BandGeometry::Polygons(mp) => Assembly {
                polygons: mp.0.clone(),
                unattached: Vec::new(),
            },
            BandGeometry::Rings(rings) => assemble_rings(rings),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, size: f64, ccw: bool) -> LineString<f64> {
        let mut pts = vec![
            (x0, y0),
            (x0 + size, y0),
            (x0 + size, y0 + size),
            (x0, y0 + size),
            (x0, y0),
        ];
        if !ccw {
            pts.reverse();
        }
        LineString::from(pts)
    }

    #[test]
    fn test_single_exterior() {
        let result = assemble_rings(&[square(0.0, 0.0, 1.0, true)]);
        assert_eq!(result.polygons.len(), 1);
        assert!(result.polygons[0].interiors().is_empty());
        assert!(result.unattached.is_empty());
    }

    #[test]
    fn test_hole_of_a_hole_not_attached() {
        let outer = square(0.0, 0.0, 10.0, true);
        let hole = square(2.0, 2.0, 6.0, false);
        let nested = square(4.0, 4.0, 2.0, false);

        // Input order deliberately puts the smaller interior first.
        let result = assemble_rings(&[nested.clone(), outer, hole.clone()]);
        assert_eq!(result.polygons.len(), 1);
        assert_eq!(result.polygons[0].interiors().len(), 1);
        assert_eq!(result.polygons[0].interiors()[0], hole);
        assert_eq!(result.unattached, vec![nested]);
    }

    #[test]
    fn test_island_inside_hole_claims_nested_hole() {
        // outer(hole(island(lake)))
        let rings = vec![
            square(0.0, 0.0, 10.0, true),
            square(1.0, 1.0, 8.0, false),
            square(2.0, 2.0, 6.0, true),
            square(4.0, 4.0, 2.0, false),
        ];
        let result = assemble_rings(&rings);
        assert_eq!(result.polygons.len(), 2);
        assert_eq!(result.polygons[0].interiors().len(), 1);
        assert_eq!(result.polygons[1].interiors().len(), 1);
        assert_eq!(result.polygons[1].interiors()[0], rings[3]);
        assert!(result.unattached.is_empty());
    }

    #[test]
    fn test_holes_not_shared_between_exteriors() {
        let a = square(0.0, 0.0, 10.0, true);
        let b = square(20.0, 0.0, 10.0, true);
        let hole_a = square(2.0, 2.0, 2.0, false);
        let hole_b = square(22.0, 2.0, 2.0, false);
        let result = assemble_rings(&[a, b, hole_b, hole_a.clone()]);
        assert_eq!(result.polygons.len(), 2);
        assert_eq!(result.polygons[0].interiors(), &[hole_a][..]);
        assert_eq!(result.polygons[1].interiors().len(), 1);
    }

    #[test]
    fn test_orphan_interior_reported() {
        let result = assemble_rings(&[square(50.0, 50.0, 1.0, false)]);
        assert!(result.polygons.is_empty());
        assert_eq!(result.unattached.len(), 1);
    }
}
