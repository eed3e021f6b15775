//! Polygon repair and clipping to the storm boundary.

use geo::orient::{Direction, Orient};
use geo::{
    unary_union, Area, BooleanOps, Contains, InteriorPoint, LineString, MultiPolygon, Polygon,
    Validation,
};
use tracing::{debug, warn};

use crate::rings::{signed_area, split_pinches};

/// Rebuild a polygon whose rings touch themselves at a vertex.
///
/// Every ring is split at its repeated vertices. Loops of the exterior that
/// keep its orientation become shells and loops that run against it become
/// holes; the same rule, inverted, applies to each interior. Holes go to the
/// smallest shell that contains them and holes with no shell are dropped.
pub fn split_touching(polygon: &Polygon<f64>) -> Vec<Polygon<f64>> {
    let mut shells: Vec<LineString<f64>> = Vec::new();
    let mut holes: Vec<LineString<f64>> = Vec::new();

    let mut sort_loops = |ring: &LineString<f64>, is_exterior: bool| {
        let sign = signed_area(ring).signum();
        for part in split_pinches(ring) {
            let same = signed_area(&part).signum() == sign;
            if same == is_exterior {
                shells.push(part);
            } else {
                holes.push(part);
            }
        }
    };
    sort_loops(polygon.exterior(), true);
    for interior in polygon.interiors() {
        sort_loops(interior, false);
    }

    let mut shells: Vec<(f64, Polygon<f64>, Vec<LineString<f64>>)> = shells
        .into_iter()
        .map(|ring| {
            let shell = Polygon::new(ring, vec![]);
            (shell.unsigned_area(), shell, Vec::new())
        })
        .collect();
    shells.sort_by(|a, b| a.0.total_cmp(&b.0));

    for hole in holes {
        let Some(inside) = Polygon::new(hole.clone(), vec![]).interior_point() else {
            continue;
        };
        match shells.iter_mut().find(|(_, shell, _)| shell.contains(&inside)) {
            Some((_, _, owned)) => owned.push(hole),
            None => debug!(vertices = hole.0.len(), "Dropping hole outside every shell"),
        }
    }

    shells
        .into_iter()
        .map(|(_, shell, owned)| {
            Polygon::new(shell.into_inner().0, owned).orient(Direction::Default)
        })
        .collect()
}

/// Repair an invalid polygon.
///
/// Rings that touch themselves are split first. Whatever is still invalid,
/// such as a bow-tie, is unioned with itself. Parts that cannot be made
/// valid are dropped. Valid polygons are returned as they are.
pub fn repair(polygon: &Polygon<f64>) -> MultiPolygon<f64> {
    if polygon.is_valid() {
        return MultiPolygon::new(vec![polygon.clone()]);
    }
    debug!(
        vertices = polygon.exterior().0.len(),
        holes = polygon.interiors().len(),
        "Repairing invalid polygon"
    );

    let mut repaired = Vec::new();
    for part in split_touching(polygon) {
        if part.is_valid() {
            repaired.push(part);
            continue;
        }
        let unioned = unary_union([&part]);
        for piece in unioned {
            repaired.extend(split_touching(&piece).into_iter().filter(|p| p.is_valid()));
        }
    }
    if repaired.is_empty() {
        warn!(
            vertices = polygon.exterior().0.len(),
            "Polygon could not be repaired"
        );
    }
    MultiPolygon::new(repaired)
}

/// Repair every part of a multipolygon, keeping only valid results.
pub fn repair_all(polygons: MultiPolygon<f64>) -> MultiPolygon<f64> {
    if polygons.is_valid() {
        return polygons;
    }
    MultiPolygon::new(polygons.iter().flat_map(|p| repair(p).0).collect())
}

/// Repair `polygon` and intersect it with the storm boundary.
///
/// Returns `None` when nothing of the polygon lies inside the boundary.
/// The result is always valid.
pub fn clip_to_boundary(
    polygon: &Polygon<f64>,
    boundary: &Polygon<f64>,
) -> Option<MultiPolygon<f64>> {
    let repaired = repair(polygon);
    if repaired.0.is_empty() {
        return None;
    }

    let mut clipped = repaired.intersection(boundary);
    if !clipped.is_valid() {
        clipped = MultiPolygon::new(clipped.iter().flat_map(|p| repair(p).0).collect());
        if !clipped.is_valid() {
            warn!(parts = clipped.0.len(), "Clipped polygon is still invalid, dropping it");
            return None;
        }
    }
    if clipped.0.is_empty() || clipped.unsigned_area() <= 0.0 {
        return None;
    }
    Some(clipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, BoundingRect};

    fn boundary() -> Polygon<f64> {
        polygon![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)]
    }

    #[test]
    fn test_outside_is_discarded() {
        let far = polygon![(x: 20.0, y: 20.0), (x: 21.0, y: 20.0), (x: 21.0, y: 21.0)];
        assert!(clip_to_boundary(&far, &boundary()).is_none());
    }

    #[test]
    fn test_inside_unchanged_in_extent() {
        let inner = polygon![(x: 2.0, y: 2.0), (x: 5.0, y: 2.0), (x: 5.0, y: 6.0), (x: 2.0, y: 6.0)];
        let clipped = clip_to_boundary(&inner, &boundary()).unwrap();
        assert!((clipped.unsigned_area() - inner.unsigned_area()).abs() < 1e-9);
        assert_eq!(clipped.bounding_rect(), inner.bounding_rect());
    }

    #[test]
    fn test_partial_overlap_is_cut() {
        let straddling =
            polygon![(x: 8.0, y: 8.0), (x: 12.0, y: 8.0), (x: 12.0, y: 12.0), (x: 8.0, y: 12.0)];
        let clipped = clip_to_boundary(&straddling, &boundary()).unwrap();
        assert!((clipped.unsigned_area() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_bow_tie_repaired() {
        let bow_tie = polygon![(x: 1.0, y: 1.0), (x: 3.0, y: 3.0), (x: 3.0, y: 1.0), (x: 1.0, y: 3.0)];
        assert!(!bow_tie.is_valid());

        let repaired = repair(&bow_tie);
        assert!(repaired.is_valid());
        assert_eq!(repaired.0.len(), 2);
        assert!((repaired.unsigned_area() - 2.0).abs() < 1e-9);

        let clipped = clip_to_boundary(&bow_tie, &boundary()).unwrap();
        assert!(clipped.is_valid());
    }

    #[test]
    fn test_exterior_touching_itself_splits_into_shells() {
        // Two unit squares joined at the corner (1, 1) in one ring.
        let pinched = polygon![
            (x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 2.0, y: 1.0),
            (x: 2.0, y: 2.0), (x: 1.0, y: 2.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)
        ];
        assert!(!pinched.is_valid());

        let repaired = repair(&pinched);
        assert!(repaired.is_valid());
        assert_eq!(repaired.0.len(), 2);
        assert!((repaired.unsigned_area() - 2.0).abs() < 1e-9);

        let clipped = clip_to_boundary(&pinched, &boundary()).unwrap();
        assert!(clipped.is_valid());
        assert!((clipped.unsigned_area() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_exterior_touching_itself_around_hole() {
        // The boundary walks into the square and around a notch, enclosing
        // the unit square at (1, 2) as a hole pinned to (2, 2).
        let pinched = polygon![
            (x: 0.0, y: 0.0), (x: 4.0, y: 0.0), (x: 4.0, y: 4.0), (x: 2.0, y: 4.0),
            (x: 2.0, y: 2.0), (x: 1.0, y: 2.0), (x: 1.0, y: 3.0), (x: 2.0, y: 3.0),
            (x: 2.0, y: 2.0), (x: 2.0, y: 4.0), (x: 0.0, y: 4.0)
        ];
        assert!(!pinched.is_valid());

        let repaired = repair(&pinched);
        assert!(repaired.is_valid());
        assert_eq!(repaired.0.len(), 1);
        assert_eq!(repaired.0[0].interiors().len(), 1);
        assert!((repaired.unsigned_area() - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_hole_touching_itself_splits_into_holes() {
        let shell = LineString::from(vec![(0.0, 0.0), (6.0, 0.0), (6.0, 6.0), (0.0, 6.0), (0.0, 0.0)]);
        // Two clockwise holes joined at (3, 3).
        let hole = LineString::from(vec![
            (2.0, 2.0), (2.0, 3.0), (3.0, 3.0), (3.0, 4.0), (4.0, 4.0), (4.0, 3.0),
            (3.0, 3.0), (3.0, 2.0), (2.0, 2.0),
        ]);
        let polygon = Polygon::new(shell, vec![hole]);
        assert!(!polygon.is_valid());

        let repaired = repair(&polygon);
        assert!(repaired.is_valid());
        assert_eq!(repaired.0.len(), 1);
        assert_eq!(repaired.0[0].interiors().len(), 2);
        assert!((repaired.unsigned_area() - 34.0).abs() < 1e-9);
    }
}
