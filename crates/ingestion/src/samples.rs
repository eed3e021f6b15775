//! Raw point samples of a field inside the storm boundary.

use geo::{BoundingRect, Contains, Intersects, Point, Polygon};

use crate::field::FieldData;

/// Non-null node values strictly inside `boundary`.
pub fn extract_samples(field: &FieldData, boundary: &Polygon<f64>) -> Vec<(Point<f64>, f64)> {
    let Some(extent) = boundary.bounding_rect() else {
        return Vec::new();
    };

    field
        .points()
        .filter(|(_, value)| !value.is_nan())
        .filter(|(point, _)| extent.intersects(point) && boundary.contains(point))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldLayout;
    use test_utils::rect_boundary;

    fn lattice() -> FieldData {
        FieldData {
            layout: FieldLayout::Lattice,
            xs: vec![0.0, 1.0, 2.0],
            ys: vec![0.0, 1.0],
            values: vec![1.0, f64::NAN, 3.0, 4.0, 5.0, 6.0],
        }
    }

    #[test]
    fn test_nulls_dropped() {
        let samples = extract_samples(&lattice(), &rect_boundary(-1.0, -1.0, 5.0, 5.0));
        assert_eq!(samples.len(), 5);
        assert!(samples.iter().all(|(_, v)| !v.is_nan()));
    }

    #[test]
    fn test_outside_boundary_dropped() {
        let samples = extract_samples(&lattice(), &rect_boundary(0.5, -1.0, 5.0, 0.5));
        let values: Vec<f64> = samples.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![3.0]);
        assert_eq!(samples[0].0, Point::new(2.0, 0.0));
    }

    #[test]
    fn test_points_on_boundary_are_outside() {
        let samples = extract_samples(&lattice(), &rect_boundary(0.0, 0.0, 2.0, 1.0));
        assert!(samples.is_empty());
    }
}
