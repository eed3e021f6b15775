//! Contour level selection.

/// One contour band: the closed value interval `[lower, upper]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    /// Position of the band, 0 for the lowest.
    pub index: usize,
    pub lower: f64,
    pub upper: f64,
}

impl Band {
    /// Whether a value falls inside this band.
    pub fn contains(&self, v: f64) -> bool {
        v >= self.lower && v <= self.upper
    }
}

/// Minimum and maximum of the non-null values.
pub fn value_range(values: &[f64]) -> Option<(f64, f64)> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// `band_count + 1` level boundaries spaced linearly from `min` to `max`.
///
/// A constant field yields a single degenerate band `[min, min]`.
pub fn linear_levels(min: f64, max: f64, band_count: usize) -> Vec<f64> {
    if band_count == 0 || !min.is_finite() || !max.is_finite() || max < min {
        return vec![];
    }
    if max == min {
        return vec![min, max];
    }

    let step = (max - min) / band_count as f64;
    (0..=band_count)
        .map(|i| if i == band_count { max } else { min + step * i as f64 })
        .collect()
}

/// Bands between consecutive levels.
pub fn bands(levels: &[f64]) -> Vec<Band> {
    levels
        .windows(2)
        .enumerate()
        .map(|(index, pair)| Band {
            index,
            lower: pair[0],
            upper: pair[1],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_levels() {
        let levels = linear_levels(0.0, 15.0, 10);
        assert_eq!(levels.len(), 11);
        assert_eq!(levels[0], 0.0);
        assert!((levels[1] - 1.5).abs() < 1e-12);
        assert_eq!(levels[10], 15.0);
    }

    #[test]
    fn test_linear_levels_degenerate() {
        assert_eq!(linear_levels(2.0, 2.0, 25), vec![2.0, 2.0]);
        assert!(linear_levels(0.0, 1.0, 0).is_empty());
        assert!(linear_levels(1.0, 0.0, 5).is_empty());
        assert!(linear_levels(f64::NAN, 1.0, 5).is_empty());
    }

    #[test]
    fn test_value_range_ignores_nulls() {
        assert_eq!(value_range(&[f64::NAN, 3.0, -1.0, 2.0]), Some((-1.0, 3.0)));
        assert_eq!(value_range(&[f64::NAN]), None);
        assert_eq!(value_range(&[]), None);
    }

    #[test]
    fn test_bands() {
        let b = bands(&[0.0, 1.0, 2.0]);
        assert_eq!(b.len(), 2);
        assert_eq!(b[1].index, 1);
        assert!(b[1].contains(2.0));
        assert!(!b[0].contains(1.5));
    }
}
