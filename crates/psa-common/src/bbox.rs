//! Bounding box types used for spatial queries against stored records.

use geo::{BoundingRect, Polygon};
use serde::{Deserialize, Serialize};

/// A geographic bounding box in WGS84 degrees (lon/lat).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Parse a "minx,miny,maxx,maxy" string.
    pub fn parse(s: &str) -> Result<Self, BboxParseError> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(BboxParseError::InvalidFormat(s.to_string()));
        }

        let mut values = [0.0f64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| BboxParseError::InvalidNumber(part.to_string()))?;
        }

        let [min_x, min_y, max_x, max_y] = values;
        if min_x > max_x || min_y > max_y {
            return Err(BboxParseError::InvalidFormat(s.to_string()));
        }
        Ok(Self::new(min_x, min_y, max_x, max_y))
    }

    /// Bounding rectangle of a polygon, `None` for an empty polygon.
    pub fn of_polygon(polygon: &Polygon<f64>) -> Option<Self> {
        polygon
            .bounding_rect()
            .map(|r| Self::new(r.min().x, r.min().y, r.max().x, r.max().y))
    }

    /// Width of the bounding box in coordinate units.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the bounding box in coordinate units.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Check if this bbox intersects another. Touching edges count.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Check if a point is contained within this bbox.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Grow this bbox to cover another one.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BboxParseError {
    #[error("Invalid bounding box: {0}. Expected 'minx,miny,maxx,maxy'")]
    InvalidFormat(String),

    #[error("Invalid number in bounding box: {0}")]
    InvalidNumber(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    #[test]
    fn test_parse_bbox() {
        let bbox = BoundingBox::parse("-98.0, 18.0, -80.0, 31.0").unwrap();
        assert_eq!(bbox.min_x, -98.0);
        assert_eq!(bbox.min_y, 18.0);
        assert_eq!(bbox.max_x, -80.0);
        assert_eq!(bbox.max_y, 31.0);
    }

    #[test]
    fn test_parse_rejects_inverted() {
        assert!(BoundingBox::parse("10,0,0,10").is_err());
        assert!(BoundingBox::parse("0,0,10").is_err());
        assert!(BoundingBox::parse("a,0,1,1").is_err());
    }

    #[test]
    fn test_intersects_and_union() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 5.0, 15.0, 15.0);
        let c = BoundingBox::new(20.0, 20.0, 30.0, 30.0);

        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));

        let u = a.union(&c);
        assert_eq!(u, BoundingBox::new(0.0, 0.0, 30.0, 30.0));
    }

    #[test]
    fn test_of_polygon() {
        let p = polygon![(x: 1.0, y: 2.0), (x: 4.0, y: 2.0), (x: 4.0, y: 6.0), (x: 1.0, y: 2.0)];
        let bbox = BoundingBox::of_polygon(&p).unwrap();
        assert_eq!(bbox, BoundingBox::new(1.0, 2.0, 4.0, 6.0));
    }
}
