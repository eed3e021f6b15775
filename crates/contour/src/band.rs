//! Band output types and the value-space triangle clip both mesh layouts share.
//!
//! Within a triangle the field is linear, so the part of the triangle whose
//! values lie in `[lower, upper]` is a convex polygon. Walking the triangle's
//! edges in order and emitting every vertex inside the band plus every level
//! crossing strictly inside an edge yields that polygon's boundary directly.

use geo::{Coord, LineString, MultiPolygon};
use psa_common::{Color, ColorMapName};
use rayon::prelude::*;

use crate::levels::{bands, Band};

/// Identity of a piece vertex, shared by every triangle that touches it.
///
/// Crossing points are keyed by the undirected mesh edge (lower node id
/// first) and the index of the level they lie on, so two triangles sharing an
/// edge produce identical keys and bit-identical coordinates for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VertexKey {
    Node(usize),
    Crossing { from: usize, to: usize, level: usize },
}

/// A mesh node with its coordinates and field value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Node {
    pub id: usize,
    pub x: f64,
    pub y: f64,
    pub v: f64,
}

/// The part of one triangle that falls inside one band, counter-clockwise.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Piece {
    pub keys: Vec<VertexKey>,
    pub coords: Vec<Coord<f64>>,
}

impl Piece {
    pub fn signed_area(&self) -> f64 {
        let n = self.coords.len();
        (0..n)
            .map(|i| {
                let a = self.coords[i];
                let b = self.coords[(i + 1) % n];
                a.x * b.y - b.x * a.y
            })
            .sum::<f64>()
            / 2.0
    }

    /// Closed exterior ring of this piece.
    pub fn ring(&self) -> LineString<f64> {
        let mut coords = self.coords.clone();
        coords.push(self.coords[0]);
        LineString::new(coords)
    }
}

/// Reorder a triangle counter-clockwise. Degenerate triangles give `None`.
pub(crate) fn orient_ccw(tri: [Node; 3]) -> Option<[Node; 3]> {
    let [a, b, c] = tri;
    let cross = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);
    if cross > 0.0 {
        Some([a, b, c])
    } else if cross < 0.0 {
        Some([a, c, b])
    } else {
        None
    }
}

/// Clip a counter-clockwise triangle to one band in value space.
///
/// A flat triangle (all three values equal) belongs to exactly one band: the
/// one whose half-open interval `[lower, upper)` holds its value, or the last
/// band when the value is the field maximum.
pub(crate) fn clip_triangle(tri: &[Node; 3], band: &Band, is_last: bool) -> Option<Piece> {
    let (lo, hi) = (band.lower, band.upper);

    if tri[0].v == tri[1].v && tri[1].v == tri[2].v {
        let c = tri[0].v;
        let owned = (c >= lo && c < hi) || (c == hi && is_last);
        if !owned {
            return None;
        }
        return Some(Piece {
            keys: tri.iter().map(|n| VertexKey::Node(n.id)).collect(),
            coords: tri.iter().map(|n| Coord { x: n.x, y: n.y }).collect(),
        });
    }

    let mut keys = Vec::with_capacity(6);
    let mut coords = Vec::with_capacity(6);

    for i in 0..3 {
        let a = tri[i];
        let b = tri[(i + 1) % 3];

        if band.contains(a.v) {
            keys.push(VertexKey::Node(a.id));
            coords.push(Coord { x: a.x, y: a.y });
        }

        let mut crossings: Vec<(usize, f64)> = Vec::with_capacity(2);
        for (level_index, level) in [(band.index, lo), (band.index + 1, hi)] {
            if crossings.iter().any(|(_, l)| *l == level) {
                continue;
            }
            if (a.v < level && level < b.v) || (b.v < level && level < a.v) {
                crossings.push((level_index, level));
            }
        }
        if a.v > b.v {
            crossings.reverse();
        }

        for (level_index, level) in crossings {
            let (key, coord) = crossing(a, b, level_index, level);
            keys.push(key);
            coords.push(coord);
        }
    }

    let piece = Piece { keys, coords };
    if piece.keys.len() < 3 || piece.signed_area() <= 0.0 {
        return None;
    }
    Some(piece)
}

/// Linear interpolation of a level along an edge, always from the lower node id.
fn crossing(a: Node, b: Node, level_index: usize, level: f64) -> (VertexKey, Coord<f64>) {
    let (p, q) = if a.id < b.id { (a, b) } else { (b, a) };
    let t = (level - p.v) / (q.v - p.v);
    (
        VertexKey::Crossing {
            from: p.id,
            to: q.id,
            level: level_index,
        },
        Coord {
            x: p.x + t * (q.x - p.x),
            y: p.y + t * (q.y - p.y),
        },
    )
}

/// Geometry of one band as produced by a contour path.
#[derive(Debug, Clone, PartialEq)]
pub enum BandGeometry {
    /// Lattice path: polygons with their holes already attached.
    Polygons(MultiPolygon<f64>),
    /// Mesh path: closed rings, exteriors counter-clockwise and holes
    /// clockwise, with no ownership between them.
    Rings(Vec<LineString<f64>>),
}

impl BandGeometry {
    pub fn is_empty(&self) -> bool {
        match self {
            BandGeometry::Polygons(mp) => mp.0.is_empty(),
            BandGeometry::Rings(rings) => rings.is_empty(),
        }
    }
}

/// One colored contour band.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourBand {
    pub index: usize,
    /// The band's lower level, reported as its value.
    pub value: f64,
    pub upper: f64,
    pub color: Color,
    pub geometry: BandGeometry,
}

/// Evaluate every band in parallel and color it by its lower level.
pub(crate) fn build_bands<F>(levels: &[f64], color_map: ColorMapName, geometry: F) -> Vec<ContourBand>
where
    F: Fn(&Band, bool) -> BandGeometry + Sync,
{
    let all = bands(levels);
    let last = all.len().saturating_sub(1);
    let (min, max) = match (levels.first(), levels.last()) {
        (Some(min), Some(max)) => (*min, *max),
        _ => return Vec::new(),
    };
    let colormap = color_map.colormap();

    all.par_iter()
        .map(|band| ContourBand {
            index: band.index,
            value: band.lower,
            upper: band.upper,
            color: colormap.eval_in_range(band.lower, min, max),
            geometry: geometry(band, band.index == last),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: usize, x: f64, y: f64, v: f64) -> Node {
        Node { id, x, y, v }
    }

    fn band(index: usize, lower: f64, upper: f64) -> Band {
        Band { index, lower, upper }
    }

    #[test]
    fn test_orient_ccw() {
        let cw = [node(0, 0.0, 0.0, 0.0), node(1, 0.0, 1.0, 0.0), node(2, 1.0, 0.0, 0.0)];
        let ccw = orient_ccw(cw).unwrap();
        assert_eq!(ccw[1].id, 2);

        let line = [node(0, 0.0, 0.0, 0.0), node(1, 1.0, 1.0, 0.0), node(2, 2.0, 2.0, 0.0)];
        assert!(orient_ccw(line).is_none());
    }

    #[test]
    fn test_triangle_fully_inside() {
        let tri = [node(0, 0.0, 0.0, 1.0), node(1, 1.0, 0.0, 2.0), node(2, 0.0, 1.0, 3.0)];
        let piece = clip_triangle(&tri, &band(0, 0.0, 5.0), true).unwrap();
        assert_eq!(piece.keys.len(), 3);
        assert!((piece.signed_area() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_triangle_slab() {
        // v = 10x on the unit right triangle; band [2, 4] is a trapezoid.
        let tri = [node(0, 0.0, 0.0, 0.0), node(1, 1.0, 0.0, 10.0), node(2, 0.0, 1.0, 0.0)];
        let piece = clip_triangle(&tri, &band(1, 2.0, 4.0), false).unwrap();
        assert_eq!(piece.keys.len(), 4);
        // Area between x=0.2 and x=0.4 under y = 1 - x
        let expected = (0.8 + 0.6) / 2.0 * 0.2;
        assert!((piece.signed_area() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_triangle_outside() {
        let tri = [node(0, 0.0, 0.0, 0.0), node(1, 1.0, 0.0, 1.0), node(2, 0.0, 1.0, 1.0)];
        assert!(clip_triangle(&tri, &band(3, 5.0, 6.0), false).is_none());
    }

    #[test]
    fn test_touching_vertex_is_dropped() {
        let tri = [node(0, 0.0, 0.0, 2.0), node(1, 1.0, 0.0, 5.0), node(2, 0.0, 1.0, 5.0)];
        assert!(clip_triangle(&tri, &band(0, 0.0, 2.0), false).is_none());
    }

    #[test]
    fn test_shared_edge_crossings_match() {
        let a = node(4, 0.0, 0.0, 0.0);
        let b = node(9, 1.0, 1.0, 10.0);
        let (k1, c1) = crossing(a, b, 2, 3.3);
        let (k2, c2) = crossing(b, a, 2, 3.3);
        assert_eq!(k1, k2);
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_flat_triangle_single_owner() {
        let tri = [node(0, 0.0, 0.0, 1.0), node(1, 1.0, 0.0, 1.0), node(2, 0.0, 1.0, 1.0)];
        assert!(clip_triangle(&tri, &band(0, 0.0, 1.0), false).is_none());
        assert!(clip_triangle(&tri, &band(1, 1.0, 2.0), true).is_some());
    }
}
