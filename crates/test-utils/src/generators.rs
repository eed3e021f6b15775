//! Synthetic storm fields with predictable, verifiable shapes.

/// A lattice field: 1-D axes and row-major values (`row * nx + col`).
#[derive(Debug, Clone)]
pub struct LatticeData {
    pub lons: Vec<f64>,
    pub lats: Vec<f64>,
    pub values: Vec<f64>,
}

impl LatticeData {
    pub fn nx(&self) -> usize {
        self.lons.len()
    }

    pub fn ny(&self) -> usize {
        self.lats.len()
    }
}

/// A triangular mesh with 1-D node arrays and flat connectivity.
#[derive(Debug, Clone)]
pub struct MeshData {
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
    pub values: Vec<f64>,
    /// Three node indices per triangle, counted from `start_index`.
    pub connectivity: Vec<i64>,
    pub start_index: i64,
}

impl MeshData {
    pub fn triangle_count(&self) -> usize {
        self.connectivity.len() / 3
    }

    /// Node indices of one triangle, 0-based.
    pub fn triangle(&self, i: usize) -> [usize; 3] {
        let base = i * 3;
        [0, 1, 2].map(|k| (self.connectivity[base + k] - self.start_index) as usize)
    }
}

/// Linear ramp on an `nx` x `ny` lattice: value `row * nx + col`, with
/// longitude `col` and latitude `row`.
///
/// ```
/// use test_utils::linear_lattice;
///
/// let field = linear_lattice(4, 4);
/// assert_eq!(field.values[5], 5.0);
/// assert_eq!(field.values[15], 15.0);
/// ```
pub fn linear_lattice(nx: usize, ny: usize) -> LatticeData {
    LatticeData {
        lons: (0..nx).map(|c| c as f64).collect(),
        lats: (0..ny).map(|r| r as f64).collect(),
        values: (0..nx * ny).map(|i| i as f64).collect(),
    }
}

/// A single peak in the middle of an `n` x `n` lattice.
///
/// The value falls linearly from `peak` at the center to zero at the
/// inscribed circle and stays zero beyond it, so every band is a ring and
/// the lowest band also holds the corners.
pub fn cone_lattice(n: usize, peak: f64) -> LatticeData {
    let center = (n as f64 - 1.0) / 2.0;
    let radius = center.max(1.0);
    let mut values = Vec::with_capacity(n * n);
    for row in 0..n {
        for col in 0..n {
            let r = ((col as f64 - center).powi(2) + (row as f64 - center).powi(2)).sqrt();
            values.push(peak * (1.0 - r / radius).max(0.0));
        }
    }
    LatticeData {
        lons: (0..n).map(|c| c as f64).collect(),
        lats: (0..n).map(|r| r as f64).collect(),
        values,
    }
}

/// Six triangles over a 2 x 4 strip of nodes, 1-based connectivity.
///
/// ```text
/// 4 --- 5 --- 6 --- 7      y = 1
/// |  \  |  \  |  \  |
/// 0 --- 1 --- 2 --- 3      y = 0
/// ```
///
/// Node 3 belongs to a single triangle, so nulling it masks exactly one.
/// Values increase with x (`10 * x + y`).
pub fn strip_mesh(null_node: Option<usize>) -> MeshData {
    let mut xs = Vec::with_capacity(8);
    let mut ys = Vec::with_capacity(8);
    for y in 0..2 {
        for x in 0..4 {
            xs.push(x as f64);
            ys.push(y as f64);
        }
    }
    let mut values: Vec<f64> = xs.iter().zip(&ys).map(|(x, y)| 10.0 * x + y).collect();
    if let Some(i) = null_node {
        values[i] = f64::NAN;
    }

    let mut connectivity = Vec::with_capacity(18);
    for i in 0..3 {
        let (b0, b1, t0, t1) = (i, i + 1, i + 4, i + 5);
        connectivity.extend([b0, b1, t1, b0, t1, t0].map(|n| n as i64 + 1));
    }

    MeshData {
        xs,
        ys,
        values,
        connectivity,
        start_index: 1,
    }
}

/// A disc mesh: a center node plus `rings` concentric rings of `segments`
/// nodes each, unit spacing, with value `peak - radius`.
pub fn radial_mesh(rings: usize, segments: usize, peak: f64) -> MeshData {
    let mut xs = vec![0.0];
    let mut ys = vec![0.0];
    for ring in 1..=rings {
        for s in 0..segments {
            let theta = std::f64::consts::TAU * s as f64 / segments as f64;
            xs.push(ring as f64 * theta.cos());
            ys.push(ring as f64 * theta.sin());
        }
    }
    let values = xs
        .iter()
        .zip(&ys)
        .map(|(x, y)| peak - (x * x + y * y).sqrt())
        .collect();

    let node = |ring: usize, s: usize| -> i64 {
        if ring == 0 {
            0
        } else {
            (1 + (ring - 1) * segments + s % segments) as i64
        }
    };

    let mut connectivity = Vec::new();
    for s in 0..segments {
        connectivity.extend([node(0, 0), node(1, s), node(1, s + 1)]);
    }
    for ring in 2..=rings {
        for s in 0..segments {
            let (a0, a1) = (node(ring - 1, s), node(ring - 1, s + 1));
            let (b0, b1) = (node(ring, s), node(ring, s + 1));
            connectivity.extend([a0, b0, b1, a0, b1, a1]);
        }
    }

    MeshData {
        xs,
        ys,
        values,
        connectivity,
        start_index: 0,
    }
}
