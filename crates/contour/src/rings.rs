//! Ring classification and boundary tracing for the mesh path.

use std::collections::{BTreeMap, HashMap};
use std::collections::hash_map::Entry;

use geo::{Coord, LineString};
use tracing::warn;

use crate::band::{Piece, VertexKey};

/// Whether a ring bounds a filled region or a hole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingKind {
    Exterior,
    Interior,
}

/// Shoelace signed area; positive for counter-clockwise rings.
///
/// The ring may be open or closed; the closing edge is implied.
pub fn signed_area(ring: &LineString<f64>) -> f64 {
    let coords = &ring.0;
    let n = coords.len();
    if n < 3 {
        return 0.0;
    }
    (0..n)
        .map(|i| {
            let a = coords[i];
            let b = coords[(i + 1) % n];
            a.x * b.y - b.x * a.y
        })
        .sum::<f64>()
        / 2.0
}

/// Non-negative signed area is an exterior, negative an interior.
pub fn classify(ring: &LineString<f64>) -> RingKind {
    if signed_area(ring) >= 0.0 {
        RingKind::Exterior
    } else {
        RingKind::Interior
    }
}

fn coord_key(c: &Coord<f64>) -> (u64, u64) {
    // Adding zero folds -0.0 into 0.0
    ((c.x + 0.0).to_bits(), (c.y + 0.0).to_bits())
}

/// Split a ring at every vertex it passes through more than once.
///
/// Each returned ring is closed and simple with respect to its vertices,
/// and keeps the direction it had inside `ring`, so a loop traversed against
/// the ring's orientation comes back with the opposite sign. Loops with
/// fewer than three distinct vertices (spikes, repeated points) are dropped.
pub fn split_pinches(ring: &LineString<f64>) -> Vec<LineString<f64>> {
    let mut coords: Vec<Coord<f64>> = ring.0.clone();
    if coords.len() > 1 && coords.first() == coords.last() {
        coords.pop();
    }
    coords.dedup();
    while coords.len() > 1 && coords.first() == coords.last() {
        coords.pop();
    }

    let mut loops = Vec::new();
    let mut stack: Vec<Coord<f64>> = Vec::with_capacity(coords.len());
    let mut seen: HashMap<(u64, u64), usize> = HashMap::with_capacity(coords.len());

    for coord in coords {
        match seen.entry(coord_key(&coord)) {
            Entry::Occupied(entry) => {
                let start = *entry.get();
                let mut closed: Vec<Coord<f64>> = stack.drain(start + 1..).collect();
                for c in &closed {
                    seen.remove(&coord_key(c));
                }
                closed.insert(0, coord);
                closed.push(coord);
                loops.push(closed);
            }
            Entry::Vacant(entry) => {
                entry.insert(stack.len());
                stack.push(coord);
            }
        }
    }
    if let Some(&first) = stack.first() {
        stack.push(first);
        loops.push(stack);
    }

    loops
        .into_iter()
        .filter(|l| l.len() >= 4)
        .map(LineString::new)
        .collect()
}

/// Merge the pieces of one band into closed boundary rings.
///
/// Every piece is counter-clockwise, so an edge shared by two pieces appears
/// once in each direction and cancels. What remains is the band's boundary
/// with the filled region on the left: exteriors come out counter-clockwise
/// and holes clockwise. Where several boundary edges leave the same vertex
/// the sharpest left turn is taken, which splits rings touching at a point.
pub(crate) fn trace_rings(pieces: &[Piece]) -> Vec<LineString<f64>> {
    let mut coords: HashMap<VertexKey, Coord<f64>> = HashMap::new();
    // Net traversal count of each undirected edge, positive from the smaller key.
    let mut net: BTreeMap<(VertexKey, VertexKey), i32> = BTreeMap::new();

    for piece in pieces {
        let n = piece.keys.len();
        for i in 0..n {
            let (a, b) = (piece.keys[i], piece.keys[(i + 1) % n]);
            coords.insert(a, piece.coords[i]);
            if a == b {
                continue;
            }
            if a < b {
                *net.entry((a, b)).or_insert(0) += 1;
            } else {
                *net.entry((b, a)).or_insert(0) -= 1;
            }
        }
    }

    let mut outgoing: BTreeMap<VertexKey, Vec<VertexKey>> = BTreeMap::new();
    for ((a, b), count) in net {
        let (from, to) = if count > 0 { (a, b) } else { (b, a) };
        for _ in 0..count.unsigned_abs() {
            outgoing.entry(from).or_default().push(to);
        }
    }

    let mut rings = Vec::new();
    let mut dropped = 0usize;

    while let Some(start) = first_with_edges(&outgoing) {
        let Some(first) = take_edge(&mut outgoing, start, None, &coords) else {
            break;
        };

        let mut keys = vec![start, first];
        let mut closed = false;
        while let Some(&current) = keys.last() {
            if current == start {
                closed = true;
                break;
            }
            let previous = keys[keys.len() - 2];
            match take_edge(&mut outgoing, current, Some(previous), &coords) {
                Some(next) => keys.push(next),
                None => break,
            }
        }

        if !closed || keys.len() < 4 {
            dropped += 1;
            continue;
        }

        let ring: Vec<Coord<f64>> = keys.iter().filter_map(|k| coords.get(k).copied()).collect();
        rings.extend(split_pinches(&LineString::new(ring)));
    }

    if dropped > 0 {
        warn!(dropped, "Discarded unclosed boundary fragments while tracing rings");
    }

    rings
}

fn first_with_edges(outgoing: &BTreeMap<VertexKey, Vec<VertexKey>>) -> Option<VertexKey> {
    outgoing
        .iter()
        .find(|(_, targets)| !targets.is_empty())
        .map(|(key, _)| *key)
}

/// Remove and return the next boundary edge leaving `at`.
///
/// With a known incoming direction the edge turning furthest left wins;
/// ties and the very first edge fall back to key order.
fn take_edge(
    outgoing: &mut BTreeMap<VertexKey, Vec<VertexKey>>,
    at: VertexKey,
    previous: Option<VertexKey>,
    coords: &HashMap<VertexKey, Coord<f64>>,
) -> Option<VertexKey> {
    let targets = outgoing.get_mut(&at)?;
    if targets.is_empty() {
        return None;
    }

    let mut best = 0;
    if let (Some(prev), Some(here)) = (previous.and_then(|p| coords.get(&p)), coords.get(&at)) {
        let incoming = (here.x - prev.x, here.y - prev.y);
        let mut best_turn = f64::NEG_INFINITY;
        for (i, target) in targets.iter().enumerate() {
            let Some(next) = coords.get(target) else {
                continue;
            };
            let out = (next.x - here.x, next.y - here.y);
            let cross = incoming.0 * out.1 - incoming.1 * out.0;
            let dot = incoming.0 * out.0 + incoming.1 * out.1;
            let turn = cross.atan2(dot);
            if turn > best_turn {
                best_turn = turn;
                best = i;
            }
        }
    }

    let next = targets.swap_remove(best);
    if targets.is_empty() {
        outgoing.remove(&at);
    }
    Some(next)
}
