//! Grouping of polygon rings into polygons.
//!
//! Shape blobs store every ring of a polygon shape as a flat list of parts.
//! Exterior rings are clockwise, holes counter-clockwise; a hole belongs to
//! the smallest exterior that contains it.

use std::collections::HashSet;

use crate::geometry::{Coord, Envelope, LineString, Polygon};

struct RingInfo {
    area: f64,
    envelope: Option<Envelope>,
}

impl RingInfo {
    fn new(ring: &LineString) -> Self {
        let envelope = ring.0.split_first().map(|(first, rest)| {
            let mut env = Envelope::from_coord(first);
            rest.iter().for_each(|c| env.expand_to_include(c));
            env
        });
        Self {
            area: signed_area(&ring.0),
            envelope,
        }
    }

    fn is_clockwise(&self) -> bool {
        self.area <= 0.0
    }
}

/// Shoelace area: positive for counter-clockwise rings.
pub(crate) fn signed_area(coords: &[Coord]) -> f64 {
    if coords.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for (i, a) in coords.iter().enumerate() {
        let b = &coords[(i + 1) % coords.len()];
        sum += a.x * b.y - b.x * a.y;
    }
    sum / 2.0
}

fn point_in_ring(point: &Coord, ring: &[Coord]) -> bool {
    let mut inside = false;
    let n = ring.len();
    if n == 0 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (&ring[i], &ring[j]);
        if (a.y > point.y) != (b.y > point.y) {
            let x_cross = (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x;
            if point.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn coord_key(coord: &Coord) -> (u64, u64) {
    (coord.x.to_bits(), coord.y.to_bits())
}

/// Whether `outer` contains `inner`: envelope check first, then a
/// point-in-ring test on the first vertex of `inner` that is not also a
/// vertex of `outer`. Rings sharing every vertex count as contained.
fn ring_contains(
    outer: &LineString,
    outer_info: &RingInfo,
    inner: &LineString,
    inner_info: &RingInfo,
) -> bool {
    let (Some(outer_env), Some(inner_env)) = (outer_info.envelope, inner_info.envelope) else {
        return false;
    };
    if !outer_env.contains(&inner_env) {
        return false;
    }
    let outer_vertices: HashSet<(u64, u64)> = outer.0.iter().map(coord_key).collect();
    match inner
        .0
        .iter()
        .find(|c| !outer_vertices.contains(&coord_key(c)))
    {
        Some(inner_point) => point_in_ring(inner_point, &outer.0),
        None => true,
    }
}

/// Smallest-area ring among `candidates` that contains ring `idx`.
fn smallest_container(
    idx: usize,
    candidates: impl Iterator<Item = usize>,
    rings: &[LineString],
    infos: &[RingInfo],
) -> Option<usize> {
    candidates
        .filter(|&c| c != idx && ring_contains(&rings[c], &infos[c], &rings[idx], &infos[idx]))
        .min_by(|&a, &b| infos[a].area.abs().total_cmp(&infos[b].area.abs()))
}

/// Organises a flat list of rings into polygons.
///
/// Polygons are emitted in the order their exterior rings appear in the
/// input; holes keep their relative input order within each polygon.
pub fn organize_rings(rings: Vec<LineString>) -> Vec<Polygon> {
    let infos: Vec<RingInfo> = rings.iter().map(RingInfo::new).collect();
    let mut parent: Vec<Option<usize>> = vec![None; rings.len()];

    if infos.iter().any(RingInfo::is_clockwise) {
        let exteriors: Vec<usize> = (0..rings.len())
            .filter(|&i| infos[i].is_clockwise())
            .collect();
        for idx in (0..rings.len()).filter(|&i| !infos[i].is_clockwise()) {
            parent[idx] = smallest_container(idx, exteriors.iter().copied(), &rings, &infos);
        }
    } else {
        // No orientation hint: classify by nesting depth.
        let containers: Vec<Vec<usize>> = (0..rings.len())
            .map(|idx| {
                (0..rings.len())
                    .filter(|&c| {
                        c != idx
                            && infos[c].area.abs() > infos[idx].area.abs()
                            && ring_contains(&rings[c], &infos[c], &rings[idx], &infos[idx])
                    })
                    .collect()
            })
            .collect();
        for idx in 0..rings.len() {
            if containers[idx].len() % 2 == 1 {
                parent[idx] =
                    smallest_container(idx, containers[idx].iter().copied(), &rings, &infos);
            }
        }
    }

    let mut slot: Vec<Option<usize>> = vec![None; rings.len()];
    let mut polygons: Vec<Polygon> = Vec::new();
    let mut holes: Vec<(usize, LineString)> = Vec::new();
    for (idx, ring) in rings.into_iter().enumerate() {
        match parent[idx] {
            None => {
                slot[idx] = Some(polygons.len());
                polygons.push(Polygon::new(ring, Vec::new()));
            },
            Some(owner) => holes.push((owner, ring)),
        }
    }
    for (owner, ring) in holes {
        if let Some(position) = slot[owner] {
            polygons[position].push_interior(ring);
        }
    }
    polygons
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(points: &[(f64, f64)]) -> LineString {
        LineString(points.iter().map(|&(x, y)| Coord::xy(x, y)).collect())
    }

    // Clockwise square.
    fn cw(x0: f64, y0: f64, size: f64) -> LineString {
        ring(&[
            (x0, y0),
            (x0, y0 + size),
            (x0 + size, y0 + size),
            (x0 + size, y0),
            (x0, y0),
        ])
    }

    fn ccw(x0: f64, y0: f64, size: f64) -> LineString {
        let mut r = cw(x0, y0, size);
        r.0.reverse();
        r
    }

    #[test]
    fn orientation_from_signed_area() {
        assert!(signed_area(&cw(0.0, 0.0, 1.0).0) < 0.0);
        assert!((signed_area(&ccw(0.0, 0.0, 2.0).0) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn hole_goes_to_smallest_containing_exterior() {
        let polygons = organize_rings(vec![
            cw(0.0, 0.0, 100.0),
            cw(10.0, 10.0, 20.0),
            ccw(12.0, 12.0, 2.0),
        ]);
        assert_eq!(polygons.len(), 2);
        assert!(polygons[0].interiors().is_empty());
        assert_eq!(polygons[1].interiors().len(), 1);
    }

    #[test]
    fn separate_exteriors_stay_in_input_order() {
        let polygons = organize_rings(vec![cw(5.0, 5.0, 1.0), cw(0.0, 0.0, 1.0)]);
        assert_eq!(polygons.len(), 2);
        assert_eq!(polygons[0].exterior().0[0], Coord::xy(5.0, 5.0));
    }

    #[test]
    fn orphan_hole_becomes_exterior() {
        let polygons = organize_rings(vec![cw(0.0, 0.0, 1.0), ccw(10.0, 10.0, 1.0)]);
        assert_eq!(polygons.len(), 2);
        assert!(polygons.iter().all(|p| p.interiors().is_empty()));
    }

    #[test]
    fn hole_sharing_vertices_with_exterior() {
        // Hole touches the outer ring at its first vertex.
        let outer = cw(0.0, 0.0, 10.0);
        let hole = ring(&[(0.0, 0.0), (5.0, 2.0), (2.0, 5.0), (0.0, 0.0)]);
        assert!(signed_area(&hole.0) > 0.0);
        let polygons = organize_rings(vec![outer, hole]);
        assert_eq!(polygons.len(), 1);
        assert_eq!(polygons[0].interiors().len(), 1);
    }

    #[test]
    fn all_counter_clockwise_uses_nesting_depth() {
        let polygons = organize_rings(vec![
            ccw(0.0, 0.0, 100.0),
            ccw(10.0, 10.0, 50.0),
            ccw(20.0, 20.0, 10.0),
        ]);
        assert_eq!(polygons.len(), 2);
        assert_eq!(polygons[0].interiors().len(), 1);
        assert!(polygons[1].interiors().is_empty());
        assert_eq!(polygons[1].exterior().0[0], Coord::xy(20.0, 20.0));
    }
}
