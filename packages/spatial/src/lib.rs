#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Polygon assembly from raw OSM way fragments.
//!
//! OSM boundary relations reference their rings as an unordered bag of way
//! fragments, each of which may run in either direction. This crate merges
//! those fragments into closed rings, pairs inner rings (holes) with the
//! outer rings that contain them, simplifies the result, and serialises it
//! as EWKT for `PostGIS`.
//!
//! Everything here is pure CPU work; the fragment counts involved (bounded
//! by the number of ways in a single relation) keep it cheap enough to run
//! inline on the async worker.

use std::collections::{BTreeMap, VecDeque};

/// Absolute tolerance for comparing coordinates when joining fragment
/// endpoints and testing ring closure.
pub const COORD_EPSILON: f64 = 1e-7;

/// Hard cap on points per emitted ring. Rings above this are thinned by
/// uniform sampling so downstream rows stay within size limits.
pub const MAX_RING_POINTS: usize = 500;

/// Placeholder stored for relations whose geometry could not be assembled.
/// `PostGIS` accepts it as a valid (empty) polygon; the transform stage
/// rejects it because it contains no ring.
pub const EMPTY_POLYGON_EWKT: &str = "SRID=4326;POLYGON EMPTY";

/// A WGS84 coordinate as `[lon, lat]`, matching WKT axis order.
pub type Point = [f64; 2];

/// One polygon: an exterior ring plus zero or more holes.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonRings {
    /// The closed outer boundary.
    pub exterior: Vec<Point>,
    /// Closed inner rings contained by the exterior.
    pub holes: Vec<Vec<Point>>,
}

/// Assembled geometry for a single boundary relation.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationGeometry {
    /// Exactly one outer ring.
    Polygon(PolygonRings),
    /// Multiple outer rings, each with its own holes.
    MultiPolygon(Vec<PolygonRings>),
}

/// Returns `true` when two points coincide within [`COORD_EPSILON`].
#[must_use]
pub fn points_equal(a: Point, b: Point) -> bool {
    (a[0] - b[0]).abs() <= COORD_EPSILON && (a[1] - b[1]).abs() <= COORD_EPSILON
}

/// Quantises a coordinate onto the epsilon grid for multimap keying.
#[allow(clippy::cast_possible_truncation)]
fn quantize(p: Point) -> (i64, i64) {
    (
        (p[0] / COORD_EPSILON).round() as i64,
        (p[1] / COORD_EPSILON).round() as i64,
    )
}

/// Adjacency multimap from quantised endpoint to fragment indices.
///
/// A fragment contributes entries for both of its endpoints. Lookups scan
/// the neighbouring grid cells as well, so points that straddle a cell edge
/// within tolerance are still found; the caller re-checks candidates with
/// [`points_equal`].
struct EndpointIndex {
    by_endpoint: BTreeMap<(i64, i64), Vec<usize>>,
}

impl EndpointIndex {
    fn build(fragments: &[Vec<Point>]) -> Self {
        let mut by_endpoint: BTreeMap<(i64, i64), Vec<usize>> = BTreeMap::new();
        for (idx, frag) in fragments.iter().enumerate() {
            if let (Some(first), Some(last)) = (frag.first(), frag.last()) {
                by_endpoint.entry(quantize(*first)).or_default().push(idx);
                by_endpoint.entry(quantize(*last)).or_default().push(idx);
            }
        }
        Self { by_endpoint }
    }

    /// Finds the first unused fragment with an endpoint at `point`.
    fn find_unused_at(
        &self,
        fragments: &[Vec<Point>],
        used: &[bool],
        point: Point,
    ) -> Option<usize> {
        let (qx, qy) = quantize(point);
        let mut candidates: Vec<usize> = Vec::new();
        for dx in -1i64..=1 {
            for dy in -1i64..=1 {
                if let Some(indices) = self.by_endpoint.get(&(qx + dx, qy + dy)) {
                    candidates.extend(indices.iter().copied());
                }
            }
        }
        candidates.sort_unstable();
        candidates.dedup();
        candidates.into_iter().find(|&idx| {
            !used[idx]
                && (points_equal(fragments[idx][0], point)
                    || points_equal(*fragments[idx].last().expect("non-empty fragment"), point))
        })
    }
}

/// Merges unordered, possibly-reversed way fragments into closed rings.
///
/// Each connected component of fragments becomes one ring: a seed fragment
/// is extended at its tail (appending candidates forward or reversed), then
/// at its head, until neither end can grow. Components that accumulate
/// fewer than 3 points are discarded; all emitted rings are explicitly
/// closed (first point repeated at the end when needed).
#[must_use]
pub fn merge_fragments(fragments: &[Vec<Point>]) -> Vec<Vec<Point>> {
    let fragments: Vec<Vec<Point>> = fragments
        .iter()
        .filter(|f| f.len() >= 2)
        .cloned()
        .collect();

    let index = EndpointIndex::build(&fragments);
    let mut used = vec![false; fragments.len()];
    let mut rings = Vec::new();

    for seed in 0..fragments.len() {
        if used[seed] {
            continue;
        }
        used[seed] = true;
        let mut ring: VecDeque<Point> = fragments[seed].iter().copied().collect();

        // Consumption counter guards against a cycle in the walk; a ring can
        // never absorb more fragments than exist.
        let mut consumed = 1usize;

        // Extend at the tail.
        while consumed <= fragments.len() {
            let tail = *ring.back().expect("ring is never empty");
            let Some(idx) = index.find_unused_at(&fragments, &used, tail) else {
                break;
            };
            used[idx] = true;
            consumed += 1;
            let frag = &fragments[idx];
            if points_equal(frag[0], tail) {
                ring.extend(frag.iter().skip(1).copied());
            } else {
                ring.extend(frag.iter().rev().skip(1).copied());
            }
        }

        // Then at the head.
        while consumed <= fragments.len() {
            let head = *ring.front().expect("ring is never empty");
            let Some(idx) = index.find_unused_at(&fragments, &used, head) else {
                break;
            };
            used[idx] = true;
            consumed += 1;
            let frag = &fragments[idx];
            if points_equal(*frag.last().expect("non-empty fragment"), head) {
                for p in frag.iter().rev().skip(1) {
                    ring.push_front(*p);
                }
            } else {
                for p in frag.iter().skip(1) {
                    ring.push_front(*p);
                }
            }
        }

        if ring.len() < 3 {
            continue;
        }

        let mut ring: Vec<Point> = ring.into_iter().collect();
        let first = ring[0];
        if !points_equal(first, *ring.last().expect("non-empty ring")) {
            ring.push(first);
        }
        rings.push(ring);
    }

    rings
}

/// Standard ray-casting point-in-polygon test against a single ring.
#[must_use]
pub fn point_in_ring(point: Point, ring: &[Point]) -> bool {
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (xi, yi) = (ring[i][0], ring[i][1]);
        let (xj, yj) = (ring[j][0], ring[j][1]);
        if ((yi > point[1]) != (yj > point[1]))
            && point[0] < (xj - xi) * (point[1] - yi) / (yj - yi) + xi
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Removes collinear interior points using the cross-product test.
fn strip_collinear(ring: &[Point]) -> Vec<Point> {
    if ring.len() <= 3 {
        return ring.to_vec();
    }

    let mut out: Vec<Point> = Vec::with_capacity(ring.len());
    out.push(ring[0]);

    for i in 1..ring.len() - 1 {
        let prev = *out.last().expect("out starts non-empty");
        let cur = ring[i];
        let next = ring[i + 1];
        let cross =
            (cur[0] - prev[0]) * (next[1] - cur[1]) - (cur[1] - prev[1]) * (next[0] - cur[0]);
        if cross.abs() > COORD_EPSILON {
            out.push(cur);
        }
    }

    out.push(ring[ring.len() - 1]);
    out
}

/// Thins a ring to at most [`MAX_RING_POINTS`] by uniform sampling,
/// always keeping the final point so closure survives.
fn cap_ring(ring: Vec<Point>) -> Vec<Point> {
    let n = ring.len();
    if n <= MAX_RING_POINTS {
        return ring;
    }

    let step = n.div_ceil(MAX_RING_POINTS);
    let last = ring[n - 1];
    let mut out: Vec<Point> = ring.into_iter().step_by(step).collect();
    if !points_equal(*out.last().expect("sampled ring non-empty"), last) {
        out.push(last);
    }
    out
}

/// Simplifies a ring for emission: collinear removal, then the point cap.
#[must_use]
pub fn simplify_ring(ring: &[Point]) -> Vec<Point> {
    cap_ring(strip_collinear(ring))
}

/// Assembles outer and inner way fragments into a relation geometry.
///
/// Outer fragments are merged into outer rings and inner fragments into
/// candidate holes. Each hole attaches to the **first** outer ring (in
/// iteration order) that contains its first point; a hole contained by no
/// outer is dropped with a warning. Returns `None` when no outer ring
/// could be formed (including the only-inner-fragments case).
#[must_use]
pub fn assemble(
    outer_fragments: &[Vec<Point>],
    inner_fragments: &[Vec<Point>],
) -> Option<RelationGeometry> {
    let outers = merge_fragments(outer_fragments);
    if outers.is_empty() {
        return None;
    }

    let mut polygons: Vec<PolygonRings> = outers
        .into_iter()
        .map(|ring| PolygonRings {
            exterior: ring,
            holes: Vec::new(),
        })
        .collect();

    for inner in merge_fragments(inner_fragments) {
        let probe = inner[0];
        match polygons
            .iter_mut()
            .find(|poly| point_in_ring(probe, &poly.exterior))
        {
            Some(poly) => poly.holes.push(inner),
            None => {
                log::warn!(
                    "inner ring at ({}, {}) has no containing outer ring, dropping",
                    probe[0],
                    probe[1]
                );
            }
        }
    }

    for poly in &mut polygons {
        poly.exterior = simplify_ring(&poly.exterior);
        for hole in &mut poly.holes {
            *hole = simplify_ring(hole);
        }
    }

    if polygons.len() == 1 {
        Some(RelationGeometry::Polygon(
            polygons.pop().expect("length checked"),
        ))
    } else {
        Some(RelationGeometry::MultiPolygon(polygons))
    }
}

fn write_ring(out: &mut String, ring: &[Point]) {
    use std::fmt::Write as _;

    out.push('(');
    for (i, p) in ring.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write!(out, "{} {}", p[0], p[1]).expect("writing to a String cannot fail");
    }
    out.push(')');
}

fn write_polygon(out: &mut String, poly: &PolygonRings) {
    out.push('(');
    write_ring(out, &poly.exterior);
    for hole in &poly.holes {
        out.push(',');
        write_ring(out, hole);
    }
    out.push(')');
}

/// Serialises an assembled geometry as EWKT with the WGS84 SRID prefix.
#[must_use]
pub fn to_ewkt(geometry: &RelationGeometry) -> String {
    let mut out = String::from("SRID=4326;");
    match geometry {
        RelationGeometry::Polygon(poly) => {
            out.push_str("POLYGON");
            write_polygon(&mut out, poly);
        }
        RelationGeometry::MultiPolygon(polys) => {
            out.push_str("MULTIPOLYGON(");
            for (i, poly) in polys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_polygon(&mut out, poly);
            }
            out.push(')');
        }
    }
    out
}

/// Validates stored geometry text: the SRID prefix, a polygon or
/// multipolygon header, and at least one closed ring of 4+ points.
///
/// The placeholder [`EMPTY_POLYGON_EWKT`] fails this check by design, which
/// is how unparseable relations are kept out of the enriched table.
#[must_use]
pub fn validate_ewkt(text: &str) -> bool {
    let Some(rest) = text.strip_prefix("SRID=4326;") else {
        return false;
    };
    let body = if let Some(b) = rest.strip_prefix("MULTIPOLYGON") {
        b
    } else if let Some(b) = rest.strip_prefix("POLYGON") {
        b
    } else {
        return false;
    };

    leaf_rings(body)
        .iter()
        .any(|ring| ring.len() >= 4 && points_equal(ring[0], *ring.last().expect("non-empty ring")))
}

/// Extracts the innermost parenthesised coordinate lists from a WKT body.
fn leaf_rings(body: &str) -> Vec<Vec<Point>> {
    let mut rings = Vec::new();
    let mut starts: Vec<usize> = Vec::new();

    for (i, ch) in body.char_indices() {
        match ch {
            '(' => starts.push(i),
            ')' => {
                if let Some(start) = starts.pop() {
                    let inner = &body[start + 1..i];
                    if !inner.contains('(')
                        && let Some(ring) = parse_ring(inner)
                    {
                        rings.push(ring);
                    }
                }
            }
            _ => {}
        }
    }

    rings
}

fn parse_ring(inner: &str) -> Option<Vec<Point>> {
    let mut ring = Vec::new();
    for pair in inner.split(',') {
        let mut coords = pair.split_whitespace();
        let lon: f64 = coords.next()?.parse().ok()?;
        let lat: f64 = coords.next()?.parse().ok()?;
        if coords.next().is_some() {
            return None;
        }
        ring.push([lon, lat]);
    }
    Some(ring)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f64) -> Vec<Point> {
        vec![
            [0.0, 0.0],
            [size, 0.0],
            [size, size],
            [0.0, size],
            [0.0, 0.0],
        ]
    }

    #[test]
    fn merges_reversed_fragments_into_one_closed_ring() {
        // Three fragments, the middle one running backwards.
        let fragments = vec![
            vec![[0.0, 0.0], [1.0, 0.0]],
            vec![[2.0, 0.0], [1.0, 0.0]],
            vec![[2.0, 0.0], [2.0, 1.0], [0.0, 1.0], [0.0, 0.0]],
        ];

        let rings = merge_fragments(&fragments);
        assert_eq!(rings.len(), 1);

        let ring = &rings[0];
        assert_eq!(ring.len(), 6);
        assert!(points_equal(ring[0], *ring.last().unwrap()));

        // All five distinct corners survive, in traversal order.
        let expected = [
            [0.0, 0.0],
            [1.0, 0.0],
            [2.0, 0.0],
            [2.0, 1.0],
            [0.0, 1.0],
            [0.0, 0.0],
        ];
        for (got, want) in ring.iter().zip(expected.iter()) {
            assert!(points_equal(*got, *want), "got {got:?}, want {want:?}");
        }
    }

    #[test]
    fn extends_at_the_head_when_the_tail_is_exhausted() {
        // The seed fragment's tail dead-ends; the chain only continues
        // from its head, and the open component is closed on emission.
        let fragments = vec![
            vec![[1.0, 0.0], [2.0, 1.0]],
            vec![[0.0, 0.0], [1.0, 0.0]],
        ];

        let rings = merge_fragments(&fragments);
        assert_eq!(rings.len(), 1);

        let ring = &rings[0];
        assert_eq!(ring.len(), 4);
        assert!(points_equal(ring[0], [0.0, 0.0]));
        assert!(points_equal(*ring.last().unwrap(), [0.0, 0.0]));
    }

    #[test]
    fn discards_components_below_three_points() {
        let fragments = vec![vec![[0.0, 0.0], [1.0, 1.0]]];
        assert!(merge_fragments(&fragments).is_empty());
    }

    #[test]
    fn separate_components_become_separate_rings() {
        let fragments = vec![
            vec![[0.0, 0.0], [1.0, 0.0], [0.5, 1.0], [0.0, 0.0]],
            vec![[10.0, 10.0], [11.0, 10.0], [10.5, 11.0], [10.0, 10.0]],
        ];
        assert_eq!(merge_fragments(&fragments).len(), 2);
    }

    #[test]
    fn endpoints_within_tolerance_still_join() {
        let fragments = vec![
            vec![[0.0, 0.0], [1.0, 0.0]],
            vec![[1.0 + 5e-8, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]],
        ];
        let rings = merge_fragments(&fragments);
        assert_eq!(rings.len(), 1);
    }

    #[test]
    fn point_in_ring_basics() {
        let ring = square(10.0);
        assert!(point_in_ring([5.0, 5.0], &ring));
        assert!(!point_in_ring([15.0, 5.0], &ring));
        assert!(!point_in_ring([-1.0, -1.0], &ring));
    }

    #[test]
    fn inner_ring_becomes_a_hole_not_a_multipolygon() {
        let outer = vec![square(10.0)];
        let inner = vec![vec![
            [2.0, 2.0],
            [8.0, 2.0],
            [8.0, 8.0],
            [2.0, 8.0],
            [2.0, 2.0],
        ]];

        let geometry = assemble(&outer, &inner).unwrap();
        match geometry {
            RelationGeometry::Polygon(poly) => {
                assert_eq!(poly.holes.len(), 1);
            }
            RelationGeometry::MultiPolygon(_) => panic!("expected a single polygon"),
        }
    }

    #[test]
    fn unmatched_inner_ring_is_dropped() {
        let outer = vec![square(10.0)];
        // Entirely outside the outer ring.
        let inner = vec![vec![
            [20.0, 20.0],
            [21.0, 20.0],
            [21.0, 21.0],
            [20.0, 21.0],
            [20.0, 20.0],
        ]];

        let geometry = assemble(&outer, &inner).unwrap();
        match geometry {
            RelationGeometry::Polygon(poly) => assert!(poly.holes.is_empty()),
            RelationGeometry::MultiPolygon(_) => panic!("expected a single polygon"),
        }
    }

    #[test]
    fn only_inner_fragments_yield_nothing() {
        let inner = vec![square(10.0)];
        assert!(assemble(&[], &inner).is_none());
    }

    #[test]
    fn two_outers_become_a_multipolygon() {
        let outers = vec![
            square(10.0),
            vec![
                [20.0, 20.0],
                [30.0, 20.0],
                [30.0, 30.0],
                [20.0, 30.0],
                [20.0, 20.0],
            ],
        ];
        let geometry = assemble(&outers, &[]).unwrap();
        match geometry {
            RelationGeometry::MultiPolygon(polys) => assert_eq!(polys.len(), 2),
            RelationGeometry::Polygon(_) => panic!("expected a multipolygon"),
        }
    }

    #[test]
    fn nested_outers_attach_the_hole_to_the_first_match() {
        // Both outers contain the hole probe point; the first in iteration
        // order wins.
        let outers = vec![square(100.0), square(50.0)];
        let inner = vec![vec![
            [10.0, 10.0],
            [20.0, 10.0],
            [20.0, 20.0],
            [10.0, 20.0],
            [10.0, 10.0],
        ]];

        let geometry = assemble(&outers, &inner).unwrap();
        match geometry {
            RelationGeometry::MultiPolygon(polys) => {
                assert_eq!(polys[0].holes.len(), 1);
                assert!(polys[1].holes.is_empty());
            }
            RelationGeometry::Polygon(_) => panic!("expected a multipolygon"),
        }
    }

    #[test]
    fn strips_collinear_interior_points() {
        let ring = vec![
            [0.0, 0.0],
            [1.0, 0.0],
            [2.0, 0.0],
            [2.0, 2.0],
            [0.0, 2.0],
            [0.0, 0.0],
        ];
        let simplified = simplify_ring(&ring);
        assert_eq!(simplified.len(), 5);
        assert!(!simplified.iter().any(|p| points_equal(*p, [1.0, 0.0])));
    }

    #[test]
    fn caps_oversize_rings_and_keeps_the_final_point() {
        // A jagged ring that collinear removal cannot shrink.
        #[allow(clippy::cast_precision_loss)]
        let mut ring: Vec<Point> = (0..1999usize)
            .map(|i| {
                let x = i as f64;
                let y = if i % 2 == 0 { 0.0 } else { 1.0 };
                [x, y]
            })
            .collect();
        ring.push(ring[0]);

        let capped = simplify_ring(&ring);
        assert!(capped.len() <= MAX_RING_POINTS + 1);
        assert!(points_equal(*capped.last().unwrap(), ring[0]));
    }

    #[test]
    fn ewkt_round_trips_through_validation() {
        let geometry = assemble(&[square(10.0)], &[]).unwrap();
        let ewkt = to_ewkt(&geometry);
        assert!(ewkt.starts_with("SRID=4326;POLYGON(("));
        assert!(validate_ewkt(&ewkt));
    }

    #[test]
    fn multipolygon_ewkt_is_valid() {
        let outers = vec![
            square(10.0),
            vec![
                [20.0, 20.0],
                [30.0, 20.0],
                [30.0, 30.0],
                [20.0, 30.0],
                [20.0, 20.0],
            ],
        ];
        let ewkt = to_ewkt(&assemble(&outers, &[]).unwrap());
        assert!(ewkt.starts_with("SRID=4326;MULTIPOLYGON((("));
        assert!(validate_ewkt(&ewkt));
    }

    #[test]
    fn validation_rejects_the_placeholder() {
        assert!(!validate_ewkt(EMPTY_POLYGON_EWKT));
    }

    #[test]
    fn validation_rejects_missing_srid_and_unclosed_rings() {
        assert!(!validate_ewkt("POLYGON((0 0,1 0,1 1,0 0))"));
        assert!(!validate_ewkt("SRID=4326;POLYGON((0 0,1 0,1 1,2 2))"));
        assert!(!validate_ewkt("SRID=4326;POLYGON((0 0,1 0,0 0))"));
        assert!(!validate_ewkt("SRID=4326;LINESTRING(0 0,1 1)"));
    }
}
