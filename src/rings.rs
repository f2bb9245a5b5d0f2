//! Stitching of way fragments into closed rings.
//!
//! Polygon relations arrive as loose line fragments whose endpoints touch.
//! `assemble_rings` joins them greedily into rings and `assemble_polygon`
//! turns outer/inner rings into polygons.

use geo::{Coord, LineString, MultiPolygon, Polygon};

/// Endpoint coincidence tolerance in degrees.
pub const RING_EPSILON: f64 = 1e-7;

fn close(a: Coord<f64>, b: Coord<f64>) -> bool {
    (a.x - b.x).abs() < RING_EPSILON && (a.y - b.y).abs() < RING_EPSILON
}

/// Tries to attach `seg` to either end of `ring`. The shared endpoint is kept once.
fn try_join(ring: &mut Vec<Coord<f64>>, seg: &[Coord<f64>]) -> bool {
    let (Some(&head), Some(&tail)) = (ring.first(), ring.last()) else {
        return false;
    };
    let (Some(&start), Some(&end)) = (seg.first(), seg.last()) else {
        return false;
    };

    if close(tail, start) {
        ring.extend_from_slice(&seg[1..]);
    } else if close(tail, end) {
        ring.extend(seg.iter().rev().skip(1));
    } else if close(head, end) {
        let mut joined = seg[..seg.len() - 1].to_vec();
        joined.append(ring);
        *ring = joined;
    } else if close(head, start) {
        let mut joined: Vec<Coord<f64>> = seg.iter().skip(1).rev().copied().collect();
        joined.append(ring);
        *ring = joined;
    } else {
        return false;
    }
    true
}

/// Joins segments into closed rings.
///
/// Each ring is seeded with the first unused segment and grown by repeated
/// passes over the remaining segments until a full pass attaches nothing.
/// Rings whose ends do not meet are closed by repeating the first point.
/// Rings with fewer than four points are dropped. Never fails.
pub fn assemble_rings(segments: &[Vec<Coord<f64>>]) -> Vec<LineString<f64>> {
    let mut used = vec![false; segments.len()];
    let mut rings = Vec::new();

    for seed in 0..segments.len() {
        if used[seed] {
            continue;
        }
        used[seed] = true;
        if segments[seed].len() < 2 {
            continue;
        }

        let mut ring = segments[seed].clone();
        loop {
            let mut joined_any = false;
            for (i, seg) in segments.iter().enumerate() {
                if used[i] || seg.len() < 2 {
                    continue;
                }
                if try_join(&mut ring, seg) {
                    used[i] = true;
                    joined_any = true;
                }
            }
            if !joined_any {
                break;
            }
        }

        if let (Some(&first), Some(&last)) = (ring.first(), ring.last()) {
            if first != last {
                ring.push(first);
            }
        }

        if ring.len() >= 4 {
            rings.push(LineString::new(ring));
        }
    }

    rings
}

/// Builds the geometry of one boundary relation from its outer and inner
/// fragments.
///
/// One outer ring gives a polygon holding every inner ring. Several outer
/// rings give one polygon each, with the inner rings attached to the first.
/// Returns `None` when no outer ring could be assembled.
pub fn assemble_polygon(
    outer: &[Vec<Coord<f64>>],
    inner: &[Vec<Coord<f64>>],
) -> Option<MultiPolygon<f64>> {
    let outers = assemble_rings(outer);
    let mut inners = Some(assemble_rings(inner));

    if outers.is_empty() {
        return None;
    }

    let polygons = outers
        .into_iter()
        .map(|ring| Polygon::new(ring, inners.take().unwrap_or_default()))
        .collect();
    Some(MultiPolygon::new(polygons))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;

    fn seg(points: &[(f64, f64)]) -> Vec<Coord<f64>> {
        points.iter().map(|&(x, y)| coord! { x: x, y: y }).collect()
    }

    #[test]
    fn test_connected_cycle_gives_one_closed_ring() {
        // A square split into four shuffled, partly reversed fragments.
        let segments = vec![
            seg(&[(1.0, 1.0), (0.0, 1.0)]),
            seg(&[(0.0, 0.0), (1.0, 0.0)]),
            seg(&[(0.0, 1.0), (0.0, 0.0)]),
            seg(&[(1.0, 1.0), (1.0, 0.0)]),
        ];
        let rings = assemble_rings(&segments);
        assert_eq!(rings.len(), 1);

        let ring = &rings[0];
        assert_eq!(ring.0.first(), ring.0.last());
        assert_eq!(ring.0.len(), 5);
        for corner in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
            assert!(ring.0.contains(&coord! { x: corner.0, y: corner.1 }));
        }
    }

    #[test]
    fn test_joins_within_tolerance() {
        let segments = vec![
            seg(&[(0.0, 0.0), (2.0, 0.0), (2.0, 2.0)]),
            seg(&[(2.0 + 5e-8, 2.0), (0.0, 2.0), (0.0, 0.0)]),
        ];
        let rings = assemble_rings(&segments);
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0].0.len(), 5);
    }

    #[test]
    fn test_nearly_closed_segment_gets_closing_point() {
        let input = seg(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (5e-8, 0.0)]);
        let rings = assemble_rings(&[input.clone()]);
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0].0.len(), input.len() + 1);
        assert_eq!(rings[0].0.first(), rings[0].0.last());
    }

    #[test]
    fn test_open_chain_is_force_closed() {
        let input = seg(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)]);
        let rings = assemble_rings(&[input]);
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0].0.len(), 4);
        assert_eq!(rings[0].0[3], coord! { x: 0.0, y: 0.0 });
    }

    #[test]
    fn test_degenerate_segments_dropped() {
        let rings = assemble_rings(&[seg(&[(0.0, 0.0), (1.0, 0.0)]), seg(&[(5.0, 5.0)])]);
        assert!(rings.is_empty());
    }

    #[test]
    fn test_disconnected_rings_in_discovery_order() {
        let segments = vec![
            seg(&[(10.0, 10.0), (11.0, 10.0), (11.0, 11.0), (10.0, 10.0)]),
            seg(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]),
        ];
        let rings = assemble_rings(&segments);
        assert_eq!(rings.len(), 2);
        assert_eq!(rings[0].0[0], coord! { x: 10.0, y: 10.0 });
        assert_eq!(rings[1].0[0], coord! { x: 0.0, y: 0.0 });
    }

    #[test]
    fn test_assemble_polygon_with_hole() {
        let outer = vec![
            seg(&[(0.0, 0.0), (4.0, 0.0), (4.0, 4.0)]),
            seg(&[(4.0, 4.0), (0.0, 4.0), (0.0, 0.0)]),
        ];
        let inner = vec![seg(&[(1.0, 1.0), (2.0, 1.0), (2.0, 2.0), (1.0, 1.0)])];
        let mp = assemble_polygon(&outer, &inner).unwrap();
        assert_eq!(mp.0.len(), 1);
        assert_eq!(mp.0[0].interiors().len(), 1);
    }

    #[test]
    fn test_assemble_polygon_multiple_outers() {
        let outer = vec![
            seg(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]),
            seg(&[(5.0, 5.0), (6.0, 5.0), (6.0, 6.0), (5.0, 5.0)]),
        ];
        let inner = vec![seg(&[(0.2, 0.1), (0.8, 0.1), (0.8, 0.5), (0.2, 0.1)])];
        let mp = assemble_polygon(&outer, &inner).unwrap();
        assert_eq!(mp.0.len(), 2);
        assert_eq!(mp.0[0].interiors().len(), 1);
        assert!(mp.0[1].interiors().is_empty());
    }

    #[test]
    fn test_assemble_polygon_without_outer() {
        let inner = vec![seg(&[(1.0, 1.0), (2.0, 1.0), (2.0, 2.0), (1.0, 1.0)])];
        assert!(assemble_polygon(&[], &inner).is_none());
    }
}
