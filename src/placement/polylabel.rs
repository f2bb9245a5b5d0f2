//! Pole of inaccessibility by quadtree refinement.
//!
//! The region is described only by its signed distance function, positive
//! inside. Cells are refined best-first until no cell can beat the current
//! best by more than the tolerance.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use geo::{Coord, Rect};

/// Upper bound on distance evaluations.
const MAX_CELLS: usize = 200_000;

struct Cell {
    center: Coord<f64>,
    half: f64,
    distance: f64,
    /// Best distance any point of the cell can reach.
    potential: f64,
}

impl Cell {
    fn new(center: Coord<f64>, half: f64, sdf: &impl Fn(Coord<f64>) -> f64) -> Self {
        let distance = sdf(center);
        Self {
            center,
            half,
            distance,
            potential: distance + half * std::f64::consts::SQRT_2,
        }
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Cell {}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cell {
    fn cmp(&self, other: &Self) -> Ordering {
        self.potential.total_cmp(&other.potential)
    }
}

/// Point of `bounds` maximising `sdf`, with its distance.
///
/// `seeds` are evaluated up front; a good seed prunes most of the queue.
pub fn pole_of_inaccessibility(
    bounds: Rect<f64>,
    tolerance: f64,
    seeds: &[Coord<f64>],
    sdf: impl Fn(Coord<f64>) -> f64,
) -> (Coord<f64>, f64) {
    let (min, w, h) = (bounds.min(), bounds.width(), bounds.height());
    let size = w.min(h);

    let mut best = bounds.center();
    let mut best_distance = sdf(best);
    for &seed in seeds {
        let d = sdf(seed);
        if d > best_distance {
            best = seed;
            best_distance = d;
        }
    }
    if !(size > 0.0) {
        return (best, best_distance);
    }

    let half = size / 2.0;
    let mut queue = BinaryHeap::new();
    let mut y = min.y;
    while y < min.y + h {
        let mut x = min.x;
        while x < min.x + w {
            queue.push(Cell::new(Coord { x: x + half, y: y + half }, half, &sdf));
            x += size;
        }
        y += size;
    }

    let mut visited = queue.len();
    while let Some(cell) = queue.pop() {
        if cell.distance > best_distance {
            best = cell.center;
            best_distance = cell.distance;
        }
        if cell.potential - best_distance <= tolerance || visited >= MAX_CELLS {
            continue;
        }

        let q = cell.half / 2.0;
        for (dx, dy) in [(-q, -q), (q, -q), (-q, q), (q, q)] {
            let center = Coord {
                x: cell.center.x + dx,
                y: cell.center.y + dy,
            };
            queue.push(Cell::new(center, q, &sdf));
        }
        visited += 4;
    }

    (best, best_distance)
}
