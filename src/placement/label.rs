//! Interior label points by iterative erosion.

use geo::{BoundingRect, Coord, InteriorPoint, MultiPolygon, Point};

use super::grid::{distance_transform, CellGrid, Components};

/// Grid resolution across the longer side of the polygon.
const LABEL_GRID_CELLS: usize = 256;

/// Label anchor for `polygon`.
///
/// The polygon is eroded by `diag * fraction` for each fraction in turn.
/// The first erosion leaving anything yields the centroid of its largest
/// piece, or the deepest point of that piece when the centroid falls
/// outside it. When every erosion is empty an interior point is returned.
pub fn label_point(polygon: &MultiPolygon<f64>, fractions: &[f64]) -> Option<Point<f64>> {
    let rect = polygon.bounding_rect()?;
    let diag = rect.width().hypot(rect.height());

    if let Some(grid) = CellGrid::rasterize(polygon, LABEL_GRID_CELLS) {
        let depth = distance_transform(&grid.inside, grid.width, grid.height);
        for &fraction in fractions {
            if let Some(p) = eroded_anchor(&grid, &depth, diag * fraction / grid.cell) {
                return Some(p.into());
            }
        }
    }

    polygon.interior_point()
}

fn eroded_anchor(grid: &CellGrid, depth: &[f64], erosion: f64) -> Option<Coord<f64>> {
    // Cell centres lie half a cell inside the boundary the transform measures.
    let eroded: Vec<bool> = depth.iter().map(|&d| d - 0.5 > erosion).collect();
    let pieces = Components::label(&eroded, grid.width, grid.height);
    let id = pieces.largest()?;

    let cells: Vec<usize> = (0..eroded.len())
        .filter(|&i| pieces.labels[i] == id)
        .collect();
    let n = cells.len() as f64;
    let (sx, sy) = cells.iter().fold((0.0, 0.0), |(sx, sy), &i| {
        let c = grid.center(i);
        (sx + c.x, sy + c.y)
    });
    let centroid = Coord {
        x: sx / n,
        y: sy / n,
    };

    match grid.index_of(centroid) {
        Some(i) if pieces.labels[i] == id => Some(centroid),
        _ => {
            let deepest = cells
                .iter()
                .copied()
                .max_by(|&a, &b| depth[a].total_cmp(&depth[b]))?;
            Some(grid.center(deepest))
        }
    }
}
