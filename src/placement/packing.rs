//! Greedy circle packing of the largest uncovered pieces of a polygon.

use geo::{BoundingRect, Contains, Coord, EuclideanDistance, MultiPolygon, Point, Rect};

use super::grid::{distance_transform, CellGrid, Components};
use super::polylabel::pole_of_inaccessibility;

/// Grid resolution used to split the uncovered region into pieces.
const PACKING_GRID_CELLS: usize = 256;

/// Stop conditions of [`pack_circles`], all lengths in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackingParams {
    pub max_iterations: usize,
    /// Pole search tolerance.
    pub tolerance: f64,
    /// Circles below this radius end the packing.
    pub min_radius: f64,
    /// Radius ratio to the first circle under which packing stops, once the
    /// uncovered area fraction is at most `max_rest_area`.
    pub min_radius_ratio: f64,
    pub max_rest_area: f64,
}

impl Default for PackingParams {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            tolerance: 0.001,
            min_radius: 0.008,
            min_radius_ratio: 0.45,
            max_rest_area: 0.40,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackingCircle {
    pub center: Point<f64>,
    /// Radius in degrees.
    pub radius: f64,
    /// Glyph size in output pixels, when large enough to draw.
    pub glyph_px: Option<f64>,
}

/// Signed distance to the boundary of `polygon`, positive inside.
fn polygon_sdf(polygon: &MultiPolygon<f64>, p: Coord<f64>) -> f64 {
    let point = Point::from(p);
    let distance = polygon
        .iter()
        .flat_map(|poly| std::iter::once(poly.exterior()).chain(poly.interiors()))
        .map(|ring| point.euclidean_distance(ring))
        .fold(f64::INFINITY, f64::min);
    if polygon.contains(&point) {
        distance
    } else {
        -distance
    }
}

/// Signed distance to the uncovered region: inside the polygon and outside
/// every placed disc.
fn region_sdf(polygon: &MultiPolygon<f64>, discs: &[PackingCircle], p: Coord<f64>) -> f64 {
    discs.iter().fold(polygon_sdf(polygon, p), |d, c| {
        let to_disc = (p.x - c.center.x()).hypot(p.y - c.center.y()) - c.radius;
        d.min(to_disc)
    })
}

/// Packs up to `max_iterations` circles into `polygon`, largest first.
///
/// Each circle is the largest inscribed circle of the biggest uncovered
/// piece. Packing ends when a radius drops below the absolute minimum, or
/// below `min_radius_ratio` of the first radius while no more than
/// `max_rest_area` of the polygon is left uncovered.
pub fn pack_circles(polygon: &MultiPolygon<f64>, params: &PackingParams) -> Vec<PackingCircle> {
    let Some(grid) = CellGrid::rasterize(polygon, PACKING_GRID_CELLS) else {
        return Vec::new();
    };
    let total = grid.inside.iter().filter(|&&b| b).count();
    if total == 0 {
        return Vec::new();
    }

    let mut covered = vec![false; grid.inside.len()];
    let mut circles: Vec<PackingCircle> = Vec::new();
    let mut r_max: Option<f64> = None;

    for _ in 0..params.max_iterations {
        let remaining: Vec<bool> = grid
            .inside
            .iter()
            .zip(&covered)
            .map(|(&inside, &done)| inside && !done)
            .collect();
        let pieces = Components::label(&remaining, grid.width, grid.height);
        let Some(target) = pieces.largest() else {
            break;
        };
        let rest = remaining.iter().filter(|&&b| b).count() as f64 / total as f64;

        let cells: Vec<usize> = (0..remaining.len())
            .filter(|&i| pieces.labels[i] == target)
            .collect();
        let Some(bounds) = piece_bounds(&grid, &cells) else {
            break;
        };
        let piece_mask: Vec<bool> = pieces.labels.iter().map(|&l| l == target).collect();
        let depth = distance_transform(&piece_mask, grid.width, grid.height);
        let seeds: Vec<Coord<f64>> = cells
            .iter()
            .copied()
            .max_by(|&a, &b| depth[a].total_cmp(&depth[b]))
            .map(|i| grid.center(i))
            .into_iter()
            .collect();

        let in_target = |p: Coord<f64>| {
            grid.index_of(p)
                .map_or(false, |i| pieces.labels[i] == target)
        };
        let (pole, radius) = pole_of_inaccessibility(bounds, params.tolerance, &seeds, |p| {
            let d = region_sdf(polygon, &circles, p);
            if in_target(p) {
                d
            } else {
                -d.abs()
            }
        });

        if radius < params.min_radius {
            break;
        }
        match r_max {
            None => r_max = Some(radius),
            Some(first) => {
                if radius / first < params.min_radius_ratio && rest <= params.max_rest_area {
                    break;
                }
            }
        }

        for (i, done) in covered.iter_mut().enumerate() {
            let c = grid.center(i);
            if (c.x - pole.x).hypot(c.y - pole.y) <= radius {
                *done = true;
            }
        }
        circles.push(PackingCircle {
            center: pole.into(),
            radius,
            glyph_px: None,
        });
    }

    circles.sort_by(|a, b| b.radius.total_cmp(&a.radius));
    circles
}

/// Cell-aligned bounds of a set of grid cells.
fn piece_bounds(grid: &CellGrid, cells: &[usize]) -> Option<Rect<f64>> {
    let half = grid.cell / 2.0;
    let rect = cells
        .iter()
        .map(|&i| grid.center(i))
        .map(|c| Point::from(c))
        .collect::<geo::MultiPoint<f64>>()
        .bounding_rect()?;
    Some(Rect::new(
        Coord {
            x: rect.min().x - half,
            y: rect.min().y - half,
        },
        Coord {
            x: rect.max().x + half,
            y: rect.max().y + half,
        },
    ))
}

/// Sizes one glyph per circle: the circle diameter in pixels scaled by
/// `fill_factor`, floored to whole pixels. Circles below `min_px` keep no
/// glyph.
pub fn annotate_glyphs(
    circles: &mut [PackingCircle],
    px_per_degree: f64,
    fill_factor: f64,
    min_px: f64,
) {
    for circle in circles {
        let size = (2.0 * circle.radius * px_per_degree * fill_factor).floor();
        circle.glyph_px = (size >= min_px).then_some(size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Area};

    fn square(side: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0), (x: side, y: 0.0), (x: side, y: side), (x: 0.0, y: side)
        ]])
    }

    #[test]
    fn test_unit_square_packing_terminates_and_covers() {
        let params = PackingParams::default();
        let shape = square(1.0);
        let circles = pack_circles(&shape, &params);

        assert!(!circles.is_empty());
        assert!(circles.len() <= params.max_iterations);
        assert!((circles[0].radius - 0.5).abs() <= 2.0 * params.tolerance);

        let covered: f64 = circles
            .iter()
            .map(|c| std::f64::consts::PI * c.radius * c.radius)
            .sum();
        assert!(covered / shape.unsigned_area() >= 1.0 - params.max_rest_area);
    }

    #[test]
    fn test_elongated_polygon_gets_several_disjoint_circles() {
        let bar = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0), (x: 4.0, y: 0.0), (x: 4.0, y: 1.0), (x: 0.0, y: 1.0)
        ]]);
        let params = PackingParams::default();
        let circles = pack_circles(&bar, &params);

        assert!(circles.len() >= 3);
        for c in &circles {
            assert!(bar.contains(&c.center));
        }
        for (i, a) in circles.iter().enumerate() {
            for b in &circles[i + 1..] {
                let d = (a.center.x() - b.center.x()).hypot(a.center.y() - b.center.y());
                assert!(d >= a.radius + b.radius - 2.0 * params.tolerance);
            }
        }
    }

    #[test]
    fn test_circles_are_largest_first() {
        let l_shape = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0), (x: 3.0, y: 0.0), (x: 3.0, y: 1.0), (x: 1.0, y: 1.0),
            (x: 1.0, y: 2.0), (x: 0.0, y: 2.0),
        ]]);
        let circles = pack_circles(&l_shape, &PackingParams::default());
        assert!(circles.windows(2).all(|w| w[0].radius >= w[1].radius));
    }

    #[test]
    fn test_tiny_polygon_yields_no_circle() {
        let circles = pack_circles(&square(0.01), &PackingParams::default());
        assert!(circles.is_empty());
    }

    #[test]
    fn test_iteration_cap_is_respected() {
        let params = PackingParams {
            max_iterations: 2,
            min_radius_ratio: 0.0,
            max_rest_area: 1.0,
            ..PackingParams::default()
        };
        let bar = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 1.0), (x: 0.0, y: 1.0)
        ]]);
        assert_eq!(pack_circles(&bar, &params).len(), 2);
    }

    #[test]
    fn test_small_glyphs_are_dropped() {
        let mut circles = vec![
            PackingCircle {
                center: Point::new(0.0, 0.0),
                radius: 0.1,
                glyph_px: None,
            },
            PackingCircle {
                center: Point::new(1.0, 0.0),
                radius: 0.01,
                glyph_px: None,
            },
        ];
        annotate_glyphs(&mut circles, 1000.0, 0.5, 93.0);
        assert_eq!(circles[0].glyph_px, Some(100.0));
        assert_eq!(circles[1].glyph_px, None);
    }
}
