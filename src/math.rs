//! Geographic extents, affine geo-transforms and the shared raster frame.

use serde::Deserialize;

use crate::error::{MapError, Result};

const MAX_DIMENSION: u32 = 20000;

/// Bounding box in WGS84 coordinates (longitude, latitude).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Bbox {
    /// Western edge (degrees longitude).
    pub west: f64,
    /// Southern edge (degrees latitude).
    pub south: f64,
    /// Eastern edge (degrees longitude).
    pub east: f64,
    /// Northern edge (degrees latitude).
    pub north: f64,
}

impl Bbox {
    /// Creates a bounding box, rejecting inverted or empty extents.
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Result<Self> {
        let bbox = Self {
            west,
            south,
            east,
            north,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.west < self.east) {
            return Err(MapError::InvalidBbox(format!(
                "west ({}) must be less than east ({})",
                self.west, self.east
            )));
        }
        if !(self.south < self.north) {
            return Err(MapError::InvalidBbox(format!(
                "south ({}) must be less than north ({})",
                self.south, self.north
            )));
        }
        Ok(())
    }

    /// Returns the width of the bbox in degrees.
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    /// Returns the height of the bbox in degrees.
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    pub fn mid_lat(&self) -> f64 {
        (self.south + self.north) / 2.0
    }

    /// The bbox grown by `deg` degrees on every side.
    pub fn buffered(&self, deg: f64) -> Bbox {
        Bbox {
            west: self.west - deg,
            south: self.south - deg,
            east: self.east + deg,
            north: self.north + deg,
        }
    }

    pub fn to_rect(&self) -> geo::Rect<f64> {
        geo::Rect::new(
            geo::coord! { x: self.west, y: self.south },
            geo::coord! { x: self.east, y: self.north },
        )
    }
}

/// North-up affine transform between pixel (col, row) and world (lon, lat).
///
/// `x = c + col * a`, `y = f + row * e` with `e < 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub a: f64,
    pub c: f64,
    pub e: f64,
    pub f: f64,
}

impl GeoTransform {
    /// Maps `bbox` onto a `width` x `height` pixel grid.
    pub fn from_bounds(bbox: &Bbox, width: u32, height: u32) -> Self {
        Self {
            a: bbox.width() / width as f64,
            c: bbox.west,
            e: -bbox.height() / height as f64,
            f: bbox.north,
        }
    }

    /// World coordinates to fractional pixel coordinates (col, row).
    pub fn world_to_pixel(&self, lon: f64, lat: f64) -> (f64, f64) {
        ((lon - self.c) / self.a, (lat - self.f) / self.e)
    }

    /// Fractional pixel coordinates (col, row) to world coordinates.
    pub fn pixel_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        (self.c + col * self.a, self.f + row * self.e)
    }

    /// Same extent, pixel grid `factor` times finer.
    pub fn scaled(&self, factor: u32) -> Self {
        Self {
            a: self.a / factor as f64,
            c: self.c,
            e: self.e / factor as f64,
            f: self.f,
        }
    }
}

/// Long-edge / short-edge pixel caps for the basemap.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PixelBudget {
    pub long_edge: u32,
    pub short_edge: u32,
}

impl Default for PixelBudget {
    fn default() -> Self {
        Self {
            long_edge: 7680,
            short_edge: 4320,
        }
    }
}

/// Calculate image dimensions (width, height) from the bbox aspect ratio
/// corrected by cos(mid latitude), capped by the pixel budget.
pub fn calculate_dimensions(bbox: &Bbox, budget: &PixelBudget) -> (u32, u32) {
    let aspect = bbox.width() * bbox.mid_lat().to_radians().cos() / bbox.height();
    let long = budget.long_edge as f64;

    let (mut w, mut h) = if aspect >= 1.0 {
        (long, long / aspect)
    } else {
        (long * aspect, long)
    };

    let short = w.min(h);
    if short > budget.short_edge as f64 {
        let s = budget.short_edge as f64 / short;
        w *= s;
        h *= s;
    }

    ((w as u32).max(1), (h as u32).max(1))
}

/// Extent, pixel size and transform shared by every layer of one region.
///
/// The only constructor derives the dimensions from the bbox and the pixel
/// budget, so two frames built from the same inputs are always congruent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterFrame {
    bbox: Bbox,
    width: u32,
    height: u32,
    transform: GeoTransform,
}

impl RasterFrame {
    pub fn for_budget(bbox: Bbox, budget: &PixelBudget) -> Result<Self> {
        bbox.validate()?;
        let (width, height) = calculate_dimensions(&bbox, budget);

        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(MapError::ImageTooLarge {
                width,
                height,
                max: MAX_DIMENSION,
            });
        }

        Ok(Self {
            bbox,
            width,
            height,
            transform: GeoTransform::from_bounds(&bbox, width, height),
        })
    }

    /// Frame of arbitrary size over `bbox`, for tests that need exact
    /// pixel grids.
    #[cfg(test)]
    pub(crate) fn with_size(bbox: Bbox, width: u32, height: u32) -> Self {
        Self {
            bbox,
            width,
            height,
            transform: GeoTransform::from_bounds(&bbox, width, height),
        }
    }

    pub fn bbox(&self) -> &Bbox {
        &self.bbox
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Same extent at `factor` times the linear resolution.
    pub fn supersampled(&self, factor: u32) -> RasterFrame {
        RasterFrame {
            bbox: self.bbox,
            width: self.width * factor,
            height: self.height * factor,
            transform: self.transform.scaled(factor),
        }
    }

    /// Output pixels per degree of latitude.
    pub fn px_per_degree_lat(&self) -> f64 {
        self.height as f64 / self.bbox.height()
    }

    /// World coordinates to fractional pixel coordinates.
    pub fn world_to_pixel(&self, lon: f64, lat: f64) -> (f64, f64) {
        self.transform.world_to_pixel(lon, lat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ostalpen() -> Bbox {
        Bbox::new(9.05, 45.2, 16.82, 48.62).unwrap()
    }

    #[test]
    fn test_bbox_dimensions() {
        let bbox = Bbox::new(-4.5, 48.0, -4.0, 48.5).unwrap();
        assert!((bbox.width() - 0.5).abs() < 1e-10);
        assert!((bbox.height() - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_bbox_rejects_inverted() {
        let err = Bbox::new(10.0, 45.0, 9.0, 46.0).unwrap_err();
        assert!(err.to_string().contains("west"));
        let err = Bbox::new(9.0, 46.0, 10.0, 46.0).unwrap_err();
        assert!(err.to_string().contains("south"));
    }

    #[test]
    fn test_buffered() {
        let b = ostalpen().buffered(0.2);
        assert!((b.west - 8.85).abs() < 1e-10);
        assert!((b.north - 48.82).abs() < 1e-10);
    }

    #[test]
    fn test_landscape_dimensions_hit_long_edge() {
        let budget = PixelBudget {
            long_edge: 7680,
            short_edge: 7680,
        };
        let (w, h) = calculate_dimensions(&ostalpen(), &budget);
        assert_eq!(w, 7680);
        // aspect = 7.77 * cos(46.91°) / 3.42 ~= 1.551
        assert!(h > 4900 && h < 5000, "h = {}", h);
    }

    #[test]
    fn test_landscape_dimensions_capped_by_short_edge() {
        let (w, h) = calculate_dimensions(&ostalpen(), &PixelBudget::default());
        assert!((4319..=4320).contains(&h), "h = {}", h);
        assert!(w > 6650 && w < 6750, "w = {}", w);
    }

    #[test]
    fn test_short_edge_cap_applies() {
        // Nearly square region: the short edge is capped at 4320.
        let bbox = Bbox::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let (w, h) = calculate_dimensions(&bbox, &PixelBudget::default());
        assert!(w <= 4320 && h <= 4320);
        assert!(w.max(h) == 4320);
    }

    #[test]
    fn test_portrait_dimensions() {
        let bbox = Bbox::new(0.0, 0.0, 1.0, 4.0).unwrap();
        let budget = PixelBudget {
            long_edge: 400,
            short_edge: 300,
        };
        let (w, h) = calculate_dimensions(&bbox, &budget);
        assert_eq!(h, 400);
        // cos(2°) shaves a fraction of a pixel off the width.
        assert_eq!(w, 99);
    }

    #[test]
    fn test_transform_round_trip_corners() {
        let bbox = Bbox::new(0.0, 0.0, 2.0, 1.0).unwrap();
        let t = GeoTransform::from_bounds(&bbox, 200, 100);
        let (col, row) = t.world_to_pixel(0.0, 1.0);
        assert!(col.abs() < 1e-10 && row.abs() < 1e-10);
        let (col, row) = t.world_to_pixel(2.0, 0.0);
        assert!((col - 200.0).abs() < 1e-10 && (row - 100.0).abs() < 1e-10);
        let (lon, lat) = t.pixel_to_world(100.0, 50.0);
        assert!((lon - 1.0).abs() < 1e-10 && (lat - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_supersampled_frame_keeps_extent() {
        let frame = RasterFrame::for_budget(
            Bbox::new(0.0, 0.0, 1.0, 1.0).unwrap(),
            &PixelBudget {
                long_edge: 64,
                short_edge: 64,
            },
        )
        .unwrap();
        let ss = frame.supersampled(2);
        assert_eq!(ss.dimensions(), (frame.width() * 2, frame.height() * 2));
        let (col, row) = ss.world_to_pixel(1.0, 0.0);
        assert!((col - ss.width() as f64).abs() < 1e-9);
        assert!((row - ss.height() as f64).abs() < 1e-9);
    }

    #[test]
    fn test_frame_too_large() {
        let budget = PixelBudget {
            long_edge: 50000,
            short_edge: 50000,
        };
        let result = RasterFrame::for_budget(ostalpen(), &budget);
        assert!(matches!(result, Err(MapError::ImageTooLarge { .. })));
    }
}
