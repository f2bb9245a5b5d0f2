//! Raster rendering of vector geometry onto a `RasterFrame`.
//!
//! Fills use a scanline algorithm sampling pixel centres. Strokes are
//! rasterized as one quad per segment plus round joins, burned at a
//! supersampled resolution and box-filtered down to coverage alpha.

use geo::{Coord, LineString, Polygon};
use image::{GrayImage, Luma, Rgba, RgbaImage};
use rayon::prelude::*;

pub mod edge;

use crate::math::RasterFrame;
use edge::{ScanlineTable, Span};

/// Dash lengths in output pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DashPattern {
    pub on: f64,
    pub off: f64,
}

impl DashPattern {
    /// The `--` style: 3.7 on, 1.6 off, scaled by the line width.
    pub fn dashed(width_px: f64) -> Self {
        Self {
            on: 3.7 * width_px,
            off: 1.6 * width_px,
        }
    }

    fn scaled(&self, factor: f64) -> Self {
        Self {
            on: self.on * factor,
            off: self.off * factor,
        }
    }
}

/// Stroke appearance for overlay lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stroke {
    pub color: Rgba<u8>,
    /// Width in output pixels.
    pub width: f64,
    pub dash: Option<DashPattern>,
}

fn ring_to_pixels(ring: &LineString<f64>, frame: &RasterFrame) -> Vec<(f64, f64)> {
    ring.coords().map(|c| frame.world_to_pixel(c.x, c.y)).collect()
}

fn polygon_spans(polygon: &Polygon<f64>, frame: &RasterFrame) -> Vec<Span> {
    let mut rings = vec![ring_to_pixels(polygon.exterior(), frame)];
    rings.extend(polygon.interiors().iter().map(|r| ring_to_pixels(r, frame)));
    ScanlineTable::from_rings(&rings, frame.height()).spans(frame.width())
}

fn burn(mask: &mut GrayImage, spans: &[Span]) {
    for span in spans {
        for x in span.x0..span.x1 {
            mask.put_pixel(x, span.y, Luma([255]));
        }
    }
}

/// Inside mask (255 inside) of the union of `polygons`, even-odd within each
/// polygon.
pub fn fill_mask(polygons: &[Polygon<f64>], frame: &RasterFrame) -> GrayImage {
    let spans: Vec<Span> = polygons
        .par_iter()
        .flat_map_iter(|p| polygon_spans(p, frame))
        .collect();
    let mut mask = GrayImage::new(frame.width(), frame.height());
    burn(&mut mask, &spans);
    mask
}

/// Binary fill of `polygons` with `fill`, fully transparent elsewhere.
pub fn rasterize_fill(polygons: &[Polygon<f64>], frame: &RasterFrame, fill: Rgba<u8>) -> RgbaImage {
    let mask = fill_mask(polygons, frame);
    RgbaImage::from_fn(frame.width(), frame.height(), |x, y| {
        if mask.get_pixel(x, y).0[0] > 0 {
            fill
        } else {
            Rgba([0, 0, 0, 0])
        }
    })
}

/// Splits a polyline into its "on" pieces.
fn dash_polyline(points: &[(f64, f64)], dash: DashPattern) -> Vec<Vec<(f64, f64)>> {
    let period = dash.on + dash.off;
    if dash.on <= 0.0 || dash.off <= 0.0 {
        return vec![points.to_vec()];
    }

    let mut pieces = Vec::new();
    let mut current: Vec<(f64, f64)> = Vec::new();
    // Distance into the current period.
    let mut phase = 0.0;
    if let Some(&first) = points.first() {
        current.push(first);
    }

    for pair in points.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let len = ((b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)).sqrt();
        let mut t = 0.0;
        while t < len {
            let on = phase < dash.on;
            let boundary = if on { dash.on } else { period };
            let step = (boundary - phase).min(len - t);
            t += step;
            phase += step;
            let p = (a.0 + (b.0 - a.0) * t / len, a.1 + (b.1 - a.1) * t / len);
            if on {
                current.push(p);
            }
            if phase >= boundary {
                if on {
                    if current.len() >= 2 {
                        pieces.push(std::mem::take(&mut current));
                    }
                    current.clear();
                } else {
                    phase = 0.0;
                    current.push(p);
                }
            }
        }
    }
    if current.len() >= 2 {
        pieces.push(current);
    }
    pieces
}

/// Quad of half-width `hw` around segment `a`-`b`.
fn segment_quad(a: (f64, f64), b: (f64, f64), hw: f64) -> Option<Vec<(f64, f64)>> {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len = (dx * dx + dy * dy).sqrt();
    if len < 1e-12 {
        return None;
    }
    let (nx, ny) = (-dy / len * hw, dx / len * hw);
    Some(vec![
        (a.0 + nx, a.1 + ny),
        (b.0 + nx, b.1 + ny),
        (b.0 - nx, b.1 - ny),
        (a.0 - nx, a.1 - ny),
    ])
}

/// Pixel-centre spans of a disc.
fn disc_spans(center: (f64, f64), radius: f64, width: u32, height: u32) -> Vec<Span> {
    let y0 = ((center.1 - radius - 0.5).ceil() as i64).max(0);
    let y1 = ((center.1 + radius - 0.5).floor() as i64).min(height as i64 - 1);
    (y0..=y1)
        .filter_map(|y| {
            let dy = y as f64 + 0.5 - center.1;
            let half = (radius * radius - dy * dy).max(0.0).sqrt();
            let x0 = ((center.0 - half - 0.5).ceil() as i64).clamp(0, width as i64) as u32;
            let x1 = ((center.0 + half - 0.5).floor() as i64 + 1).clamp(0, width as i64) as u32;
            (x0 < x1).then_some(Span { y: y as u32, x0, x1 })
        })
        .collect()
}

fn polyline_spans(points: &[(f64, f64)], width_px: f64, width: u32, height: u32) -> Vec<Span> {
    let hw = width_px / 2.0;
    let mut spans = Vec::new();
    for pair in points.windows(2) {
        if let Some(quad) = segment_quad(pair[0], pair[1], hw) {
            spans.extend(ScanlineTable::from_rings(&[quad], height).spans(width));
        }
    }
    if width_px > 2.0 {
        for &p in points {
            spans.extend(disc_spans(p, hw, width, height));
        }
    }
    spans
}

/// Binary stroke mask of `lines` at the resolution of `frame`.
pub fn stroke_mask(
    lines: &[LineString<f64>],
    frame: &RasterFrame,
    width_px: f64,
    dash: Option<DashPattern>,
) -> GrayImage {
    let spans: Vec<Span> = lines
        .par_iter()
        .flat_map_iter(|line| {
            let points: Vec<(f64, f64)> = line
                .coords()
                .map(|c: &Coord<f64>| frame.world_to_pixel(c.x, c.y))
                .collect();
            let pieces = match dash {
                Some(d) => dash_polyline(&points, d),
                None => vec![points],
            };
            pieces
                .into_iter()
                .flat_map(|piece| polyline_spans(&piece, width_px, frame.width(), frame.height()))
                .collect::<Vec<_>>()
        })
        .collect();

    let mut mask = GrayImage::new(frame.width(), frame.height());
    burn(&mut mask, &spans);
    mask
}

/// Mean of `factor` x `factor` blocks, truncated.
pub fn downsample_mean(mask: &GrayImage, factor: u32) -> GrayImage {
    if factor <= 1 {
        return mask.clone();
    }
    let (w, h) = (mask.width() / factor, mask.height() / factor);
    let n = factor * factor;
    GrayImage::from_fn(w, h, |x, y| {
        let mut sum = 0u32;
        for dy in 0..factor {
            for dx in 0..factor {
                sum += mask.get_pixel(x * factor + dx, y * factor + dy).0[0] as u32;
            }
        }
        Luma([(sum / n) as u8])
    })
}

/// Supersampled stroke width: `max(1, round(width * ss))`.
pub fn supersampled_width(width_px: f64, ss: u32) -> f64 {
    ((width_px * ss as f64 + 0.5).floor()).max(1.0)
}

/// Anti-aliased coverage of `lines` at output resolution.
pub fn line_coverage(
    lines: &[LineString<f64>],
    frame: &RasterFrame,
    width_px: f64,
    ss: u32,
    dash: Option<DashPattern>,
) -> GrayImage {
    let ss = ss.max(1);
    let fine = frame.supersampled(ss);
    let dash = dash.map(|d| d.scaled(ss as f64));
    let mask = stroke_mask(lines, &fine, supersampled_width(width_px, ss), dash);
    downsample_mean(&mask, ss)
}

/// Lines in `color` with coverage alpha; RGB is `color` at every pixel.
pub fn rasterize_lines(
    lines: &[LineString<f64>],
    frame: &RasterFrame,
    color: [u8; 3],
    width_px: f64,
    ss: u32,
) -> RgbaImage {
    let alpha = line_coverage(lines, frame, width_px, ss, None);
    RgbaImage::from_fn(frame.width(), frame.height(), |x, y| {
        Rgba([color[0], color[1], color[2], alpha.get_pixel(x, y).0[0]])
    })
}

/// Alpha-blends `color` wherever `mask` is set, scaled by the mask value.
pub fn paint_mask(image: &mut RgbaImage, mask: &GrayImage, color: Rgba<u8>) {
    paint_mask_at(image, mask, 0, 0, color);
}

/// Like [`paint_mask`], with the mask's top-left corner at `(ox, oy)`.
/// Mask pixels that fall outside `image` are dropped.
pub fn paint_mask_at(image: &mut RgbaImage, mask: &GrayImage, ox: i64, oy: i64, color: Rgba<u8>) {
    let (w, h) = (image.width() as i64, image.height() as i64);
    for (x, y, m) in mask.enumerate_pixels() {
        let coverage = m.0[0];
        if coverage == 0 {
            continue;
        }
        let (tx, ty) = (ox + x as i64, oy + y as i64);
        if tx < 0 || ty < 0 || tx >= w || ty >= h {
            continue;
        }
        let a = (color.0[3] as u32 * coverage as u32 + 127) / 255;
        blend_pixel(image, tx as u32, ty as u32, Rgba([color.0[0], color.0[1], color.0[2], a as u8]));
    }
}

/// Blends `color` over the pixel rectangle `[x0, x1) x [y0, y1)`, clipped.
pub fn fill_rect(image: &mut RgbaImage, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgba<u8>) {
    let x0 = x0.max(0);
    let y0 = y0.max(0);
    let x1 = x1.min(image.width() as i64);
    let y1 = y1.min(image.height() as i64);
    for y in y0..y1 {
        for x in x0..x1 {
            blend_pixel(image, x as u32, y as u32, color);
        }
    }
}

/// Fills `polygons` onto an overlay.
pub fn draw_fill(image: &mut RgbaImage, polygons: &[Polygon<f64>], frame: &RasterFrame, color: Rgba<u8>) {
    let mask = fill_mask(polygons, frame);
    paint_mask(image, &mask, color);
}

/// Strokes `lines` onto an overlay with 2x anti-aliasing.
pub fn draw_lines(image: &mut RgbaImage, lines: &[LineString<f64>], frame: &RasterFrame, stroke: &Stroke) {
    let coverage = line_coverage(lines, frame, stroke.width, 2, stroke.dash);
    paint_mask(image, &coverage, stroke.color);
}

/// Solid disc centred on a pixel position.
pub fn draw_disc(image: &mut RgbaImage, center: (f64, f64), radius: f64, color: Rgba<u8>) {
    for span in disc_spans(center, radius, image.width(), image.height()) {
        for x in span.x0..span.x1 {
            blend_pixel(image, x, span.y, color);
        }
    }
}

/// Pixel window around `points` grown by `pad`, clipped to the image.
fn pixel_window(points: &[(f64, f64)], pad: f64, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for &(x, y) in points {
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }
    let x0 = (min_x - pad).floor().max(0.0);
    let y0 = (min_y - pad).floor().max(0.0);
    let x1 = (max_x + pad).ceil().min(width as f64);
    let y1 = (max_y + pad).ceil().min(height as f64);
    (x0 < x1 && y0 < y1).then(|| (x0 as u32, y0 as u32, x1 as u32, y1 as u32))
}

/// Fills a ring given in pixel coordinates and optionally outlines it with
/// `(colour, width_px)`, with `ss`x anti-aliasing.
///
/// Only the window around the ring is rasterized, so this suits small
/// marks such as point markers on a large overlay.
pub fn draw_pixel_shape(
    image: &mut RgbaImage,
    ring: &[(f64, f64)],
    fill: Rgba<u8>,
    edge: Option<(Rgba<u8>, f64)>,
    ss: u32,
) {
    let ss = ss.max(1);
    let pad = edge.map_or(0.0, |(_, w)| w / 2.0) + 1.0;
    let Some((x0, y0, x1, y1)) = pixel_window(ring, pad, image.width(), image.height()) else {
        return;
    };
    let (fine_w, fine_h) = ((x1 - x0) * ss, (y1 - y0) * ss);
    let k = ss as f64;
    let mut local: Vec<(f64, f64)> = ring
        .iter()
        .map(|&(x, y)| ((x - x0 as f64) * k, (y - y0 as f64) * k))
        .collect();

    let mut mask = GrayImage::new(fine_w, fine_h);
    burn(&mut mask, &ScanlineTable::from_rings(&[local.clone()], fine_h).spans(fine_w));
    paint_mask_at(image, &downsample_mean(&mask, ss), x0 as i64, y0 as i64, fill);

    let Some((color, width_px)) = edge else {
        return;
    };
    if let Some(&first) = local.first() {
        if local.last() != Some(&first) {
            local.push(first);
        }
    }
    let mut mask = GrayImage::new(fine_w, fine_h);
    burn(&mut mask, &polyline_spans(&local, supersampled_width(width_px, ss), fine_w, fine_h));
    paint_mask_at(image, &downsample_mean(&mask, ss), x0 as i64, y0 as i64, color);
}

/// Blend a pixel with alpha compositing (Porter-Duff 'Over' operator).
///
/// This performs standard alpha blending of the `src` color over the `dst` color.
pub fn blend_pixel(image: &mut RgbaImage, x: u32, y: u32, color: Rgba<u8>) {
    let dst = *image.get_pixel(x, y);
    let out = over(color, dst);
    image.put_pixel(x, y, out);
}

/// `src` over `dst`, rounded to the nearest integer.
pub fn over(src: Rgba<u8>, dst: Rgba<u8>) -> Rgba<u8> {
    let src_a = src.0[3] as f32 / 255.0;
    let dst_a = dst.0[3] as f32 / 255.0;

    let out_a = src_a + dst_a * (1.0 - src_a);

    if out_a == 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let blend = |s: u8, d: u8| -> u8 {
        let s = s as f32;
        let d = d as f32;
        ((s * src_a + d * dst_a * (1.0 - src_a)) / out_a).round() as u8
    };

    Rgba([
        blend(src.0[0], dst.0[0]),
        blend(src.0[1], dst.0[1]),
        blend(src.0[2], dst.0[2]),
        (out_a * 255.0).round() as u8,
    ])
}
