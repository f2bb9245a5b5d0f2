//! Elevation rasters: GeoTIFF loading, load-time decimation and windowed
//! cubic resampling onto an output pixel grid.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use rayon::prelude::*;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use crate::error::{MapError, Result};
use crate::logger;
use crate::math::{Bbox, GeoTransform};

/// Output pixels of padding kept around the window so later gradients have
/// real neighbours at the frame edges.
pub const HS_BUF: usize = 4;

/// Samples below this are no-data or bogus sinks and are read as sea level.
const SENTINEL_FLOOR: f32 = -100.0;

/// Row-major grid of elevation samples.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationGrid {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl ElevationGrid {
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != width * height {
            return Err(MapError::UnsupportedDem(format!(
                "{} samples for a {}x{} grid",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn filled(width: usize, height: usize, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    #[inline]
    pub fn get(&self, col: usize, row: usize) -> f32 {
        self.data[row * self.width + col]
    }

    /// Replaces sentinel and NaN samples with 0.
    fn floor_sentinels(&mut self) {
        for v in &mut self.data {
            if v.is_nan() || *v < SENTINEL_FLOOR {
                *v = 0.0;
            }
        }
    }
}

/// An elevation grid with its geo-transform.
#[derive(Debug, Clone)]
pub struct DemRaster {
    pub grid: ElevationGrid,
    pub transform: GeoTransform,
}

impl DemRaster {
    pub fn new(grid: ElevationGrid, transform: GeoTransform) -> Self {
        Self { grid, transform }
    }

    pub fn width(&self) -> usize {
        self.grid.width
    }

    pub fn height(&self) -> usize {
        self.grid.height
    }

    /// True when the raster extent contains all of `bbox`.
    pub fn covers(&self, bbox: &Bbox) -> bool {
        let t = self.transform;
        let east = t.c + self.width() as f64 * t.a;
        let south = t.f + self.height() as f64 * t.e;
        t.c <= bbox.west && east >= bbox.east && south <= bbox.south && t.f >= bbox.north
    }

    /// Reads the first band of a GeoTIFF and decimates it when either side
    /// exceeds `threshold`.
    pub fn load_geotiff(path: &Path, threshold: usize) -> Result<Self> {
        if !path.exists() {
            return Err(MapError::FileNotFound(path.display().to_string()));
        }

        let reader = BufReader::new(File::open(path)?);
        let mut decoder = Decoder::new(reader)?.with_limits(Limits::unlimited());
        let (width, height) = decoder.dimensions()?;
        let transform = read_geotransform(&mut decoder)?;

        let samples = first_band(decoder.read_image()?, width as usize * height as usize)?;
        let mut grid = ElevationGrid::new(width as usize, height as usize, samples)?;
        grid.floor_sentinels();

        let raster = Self::new(grid, transform);
        let factor = decimation_factor(raster.width(), raster.height(), threshold);
        logger::debug(&format!(
            "DEM {}: {}x{} samples, decimation {}x",
            path.display(),
            width,
            height,
            factor
        ));
        Ok(raster.decimated(factor))
    }

    /// Cubic downsampling by an integer factor, keeping the extent.
    pub fn decimated(self, factor: usize) -> Self {
        if factor <= 1 {
            return self;
        }
        let out_w = (self.width() / factor).max(1);
        let out_h = (self.height() / factor).max(1);
        let cols = AxisMap::spanning(self.width(), out_w);
        let rows = AxisMap::spanning(self.height(), out_h);
        let mut grid = resample_cubic(&self.grid, cols, rows, out_w, out_h);
        grid.floor_sentinels();

        let t = self.transform;
        let transform = GeoTransform {
            a: t.a * self.width() as f64 / out_w as f64,
            c: t.c,
            e: t.e * self.height() as f64 / out_h as f64,
            f: t.f,
        };
        Self::new(grid, transform)
    }
}

/// `max(1, w / threshold, h / threshold)` with integer division.
pub fn decimation_factor(width: usize, height: usize, threshold: usize) -> usize {
    if threshold == 0 {
        return 1;
    }
    (width / threshold).max(height / threshold).max(1)
}

fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Result<GeoTransform> {
    if let Some(m) = f64_tag(decoder, Tag::ModelTransformationTag)? {
        if m.len() < 8 {
            return Err(MapError::UnsupportedDem(
                "short ModelTransformation tag".to_string(),
            ));
        }
        if m[1] != 0.0 || m[4] != 0.0 {
            return Err(MapError::UnsupportedDem(
                "rotated rasters are not supported".to_string(),
            ));
        }
        return Ok(GeoTransform {
            a: m[0],
            c: m[3],
            e: m[5],
            f: m[7],
        });
    }

    let scale = f64_tag(decoder, Tag::ModelPixelScaleTag)?;
    let tie = f64_tag(decoder, Tag::ModelTiepointTag)?;
    match (scale, tie) {
        (Some(scale), Some(tie)) if scale.len() >= 2 && tie.len() >= 6 => {
            let a = scale[0];
            let e = -scale[1];
            Ok(GeoTransform {
                a,
                c: tie[3] - tie[0] * a,
                e,
                f: tie[4] - tie[1] * e,
            })
        }
        _ => Err(MapError::UnsupportedDem(
            "missing GeoTIFF georeferencing tags".to_string(),
        )),
    }
}

fn f64_tag<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    tag: Tag,
) -> Result<Option<Vec<f64>>> {
    match decoder.find_tag(tag)? {
        Some(value) => Ok(Some(value.into_f64_vec()?)),
        None => Ok(None),
    }
}

/// First band of an interleaved decode result as f32.
fn first_band(result: DecodingResult, pixels: usize) -> Result<Vec<f32>> {
    fn pick<T: Copy>(v: &[T], pixels: usize, conv: impl Fn(T) -> f32) -> Result<Vec<f32>> {
        if pixels == 0 || v.len() < pixels {
            return Err(MapError::UnsupportedDem(format!(
                "{} samples for {} pixels",
                v.len(),
                pixels
            )));
        }
        let stride = v.len() / pixels;
        Ok(v.iter().step_by(stride).take(pixels).map(|&s| conv(s)).collect())
    }

    #[allow(unreachable_patterns)]
    match result {
        DecodingResult::U8(v) => pick(&v, pixels, |s| s as f32),
        DecodingResult::U16(v) => pick(&v, pixels, |s| s as f32),
        DecodingResult::U32(v) => pick(&v, pixels, |s| s as f32),
        DecodingResult::U64(v) => pick(&v, pixels, |s| s as f32),
        DecodingResult::I8(v) => pick(&v, pixels, |s| s as f32),
        DecodingResult::I16(v) => pick(&v, pixels, |s| s as f32),
        DecodingResult::I32(v) => pick(&v, pixels, |s| s as f32),
        DecodingResult::I64(v) => pick(&v, pixels, |s| s as f32),
        DecodingResult::F32(v) => pick(&v, pixels, |s| s),
        DecodingResult::F64(v) => pick(&v, pixels, |s| s as f32),
        _ => Err(MapError::UnsupportedDem("unsupported sample format".to_string())),
    }
}

/// Maps output pixel `i` of one axis onto the source: its centre sits at
/// source coordinate `origin + (i + 0.5) * scale`, in pixel-edge units.
#[derive(Debug, Clone, Copy, PartialEq)]
struct AxisMap {
    origin: f64,
    scale: f64,
}

impl AxisMap {
    /// `out` pixels covering source pixels `0..span`.
    fn spanning(span: usize, out: usize) -> Self {
        Self {
            origin: 0.0,
            scale: span as f64 / out as f64,
        }
    }
}

/// Keys cubic convolution kernel, a = -0.5.
fn cubic_weight(x: f64) -> f64 {
    const A: f64 = -0.5;
    let x = x.abs();
    if x <= 1.0 {
        ((A + 2.0) * x - (A + 3.0)) * x * x + 1.0
    } else if x < 2.0 {
        ((A * x - 5.0 * A) * x + 8.0 * A) * x - 4.0 * A
    } else {
        0.0
    }
}

/// Taps for each output index along one axis: four clamped source indices
/// and their weights.
fn axis_taps(map: AxisMap, limit: usize, out: usize) -> Vec<([usize; 4], [f64; 4])> {
    let max = limit.saturating_sub(1) as i64;
    (0..out)
        .map(|i| {
            let center = map.origin + (i as f64 + 0.5) * map.scale - 0.5;
            let base = center.floor();
            let frac = center - base;
            let mut idx = [0usize; 4];
            let mut w = [0.0f64; 4];
            for k in 0..4 {
                let offset = k as i64 - 1;
                idx[k] = (base as i64 + offset).clamp(0, max) as usize;
                w[k] = cubic_weight(frac - offset as f64);
            }
            (idx, w)
        })
        .collect()
}

fn resample_cubic(
    src: &ElevationGrid,
    col_map: AxisMap,
    row_map: AxisMap,
    out_w: usize,
    out_h: usize,
) -> ElevationGrid {
    let cols = axis_taps(col_map, src.width, out_w);
    let rows = axis_taps(row_map, src.height, out_h);
    let mut data = vec![0.0f32; out_w * out_h];

    data.par_chunks_mut(out_w)
        .zip(rows.par_iter())
        .for_each(|(line, (ridx, rw))| {
            for (px, (cidx, cw)) in line.iter_mut().zip(cols.iter()) {
                let mut acc = 0.0f64;
                for (r, wr) in ridx.iter().zip(rw.iter()) {
                    let mut row_acc = 0.0f64;
                    for (c, wc) in cidx.iter().zip(cw.iter()) {
                        row_acc += src.get(*c, *r) as f64 * wc;
                    }
                    acc += row_acc * wr;
                }
                *px = acc as f32;
            }
        });

    ElevationGrid {
        width: out_w,
        height: out_h,
        data,
    }
}

/// Resampled elevations for one output frame plus its padding.
#[derive(Debug, Clone)]
pub struct DemWindow {
    /// Padded grid, `width + buf_left + HS_BUF` by `height + buf_top + HS_BUF`.
    pub grid: ElevationGrid,
    pub buf_left: usize,
    pub buf_top: usize,
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
}

impl DemWindow {
    /// Copies the unpadded `width` x `height` region out of a padded
    /// per-sample buffer laid out like `grid`.
    pub fn crop<T: Copy>(&self, padded: &[T]) -> Vec<T> {
        let stride = self.grid.width;
        let mut out = Vec::with_capacity(self.width * self.height);
        for row in self.buf_top..self.buf_top + self.height {
            let start = row * stride + self.buf_left;
            out.extend_from_slice(&padded[start..start + self.width]);
        }
        out
    }
}

/// Windowed reads from a loaded elevation raster.
pub struct DemSampler<'a> {
    raster: &'a DemRaster,
}

impl<'a> DemSampler<'a> {
    pub fn new(raster: &'a DemRaster) -> Self {
        Self { raster }
    }

    /// Resamples the part of the raster under `bbox` onto a `width` x
    /// `height` grid, padded by up to [`HS_BUF`] pixels where the raster
    /// extends past the box.
    pub fn sample(&self, bbox: &Bbox, width: u32, height: u32) -> Result<DemWindow> {
        let t = self.raster.transform;
        let (src_w, src_h) = (self.raster.width() as i64, self.raster.height() as i64);
        let (w_px, h_px) = (width as usize, height as usize);

        let col_off = (bbox.west - t.c) / t.a;
        let row_off = (bbox.north - t.f) / t.e;
        let win_w = bbox.width() / t.a;
        let win_h = bbox.height() / -t.e;

        let sx = win_w / w_px as f64;
        let sy = win_h / h_px as f64;
        let buf_src_x = (HS_BUF as f64 * sx + 1.0) as i64;
        let buf_src_y = (HS_BUF as f64 * sy + 1.0) as i64;

        let col0 = (col_off.trunc() as i64 - buf_src_x).max(0);
        let row0 = (row_off.trunc() as i64 - buf_src_y).max(0);
        let col_end = ((col_off + win_w).trunc() as i64 + buf_src_x).min(src_w);
        let row_end = ((row_off + win_h).trunc() as i64 + buf_src_y).min(src_h);

        if col_end <= col0 || row_end <= row0 {
            return Err(MapError::DemOutsideBbox);
        }

        let buf_left = pad(col_off, col0, sx);
        let buf_top = pad(row_off, row0, sy);
        let read_w = w_px + buf_left + HS_BUF;
        let read_h = h_px + buf_top + HS_BUF;

        // Padding pixels share the frame's pixel size, so padded pixel
        // `buf_left + i` lands exactly on frame pixel `i`.
        let col_map = AxisMap {
            origin: col_off - buf_left as f64 * sx,
            scale: sx,
        };
        let row_map = AxisMap {
            origin: row_off - buf_top as f64 * sy,
            scale: sy,
        };
        let mut grid = resample_cubic(&self.raster.grid, col_map, row_map, read_w, read_h);
        grid.floor_sentinels();

        let transform = GeoTransform {
            a: t.a * sx,
            c: t.c + col_map.origin * t.a,
            e: t.e * sy,
            f: t.f + row_map.origin * t.e,
        };

        logger::debug(&format!(
            "DEM window: {}x{} at {:.3}x{:.3} source pixels each (pad left {}, top {})",
            read_w, read_h, sx, sy, buf_left, buf_top
        ));

        Ok(DemWindow {
            grid,
            buf_left,
            buf_top,
            width: w_px,
            height: h_px,
            transform,
        })
    }
}

/// Output pixels of leading padding actually available in the source.
fn pad(offset: f64, start: i64, scale: f64) -> usize {
    let available = (offset.trunc() as i64 - start) as f64 / scale;
    (available.trunc().max(0.0) as usize).min(HS_BUF)
}
