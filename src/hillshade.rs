//! Shaded relief with hypsometric tinting.
//!
//! The elevation window is clipped to `[0, max_elevation]`, tinted through a
//! 256-entry colour lookup table and blended with a directional-light
//! intensity computed from finite-difference surface normals.

use image::{GrayImage, Luma, Rgb, RgbImage};
use rayon::prelude::*;
use serde::Deserialize;

use crate::dem::{DemWindow, ElevationGrid};

const LUT_SIZE: usize = 256;

/// One colour stop: position in `0..=1` and an RGB triple in `0..=1`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RampStop(pub f64, pub f64, pub f64, pub f64);

/// Piecewise-linear colour ramp keyed by normalised elevation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct ColorRamp {
    stops: Vec<RampStop>,
}

impl Default for ColorRamp {
    /// Green lowlands, brown midlands, white peaks.
    fn default() -> Self {
        Self::new(vec![
            RampStop(0.00, 0.56, 0.70, 0.47),
            RampStop(0.15, 0.67, 0.78, 0.52),
            RampStop(0.30, 0.80, 0.78, 0.55),
            RampStop(0.45, 0.82, 0.72, 0.50),
            RampStop(0.60, 0.74, 0.60, 0.44),
            RampStop(0.75, 0.65, 0.52, 0.42),
            RampStop(0.88, 0.78, 0.75, 0.73),
            RampStop(1.00, 0.95, 0.95, 0.97),
        ])
    }
}

impl ColorRamp {
    pub fn new(mut stops: Vec<RampStop>) -> Self {
        stops.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { stops }
    }

    /// Linear interpolation between the stops around `x`.
    pub fn at(&self, x: f64) -> [f64; 3] {
        let (Some(first), Some(last)) = (self.stops.first(), self.stops.last()) else {
            return [0.0; 3];
        };
        if x <= first.0 {
            return [first.1, first.2, first.3];
        }
        if x >= last.0 {
            return [last.1, last.2, last.3];
        }
        for pair in self.stops.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if x <= hi.0 {
                let span = hi.0 - lo.0;
                let t = if span > 0.0 { (x - lo.0) / span } else { 1.0 };
                return [
                    lo.1 + (hi.1 - lo.1) * t,
                    lo.2 + (hi.2 - lo.2) * t,
                    lo.3 + (hi.3 - lo.3) * t,
                ];
            }
        }
        [last.1, last.2, last.3]
    }

    /// Samples the ramp at `i / (n - 1)` for `i in 0..n`.
    pub fn lut(&self, n: usize) -> Vec<[f64; 3]> {
        let denom = (n.max(2) - 1) as f64;
        (0..n).map(|i| self.at(i as f64 / denom)).collect()
    }
}

/// How relief intensity is merged into the tint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    #[default]
    Soft,
    Overlay,
    Hsv,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShadeParams {
    /// Light azimuth in degrees clockwise from north.
    pub azimuth: f64,
    /// Light altitude in degrees above the horizon.
    pub altitude: f64,
    pub vert_exag: f64,
    pub blend: BlendMode,
    pub max_elevation: f32,
    pub ocean: [u8; 3],
    pub ramp: ColorRamp,
}

impl Default for ShadeParams {
    fn default() -> Self {
        Self {
            azimuth: 315.0,
            altitude: 45.0,
            vert_exag: 0.05,
            blend: BlendMode::Soft,
            max_elevation: 4200.0,
            ocean: [0xc6, 0xdd, 0xf0],
            ramp: ColorRamp::default(),
        }
    }
}

impl ShadeParams {
    /// Unit vector pointing at the light source (x east, y north, z up).
    fn light_direction(&self) -> [f64; 3] {
        let az = (90.0 - self.azimuth).to_radians();
        let alt = self.altitude.to_radians();
        [az.cos() * alt.cos(), az.sin() * alt.cos(), alt.sin()]
    }
}

/// Shaded grid, same shape as the input.
#[derive(Debug, Clone)]
pub struct ShadedRelief {
    pub width: usize,
    pub height: usize,
    pub rgb: Vec<[u8; 3]>,
    pub ocean: Vec<bool>,
}

/// Shades an elevation grid.
///
/// Ocean is every sample at or below 0 m and is painted with the plain
/// ocean colour.
pub fn shade(grid: &ElevationGrid, params: &ShadeParams) -> ShadedRelief {
    let (w, h) = (grid.width, grid.height);
    let clipped: Vec<f64> = grid
        .data
        .iter()
        .map(|&v| v.clamp(0.0, params.max_elevation) as f64)
        .collect();

    let (vmin, vmax) = clipped
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let lut = params.ramp.lut(LUT_SIZE);
    let range = vmax - vmin;

    let intensity = relief_intensity(&clipped, w, h, params);

    let rgb: Vec<[u8; 3]> = clipped
        .par_iter()
        .zip(intensity.par_iter())
        .zip(grid.data.par_iter())
        .map(|((&z, &i), &raw)| {
            if raw <= 0.0 {
                return params.ocean;
            }
            let frac = if range > 0.0 { (z - vmin) / range } else { 0.0 };
            let idx = ((frac * LUT_SIZE as f64) as i64).clamp(0, LUT_SIZE as i64 - 1) as usize;
            let blended = blend(lut[idx], i, params.blend);
            [to_u8(blended[0]), to_u8(blended[1]), to_u8(blended[2])]
        })
        .collect();

    let ocean = grid.data.iter().map(|&v| v <= 0.0).collect();

    ShadedRelief {
        width: w,
        height: h,
        rgb,
        ocean,
    }
}

fn to_u8(v: f64) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0) as u8
}

/// Lambertian intensity from central-difference normals, stretched to 0..1.
///
/// Rows run north to south, so the row spacing is negative.
fn relief_intensity(z: &[f64], w: usize, h: usize, params: &ShadeParams) -> Vec<f64> {
    let ve = params.vert_exag;
    let light = params.light_direction();
    let at = |c: usize, r: usize| z[r * w + c] * ve;

    let mut intensity: Vec<f64> = (0..w * h)
        .into_par_iter()
        .map(|idx| {
            let (c, r) = (idx % w, idx / w);
            let dz_dx = gradient(w, c, |k| at(k, r), 1.0);
            let dz_dy = gradient(h, r, |k| at(c, k), -1.0);
            let (nx, ny, nz) = (-dz_dx, -dz_dy, 1.0);
            let len = (nx * nx + ny * ny + nz * nz).sqrt();
            (nx * light[0] + ny * light[1] + nz * light[2]) / len
        })
        .collect();

    let (imin, imax) = intensity
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if imax - imin > 1e-6 {
        intensity
            .par_iter_mut()
            .for_each(|v| *v = (*v - imin) / (imax - imin));
    }
    intensity.par_iter_mut().for_each(|v| *v = v.clamp(0.0, 1.0));
    intensity
}

/// Central differences inside, one-sided differences at the ends.
fn gradient(len: usize, k: usize, f: impl Fn(usize) -> f64, spacing: f64) -> f64 {
    if len < 2 {
        0.0
    } else if k == 0 {
        (f(1) - f(0)) / spacing
    } else if k == len - 1 {
        (f(k) - f(k - 1)) / spacing
    } else {
        (f(k + 1) - f(k - 1)) / (2.0 * spacing)
    }
}

fn blend(rgb: [f64; 3], intensity: f64, mode: BlendMode) -> [f64; 3] {
    match mode {
        BlendMode::Soft => rgb.map(|c| 2.0 * intensity * c + (1.0 - 2.0 * intensity) * c * c),
        BlendMode::Overlay => rgb.map(|c| {
            if c <= 0.5 {
                2.0 * intensity * c
            } else {
                1.0 - 2.0 * (1.0 - intensity) * (1.0 - c)
            }
        }),
        BlendMode::Hsv => blend_hsv(rgb, intensity),
    }
}

fn blend_hsv(rgb: [f64; 3], intensity: f64) -> [f64; 3] {
    const MIN_VAL: f64 = 0.0;
    const MAX_VAL: f64 = 1.0;
    const MIN_SAT: f64 = 1.0;
    const MAX_SAT: f64 = 0.0;

    let [h, mut s, mut v] = rgb_to_hsv(rgb);
    let i = 2.0 * intensity - 1.0;
    if s.abs() > 1e-10 {
        if i > 0.0 {
            s = (1.0 - i) * s + i * MAX_SAT;
        } else if i < 0.0 {
            s = (1.0 + i) * s - i * MIN_SAT;
        }
    }
    if i > 0.0 {
        v = (1.0 - i) * v + i * MAX_VAL;
    } else if i < 0.0 {
        v = (1.0 + i) * v - i * MIN_VAL;
    }
    hsv_to_rgb([h, s.clamp(0.0, 1.0), v.clamp(0.0, 1.0)])
}

fn rgb_to_hsv([r, g, b]: [f64; 3]) -> [f64; 3] {
    let v = r.max(g).max(b);
    let delta = v - r.min(g).min(b);
    let s = if v > 0.0 { delta / v } else { 0.0 };
    let mut h = 0.0;
    if delta > 0.0 {
        // Later matches win, blue over green over red.
        if r == v {
            h = (g - b) / delta;
        }
        if g == v {
            h = 2.0 + (b - r) / delta;
        }
        if b == v {
            h = 4.0 + (r - g) / delta;
        }
    }
    [(h / 6.0).rem_euclid(1.0), s, v]
}

fn hsv_to_rgb([h, s, v]: [f64; 3]) -> [f64; 3] {
    if s == 0.0 {
        return [v, v, v];
    }
    let i = (h * 6.0) as i64;
    let f = h * 6.0 - i as f64;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match i.rem_euclid(6) {
        0 => [v, t, p],
        1 => [q, v, p],
        2 => [p, v, t],
        3 => [p, q, v],
        4 => [t, p, v],
        _ => [v, p, q],
    }
}

/// Shades a padded DEM window and crops it to the frame, returning the
/// hillshade layer and the ocean mask (255 = ocean).
pub fn render_layers(window: &DemWindow, params: &ShadeParams) -> (RgbImage, GrayImage) {
    let relief = shade(&window.grid, params);
    let rgb = window.crop(&relief.rgb);
    let ocean = window.crop(&relief.ocean);
    let (w, h) = (window.width as u32, window.height as u32);

    let hillshade = RgbImage::from_fn(w, h, |x, y| Rgb(rgb[(y * w + x) as usize]));
    let mask = GrayImage::from_fn(w, h, |x, y| {
        Luma([if ocean[(y * w + x) as usize] { 255 } else { 0 }])
    });
    (hillshade, mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(w: usize, h: usize, f: impl Fn(usize, usize) -> f32) -> ElevationGrid {
        let data = (0..w * h).map(|i| f(i % w, i / w)).collect();
        ElevationGrid::new(w, h, data).unwrap()
    }

    #[test]
    fn test_ramp_endpoints_and_midpoint() {
        let ramp = ColorRamp::default();
        assert_eq!(ramp.at(0.0), [0.56, 0.70, 0.47]);
        assert_eq!(ramp.at(1.0), [0.95, 0.95, 0.97]);
        let mid = ramp.at(0.075);
        assert!((mid[0] - 0.615).abs() < 1e-9);
        let lut = ramp.lut(256);
        assert_eq!(lut.len(), 256);
        assert_eq!(lut[255], [0.95, 0.95, 0.97]);
    }

    #[test]
    fn test_light_direction_northwest() {
        let d = ShadeParams::default().light_direction();
        assert!(d[0] < 0.0 && d[1] > 0.0);
        let norm = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();
        assert!((norm - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_clamp_happens_before_shading() {
        let params = ShadeParams::default();
        let f = |c: usize, r: usize| (c * 300 + r * 200) as f32;
        let base = grid(12, 12, f);
        let mut spiked = base.clone();
        let mut clamped = base.clone();
        spiked.data[5 * 12 + 5] = 9000.0;
        clamped.data[5 * 12 + 5] = params.max_elevation;

        let a = shade(&spiked, &params);
        let b = shade(&clamped, &params);
        assert_eq!(a.rgb, b.rgb);
    }

    #[test]
    fn test_ocean_pixels_get_exact_color() {
        let params = ShadeParams::default();
        let g = grid(8, 8, |c, _| if c < 3 { -5.0 } else { 100.0 * c as f32 });
        let relief = shade(&g, &params);
        for (i, px) in relief.rgb.iter().enumerate() {
            if i % 8 < 3 {
                assert_eq!(*px, [0xc6, 0xdd, 0xf0]);
                assert!(relief.ocean[i]);
            } else {
                assert!(!relief.ocean[i]);
            }
        }
    }

    #[test]
    fn test_shading_is_deterministic() {
        let g = grid(16, 9, |c, r| ((c * 37 + r * 91) % 500) as f32 + 1.0);
        for mode in [BlendMode::Soft, BlendMode::Overlay, BlendMode::Hsv] {
            let params = ShadeParams {
                blend: mode,
                ..ShadeParams::default()
            };
            assert_eq!(shade(&g, &params).rgb, shade(&g, &params).rgb);
        }
    }

    #[test]
    fn test_slope_facing_light_is_brighter() {
        // Terrain rising to the south-east faces the north-west light.
        let params = ShadeParams {
            vert_exag: 1.0,
            ..ShadeParams::default()
        };
        let z: Vec<f64> = (0..100)
            .map(|i| {
                let (c, r) = (i % 10, i / 10);
                if c < 5 {
                    (c + r) as f64 * 50.0
                } else {
                    ((10 - c) + (10 - r)) as f64 * 50.0
                }
            })
            .collect();
        let intensity = relief_intensity(&z, 10, 10, &params);
        let lit = intensity[5 * 10 + 2];
        let shadowed = intensity[5 * 10 + 7];
        assert!(lit > shadowed, "{} <= {}", lit, shadowed);
    }

    #[test]
    fn test_flat_grid_has_uniform_color() {
        let g = ElevationGrid::filled(6, 6, 1000.0);
        let relief = shade(&g, &ShadeParams::default());
        assert!(relief.rgb.iter().all(|px| *px == relief.rgb[0]));
    }

    #[test]
    fn test_hsv_round_trip() {
        for rgb in [[0.2, 0.4, 0.6], [0.9, 0.1, 0.1], [0.5, 0.5, 0.5]] {
            let back = hsv_to_rgb(rgb_to_hsv(rgb));
            for k in 0..3 {
                assert!((back[k] - rgb[k]).abs() < 1e-9);
            }
        }
    }
}
