//! Basemap layers and their composite.
//!
//! The basemap is built from three cached layers in `_basemap_layers/`:
//! `hillshade.png` (RGB, with `ocean_mask.png` beside it), `lakes.png` and
//! `rivers.png` (RGBA). Each layer is reused unless forced, missing or of the
//! wrong pixel size. Rivers are clipped by lakes and ocean at pixel level.

use std::fs;
use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use rayon::prelude::*;

use crate::cache::SessionCache;
use crate::config::DeckConfig;
use crate::dem::DemSampler;
use crate::error::{MapError, Result};
use crate::geojson;
use crate::hillshade;
use crate::logger;
use crate::math::RasterFrame;
use crate::render::{self, over};

/// Which cached layers to regenerate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForceFlags {
    pub all: bool,
    pub hillshade: bool,
    pub lakes: bool,
    pub rivers: bool,
}

impl ForceFlags {
    pub fn any(&self) -> bool {
        self.all || self.hillshade || self.lakes || self.rivers
    }
}

/// Outcome of a basemap build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The basemap already existed and nothing was forced.
    Cached,
    Built,
}

fn check_size(layer: &str, actual: (u32, u32), expected: (u32, u32)) -> Result<()> {
    if actual != expected {
        return Err(MapError::DimensionMismatch {
            layer: layer.to_string(),
            width: expected.0,
            height: expected.1,
            actual_width: actual.0,
            actual_height: actual.1,
        });
    }
    Ok(())
}

/// Composites hillshade, lakes and rivers into an opaque basemap.
///
/// River alpha is zeroed wherever a lake pixel has any alpha or the ocean
/// mask is set, then lakes and rivers are blended over the hillshade in
/// that order.
pub fn composite(
    hillshade: &RgbImage,
    lakes: &RgbaImage,
    rivers: &RgbaImage,
    ocean: &GrayImage,
) -> Result<RgbImage> {
    let size = hillshade.dimensions();
    check_size("lakes", lakes.dimensions(), size)?;
    check_size("rivers", rivers.dimensions(), size)?;
    check_size("ocean_mask", ocean.dimensions(), size)?;

    let (width, height) = size;
    let mut out = RgbImage::new(width, height);
    out.par_chunks_mut(width as usize * 3)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as u32;
            for x in 0..width {
                let Rgb([r, g, b]) = *hillshade.get_pixel(x, y);
                let lake = *lakes.get_pixel(x, y);
                let mut river = *rivers.get_pixel(x, y);
                if lake.0[3] > 0 || ocean.get_pixel(x, y).0[0] > 0 {
                    river.0[3] = 0;
                }
                let px = over(river, over(lake, Rgba([r, g, b, 255])));
                let i = x as usize * 3;
                row[i..i + 3].copy_from_slice(&px.0[..3]);
            }
        });

    Ok(out)
}

/// Writes `image` to a hidden `.partial` sibling, then renames it to `path`.
pub fn save_image(image: &DynamicImage, path: &Path, format: ImageFormat) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let partial = path.with_file_name(format!(".{}.partial", name));
    image.save_with_format(&partial, format)?;
    fs::rename(&partial, path)?;
    Ok(())
}

/// Cached layer file locations.
#[derive(Debug, Clone)]
pub struct LayerPaths {
    pub hillshade: PathBuf,
    pub ocean_mask: PathBuf,
    pub lakes: PathBuf,
    pub rivers: PathBuf,
}

impl LayerPaths {
    pub fn new(dir: &Path) -> Self {
        Self {
            hillshade: dir.join("hillshade.png"),
            ocean_mask: dir.join("ocean_mask.png"),
            lakes: dir.join("lakes.png"),
            rivers: dir.join("rivers.png"),
        }
    }
}

/// A cached layer, unless forced, missing or sized for another frame.
fn reuse_layer(path: &Path, frame: &RasterFrame, force: bool) -> Result<Option<DynamicImage>> {
    if force || !path.exists() {
        return Ok(None);
    }
    let img = image::open(path)?;
    if (img.width(), img.height()) != frame.dimensions() {
        logger::warn(&format!(
            "Cached layer {} is {}x{}, expected {}x{}; re-rendering",
            path.display(),
            img.width(),
            img.height(),
            frame.width(),
            frame.height()
        ));
        return Ok(None);
    }
    logger::debug(&format!("Layer cached: {}", path.display()));
    Ok(Some(img))
}

/// Builds the basemap of one deck.
pub struct BasemapBuilder<'a> {
    deck: &'a DeckConfig,
    cache: &'a mut SessionCache,
    frame: RasterFrame,
    paths: LayerPaths,
}

impl<'a> BasemapBuilder<'a> {
    pub fn new(deck: &'a DeckConfig, cache: &'a mut SessionCache) -> Result<Self> {
        Ok(Self {
            frame: deck.frame()?,
            paths: LayerPaths::new(&deck.layer_dir()),
            deck,
            cache,
        })
    }

    pub fn frame(&self) -> &RasterFrame {
        &self.frame
    }

    /// Materialises hillshade, lakes and rivers, then writes the composite.
    ///
    /// When the basemap exists and no flag is set this returns
    /// [`BuildOutcome::Cached`] without touching any file.
    pub fn build(&mut self, force: ForceFlags) -> Result<BuildOutcome> {
        let output = self.deck.basemap_path();
        if !force.any() && output.exists() {
            logger::info(&format!("Basemap cached: {}", output.display()));
            return Ok(BuildOutcome::Cached);
        }

        fs::create_dir_all(self.deck.layer_dir())?;
        let (hillshade, ocean) = self.hillshade_layer(force.all || force.hillshade)?;
        let lakes = self.lakes_layer(force.all || force.lakes)?;
        let rivers = self.rivers_layer(force.all || force.rivers)?;

        let basemap = composite(&hillshade, &lakes, &rivers, &ocean)?;
        save_image(
            &DynamicImage::ImageRgb8(basemap),
            &output,
            self.deck.format.image_format(),
        )?;
        logger::output(&output.display().to_string());
        Ok(BuildOutcome::Built)
    }

    /// Hillshade and ocean mask. Without a usable DEM the base is flat
    /// background colour with no ocean, and nothing is cached.
    pub fn hillshade_layer(&mut self, force: bool) -> Result<(RgbImage, GrayImage)> {
        let (w, h) = self.frame.dimensions();
        if let Some(img) = reuse_layer(&self.paths.hillshade, &self.frame, force)? {
            let ocean = match reuse_layer(&self.paths.ocean_mask, &self.frame, false)? {
                Some(mask) => mask.to_luma8(),
                None => GrayImage::new(w, h),
            };
            return Ok((img.to_rgb8(), ocean));
        }

        let style = &self.deck.style;
        let flat = || {
            (
                RgbImage::from_pixel(w, h, Rgb(style.background_color.0)),
                GrayImage::new(w, h),
            )
        };

        let Some(dem) = self
            .cache
            .dem(self.deck.dem_path.as_deref(), style.dem_downsample_threshold)?
        else {
            logger::warn("No DEM available; basemap uses a flat background");
            return Ok(flat());
        };

        let fetch = self.frame.bbox().buffered(style.dem_bbox_buffer);
        if !dem.covers(&fetch) {
            logger::warn(&format!(
                "DEM does not cover the region plus {}° margin; relief at the edges is clamped",
                style.dem_bbox_buffer
            ));
        }

        let window = match DemSampler::new(&dem).sample(self.frame.bbox(), w, h) {
            Ok(window) => window,
            Err(MapError::DemOutsideBbox) => {
                logger::warn("DEM does not cover the region; basemap uses a flat background");
                return Ok(flat());
            }
            Err(e) => return Err(e),
        };

        let (rgb, ocean) = hillshade::render_layers(&window, &style.shade_params());
        let rgb = DynamicImage::ImageRgb8(rgb);
        let ocean = DynamicImage::ImageLuma8(ocean);
        save_image(&rgb, &self.paths.hillshade, ImageFormat::Png)?;
        save_image(&ocean, &self.paths.ocean_mask, ImageFormat::Png)?;
        logger::info(&format!("Hillshade rendered: {}x{}", w, h));
        Ok((rgb.to_rgb8(), ocean.to_luma8()))
    }

    /// Lake fills, transparent when no lake source is available.
    pub fn lakes_layer(&mut self, force: bool) -> Result<RgbaImage> {
        if let Some(img) = reuse_layer(&self.paths.lakes, &self.frame, force)? {
            return Ok(img.to_rgba8());
        }

        let style = &self.deck.style;
        let polygons = match self.cache.document(self.deck.lakes_path.as_deref())? {
            Some(doc) => geojson::lakes(&doc, &self.deck.render_bbox(), style.lake_min_area_km2),
            None => Vec::new(),
        };
        let layer = render::rasterize_fill(&polygons, &self.frame, style.lake_color.rgba(1.0));
        logger::info(&format!("Lakes rasterized: {}", polygons.len()));

        let layer = DynamicImage::ImageRgba8(layer);
        save_image(&layer, &self.paths.lakes, ImageFormat::Png)?;
        Ok(layer.to_rgba8())
    }

    /// Anti-aliased river lines, transparent when no river source is available.
    pub fn rivers_layer(&mut self, force: bool) -> Result<RgbaImage> {
        if let Some(img) = reuse_layer(&self.paths.rivers, &self.frame, force)? {
            return Ok(img.to_rgba8());
        }

        let style = &self.deck.style;
        let lines = match self.cache.document(self.deck.rivers_path.as_deref())? {
            Some(doc) => geojson::rivers(&doc, &self.deck.render_bbox(), style.river_min_length_km),
            None => Vec::new(),
        };
        let layer = render::rasterize_lines(
            &lines,
            &self.frame,
            style.river_color.0,
            style.px(style.river_width_pt),
            style.supersample,
        );
        logger::info(&format!(
            "Rivers rasterized: {} lines (AA {}x)",
            lines.len(),
            style.supersample
        ));

        let layer = DynamicImage::ImageRgba8(layer);
        save_image(&layer, &self.paths.rivers, ImageFormat::Png)?;
        Ok(layer.to_rgba8())
    }
}
