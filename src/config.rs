//! Deck configuration.
//!
//! A deck file (JSON) describes one region and one classification. It is
//! flattened into a single [`DeckConfig`] at startup; every visual constant
//! lives in [`Style`] and can be overridden per deck.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use image::Rgba;
use serde::Deserialize;

use crate::error::{MapError, Result};
use crate::hillshade::{BlendMode, ColorRamp, ShadeParams};
use crate::math::{Bbox, PixelBudget, RasterFrame};
use crate::placement::PackingParams;

/// Typographic points per inch.
const POINTS_PER_INCH: f64 = 72.0;

/// RGB colour parsed from `#RRGGBB` (the `#` is optional).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct HexColor(pub [u8; 3]);

impl HexColor {
    pub fn rgba(self, alpha: f64) -> Rgba<u8> {
        let [r, g, b] = self.0;
        Rgba([r, g, b, (alpha.clamp(0.0, 1.0) * 255.0).round() as u8])
    }
}

impl TryFrom<String> for HexColor {
    type Error = MapError;

    fn try_from(s: String) -> Result<Self> {
        parse_rgb(&s).map(HexColor)
    }
}

/// Parses `RRGGBB` (optionally `#`-prefixed) into RGB bytes.
pub fn parse_rgb(s: &str) -> Result<[u8; 3]> {
    let digits = s.trim().trim_start_matches('#');
    let bytes = hex::decode(digits).map_err(|_| MapError::InvalidColor(s.to_string()))?;
    if bytes.len() != 3 {
        return Err(MapError::InvalidColor(format!(
            "RGB color must be 6 hex digits, got {}",
            digits.len()
        )));
    }
    Ok([bytes[0], bytes[1], bytes[2]])
}

/// Encoding of written basemaps and overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Webp,
    Png,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Webp => "webp",
            OutputFormat::Png => "png",
        }
    }

    pub fn image_format(self) -> image::ImageFormat {
        match self {
            OutputFormat::Webp => image::ImageFormat::WebP,
            OutputFormat::Png => image::ImageFormat::Png,
        }
    }
}

/// Every visual and algorithmic constant of the renderer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Style {
    pub dpi: f64,

    pub hillshade_azimuth: f64,
    pub hillshade_altitude: f64,
    pub hillshade_vert_exag: f64,
    pub hillshade_blend: BlendMode,
    pub max_hillshade_elevation: f32,
    pub terrain_ramp: ColorRamp,
    pub dem_downsample_threshold: usize,
    pub dem_bbox_buffer: f64,
    pub render_buffer: f64,

    pub ocean_color: HexColor,
    pub background_color: HexColor,
    pub lake_color: HexColor,
    pub lake_min_area_km2: f64,
    pub river_color: HexColor,
    pub river_width_pt: f64,
    pub river_min_length_km: f64,
    pub supersample: u32,

    pub polygon_alpha: f64,
    pub polygon_border_color: HexColor,
    pub polygon_border_width_pt: f64,
    pub label_fontsize_pt: f64,
    pub label_color: HexColor,
    pub label_shrink_fractions: Vec<f64>,

    pub border_color: HexColor,
    pub border_width_pt: f64,
    pub city_marker_pt: f64,
    pub city_fontsize_pt: f64,
    pub city_color: HexColor,

    pub highlight_color: HexColor,
    pub highlight_width_pt: f64,
    pub parent_alpha: f64,
    pub parent_line_width_pt: f64,
    pub sibling_edge_width_pt: f64,
    pub sibling_edge_alpha: f64,
    pub fallback_fill: HexColor,

    pub qmark_color: HexColor,
    pub qmark_fill_factor: f64,
    pub qmark_fontsize_min_pt: f64,
    pub qmark_min_radius_ratio: f64,
    pub qmark_max_rest_area: f64,
    pub qmark_polylabel_tol: f64,
    pub qmark_min_radius_abs: f64,
    pub qmark_max_circles: usize,

    pub poi_marker_edge_color: HexColor,
    pub poi_marker_edge_width_pt: f64,
    pub poi_label_fontsize_pt: f64,
    pub poi_label_alpha: f64,
    /// Label offset from the marker, in degrees.
    pub poi_label_offset: (f64, f64),
    /// Highlight radius in degrees of latitude.
    pub poi_highlight_radius_deg: f64,
    pub poi_highlight_width_pt: f64,
    pub poi_target_scale: f64,
    pub poi_target_fontsize_pt: f64,
    pub poi_target_offset: (f64, f64),
    pub poi_target_box_alpha: f64,
    pub poi_target_box_edge_pt: f64,
    /// Prompt of the locate front; `{}` is replaced by the POI name.
    pub poi_question: String,
    pub poi_question_fontsize_pt: f64,
    pub poi_question_box_alpha: f64,
    pub poi_question_box_edge_pt: f64,
    pub poi_question_info_fontsize_pt: f64,
    pub poi_question_info_color: HexColor,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            dpi: 480.0,

            hillshade_azimuth: 315.0,
            hillshade_altitude: 45.0,
            hillshade_vert_exag: 0.05,
            hillshade_blend: BlendMode::Soft,
            max_hillshade_elevation: 4200.0,
            terrain_ramp: ColorRamp::default(),
            dem_downsample_threshold: 7000,
            dem_bbox_buffer: 0.2,
            render_buffer: 0.5,

            ocean_color: HexColor([0xc6, 0xdd, 0xf0]),
            background_color: HexColor([0xdd, 0xe8, 0xf0]),
            lake_color: HexColor([0x7f, 0xaf, 0xcf]),
            lake_min_area_km2: 1.0,
            river_color: HexColor([0x4a, 0x7f, 0xb5]),
            river_width_pt: 0.4,
            river_min_length_km: 20.0,
            supersample: 2,

            polygon_alpha: 0.55,
            polygon_border_color: HexColor([0xff, 0xff, 0xff]),
            polygon_border_width_pt: 0.8,
            label_fontsize_pt: 11.0,
            label_color: HexColor([0xff, 0xff, 0xff]),
            label_shrink_fractions: vec![0.10, 0.06, 0.03, 0.01],

            border_color: HexColor([0x55, 0x55, 0x55]),
            border_width_pt: 0.6,
            city_marker_pt: 3.5,
            city_fontsize_pt: 8.0,
            city_color: HexColor([0, 0, 0]),

            highlight_color: HexColor([0xcc, 0x00, 0x00]),
            highlight_width_pt: 2.0,
            parent_alpha: 0.25,
            parent_line_width_pt: 1.4,
            sibling_edge_width_pt: 0.8,
            sibling_edge_alpha: 0.45,
            fallback_fill: HexColor([0x88, 0x88, 0x88]),

            qmark_color: HexColor([0xcc, 0x00, 0x00]),
            qmark_fill_factor: 0.85,
            qmark_fontsize_min_pt: 14.0,
            qmark_min_radius_ratio: 0.45,
            qmark_max_rest_area: 0.40,
            qmark_polylabel_tol: 0.001,
            qmark_min_radius_abs: 0.008,
            qmark_max_circles: 20,

            poi_marker_edge_color: HexColor([0xff, 0xff, 0xff]),
            poi_marker_edge_width_pt: 0.3,
            poi_label_fontsize_pt: 3.5,
            poi_label_alpha: 0.5,
            poi_label_offset: (0.03, 0.02),
            poi_highlight_radius_deg: 0.08,
            poi_highlight_width_pt: 2.5,
            poi_target_scale: 1.8,
            poi_target_fontsize_pt: 10.0,
            poi_target_offset: (0.05, 0.04),
            poi_target_box_alpha: 0.9,
            poi_target_box_edge_pt: 1.0,
            poi_question: "Wo ist: {}?".to_string(),
            poi_question_fontsize_pt: 11.0,
            poi_question_box_alpha: 0.95,
            poi_question_box_edge_pt: 1.2,
            poi_question_info_fontsize_pt: 8.0,
            poi_question_info_color: HexColor([0x66, 0x66, 0x66]),
        }
    }
}

impl Style {
    /// Converts a size in points to output pixels.
    pub fn px(&self, points: f64) -> f64 {
        points * self.dpi / POINTS_PER_INCH
    }

    pub fn shade_params(&self) -> ShadeParams {
        ShadeParams {
            azimuth: self.hillshade_azimuth,
            altitude: self.hillshade_altitude,
            vert_exag: self.hillshade_vert_exag,
            blend: self.hillshade_blend,
            max_elevation: self.max_hillshade_elevation,
            ocean: self.ocean_color.0,
            ramp: self.terrain_ramp.clone(),
        }
    }

    pub fn packing_params(&self) -> PackingParams {
        PackingParams {
            max_iterations: self.qmark_max_circles,
            tolerance: self.qmark_polylabel_tol,
            min_radius: self.qmark_min_radius_abs,
            min_radius_ratio: self.qmark_min_radius_ratio,
            max_rest_area: self.qmark_max_rest_area,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.dpi <= 0.0 {
            return Err(MapError::InvalidConfig("dpi must be positive".to_string()));
        }
        if self.supersample == 0 {
            return Err(MapError::InvalidConfig(
                "supersample must be at least 1".to_string(),
            ));
        }
        if self.poi_highlight_radius_deg <= 0.0 {
            return Err(MapError::InvalidConfig(
                "POI highlight radius must be positive".to_string(),
            ));
        }
        if self.label_shrink_fractions.iter().any(|f| *f <= 0.0) {
            return Err(MapError::InvalidConfig(
                "label shrink fractions must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// A labelled map point with its label offset in degrees.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct City {
    pub name: String,
    pub lon: f64,
    pub lat: f64,
    #[serde(default = "default_city_dx")]
    pub dx: f64,
    #[serde(default = "default_city_dy")]
    pub dy: f64,
}

fn default_city_dx() -> f64 {
    0.05
}

fn default_city_dy() -> f64 {
    0.02
}

/// One mountain group of a classification.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    /// Regional division the group belongs to.
    pub hauptgruppe: String,
    /// Value of the reference tag identifying the group's polygon.
    pub reference: String,
}

/// Outline of a POI marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerShape {
    Triangle,
    Circle,
    Square,
    Diamond,
}

/// How the POIs of one category are drawn.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CategoryStyle {
    pub marker: MarkerShape,
    pub color: HexColor,
    /// Marker size in points.
    pub size: f64,
    /// Display name of the category.
    pub label: String,
}

impl CategoryStyle {
    /// Built-in style of the peak, pass, town and valley categories.
    pub fn builtin(category: &str) -> Self {
        let (marker, color, size, label) = match category {
            "peak" => (MarkerShape::Triangle, [0xb2, 0x22, 0x22], 7.0, "Gipfel"),
            "pass" => (MarkerShape::Circle, [0x2e, 0x86, 0xc1], 6.0, "Pass"),
            "town" => (MarkerShape::Square, [0x1a, 0x1a, 0x1a], 5.0, "Ort"),
            "valley" => (MarkerShape::Diamond, [0x27, 0xae, 0x60], 5.0, "Tal"),
            other => (MarkerShape::Circle, [0x33, 0x33, 0x33], 5.0, other),
        };
        Self {
            marker,
            color: HexColor(color),
            size,
            label: label.to_string(),
        }
    }
}

/// One point of interest.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Poi {
    pub id: String,
    pub name: String,
    pub category: String,
    pub lon: f64,
    pub lat: f64,
    /// Metres.
    #[serde(default)]
    pub elevation: Option<i32>,
    #[serde(default)]
    pub subtitle: Option<String>,
}

impl Poi {
    /// Name with the subtitle in parentheses.
    pub fn display_name(&self) -> String {
        match &self.subtitle {
            Some(sub) => format!("{} ({})", self.name, sub),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RegionFile {
    name: String,
    bbox: Bbox,
    #[serde(default)]
    pixel_budget: PixelBudget,
    #[serde(default)]
    cities: Vec<City>,
    dem: Option<PathBuf>,
    rivers: Option<PathBuf>,
    lakes: Option<PathBuf>,
    borders: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct HauptgruppeColors {
    fill: HexColor,
}

#[derive(Debug, Deserialize)]
struct ClassificationFile {
    name: String,
    title: String,
    ref_tag: String,
    #[serde(default)]
    parent_tag: Option<String>,
    #[serde(default)]
    groups: Vec<Group>,
    #[serde(default)]
    colors: HashMap<String, HauptgruppeColors>,
    #[serde(default)]
    pois: Vec<Poi>,
    #[serde(default)]
    poi_categories: HashMap<String, CategoryStyle>,
}

#[derive(Debug, Deserialize)]
struct DeckFile {
    region: RegionFile,
    classification: ClassificationFile,
    #[serde(default)]
    polygons: Option<PathBuf>,
    output_dir: PathBuf,
    #[serde(default)]
    format: OutputFormat,
    #[serde(default)]
    style: Style,
}

/// Region and classification merged into one value.
#[derive(Debug, Clone)]
pub struct DeckConfig {
    pub region: String,
    pub classification: String,
    pub title: String,
    pub bbox: Bbox,
    pub pixel_budget: PixelBudget,
    pub cities: Vec<City>,
    pub dem_path: Option<PathBuf>,
    pub rivers_path: Option<PathBuf>,
    pub lakes_path: Option<PathBuf>,
    pub borders_path: Option<PathBuf>,
    pub polygons_path: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub ref_tag: String,
    pub parent_tag: Option<String>,
    pub groups: Vec<Group>,
    pub colors: HashMap<String, HexColor>,
    pub pois: Vec<Poi>,
    pub poi_categories: HashMap<String, CategoryStyle>,
    pub format: OutputFormat,
    pub style: Style,
}

impl DeckConfig {
    /// Reads a deck file. Relative paths resolve against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MapError::FileNotFound(path.display().to_string())
            } else {
                MapError::Io(e)
            }
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_json(&content, base)
    }

    pub fn from_json(content: &str, base: &Path) -> Result<Self> {
        let file: DeckFile = serde_json::from_str(content)?;
        file.region.bbox.validate()?;
        file.style.validate()?;

        let resolve = |p: PathBuf| if p.is_absolute() { p } else { base.join(p) };

        let mut seen = std::collections::HashSet::new();
        for g in &file.classification.groups {
            if !seen.insert(g.id.as_str()) {
                return Err(MapError::InvalidConfig(format!("duplicate group id '{}'", g.id)));
            }
        }
        let mut seen = std::collections::HashSet::new();
        for poi in &file.classification.pois {
            if !seen.insert(poi.id.as_str()) {
                return Err(MapError::InvalidConfig(format!("duplicate POI id '{}'", poi.id)));
            }
        }

        let ClassificationFile {
            name: classification,
            title,
            ref_tag,
            parent_tag,
            groups,
            colors,
            pois,
            poi_categories,
        } = file.classification;

        Ok(Self {
            region: file.region.name,
            classification,
            title,
            bbox: file.region.bbox,
            pixel_budget: file.region.pixel_budget,
            cities: file.region.cities,
            dem_path: file.region.dem.map(resolve),
            rivers_path: file.region.rivers.map(resolve),
            lakes_path: file.region.lakes.map(resolve),
            borders_path: file.region.borders.map(resolve),
            polygons_path: file.polygons.map(resolve),
            output_dir: resolve(file.output_dir),
            ref_tag,
            parent_tag,
            groups,
            colors: colors.into_iter().map(|(k, v)| (k, v.fill)).collect(),
            pois,
            poi_categories,
            format: file.format,
            style: file.style,
        })
    }

    /// The frame every raster of this deck is rendered into.
    pub fn frame(&self) -> Result<RasterFrame> {
        RasterFrame::for_budget(self.bbox, &self.pixel_budget)
    }

    /// Area from which vector layers are kept.
    pub fn render_bbox(&self) -> Bbox {
        self.bbox.buffered(self.style.render_buffer)
    }

    pub fn group_by_id(&self, id: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub fn group_by_ref(&self, reference: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.reference == reference)
    }

    pub fn poi_by_id(&self, id: &str) -> Option<&Poi> {
        self.pois.iter().find(|p| p.id == id)
    }

    /// Configured style of a category, the built-in one otherwise.
    pub fn category_style(&self, category: &str) -> CategoryStyle {
        self.poi_categories
            .get(category)
            .cloned()
            .unwrap_or_else(|| CategoryStyle::builtin(category))
    }

    /// Fill colour of a Hauptgruppe, grey when none is configured.
    pub fn fill_color(&self, hauptgruppe: &str) -> HexColor {
        self.colors
            .get(hauptgruppe)
            .copied()
            .unwrap_or(self.style.fallback_fill)
    }

    pub fn prefix(&self) -> String {
        format!("ps_{}_{}", self.region, self.classification)
    }

    pub fn layer_dir(&self) -> PathBuf {
        self.output_dir.join("_basemap_layers")
    }

    pub fn basemap_path(&self) -> PathBuf {
        self.output_path("basemap")
    }

    pub fn partition_path(&self) -> PathBuf {
        self.output_path("partition")
    }

    pub fn context_path(&self) -> PathBuf {
        self.output_path("context")
    }

    pub fn group_front_path(&self, group_id: &str) -> PathBuf {
        self.output_path(&format!("group_{}_front", safe_id(group_id)))
    }

    pub fn group_back_path(&self, group_id: &str) -> PathBuf {
        self.output_path(&format!("group_{}_back", safe_id(group_id)))
    }

    pub fn all_pois_path(&self) -> PathBuf {
        self.output_path("all_pois")
    }

    pub fn poi_front_path(&self, poi_id: &str) -> PathBuf {
        self.output_path(&format!("poi_{}_front", safe_id(poi_id)))
    }

    pub fn poi_highlight_path(&self, poi_id: &str) -> PathBuf {
        self.output_path(&format!("poi_{}_highlight", safe_id(poi_id)))
    }

    pub fn poi_back_path(&self, poi_id: &str) -> PathBuf {
        self.output_path(&format!("poi_{}_back", safe_id(poi_id)))
    }

    fn output_path(&self, suffix: &str) -> PathBuf {
        self.output_dir.join(format!(
            "{}_{}.{}",
            self.prefix(),
            suffix,
            self.format.extension()
        ))
    }
}

fn safe_id(id: &str) -> String {
    id.replace('/', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECK: &str = r##"{
        "region": {
            "name": "ostalpen",
            "bbox": {"west": 9.05, "south": 45.2, "east": 16.82, "north": 48.62},
            "cities": [{"name": "Innsbruck", "lon": 11.394, "lat": 47.26}],
            "dem": "dem/ostalpen_dem.tif",
            "lakes": "/data/osm/lakes.geojson"
        },
        "classification": {
            "name": "ave84",
            "title": "AVE 84",
            "ref_tag": "ref:aveo",
            "groups": [
                {"id": "1", "name": "Bregenzerwaldgebirge", "hauptgruppe": "Nördliche Ostalpen", "reference": "1"},
                {"id": "3a/b", "name": "Allgäuer Alpen", "hauptgruppe": "Nördliche Ostalpen", "reference": "3a"}
            ],
            "colors": {"Nördliche Ostalpen": {"fill": "#4477AA"}},
            "pois": [
                {"id": "peak_07", "name": "Hirschberg", "category": "peak", "lon": 11.69611, "lat": 47.66076,
                 "elevation": 1670, "subtitle": "Mittagsspitze"},
                {"id": "town_01", "name": "Landeck", "category": "town", "lon": 10.57046, "lat": 47.14241}
            ],
            "poi_categories": {
                "town": {"marker": "square", "color": "#000000", "size": 4, "label": "Stadt"}
            }
        },
        "polygons": "osm/ave84.geojson",
        "output_dir": "out",
        "style": {"river_width_pt": 0.5}
    }"##;

    fn deck() -> DeckConfig {
        DeckConfig::from_json(DECK, Path::new("/decks")).unwrap()
    }

    #[test]
    fn test_parse_rgb_valid() {
        assert_eq!(parse_rgb("00FF00").unwrap(), [0, 255, 0]);
        assert_eq!(parse_rgb("#c6ddf0").unwrap(), [0xc6, 0xdd, 0xf0]);
    }

    #[test]
    fn test_parse_rgb_invalid_length() {
        let err = parse_rgb("FF").unwrap_err();
        assert!(err.to_string().contains("6 hex digits"));
    }

    #[test]
    fn test_parse_rgb_invalid_hex() {
        let err = parse_rgb("GGGGGG").unwrap_err();
        assert!(err.to_string().contains("Invalid color"));
    }

    #[test]
    fn test_flattened_fields() {
        let d = deck();
        assert_eq!(d.region, "ostalpen");
        assert_eq!(d.classification, "ave84");
        assert_eq!(d.ref_tag, "ref:aveo");
        assert_eq!(d.cities[0].dx, 0.05);
        assert_eq!(d.groups.len(), 2);
        assert_eq!(d.pois.len(), 2);
        assert_eq!(d.polygons_path, Some(PathBuf::from("/decks/osm/ave84.geojson")));
        assert_eq!(d.pixel_budget, PixelBudget::default());
    }

    #[test]
    fn test_relative_paths_resolve_against_deck_dir() {
        let d = deck();
        assert_eq!(d.dem_path, Some(PathBuf::from("/decks/dem/ostalpen_dem.tif")));
        assert_eq!(d.lakes_path, Some(PathBuf::from("/data/osm/lakes.geojson")));
        assert_eq!(d.rivers_path, None);
        assert_eq!(d.output_dir, PathBuf::from("/decks/out"));
    }

    #[test]
    fn test_style_overrides_keep_defaults() {
        let d = deck();
        assert_eq!(d.style.river_width_pt, 0.5);
        assert_eq!(d.style.lake_color, HexColor([0x7f, 0xaf, 0xcf]));
        assert_eq!(d.style.label_shrink_fractions, vec![0.10, 0.06, 0.03, 0.01]);
    }

    #[test]
    fn test_filenames() {
        let d = deck();
        assert_eq!(
            d.basemap_path(),
            PathBuf::from("/decks/out/ps_ostalpen_ave84_basemap.webp")
        );
        assert_eq!(
            d.group_front_path("3a/b"),
            PathBuf::from("/decks/out/ps_ostalpen_ave84_group_3a_b_front.webp")
        );
        assert_eq!(
            d.group_back_path("1"),
            PathBuf::from("/decks/out/ps_ostalpen_ave84_group_1_back.webp")
        );
        assert_eq!(d.layer_dir(), PathBuf::from("/decks/out/_basemap_layers"));
    }

    #[test]
    fn test_group_lookups_and_colors() {
        let d = deck();
        assert_eq!(d.group_by_id("3a/b").unwrap().reference, "3a");
        assert_eq!(d.group_by_ref("1").unwrap().id, "1");
        assert!(d.group_by_ref("99").is_none());
        assert_eq!(d.fill_color("Nördliche Ostalpen"), HexColor([0x44, 0x77, 0xaa]));
        assert_eq!(d.fill_color("unknown"), HexColor([0x88, 0x88, 0x88]));
    }

    #[test]
    fn test_invalid_color_rejected() {
        let bad = DECK.replace("#4477AA", "#44");
        assert!(DeckConfig::from_json(&bad, Path::new(".")).is_err());
    }

    #[test]
    fn test_inverted_bbox_rejected() {
        let bad = DECK.replace("\"west\": 9.05", "\"west\": 19.05");
        let err = DeckConfig::from_json(&bad, Path::new(".")).unwrap_err();
        assert!(matches!(err, MapError::InvalidBbox(_)));
    }

    #[test]
    fn test_duplicate_group_rejected() {
        let bad = DECK.replace("\"id\": \"3a/b\"", "\"id\": \"1\"");
        let err = DeckConfig::from_json(&bad, Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_pois_and_category_styles() {
        let d = deck();
        let peak = d.poi_by_id("peak_07").unwrap();
        assert_eq!(peak.elevation, Some(1670));
        assert_eq!(peak.display_name(), "Hirschberg (Mittagsspitze)");
        assert_eq!(d.poi_by_id("town_01").unwrap().display_name(), "Landeck");
        assert!(d.poi_by_id("peak_99").is_none());

        // Configured category wins over the built-in one.
        let town = d.category_style("town");
        assert_eq!(town.color, HexColor([0, 0, 0]));
        assert_eq!(town.label, "Stadt");
        let peak = d.category_style("peak");
        assert_eq!(peak.marker, MarkerShape::Triangle);
        assert_eq!(peak.color, HexColor([0xb2, 0x22, 0x22]));
        assert_eq!(d.category_style("hut").label, "hut");
    }

    #[test]
    fn test_poi_filenames() {
        let d = deck();
        assert_eq!(
            d.all_pois_path(),
            PathBuf::from("/decks/out/ps_ostalpen_ave84_all_pois.webp")
        );
        assert_eq!(
            d.poi_highlight_path("a/b"),
            PathBuf::from("/decks/out/ps_ostalpen_ave84_poi_a_b_highlight.webp")
        );
        assert_eq!(
            d.poi_front_path("peak_07"),
            PathBuf::from("/decks/out/ps_ostalpen_ave84_poi_peak_07_front.webp")
        );
        assert_eq!(
            d.poi_back_path("peak_07"),
            PathBuf::from("/decks/out/ps_ostalpen_ave84_poi_peak_07_back.webp")
        );
    }

    #[test]
    fn test_duplicate_poi_rejected() {
        let bad = DECK.replace("\"id\": \"town_01\"", "\"id\": \"peak_07\"");
        let err = DeckConfig::from_json(&bad, Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("duplicate POI id"));
    }

    #[test]
    fn test_poi_only_deck() {
        let poi_only = r##"{
            "region": {"name": "nordalpen", "bbox": {"west": 9.5, "south": 46.3, "east": 12.5, "north": 47.8}},
            "classification": {
                "name": "pois",
                "title": "Peak Soaring",
                "ref_tag": "ref",
                "pois": [{"id": "pass_03", "name": "Fernpass", "category": "pass", "lon": 10.83494, "lat": 47.36392}]
            },
            "output_dir": "out"
        }"##;
        let d = DeckConfig::from_json(poi_only, Path::new("/decks")).unwrap();
        assert!(d.groups.is_empty());
        assert_eq!(d.polygons_path, None);
        assert_eq!(d.pois.len(), 1);
    }

    #[test]
    fn test_points_to_pixels() {
        let style = Style::default();
        assert!((style.px(72.0) - 480.0).abs() < 1e-12);
    }
}
