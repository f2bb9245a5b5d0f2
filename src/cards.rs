//! Transparent card overlays drawn over the shared basemap.
//!
//! Every overlay is created at the size of the deck's [`RasterFrame`], so it
//! lines up with the basemap pixel for pixel.

use std::collections::HashSet;
use std::path::Path;

use geo::{BooleanOps, EuclideanDistance, LineString, MultiPolygon, Point};
use image::{DynamicImage, RgbaImage};

use crate::config::{CategoryStyle, DeckConfig, Group, HexColor, MarkerShape, OutputFormat, Poi};
use crate::composite::save_image;
use crate::error::Result;
use crate::geojson::GroupPolygon;
use crate::math::RasterFrame;
use crate::placement::{annotate_glyphs, label_point, pack_circles};
use crate::render::{draw_disc, draw_fill, draw_lines, draw_pixel_shape, DashPattern, Stroke};
use crate::text::{Fonts, HAlign, TextBox, TextStyle, VAlign, Weight};

/// Sibling segments closer than this to the dissolved outline are outline.
const OUTLINE_EPSILON: f64 = 1e-6;

/// Label boxes are white.
const BOX_FILL: HexColor = HexColor([0xff, 0xff, 0xff]);

/// Vertices of a highlight ellipse.
const HIGHLIGHT_SEGMENTS: usize = 72;
const CIRCLE_MARKER_SEGMENTS: usize = 32;

/// Marker outline in pixels around `center`; `size_px` is the marker's
/// nominal diameter.
fn marker_ring(shape: MarkerShape, center: (f64, f64), size_px: f64) -> Vec<(f64, f64)> {
    let (cx, cy) = center;
    let h = size_px / 2.0;
    match shape {
        MarkerShape::Triangle => vec![(cx, cy - h), (cx + h, cy + h), (cx - h, cy + h)],
        MarkerShape::Square => vec![(cx - h, cy - h), (cx + h, cy - h), (cx + h, cy + h), (cx - h, cy + h)],
        MarkerShape::Diamond => {
            let d = h * std::f64::consts::SQRT_2;
            vec![(cx, cy - d), (cx + d, cy), (cx, cy + d), (cx - d, cy)]
        }
        MarkerShape::Circle => (0..CIRCLE_MARKER_SEGMENTS)
            .map(|i| {
                let t = i as f64 / CIRCLE_MARKER_SEGMENTS as f64 * std::f64::consts::TAU;
                (cx + h * t.cos(), cy + h * t.sin())
            })
            .collect(),
    }
}

/// Circle of `radius_deg` degrees of latitude around a point, widened in
/// longitude so it stays round at that latitude.
fn highlight_ring(lon: f64, lat: f64, radius_deg: f64) -> LineString<f64> {
    let rx = radius_deg / lat.to_radians().cos().max(1e-6);
    LineString::from(
        (0..=HIGHLIGHT_SEGMENTS)
            .map(|i| {
                let t = i as f64 / HIGHLIGHT_SEGMENTS as f64 * std::f64::consts::TAU;
                (lon + rx * t.cos(), lat + radius_deg * t.sin())
            })
            .collect::<Vec<_>>(),
    )
}

/// Label of a POI on the all-POIs overlay.
fn small_label(poi: &Poi) -> String {
    match poi.elevation {
        Some(m) => format!("{}\n{}m", poi.name, m),
        None => poi.name.clone(),
    }
}

/// Label of the target POI on its back card.
fn target_label(poi: &Poi) -> String {
    match poi.elevation {
        Some(m) => format!("{}\n{} m", poi.display_name(), m),
        None => poi.display_name(),
    }
}

fn rings(geometry: &MultiPolygon<f64>) -> impl Iterator<Item = &LineString<f64>> {
    geometry
        .iter()
        .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
}

fn boundary_lines<'a>(geometries: impl IntoIterator<Item = &'a MultiPolygon<f64>>) -> Vec<LineString<f64>> {
    geometries
        .into_iter()
        .flat_map(|g| rings(g).cloned().collect::<Vec<_>>())
        .collect()
}

/// Parts of the sibling boundaries that do not lie on `outline`.
fn internal_edges(siblings: &[&MultiPolygon<f64>], outline: &MultiPolygon<f64>) -> Vec<LineString<f64>> {
    let outline_rings: Vec<&LineString<f64>> = rings(outline).collect();
    let on_outline = |a: geo::Coord<f64>, b: geo::Coord<f64>| {
        let mid = Point::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0);
        outline_rings
            .iter()
            .any(|ring| mid.euclidean_distance(*ring) <= OUTLINE_EPSILON)
    };

    let mut edges = Vec::new();
    for ring in siblings.iter().flat_map(|g| rings(g)) {
        let mut run: Vec<geo::Coord<f64>> = Vec::new();
        for line in ring.lines() {
            if on_outline(line.start, line.end) {
                if run.len() >= 2 {
                    edges.push(LineString::new(std::mem::take(&mut run)));
                }
                run.clear();
                continue;
            }
            if run.is_empty() {
                run.push(line.start);
            }
            run.push(line.end);
        }
        if run.len() >= 2 {
            edges.push(LineString::new(run));
        }
    }
    edges
}

/// Renders the overlays of one deck.
pub struct CardRenderer<'a> {
    deck: &'a DeckConfig,
    frame: RasterFrame,
    polygons: &'a [GroupPolygon],
    fonts: &'a Fonts,
}

impl<'a> CardRenderer<'a> {
    pub fn new(deck: &'a DeckConfig, frame: RasterFrame, polygons: &'a [GroupPolygon], fonts: &'a Fonts) -> Self {
        Self {
            deck,
            frame,
            polygons,
            fonts,
        }
    }

    fn blank(&self) -> RgbaImage {
        RgbaImage::new(self.frame.width(), self.frame.height())
    }

    fn to_pixel(&self, p: Point<f64>) -> (f64, f64) {
        self.frame.world_to_pixel(p.x(), p.y())
    }

    /// First polygon row of a group.
    pub fn polygon_of(&self, group: &Group) -> Option<&'a GroupPolygon> {
        self.polygons.iter().find(|p| p.reference == group.reference)
    }

    /// Every group coloured by Hauptgruppe with a unified border and one id
    /// label per group.
    pub fn partition(&self) -> RgbaImage {
        let style = &self.deck.style;
        let mut img = self.blank();
        let mut drawn: Vec<&MultiPolygon<f64>> = Vec::new();
        let mut labels: Vec<(&str, Point<f64>)> = Vec::new();
        let mut labelled: HashSet<&str> = HashSet::new();

        for row in self.polygons {
            let Some(group) = self.deck.group_by_ref(&row.reference) else {
                continue;
            };
            let fill = self.deck.fill_color(&group.hauptgruppe);
            draw_fill(&mut img, &row.geometry.0, &self.frame, fill.rgba(style.polygon_alpha));
            drawn.push(&row.geometry);

            if labelled.insert(group.id.as_str()) {
                if let Some(p) = label_point(&row.geometry, &style.label_shrink_fractions) {
                    labels.push((group.id.as_str(), p));
                }
            }
        }

        let border = Stroke {
            color: style.polygon_border_color.rgba(1.0),
            width: style.px(style.polygon_border_width_pt),
            dash: None,
        };
        draw_lines(&mut img, &boundary_lines(drawn), &self.frame, &border);

        let text = TextStyle {
            size_px: style.px(style.label_fontsize_pt),
            weight: Weight::Bold,
            color: style.label_color.rgba(1.0),
            background: None,
        };
        for (id, p) in labels {
            self.fonts
                .draw_text(&mut img, id, self.to_pixel(p), &text, HAlign::Center, VAlign::Center);
        }
        img
    }

    /// Country borders and cities.
    pub fn context(&self, borders: &[LineString<f64>]) -> RgbaImage {
        let style = &self.deck.style;
        let mut img = self.blank();

        let width = style.px(style.border_width_pt);
        let stroke = Stroke {
            color: style.border_color.rgba(1.0),
            width,
            dash: Some(DashPattern::dashed(width)),
        };
        draw_lines(&mut img, borders, &self.frame, &stroke);

        let text = TextStyle {
            size_px: style.px(style.city_fontsize_pt),
            weight: Weight::Regular,
            color: style.city_color.rgba(1.0),
            background: None,
        };
        for city in &self.deck.cities {
            let marker = self.frame.world_to_pixel(city.lon, city.lat);
            draw_disc(&mut img, marker, style.px(style.city_marker_pt) / 2.0, style.city_color.rgba(1.0));
            let anchor = self.frame.world_to_pixel(city.lon + city.dx, city.lat + city.dy);
            let halign = if city.dx >= 0.0 { HAlign::Left } else { HAlign::Right };
            self.fonts
                .draw_text(&mut img, &city.name, anchor, &text, halign, VAlign::Bottom);
        }
        img
    }

    /// Question marks spread over the group polygon. `None` when the group
    /// has no polygon.
    pub fn front(&self, group: &Group) -> Option<RgbaImage> {
        let row = self.polygon_of(group)?;
        let style = &self.deck.style;
        let mut img = self.blank();

        let mut circles = pack_circles(&row.geometry, &style.packing_params());
        annotate_glyphs(
            &mut circles,
            self.frame.px_per_degree_lat(),
            style.qmark_fill_factor,
            style.px(style.qmark_fontsize_min_pt),
        );
        for circle in &circles {
            let Some(size_px) = circle.glyph_px else {
                continue;
            };
            let text = TextStyle {
                size_px,
                weight: Weight::Bold,
                color: style.qmark_color.rgba(1.0),
                background: None,
            };
            self.fonts
                .draw_text(&mut img, "?", self.to_pixel(circle.center), &text, HAlign::Center, VAlign::Center);
        }
        Some(img)
    }

    /// Target outline, over the dissolved parent region when the deck has a
    /// parent tag. `None` when the group has no polygon.
    pub fn back(&self, group: &Group) -> Option<RgbaImage> {
        let row = self.polygon_of(group)?;
        let style = &self.deck.style;
        let mut img = self.blank();

        if self.deck.parent_tag.is_some() {
            self.draw_parent(&mut img, group, row);
        }

        let outline = Stroke {
            color: style.highlight_color.rgba(1.0),
            width: style.px(style.highlight_width_pt),
            dash: None,
        };
        draw_lines(&mut img, &boundary_lines([&row.geometry]), &self.frame, &outline);
        Some(img)
    }

    fn draw_marker(&self, img: &mut RgbaImage, poi: &Poi, category: &CategoryStyle, scale: f64) {
        let style = &self.deck.style;
        let center = self.frame.world_to_pixel(poi.lon, poi.lat);
        let ring = marker_ring(category.marker, center, style.px(category.size * scale));
        let edge = (
            style.poi_marker_edge_color.rgba(1.0),
            style.px(style.poi_marker_edge_width_pt * scale),
        );
        draw_pixel_shape(img, &ring, category.color.rgba(1.0), Some(edge), 2);
    }

    fn draw_highlight(&self, img: &mut RgbaImage, poi: &Poi) {
        let style = &self.deck.style;
        let stroke = Stroke {
            color: style.highlight_color.rgba(1.0),
            width: style.px(style.poi_highlight_width_pt),
            dash: None,
        };
        let ring = highlight_ring(poi.lon, poi.lat, style.poi_highlight_radius_deg);
        draw_lines(img, &[ring], &self.frame, &stroke);
    }

    /// Every POI as a category-styled marker with a small name label.
    pub fn all_pois(&self) -> RgbaImage {
        let style = &self.deck.style;
        let mut img = self.blank();
        let alpha = style.poi_label_alpha;
        let size_px = style.px(style.poi_label_fontsize_pt);
        let (dx, dy) = style.poi_label_offset;

        for poi in &self.deck.pois {
            let category = self.deck.category_style(&poi.category);
            self.draw_marker(&mut img, poi, &category, 1.0);

            let text = TextStyle {
                size_px,
                weight: Weight::Regular,
                color: category.color.rgba(alpha),
                background: Some(TextBox {
                    fill: BOX_FILL.rgba(0.5 * alpha),
                    edge: None,
                    pad_px: 0.15 * size_px,
                }),
            };
            let anchor = self.frame.world_to_pixel(poi.lon + dx, poi.lat + dy);
            self.fonts
                .draw_text(&mut img, &small_label(poi), anchor, &text, HAlign::Left, VAlign::Bottom);
        }
        img
    }

    /// Locate front: the question naming the POI, boxed at the top centre.
    pub fn poi_front(&self, poi: &Poi) -> RgbaImage {
        let style = &self.deck.style;
        let mut img = self.blank();
        let red = style.highlight_color;
        let size_px = style.px(style.poi_question_fontsize_pt);
        let pad_px = 0.4 * size_px;
        let edge_px = style.px(style.poi_question_box_edge_pt);

        let question = TextStyle {
            size_px,
            weight: Weight::Bold,
            color: red.rgba(1.0),
            background: Some(TextBox {
                fill: BOX_FILL.rgba(style.poi_question_box_alpha),
                edge: Some((red.rgba(style.poi_question_box_alpha), edge_px)),
                pad_px,
            }),
        };
        let top = 0.04 * self.frame.height() as f64;
        let center_x = self.frame.width() as f64 / 2.0;
        let prompt = style.poi_question.replace("{}", &poi.display_name());
        let below = self
            .fonts
            .draw_text(&mut img, &prompt, (center_x, top), &question, HAlign::Center, VAlign::Top)
            .map_or(top, |ink| ink.bottom as f64 + pad_px + edge_px);

        let info = TextStyle {
            size_px: style.px(style.poi_question_info_fontsize_pt),
            weight: Weight::Regular,
            color: style.poi_question_info_color.rgba(1.0),
            background: None,
        };
        let label = self.deck.category_style(&poi.category).label;
        let gap = 0.5 * info.size_px;
        self.fonts
            .draw_text(&mut img, &label, (center_x, below + gap), &info, HAlign::Center, VAlign::Top);
        img
    }

    /// The red circle around one POI.
    pub fn poi_highlight(&self, poi: &Poi) -> RgbaImage {
        let mut img = self.blank();
        self.draw_highlight(&mut img, poi);
        img
    }

    /// Locate back: the highlight circle, an enlarged marker and the
    /// boxed name and elevation of the POI.
    pub fn poi_back(&self, poi: &Poi) -> RgbaImage {
        let style = &self.deck.style;
        let mut img = self.blank();
        self.draw_highlight(&mut img, poi);

        let category = self.deck.category_style(&poi.category);
        self.draw_marker(&mut img, poi, &category, style.poi_target_scale);

        let red = style.highlight_color;
        let size_px = style.px(style.poi_target_fontsize_pt);
        let text = TextStyle {
            size_px,
            weight: Weight::Bold,
            color: red.rgba(1.0),
            background: Some(TextBox {
                fill: BOX_FILL.rgba(style.poi_target_box_alpha),
                edge: Some((red.rgba(style.poi_target_box_alpha), style.px(style.poi_target_box_edge_pt))),
                pad_px: 0.3 * size_px,
            }),
        };
        let (dx, dy) = style.poi_target_offset;
        let anchor = self.frame.world_to_pixel(poi.lon + dx, poi.lat + dy);
        self.fonts
            .draw_text(&mut img, &target_label(poi), anchor, &text, HAlign::Left, VAlign::Bottom);
        img
    }

    fn draw_parent(&self, img: &mut RgbaImage, group: &Group, target: &GroupPolygon) {
        let Some(parent) = target.parent.as_deref().filter(|p| !p.is_empty()) else {
            return;
        };
        let siblings: Vec<&MultiPolygon<f64>> = self
            .polygons
            .iter()
            .filter(|p| p.parent.as_deref() == Some(parent) && p.reference != target.reference)
            .map(|p| &p.geometry)
            .collect();
        if siblings.is_empty() {
            return;
        }

        let style = &self.deck.style;
        let color = self.deck.fill_color(&group.hauptgruppe);
        let dissolved = siblings
            .iter()
            .fold(MultiPolygon::new(Vec::new()), |acc, g| acc.union(*g));

        let faint = color.rgba(style.parent_alpha);
        draw_fill(img, &dissolved.0, &self.frame, faint);
        let edge = Stroke {
            color: faint,
            width: style.px(style.parent_line_width_pt),
            dash: None,
        };
        draw_lines(img, &boundary_lines([&dissolved]), &self.frame, &edge);

        let inner = internal_edges(&siblings, &dissolved);
        if !inner.is_empty() {
            let width = style.px(style.sibling_edge_width_pt);
            let dashed = Stroke {
                color: color.rgba(style.sibling_edge_alpha),
                width,
                dash: Some(DashPattern::dashed(width)),
            };
            draw_lines(img, &inner, &self.frame, &dashed);
        }
    }
}

/// Writes an overlay in the deck's output format.
pub fn save_overlay(image: RgbaImage, path: &Path, format: OutputFormat) -> Result<()> {
    save_image(&DynamicImage::ImageRgba8(image), path, format.image_format())
}
