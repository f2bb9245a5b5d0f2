//! GeoJSON file reading and source layer extraction.
//!
//! Every layer is assumed to be WGS84 (EPSG:4326). Mountain-group polygons
//! either arrive as Polygon / MultiPolygon features or as LineString way
//! fragments carrying a `role` property, which are assembled into rings.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use geo::{
    BooleanOps, BoundingRect, ChamberlainDuquetteArea, Coord, HaversineLength, Intersects,
    LineString, MultiPolygon, Polygon,
};
use geojson::{Feature, GeoJson, Geometry, Value};

use crate::error::{MapError, Result};
use crate::logger;
use crate::math::Bbox;
use crate::rings;

/// One polygon row of the classification layer.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupPolygon {
    /// Value of the reference tag.
    pub reference: String,
    /// Value of the parent tag, when one is configured and present.
    pub parent: Option<String>,
    pub geometry: MultiPolygon<f64>,
}

/// Opens and parses a GeoJSON file.
pub fn read_geojson(path: &Path) -> Result<GeoJson> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            MapError::FileNotFound(path.display().to_string())
        } else {
            MapError::Io(e)
        }
    })?;

    content
        .parse()
        .map_err(|e| MapError::GeojsonParse(format!("{}: {}", path.display(), e)))
}

/// Flattens any GeoJSON root into a list of features.
fn features(geojson: &GeoJson) -> Vec<Feature> {
    match geojson {
        GeoJson::Geometry(geom) => vec![Feature {
            bbox: None,
            geometry: Some(geom.clone()),
            id: None,
            properties: None,
            foreign_members: None,
        }],
        GeoJson::Feature(feature) => vec![feature.clone()],
        GeoJson::FeatureCollection(collection) => collection.features.clone(),
    }
}

/// Property value as a non-empty string. Numbers are formatted.
fn property_str(feature: &Feature, key: &str) -> Option<String> {
    let value = match feature.property(key)? {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!value.is_empty()).then_some(value)
}

/// Reference of a feature under `tag`, falling back to the column name
/// with `:` replaced by `_`.
pub fn reference_of(feature: &Feature, tag: &str) -> Option<String> {
    property_str(feature, tag).or_else(|| property_str(feature, &tag.replace(':', "_")))
}

#[derive(Default)]
struct Fragments {
    parent: Option<String>,
    outer: Vec<Vec<Coord<f64>>>,
    inner: Vec<Vec<Coord<f64>>>,
}

/// Extracts the classification polygons keyed by reference.
///
/// Rows keep their file order. Fragment rows are assembled per reference and
/// emitted after the polygon rows; a reference whose fragments close no outer
/// ring is dropped with a warning.
pub fn group_polygons(
    geojson: &GeoJson,
    ref_tag: &str,
    parent_tag: Option<&str>,
) -> Vec<GroupPolygon> {
    let mut polygons = Vec::new();
    let mut fragment_order: Vec<String> = Vec::new();
    let mut fragments: HashMap<String, Fragments> = HashMap::new();

    for feature in features(geojson) {
        let Some(reference) = reference_of(&feature, ref_tag) else {
            continue;
        };
        let Some(geom) = feature.geometry.as_ref() else {
            continue;
        };
        let parent = parent_tag.and_then(|tag| property_str(&feature, tag));

        if let Some(geometry) = geometry_to_multipolygon(geom) {
            polygons.push(GroupPolygon {
                reference,
                parent,
                geometry,
            });
            continue;
        }

        let lines = geometry_to_lines(geom);
        if lines.is_empty() {
            continue;
        }
        let entry = fragments.entry(reference.clone()).or_insert_with(|| {
            fragment_order.push(reference);
            Fragments::default()
        });
        if entry.parent.is_none() {
            entry.parent = parent;
        }
        let inner = property_str(&feature, "role").as_deref() == Some("inner");
        let target = if inner { &mut entry.inner } else { &mut entry.outer };
        target.extend(lines.into_iter().map(|l| l.0));
    }

    for reference in fragment_order {
        let Some(parts) = fragments.remove(&reference) else {
            continue;
        };
        match rings::assemble_polygon(&parts.outer, &parts.inner) {
            Some(geometry) => polygons.push(GroupPolygon {
                reference,
                parent: parts.parent,
                geometry,
            }),
            None => logger::warn(&format!("No closed outer ring for '{}'", reference)),
        }
    }

    polygons
}

/// Lake polygons clipped to `render_bbox`, keeping features whose clipped
/// area reaches `min_area_km2`.
pub fn lakes(geojson: &GeoJson, render_bbox: &Bbox, min_area_km2: f64) -> Vec<Polygon<f64>> {
    let min_area_m2 = min_area_km2 * 1e6;
    features(geojson)
        .iter()
        .filter_map(|f| f.geometry.as_ref().and_then(geometry_to_multipolygon))
        .filter_map(|mp| clip_polygons(mp, render_bbox))
        .filter(|mp| min_area_km2 <= 0.0 || mp.chamberlain_duquette_unsigned_area() >= min_area_m2)
        .flat_map(|mp| mp.0)
        .collect()
}

/// Named rivers clipped to `render_bbox`, dissolved by name and kept when
/// their total length reaches `min_length_km`.
pub fn rivers(geojson: &GeoJson, render_bbox: &Bbox, min_length_km: f64) -> Vec<LineString<f64>> {
    let mut order: Vec<String> = Vec::new();
    let mut by_name: HashMap<String, Vec<LineString<f64>>> = HashMap::new();

    for feature in features(geojson) {
        let Some(name) = property_str(&feature, "name") else {
            continue;
        };
        let Some(geom) = feature.geometry.as_ref() else {
            continue;
        };
        let clipped: Vec<LineString<f64>> = geometry_to_lines(geom)
            .iter()
            .flat_map(|line| clip_line(line, render_bbox))
            .collect();
        if clipped.is_empty() {
            continue;
        }
        by_name
            .entry(name.clone())
            .or_insert_with(|| {
                order.push(name);
                Vec::new()
            })
            .extend(clipped);
    }

    let min_length_m = min_length_km * 1000.0;
    order
        .into_iter()
        .filter_map(|name| by_name.remove(&name))
        .filter(|lines| {
            let length: f64 = lines.iter().map(|l| l.haversine_length()).sum();
            min_length_km <= 0.0 || length >= min_length_m
        })
        .flatten()
        .collect()
}

/// Border lines clipped to `render_bbox`.
pub fn borders(geojson: &GeoJson, render_bbox: &Bbox) -> Vec<LineString<f64>> {
    features(geojson)
        .iter()
        .filter_map(|f| f.geometry.as_ref())
        .flat_map(geometry_to_lines)
        .flat_map(|line| clip_line(&line, render_bbox))
        .collect()
}

fn clip_polygons(mp: MultiPolygon<f64>, bbox: &Bbox) -> Option<MultiPolygon<f64>> {
    let rect = bbox.to_rect();
    let bounds = mp.bounding_rect()?;
    if !rect.intersects(&bounds) {
        return None;
    }
    let (min, max) = (bounds.min(), bounds.max());
    if min.x >= bbox.west && max.x <= bbox.east && min.y >= bbox.south && max.y <= bbox.north {
        return Some(mp);
    }
    let clipped = mp.intersection(&MultiPolygon::new(vec![rect.to_polygon()]));
    (!clipped.0.is_empty()).then_some(clipped)
}

/// Liang-Barsky clip of one segment. Unclipped ends are returned unchanged.
fn clip_segment(a: Coord<f64>, b: Coord<f64>, bbox: &Bbox) -> Option<(Coord<f64>, Coord<f64>)> {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let mut t0: f64 = 0.0;
    let mut t1: f64 = 1.0;

    for (p, q) in [
        (-dx, a.x - bbox.west),
        (dx, bbox.east - a.x),
        (-dy, a.y - bbox.south),
        (dy, bbox.north - a.y),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }

    let at = |t: f64| {
        if t == 0.0 {
            a
        } else if t == 1.0 {
            b
        } else {
            Coord {
                x: a.x + t * dx,
                y: a.y + t * dy,
            }
        }
    };
    Some((at(t0), at(t1)))
}

/// Pieces of `line` inside `bbox`.
fn clip_line(line: &LineString<f64>, bbox: &Bbox) -> Vec<LineString<f64>> {
    let mut pieces = Vec::new();
    let mut current: Vec<Coord<f64>> = Vec::new();

    for seg in line.lines() {
        match clip_segment(seg.start, seg.end, bbox) {
            Some((p, q)) => {
                if current.last() != Some(&p) {
                    if current.len() >= 2 {
                        pieces.push(LineString::from(std::mem::take(&mut current)));
                    }
                    current.clear();
                    current.push(p);
                }
                current.push(q);
            }
            None => {
                if current.len() >= 2 {
                    pieces.push(LineString::from(std::mem::take(&mut current)));
                }
                current.clear();
            }
        }
    }
    if current.len() >= 2 {
        pieces.push(LineString::from(current));
    }
    pieces
}

/// Convert a GeoJSON geometry to a MultiPolygon.
fn geometry_to_multipolygon(geom: &Geometry) -> Option<MultiPolygon<f64>> {
    match &geom.value {
        Value::Polygon(coords) => {
            let polygon = polygon_from_coords(coords)?;
            Some(MultiPolygon::new(vec![polygon]))
        }
        Value::MultiPolygon(multi_coords) => {
            let polygons: Vec<Polygon<f64>> = multi_coords
                .iter()
                .filter_map(|coords| polygon_from_coords(coords))
                .collect();
            if polygons.is_empty() {
                None
            } else {
                Some(MultiPolygon::new(polygons))
            }
        }
        _ => None,
    }
}

/// Line geometries of a GeoJSON geometry; polygons contribute nothing.
fn geometry_to_lines(geom: &Geometry) -> Vec<LineString<f64>> {
    match &geom.value {
        Value::LineString(coords) => linestring_from_coords(coords).into_iter().collect(),
        Value::MultiLineString(lines) => lines
            .iter()
            .filter_map(|coords| linestring_from_coords(coords))
            .collect(),
        Value::GeometryCollection(geoms) => geoms.iter().flat_map(geometry_to_lines).collect(),
        _ => Vec::new(),
    }
}

/// Convert GeoJSON polygon coordinates to geo Polygon.
fn polygon_from_coords(coords: &[Vec<Vec<f64>>]) -> Option<Polygon<f64>> {
    if coords.is_empty() {
        return None;
    }

    let exterior = linestring_from_coords(&coords[0])?;
    let interiors: Vec<LineString<f64>> = coords[1..]
        .iter()
        .filter_map(|ring| linestring_from_coords(ring))
        .collect();

    Some(Polygon::new(exterior, interiors))
}

/// Convert GeoJSON position lists to geo LineString.
fn linestring_from_coords(coords: &[Vec<f64>]) -> Option<LineString<f64>> {
    let points: Vec<Coord<f64>> = coords
        .iter()
        .filter(|point| point.len() >= 2)
        .map(|point| Coord {
            x: point[0],
            y: point[1],
        })
        .collect();

    if points.len() < 2 {
        None
    } else {
        Some(LineString::from(points))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_box() -> Bbox {
        Bbox::new(9.0, 46.0, 12.0, 48.0).unwrap()
    }

    #[test]
    fn test_polygon_features_keyed_by_reference() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {"ref:aveo": "1", "name": "Bregenzerwald"},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": {"ref_aveo": 2},
                    "geometry": {
                        "type": "MultiPolygon",
                        "coordinates": [[[[2.0, 2.0], [3.0, 2.0], [3.0, 3.0], [2.0, 2.0]]]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": {"name": "unreferenced"},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]
                    }
                }
            ]
        }"#;

        let geojson: GeoJson = json.parse().unwrap();
        let polygons = group_polygons(&geojson, "ref:aveo", None);
        assert_eq!(polygons.len(), 2);
        assert_eq!(polygons[0].reference, "1");
        assert_eq!(polygons[1].reference, "2");
        assert_eq!(polygons[0].parent, None);
    }

    #[test]
    fn test_way_fragments_are_assembled() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {"ref": "7", "role": "outer", "sz": "SZ 12"},
                    "geometry": {"type": "LineString", "coordinates": [[0.0, 0.0], [4.0, 0.0], [4.0, 4.0]]}
                },
                {
                    "type": "Feature",
                    "properties": {"ref": "7", "role": "outer"},
                    "geometry": {"type": "LineString", "coordinates": [[0.0, 0.0], [0.0, 4.0], [4.0, 4.0]]}
                },
                {
                    "type": "Feature",
                    "properties": {"ref": "7", "role": "inner"},
                    "geometry": {"type": "LineString", "coordinates": [[1.0, 1.0], [2.0, 1.0], [2.0, 2.0], [1.0, 1.0]]}
                },
                {
                    "type": "Feature",
                    "properties": {"ref": "8", "role": "inner"},
                    "geometry": {"type": "LineString", "coordinates": [[1.0, 1.0], [2.0, 1.0], [2.0, 2.0], [1.0, 1.0]]}
                }
            ]
        }"#;

        let geojson: GeoJson = json.parse().unwrap();
        let polygons = group_polygons(&geojson, "ref", Some("sz"));
        assert_eq!(polygons.len(), 1);
        let group = &polygons[0];
        assert_eq!(group.reference, "7");
        assert_eq!(group.parent.as_deref(), Some("SZ 12"));
        let poly = &group.geometry.0[0];
        assert_eq!(poly.exterior().0.len(), 5);
        assert_eq!(poly.interiors().len(), 1);
    }

    #[test]
    fn test_lakes_filtered_by_area() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {"name": "Achensee"},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[11.0, 47.0], [11.1, 47.0], [11.1, 47.1], [11.0, 47.1], [11.0, 47.0]]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": {"name": "pond"},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[10.0, 47.0], [10.005, 47.0], [10.005, 47.005], [10.0, 47.005], [10.0, 47.0]]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": {"name": "far away"},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[20.0, 40.0], [21.0, 40.0], [21.0, 41.0], [20.0, 41.0], [20.0, 40.0]]]
                    }
                }
            ]
        }"#;

        let geojson: GeoJson = json.parse().unwrap();
        let kept = lakes(&geojson, &render_box(), 1.0);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].exterior().0[0], Coord { x: 11.0, y: 47.0 });
    }

    #[test]
    fn test_lake_crossing_render_box_is_clipped() {
        let json = r#"{
            "type": "Polygon",
            "coordinates": [[[11.5, 47.5], [12.5, 47.5], [12.5, 47.8], [11.5, 47.8], [11.5, 47.5]]]
        }"#;

        let geojson: GeoJson = json.parse().unwrap();
        let kept = lakes(&geojson, &render_box(), 1.0);
        assert_eq!(kept.len(), 1);
        let max_x = kept[0]
            .exterior()
            .coords()
            .map(|c| c.x)
            .fold(f64::MIN, f64::max);
        assert!((max_x - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_rivers_dissolved_by_name_before_length_filter() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {"name": "Inn"},
                    "geometry": {"type": "LineString", "coordinates": [[10.0, 47.0], [10.15, 47.0]]}
                },
                {
                    "type": "Feature",
                    "properties": {"name": "Inn"},
                    "geometry": {"type": "LineString", "coordinates": [[10.15, 47.0], [10.3, 47.0]]}
                },
                {
                    "type": "Feature",
                    "properties": {"name": "Sill"},
                    "geometry": {"type": "LineString", "coordinates": [[11.0, 47.0], [11.1, 47.0]]}
                },
                {
                    "type": "Feature",
                    "properties": {"name": "  "},
                    "geometry": {"type": "LineString", "coordinates": [[10.0, 46.5], [11.0, 46.5]]}
                }
            ]
        }"#;

        let geojson: GeoJson = json.parse().unwrap();
        let kept = rivers(&geojson, &render_box(), 20.0);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|l| l.0[0].y == 47.0 && l.0[0].x < 10.3));
    }

    #[test]
    fn test_river_clipped_at_render_box() {
        let json = r#"{
            "type": "Feature",
            "properties": {"name": "Etsch"},
            "geometry": {"type": "LineString", "coordinates": [[11.0, 45.0], [11.0, 47.0], [11.5, 47.0]]}
        }"#;

        let geojson: GeoJson = json.parse().unwrap();
        let kept = rivers(&geojson, &render_box(), 0.0);
        assert_eq!(kept.len(), 1);
        assert_eq!(
            kept[0].0,
            vec![
                Coord { x: 11.0, y: 46.0 },
                Coord { x: 11.0, y: 47.0 },
                Coord { x: 11.5, y: 47.0 }
            ]
        );
    }

    #[test]
    fn test_border_leaving_and_reentering_splits() {
        let bbox = Bbox::new(0.0, 0.0, 10.0, 10.0).unwrap();
        let line = LineString::from(vec![(1.0, 5.0), (12.0, 5.0), (12.0, 6.0), (1.0, 6.0)]);
        let pieces = clip_line(&line, &bbox);
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].0[0], Coord { x: 1.0, y: 5.0 });
        assert!((pieces[0].0[1].x - 10.0).abs() < 1e-9);
        assert!((pieces[1].0[0].x - 10.0).abs() < 1e-9);
        assert_eq!(pieces[1].0[1], Coord { x: 1.0, y: 6.0 });
    }

    #[test]
    fn test_ignore_non_line_geometries_in_borders() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [10.0, 47.0]}},
                {"type": "Feature", "properties": {}, "geometry": {"type": "MultiLineString", "coordinates": [[[10.0, 47.0], [10.5, 47.2]], [[13.0, 47.0], [14.0, 47.0]]]}}
            ]
        }"#;

        let geojson: GeoJson = json.parse().unwrap();
        assert_eq!(borders(&geojson, &render_box()).len(), 1);
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = read_geojson(Path::new("/nonexistent/lakes.geojson")).unwrap_err();
        assert!(matches!(err, MapError::FileNotFound(_)));
    }
}
