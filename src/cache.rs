//! Per-run cache of decoded source files.
//!
//! One `SessionCache` lives for one CLI invocation and is passed to every
//! renderer that reads source data. Entries are keyed by file path and never
//! evicted; files are assumed not to change during the run. A missing file
//! is cached as absent so the warning is only printed once.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use geojson::GeoJson;

use crate::dem::DemRaster;
use crate::error::{MapError, Result};
use crate::geojson::read_geojson;
use crate::logger;

#[derive(Default)]
pub struct SessionCache {
    dems: HashMap<PathBuf, Option<Rc<DemRaster>>>,
    documents: HashMap<PathBuf, Option<Rc<GeoJson>>>,
    reads: usize,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of files actually read from disk so far.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// The DEM at `path`, decimated against `threshold` on first load.
    ///
    /// Returns `Ok(None)` when no path is configured or the file is missing.
    pub fn dem(&mut self, path: Option<&Path>, threshold: usize) -> Result<Option<Rc<DemRaster>>> {
        let Some(path) = path else {
            return Ok(None);
        };
        if let Some(entry) = self.dems.get(path) {
            return Ok(entry.clone());
        }

        let entry = match DemRaster::load_geotiff(path, threshold) {
            Ok(raster) => {
                self.reads += 1;
                logger::info(&format!(
                    "DEM loaded: {}x{} from {}",
                    raster.width(),
                    raster.height(),
                    path.display()
                ));
                Some(Rc::new(raster))
            }
            Err(MapError::FileNotFound(_)) => {
                logger::warn(&format!("DEM not found: {}", path.display()));
                None
            }
            Err(e) => return Err(e),
        };
        self.dems.insert(path.to_path_buf(), entry.clone());
        Ok(entry)
    }

    /// The parsed GeoJSON document at `path`.
    ///
    /// Returns `Ok(None)` when no path is configured or the file is missing.
    pub fn document(&mut self, path: Option<&Path>) -> Result<Option<Rc<GeoJson>>> {
        let Some(path) = path else {
            return Ok(None);
        };
        if let Some(entry) = self.documents.get(path) {
            return Ok(entry.clone());
        }

        let entry = match read_geojson(path) {
            Ok(doc) => {
                self.reads += 1;
                logger::debug(&format!("GeoJSON loaded: {}", path.display()));
                Some(Rc::new(doc))
            }
            Err(MapError::FileNotFound(_)) => {
                logger::warn(&format!("GeoJSON not found: {}", path.display()));
                None
            }
            Err(e) => return Err(e),
        };
        self.documents.insert(path.to_path_buf(), entry.clone());
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const LAKE: &str = r#"{"type": "Polygon", "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]}"#;

    #[test]
    fn test_document_is_read_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lakes.geojson");
        fs::write(&path, LAKE).unwrap();

        let mut cache = SessionCache::new();
        let first = cache.document(Some(&path)).unwrap().unwrap();
        let second = cache.document(Some(&path)).unwrap().unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(cache.reads(), 1);
    }

    #[test]
    fn test_cache_returns_stale_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lakes.geojson");
        fs::write(&path, LAKE).unwrap();

        let mut cache = SessionCache::new();
        cache.document(Some(&path)).unwrap();
        fs::write(&path, "not json").unwrap();
        assert!(cache.document(Some(&path)).unwrap().is_some());
    }

    #[test]
    fn test_missing_sources_are_absent() {
        let mut cache = SessionCache::new();
        let missing = Path::new("/nonexistent/rivers.geojson");
        assert!(cache.document(Some(missing)).unwrap().is_none());
        assert!(cache.document(None).unwrap().is_none());
        assert!(cache
            .dem(Some(Path::new("/nonexistent/dem.tif")), 7000)
            .unwrap()
            .is_none());
        assert_eq!(cache.reads(), 0);
    }

    #[test]
    fn test_malformed_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.geojson");
        fs::write(&path, "{").unwrap();

        let mut cache = SessionCache::new();
        assert!(cache.document(Some(&path)).is_err());
    }
}
