//! Raster basemaps and transparent card overlays for Alpine flashcard decks.

pub mod batch;
pub mod cache;
pub mod cards;
pub mod cli;
pub mod composite;
pub mod config;
pub mod dem;
pub mod error;
pub mod geojson;
pub mod hillshade;
pub mod logger;
pub mod math;
pub mod placement;
pub mod render;
pub mod rings;
pub mod text;
