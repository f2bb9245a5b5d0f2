//! CLI argument parsing and validation.

use clap::Parser;
use std::path::PathBuf;

use crate::batch::BatchOptions;
use crate::composite::ForceFlags;
use crate::error::{MapError, Result};
use crate::logger::VerbosityLevel;

/// Command line arguments for alpine-deck-maps.
#[derive(Parser, Debug)]
#[command(name = "alpine-deck-maps")]
#[command(version, about = "Render basemaps and card overlays for Alpine flashcard decks", long_about = None)]
pub struct Args {
    /// Path to the deck file (JSON).
    pub deck: PathBuf,

    /// Comma-separated group or POI ids to render (e.g. "3b,52,peak_12"; default: all).
    #[arg(long)]
    pub ids: Option<String>,

    /// Regenerate every layer and overlay.
    #[arg(long)]
    pub force: bool,

    /// Regenerate the cached hillshade layer.
    #[arg(long)]
    pub force_hillshade: bool,

    /// Regenerate the cached lake layer.
    #[arg(long)]
    pub force_lakes: bool,

    /// Regenerate the cached river layer.
    #[arg(long)]
    pub force_rivers: bool,

    /// Only build the basemap.
    #[arg(long)]
    pub basemap_only: bool,

    /// Verbose output with timestamps.
    #[arg(short, long)]
    pub verbose: bool,

    /// Only print written file paths and errors.
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable coloured output.
    #[arg(long)]
    pub no_color: bool,
}

/// Fully validated run configuration.
#[derive(Debug)]
pub struct RunOptions {
    pub deck: PathBuf,
    pub batch: BatchOptions,
    pub verbosity: VerbosityLevel,
    pub no_color: bool,
}

impl Args {
    /// Validates arguments and converts them to `RunOptions`.
    pub fn validate(self) -> Result<RunOptions> {
        if self.verbose && self.quiet {
            return Err(MapError::InvalidConfig(
                "--verbose and --quiet are mutually exclusive".to_string(),
            ));
        }
        let verbosity = if self.verbose {
            VerbosityLevel::Verbose
        } else if self.quiet {
            VerbosityLevel::Quiet
        } else {
            VerbosityLevel::Normal
        };

        let ids = self.ids.as_deref().map(parse_ids).transpose()?;

        Ok(RunOptions {
            deck: self.deck,
            batch: BatchOptions {
                ids,
                force: ForceFlags {
                    all: self.force,
                    hillshade: self.force_hillshade,
                    lakes: self.force_lakes,
                    rivers: self.force_rivers,
                },
                basemap_only: self.basemap_only,
            },
            verbosity,
            no_color: self.no_color,
        })
    }
}

fn parse_ids(s: &str) -> Result<Vec<String>> {
    let ids: Vec<String> = s
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();
    if ids.is_empty() {
        return Err(MapError::InvalidConfig(format!(
            "--ids expects a comma-separated list, got '{}'",
            s
        )));
    }
    Ok(ids)
}
