//! Batch generation of one deck: basemap first, then every overlay.
//!
//! Group decks get a partition and a front and back card per group. POI
//! decks get the all-POIs overlay and a front, highlight and back card per
//! POI. A deck may carry both.
//!
//! Each artifact is skipped when its file exists, unless forced. One failing
//! card does not stop the run; failures are collected in the summary.

use std::fs;
use std::path::PathBuf;

use indicatif::{ProgressBar, ProgressStyle};

use crate::cache::SessionCache;
use crate::cards::{save_overlay, CardRenderer};
use crate::composite::{BasemapBuilder, BuildOutcome, ForceFlags};
use crate::config::{DeckConfig, Group, Poi};
use crate::error::Result;
use crate::geojson::{self, GroupPolygon};
use crate::logger;
use crate::text::Fonts;

/// What to generate in one run.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Group or POI ids to render; everything when `None`.
    pub ids: Option<Vec<String>>,
    pub force: ForceFlags,
    pub basemap_only: bool,
}

/// Per-artifact results of a run.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub basemap: Option<BuildOutcome>,
    pub written: Vec<PathBuf>,
    /// Existing files left alone.
    pub cached: Vec<PathBuf>,
    /// Entities that could not be rendered, with the reason.
    pub skipped: Vec<(String, String)>,
    pub failed: Vec<(String, String)>,
}

impl BatchSummary {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn report(&self) {
        logger::info(&format!(
            "Done: {} written, {} cached, {} skipped, {} failed",
            self.written.len(),
            self.cached.len(),
            self.skipped.len(),
            self.failed.len()
        ));
        for (name, reason) in &self.skipped {
            logger::warn(&format!("Skipped {}: {}", name, reason));
        }
        for (name, reason) in &self.failed {
            logger::error(&format!("Failed {}: {}", name, reason));
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Card<'d> {
    Partition,
    Context,
    Front(&'d Group),
    Back(&'d Group),
    AllPois,
    PoiFront(&'d Poi),
    PoiHighlight(&'d Poi),
    PoiBack(&'d Poi),
}

impl Card<'_> {
    fn path(&self, deck: &DeckConfig) -> PathBuf {
        match self {
            Card::Partition => deck.partition_path(),
            Card::Context => deck.context_path(),
            Card::Front(g) => deck.group_front_path(&g.id),
            Card::Back(g) => deck.group_back_path(&g.id),
            Card::AllPois => deck.all_pois_path(),
            Card::PoiFront(p) => deck.poi_front_path(&p.id),
            Card::PoiHighlight(p) => deck.poi_highlight_path(&p.id),
            Card::PoiBack(p) => deck.poi_back_path(&p.id),
        }
    }

    fn label(&self) -> String {
        match self {
            Card::Partition => "partition".to_string(),
            Card::Context => "context".to_string(),
            Card::Front(g) => format!("group {} (front)", g.id),
            Card::Back(g) => format!("group {} (back)", g.id),
            Card::AllPois => "all POIs".to_string(),
            Card::PoiFront(p) => format!("POI {} (front)", p.id),
            Card::PoiHighlight(p) => format!("POI {} (highlight)", p.id),
            Card::PoiBack(p) => format!("POI {} (back)", p.id),
        }
    }
}

/// Groups and POIs a run renders cards for.
#[derive(Debug, Default)]
pub struct Selection<'d> {
    pub groups: Vec<&'d Group>,
    pub pois: Vec<&'d Poi>,
}

impl<'d> Selection<'d> {
    pub fn all(deck: &'d DeckConfig) -> Self {
        Self {
            groups: deck.groups.iter().collect(),
            pois: deck.pois.iter().collect(),
        }
    }

    /// Per-entity cards in deck order.
    fn cards(&self) -> Vec<Card<'d>> {
        let mut cards = Vec::new();
        for &group in &self.groups {
            cards.push(Card::Front(group));
            cards.push(Card::Back(group));
        }
        for &poi in &self.pois {
            cards.push(Card::PoiFront(poi));
            cards.push(Card::PoiHighlight(poi));
            cards.push(Card::PoiBack(poi));
        }
        cards
    }
}

/// Kind of id a deck accepts, for unknown-id warnings.
fn id_kind(deck: &DeckConfig) -> &'static str {
    match (deck.groups.is_empty(), deck.pois.is_empty()) {
        (false, false) => "group or POI",
        (true, false) => "POI",
        _ => "group",
    }
}

/// Resolves `--ids` against the deck's groups, then its POIs; unknown ids
/// are warned about and recorded as skipped.
fn select<'d>(deck: &'d DeckConfig, ids: Option<&[String]>, summary: &mut BatchSummary) -> Selection<'d> {
    let Some(ids) = ids else {
        return Selection::all(deck);
    };
    let mut selection = Selection::default();
    for id in ids {
        if let Some(group) = deck.group_by_id(id) {
            selection.groups.push(group);
        } else if let Some(poi) = deck.poi_by_id(id) {
            selection.pois.push(poi);
        } else {
            let kind = id_kind(deck);
            logger::warn(&format!("Unknown {} ID: {}", kind, id));
            summary
                .skipped
                .push((format!("{} {}", kind, id), format!("unknown {} id", kind)));
        }
    }
    selection
}

/// Deletes the overlays a forced run will rewrite.
///
/// Without a selection every `{prefix}_*` file of the output format goes,
/// except the basemap. With one, only the per-entity cards of the selected
/// groups and POIs. Returns the number of files removed.
pub fn clean_overlays(deck: &DeckConfig, selection: Option<&Selection<'_>>) -> Result<usize> {
    if !deck.output_dir.exists() {
        return Ok(0);
    }

    let targets: Vec<PathBuf> = match selection {
        Some(selection) => selection
            .cards()
            .iter()
            .map(|card| card.path(deck))
            .filter(|p| p.exists())
            .collect(),
        None => {
            let head = format!("{}_", deck.prefix());
            let tail = format!(".{}", deck.format.extension());
            let basemap = deck.basemap_path();
            let mut found = Vec::new();
            for entry in fs::read_dir(&deck.output_dir)? {
                let path = entry?.path();
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if name.starts_with(&head) && name.ends_with(&tail) && path != basemap && path.is_file() {
                    found.push(path);
                }
            }
            found
        }
    };

    for path in &targets {
        fs::remove_file(path)?;
        logger::debug(&format!("Removed {}", path.display()));
    }
    Ok(targets.len())
}

fn progress_bar(total: u64) -> ProgressBar {
    if logger::is_quiet() || logger::is_verbose() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
    pb.set_style(style);
    pb
}

fn load_polygons(deck: &DeckConfig, cache: &mut SessionCache) -> Result<Vec<GroupPolygon>> {
    let Some(doc) = cache.document(deck.polygons_path.as_deref())? else {
        return Ok(Vec::new());
    };
    let polygons = geojson::group_polygons(&doc, &deck.ref_tag, deck.parent_tag.as_deref());
    logger::info(&format!("Group polygons loaded: {}", polygons.len()));
    Ok(polygons)
}

/// Runs the whole deck.
///
/// Configuration and source-reading errors abort the run; errors of a
/// single artifact are recorded in the returned summary.
pub fn run(deck: &DeckConfig, cache: &mut SessionCache, options: &BatchOptions) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();
    let selection = select(deck, options.ids.as_deref(), &mut summary);

    if options.force.all {
        let scoped = options.ids.as_ref().map(|_| &selection);
        let removed = clean_overlays(deck, scoped)?;
        if removed > 0 {
            logger::info(&format!("Removed {} existing overlays", removed));
        }
    }

    match BasemapBuilder::new(deck, cache).and_then(|mut b| b.build(options.force)) {
        Ok(outcome) => summary.basemap = Some(outcome),
        Err(e) => summary.failed.push(("basemap".to_string(), e.to_string())),
    }
    if options.basemap_only {
        return Ok(summary);
    }

    let frame = deck.frame()?;
    let polygons = load_polygons(deck, cache)?;
    let borders = match cache.document(deck.borders_path.as_deref())? {
        Some(doc) => geojson::borders(&doc, &deck.render_bbox()),
        None => Vec::new(),
    };
    let fonts = Fonts::embedded()?;
    let renderer = CardRenderer::new(deck, frame, &polygons, &fonts);

    let mut cards = Vec::new();
    if !deck.groups.is_empty() {
        cards.push(Card::Partition);
    }
    cards.push(Card::Context);
    if !deck.pois.is_empty() {
        cards.push(Card::AllPois);
    }
    cards.extend(selection.cards());

    logger::info(&format!("Generating {} overlay images for {}", cards.len(), deck.title));
    let pb = progress_bar(cards.len() as u64);

    for card in &cards {
        let path = card.path(deck);
        pb.set_message(card.label());
        if !options.force.all && path.exists() {
            logger::debug(&format!("Skip (exists): {}", path.display()));
            summary.cached.push(path);
            pb.inc(1);
            continue;
        }

        let image = match card {
            Card::Partition => Some(renderer.partition()),
            Card::Context => Some(renderer.context(&borders)),
            Card::Front(g) => renderer.front(g),
            Card::Back(g) => renderer.back(g),
            Card::AllPois => Some(renderer.all_pois()),
            Card::PoiFront(p) => Some(renderer.poi_front(p)),
            Card::PoiHighlight(p) => Some(renderer.poi_highlight(p)),
            Card::PoiBack(p) => Some(renderer.poi_back(p)),
        };
        match image {
            None => summary
                .skipped
                .push((card.label(), "no polygon for its reference".to_string())),
            Some(image) => match save_overlay(image, &path, deck.format) {
                Ok(()) => {
                    pb.suspend(|| logger::output(&path.display().to_string()));
                    summary.written.push(path);
                }
                Err(e) => summary.failed.push((card.label(), e.to_string())),
            },
        }
        pb.inc(1);
    }

    pb.finish_with_message("done");
    Ok(summary)
}
