use anyhow::{bail, Context};
use clap::Parser;

use alpine_deck_maps::batch;
use alpine_deck_maps::cache::SessionCache;
use alpine_deck_maps::cli::Args;
use alpine_deck_maps::config::DeckConfig;
use alpine_deck_maps::logger::{self, Logger};

fn main() {
    if let Err(e) = run() {
        logger::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let options = Args::parse().validate()?;
    Logger::init(options.verbosity, options.no_color);

    let deck = DeckConfig::load(&options.deck)
        .with_context(|| format!("loading deck {}", options.deck.display()))?;
    logger::debug(&format!(
        "Deck {}: {} groups, {} POIs, output {}",
        deck.prefix(),
        deck.groups.len(),
        deck.pois.len(),
        deck.output_dir.display()
    ));

    let mut cache = SessionCache::new();
    let summary = batch::run(&deck, &mut cache, &options.batch)
        .with_context(|| format!("generating {}", deck.title))?;
    summary.report();

    if summary.has_failures() {
        bail!("{} artifacts failed", summary.failed.len());
    }
    Ok(())
}
