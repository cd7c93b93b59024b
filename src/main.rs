//! # Blog Harvest
//!
//! Scrapes engineering and research blogs (HTML index pages, RSS feeds and a
//! WordPress JSON API) into normalized entries for downstream search.
//!
//! ## Usage
//!
//! ```sh
//! blog_harvest -o ./out
//! blog_harvest -s "Meta Engineering" -l 20
//! ```
//!
//! ## Flow
//!
//! 1. **Config**: load YAML (optional) and apply CLI overrides
//! 2. **Scrape**: run each requested source's pipeline in turn
//! 3. **Output**: write per-source JSON files, or JSON lines to stdout
//! 4. **Report**: log attempted vs. successful counts per source

use blog_harvest::utils::ensure_writable_dir;
use blog_harvest::{HarvestConfig, ScrapeOrchestrator, load_config, outputs::json};
use chrono::Utc;
use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;

use cli::Cli;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let start_time = std::time::Instant::now();
    info!("blog_harvest starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    // ---- Config ----
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => HarvestConfig::default(),
    };
    if let Some(workers) = args.workers {
        config.workers = workers;
    }

    let orchestrator = ScrapeOrchestrator::from_config(&config)?;

    if args.list_sources {
        for source in orchestrator.registry().iter() {
            println!("{}\t{:?}\t{}", source.name, source.mode(), source.url());
        }
        return Ok(());
    }

    // Early check: ensure the output dir is writable before spending time scraping
    if let Some(dir) = &args.output_dir {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(path = %dir, error = %e, "Output directory is not writable");
            return Err(e);
        }
    }

    let names: Vec<String> = if args.sources.is_empty() {
        orchestrator
            .registry()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect()
    } else {
        args.sources.clone()
    };
    info!(sources = ?names, limit = ?args.limit, workers = config.workers, "Starting harvest");

    // ---- Scrape ----
    let report = orchestrator.run(&names, args.limit).await;

    // ---- Output ----
    match &args.output_dir {
        Some(dir) => {
            let written = json::write_entries(&report.entries, dir, Utc::now().date_naive()).await?;
            info!(files = written.len(), "JSON output written");
        }
        None => json::write_json_lines(&report.entries, std::io::stdout().lock())?,
    }

    for summary in &report.sources {
        for failure in &summary.failures {
            warn!(source = %summary.source, failure = %failure, "Source reported a failure");
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        attempted = report.attempted(),
        successful = report.successful(),
        skipped = report.skipped.len(),
        "Execution complete"
    );

    Ok(())
}
