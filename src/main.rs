//! HCAL hit matcher - offline calorimeter hit to particle association
//!
//! Reads simulated events, matches HCAL hits to the scoring-plane particles
//! that produced them and writes run statistics as JSON.
//!
//! Module structure:
//! - `domain/` - Geometry and event records
//! - `io/` - Event input and summary output
//! - `services/` - Matcher, Aggregator, Stage and Driver
//! - `infra/` - Config, Errors, Histograms, Particle data

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use hcal_matcher::infra::{Config, PdgTable};
use hcal_matcher::io::{write_summary, JsonlEventReader, RunSummary};
use hcal_matcher::services::{Driver, DriverOptions, HcalHitMatcher, Processor};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// HCAL hit matcher - associates calorimeter hits with simulated particles
#[derive(Parser, Debug)]
#[command(name = "hcal-matcher", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Input events (JSONL), overrides [run].input
    #[arg(short, long)]
    input: Option<String>,

    /// Summary output path, overrides [run].summary
    #[arg(short, long)]
    output: Option<String>,
}

fn main() -> anyhow::Result<()> {
    // Default: INFO, use RUST_LOG=debug to see skipped records
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();

    let config_path = Config::resolve_config_path(args.config.as_deref());
    let mut config = Config::load_from_path(&config_path);
    if args.input.is_some() || args.output.is_some() {
        let input = args.input.unwrap_or_else(|| config.input().to_string());
        let output = args.output.unwrap_or_else(|| config.summary().to_string());
        config = config.with_paths(&input, &output);
    }

    info!(
        config_file = %config.config_file(),
        input = %config.input(),
        summary = %config.summary(),
        progress_interval = %config.progress_interval(),
        abort_on_missing_collection = %config.abort_on_missing_collection(),
        mass_overrides = %config.particle_masses().len(),
        "config_loaded"
    );

    let particles = PdgTable::new().with_overrides(config.particle_masses().iter().copied());
    let mut stage = HcalHitMatcher::new("hcal_hit_matcher", particles);
    stage.configure(config.processor()).context("Processor configuration failed")?;

    let events = JsonlEventReader::open(config.input())?;
    let driver = Driver::new(DriverOptions {
        abort_on_missing_collection: config.abort_on_missing_collection(),
        progress_interval: config.progress_interval(),
    });

    let started_at = Utc::now();
    let report = driver.run(&mut stage, events).context("Run aborted")?;

    let stats = stage
        .statistics()
        .context("Run finished without final statistics")?;
    let summary = RunSummary::new(&config, started_at, report, stats);
    write_summary(config.summary(), &summary)?;

    info!("hcal-matcher finished");
    Ok(())
}
