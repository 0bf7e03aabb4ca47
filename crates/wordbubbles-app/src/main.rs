use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;
use wordbubbles_core::{
    BubbleEngine, SimulationLoop, SimulationSettings, TARGET_TICK_HZ, TimeRange, Viewport,
};

mod sample;
mod terminal;

#[derive(Debug, Parser)]
#[command(
    name = "wordbubbles",
    about = "Animated bubble view over ranked word-frequency feeds"
)]
struct Cli {
    /// JSON feed file shaped as `{ "words": [...] }`. Without it the
    /// built-in sample feed is used.
    #[arg(long)]
    feed: Option<PathBuf>,

    /// Initial time range for the built-in sample feed: day, month, or year.
    #[arg(long, default_value = "day")]
    time_range: String,

    /// RNG seed for a reproducible layout.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let time_range = parse_time_range(&cli.time_range)?;

    let settings = SimulationSettings {
        rng_seed: cli.seed,
        ..SimulationSettings::default()
    };
    let mut engine = BubbleEngine::new(settings, Viewport::default());

    let payload = match &cli.feed {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read feed {}", path.display()))?,
        None => sample::payload(time_range).to_owned(),
    };
    engine.load_feed(&payload);
    info!(
        particles = engine.store().len(),
        range = time_range.label(),
        "Word-bubble engine primed"
    );

    let sim = SimulationLoop::new(engine, TARGET_TICK_HZ);
    terminal::run(sim, cli.feed, time_range)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn parse_time_range(raw: &str) -> Result<TimeRange> {
    match raw {
        "day" => Ok(TimeRange::Day),
        "month" => Ok(TimeRange::Month),
        "year" => Ok(TimeRange::Year),
        other => bail!("unknown time range `{other}` (expected day, month, or year)"),
    }
}
