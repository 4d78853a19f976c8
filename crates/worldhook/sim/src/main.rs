//! Worldhook Sim - scenario replay for the capture mediator
//!
//! Replays a scripted JSON scenario through a [`WorldMediator`] backed by
//! the in-memory world and prints the dispatched event log, per-step
//! outcomes and the resulting world as JSON.
//!
//! [`WorldMediator`]: worldhook_capture::WorldMediator

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod replay;
mod scenario;

use config::SimConfig;
use replay::Replay;
use scenario::Scenario;

/// Worldhook Sim CLI
#[derive(Parser)]
#[command(name = "worldhook-sim")]
#[command(about = "Worldhook Sim - replay world scenarios through the capture mediator", long_about = None)]
#[command(version)]
struct Cli {
    /// Scenario file (JSON)
    scenario: String,

    /// Configuration file path
    #[arg(short, long, env = "WORLDHOOK_CONFIG")]
    config: Option<String>,

    /// Override the maximum capture depth
    #[arg(long)]
    max_depth: Option<u32>,

    /// Log level
    #[arg(long, env = "WORLDHOOK_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "WORLDHOOK_LOG_JSON")]
    json: bool,

    /// Omit the final block map from the report
    #[arg(long)]
    no_blocks: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = SimConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(depth) = cli.max_depth {
        config.capture.max_capture_depth = depth;
    }

    // Initialize tracing; logs go to stderr so the report stays clean
    let level = cli.log_level.clone().unwrap_or_else(|| config.logging.level.clone());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());

    if cli.json || config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let scenario = Scenario::load(&cli.scenario)?;
    let mut replay = Replay::new(config.capture.clone(), &scenario).context("failed to build the world")?;
    let steps = replay.run(&scenario);
    let report = replay.report(&scenario, steps, config.report.include_blocks && !cli.no_blocks);

    tracing::info!(
        events = report.events.len(),
        blocks = replay.world().storage().blocks().count(),
        "Replay finished"
    );

    let output = if config.report.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{output}");

    Ok(())
}
