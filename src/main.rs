//! nba-timeouts - NBA timeout treatment/control dataset builder
//!
//! Joins a season of play-by-play events with schedule and team metadata and
//! emits an analysis-ready treatment/control table.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use nba_timeouts::config::PipelineConfig;
use nba_timeouts::stages;

const DEFAULT_CONFIG: &str = "pipeline.toml";

#[derive(Parser)]
#[command(name = "nba-timeouts")]
#[command(about = "Build the NBA timeout treatment/control dataset", long_about = None)]
struct Cli {
    /// Pipeline config file. Built-in defaults apply when the default path
    /// does not exist.
    #[arg(long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stage 1: extract timeout events with scoring context
    Timeouts,
    /// Stage 2: sample control events with the same context
    Nontimeouts,
    /// Stage 3: drop controls near a real timeout
    Prepare,
    /// Stage 4: merge, derive outcomes, and emit the analysis table
    Assemble,
    /// Run all four stages in order
    All,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Command::Timeouts => {
            stages::timeouts::run(&config)?;
        }
        Command::Nontimeouts => {
            stages::nontimeouts::run(&config)?;
        }
        Command::Prepare => {
            stages::prepare::run(&config)?;
        }
        Command::Assemble => {
            stages::assemble::run(&config)?;
        }
        Command::All => stages::run_all(&config)?,
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    if cli.config.exists() {
        Ok(PipelineConfig::load(&cli.config)?)
    } else if cli.config == Path::new(DEFAULT_CONFIG) {
        tracing::info!("no {DEFAULT_CONFIG} found, using built-in defaults");
        Ok(PipelineConfig::default())
    } else {
        anyhow::bail!("config file not found: {}", cli.config.display())
    }
}
