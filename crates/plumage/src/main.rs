//! Plumage CLI - train text encoders against frozen image embeddings.
//!
//! Plumage samples one image per class from a CUB-200-2011-style dataset,
//! pairs it with human-written descriptions, and trains a character-level
//! CNN + LSTM so its embeddings rank the right class first.
//!
//! # Usage
//!
//! ```bash
//! # Check that every image has its ten descriptions
//! plumage check --root ~/data/CUB_200_2011
//!
//! # Look at one batch
//! plumage sample --descriptions 2
//!
//! # Train and save the text encoder
//! plumage train --iterations 5000 --output checkpoints/text_encoder.json
//!
//! # View configuration
//! plumage config show
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// Plumage - train text encoders aligned with image embeddings.
#[derive(Parser, Debug)]
#[command(name = "plumage")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true, env = "PLUMAGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Train the text encoder
    Train(cli::train::TrainArgs),

    /// Verify that every image of every class has its descriptions
    Check(cli::check::CheckArgs),

    /// Draw batches and print what they contain
    Sample(cli::sample::SampleArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so use eprintln for config warnings.
    // Commands reload the config and fail on errors.
    let config = match cli::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default logging settings. Check your config file with `plumage config path`."
            );
            plumage_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Plumage v{}", plumage_core::VERSION);

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Train(args) => cli::train::execute(args, config_path),
        Commands::Check(args) => cli::check::execute(args, config_path),
        Commands::Sample(args) => cli::sample::execute(args, config_path),
        Commands::Config(args) => cli::config::execute(args, config_path),
    }
}
