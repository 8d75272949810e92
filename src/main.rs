//! vidnorm
//!
//! Standardize a media library: probe every file, plan per-stream
//! conversions interactively and run them in the background with ffmpeg.
//!
//! # Usage
//!
//! ```bash
//! vidnorm display -d ~/Videos -r
//! vidnorm convert -f "movie.mkv"
//! vidnorm --log-level info convert -d ~/Videos --json-progress
//! ```

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use vidnorm::cli::{commands, Cli, Commands};
use vidnorm::config_initialization::initialize_settings;
use vidnorm::utils::logging::LoggingSystem;

/// Main entry point for the vidnorm CLI application
#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Resolve settings, then start logging with them
    let settings = initialize_settings(&cli)?;
    LoggingSystem::new(settings.logging.clone()).initialize()?;
    info!("Starting vidnorm {}", env!("CARGO_PKG_VERSION"));

    // Execute the requested command
    let all_ok = match cli.command {
        Commands::Display(args) => {
            info!("Executing display command");
            commands::display(args, &settings).await?
        }
        Commands::Convert(args) => {
            info!("Executing convert command");
            commands::convert(args, &settings).await?
        }
    };

    info!("vidnorm finished");
    Ok(if all_ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
