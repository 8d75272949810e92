//! CLI module for vidnorm
//!
//! This module handles command-line argument parsing, the interactive menus
//! and command execution.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod args;
pub mod commands;
pub mod menu;

pub use args::{ConvertArgs, DisplayArgs, InputArgs};

/// vidnorm media library standardizer
///
/// Probes media files, plans per-stream conversions that can be adjusted
/// interactively, and runs them as background ffmpeg processes.
#[derive(Parser, Debug)]
#[command(name = "vidnorm")]
#[command(about = "Standardize a media library with ffmpeg")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Logging level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Logging format (pretty, compact, json)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Probe media files and print their streams
    Display(DisplayArgs),
    /// Plan and run conversions interactively
    Convert(ConvertArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_convert() {
        let cli = Cli::parse_from([
            "vidnorm",
            "--log-level",
            "debug",
            "convert",
            "-d",
            "/media",
            "-r",
            "--tick-ms",
            "500",
            "--json-progress",
        ]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Commands::Convert(args) => {
                assert_eq!(args.input.directory, Some(PathBuf::from("/media")));
                assert!(args.input.recursive);
                assert_eq!(args.tick_ms, Some(500));
                assert!(args.json_progress);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_file_conflicts_with_directory_and_recursive() {
        assert!(Cli::try_parse_from(["vidnorm", "display", "-f", "a.mkv", "-d", "/media"]).is_err());
        assert!(Cli::try_parse_from(["vidnorm", "display", "-f", "a.mkv", "-r"]).is_err());
        assert!(Cli::try_parse_from(["vidnorm", "convert", "--tick-ms", "1"]).is_err());
    }
}
