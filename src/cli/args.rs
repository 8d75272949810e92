//! Command-line argument definitions

use std::path::PathBuf;

use clap::Args;

use crate::adapters::toml_config::{MAX_TICK_MS, MIN_TICK_MS};

/// Parse a tick interval within the accepted range
pub fn tick_in_range(value: &str) -> Result<u64, String> {
    clap_num::number_range(value, MIN_TICK_MS, MAX_TICK_MS)
}

/// Which files to process
#[derive(Args, Debug, Clone, Default)]
pub struct InputArgs {
    /// Single media file to process
    #[arg(short, long, conflicts_with_all = ["directory", "recursive"])]
    pub file: Option<PathBuf>,

    /// Directory of media files (default: current directory)
    #[arg(short, long)]
    pub directory: Option<PathBuf>,

    /// Descend into subdirectories
    #[arg(short, long)]
    pub recursive: bool,
}

impl InputArgs {
    /// File or directory to start discovery from
    pub fn root(&self) -> PathBuf {
        self.file
            .clone()
            .or_else(|| self.directory.clone())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Arguments for the display command
#[derive(Args, Debug, Clone)]
pub struct DisplayArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the convert command
#[derive(Args, Debug, Clone)]
pub struct ConvertArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Emit progress as JSON lines
    #[arg(long)]
    pub json_progress: bool,

    /// Milliseconds between progress updates (50-10000)
    #[arg(long, value_parser = tick_in_range)]
    pub tick_ms: Option<u64>,

    /// Output container format (mp4, matroska)
    #[arg(long)]
    pub format: Option<String>,
}
