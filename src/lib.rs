//! vidnorm media library standardizer
//!
//! Probes media files with `ffprobe`, derives a per-stream conversion plan
//! (copy, convert or drop) that the operator can edit, and runs the resulting
//! `ffmpeg` commands as background processes with live progress.

pub mod adapters;
pub mod cli;
pub mod config_initialization;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ports;
pub mod utils;

// Re-export commonly used types
pub use domain::editor::{ActionEditor, CommittedPlan, SubtitleFile};
pub use domain::model::{CodecType, Container, Stream};
pub use domain::rules::{
    derive_all, derive_default, Action, Disposition, OutputFormat, TargetFormatPolicy,
};
pub use engine::command::build_command;
pub use error::{VidnormError, VidnormResult};
