//! Conversion engine: command construction, orchestration and progress

pub mod command;
pub mod orchestrator;
pub mod progress;

pub use command::{build_command, encoder_for, CommandOptions};
pub use orchestrator::{
    ConversionJob, JobHandle, JobId, JobOutcome, JobRegistry, JobStatus, Orchestrator, RunReport,
};
pub use progress::{
    watch, ConsoleProgressSink, JobProgress, JsonProgressSink, OverallProgress, ProgressMonitor,
    ProgressSink, ProgressSnapshot, DEFAULT_TICK,
};
