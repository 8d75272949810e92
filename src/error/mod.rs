//! Error handling module for vidnorm

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for vidnorm operations
#[derive(Error, Debug)]
pub enum VidnormError {
    /// Probe data is missing a required entry
    #[error("Insufficient metadata for {path}: missing {field}")]
    InsufficientMetadata { path: String, field: String },

    /// The prober could not read the file
    #[error("Failed to probe {path}: {message}")]
    ProbeFailed { path: String, message: String },

    /// An action set does not fit its container
    #[error("Invalid action set: {message}")]
    InvalidActionSet { message: String },

    /// An editor transition was not legal in the current state
    #[error("Invalid transition: {message}")]
    InvalidTransition { message: String },

    /// The background process could not be started
    #[error("Failed to launch conversion of {}: {source}", .path.display())]
    ProcessLaunchFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The background process exited unsuccessfully
    #[error("Conversion of {} failed ({}): {diagnostics}", .path.display(), describe_exit(.code))]
    ProcessExecutionFailure {
        path: PathBuf,
        code: Option<i32>,
        diagnostics: String,
    },

    /// Configuration could not be loaded
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

impl VidnormError {
    pub(crate) fn insufficient(path: impl Into<String>, field: impl Into<String>) -> Self {
        VidnormError::InsufficientMetadata {
            path: path.into(),
            field: field.into(),
        }
    }

    pub(crate) fn invalid_actions(message: impl Into<String>) -> Self {
        VidnormError::InvalidActionSet {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_transition(message: impl Into<String>) -> Self {
        VidnormError::InvalidTransition {
            message: message.into(),
        }
    }

    /// Short name of the failure kind, used in run reports
    pub fn kind(&self) -> &'static str {
        match self {
            VidnormError::InsufficientMetadata { .. } => "insufficient metadata",
            VidnormError::ProbeFailed { .. } => "probe failure",
            VidnormError::InvalidActionSet { .. } => "invalid action set",
            VidnormError::InvalidTransition { .. } => "invalid transition",
            VidnormError::ProcessLaunchFailure { .. } => "launch failure",
            VidnormError::ProcessExecutionFailure { .. } => "execution failure",
            VidnormError::Config { .. } => "configuration error",
            VidnormError::Io(_) => "i/o error",
        }
    }
}

/// Result type alias for vidnorm operations
pub type VidnormResult<T> = std::result::Result<T, VidnormError>;
