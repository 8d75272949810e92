//! FFprobe adapter for media file probing
//!
//! Runs `ffprobe` asynchronously and builds the container record from its
//! JSON output.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::domain::model::Container;
use crate::error::{VidnormError, VidnormResult};
use crate::ports::ProbePort;

/// FFprobe-based probe adapter
#[derive(Debug, Clone)]
pub struct FfprobeAdapter {
    binary: PathBuf,
}

impl FfprobeAdapter {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Arguments passed before the file name
    pub fn arguments() -> [&'static str; 6] {
        ["-v", "error", "-show_format", "-show_streams", "-of", "json"]
    }
}

impl Default for FfprobeAdapter {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

#[async_trait]
impl ProbePort for FfprobeAdapter {
    async fn probe(&self, path: &Path) -> VidnormResult<Container> {
        debug!("Probing {}", path.display());
        let probe_failed = |message: String| VidnormError::ProbeFailed {
            path: path.display().to_string(),
            message,
        };

        let output = Command::new(&self.binary)
            .args(Self::arguments())
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    probe_failed(format!("{} not found", self.binary.display()))
                } else {
                    probe_failed(e.to_string())
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(probe_failed(if stderr.is_empty() {
                format!("ffprobe exited with {}", output.status)
            } else {
                stderr
            }));
        }

        let raw: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| probe_failed(format!("unreadable probe output: {}", e)))?;
        Container::from_probe(&raw)
    }
}
