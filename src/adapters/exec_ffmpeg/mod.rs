//! FFmpeg execution adapter
//!
//! Spawns `ffmpeg` as a detached background process. Progress goes to a
//! temporary file through `-progress`; stderr goes to a second temporary file
//! that serves as the job's diagnostics.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tempfile::NamedTempFile;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::error::{VidnormError, VidnormResult};
use crate::ports::{JobProcess, LaunchPort, ProcessExit};

/// Number of trailing stderr lines kept as diagnostics
const DIAGNOSTIC_LINES: usize = 20;

/// Launches conversions with the `ffmpeg` binary
#[derive(Debug, Clone)]
pub struct FfmpegLauncher {
    binary: PathBuf,
}

impl FfmpegLauncher {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfmpegLauncher {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl LaunchPort for FfmpegLauncher {
    fn launch(&self, source: &Path, args: &[String]) -> VidnormResult<Box<dyn JobProcess>> {
        let launch_failed = |source_err: std::io::Error| VidnormError::ProcessLaunchFailure {
            path: source.to_path_buf(),
            source: source_err,
        };

        let progress = NamedTempFile::new().map_err(launch_failed)?;
        let stderr = NamedTempFile::new().map_err(launch_failed)?;
        let progress_reader = progress.reopen().map_err(launch_failed)?;
        let stderr_writer = stderr.reopen().map_err(launch_failed)?;

        debug!(
            "Spawning {} -progress {} {}",
            self.binary.display(),
            progress.path().display(),
            args.join(" ")
        );
        let child = Command::new(&self.binary)
            .arg("-progress")
            .arg(progress.path())
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr_writer))
            .spawn()
            .map_err(launch_failed)?;

        Ok(Box::new(FfmpegProcess {
            child,
            _progress: progress,
            progress_reader,
            partial: Vec::new(),
            stderr,
        }))
    }
}

/// A running `ffmpeg` process and its temporary files
pub struct FfmpegProcess {
    child: Child,
    _progress: NamedTempFile,
    progress_reader: File,
    /// Bytes after the last newline seen so far
    partial: Vec<u8>,
    stderr: NamedTempFile,
}

impl JobProcess for FfmpegProcess {
    fn try_exit(&mut self) -> VidnormResult<Option<ProcessExit>> {
        let status = self.child.try_wait()?;
        Ok(status.map(|status| {
            if status.success() {
                ProcessExit::Success
            } else {
                ProcessExit::Failure(status.code())
            }
        }))
    }

    fn read_progress(&mut self) -> VidnormResult<String> {
        let mut fresh = Vec::new();
        self.progress_reader.read_to_end(&mut fresh)?;
        self.partial.extend_from_slice(&fresh);

        match self.partial.iter().rposition(|byte| *byte == b'\n') {
            Some(end) => {
                let rest = self.partial.split_off(end + 1);
                let complete = std::mem::replace(&mut self.partial, rest);
                Ok(String::from_utf8_lossy(&complete).into_owned())
            }
            None => Ok(String::new()),
        }
    }

    fn diagnostics(&mut self) -> String {
        match std::fs::read(self.stderr.path()) {
            Ok(bytes) => tail_lines(&String::from_utf8_lossy(&bytes), DIAGNOSTIC_LINES),
            Err(err) => format!("diagnostics unavailable: {}", err),
        }
    }
}

fn tail_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|line| !line.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_lines() {
        assert_eq!(tail_lines("a\n\nb\nc\n", 2), "b\nc");
        assert_eq!(tail_lines("", 5), "");
    }

    #[cfg(unix)]
    mod unix {
        use super::super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;
        use tempfile::TempDir;

        fn fake_encoder(dir: &TempDir, body: &str) -> PathBuf {
            let path = dir.path().join("ffmpeg");
            // $2 is the progress file
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        async fn wait_for_exit(process: &mut Box<dyn JobProcess>) -> ProcessExit {
            for _ in 0..200 {
                if let Some(exit) = process.try_exit().unwrap() {
                    return exit;
                }
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
            panic!("process did not exit");
        }

        #[tokio::test]
        async fn test_successful_process_reports_progress() {
            let dir = TempDir::new().unwrap();
            let binary = fake_encoder(
                &dir,
                "printf 'out_time_ms=1500000\\nprogress=continue\\nout_time_ms=30' >> \"$2\"",
            );

            let launcher = FfmpegLauncher::new(binary);
            let mut process = launcher.launch(Path::new("movie.mkv"), &[]).unwrap();
            assert_eq!(wait_for_exit(&mut process).await, ProcessExit::Success);

            let chunk = process.read_progress().unwrap();
            assert_eq!(chunk, "out_time_ms=1500000\nprogress=continue\n");
            assert_eq!(process.read_progress().unwrap(), "");
        }

        #[tokio::test]
        async fn test_failed_process_keeps_stderr() {
            let dir = TempDir::new().unwrap();
            let binary = fake_encoder(&dir, "echo 'Unknown encoder' >&2\nexit 3");

            let launcher = FfmpegLauncher::new(binary);
            let mut process = launcher.launch(Path::new("movie.mkv"), &[]).unwrap();
            assert_eq!(wait_for_exit(&mut process).await, ProcessExit::Failure(Some(3)));
            assert_eq!(process.diagnostics(), "Unknown encoder");
        }

        #[tokio::test]
        async fn test_missing_binary_is_launch_failure() {
            let launcher = FfmpegLauncher::new("/nonexistent/ffmpeg");
            let err = launcher.launch(Path::new("movie.mkv"), &[]).err().unwrap();
            assert_eq!(err.kind(), "launch failure");
            assert!(err.to_string().contains("movie.mkv"));
        }
    }
}
