//! Progress monitoring and reporting sinks
//!
//! Each tick polls every active job once, reads its latest processed-time
//! marker and produces one aggregated snapshot.

use std::io::{IsTerminal, Stdout, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::engine::orchestrator::{JobId, JobRegistry, JobStatus, RunReport};
use crate::error::VidnormError;
use crate::ports::ProcessExit;
use crate::utils::time::{format_eta, format_seconds, parse_clock};

/// Default interval between ticks
pub const DEFAULT_TICK: Duration = Duration::from_millis(200);

/// Seconds of media processed, from the last marker in a progress chunk.
///
/// Understands `out_time_us=` and `out_time_ms=` (both microseconds) and
/// `out_time=HH:MM:SS.micro`. Other lines and unparsable values are skipped.
pub fn parse_processed_time(text: &str) -> Option<f64> {
    text.lines().rev().find_map(|line| {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();
        match key.trim() {
            "out_time_us" | "out_time_ms" => value
                .parse::<i64>()
                .ok()
                .filter(|micros| *micros >= 0)
                .map(|micros| micros as f64 / 1_000_000.0),
            "out_time" => parse_clock(value),
            _ => None,
        }
    })
}

/// Percent complete, capped at 100; `None` when the duration is unknown
pub fn percent_complete(processed: f64, duration: Option<f64>) -> Option<f64> {
    let duration = duration.filter(|d| d.is_finite() && *d > 0.0)?;
    if !processed.is_finite() {
        return None;
    }
    Some((processed / duration * 100.0).clamp(0.0, 100.0))
}

/// Remaining wall time, extrapolated from the time spent so far.
///
/// `None` until some progress is made, and when the estimate does not fit
/// in a `Duration`.
pub fn estimate_eta(percent: Option<f64>, elapsed: Duration) -> Option<Duration> {
    let percent = percent.filter(|p| *p > 0.0)?;
    let remaining = (100.0 - percent) / percent * elapsed.as_secs_f64();
    Duration::try_from_secs_f64(remaining.max(0.0)).ok()
}

/// One row of a snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct JobProgress {
    pub job_id: JobId,
    pub source: PathBuf,
    pub percent: Option<f64>,
    pub eta: Option<Duration>,
    pub status: JobStatus,
    /// Failure description for failed jobs
    pub error: Option<String>,
}

impl JobProgress {
    pub fn file_name(&self) -> String {
        self.source
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.source.display().to_string())
    }
}

/// Progress of the whole run, over every job with a known duration
#[derive(Debug, Clone, PartialEq)]
pub struct OverallProgress {
    /// Seconds of media processed, finished jobs counted in full
    pub processed: f64,
    /// Seconds of media across all jobs with a known duration
    pub duration: f64,
    pub percent: Option<f64>,
    pub eta: Option<Duration>,
}

/// All job rows of one tick, in launch order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSnapshot {
    pub jobs: Vec<JobProgress>,
    /// `None` while no job has a known duration
    pub overall: Option<OverallProgress>,
}

impl ProgressSnapshot {
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Polls active jobs and folds finished ones into the run report
#[derive(Debug, Default)]
pub struct ProgressMonitor {
    ticks: u64,
    /// Media seconds of jobs already retired from the registry
    retired_duration: f64,
    /// Start of the earliest job seen
    run_started: Option<Instant>,
}

impl ProgressMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Poll every job once.
    ///
    /// A job that reaches a terminal status appears in this snapshot with its
    /// final row and is then removed from the registry.
    pub fn tick(&mut self, registry: &mut JobRegistry, now: Instant) -> ProgressSnapshot {
        self.ticks += 1;
        let mut snapshot = ProgressSnapshot::default();
        let mut processed_total = self.retired_duration;
        let mut duration_total = self.retired_duration;

        for job in registry.jobs_mut() {
            self.run_started = Some(match self.run_started {
                Some(started) => started.min(job.started_at),
                None => job.started_at,
            });

            match job.process.read_progress() {
                Ok(chunk) => {
                    if let Some(processed) = parse_processed_time(&chunk) {
                        job.processed = Some(processed);
                    }
                }
                Err(err) => warn!("Could not read progress of job {}: {}", job.id, err),
            }

            match job.process.try_exit() {
                Ok(None) => {}
                Ok(Some(ProcessExit::Success)) => {
                    job.status = JobStatus::Succeeded;
                    job.finished_at = Some(now);
                    info!("Job {} finished: {}", job.id, job.destination().display());
                }
                Ok(Some(ProcessExit::Failure(code))) => {
                    let err = VidnormError::ProcessExecutionFailure {
                        path: job.source().to_path_buf(),
                        code,
                        diagnostics: job.process.diagnostics().trim().to_string(),
                    };
                    error!("Job {} failed: {}", job.id, err);
                    job.status = JobStatus::Failed;
                    job.failure = Some(err.to_string());
                    job.finished_at = Some(now);
                }
                Err(err) => {
                    error!("Lost track of job {}: {}", job.id, err);
                    job.status = JobStatus::Failed;
                    job.failure = Some(err.to_string());
                    job.finished_at = Some(now);
                }
            }

            if job.status == JobStatus::Succeeded {
                job.percent = Some(100.0);
                job.eta = Some(Duration::ZERO);
            } else {
                let duration = job.duration();
                job.percent = job
                    .processed
                    .and_then(|processed| percent_complete(processed, duration));
                job.eta = if job.status.is_terminal() {
                    None
                } else {
                    estimate_eta(job.percent, now.saturating_duration_since(job.started_at))
                };
            }

            if let Some(duration) = job.duration() {
                duration_total += duration;
                if job.status.is_terminal() {
                    processed_total += duration;
                    self.retired_duration += duration;
                } else {
                    processed_total += job.processed.unwrap_or(0.0).clamp(0.0, duration);
                }
            }

            snapshot.jobs.push(JobProgress {
                job_id: job.id,
                source: job.source().to_path_buf(),
                percent: job.percent,
                eta: job.eta,
                status: job.status,
                error: job.failure.clone(),
            });
        }

        if duration_total > 0.0 {
            let percent = percent_complete(processed_total, Some(duration_total));
            let elapsed = self
                .run_started
                .map(|started| now.saturating_duration_since(started))
                .unwrap_or_default();
            snapshot.overall = Some(OverallProgress {
                processed: processed_total,
                duration: duration_total,
                percent,
                eta: if processed_total >= duration_total {
                    Some(Duration::ZERO)
                } else {
                    estimate_eta(percent, elapsed)
                },
            });
        }

        registry.retire_terminal(now);
        debug!(
            "Tick {}: {} rows, {} active",
            self.ticks,
            snapshot.jobs.len(),
            registry.len()
        );
        snapshot
    }
}

/// Receiver of progress snapshots
pub trait ProgressSink {
    /// Called once per tick
    fn on_snapshot(&mut self, snapshot: &ProgressSnapshot);

    /// Called once all jobs are terminal
    fn on_finish(&mut self, report: &RunReport);
}

/// Drive the monitor on a fixed interval until no job is active.
///
/// Returns the run report collected by the registry.
pub async fn watch(
    registry: &mut JobRegistry,
    monitor: &mut ProgressMonitor,
    sink: &mut dyn ProgressSink,
    period: Duration,
) -> RunReport {
    let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while !registry.is_empty() {
        interval.tick().await;
        let snapshot = monitor.tick(registry, Instant::now());
        sink.on_snapshot(&snapshot);
    }

    let report = registry.take_report();
    sink.on_finish(&report);
    report
}

fn render_row(row: &JobProgress) -> String {
    let percent = row
        .percent
        .map(|p| format!("{:5.1}%", p))
        .unwrap_or_else(|| "  ?.?%".to_string());
    let mut line = format!(
        "{} {:<40} {} ETA {} {}",
        row.job_id,
        row.file_name(),
        percent,
        format_eta(row.eta),
        row.status
    );
    if let Some(err) = &row.error {
        line.push_str(": ");
        line.push_str(err);
    }
    line
}

fn render_overall(overall: &OverallProgress) -> String {
    let percent = overall
        .percent
        .map(|p| format!("{:5.1}%", p))
        .unwrap_or_else(|| "  ?.?%".to_string());
    format!(
        "Overall {} of {} ETA {}",
        percent,
        format_seconds(overall.duration),
        format_eta(overall.eta)
    )
}

/// Console sink for CLI usage.
///
/// On a terminal the rows of running jobs are redrawn in place; finished rows
/// are printed once and scroll away. Elsewhere only finished rows are printed.
pub struct ConsoleProgressSink<W: Write = Stdout> {
    out: W,
    interactive: bool,
    drawn: usize,
}

impl ConsoleProgressSink<Stdout> {
    pub fn stdout() -> Self {
        let out = std::io::stdout();
        let interactive = out.is_terminal();
        Self::new(out, interactive)
    }
}

impl<W: Write> ConsoleProgressSink<W> {
    pub fn new(out: W, interactive: bool) -> Self {
        Self {
            out,
            interactive,
            drawn: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn draw(&mut self, snapshot: &ProgressSnapshot) -> std::io::Result<()> {
        if self.interactive && self.drawn > 0 {
            write!(self.out, "\x1b[{}A\x1b[J", self.drawn)?;
        }

        let (finished, active): (Vec<_>, Vec<_>) =
            snapshot.jobs.iter().partition(|row| row.status.is_terminal());
        for row in &finished {
            writeln!(self.out, "{}", render_row(row))?;
        }

        self.drawn = 0;
        if self.interactive {
            for row in &active {
                writeln!(self.out, "{}", render_row(row))?;
            }
            self.drawn = active.len();
            if let Some(overall) = &snapshot.overall {
                writeln!(self.out, "{}", render_overall(overall))?;
                self.drawn += 1;
            }
        }
        self.out.flush()
    }
}

impl<W: Write> ProgressSink for ConsoleProgressSink<W> {
    fn on_snapshot(&mut self, snapshot: &ProgressSnapshot) {
        if let Err(err) = self.draw(snapshot) {
            warn!("Could not draw progress: {}", err);
        }
    }

    fn on_finish(&mut self, report: &RunReport) {
        if let Err(err) = write!(self.out, "{}", report).and_then(|_| self.out.flush()) {
            warn!("Could not print report: {}", err);
        }
    }
}

/// JSON-lines sink for structured output
pub struct JsonProgressSink<W: Write = Stdout> {
    out: W,
}

impl JsonProgressSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> JsonProgressSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, event: serde_json::Value) {
        if let Err(err) = writeln!(self.out, "{}", event).and_then(|_| self.out.flush()) {
            warn!("Could not write progress event: {}", err);
        }
    }
}

impl<W: Write> ProgressSink for JsonProgressSink<W> {
    fn on_snapshot(&mut self, snapshot: &ProgressSnapshot) {
        for row in &snapshot.jobs {
            let event = serde_json::json!({
                "event": if row.status.is_terminal() { "finished" } else { "progress" },
                "job_id": row.job_id,
                "source": row.source,
                "percent": row.percent,
                "eta_seconds": row.eta.map(|eta| eta.as_secs_f64()),
                "status": row.status,
                "error": row.error,
                "timestamp": chrono::Utc::now().to_rfc3339()
            });
            self.emit(event);
        }
        if let Some(overall) = &snapshot.overall {
            let event = serde_json::json!({
                "event": "overall",
                "processed_seconds": overall.processed,
                "duration_seconds": overall.duration,
                "percent": overall.percent,
                "eta_seconds": overall.eta.map(|eta| eta.as_secs_f64()),
                "timestamp": chrono::Utc::now().to_rfc3339()
            });
            self.emit(event);
        }
    }

    fn on_finish(&mut self, report: &RunReport) {
        let event = serde_json::json!({
            "event": "report",
            "succeeded": report.succeeded(),
            "failed": report.failed(),
            "jobs": report.jobs,
            "skipped": report.files,
            "timestamp": chrono::Utc::now().to_rfc3339()
        });
        self.emit(event);
    }
}
