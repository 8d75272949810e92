//! Conversion orchestration
//!
//! Launches committed plans as background processes and keeps the run-scoped
//! registry of jobs. The progress monitor drives the registry afterwards.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{error, info};

use crate::domain::editor::CommittedPlan;
use crate::error::{VidnormError, VidnormResult};
use crate::ports::{JobProcess, LaunchPort};

/// Monotonic job identifier, assigned at launch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a conversion job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Canceled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
        };
        f.write_str(name)
    }
}

/// A launched, tracked conversion
pub struct ConversionJob {
    pub(crate) id: JobId,
    pub(crate) plan: CommittedPlan,
    pub(crate) process: Box<dyn JobProcess>,
    pub(crate) status: JobStatus,
    pub(crate) started_at: Instant,
    /// Seconds of media written so far
    pub(crate) processed: Option<f64>,
    pub(crate) percent: Option<f64>,
    pub(crate) eta: Option<Duration>,
    pub(crate) failure: Option<String>,
    pub(crate) finished_at: Option<Instant>,
}

impl ConversionJob {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn source(&self) -> &Path {
        &self.plan.container().path
    }

    pub fn destination(&self) -> &Path {
        self.plan.destination()
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Total media duration in seconds, if known
    pub fn duration(&self) -> Option<f64> {
        self.plan.container().duration
    }

    pub fn percent(&self) -> Option<f64> {
        self.percent
    }

    pub fn eta(&self) -> Option<Duration> {
        self.eta
    }

    fn outcome(&self, now: Instant) -> JobOutcome {
        let end = self.finished_at.unwrap_or(now);
        JobOutcome {
            job_id: self.id,
            source: self.source().to_path_buf(),
            destination: self.destination().to_path_buf(),
            status: self.status,
            error: self.failure.clone(),
            elapsed_seconds: end.saturating_duration_since(self.started_at).as_secs_f64(),
        }
    }
}

impl fmt::Debug for ConversionJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionJob")
            .field("id", &self.id)
            .field("source", &self.source())
            .field("status", &self.status)
            .field("percent", &self.percent)
            .finish()
    }
}

/// Final record of one job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub status: JobStatus,
    pub error: Option<String>,
    pub elapsed_seconds: f64,
}

/// A file that never became a job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub kind: String,
    pub error: String,
}

/// Outcomes of every job and file in a run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub jobs: Vec<JobOutcome>,
    pub files: Vec<FileFailure>,
}

impl RunReport {
    /// Record a file that could not be probed or planned
    pub fn record_file_failure(&mut self, path: impl Into<PathBuf>, err: &VidnormError) {
        self.files.push(FileFailure {
            path: path.into(),
            kind: err.kind().to_string(),
            error: err.to_string(),
        });
    }

    pub fn succeeded(&self) -> usize {
        self.count(JobStatus::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(JobStatus::Failed)
    }

    fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|job| job.status == status).count()
    }

    /// Whether anything in the run went wrong
    pub fn has_failures(&self) -> bool {
        !self.files.is_empty() || self.jobs.iter().any(|job| job.status != JobStatus::Succeeded)
    }

    /// Merge another report into this one
    pub fn merge(&mut self, other: RunReport) {
        self.jobs.extend(other.jobs);
        self.files.extend(other.files);
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} succeeded, {} failed, {} skipped",
            self.succeeded(),
            self.jobs.len() - self.succeeded(),
            self.files.len()
        )?;
        for job in &self.jobs {
            match &job.error {
                Some(err) => writeln!(f, "  {} {} {}: {}", job.job_id, job.status, job.source.display(), err)?,
                None => writeln!(
                    f,
                    "  {} {} {} -> {}",
                    job.job_id,
                    job.status,
                    job.source.display(),
                    job.destination.display()
                )?,
            }
        }
        for file in &self.files {
            writeln!(f, "  skipped {} ({}): {}", file.path.display(), file.kind, file.error)?;
        }
        Ok(())
    }
}

/// Run-scoped collection of active jobs, in launch order
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Vec<ConversionJob>,
    next_id: u64,
    report: RunReport,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn jobs(&self) -> &[ConversionJob] {
        &self.jobs
    }

    pub(crate) fn jobs_mut(&mut self) -> &mut [ConversionJob] {
        &mut self.jobs
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    pub fn report_mut(&mut self) -> &mut RunReport {
        &mut self.report
    }

    /// Hand over the report collected so far
    pub fn take_report(&mut self) -> RunReport {
        std::mem::take(&mut self.report)
    }

    fn allocate_id(&mut self) -> JobId {
        self.next_id += 1;
        JobId(self.next_id)
    }

    fn insert(&mut self, job: ConversionJob) {
        self.jobs.push(job);
    }

    /// Move terminal jobs out of the active set and into the report
    pub(crate) fn retire_terminal(&mut self, now: Instant) {
        let (finished, active): (Vec<_>, Vec<_>) = std::mem::take(&mut self.jobs)
            .into_iter()
            .partition(|job| job.status.is_terminal());
        self.jobs = active;
        self.report
            .jobs
            .extend(finished.iter().map(|job| job.outcome(now)));
    }
}

/// Reference to a launched job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub id: JobId,
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Starts conversions and owns the job registry for a run
pub struct Orchestrator<L: LaunchPort> {
    launcher: L,
    registry: JobRegistry,
}

impl<L: LaunchPort> Orchestrator<L> {
    pub fn new(launcher: L) -> Self {
        Self {
            launcher,
            registry: JobRegistry::new(),
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut JobRegistry {
        &mut self.registry
    }

    /// Start a plan in the background and register it.
    ///
    /// Returns as soon as the process is spawned. A spawn failure is recorded
    /// in the run report as a failed job and returned.
    pub fn launch(&mut self, plan: CommittedPlan) -> VidnormResult<JobHandle> {
        let args = plan.command()?;
        let id = self.registry.allocate_id();
        let source = plan.container().path.clone();
        let destination = plan.destination().to_path_buf();

        match self.launcher.launch(&source, &args) {
            Ok(process) => {
                info!("Launched job {} for {}", id, source.display());
                self.registry.insert(ConversionJob {
                    id,
                    plan,
                    process,
                    status: JobStatus::Running,
                    started_at: Instant::now(),
                    processed: None,
                    percent: None,
                    eta: None,
                    failure: None,
                    finished_at: None,
                });
                Ok(JobHandle {
                    id,
                    source,
                    destination,
                })
            }
            Err(err) => {
                error!("Job {} could not start: {}", id, err);
                self.registry.report.jobs.push(JobOutcome {
                    job_id: id,
                    source,
                    destination,
                    status: JobStatus::Failed,
                    error: Some(err.to_string()),
                    elapsed_seconds: 0.0,
                });
                Err(err)
            }
        }
    }
}
