//! Command implementations

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::adapters::toml_config::{ProgressStyle, Settings};
use crate::adapters::{FfmpegLauncher, FfprobeAdapter};
use crate::cli::args::{ConvertArgs, DisplayArgs, InputArgs};
use crate::cli::menu::{Menu, SessionOutcome};
use crate::domain::editor::ActionEditor;
use crate::domain::model::Container;
use crate::domain::rules::TargetFormatPolicy;
use crate::engine::orchestrator::{Orchestrator, RunReport};
use crate::engine::progress::{
    watch, ConsoleProgressSink, JsonProgressSink, ProgressMonitor, ProgressSink,
};
use crate::error::VidnormError;
use crate::ports::{LaunchPort, ProbePort};
use crate::utils::path::discover_files;

/// Execute the display command; returns `false` when any file failed
pub async fn display(args: DisplayArgs, settings: &Settings) -> Result<bool> {
    let files = discover(&args.input)?;
    let prober = FfprobeAdapter::new(&settings.tools.ffprobe);

    let mut report = RunReport::default();
    let containers = probe_all(&prober, &files, &mut report).await;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if args.json {
        let document = serde_json::json!({
            "containers": containers,
            "skipped": report.files,
        });
        writeln!(out, "{}", serde_json::to_string_pretty(&document)?)?;
    } else {
        for container in &containers {
            writeln!(out, "{}", container)?;
        }
        for failure in &report.files {
            writeln!(out, "Skipped {}: {}", failure.path.display(), failure.error)?;
        }
    }

    Ok(!report.has_failures())
}

/// Execute the convert command; returns `false` when any file or job failed
pub async fn convert(args: ConvertArgs, settings: &Settings) -> Result<bool> {
    let files = discover(&args.input)?;
    let prober = FfprobeAdapter::new(&settings.tools.ffprobe);

    let mut orchestrator = Orchestrator::new(FfmpegLauncher::new(&settings.tools.ffmpeg));
    let containers = probe_all(&prober, &files, orchestrator.registry_mut().report_mut()).await;
    info!("Probed {} of {} files", containers.len(), files.len());

    let mut monitor = ProgressMonitor::new();
    {
        let stdin = std::io::stdin();
        let mut menu = Menu::new(stdin.lock(), std::io::stdout());
        configure_jobs(
            containers,
            &settings.policy,
            &mut orchestrator,
            &mut monitor,
            &mut menu,
        )?;
    }

    let mut sink: Box<dyn ProgressSink> = match settings.progress.style {
        ProgressStyle::Console => Box::new(ConsoleProgressSink::stdout()),
        ProgressStyle::Json => Box::new(JsonProgressSink::stdout()),
    };
    let period = Duration::from_millis(settings.progress.tick_ms);
    let report = watch(orchestrator.registry_mut(), &mut monitor, sink.as_mut(), period).await;

    if report.has_failures() {
        warn!(
            "{} job(s) failed, {} file(s) skipped",
            report.jobs.len() - report.succeeded(),
            report.files.len()
        );
    }
    Ok(!report.has_failures())
}

fn discover(input: &InputArgs) -> Result<Vec<PathBuf>> {
    let root = input.root();
    let files = discover_files(&root, input.recursive)
        .with_context(|| format!("Failed to read {}", root.display()))?;
    info!("Found {} files under {}", files.len(), root.display());
    Ok(files)
}

/// Probe every file, recording failures in `report` and keeping the rest
pub async fn probe_all(
    prober: &dyn ProbePort,
    files: &[PathBuf],
    report: &mut RunReport,
) -> Vec<Container> {
    let mut containers = Vec::with_capacity(files.len());
    for file in files {
        match prober.probe(file).await {
            Ok(container) => containers.push(container),
            Err(err) => {
                warn!("Skipping {}: {}", file.display(), err);
                report.record_file_failure(file, &err);
            }
        }
    }
    containers
}

/// Run one editing session per container and launch committed plans.
///
/// After every session one tick runs so fast failures show up while the
/// operator is still configuring.
pub fn configure_jobs<L, R, W>(
    containers: Vec<Container>,
    policy: &TargetFormatPolicy,
    orchestrator: &mut Orchestrator<L>,
    monitor: &mut ProgressMonitor,
    menu: &mut Menu<R, W>,
) -> Result<()>
where
    L: LaunchPort,
    R: BufRead,
    W: Write,
{
    for container in containers {
        let path = container.path.clone();
        let editor = ActionEditor::new(container, policy.clone());
        let outcome = menu.run_session(editor).context("Failed to read operator input")?;

        let quit = match outcome {
            SessionOutcome::Launch(plan) => {
                match orchestrator.launch(plan) {
                    Ok(handle) => menu.say(&format!(
                        "Started job {}: {}",
                        handle.id,
                        handle.destination.display()
                    ))?,
                    Err(err @ VidnormError::ProcessLaunchFailure { .. }) => {
                        error!("{}", err);
                        menu.say(&format!("Error: {}", err))?;
                    }
                    Err(err) => {
                        error!("Not converting {}: {}", path.display(), err);
                        menu.say(&format!("Error: {}", err))?;
                        orchestrator
                            .registry_mut()
                            .report_mut()
                            .record_file_failure(&path, &err);
                    }
                }
                false
            }
            SessionOutcome::Skip => {
                info!("Skipped {}", path.display());
                false
            }
            SessionOutcome::Quit => true,
        };

        let snapshot = monitor.tick(orchestrator.registry_mut(), Instant::now());
        for row in snapshot.jobs.iter().filter(|row| row.status.is_terminal()) {
            match &row.error {
                Some(err) => menu.say(&format!("Job {} failed: {}", row.job_id, err))?,
                None => menu.say(&format!("Job {} {}", row.job_id, row.status))?,
            }
        }

        if quit {
            info!("Configuration stopped by operator");
            break;
        }
    }
    Ok(())
}
