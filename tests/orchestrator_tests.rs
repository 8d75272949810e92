use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use vidnorm::engine::orchestrator::{JobStatus, Orchestrator};
use vidnorm::engine::progress::{watch, ProgressMonitor, ProgressSink, ProgressSnapshot};
use vidnorm::engine::RunReport;
use vidnorm::ports::{JobProcess, LaunchPort, ProcessExit};
use vidnorm::*;

/// Scripted stand-ins for background processes
mod test_utils {
    use super::*;

    /// Shared script for one fake process
    #[derive(Debug, Default)]
    pub struct Script {
        pub progress: String,
        pub exit: Option<ProcessExit>,
        pub diagnostics: String,
    }

    pub type Scripts = Arc<Mutex<HashMap<String, Script>>>;

    pub struct ScriptedProcess {
        name: String,
        scripts: Scripts,
    }

    impl JobProcess for ScriptedProcess {
        fn try_exit(&mut self) -> VidnormResult<Option<ProcessExit>> {
            Ok(self.scripts.lock().unwrap()[&self.name].exit)
        }

        fn read_progress(&mut self) -> VidnormResult<String> {
            let mut scripts = self.scripts.lock().unwrap();
            let script = scripts.get_mut(&self.name).unwrap();
            Ok(std::mem::take(&mut script.progress))
        }

        fn diagnostics(&mut self) -> String {
            self.scripts.lock().unwrap()[&self.name].diagnostics.clone()
        }
    }

    /// Launcher that never blocks and records what it started
    #[derive(Default)]
    pub struct ScriptedLauncher {
        pub scripts: Scripts,
        pub launched: Mutex<Vec<Vec<String>>>,
    }

    impl LaunchPort for ScriptedLauncher {
        fn launch(&self, source: &Path, args: &[String]) -> VidnormResult<Box<dyn JobProcess>> {
            let name = source.file_name().unwrap().to_string_lossy().to_string();
            self.scripts.lock().unwrap().entry(name.clone()).or_default();
            self.launched.lock().unwrap().push(args.to_vec());
            Ok(Box::new(ScriptedProcess {
                name,
                scripts: Arc::clone(&self.scripts),
            }))
        }
    }

    pub fn plan(path: &str, duration: Option<f64>) -> CommittedPlan {
        let container = Container::new(
            path,
            duration,
            vec![Stream::new(0, CodecType::Video).with_codec("hevc")],
        );
        ActionEditor::new(container, TargetFormatPolicy::default()).commit()
    }

    /// Sink keeping every snapshot
    #[derive(Default)]
    pub struct RecordingSink {
        pub snapshots: Vec<ProgressSnapshot>,
        pub finished: Option<RunReport>,
    }

    impl ProgressSink for RecordingSink {
        fn on_snapshot(&mut self, snapshot: &ProgressSnapshot) {
            self.snapshots.push(snapshot.clone());
        }

        fn on_finish(&mut self, report: &RunReport) {
            self.finished = Some(report.clone());
        }
    }
}

use test_utils::*;

#[test]
fn test_one_failure_one_success() {
    let launcher = ScriptedLauncher::default();
    let scripts = Arc::clone(&launcher.scripts);
    let mut orchestrator = Orchestrator::new(launcher);
    let mut monitor = ProgressMonitor::new();

    let started = Instant::now();
    let good = orchestrator.launch(plan("/media/good.mkv", Some(120.0))).unwrap();
    let bad = orchestrator.launch(plan("/media/bad.mkv", Some(120.0))).unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(orchestrator.registry().len(), 2);

    {
        let mut scripts = scripts.lock().unwrap();
        scripts.get_mut("good.mkv").unwrap().progress = "out_time_ms=60000000\n".to_string();
        let failing = scripts.get_mut("bad.mkv").unwrap();
        failing.exit = Some(ProcessExit::Failure(Some(1)));
        failing.diagnostics = "Error while decoding stream #0:0".to_string();
    }

    let now = Instant::now() + Duration::from_secs(30);
    let snapshot = monitor.tick(orchestrator.registry_mut(), now);
    assert_eq!(snapshot.jobs.len(), 2);
    assert_eq!(snapshot.jobs[0].job_id, good.id);
    assert_eq!(snapshot.jobs[0].status, JobStatus::Running);
    assert_eq!(snapshot.jobs[0].percent, Some(50.0));
    assert!(snapshot.jobs[0].eta.is_some());
    assert_eq!(snapshot.jobs[1].job_id, bad.id);
    assert_eq!(snapshot.jobs[1].status, JobStatus::Failed);
    assert!(snapshot.jobs[1]
        .error
        .as_deref()
        .unwrap()
        .contains("Error while decoding"));

    // The failed job is reported once, then leaves the active set
    assert_eq!(orchestrator.registry().len(), 1);
    let snapshot = monitor.tick(orchestrator.registry_mut(), now);
    assert_eq!(snapshot.jobs.len(), 1);
    assert_eq!(snapshot.jobs[0].percent, Some(50.0));

    scripts.lock().unwrap().get_mut("good.mkv").unwrap().exit = Some(ProcessExit::Success);
    let snapshot = monitor.tick(orchestrator.registry_mut(), now);
    assert_eq!(snapshot.jobs[0].status, JobStatus::Succeeded);
    assert_eq!(snapshot.jobs[0].percent, Some(100.0));
    assert!(orchestrator.registry().is_empty());

    let report = orchestrator.registry_mut().take_report();
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.failed(), 1);
    assert!(report.has_failures());
}

#[test]
fn test_unknown_duration_is_indeterminate() {
    let launcher = ScriptedLauncher::default();
    let scripts = Arc::clone(&launcher.scripts);
    let mut orchestrator = Orchestrator::new(launcher);
    let mut monitor = ProgressMonitor::new();

    orchestrator.launch(plan("/media/stream.ts", None)).unwrap();
    scripts.lock().unwrap().get_mut("stream.ts").unwrap().progress =
        "out_time=00:01:00.000000\n".to_string();

    let snapshot = monitor.tick(orchestrator.registry_mut(), Instant::now());
    assert_eq!(snapshot.jobs[0].percent, None);
    assert_eq!(snapshot.jobs[0].eta, None);
    assert_eq!(snapshot.jobs[0].status, JobStatus::Running);
}

#[test]
fn test_launch_passes_built_command() {
    let launcher = ScriptedLauncher::default();
    let mut orchestrator = Orchestrator::new(launcher);
    orchestrator.launch(plan("/media/a.mkv", Some(10.0))).unwrap();

    let mut monitor = ProgressMonitor::new();
    let snapshot = monitor.tick(orchestrator.registry_mut(), Instant::now());
    assert_eq!(snapshot.jobs.len(), 1);
    assert!(orchestrator.registry().jobs()[0]
        .destination()
        .ends_with("a.mp4"));
}

#[test]
fn test_configure_jobs_launches_skips_and_quits() {
    use std::io::Cursor;
    use vidnorm::cli::commands::configure_jobs;
    use vidnorm::cli::menu::Menu;

    let launcher = ScriptedLauncher::default();
    let scripts = Arc::clone(&launcher.scripts);
    let mut orchestrator = Orchestrator::new(launcher);
    let mut monitor = ProgressMonitor::new();
    let containers: Vec<Container> = ["a", "b", "c", "d"]
        .iter()
        .map(|name| plan(&format!("/media/{}.mkv", name), Some(60.0)).container().clone())
        .collect();

    let mut menu = Menu::new(Cursor::new("c\ns\nq\n".to_string()), Vec::new());
    configure_jobs(
        containers,
        &TargetFormatPolicy::default(),
        &mut orchestrator,
        &mut monitor,
        &mut menu,
    )
    .unwrap();

    let output = String::from_utf8(menu.into_output()).unwrap();
    assert!(output.contains("Started job #1: /media/a.mp4"));
    assert!(!output.contains("/media/d.mkv"));
    assert_eq!(orchestrator.registry().len(), 1);
    assert_eq!(scripts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_watch_runs_until_all_jobs_finish() {
    let launcher = ScriptedLauncher::default();
    let scripts = Arc::clone(&launcher.scripts);
    let mut orchestrator = Orchestrator::new(launcher);
    orchestrator.launch(plan("/media/one.mkv", Some(10.0))).unwrap();
    orchestrator.launch(plan("/media/two.mkv", Some(10.0))).unwrap();

    {
        let mut scripts = scripts.lock().unwrap();
        scripts.get_mut("one.mkv").unwrap().exit = Some(ProcessExit::Success);
        scripts.get_mut("two.mkv").unwrap().exit = Some(ProcessExit::Failure(None));
    }

    let mut monitor = ProgressMonitor::new();
    let mut sink = RecordingSink::default();
    let report = watch(
        orchestrator.registry_mut(),
        &mut monitor,
        &mut sink,
        Duration::from_millis(10),
    )
    .await;

    assert_eq!(report.jobs.len(), 2);
    assert_eq!(report.succeeded(), 1);
    assert!(report.jobs[1]
        .error
        .as_deref()
        .unwrap()
        .contains("terminated by signal"));
    assert_eq!(sink.snapshots.len(), 1);
    assert_eq!(sink.finished, Some(report));
}

#[tokio::test]
async fn test_watch_with_zero_period_still_finishes() {
    let launcher = ScriptedLauncher::default();
    let scripts = Arc::clone(&launcher.scripts);
    let mut orchestrator = Orchestrator::new(launcher);
    orchestrator.launch(plan("/media/quick.mkv", Some(5.0))).unwrap();
    scripts.lock().unwrap().get_mut("quick.mkv").unwrap().exit = Some(ProcessExit::Success);

    let mut monitor = ProgressMonitor::new();
    let mut sink = RecordingSink::default();
    let report = watch(
        orchestrator.registry_mut(),
        &mut monitor,
        &mut sink,
        Duration::ZERO,
    )
    .await;

    assert_eq!(report.succeeded(), 1);
    let overall = sink.snapshots[0].overall.as_ref().unwrap();
    assert_eq!(overall.percent, Some(100.0));
}

#[cfg(unix)]
mod real_processes {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;
    use vidnorm::adapters::FfmpegLauncher;

    fn fake_encoder(dir: &TempDir) -> std::path::PathBuf {
        // Fails for sources named "bad", otherwise reports progress and succeeds
        let script = "#!/bin/sh\n\
                      case \"$*\" in\n\
                        *bad*) echo 'Conversion failed!' >&2; exit 1 ;;\n\
                      esac\n\
                      printf 'out_time_us=5000000\\nprogress=end\\n' >> \"$2\"\n\
                      exit 0\n";
        let path = dir.path().join("ffmpeg");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_real_processes_one_fails_one_succeeds() {
        let dir = TempDir::new().unwrap();
        let mut orchestrator = Orchestrator::new(FfmpegLauncher::new(fake_encoder(&dir)));

        let good = dir.path().join("good.mkv");
        let bad = dir.path().join("bad.mkv");
        orchestrator
            .launch(plan(good.to_str().unwrap(), Some(10.0)))
            .unwrap();
        orchestrator
            .launch(plan(bad.to_str().unwrap(), Some(10.0)))
            .unwrap();

        let mut monitor = ProgressMonitor::new();
        let mut sink = RecordingSink::default();
        let report = watch(
            orchestrator.registry_mut(),
            &mut monitor,
            &mut sink,
            Duration::from_millis(20),
        )
        .await;

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        let failure = report
            .jobs
            .iter()
            .find(|job| job.status == JobStatus::Failed)
            .unwrap();
        assert!(failure.source.ends_with("bad.mkv"));
        let message = failure.error.as_deref().unwrap();
        assert!(message.contains("exit code 1"));
        assert!(message.contains("Conversion failed!"));
    }
}
