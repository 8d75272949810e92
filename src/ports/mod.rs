// Ports - Interface definitions (contracts)

use std::path::Path;

use async_trait::async_trait;

use crate::domain::model::Container;
use crate::error::VidnormResult;

/// Port for media file probing
#[async_trait]
pub trait ProbePort: Send + Sync {
    /// Probe a media file and build its container record
    async fn probe(&self, path: &Path) -> VidnormResult<Container>;
}

/// How a background process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    Success,
    /// Non-zero exit code, or `None` when terminated by a signal
    Failure(Option<i32>),
}

/// Handle on one running background conversion.
///
/// All methods are non-blocking; the monitor calls them once per tick.
pub trait JobProcess: Send {
    /// Check whether the process has exited
    fn try_exit(&mut self) -> VidnormResult<Option<ProcessExit>>;

    /// Complete progress lines written since the previous call
    fn read_progress(&mut self) -> VidnormResult<String>;

    /// Diagnostic output collected so far
    fn diagnostics(&mut self) -> String;
}

/// Port for starting background conversions
pub trait LaunchPort: Send + Sync {
    /// Spawn the encoder with `args` for `source` and return at once
    fn launch(&self, source: &Path, args: &[String]) -> VidnormResult<Box<dyn JobProcess>>;
}
