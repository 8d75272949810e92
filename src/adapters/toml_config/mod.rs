// TOML config adapter - Settings loaded from TOML files

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::rules::{TargetFormatPolicy, MAX_CRF};
use crate::error::{VidnormError, VidnormResult};
use crate::utils::logging::LoggingConfig;

/// Name of the per-directory config file
pub const LOCAL_CONFIG_FILE: &str = "vidnorm.toml";

/// Shortest accepted progress tick, in milliseconds
pub const MIN_TICK_MS: u64 = 50;
/// Longest accepted progress tick, in milliseconds
pub const MAX_TICK_MS: u64 = 10_000;

/// External binaries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

/// How progress is presented
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStyle {
    #[default]
    Console,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressSettings {
    /// Milliseconds between monitor ticks
    pub tick_ms: u64,
    pub style: ProgressStyle,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            tick_ms: 200,
            style: ProgressStyle::Console,
        }
    }
}

/// Complete runtime settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tools: ToolSettings,
    pub policy: TargetFormatPolicy,
    pub progress: ProgressSettings,
    pub logging: LoggingConfig,
}

impl Settings {
    /// Check the ranges the TOML types alone cannot express
    pub fn validate(&self) -> VidnormResult<()> {
        if !(MIN_TICK_MS..=MAX_TICK_MS).contains(&self.progress.tick_ms) {
            return Err(VidnormError::Config {
                message: format!(
                    "progress.tick_ms must be between {} and {}, got {}",
                    MIN_TICK_MS, MAX_TICK_MS, self.progress.tick_ms
                ),
            });
        }
        if self.policy.crf > MAX_CRF {
            return Err(VidnormError::Config {
                message: format!(
                    "policy.crf must be at most {}, got {}",
                    MAX_CRF, self.policy.crf
                ),
            });
        }
        Ok(())
    }
}

/// TOML configuration adapter
#[derive(Debug, Clone, Default)]
pub struct TomlConfigAdapter {
    search_paths: Vec<PathBuf>,
}

impl TomlConfigAdapter {
    /// Adapter searching `./vidnorm.toml`, then the user config directory
    pub fn new() -> Self {
        let mut search_paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        if let Some(user) = Self::user_config_path() {
            search_paths.push(user);
        }
        Self { search_paths }
    }

    /// Adapter with an explicit search list, mostly for tests
    pub fn with_search_paths(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    /// `$XDG_CONFIG_HOME/vidnorm/config.toml`, or `~/.config/vidnorm/config.toml`
    fn user_config_path() -> Option<PathBuf> {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))?;
        Some(base.join("vidnorm").join("config.toml"))
    }

    /// Load settings.
    ///
    /// An explicit path must exist. Otherwise the first existing file on the
    /// search list is used, and defaults apply when there is none.
    pub fn load(&self, explicit: Option<&Path>) -> VidnormResult<Settings> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(VidnormError::Config {
                    message: format!("Config file does not exist: {}", path.display()),
                });
            }
            return self.load_file(path);
        }

        match self.search_paths.iter().find(|path| path.is_file()) {
            Some(path) => self.load_file(path),
            None => {
                debug!("No config file found, using defaults");
                Ok(Settings::default())
            }
        }
    }

    fn load_file(&self, path: &Path) -> VidnormResult<Settings> {
        info!("Loading configuration from: {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| VidnormError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;
        Self::parse(&content).map_err(|e| match e {
            VidnormError::Config { message } => VidnormError::Config {
                message: format!("{}: {}", path.display(), message),
            },
            other => other,
        })
    }

    /// Parse and validate a TOML document; missing sections and keys take
    /// their defaults
    pub fn parse(content: &str) -> VidnormResult<Settings> {
        let settings: Settings = toml::from_str(content).map_err(|e| VidnormError::Config {
            message: format!("Failed to parse configuration: {}", e),
        })?;
        settings.validate()?;
        Ok(settings)
    }
}
