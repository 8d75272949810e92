//! Configuration initialization and hierarchy management

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::adapters::toml_config::{ProgressStyle, Settings, TomlConfigAdapter};
use crate::cli::args::{tick_in_range, ConvertArgs};
use crate::cli::{Cli, Commands};
use crate::domain::rules::OutputFormat;
use crate::utils::logging::{LogFormat, LogLevel};

/// Environment variables and the setting each one overrides
pub const ENV_MAPPINGS: &[(&str, &str)] = &[
    ("VIDNORM_FFMPEG", "tools.ffmpeg"),
    ("VIDNORM_FFPROBE", "tools.ffprobe"),
    ("VIDNORM_LOG_LEVEL", "logging.level"),
    ("VIDNORM_OUTPUT_FORMAT", "policy.output_format"),
    ("VIDNORM_TICK_MS", "progress.tick_ms"),
];

/// Build settings following precedence: CLI > Env > File > Defaults
pub fn initialize_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = TomlConfigAdapter::new()
        .load(cli.config.as_deref())
        .context("Failed to load configuration")?;

    apply_environment_overrides(&mut settings, |name| std::env::var(name).ok())?;
    apply_cli_overrides(&mut settings, cli)?;

    Ok(settings)
}

/// Apply environment overrides; `lookup` resolves a variable name
pub fn apply_environment_overrides<F>(settings: &mut Settings, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let mut env_overrides = 0;
    for (env_var, key) in ENV_MAPPINGS {
        if let Some(value) = lookup(env_var).filter(|value| !value.trim().is_empty()) {
            apply_setting(settings, key, &value)
                .with_context(|| format!("Invalid value in {}", env_var))?;
            env_overrides += 1;
        }
    }

    if env_overrides > 0 {
        info!("Applied {} environment variable overrides", env_overrides);
    }
    Ok(())
}

/// Apply CLI argument overrides
pub fn apply_cli_overrides(settings: &mut Settings, cli: &Cli) -> Result<()> {
    if let Some(level) = &cli.log_level {
        apply_setting(settings, "logging.level", level).context("Invalid --log-level")?;
    }
    if let Some(format) = &cli.log_format {
        apply_setting(settings, "logging.format", format).context("Invalid --log-format")?;
    }

    if let Commands::Convert(args) = &cli.command {
        apply_convert_overrides(settings, args)?;
    }
    Ok(())
}

fn apply_convert_overrides(settings: &mut Settings, args: &ConvertArgs) -> Result<()> {
    if let Some(tick_ms) = args.tick_ms {
        settings.progress.tick_ms = tick_ms;
    }
    if args.json_progress {
        settings.progress.style = ProgressStyle::Json;
    }
    if let Some(format) = &args.format {
        apply_setting(settings, "policy.output_format", format).context("Invalid --format")?;
    }
    Ok(())
}

/// Set one dotted setting from its textual value
fn apply_setting(settings: &mut Settings, key: &str, value: &str) -> Result<()> {
    match key {
        "tools.ffmpeg" => settings.tools.ffmpeg = PathBuf::from(value),
        "tools.ffprobe" => settings.tools.ffprobe = PathBuf::from(value),
        "logging.level" => {
            settings.logging.level = LogLevel::parse(value)
                .with_context(|| format!("unknown log level '{}'", value))?
        }
        "logging.format" => {
            settings.logging.format = LogFormat::parse(value)
                .with_context(|| format!("unknown log format '{}'", value))?
        }
        "policy.output_format" => {
            settings.policy.output_format = OutputFormat::parse(value)
                .with_context(|| format!("unknown output format '{}'", value))?
        }
        "progress.tick_ms" => {
            settings.progress.tick_ms = tick_in_range(value).map_err(anyhow::Error::msg)?
        }
        other => bail!("unknown setting '{}'", other),
    }
    Ok(())
}
