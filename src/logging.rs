// src/logging.rs

//! Logging setup for `spine-items` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `SPINE_ITEMS_LOG` environment variable (a level or directive list)
//! 3. default to `info`
//!
//! Logs are sent to STDERR; stdout carries command output only.

use anyhow::Result;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "SPINE_ITEMS_LOG";

/// Initialise global logging subscriber.
///
/// Call once at startup; a second call fails.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    fmt()
        .with_env_filter(build_filter(cli_level, std::env::var(LOG_ENV).ok().as_deref()))
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))?;

    Ok(())
}

/// The environment value may be a full directive list such as
/// `info,spine_items::exec=trace`; an unparsable value falls back to `info`.
fn build_filter(cli_level: Option<LogLevel>, env_value: Option<&str>) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(directive(level));
    }
    env_value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| EnvFilter::try_new(v.replace("warning", "warn")).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_level_wins_over_environment() {
        let filter = build_filter(Some(LogLevel::Debug), Some("error"));
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn environment_directives_are_kept() {
        let filter = build_filter(None, Some("info,spine_items::exec=trace"));
        assert!(filter.to_string().contains("spine_items::exec=trace"));
        assert_eq!(build_filter(None, Some(" warning ")).to_string(), "warn");
        assert_eq!(build_filter(None, Some("spine_items=notalevel")).to_string(), "info");
        assert_eq!(build_filter(None, None).to_string(), "info");
    }
}
