//! File logging so command output on stdout stays clean.

use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Environment variable holding a filter directive that overrides the config
pub const LOG_ENV: &str = "NUTRILOG_LOG";

const DEFAULT_LEVEL: &str = "info";

/// Directory for log files: the configured one, else `<data dir>/nutrilog/logs`.
pub fn log_dir(config: &LogConfig) -> PathBuf {
  config.directory.clone().unwrap_or_else(|| {
    dirs::data_dir()
      .unwrap_or_else(|| PathBuf::from("."))
      .join("nutrilog")
      .join("logs")
  })
}

fn filter(config: &LogConfig) -> Result<EnvFilter> {
  if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
    return Ok(filter);
  }
  let directive = config.level.as_deref().unwrap_or(DEFAULT_LEVEL);
  EnvFilter::try_new(directive).map_err(|e| eyre!("Invalid log level '{}': {}", directive, e))
}

/// Install the global subscriber writing to a daily rotated file.
///
/// Keep the returned guard alive until exit so buffered lines are flushed.
pub fn init(config: &LogConfig) -> Result<WorkerGuard> {
  let dir = log_dir(config);
  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(&dir, "nutrilog.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::registry()
    .with(filter(config)?)
    .with(
      tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false),
    )
    .try_init()
    .map_err(|e| eyre!("Failed to install logger: {}", e))?;

  Ok(guard)
}
