use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::hooks::WEEK_LEN;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Account whose records are read and written
  pub user_id: Uuid,
  #[serde(default)]
  pub backend: BackendConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub log: LogConfig,
}

/// Where records live
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
  /// SQLite database and an image directory on this machine
  Local {
    /// Database file (defaults to the platform data directory)
    path: Option<PathBuf>,
    /// Directory acting as the image bucket
    images_dir: Option<PathBuf>,
  },
  /// Hosted REST API
  Remote { url: String },
}

impl Default for BackendConfig {
  fn default() -> Self {
    BackendConfig::Local {
      path: None,
      images_dir: None,
    }
  }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
  /// Days of meals warmed ahead, counting today; at least a week so the
  /// weekly chart is covered
  #[serde(default = "default_meals_window")]
  pub meals_window_days: usize,
  /// Days of water logs warmed ahead, counting today
  #[serde(default = "default_hydration_window")]
  pub hydration_window_days: usize,
}

fn default_meals_window() -> usize {
  7
}

fn default_hydration_window() -> usize {
  5
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      meals_window_days: default_meals_window(),
      hydration_window_days: default_hydration_window(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct LogConfig {
  /// Filter directive, e.g. "debug" or "nutrilog=trace"
  pub level: Option<String>,
  /// Directory for log files (defaults to the data directory)
  pub directory: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./nutrilog.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/nutrilog/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/nutrilog/config.yaml\n\
                 with at least a `user_id`."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("nutrilog.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("nutrilog").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    if config.cache.hydration_window_days == 0 {
      return Err(eyre!("cache windows must cover at least one day"));
    }
    if config.cache.meals_window_days < WEEK_LEN {
      return Err(eyre!(
        "cache.meals_window_days must be at least {} to cover the weekly chart",
        WEEK_LEN
      ));
    }
    Ok(config)
  }

  /// Get the API key for the hosted backend from environment variables.
  ///
  /// Checks NUTRILOG_API_KEY first, then SUPABASE_ANON_KEY as fallback.
  pub fn get_api_key() -> Result<String> {
    std::env::var("NUTRILOG_API_KEY")
      .or_else(|_| std::env::var("SUPABASE_ANON_KEY"))
      .map_err(|_| {
        eyre!("API key not found. Set NUTRILOG_API_KEY or SUPABASE_ANON_KEY environment variable.")
      })
  }

  /// Signed-in user's access token, if any (NUTRILOG_ACCESS_TOKEN).
  pub fn get_access_token() -> Option<String> {
    std::env::var("NUTRILOG_ACCESS_TOKEN")
      .ok()
      .filter(|token| !token.trim().is_empty())
  }
}
