use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  pub app: AppConfig,
  /// Essential resource paths cached at install time
  pub precache: Vec<String>,
  /// Path substrings that mark a request as API-bound
  pub api_markers: Vec<String>,
  pub sync: SyncConfig,
  pub notifications: NotificationConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      app: AppConfig::default(),
      precache: default_precache(),
      api_markers: default_api_markers(),
      sync: SyncConfig::default(),
      notifications: NotificationConfig::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  /// Cache-name prefix
  pub name: String,
  /// Global version string; bumping it supersedes every existing store
  pub version: String,
  /// Application origin that relative request URLs resolve against
  pub base_url: String,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      name: "diary".to_string(),
      version: "1.0.0".to_string(),
      base_url: "http://localhost:8000".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Sync events must carry this tag to trigger a pass
  pub tag: String,
  /// Remote diary-data API; background sync is disabled when unset
  pub endpoint: Option<String>,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      tag: "diary-data-sync".to_string(),
      endpoint: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  /// Icon and badge path for displayed notifications
  pub icon: String,
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      icon: "/generated-icon.png".to_string(),
    }
  }
}

fn default_precache() -> Vec<String> {
  vec![
    "/".to_string(),
    "/manifest.json".to_string(),
    "/generated-icon.png".to_string(),
  ]
}

fn default_api_markers() -> Vec<String> {
  vec!["api".to_string(), "streamlit".to_string()]
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./offworker.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/offworker/config.yaml
  ///
  /// With no file present, built-in defaults apply.
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
      None => Ok(Config::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("offworker.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("offworker").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Get the bearer token for the sync endpoint from the environment, if
  /// one is set.
  pub fn get_sync_token() -> Option<String> {
    std::env::var("OFFWORKER_SYNC_TOKEN").ok()
  }
}
