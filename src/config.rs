//! Runtime configuration loaded from YAML

use crate::bus::DEFAULT_EVENT_CAPACITY;
use crate::cache::DEFAULT_HIGHLIGHT_COLOR;
use crate::in_page_ui::DEFAULT_PENDING_ACTION_TTL;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings for a page session and the CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FolioConfig {
    /// Tracing filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// Buffer size of each event bus
    pub event_capacity: usize,
    /// How long a sidebar/ribbon action waits for its component to mount
    pub pending_action_ttl_ms: u64,
    /// Initial auto-share preference for in-memory preference stores
    pub auto_share: bool,
    pub default_highlight_color: String,
    /// Log cache data-shape warnings
    pub debug: bool,
}

impl Default for FolioConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            pending_action_ttl_ms: DEFAULT_PENDING_ACTION_TTL.as_millis() as u64,
            auto_share: false,
            default_highlight_color: DEFAULT_HIGHLIGHT_COLOR.to_string(),
            debug: false,
        }
    }
}

impl FolioConfig {
    /// `<config dir>/folio/config.yaml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".config"))
            .join("folio")
            .join("config.yaml")
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::from_yaml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `path` if given, otherwise from the default location
    pub fn load_or_default(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Self::load(&Self::default_path()),
        }
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn pending_action_ttl(&self) -> Duration {
        Duration::from_millis(self.pending_action_ttl_ms)
    }
}
