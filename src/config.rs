use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;

use crate::geometry::{ColorError, Gradient};
use crate::spotify::client::DEFAULT_BASE_URL;

/// Application configuration loaded from TOML config file.
/// All fields have sensible defaults — the config file is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Spotify Web API settings.
    pub api: ApiConfig,
    /// Plot appearance and default axes.
    pub plot: PlotConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the Web API (override for a proxy or test server).
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    /// Color at the low end of the gradient (`rrggbb`).
    pub low_color: String,
    /// Color at the high end of the gradient (`rrggbb`).
    pub high_color: String,
    /// Default x-axis feature.
    pub x_axis: String,
    /// Default y-axis feature.
    pub y_axis: String,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            low_color: "00529d".to_string(),
            high_color: "eb121b".to_string(),
            x_axis: "valence".to_string(),
            y_axis: "energy".to_string(),
        }
    }
}

impl PlotConfig {
    pub fn gradient(&self) -> Result<Gradient, ColorError> {
        Ok(Gradient {
            low: self.low_color.parse()?,
            high: self.high_color.parse()?,
        })
    }
}

impl AppConfig {
    /// Load config from `~/.config/emotionify/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match Self::parse(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Get the config file path.
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME).map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
