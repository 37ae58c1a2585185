use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{location::DEFAULT_IP_LOOKUP_URL, model::Coordinates};

pub const DEFAULT_API_BASE: &str = "https://api.openweathermap.org/data/2.5/";
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 600;

pub const API_BASE_ENV: &str = "WEATHER_API_BASE";
pub const API_KEY_ENV: &str = "WEATHER_API_KEY";

/// Weather API endpoint and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            api_key: None,
        }
    }
}

/// Resolved API settings, ready to build a weather source from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSettings {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub fallback_latitude: f64,
    pub fallback_longitude: f64,
    pub ip_lookup_url: String,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            fallback_latitude: Coordinates::FALLBACK.latitude,
            fallback_longitude: Coordinates::FALLBACK.longitude,
            ip_lookup_url: DEFAULT_IP_LOOKUP_URL.to_string(),
        }
    }
}

/// Which coordinates a refresh tick fetches for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStrategy {
    /// Reuse the coordinates acquired at mount.
    #[default]
    ReuseCoordinates,
    /// Ask the location source again on every tick.
    Reacquire,
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// refresh_interval_secs = 600
/// refresh_strategy = "reuse_coordinates"
///
/// [api]
/// base_url = "https://api.openweathermap.org/data/2.5/"
/// api_key = "..."
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub refresh_interval_secs: u64,
    pub refresh_strategy: RefreshStrategy,
    pub api: ApiConfig,
    pub location: LocationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            refresh_strategy: RefreshStrategy::default(),
            api: ApiConfig::default(),
            location: LocationConfig::default(),
        }
    }
}

impl Config {
    /// Load config from the platform config dir, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut cfg = Self::load_from(&Self::config_file_path()?)?;
        cfg.apply_overrides(std::env::var(API_BASE_ENV).ok(), std::env::var(API_KEY_ENV).ok());
        Ok(cfg)
    }

    /// Load config from `path`, or return defaults if it doesn't exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to the platform config dir.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_file_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-widget", "weather-widget")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Replace the API base and key with externally injected values, when present.
    pub fn apply_overrides(&mut self, base_url: Option<String>, api_key: Option<String>) {
        if let Some(base) = base_url.filter(|s| !s.trim().is_empty()) {
            self.api.base_url = base;
        }
        if let Some(key) = api_key.filter(|s| !s.trim().is_empty()) {
            self.api.api_key = Some(key);
        }
    }

    /// API base and key, with the base normalized to end in `/`.
    pub fn api_settings(&self) -> Result<ApiSettings> {
        let api_key = self
            .api
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "No API key configured.\n\
                     Hint: run `weather-widget configure` or set {API_KEY_ENV}."
                )
            })?;

        let mut base_url = self.api.base_url.trim().to_string();
        if base_url.is_empty() {
            return Err(anyhow!("API base URL is empty"));
        }
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(ApiSettings {
            base_url,
            api_key: api_key.to_string(),
        })
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn fallback_coordinates(&self) -> Coordinates {
        Coordinates::new(self.location.fallback_latitude, self.location.fallback_longitude)
    }
}
