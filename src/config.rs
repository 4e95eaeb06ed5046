use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Host-owned configuration injected into the screening core
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreeningConfig {
    pub schema_version: u32,
    pub api_base_url: String,
    pub language: String,

    // Recording constraints
    pub min_duration_secs: f64,
    pub max_duration_secs: f64,
    pub meter_interval_ms: u64,
    pub duration_tick_ms: u64,

    // Submission
    pub request_timeout_secs: u64,
    pub analysis_poll_interval_ms: u64,
    pub analysis_timeout_secs: u64,
    pub delete_after_upload: bool,

    // Personalization
    pub target_samples: u32,
    pub daily_sample_cap: u32,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            api_base_url: "http://localhost:8000/api".to_string(),
            language: "en".to_string(),
            min_duration_secs: 30.0,
            max_duration_secs: 300.0,
            meter_interval_ms: 50,
            duration_tick_ms: 100,
            request_timeout_secs: 30,
            analysis_poll_interval_ms: 2000,
            analysis_timeout_secs: 60,
            delete_after_upload: false,
            target_samples: 9,
            daily_sample_cap: 3,
        }
    }
}

/// Settings the recording controller needs
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingConfig {
    pub min_duration: Duration,
    pub max_duration: Duration,
    pub meter_interval: Duration,
    pub duration_tick: Duration,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        ScreeningConfig::default().recording()
    }
}

/// Settings the submission client needs
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionConfig {
    pub min_duration: Duration,
    pub max_duration: Duration,
    pub poll_interval: Duration,
    pub analysis_timeout: Duration,
    pub delete_after_upload: bool,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        ScreeningConfig::default().submission()
    }
}

/// Settings for baseline bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaselineConfig {
    pub target_samples: u32,
    pub daily_sample_cap: u32,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        ScreeningConfig::default().baseline()
    }
}

impl ScreeningConfig {
    /// Get the default config directory
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(".voicescreen"))
    }

    /// Get the config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Get the persisted baseline progress path
    pub fn baseline_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("baseline.json"))
    }

    /// Load config from the default location or return default
    pub fn load_or_default() -> Self {
        match Self::config_path().and_then(|path| Self::load(&path)) {
            Ok(config) => config,
            Err(e) => {
                debug!("Failed to load config, using default: {}", e);
                Self::default()
            }
        }
    }

    /// Load config from file, or default when the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            let config: ScreeningConfig =
                serde_json::from_str(&content).context("Failed to parse config file")?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")
    }

    /// Reject configurations the core cannot run with
    pub fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(&self.api_base_url)
            .with_context(|| format!("Invalid API base URL '{}'", self.api_base_url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("API base URL must use http or https, got: {}", parsed.scheme());
        }
        if !(self.min_duration_secs > 0.0 && self.min_duration_secs < self.max_duration_secs) {
            anyhow::bail!(
                "Duration bounds must satisfy 0 < min < max (min {}, max {})",
                self.min_duration_secs,
                self.max_duration_secs
            );
        }
        if self.target_samples == 0 {
            anyhow::bail!("target_samples must be at least 1");
        }
        if self.meter_interval_ms == 0 || self.duration_tick_ms == 0 || self.analysis_poll_interval_ms == 0 {
            anyhow::bail!("Tick and poll intervals must be non-zero");
        }
        Ok(())
    }

    pub fn recording(&self) -> RecordingConfig {
        RecordingConfig {
            min_duration: Duration::from_secs_f64(self.min_duration_secs),
            max_duration: Duration::from_secs_f64(self.max_duration_secs),
            meter_interval: Duration::from_millis(self.meter_interval_ms),
            duration_tick: Duration::from_millis(self.duration_tick_ms),
        }
    }

    pub fn submission(&self) -> SubmissionConfig {
        SubmissionConfig {
            min_duration: Duration::from_secs_f64(self.min_duration_secs),
            max_duration: Duration::from_secs_f64(self.max_duration_secs),
            poll_interval: Duration::from_millis(self.analysis_poll_interval_ms),
            analysis_timeout: Duration::from_secs(self.analysis_timeout_secs),
            delete_after_upload: self.delete_after_upload,
        }
    }

    pub fn baseline(&self) -> BaselineConfig {
        BaselineConfig {
            target_samples: self.target_samples,
            daily_sample_cap: self.daily_sample_cap,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
