//! Personal baseline tracking.
//!
//! A baseline is established after a fixed number of qualifying analyses.
//! Submissions are also capped per local calendar day; the cap resets at
//! local midnight.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::BaselineConfig;
use crate::error::PolicyError;

/// Why a sample was recorded. Only standard samples build the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleKind {
    #[default]
    Standard,
    Demo,
    Diagnostic,
}

impl SampleKind {
    pub fn counts_toward_baseline(&self) -> bool {
        matches!(self, SampleKind::Standard)
    }
}

/// Persisted baseline progress for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineProgress {
    pub samples_collected: u32,
    pub target_samples: u32,
    pub baseline_established: bool,
    pub daily_samples_remaining: u32,
    /// Consecutive local days with at least one analyzed sample
    pub streak_days: u32,
    /// Backend personalization score in (0, 100], present once established
    pub personalization_score: Option<f64>,
    /// Local day the daily allowance was last reset for
    pub allowance_day: Option<NaiveDate>,
    pub last_sample_day: Option<NaiveDate>,
}

impl Default for BaselineProgress {
    fn default() -> Self {
        Self::new(&BaselineConfig::default())
    }
}

impl BaselineProgress {
    pub fn new(config: &BaselineConfig) -> Self {
        Self {
            samples_collected: 0,
            target_samples: config.target_samples,
            baseline_established: false,
            daily_samples_remaining: config.daily_sample_cap,
            streak_days: 0,
            personalization_score: None,
            allowance_day: None,
            last_sample_day: None,
        }
    }

    /// Fraction of the target collected, clamped to 0..=1
    pub fn completion(&self) -> f64 {
        if self.target_samples == 0 {
            return 1.0;
        }
        (self.samples_collected as f64 / self.target_samples as f64).min(1.0)
    }

    pub fn samples_until_established(&self) -> u32 {
        self.target_samples.saturating_sub(self.samples_collected)
    }

    fn roll_day(&mut self, today: NaiveDate, daily_cap: u32) {
        if self.allowance_day != Some(today) {
            if self.allowance_day.is_some() {
                debug!("New day {}, daily allowance reset to {}", today, daily_cap);
            }
            self.allowance_day = Some(today);
            self.daily_samples_remaining = daily_cap;
        }
    }
}

/// Result of recording one completed analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineUpdate {
    pub progress: BaselineProgress,
    /// True only for the update that crossed the target
    pub baseline_just_established: bool,
    /// Whether this sample counted toward the baseline
    pub counted: bool,
}

/// Tracks baseline progress and the per-day allowance
#[derive(Debug)]
pub struct BaselineTracker {
    config: BaselineConfig,
    progress: Mutex<BaselineProgress>,
}

impl BaselineTracker {
    pub fn new(config: BaselineConfig) -> Self {
        Self {
            config,
            progress: Mutex::new(BaselineProgress::new(&config)),
        }
    }

    /// Resume from persisted progress. The configured target wins over the
    /// stored one, but an established baseline is never revoked.
    pub fn from_progress(config: BaselineConfig, mut progress: BaselineProgress) -> Self {
        progress.target_samples = config.target_samples;
        progress.baseline_established = progress.baseline_established
            || progress.samples_collected >= progress.target_samples;
        progress.daily_samples_remaining = progress
            .daily_samples_remaining
            .min(config.daily_sample_cap);
        Self {
            config,
            progress: Mutex::new(progress),
        }
    }

    /// Load persisted progress, starting fresh if the file does not exist
    pub fn load_or_new(config: BaselineConfig, path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No baseline file at {:?}, starting fresh", path);
            return Ok(Self::new(config));
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read baseline from {:?}", path))?;
        let progress: BaselineProgress =
            serde_json::from_str(&content).context("Failed to parse baseline progress")?;
        Ok(Self::from_progress(config, progress))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        let progress = self.lock().clone();
        let content = serde_json::to_string_pretty(&progress)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write baseline to {:?}", path))?;
        Ok(())
    }

    pub fn config(&self) -> BaselineConfig {
        self.config
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BaselineProgress> {
        self.progress
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Progress as of today's local date
    pub fn snapshot(&self) -> BaselineProgress {
        self.snapshot_on(Local::now().date_naive())
    }

    pub fn snapshot_on(&self, today: NaiveDate) -> BaselineProgress {
        let mut progress = self.lock();
        progress.roll_day(today, self.config.daily_sample_cap);
        progress.clone()
    }

    /// Fail if today's allowance is used up
    pub fn ensure_daily_allowance(&self) -> Result<(), PolicyError> {
        self.ensure_daily_allowance_on(Local::now().date_naive())
    }

    pub fn ensure_daily_allowance_on(&self, today: NaiveDate) -> Result<(), PolicyError> {
        let mut progress = self.lock();
        progress.roll_day(today, self.config.daily_sample_cap);
        if progress.daily_samples_remaining == 0 {
            warn!("Daily sample limit of {} reached", self.config.daily_sample_cap);
            return Err(PolicyError::DailyLimitReached);
        }
        Ok(())
    }

    /// Record one successfully analyzed sample
    pub fn record_analysis(
        &self,
        kind: SampleKind,
        personalization_score: Option<f64>,
    ) -> BaselineUpdate {
        self.record_analysis_on(Local::now().date_naive(), kind, personalization_score)
    }

    pub fn record_analysis_on(
        &self,
        today: NaiveDate,
        kind: SampleKind,
        personalization_score: Option<f64>,
    ) -> BaselineUpdate {
        let mut progress = self.lock();
        progress.roll_day(today, self.config.daily_sample_cap);
        progress.daily_samples_remaining = progress.daily_samples_remaining.saturating_sub(1);

        progress.streak_days = match progress.last_sample_day {
            Some(day) if day == today => progress.streak_days.max(1),
            Some(day) if day.succ_opt() == Some(today) => progress.streak_days + 1,
            _ => 1,
        };
        progress.last_sample_day = Some(today);

        let counted = kind.counts_toward_baseline();
        if counted {
            progress.samples_collected = progress.samples_collected.saturating_add(1);
        }

        let was_established = progress.baseline_established;
        progress.baseline_established =
            was_established || progress.samples_collected >= progress.target_samples;
        let baseline_just_established = !was_established && progress.baseline_established;

        if progress.baseline_established {
            match personalization_score {
                Some(score) if score > 0.0 && score <= 100.0 => {
                    progress.personalization_score = Some(score);
                }
                Some(score) => warn!("Ignoring out-of-range personalization score {}", score),
                None => {}
            }
        }

        if baseline_just_established {
            info!(
                "Baseline established after {} samples",
                progress.samples_collected
            );
        } else {
            debug!(
                "Baseline progress {}/{} ({:?} sample)",
                progress.samples_collected, progress.target_samples, kind
            );
        }

        BaselineUpdate {
            progress: progress.clone(),
            baseline_just_established,
            counted,
        }
    }
}
