//! Clinical rating scales.
//!
//! Each scale has a fixed score domain and an ordered set of severity bands.
//! Band membership is lower-bound inclusive, upper-bound exclusive, and the
//! last band is open-ended. Scales are evaluated independently of each other.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScaleError {
    #[error("{scale} score is not a finite number: {value}")]
    NonFinite { scale: ClinicalScale, value: f64 },
}

/// The four supported rating scales
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClinicalScale {
    /// Patient Health Questionnaire (depression)
    Phq9,
    /// Generalized Anxiety Disorder scale
    Gad7,
    /// Perceived Stress Scale
    Pss,
    /// Warwick-Edinburgh Mental Wellbeing Scale (higher is better)
    Wemwbs,
}

impl std::fmt::Display for ClinicalScale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for ClinicalScale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "phq9" => Ok(ClinicalScale::Phq9),
            "gad7" => Ok(ClinicalScale::Gad7),
            "pss" => Ok(ClinicalScale::Pss),
            "wemwbs" => Ok(ClinicalScale::Wemwbs),
            other => Err(format!("Unknown scale: {}", other)),
        }
    }
}

/// Severity band label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minimal,
    Mild,
    Moderate,
    ModeratelySevere,
    Severe,
    Low,
    BelowAverage,
    Average,
    High,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Minimal => "minimal",
            Severity::Mild => "mild",
            Severity::Moderate => "moderate",
            Severity::ModeratelySevere => "moderately severe",
            Severity::Severe => "severe",
            Severity::Low => "low",
            Severity::BelowAverage => "below average",
            Severity::Average => "average",
            Severity::High => "high",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One severity band: scores at or above `lower` (and below the next band)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub lower: f64,
    pub severity: Severity,
}

const PHQ9_BANDS: [Band; 5] = [
    Band { lower: 0.0, severity: Severity::Minimal },
    Band { lower: 5.0, severity: Severity::Mild },
    Band { lower: 10.0, severity: Severity::Moderate },
    Band { lower: 15.0, severity: Severity::ModeratelySevere },
    Band { lower: 20.0, severity: Severity::Severe },
];

const GAD7_BANDS: [Band; 4] = [
    Band { lower: 0.0, severity: Severity::Minimal },
    Band { lower: 5.0, severity: Severity::Mild },
    Band { lower: 10.0, severity: Severity::Moderate },
    Band { lower: 15.0, severity: Severity::Severe },
];

const PSS_BANDS: [Band; 3] = [
    Band { lower: 0.0, severity: Severity::Low },
    Band { lower: 14.0, severity: Severity::Moderate },
    Band { lower: 27.0, severity: Severity::High },
];

const WEMWBS_BANDS: [Band; 4] = [
    Band { lower: 14.0, severity: Severity::Low },
    Band { lower: 32.0, severity: Severity::BelowAverage },
    Band { lower: 45.0, severity: Severity::Average },
    Band { lower: 60.0, severity: Severity::High },
];

impl ClinicalScale {
    pub const ALL: [ClinicalScale; 4] = [
        ClinicalScale::Phq9,
        ClinicalScale::Gad7,
        ClinicalScale::Pss,
        ClinicalScale::Wemwbs,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            ClinicalScale::Phq9 => "PHQ-9",
            ClinicalScale::Gad7 => "GAD-7",
            ClinicalScale::Pss => "PSS",
            ClinicalScale::Wemwbs => "WEMWBS",
        }
    }

    /// What the scale measures, for display
    pub fn construct(&self) -> &'static str {
        match self {
            ClinicalScale::Phq9 => "depression",
            ClinicalScale::Gad7 => "anxiety",
            ClinicalScale::Pss => "perceived stress",
            ClinicalScale::Wemwbs => "mental wellbeing",
        }
    }

    /// Inclusive score domain `(min, max)`
    pub fn domain(&self) -> (f64, f64) {
        match self {
            ClinicalScale::Phq9 => (0.0, 27.0),
            ClinicalScale::Gad7 => (0.0, 21.0),
            ClinicalScale::Pss => (0.0, 40.0),
            ClinicalScale::Wemwbs => (14.0, 70.0),
        }
    }

    /// Bands in ascending score order
    pub fn bands(&self) -> &'static [Band] {
        match self {
            ClinicalScale::Phq9 => &PHQ9_BANDS,
            ClinicalScale::Gad7 => &GAD7_BANDS,
            ClinicalScale::Pss => &PSS_BANDS,
            ClinicalScale::Wemwbs => &WEMWBS_BANDS,
        }
    }

    /// Whether a high score means a better outcome
    pub fn higher_is_better(&self) -> bool {
        matches!(self, ClinicalScale::Wemwbs)
    }

    /// Index of the band `raw` falls in. Scores below the domain land in the
    /// first band; the last band has no upper bound.
    pub fn band_index(&self, raw: f64) -> usize {
        self.bands()
            .iter()
            .rposition(|band| raw >= band.lower)
            .unwrap_or(0)
    }

    pub fn classify(&self, raw: f64) -> Severity {
        self.bands()[self.band_index(raw)].severity
    }

    /// Linear rescale of `raw` into [0, 1] over the scale's domain
    pub fn normalize(&self, raw: f64) -> f64 {
        let (min, max) = self.domain();
        ((raw - min) / (max - min)).clamp(0.0, 1.0)
    }

    /// Bands that warrant follow-up
    pub fn is_concerning(&self, severity: Severity) -> bool {
        match self {
            ClinicalScale::Phq9 | ClinicalScale::Gad7 => matches!(
                severity,
                Severity::Moderate | Severity::ModeratelySevere | Severity::Severe
            ),
            ClinicalScale::Pss => severity == Severity::High,
            ClinicalScale::Wemwbs => severity == Severity::Low,
        }
    }
}

/// Classify a raw score on the given scale
pub fn classify_severity(scale: ClinicalScale, raw: f64) -> Severity {
    scale.classify(raw)
}

/// Outcome on one clinical scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleScore {
    pub scale: ClinicalScale,
    pub raw_score: f64,
    pub severity: Severity,
    /// Position of `severity` within the scale's ordered bands
    pub band_index: usize,
    pub normalized_score: f64,
}

impl ScaleScore {
    pub fn evaluate(scale: ClinicalScale, raw_score: f64) -> Result<Self, ScaleError> {
        if !raw_score.is_finite() {
            return Err(ScaleError::NonFinite {
                scale,
                value: raw_score,
            });
        }
        let band_index = scale.band_index(raw_score);
        Ok(Self {
            scale,
            raw_score,
            severity: scale.bands()[band_index].severity,
            band_index,
            normalized_score: scale.normalize(raw_score),
        })
    }

    pub fn is_concerning(&self) -> bool {
        self.scale.is_concerning(self.severity)
    }

    pub fn summary(&self) -> ScaleSummary {
        ScaleSummary {
            scale: self.scale.display_name().to_string(),
            severity: self.severity.label().to_string(),
            percent: (self.normalized_score * 100.0).round() as u8,
            concerning: self.is_concerning(),
            description: format!(
                "{} {} ({} score {})",
                capitalize(self.severity.label()),
                self.scale.construct(),
                self.scale.display_name(),
                format_score(self.raw_score)
            ),
        }
    }
}

/// Display-level projection of a scale outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleSummary {
    pub scale: String,
    pub severity: String,
    pub percent: u8,
    pub concerning: bool,
    pub description: String,
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn format_score(raw: f64) -> String {
    if raw.fract() == 0.0 {
        format!("{:.0}", raw)
    } else {
        format!("{:.1}", raw)
    }
}
