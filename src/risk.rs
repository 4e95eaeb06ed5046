//! Composes model probabilities and scale scores into one analysis result.
//!
//! Everything here is pure: identical input yields identical output.

use serde::{Deserialize, Serialize};

use crate::clinical_scales::{ClinicalScale, ScaleError, ScaleScore, ScaleSummary};
use crate::models::AnalysisPayload;

/// Probability above which the overall risk is high
pub const HIGH_RISK_THRESHOLD: f64 = 0.5;
/// Probability above which the overall risk is moderate
pub const MODERATE_RISK_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    /// Only set from an explicit backend signal
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

/// Per-class model output. The heads are independent, so these only
/// approximately sum to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities {
    pub normal: f64,
    pub depression: f64,
    pub anxiety: f64,
    pub stress: f64,
}

impl ClassProbabilities {
    /// Largest of the three condition probabilities. NaN entries are ignored.
    pub fn max_condition(&self) -> f64 {
        [self.depression, self.anxiety, self.stress]
            .into_iter()
            .filter(|p| !p.is_nan())
            .fold(0.0, f64::max)
    }

    /// The condition with the largest probability
    pub fn dominant_condition(&self) -> &'static str {
        let mut dominant = ("depression", self.depression);
        for candidate in [("anxiety", self.anxiety), ("stress", self.stress)] {
            if candidate.1 > dominant.1 {
                dominant = candidate;
            }
        }
        dominant.0
    }
}

/// Overall risk from the condition probabilities; a critical signal overrides.
pub fn overall_risk_level(probabilities: &ClassProbabilities, critical_signal: bool) -> RiskLevel {
    if critical_signal {
        return RiskLevel::Critical;
    }
    let max = probabilities.max_condition();
    if max > HIGH_RISK_THRESHOLD {
        RiskLevel::High
    } else if max > MODERATE_RISK_THRESHOLD {
        RiskLevel::Moderate
    } else {
        RiskLevel::Low
    }
}

/// `normal * 100`, rounded and clamped to 0..=100
pub fn mental_health_score(normal: f64) -> u8 {
    if normal.is_nan() {
        return 0;
    }
    (normal * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Final result for one analyzed sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub probabilities: ClassProbabilities,
    pub mental_health_score: u8,
    pub confidence: f64,
    pub phq9: ScaleScore,
    pub gad7: ScaleScore,
    pub pss: ScaleScore,
    pub wemwbs: ScaleScore,
    pub overall_risk_level: RiskLevel,
    pub interpretations: Vec<String>,
    pub recommendations: Vec<String>,
    /// Supplied by the backend once a personal baseline exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personalization_score: Option<f64>,
}

impl AnalysisResult {
    pub fn scale_scores(&self) -> [&ScaleScore; 4] {
        [&self.phq9, &self.gad7, &self.pss, &self.wemwbs]
    }

    pub fn scale_summaries(&self) -> Vec<ScaleSummary> {
        self.scale_scores().iter().map(|s| s.summary()).collect()
    }
}

/// Build the analysis result from the backend payload
pub fn aggregate(payload: &AnalysisPayload) -> Result<AnalysisResult, ScaleError> {
    let probabilities = ClassProbabilities {
        normal: payload.normal_score,
        depression: payload.depression_score,
        anxiety: payload.anxiety_score,
        stress: payload.stress_score,
    };

    let phq9 = ScaleScore::evaluate(ClinicalScale::Phq9, payload.phq9_score)?;
    let gad7 = ScaleScore::evaluate(ClinicalScale::Gad7, payload.gad7_score)?;
    let pss = ScaleScore::evaluate(ClinicalScale::Pss, payload.pss_score)?;
    let wemwbs = ScaleScore::evaluate(ClinicalScale::Wemwbs, payload.wemwbs_score)?;

    let overall_risk_level = overall_risk_level(&probabilities, payload.critical);
    let scales = [&phq9, &gad7, &pss, &wemwbs];
    let interpretations = interpretations(&probabilities, overall_risk_level, &scales);
    let recommendations = recommendations(overall_risk_level, &scales);

    Ok(AnalysisResult {
        probabilities,
        mental_health_score: mental_health_score(payload.normal_score),
        confidence: if payload.confidence.is_nan() {
            0.0
        } else {
            payload.confidence.clamp(0.0, 1.0)
        },
        interpretations,
        recommendations,
        phq9,
        gad7,
        pss,
        wemwbs,
        overall_risk_level,
        personalization_score: payload.personalization_score,
    })
}

fn interpretations(
    probabilities: &ClassProbabilities,
    risk: RiskLevel,
    scales: &[&ScaleScore],
) -> Vec<String> {
    let mut lines = Vec::new();

    if risk == RiskLevel::Low {
        lines.push("Voice markers are within the typical range.".to_string());
    } else {
        lines.push(format!(
            "Voice markers are most consistent with {} ({:.0}% likelihood).",
            probabilities.dominant_condition(),
            probabilities.max_condition() * 100.0
        ));
    }

    lines.extend(
        scales
            .iter()
            .filter(|s| s.is_concerning())
            .map(|s| s.summary().description),
    );
    lines
}

fn recommendations(risk: RiskLevel, scales: &[&ScaleScore]) -> Vec<String> {
    let mut lines: Vec<String> = match risk {
        RiskLevel::Critical => vec![
            "Contact a crisis line or emergency services now if you feel unsafe.".to_string(),
            "Reach out to your clinician today.".to_string(),
        ],
        RiskLevel::High => vec![
            "Schedule an appointment with a mental health professional.".to_string(),
            "Share these results with your clinician.".to_string(),
        ],
        RiskLevel::Moderate => vec![
            "Keep recording regularly to track changes over time.".to_string(),
            "Consider discussing how you feel with a professional.".to_string(),
        ],
        RiskLevel::Low => vec!["Keep up your current routine and check in again soon.".to_string()],
    };

    if scales
        .iter()
        .any(|s| s.scale == ClinicalScale::Pss && s.is_concerning())
    {
        lines.push("Try stress-reduction practices such as breathing exercises or regular breaks.".to_string());
    }
    if scales
        .iter()
        .any(|s| s.scale == ClinicalScale::Wemwbs && s.is_concerning())
    {
        lines.push("Plan small activities that support sleep, movement and social contact.".to_string());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clinical_scales::Severity;
    use proptest::prelude::*;

    fn payload(normal: f64, depression: f64, anxiety: f64, stress: f64) -> AnalysisPayload {
        AnalysisPayload {
            normal_score: normal,
            depression_score: depression,
            anxiety_score: anxiety,
            stress_score: stress,
            confidence: 0.8,
            phq9_score: 4.0,
            gad7_score: 3.0,
            pss_score: 10.0,
            wemwbs_score: 52.0,
            critical: false,
            personalization_score: None,
        }
    }

    fn probs(depression: f64, anxiety: f64, stress: f64) -> ClassProbabilities {
        ClassProbabilities {
            normal: 0.0,
            depression,
            anxiety,
            stress,
        }
    }

    #[test]
    fn test_risk_thresholds() {
        assert_eq!(overall_risk_level(&probs(0.1, 0.1, 0.1), false), RiskLevel::Low);
        assert_eq!(overall_risk_level(&probs(0.3, 0.0, 0.0), false), RiskLevel::Low);
        assert_eq!(overall_risk_level(&probs(0.31, 0.0, 0.0), false), RiskLevel::Moderate);
        assert_eq!(overall_risk_level(&probs(0.5, 0.0, 0.0), false), RiskLevel::Moderate);
        assert_eq!(overall_risk_level(&probs(0.51, 0.0, 0.0), false), RiskLevel::High);
    }

    #[test]
    fn test_critical_overrides() {
        assert_eq!(overall_risk_level(&probs(0.0, 0.0, 0.0), true), RiskLevel::Critical);
        assert_eq!(overall_risk_level(&probs(0.9, 0.0, 0.0), true), RiskLevel::Critical);
    }

    #[test]
    fn test_mental_health_score() {
        assert_eq!(mental_health_score(0.2), 20);
        assert_eq!(mental_health_score(0.856), 86);
        assert_eq!(mental_health_score(0.0), 0);
        assert_eq!(mental_health_score(1.0), 100);
        assert_eq!(mental_health_score(1.4), 100);
        assert_eq!(mental_health_score(-0.3), 0);
        assert_eq!(mental_health_score(f64::NAN), 0);
    }

    #[test]
    fn test_aggregate_high_risk() {
        let result = aggregate(&payload(0.2, 0.6, 0.1, 0.1)).unwrap();
        assert_eq!(result.overall_risk_level, RiskLevel::High);
        assert_eq!(result.mental_health_score, 20);
        assert_eq!(result.phq9.severity, Severity::Minimal);
        assert!(result.interpretations[0].contains("depression"));
        assert!(!result.recommendations.is_empty());
    }

    #[test]
    fn test_aggregate_low_risk_has_typical_interpretation() {
        let result = aggregate(&payload(0.9, 0.05, 0.1, 0.2)).unwrap();
        assert_eq!(result.overall_risk_level, RiskLevel::Low);
        assert_eq!(result.interpretations.len(), 1);
        assert!(result.interpretations[0].contains("typical"));
    }

    #[test]
    fn test_aggregate_lists_concerning_scales() {
        let mut p = payload(0.4, 0.2, 0.45, 0.3);
        p.gad7_score = 12.0;
        p.pss_score = 30.0;
        p.wemwbs_score = 20.0;
        let result = aggregate(&p).unwrap();

        assert_eq!(result.overall_risk_level, RiskLevel::Moderate);
        // dominant condition + GAD-7 + PSS + WEMWBS
        assert_eq!(result.interpretations.len(), 4);
        assert!(result.interpretations[0].contains("anxiety"));
        assert!(result.recommendations.iter().any(|r| r.contains("stress-reduction")));
        assert!(result.recommendations.iter().any(|r| r.contains("sleep")));
    }

    #[test]
    fn test_aggregate_rejects_non_finite_scale() {
        let mut p = payload(0.5, 0.1, 0.1, 0.1);
        p.pss_score = f64::NAN;
        assert!(aggregate(&p).is_err());
    }

    #[test]
    fn test_scales_are_independent() {
        let mut a = payload(0.5, 0.1, 0.1, 0.1);
        a.phq9_score = 22.0;
        let mut b = a.clone();
        b.gad7_score = 18.0;
        b.wemwbs_score = 65.0;

        let ra = aggregate(&a).unwrap();
        let rb = aggregate(&b).unwrap();
        assert_eq!(ra.phq9, rb.phq9);
        assert_eq!(ra.pss, rb.pss);
        assert_ne!(ra.gad7, rb.gad7);
    }

    #[test]
    fn test_critical_payload() {
        let mut p = payload(0.8, 0.05, 0.05, 0.05);
        p.critical = true;
        let result = aggregate(&p).unwrap();
        assert_eq!(result.overall_risk_level, RiskLevel::Critical);
        assert!(result.recommendations[0].contains("crisis"));
    }

    proptest! {
        #[test]
        fn prop_risk_is_symmetric(max in 0.0f64..=1.0, x in 0.0f64..=1.0, y in 0.0f64..=1.0) {
            let x = x * max;
            let y = y * max;
            let expected = overall_risk_level(&probs(max, x, y), false);
            prop_assert_eq!(overall_risk_level(&probs(x, max, y), false), expected);
            prop_assert_eq!(overall_risk_level(&probs(x, y, max), false), expected);
            prop_assert_eq!(overall_risk_level(&probs(y, x, max), false), expected);
        }

        #[test]
        fn prop_mental_health_score_is_deterministic(normal in -1.0f64..2.0) {
            let first = mental_health_score(normal);
            prop_assert_eq!(first, mental_health_score(normal));
            prop_assert!(first <= 100);
        }
    }
}
