//! Backend wire types and the durable sample record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capture::AudioFormat;

/// Backend-side lifecycle of an uploaded sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Uploaded,
    Queued,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Failed)
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcessingStatus::Uploaded => "uploaded",
            ProcessingStatus::Queued => "queued",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// A recording once the backend has accepted it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSample {
    pub sample_id: String,
    pub duration_seconds: f64,
    pub format: AudioFormat,
    pub language_hint: String,
    pub processing_status: ProcessingStatus,
    pub uploaded_at: DateTime<Utc>,
}

/// JSON sidecar sent with the audio payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    pub language_hint: String,
    pub duration_seconds: f64,
}

/// Upload endpoint response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub sample_id: String,
    #[serde(default)]
    pub status: Option<ProcessingStatus>,
}

/// Raw model output and clinical scale scores for one sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisPayload {
    pub normal_score: f64,
    pub depression_score: f64,
    pub anxiety_score: f64,
    pub stress_score: f64,
    pub confidence: f64,
    pub phq9_score: f64,
    pub gad7_score: f64,
    pub pss_score: f64,
    pub wemwbs_score: f64,
    /// Explicit escalation signal from the backend
    #[serde(default)]
    pub critical: bool,
    #[serde(default)]
    pub personalization_score: Option<f64>,
}

/// Analyze endpoint response. Blocking backends answer `completed` with the
/// analysis inline; asynchronous ones answer `queued`/`processing`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub status: ProcessingStatus,
    #[serde(default)]
    pub analysis: Option<AnalysisPayload>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Status probe response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleStatus {
    #[serde(rename = "status")]
    pub processing_status: ProcessingStatus,
    #[serde(default)]
    pub quality_score: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}
