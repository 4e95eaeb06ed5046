//! Error taxonomy for the screening core.
//!
//! Every failure path ends in one of three discriminated kinds: capture errors
//! (fatal to the current recording session), submission errors (surfaced
//! verbatim from the backend round trip), and policy errors (client-side
//! guards raised before any network call).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Capture lifecycle errors
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum CaptureError {
    #[error("Microphone permission denied")]
    PermissionDenied,
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("Recording failed: {0}")]
    RecordingFailed(String),
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),
}

/// Sample upload and analysis errors
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum SubmissionError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),
    #[error("Analysis timed out")]
    AnalysisTimeout,
    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),
    #[error("Not authorized")]
    Unauthorized,
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

/// Client-side guards checked before any round trip
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum PolicyError {
    #[error("Recording too short: {actual_secs:.1}s (minimum {minimum_secs:.1}s)")]
    DurationTooShort { actual_secs: f64, minimum_secs: f64 },
    #[error("Recording too long: {actual_secs:.1}s (maximum {maximum_secs:.1}s)")]
    DurationTooLong { actual_secs: f64, maximum_secs: f64 },
    #[error("Daily sample limit reached")]
    DailyLimitReached,
}

/// Umbrella error for operations that cross component boundaries
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScreeningError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

impl SubmissionError {
    /// Whether the host app should re-authenticate rather than retry
    pub fn requires_reauth(&self) -> bool {
        matches!(self, SubmissionError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = CaptureError::DeviceUnavailable("no mic".to_string());
        assert!(e.to_string().contains("no mic"));

        let e = SubmissionError::UploadFailed("connection reset".to_string());
        assert!(e.to_string().contains("connection reset"));

        let e = PolicyError::DurationTooShort {
            actual_secs: 12.0,
            minimum_secs: 30.0,
        };
        assert!(e.to_string().contains("12.0"));
        assert!(e.to_string().contains("30.0"));
    }

    #[test]
    fn test_screening_error_preserves_kind() {
        let err: ScreeningError = PolicyError::DailyLimitReached.into();
        assert!(matches!(err, ScreeningError::Policy(PolicyError::DailyLimitReached)));

        let err: ScreeningError = SubmissionError::Unauthorized.into();
        assert_eq!(err.to_string(), "Not authorized");
    }

    #[test]
    fn test_requires_reauth() {
        assert!(SubmissionError::Unauthorized.requires_reauth());
        assert!(!SubmissionError::AnalysisTimeout.requires_reauth());
    }
}
