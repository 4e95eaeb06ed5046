//! Voice screening core: capture lifecycle, sample submission, clinical
//! scale scoring, risk aggregation and personal baseline tracking.
//!
//! Platform audio capture and the analysis backend are injected through the
//! [`capture::AudioCaptureDevice`] and [`transport::Transport`] traits.

pub mod capture;
pub mod clinical_scales;
pub mod config;
pub mod error;
pub mod models;
pub mod personalization;
pub mod pipeline;
pub mod recording;
pub mod risk;
pub mod submission;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use capture::{AudioArtifact, AudioCaptureDevice, AudioFormat, PermissionStatus};
pub use clinical_scales::{ClinicalScale, ScaleScore, ScaleSummary, Severity};
pub use config::ScreeningConfig;
pub use error::{CaptureError, PolicyError, ScreeningError, SubmissionError};
pub use personalization::{BaselineProgress, BaselineTracker, SampleKind};
pub use pipeline::{ScreeningOutcome, ScreeningPipeline};
pub use recording::{RecordingController, RecordingSnapshot, RecordingState};
pub use risk::{AnalysisResult, RiskLevel};
pub use submission::SubmissionClient;
pub use transport::{HttpTransport, Transport};
