//! End-to-end screening flow: stopped recording → upload → analysis → baseline.

use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::capture::AudioArtifact;
use crate::error::{CaptureError, ScreeningError};
use crate::models::{ProcessingStatus, VoiceSample};
use crate::personalization::{BaselineTracker, BaselineUpdate, SampleKind};
use crate::recording::RecordingController;
use crate::risk::AnalysisResult;
use crate::submission::{check_duration, SubmissionClient};

/// Everything produced by one successful screening
#[derive(Debug, Clone, Serialize)]
pub struct ScreeningOutcome {
    pub sample: VoiceSample,
    pub result: AnalysisResult,
    pub baseline: BaselineUpdate,
}

/// Drives a finished recording through submission and baseline tracking
pub struct ScreeningPipeline {
    client: Arc<SubmissionClient>,
    tracker: Arc<BaselineTracker>,
    language_hint: String,
}

impl ScreeningPipeline {
    pub fn new(
        client: Arc<SubmissionClient>,
        tracker: Arc<BaselineTracker>,
        language_hint: impl Into<String>,
    ) -> Self {
        Self {
            client,
            tracker,
            language_hint: language_hint.into(),
        }
    }

    pub fn client(&self) -> &SubmissionClient {
        &self.client
    }

    pub fn tracker(&self) -> &BaselineTracker {
        &self.tracker
    }

    /// Stop the session if needed and submit what it captured
    pub async fn submit_recording(
        &self,
        controller: &RecordingController,
        kind: SampleKind,
    ) -> Result<ScreeningOutcome, ScreeningError> {
        let artifact = controller.stop().await?.ok_or_else(|| {
            CaptureError::InvalidTransition("Session was cancelled, nothing to submit".to_string())
        })?;
        self.submit(&artifact, kind).await
    }

    /// Submit a stopped recording.
    ///
    /// Policy guards run before any network call. Baseline progress only
    /// changes once the analysis has succeeded.
    pub async fn submit(
        &self,
        artifact: &AudioArtifact,
        kind: SampleKind,
    ) -> Result<ScreeningOutcome, ScreeningError> {
        check_duration(artifact.duration_secs, self.client.config())?;
        self.tracker.ensure_daily_allowance()?;

        let sample = self.client.upload(artifact, &self.language_hint).await?;
        self.analyze(sample, kind).await
    }

    /// Analyze an already uploaded sample, e.g. after a timeout
    pub async fn analyze(
        &self,
        mut sample: VoiceSample,
        kind: SampleKind,
    ) -> Result<ScreeningOutcome, ScreeningError> {
        let result = self.client.request_analysis(&sample.sample_id).await?;
        sample.processing_status = ProcessingStatus::Completed;
        let baseline = self
            .tracker
            .record_analysis(kind, result.personalization_score);

        info!(
            "Screening for sample {} finished: {} risk, {}/{} baseline samples",
            sample.sample_id,
            result.overall_risk_level,
            baseline.progress.samples_collected,
            baseline.progress.target_samples
        );

        Ok(ScreeningOutcome {
            sample,
            result,
            baseline,
        })
    }
}
