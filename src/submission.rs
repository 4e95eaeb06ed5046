//! Sample submission: upload, analysis, and status probes.
//!
//! The client owns a stopped recording's audio from the moment the upload
//! succeeds until analysis completes, at which point the local file is
//! removed. Analysis calls for the same sample are serialized; calls for
//! different samples run independently.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::capture::AudioArtifact;
use crate::config::SubmissionConfig;
use crate::error::{PolicyError, ScreeningError, SubmissionError};
use crate::models::{
    AnalysisPayload, AnalyzeResponse, ProcessingStatus, SampleStatus, UploadMetadata, VoiceSample,
};
use crate::risk::{aggregate, AnalysisResult};
use crate::transport::{Transport, TransportError};

const UPLOAD_ENDPOINT: &str = "voice/samples";

fn analyze_endpoint(sample_id: &str) -> String {
    format!("voice/samples/{}/analyze", sample_id)
}

fn status_endpoint(sample_id: &str) -> String {
    format!("voice/samples/{}/status", sample_id)
}

fn analysis_endpoint(sample_id: &str) -> String {
    format!("voice/samples/{}/analysis", sample_id)
}

/// Reject recordings outside the accepted duration window
pub fn check_duration(duration_secs: f64, config: &SubmissionConfig) -> Result<(), PolicyError> {
    let minimum_secs = config.min_duration.as_secs_f64();
    let maximum_secs = config.max_duration.as_secs_f64();
    if duration_secs.is_nan() || duration_secs < minimum_secs {
        return Err(PolicyError::DurationTooShort {
            actual_secs: duration_secs,
            minimum_secs,
        });
    }
    if duration_secs > maximum_secs {
        return Err(PolicyError::DurationTooLong {
            actual_secs: duration_secs,
            maximum_secs,
        });
    }
    Ok(())
}

fn upload_error(err: TransportError) -> SubmissionError {
    match err {
        TransportError::Unauthorized | TransportError::Forbidden(_) => {
            SubmissionError::Unauthorized
        }
        TransportError::Unprocessable(details) => SubmissionError::ValidationFailed(details),
        other => SubmissionError::UploadFailed(other.to_string()),
    }
}

fn analysis_error(err: TransportError) -> SubmissionError {
    match err {
        TransportError::Unauthorized | TransportError::Forbidden(_) => {
            SubmissionError::Unauthorized
        }
        TransportError::Unprocessable(details) => SubmissionError::ValidationFailed(details),
        other => SubmissionError::AnalysisFailed(other.to_string()),
    }
}

/// Failures worth another status probe while the timeout window is open
fn is_transient(err: &TransportError) -> bool {
    matches!(err, TransportError::Server { .. } | TransportError::Network(_))
}

fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, SubmissionError> {
    serde_json::from_value(value)
        .map_err(|e| SubmissionError::AnalysisFailed(format!("Invalid {} response: {}", what, e)))
}

/// Client for the sample upload and analysis endpoints
pub struct SubmissionClient {
    transport: Arc<dyn Transport>,
    config: SubmissionConfig,
    /// Local audio awaiting analysis, keyed by sample id
    owned_artifacts: Mutex<HashMap<String, AudioArtifact>>,
    analysis_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SubmissionClient {
    pub fn new(transport: Arc<dyn Transport>, config: SubmissionConfig) -> Self {
        Self {
            transport,
            config,
            owned_artifacts: Mutex::new(HashMap::new()),
            analysis_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SubmissionConfig {
        &self.config
    }

    /// Upload a stopped recording.
    ///
    /// Duration is checked before any network call. On failure the local file
    /// is left untouched so the caller can retry.
    pub async fn upload(
        &self,
        artifact: &AudioArtifact,
        language_hint: &str,
    ) -> Result<VoiceSample, ScreeningError> {
        check_duration(artifact.duration_secs, &self.config)?;

        let bytes = tokio::fs::read(&artifact.path).await.map_err(|e| {
            SubmissionError::UploadFailed(format!(
                "Failed to read {}: {}",
                artifact.path.display(),
                e
            ))
        })?;

        let metadata = UploadMetadata {
            language_hint: language_hint.to_string(),
            duration_seconds: artifact.duration_secs,
        };
        let receipt = self
            .transport
            .upload_binary(UPLOAD_ENDPOINT, bytes, &metadata)
            .await
            .map_err(upload_error)?;

        if receipt.sample_id.is_empty() {
            return Err(SubmissionError::UploadFailed(
                "Backend returned an empty sample id".to_string(),
            )
            .into());
        }

        if let Some(status) = receipt.status {
            debug!("Backend reports sample {} as {}", receipt.sample_id, status);
        }
        let sample = VoiceSample {
            sample_id: receipt.sample_id,
            duration_seconds: artifact.duration_secs,
            format: artifact.format,
            language_hint: metadata.language_hint,
            processing_status: ProcessingStatus::Uploaded,
            uploaded_at: Utc::now(),
        };
        info!(
            "Uploaded sample {} ({:.1}s, {})",
            sample.sample_id, sample.duration_seconds, sample.language_hint
        );

        if self.config.delete_after_upload {
            if let Err(e) = artifact.delete().await {
                warn!("Audio for sample {} left on disk: {}", sample.sample_id, e);
            }
        } else {
            self.owned_artifacts
                .lock()
                .map_err(|e| SubmissionError::UploadFailed(e.to_string()))?
                .insert(sample.sample_id.clone(), artifact.clone());
        }

        Ok(sample)
    }

    /// Request analysis and wait for the result.
    ///
    /// The whole exchange, including any status polling, is bounded by the
    /// configured analysis timeout. A timed-out sample may be retried with
    /// the same id.
    pub async fn request_analysis(&self, sample_id: &str) -> Result<AnalysisResult, SubmissionError> {
        let lock = self.analysis_lock(sample_id)?;
        let result = {
            let _guard = lock.lock().await;
            match tokio::time::timeout(self.config.analysis_timeout, self.run_analysis(sample_id))
                .await
            {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        "Analysis of sample {} exceeded {:?}",
                        sample_id, self.config.analysis_timeout
                    );
                    Err(SubmissionError::AnalysisTimeout)
                }
            }
        };
        self.release_lock(sample_id, &lock);

        let result = result?;
        self.delete_owned_artifact(sample_id).await;
        info!(
            "Analysis of sample {} complete: risk {}",
            sample_id, result.overall_risk_level
        );
        Ok(result)
    }

    /// Current backend processing status of a sample
    pub async fn get_status(&self, sample_id: &str) -> Result<SampleStatus, SubmissionError> {
        let value = self
            .transport
            .get_json(&status_endpoint(sample_id))
            .await
            .map_err(analysis_error)?;
        decode(value, "status")
    }

    async fn run_analysis(&self, sample_id: &str) -> Result<AnalysisResult, SubmissionError> {
        let body = json!({ "sampleId": sample_id });
        let value = self
            .transport
            .post_json(&analyze_endpoint(sample_id), &body)
            .await
            .map_err(analysis_error)?;
        let response: AnalyzeResponse = decode(value, "analyze")?;

        match response.status {
            ProcessingStatus::Completed => {
                let payload = match response.analysis {
                    Some(payload) => payload,
                    None => self.fetch_analysis(sample_id).await?,
                };
                return compose(payload);
            }
            ProcessingStatus::Failed => {
                return Err(SubmissionError::AnalysisFailed(
                    response
                        .error
                        .unwrap_or_else(|| "Backend reported failure".to_string()),
                ));
            }
            status => debug!("Sample {} {}, polling for completion", sample_id, status),
        }

        loop {
            tokio::time::sleep(self.config.poll_interval).await;
            let value = match self.transport.get_json(&status_endpoint(sample_id)).await {
                Ok(value) => value,
                Err(e) if is_transient(&e) => {
                    warn!("Status probe for sample {} failed, retrying: {}", sample_id, e);
                    continue;
                }
                Err(e) => return Err(analysis_error(e)),
            };
            let status: SampleStatus = decode(value, "status")?;
            match status.processing_status {
                ProcessingStatus::Completed => {
                    let payload = self.fetch_analysis(sample_id).await?;
                    return compose(payload);
                }
                ProcessingStatus::Failed => {
                    return Err(SubmissionError::AnalysisFailed(
                        status
                            .error
                            .unwrap_or_else(|| "Backend reported failure".to_string()),
                    ));
                }
                other => debug!("Sample {} still {}", sample_id, other),
            }
        }
    }

    async fn fetch_analysis(&self, sample_id: &str) -> Result<AnalysisPayload, SubmissionError> {
        let value = self
            .transport
            .get_json(&analysis_endpoint(sample_id))
            .await
            .map_err(analysis_error)?;
        decode(value, "analysis")
    }

    fn analysis_lock(&self, sample_id: &str) -> Result<Arc<tokio::sync::Mutex<()>>, SubmissionError> {
        let mut locks = self
            .analysis_locks
            .lock()
            .map_err(|e| SubmissionError::AnalysisFailed(e.to_string()))?;
        Ok(locks
            .entry(sample_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone())
    }

    /// Drop the per-sample lock once nobody else is waiting on it
    fn release_lock(&self, sample_id: &str, lock: &Arc<tokio::sync::Mutex<()>>) {
        if let Ok(mut locks) = self.analysis_locks.lock() {
            // One reference in the map, one held by the caller
            if Arc::strong_count(lock) <= 2 {
                locks.remove(sample_id);
            }
        }
    }

    async fn delete_owned_artifact(&self, sample_id: &str) {
        let artifact = match self.owned_artifacts.lock() {
            Ok(mut owned) => owned.remove(sample_id),
            Err(e) => {
                warn!("Artifact registry unavailable: {}", e);
                None
            }
        };
        if let Some(artifact) = artifact {
            if let Err(e) = artifact.delete().await {
                warn!("Audio for sample {} left on disk: {}", sample_id, e);
            }
        }
    }

    /// Local audio still held for a sample, if any
    pub fn owned_artifact(&self, sample_id: &str) -> Option<AudioArtifact> {
        self.owned_artifacts
            .lock()
            .ok()
            .and_then(|owned| owned.get(sample_id).cloned())
    }
}

fn compose(payload: AnalysisPayload) -> Result<AnalysisResult, SubmissionError> {
    aggregate(&payload).map_err(|e| SubmissionError::AnalysisFailed(e.to_string()))
}
