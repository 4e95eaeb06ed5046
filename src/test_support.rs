//! In-memory collaborators shared by unit tests.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;

use crate::capture::{
    AudioArtifact, AudioCaptureDevice, AudioFormat, CaptureHandle, PermissionStatus,
};
use crate::error::CaptureError;
use crate::models::{UploadMetadata, UploadReceipt};
use crate::transport::{Transport, TransportError};

#[derive(Default)]
struct DeviceState {
    permission: Option<PermissionStatus>,
    grant_on_request: bool,
    start_error: Option<CaptureError>,
    level_error: Option<CaptureError>,
    level_db: f32,
    accumulated: Duration,
    running_since: Option<Instant>,
}

/// Scriptable microphone that writes a placeholder file on stop
pub struct MockDevice {
    dir: TempDir,
    state: Mutex<DeviceState>,
    permission_requests: AtomicUsize,
    starts: AtomicUsize,
    stops: AtomicUsize,
    discards: AtomicUsize,
}

impl MockDevice {
    fn with_permission(permission: PermissionStatus, grant_on_request: bool) -> Arc<Self> {
        Arc::new(Self {
            dir: tempfile::tempdir().unwrap(),
            state: Mutex::new(DeviceState {
                permission: Some(permission),
                grant_on_request,
                level_db: -20.0,
                ..Default::default()
            }),
            permission_requests: AtomicUsize::new(0),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            discards: AtomicUsize::new(0),
        })
    }

    pub fn granted() -> Arc<Self> {
        Self::with_permission(PermissionStatus::Granted, true)
    }

    pub fn undetermined(grant: bool) -> Arc<Self> {
        Self::with_permission(PermissionStatus::NotDetermined, grant)
    }

    pub fn fail_start(&self, error: CaptureError) {
        self.state.lock().unwrap().start_error = Some(error);
    }

    pub fn set_level_db(&self, db: f32) {
        self.state.lock().unwrap().level_db = db;
    }

    pub fn fail_level(&self, error: CaptureError) {
        self.state.lock().unwrap().level_error = Some(error);
    }

    pub fn permission_requests(&self) -> usize {
        self.permission_requests.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn discards(&self) -> usize {
        self.discards.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioCaptureDevice for MockDevice {
    fn permission_status(&self) -> PermissionStatus {
        self.state
            .lock()
            .unwrap()
            .permission
            .unwrap_or(PermissionStatus::NotDetermined)
    }

    async fn request_permission(&self) -> bool {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let granted = state.grant_on_request;
        state.permission = Some(if granted {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        });
        granted
    }

    async fn start(&self, _format: AudioFormat) -> Result<CaptureHandle, CaptureError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.start_error.clone() {
            return Err(err);
        }
        let n = self.starts.fetch_add(1, Ordering::SeqCst);
        state.accumulated = Duration::ZERO;
        state.running_since = Some(Instant::now());
        Ok(CaptureHandle(format!("mock-{}", n)))
    }

    async fn pause(&self, _handle: &CaptureHandle) -> Result<(), CaptureError> {
        let mut state = self.state.lock().unwrap();
        if let Some(since) = state.running_since.take() {
            state.accumulated += since.elapsed();
        }
        Ok(())
    }

    async fn resume(&self, _handle: &CaptureHandle) -> Result<(), CaptureError> {
        let mut state = self.state.lock().unwrap();
        state.running_since = Some(Instant::now());
        Ok(())
    }

    async fn stop(&self, handle: &CaptureHandle) -> Result<AudioArtifact, CaptureError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        let duration = {
            let mut state = self.state.lock().unwrap();
            if let Some(since) = state.running_since.take() {
                state.accumulated += since.elapsed();
            }
            state.accumulated
        };
        let path = self.dir.path().join(format!("{}.wav", handle.0));
        std::fs::write(&path, b"RIFF-mock-audio")
            .map_err(|e| CaptureError::EncodingFailed(e.to_string()))?;
        Ok(AudioArtifact::new(path, duration.as_secs_f64()))
    }

    fn current_level(&self, _handle: &CaptureHandle) -> Result<f32, CaptureError> {
        let state = self.state.lock().unwrap();
        match &state.level_error {
            Some(err) => Err(err.clone()),
            None => Ok(state.level_db),
        }
    }

    async fn discard(&self, _handle: &CaptureHandle) -> Result<(), CaptureError> {
        self.discards.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap().running_since = None;
        Ok(())
    }
}

/// Write a placeholder audio file and describe it as an artifact
pub fn artifact_in(dir: &TempDir, name: &str, duration_secs: f64) -> AudioArtifact {
    let path = dir.path().join(name);
    std::fs::write(&path, b"RIFF-mock-audio").unwrap();
    AudioArtifact::new(path, duration_secs)
}

/// Backend payload for a completed analysis
pub fn analysis_json(normal: f64, depression: f64, anxiety: f64, stress: f64) -> Value {
    json!({
        "normalScore": normal,
        "depressionScore": depression,
        "anxietyScore": anxiety,
        "stressScore": stress,
        "confidence": 0.85,
        "phq9Score": 14,
        "gad7Score": 6,
        "pssScore": 20,
        "wemwbsScore": 41
    })
}

#[derive(Default)]
struct Script {
    uploads: VecDeque<Result<UploadReceipt, TransportError>>,
    posts: VecDeque<Result<Value, TransportError>>,
    gets: VecDeque<Result<Value, TransportError>>,
    get_fallback: Option<Value>,
    post_delay: Option<Duration>,
    endpoints: Vec<String>,
    metadata: Vec<UploadMetadata>,
    uploaded_bytes: usize,
}

/// Scripted backend. Responses are consumed in order per verb.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<Script>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_upload(&self, result: Result<UploadReceipt, TransportError>) {
        self.script.lock().unwrap().uploads.push_back(result);
    }

    pub fn accept_upload(&self, sample_id: &str) {
        self.push_upload(Ok(UploadReceipt {
            sample_id: sample_id.to_string(),
            status: None,
        }));
    }

    pub fn push_post(&self, result: Result<Value, TransportError>) {
        self.script.lock().unwrap().posts.push_back(result);
    }

    pub fn push_get(&self, result: Result<Value, TransportError>) {
        self.script.lock().unwrap().gets.push_back(result);
    }

    /// Answer every unscripted GET with this body
    pub fn set_get_fallback(&self, body: Value) {
        self.script.lock().unwrap().get_fallback = Some(body);
    }

    pub fn set_post_delay(&self, delay: Duration) {
        self.script.lock().unwrap().post_delay = Some(delay);
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.script.lock().unwrap().endpoints.clone()
    }

    pub fn uploads(&self) -> Vec<UploadMetadata> {
        self.script.lock().unwrap().metadata.clone()
    }

    pub fn uploaded_bytes(&self) -> usize {
        self.script.lock().unwrap().uploaded_bytes
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn upload_binary(
        &self,
        endpoint: &str,
        bytes: Vec<u8>,
        metadata: &UploadMetadata,
    ) -> Result<UploadReceipt, TransportError> {
        let mut script = self.script.lock().unwrap();
        script.endpoints.push(endpoint.to_string());
        script.metadata.push(metadata.clone());
        script.uploaded_bytes += bytes.len();
        script
            .uploads
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Network("no scripted upload".to_string())))
    }

    async fn post_json(&self, endpoint: &str, _body: &Value) -> Result<Value, TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let (delay, result) = {
            let mut script = self.script.lock().unwrap();
            script.endpoints.push(endpoint.to_string());
            let result = script
                .posts
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Network("no scripted post".to_string())));
            (script.post_delay, result)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn get_json(&self, endpoint: &str) -> Result<Value, TransportError> {
        let mut script = self.script.lock().unwrap();
        script.endpoints.push(endpoint.to_string());
        if let Some(result) = script.gets.pop_front() {
            return result;
        }
        match &script.get_fallback {
            Some(body) => Ok(body.clone()),
            None => Err(TransportError::Network("no scripted get".to_string())),
        }
    }
}
