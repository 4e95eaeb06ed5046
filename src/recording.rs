//! Recording session lifecycle.
//!
//! One [`RecordingController`] owns exactly one session:
//! `Idle → Recording ⇄ Paused → Stopped`, or `Recording|Paused → Cancelled`.
//! Stopped and Cancelled are terminal; recording again means constructing a new
//! controller.
//!
//! While recording, two background tasks run: a level meter that polls the
//! device for its input level, and a duration tick that advances the elapsed
//! time and stops the session once the maximum duration is reached. Every
//! state transition, including that auto-stop, happens under the session mutex,
//! so the first writer wins and later calls observe the terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::capture::{
    normalize_level, AudioArtifact, AudioCaptureDevice, CaptureHandle, PermissionStatus,
    TARGET_FORMAT,
};
use crate::config::RecordingConfig;
use crate::error::CaptureError;

/// Recording lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    Idle,
    Recording,
    Paused,
    Stopped,
    Cancelled,
}

impl RecordingState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecordingState::Stopped | RecordingState::Cancelled)
    }
}

/// Observable view of a recording session, published on every change
#[derive(Debug, Clone, Serialize)]
pub struct RecordingSnapshot {
    pub id: Uuid,
    pub state: RecordingState,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed: Duration,
    pub audio_level: f32,
    pub artifact: Option<AudioArtifact>,
    pub error: Option<CaptureError>,
    pub remaining: Duration,
    pub completion: f64,
    pub is_valid_for_submission: bool,
}

/// Whether a recording of `elapsed` length may be submitted
pub fn is_valid_for_submission(elapsed: Duration, minimum: Duration) -> bool {
    elapsed >= minimum
}

/// Time still needed before the recording becomes valid
pub fn remaining_time(elapsed: Duration, minimum: Duration) -> Duration {
    minimum.saturating_sub(elapsed)
}

/// Progress towards the minimum duration, in [0, 1]
pub fn completion_fraction(elapsed: Duration, minimum: Duration) -> f64 {
    if minimum.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f64() / minimum.as_secs_f64()).min(1.0)
}

struct Tickers {
    stop_flag: Arc<AtomicBool>,
    _meter: JoinHandle<()>,
    _duration: JoinHandle<()>,
}

impl Tickers {
    /// Tasks observe the flag on their next tick and exit on their own.
    fn halt(self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }
}

struct SessionInner {
    state: RecordingState,
    started_at: Option<DateTime<Utc>>,
    accumulated: Duration,
    resumed_at: Option<Instant>,
    elapsed: Duration,
    handle: Option<CaptureHandle>,
    artifact: Option<AudioArtifact>,
    error: Option<CaptureError>,
    tickers: Option<Tickers>,
}

impl SessionInner {
    fn new() -> Self {
        Self {
            state: RecordingState::Idle,
            started_at: None,
            accumulated: Duration::ZERO,
            resumed_at: None,
            elapsed: Duration::ZERO,
            handle: None,
            artifact: None,
            error: None,
            tickers: None,
        }
    }

    fn refresh_elapsed(&mut self) {
        if let Some(resumed_at) = self.resumed_at {
            let elapsed = self.accumulated + resumed_at.elapsed();
            if elapsed > self.elapsed {
                self.elapsed = elapsed;
            }
        }
    }

    fn freeze_elapsed(&mut self) {
        self.refresh_elapsed();
        self.accumulated = self.elapsed;
        self.resumed_at = None;
    }

    fn halt_tickers(&mut self) {
        if let Some(tickers) = self.tickers.take() {
            tickers.halt();
        }
    }
}

struct Shared {
    id: Uuid,
    device: Arc<dyn AudioCaptureDevice>,
    config: RecordingConfig,
    inner: Mutex<SessionInner>,
    /// Set when the owning controller is dropped
    closed: AtomicBool,
    level_bits: AtomicU32,
    snapshot_tx: watch::Sender<RecordingSnapshot>,
}

impl Shared {
    fn level(&self) -> f32 {
        f32::from_bits(self.level_bits.load(Ordering::Relaxed))
    }

    fn set_level(&self, level: f32) {
        self.level_bits.store(level.to_bits(), Ordering::Relaxed);
    }

    fn snapshot(&self, inner: &SessionInner) -> RecordingSnapshot {
        let minimum = self.config.min_duration;
        RecordingSnapshot {
            id: self.id,
            state: inner.state,
            started_at: inner.started_at,
            elapsed: inner.elapsed,
            audio_level: self.level(),
            artifact: inner.artifact.clone(),
            error: inner.error.clone(),
            remaining: remaining_time(inner.elapsed, minimum),
            completion: completion_fraction(inner.elapsed, minimum),
            is_valid_for_submission: is_valid_for_submission(inner.elapsed, minimum),
        }
    }

    fn publish(&self, inner: &SessionInner) {
        self.snapshot_tx.send_replace(self.snapshot(inner));
    }

    fn should_exit(&self, stop_flag: &AtomicBool) -> bool {
        stop_flag.load(Ordering::SeqCst) || self.closed.load(Ordering::SeqCst)
    }

    /// Start both periodic tasks. `accumulated` is the recording time already
    /// banked, so the duration task can wake exactly at the maximum.
    fn spawn_tickers(self: &Arc<Self>, handle: CaptureHandle, accumulated: Duration) -> Tickers {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let deadline = Instant::now() + self.config.max_duration.saturating_sub(accumulated);
        let meter = tokio::spawn(run_level_meter(self.clone(), handle, stop_flag.clone()));
        let duration = tokio::spawn(run_duration_tick(self.clone(), stop_flag.clone(), deadline));
        Tickers {
            stop_flag,
            _meter: meter,
            _duration: duration,
        }
    }

    /// Finalize an active (Recording or Paused) session into Stopped.
    ///
    /// Recorded time never exceeds the maximum duration, even when the stop
    /// lands a few milliseconds late.
    async fn finish(&self, inner: &mut SessionInner) -> Result<AudioArtifact, CaptureError> {
        inner.halt_tickers();
        inner.freeze_elapsed();
        inner.elapsed = inner.elapsed.min(self.config.max_duration);
        inner.accumulated = inner.elapsed;
        self.set_level(0.0);

        let Some(handle) = inner.handle.take() else {
            let err = CaptureError::RecordingFailed("No active capture handle".to_string());
            inner.state = RecordingState::Stopped;
            inner.error = Some(err.clone());
            self.publish(inner);
            return Err(err);
        };

        let result = self.device.stop(&handle).await;
        inner.state = RecordingState::Stopped;
        match result {
            Ok(mut artifact) => {
                artifact.duration_secs = artifact
                    .duration_secs
                    .min(self.config.max_duration.as_secs_f64());
                info!(
                    "Session {} stopped after {:.1}s, artifact {:?}",
                    self.id,
                    inner.elapsed.as_secs_f64(),
                    artifact.path
                );
                inner.artifact = Some(artifact.clone());
                self.publish(inner);
                Ok(artifact)
            }
            Err(e) => {
                error!("Session {} failed to finalize audio: {}", self.id, e);
                inner.error = Some(e.clone());
                self.publish(inner);
                Err(e)
            }
        }
    }

    /// Device-level failure: stop, keep whatever audio exists, never submit it.
    async fn fail(&self, inner: &mut SessionInner, cause: CaptureError) {
        error!("Session {} recording failed: {}", self.id, cause);
        inner.halt_tickers();
        inner.freeze_elapsed();
        self.set_level(0.0);

        if let Some(handle) = inner.handle.take() {
            match self.device.stop(&handle).await {
                Ok(artifact) => {
                    info!("Preserved partial artifact {:?} for recovery", artifact.path);
                    inner.artifact = Some(artifact);
                }
                Err(e) => warn!("No partial artifact recovered: {}", e),
            }
        }

        inner.state = RecordingState::Stopped;
        inner.error = Some(match cause {
            CaptureError::RecordingFailed(_) => cause,
            other => CaptureError::RecordingFailed(other.to_string()),
        });
        self.publish(inner);
    }
}

impl Shared {
    /// Drop an active capture without finalizing it → Cancelled.
    async fn abandon(&self, inner: &mut SessionInner) {
        inner.halt_tickers();
        inner.freeze_elapsed();
        self.set_level(0.0);

        if let Some(handle) = inner.handle.take() {
            if let Err(e) = self.device.discard(&handle).await {
                warn!("Failed to discard capture for session {}: {}", self.id, e);
            }
        }

        inner.artifact = None;
        inner.state = RecordingState::Cancelled;
        self.publish(inner);
    }
}

async fn run_level_meter(shared: Arc<Shared>, handle: CaptureHandle, stop_flag: Arc<AtomicBool>) {
    let mut interval = tokio::time::interval(shared.config.meter_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        if shared.should_exit(&stop_flag) {
            break;
        }

        match shared.device.current_level(&handle) {
            Ok(db) => {
                let level = normalize_level(db);
                shared.set_level(level);
                shared.snapshot_tx.send_if_modified(|snapshot| {
                    if snapshot.state == RecordingState::Recording {
                        snapshot.audio_level = level;
                        true
                    } else {
                        false
                    }
                });
            }
            Err(e) => {
                let mut inner = shared.inner.lock().await;
                if !shared.should_exit(&stop_flag) && inner.state == RecordingState::Recording {
                    shared.fail(&mut inner, e).await;
                }
                break;
            }
        }
    }
    debug!("Level meter for session {} exited", shared.id);
}

async fn run_duration_tick(shared: Arc<Shared>, stop_flag: Arc<AtomicBool>, deadline: Instant) {
    let mut interval = tokio::time::interval(shared.config.duration_tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let at_deadline = tokio::select! {
            _ = interval.tick() => false,
            _ = tokio::time::sleep_until(deadline) => true,
        };
        if shared.should_exit(&stop_flag) {
            break;
        }

        let mut inner = shared.inner.lock().await;
        if shared.should_exit(&stop_flag) || inner.state != RecordingState::Recording {
            break;
        }

        inner.refresh_elapsed();
        if at_deadline || inner.elapsed >= shared.config.max_duration {
            info!(
                "Session {} reached maximum duration ({:.0}s), stopping",
                shared.id,
                shared.config.max_duration.as_secs_f64()
            );
            if let Err(e) = shared.finish(&mut inner).await {
                warn!("Auto-stop for session {} failed: {}", shared.id, e);
            }
            break;
        }
        shared.publish(&inner);
    }
    debug!("Duration tick for session {} exited", shared.id);
}

/// Drives one recording session against an injected capture device
pub struct RecordingController {
    shared: Arc<Shared>,
}

impl RecordingController {
    pub fn new(device: Arc<dyn AudioCaptureDevice>, config: RecordingConfig) -> Self {
        let id = Uuid::new_v4();
        let inner = SessionInner::new();
        let initial = RecordingSnapshot {
            id,
            state: inner.state,
            started_at: None,
            elapsed: Duration::ZERO,
            audio_level: 0.0,
            artifact: None,
            error: None,
            remaining: config.min_duration,
            completion: completion_fraction(Duration::ZERO, config.min_duration),
            is_valid_for_submission: false,
        };
        let (snapshot_tx, _) = watch::channel(initial);

        Self {
            shared: Arc::new(Shared {
                id,
                device,
                config,
                inner: Mutex::new(inner),
                closed: AtomicBool::new(false),
                level_bits: AtomicU32::new(0.0f32.to_bits()),
                snapshot_tx,
            }),
        }
    }

    /// Session ID (for log correlation)
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Latest published state, without waiting on the session lock
    pub fn snapshot(&self) -> RecordingSnapshot {
        self.shared.snapshot_tx.borrow().clone()
    }

    pub fn state(&self) -> RecordingState {
        self.shared.snapshot_tx.borrow().state
    }

    /// Receive a new snapshot on every state, duration or level change
    pub fn subscribe(&self) -> watch::Receiver<RecordingSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    /// Audio kept after a device failure, for manual recovery only
    pub fn recovered_artifact(&self) -> Option<AudioArtifact> {
        let snapshot = self.shared.snapshot_tx.borrow();
        match (&snapshot.error, &snapshot.artifact) {
            (Some(_), Some(artifact)) => Some(artifact.clone()),
            _ => None,
        }
    }

    async fn ensure_permission(&self) -> Result<(), CaptureError> {
        let status = self.shared.device.permission_status();
        if status == PermissionStatus::Granted {
            return Ok(());
        }

        info!("Microphone permission is {}, requesting", status);
        if self.shared.device.request_permission().await {
            info!("Microphone permission granted");
            Ok(())
        } else {
            warn!("Microphone permission refused");
            Err(CaptureError::PermissionDenied)
        }
    }

    /// Begin capturing. Only valid from Idle.
    pub async fn start(&self) -> Result<(), CaptureError> {
        let mut inner = self.shared.inner.lock().await;
        if inner.state != RecordingState::Idle {
            return Err(CaptureError::InvalidTransition(format!(
                "Cannot start from state {:?}",
                inner.state
            )));
        }

        self.ensure_permission().await?;

        let handle = self.shared.device.start(TARGET_FORMAT).await.map_err(|e| {
            warn!("Failed to start capture for session {}: {}", self.shared.id, e);
            e
        })?;

        info!("Session {} transitioning to Recording", self.shared.id);
        inner.state = RecordingState::Recording;
        inner.started_at = Some(Utc::now());
        inner.accumulated = Duration::ZERO;
        inner.elapsed = Duration::ZERO;
        inner.resumed_at = Some(Instant::now());
        inner.error = None;
        inner.tickers = Some(self.shared.spawn_tickers(handle.clone(), Duration::ZERO));
        inner.handle = Some(handle);
        self.shared.publish(&inner);
        Ok(())
    }

    /// Suspend capture and freeze the elapsed time. Only valid from Recording.
    pub async fn pause(&self) -> Result<(), CaptureError> {
        let mut inner = self.shared.inner.lock().await;
        if inner.state != RecordingState::Recording {
            return Err(CaptureError::InvalidTransition(format!(
                "Cannot pause from state {:?}",
                inner.state
            )));
        }

        inner.halt_tickers();
        inner.freeze_elapsed();

        if let Some(handle) = inner.handle.clone() {
            if let Err(e) = self.shared.device.pause(&handle).await {
                self.shared.fail(&mut inner, e).await;
                return Err(inner
                    .error
                    .clone()
                    .unwrap_or_else(|| CaptureError::RecordingFailed("pause failed".to_string())));
            }
        }

        info!(
            "Session {} paused at {:.1}s",
            self.shared.id,
            inner.elapsed.as_secs_f64()
        );
        inner.state = RecordingState::Paused;
        self.shared.set_level(0.0);
        self.shared.publish(&inner);
        Ok(())
    }

    /// Continue a paused capture without resetting elapsed time.
    pub async fn resume(&self) -> Result<(), CaptureError> {
        let mut inner = self.shared.inner.lock().await;
        if inner.state != RecordingState::Paused {
            return Err(CaptureError::InvalidTransition(format!(
                "Cannot resume from state {:?}",
                inner.state
            )));
        }

        let Some(handle) = inner.handle.clone() else {
            let cause = CaptureError::RecordingFailed("No active capture handle".to_string());
            self.shared.fail(&mut inner, cause.clone()).await;
            return Err(cause);
        };

        if let Err(e) = self.shared.device.resume(&handle).await {
            self.shared.fail(&mut inner, e).await;
            return Err(inner
                .error
                .clone()
                .unwrap_or_else(|| CaptureError::RecordingFailed("resume failed".to_string())));
        }

        info!("Session {} resumed", self.shared.id);
        inner.state = RecordingState::Recording;
        inner.resumed_at = Some(Instant::now());
        let accumulated = inner.accumulated;
        inner.tickers = Some(self.shared.spawn_tickers(handle, accumulated));
        self.shared.publish(&inner);
        Ok(())
    }

    /// Finalize the recording and return its artifact.
    ///
    /// Repeated calls after Stopped return the same artifact. A stop after
    /// cancel returns `Ok(None)`. A session that stopped because of a device
    /// failure reports that failure.
    pub async fn stop(&self) -> Result<Option<AudioArtifact>, CaptureError> {
        let mut inner = self.shared.inner.lock().await;
        match inner.state {
            RecordingState::Idle => Err(CaptureError::InvalidTransition(
                "Cannot stop from state Idle".to_string(),
            )),
            RecordingState::Recording | RecordingState::Paused => {
                info!("Session {} transitioning to Stopped", self.shared.id);
                self.shared.finish(&mut inner).await.map(Some)
            }
            RecordingState::Stopped => match &inner.error {
                Some(e) => Err(e.clone()),
                None => Ok(inner.artifact.clone()),
            },
            RecordingState::Cancelled => Ok(None),
        }
    }

    /// Abandon the recording and delete any captured audio.
    pub async fn cancel(&self) -> Result<(), CaptureError> {
        let mut inner = self.shared.inner.lock().await;
        match inner.state {
            RecordingState::Idle => Err(CaptureError::InvalidTransition(
                "Cannot cancel from state Idle".to_string(),
            )),
            RecordingState::Recording | RecordingState::Paused => {
                info!("Session {} transitioning to Cancelled", self.shared.id);
                self.shared.abandon(&mut inner).await;
                Ok(())
            }
            RecordingState::Stopped | RecordingState::Cancelled => {
                debug!("Cancel ignored, session {} already {:?}", self.shared.id, inner.state);
                Ok(())
            }
        }
    }
}

/// A session dropped mid-recording is abandoned like `cancel()`.
impl Drop for RecordingController {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);

        let state = self.shared.snapshot_tx.borrow().state;
        if matches!(state, RecordingState::Idle) || state.is_terminal() {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                "Session {} dropped outside a runtime, capture not discarded",
                self.shared.id
            );
            return;
        };

        let shared = self.shared.clone();
        runtime.spawn(async move {
            let mut inner = shared.inner.lock().await;
            if matches!(inner.state, RecordingState::Recording | RecordingState::Paused) {
                info!("Session {} dropped while {:?}, discarding", shared.id, inner.state);
                shared.abandon(&mut inner).await;
            }
        });
    }
}
