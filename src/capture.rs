//! Audio capture collaborator interface.
//!
//! The native capture device and its permission system live outside the core.
//! Platform bindings implement [`AudioCaptureDevice`]; the recording controller
//! only ever talks to this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::CaptureError;

/// Lower end of the metering range, mapped to level 0.0
pub const METER_FLOOR_DB: f32 = -60.0;

/// PCM format requested from the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

/// Mono, 16 kHz, 16-bit PCM. The remote analysis model expects exactly this.
pub const TARGET_FORMAT: AudioFormat = AudioFormat {
    sample_rate: 16000,
    channels: 1,
    bits_per_sample: 16,
};

/// Microphone authorization status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    /// User has granted microphone access
    Granted,
    /// User has denied microphone access
    Denied,
    /// User has not yet been asked for permission
    NotDetermined,
    /// Access is restricted by policy (e.g., parental controls)
    Restricted,
}

impl std::fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionStatus::Granted => write!(f, "granted"),
            PermissionStatus::Denied => write!(f, "denied"),
            PermissionStatus::NotDetermined => write!(f, "not determined"),
            PermissionStatus::Restricted => write!(f, "restricted"),
        }
    }
}

/// Opaque device-side identifier for one active capture
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CaptureHandle(pub String);

/// Captured audio produced by one recording session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioArtifact {
    pub path: PathBuf,
    pub duration_secs: f64,
    pub format: AudioFormat,
}

impl AudioArtifact {
    pub fn new(path: impl Into<PathBuf>, duration_secs: f64) -> Self {
        Self {
            path: path.into(),
            duration_secs,
            format: TARGET_FORMAT,
        }
    }

    /// Open an existing WAV recording and read its duration from the header.
    ///
    /// The file must already be in [`TARGET_FORMAT`]; this does not resample.
    pub fn from_wav_file(path: &Path) -> Result<Self, CaptureError> {
        let reader = hound::WavReader::open(path).map_err(|e| {
            CaptureError::EncodingFailed(format!("Failed to open {}: {}", path.display(), e))
        })?;
        let spec = reader.spec();
        let format = AudioFormat {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            bits_per_sample: spec.bits_per_sample,
        };

        if format != TARGET_FORMAT || spec.sample_format != hound::SampleFormat::Int {
            return Err(CaptureError::EncodingFailed(format!(
                "Expected mono 16 kHz 16-bit PCM, got {} ch {} Hz {}-bit",
                format.channels, format.sample_rate, format.bits_per_sample
            )));
        }

        let duration_secs = reader.duration() as f64 / spec.sample_rate as f64;
        debug!("Opened WAV artifact {:?}: {:.2}s", path, duration_secs);

        Ok(Self {
            path: path.to_path_buf(),
            duration_secs,
            format,
        })
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Remove the audio file from local storage. Missing files are not an error.
    pub async fn delete(&self) -> std::io::Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("Deleted local audio artifact {:?}", self.path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!("Failed to delete audio artifact {:?}: {}", self.path, e);
                Err(e)
            }
        }
    }
}

/// Map a device decibel reading onto the 0..1 meter range.
pub fn normalize_level(db: f32) -> f32 {
    if !db.is_finite() {
        return 0.0;
    }
    ((db - METER_FLOOR_DB) / -METER_FLOOR_DB).clamp(0.0, 1.0)
}

/// Native audio capture device and its permission system
#[async_trait]
pub trait AudioCaptureDevice: Send + Sync {
    /// Current authorization status, without prompting
    fn permission_status(&self) -> PermissionStatus;

    /// Prompt the user for access; resolves once the prompt is answered
    async fn request_permission(&self) -> bool;

    async fn start(&self, format: AudioFormat) -> Result<CaptureHandle, CaptureError>;

    async fn pause(&self, handle: &CaptureHandle) -> Result<(), CaptureError>;

    async fn resume(&self, handle: &CaptureHandle) -> Result<(), CaptureError>;

    /// Finalize the capture and hand back the encoded artifact
    async fn stop(&self, handle: &CaptureHandle) -> Result<AudioArtifact, CaptureError>;

    /// Instantaneous input level in decibels (roughly -60..0)
    fn current_level(&self, handle: &CaptureHandle) -> Result<f32, CaptureError>;

    /// Drop the capture and delete any partial file
    async fn discard(&self, handle: &CaptureHandle) -> Result<(), CaptureError>;
}
