use crate::errors::CallError;
use crate::media::track::MediaStream;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Which capture devices to request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConstraints {
    pub video: bool,
    pub audio: bool,
}

impl CaptureConstraints {
    /// Camera plus microphone, the default call setup
    pub fn audio_video() -> Self {
        Self { video: true, audio: true }
    }

    pub fn video_only() -> Self {
        Self { video: true, audio: false }
    }
}

/// Capture device boundary.
///
/// Implementations front the platform's camera/microphone and screen-capture
/// facilities. Acquisition suspends the caller until the user has answered
/// any permission prompt; denial surfaces as [`CallError::PermissionDenied`]
/// and a missing device as [`CallError::DeviceUnavailable`], both recoverable
/// by retrying.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Request camera and/or microphone capture
    async fn request_capture(&self, constraints: CaptureConstraints) -> Result<MediaStream, CallError>;

    /// Request a screen/display capture (video only)
    async fn request_display_capture(&self) -> Result<MediaStream, CallError>;
}
