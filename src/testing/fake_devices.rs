use crate::errors::CallError;
use crate::media::{CaptureConstraints, MediaDevices, MediaStream, MediaTrack, TrackKind};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Fake capture device boundary with scriptable permission behavior
pub struct FakeMediaDevices {
    deny_capture: AtomicBool,
    deny_display: AtomicBool,
    capture_requests: AtomicUsize,
    display_requests: AtomicUsize,
}

impl FakeMediaDevices {
    pub fn new() -> Self {
        Self {
            deny_capture: AtomicBool::new(false),
            deny_display: AtomicBool::new(false),
            capture_requests: AtomicUsize::new(0),
            display_requests: AtomicUsize::new(0),
        }
    }

    /// Devices that refuse camera/microphone access
    pub fn denying_capture() -> Self {
        let devices = Self::new();
        devices.deny_capture.store(true, Ordering::SeqCst);
        devices
    }

    /// Devices that refuse screen capture
    pub fn denying_display() -> Self {
        let devices = Self::new();
        devices.deny_display.store(true, Ordering::SeqCst);
        devices
    }

    pub fn allow_capture(&self) {
        self.deny_capture.store(false, Ordering::SeqCst);
    }

    pub fn deny_capture(&self) {
        self.deny_capture.store(true, Ordering::SeqCst);
    }

    /// How many camera/microphone requests reached the devices
    pub fn capture_requests(&self) -> usize {
        self.capture_requests.load(Ordering::SeqCst)
    }

    /// How many screen-capture requests reached the devices
    pub fn display_requests(&self) -> usize {
        self.display_requests.load(Ordering::SeqCst)
    }
}

impl Default for FakeMediaDevices {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaDevices for FakeMediaDevices {
    async fn request_capture(&self, constraints: CaptureConstraints) -> Result<MediaStream, CallError> {
        self.capture_requests.fetch_add(1, Ordering::SeqCst);

        if self.deny_capture.load(Ordering::SeqCst) {
            return Err(CallError::PermissionDenied(
                "camera/microphone access denied".to_string(),
            ));
        }
        if !constraints.video && !constraints.audio {
            return Err(CallError::DeviceUnavailable(
                "no capture kinds requested".to_string(),
            ));
        }

        let mut tracks = Vec::new();
        if constraints.video {
            tracks.push(MediaTrack::new(TrackKind::Video, "fake-camera"));
        }
        if constraints.audio {
            tracks.push(MediaTrack::new(TrackKind::Audio, "fake-microphone"));
        }
        Ok(MediaStream::new(tracks))
    }

    async fn request_display_capture(&self) -> Result<MediaStream, CallError> {
        self.display_requests.fetch_add(1, Ordering::SeqCst);

        if self.deny_display.load(Ordering::SeqCst) {
            return Err(CallError::PermissionDenied("screen capture denied".to_string()));
        }
        Ok(MediaStream::new(vec![MediaTrack::new(
            TrackKind::Video,
            "fake-screen",
        )]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn grants_requested_track_kinds() {
        let devices = FakeMediaDevices::new();
        let stream = devices
            .request_capture(CaptureConstraints::audio_video())
            .await
            .unwrap();
        assert_eq!(stream.video_tracks().len(), 1);
        assert_eq!(stream.audio_tracks().len(), 1);

        let video_only = devices
            .request_capture(CaptureConstraints::video_only())
            .await
            .unwrap();
        assert_eq!(video_only.audio_tracks().len(), 0);
    }

    #[tokio::test]
    async fn denial_is_a_permission_error() {
        let devices = FakeMediaDevices::denying_capture();
        let err = devices
            .request_capture(CaptureConstraints::audio_video())
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::PermissionDenied(_)));
        assert_eq!(devices.capture_requests(), 1);
    }
}
