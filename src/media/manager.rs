use crate::errors::CallError;
use crate::media::devices::{CaptureConstraints, MediaDevices};
use crate::media::track::{MediaStream, MediaTrack, TrackKind, TrackSender};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Which original track a sender was transmitting before a substitution,
/// so it can be restored when the substitute ends
struct SubstitutionRecord {
    sender: TrackSender,
    original: MediaTrack,
    replacement: MediaTrack,
}

struct ManagerState {
    local: Option<MediaStream>,
    substitution: Option<SubstitutionRecord>,
    restore_watch: Option<JoinHandle<()>>,
}

/// Owns local capture for one room membership: device acquisition, live
/// screen-share substitution, and full release on leave.
#[derive(Clone)]
pub struct MediaManager {
    devices: Arc<dyn MediaDevices>,
    state: Arc<Mutex<ManagerState>>,
}

impl MediaManager {
    pub fn new(devices: Arc<dyn MediaDevices>) -> Self {
        Self {
            devices,
            state: Arc::new(Mutex::new(ManagerState {
                local: None,
                substitution: None,
                restore_watch: None,
            })),
        }
    }

    /// Currently acquired local stream, if any
    pub async fn local_stream(&self) -> Option<MediaStream> {
        self.state.lock().await.local.clone()
    }

    /// Acquire camera and microphone, or return the already-acquired stream.
    ///
    /// Idempotent: devices are requested at most once per membership. On
    /// failure nothing is stored, so the call can simply be retried.
    pub async fn acquire_local_media(&self) -> Result<MediaStream, CallError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = &state.local {
            log::debug!("Local media already acquired, reusing stream {}", existing.id());
            return Ok(existing.clone());
        }

        let stream = self
            .devices
            .request_capture(CaptureConstraints::audio_video())
            .await?;
        log::info!(
            "Acquired local media stream {} with {} tracks",
            stream.id(),
            stream.tracks().len()
        );
        state.local = Some(stream.clone());
        Ok(stream)
    }

    /// Start a screen share by substituting the transmitting video sender's
    /// track with a freshly captured display track.
    ///
    /// Live substitution only: no new offer/answer round. When the screen
    /// track ends (in-app stop or out-of-band from the OS chrome), the
    /// original track is restored on the same sender automatically.
    pub async fn start_screen_share(&self, senders: Vec<TrackSender>) -> Result<(), CallError> {
        let (sender, original) = {
            let state = self.state.lock().await;
            if state.substitution.is_some() {
                return Err(CallError::Engine("screen share already active".to_string()));
            }

            let mut video_sender = None;
            for sender in senders {
                if sender.kind() == TrackKind::Video && sender.current_track().await.is_some() {
                    video_sender = Some(sender);
                    break;
                }
            }
            let sender = video_sender
                .ok_or_else(|| CallError::Engine("no transmitting video sender".to_string()))?;
            let original = sender
                .current_track()
                .await
                .ok_or_else(|| CallError::Engine("video sender lost its track".to_string()))?;
            (sender, original)
        };

        // The capture prompt can stay open indefinitely; the lock is not
        // held across it, so release_all never waits on the user
        let display = self.devices.request_display_capture().await?;
        let screen_track = display
            .video_tracks()
            .into_iter()
            .next()
            .ok_or_else(|| CallError::DeviceUnavailable("display capture produced no video track".to_string()))?;

        let mut state = self.state.lock().await;
        if state.substitution.is_some() {
            screen_track.stop();
            return Err(CallError::Engine("screen share already active".to_string()));
        }
        // A release or substitution while the prompt was open invalidates
        // the pre-capture snapshot
        let still_transmitting = original.is_live()
            && sender
                .current_track()
                .await
                .map(|t| t.id() == original.id())
                .unwrap_or(false);
        if !still_transmitting {
            screen_track.stop();
            return Err(CallError::Engine(
                "video sender changed while awaiting display capture".to_string(),
            ));
        }

        sender.replace_track(screen_track.clone()).await;
        log::info!(
            "Screen share started: sender {} now transmits {} instead of {}",
            sender.id(),
            screen_track.id(),
            original.id()
        );

        let watch_manager = self.clone();
        let ended_track = screen_track.clone();
        state.substitution = Some(SubstitutionRecord {
            sender,
            original,
            replacement: screen_track,
        });
        state.restore_watch = Some(tokio::spawn(async move {
            ended_track.ended().await;
            watch_manager.restore_after_share(&ended_track).await;
        }));

        Ok(())
    }

    /// Explicitly stop an active screen share. The restore path is the same
    /// one the out-of-band end takes. No-op when no share is active.
    pub async fn stop_screen_share(&self) {
        let replacement = {
            let state = self.state.lock().await;
            state.substitution.as_ref().map(|s| s.replacement.clone())
        };
        if let Some(track) = replacement {
            track.stop();
            self.restore_after_share(&track).await;
        }
    }

    /// Restore the pre-substitution track once a screen track has ended
    async fn restore_after_share(&self, ended: &MediaTrack) {
        let mut state = self.state.lock().await;
        let matches = state
            .substitution
            .as_ref()
            .map(|s| s.replacement.id() == ended.id())
            .unwrap_or(false);
        if !matches {
            // A newer share or a release already superseded this one
            return;
        }

        if let Some(record) = state.substitution.take() {
            record.sender.replace_track(record.original.clone()).await;
            log::info!(
                "Screen share ended: sender {} restored to track {}",
                record.sender.id(),
                record.original.id()
            );
        }
    }

    /// Stop every locally held track and clear all substitution state.
    /// Idempotent; callable multiple times safely.
    pub async fn release_all(&self) {
        let mut state = self.state.lock().await;

        if let Some(watch) = state.restore_watch.take() {
            watch.abort();
        }

        if let Some(record) = state.substitution.take() {
            record.replacement.stop();
            record.original.stop();
            record.sender.clear_track().await;
        }

        if let Some(local) = state.local.take() {
            local.stop_all();
            log::info!("Released local media stream {}", local.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeMediaDevices;

    #[tokio::test]
    async fn acquire_is_idempotent() {
        let devices = Arc::new(FakeMediaDevices::new());
        let manager = MediaManager::new(devices.clone());

        let first = manager.acquire_local_media().await.unwrap();
        let second = manager.acquire_local_media().await.unwrap();

        assert_eq!(first.id(), second.id());
        assert_eq!(devices.capture_requests(), 1);
    }

    #[tokio::test]
    async fn denied_acquisition_leaves_nothing_behind() {
        let devices = Arc::new(FakeMediaDevices::denying_capture());
        let manager = MediaManager::new(devices.clone());

        let err = manager.acquire_local_media().await.unwrap_err();
        assert!(matches!(err, CallError::PermissionDenied(_)));
        assert!(manager.local_stream().await.is_none());

        // Retry succeeds once permission is granted
        devices.allow_capture();
        assert!(manager.acquire_local_media().await.is_ok());
    }

    #[tokio::test]
    async fn release_all_is_idempotent() {
        let devices = Arc::new(FakeMediaDevices::new());
        let manager = MediaManager::new(devices);

        let stream = manager.acquire_local_media().await.unwrap();
        manager.release_all().await;
        manager.release_all().await;

        assert!(manager.local_stream().await.is_none());
        assert!(stream.tracks().iter().all(|t| !t.is_live()));
    }

    #[tokio::test]
    async fn screen_share_requires_a_transmitting_video_sender() {
        let devices = Arc::new(FakeMediaDevices::new());
        let manager = MediaManager::new(devices);

        let err = manager.start_screen_share(Vec::new()).await.unwrap_err();
        assert!(matches!(err, CallError::Engine(_)));
    }

    /// Devices whose display capture stays pending until the test releases
    /// the gate, standing in for an unanswered OS prompt
    struct GatedDisplayDevices {
        inner: FakeMediaDevices,
        gate: tokio::sync::Semaphore,
    }

    #[async_trait::async_trait]
    impl MediaDevices for GatedDisplayDevices {
        async fn request_capture(
            &self,
            constraints: CaptureConstraints,
        ) -> Result<MediaStream, CallError> {
            self.inner.request_capture(constraints).await
        }

        async fn request_display_capture(&self) -> Result<MediaStream, CallError> {
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| CallError::DeviceUnavailable("display gone".to_string()))?;
            self.inner.request_display_capture().await
        }
    }

    #[tokio::test]
    async fn release_is_not_blocked_by_a_pending_capture_prompt() {
        let devices = Arc::new(GatedDisplayDevices {
            inner: FakeMediaDevices::new(),
            gate: tokio::sync::Semaphore::new(0),
        });
        let manager = MediaManager::new(devices.clone());

        let local = manager.acquire_local_media().await.unwrap();
        let sender = TrackSender::new(local.video_tracks().remove(0));

        let share = tokio::spawn({
            let manager = manager.clone();
            let sender = sender.clone();
            async move { manager.start_screen_share(vec![sender]).await }
        });
        // Let the share reach the (unanswered) capture prompt
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        // Release must complete while the prompt is still open
        tokio::time::timeout(std::time::Duration::from_millis(200), manager.release_all())
            .await
            .expect("release_all must not wait on the capture prompt");

        // Answering the prompt afterwards must not resurrect the share
        devices.gate.add_permits(1);
        let result = share.await.unwrap();
        assert!(result.is_err());
        let current = sender.current_track().await;
        assert!(current.is_none() || current.unwrap().label() != "fake-screen");
        assert!(manager.local_stream().await.is_none());
    }
}
