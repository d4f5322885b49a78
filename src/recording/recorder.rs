use crate::config::RecordingSettings;
use crate::errors::CallError;
use crate::media::MediaStream;
use crate::recording::artifact::RecordingArtifact;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::Mutex;

struct RecorderState {
    active: bool,
    // Observed reference to whichever stream was live at start, never owned
    source: Option<MediaStream>,
    chunks: Vec<Bytes>,
}

/// Taps an existing stream and buffers its encoded chunks until stopped.
///
/// Lifecycle is independent of the session state machine: the recorder
/// snapshots a stream reference at start and keeps buffering until an
/// explicit stop, even if that stream's tracks end mid-recording. Chunks are
/// pushed in by the embedder's encoder pipeline via [`ingest`]; at most one
/// recording runs per recorder, and starting while active is an error rather
/// than the silent restart-and-drop the underlying platform recorder does.
///
/// [`ingest`]: CaptureRecorder::ingest
#[derive(Clone)]
pub struct CaptureRecorder {
    settings: RecordingSettings,
    state: Arc<Mutex<RecorderState>>,
}

impl CaptureRecorder {
    pub fn new(settings: RecordingSettings) -> Self {
        Self {
            settings,
            state: Arc::new(Mutex::new(RecorderState {
                active: false,
                source: None,
                chunks: Vec::new(),
            })),
        }
    }

    /// Whether a recording is in progress
    pub async fn is_active(&self) -> bool {
        self.state.lock().await.active
    }

    /// Number of buffered chunks so far (zero-length entries included until
    /// finalization filters them)
    pub async fn chunk_count(&self) -> usize {
        self.state.lock().await.chunks.len()
    }

    /// The stream reference snapshotted at start, if recording
    pub async fn source_stream(&self) -> Option<MediaStream> {
        self.state.lock().await.source.clone()
    }

    /// Begin recording the given stream.
    ///
    /// Fails with [`CallError::NoRecordingSource`] when no stream exists yet
    /// and with [`CallError::RecorderBusy`] when already recording; the
    /// existing buffer is never silently discarded.
    pub async fn start(&self, source: Option<MediaStream>) -> Result<(), CallError> {
        let source = source.ok_or(CallError::NoRecordingSource)?;

        let mut state = self.state.lock().await;
        if state.active {
            return Err(CallError::RecorderBusy);
        }

        log::info!("Recording started on stream {}", source.id());
        state.active = true;
        state.source = Some(source);
        state.chunks.clear();
        Ok(())
    }

    /// Buffer one encoded chunk. Chunks arriving while not recording are
    /// dropped; zero-length chunks are kept here and filtered at stop.
    pub async fn ingest(&self, chunk: Bytes) {
        let mut state = self.state.lock().await;
        if !state.active {
            log::debug!("Dropping {} byte chunk, recorder not active", chunk.len());
            return;
        }
        state.chunks.push(chunk);
    }

    /// Finalize the buffered chunks into one artifact and clear the buffer.
    ///
    /// Safe to call when not recording: returns `None` and does nothing.
    pub async fn stop(&self) -> Option<RecordingArtifact> {
        let mut state = self.state.lock().await;
        if !state.active {
            return None;
        }

        state.active = false;
        state.source = None;

        let chunks: Vec<Bytes> = state.chunks.drain(..).filter(|c| !c.is_empty()).collect();
        let artifact = RecordingArtifact::from_chunks(
            &chunks,
            &self.settings.mime_type,
            &self.settings.file_extension,
        );
        log::info!(
            "Recording stopped: {} chunks, {} bytes -> {}",
            chunks.len(),
            artifact.len(),
            artifact.file_name()
        );
        Some(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_stream;

    fn recorder() -> CaptureRecorder {
        CaptureRecorder::new(RecordingSettings {
            mime_type: "video/webm".to_string(),
            file_extension: "webm".to_string(),
        })
    }

    #[tokio::test]
    async fn start_without_a_stream_fails() {
        let recorder = recorder();
        let err = recorder.start(None).await.unwrap_err();
        assert!(matches!(err, CallError::NoRecordingSource));
        assert_eq!(recorder.chunk_count().await, 0);
        assert!(!recorder.is_active().await);
    }

    #[tokio::test]
    async fn stop_when_never_started_is_a_noop() {
        let recorder = recorder();
        assert!(recorder.stop().await.is_none());
    }

    #[tokio::test]
    async fn chunks_buffer_and_finalize() {
        let recorder = recorder();
        recorder.start(Some(test_stream())).await.unwrap();

        recorder.ingest(Bytes::from_static(b"chunk-1")).await;
        recorder.ingest(Bytes::new()).await;
        recorder.ingest(Bytes::from_static(b"chunk-2")).await;

        let artifact = recorder.stop().await.unwrap();
        // The zero-length chunk is filtered out of the artifact
        assert_eq!(artifact.data().as_ref(), b"chunk-1chunk-2");
        assert!(!recorder.is_active().await);
        assert_eq!(recorder.chunk_count().await, 0);
    }

    #[tokio::test]
    async fn double_start_is_rejected_and_keeps_the_buffer() {
        let recorder = recorder();
        recorder.start(Some(test_stream())).await.unwrap();
        recorder.ingest(Bytes::from_static(b"kept")).await;

        let err = recorder.start(Some(test_stream())).await.unwrap_err();
        assert!(matches!(err, CallError::RecorderBusy));

        let artifact = recorder.stop().await.unwrap();
        assert_eq!(artifact.data().as_ref(), b"kept");
    }

    #[tokio::test]
    async fn chunks_outside_a_recording_are_dropped() {
        let recorder = recorder();
        recorder.ingest(Bytes::from_static(b"ignored")).await;

        recorder.start(Some(test_stream())).await.unwrap();
        assert_eq!(recorder.chunk_count().await, 0);
    }

    #[tokio::test]
    async fn recording_survives_its_source_ending() {
        let recorder = recorder();
        let stream = test_stream();
        recorder.start(Some(stream.clone())).await.unwrap();

        stream.stop_all();
        recorder.ingest(Bytes::from_static(b"tail")).await;

        // Stopping stays caller-triggered even after the source died
        assert!(recorder.is_active().await);
        let artifact = recorder.stop().await.unwrap();
        assert_eq!(artifact.data().as_ref(), b"tail");
    }
}
