use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use uuid::Uuid;

/// Media track kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

struct TrackInner {
    id: String,
    kind: TrackKind,
    label: String,
    // false = live, true = ended; watch lets observers await the transition
    ended: watch::Sender<bool>,
}

/// Handle to one live media track.
///
/// Clones share the same underlying track: stopping any clone stops them all.
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    /// Create a new live track
    pub fn new(kind: TrackKind, label: impl Into<String>) -> Self {
        let (ended, _) = watch::channel(false);
        Self {
            inner: Arc::new(TrackInner {
                id: Uuid::new_v4().to_string(),
                kind,
                label: label.into(),
                ended,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Whether the track is still producing media
    pub fn is_live(&self) -> bool {
        !*self.inner.ended.borrow()
    }

    /// Stop the track. Idempotent; ends it for every clone.
    pub fn stop(&self) {
        if self.inner.ended.send_replace(true) {
            return;
        }
        log::debug!("Stopped {} track {} ({})", self.inner.kind, self.inner.id, self.inner.label);
    }

    /// Resolve once the track has ended, whether stopped through this handle
    /// or out-of-band (e.g. the user ends a screen share from the OS chrome).
    pub async fn ended(&self) {
        let mut rx = self.inner.ended.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl std::fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("label", &self.inner.label)
            .field("live", &self.is_live())
            .finish()
    }
}

/// A set of tracks surfaced together (one capture source or one remote peer)
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: String,
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tracks,
        }
    }

    /// Rebuild a stream handle with a caller-chosen id (remote streams keep
    /// the id announced by the peer)
    pub fn with_id(id: impl Into<String>, tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn video_tracks(&self) -> Vec<MediaTrack> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Video).cloned().collect()
    }

    pub fn audio_tracks(&self) -> Vec<MediaTrack> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Audio).cloned().collect()
    }

    pub(crate) fn push_track(&mut self, track: MediaTrack) {
        self.tracks.push(track);
    }

    /// Stop every track in the stream
    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

struct SenderInner {
    id: String,
    kind: TrackKind,
    current: RwLock<Option<MediaTrack>>,
}

/// Outgoing-track slot of an established session.
///
/// The transmitted track can be substituted live (screen share in/out)
/// without a new offer/answer round.
#[derive(Clone)]
pub struct TrackSender {
    inner: Arc<SenderInner>,
}

impl TrackSender {
    /// Create a sender transmitting the given track
    pub fn new(track: MediaTrack) -> Self {
        Self {
            inner: Arc::new(SenderInner {
                id: Uuid::new_v4().to_string(),
                kind: track.kind(),
                current: RwLock::new(Some(track)),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    /// Track currently being transmitted, if any
    pub async fn current_track(&self) -> Option<MediaTrack> {
        self.inner.current.read().await.clone()
    }

    /// Substitute the transmitted track in place. No renegotiation happens;
    /// the remote side keeps receiving on the same slot.
    pub async fn replace_track(&self, track: MediaTrack) {
        log::info!(
            "Sender {} replacing {} track with {} ({})",
            self.inner.id,
            self.inner.kind,
            track.id(),
            track.label()
        );
        *self.inner.current.write().await = Some(track);
    }

    /// Detach the transmitted track without stopping it
    pub async fn clear_track(&self) {
        *self.inner.current.write().await = None;
    }
}

impl std::fmt::Debug for TrackSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackSender")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .finish()
    }
}
