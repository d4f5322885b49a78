use crate::errors::CallError;
use crate::media::{MediaStream, MediaTrack, TrackSender};
use crate::session::engine::{
    CandidateInit, ConnectionState, SessionDescription, SessionEngine,
};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Named negotiation states of one peer session
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    Negotiating,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Negotiating => "negotiating",
            SessionPhase::Connected => "connected",
            SessionPhase::Disconnected => "disconnected",
            SessionPhase::Failed => "failed",
            SessionPhase::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

struct SessionState {
    phase: SessionPhase,
    local_description_set: bool,
    remote_description_set: bool,
    pending_remote_candidates: VecDeque<CandidateInit>,
    local_tracks: Vec<MediaTrack>,
    remote_tracks: Vec<MediaTrack>,
    remote_stream: Option<MediaStream>,
}

/// Negotiation state machine for the single live session of one membership.
///
/// All description and candidate handling funnels through here so the
/// buffering invariant has exactly one home: a remote candidate is never
/// applied before the remote description, and buffered candidates are
/// flushed in arrival order the moment the remote description lands.
pub struct PeerSession {
    engine: Arc<dyn SessionEngine>,
    state: Mutex<SessionState>,
}

impl PeerSession {
    pub fn new(engine: Arc<dyn SessionEngine>) -> Self {
        Self {
            engine,
            state: Mutex::new(SessionState {
                phase: SessionPhase::Idle,
                local_description_set: false,
                remote_description_set: false,
                pending_remote_candidates: VecDeque::new(),
                local_tracks: Vec::new(),
                remote_tracks: Vec::new(),
                remote_stream: None,
            }),
        }
    }

    /// Current negotiation phase
    pub async fn phase(&self) -> SessionPhase {
        self.state.lock().await.phase
    }

    /// Whether the remote description has been applied
    pub async fn remote_description_set(&self) -> bool {
        self.state.lock().await.remote_description_set
    }

    /// Number of candidates waiting for the remote description
    pub async fn pending_candidate_count(&self) -> usize {
        self.state.lock().await.pending_remote_candidates.len()
    }

    /// Outgoing sender slots of the underlying engine
    pub async fn senders(&self) -> Vec<TrackSender> {
        self.engine.senders().await
    }

    /// The surfaced remote stream, once any remote track has arrived
    pub async fn remote_stream(&self) -> Option<MediaStream> {
        self.state.lock().await.remote_stream.clone()
    }

    /// Attach every track of the local stream for transmission
    pub async fn attach_local_stream(&self, stream: &MediaStream) -> Result<(), CallError> {
        for track in stream.tracks() {
            self.engine.add_track(track.clone()).await?;
            self.state.lock().await.local_tracks.push(track.clone());
        }
        Ok(())
    }

    /// Caller side: produce and apply the local offer. Idle → Negotiating.
    pub async fn start_call(&self) -> Result<SessionDescription, CallError> {
        self.ensure_open().await?;
        let offer = self.engine.create_offer().await?;
        self.engine.set_local_description(offer.clone()).await?;

        let mut state = self.state.lock().await;
        state.local_description_set = true;
        state.phase = SessionPhase::Negotiating;
        log::info!("Session entering negotiating (offer created)");
        Ok(offer)
    }

    /// Callee side: apply a received offer and produce the answer.
    /// Idle → Negotiating.
    pub async fn accept_offer(&self, offer: SessionDescription) -> Result<SessionDescription, CallError> {
        self.ensure_open().await?;
        self.engine.set_remote_description(offer).await?;
        self.mark_remote_description_set().await;

        let answer = self.engine.create_answer().await?;
        self.engine.set_local_description(answer.clone()).await?;

        let mut state = self.state.lock().await;
        state.local_description_set = true;
        state.phase = SessionPhase::Negotiating;
        log::info!("Session entering negotiating (answer created)");
        Ok(answer)
    }

    /// Caller side: apply the received answer
    pub async fn apply_answer(&self, answer: SessionDescription) -> Result<(), CallError> {
        self.ensure_open().await?;
        self.engine.set_remote_description(answer).await?;
        self.mark_remote_description_set().await;
        Ok(())
    }

    /// Apply a remote candidate now, or buffer it until the remote
    /// description exists. An engine rejection of one candidate is logged
    /// and swallowed; stale candidates are expected.
    pub async fn apply_remote_candidate(&self, candidate: CandidateInit) {
        {
            let mut state = self.state.lock().await;
            if state.phase == SessionPhase::Closed {
                log::debug!("Ignoring candidate for closed session");
                return;
            }
            if !state.remote_description_set {
                state.pending_remote_candidates.push_back(candidate);
                log::debug!(
                    "Buffered remote candidate ({} pending, no remote description yet)",
                    state.pending_remote_candidates.len()
                );
                return;
            }
        }

        if let Err(e) = self.engine.add_remote_candidate(candidate).await {
            log::warn!("Dropping rejected remote candidate: {}", e);
        }
    }

    /// Mark the remote description applied and flush the candidate buffer in
    /// arrival order. Holds the state lock for the whole flush so candidates
    /// arriving concurrently cannot jump the queue.
    async fn mark_remote_description_set(&self) {
        let mut state = self.state.lock().await;
        state.remote_description_set = true;

        while let Some(candidate) = state.pending_remote_candidates.pop_front() {
            if let Err(e) = self.engine.add_remote_candidate(candidate).await {
                log::warn!("Dropping rejected buffered candidate: {}", e);
            }
        }
    }

    /// React to a connectivity-state report from the engine. Returns the new
    /// phase when it changed.
    pub async fn handle_connection_state(&self, connection: ConnectionState) -> Option<SessionPhase> {
        let mut state = self.state.lock().await;
        if state.phase == SessionPhase::Closed {
            return None;
        }

        let next = match connection {
            ConnectionState::Connected => SessionPhase::Connected,
            ConnectionState::Disconnected => SessionPhase::Disconnected,
            ConnectionState::Failed => SessionPhase::Failed,
            ConnectionState::Closed => SessionPhase::Closed,
            ConnectionState::New | ConnectionState::Connecting => return None,
        };

        if next == state.phase {
            return None;
        }
        log::info!("Session phase {} -> {}", state.phase, next);
        state.phase = next;
        Some(next)
    }

    /// Surface a remote track immediately on arrival. The first track's
    /// stream id pins which remote stream is surfaced; tracks for other
    /// streams are still stopped on close but not surfaced.
    pub async fn add_remote_track(&self, stream_id: &str, track: MediaTrack) -> Option<MediaStream> {
        let mut state = self.state.lock().await;
        if state.phase == SessionPhase::Closed {
            track.stop();
            return None;
        }

        state.remote_tracks.push(track.clone());
        match &mut state.remote_stream {
            None => {
                let stream = MediaStream::with_id(stream_id, vec![track]);
                state.remote_stream = Some(stream.clone());
                log::info!("Surfacing remote stream {}", stream_id);
                Some(stream)
            }
            Some(stream) if stream.id() == stream_id => {
                stream.push_track(track);
                Some(stream.clone())
            }
            Some(_) => {
                log::debug!("Ignoring track for non-surfaced remote stream {}", stream_id);
                None
            }
        }
    }

    /// Tear the session down: stop every local and remote track, release the
    /// engine, and refuse all further signals. Idempotent.
    pub async fn close(&self) {
        {
            let mut state = self.state.lock().await;
            if state.phase == SessionPhase::Closed {
                return;
            }
            state.phase = SessionPhase::Closed;

            for track in state.local_tracks.drain(..) {
                track.stop();
            }
            for track in state.remote_tracks.drain(..) {
                track.stop();
            }
            state.remote_stream = None;
            state.pending_remote_candidates.clear();
        }

        if let Err(e) = self.engine.close().await {
            log::warn!("Engine close reported an error: {}", e);
        }
        log::info!("Session closed");
    }

    async fn ensure_open(&self) -> Result<(), CallError> {
        let state = self.state.lock().await;
        if state.phase == SessionPhase::Closed {
            return Err(CallError::Engine("session is closed".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeSessionEngine, TestEngineHandle};

    fn session() -> (PeerSession, TestEngineHandle) {
        let (engine, handle, _events) = FakeSessionEngine::create();
        (PeerSession::new(engine), handle)
    }

    fn candidate(tag: &str) -> CandidateInit {
        CandidateInit {
            candidate: format!("candidate:{}", tag),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
        }
    }

    #[tokio::test]
    async fn candidates_buffer_until_remote_description() {
        let (session, handle) = session();

        session.apply_remote_candidate(candidate("early-1")).await;
        session.apply_remote_candidate(candidate("early-2")).await;
        assert_eq!(session.pending_candidate_count().await, 2);
        assert!(handle.applied_candidates().is_empty());

        session
            .apply_answer(SessionDescription {
                sdp_type: crate::session::SdpType::Answer,
                sdp: "v=0 answer".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(session.pending_candidate_count().await, 0);
        let applied = handle.applied_candidates();
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0].candidate, "candidate:early-1");
        assert_eq!(applied[1].candidate, "candidate:early-2");
    }

    #[tokio::test]
    async fn candidates_apply_directly_after_remote_description() {
        let (session, handle) = session();
        session
            .apply_answer(SessionDescription {
                sdp_type: crate::session::SdpType::Answer,
                sdp: "v=0 answer".to_string(),
            })
            .await
            .unwrap();

        session.apply_remote_candidate(candidate("late")).await;
        assert_eq!(session.pending_candidate_count().await, 0);
        assert_eq!(handle.applied_candidates().len(), 1);
    }

    #[tokio::test]
    async fn rejected_candidate_does_not_abort_the_session() {
        let (session, handle) = session();
        session
            .apply_answer(SessionDescription {
                sdp_type: crate::session::SdpType::Answer,
                sdp: "v=0 answer".to_string(),
            })
            .await
            .unwrap();

        session.apply_remote_candidate(candidate("invalid-stale")).await;
        session.apply_remote_candidate(candidate("good")).await;

        // The invalid candidate is swallowed, the good one lands
        let applied = handle.applied_candidates();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].candidate, "candidate:good");
        assert_ne!(session.phase().await, SessionPhase::Failed);
    }

    #[tokio::test]
    async fn start_call_enters_negotiating() {
        let (session, _handle) = session();
        assert_eq!(session.phase().await, SessionPhase::Idle);

        let offer = session.start_call().await.unwrap();
        assert_eq!(offer.sdp_type, crate::session::SdpType::Offer);
        assert_eq!(session.phase().await, SessionPhase::Negotiating);
    }

    #[tokio::test]
    async fn disconnect_does_not_tear_down() {
        let (session, handle) = session();
        session.start_call().await.unwrap();

        let phase = session
            .handle_connection_state(ConnectionState::Disconnected)
            .await;
        assert_eq!(phase, Some(SessionPhase::Disconnected));
        // Session survives: tracks and engine untouched until explicit close
        assert!(!handle.closed());
    }

    #[tokio::test]
    async fn close_stops_all_tracks_and_is_idempotent() {
        let (session, handle) = session();
        let stream = crate::testing::test_stream();
        session.attach_local_stream(&stream).await.unwrap();

        let remote = crate::media::MediaTrack::new(crate::media::TrackKind::Video, "remote-cam");
        session.add_remote_track("remote-stream", remote.clone()).await;

        session.close().await;
        session.close().await;

        assert_eq!(session.phase().await, SessionPhase::Closed);
        assert!(stream.tracks().iter().all(|t| !t.is_live()));
        assert!(!remote.is_live());
        assert!(handle.closed());
        assert!(session.remote_stream().await.is_none());
    }

    #[tokio::test]
    async fn first_remote_track_pins_the_surfaced_stream() {
        let (session, _handle) = session();

        let first = crate::media::MediaTrack::new(crate::media::TrackKind::Video, "cam");
        let surfaced = session.add_remote_track("stream-1", first).await.unwrap();
        assert_eq!(surfaced.id(), "stream-1");

        let other = crate::media::MediaTrack::new(crate::media::TrackKind::Audio, "mic");
        assert!(session.add_remote_track("stream-2", other).await.is_none());

        let more = crate::media::MediaTrack::new(crate::media::TrackKind::Audio, "mic");
        let surfaced = session.add_remote_track("stream-1", more).await.unwrap();
        assert_eq!(surfaced.tracks().len(), 2);
    }
}
