use crate::config::IceConfig;
use crate::errors::CallError;
use crate::media::{MediaTrack, TrackSender};
use crate::session::{
    CandidateInit, ConnectionState, EngineEvent, SdpType, SessionDescription, SessionEngine,
    SessionEngineFactory,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Default)]
struct FakeEngineState {
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    applied_candidates: Vec<CandidateInit>,
    senders: Vec<TrackSender>,
    connection: Option<ConnectionState>,
    closed: bool,
}

/// Scripted stand-in for a real connectivity engine.
///
/// Deterministic negotiation model: setting the local description triggers
/// candidate discovery (two candidates), and the connection reports
/// `Connecting` then `Connected` once both descriptions are set and at least
/// one remote candidate has been applied. Candidates whose string contains
/// `"invalid"` are rejected, for exercising the swallow-and-log path.
pub struct FakeSessionEngine {
    id: String,
    candidates_to_emit: usize,
    events: mpsc::UnboundedSender<EngineEvent>,
    state: Arc<Mutex<FakeEngineState>>,
}

/// Inspection and event-injection handle onto a fake engine, shared with
/// the test body
#[derive(Clone)]
pub struct TestEngineHandle {
    state: Arc<Mutex<FakeEngineState>>,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl TestEngineHandle {
    pub fn applied_candidates(&self) -> Vec<CandidateInit> {
        self.state.lock().unwrap().applied_candidates.clone()
    }

    pub fn senders(&self) -> Vec<TrackSender> {
        self.state.lock().unwrap().senders.clone()
    }

    /// Inject a remote track arrival, as a live engine would on an incoming
    /// media event
    pub fn push_remote_track(&self, stream_id: &str, track: MediaTrack) {
        let _ = self.events.send(EngineEvent::RemoteTrack {
            stream_id: stream_id.to_string(),
            track,
        });
    }

    /// Inject a connectivity-state report
    pub fn push_connection_state(&self, connection: ConnectionState) {
        self.state.lock().unwrap().connection = Some(connection);
        let _ = self.events.send(EngineEvent::ConnectionState(connection));
    }

    pub fn local_description(&self) -> Option<SessionDescription> {
        self.state.lock().unwrap().local_description.clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.state.lock().unwrap().remote_description.clone()
    }

    pub fn closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

impl FakeSessionEngine {
    /// Build an engine plus its inspection handle and event stream
    pub fn create() -> (
        Arc<dyn SessionEngine>,
        TestEngineHandle,
        mpsc::UnboundedReceiver<EngineEvent>,
    ) {
        Self::create_with_candidates(2)
    }

    /// Same as [`create`](Self::create) with a chosen number of discovered
    /// local candidates per local description
    pub fn create_with_candidates(
        candidates_to_emit: usize,
    ) -> (
        Arc<dyn SessionEngine>,
        TestEngineHandle,
        mpsc::UnboundedReceiver<EngineEvent>,
    ) {
        let (events, receiver) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(FakeEngineState::default()));
        let engine = Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            candidates_to_emit,
            events: events.clone(),
            state: state.clone(),
        });
        (engine, TestEngineHandle { state, events }, receiver)
    }

    fn emit(&self, event: EngineEvent) {
        // Receiver may be gone after teardown; stale events just vanish
        let _ = self.events.send(event);
    }

    /// Report Connecting/Connected once negotiation is complete
    fn maybe_connect(&self) {
        let should_connect = {
            let mut state = self.state.lock().unwrap();
            let ready = !state.closed
                && state.connection.is_none()
                && state.local_description.is_some()
                && state.remote_description.is_some()
                && !state.applied_candidates.is_empty();
            if ready {
                state.connection = Some(ConnectionState::Connected);
            }
            ready
        };

        if should_connect {
            self.emit(EngineEvent::ConnectionState(ConnectionState::Connecting));
            self.emit(EngineEvent::ConnectionState(ConnectionState::Connected));
        }
    }

}

#[async_trait]
impl SessionEngine for FakeSessionEngine {
    async fn create_offer(&self) -> Result<SessionDescription, CallError> {
        Ok(SessionDescription {
            sdp_type: SdpType::Offer,
            sdp: format!("v=0 fake-offer {}", self.id),
        })
    }

    async fn create_answer(&self) -> Result<SessionDescription, CallError> {
        if self.state.lock().unwrap().remote_description.is_none() {
            return Err(CallError::Engine(
                "cannot create answer before remote offer".to_string(),
            ));
        }
        Ok(SessionDescription {
            sdp_type: SdpType::Answer,
            sdp: format!("v=0 fake-answer {}", self.id),
        })
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), CallError> {
        self.state.lock().unwrap().local_description = Some(desc);

        // Candidate discovery starts once a local description exists
        for n in 0..self.candidates_to_emit {
            self.emit(EngineEvent::LocalCandidate(CandidateInit {
                candidate: format!("candidate:{} 1 UDP {} 192.0.2.{} 5000 typ host", self.id, 100 - n, n + 1),
                sdp_mid: Some("0".to_string()),
                sdp_mline_index: Some(0),
            }));
        }
        self.maybe_connect();
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), CallError> {
        self.state.lock().unwrap().remote_description = Some(desc);
        self.maybe_connect();
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: CandidateInit) -> Result<(), CallError> {
        if candidate.candidate.contains("invalid") {
            return Err(CallError::CandidateRejected(format!(
                "engine rejected candidate {}",
                candidate.candidate
            )));
        }
        self.state.lock().unwrap().applied_candidates.push(candidate);
        self.maybe_connect();
        Ok(())
    }

    async fn add_track(&self, track: MediaTrack) -> Result<TrackSender, CallError> {
        let sender = TrackSender::new(track);
        self.state.lock().unwrap().senders.push(sender.clone());
        Ok(sender)
    }

    async fn senders(&self) -> Vec<TrackSender> {
        self.state.lock().unwrap().senders.clone()
    }

    async fn connection_state(&self) -> ConnectionState {
        let state = self.state.lock().unwrap();
        if state.closed {
            ConnectionState::Closed
        } else {
            state.connection.unwrap_or(ConnectionState::New)
        }
    }

    async fn close(&self) -> Result<(), CallError> {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        state.connection = Some(ConnectionState::Closed);
        Ok(())
    }
}

/// Factory handing out one fake engine per session, keeping every engine's
/// inspection handle for the test body
pub struct FakeEngineFactory {
    candidates_per_engine: usize,
    created: Mutex<Vec<TestEngineHandle>>,
}

impl FakeEngineFactory {
    pub fn new() -> Self {
        Self {
            candidates_per_engine: 2,
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn with_candidates(candidates_per_engine: usize) -> Self {
        Self {
            candidates_per_engine,
            created: Mutex::new(Vec::new()),
        }
    }

    /// Handles of every engine created so far, in creation order
    pub fn handles(&self) -> Vec<TestEngineHandle> {
        self.created.lock().unwrap().clone()
    }
}

impl Default for FakeEngineFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionEngineFactory for FakeEngineFactory {
    async fn create(
        &self,
        _ice: &IceConfig,
    ) -> Result<(Arc<dyn SessionEngine>, mpsc::UnboundedReceiver<EngineEvent>), CallError> {
        let (engine, handle, receiver) =
            FakeSessionEngine::create_with_candidates(self.candidates_per_engine);
        self.created.lock().unwrap().push(handle);
        Ok((engine, receiver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connects_after_descriptions_and_a_candidate() {
        let (engine, _handle, mut events) = FakeSessionEngine::create();

        engine
            .set_local_description(engine.create_offer().await.unwrap())
            .await
            .unwrap();
        engine
            .set_remote_description(SessionDescription {
                sdp_type: SdpType::Answer,
                sdp: "v=0 remote".to_string(),
            })
            .await
            .unwrap();
        engine
            .add_remote_candidate(CandidateInit {
                candidate: "candidate:ok".to_string(),
                sdp_mid: None,
                sdp_mline_index: None,
            })
            .await
            .unwrap();

        let mut saw_connected = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, EngineEvent::ConnectionState(ConnectionState::Connected)) {
                saw_connected = true;
            }
        }
        assert!(saw_connected);
        assert_eq!(engine.connection_state().await, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn emits_candidates_after_local_description() {
        let (engine, _handle, mut events) = FakeSessionEngine::create_with_candidates(3);
        engine
            .set_local_description(engine.create_offer().await.unwrap())
            .await
            .unwrap();

        let mut candidates = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, EngineEvent::LocalCandidate(_)) {
                candidates += 1;
            }
        }
        assert_eq!(candidates, 3);
    }

    #[tokio::test]
    async fn invalid_candidates_are_rejected() {
        let (engine, handle, _events) = FakeSessionEngine::create();
        let err = engine
            .add_remote_candidate(CandidateInit {
                candidate: "candidate:invalid".to_string(),
                sdp_mid: None,
                sdp_mline_index: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::CandidateRejected(_)));
        assert!(handle.applied_candidates().is_empty());
    }
}
