use crate::config::IceConfig;
use crate::errors::CallError;
use crate::media::{MediaTrack, TrackSender};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// SDP description type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// Session description produced and consumed during the offer/answer handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp_type: SdpType,
    pub sdp: String,
}

/// Serializable form of a connectivity candidate.
///
/// Engines hold richer candidate objects internally; only this normalized
/// shape crosses the codec and the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateInit {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u16>,
}

/// Connectivity state reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::New => "new",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// Asynchronous events the engine pushes while a session is alive
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A local connectivity candidate was discovered; emit it immediately,
    /// no batching
    LocalCandidate(CandidateInit),
    /// The underlying connectivity state changed
    ConnectionState(ConnectionState),
    /// A remote track arrived; the first track's stream id determines which
    /// stream is surfaced
    RemoteTrack { stream_id: String, track: MediaTrack },
}

/// The delegated connectivity/media engine behind one peer session.
///
/// Everything SDP, ICE, and codec-shaped lives behind this trait; the crate
/// only orchestrates around it. Implementations push [`EngineEvent`]s on the
/// channel handed out by their [`SessionEngineFactory`].
#[async_trait]
pub trait SessionEngine: Send + Sync {
    /// Produce a local offer description
    async fn create_offer(&self) -> Result<SessionDescription, CallError>;

    /// Produce a local answer description (remote offer must be set)
    async fn create_answer(&self) -> Result<SessionDescription, CallError>;

    /// Apply a locally produced description
    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), CallError>;

    /// Apply the remote peer's description
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), CallError>;

    /// Apply one remote connectivity candidate. Rejection of an individual
    /// candidate surfaces as [`CallError::CandidateRejected`].
    async fn add_remote_candidate(&self, candidate: CandidateInit) -> Result<(), CallError>;

    /// Attach a local track for transmission, returning its sender slot
    async fn add_track(&self, track: MediaTrack) -> Result<TrackSender, CallError>;

    /// All outgoing sender slots
    async fn senders(&self) -> Vec<TrackSender>;

    /// Current connectivity state
    async fn connection_state(&self) -> ConnectionState;

    /// Release the underlying session. After close the engine emits no
    /// further events.
    async fn close(&self) -> Result<(), CallError>;
}

/// Creates one engine per session, wired to its event channel
#[async_trait]
pub trait SessionEngineFactory: Send + Sync {
    async fn create(
        &self,
        ice: &IceConfig,
    ) -> Result<(Arc<dyn SessionEngine>, mpsc::UnboundedReceiver<EngineEvent>), CallError>;
}
