use crate::errors::CallError;
use crate::session::{CandidateInit, SessionDescription};
use serde::{Deserialize, Serialize};

/// The three signal message kinds exchanged during negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::Offer => write!(f, "offer"),
            SignalKind::Answer => write!(f, "answer"),
            SignalKind::Candidate => write!(f, "candidate"),
        }
    }
}

/// One room-scoped signaling message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalMessage {
    pub room_id: String,
    pub sender_id: String,
    pub kind: SignalKind,
    pub payload: serde_json::Value,
}

/// Typed view of a decoded signal payload
#[derive(Debug, Clone)]
pub enum SignalPayload {
    Offer(SessionDescription),
    Answer(SessionDescription),
    Candidate(CandidateInit),
}

/// Encode a payload into its transport-safe JSON form.
///
/// This is a deep copy through serialization, so engine-internal state never
/// reaches the wire. Candidate payloads must already be normalized to
/// [`CandidateInit`] by the engine boundary. A payload that cannot be
/// serialized fails with [`CallError::Codec`]; only that message is lost.
pub fn encode_signal<T: Serialize>(kind: SignalKind, payload: &T) -> Result<serde_json::Value, CallError> {
    serde_json::to_value(payload)
        .map_err(|e| CallError::Codec(format!("failed to encode {} payload: {}", kind, e)))
}

/// Decode a received message into its typed payload.
///
/// Identity inverse of [`encode_signal`] for JSON-safe structures. A payload
/// that does not match its declared kind fails with [`CallError::Codec`];
/// the caller drops that message and keeps the session alive.
pub fn decode_signal(message: &SignalMessage) -> Result<SignalPayload, CallError> {
    match message.kind {
        SignalKind::Offer => serde_json::from_value(message.payload.clone())
            .map(SignalPayload::Offer)
            .map_err(|e| CallError::Codec(format!("malformed offer payload: {}", e))),
        SignalKind::Answer => serde_json::from_value(message.payload.clone())
            .map(SignalPayload::Answer)
            .map_err(|e| CallError::Codec(format!("malformed answer payload: {}", e))),
        SignalKind::Candidate => serde_json::from_value(message.payload.clone())
            .map(SignalPayload::Candidate)
            .map_err(|e| CallError::Codec(format!("malformed candidate payload: {}", e))),
    }
}
