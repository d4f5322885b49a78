//! Peer session: the connectivity engine seam and the negotiation state
//! machine built on top of it.

pub mod engine;
pub mod machine;

pub use engine::{
    CandidateInit, ConnectionState, EngineEvent, SdpType, SessionDescription, SessionEngine,
    SessionEngineFactory,
};
pub use machine::{PeerSession, SessionPhase};
