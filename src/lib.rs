//! PeerCall: peer-to-peer call orchestration
//!
//! This crate implements the signaling and lifecycle layer of a two-party
//! call: an offer/answer/candidate codec, a negotiation state machine with
//! race-safe candidate buffering, live media track management including
//! screen-share substitution without renegotiation, call recording, and a
//! room membership controller guaranteeing full teardown on leave.
//!
//! # Features
//! - Transport-agnostic signaling (in-process bus included, relays pluggable)
//! - Candidate buffering until the remote description lands, flushed in order
//! - Live screen-share substitution with automatic restore on out-of-band end
//! - Caller-controlled recording of the local or remote stream
//! - Membership-scoped resources with liveness-guarded async continuations
//!
//! # Usage
//! ```rust,ignore
//! use peercall::config::CallConfig;
//! use peercall::room::RoomController;
//! use peercall::signal::LocalBus;
//! use std::sync::Arc;
//!
//! let config = CallConfig::load_or_default();
//! let bus = Arc::new(LocalBus::new(&config.signaling.bus_name, config.signaling.bus_capacity));
//! let controller = RoomController::new(config, bus, devices, engines);
//! controller.join("demo-room").await?;
//! controller.start_call().await?;
//! ```
//!
//! The capture-device and connectivity-engine boundaries are traits
//! ([`media::MediaDevices`], [`session::SessionEngine`]); the [`testing`]
//! module ships deterministic fakes for both.

pub mod config;
pub mod errors;
pub mod media;
pub mod recording;
pub mod room;
pub mod session;
pub mod signal;

// Testing utilities - offline doubles for the external boundaries
pub mod testing;

// Re-exports for convenience
pub use config::CallConfig;
pub use errors::CallError;
pub use media::{MediaManager, MediaStream, MediaTrack, TrackKind};
pub use recording::{CaptureRecorder, RecordingArtifact};
pub use room::{CallEvent, RoomController};
pub use session::{PeerSession, SessionPhase};
pub use signal::{LocalBus, SignalKind, SignalMessage};

/// Initialize logging for the call subsystem
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "peercall=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
