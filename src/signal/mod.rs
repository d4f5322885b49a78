//! Signaling: message codec and the transport seam
//!
//! The codec turns offer/answer/candidate payloads into transport-safe JSON
//! and back; the transport trait abstracts over whatever carries those
//! messages between participants of a room (the in-process [`LocalBus`] here,
//! a server relay in production).

pub mod codec;
pub mod transport;

pub use codec::{decode_signal, encode_signal, SignalKind, SignalMessage, SignalPayload};
pub use transport::{LocalBus, SignalSubscription, SignalingTransport};
