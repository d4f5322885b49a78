//! Testing utilities for peercall
//!
//! Device-free, network-free doubles for the three external boundaries
//! (capture devices, session engine, and the signaling transport via
//! [`LocalBus`]), enabling deterministic offline testing of the whole call
//! lifecycle.
//!
//! [`LocalBus`]: crate::signal::LocalBus

pub mod fake_devices;
pub mod fake_engine;

pub use fake_devices::FakeMediaDevices;
pub use fake_engine::{FakeEngineFactory, FakeSessionEngine, TestEngineHandle};

use crate::media::{MediaStream, MediaTrack, TrackKind};

/// A camera + microphone stream for tests
pub fn test_stream() -> MediaStream {
    MediaStream::new(vec![
        MediaTrack::new(TrackKind::Video, "test-camera"),
        MediaTrack::new(TrackKind::Audio, "test-microphone"),
    ])
}

/// A single video track for tests
pub fn test_video_track(label: &str) -> MediaTrack {
    MediaTrack::new(TrackKind::Video, label)
}
