//! Local media: tracks, capture device boundary, and the media manager
//!
//! Tracks and streams are cheap cloneable handles over shared state; actual
//! sample production lives behind the [`MediaDevices`] boundary. The manager
//! owns acquisition, screen-share substitution, and release for one room
//! membership.

pub mod devices;
pub mod manager;
pub mod track;

pub use devices::{CaptureConstraints, MediaDevices};
pub use manager::MediaManager;
pub use track::{MediaStream, MediaTrack, TrackKind, TrackSender};
