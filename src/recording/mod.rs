//! Call recording: buffers encoded chunks from a tapped stream and
//! materializes them into a downloadable artifact.

pub mod artifact;
pub mod recorder;

pub use artifact::RecordingArtifact;
pub use recorder::CaptureRecorder;
