use thiserror::Error;

/// Error taxonomy for the call subsystem.
///
/// Transport and acquisition failures propagate to the caller; per-message
/// and per-candidate failures are logged at the point of failure and never
/// abort a session.
#[derive(Debug, Clone, Error)]
pub enum CallError {
    /// The environment lacks a working signaling transport. Fatal to `join`,
    /// recoverable by retrying once the transport is available.
    #[error("signaling transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Local capture devices could not be acquired (device busy, missing).
    #[error("media acquisition error: {0}")]
    MediaAcquisition(String),

    /// The user denied camera, microphone, or screen-capture access.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No capture device matching the requested constraints exists.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A single signal message could not be encoded or decoded. Only that
    /// message is dropped.
    #[error("signal codec error: {0}")]
    Codec(String),

    /// The engine rejected one connectivity candidate. Expected for stale
    /// or invalid candidates; never fatal to the session.
    #[error("candidate rejected: {0}")]
    CandidateRejected(String),

    /// Recording was requested before any local or remote stream exists.
    #[error("no media stream available to record")]
    NoRecordingSource,

    /// A recording is already in progress on this recorder.
    #[error("recording already in progress")]
    RecorderBusy,

    /// A call operation was attempted without an active room membership.
    #[error("not joined to a room")]
    NotJoined,

    /// Failure inside the underlying session engine.
    #[error("session engine error: {0}")]
    Engine(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_name_the_area() {
        let err = CallError::TransportUnavailable("no bus".to_string());
        assert_eq!(
            err.to_string(),
            "signaling transport unavailable: no bus"
        );

        let err = CallError::Codec("unexpected payload shape".to_string());
        assert!(err.to_string().starts_with("signal codec error"));
    }

    #[test]
    fn recorder_errors_have_fixed_messages() {
        assert_eq!(
            CallError::NoRecordingSource.to_string(),
            "no media stream available to record"
        );
        assert_eq!(
            CallError::RecorderBusy.to_string(),
            "recording already in progress"
        );
    }
}
