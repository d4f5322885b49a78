//! Room membership controller: the top-level orchestrator
//!
//! Owns the join/leave lifecycle for exactly one room at a time, wires the
//! signaling transport, codec, session state machine, media manager, and
//! recorder together, and guarantees full resource release on leave. All
//! state is scoped to the active membership; nothing survives `leave()`
//! except the controller itself and its participant id.

use crate::config::CallConfig;
use crate::errors::CallError;
use crate::media::{MediaDevices, MediaManager, MediaStream};
use crate::recording::{CaptureRecorder, RecordingArtifact};
use crate::session::{
    EngineEvent, PeerSession, SessionEngineFactory, SessionPhase,
};
use crate::signal::{
    decode_signal, encode_signal, SignalKind, SignalMessage, SignalPayload, SignalSubscription,
    SignalingTransport,
};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Notifications surfaced to the embedding application
#[derive(Debug, Clone)]
pub enum CallEvent {
    /// The session moved to a new negotiation phase
    PhaseChanged(SessionPhase),
    /// Connectivity was lost or failed; the session stays up until an
    /// explicit `leave`
    ConnectivityLost,
    /// A remote stream became available for display
    RemoteStream(MediaStream),
    /// Recording began
    RecordingStarted,
    /// Recording finished and produced a downloadable artifact
    RecordingFinished(RecordingArtifact),
}

struct Membership {
    room_id: String,
    session: Arc<PeerSession>,
    media: MediaManager,
    recorder: CaptureRecorder,
    signal_task: JoinHandle<()>,
    engine_task: JoinHandle<()>,
}

/// Top-level call orchestrator. One active room membership at a time;
/// cloning shares the same controller.
#[derive(Clone)]
pub struct RoomController {
    participant_id: String,
    config: CallConfig,
    transport: Arc<dyn SignalingTransport>,
    devices: Arc<dyn MediaDevices>,
    engines: Arc<dyn SessionEngineFactory>,
    state: Arc<Mutex<Option<Membership>>>,
    // Bumped on every join and leave; suspend points capture it at entry and
    // drop their results when it moved on (late completions must not undo a
    // leave or leak into a newer membership)
    epoch: Arc<AtomicU64>,
    events: broadcast::Sender<CallEvent>,
}

impl RoomController {
    pub fn new(
        config: CallConfig,
        transport: Arc<dyn SignalingTransport>,
        devices: Arc<dyn MediaDevices>,
        engines: Arc<dyn SessionEngineFactory>,
    ) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            participant_id: Uuid::new_v4().to_string(),
            config,
            transport,
            devices,
            engines,
            state: Arc::new(Mutex::new(None)),
            epoch: Arc::new(AtomicU64::new(0)),
            events,
        }
    }

    /// Globally unique id of this participant, fixed for the controller's
    /// lifetime
    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    /// Subscribe to call notifications
    pub fn events(&self) -> broadcast::Receiver<CallEvent> {
        self.events.subscribe()
    }

    /// Room currently joined, if any
    pub async fn current_room(&self) -> Option<String> {
        self.state.lock().await.as_ref().map(|m| m.room_id.clone())
    }

    /// Negotiation phase of the active session, if joined
    pub async fn phase(&self) -> Option<SessionPhase> {
        let session = self.state.lock().await.as_ref().map(|m| m.session.clone())?;
        Some(session.phase().await)
    }

    /// Locally captured stream, once media has been acquired
    pub async fn local_stream(&self) -> Option<MediaStream> {
        let media = self.state.lock().await.as_ref().map(|m| m.media.clone())?;
        media.local_stream().await
    }

    /// Remote stream surfaced by the active session, if any
    pub async fn remote_stream(&self) -> Option<MediaStream> {
        let session = self.state.lock().await.as_ref().map(|m| m.session.clone())?;
        session.remote_stream().await
    }

    /// The active membership's recorder, for wiring an encoder pipeline
    pub async fn recorder(&self) -> Option<CaptureRecorder> {
        self.state.lock().await.as_ref().map(|m| m.recorder.clone())
    }

    /// Join a room: subscribe to its signal traffic and stand up a fresh
    /// session in the idle phase. No-op when already joined. Transport
    /// failure leaves the controller not-joined.
    pub async fn join(&self, room_id: &str) -> Result<(), CallError> {
        let mut state = self.state.lock().await;
        if let Some(membership) = &*state {
            log::warn!(
                "Already joined to room {}, ignoring join({})",
                membership.room_id,
                room_id
            );
            return Ok(());
        }

        let subscription = self.transport.subscribe(room_id).await?;
        let (engine, engine_events) = self.engines.create(&self.config.ice).await?;
        let session = Arc::new(PeerSession::new(engine));

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let media = MediaManager::new(self.devices.clone());
        let recorder = CaptureRecorder::new(self.config.recording.clone());

        let signal_task = tokio::spawn(self.clone().run_signal_loop(subscription, epoch));
        let engine_task = tokio::spawn(self.clone().run_engine_loop(
            engine_events,
            room_id.to_string(),
            session.clone(),
            epoch,
        ));

        *state = Some(Membership {
            room_id: room_id.to_string(),
            session,
            media,
            recorder,
            signal_task,
            engine_task,
        });
        log::info!("Joined room {} as {}", room_id, self.participant_id);
        Ok(())
    }

    /// Leave the current room, releasing every resource in a fixed order:
    /// unsubscribe, stop recording, close the session (stopping all tracks),
    /// release local media, clear surfaced streams. Always safe to call;
    /// no-op when not joined.
    pub async fn leave(&self) {
        let mut state = self.state.lock().await;
        let Some(membership) = state.take() else {
            log::debug!("leave() with no active membership, nothing to do");
            return;
        };

        // Invalidate in-flight continuations before releasing anything
        self.epoch.fetch_add(1, Ordering::SeqCst);

        // Aborting the signal task drops the subscription
        membership.signal_task.abort();
        membership.engine_task.abort();

        if let Some(artifact) = membership.recorder.stop().await {
            let _ = self.events.send(CallEvent::RecordingFinished(artifact));
        }

        membership.session.close().await;
        membership.media.release_all().await;

        log::info!("Left room {}", membership.room_id);
    }

    /// Initiate a call: acquire local media, attach it, and publish exactly
    /// one offer to the room.
    pub async fn start_call(&self) -> Result<(), CallError> {
        let (room_id, session, media, epoch) = self.membership_parts().await?;

        let local = media.acquire_local_media().await?;
        if self.stale(epoch) {
            return Ok(());
        }
        session.attach_local_stream(&local).await?;

        let offer = session.start_call().await?;
        if self.stale(epoch) {
            return Ok(());
        }
        self.publish_signal(&room_id, SignalKind::Offer, &offer).await?;
        let _ = self.events.send(CallEvent::PhaseChanged(SessionPhase::Negotiating));
        Ok(())
    }

    /// Substitute the outgoing camera track with a screen capture
    pub async fn start_screen_share(&self) -> Result<(), CallError> {
        let (_, session, media, epoch) = self.membership_parts().await?;
        let senders = session.senders().await;
        if self.stale(epoch) {
            return Ok(());
        }
        media.start_screen_share(senders).await
    }

    /// End an active screen share and restore the camera track
    pub async fn stop_screen_share(&self) -> Result<(), CallError> {
        let (_, _, media, _) = self.membership_parts().await?;
        media.stop_screen_share().await;
        Ok(())
    }

    /// Begin recording whichever stream is available, preferring the remote
    /// one. Fails with [`CallError::NoRecordingSource`] when neither exists.
    pub async fn start_recording(&self) -> Result<(), CallError> {
        let parts = {
            let state = self.state.lock().await;
            let membership = state.as_ref().ok_or(CallError::NotJoined)?;
            (
                membership.session.clone(),
                membership.media.clone(),
                membership.recorder.clone(),
            )
        };
        let (session, media, recorder) = parts;

        let source = match session.remote_stream().await {
            Some(stream) => Some(stream),
            None => media.local_stream().await,
        };
        recorder.start(source).await?;
        let _ = self.events.send(CallEvent::RecordingStarted);
        Ok(())
    }

    /// Stop recording and hand back the finalized artifact, if a recording
    /// was running
    pub async fn stop_recording(&self) -> Result<Option<RecordingArtifact>, CallError> {
        let recorder = {
            let state = self.state.lock().await;
            state.as_ref().ok_or(CallError::NotJoined)?.recorder.clone()
        };

        let artifact = recorder.stop().await;
        if let Some(artifact) = &artifact {
            let _ = self.events.send(CallEvent::RecordingFinished(artifact.clone()));
        }
        Ok(artifact)
    }

    fn stale(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) != epoch
    }

    async fn membership_parts(
        &self,
    ) -> Result<(String, Arc<PeerSession>, MediaManager, u64), CallError> {
        let state = self.state.lock().await;
        let membership = state.as_ref().ok_or(CallError::NotJoined)?;
        Ok((
            membership.room_id.clone(),
            membership.session.clone(),
            membership.media.clone(),
            self.epoch.load(Ordering::SeqCst),
        ))
    }

    async fn publish_signal<T: Serialize>(
        &self,
        room_id: &str,
        kind: SignalKind,
        payload: &T,
    ) -> Result<(), CallError> {
        let message = SignalMessage {
            room_id: room_id.to_string(),
            sender_id: self.participant_id.clone(),
            kind,
            payload: encode_signal(kind, payload)?,
        };
        self.transport.publish(message).await
    }

    /// Receive loop for one membership's signal subscription. Exits when the
    /// subscription dies or the membership is superseded.
    async fn run_signal_loop(self, mut subscription: SignalSubscription, epoch: u64) {
        let room_id = subscription.room_id().to_string();
        while let Some(message) = subscription.recv().await {
            if self.stale(epoch) {
                break;
            }
            // Self-echo and foreign-room traffic are discarded unconditionally
            if message.sender_id == self.participant_id {
                continue;
            }
            if message.room_id != room_id {
                continue;
            }

            let payload = match decode_signal(&message) {
                Ok(payload) => payload,
                Err(e) => {
                    log::warn!("Dropping undecodable {} from {}: {}", message.kind, message.sender_id, e);
                    continue;
                }
            };

            // Per-message failures are isolated; the loop keeps serving
            if let Err(e) = self.dispatch_signal(&room_id, payload, epoch).await {
                log::warn!(
                    "Handling {} from {} failed: {}",
                    message.kind,
                    message.sender_id,
                    e
                );
            }
        }
        log::debug!("Signal loop for room {} finished", room_id);
    }

    /// Single dispatch point for decoded signals
    async fn dispatch_signal(
        &self,
        room_id: &str,
        payload: SignalPayload,
        epoch: u64,
    ) -> Result<(), CallError> {
        let (session, media) = {
            let state = self.state.lock().await;
            let Some(membership) = state.as_ref() else {
                return Ok(());
            };
            (membership.session.clone(), membership.media.clone())
        };
        if self.stale(epoch) {
            return Ok(());
        }

        match payload {
            SignalPayload::Offer(offer) => {
                let local = media.acquire_local_media().await?;
                if self.stale(epoch) {
                    return Ok(());
                }
                session.attach_local_stream(&local).await?;

                let answer = session.accept_offer(offer).await?;
                if self.stale(epoch) {
                    return Ok(());
                }
                self.publish_signal(room_id, SignalKind::Answer, &answer).await?;
                let _ = self
                    .events
                    .send(CallEvent::PhaseChanged(SessionPhase::Negotiating));
            }
            SignalPayload::Answer(answer) => {
                session.apply_answer(answer).await?;
            }
            SignalPayload::Candidate(candidate) => {
                session.apply_remote_candidate(candidate).await;
            }
        }
        Ok(())
    }

    /// Pump for one session's engine events: candidates out, connectivity
    /// and remote tracks in.
    async fn run_engine_loop(
        self,
        mut events: tokio::sync::mpsc::UnboundedReceiver<EngineEvent>,
        room_id: String,
        session: Arc<PeerSession>,
        epoch: u64,
    ) {
        while let Some(event) = events.recv().await {
            if self.stale(epoch) {
                break;
            }
            match event {
                EngineEvent::LocalCandidate(candidate) => {
                    // Emitted immediately, no batching; a failed publish
                    // loses only this candidate
                    if let Err(e) = self
                        .publish_signal(&room_id, SignalKind::Candidate, &candidate)
                        .await
                    {
                        log::warn!("Failed to publish local candidate: {}", e);
                    }
                }
                EngineEvent::ConnectionState(connection) => {
                    if let Some(phase) = session.handle_connection_state(connection).await {
                        let _ = self.events.send(CallEvent::PhaseChanged(phase));
                        if matches!(phase, SessionPhase::Disconnected | SessionPhase::Failed) {
                            log::warn!("Call connectivity lost ({})", phase);
                            let _ = self.events.send(CallEvent::ConnectivityLost);
                        }
                    }
                }
                EngineEvent::RemoteTrack { stream_id, track } => {
                    if let Some(stream) = session.add_remote_track(&stream_id, track).await {
                        let _ = self.events.send(CallEvent::RemoteStream(stream));
                    }
                }
            }
        }
        log::debug!("Engine loop for room {} finished", room_id);
    }
}
