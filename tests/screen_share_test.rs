//! Screen-share substitution and restore tests
//!
//! The substitution must be live (no renegotiation) and the pre-share track
//! must come back on the same sender when the screen track ends, whether the
//! end came from this app or out-of-band from the OS.

use peercall::config::CallConfig;
use peercall::media::{MediaDevices, TrackKind};
use peercall::room::RoomController;
use peercall::session::SessionEngineFactory;
use peercall::signal::{LocalBus, SignalingTransport};
use peercall::testing::{FakeEngineFactory, FakeMediaDevices, TestEngineHandle};
use std::sync::Arc;
use std::time::Duration;

async fn sharing_controller() -> (RoomController, TestEngineHandle, Arc<FakeMediaDevices>) {
    let bus = Arc::new(LocalBus::default());
    let devices = Arc::new(FakeMediaDevices::new());
    let engines = Arc::new(FakeEngineFactory::new());
    let controller = RoomController::new(
        CallConfig::default(),
        bus as Arc<dyn SignalingTransport>,
        devices.clone() as Arc<dyn MediaDevices>,
        engines.clone() as Arc<dyn SessionEngineFactory>,
    );

    controller.join("share-room").await.unwrap();
    controller.start_call().await.unwrap();
    let handle = engines.handles().remove(0);
    (controller, handle, devices)
}

fn video_sender(handle: &TestEngineHandle) -> peercall::media::TrackSender {
    handle
        .senders()
        .into_iter()
        .find(|s| s.kind() == TrackKind::Video)
        .expect("start_call should have attached a video sender")
}

async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never held: {}", what);
}

#[tokio::test]
async fn share_substitutes_the_transmitting_video_track() {
    let (controller, handle, devices) = sharing_controller().await;
    let sender = video_sender(&handle);
    let camera = sender.current_track().await.unwrap();

    controller.start_screen_share().await.unwrap();

    let current = sender.current_track().await.unwrap();
    assert_ne!(current.id(), camera.id());
    assert_eq!(current.label(), "fake-screen");
    assert_eq!(devices.display_requests(), 1);
    // The camera track stays live, only detached from the sender
    assert!(camera.is_live());

    controller.leave().await;
}

#[tokio::test]
async fn out_of_band_end_restores_the_original_track() {
    let (controller, handle, _) = sharing_controller().await;
    let sender = video_sender(&handle);
    let camera = sender.current_track().await.unwrap();

    controller.start_screen_share().await.unwrap();
    let screen = sender.current_track().await.unwrap();

    // The user stops sharing from the OS chrome, not through this app
    screen.stop();

    eventually("camera track restored on the same sender", || async {
        sender
            .current_track()
            .await
            .map(|t| t.id() == camera.id())
            .unwrap_or(false)
    })
    .await;

    controller.leave().await;
}

#[tokio::test]
async fn explicit_stop_restores_the_original_track() {
    let (controller, handle, _) = sharing_controller().await;
    let sender = video_sender(&handle);
    let camera = sender.current_track().await.unwrap();

    controller.start_screen_share().await.unwrap();
    controller.stop_screen_share().await.unwrap();

    let restored = sender.current_track().await.unwrap();
    assert_eq!(restored.id(), camera.id());

    controller.leave().await;
}

#[tokio::test]
async fn share_can_restart_after_restore() {
    let (controller, handle, devices) = sharing_controller().await;
    let sender = video_sender(&handle);

    controller.start_screen_share().await.unwrap();
    controller.stop_screen_share().await.unwrap();
    controller.start_screen_share().await.unwrap();

    assert_eq!(devices.display_requests(), 2);
    assert_eq!(sender.current_track().await.unwrap().label(), "fake-screen");

    controller.leave().await;
}

#[tokio::test]
async fn denied_display_capture_leaves_the_camera_transmitting() {
    let bus = Arc::new(LocalBus::default());
    let devices = Arc::new(FakeMediaDevices::denying_display());
    let engines = Arc::new(FakeEngineFactory::new());
    let controller = RoomController::new(
        CallConfig::default(),
        bus as Arc<dyn SignalingTransport>,
        devices as Arc<dyn MediaDevices>,
        engines.clone() as Arc<dyn SessionEngineFactory>,
    );
    controller.join("share-room").await.unwrap();
    controller.start_call().await.unwrap();

    let err = controller.start_screen_share().await.unwrap_err();
    assert!(matches!(err, peercall::CallError::PermissionDenied(_)));

    let sender = video_sender(&engines.handles().remove(0));
    assert_eq!(sender.current_track().await.unwrap().label(), "fake-camera");

    controller.leave().await;
}
