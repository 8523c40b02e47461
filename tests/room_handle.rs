//! Driving a spawned room session through its handle.

mod common;

use common::*;
use meshroom::error::RoomError;
use meshroom::media::TrackKind;
use meshroom::peer::PeerState;
use meshroom::room::RoomUpdate;
use meshroom::signaling::{MessageKind, ServerMessage};

#[tokio::test]
async fn actions_and_signals_share_one_event_loop() {
    let fixture = Fixture::new();
    let channel = fixture.channel.clone();
    let signaling = fixture.signaling.clone();
    let handle = fixture.session.spawn();
    let mut updates = handle.subscribe();

    handle.join("R1", "A").await.unwrap();
    channel.deliver(ServerMessage::UserJoined(vec![joined_user("b1", "B")]));
    channel.deliver(answer_from("b1"));

    // снимок обрабатывается после уже поставленных в очередь сигналов
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.room_id.as_deref(), Some("R1"));
    assert_eq!(snapshot.peer("b1").unwrap().state, PeerState::Connected);
    assert_eq!(signaling.count(MessageKind::CallOffer), 1);

    assert!(!handle.toggle_local_track(TrackKind::Audio).await.unwrap());
    let snapshot = handle.snapshot().await.unwrap();
    assert!(!snapshot.membership.get("A").unwrap().audio);

    assert!(matches!(
        updates.recv().await,
        Ok(RoomUpdate::Joined { room_id }) if room_id == "R1"
    ));

    handle.shutdown().await.unwrap();
    assert_eq!(signaling.count(MessageKind::UserLeft), 1);
    assert_eq!(
        handle.snapshot().await.unwrap_err(),
        RoomError::SessionClosed
    );
}

#[tokio::test]
async fn handle_reports_action_errors() {
    let fixture = Fixture::new();
    let handle = fixture.session.spawn();

    assert_eq!(
        handle.start_screen_share().await.unwrap_err(),
        RoomError::NotJoined
    );
    assert_eq!(
        handle.switch_camera_device("cam2").await.unwrap_err(),
        RoomError::NotJoined
    );

    handle.join("R1", "A").await.unwrap();
    handle.start_screen_share().await.unwrap();
    handle.switch_camera_device("cam2").await.unwrap();
    handle.stop_screen_share().await.unwrap();
    handle.leave_room().await.unwrap();
    handle.leave_room().await.unwrap();

    let snapshot = handle.snapshot().await.unwrap();
    assert!(!snapshot.is_joined());
}

#[tokio::test]
async fn session_loop_can_move_between_threads() {
    fn assert_send<T: Send>(_: &T) {}

    let fixture = Fixture::new();
    let run = fixture.session.run();
    assert_send(&run);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn track_actions_run_on_a_multi_thread_runtime() {
    let fixture = Fixture::new();
    let channel = fixture.channel.clone();
    let transports = fixture.transports.clone();
    let handle = fixture.session.spawn();

    handle.join("R1", "A").await.unwrap();
    channel.deliver(ServerMessage::UserJoined(vec![joined_user("b1", "B")]));
    channel.deliver(answer_from("b1"));

    handle.start_screen_share().await.unwrap();
    let snapshot = handle.snapshot().await.unwrap();
    let screen = snapshot.peer("b1").unwrap().outgoing_video.clone().unwrap();
    assert_eq!(transports.replacements_for("b1"), vec![screen.id().to_owned()]);

    handle.stop_screen_share().await.unwrap();
    let snapshot = handle.snapshot().await.unwrap();
    let camera = snapshot.camera_video.clone().unwrap();
    assert_eq!(
        snapshot.peer("b1").unwrap().outgoing_video.as_ref().unwrap().id(),
        camera.id()
    );

    handle.shutdown().await.unwrap();
}
