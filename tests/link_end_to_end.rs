use robolink::actuator::ActuatorServer;
use robolink::controller::{ControllerHandle, ControllerSettings};
use robolink::input::{ControlMode, Point, PointerEvent, Surface};
use robolink::link::{ChannelSettings, ChannelStatus, ResilientChannel, WsConnector};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const PATIENCE: Duration = Duration::from_secs(10);

async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(PATIENCE, future)
        .await
        .expect("timed out waiting for the link")
}

async fn wait_for_status(
    status: &mut watch::Receiver<ChannelStatus>,
    predicate: impl FnMut(&ChannelStatus) -> bool,
) -> ChannelStatus {
    within(status.wait_for(predicate)).await.unwrap().clone()
}

fn connect(server: &ActuatorServer, settings: ChannelSettings) -> ResilientChannel {
    ResilientChannel::spawn(
        format!("ws://{}", server.local_addr()),
        settings,
        Arc::new(WsConnector),
    )
}

#[tokio::test]
async fn drag_reaches_the_robot() {
    let server = ActuatorServer::bind("127.0.0.1:0").await.unwrap();
    let channel = connect(&server, ChannelSettings::default());
    wait_for_status(&mut channel.subscribe(), |s| s.connected).await;

    let settings = ControllerSettings {
        initial_surface: Some(Surface::new(200.0, 200.0, 60.0)),
        ..ControllerSettings::default()
    };
    let controller = ControllerHandle::spawn(Some(settings), channel.sender()).unwrap();

    // Full travel upwards on the speed control
    controller
        .pointer(ControlMode::Speed, PointerEvent::Down(Point::new(100.0, 30.0)))
        .await
        .unwrap();
    // Full travel right on the direction control
    controller
        .pointer(ControlMode::Direction, PointerEvent::Down(Point::new(170.0, 100.0)))
        .await
        .unwrap();

    let mut robot = server.subscribe();
    let state = within(robot.wait_for(|s| s.speed > 99.0 && s.direction.x > 99.0))
        .await
        .unwrap()
        .clone();
    assert!(state.speed <= 100.0);
    assert_eq!(state.direction.y, 0.0);

    // Releasing brings both back to exact rest
    controller
        .pointer(ControlMode::Speed, PointerEvent::Up)
        .await
        .unwrap();
    controller
        .pointer(ControlMode::Direction, PointerEvent::Leave)
        .await
        .unwrap();
    let state = within(robot.wait_for(|s| s.speed == 0.0 && s.direction.x == 0.0))
        .await
        .unwrap()
        .clone();
    assert_eq!(state.direction.y, 0.0);

    controller.shutdown().await;
    channel.shutdown().await;
    server.shutdown().await;
}

#[tokio::test]
async fn robot_going_away_starts_reconnecting() {
    let server = ActuatorServer::bind("127.0.0.1:0").await.unwrap();
    let channel = connect(
        &server,
        ChannelSettings {
            reconnect_delay_ms: 500,
            max_reconnect_attempts: 2,
        },
    );
    let mut status = channel.subscribe();
    wait_for_status(&mut status, |s| s.connected).await;

    server.shutdown().await;

    let snapshot = wait_for_status(&mut status, |s| s.reconnecting).await;
    assert!(!snapshot.connected);
    assert_eq!(
        snapshot.error.as_deref(),
        Some("Reconnecting... (Attempt 1/2)")
    );

    let snapshot = wait_for_status(&mut status, |s| !s.connected && !s.reconnecting).await;
    assert_eq!(
        snapshot.error.as_deref(),
        Some("Max reconnection attempts reached")
    );
    channel.shutdown().await;
}

#[tokio::test]
async fn intentional_disconnect_is_final_until_reconnect() {
    let server = ActuatorServer::bind("127.0.0.1:0").await.unwrap();
    let channel = connect(
        &server,
        ChannelSettings {
            reconnect_delay_ms: 100,
            max_reconnect_attempts: 5,
        },
    );
    let mut status = channel.subscribe();
    wait_for_status(&mut status, |s| s.connected).await;

    channel.disconnect();
    let snapshot = wait_for_status(&mut status, |s| !s.connected).await;
    assert_eq!(snapshot, ChannelStatus::default());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(channel.status(), ChannelStatus::default());

    channel.reconnect();
    wait_for_status(&mut status, |s| s.connected).await;

    channel.shutdown().await;
    server.shutdown().await;
}
