//! Live-socket tests for the UDP control channels.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use robot_mjpeg_streamer::{
    CommandListener, CommandRegistry, CommandSink, DestinationRegistry, SubscriptionListener,
};
use tokio::net::UdpSocket;
use tokio::time::sleep;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

#[derive(Default)]
struct RecordingSink {
    applied: Mutex<Vec<String>>,
}

impl CommandSink for RecordingSink {
    fn apply(&self, token: &str) {
        self.applied.lock().unwrap().push(token.to_string());
    }
}

/// Polls `check` until it passes or a second elapses.
async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    false
}

async fn spawn_subscription_listener(
    destination: Arc<DestinationRegistry>,
) -> (SocketAddr, UdpSocket) {
    let listener = SubscriptionListener::bind(
        SocketAddr::new(LOCALHOST, 0),
        destination,
        5600,
    )
    .await
    .expect("bind subscription listener");

    let addr = listener.local_addr().unwrap();
    tokio::spawn(listener.run());

    let client = UdpSocket::bind(SocketAddr::new(LOCALHOST, 0))
        .await
        .expect("bind client socket");

    (addr, client)
}

async fn spawn_command_listener(
    destination: Arc<DestinationRegistry>,
    commands: Arc<CommandRegistry>,
    sink: Arc<RecordingSink>,
) -> (SocketAddr, UdpSocket) {
    let listener = CommandListener::bind(
        SocketAddr::new(LOCALHOST, 0),
        destination,
        commands,
        sink,
        5600,
    )
    .await
    .expect("bind command listener");

    let addr = listener.local_addr().unwrap();
    tokio::spawn(listener.run());

    let client = UdpSocket::bind(SocketAddr::new(LOCALHOST, 0))
        .await
        .expect("bind client socket");

    (addr, client)
}

#[tokio::test]
async fn test_subscribe_registers_sender_with_named_port() {
    let destination = Arc::new(DestinationRegistry::new());
    let (addr, client) = spawn_subscription_listener(Arc::clone(&destination)).await;

    client
        .send_to(br#"{"type":"subscribe","video_port":6000}"#, addr)
        .await
        .unwrap();

    assert!(eventually(|| destination.get().is_some()).await);

    let registered = destination.get().unwrap();
    assert_eq!(registered.ip(), LOCALHOST);
    assert_eq!(registered.port(), 6000);
}

#[tokio::test]
async fn test_subscribe_without_port_uses_default() {
    let destination = Arc::new(DestinationRegistry::new());
    let (addr, client) = spawn_subscription_listener(Arc::clone(&destination)).await;

    client
        .send_to(br#"{"type":"subscribe"}"#, addr)
        .await
        .unwrap();

    assert!(eventually(|| destination.get().is_some()).await);
    assert_eq!(destination.get().unwrap().port(), 5600);
}

#[tokio::test]
async fn test_new_subscription_replaces_old() {
    let destination = Arc::new(DestinationRegistry::new());
    let (addr, client) = spawn_subscription_listener(Arc::clone(&destination)).await;

    client
        .send_to(br#"{"type":"subscribe","video_port":6000}"#, addr)
        .await
        .unwrap();
    assert!(eventually(|| destination.get().map(|d| d.port()) == Some(6000)).await);

    client
        .send_to(br#"{"type":"subscribe","video_port":6001}"#, addr)
        .await
        .unwrap();
    assert!(eventually(|| destination.get().map(|d| d.port()) == Some(6001)).await);
}

#[tokio::test]
async fn test_command_before_subscription_bootstraps_destination() {
    let destination = Arc::new(DestinationRegistry::new());
    let commands = Arc::new(CommandRegistry::new());
    let sink = Arc::new(RecordingSink::default());

    let (addr, client) = spawn_command_listener(
        Arc::clone(&destination),
        Arc::clone(&commands),
        Arc::clone(&sink),
    )
    .await;

    client
        .send_to(br#"{"type":"cmd","value":"FORWARD"}"#, addr)
        .await
        .unwrap();

    assert!(eventually(|| commands.get() == "FORWARD").await);

    // No subscriber existed, so the command sender becomes the guessed
    // destination on the default video port.
    let seeded = destination.get().expect("destination seeded");
    assert_eq!(seeded.ip(), LOCALHOST);
    assert_eq!(seeded.port(), 5600);

    assert_eq!(*sink.applied.lock().unwrap(), vec!["FORWARD"]);
}

#[tokio::test]
async fn test_command_never_overrides_existing_destination() {
    let destination = Arc::new(DestinationRegistry::new());
    let existing: SocketAddr = "10.0.0.5:6000".parse().unwrap();
    destination.set(existing);

    let commands = Arc::new(CommandRegistry::new());
    let sink = Arc::new(RecordingSink::default());

    let (addr, client) = spawn_command_listener(
        Arc::clone(&destination),
        Arc::clone(&commands),
        Arc::clone(&sink),
    )
    .await;

    client
        .send_to(br#"{"type":"cmd","value":"LEFT"}"#, addr)
        .await
        .unwrap();

    assert!(eventually(|| commands.get() == "LEFT").await);
    assert_eq!(destination.get(), Some(existing));
}

#[tokio::test]
async fn test_malformed_datagrams_leave_state_untouched() {
    let destination = Arc::new(DestinationRegistry::new());
    let commands = Arc::new(CommandRegistry::new());
    let sink = Arc::new(RecordingSink::default());

    let (sub_addr, sub_client) = spawn_subscription_listener(Arc::clone(&destination)).await;
    let (cmd_addr, cmd_client) = spawn_command_listener(
        Arc::clone(&destination),
        Arc::clone(&commands),
        Arc::clone(&sink),
    )
    .await;

    for garbage in [
        &b"{not json"[..],
        &[0xFF, 0xFE, 0x00][..],
        &br#"{"video_port":6000}"#[..],
    ] {
        sub_client.send_to(garbage, sub_addr).await.unwrap();
        cmd_client.send_to(garbage, cmd_addr).await.unwrap();
    }

    sleep(Duration::from_millis(100)).await;
    assert_eq!(destination.get(), None);
    assert_eq!(commands.get(), "STOP");
    assert!(sink.applied.lock().unwrap().is_empty());

    // Both listeners must still be alive and processing
    sub_client
        .send_to(br#"{"type":"subscribe","video_port":6000}"#, sub_addr)
        .await
        .unwrap();
    assert!(eventually(|| destination.get().map(|d| d.port()) == Some(6000)).await);

    cmd_client
        .send_to(br#"{"type":"cmd","value":"RIGHT"}"#, cmd_addr)
        .await
        .unwrap();
    assert!(eventually(|| commands.get() == "RIGHT").await);
}

#[tokio::test]
async fn test_command_without_value_is_ignored() {
    let destination = Arc::new(DestinationRegistry::new());
    let commands = Arc::new(CommandRegistry::new());
    let sink = Arc::new(RecordingSink::default());

    let (addr, client) = spawn_command_listener(
        Arc::clone(&destination),
        Arc::clone(&commands),
        Arc::clone(&sink),
    )
    .await;

    client.send_to(br#"{"type":"cmd"}"#, addr).await.unwrap();
    client
        .send_to(br#"{"type":"cmd","value":""}"#, addr)
        .await
        .unwrap();

    // A valid JSON datagram still bootstraps the destination even when the
    // command itself is unusable.
    assert!(eventually(|| destination.get().is_some()).await);

    sleep(Duration::from_millis(50)).await;
    assert_eq!(commands.get(), "STOP");
    assert!(sink.applied.lock().unwrap().is_empty());
}
