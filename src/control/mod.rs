//! UDP control channels.
//!
//! Two JSON-over-datagram listeners: one registers video subscribers, one
//! accepts steering commands. Both mutate the shared registries and both
//! survive any malformed datagram — a bad payload is logged and dropped,
//! never an excuse to stop listening.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::Deserialize;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::actuator::CommandSink;
use crate::registry::{CommandRegistry, DestinationRegistry};

/// Largest control datagram we accept.
const MAX_CONTROL_DATAGRAM: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Subscribe,
    Cmd,
    /// Anything else on the wire; ignored rather than treated as an error.
    #[serde(other)]
    Unknown,
}

/// Control-channel message, shared by both listeners.
///
/// `{"type":"subscribe","video_port":6000}` registers the sender for video;
/// `{"type":"cmd","value":"FORWARD"}` steers the robot. The sender address
/// always comes from the transport, never from the payload.
#[derive(Debug, Deserialize)]
pub struct ControlMessage {
    #[serde(rename = "type")]
    pub msg_type: MessageType,

    /// UDP port the subscriber wants video on. A value that is not a port
    /// number is treated as absent, falling back to the configured default.
    #[serde(default, deserialize_with = "lenient_port")]
    pub video_port: Option<u16>,

    /// Command token for `cmd` messages.
    #[serde(default)]
    pub value: Option<String>,
}

impl ControlMessage {
    pub fn parse(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

fn lenient_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(coerce_port))
}

fn coerce_port(value: &serde_json::Value) -> Option<u16> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Listener for subscriber registrations.
pub struct SubscriptionListener {
    socket: UdpSocket,
    destination: Arc<DestinationRegistry>,
    default_video_port: u16,
}

impl SubscriptionListener {
    pub async fn bind(
        addr: SocketAddr,
        destination: Arc<DestinationRegistry>,
        default_video_port: u16,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        info!(local = %socket.local_addr()?, "Subscription listener ready");

        Ok(Self {
            socket,
            destination,
            default_video_port,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receive loop; runs until the socket itself fails.
    pub async fn run(self) {
        let mut buf = vec![0u8; MAX_CONTROL_DATAGRAM];

        loop {
            let (len, peer) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    warn!(error = %e, "Subscription socket failed, listener exiting");
                    return;
                }
            };

            self.handle_datagram(&buf[..len], peer);
        }
    }

    fn handle_datagram(&self, data: &[u8], peer: SocketAddr) {
        let msg = match ControlMessage::parse(data) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(peer = %peer, error = %e, "Dropping malformed subscription datagram");
                return;
            }
        };

        match msg.msg_type {
            MessageType::Subscribe => {
                let port = msg.video_port.unwrap_or(self.default_video_port);
                let subscriber = SocketAddr::new(peer.ip(), port);
                self.destination.set(subscriber);
                info!(subscriber = %subscriber, "Video subscriber registered");
            }
            other => {
                debug!(peer = %peer, msg_type = ?other, "Ignoring non-subscribe message");
            }
        }
    }
}

/// Listener for steering commands.
///
/// Also seeds the destination registry from the command sender when no
/// subscriber has registered yet: command traffic can bootstrap video
/// delivery, at the cost of guessing the subscriber's video port.
pub struct CommandListener {
    socket: UdpSocket,
    destination: Arc<DestinationRegistry>,
    commands: Arc<CommandRegistry>,
    sink: Arc<dyn CommandSink>,
    default_video_port: u16,
}

impl CommandListener {
    pub async fn bind(
        addr: SocketAddr,
        destination: Arc<DestinationRegistry>,
        commands: Arc<CommandRegistry>,
        sink: Arc<dyn CommandSink>,
        default_video_port: u16,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        info!(local = %socket.local_addr()?, "Command listener ready");

        Ok(Self {
            socket,
            destination,
            commands,
            sink,
            default_video_port,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receive loop; runs until the socket itself fails.
    pub async fn run(self) {
        let mut buf = vec![0u8; MAX_CONTROL_DATAGRAM];

        loop {
            let (len, peer) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    warn!(error = %e, "Command socket failed, listener exiting");
                    return;
                }
            };

            self.handle_datagram(&buf[..len], peer);
        }
    }

    fn handle_datagram(&self, data: &[u8], peer: SocketAddr) {
        let msg = match ControlMessage::parse(data) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(peer = %peer, error = %e, "Dropping malformed command datagram");
                return;
            }
        };

        // Degraded-mode bootstrap: first contact on either channel makes the
        // sender the video destination, on the default video port.
        let guessed = SocketAddr::new(peer.ip(), self.default_video_port);
        if self.destination.set_if_absent(guessed) {
            info!(subscriber = %guessed, "No subscriber yet, seeding destination from command sender");
        }

        match msg.msg_type {
            MessageType::Cmd => match msg.value.as_deref() {
                Some(token) if !token.is_empty() => {
                    self.commands.set(token);
                    self.sink.apply(token);
                }
                _ => {
                    debug!(peer = %peer, "Command message without a value, ignoring");
                }
            },
            other => {
                debug!(peer = %peer, msg_type = ?other, "Ignoring non-command message");
            }
        }
    }
}
