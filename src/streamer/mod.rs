//! Transmission loop: camera frames → fragments → UDP.
//!
//! Paced by a fixed-rate interval. Each tick reads the destination registry
//! exactly once; with no subscriber the tick is an idle wait, with one the
//! freshest captured frame is fragmented and every fragment goes to that
//! single address — a subscriber change lands on the next tick, never in
//! the middle of a frame.

mod stats;

pub use stats::StreamerStats;

use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::protocol::Packetizer;
use crate::registry::DestinationRegistry;

#[derive(Error, Debug)]
pub enum StreamerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// UDP sender for fragmented MJPEG frames.
pub struct Streamer {
    socket: UdpSocket,
    destination: Arc<DestinationRegistry>,
    frame_rx: mpsc::Receiver<Bytes>,
    packetizer: Packetizer,
    fps: u32,
    stats: StreamerStats,
}

impl Streamer {
    /// Binds the video socket on an OS-assigned port.
    pub async fn new(
        magic: u32,
        max_payload: usize,
        fps: u32,
        destination: Arc<DestinationRegistry>,
        frame_rx: mpsc::Receiver<Bytes>,
    ) -> Result<Self, StreamerError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;

        info!(
            local = %socket.local_addr()?,
            fps = %fps,
            max_payload = %max_payload,
            "Video streamer ready"
        );

        Ok(Self {
            socket,
            destination,
            frame_rx,
            packetizer: Packetizer::new(magic, max_payload),
            fps: fps.max(1),
            stats: StreamerStats::default(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, StreamerError> {
        Ok(self.socket.local_addr()?)
    }

    /// Runs the loop until the capture channel closes.
    pub async fn run(mut self) {
        info!("Transmission loop started");

        let period = Duration::from_secs_f64(1.0 / self.fps as f64);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            // One registry read per tick; every fragment of this frame goes
            // to the same address even if a new subscriber lands mid-send.
            let Some(dest) = self.destination.get() else {
                self.stats.idle_ticks += 1;
                continue;
            };

            let Some(frame) = self.freshest_frame().await else {
                info!("Capture channel closed, transmission loop exiting");
                return;
            };

            self.send_frame(&frame, dest).await;

            if self.stats.frames_sent % 100 == 0 && self.stats.frames_sent > 0 {
                debug!(
                    frames = %self.stats.frames_sent,
                    fragments = %self.stats.fragments_sent,
                    errors = %self.stats.send_errors,
                    stale_dropped = %self.stats.stale_frames_dropped,
                    "Streaming progress"
                );
            }
        }
    }

    /// Waits for a frame, then drains any backlog so a slow tick never
    /// sends an old frame. Returns `None` once the capture side is gone.
    async fn freshest_frame(&mut self) -> Option<Bytes> {
        let mut frame = self.frame_rx.recv().await?;

        let mut stale = 0u64;
        while let Ok(newer) = self.frame_rx.try_recv() {
            frame = newer;
            stale += 1;
        }
        self.stats.stale_frames_dropped += stale;

        Some(frame)
    }

    async fn send_frame(&mut self, frame: &[u8], dest: SocketAddr) {
        let fragments = self.packetizer.packetize(frame);
        if fragments.is_empty() {
            // Zero-length frame: nothing to send, not an error
            return;
        }

        let mut errors = 0u64;
        for (i, fragment) in fragments.iter().enumerate() {
            if let Err(e) = self.socket.send_to(fragment, dest).await {
                error!(
                    error = %e,
                    fragment = %i,
                    total = %fragments.len(),
                    dest = %dest,
                    "Failed to send video fragment"
                );
                errors += 1;
            }
        }

        self.stats.fragments_sent += fragments.len() as u64 - errors;
        if errors > 0 {
            self.stats.send_errors += 1;
        } else {
            self.stats.frames_sent += 1;
            self.stats.bytes_sent += frame.len() as u64;
        }
    }

    /// Snapshot of the loop's counters.
    pub fn stats(&self) -> StreamerStats {
        self.stats.clone()
    }
}
