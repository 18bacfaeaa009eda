//! Streaming statistics

use serde::{Deserialize, Serialize};

/// Counters for the transmission loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamerStats {
    /// Frames fully packetized and sent
    pub frames_sent: u64,

    /// Video datagrams sent
    pub fragments_sent: u64,

    /// Frame payload bytes sent (headers excluded)
    pub bytes_sent: u64,

    /// Frames whose send hit at least one socket error
    pub send_errors: u64,

    /// Ticks spent with no destination registered
    pub idle_ticks: u64,

    /// Backlogged frames skipped in favor of a fresher one
    pub stale_frames_dropped: u64,
}

impl StreamerStats {
    /// Calculates frame rate based on delta
    pub fn calculate_fps(&self, previous: &Self, elapsed_secs: f64) -> f64 {
        if elapsed_secs == 0.0 {
            return 0.0;
        }

        let frames_delta = self.frames_sent.saturating_sub(previous.frames_sent);
        frames_delta as f64 / elapsed_secs
    }

    /// Calculates bitrate in kbps based on delta
    pub fn calculate_bitrate_kbps(&self, previous: &Self, elapsed_secs: f64) -> f64 {
        if elapsed_secs == 0.0 {
            return 0.0;
        }

        let bytes_delta = self.bytes_sent.saturating_sub(previous.bytes_sent);
        (bytes_delta as f64 * 8.0) / elapsed_secs / 1000.0
    }
}
