//! Frame fragmentation protocol.
//!
//! JPEG frames are split into datagram-sized fragments, each prefixed with a
//! fixed binary header carrying the frame sequence number, capture timestamp
//! and fragment bookkeeping. Receivers regroup fragments by sequence and
//! concatenate payloads in index order to recover the frame.

mod header;
pub mod reassembly;

pub use header::{now_ms, FrameHeader};
pub use reassembly::FrameAssembler;

use bytes::{BufMut, Bytes, BytesMut};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use thiserror::Error;

/// Protocol magic constant ("MJPG")
pub const DEFAULT_MAGIC: u32 = 0x4D4A_5047;

/// Fragment header size on the wire
pub const HEADER_SIZE: usize = 24;

/// Default JPEG payload budget per datagram
pub const DEFAULT_MAX_PAYLOAD: usize = 1300;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("header too short: {0} bytes")]
    HeaderTooShort(usize),

    #[error("bad magic: 0x{0:08X}")]
    BadMagic(u32),

    #[error("fragment disagrees with frame bookkeeping: {0}")]
    FragmentMismatch(String),
}

/// Statistics for the packetizer
#[derive(Debug, Clone, Default)]
pub struct PacketizerStats {
    pub frames_split: u64,
    pub fragments_built: u64,
    pub bytes_split: u64,
    pub current_seq: u32,
}

/// Splits one frame into wire-ready fragments.
///
/// Every fragment is `header ‖ payload` with payloads of at most
/// `max_payload` bytes; concatenating payloads in index order reproduces
/// `frame`. An empty frame produces no fragments at all — callers treat that
/// as nothing to send.
pub fn split_frame(
    magic: u32,
    sequence: u32,
    timestamp_ms: u64,
    frame: &[u8],
    max_payload: usize,
) -> Vec<Bytes> {
    let frame_len = frame.len();
    if frame_len == 0 {
        return Vec::new();
    }

    let frag_count = (frame_len + max_payload - 1) / max_payload;
    let mut fragments = Vec::with_capacity(frag_count);

    for frag_index in 0..frag_count {
        let start = frag_index * max_payload;
        let end = (start + max_payload).min(frame_len);
        let payload = &frame[start..end];

        let header = FrameHeader::with_timestamp(
            magic,
            sequence,
            timestamp_ms,
            frame_len as u32,
            frag_index as u16,
            frag_count as u16,
        );

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        buf.put_slice(&header.to_bytes());
        buf.put_slice(payload);

        fragments.push(buf.freeze());
    }

    fragments
}

/// Frame packetizer with sequence tracking.
///
/// Owns the wrapping frame sequence counter and keeps running statistics.
/// Uses atomic operations for thread-safety and minimizes allocations.
pub struct Packetizer {
    magic: u32,
    max_payload: usize,

    // State (atomic for lock-free access)
    sequence: AtomicU32,

    // Statistics
    frames_split: AtomicU64,
    fragments_built: AtomicU64,
    bytes_split: AtomicU64,
}

impl Packetizer {
    /// Creates a new packetizer.
    ///
    /// # Arguments
    /// * `magic` - protocol magic constant stamped into every header
    /// * `max_payload` - payload budget per fragment (0 selects the default)
    pub fn new(magic: u32, max_payload: usize) -> Self {
        let max_payload = if max_payload == 0 {
            DEFAULT_MAX_PAYLOAD
        } else {
            max_payload
        };

        Self {
            magic,
            max_payload,
            sequence: AtomicU32::new(0),
            frames_split: AtomicU64::new(0),
            fragments_built: AtomicU64::new(0),
            bytes_split: AtomicU64::new(0),
        }
    }

    /// Fragments one encoded frame, consuming the next sequence number.
    ///
    /// Returns wire-ready datagrams. An empty frame returns an empty vector
    /// and does not consume a sequence number.
    pub fn packetize(&self, frame: &[u8]) -> Vec<Bytes> {
        if frame.is_empty() {
            return Vec::new();
        }

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let fragments = split_frame(self.magic, sequence, now_ms(), frame, self.max_payload);

        self.frames_split.fetch_add(1, Ordering::Relaxed);
        self.fragments_built
            .fetch_add(fragments.len() as u64, Ordering::Relaxed);
        self.bytes_split
            .fetch_add(frame.len() as u64, Ordering::Relaxed);

        fragments
    }

    /// Payload budget per fragment.
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Sequence number the next frame will be stamped with.
    pub fn next_sequence(&self) -> u32 {
        self.sequence.load(Ordering::Relaxed)
    }

    /// Overrides the sequence counter (useful for wrap tests).
    pub fn set_sequence(&self, seq: u32) {
        self.sequence.store(seq, Ordering::Relaxed);
    }

    /// Gets packetizer statistics
    pub fn stats(&self) -> PacketizerStats {
        PacketizerStats {
            frames_split: self.frames_split.load(Ordering::Relaxed),
            fragments_built: self.fragments_built.load(Ordering::Relaxed),
            bytes_split: self.bytes_split.load(Ordering::Relaxed),
            current_seq: self.sequence.load(Ordering::Relaxed),
        }
    }

    /// Resets sequence and statistics
    pub fn reset(&self) {
        self.sequence.store(0, Ordering::Relaxed);
        self.frames_split.store(0, Ordering::Relaxed);
        self.fragments_built.store(0, Ordering::Relaxed);
        self.bytes_split.store(0, Ordering::Relaxed);
    }
}
