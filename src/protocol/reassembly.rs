//! Receiver-side frame reassembly.
//!
//! Fragments arrive unordered and possibly duplicated; they are grouped by
//! sequence number and a frame is released once every index up to
//! `frag_count` has been seen. Incomplete frames are discarded after a
//! timeout so a lost datagram cannot pin memory forever.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use super::{FrameHeader, ProtocolError, HEADER_SIZE};

/// Default wait before an incomplete frame is dropped.
///
/// Two frame intervals at 20 fps: late reordered fragments still land, a
/// frame missing a datagram is abandoned before the backlog grows.
pub const DEFAULT_ASSEMBLY_TIMEOUT: Duration = Duration::from_millis(100);

struct PendingFrame {
    first_seen: Instant,
    frame_len: u32,
    frag_count: u16,
    payloads: Vec<Option<Bytes>>,
    filled: usize,
}

/// Reassembles fragmented frames from raw datagrams.
pub struct FrameAssembler {
    magic: u32,
    timeout: Duration,
    pending: HashMap<u32, PendingFrame>,
    frames_completed: u64,
    frames_expired: u64,
}

impl FrameAssembler {
    pub fn new(magic: u32) -> Self {
        Self::with_timeout(magic, DEFAULT_ASSEMBLY_TIMEOUT)
    }

    pub fn with_timeout(magic: u32, timeout: Duration) -> Self {
        Self {
            magic,
            timeout,
            pending: HashMap::new(),
            frames_completed: 0,
            frames_expired: 0,
        }
    }

    /// Feeds one received datagram into the assembler.
    ///
    /// Returns the reassembled frame when this fragment completed it, `None`
    /// while the frame is still missing fragments.
    pub fn push(&mut self, datagram: &[u8]) -> Result<Option<Bytes>, ProtocolError> {
        self.evict_stale();

        let header = FrameHeader::from_bytes(datagram, self.magic)?;
        let payload = Bytes::copy_from_slice(&datagram[HEADER_SIZE..]);

        if header.frag_count == 0 || header.frag_index >= header.frag_count {
            return Err(ProtocolError::FragmentMismatch(format!(
                "index {} out of range for count {}",
                header.frag_index, header.frag_count
            )));
        }

        let entry = self
            .pending
            .entry(header.sequence)
            .or_insert_with(|| PendingFrame {
                first_seen: Instant::now(),
                frame_len: header.frame_len,
                frag_count: header.frag_count,
                payloads: vec![None; header.frag_count as usize],
                filled: 0,
            });

        if entry.frag_count != header.frag_count || entry.frame_len != header.frame_len {
            return Err(ProtocolError::FragmentMismatch(format!(
                "sequence {} bookkeeping changed mid-frame",
                header.sequence
            )));
        }

        let slot = &mut entry.payloads[header.frag_index as usize];
        if slot.is_some() {
            // Duplicate datagram, keep the first copy
            return Ok(None);
        }
        *slot = Some(payload);
        entry.filled += 1;

        if entry.filled < entry.frag_count as usize {
            return Ok(None);
        }

        let entry = self
            .pending
            .remove(&header.sequence)
            .ok_or_else(|| ProtocolError::FragmentMismatch("pending frame vanished".into()))?;

        let mut frame = BytesMut::with_capacity(entry.frame_len as usize);
        for payload in entry.payloads.into_iter().flatten() {
            frame.put_slice(&payload);
        }

        if frame.len() != entry.frame_len as usize {
            return Err(ProtocolError::FragmentMismatch(format!(
                "reassembled {} bytes, header promised {}",
                frame.len(),
                entry.frame_len
            )));
        }

        self.frames_completed += 1;
        Ok(Some(frame.freeze()))
    }

    /// Number of frames currently waiting for fragments.
    pub fn pending_frames(&self) -> usize {
        self.pending.len()
    }

    /// Frames fully reassembled so far.
    pub fn frames_completed(&self) -> u64 {
        self.frames_completed
    }

    /// Incomplete frames dropped on timeout so far.
    pub fn frames_expired(&self) -> u64 {
        self.frames_expired
    }

    fn evict_stale(&mut self) {
        let timeout = self.timeout;
        let before = self.pending.len();
        self.pending
            .retain(|_, entry| entry.first_seen.elapsed() < timeout);

        let expired = before - self.pending.len();
        if expired > 0 {
            self.frames_expired += expired as u64;
            debug!(expired, "Dropped incomplete frames");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{split_frame, DEFAULT_MAGIC};

    fn test_frame(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 239) as u8).collect()
    }

    #[test]
    fn test_in_order_reassembly() {
        let frame = test_frame(4000);
        let fragments = split_frame(DEFAULT_MAGIC, 5, 99, &frame, 1300);
        let mut assembler = FrameAssembler::new(DEFAULT_MAGIC);

        let mut result = None;
        for frag in &fragments {
            result = assembler.push(frag).unwrap();
        }

        assert_eq!(result.unwrap(), frame);
        assert_eq!(assembler.pending_frames(), 0);
        assert_eq!(assembler.frames_completed(), 1);
    }

    #[test]
    fn test_out_of_order_reassembly() {
        let frame = test_frame(4000);
        let mut fragments = split_frame(DEFAULT_MAGIC, 5, 99, &frame, 1300);
        fragments.reverse();

        let mut assembler = FrameAssembler::new(DEFAULT_MAGIC);
        let mut result = None;
        for frag in &fragments {
            result = assembler.push(frag).unwrap();
        }

        assert_eq!(result.unwrap(), frame);
    }

    #[test]
    fn test_duplicates_are_idempotent() {
        let frame = test_frame(3000);
        let fragments = split_frame(DEFAULT_MAGIC, 1, 0, &frame, 1300);
        let mut assembler = FrameAssembler::new(DEFAULT_MAGIC);

        assert!(assembler.push(&fragments[0]).unwrap().is_none());
        assert!(assembler.push(&fragments[0]).unwrap().is_none());
        assert!(assembler.push(&fragments[1]).unwrap().is_none());

        let result = assembler.push(&fragments[2]).unwrap();
        assert_eq!(result.unwrap(), frame);
    }

    #[test]
    fn test_interleaved_sequences() {
        let frame_a = test_frame(2600);
        let frame_b = test_frame(1400);
        let frags_a = split_frame(DEFAULT_MAGIC, 10, 0, &frame_a, 1300);
        let frags_b = split_frame(DEFAULT_MAGIC, 11, 0, &frame_b, 1300);

        let mut assembler = FrameAssembler::new(DEFAULT_MAGIC);
        assert!(assembler.push(&frags_a[0]).unwrap().is_none());
        assert!(assembler.push(&frags_b[0]).unwrap().is_none());
        assert_eq!(assembler.pending_frames(), 2);

        let done_b = assembler.push(&frags_b[1]).unwrap();
        assert_eq!(done_b.unwrap(), frame_b);

        let done_a = assembler.push(&frags_a[1]).unwrap();
        assert_eq!(done_a.unwrap(), frame_a);
    }

    #[test]
    fn test_incomplete_frame_expires() {
        let frame = test_frame(3000);
        let fragments = split_frame(DEFAULT_MAGIC, 2, 0, &frame, 1300);
        let mut assembler = FrameAssembler::with_timeout(DEFAULT_MAGIC, Duration::from_millis(0));

        assert!(assembler.push(&fragments[0]).unwrap().is_none());

        // The zero timeout expires the partial frame on the next push, so the
        // late fragment starts a fresh (incomplete) entry.
        assert!(assembler.push(&fragments[1]).unwrap().is_none());
        assert_eq!(assembler.frames_expired(), 1);
    }

    #[test]
    fn test_inconsistent_bookkeeping_rejected() {
        let frame = test_frame(3000);
        let fragments = split_frame(DEFAULT_MAGIC, 3, 0, &frame, 1300);
        let mut assembler = FrameAssembler::new(DEFAULT_MAGIC);
        assert!(assembler.push(&fragments[0]).unwrap().is_none());

        // Same sequence, different fragment count
        let rogue = split_frame(DEFAULT_MAGIC, 3, 0, &test_frame(100), 1300);
        let result = assembler.push(&rogue[0]);
        assert!(matches!(result, Err(ProtocolError::FragmentMismatch(_))));
    }

    #[test]
    fn test_index_out_of_range_rejected() {
        let mut assembler = FrameAssembler::new(DEFAULT_MAGIC);
        let header = FrameHeader::with_timestamp(DEFAULT_MAGIC, 0, 0, 10, 4, 2);
        let mut datagram = header.to_bytes().to_vec();
        datagram.extend_from_slice(&[0u8; 10]);

        let result = assembler.push(&datagram);
        assert!(matches!(result, Err(ProtocolError::FragmentMismatch(_))));
    }
}
