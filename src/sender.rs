//! Send-side state machine.
//!
//! [`Sender`] partitions the outbound content into fixed-size segments and
//! tracks every transmitted segment until the peer confirms it.  Unlike a
//! sliding-window protocol there is no in-flight cap: segments enter the
//! pending set as fast as the caller emits them and leave it one
//! acknowledgment at a time.
//!
//! # Protocol contract
//!
//! - Data frames carry a zero-based segment index; the matching
//!   acknowledgment carries that index **plus one**.
//! - Each acknowledgment confirms exactly one segment.  Duplicate or unknown
//!   acknowledgments are ignored.
//! - A pending segment whose last transmission is older than the caller's
//!   resend threshold is retransmitted as-is and its clock restarts.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::frame::{Frame, SEGMENT_LEN};

/// The input would need more segments than a sequence number can index.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{len} bytes exceed the {max}-segment limit", max = i32::MAX)]
pub struct TooManySegments {
    /// Byte length of the rejected input.
    pub len: usize,
}

// ---------------------------------------------------------------------------
// InFlight
// ---------------------------------------------------------------------------

/// A transmitted segment awaiting its acknowledgment.
#[derive(Debug, Clone)]
struct InFlight {
    frame: Frame,
    /// Total number of times this segment has been transmitted.
    tx_count: u32,
    /// Wall-clock time of the most recent transmission.
    sent_at: Instant,
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Send-side state for one transfer.
///
/// ```text
///      0 ...... next_seq ...... total_segments
///      │            │                │
///  ────┼────────────┼────────────────┼──▶ segment index
///      │◀─ sent ───▶│◀── unsent ────▶│
///         (pending subset awaits ACKs)
/// ```
#[derive(Debug)]
pub struct Sender {
    /// Content being transferred, already read into memory.
    data: Vec<u8>,

    /// Index the next new segment will carry.
    next_seq: i32,

    /// Total number of segments (`ceil(data.len() / SEGMENT_LEN)`).
    total_segments: i32,

    /// Meaningful byte count of the final segment.
    tail_len: u8,

    /// Transmitted segments not yet confirmed, keyed by index.
    pending: BTreeMap<i32, InFlight>,
}

impl Sender {
    /// Create a sender for `data`.
    ///
    /// Fails when the segment count would not fit a sequence number.
    pub fn new(data: Vec<u8>) -> Result<Self, TooManySegments> {
        let segments = data.len().div_ceil(SEGMENT_LEN);
        if segments > i32::MAX as usize {
            return Err(TooManySegments { len: data.len() });
        }
        let tail_len = match data.len() % SEGMENT_LEN {
            0 if data.is_empty() => 0,
            0 => SEGMENT_LEN as u8,
            rest => rest as u8,
        };
        Ok(Self {
            data,
            next_seq: 0,
            total_segments: segments as i32,
            tail_len,
            pending: BTreeMap::new(),
        })
    }

    /// Total number of segments this transfer announces in its handshake.
    pub fn total_segments(&self) -> i32 {
        self.total_segments
    }

    /// Final-segment byte length announced in the handshake.
    pub fn tail_len(&self) -> u8 {
        self.tail_len
    }

    /// `true` while at least one segment awaits acknowledgment.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Number of segments currently awaiting acknowledgment.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// `true` once every segment has been sent and confirmed.
    pub fn is_done(&self) -> bool {
        self.next_seq >= self.total_segments && self.pending.is_empty()
    }

    /// Build the data frame for the next unsent segment.
    ///
    /// Returns `None` once all segments have been handed out.  Call
    /// [`Sender::record_sent`] right after transmitting the frame.
    pub fn build_next(&self) -> Option<Frame> {
        if self.next_seq >= self.total_segments {
            return None;
        }
        let start = self.next_seq as usize * SEGMENT_LEN;
        let end = (start + SEGMENT_LEN).min(self.data.len());
        Some(Frame::data(self.next_seq, &self.data[start..end]))
    }

    /// Place a just-transmitted segment into the pending set and advance the
    /// next sequence number.
    pub fn record_sent(&mut self, frame: Frame) {
        debug_assert_eq!(frame.sequence, self.next_seq);
        self.next_seq = frame.sequence + 1;
        self.pending.insert(
            frame.sequence,
            InFlight {
                frame,
                tx_count: 1,
                sent_at: Instant::now(),
            },
        );
    }

    /// Process an acknowledgment carrying sequence value `ack_seq`.
    ///
    /// Removes the pending entry for segment `ack_seq - 1` and returns its
    /// index, or `None` when nothing matched (duplicate acknowledgment, the
    /// handshake's `0`, or a value this sender never used).
    pub fn on_ack(&mut self, ack_seq: i32) -> Option<i32> {
        let confirmed = ack_seq.checked_sub(1)?;
        self.pending.remove(&confirmed).map(|_| confirmed)
    }

    /// Indices of pending segments whose last transmission is older than
    /// `threshold` as of `now`.
    pub fn due_for_resend(&self, threshold: Duration, now: Instant) -> Vec<i32> {
        self.pending
            .iter()
            .filter(|(_, inflight)| now.duration_since(inflight.sent_at) > threshold)
            .map(|(&seq, _)| seq)
            .collect()
    }

    /// Fetch the frame for a pending segment, refreshing its clock and
    /// transmission count.
    ///
    /// Returns the frame to retransmit and the new transmission count, or
    /// `None` when the segment was confirmed in the meantime.
    pub fn mark_resent(&mut self, seq: i32, now: Instant) -> Option<(Frame, u32)> {
        let inflight = self.pending.get_mut(&seq)?;
        inflight.tx_count += 1;
        inflight.sent_at = now;
        Some((inflight.frame.clone(), inflight.tx_count))
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
