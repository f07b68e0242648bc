//! Receive-side state machine.
//!
//! [`Receiver`] accepts the data frames of one transfer in any order:
//!
//! - Every arrival is classified (stored, duplicate, corrupt, invalid) and
//!   never delivered out of order.
//! - Acknowledgments are **cumulative**: a segment is acknowledged only once
//!   every segment before it has been accepted, so each emitted ACK value is
//!   one plus a newly contiguous index.
//! - Duplicates of already-acknowledged segments are re-acknowledged, which
//!   lets a sender recover when an earlier acknowledgment was lost.
//! - There is no negative acknowledgment of any kind: a discarded frame is
//!   recovered purely by the sender's resend timer.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility (same pattern as [`crate::sender::Sender`]).

use std::collections::HashMap;

use crate::frame::{self, Frame, SEGMENT_LEN};

// ---------------------------------------------------------------------------
// Arrival
// ---------------------------------------------------------------------------

/// Classification of one inbound datagram.
#[derive(Debug, PartialEq, Eq)]
pub enum Arrival {
    /// New valid segment entered the buffer.
    Stored(i32),
    /// Segment already held; a confirmed duplicate was re-acknowledged.
    Duplicate(i32),
    /// Checksum mismatch; the segment was dropped.
    Corrupt(i32),
    /// A repeat of this transfer's connection request.
    Connect,
    /// Wrong length, or a sequence outside the transfer.
    Invalid,
}

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// Receive-side state for one transfer.
#[derive(Debug)]
pub struct Receiver {
    /// Number of segments announced in the handshake.
    total_segments: i32,

    /// Meaningful byte count of the final segment.
    tail_len: u8,

    /// Out-of-order segments waiting for the gap before them to fill.
    pending: HashMap<i32, [u8; SEGMENT_LEN]>,

    /// In-order payload bytes accepted so far (final segment still padded).
    assembled: Vec<u8>,

    /// Highest index of the contiguous acknowledged prefix (`-1` = none).
    last_confirmed: i32,
}

impl Receiver {
    /// Create a receiver for a transfer of `total_segments` segments whose
    /// last segment holds `tail_len` meaningful bytes.
    pub fn new(total_segments: i32, tail_len: u8) -> Self {
        debug_assert!(total_segments >= 0);
        debug_assert!(tail_len as usize <= SEGMENT_LEN);
        debug_assert!((total_segments == 0) == (tail_len == 0));
        Self {
            total_segments,
            tail_len,
            pending: HashMap::new(),
            assembled: Vec::new(),
            last_confirmed: -1,
        }
    }

    /// `true` once every segment has been accepted and acknowledged.
    pub fn is_complete(&self) -> bool {
        self.last_confirmed + 1 >= self.total_segments
    }

    /// Number of segments acknowledged so far.
    pub fn segments_confirmed(&self) -> i32 {
        self.last_confirmed + 1
    }

    /// Process one inbound datagram.
    ///
    /// Returns its classification together with the acknowledgment values to
    /// send back, in order.  A stored segment yields one value per index that
    /// became contiguous; a duplicate of an acknowledged segment yields that
    /// segment's acknowledgment again; a repeated connection request yields
    /// the handshake's `0`.
    ///
    /// The duplicate check runs before checksum verification: the checksum
    /// covers only the payload, and for a segment we already hold the
    /// sequence field alone decides the answer.
    pub fn on_datagram(&mut self, buf: &[u8]) -> (Arrival, Vec<i32>) {
        let Ok(frame) = Frame::decode(buf) else {
            return (Arrival::Invalid, Vec::new());
        };

        // A repeat of the handshake we already answered; the first ACK 0
        // may have been lost.
        if frame.is_connect()
            && frame.sequence == self.total_segments
            && frame.tail_len() == self.tail_len
        {
            return (Arrival::Connect, vec![0]);
        }

        let seq = frame.sequence;
        if seq < 0 || seq >= self.total_segments {
            return (Arrival::Invalid, Vec::new());
        }
        if seq <= self.last_confirmed {
            return (Arrival::Duplicate(seq), vec![seq + 1]);
        }
        if self.pending.contains_key(&seq) {
            // Buffered but not yet contiguous: acknowledging it now would
            // claim a prefix the sender has not completed.
            return (Arrival::Duplicate(seq), Vec::new());
        }
        if !frame::checksum_valid(buf) {
            return (Arrival::Corrupt(seq), Vec::new());
        }

        self.pending.insert(seq, frame.payload);
        (Arrival::Stored(seq), self.sweep())
    }

    /// Move newly contiguous segments into the assembled content, returning
    /// one acknowledgment value per segment confirmed.
    fn sweep(&mut self) -> Vec<i32> {
        let mut acks = Vec::new();
        while let Some(payload) = self.pending.remove(&(self.last_confirmed + 1)) {
            self.assembled.extend_from_slice(&payload);
            self.last_confirmed += 1;
            acks.push(self.last_confirmed + 1);
        }
        acks
    }

    /// Consume the receiver and return the reconstructed content, with the
    /// final segment trimmed to its true length.
    ///
    /// `None` until the transfer [`is_complete`](Receiver::is_complete).
    pub fn into_bytes(mut self) -> Option<Vec<u8>> {
        if !self.is_complete() {
            return None;
        }
        let exact = match self.total_segments {
            0 => 0,
            n => (n as usize - 1) * SEGMENT_LEN + self.tail_len as usize,
        };
        self.assembled.truncate(exact);
        Some(self.assembled)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
