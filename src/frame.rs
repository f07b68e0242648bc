//! Wire-format definitions for transfer frames.
//!
//! Every datagram exchanged between peers is a [`Frame`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (payload, checksum, sequence).
//! - Serialising a [`Frame`] into a fixed-size buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Frame`], rejecting
//!   datagrams of the wrong length.
//! - Verifying the stored checksum of a raw datagram.
//!
//! No I/O happens here — this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.  Every frame is exactly
//! [`FRAME_LEN`] = 22 bytes; a datagram of any other length is malformed and
//! dropped by the caller.
//!
//! ```text
//!  offset  0                   10                     18           22
//!          +-------------------+----------------------+------------+
//!          |      payload      |       checksum       |  sequence  |
//!          |     10 bytes      | CRC-32 of payload as |  i32 (BE)  |
//!          |                   |       u64 (BE)       |            |
//!          +-------------------+----------------------+------------+
//! ```
//!
//! The checksum covers the payload bytes only.  Sequence corruption is
//! handled by the duplicate/range logic further up, not by the CRC.
//!
//! # Sequence field meaning
//!
//! | frame kind      | payload                       | sequence              |
//! |-----------------|-------------------------------|-----------------------|
//! | data            | file bytes (tail zero-padded) | segment index (0-based) |
//! | `CONNECT`       | `b"CONNECT"` + tail length    | total segment count   |
//! | handshake `ACK` | `b"ACK"` + zero padding       | `0`                   |
//! | data `ACK`      | `b"ACK"` + zero padding       | confirmed index + 1   |

use thiserror::Error;

/// Byte length of the payload carried by every frame.
pub const SEGMENT_LEN: usize = 10;
/// Byte length of the checksum field on the wire.
pub const CHECKSUM_LEN: usize = 8;
/// Byte length of the sequence field on the wire.
pub const SEQ_LEN: usize = 4;
/// Total frame size: the only datagram length the protocol accepts.
pub const FRAME_LEN: usize = SEGMENT_LEN + CHECKSUM_LEN + SEQ_LEN;

// Byte offsets of each field within the serialised frame.
const OFF_CHECKSUM: usize = SEGMENT_LEN;
const OFF_SEQ: usize = SEGMENT_LEN + CHECKSUM_LEN;

// Reserved payload tags.  `ACK` fills the rest of the payload with zeros;
// `CONNECT` carries the final-segment byte length right after the tag.
const ACK_TAG: &[u8] = b"ACK";
const CONNECT_TAG: &[u8] = b"CONNECT";
const OFF_TAIL_LEN: usize = CONNECT_TAG.len();

/// A protocol frame: one payload segment plus its sequence number.
///
/// The checksum is not stored here — [`Frame::encode`] computes it and
/// [`checksum_valid`] verifies it on the raw bytes, so a decoded frame never
/// carries a stale field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Payload bytes, zero-padded to [`SEGMENT_LEN`].
    pub payload: [u8; SEGMENT_LEN],
    /// Sequence field; see the module table for its meaning per frame kind.
    pub sequence: i32,
}

impl Frame {
    /// Build a data frame for one file segment.
    ///
    /// `segment` may be shorter than [`SEGMENT_LEN`] (the final segment of a
    /// transfer usually is); the payload is zero-padded to full width.
    pub fn data(sequence: i32, segment: &[u8]) -> Self {
        debug_assert!(segment.len() <= SEGMENT_LEN);
        let mut payload = [0u8; SEGMENT_LEN];
        payload[..segment.len()].copy_from_slice(segment);
        Self { payload, sequence }
    }

    /// Build an acknowledgment frame.
    ///
    /// `ack_seq` is `0` for the handshake reply, otherwise one plus the
    /// confirmed segment index.
    pub fn ack(ack_seq: i32) -> Self {
        let mut payload = [0u8; SEGMENT_LEN];
        payload[..ACK_TAG.len()].copy_from_slice(ACK_TAG);
        Self {
            payload,
            sequence: ack_seq,
        }
    }

    /// Build a connection request announcing `total_segments` segments, the
    /// last of which holds `tail_len` meaningful bytes.
    ///
    /// `tail_len` is in `1..=10` for a non-empty transfer and `0` for an
    /// empty one.
    pub fn connect(total_segments: i32, tail_len: u8) -> Self {
        debug_assert!(tail_len as usize <= SEGMENT_LEN);
        let mut payload = [0u8; SEGMENT_LEN];
        payload[..CONNECT_TAG.len()].copy_from_slice(CONNECT_TAG);
        payload[OFF_TAIL_LEN] = tail_len;
        Self {
            payload,
            sequence: total_segments,
        }
    }

    /// Serialise this frame into its on-wire form, computing the checksum.
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut buf = [0u8; FRAME_LEN];
        buf[..SEGMENT_LEN].copy_from_slice(&self.payload);
        let crc = u64::from(checksum(&self.payload));
        buf[OFF_CHECKSUM..OFF_CHECKSUM + CHECKSUM_LEN].copy_from_slice(&crc.to_be_bytes());
        buf[OFF_SEQ..OFF_SEQ + SEQ_LEN].copy_from_slice(&self.sequence.to_be_bytes());
        buf
    }

    /// Serialise this frame with the checksum field forced to zero.
    ///
    /// Used by the fault injector to simulate corruption in transit.  The
    /// result fails [`checksum_valid`] unless the payload's genuine CRC
    /// happens to be zero.
    pub fn encode_corrupted(&self) -> [u8; FRAME_LEN] {
        let mut buf = self.encode();
        buf[OFF_CHECKSUM..OFF_CHECKSUM + CHECKSUM_LEN].fill(0);
        buf
    }

    /// Parse a [`Frame`] from a raw byte slice.
    ///
    /// Returns [`FrameError::WrongLength`] unless `buf` is exactly
    /// [`FRAME_LEN`] bytes.  The checksum is **not** verified here — whether
    /// a mismatch matters depends on the frame kind, so that decision
    /// belongs to the receive path (see [`checksum_valid`]).
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() != FRAME_LEN {
            return Err(FrameError::WrongLength(buf.len()));
        }
        let mut payload = [0u8; SEGMENT_LEN];
        payload.copy_from_slice(&buf[..SEGMENT_LEN]);
        let sequence = i32::from_be_bytes(buf[OFF_SEQ..OFF_SEQ + SEQ_LEN].try_into().unwrap());
        Ok(Self { payload, sequence })
    }

    /// `true` when the payload is the reserved acknowledgment payload.
    pub fn is_ack(&self) -> bool {
        is_ack_payload(&self.payload)
    }

    /// `true` when the payload is a connection request.
    ///
    /// Matches on the tag plus zeroed trailing bytes; the byte at
    /// [`Frame::tail_len`] may hold any value.
    pub fn is_connect(&self) -> bool {
        is_connect_payload(&self.payload)
    }

    /// Final-segment byte length carried by a `CONNECT` payload.
    ///
    /// Meaningless for other frame kinds.
    pub fn tail_len(&self) -> u8 {
        self.payload[OFF_TAIL_LEN]
    }
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The datagram is not exactly [`FRAME_LEN`] bytes.
    #[error("datagram is {0} bytes, expected exactly {FRAME_LEN}")]
    WrongLength(usize),
}

/// `true` when `payload` is the reserved acknowledgment payload.
pub fn is_ack_payload(payload: &[u8]) -> bool {
    payload.len() == SEGMENT_LEN
        && payload[..ACK_TAG.len()] == *ACK_TAG
        && payload[ACK_TAG.len()..].iter().all(|&b| b == 0)
}

/// `true` when `payload` is a connection-request payload.
pub fn is_connect_payload(payload: &[u8]) -> bool {
    payload.len() == SEGMENT_LEN
        && payload[..CONNECT_TAG.len()] == *CONNECT_TAG
        && payload[OFF_TAIL_LEN + 1..].iter().all(|&b| b == 0)
}

/// Payload bytes of a raw datagram, without a full decode.
///
/// `None` unless `buf` is exactly [`FRAME_LEN`] bytes.
pub fn payload_of(buf: &[u8]) -> Option<&[u8]> {
    (buf.len() == FRAME_LEN).then(|| &buf[..SEGMENT_LEN])
}

/// Sequence field of a raw datagram, without a full decode.
///
/// `None` unless `buf` is exactly [`FRAME_LEN`] bytes.
pub fn sequence_of(buf: &[u8]) -> Option<i32> {
    if buf.len() != FRAME_LEN {
        return None;
    }
    Some(i32::from_be_bytes(
        buf[OFF_SEQ..OFF_SEQ + SEQ_LEN].try_into().unwrap(),
    ))
}

/// Verify the stored checksum of a raw datagram.
///
/// Returns `false` for wrong-length buffers.  The stored 64-bit field is
/// valid when it equals the payload's 32-bit CRC zero-extended.
pub fn checksum_valid(buf: &[u8]) -> bool {
    if buf.len() != FRAME_LEN {
        return false;
    }
    let stored = u64::from_be_bytes(
        buf[OFF_CHECKSUM..OFF_CHECKSUM + CHECKSUM_LEN]
            .try_into()
            .unwrap(),
    );
    stored == u64::from(checksum(&buf[..SEGMENT_LEN]))
}

/// CRC-32 (IEEE) over the payload bytes.
fn checksum(payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(payload);
    hasher.finalize()
}
