//! Transfer finite-state machine (FSM) types.
//!
//! This module defines the states each side of a transfer can occupy.  State
//! transitions are *not* implemented here — they live in [`crate::session`] —
//! but the legal transitions are documented on each variant.
//!
//! Keeping state types in their own module makes it easy to add guard logic,
//! entry/exit actions, or tracing without touching session plumbing.

use std::net::SocketAddr;

/// States of the sending side.
///
/// ```text
///  Idle ──CONNECT sent──▶ AwaitingAck ──ACK seq 0──▶ Connected
///                             │    ▲
///                             └────┘ resend CONNECT on window expiry
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    /// No connection request sent yet; initial state.
    Idle,
    /// A connection request is out; waiting up to one receive window for the
    /// handshake acknowledgment.  Expiry loops back here via a resend.
    AwaitingAck,
    /// Handshake acknowledged; data transfer may begin.
    Connected,
}

impl Default for SenderState {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for SenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// States of the receiving side.
///
/// ```text
///  Listening ──valid CONNECT / ACK 0 sent──▶ Receiving { peer, total, tail }
/// ```
///
/// `Receiving` carries the parameters agreed in the handshake, so a receiver
/// in that state can never lack a peer address or segment count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// Blocking in listen windows, waiting for a connection request.
    Listening,
    /// Handshake complete; accepting data frames from `peer`.
    Receiving {
        /// Source of the connection request; acknowledgments go here.
        peer: SocketAddr,
        /// Number of segments the peer announced.
        total_segments: i32,
        /// Meaningful byte count of the final segment (0 only when
        /// `total_segments` is 0).
        tail_len: u8,
    },
}

impl Default for ReceiverState {
    fn default() -> Self {
        Self::Listening
    }
}

impl std::fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
