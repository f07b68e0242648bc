//! `udp-file-transfer` — reliable file transfer over plain UDP datagrams.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐  10-byte segments   ┌──────────┐
//!  │  Sender  │────────────────────▶│ Receiver │
//!  └────┬─────┘                     └─────┬────┘
//!       │                                 │
//!       │        per-segment ACKs         │
//!       │◀────────────────────────────────┘
//!       │
//!  ┌────▼──────────────────────────────┐
//!  │            Endpoint               │
//!  │  (handshake + transfer sessions,  │
//!  │   deadlines, fault injection)     │
//!  └────┬──────────────────────────────┘
//!       │ 22-byte frames
//!  ┌────▼──────┐
//!  │  Socket   │  (thin async wrapper around tokio UdpSocket)
//!  └───────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`frame`]    — wire format and checksums (serialise / verify / deserialise)
//! - [`sender`]   — outbound pending-acknowledgment state machine
//! - [`receiver`] — inbound buffering, cumulative ACKs, reassembly
//! - [`session`]  — per-transfer drivers: handshake, data loops, deadlines
//! - [`state`]    — finite-state-machine types
//! - [`fault`]    — deliberate checksum corruption for recovery testing
//! - [`socket`]   — async UDP socket abstraction

pub mod fault;
pub mod frame;
pub mod receiver;
pub mod sender;
pub mod session;
pub mod socket;
pub mod state;

pub use fault::{FaultInjector, NoFaults, RandomCorruption};
pub use session::{
    Deadline, Endpoint, ReceiveConfig, ReceiveReport, SendConfig, SendReport, TransferError,
};
