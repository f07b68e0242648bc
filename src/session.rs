//! Transfer sessions: the I/O loops that drive a whole send or receive.
//!
//! # Architecture
//!
//! ```text
//!  Application
//!      │ send_file / receive_file
//!      ▼
//!  Endpoint (one bound socket + artifact counter)
//!    ├── confirm_connection ──▶ pump_segments ── drives ──▶ sender::Sender
//!    ├── await_handshake ─────▶ receive loop ── drives ──▶ receiver::Receiver
//!    └── Socket (frame-oriented UDP)
//! ```
//!
//! The engines in [`crate::sender`] and [`crate::receiver`] are pure state;
//! every socket read/write, timer, and file touch happens here.  Sessions are
//! per-transfer values: handshake parameters, the pending set, and the
//! receive buffer live for exactly one call, and only the socket plus the
//! output-artifact counter outlive it.
//!
//! # Timing
//!
//! | constant               | value  | role                                  |
//! |------------------------|--------|---------------------------------------|
//! | `ACK_WAIT`             | 300 ms | receive window during active transfer |
//! | `LISTEN_WAIT`          | 10 s   | listen window (liveness-log cadence)  |
//! | `DEFAULT_RESEND_AFTER` | 3 s    | default retransmission threshold      |
//! | `DEFAULT_LINGER`       | 5 s    | default post-completion re-ack window |
//!
//! The sender's receive window doubles as its retransmission cadence: each
//! cycle performs (one new segment) then (resend sweep) then (one bounded
//! receive), so at most one sweep runs per `ACK_WAIT` of silence.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::time::timeout;

use crate::fault::{FaultInjector, NoFaults};
use crate::frame::{self, Frame, FRAME_LEN, SEGMENT_LEN};
use crate::receiver::{Arrival, Receiver};
use crate::sender::{Sender, TooManySegments};
use crate::socket::Socket;
use crate::state::{ReceiverState, SenderState};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Bounded wait for one datagram during active transfer phases.
const ACK_WAIT: Duration = Duration::from_millis(300);

/// Bounded wait while listening for a handshake.
const LISTEN_WAIT: Duration = Duration::from_secs(10);

/// Default age past which an unacknowledged segment is resent.
const DEFAULT_RESEND_AFTER: Duration = Duration::from_millis(3000);

/// Default post-completion window in which duplicates are still answered.
/// Longer than `DEFAULT_RESEND_AFTER` so a resend triggered by a lost final
/// acknowledgment lands inside it.
const DEFAULT_LINGER: Duration = Duration::from_secs(5);

/// Receive buffer size.  Larger than a frame so an oversized datagram is
/// seen at its true length and discarded, instead of being truncated to
/// exactly [`FRAME_LEN`] bytes and mistaken for a frame.
const RECV_BUF: usize = 3 * FRAME_LEN;

// ---------------------------------------------------------------------------
// Deadline
// ---------------------------------------------------------------------------

/// Optional wall-clock bound on a whole transfer.
///
/// Every blocking wait in a session is clamped to the time left; once none
/// remains the session returns [`TransferError::DeadlineExceeded`].
/// [`Deadline::none`] removes the bound, so a transfer retries until the
/// peer responds.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No bound: blocking waits retry indefinitely.
    pub fn none() -> Self {
        Self(None)
    }

    /// Expire `window` from now.
    pub fn after(window: Duration) -> Self {
        Self(Some(Instant::now() + window))
    }

    /// Expire at `instant`.
    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    /// Clamp one wait to the time left.
    fn clamp(&self, wait: Duration) -> Result<Duration, TransferError> {
        match self.remaining()? {
            None => Ok(wait),
            Some(left) => Ok(wait.min(left)),
        }
    }

    /// Time left (`None` when unbounded), or an error once expired.
    fn remaining(&self) -> Result<Option<Duration>, TransferError> {
        let Some(end) = self.0 else {
            return Ok(None);
        };
        let left = end.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Err(TransferError::DeadlineExceeded);
        }
        Ok(Some(left))
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors a transfer surfaces to the caller.
///
/// Channel behavior (loss, corruption, duplication, reordering) is handled
/// inside the session loops and never appears here; only local resource
/// faults and the optional deadline do.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The local socket could not be bound.
    #[error("failed to bind local socket: {0}")]
    Bind(std::io::Error),

    /// The input file could not be read or the output file written.
    #[error("file I/O failed: {0}")]
    File(std::io::Error),

    /// The content needs more segments than a sequence number can index.
    #[error(transparent)]
    FileTooLarge(#[from] TooManySegments),

    /// A send or receive syscall failed.
    #[error("socket I/O failed: {0}")]
    Socket(std::io::Error),

    /// The configured deadline expired before the transfer completed.
    #[error("transfer deadline exceeded")]
    DeadlineExceeded,
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning for one outbound transfer.
pub struct SendConfig {
    /// Age past which an unacknowledged segment is resent.
    pub resend_after: Duration,

    /// Outbound impairment, consulted afresh for every post-handshake
    /// transmission.
    pub faults: Box<dyn FaultInjector>,

    /// Overall bound on the transfer, handshake included.
    pub deadline: Deadline,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            resend_after: DEFAULT_RESEND_AFTER,
            faults: Box::new(NoFaults),
            deadline: Deadline::none(),
        }
    }
}

/// Tuning for one inbound transfer.
#[derive(Debug, Clone)]
pub struct ReceiveConfig {
    /// Directory that receives `received<N>` artifacts.
    pub output_dir: PathBuf,

    /// Overall bound on the transfer, listen phase included.
    pub deadline: Deadline,

    /// How long to keep answering duplicates after the last segment arrives.
    ///
    /// A sender whose final acknowledgment was lost resends the last segment
    /// until an answer comes back; this window lets it finish.  Completion of
    /// the receive call is delayed by up to this long.  `Duration::ZERO`
    /// disables the window.
    pub linger: Duration,
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            deadline: Deadline::none(),
            linger: DEFAULT_LINGER,
        }
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Summary of a completed outbound transfer.
#[derive(Debug, Clone)]
pub struct SendReport {
    /// Content bytes confirmed by the peer.
    pub bytes: usize,
    /// Segments the content was split into.
    pub segments: i32,
    /// Data transmissions past each segment's first (handshake excluded).
    pub retransmissions: u64,
    /// Wall-clock time from handshake start to the final acknowledgment.
    pub elapsed: Duration,
}

/// Summary of a completed inbound transfer.
#[derive(Debug, Clone)]
pub struct ReceiveReport {
    /// Sender the handshake was accepted from.
    pub peer: SocketAddr,
    /// Content bytes reassembled.
    pub bytes: usize,
    /// Segments the transfer was split into.
    pub segments: i32,
    /// Data frames that duplicated an already-held segment.
    pub duplicates: u64,
    /// Data frames dropped for a checksum mismatch.
    pub corrupted: u64,
    /// Wall-clock time from handshake completion to the final segment.
    pub elapsed: Duration,
    /// Artifact path, when the content was written to disk.
    pub path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// One bound UDP endpoint able to run transfers in either direction.
#[derive(Debug)]
pub struct Endpoint {
    socket: Socket,
    /// Next `received<N>` suffix to try.
    next_artifact: u32,
}

impl Endpoint {
    /// Bind a new endpoint to `local_addr` (port 0 = OS-assigned).
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, TransferError> {
        let socket = Socket::bind(local_addr).await.map_err(TransferError::Bind)?;
        log::info!("[xfer] bound to {}", socket.local_addr);
        Ok(Self {
            socket,
            next_artifact: 0,
        })
    }

    /// Address the endpoint is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    // -----------------------------------------------------------------------
    // Send side
    // -----------------------------------------------------------------------

    /// Read `path` and deliver its content to `peer`.
    ///
    /// Blocks until every segment is acknowledged, the deadline expires, or a
    /// local fault surfaces.
    pub async fn send_file(
        &self,
        peer: SocketAddr,
        path: &Path,
        config: SendConfig,
    ) -> Result<SendReport, TransferError> {
        let data = tokio::fs::read(path).await.map_err(TransferError::File)?;
        log::info!(
            "[xfer] sending {} ({} bytes) to {peer}",
            path.display(),
            data.len()
        );
        self.send_bytes(peer, data, config).await
    }

    /// Deliver `data` to `peer`.
    pub async fn send_bytes(
        &self,
        peer: SocketAddr,
        data: Vec<u8>,
        mut config: SendConfig,
    ) -> Result<SendReport, TransferError> {
        let bytes = data.len();
        let mut sender = Sender::new(data)?;
        let started = Instant::now();

        self.confirm_connection(peer, &sender, &config).await?;
        let retransmissions = self.pump_segments(peer, &mut sender, &mut config).await?;

        log::info!(
            "[xfer] transfer to {peer} complete: {bytes} bytes in {} segment(s), {retransmissions} resend(s)",
            sender.total_segments()
        );
        Ok(SendReport {
            bytes,
            segments: sender.total_segments(),
            retransmissions,
            elapsed: started.elapsed(),
        })
    }

    /// Drive the sender handshake to [`SenderState::Connected`].
    ///
    /// Sends `CONNECT`, waits out one receive window for the handshake
    /// acknowledgment (ACK, sequence 0), and resends on expiry, indefinitely
    /// up to the deadline.  Datagrams from other sources and non-matching
    /// frames are ignored without consuming the window.
    async fn confirm_connection(
        &self,
        peer: SocketAddr,
        sender: &Sender,
        config: &SendConfig,
    ) -> Result<(), TransferError> {
        let connect = Frame::connect(sender.total_segments(), sender.tail_len());
        let mut state = SenderState::Idle;
        let mut buf = [0u8; RECV_BUF];

        while state != SenderState::Connected {
            self.socket
                .send_frame(&connect, peer)
                .await
                .map_err(TransferError::Socket)?;
            state = SenderState::AwaitingAck;
            log::debug!(
                "[xfer] → CONNECT total={} tail={}",
                sender.total_segments(),
                sender.tail_len()
            );

            let window_end = Instant::now() + ACK_WAIT;
            while state == SenderState::AwaitingAck {
                let left = window_end.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    log::debug!("[xfer] no handshake reply ({state}); resending CONNECT");
                    break;
                }
                let wait = config.deadline.clamp(left)?;
                let Some((n, from)) = self.recv_within(Some(wait), &mut buf).await? else {
                    continue;
                };
                if from != peer {
                    continue;
                }
                let datagram = &buf[..n];
                if frame::payload_of(datagram).is_some_and(frame::is_ack_payload)
                    && frame::sequence_of(datagram) == Some(0)
                {
                    state = SenderState::Connected;
                }
            }
        }

        log::info!("[xfer] connection to {peer} confirmed");
        Ok(())
    }

    /// Drive the post-handshake data loop until every segment is confirmed.
    ///
    /// Each cycle transmits at most one new segment, resends everything past
    /// the age threshold, then waits one receive window for an
    /// acknowledgment.  Returns the number of resends performed.
    async fn pump_segments(
        &self,
        peer: SocketAddr,
        sender: &mut Sender,
        config: &mut SendConfig,
    ) -> Result<u64, TransferError> {
        let mut retransmissions = 0u64;
        let mut buf = [0u8; RECV_BUF];

        while !sender.is_done() {
            if let Some(frame) = sender.build_next() {
                let seq = frame.sequence;
                self.transmit(&frame, peer, config.faults.as_mut()).await?;
                sender.record_sent(frame);
                log::debug!("[xfer] → DATA seq={seq} ({} in flight)", sender.pending_count());
            }

            // Unconditional resend of everything past the threshold; the
            // receiver absorbs any duplicates this produces.
            let now = Instant::now();
            for seq in sender.due_for_resend(config.resend_after, now) {
                if let Some((frame, tx_count)) = sender.mark_resent(seq, now) {
                    retransmissions += 1;
                    log::debug!("[xfer] seq={seq} timed out, resending (transmission #{tx_count})");
                    self.transmit(&frame, peer, config.faults.as_mut()).await?;
                }
            }

            if sender.has_pending() {
                let wait = config.deadline.clamp(ACK_WAIT)?;
                let Some((n, from)) = self.recv_within(Some(wait), &mut buf).await? else {
                    continue; // timeout; next cycle runs the resend sweep
                };
                if from != peer {
                    continue;
                }
                let datagram = &buf[..n];
                match (frame::payload_of(datagram), frame::sequence_of(datagram)) {
                    (Some(payload), Some(ack_seq)) if frame::is_ack_payload(payload) => {
                        if let Some(confirmed) = sender.on_ack(ack_seq) {
                            log::debug!(
                                "[xfer] ← ACK {ack_seq} (segment {confirmed} confirmed, {} in flight)",
                                sender.pending_count()
                            );
                        }
                    }
                    (Some(_), Some(seq)) => {
                        log::warn!("[xfer] ignoring non-ACK datagram (seq={seq}) from {from}");
                    }
                    _ => log::warn!("[xfer] ignoring malformed {n}-byte datagram from {from}"),
                }
            }
        }

        Ok(retransmissions)
    }

    /// Send one post-handshake frame, consulting the fault injector afresh.
    async fn transmit(
        &self,
        frame: &Frame,
        dest: SocketAddr,
        faults: &mut dyn FaultInjector,
    ) -> Result<(), TransferError> {
        let result = if faults.corrupt_next() {
            log::debug!("[xfer] corrupting seq={} on the wire", frame.sequence);
            self.socket.send_corrupted(frame, dest).await
        } else {
            self.socket.send_frame(frame, dest).await
        };
        result.map_err(TransferError::Socket)
    }

    // -----------------------------------------------------------------------
    // Receive side
    // -----------------------------------------------------------------------

    /// Accept one inbound transfer and write it to disk.
    ///
    /// Blocks listening until a handshake arrives, then until every announced
    /// segment is validated and stored.  The artifact lands in
    /// `config.output_dir` as `received<N>`, never overwriting an existing
    /// file.
    pub async fn receive_file(
        &mut self,
        config: ReceiveConfig,
    ) -> Result<ReceiveReport, TransferError> {
        let (data, mut report) = self.receive_bytes(&config).await?;
        let path = self.next_artifact_path(&config.output_dir).await?;
        tokio::fs::write(&path, &data)
            .await
            .map_err(TransferError::File)?;
        log::info!("[xfer] wrote {} bytes to {}", data.len(), path.display());
        report.path = Some(path);
        Ok(report)
    }

    /// Accept one inbound transfer and return its content without touching
    /// the filesystem.
    pub async fn receive_bytes(
        &self,
        config: &ReceiveConfig,
    ) -> Result<(Vec<u8>, ReceiveReport), TransferError> {
        let (peer, total_segments, tail_len) = self.await_handshake(&config.deadline).await?;
        let started = Instant::now();

        let mut receiver = Receiver::new(total_segments, tail_len);
        let mut duplicates = 0u64;
        let mut corrupted = 0u64;
        let mut buf = [0u8; RECV_BUF];

        while !receiver.is_complete() {
            let wait = config.deadline.remaining()?;
            let Some((n, from)) = self.recv_within(wait, &mut buf).await? else {
                continue;
            };
            if from != peer {
                log::warn!("[xfer] ignoring datagram from {from} (transfer pinned to {peer})");
                continue;
            }

            let (arrival, acks) = receiver.on_datagram(&buf[..n]);
            match arrival {
                Arrival::Stored(seq) => log::debug!(
                    "[xfer] ← DATA seq={seq} ({}/{total_segments} confirmed)",
                    receiver.segments_confirmed()
                ),
                Arrival::Duplicate(seq) => {
                    duplicates += 1;
                    log::debug!("[xfer] ← DATA seq={seq} (duplicate)");
                }
                Arrival::Corrupt(seq) => {
                    corrupted += 1;
                    log::debug!("[xfer] ← DATA seq={seq} dropped (checksum mismatch)");
                }
                Arrival::Connect => log::debug!("[xfer] ← CONNECT again; re-acking handshake"),
                Arrival::Invalid => log::debug!("[xfer] dropping unusable {n}-byte datagram"),
            }
            for ack in acks {
                self.socket
                    .send_frame(&Frame::ack(ack), peer)
                    .await
                    .map_err(TransferError::Socket)?;
                log::debug!("[xfer] → ACK {ack}");
            }
        }
        let elapsed = started.elapsed();

        if !config.linger.is_zero() {
            self.linger(peer, total_segments, config.linger).await?;
        }

        let data = receiver
            .into_bytes()
            .expect("receive loop exits only once the transfer is complete");
        log::info!(
            "[xfer] transfer from {peer} complete: {} bytes in {total_segments} segment(s)",
            data.len()
        );
        let report = ReceiveReport {
            peer,
            bytes: data.len(),
            segments: total_segments,
            duplicates,
            corrupted,
            elapsed,
            path: None,
        };
        Ok((data, report))
    }

    /// Block in [`ReceiverState::Listening`] until a well-formed connection
    /// request arrives, then acknowledge it.
    ///
    /// Returns the pinned peer plus the announced segment count and tail
    /// length.  Requests announcing an inconsistent geometry are rejected
    /// and listening continues.
    async fn await_handshake(
        &self,
        deadline: &Deadline,
    ) -> Result<(SocketAddr, i32, u8), TransferError> {
        let mut state = ReceiverState::Listening;
        let mut buf = [0u8; RECV_BUF];

        let (peer, total_segments, tail_len) = loop {
            if let ReceiverState::Receiving {
                peer,
                total_segments,
                tail_len,
            } = state
            {
                break (peer, total_segments, tail_len);
            }

            let wait = deadline.clamp(LISTEN_WAIT)?;
            let Some((n, from)) = self.recv_within(Some(wait), &mut buf).await? else {
                log::info!("[xfer] {state} on {}, no connection request yet", self.socket.local_addr);
                continue;
            };
            let Ok(frame) = Frame::decode(&buf[..n]) else {
                continue;
            };
            if !frame.is_connect() {
                continue;
            }

            let total = frame.sequence;
            let tail = frame.tail_len();
            let tail_ok = if total == 0 {
                tail == 0
            } else {
                (1..=SEGMENT_LEN as u8).contains(&tail)
            };
            if total < 0 || !tail_ok {
                log::warn!(
                    "[xfer] rejecting connection request from {from}: total={total} tail={tail}"
                );
                continue;
            }
            state = ReceiverState::Receiving {
                peer: from,
                total_segments: total,
                tail_len: tail,
            };
        };

        self.socket
            .send_frame(&Frame::ack(0), peer)
            .await
            .map_err(TransferError::Socket)?;
        log::info!(
            "[xfer] accepted transfer from {peer}: {total_segments} segment(s), tail {tail_len}"
        );
        Ok((peer, total_segments, tail_len))
    }

    /// Keep answering duplicates of a completed transfer for `window`.
    ///
    /// The sender cannot know its last segment was accepted if the final
    /// acknowledgment was lost; it keeps resending that segment.  Answering
    /// duplicates here lets it terminate.  A fresh connection request ends
    /// the window at once so the next transfer on this socket is not
    /// delayed (the requester retries within its own handshake cadence).
    async fn linger(
        &self,
        peer: SocketAddr,
        total_segments: i32,
        window: Duration,
    ) -> Result<(), TransferError> {
        let end = Instant::now() + window;
        let mut buf = [0u8; RECV_BUF];
        log::debug!("[xfer] answering late duplicates from {peer} for {window:?}");

        loop {
            let left = end.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Ok(());
            }
            let Some((n, from)) = self.recv_within(Some(left), &mut buf).await? else {
                return Ok(());
            };
            if from != peer {
                continue;
            }
            let Ok(frame) = Frame::decode(&buf[..n]) else {
                continue;
            };
            if frame.is_connect() {
                return Ok(());
            }
            if (0..total_segments).contains(&frame.sequence) {
                self.socket
                    .send_frame(&Frame::ack(frame.sequence + 1), peer)
                    .await
                    .map_err(TransferError::Socket)?;
                log::debug!("[xfer] → ACK {} (late duplicate)", frame.sequence + 1);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Shared plumbing
    // -----------------------------------------------------------------------

    /// Receive one datagram, bounded by `wait` (`None` = no bound).
    ///
    /// `Ok(None)` on timeout; socket faults surface as errors.
    async fn recv_within(
        &self,
        wait: Option<Duration>,
        buf: &mut [u8],
    ) -> Result<Option<(usize, SocketAddr)>, TransferError> {
        match wait {
            None => {
                let received = self
                    .socket
                    .recv_from(buf)
                    .await
                    .map_err(TransferError::Socket)?;
                Ok(Some(received))
            }
            Some(wait) => match timeout(wait, self.socket.recv_from(buf)).await {
                Ok(Ok(received)) => Ok(Some(received)),
                Ok(Err(e)) => Err(TransferError::Socket(e)),
                Err(_elapsed) => Ok(None),
            },
        }
    }

    /// Next free `received<N>` path in `dir`.
    ///
    /// The counter persists across transfers on this endpoint, and paths
    /// already present on disk are skipped rather than overwritten.
    async fn next_artifact_path(&mut self, dir: &Path) -> Result<PathBuf, TransferError> {
        loop {
            let path = dir.join(format!("received{}", self.next_artifact));
            self.next_artifact += 1;
            match tokio::fs::try_exists(&path).await {
                Ok(false) => return Ok(path),
                Ok(true) => continue,
                Err(e) => return Err(TransferError::File(e)),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_deadline_never_clamps() {
        let deadline = Deadline::none();
        assert_eq!(deadline.clamp(ACK_WAIT).unwrap(), ACK_WAIT);
        assert_eq!(deadline.remaining().unwrap(), None);
    }

    #[test]
    fn deadline_clamps_to_the_time_left() {
        let deadline = Deadline::at(Instant::now() + Duration::from_millis(50));
        let wait = deadline.clamp(Duration::from_secs(10)).unwrap();
        assert!(wait <= Duration::from_millis(50));
        assert!(deadline.remaining().unwrap().is_some());
    }

    #[test]
    fn expired_deadline_reports_exceeded() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(matches!(
            deadline.clamp(ACK_WAIT),
            Err(TransferError::DeadlineExceeded)
        ));
        assert!(matches!(
            deadline.remaining(),
            Err(TransferError::DeadlineExceeded)
        ));
    }

    #[test]
    fn default_configs_run_unbounded() {
        assert!(SendConfig::default().deadline.remaining().unwrap().is_none());
        assert!(ReceiveConfig::default()
            .deadline
            .remaining()
            .unwrap()
            .is_none());
        assert_eq!(SendConfig::default().resend_after, DEFAULT_RESEND_AFTER);
    }
}
