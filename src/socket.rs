//! Async UDP socket abstraction.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that sends
//! [`crate::frame::Frame`]s and receives raw datagrams.  Inbound bytes are
//! handed up undecoded: classifying a datagram (and choosing what to do with
//! a malformed one) is protocol logic and lives in [`crate::session`].  This
//! module owns only byte I/O.

use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

use crate::frame::Frame;

/// An async, frame-oriented UDP socket.
///
/// All methods are `&self` so the socket can be shared across tasks if needed.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> io::Result<Self> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }

    /// Encode `frame` and send it as a single UDP datagram to `dest`.
    pub async fn send_frame(&self, frame: &Frame, dest: SocketAddr) -> io::Result<()> {
        self.inner.send_to(&frame.encode(), dest).await?;
        Ok(())
    }

    /// Send `frame` with a deliberately unverifiable checksum field.
    ///
    /// Exercises the receive side's discard path; see
    /// [`Frame::encode_corrupted`].
    pub async fn send_corrupted(&self, frame: &Frame, dest: SocketAddr) -> io::Result<()> {
        self.inner.send_to(&frame.encode_corrupted(), dest).await?;
        Ok(())
    }

    /// Receive the next datagram into `buf`.
    ///
    /// Returns `(length, sender_address)`.  `buf` should be larger than
    /// [`crate::frame::FRAME_LEN`], otherwise an oversized datagram is
    /// truncated to exactly a frame's length and can no longer be told apart
    /// from a real frame.
    pub async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.inner.recv_from(buf).await
    }
}
