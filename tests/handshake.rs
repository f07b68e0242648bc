//! Integration tests for the connection handshake.
//!
//! Each test spins up a real `tokio::net::UdpSocket` on loopback.  The
//! library endpoint runs one side in a background task; the other side is
//! either a second endpoint or a hand-scripted raw socket, so the tests can
//! observe individual frames on the wire.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::timeout;

use udp_file_transfer::frame::{self, Frame};
use udp_file_transfer::socket::Socket;
use udp_file_transfer::{Endpoint, ReceiveConfig, SendConfig};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Bind an endpoint to an OS-assigned port on loopback.
async fn ephemeral() -> Endpoint {
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    Endpoint::bind(addr).await.expect("bind endpoint")
}

/// Bind a raw socket to an OS-assigned port on loopback.
async fn raw_socket() -> Socket {
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    Socket::bind(addr).await.expect("bind raw socket")
}

/// Receive config that completes as soon as the last segment lands.
fn no_linger() -> ReceiveConfig {
    ReceiveConfig {
        linger: Duration::ZERO,
        ..ReceiveConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Test 1: clean handshake, proven by an empty transfer completing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn handshake_completes_for_an_empty_transfer() {
    let receiver = ephemeral().await;
    let receiver_addr = receiver.local_addr();

    let rx = tokio::spawn(async move {
        let config = no_linger();
        receiver.receive_bytes(&config).await.expect("receive")
    });

    let sender = ephemeral().await;
    let report = timeout(
        Duration::from_secs(5),
        sender.send_bytes(receiver_addr, Vec::new(), SendConfig::default()),
    )
    .await
    .expect("send timed out")
    .expect("send failed");
    assert_eq!(report.segments, 0);
    assert_eq!(report.bytes, 0);

    let (data, rx_report) = timeout(Duration::from_secs(5), rx)
        .await
        .expect("receive timed out")
        .expect("receiver task panicked");
    assert!(data.is_empty());
    assert_eq!(rx_report.segments, 0);
}

// ---------------------------------------------------------------------------
// Test 2: duplicate CONNECT requests are each answered with ACK 0
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_connect_is_acked_each_time() {
    let receiver = ephemeral().await;
    let receiver_addr = receiver.local_addr();

    let rx = tokio::spawn(async move {
        let config = no_linger();
        receiver.receive_bytes(&config).await.expect("receive")
    });

    let sock = raw_socket().await;
    let connect = Frame::connect(1, 5);
    sock.send_frame(&connect, receiver_addr).await.unwrap();
    sock.send_frame(&connect, receiver_addr).await.unwrap();

    // Both requests draw a handshake acknowledgment: ACK with sequence 0.
    let mut buf = [0u8; 64];
    for _ in 0..2 {
        let (n, from) = timeout(Duration::from_secs(5), sock.recv_from(&mut buf))
            .await
            .expect("no handshake reply")
            .unwrap();
        assert_eq!(from, receiver_addr);
        let reply = Frame::decode(&buf[..n]).expect("well-formed reply");
        assert!(reply.is_ack());
        assert_eq!(reply.sequence, 0);
    }

    // The transfer itself is unharmed: one data segment completes it.
    sock.send_frame(&Frame::data(0, b"hello"), receiver_addr)
        .await
        .unwrap();
    let (data, _) = timeout(Duration::from_secs(5), rx)
        .await
        .expect("receive timed out")
        .expect("receiver task panicked");
    assert_eq!(data, b"hello");
}

// ---------------------------------------------------------------------------
// Test 3: the sender resends CONNECT until somebody acknowledges it
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connect_is_resent_until_acknowledged() {
    let sock = raw_socket().await;
    let receiver_addr = sock.local_addr;

    let script = tokio::spawn(async move {
        let mut buf = [0u8; 64];

        // Ignore the first request; the sender's handshake window expires
        // and it must try again.
        let (n, _) = sock.recv_from(&mut buf).await.unwrap();
        let first = Frame::decode(&buf[..n]).expect("first request");
        assert!(first.is_connect());
        assert_eq!(first.sequence, 1);
        assert_eq!(first.tail_len(), 2);

        let (n, from) = sock.recv_from(&mut buf).await.unwrap();
        let second = Frame::decode(&buf[..n]).expect("second request");
        assert_eq!(second, first);
        sock.send_frame(&Frame::ack(0), from).await.unwrap();

        // Data follows; acknowledge segment 0 so the sender can finish.
        loop {
            let (n, from) = sock.recv_from(&mut buf).await.unwrap();
            let Ok(frame) = Frame::decode(&buf[..n]) else {
                continue;
            };
            if frame.is_connect() {
                // A request already in flight when the ACK landed.
                sock.send_frame(&Frame::ack(0), from).await.unwrap();
                continue;
            }
            assert_eq!(frame.sequence, 0);
            assert!(frame::checksum_valid(&buf[..n]));
            sock.send_frame(&Frame::ack(1), from).await.unwrap();
            break;
        }
    });

    let sender = ephemeral().await;
    let report = timeout(
        Duration::from_secs(5),
        sender.send_bytes(receiver_addr, b"hi".to_vec(), SendConfig::default()),
    )
    .await
    .expect("send timed out")
    .expect("send failed");
    assert_eq!(report.segments, 1);

    timeout(Duration::from_secs(5), script)
        .await
        .expect("script timed out")
        .expect("script panicked");
}
