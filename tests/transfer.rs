//! End-to-end transfer tests.
//!
//! Each test runs a sending and a receiving endpoint as separate tokio tasks
//! on loopback, so both sides make progress concurrently.  Fault injection is
//! seeded where used, keeping every run deterministic.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::timeout;

use udp_file_transfer::frame::{self, Frame};
use udp_file_transfer::socket::Socket;
use udp_file_transfer::{
    Deadline, Endpoint, RandomCorruption, ReceiveConfig, SendConfig, TransferError,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Bind an endpoint to an OS-assigned port on loopback.
async fn ephemeral() -> Endpoint {
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    Endpoint::bind(addr).await.expect("bind endpoint")
}

/// Receive config that completes as soon as the last segment lands.
fn no_linger() -> ReceiveConfig {
    ReceiveConfig {
        linger: Duration::ZERO,
        ..ReceiveConfig::default()
    }
}

/// Run one whole transfer of `content` over loopback and return what the
/// receiver reassembled.
async fn round_trip(content: Vec<u8>, send_config: SendConfig) -> Vec<u8> {
    let receiver = ephemeral().await;
    let receiver_addr = receiver.local_addr();

    let rx = tokio::spawn(async move {
        let config = no_linger();
        receiver.receive_bytes(&config).await.expect("receive")
    });

    let sender = ephemeral().await;
    timeout(
        Duration::from_secs(30),
        sender.send_bytes(receiver_addr, content, send_config),
    )
    .await
    .expect("send timed out")
    .expect("send failed");

    let (data, _) = timeout(Duration::from_secs(30), rx)
        .await
        .expect("receive timed out")
        .expect("receiver task panicked");
    data
}

// ---------------------------------------------------------------------------
// Test 1: the 23-byte scenario — three segments, byte-identical output
// ---------------------------------------------------------------------------

#[tokio::test]
async fn three_segment_file_round_trips() {
    let content = b"ABCDEFGHIJKLMNOPQRSTUVW".to_vec(); // 23 bytes
    let receiver = ephemeral().await;
    let receiver_addr = receiver.local_addr();

    let rx = tokio::spawn(async move {
        let config = no_linger();
        receiver.receive_bytes(&config).await.expect("receive")
    });

    let sender = ephemeral().await;
    let report = timeout(
        Duration::from_secs(10),
        sender.send_bytes(receiver_addr, content.clone(), SendConfig::default()),
    )
    .await
    .expect("send timed out")
    .expect("send failed");
    assert_eq!(report.segments, 3);
    assert_eq!(report.bytes, 23);

    let (data, rx_report) = timeout(Duration::from_secs(10), rx)
        .await
        .expect("receive timed out")
        .expect("receiver task panicked");
    assert_eq!(data, content);
    assert_eq!(rx_report.segments, 3);
    assert_eq!(rx_report.bytes, 23);
}

// ---------------------------------------------------------------------------
// Test 2: observed wire traffic — sequences 0,1,2 answered by ACKs 1,2,3
// ---------------------------------------------------------------------------

#[tokio::test]
async fn data_frames_carry_consecutive_sequences() {
    let sock = Socket::bind("127.0.0.1:0".parse::<SocketAddr>().unwrap())
        .await
        .expect("bind raw socket");
    let receiver_addr = sock.local_addr;

    let script = tokio::spawn(async move {
        let mut buf = [0u8; 64];

        // Handshake: the request announces 3 segments, tail length 3.
        let (n, from) = sock.recv_from(&mut buf).await.unwrap();
        let connect = Frame::decode(&buf[..n]).expect("connection request");
        assert!(connect.is_connect());
        assert_eq!(connect.sequence, 3);
        assert_eq!(connect.tail_len(), 3);
        sock.send_frame(&Frame::ack(0), from).await.unwrap();

        // Data phase: answer each segment with its index + 1.
        let mut seen = Vec::new();
        while seen.len() < 3 {
            let (n, from) = sock.recv_from(&mut buf).await.unwrap();
            let Ok(data) = Frame::decode(&buf[..n]) else {
                continue;
            };
            if data.is_connect() {
                sock.send_frame(&Frame::ack(0), from).await.unwrap();
                continue;
            }
            assert!(frame::checksum_valid(&buf[..n]));
            if !seen.contains(&data.sequence) {
                seen.push(data.sequence);
            }
            sock.send_frame(&Frame::ack(data.sequence + 1), from)
                .await
                .unwrap();
        }
        seen
    });

    let sender = ephemeral().await;
    let content = b"ABCDEFGHIJKLMNOPQRSTUVW".to_vec();
    timeout(
        Duration::from_secs(10),
        sender.send_bytes(receiver_addr, content, SendConfig::default()),
    )
    .await
    .expect("send timed out")
    .expect("send failed");

    let seen = timeout(Duration::from_secs(10), script)
        .await
        .expect("script timed out")
        .expect("script panicked");
    assert_eq!(seen, vec![0, 1, 2]);
}

// ---------------------------------------------------------------------------
// Test 3: zero bytes in the final segment survive reassembly
// ---------------------------------------------------------------------------

#[tokio::test]
async fn trailing_zero_bytes_survive() {
    let content = b"0123456789ab\0\0d\0".to_vec(); // 16 bytes, tail is 6 with zeros
    let data = round_trip(content.clone(), SendConfig::default()).await;
    assert_eq!(data, content);
}

// ---------------------------------------------------------------------------
// Test 4: many segments, byte-identical output
// ---------------------------------------------------------------------------

#[tokio::test]
async fn multi_segment_content_round_trips() {
    let content: Vec<u8> = (0..997u32).map(|i| (i % 251) as u8).collect();
    let data = round_trip(content.clone(), SendConfig::default()).await;
    assert_eq!(data, content);
}

// ---------------------------------------------------------------------------
// Test 5: 100 % corruption — nothing is ever accepted
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_corruption_never_delivers() {
    let receiver = ephemeral().await;
    let receiver_addr = receiver.local_addr();

    let rx = tokio::spawn(async move {
        let config = ReceiveConfig {
            deadline: Deadline::after(Duration::from_secs(4)),
            linger: Duration::ZERO,
            ..ReceiveConfig::default()
        };
        receiver.receive_bytes(&config).await
    });

    let sender = ephemeral().await;
    let config = SendConfig {
        resend_after: Duration::from_millis(100),
        faults: Box::new(RandomCorruption::seeded(100, 7)),
        deadline: Deadline::after(Duration::from_secs(2)),
    };
    let sent = sender
        .send_bytes(receiver_addr, b"never arrives".to_vec(), config)
        .await;
    assert!(matches!(sent, Err(TransferError::DeadlineExceeded)));

    // The receiver accepted the handshake but no segment ever verified, so
    // its own deadline fires with nothing delivered.
    let received = timeout(Duration::from_secs(10), rx)
        .await
        .expect("receiver timed out")
        .expect("receiver task panicked");
    assert!(matches!(received, Err(TransferError::DeadlineExceeded)));
}

// ---------------------------------------------------------------------------
// Test 6: partial corruption still converges via retransmission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn partial_corruption_converges() {
    let content: Vec<u8> = (0..200u8).collect();
    let config = SendConfig {
        resend_after: Duration::from_millis(100),
        faults: Box::new(RandomCorruption::seeded(40, 99)),
        deadline: Deadline::after(Duration::from_secs(25)),
    };
    let data = round_trip(content.clone(), config).await;
    assert_eq!(data, content);
}

// ---------------------------------------------------------------------------
// Test 7: sequential transfers on one endpoint number their artifacts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sequential_receives_number_artifacts() {
    let dir = std::env::temp_dir().join(format!("udp-xfer-test-{}", std::process::id()));
    tokio::fs::create_dir_all(&dir).await.unwrap();

    let mut receiver = ephemeral().await;
    let receiver_addr = receiver.local_addr();

    let output_dir = dir.clone();
    let rx = tokio::spawn(async move {
        let mut paths = Vec::new();
        for _ in 0..2 {
            let config = ReceiveConfig {
                output_dir: output_dir.clone(),
                linger: Duration::ZERO,
                ..ReceiveConfig::default()
            };
            let report = receiver.receive_file(config).await.expect("receive");
            paths.push(report.path.expect("artifact path"));
        }
        paths
    });

    let sender = ephemeral().await;
    for content in [&b"first transfer"[..], &b"second transfer!"[..]] {
        timeout(
            Duration::from_secs(10),
            sender.send_bytes(receiver_addr, content.to_vec(), SendConfig::default()),
        )
        .await
        .expect("send timed out")
        .expect("send failed");
    }

    let paths = timeout(Duration::from_secs(10), rx)
        .await
        .expect("receive timed out")
        .expect("receiver task panicked");
    assert_eq!(paths[0].file_name().unwrap(), "received0");
    assert_eq!(paths[1].file_name().unwrap(), "received1");
    assert_eq!(tokio::fs::read(&paths[0]).await.unwrap(), b"first transfer");
    assert_eq!(
        tokio::fs::read(&paths[1]).await.unwrap(),
        b"second transfer!"
    );

    tokio::fs::remove_dir_all(&dir).await.unwrap();
}
