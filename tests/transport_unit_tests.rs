//! # Transport Layer Unit Tests
//!
//! Validates the single-shot ResultChannel, open-loop train transmission,
//! and the receiver's dual exit policy (both trains complete, or cutoff)
//! over loopback.

use compdetect_codec::{EntropyClass, EntropyClassifier, PayloadFactory};
use compdetect_core::config::MAX_TRAIN_LEN;
use compdetect_core::{CompDetectError, DetectionEngine, ProbeConfig};
use compdetect_transport::channel::{ChannelListener, ResultChannel};
use compdetect_transport::receiver::{Termination, TrainReceiver};
use compdetect_transport::sender::{self, TrainSender};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

const MARKER: [u8; 10] = *b"1234567890";

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

fn probe_config(dst_port: u16, l: u32, n: u32) -> ProbeConfig {
    let mut config = ProbeConfig::new(IpAddr::V4(Ipv4Addr::LOCALHOST));
    config.udp_src_port = 0;
    config.udp_dst_port = dst_port;
    config.udp_head_bytes = MARKER;
    config.l = l;
    config.n = n;
    config.gamma = 0;
    config
}

fn receiver(n: u32) -> TrainReceiver {
    TrainReceiver::bind(loopback(0), n, EntropyClassifier::new(MARKER))
        .expect("Receiver bind failed")
}

/// Verifies that one message crosses the channel intact.
#[test]
fn test_result_channel_single_message() {
    let t = Instant::now();

    let listener = ChannelListener::bind(loopback(0)).unwrap();
    let addr = listener.local_addr().unwrap();

    let server = std::thread::spawn(move || {
        listener
            .accept_one()
            .and_then(|channel| channel.send_message(b"No compression was detected."))
    });

    let message = ResultChannel::connect(addr).unwrap().recv_message(64).unwrap();
    server.join().unwrap().unwrap();
    assert_eq!(message, b"No compression was detected.");

    let overhead = t.elapsed();
    println!("test_result_channel_single_message: Testing Overhead = {:?}", overhead);
}

/// Verifies that a message over the limit is a protocol violation.
#[test]
fn test_result_channel_rejects_oversized_message() {
    let listener = ChannelListener::bind(loopback(0)).unwrap();
    let addr = listener.local_addr().unwrap();

    let client = std::thread::spawn(move || {
        ResultChannel::connect(addr).and_then(|channel| channel.send_message(&[b'x'; 100]))
    });

    let result = listener.accept_one().unwrap().recv_message(64);
    // The reader hangs up early, so the writer's own outcome is not asserted.
    let _ = client.join().unwrap();
    assert!(matches!(result, Err(CompDetectError::ProtocolViolation(_))));
}

/// Verifies that the IPv6 wildcard listener also accepts IPv4 peers.
#[test]
fn test_wildcard_listener_is_dual_stack() {
    let listener = ChannelListener::bind(SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))).unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = std::thread::spawn(move || {
        listener.accept_one().and_then(|channel| channel.recv_message(64))
    });

    ResultChannel::connect(loopback(port))
        .unwrap()
        .send_message(b"Compression detected!")
        .unwrap();
    assert_eq!(server.join().unwrap().unwrap(), b"Compression detected!");
}

/// Verifies that connecting to a closed port is a fatal transport error.
#[test]
fn test_connect_refused_is_transport_error() {
    // Bind then drop to obtain a port with no listener.
    let port = ChannelListener::bind(loopback(0)).unwrap().local_addr().unwrap().port();
    let result = ResultChannel::connect(loopback(port));
    assert!(matches!(result, Err(CompDetectError::Transport(_))));
}

/// Verifies that ids go out in increasing order with the full payload size.
#[test]
fn test_send_train_sequence_and_size() {
    let t = Instant::now();

    let sink = UdpSocket::bind(loopback(0)).unwrap();
    sink.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let config = probe_config(sink.local_addr().unwrap().port(), 200, 16);

    let sender = TrainSender::bind(&config).expect("Sender bind failed");
    let mut template = PayloadFactory::new(200, MARKER).generate(EntropyClass::High).unwrap();
    sender.send_train(&mut template, config.n).unwrap();

    let mut buf = [0u8; 512];
    for expected in 0..16u16 {
        let (len, src) = sink.recv_from(&mut buf).unwrap();
        assert_eq!(len, 200);
        assert_eq!(src.port(), sender.local_addr().unwrap().port());
        assert_eq!(u16::from_be_bytes([buf[0], buf[1]]), expected);
        assert_eq!(&buf[2..12], &MARKER);
    }

    let overhead = t.elapsed();
    println!("test_send_train_sequence_and_size: Testing Overhead = {:?}", overhead);
}

/// Verifies that the probe socket carries the configured TTL and DF mode.
#[test]
fn test_sender_applies_ttl_and_dont_fragment() {
    let mut config = probe_config(9, 64, 1);
    config.ttl = Some(3);

    let sender = TrainSender::bind(&config).expect("Sender bind failed");
    assert_eq!(sender.ttl().unwrap(), 3);
    assert!(sender.dont_fragment().unwrap(), "IP_MTU_DISCOVER is not IP_PMTUDISC_DO");
}

/// Verifies that a train longer than the 16-bit id space is refused before any send.
#[test]
fn test_send_train_rejects_id_overflow() {
    let sink = UdpSocket::bind(loopback(0)).unwrap();
    sink.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
    let config = probe_config(sink.local_addr().unwrap().port(), 64, 1);

    let sender = TrainSender::bind(&config).unwrap();
    let mut template = PayloadFactory::new(64, MARKER).generate(EntropyClass::Low).unwrap();

    let result = sender.send_train(&mut template, MAX_TRAIN_LEN + 1);
    assert!(matches!(result, Err(CompDetectError::InvalidConfig(_))));

    let mut buf = [0u8; 128];
    assert!(sink.recv_from(&mut buf).is_err(), "Packets were sent for a rejected train");
}

/// Verifies early exit once both trains are complete, ignoring stray traffic.
#[test]
fn test_receiver_completes_both_trains() {
    let t = Instant::now();

    let receiver = receiver(20).with_cutoff(Duration::from_secs(10));
    let config = probe_config(receiver.local_addr().unwrap().port(), 128, 20);

    // Stray datagrams: too short, and a near-miss marker.
    let stray = UdpSocket::bind(loopback(0)).unwrap();
    stray.send_to(&[0u8; 5], receiver.local_addr().unwrap()).unwrap();
    let mut near_miss = [0u8; 128];
    near_miss[2..12].copy_from_slice(b"1234567899");
    stray.send_to(&near_miss, receiver.local_addr().unwrap()).unwrap();

    sender::run_probe(&config).expect("Probe failed");

    let start = Instant::now();
    let outcome = receiver.run(config.payload_len()).expect("Receive failed");
    assert_eq!(outcome.termination, Termination::Complete);
    assert_eq!(outcome.low.count(), 20);
    assert_eq!(outcome.high.count(), 20);
    assert!(start.elapsed() < Duration::from_secs(10), "Receiver waited for the cutoff");

    let overhead = t.elapsed();
    println!("test_receiver_completes_both_trains: Testing Overhead = {:?}", overhead);
}

/// Verifies that missing packets end the loop at the cutoff with partial counts,
/// and that detection still produces a verdict.
#[test]
fn test_receiver_cutoff_with_partial_counts() {
    let t = Instant::now();

    let cutoff = Duration::from_millis(300);
    let receiver = receiver(10).with_cutoff(cutoff);
    let config = probe_config(receiver.local_addr().unwrap().port(), 64, 10);

    // Only the low entropy train is ever sent.
    let sender = TrainSender::bind(&config).unwrap();
    let mut low = PayloadFactory::new(64, MARKER).generate(EntropyClass::Low).unwrap();
    sender.send_train(&mut low, 10).unwrap();

    let start = Instant::now();
    let outcome = receiver.run(config.payload_len()).expect("Receive failed");
    let elapsed = start.elapsed();

    assert_eq!(outcome.termination, Termination::Cutoff);
    assert_eq!(outcome.low.count(), 10);
    assert_eq!(outcome.high.count(), 0);
    assert!(elapsed >= cutoff);
    assert!(
        elapsed < cutoff + Duration::from_secs(5),
        "Receiver overran the cutoff: {:?}",
        elapsed
    );

    let result = DetectionEngine::new(0).evaluate(&outcome.low, &outcome.high);
    assert_eq!(result.high_spread_ms, 0);
    assert!(result.metric_ms <= 0);
    assert!(!result.detected);

    let overhead = t.elapsed();
    println!("test_receiver_cutoff_with_partial_counts: Testing Overhead = {:?}", overhead);
}

/// Verifies that an idle port still terminates at the cutoff.
#[test]
fn test_receiver_idle_port_terminates() {
    let receiver = receiver(5).with_cutoff(Duration::from_millis(100));
    let outcome = receiver.run(64).unwrap();

    assert_eq!(outcome.termination, Termination::Cutoff);
    assert_eq!(outcome.low.count(), 0);
    assert_eq!(outcome.high.count(), 0);
    assert_eq!(outcome.low.spread_ms(), 0);
}
