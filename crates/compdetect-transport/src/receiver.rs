use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use compdetect_codec::{EntropyClass, EntropyClassifier, HEADER_LEN};
use compdetect_core::{ArrivalRecord, CompDetectError, ProbeConfig};
use socket2::{Domain, Protocol, Socket, Type};

/// How long the server keeps polling before giving up on missing packets.
pub const PROBE_CUTOFF: Duration = Duration::from_secs(60);

/// Kernel receive buffer requested for the probe socket, sized to absorb a
/// whole train arriving at wire speed.
pub const RECV_BUFFER_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Both trains arrived in full.
    Complete,
    /// The cutoff elapsed first; the records hold partial counts.
    Cutoff,
}

#[derive(Debug, Clone, Copy)]
pub struct ReceiveOutcome {
    pub low: ArrivalRecord,
    pub high: ArrivalRecord,
    pub termination: Termination,
}

/// Non-blocking receiver that buckets probe datagrams by entropy class.
pub struct TrainReceiver {
    socket: UdpSocket,
    classifier: EntropyClassifier,
    expected: u32,
    cutoff: Duration,
}

impl TrainReceiver {
    pub fn bind(
        addr: SocketAddr,
        expected: u32,
        classifier: EntropyClassifier,
    ) -> Result<Self, CompDetectError> {
        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
        socket.bind(&addr.into())?;
        socket.set_nonblocking(true)?;
        socket.set_recv_buffer_size(RECV_BUFFER_BYTES)?;

        Ok(Self {
            socket: socket.into(),
            classifier,
            expected,
            cutoff: PROBE_CUTOFF,
        })
    }

    /// Binds `udp_dst_port` on the wildcard address for the server's probing phase.
    pub fn for_config(config: &ProbeConfig) -> Result<Self, CompDetectError> {
        let addr = crate::unspecified(config.server_ip_addr, config.udp_dst_port);
        Self::bind(addr, config.n, EntropyClassifier::new(config.udp_head_bytes))
    }

    pub fn with_cutoff(mut self, cutoff: Duration) -> Self {
        self.cutoff = cutoff;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, CompDetectError> {
        Ok(self.socket.local_addr()?)
    }

    /// Polls until both trains are complete or the cutoff elapses.
    ///
    /// Datagrams that match neither marker are dropped without being counted.
    /// Timestamps are taken at receipt; the carried sequence id is ignored.
    pub fn run(&self, datagram_len: usize) -> Result<ReceiveOutcome, CompDetectError> {
        let mut buf = vec![0u8; datagram_len.max(HEADER_LEN)];
        let mut low = ArrivalRecord::new();
        let mut high = ArrivalRecord::new();
        let mut stray: u64 = 0;

        tracing::info!(
            "Receiving {} packets per train on {:?} (cutoff {:?})",
            self.expected,
            self.socket.local_addr().ok(),
            self.cutoff
        );

        let start = Instant::now();
        let termination = loop {
            match self.socket.recv_from(&mut buf) {
                Ok((len, _src)) => {
                    let at = Instant::now();
                    match self.classifier.classify(&buf[..len]) {
                        Some(EntropyClass::Low) => low.record(at),
                        Some(EntropyClass::High) => high.record(at),
                        None => {
                            stray += 1;
                            continue;
                        }
                    }
                    if low.is_complete(self.expected) && high.is_complete(self.expected) {
                        break Termination::Complete;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if start.elapsed() > self.cutoff {
                        break Termination::Cutoff;
                    }
                    std::hint::spin_loop();
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };

        match termination {
            Termination::Complete => tracing::info!(
                "Both trains complete after {:?}",
                start.elapsed()
            ),
            Termination::Cutoff => tracing::warn!(
                "Cutoff reached: {}/{} low, {}/{} high",
                low.count(),
                self.expected,
                high.count(),
                self.expected
            ),
        }
        if stray > 0 {
            tracing::debug!("Ignored {} unclassified datagrams", stray);
        }

        Ok(ReceiveOutcome { low, high, termination })
    }
}
