use std::time::Instant;

use crate::error::CompDetectError;

pub const COMPRESSION_MSG: &str = "Compression detected!";
pub const NO_COMPRESSION_MSG: &str = "No compression was detected.";

/// Arrival bookkeeping for one entropy class.
///
/// Timestamps follow receipt order, not the sequence id carried in the
/// packet; reordering on the path is deliberately left uncorrected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArrivalRecord {
    first: Option<Instant>,
    last: Option<Instant>,
    count: u32,
}

impl ArrivalRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts one packet received at `at`.
    ///
    /// `first` is stamped once; `last` only moves forward.
    pub fn record(&mut self, at: Instant) {
        if self.first.is_none() {
            self.first = Some(at);
        }
        self.last = Some(match self.last {
            Some(prev) if prev > at => prev,
            _ => at,
        });
        self.count = self.count.saturating_add(1);
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn first_arrival(&self) -> Option<Instant> {
        self.first
    }

    pub fn last_arrival(&self) -> Option<Instant> {
        self.last
    }

    pub fn is_complete(&self, expected: u32) -> bool {
        self.count >= expected
    }

    /// Milliseconds between the first and last accepted packet, truncated.
    ///
    /// Zero when fewer than two packets arrived.
    pub fn spread_ms(&self) -> i64 {
        match (self.first, self.last) {
            (Some(first), Some(last)) if self.count >= 2 => {
                last.saturating_duration_since(first).as_millis() as i64
            }
            _ => 0,
        }
    }
}

/// Outcome of one probe. Produced once, never re-evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionResult {
    pub detected: bool,
    /// `spread(high) - spread(low)`, in milliseconds.
    pub metric_ms: i64,
    pub low_spread_ms: i64,
    pub high_spread_ms: i64,
}

impl DetectionResult {
    pub fn verdict(&self) -> Verdict {
        if self.detected {
            Verdict::Compressed
        } else {
            Verdict::NotCompressed
        }
    }
}

/// Turns two arrival records into a compression verdict.
pub struct DetectionEngine {
    tau_ms: i64,
}

impl DetectionEngine {
    pub fn new(tau_ms: u32) -> Self {
        Self {
            tau_ms: i64::from(tau_ms),
        }
    }

    pub fn decide(&self, low_spread_ms: i64, high_spread_ms: i64) -> DetectionResult {
        let metric_ms = high_spread_ms - low_spread_ms;
        DetectionResult {
            // Strict: a metric equal to tau is not compression.
            detected: metric_ms > self.tau_ms,
            metric_ms,
            low_spread_ms,
            high_spread_ms,
        }
    }

    pub fn evaluate(&self, low: &ArrivalRecord, high: &ArrivalRecord) -> DetectionResult {
        let result = self.decide(low.spread_ms(), high.spread_ms());
        tracing::info!(
            "Detection: low spread {}ms ({} pkts), high spread {}ms ({} pkts), metric {}ms vs tau {}ms -> {}",
            result.low_spread_ms,
            low.count(),
            result.high_spread_ms,
            high.count(),
            result.metric_ms,
            self.tau_ms,
            result.detected
        );
        result
    }
}

/// The post-probe message, as seen on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Compressed,
    NotCompressed,
}

impl Verdict {
    pub fn message(self) -> &'static str {
        match self {
            Verdict::Compressed => COMPRESSION_MSG,
            Verdict::NotCompressed => NO_COMPRESSION_MSG,
        }
    }

    pub fn from_message(bytes: &[u8]) -> Result<Self, CompDetectError> {
        match bytes {
            b if b == COMPRESSION_MSG.as_bytes() => Ok(Verdict::Compressed),
            b if b == NO_COMPRESSION_MSG.as_bytes() => Ok(Verdict::NotCompressed),
            other => Err(CompDetectError::ProtocolViolation(format!(
                "unrecognized verdict message: {:?}",
                String::from_utf8_lossy(other)
            ))),
        }
    }
}
