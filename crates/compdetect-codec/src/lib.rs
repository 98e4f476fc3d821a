//! # compdetect-codec: Probe Payload Wire Format
//!
//! | Offset | Length | Content |
//! |---|---|---|
//! | 0 | 2 | sequence id, big-endian |
//! | 2 | 10 | marker: all zero (low entropy) or configured bytes (high entropy) |
//! | 12 | l-12 | filler: zero (low entropy) or random (high entropy) |

pub mod templates;
pub use templates::{PayloadFactory, TrainTemplate};

use compdetect_core::{Marker, MARKER_LEN};
use static_assertions::const_assert_eq;

pub const ID_LEN: usize = 2;
pub const HEADER_LEN: usize = ID_LEN + MARKER_LEN;

const_assert_eq!(HEADER_LEN, 12);

const LOW_ENTROPY_MARKER: Marker = [0u8; MARKER_LEN];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntropyClass {
    /// All-zero, compressible content.
    Low,
    /// Random, incompressible content.
    High,
}

/// Sorts received datagrams into entropy classes by their marker bytes.
pub struct EntropyClassifier {
    high_marker: Marker,
}

impl EntropyClassifier {
    pub fn new(high_marker: Marker) -> Self {
        Self { high_marker }
    }

    /// Classifies a full datagram by its bytes `[2,12)`.
    ///
    /// Returns `None` for anything that is not an exact match, including
    /// datagrams too short to carry a header.
    #[inline]
    pub fn classify(&self, datagram: &[u8]) -> Option<EntropyClass> {
        let marker = datagram.get(ID_LEN..HEADER_LEN)?;
        self.classify_marker(marker)
    }

    /// Classifies a bare 10-byte marker region.
    #[inline]
    pub fn classify_marker(&self, marker: &[u8]) -> Option<EntropyClass> {
        if marker == LOW_ENTROPY_MARKER {
            Some(EntropyClass::Low)
        } else if marker == self.high_marker {
            Some(EntropyClass::High)
        } else {
            None
        }
    }
}
