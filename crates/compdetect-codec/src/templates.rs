use compdetect_core::{CompDetectError, Marker};
use core::ops::Range;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::{EntropyClass, HEADER_LEN, ID_LEN};

const ID_RANGE: Range<usize> = 0..ID_LEN;
const MARKER_RANGE: Range<usize> = ID_LEN..HEADER_LEN;

/// A packet-train template: one datagram-sized buffer with a hot-patchable id.
///
/// Layout: `[0,2)` big-endian sequence id, `[2,12)` classification marker,
/// `[12,len)` filler. The same buffer is resent for every packet of a train;
/// only the id field changes between sends.
#[derive(Debug, Clone)]
pub struct TrainTemplate {
    buf: Vec<u8>,
    class: EntropyClass,
}

impl TrainTemplate {
    /// Overwrites the sequence id in place. Content past byte 2 is untouched.
    #[inline]
    pub fn set_id(&mut self, id: u16) {
        self.buf[ID_RANGE].copy_from_slice(&id.to_be_bytes());
    }

    #[inline]
    pub fn id(&self) -> u16 {
        u16::from_be_bytes([self.buf[0], self.buf[1]])
    }

    pub fn class(&self) -> EntropyClass {
        self.class
    }

    pub fn id_field(&self) -> &[u8] {
        &self.buf[ID_RANGE]
    }

    pub fn marker_field(&self) -> &[u8] {
        &self.buf[MARKER_RANGE]
    }

    pub fn filler(&self) -> &[u8] {
        &self.buf[HEADER_LEN..]
    }

    /// Everything after the id: marker plus filler.
    pub fn content(&self) -> &[u8] {
        &self.buf[ID_LEN..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Builds train templates of a fixed size for one session.
pub struct PayloadFactory {
    size: usize,
    marker: Marker,
}

impl PayloadFactory {
    pub fn new(size: usize, marker: Marker) -> Self {
        Self { size, marker }
    }

    /// Allocates a template of the given entropy class.
    ///
    /// Low entropy content is all zero. High entropy content is drawn from
    /// the OS CSPRNG, then bytes `[2,12)` are overwritten with the marker.
    pub fn generate(&self, class: EntropyClass) -> Result<TrainTemplate, CompDetectError> {
        if self.size < HEADER_LEN {
            return Err(CompDetectError::InvalidConfig(format!(
                "payload of {} bytes cannot hold the {}-byte header",
                self.size, HEADER_LEN
            )));
        }

        let mut buf = Vec::new();
        buf.try_reserve_exact(self.size).map_err(|e| {
            CompDetectError::Resource(format!("cannot allocate {}-byte payload: {}", self.size, e))
        })?;
        buf.resize(self.size, 0);

        if class == EntropyClass::High {
            OsRng.try_fill_bytes(&mut buf[ID_LEN..]).map_err(|e| {
                CompDetectError::Resource(format!("entropy source unavailable: {}", e))
            })?;
            buf[MARKER_RANGE].copy_from_slice(&self.marker);
        }

        tracing::debug!("Generated {:?} entropy template ({} bytes)", class, self.size);
        Ok(TrainTemplate { buf, class })
    }
}
