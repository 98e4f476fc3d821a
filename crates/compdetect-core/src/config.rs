use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::error::CompDetectError;

/// Length of the classification marker that follows the sequence id.
pub const MARKER_LEN: usize = 10;

pub type Marker = [u8; MARKER_LEN];

/// 2-byte id + 10-byte marker region.
pub const MIN_PAYLOAD_LEN: u32 = 12;
/// Largest UDP payload an IPv4 datagram can carry.
pub const MAX_PAYLOAD_LEN: u32 = 65_507;
/// Sequence ids are 16-bit, so a train can hold at most 2^16 packets.
pub const MAX_TRAIN_LEN: u32 = 1 << 16;

pub const DEFAULT_PREPROBE_PORT: u16 = 7777;
pub const DEFAULT_POSTPROBE_PORT: u16 = 6666;
pub const DEFAULT_UDP_SRC_PORT: u16 = 9876;
pub const DEFAULT_UDP_DST_PORT: u16 = 8765;
pub const DEFAULT_MARKER: Marker = *b"1234567890";
pub const DEFAULT_PAYLOAD_LEN: u32 = 1000;
pub const DEFAULT_TRAIN_LEN: u32 = 6000;
pub const DEFAULT_GAMMA_SECS: u16 = 15;
pub const DEFAULT_TAU_MS: u32 = 100;

/// Session configuration shared by both roles.
///
/// The client loads it from a file and ships it verbatim (as JSON) during
/// pre-probing; the server decodes the same blob. Field names match the
/// keys of the on-disk configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub server_ip_addr: IpAddr,
    #[serde(default = "default_preprobe_port")]
    pub server_port_preprobing: u16,
    #[serde(default = "default_postprobe_port")]
    pub server_port_postprobing: u16,
    #[serde(default = "default_udp_src_port")]
    pub udp_src_port: u16,
    #[serde(default = "default_udp_dst_port")]
    pub udp_dst_port: u16,
    #[serde(default = "default_marker", with = "marker_bytes")]
    pub udp_head_bytes: Marker,
    /// Size of every UDP payload, in bytes.
    #[serde(default = "default_payload_len")]
    pub l: u32,
    /// Number of packets per train.
    #[serde(default = "default_train_len")]
    pub n: u32,
    /// Pause between the two trains, in seconds.
    #[serde(default = "default_gamma")]
    pub gamma: u16,
    /// Detection threshold, in milliseconds.
    #[serde(default = "default_tau")]
    pub tau: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u8>,
}

fn default_preprobe_port() -> u16 {
    DEFAULT_PREPROBE_PORT
}

fn default_postprobe_port() -> u16 {
    DEFAULT_POSTPROBE_PORT
}

fn default_udp_src_port() -> u16 {
    DEFAULT_UDP_SRC_PORT
}

fn default_udp_dst_port() -> u16 {
    DEFAULT_UDP_DST_PORT
}

fn default_marker() -> Marker {
    DEFAULT_MARKER
}

fn default_payload_len() -> u32 {
    DEFAULT_PAYLOAD_LEN
}

fn default_train_len() -> u32 {
    DEFAULT_TRAIN_LEN
}

fn default_gamma() -> u16 {
    DEFAULT_GAMMA_SECS
}

fn default_tau() -> u32 {
    DEFAULT_TAU_MS
}

impl ProbeConfig {
    /// A configuration pointing at `server_ip_addr` with every other field defaulted.
    pub fn new(server_ip_addr: IpAddr) -> Self {
        Self {
            server_ip_addr,
            server_port_preprobing: DEFAULT_PREPROBE_PORT,
            server_port_postprobing: DEFAULT_POSTPROBE_PORT,
            udp_src_port: DEFAULT_UDP_SRC_PORT,
            udp_dst_port: DEFAULT_UDP_DST_PORT,
            udp_head_bytes: DEFAULT_MARKER,
            l: DEFAULT_PAYLOAD_LEN,
            n: DEFAULT_TRAIN_LEN,
            gamma: DEFAULT_GAMMA_SECS,
            tau: DEFAULT_TAU_MS,
            ttl: None,
        }
    }

    /// Loads a configuration file. `.toml` files are parsed as TOML, anything
    /// else as JSON.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CompDetectError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| CompDetectError::ConfigDecode(format!("{}: {}", path.display(), e)))?;

        let config: ProbeConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&text)?,
            _ => serde_json::from_str(&text)?,
        };
        config.validate()?;

        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Decodes the pre-probe message.
    pub fn from_blob(blob: &[u8]) -> Result<Self, CompDetectError> {
        let config: ProbeConfig = serde_json::from_slice(blob)?;
        config.validate()?;
        Ok(config)
    }

    /// Encodes the pre-probe message.
    pub fn to_blob(&self) -> Result<Vec<u8>, CompDetectError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn validate(&self) -> Result<(), CompDetectError> {
        if self.l < MIN_PAYLOAD_LEN {
            return Err(CompDetectError::InvalidConfig(format!(
                "payload size l={} is below the {}-byte header",
                self.l, MIN_PAYLOAD_LEN
            )));
        }
        if self.l > MAX_PAYLOAD_LEN {
            return Err(CompDetectError::InvalidConfig(format!(
                "payload size l={} exceeds the UDP maximum of {}",
                self.l, MAX_PAYLOAD_LEN
            )));
        }
        if self.n == 0 || self.n > MAX_TRAIN_LEN {
            return Err(CompDetectError::InvalidConfig(format!(
                "train length n={} must be within 1..={}",
                self.n, MAX_TRAIN_LEN
            )));
        }
        // An all-zero marker would classify every high-entropy packet as low.
        if self.udp_head_bytes == [0u8; MARKER_LEN] {
            return Err(CompDetectError::InvalidConfig(
                "udp_head_bytes must not be all zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn payload_len(&self) -> usize {
        self.l as usize
    }

    pub fn preprobe_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server_ip_addr, self.server_port_preprobing)
    }

    pub fn postprobe_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server_ip_addr, self.server_port_postprobing)
    }

    /// Where the client aims its packet trains.
    pub fn probe_dst_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server_ip_addr, self.udp_dst_port)
    }

    pub fn inter_train_delay(&self) -> Duration {
        Duration::from_secs(u64::from(self.gamma))
    }
}

/// The marker is written as a 10-character string in configuration files.
/// A JSON array of 10 integers is accepted for markers that are not UTF-8.
mod marker_bytes {
    use super::{Marker, MARKER_LEN};
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Bytes(Vec<u8>),
    }

    pub fn serialize<S: Serializer>(marker: &Marker, serializer: S) -> Result<S::Ok, S::Error> {
        match core::str::from_utf8(marker) {
            Ok(text) => serializer.serialize_str(text),
            Err(_) => marker.serialize(serializer),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Marker, D::Error> {
        let bytes = match Repr::deserialize(deserializer)? {
            Repr::Text(text) => text.into_bytes(),
            Repr::Bytes(bytes) => bytes,
        };
        if bytes.len() != MARKER_LEN {
            return Err(de::Error::invalid_length(bytes.len(), &"exactly 10 bytes"));
        }
        let mut marker = [0u8; MARKER_LEN];
        marker.copy_from_slice(&bytes);
        Ok(marker)
    }
}
