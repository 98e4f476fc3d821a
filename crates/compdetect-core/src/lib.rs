pub mod config;
pub mod error;
pub mod engine;
pub mod session;

pub use config::{Marker, ProbeConfig, MARKER_LEN};
pub use engine::{ArrivalRecord, DetectionEngine, DetectionResult, Verdict};
pub use error::CompDetectError;
pub use session::{ProbePhase, ProbeSession, Role};
