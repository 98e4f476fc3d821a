use core::fmt;

#[derive(Debug)]
pub enum CompDetectError {
    /// Socket create/bind/connect/listen/accept/send/recv failure.
    Transport(std::io::Error),
    /// Entropy source or allocation failure.
    Resource(String),
    InvalidConfig(String),
    ConfigDecode(String),
    ProtocolViolation(String),
    PhaseViolation(String),
}

impl fmt::Display for CompDetectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompDetectError::Transport(e) => write!(f, "transport error: {}", e),
            CompDetectError::Resource(msg) => write!(f, "resource error: {}", msg),
            CompDetectError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            CompDetectError::ConfigDecode(msg) => write!(f, "cannot decode configuration: {}", msg),
            CompDetectError::ProtocolViolation(msg) => write!(f, "protocol violation: {}", msg),
            CompDetectError::PhaseViolation(msg) => write!(f, "phase violation: {}", msg),
        }
    }
}

impl std::error::Error for CompDetectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompDetectError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CompDetectError {
    fn from(e: std::io::Error) -> Self {
        CompDetectError::Transport(e)
    }
}

impl From<serde_json::Error> for CompDetectError {
    fn from(e: serde_json::Error) -> Self {
        CompDetectError::ConfigDecode(e.to_string())
    }
}

impl From<toml::de::Error> for CompDetectError {
    fn from(e: toml::de::Error) -> Self {
        CompDetectError::ConfigDecode(e.to_string())
    }
}
