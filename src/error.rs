use std::io;
use thiserror::Error;

/// Errors from gPTP message decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Frame shorter than the fixed layout requires
    #[error("packet too short: need {needed} bytes, have {have}")]
    TooShort {
        /// Minimum bytes needed
        needed: usize,
        /// Bytes actually available
        have: usize,
    },

    /// Message type nibble not handled by gPTP
    #[error("unknown PTP message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    /// Major PTP version other than 2
    #[error("unsupported PTP version: {0}")]
    UnsupportedVersion(u8),

    /// Header message length larger than the frame
    #[error("bad message length: header declares {declared}, frame has {have}")]
    BadLength {
        /// Length from the header
        declared: usize,
        /// Bytes actually available
        have: usize,
    },
}

/// Fatal configuration errors, reported once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Automotive profile only supports domain 0
    #[error("multiple gPTP domains are not allowed with the automotive profile")]
    AutomotiveMultipleDomains,

    /// Instance 0 must run domain 0
    #[error("gPTP instance 0 must be assigned to domain 0, got {0}")]
    FirstDomainNotZero(i16),

    /// Domain number outside -1..=127
    #[error("domain index {index}: number {number} outside 0..=127 (or -1 to disable)")]
    DomainOutOfRange {
        /// Index in the domain list
        index: usize,
        /// Configured domain number
        number: i16,
    },

    /// Two enabled domains share a number
    #[error("domain number {0} is configured more than once")]
    DuplicateDomain(i16),

    /// Delay mechanism other than P2P / Common-P2P
    #[error("domain index {domain} port {port}: delay mechanism {mechanism} not supported")]
    UnsupportedDelayMechanism {
        /// Domain index
        domain: usize,
        /// Port index
        port: usize,
        /// Offending mechanism name
        mechanism: String,
    },

    /// P2P is only legal on domain 0
    #[error("domain index {domain} port {port}: delay mechanism must not be P2P for domains > 0")]
    P2pOnNonZeroDomain {
        /// Domain index
        domain: usize,
        /// Port index
        port: usize,
    },

    /// Unsupported port count
    #[error("port count {0} not supported (1..=64)")]
    PortCount(usize),

    /// Unsupported domain count
    #[error("domain count {0} not supported (1..=8)")]
    DomainCount(usize),

    /// Interval or threshold outside its accepted range
    #[error("invalid value for {name}: {message}")]
    InvalidValue {
        /// Field name
        name: &'static str,
        /// Description of the problem
        message: String,
    },

    /// Configuration text could not be parsed
    #[error("malformed configuration: {0}")]
    Malformed(String),
}

/// Top-level error type.
#[derive(Debug, Error)]
pub enum GptpError {
    // ===== Startup Errors =====
    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    // ===== Protocol Errors =====
    /// Frame could not be decoded
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    // ===== Collaborator Errors =====
    /// I/O error from a transport
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Local clock refused an operation
    #[error("clock error: {message}")]
    Clock {
        /// Description of the failure
        message: String,
    },

    /// Network interface refused an operation
    #[error("network error on port {port}: {message}")]
    Network {
        /// Port index
        port: usize,
        /// Description of the failure
        message: String,
    },

    // ===== Lifecycle Errors =====
    /// The engine has been shut down
    #[error("engine shut down")]
    Shutdown,
}

impl GptpError {
    /// Whether the error is only relevant at startup
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Shutdown)
    }
}

/// Result type alias for gPTP operations
pub type Result<T> = std::result::Result<T, GptpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::TooShort { needed: 44, have: 10 };
        assert_eq!(err.to_string(), "packet too short: need 44 bytes, have 10");
        assert_eq!(
            ParseError::UnknownMessageType(0x0F).to_string(),
            "unknown PTP message type: 0x0F"
        );
    }

    #[test]
    fn test_config_error_wraps() {
        let err: GptpError = ConfigError::DuplicateDomain(3).into();
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "configuration error: domain number 3 is configured more than once"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "closed");
        let err: GptpError = io_err.into();
        assert!(matches!(err, GptpError::Io(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_error_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GptpError>();
    }
}
