//! # Error Types
//!
//! Custom error types for rfspy using `thiserror`.

use thiserror::Error;

use crate::rpc::frame::Diagnostic;

/// Failure of a single USB bulk transfer or of the endpoint handshake
#[derive(Debug, Error)]
pub enum TransportFault {
    /// The transfer did not complete before its timeout
    #[error("USB transfer timed out")]
    Timeout,

    /// The device went away
    #[error("USB device disconnected")]
    NoDevice,

    /// The interface does not expose both a bulk IN and a bulk OUT endpoint
    #[error("no {0} bulk endpoint on interface 0")]
    EndpointNotFound(&'static str),

    /// The endpoint accepted only part of a request frame
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { expected: usize, written: usize },

    /// Any other libusb failure
    #[error("USB error: {0}")]
    Usb(rusb::Error),
}

impl From<rusb::Error> for TransportFault {
    fn from(err: rusb::Error) -> Self {
        match err {
            rusb::Error::Timeout => TransportFault::Timeout,
            rusb::Error::NoDevice => TransportFault::NoDevice,
            other => TransportFault::Usb(other),
        }
    }
}

/// Main error type for rfspy
#[derive(Debug, Error)]
pub enum RfspyError {
    /// Frame payload does not fit in the 16-bit length field
    #[error("payload of {len} bytes exceeds the 65535-byte frame limit")]
    PayloadTooLarge { len: usize },

    /// Response shorter than the 5-byte response header
    #[error("frame too short: {len} bytes, need at least 5")]
    FrameTooShort { len: usize },

    /// A protocol diagnostic escalated by a strict client
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(Diagnostic),

    /// Bulk transfer failure
    #[error("transport fault: {0}")]
    Transport(#[from] TransportFault),

    /// Endpoint handshake kept failing after every allowed device reset
    #[error("device initialization failed after {attempts} attempts: {source}")]
    InitializationFailed {
        attempts: u32,
        #[source]
        source: TransportFault,
    },

    /// No attached dongle matches the request
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Configuration page blob of the wrong size
    #[error("configuration page must be {expected} bytes, got {actual}")]
    PageLength { expected: usize, actual: usize },

    /// A register read returned the wrong number of bytes
    #[error("register {register} is {expected} bytes wide, got {actual}")]
    RegisterLength {
        register: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Frequency cannot be represented by the 24-bit synthesizer word
    #[error("frequency {hz} Hz is outside the synthesizer range")]
    FrequencyOutOfRange { hz: f64 },

    /// Build string contained bytes outside 7-bit ASCII
    #[error("build info is not 7-bit ASCII")]
    InvalidBuildInfo,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusb::Error> for RfspyError {
    fn from(err: rusb::Error) -> Self {
        RfspyError::Transport(err.into())
    }
}

/// Result type alias for rfspy
pub type Result<T> = std::result::Result<T, RfspyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rusb_timeout_maps_to_timeout() {
        assert!(matches!(TransportFault::from(rusb::Error::Timeout), TransportFault::Timeout));
        assert!(matches!(TransportFault::from(rusb::Error::NoDevice), TransportFault::NoDevice));
        assert!(matches!(
            TransportFault::from(rusb::Error::Pipe),
            TransportFault::Usb(rusb::Error::Pipe)
        ));
    }

    #[test]
    fn test_short_write_message() {
        let fault = TransportFault::ShortWrite { expected: 9, written: 1 };
        assert_eq!(fault.to_string(), "short write: 1 of 9 bytes");
    }

    #[test]
    fn test_initialization_failure_message() {
        let err = RfspyError::InitializationFailed {
            attempts: 6,
            source: TransportFault::EndpointNotFound("IN"),
        };
        let msg = err.to_string();
        assert!(msg.contains("6 attempts"));
        assert!(msg.contains("IN bulk endpoint"));
    }
}
