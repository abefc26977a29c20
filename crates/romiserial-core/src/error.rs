//! Error handling for RomiSerial
//!
//! Provides error types for all layers of the protocol stack:
//! - Protocol errors (framing, reply decoding, device status codes)
//! - Controller errors (configuration state machine, argument validation)
//! - Connection errors (opening and losing the byte-stream link)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Protocol error type
///
/// Represents failures of the request/response discipline itself:
/// undecodable frames, device-reported rejections, and exhausted retries.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// A reply frame could not be decoded
    #[error("Malformed reply '{line}': {reason}")]
    MalformedReply {
        /// The raw line that failed to decode.
        line: String,
        /// Why decoding failed.
        reason: String,
    },

    /// The command could not be encoded into a request frame
    #[error("Invalid command: {reason}")]
    InvalidCommand {
        /// Why the command was rejected before sending.
        reason: String,
    },

    /// The device replied with a positive (fatal) status code
    #[error("Device error {code}: {}", .message.as_deref().unwrap_or("no message"))]
    DeviceError {
        /// The status code reported by the firmware.
        code: i32,
        /// Optional message sent along with the status code.
        message: Option<String>,
    },

    /// The device kept answering with a transient status
    #[error("Command failed: retries exhausted after {attempts} attempts ({command})")]
    RetriesExhausted {
        /// The command text that was retried.
        command: String,
        /// Number of attempts made.
        attempts: u32,
    },
}

/// Controller error type
///
/// Represents errors raised by the device controllers before or after
/// talking to the firmware.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControllerError {
    /// An operation was attempted before a configuration was uploaded
    #[error("Controller not configured")]
    NotConfigured,

    /// The device refused the uploaded configuration
    #[error("Configuration rejected by device (code {code}): {}", .message.as_deref().unwrap_or("no message"))]
    ConfigurationRejected {
        /// The status code reported by the firmware.
        code: i32,
        /// Optional message sent along with the status code.
        message: Option<String>,
    },

    /// The configuration values are not usable
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Why the configuration is invalid.
        reason: String,
    },

    /// A motor signal exceeds the configured amplitude
    #[error("Signal {signal} exceeds maximum amplitude {max}")]
    SignalOutOfRange {
        /// The requested signal.
        signal: i32,
        /// The configured maximum amplitude.
        max: i32,
    },

    /// An argument is outside its accepted domain
    #[error("Invalid argument: {reason}")]
    InvalidArgument {
        /// Why the argument was rejected.
        reason: String,
    },

    /// A blocking wait ran out of time
    #[error("Controller operation timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// A blocking wait was cancelled by the caller
    #[error("Controller operation cancelled")]
    Cancelled,
}

/// Connection error type
///
/// Represents errors related to the underlying duplex byte stream.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// The link failed in a way a retry cannot fix
    #[error("Connection lost: {reason}")]
    LinkLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },
}

/// Main error type for RomiSerial
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Controller error
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if the link to the device is gone and must be reopened
    pub fn is_link_lost(&self) -> bool {
        matches!(self, Error::Connection(ConnectionError::LinkLost { .. }))
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Controller(ControllerError::Timeout { .. }))
    }

    /// Check if the operation was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Controller(ControllerError::Cancelled))
    }

    /// Status code reported by the device, if this error carries one
    pub fn device_code(&self) -> Option<i32> {
        match self {
            Error::Protocol(ProtocolError::DeviceError { code, .. })
            | Error::Controller(ControllerError::ConfigurationRejected { code, .. }) => Some(*code),
            _ => None,
        }
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
