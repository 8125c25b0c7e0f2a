//! Device layer error types

use thiserror::Error;
use wifilight_transport::{ProtocolError, TransportError};

/// Errors from device operations
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Command could not be encoded for this family
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Malformed free-text command or color
    #[error("Invalid command: {0}")]
    Parse(#[from] ParseError),

    /// Operation not available for this family
    #[error("Feature not supported: {0}")]
    NotSupported(String),

    /// The device task has shut down
    #[error("Device has been shut down")]
    Gone,
}

/// Parse error for free-text commands and hex colors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid hex color: {0:?}")]
    HexColor(String),

    #[error("Unknown key: {0:?}")]
    UnknownKey(String),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("Invalid program: {0}")]
    Program(String),

    #[error("Empty command")]
    Empty,
}
