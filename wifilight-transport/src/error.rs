//! Transport error types

use std::io;

use thiserror::Error;

/// Errors that can occur during transport operations
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Connect to {addr} timed out")]
    ConnectTimeout { addr: String },

    #[error("Connection closed by peer")]
    Closed,

    #[error("Device is offline")]
    Offline,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

impl TransportError {
    /// Whether the error is transient and a reconnect should be scheduled.
    ///
    /// Only connection-reset, timeout and broken-pipe qualify. Anything else
    /// leaves the device offline until the next write forces a reconnect.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset | io::ErrorKind::TimedOut | io::ErrorKind::BrokenPipe
            ),
            TransportError::ConnectTimeout { .. } => true,
            _ => false,
        }
    }
}

/// Errors raised while resolving a command template
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Template expects {expected} argument(s), got {got}")]
    MissingArgument { expected: usize, got: usize },

    #[error("Template has {expected} placeholder(s) but {got} arguments were supplied")]
    TooManyArguments { expected: usize, got: usize },

    #[error("Family {family} has no {command} command")]
    Unsupported {
        family: &'static str,
        command: &'static str,
    },

    #[error("Unknown device family: {0}")]
    UnknownFamily(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        for kind in [
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::TimedOut,
            io::ErrorKind::BrokenPipe,
        ] {
            assert!(TransportError::Io(io::Error::from(kind)).is_retryable());
        }
        assert!(TransportError::ConnectTimeout {
            addr: "10.0.0.1:5577".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_fatal_kinds() {
        assert!(!TransportError::Io(io::Error::from(io::ErrorKind::ConnectionRefused)).is_retryable());
        assert!(!TransportError::Io(io::Error::from(io::ErrorKind::PermissionDenied)).is_retryable());
        assert!(!TransportError::Closed.is_retryable());
        assert!(!TransportError::Offline.is_retryable());
    }
}
