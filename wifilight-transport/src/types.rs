//! Common types for transport layer

use serde::Serialize;

use crate::error::TransportError;

/// How a family's controller expects to be connected to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportMode {
    /// Open once, keep the TCP connection open, reconnect on drop
    Persistent,
    /// Open a fresh TCP connection per write, close after one response
    /// (controllers that sleep between commands)
    PerWrite,
    /// UDP datagrams, socket bound lazily on first write
    Datagram,
}

impl TransportMode {
    /// Check if this mode keeps a connection open between writes
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Persistent)
    }
}

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Online,
    /// A retryable error occurred, a reconnect is scheduled
    OfflinePendingRetry,
}

impl ConnectionState {
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online)
    }
}

/// Last known snapshot of a controller, as reported by a status frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DeviceState {
    pub power: bool,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    /// Only present for families reporting a white channel
    pub white: Option<u8>,
    pub program: u8,
    pub program_running: bool,
    pub program_speed: u8,
}

impl DeviceState {
    /// `#rrggbb` or `#rrggbbww` when a white channel is known
    pub fn hex(&self) -> String {
        match self.white {
            Some(w) => format!("#{:02x}{:02x}{:02x}{:02x}", self.red, self.green, self.blue, w),
            None => format!("#{:02x}{:02x}{:02x}", self.red, self.green, self.blue),
        }
    }
}

/// Event pushed by a link's reader into the owning connection manager
#[derive(Debug)]
pub struct LinkEvent {
    /// Identifies the link that produced the event, so events from a link
    /// that was already replaced can be ignored
    pub link: u64,
    pub kind: LinkEventKind,
}

#[derive(Debug)]
pub enum LinkEventKind {
    /// Bytes received from the controller
    Data(Vec<u8>),
    /// The link ended; `None` for an orderly close by the peer
    Closed(Option<TransportError>),
}
