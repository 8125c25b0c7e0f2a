//! Wire layer for networked RGB(W) light controllers
//!
//! This crate knows how to talk to the controllers, not what to tell them:
//!
//! - Protocol tables per family (byte templates, checksums, status decoding)
//! - Reassembly of status frames from a TCP byte stream
//! - TCP and UDP links behind a small [`Connector`] seam
//! - Connection lifecycle with reconnect classification

pub mod connection;
pub mod error;
pub mod frame;
pub mod protocol;
pub mod tcp;
pub mod types;
pub mod udp;

pub use connection::ConnectionManager;
pub use error::{ProtocolError, TransportError};
pub use frame::FrameDecoder;
pub use protocol::{
    checksum, family_for_device_name, hex_dump, ColorModel, Decoded, DialTemplates, Family, Gap,
    ProtocolSpec, Segment, Slot, Template, Token,
};
pub use tcp::TcpConnector;
pub use types::{ConnectionState, DeviceState, LinkEvent, LinkEventKind, TransportMode};
pub use udp::UdpConnector;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Opens links to one controller
///
/// Implementations spawn whatever reader they need and report inbound bytes
/// and the end of the link on `events`, tagged with `link`.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        link: u64,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<Box<dyn FrameSink>, TransportError>;

    /// Peer address for logs
    fn describe(&self) -> String;
}

/// Write half of an open link. Dropping it closes the link.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;
}

/// Pick the connector matching a family's transport mode
pub fn connector_for(
    mode: TransportMode,
    host: &str,
    port: u16,
) -> Result<Arc<dyn Connector>, TransportError> {
    Ok(match mode {
        TransportMode::Persistent | TransportMode::PerWrite => Arc::new(TcpConnector::new(host, port)),
        TransportMode::Datagram => Arc::new(UdpConnector::new(host, port)?),
    })
}
