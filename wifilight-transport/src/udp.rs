//! UDP datagrams to the MiLight bridge

use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::TransportError;
use crate::types::LinkEvent;
use crate::{Connector, FrameSink};

/// Sends datagrams to `host:port`; the bridge never answers
#[derive(Debug, Clone)]
pub struct UdpConnector {
    addr: SocketAddr,
}

impl UdpConnector {
    pub fn new(host: &str, port: u16) -> Result<Self, TransportError> {
        let ip: IpAddr = host
            .parse()
            .map_err(|_| TransportError::InvalidAddress(host.to_string()))?;
        Ok(Self {
            addr: SocketAddr::new(ip, port),
        })
    }

    fn is_broadcast(&self) -> bool {
        match self.addr.ip() {
            IpAddr::V4(ip) => ip.is_broadcast() || ip.octets()[3] == 255,
            IpAddr::V6(_) => false,
        }
    }
}

#[async_trait]
impl Connector for UdpConnector {
    async fn connect(
        &self,
        link: u64,
        _events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<Box<dyn FrameSink>, TransportError> {
        let bind: SocketAddr = match self.addr {
            SocketAddr::V4(_) => ([0, 0, 0, 0], 0).into(),
            SocketAddr::V6(_) => ([0u16; 8], 0).into(),
        };
        let socket = UdpSocket::bind(bind).await?;
        if self.is_broadcast() {
            socket.set_broadcast(true)?;
        }
        socket.connect(self.addr).await?;
        debug!(addr = %self.addr, link, "datagram socket bound");
        Ok(Box::new(UdpSink { socket }))
    }

    fn describe(&self) -> String {
        self.addr.to_string()
    }
}

struct UdpSink {
    socket: UdpSocket,
}

#[async_trait]
impl FrameSink for UdpSink {
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.socket.send(frame).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_detection() {
        assert!(UdpConnector::new("255.255.255.255", 8899).unwrap().is_broadcast());
        assert!(UdpConnector::new("192.168.1.255", 8899).unwrap().is_broadcast());
        assert!(!UdpConnector::new("192.168.1.20", 8899).unwrap().is_broadcast());
    }

    #[test]
    fn test_rejects_hostnames() {
        assert!(matches!(
            UdpConnector::new("bridge.local", 8899),
            Err(TransportError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn test_datagram_reaches_peer() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = peer.local_addr().unwrap().port();
        let (tx, _rx) = mpsc::unbounded_channel();

        let mut sink = UdpConnector::new("127.0.0.1", port)
            .unwrap()
            .connect(1, tx)
            .await
            .unwrap();
        sink.send(&[0x42, 0x00, 0x55]).await.unwrap();

        let mut buf = [0u8; 8];
        let n = peer.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[0x42, 0x00, 0x55]);
    }
}
