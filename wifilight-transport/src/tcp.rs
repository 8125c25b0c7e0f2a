//! TCP links to the Wi-Fi controllers

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::TransportError;
use crate::protocol::timing;
use crate::types::{LinkEvent, LinkEventKind};
use crate::{Connector, FrameSink};

const READ_CHUNK: usize = 256;

/// Connects to `host:port` over TCP
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            addr: format!("{}:{}", host, port),
            connect_timeout: Duration::from_millis(timing::CONNECT_TIMEOUT_MS),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(
        &self,
        link: u64,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<Box<dyn FrameSink>, TransportError> {
        debug!(addr = %self.addr, link, "connecting");
        let stream = match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.addr)).await {
            Ok(stream) => stream?,
            Err(_) => {
                return Err(TransportError::ConnectTimeout {
                    addr: self.addr.clone(),
                })
            }
        };
        stream.set_nodelay(true)?;

        let (reader, writer) = stream.into_split();
        let reader = tokio::spawn(read_loop(reader, link, events));
        Ok(Box::new(TcpSink { writer, reader }))
    }

    fn describe(&self) -> String {
        self.addr.clone()
    }
}

struct TcpSink {
    writer: OwnedWriteHalf,
    reader: JoinHandle<()>,
}

#[async_trait]
impl FrameSink for TcpSink {
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.writer.write_all(frame).await?;
        Ok(())
    }
}

impl Drop for TcpSink {
    fn drop(&mut self) {
        // A replaced link must not report anything anymore
        self.reader.abort();
    }
}

async fn read_loop(mut reader: OwnedReadHalf, link: u64, events: mpsc::UnboundedSender<LinkEvent>) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let kind = match reader.read(&mut buf).await {
            Ok(0) => LinkEventKind::Closed(None),
            Ok(n) => {
                trace!(link, n, "read");
                LinkEventKind::Data(buf[..n].to_vec())
            }
            Err(e) => LinkEventKind::Closed(Some(e.into())),
        };
        let done = matches!(kind, LinkEventKind::Closed(_));
        if events.send(LinkEvent { link, kind }).is_err() || done {
            break;
        }
    }
}
