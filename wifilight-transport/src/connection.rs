//! Connection lifecycle of one controller
//!
//! The manager owns the current link (if any), numbers every link it opens
//! and filters reader events so that a link that was already replaced cannot
//! affect the current one. It never sleeps itself: [`ConnectionManager::fail`]
//! returns the reconnect delay and the owner schedules the retry.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::TransportError;
use crate::protocol::{hex_dump, timing};
use crate::types::{ConnectionState, LinkEvent, LinkEventKind, TransportMode};
use crate::{Connector, FrameSink};

pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    mode: TransportMode,
    retry_delay: Duration,
    state: ConnectionState,
    sink: Option<Box<dyn FrameSink>>,
    link: u64,
    events: mpsc::UnboundedSender<LinkEvent>,
}

impl ConnectionManager {
    /// Create a manager and the receiver its links report to
    pub fn new(
        connector: Arc<dyn Connector>,
        mode: TransportMode,
    ) -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let manager = Self {
            connector,
            mode,
            retry_delay: Duration::from_millis(timing::RECONNECT_DELAY_MS),
            state: ConnectionState::Disconnected,
            sink: None,
            link: 0,
            events,
        };
        (manager, rx)
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Id of the most recently opened link
    pub fn current_link(&self) -> u64 {
        self.link
    }

    /// Bring the connection up.
    ///
    /// Persistent links connect immediately. On-demand modes are considered
    /// online right away and connect on the first write.
    pub async fn open(&mut self) -> Result<(), TransportError> {
        self.sink = None;
        if !self.mode.is_persistent() {
            self.state = ConnectionState::Online;
            return Ok(());
        }

        self.state = ConnectionState::Connecting;
        match self.connect().await {
            Ok(sink) => {
                self.sink = Some(sink);
                self.state = ConnectionState::Online;
                info!(addr = %self.connector.describe(), link = self.link, "connected");
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    async fn connect(&mut self) -> Result<Box<dyn FrameSink>, TransportError> {
        self.link += 1;
        self.connector.connect(self.link, self.events.clone()).await
    }

    /// Write one frame, (re)connecting first when there is no usable link
    pub async fn write(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        if self.mode.is_persistent() {
            if !self.state.is_online() || self.sink.is_none() {
                debug!(state = ?self.state, "not online, reconnecting before write");
                self.open().await?;
            }
        } else if self.sink.is_none() {
            let sink = self.connect().await?;
            self.sink = Some(sink);
            self.state = ConnectionState::Online;
        }

        let sink = self.sink.as_mut().ok_or(TransportError::Offline)?;
        debug!(frame = %hex_dump(frame), "write");
        sink.send(frame).await
    }

    /// Filter an event from a link reader.
    ///
    /// Events of replaced links are dropped. A close event releases the
    /// current link; the caller decides what to do next.
    pub fn accept(&mut self, event: LinkEvent) -> Option<LinkEventKind> {
        if event.link != self.link {
            debug!(link = event.link, current = self.link, "ignoring event from stale link");
            return None;
        }
        match &event.kind {
            LinkEventKind::Data(_) if self.mode == TransportMode::PerWrite => {
                // One response per connection
                self.sink = None;
            }
            LinkEventKind::Data(_) => {}
            LinkEventKind::Closed(_) => {
                self.sink = None;
                if self.mode.is_persistent() && self.state.is_online() {
                    self.state = ConnectionState::Disconnected;
                }
            }
        }
        Some(event.kind)
    }

    /// Record a transport failure.
    ///
    /// Returns the delay after which a reconnect should be attempted when the
    /// error is retryable. Other errors leave the device offline until the
    /// next write reconnects it.
    pub fn fail(&mut self, err: &TransportError) -> Option<Duration> {
        self.sink = None;
        if !self.mode.is_persistent() {
            debug!(error = %err, "on-demand link failed, next write reopens it");
            return None;
        }
        if err.is_retryable() {
            warn!(error = %err, delay = ?self.retry_delay, "connection lost, retrying");
            self.state = ConnectionState::OfflinePendingRetry;
            Some(self.retry_delay)
        } else {
            error!(error = %err, addr = %self.connector.describe(), "connection failed");
            self.state = ConnectionState::Disconnected;
            None
        }
    }

    /// Drop the link and stay disconnected
    pub fn close(&mut self) {
        if self.sink.take().is_some() {
            debug!(link = self.link, "closing link");
        }
        self.state = ConnectionState::Disconnected;
    }
}
