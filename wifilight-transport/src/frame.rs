//! Reassembly of status frames from a byte stream
//!
//! TCP delivers the controller's responses in arbitrary chunks. The decoder
//! accumulates them and hands complete frames to the family's decode
//! function, dropping noise until the next plausible frame header.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::protocol::{hex_dump, ProtocolSpec};
use crate::types::DeviceState;

/// Extra capacity reserved whenever the buffer has to grow
const RECEIVE_SLACK: usize = 200;

pub struct FrameDecoder {
    spec: Arc<ProtocolSpec>,
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new(spec: Arc<ProtocolSpec>) -> Self {
        Self {
            spec,
            buf: Vec::with_capacity(RECEIVE_SLACK),
        }
    }

    /// Bytes received but not yet consumed
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop any partial frame, e.g. after the link was replaced
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Append a chunk and decode every complete frame now in the buffer.
    ///
    /// Returns the states of state-bearing frames in arrival order.
    pub fn push(&mut self, data: &[u8]) -> Vec<DeviceState> {
        let Some(min_len) = self.spec.min_frame_len() else {
            trace!(len = data.len(), "family reports no status, dropping input");
            return Vec::new();
        };

        if self.buf.capacity() - self.buf.len() < data.len() {
            self.buf.reserve(data.len() + RECEIVE_SLACK);
        }
        self.buf.extend_from_slice(data);

        let mut states = Vec::new();
        while self.buf.len() >= min_len {
            let Some(decoded) = self.spec.decode(&self.buf) else {
                self.buf.clear();
                break;
            };

            if decoded.consumed > 0 {
                let consumed = decoded.consumed.min(self.buf.len());
                debug!(frame = %hex_dump(&self.buf[..consumed]), "received frame");
                self.buf.drain(..consumed);
                states.extend(decoded.state);
                continue;
            }

            // Nothing consumed. A frame that starts with the header is just
            // incomplete; anything else is noise to skip.
            let header = self.spec.status_header;
            if header.is_some() && self.buf.first() == header.as_ref() {
                break;
            }
            let next = header.and_then(|h| self.buf.iter().skip(1).position(|b| *b == h));
            match next {
                Some(pos) => {
                    debug!(skipped = pos + 1, "resynchronising on frame header");
                    self.buf.drain(..pos + 1);
                }
                None => {
                    debug!(dropped = self.buf.len(), "no frame header in buffer, dropping");
                    self.buf.clear();
                    break;
                }
            }
        }
        states
    }
}
