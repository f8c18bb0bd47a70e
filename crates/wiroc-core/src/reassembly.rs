//! Chunk reassembly for MTU-limited notification channels
//!
//! The link delivers each logical message as a run of notifications. There
//! is no length prefix and no end marker; the sender fills every chunk up to
//! the maximum size except the last one:
//!
//! ```text
//! [ max ][ max ][ max ][ < max ]   -> one message
//! [ < max ]                        -> one message
//! ```
//!
//! A message whose length is an exact multiple of the maximum would never
//! terminate, so writers pad it with one trailing space (see
//! [`crate::wire::pad_for_chunking`]).

use bytes::BytesMut;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::observer::{Observers, Subscription};
use crate::types::DeviceId;

/// A reassembled message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedMessage {
    pub device: DeviceId,
    pub text: String,
}

/// Reassembly buffer for one logical channel, keyed by device
pub struct ChunkBuffer {
    max_chunk_size: usize,
    pending: Mutex<HashMap<DeviceId, BytesMut>>,
    completed: Observers<CompletedMessage>,
}

impl ChunkBuffer {
    pub fn new(max_chunk_size: usize) -> Self {
        Self {
            max_chunk_size: max_chunk_size.max(1),
            pending: Mutex::new(HashMap::new()),
            completed: Observers::new(),
        }
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    /// Feed one chunk received from `device`
    ///
    /// Subscribers run synchronously on the calling task once the chunk
    /// completes a message.
    pub fn provide_chunk(&self, device: &DeviceId, chunk: &[u8]) {
        let complete = {
            let mut pending = self.pending.lock();
            let buf = pending.entry(device.clone()).or_default();
            buf.extend_from_slice(chunk);

            if chunk.len() >= self.max_chunk_size {
                debug!(
                    "{}: buffered {} bytes, waiting for more",
                    device,
                    buf.len()
                );
                return;
            }

            buf.split().freeze()
        };

        let text = match std::str::from_utf8(&complete) {
            Ok(text) => text.to_string(),
            Err(e) => {
                warn!("{}: reassembled message is not valid UTF-8: {}", device, e);
                String::from_utf8_lossy(&complete).into_owned()
            }
        };

        debug!("{}: reassembled message of {} bytes", device, complete.len());

        self.completed.emit(&CompletedMessage {
            device: device.clone(),
            text,
        });
    }

    /// Register a callback for every completed message
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&CompletedMessage) + Send + Sync + 'static,
    {
        self.completed.subscribe(callback)
    }

    /// Drop any partial message buffered for `device`
    pub fn reset(&self, device: &DeviceId) {
        if let Some(buf) = self.pending.lock().remove(device) {
            if !buf.is_empty() {
                debug!("{}: discarded {} partial bytes", device, buf.len());
            }
        }
    }

    /// Bytes buffered for `device` that have not completed a message
    pub fn pending_len(&self, device: &DeviceId) -> usize {
        self.pending.lock().get(device).map_or(0, |b| b.len())
    }
}

impl std::fmt::Debug for ChunkBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkBuffer")
            .field("max_chunk_size", &self.max_chunk_size)
            .field("subscribers", &self.completed.len())
            .finish()
    }
}
