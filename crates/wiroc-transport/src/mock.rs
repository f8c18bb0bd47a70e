//! In-memory link for tests and offline tooling
//!
//! `MockLink` stands in for the radio: it tracks which devices are known,
//! discoverable and connected, records every write, and lets a test inject
//! notifications (already chunked, or as whole messages) on any channel.
//! A responder closure can answer property writes the way firmware would.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use wiroc_core::{wire, Channel, DeviceId, DEFAULT_MAX_CHUNK_SIZE};

use crate::error::{Result, TransportError};
use crate::traits::{DeviceLink, LinkEvent, Notifications};

/// Answers a property-channel write with an optional reply message
pub type Responder = Arc<dyn Fn(&DeviceId, &str) -> Option<String> + Send + Sync>;

/// One recorded write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub device: DeviceId,
    pub channel: Channel,
    pub payload: String,
}

#[derive(Default)]
struct MockState {
    known: HashSet<DeviceId>,
    discoverable: HashSet<DeviceId>,
    connected: HashSet<DeviceId>,
    monitors: HashMap<(DeviceId, Channel), mpsc::Sender<Bytes>>,
    writes: Vec<WriteRecord>,
    cancelled: Vec<(DeviceId, Channel)>,
    fail_writes: Option<TransportError>,
    fail_connect: bool,
}

pub struct MockLink {
    max_chunk_size: usize,
    state: Mutex<MockState>,
    responder: RwLock<Option<Responder>>,
    events: broadcast::Sender<LinkEvent>,
}

impl MockLink {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_MAX_CHUNK_SIZE)
    }

    pub fn with_chunk_size(max_chunk_size: usize) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            max_chunk_size: max_chunk_size.max(1),
            state: Mutex::new(MockState::default()),
            responder: RwLock::new(None),
            events,
        }
    }

    /// Make `device` connectable without a scan
    pub fn add_device(&self, device: impl Into<DeviceId>) {
        self.state.lock().known.insert(device.into());
    }

    /// Make `device` visible to the next scan
    pub fn set_discoverable(&self, device: impl Into<DeviceId>) {
        self.state.lock().discoverable.insert(device.into());
    }

    /// Install a responder for property-channel writes
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&DeviceId, &str) -> Option<String> + Send + Sync + 'static,
    {
        *self.responder.write() = Some(Arc::new(responder));
    }

    /// Fail every subsequent write with `error`, or stop failing with `None`
    pub fn fail_writes(&self, error: Option<TransportError>) {
        self.state.lock().fail_writes = error;
    }

    /// Refuse connection attempts
    pub fn fail_connect(&self, fail: bool) {
        self.state.lock().fail_connect = fail;
    }

    pub fn is_connected(&self, device: &DeviceId) -> bool {
        self.state.lock().connected.contains(device)
    }

    pub fn is_monitoring(&self, device: &DeviceId, channel: Channel) -> bool {
        self.state
            .lock()
            .monitors
            .contains_key(&(device.clone(), channel))
    }

    /// Every write so far, oldest first
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state.lock().writes.clone()
    }

    /// Payloads written to `channel`, oldest first
    pub fn payloads(&self, channel: Channel) -> Vec<String> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|w| w.channel == channel)
            .map(|w| w.payload.clone())
            .collect()
    }

    pub fn clear_writes(&self) {
        self.state.lock().writes.clear();
    }

    /// Monitors cancelled through [`DeviceLink::cancel`]
    pub fn cancelled(&self) -> Vec<(DeviceId, Channel)> {
        self.state.lock().cancelled.clone()
    }

    /// Deliver one raw chunk; false when nothing monitors the channel
    pub fn push_chunk(&self, device: &DeviceId, channel: Channel, chunk: &[u8]) -> bool {
        let sender = self
            .state
            .lock()
            .monitors
            .get(&(device.clone(), channel))
            .cloned();

        match sender {
            Some(tx) => tx.try_send(Bytes::copy_from_slice(chunk)).is_ok(),
            None => false,
        }
    }

    /// Deliver `message` split into chunks the way firmware sends it
    pub fn notify(&self, device: &DeviceId, channel: Channel, message: &str) -> bool {
        let padded = wire::pad_for_chunking(message.to_string(), self.max_chunk_size);
        if padded.is_empty() {
            return self.push_chunk(device, channel, &[]);
        }
        padded
            .as_bytes()
            .chunks(self.max_chunk_size)
            .all(|chunk| self.push_chunk(device, channel, chunk))
    }

    /// Simulate the radio link going away without a disconnect request
    pub fn drop_link(&self, device: &DeviceId) {
        if self.release(device) {
            let _ = self.events.send(LinkEvent::Disconnected {
                device: device.clone(),
                reason: Some("link lost".into()),
            });
        }
    }

    /// Forget the connection and close its monitors
    fn release(&self, device: &DeviceId) -> bool {
        let mut state = self.state.lock();
        state.monitors.retain(|(d, _), _| d != device);
        state.connected.remove(device)
    }

    fn require_connected(&self, device: &DeviceId) -> Result<()> {
        if self.state.lock().connected.contains(device) {
            Ok(())
        } else {
            Err(TransportError::NotConnected(device.clone()))
        }
    }
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceLink for MockLink {
    fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    fn events(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    async fn is_known(&self, device: &DeviceId) -> bool {
        self.state.lock().known.contains(device)
    }

    async fn scan_for(&self, device: &DeviceId, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let mut state = self.state.lock();
                if state.discoverable.contains(device) {
                    state.known.insert(device.clone());
                    debug!("mock: {} found by scan", device);
                    return Ok(());
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(TransportError::DeviceNotFound(device.clone()));
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn connect(&self, device: &DeviceId) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_connect {
            return Err(TransportError::ConnectionFailed(format!(
                "{} refused connection",
                device
            )));
        }
        if !state.known.contains(device) {
            return Err(TransportError::DeviceNotFound(device.clone()));
        }
        state.connected.insert(device.clone());
        Ok(())
    }

    async fn discover(&self, device: &DeviceId) -> Result<()> {
        self.require_connected(device)
    }

    async fn monitor(&self, device: &DeviceId, channel: Channel) -> Result<Notifications> {
        self.require_connected(device)?;
        let (tx, notifications) = Notifications::channel(1024);
        self.state
            .lock()
            .monitors
            .insert((device.clone(), channel), tx);
        Ok(notifications)
    }

    async fn cancel(&self, device: &DeviceId, channel: Channel) -> Result<()> {
        self.require_connected(device)?;
        let mut state = self.state.lock();
        if state.monitors.remove(&(device.clone(), channel)).is_some() {
            state.cancelled.push((device.clone(), channel));
        }
        Ok(())
    }

    async fn write(&self, device: &DeviceId, channel: Channel, data: Bytes) -> Result<()> {
        self.require_connected(device)?;
        let payload = String::from_utf8_lossy(&data).into_owned();

        {
            let mut state = self.state.lock();
            if let Some(ref e) = state.fail_writes {
                return Err(e.clone());
            }
            state.writes.push(WriteRecord {
                device: device.clone(),
                channel,
                payload: payload.clone(),
            });
        }

        if channel == Channel::Properties {
            let responder = self.responder.read().clone();
            if let Some(responder) = responder {
                let command = payload.strip_suffix(' ').unwrap_or(&payload);
                if let Some(reply) = responder(device, command) {
                    self.notify(device, Channel::Properties, &reply);
                }
            }
        }
        Ok(())
    }

    async fn disconnect(&self, device: &DeviceId) -> Result<()> {
        if !self.release(device) {
            return Err(TransportError::NotConnected(device.clone()));
        }
        let _ = self.events.send(LinkEvent::Disconnected {
            device: device.clone(),
            reason: None,
        });
        Ok(())
    }
}
