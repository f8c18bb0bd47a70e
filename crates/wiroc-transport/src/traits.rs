//! Link trait definitions

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use wiroc_core::{Channel, DeviceId};

use crate::error::Result;

/// Events raised by the link independently of any request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The physical connection to a device went away
    Disconnected {
        device: DeviceId,
        reason: Option<String>,
    },
}

/// Raw notification chunks for one (device, channel) monitor
///
/// Ends when the monitor is cancelled or the link drops.
pub struct Notifications {
    rx: mpsc::Receiver<Bytes>,
}

impl Notifications {
    /// Create a connected sender/receiver pair
    pub fn channel(capacity: usize) -> (mpsc::Sender<Bytes>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }

    /// Receive the next chunk
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

/// A notification-based link to one or more devices
///
/// Implementations deliver each channel's chunks in transport order and
/// split writes into chunks of at most [`DeviceLink::max_chunk_size`] bytes.
#[async_trait]
pub trait DeviceLink: Send + Sync {
    /// Largest payload of a single notification or write
    fn max_chunk_size(&self) -> usize;

    /// Subscribe to unsolicited link events
    fn events(&self) -> broadcast::Receiver<LinkEvent>;

    /// Whether the link can connect to `device` without scanning
    async fn is_known(&self, device: &DeviceId) -> bool;

    /// Scan until `device` is seen or `timeout` elapses
    async fn scan_for(&self, device: &DeviceId, timeout: Duration) -> Result<()>;

    /// Establish the physical connection
    async fn connect(&self, device: &DeviceId) -> Result<()>;

    /// Discover services and check that every channel is present
    async fn discover(&self, device: &DeviceId) -> Result<()>;

    /// Start receiving notifications for `channel`
    async fn monitor(&self, device: &DeviceId, channel: Channel) -> Result<Notifications>;

    /// Stop the monitor for `channel`; a no-op when none is active
    async fn cancel(&self, device: &DeviceId, channel: Channel) -> Result<()>;

    /// Write `data` to `channel`
    async fn write(&self, device: &DeviceId, channel: Channel, data: Bytes) -> Result<()>;

    /// Release the physical connection
    async fn disconnect(&self, device: &DeviceId) -> Result<()>;
}
