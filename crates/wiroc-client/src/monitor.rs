//! Notification pumps, one task per (device, channel)

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use wiroc_core::{Channel, ChunkBuffer, DeviceId, TransactionId};
use wiroc_transport::DeviceLink;

use crate::error::Result;

pub(crate) struct ChannelMonitors {
    link: Arc<dyn DeviceLink>,
    pumps: DashMap<TransactionId, JoinHandle<()>>,
    changes: Mutex<()>,
}

impl ChannelMonitors {
    pub fn new(link: Arc<dyn DeviceLink>) -> Self {
        Self {
            link,
            pumps: DashMap::new(),
            changes: Mutex::new(()),
        }
    }

    pub fn is_active(&self, device: &DeviceId, channel: Channel) -> bool {
        self.pumps
            .get(&channel.transaction_id(device))
            .map_or(false, |pump| !pump.is_finished())
    }

    /// Feed `channel` notifications from `device` into `buffer`
    ///
    /// A no-op while a pump for the pair is running.
    pub async fn enable(
        &self,
        device: &DeviceId,
        channel: Channel,
        buffer: Arc<ChunkBuffer>,
    ) -> Result<()> {
        let _change = self.changes.lock().await;
        if self.is_active(device, channel) {
            return Ok(());
        }

        let mut notifications = self.link.monitor(device, channel).await?;
        let tid = channel.transaction_id(device);
        let source = device.clone();

        let pump = tokio::spawn(async move {
            while let Some(chunk) = notifications.recv().await {
                buffer.provide_chunk(&source, &chunk);
            }
            debug!("{}: {} notifications ended", source, channel);
        });

        if let Some(stale) = self.pumps.insert(tid, pump) {
            stale.abort();
        }
        debug!("{}: monitoring {}", device, channel);
        Ok(())
    }

    /// Stop the pump and cancel the transport monitor
    ///
    /// Cancelling something already gone is not an error.
    pub async fn disable(&self, device: &DeviceId, channel: Channel) -> Result<()> {
        let _change = self.changes.lock().await;
        if let Some((_, pump)) = self.pumps.remove(&channel.transaction_id(device)) {
            pump.abort();
        }

        match self.link.cancel(device, channel).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_benign_teardown() => {
                debug!("{}: ignoring {} cancel error: {}", device, channel, e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort removal of every monitor for `device`
    pub async fn teardown(&self, device: &DeviceId) {
        for channel in Channel::ALL {
            if let Err(e) = self.disable(device, channel).await {
                warn!("{}: {} teardown failed: {}", device, channel, e);
            }
        }
    }
}

impl Drop for ChannelMonitors {
    fn drop(&mut self) {
        for pump in self.pumps.iter() {
            pump.value().abort();
        }
    }
}
