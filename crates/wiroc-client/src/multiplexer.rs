//! Punch and test punch streams
//!
//! Each stream has its own reassembly buffer. Every complete message is one
//! `{"punches": [...]}` batch; a batch that fails to decode is logged and
//! dropped.

use std::sync::Arc;
use tracing::{debug, warn};
use wiroc_core::punch::{decode_punches, decode_test_punches};
use wiroc_core::{Channel, ChunkBuffer, DeviceId, Observers, Punch, Subscription, TestPunch};

use crate::error::Result;
use crate::monitor::ChannelMonitors;

/// Punches registered by a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PunchBatch {
    pub device: DeviceId,
    pub punches: Vec<Punch>,
}

/// Progress report for test punches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestPunchBatch {
    pub device: DeviceId,
    pub punches: Vec<TestPunch>,
}

pub(crate) struct StreamMultiplexer {
    monitors: Arc<ChannelMonitors>,
    punches: Arc<ChunkBuffer>,
    test_punches: Arc<ChunkBuffer>,
    punch_batches: Arc<Observers<PunchBatch>>,
    test_punch_batches: Arc<Observers<TestPunchBatch>>,
    _decoders: Vec<Subscription>,
}

impl StreamMultiplexer {
    pub fn new(monitors: Arc<ChannelMonitors>, max_chunk_size: usize) -> Self {
        let punches = Arc::new(ChunkBuffer::new(max_chunk_size));
        let test_punches = Arc::new(ChunkBuffer::new(max_chunk_size));
        let punch_batches = Arc::new(Observers::new());
        let test_punch_batches = Arc::new(Observers::new());

        let observers = Arc::clone(&punch_batches);
        let punch_decoder = punches.subscribe(move |msg| match decode_punches(&msg.text) {
            Ok(batch) => {
                debug!("{}: {} punches", msg.device, batch.len());
                observers.emit(&PunchBatch {
                    device: msg.device.clone(),
                    punches: batch,
                });
            }
            Err(e) => warn!("{}: dropping punch batch: {}", msg.device, e),
        });

        let observers = Arc::clone(&test_punch_batches);
        let test_decoder = test_punches.subscribe(move |msg| {
            match decode_test_punches(&msg.text) {
                Ok(batch) => {
                    debug!("{}: {} test punch updates", msg.device, batch.len());
                    observers.emit(&TestPunchBatch {
                        device: msg.device.clone(),
                        punches: batch,
                    });
                }
                Err(e) => warn!("{}: dropping test punch batch: {}", msg.device, e),
            }
        });

        Self {
            monitors,
            punches,
            test_punches,
            punch_batches,
            test_punch_batches,
            _decoders: vec![punch_decoder, test_decoder],
        }
    }

    fn buffer(&self, channel: Channel) -> &Arc<ChunkBuffer> {
        match channel {
            Channel::TestPunches => &self.test_punches,
            _ => &self.punches,
        }
    }

    pub async fn enable(&self, device: &DeviceId, channel: Channel) -> Result<()> {
        let buffer = Arc::clone(self.buffer(channel));
        self.monitors.enable(device, channel, buffer).await
    }

    pub async fn disable(&self, device: &DeviceId, channel: Channel) -> Result<()> {
        self.monitors.disable(device, channel).await?;
        self.buffer(channel).reset(device);
        Ok(())
    }

    /// Drop partial batches buffered for `device`
    pub fn reset(&self, device: &DeviceId) {
        self.punches.reset(device);
        self.test_punches.reset(device);
    }

    pub fn on_punches<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&PunchBatch) + Send + Sync + 'static,
    {
        self.punch_batches.subscribe(callback)
    }

    pub fn on_test_punches<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&TestPunchBatch) + Send + Sync + 'static,
    {
        self.test_punch_batches.subscribe(callback)
    }
}
