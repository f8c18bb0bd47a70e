//! Request/response correlation on the property channel
//!
//! The link has no request ids. A response is simply the next complete
//! property-channel message from the device, so only one request per
//! device may be outstanding. Callers queue on a per-device FIFO lock.
//!
//! A request that times out leaves its reply in flight. The next request
//! waits up to one more timeout for that reply before writing, and the
//! late reply is cached without being handed to anyone.

use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, warn};
use wiroc_core::{wire, Channel, ChunkBuffer, DeviceId, Error as ProtocolError, Subscription};
use wiroc_transport::DeviceLink;

use crate::error::{ClientError, Result};
use crate::store::PropertyStore;

/// A timed-out request whose reply may still arrive
struct LateReply {
    until: Instant,
    arrived: Arc<Notify>,
}

pub(crate) struct Correlator {
    link: Arc<dyn DeviceLink>,
    request_timeout: Option<Duration>,
    locks: DashMap<DeviceId, Arc<Mutex<()>>>,
    pending: Arc<DashMap<DeviceId, oneshot::Sender<String>>>,
    late: Arc<DashMap<DeviceId, LateReply>>,
    _responses: Subscription,
}

impl Correlator {
    pub fn new(
        link: Arc<dyn DeviceLink>,
        buffer: &ChunkBuffer,
        store: Arc<PropertyStore>,
        request_timeout: Option<Duration>,
    ) -> Self {
        let pending: Arc<DashMap<DeviceId, oneshot::Sender<String>>> = Arc::new(DashMap::new());
        let late: Arc<DashMap<DeviceId, LateReply>> = Arc::new(DashMap::new());

        let waiting = Arc::clone(&pending);
        let overdue = Arc::clone(&late);
        let responses = buffer.subscribe(move |msg| {
            if let Some((_, reply)) = overdue.remove(&msg.device) {
                debug!("{}: late response, caching only", msg.device);
                reply.arrived.notify_one();
                if let Err(e) = store.apply(&msg.device, &msg.text, None) {
                    warn!("{}: dropping late response: {}", msg.device, e);
                }
                return;
            }

            if let Some((_, tx)) = waiting.remove(&msg.device) {
                if tx.send(msg.text.clone()).is_err() {
                    debug!("{}: response arrived after requester left", msg.device);
                }
                return;
            }

            debug!("{}: unsolicited property message", msg.device);
            if let Err(e) = store.apply(&msg.device, &msg.text, None) {
                warn!("{}: dropping unsolicited message: {}", msg.device, e);
            }
        });

        Self {
            link,
            request_timeout,
            locks: DashMap::new(),
            pending,
            late,
            _responses: responses,
        }
    }

    fn lock_for(&self, device: &DeviceId) -> Arc<Mutex<()>> {
        self.locks
            .entry(device.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Write `payload` and wait for the device's next complete message
    pub async fn send_data(&self, device: &DeviceId, payload: &str) -> Result<String> {
        if payload.is_empty() {
            return Err(ProtocolError::EmptyCommand.into());
        }

        let lock = self.lock_for(device);
        let _turn = lock.lock().await;
        self.await_late_reply(device).await;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(device.clone(), tx);

        let cmd = wire::pad_for_chunking(payload.to_string(), self.link.max_chunk_size());
        debug!("{}: request {:?}", device, cmd);

        if let Err(e) = self
            .link
            .write(device, Channel::Properties, Bytes::from(cmd))
            .await
        {
            self.pending.remove(device);
            return Err(e.into());
        }

        let response = match self.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(response) => response,
                Err(_) => {
                    self.pending.remove(device);
                    self.late.insert(
                        device.clone(),
                        LateReply {
                            until: Instant::now() + limit,
                            arrived: Arc::new(Notify::new()),
                        },
                    );
                    warn!("{}: request timed out after {:?}", device, limit);
                    return Err(ClientError::Timeout);
                }
            },
            None => rx.await,
        };

        response.map_err(|_| ClientError::RequestCancelled)
    }

    /// Give a timed-out request's reply until its deadline to arrive
    async fn await_late_reply(&self, device: &DeviceId) {
        let Some((until, arrived)) = self
            .late
            .get(device)
            .map(|r| (r.until, Arc::clone(&r.arrived)))
        else {
            return;
        };

        if tokio::time::timeout_at(until, arrived.notified()).await.is_err() {
            debug!("{}: late response never came", device);
        }
        self.late.remove(device);
    }

    #[cfg(test)]
    pub(crate) fn tracked_devices(&self) -> usize {
        self.locks.len() + self.pending.len() + self.late.len()
    }

    /// Fail the outstanding request for `device`, if any
    pub fn cancel(&self, device: &DeviceId) {
        if self.pending.remove(device).is_some() {
            debug!("{}: cancelled pending request", device);
        }
        self.late.remove(device);
        self.locks
            .remove_if(device, |_, lock| Arc::strong_count(lock) == 1);
    }
}
