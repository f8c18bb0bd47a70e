//! Connection lifecycle per device
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnecting -> Disconnected
//!       ^             |             |
//!       +-- failure --+-- link loss +
//! ```
//!
//! Connecting covers scan, physical connect, service discovery, the
//! property monitor and the snapshot handshake. A device is Connected only
//! once the handshake response is cached.

use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wiroc_core::{wire, Channel, ChunkBuffer, DeviceId, Observers, Subscription};
use wiroc_transport::{DeviceLink, LinkEvent};

use crate::config::ClientConfig;
use crate::correlator::Correlator;
use crate::error::Result;
use crate::monitor::ChannelMonitors;
use crate::multiplexer::StreamMultiplexer;
use crate::store::PropertyStore;

/// How long a requested disconnect's link event is waited for
const EXPECTED_EVENT_WINDOW: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConnected {
    pub device: DeviceId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDisconnected {
    pub device: DeviceId,
    /// True when the disconnect was requested through the client
    pub was_expected: bool,
}

/// Link events owed by disconnects this client requested
struct ExpectedEvents {
    count: u32,
    since: Instant,
}

/// Per-device maps only hold devices that are not Disconnected, have a
/// lifecycle operation in progress, or still owe a link event.
pub(crate) struct SessionManager {
    link: Arc<dyn DeviceLink>,
    config: ClientConfig,
    states: DashMap<DeviceId, ConnectionState>,
    lifecycle: DashMap<DeviceId, Arc<Mutex<()>>>,
    expected: DashMap<DeviceId, ExpectedEvents>,
    property_buffer: Arc<ChunkBuffer>,
    store: Arc<PropertyStore>,
    correlator: Arc<Correlator>,
    monitors: Arc<ChannelMonitors>,
    streams: Arc<StreamMultiplexer>,
    connected: Observers<DeviceConnected>,
    disconnected: Observers<DeviceDisconnected>,
}

impl SessionManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        link: Arc<dyn DeviceLink>,
        config: ClientConfig,
        property_buffer: Arc<ChunkBuffer>,
        store: Arc<PropertyStore>,
        correlator: Arc<Correlator>,
        monitors: Arc<ChannelMonitors>,
        streams: Arc<StreamMultiplexer>,
    ) -> Self {
        Self {
            link,
            config,
            states: DashMap::new(),
            lifecycle: DashMap::new(),
            expected: DashMap::new(),
            property_buffer,
            store,
            correlator,
            monitors,
            streams,
            connected: Observers::new(),
            disconnected: Observers::new(),
        }
    }

    pub fn state(&self, device: &DeviceId) -> ConnectionState {
        self.states
            .get(device)
            .map_or(ConnectionState::Disconnected, |s| *s)
    }

    fn set_state(&self, device: &DeviceId, state: ConnectionState) {
        debug!("{}: {:?}", device, state);
        if state == ConnectionState::Disconnected {
            self.states.remove(device);
        } else {
            self.states.insert(device.clone(), state);
        }
    }

    fn lifecycle_lock(&self, device: &DeviceId) -> Arc<Mutex<()>> {
        self.lifecycle
            .entry(device.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the lifecycle lock of a disconnected device nobody is waiting on
    fn prune(&self, device: &DeviceId) {
        if self.state(device) == ConnectionState::Disconnected {
            self.lifecycle
                .remove_if(device, |_, lock| Arc::strong_count(lock) == 1);
        }
    }

    fn expect_event(&self, device: &DeviceId) {
        self.expected
            .entry(device.clone())
            .and_modify(|e| {
                e.count += 1;
                e.since = Instant::now();
            })
            .or_insert(ExpectedEvents {
                count: 1,
                since: Instant::now(),
            });
    }

    fn forget_event(&self, device: &DeviceId) {
        if let Some(mut e) = self.expected.get_mut(device) {
            e.count = e.count.saturating_sub(1);
        }
        self.expected.remove_if(device, |_, e| e.count == 0);
    }

    /// Take one expected link event for `device`, if any is still owed
    fn consume_expected(&self, device: &DeviceId) -> bool {
        self.expected
            .remove_if(device, |_, e| e.since.elapsed() > EXPECTED_EVENT_WINDOW);

        let consumed = match self.expected.get_mut(device) {
            Some(mut e) if e.count > 0 => {
                e.count -= 1;
                true
            }
            _ => false,
        };
        self.expected.remove_if(device, |_, e| e.count == 0);
        consumed
    }

    /// Release the physical link; its disconnect event is expected
    async fn disconnect_link(&self, device: &DeviceId) -> wiroc_transport::Result<()> {
        // Marked before the call: the link may publish the event before
        // returning.
        self.expect_event(device);
        let result = self.link.disconnect(device).await;
        if result.is_err() {
            self.forget_event(device);
        }
        result
    }

    pub async fn connect(&self, device: &DeviceId) -> Result<()> {
        let result = {
            let lock = self.lifecycle_lock(device);
            let _lifecycle = lock.lock().await;
            self.connect_locked(device).await
        };
        self.prune(device);
        result
    }

    async fn connect_locked(&self, device: &DeviceId) -> Result<()> {
        if self.state(device) == ConnectionState::Connected {
            debug!("{}: already connected", device);
            return Ok(());
        }

        self.set_state(device, ConnectionState::Connecting);
        info!("{}: connecting", device);

        match self.establish(device).await {
            Ok(()) => {
                self.set_state(device, ConnectionState::Connected);
                info!("{}: connected", device);
                self.connected.emit(&DeviceConnected {
                    device: device.clone(),
                });
                Ok(())
            }
            Err(e) => {
                warn!("{}: connect failed: {}", device, e);
                self.release(device).await;
                if let Err(e) = self.disconnect_link(device).await {
                    debug!("{}: ignoring disconnect error: {}", device, e);
                }
                self.set_state(device, ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    async fn establish(&self, device: &DeviceId) -> Result<()> {
        if !self.link.is_known(device).await {
            info!(
                "{}: scanning for up to {:?}",
                device,
                self.config.scan_timeout()
            );
            self.link
                .scan_for(device, self.config.scan_timeout())
                .await?;
        }

        self.link.connect(device).await?;
        self.link.discover(device).await?;
        self.monitors
            .enable(device, Channel::Properties, Arc::clone(&self.property_buffer))
            .await?;

        if self.config.handshake {
            let handshake = wire::handshake_command(self.link.max_chunk_size());
            let text = self.correlator.send_data(device, &handshake).await?;
            let snapshot = self.store.apply(device, &text, None)?;
            info!("{}: handshake cached {} properties", device, snapshot.len());
        }
        Ok(())
    }

    pub async fn disconnect(&self, device: &DeviceId) -> Result<()> {
        {
            let lock = self.lifecycle_lock(device);
            let _lifecycle = lock.lock().await;
            self.disconnect_locked(device).await;
        }
        self.prune(device);
        Ok(())
    }

    async fn disconnect_locked(&self, device: &DeviceId) {
        if self.state(device) == ConnectionState::Disconnected {
            return;
        }

        self.set_state(device, ConnectionState::Disconnecting);
        self.release(device).await;

        match self.disconnect_link(device).await {
            Ok(()) => {}
            Err(e) if e.is_benign_teardown() => {
                debug!("{}: link already released: {}", device, e);
            }
            Err(e) => warn!("{}: disconnect error: {}", device, e),
        }

        self.set_state(device, ConnectionState::Disconnected);
        info!("{}: disconnected", device);
        self.disconnected.emit(&DeviceDisconnected {
            device: device.clone(),
            was_expected: true,
        });
    }

    /// Tear down everything owned by a session, keeping the link itself
    async fn release(&self, device: &DeviceId) {
        self.correlator.cancel(device);
        self.monitors.teardown(device).await;
        self.property_buffer.reset(device);
        self.streams.reset(device);
        self.store.clear(device);
    }

    async fn handle_link_loss(&self, device: DeviceId, reason: Option<String>) {
        if self.consume_expected(&device) {
            debug!("{}: link closed as requested", device);
            return;
        }

        // A handshake in flight holds the lifecycle lock and would never
        // see its response.
        if self.state(&device) == ConnectionState::Connecting {
            self.correlator.cancel(&device);
        }

        {
            let lock = self.lifecycle_lock(&device);
            let _lifecycle = lock.lock().await;
            self.link_lost_locked(&device, reason).await;
        }
        self.prune(&device);
    }

    async fn link_lost_locked(&self, device: &DeviceId, reason: Option<String>) {
        if self.state(device) != ConnectionState::Connected {
            debug!("{}: ignoring link event outside a session", device);
            return;
        }

        warn!(
            "{}: link lost ({})",
            device,
            reason.as_deref().unwrap_or("no reason")
        );
        self.release(device).await;
        self.set_state(device, ConnectionState::Disconnected);
        self.disconnected.emit(&DeviceDisconnected {
            device: device.clone(),
            was_expected: false,
        });
    }

    /// Entries in the per-device maps
    #[cfg(test)]
    pub(crate) fn tracked_devices(&self) -> usize {
        self.states.len() + self.lifecycle.len() + self.expected.len()
    }

    pub fn on_connected<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&DeviceConnected) + Send + Sync + 'static,
    {
        self.connected.subscribe(callback)
    }

    pub fn on_disconnected<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&DeviceDisconnected) + Send + Sync + 'static,
    {
        self.disconnected.subscribe(callback)
    }
}

/// Route link events to the session manager until it is dropped
pub(crate) fn spawn_link_watcher(
    session: Weak<SessionManager>,
    mut events: broadcast::Receiver<LinkEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("link watcher missed {} events", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let Some(session) = session.upgrade() else {
                break;
            };

            match event {
                LinkEvent::Disconnected { device, reason } => {
                    tokio::spawn(async move {
                        session.handle_link_loss(device, reason).await;
                    });
                }
            }
        }
        debug!("link watcher stopped");
    })
}
