//! Main WiRoc client implementation

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;
use wiroc_core::{
    codec, property, BulkSchema, Channel, ChunkBuffer, DeviceId, Error as ProtocolError,
    PropertyMap, PropertyValue, Subscription,
};
use wiroc_transport::DeviceLink;

use crate::builder::WirocBuilder;
use crate::config::ClientConfig;
use crate::correlator::Correlator;
use crate::error::{ClientError, Result};
use crate::monitor::ChannelMonitors;
use crate::multiplexer::{PunchBatch, StreamMultiplexer, TestPunchBatch};
use crate::session::{
    spawn_link_watcher, ConnectionState, DeviceConnected, DeviceDisconnected, SessionManager,
};
use crate::store::{PropertiesChanged, PropertyStore};

/// Protocol engine for one or more WiRoc devices on a shared link
pub struct WirocClient {
    store: Arc<PropertyStore>,
    correlator: Arc<Correlator>,
    streams: Arc<StreamMultiplexer>,
    session: Arc<SessionManager>,
    watcher: JoinHandle<()>,
}

impl WirocClient {
    /// Create a client with the default configuration
    pub fn new(link: Arc<dyn DeviceLink>) -> Result<Self> {
        WirocBuilder::new().build(link)
    }

    /// Create a builder
    pub fn builder() -> WirocBuilder {
        WirocBuilder::new()
    }

    pub(crate) fn assemble(
        link: Arc<dyn DeviceLink>,
        config: ClientConfig,
        schema: BulkSchema,
    ) -> Result<Self> {
        schema.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ClientError::Config("a tokio runtime is required".into()))?;

        let chunk_size = link.max_chunk_size();
        let property_buffer = Arc::new(ChunkBuffer::new(chunk_size));
        let store = Arc::new(PropertyStore::new(schema));
        let correlator = Arc::new(Correlator::new(
            Arc::clone(&link),
            &property_buffer,
            Arc::clone(&store),
            config.request_timeout(),
        ));
        let monitors = Arc::new(ChannelMonitors::new(Arc::clone(&link)));
        let streams = Arc::new(StreamMultiplexer::new(Arc::clone(&monitors), chunk_size));
        let session = Arc::new(SessionManager::new(
            Arc::clone(&link),
            config,
            property_buffer,
            Arc::clone(&store),
            Arc::clone(&correlator),
            monitors,
            Arc::clone(&streams),
        ));

        let watcher = {
            let _guard = runtime.enter();
            spawn_link_watcher(Arc::downgrade(&session), link.events())
        };

        debug!(
            "client ready (bulk schema v{}, chunk size {})",
            schema.version, chunk_size
        );

        Ok(Self {
            store,
            correlator,
            streams,
            session,
            watcher,
        })
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Open a session; a no-op when already connected
    pub async fn connect(&self, device: &DeviceId) -> Result<()> {
        self.session.connect(device).await
    }

    /// Close a session; a no-op when not connected
    pub async fn disconnect(&self, device: &DeviceId) -> Result<()> {
        self.session.disconnect(device).await
    }

    pub fn is_connected(&self, device: &DeviceId) -> bool {
        self.state(device) == ConnectionState::Connected
    }

    pub fn state(&self, device: &DeviceId) -> ConnectionState {
        self.session.state(device)
    }

    fn ensure_connected(&self, device: &DeviceId) -> Result<()> {
        if self.is_connected(device) {
            Ok(())
        } else {
            Err(ClientError::NotConnected(device.clone()))
        }
    }

    // ------------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------------

    /// Read a property, from the cache when possible
    pub async fn get_property(&self, device: &DeviceId, name: &str) -> Result<PropertyValue> {
        property::gettable(name)?;
        self.ensure_connected(device)?;

        if let Some(value) = self.store.get(device, name) {
            debug!("{}: {} served from cache", device, name);
            return Ok(value);
        }

        let mut values = self.refresh_properties(device, &[name]).await?;
        values
            .remove(name)
            .ok_or_else(|| ProtocolError::PropertyMissing(name.to_string()).into())
    }

    /// Query properties from the device, bypassing the cache
    pub async fn refresh_properties<S: AsRef<str>>(
        &self,
        device: &DeviceId,
        names: &[S],
    ) -> Result<PropertyMap> {
        let query = codec::encode_query(names)?;
        self.ensure_connected(device)?;

        let text = self.correlator.send_data(device, &query).await?;
        let values = self.store.apply(device, &text, None)?;

        for name in names {
            if !values.contains_key(name.as_ref()) {
                return Err(ProtocolError::PropertyMissing(name.as_ref().to_string()).into());
            }
        }
        Ok(values)
    }

    /// Write a property and return the device's confirmed value
    ///
    /// Command-style properties confirm into another slot (for example
    /// `renewip` answers with the new `ipaddress`); that slot's value is
    /// returned.
    pub async fn set_property(
        &self,
        device: &DeviceId,
        name: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<PropertyValue> {
        let spec = property::settable(name)?;
        let command = codec::encode_set(name, &value.into())?;
        self.ensure_connected(device)?;

        let text = self.correlator.send_data(device, &command).await?;
        let mut values = self.store.apply(device, &text, Some(name))?;

        let target = spec.response_target();
        values
            .remove(target)
            .ok_or_else(|| ProtocolError::PropertyMissing(target.to_string()).into())
    }

    /// Cached value of a property, without touching the link
    pub fn cached(&self, device: &DeviceId, name: &str) -> Option<PropertyValue> {
        self.store.get(device, name)
    }

    /// Write a raw property-channel command and return the raw response
    pub async fn send_data(&self, device: &DeviceId, payload: &str) -> Result<String> {
        self.ensure_connected(device)?;
        self.correlator.send_data(device, payload).await
    }

    // ------------------------------------------------------------------------
    // Streams
    // ------------------------------------------------------------------------

    pub async fn enable_punches_notification(&self, device: &DeviceId) -> Result<()> {
        self.ensure_connected(device)?;
        self.streams.enable(device, Channel::Punches).await
    }

    pub async fn disable_punches_notification(&self, device: &DeviceId) -> Result<()> {
        self.streams.disable(device, Channel::Punches).await
    }

    pub async fn enable_test_punches_notification(&self, device: &DeviceId) -> Result<()> {
        self.ensure_connected(device)?;
        self.streams.enable(device, Channel::TestPunches).await
    }

    pub async fn disable_test_punches_notification(&self, device: &DeviceId) -> Result<()> {
        self.streams.disable(device, Channel::TestPunches).await
    }

    // ------------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------------

    /// Every decoded property message, solicited or not
    pub fn on_properties_changed<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&PropertiesChanged) + Send + Sync + 'static,
    {
        self.store.subscribe(callback)
    }

    pub fn on_punches_received<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&PunchBatch) + Send + Sync + 'static,
    {
        self.streams.on_punches(callback)
    }

    pub fn on_test_punches_sent<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&TestPunchBatch) + Send + Sync + 'static,
    {
        self.streams.on_test_punches(callback)
    }

    pub fn on_device_connected<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&DeviceConnected) + Send + Sync + 'static,
    {
        self.session.on_connected(callback)
    }

    pub fn on_device_disconnected<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&DeviceDisconnected) + Send + Sync + 'static,
    {
        self.session.on_disconnected(callback)
    }
}

impl Drop for WirocClient {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}
