//! Bluetooth Low Energy link to WiRoc devices
//!
//! A WiRoc unit exposes one GATT service with one characteristic per
//! channel. Every characteristic supports notify and write. Devices are
//! addressed by their Bluetooth address string.

use serde::{Deserialize, Serialize};

use wiroc_core::DEFAULT_MAX_CHUNK_SIZE;

#[cfg(feature = "ble")]
use {
    crate::error::{Result, TransportError},
    crate::traits::{DeviceLink, LinkEvent, Notifications},
    async_trait::async_trait,
    btleplug::api::{
        Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter,
        WriteType,
    },
    btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId},
    bytes::Bytes,
    dashmap::DashMap,
    futures::StreamExt,
    std::sync::Arc,
    std::time::Duration,
    tokio::sync::broadcast,
    tokio::task::JoinHandle,
    tracing::{debug, error, info, warn},
    uuid::Uuid,
    wiroc_core::{Channel, DeviceId, TransactionId},
};

/// WiRoc GATT service
#[cfg(feature = "ble")]
pub const WIROC_SERVICE_UUID: Uuid = Uuid::from_u128(0xfb880900_4ab2_40a2_a8f0_14cc1c2e5608);

/// Punch notifications
#[cfg(feature = "ble")]
pub const PUNCHES_CHAR_UUID: Uuid = Uuid::from_u128(0xfb880901_4ab2_40a2_a8f0_14cc1c2e5608);

/// Test punch notifications and test punch commands
#[cfg(feature = "ble")]
pub const TEST_PUNCHES_CHAR_UUID: Uuid =
    Uuid::from_u128(0xfb880907_4ab2_40a2_a8f0_14cc1c2e5608);

/// Property queries, writes and responses
#[cfg(feature = "ble")]
pub const PROPERTIES_CHAR_UUID: Uuid = Uuid::from_u128(0xfb880912_4ab2_40a2_a8f0_14cc1c2e5608);

#[cfg(feature = "ble")]
fn characteristic_uuid(channel: Channel) -> Uuid {
    match channel {
        Channel::Properties => PROPERTIES_CHAR_UUID,
        Channel::Punches => PUNCHES_CHAR_UUID,
        Channel::TestPunches => TEST_PUNCHES_CHAR_UUID,
    }
}

/// BLE link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BleConfig {
    /// Only list devices whose advertised name contains this
    pub name_filter: Option<String>,
    /// Duration of a listing scan in seconds
    pub scan_duration_secs: u64,
    /// Largest notification/write payload
    pub max_chunk_size: usize,
    /// Acknowledged writes; WiRoc firmware drops unacknowledged ones under load
    pub write_with_response: bool,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            name_filter: None,
            scan_duration_secs: 5,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            write_with_response: true,
        }
    }
}

/// Device seen during a listing scan
#[cfg(feature = "ble")]
#[derive(Debug, Clone)]
pub struct BleDevice {
    /// Bluetooth address, usable as a device id
    pub id: DeviceId,
    /// Advertised name
    pub name: Option<String>,
    /// Signal strength
    pub rssi: Option<i16>,
    /// Whether the WiRoc service is advertised
    pub has_wiroc_service: bool,
}

/// Link to WiRoc devices through the first local BLE adapter
#[cfg(feature = "ble")]
pub struct BleLink {
    config: BleConfig,
    adapter: Adapter,
    peripherals: Arc<DashMap<DeviceId, Peripheral>>,
    addresses: Arc<DashMap<PeripheralId, DeviceId>>,
    pumps: Arc<DashMap<TransactionId, JoinHandle<()>>>,
    events: broadcast::Sender<LinkEvent>,
    watcher: JoinHandle<()>,
}

#[cfg(feature = "ble")]
impl BleLink {
    /// Create a link with the default configuration
    pub async fn new() -> Result<Self> {
        Self::with_config(BleConfig::default()).await
    }

    /// Create with custom config
    pub async fn with_config(config: BleConfig) -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|e| TransportError::Adapter(format!("BLE manager error: {}", e)))?;

        let adapter = manager
            .adapters()
            .await
            .map_err(|e| TransportError::Adapter(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::Adapter("no BLE adapter found".into()))?;

        let central_events = adapter
            .events()
            .await
            .map_err(|e| TransportError::Adapter(format!("adapter events: {}", e)))?;

        let peripherals = Arc::new(DashMap::new());
        let addresses = Arc::new(DashMap::new());
        let pumps = Arc::new(DashMap::new());
        let (events, _) = broadcast::channel(64);

        let watcher = tokio::spawn(watch_adapter(
            central_events,
            Arc::clone(&addresses),
            Arc::clone(&pumps),
            events.clone(),
        ));

        info!("BLE adapter initialized");

        Ok(Self {
            config,
            adapter,
            peripherals,
            addresses,
            pumps,
            events,
            watcher,
        })
    }

    /// Scan for `scan_duration_secs` and list what was seen
    pub async fn scan(&self) -> Result<Vec<BleDevice>> {
        info!(
            "Starting BLE scan for {} seconds",
            self.config.scan_duration_secs
        );

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| TransportError::ScanFailed(e.to_string()))?;

        tokio::time::sleep(Duration::from_secs(self.config.scan_duration_secs)).await;

        self.adapter
            .stop_scan()
            .await
            .map_err(|e| TransportError::ScanFailed(e.to_string()))?;

        let peripherals = self
            .adapter
            .peripherals()
            .await
            .map_err(|e| TransportError::ScanFailed(e.to_string()))?;

        let mut devices = Vec::new();

        for peripheral in peripherals {
            let Ok(Some(props)) = peripheral.properties().await else {
                continue;
            };

            if let Some(ref filter) = self.config.name_filter {
                match props.local_name {
                    Some(ref n) if n.contains(filter.as_str()) => {}
                    _ => continue,
                }
            }

            let id = DeviceId::new(props.address.to_string());
            self.remember(&id, peripheral);

            devices.push(BleDevice {
                id,
                name: props.local_name.clone(),
                rssi: props.rssi,
                has_wiroc_service: props.services.contains(&WIROC_SERVICE_UUID),
            });
        }

        info!("Found {} BLE devices", devices.len());
        Ok(devices)
    }

    fn remember(&self, device: &DeviceId, peripheral: Peripheral) {
        self.addresses.insert(peripheral.id(), device.clone());
        self.peripherals.insert(device.clone(), peripheral);
    }

    fn peripheral(&self, device: &DeviceId) -> Result<Peripheral> {
        self.peripherals
            .get(device)
            .map(|p| p.clone())
            .ok_or_else(|| TransportError::DeviceNotFound(device.clone()))
    }

    /// Look through the adapter's peripheral list for `device`
    async fn find(&self, device: &DeviceId) -> Result<Option<Peripheral>> {
        let peripherals = self.adapter.peripherals().await?;
        for peripheral in peripherals {
            if let Ok(Some(props)) = peripheral.properties().await {
                if props.address.to_string() == device.as_str() {
                    return Ok(Some(peripheral));
                }
            }
        }
        Ok(None)
    }

    fn characteristic(
        &self,
        device: &DeviceId,
        peripheral: &Peripheral,
        channel: Channel,
    ) -> Result<Characteristic> {
        let uuid = characteristic_uuid(channel);
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| TransportError::CharacteristicNotFound {
                device: device.clone(),
                channel,
            })
    }

    async fn connected_peripheral(&self, device: &DeviceId) -> Result<Peripheral> {
        let peripheral = self.peripheral(device)?;
        if !peripheral.is_connected().await.unwrap_or(false) {
            return Err(TransportError::NotConnected(device.clone()));
        }
        Ok(peripheral)
    }

    fn stop_pump(&self, tid: &TransactionId) -> bool {
        match self.pumps.remove(tid) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

#[cfg(feature = "ble")]
impl Drop for BleLink {
    fn drop(&mut self) {
        self.watcher.abort();
        for entry in self.pumps.iter() {
            entry.value().abort();
        }
    }
}

/// Forward adapter disconnects as link events
#[cfg(feature = "ble")]
async fn watch_adapter(
    mut central_events: std::pin::Pin<Box<dyn futures::Stream<Item = CentralEvent> + Send>>,
    addresses: Arc<DashMap<PeripheralId, DeviceId>>,
    pumps: Arc<DashMap<TransactionId, JoinHandle<()>>>,
    events: broadcast::Sender<LinkEvent>,
) {
    while let Some(event) = central_events.next().await {
        if let CentralEvent::DeviceDisconnected(id) = event {
            let Some(device) = addresses.get(&id).map(|d| d.clone()) else {
                continue;
            };
            info!("BLE device {} disconnected", device);

            for channel in Channel::ALL {
                if let Some((_, handle)) = pumps.remove(&channel.transaction_id(&device)) {
                    handle.abort();
                }
            }

            let _ = events.send(LinkEvent::Disconnected {
                device,
                reason: None,
            });
        }
    }
    debug!("BLE adapter event stream ended");
}

#[cfg(feature = "ble")]
#[async_trait]
impl DeviceLink for BleLink {
    fn max_chunk_size(&self) -> usize {
        self.config.max_chunk_size
    }

    fn events(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    async fn is_known(&self, device: &DeviceId) -> bool {
        if self.peripherals.contains_key(device) {
            return true;
        }
        match self.find(device).await {
            Ok(Some(peripheral)) => {
                self.remember(device, peripheral);
                true
            }
            _ => false,
        }
    }

    async fn scan_for(&self, device: &DeviceId, timeout: Duration) -> Result<()> {
        info!("Scanning for {} ({:?})", device, timeout);

        self.adapter
            .start_scan(ScanFilter {
                services: vec![WIROC_SERVICE_UUID],
            })
            .await
            .map_err(|e| TransportError::ScanFailed(e.to_string()))?;

        let search = async {
            loop {
                if let Some(peripheral) = self.find(device).await? {
                    return Ok::<_, TransportError>(peripheral);
                }
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        };
        let found = tokio::time::timeout(timeout, search).await;

        if let Err(e) = self.adapter.stop_scan().await {
            warn!("Stop scan failed: {}", e);
        }

        match found {
            Ok(Ok(peripheral)) => {
                debug!("Found {} during scan", device);
                self.remember(device, peripheral);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TransportError::DeviceNotFound(device.clone())),
        }
    }

    async fn connect(&self, device: &DeviceId) -> Result<()> {
        let peripheral = self.peripheral(device)?;
        if peripheral.is_connected().await.unwrap_or(false) {
            return Ok(());
        }

        info!("Connecting to BLE device {}", device);
        peripheral
            .connect()
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", device, e)))
    }

    async fn discover(&self, device: &DeviceId) -> Result<()> {
        let peripheral = self.connected_peripheral(device).await?;
        peripheral.discover_services().await.map_err(|e| {
            TransportError::ConnectionFailed(format!("service discovery failed: {}", e))
        })?;

        for channel in Channel::ALL {
            self.characteristic(device, &peripheral, channel)?;
        }
        Ok(())
    }

    async fn monitor(&self, device: &DeviceId, channel: Channel) -> Result<Notifications> {
        let peripheral = self.connected_peripheral(device).await?;
        let characteristic = self.characteristic(device, &peripheral, channel)?;
        let tid = channel.transaction_id(device);

        self.stop_pump(&tid);

        let mut stream = peripheral.notifications().await?;
        peripheral.subscribe(&characteristic).await?;

        let (tx, notifications) = Notifications::channel(256);
        let uuid = characteristic.uuid;
        let label = tid.clone();

        let handle = tokio::spawn(async move {
            while let Some(data) = stream.next().await {
                if data.uuid != uuid {
                    continue;
                }
                if tx.send(Bytes::from(data.value)).await.is_err() {
                    break;
                }
            }
            debug!("Notification pump {} ended", label);
        });

        self.pumps.insert(tid, handle);
        debug!("Monitoring {} on {}", channel, device);
        Ok(notifications)
    }

    async fn cancel(&self, device: &DeviceId, channel: Channel) -> Result<()> {
        if !self.stop_pump(&channel.transaction_id(device)) {
            return Ok(());
        }

        let peripheral = self.connected_peripheral(device).await?;
        let characteristic = self.characteristic(device, &peripheral, channel)?;
        peripheral.unsubscribe(&characteristic).await?;
        Ok(())
    }

    async fn write(&self, device: &DeviceId, channel: Channel, data: Bytes) -> Result<()> {
        let peripheral = self.connected_peripheral(device).await?;
        let characteristic = self.characteristic(device, &peripheral, channel)?;
        let write_type = if self.config.write_with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };

        for chunk in data.chunks(self.config.max_chunk_size.max(1)) {
            peripheral
                .write(&characteristic, chunk, write_type)
                .await
                .map_err(|e| {
                    error!("BLE write to {} failed: {}", device, e);
                    TransportError::SendFailed(e.to_string())
                })?;
        }

        debug!("BLE sent {} bytes to {} on {}", data.len(), device, channel);
        Ok(())
    }

    async fn disconnect(&self, device: &DeviceId) -> Result<()> {
        for channel in Channel::ALL {
            self.stop_pump(&channel.transaction_id(device));
        }

        let peripheral = self.peripheral(device)?;
        if !peripheral.is_connected().await.unwrap_or(false) {
            return Err(TransportError::NotConnected(device.clone()));
        }
        peripheral.disconnect().await?;
        info!("BLE disconnected from {}", device);
        Ok(())
    }
}
