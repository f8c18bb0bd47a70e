//! Common test helpers and utilities for WiRoc tests
//!
//! This crate provides:
//! - Condition-based waiting (no hardcoded sleeps)
//! - A simulated WiRoc device answering property commands on a `MockLink`
//! - Event collectors for observer testing

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::time::timeout;
use wiroc_core::wire::{BULK_PROPERTY, BULK_SEPARATOR, FIELD_SEPARATOR, GROUP_SEPARATOR};
use wiroc_core::{DeviceId, FIRMWARE_BULK_SCHEMA};
use wiroc_transport::MockLink;

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(5);

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Wait for a condition with timeout - condition-based, not time-based
pub async fn wait_for<F, Fut>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

/// Wait for a synchronous condition
pub async fn wait_until<F>(check: F, max_wait: Duration) -> bool
where
    F: Fn() -> bool,
{
    wait_for(|| async { check() }, DEFAULT_CHECK_INTERVAL, max_wait).await
}

/// Wait for an atomic counter to reach a target value
pub async fn wait_for_count(counter: &AtomicU32, target: u32, max_wait: Duration) -> bool {
    wait_until(|| counter.load(Ordering::SeqCst) >= target, max_wait).await
}

/// Wait for a boolean flag to become true
pub async fn wait_for_flag(flag: &AtomicBool, max_wait: Duration) -> bool {
    wait_until(|| flag.load(Ordering::SeqCst), max_wait).await
}

/// Wait with notification - more efficient than polling
pub async fn wait_with_notify(notify: &Notify, max_wait: Duration) -> bool {
    timeout(max_wait, notify.notified()).await.is_ok()
}

// ============================================================================
// Simulated Device
// ============================================================================

/// Wire values a freshly booted unit reports, in bulk order
pub const DEFAULT_SNAPSHOT: [(&str, &str); 26] = [
    ("wirocdevicename", "WiRoc-Test"),
    ("loramode", "receiver"),
    ("lorarange", "l"),
    ("channel", "1"),
    ("loraenabled", "1"),
    ("lorapower", "14"),
    ("acknowledgementrequested", "1"),
    ("srr/enabled", "0"),
    ("srr/mode", "receive"),
    ("srr/redchannel", "1"),
    ("srr/bluechannel", "0"),
    ("sendtosirapenabled", "0"),
    ("sendtosirapip", "192.168.1.10"),
    ("sendtosirapipport", "10000"),
    ("rs232mode", "receive"),
    ("rs232onewayreceive", "0"),
    ("force4800baudrate", "0"),
    ("onewayreceive", "0"),
    ("logtoserver", "0"),
    ("batterylevel", "87"),
    ("ischarging", "0"),
    ("wirochwversion", "v7Rev1"),
    ("wirocswversion", "0.240"),
    ("wirocbleapiversion", "1.4"),
    ("ipaddress", "192.168.1.44"),
    ("btaddress", "B8:27:EB:11:22:33"),
];

struct DeviceState {
    wire: BTreeMap<String, String>,
    commands: Vec<String>,
}

/// Firmware stand-in that answers property commands through a [`MockLink`]
///
/// Queries answer with stored wire values (unknown names are left out),
/// writes store and echo the value, and the handshake returns the full
/// bulk snapshot.
#[derive(Clone)]
pub struct SimulatedDevice {
    id: DeviceId,
    state: Arc<Mutex<DeviceState>>,
    muted: Arc<AtomicBool>,
}

impl SimulatedDevice {
    pub fn new(id: impl Into<DeviceId>) -> Self {
        let mut wire: BTreeMap<String, String> = DEFAULT_SNAPSHOT
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        wire.insert("status".into(), r#"{"components":[]}"#.into());
        wire.insert("services".into(), r#"{"services":[]}"#.into());
        wire.insert("settings".into(), "loglevel,info".into());
        wire.insert("listwifi".into(), String::new());
        wire.insert("btserialdevices".into(), String::new());

        Self {
            id: id.into(),
            state: Arc::new(Mutex::new(DeviceState {
                wire,
                commands: Vec::new(),
            })),
            muted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    /// Register with `link` as a known device and answer its writes
    pub fn attach(&self, link: &MockLink) {
        link.add_device(self.id.clone());
        self.answer_on(link);
    }

    /// Answer writes on `link` without making the device known
    pub fn answer_on(&self, link: &MockLink) {
        let device = self.clone();
        link.set_responder(move |target, cmd| {
            if target != &device.id {
                return None;
            }
            device.respond(cmd)
        });
    }

    /// Stop answering (requests stay pending)
    pub fn mute(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }

    pub fn set_wire(&self, name: &str, value: &str) {
        self.state.lock().wire.insert(name.into(), value.into());
    }

    pub fn remove(&self, name: &str) {
        self.state.lock().wire.remove(name);
    }

    pub fn wire(&self, name: &str) -> Option<String> {
        self.state.lock().wire.get(name).cloned()
    }

    /// Commands received so far, pad stripped
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().commands.clone()
    }

    /// Reply the firmware would send for `cmd`
    pub fn respond(&self, cmd: &str) -> Option<String> {
        let mut state = self.state.lock();
        state.commands.push(cmd.to_string());
        if self.muted.load(Ordering::SeqCst) {
            return None;
        }

        match cmd.split_once(FIELD_SEPARATOR) {
            Some((BULK_PROPERTY, _)) => Some(snapshot(&state.wire)),
            Some((name, fields)) => Some(apply_write(&mut state.wire, name, fields)),
            None => Some(answer_query(&state.wire, cmd)),
        }
    }
}

fn snapshot(wire: &BTreeMap<String, String>) -> String {
    let values: Vec<&str> = FIRMWARE_BULK_SCHEMA
        .names
        .iter()
        .map(|name| wire.get(*name).map_or("", String::as_str))
        .collect();
    let bulk_separator = BULK_SEPARATOR.to_string();
    format!("{}{}{}", BULK_PROPERTY, FIELD_SEPARATOR, values.join(&bulk_separator))
}

fn answer_query(wire: &BTreeMap<String, String>, cmd: &str) -> String {
    let groups: Vec<String> = cmd
        .split(GROUP_SEPARATOR)
        .filter(|name| !name.is_empty())
        .filter_map(|name| {
            wire.get(name)
                .map(|value| format!("{}{}{}", name, FIELD_SEPARATOR, value))
        })
        .collect();
    let group_separator = GROUP_SEPARATOR.to_string();
    groups.join(&group_separator)
}

fn apply_write(wire: &mut BTreeMap<String, String>, name: &str, fields: &str) -> String {
    let reply = match name {
        "setting" => {
            let (key, value) = fields.split_once(FIELD_SEPARATOR).unwrap_or((fields, ""));
            let mut settings: Vec<(String, String)> = wire
                .get("settings")
                .map(|s| {
                    s.split(';')
                        .filter(|r| !r.is_empty())
                        .filter_map(|r| r.split_once(','))
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect()
                })
                .unwrap_or_default();
            match settings.iter_mut().find(|(k, _)| k == key) {
                Some(entry) => entry.1 = value.to_string(),
                None => settings.push((key.to_string(), value.to_string())),
            }
            let encoded: Vec<String> = settings
                .iter()
                .map(|(k, v)| format!("{},{}", k, v))
                .collect();
            let encoded = encoded.join(";");
            wire.insert("settings".into(), encoded.clone());
            encoded
        }
        "bindrfcomm" | "releaserfcomm" => {
            let status = if name == "bindrfcomm" { "bound" } else { "released" };
            let record = format!("WiRoc-Serial,{},{}", fields, status);
            wire.insert("btserialdevices".into(), record.clone());
            record
        }
        "renewip" => wire.get("ipaddress").cloned().unwrap_or_default(),
        "connectwifi" | "disconnectwifi" | "deletepunches" | "dropalltables"
        | "upgradewirocpython" | "starttestpunches" => "OK".to_string(),
        _ => {
            wire.insert(name.to_string(), fields.to_string());
            fields.to_string()
        }
    };
    format!("{}{}{}", name, FIELD_SEPARATOR, reply)
}

// ============================================================================
// Test Collectors - for verifying observer callbacks
// ============================================================================

/// Collector for observer events with thread-safe access
pub struct EventCollector<T> {
    events: Arc<Mutex<Vec<T>>>,
    notify: Arc<Notify>,
    count: Arc<AtomicU32>,
}

impl<T> Clone for EventCollector<T> {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
            notify: Arc::clone(&self.notify),
            count: Arc::clone(&self.count),
        }
    }
}

impl<T: Clone + Send + 'static> EventCollector<T> {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            notify: Arc::new(Notify::new()),
            count: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Create a callback for `Observers::subscribe` style registrations
    pub fn callback(&self) -> impl Fn(&T) + Send + Sync + 'static {
        let events = Arc::clone(&self.events);
        let notify = Arc::clone(&self.notify);
        let count = Arc::clone(&self.count);

        move |event| {
            events.lock().push(event.clone());
            count.fetch_add(1, Ordering::SeqCst);
            notify.notify_waiters();
        }
    }

    /// Get the count of received events
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    /// Wait for at least n events to be received
    pub async fn wait_for_count(&self, n: u32, max_wait: Duration) -> bool {
        wait_for_count(&self.count, n, max_wait).await
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<T> {
        self.events.lock().clone()
    }

    /// Get the last event received
    pub fn last(&self) -> Option<T> {
        self.events.lock().last().cloned()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
        self.count.store(0, Ordering::SeqCst);
    }
}

impl<T: Clone + Send + 'static> Default for EventCollector<T> {
    fn default() -> Self {
        Self::new()
    }
}
