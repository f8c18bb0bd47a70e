//! Identifier types shared by every layer

use std::fmt;
use std::sync::Arc;

/// Opaque, stable identifier of a physical device
///
/// On BLE this is the peripheral address as reported by the adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(Arc<str>);

impl DeviceId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

/// Logical notification streams multiplexed over one link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Request/response property traffic
    Properties,
    /// Punches registered by the device
    Punches,
    /// Progress of test punches sent by the device
    TestPunches,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Properties, Channel::Punches, Channel::TestPunches];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Properties => "properties",
            Channel::Punches => "punches",
            Channel::TestPunches => "testpunches",
        }
    }

    /// Key of the transport transaction monitoring this channel on `device`
    pub fn transaction_id(&self, device: &DeviceId) -> TransactionId {
        TransactionId(format!("{}/{}", device, self.as_str()))
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-device, per-channel key for cancellable transport transactions
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
