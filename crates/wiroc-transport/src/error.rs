//! Transport error types

use thiserror::Error;
use wiroc_core::{Channel, DeviceId};

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("no BLE adapter: {0}")]
    Adapter(String),

    #[error("device not found: {0}")]
    DeviceNotFound(DeviceId),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("not connected: {0}")]
    NotConnected(DeviceId),

    #[error("{channel} characteristic not found on {device}")]
    CharacteristicNotFound { device: DeviceId, channel: Channel },

    #[error("operation cancelled")]
    OperationCancelled,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("scan failed: {0}")]
    ScanFailed(String),

    #[error("timeout")]
    Timeout,

    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Errors expected while tearing down a link that is already gone
    pub fn is_benign_teardown(&self) -> bool {
        matches!(
            self,
            TransportError::NotConnected(_) | TransportError::OperationCancelled
        )
    }
}

#[cfg(feature = "ble")]
impl From<btleplug::Error> for TransportError {
    fn from(e: btleplug::Error) -> Self {
        match e {
            btleplug::Error::NotConnected => TransportError::OperationCancelled,
            btleplug::Error::TimedOut(_) => TransportError::Timeout,
            other => TransportError::Other(other.to_string()),
        }
    }
}
