//! WiRoc Transport Layer
//!
//! This crate provides the link between the protocol engine and a device:
//! - [`DeviceLink`]: the notification/write contract the client drives
//! - BLE via btleplug (feature `ble`)
//! - [`MockLink`]: an in-memory device for tests

pub mod ble;
pub mod error;
pub mod mock;
pub mod traits;

pub use ble::BleConfig;
pub use error::{Result, TransportError};
pub use mock::{MockLink, Responder, WriteRecord};
pub use traits::{DeviceLink, LinkEvent, Notifications};

#[cfg(feature = "ble")]
pub use ble::{BleDevice, BleLink};
