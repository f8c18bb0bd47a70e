//! WiRoc Client Library
//!
//! High-level async client for configuring WiRoc devices and following
//! their punch streams.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use wiroc_client::WirocClient;
//! use wiroc_transport::BleLink;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = WirocClient::new(Arc::new(BleLink::new().await?))?;
//!     let device = "B8:27:EB:11:22:33".into();
//!
//!     client.connect(&device).await?;
//!     println!("battery: {}", client.get_property(&device, "batterylevel").await?);
//!
//!     let _punches = client.on_punches_received(|batch| {
//!         for punch in &batch.punches {
//!             println!("{} at {}", punch.sinumber, punch.stationnumber);
//!         }
//!     });
//!     client.enable_punches_notification(&device).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod client;
pub mod config;
mod correlator;
pub mod error;
mod monitor;
pub mod multiplexer;
pub mod session;
pub mod store;

pub use builder::WirocBuilder;
pub use client::WirocClient;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use multiplexer::{PunchBatch, TestPunchBatch};
pub use session::{ConnectionState, DeviceConnected, DeviceDisconnected};
pub use store::PropertiesChanged;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::builder::WirocBuilder;
    pub use crate::client::WirocClient;
    pub use crate::error::{ClientError, Result};
    pub use wiroc_core::{DeviceId, PropertyValue, Subscription};
}
