//! WiRoc Core
//!
//! Protocol primitives for talking to WiRoc devices over an MTU-limited
//! notification link.
//!
//! This crate provides:
//! - Identifiers ([`DeviceId`], [`Channel`])
//! - Chunk reassembly ([`ChunkBuffer`])
//! - Property channel layout ([`wire`]) and codecs ([`property`], [`codec`])
//! - Positional snapshot decoding ([`BulkSchema`])
//! - Stream records ([`Punch`], [`TestPunch`])
//! - Disposable observer registrations ([`Observers`], [`Subscription`])

pub mod bulk;
pub mod codec;
pub mod error;
pub mod observer;
pub mod property;
pub mod punch;
pub mod reassembly;
pub mod types;
pub mod value;
pub mod wire;

pub use bulk::{BulkSchema, FIRMWARE_BULK_SCHEMA};
pub use error::{Error, Result};
pub use observer::{Observers, Subscription};
pub use property::{PropertySpec, ValueKind, PROPERTIES};
pub use punch::{Punch, PunchLog, TestPunch, TestPunchBoard, TestPunchStatus};
pub use reassembly::{ChunkBuffer, CompletedMessage};
pub use types::{Channel, DeviceId, TransactionId};
pub use value::{PropertyMap, PropertyValue, Record};

/// Default notification payload size (ATT MTU 23 minus header)
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 20;
