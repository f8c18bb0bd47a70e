//! Error types for the WiRoc protocol layer

use thiserror::Error;

/// Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Protocol and codec error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Property name outside the known vocabulary
    #[error("unknown property: {0}")]
    UnknownProperty(String),

    /// Property exists but has no decoder
    #[error("property is not readable: {0}")]
    NotGettable(String),

    /// Property exists but has no encoder
    #[error("property is not writable: {0}")]
    NotSettable(String),

    /// Wire value could not be decoded into the property's type
    #[error("cannot decode {property}: {reason}")]
    Decode { property: String, reason: String },

    /// Typed value does not fit the property being written
    #[error("invalid value for {property}: expected {expected}")]
    InvalidValue {
        property: String,
        expected: &'static str,
    },

    /// Nothing to put on the wire
    #[error("empty command")]
    EmptyCommand,

    /// Response did not carry the property that was asked for
    #[error("property missing from response: {0}")]
    PropertyMissing(String),

    /// Malformed stream batch
    #[error("cannot decode {channel} batch: {reason}")]
    Batch {
        channel: &'static str,
        reason: String,
    },

    /// Positional snapshot schema is inconsistent with the property table
    #[error("invalid bulk schema: {0}")]
    Schema(String),
}

impl Error {
    pub(crate) fn decode(property: &str, reason: impl ToString) -> Self {
        Error::Decode {
            property: property.to_string(),
            reason: reason.to_string(),
        }
    }
}
