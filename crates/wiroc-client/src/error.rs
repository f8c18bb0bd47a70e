//! Client error types

use thiserror::Error;
use wiroc_core::DeviceId;
use wiroc_transport::TransportError;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug, Clone)]
pub enum ClientError {
    #[error("device not found: {0}")]
    DeviceNotFound(DeviceId),

    #[error("not connected: {0}")]
    NotConnected(DeviceId),

    #[error("timeout")]
    Timeout,

    #[error("request cancelled")]
    RequestCancelled,

    #[error("protocol error: {0}")]
    Protocol(#[from] wiroc_core::Error),

    #[error("transport error: {0}")]
    Transport(TransportError),

    #[error("config error: {0}")]
    Config(String),
}

impl From<TransportError> for ClientError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::DeviceNotFound(device) => ClientError::DeviceNotFound(device),
            TransportError::Timeout => ClientError::Timeout,
            other => ClientError::Transport(other),
        }
    }
}
