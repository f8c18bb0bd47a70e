//! Client builder pattern

use std::sync::Arc;
use std::time::Duration;
use wiroc_core::{BulkSchema, FIRMWARE_BULK_SCHEMA};
use wiroc_transport::DeviceLink;

use crate::config::ClientConfig;
use crate::{Result, WirocClient};

/// Builder for WiRoc client
pub struct WirocBuilder {
    config: ClientConfig,
    schema: BulkSchema,
}

impl WirocBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            schema: FIRMWARE_BULK_SCHEMA,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set how long to scan for an unknown device
    pub fn scan_timeout(mut self, timeout: Duration) -> Self {
        self.config.scan_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Bound every property request
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Enable/disable the snapshot handshake on connect
    pub fn handshake(mut self, enabled: bool) -> Self {
        self.config.handshake = enabled;
        self
    }

    /// Use a different bulk snapshot layout
    pub fn bulk_schema(mut self, schema: BulkSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Build on top of `link`
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self, link: Arc<dyn DeviceLink>) -> Result<WirocClient> {
        WirocClient::assemble(link, self.config, self.schema)
    }
}

impl Default for WirocBuilder {
    fn default() -> Self {
        Self::new()
    }
}
