//! Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Session and request settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// How long to scan for a device the link does not know yet
    pub scan_timeout_ms: u64,
    /// Upper bound on a property request; unbounded when unset
    pub request_timeout_ms: Option<u64>,
    /// Request the full snapshot when a session opens
    pub handshake: bool,
}

impl ClientConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            scan_timeout_ms: 10_000,
            request_timeout_ms: None,
            handshake: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.scan_timeout(), Duration::from_secs(10));
        assert_eq!(config.request_timeout(), None);
        assert!(config.handshake);
    }
}
