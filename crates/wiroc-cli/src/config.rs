//! Configuration file for the WiRoc CLI
//!
//! ```toml
//! [client]
//! scan_timeout_ms = 10000
//! request_timeout_ms = 5000
//!
//! [ble]
//! name_filter = "WiRoc"
//! max_chunk_size = 20
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use wiroc_client::ClientConfig;
use wiroc_transport::BleConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub client: ClientConfig,
    pub ble: BleConfig,
}

impl CliConfig {
    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load the explicit file, else the default file when it exists
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let path = default_config_file();
                if path.exists() {
                    Self::load(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

/// Get the default config file path
pub fn default_config_file() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wiroc")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = CliConfig::parse("").unwrap();
        assert_eq!(config.client, ClientConfig::default());
        assert_eq!(config.ble.max_chunk_size, 20);
        assert!(config.ble.write_with_response);
    }

    #[test]
    fn test_partial_tables() {
        let config = CliConfig::parse(
            r#"
            [client]
            request_timeout_ms = 2500

            [ble]
            name_filter = "WiRoc"
            "#,
        )
        .unwrap();

        assert_eq!(config.client.request_timeout_ms, Some(2500));
        assert_eq!(config.client.scan_timeout_ms, 10_000);
        assert_eq!(config.ble.name_filter.as_deref(), Some("WiRoc"));
        assert_eq!(config.ble.scan_duration_secs, 5);
    }

    #[test]
    fn test_bad_types_rejected() {
        assert!(CliConfig::parse("[client]\nhandshake = \"yes\"").is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let missing = std::env::temp_dir().join("wiroc-cli-no-such-config.toml");
        assert!(CliConfig::resolve(Some(&missing)).is_err());
    }
}
