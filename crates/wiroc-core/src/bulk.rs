//! Positional bulk snapshot decoding
//!
//! The `all` response carries every core property in one value, joined by
//! `¤`, with no names: the N-th value belongs to the N-th entry of the
//! firmware's emission order. [`BulkSchema`] pins that order explicitly.

use std::collections::HashSet;
use tracing::warn;

use crate::error::{Error, Result};
use crate::property;
use crate::value::PropertyMap;
use crate::wire::BULK_SEPARATOR;

/// Ordered property names emitted by a firmware generation
#[derive(Debug, Clone, Copy)]
pub struct BulkSchema {
    pub version: u32,
    pub names: &'static [&'static str],
}

/// Emission order of the current device firmware
pub static FIRMWARE_BULK_SCHEMA: BulkSchema = BulkSchema {
    version: 1,
    names: &[
        "wirocdevicename",
        "loramode",
        "lorarange",
        "channel",
        "loraenabled",
        "lorapower",
        "acknowledgementrequested",
        "srr/enabled",
        "srr/mode",
        "srr/redchannel",
        "srr/bluechannel",
        "sendtosirapenabled",
        "sendtosirapip",
        "sendtosirapipport",
        "rs232mode",
        "rs232onewayreceive",
        "force4800baudrate",
        "onewayreceive",
        "logtoserver",
        "batterylevel",
        "ischarging",
        "wirochwversion",
        "wirocswversion",
        "wirocbleapiversion",
        "ipaddress",
        "btaddress",
    ],
};

impl BulkSchema {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Check that every entry is a unique, readable property
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for name in self.names {
            if !seen.insert(*name) {
                return Err(Error::Schema(format!(
                    "v{}: {} appears more than once",
                    self.version, name
                )));
            }
            property::gettable(name).map_err(|e| {
                Error::Schema(format!("v{}: {}", self.version, e))
            })?;
        }
        Ok(())
    }

    /// Decode a snapshot value into `out`
    ///
    /// Positions beyond the received values are skipped, as are received
    /// values beyond the schema; both cases log a warning. Individual
    /// values that fail to decode are errors.
    pub fn decode_into(&self, wire: &str, out: &mut PropertyMap) -> Result<()> {
        let values: Vec<&str> = wire.split(BULK_SEPARATOR).collect();

        if values.len() < self.names.len() {
            warn!(
                "bulk snapshot has {} values, schema v{} expects {}; skipping {:?}",
                values.len(),
                self.version,
                self.names.len(),
                &self.names[values.len()..]
            );
        } else if values.len() > self.names.len() {
            warn!(
                "bulk snapshot has {} values, schema v{} expects {}; ignoring the rest",
                values.len(),
                self.version,
                self.names.len()
            );
        }

        for (name, raw) in self.names.iter().zip(values) {
            let value = property::gettable(name)?.decode(raw)?;
            out.insert(name.to_string(), value);
        }

        Ok(())
    }

    pub fn decode(&self, wire: &str) -> Result<PropertyMap> {
        let mut out = PropertyMap::new();
        self.decode_into(wire, &mut out)?;
        Ok(out)
    }
}
