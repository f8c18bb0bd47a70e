//! Property vocabulary and per-property codecs
//!
//! Every property the device understands is one [`PropertySpec`] row in
//! [`PROPERTIES`]. Readable properties carry the [`ValueKind`] used to decode
//! their wire string; writable ones carry a [`Writable`] describing how a
//! typed value is encoded, how the device's confirmation is decoded, and
//! which cache slot that confirmation refreshes.

use crate::error::{Error, Result};
use crate::value::{PropertyValue, Record};

/// Separates records in a list property
pub const RECORD_SEPARATOR: &str = ";";

/// Separates fields inside one record
pub const RECORD_FIELD_SEPARATOR: &str = ",";

/// Wire representation of a property value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// `"0"` is false, anything else is true
    Bool,
    Int,
    Text,
    /// Closed set of uppercase members (not enforced on decode)
    Enum(&'static [&'static str]),
    Json,
    /// Delimited list mapped onto the given field names
    Records(&'static [&'static str]),
}

impl ValueKind {
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Text => "text",
            ValueKind::Enum(_) => "enum",
            ValueKind::Json => "json",
            ValueKind::Records(_) => "records",
        }
    }

    pub fn decode(&self, property: &str, wire: &str) -> Result<PropertyValue> {
        match self {
            ValueKind::Bool => Ok(PropertyValue::Bool(wire != "0")),
            ValueKind::Int => wire
                .trim()
                .parse::<i64>()
                .map(PropertyValue::Int)
                .map_err(|e| Error::decode(property, format!("{:?}: {}", wire, e))),
            ValueKind::Text => Ok(PropertyValue::Text(wire.to_string())),
            ValueKind::Enum(_) => Ok(PropertyValue::Enum(wire.to_uppercase())),
            ValueKind::Json => serde_json::from_str(wire)
                .map(PropertyValue::Json)
                .map_err(|e| Error::decode(property, e)),
            ValueKind::Records(fields) => Ok(PropertyValue::Records(decode_records(fields, wire))),
        }
    }

    pub fn encode(&self, property: &str, value: &PropertyValue) -> Result<String> {
        let invalid = || Error::InvalidValue {
            property: property.to_string(),
            expected: self.name(),
        };

        match (self, value) {
            (ValueKind::Bool, PropertyValue::Bool(b)) => Ok(if *b { "1" } else { "0" }.to_string()),
            (ValueKind::Bool, PropertyValue::Text(s)) => match s.as_str() {
                "1" | "true" => Ok("1".to_string()),
                "0" | "false" => Ok("0".to_string()),
                _ => Err(invalid()),
            },
            (ValueKind::Int, PropertyValue::Int(i)) => Ok(i.to_string()),
            (ValueKind::Int, PropertyValue::Text(s)) => match self.decode(property, s) {
                Ok(PropertyValue::Int(i)) => Ok(i.to_string()),
                _ => Err(invalid()),
            },
            (ValueKind::Text, PropertyValue::Text(s)) => Ok(s.clone()),
            (ValueKind::Enum(_), PropertyValue::Enum(s) | PropertyValue::Text(s)) => {
                Ok(s.to_lowercase())
            }
            (ValueKind::Json, PropertyValue::Json(v)) => Ok(v.to_string()),
            (ValueKind::Json, PropertyValue::Text(s)) => {
                self.decode(property, s).map_err(|_| invalid())?;
                Ok(s.clone())
            }
            (ValueKind::Records(fields), PropertyValue::Records(records)) => {
                Ok(encode_records(fields, records))
            }
            (ValueKind::Records(_), PropertyValue::Text(s)) => Ok(s.clone()),
            _ => Err(invalid()),
        }
    }
}

fn decode_records(fields: &[&str], wire: &str) -> Vec<Record> {
    wire.split(RECORD_SEPARATOR)
        .filter(|record| !record.is_empty())
        .map(|record| {
            fields
                .iter()
                .zip(record.split(RECORD_FIELD_SEPARATOR))
                .map(|(field, value)| (field.to_string(), value.to_string()))
                .collect()
        })
        .collect()
}

fn encode_records(fields: &[&str], records: &[Record]) -> String {
    records
        .iter()
        .map(|record| {
            fields
                .iter()
                .map(|field| record.get(*field).map(String::as_str).unwrap_or(""))
                .collect::<Vec<_>>()
                .join(RECORD_FIELD_SEPARATOR)
        })
        .collect::<Vec<_>>()
        .join(RECORD_SEPARATOR)
}

/// How a written value becomes wire fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// A single field in the given representation
    Value(ValueKind),
    /// One field per name, taken from a single record
    Fields(&'static [&'static str]),
    /// A command without arguments; the value is ignored
    Trigger,
}

/// Write side of a property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Writable {
    pub encoding: Encoding,
    /// Representation of the device's confirmation
    pub response: ValueKind,
    /// Cache slot refreshed by the confirmation, if not the property itself
    pub response_target: Option<&'static str>,
}

/// One entry of the property vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertySpec {
    pub name: &'static str,
    pub get: Option<ValueKind>,
    pub set: Option<Writable>,
}

impl PropertySpec {
    pub fn is_gettable(&self) -> bool {
        self.get.is_some()
    }

    pub fn is_settable(&self) -> bool {
        self.set.is_some()
    }

    /// Decode a read value
    pub fn decode(&self, wire: &str) -> Result<PropertyValue> {
        let kind = self
            .get
            .ok_or_else(|| Error::NotGettable(self.name.to_string()))?;
        kind.decode(self.name, wire)
    }

    /// Encode a value to write, one string per wire field
    pub fn encode(&self, value: &PropertyValue) -> Result<Vec<String>> {
        let writable = self.writable()?;

        match writable.encoding {
            Encoding::Value(kind) => Ok(vec![kind.encode(self.name, value)?]),
            Encoding::Fields(fields) => {
                let record = match value {
                    PropertyValue::Records(records) if records.len() == 1 => &records[0],
                    _ => {
                        return Err(Error::InvalidValue {
                            property: self.name.to_string(),
                            expected: "a single record",
                        })
                    }
                };
                fields
                    .iter()
                    .map(|field| {
                        record.get(*field).cloned().ok_or_else(|| Error::InvalidValue {
                            property: self.name.to_string(),
                            expected: "a value for every field",
                        })
                    })
                    .collect()
            }
            Encoding::Trigger => Ok(Vec::new()),
        }
    }

    /// Decode the device's confirmation of a write
    pub fn decode_response(&self, wire: &str) -> Result<PropertyValue> {
        self.writable()?.response.decode(self.name, wire)
    }

    /// Cache slot that a write confirmation belongs to
    pub fn response_target(&self) -> &'static str {
        self.set
            .and_then(|w| w.response_target)
            .unwrap_or(self.name)
    }

    fn writable(&self) -> Result<Writable> {
        self.set
            .ok_or_else(|| Error::NotSettable(self.name.to_string()))
    }
}

const LORA_MODES: &[&str] = &["SENDER", "RECEIVER", "REPEATER"];
const LORA_RANGES: &[&str] = &["UL", "XL", "L", "ML", "MS", "S"];
const DIRECTIONS: &[&str] = &["SEND", "RECEIVE"];

const SETTING_FIELDS: &[&str] = &["key", "value"];
const WIFI_FIELDS: &[&str] = &["network", "inuse", "signal"];
const BT_SERIAL_FIELDS: &[&str] = &["name", "address", "status"];
const CONNECT_WIFI_FIELDS: &[&str] = &["network", "password"];
const TEST_PUNCH_FIELDS: &[&str] = &["count", "interval", "synchronized"];

const fn read_write(name: &'static str, kind: ValueKind) -> PropertySpec {
    PropertySpec {
        name,
        get: Some(kind),
        set: Some(Writable {
            encoding: Encoding::Value(kind),
            response: kind,
            response_target: None,
        }),
    }
}

const fn read_only(name: &'static str, kind: ValueKind) -> PropertySpec {
    PropertySpec {
        name,
        get: Some(kind),
        set: None,
    }
}

const fn command(
    name: &'static str,
    encoding: Encoding,
    response: ValueKind,
    response_target: Option<&'static str>,
) -> PropertySpec {
    PropertySpec {
        name,
        get: None,
        set: Some(Writable {
            encoding,
            response,
            response_target,
        }),
    }
}

/// The complete property vocabulary
pub static PROPERTIES: &[PropertySpec] = &[
    read_write("wirocdevicename", ValueKind::Text),
    read_write("loramode", ValueKind::Enum(LORA_MODES)),
    read_write("lorarange", ValueKind::Enum(LORA_RANGES)),
    read_write("channel", ValueKind::Int),
    read_write("loraenabled", ValueKind::Bool),
    read_write("lorapower", ValueKind::Int),
    read_write("acknowledgementrequested", ValueKind::Bool),
    read_write("srr/enabled", ValueKind::Bool),
    read_write("srr/mode", ValueKind::Enum(DIRECTIONS)),
    read_write("srr/redchannel", ValueKind::Bool),
    read_write("srr/bluechannel", ValueKind::Bool),
    read_write("sendtosirapenabled", ValueKind::Bool),
    read_write("sendtosirapip", ValueKind::Text),
    read_write("sendtosirapipport", ValueKind::Int),
    read_write("rs232mode", ValueKind::Enum(DIRECTIONS)),
    read_write("rs232onewayreceive", ValueKind::Bool),
    read_write("force4800baudrate", ValueKind::Bool),
    read_write("onewayreceive", ValueKind::Bool),
    read_write("logtoserver", ValueKind::Bool),
    read_only("batterylevel", ValueKind::Int),
    read_only("ischarging", ValueKind::Bool),
    read_only("wirochwversion", ValueKind::Text),
    read_only("wirocswversion", ValueKind::Text),
    read_only("wirocbleapiversion", ValueKind::Text),
    read_only("ipaddress", ValueKind::Text),
    read_only("btaddress", ValueKind::Text),
    read_only("status", ValueKind::Json),
    read_only("services", ValueKind::Json),
    read_only("settings", ValueKind::Records(SETTING_FIELDS)),
    read_only("listwifi", ValueKind::Records(WIFI_FIELDS)),
    read_only("btserialdevices", ValueKind::Records(BT_SERIAL_FIELDS)),
    command(
        "setting",
        Encoding::Fields(SETTING_FIELDS),
        ValueKind::Records(SETTING_FIELDS),
        Some("settings"),
    ),
    command(
        "bindrfcomm",
        Encoding::Value(ValueKind::Text),
        ValueKind::Records(BT_SERIAL_FIELDS),
        Some("btserialdevices"),
    ),
    command(
        "releaserfcomm",
        Encoding::Value(ValueKind::Text),
        ValueKind::Records(BT_SERIAL_FIELDS),
        Some("btserialdevices"),
    ),
    command(
        "connectwifi",
        Encoding::Fields(CONNECT_WIFI_FIELDS),
        ValueKind::Text,
        None,
    ),
    command("disconnectwifi", Encoding::Trigger, ValueKind::Text, None),
    command("renewip", Encoding::Trigger, ValueKind::Text, Some("ipaddress")),
    command("deletepunches", Encoding::Trigger, ValueKind::Text, None),
    command("dropalltables", Encoding::Trigger, ValueKind::Text, None),
    command(
        "upgradewirocpython",
        Encoding::Value(ValueKind::Text),
        ValueKind::Text,
        None,
    ),
    command(
        "starttestpunches",
        Encoding::Fields(TEST_PUNCH_FIELDS),
        ValueKind::Text,
        None,
    ),
];

/// Look up any property by name
pub fn lookup(name: &str) -> Result<&'static PropertySpec> {
    PROPERTIES
        .iter()
        .find(|p| p.name == name)
        .ok_or_else(|| Error::UnknownProperty(name.to_string()))
}

/// Look up a readable property
pub fn gettable(name: &str) -> Result<&'static PropertySpec> {
    let spec = lookup(name)?;
    if spec.is_gettable() {
        Ok(spec)
    } else {
        Err(Error::NotGettable(name.to_string()))
    }
}

/// Look up a writable property
pub fn settable(name: &str) -> Result<&'static PropertySpec> {
    let spec = lookup(name)?;
    if spec.is_settable() {
        Ok(spec)
    } else {
        Err(Error::NotSettable(name.to_string()))
    }
}
