//! Message-level encoding and decoding for the property channel

use tracing::warn;

use crate::bulk::BulkSchema;
use crate::error::{Error, Result};
use crate::property;
use crate::value::{PropertyMap, PropertyValue};
use crate::wire::{self, BULK_PROPERTY};

/// Encode a write of `value` to property `name`
pub fn encode_set(name: &str, value: &PropertyValue) -> Result<String> {
    let fields = property::settable(name)?.encode(value)?;
    Ok(wire::set_command(name, &fields))
}

/// Encode a read of one or more properties
pub fn encode_query<S: AsRef<str>>(names: &[S]) -> Result<String> {
    if names.is_empty() {
        return Err(Error::EmptyCommand);
    }
    for name in names {
        property::gettable(name.as_ref())?;
    }
    Ok(wire::query_command(names))
}

/// Decode a complete property-channel message
///
/// Values land under their cache slot: read values under their own name,
/// write confirmations under the property's response target. `written`
/// names the property this message confirms, if any. Unknown names are
/// skipped with a warning.
pub fn decode_message(
    schema: &BulkSchema,
    text: &str,
    written: Option<&str>,
) -> Result<PropertyMap> {
    let mut out = PropertyMap::new();

    for (name, raw) in wire::parse_message(text) {
        if name == BULK_PROPERTY {
            schema.decode_into(raw, &mut out)?;
            continue;
        }

        let spec = match property::lookup(name) {
            Ok(spec) => spec,
            Err(_) => {
                warn!("ignoring unknown property {:?}", name);
                continue;
            }
        };

        if spec.is_settable() && (written == Some(name) || !spec.is_gettable()) {
            out.insert(spec.response_target().to_string(), spec.decode_response(raw)?);
        } else {
            out.insert(name.to_string(), spec.decode(raw)?);
        }
    }

    Ok(out)
}
