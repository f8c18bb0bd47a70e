//! Command-line value parsing and printing

use anyhow::{bail, Result};
use colored::Colorize;
use wiroc_core::property::{self, Encoding};
use wiroc_core::{PropertyMap, PropertyValue, Record};

/// Turn command-line arguments into a value for `name`
///
/// Multi-field commands take one argument per field, in order.
pub fn parse_set_value(name: &str, args: &[String]) -> Result<PropertyValue> {
    let spec = property::settable(name)?;
    let Some(writable) = spec.set else {
        bail!("{} is not writable", name);
    };

    match writable.encoding {
        Encoding::Trigger => {
            if !args.is_empty() {
                bail!("{} takes no value", name);
            }
            Ok(PropertyValue::Bool(true))
        }
        Encoding::Value(_) => match args {
            [value] => Ok(PropertyValue::from(value.as_str())),
            _ => bail!("{} takes exactly one value", name),
        },
        Encoding::Fields(fields) => {
            if args.len() != fields.len() {
                bail!("{} takes {} values: {}", name, fields.len(), fields.join(" "));
            }
            let record: Record = fields
                .iter()
                .zip(args)
                .map(|(field, value)| (field.to_string(), value.clone()))
                .collect();
            Ok(PropertyValue::from(record))
        }
    }
}

/// Human-readable rendering of a value
pub fn format_value(value: &PropertyValue) -> String {
    match value {
        PropertyValue::Json(json) => {
            serde_json::to_string_pretty(json).unwrap_or_else(|_| json.to_string())
        }
        PropertyValue::Records(records) if records.is_empty() => "(none)".to_string(),
        PropertyValue::Records(records) => records
            .iter()
            .map(|record| {
                record
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

pub fn print_property(name: &str, value: &PropertyValue) {
    let text = format_value(value);
    if text.contains('\n') {
        println!("{}:", name.yellow());
        for line in text.lines() {
            println!("  {}", line);
        }
    } else {
        println!("{:<26} {}", name.yellow(), text);
    }
}

pub fn print_properties(names: &[&str], values: &PropertyMap) {
    for name in names {
        if let Some(value) = values.get(*name) {
            print_property(name, value);
        }
    }
}
