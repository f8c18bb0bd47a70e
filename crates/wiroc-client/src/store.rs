//! Per-device property cache

use dashmap::DashMap;
use tracing::debug;
use wiroc_core::{codec, BulkSchema, DeviceId, Observers, PropertyMap, PropertyValue, Subscription};

use crate::error::Result;

/// Properties decoded from one property-channel message
#[derive(Debug, Clone, PartialEq)]
pub struct PropertiesChanged {
    pub device: DeviceId,
    pub properties: PropertyMap,
}

pub(crate) struct PropertyStore {
    schema: BulkSchema,
    values: DashMap<DeviceId, PropertyMap>,
    changed: Observers<PropertiesChanged>,
}

impl PropertyStore {
    pub fn new(schema: BulkSchema) -> Self {
        Self {
            schema,
            values: DashMap::new(),
            changed: Observers::new(),
        }
    }

    /// Decode `text`, merge it into the cache and notify observers
    ///
    /// `written` names the property whose write produced `text`, if any.
    pub fn apply(&self, device: &DeviceId, text: &str, written: Option<&str>) -> Result<PropertyMap> {
        let properties = codec::decode_message(&self.schema, text, written)?;
        if properties.is_empty() {
            return Ok(properties);
        }

        debug!("{}: caching {} properties", device, properties.len());
        {
            let mut cached = self.values.entry(device.clone()).or_default();
            for (name, value) in &properties {
                cached.insert(name.clone(), value.clone());
            }
        }

        self.changed.emit(&PropertiesChanged {
            device: device.clone(),
            properties: properties.clone(),
        });
        Ok(properties)
    }

    pub fn get(&self, device: &DeviceId, name: &str) -> Option<PropertyValue> {
        self.values.get(device)?.get(name).cloned()
    }

    pub fn clear(&self, device: &DeviceId) {
        self.values.remove(device);
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&PropertiesChanged) + Send + Sync + 'static,
    {
        self.changed.subscribe(callback)
    }
}
