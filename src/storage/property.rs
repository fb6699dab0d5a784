//! Per-container string properties

use std::collections::BTreeMap;

use crate::error::{HubError, Result};
use crate::value::Value;

use super::logdb::LogDbStorage;

pub enum PropertyMap {
    Memory(BTreeMap<String, String>),
    /// Persistent properties in their own map-access table
    LogDb(LogDbStorage),
    ReadOnly,
}

impl PropertyMap {
    pub fn memory() -> Self {
        PropertyMap::Memory(BTreeMap::new())
    }

    pub fn get(&self, key: &str) -> Result<String> {
        match self {
            PropertyMap::Memory(map) => map.get(key).cloned().ok_or(HubError::KeyNotFound),
            PropertyMap::LogDb(storage) => {
                let record = storage.get(&Value::from(key))?;
                Ok(record.value.to_string())
            }
            PropertyMap::ReadOnly => Err(HubError::KeyNotFound),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match self {
            PropertyMap::Memory(map) => {
                map.insert(key.to_string(), value.to_string());
                Ok(())
            }
            PropertyMap::LogDb(storage) => storage
                .set(&Value::from(key), Value::from(value), Value::None)
                .map(|_| ()),
            PropertyMap::ReadOnly => Err(HubError::NotSupported("read-only properties")),
        }
    }
}
