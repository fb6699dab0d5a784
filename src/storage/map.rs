//! In-memory map storage
//!
//! Ordered by key bytes. Integer keys address entries by position in key
//! order so maps can be walked like lists.

use std::collections::BTreeMap;

use crate::error::{HubError, Result};
use crate::event::{Event, EventKind};
use crate::value::Value;

use super::query::{normalize_index, normalize_query_limits, Record, ResultSet};
use super::{map_key, require_value};

#[derive(Debug, Default)]
pub struct MemoryMap {
    entries: BTreeMap<Vec<u8>, (Value, Value)>,
}

impl MemoryMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_count(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: &Value) -> Result<Record> {
        if let Value::Int(position) = key {
            let index = normalize_index(*position as i64, self.entries.len())?;
            let (k, (value, metadata)) = self
                .entries
                .iter()
                .nth(index)
                .ok_or(HubError::KeyNotFound)?;
            return Ok(Record::new(Value::from(k.as_slice()), value.clone(), metadata.clone()));
        }

        let k = map_key(key)?;
        let (value, metadata) = self.entries.get(k).ok_or(HubError::KeyNotFound)?;
        Ok(Record::new(key.clone(), value.clone(), metadata.clone()))
    }

    /// Upsert. Empty metadata keeps what an existing entry had.
    pub fn set(&mut self, key: &Value, value: Value, metadata: Value) -> Result<Event> {
        let k = map_key(key)?;
        require_value(&value)?;

        let entry = self
            .entries
            .entry(k.to_vec())
            .or_insert((Value::None, Value::None));
        entry.0 = value;
        if !metadata.is_empty() {
            entry.1 = metadata;
        }
        Ok(Event::new(EventKind::Set, key.clone(), entry.0.clone(), entry.1.clone()))
    }

    /// Add a new key. Fails with AlreadyExists if the key is present.
    pub fn insert(&mut self, key: &Value, value: Value, metadata: Value) -> Result<Event> {
        let k = map_key(key)?;
        require_value(&value)?;
        if self.entries.contains_key(k) {
            return Err(HubError::AlreadyExists);
        }
        self.entries
            .insert(k.to_vec(), (value.clone(), metadata.clone()));
        Ok(Event::new(EventKind::Insert, key.clone(), value, metadata))
    }

    pub fn delete(&mut self, key: &Value) -> Result<Event> {
        let k = map_key(key)?;
        let (value, metadata) = self.entries.remove(k).ok_or(HubError::KeyNotFound)?;
        Ok(Event::new(EventKind::Delete, key.clone(), value, metadata))
    }

    pub fn clear(&mut self) -> Result<Event> {
        self.entries.clear();
        Ok(Event::bare(EventKind::Clear))
    }

    pub fn query(&self, start: i64, end: i64) -> Result<ResultSet> {
        let (start, end) = normalize_query_limits(start, end, self.entries.len());
        let records = self
            .entries
            .iter()
            .skip(start)
            .take(end - start)
            .map(|(k, (value, metadata))| {
                Record::new(Value::from(k.as_slice()), value.clone(), metadata.clone())
            })
            .collect();
        Ok(ResultSet::new(records))
    }
}
