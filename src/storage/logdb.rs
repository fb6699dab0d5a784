//! Log-store backed storage
//!
//! One LogStore table per container. Keys, values and metadata are stored
//! as serialized `Value`s, so map lookups compare serialized key bytes.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{HubError, Result};
use crate::event::{Event, EventKind};
use crate::logdb::{LogStore, RawRecord};
use crate::value::Value;

use super::list::popped;
use super::query::{normalize_index, normalize_query_limits, Record, ResultSet};
use super::{index_key, map_key, require_value};

/// A LogStore shared by every persistent container of one manager
pub type SharedLogStore = Arc<Mutex<LogStore>>;

/// How rows of the table are addressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// By position, keys are synthesized
    List,
    /// By string key
    Map,
}

pub struct LogDbStorage {
    store: SharedLogStore,
    table: String,
    access: Access,
}

impl LogDbStorage {
    /// Bind to `table`, creating it if needed
    pub fn open(store: SharedLogStore, table: impl Into<String>, access: Access) -> Result<Self> {
        let table = table.into();
        store.lock().create_table(&table)?;
        Ok(Self {
            store,
            table,
            access,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn record_count(&self) -> Result<usize> {
        self.store.lock().record_count(&self.table)
    }

    // =========================================================================
    // List Operations
    // =========================================================================

    pub fn push_back(&mut self, value: Value, metadata: Value) -> Result<Event> {
        self.require_list()?;
        require_value(&value)?;
        let index = self.store.lock().append(
            &self.table,
            None,
            &value.to_bytes(),
            encode_optional(&metadata).as_deref(),
        )?;
        Ok(Event::new(EventKind::PushBack, Value::Int(index as i32), value, metadata))
    }

    pub fn push_front(&mut self, value: Value, metadata: Value) -> Result<Event> {
        self.require_list()?;
        require_value(&value)?;
        self.store.lock().insert_at(
            &self.table,
            0,
            &value.to_bytes(),
            encode_optional(&metadata).as_deref(),
        )?;
        Ok(Event::new(EventKind::PushFront, Value::Int(0), value, metadata))
    }

    pub fn pop_back(&mut self) -> Result<(Record, Event)> {
        self.require_list()?;
        let mut store = self.store.lock();
        let size = store.record_count(&self.table)?;
        let index = normalize_index(-1, size)?;
        let record = self.decode(index, store.get_by_index(&self.table, index)?)?;
        store.delete_by_index(&self.table, index)?;
        let event = popped(EventKind::PopBack, &record);
        Ok((record, event))
    }

    pub fn pop_front(&mut self) -> Result<(Record, Event)> {
        self.require_list()?;
        let mut store = self.store.lock();
        let size = store.record_count(&self.table)?;
        let index = normalize_index(0, size)?;
        let record = self.decode(index, store.get_by_index(&self.table, index)?)?;
        store.delete_by_index(&self.table, index)?;
        let event = popped(EventKind::PopFront, &record);
        Ok((record, event))
    }

    // =========================================================================
    // Keyed Operations
    // =========================================================================

    pub fn get(&self, key: &Value) -> Result<Record> {
        let mut store = self.store.lock();
        let index = match (self.access, key) {
            (_, Value::Int(i)) => normalize_index(*i as i64, store.record_count(&self.table)?)?,
            (Access::Map, _) => {
                map_key(key)?;
                let (index, raw) = store.get(&self.table, &key.to_bytes())?;
                return self.decode(index, raw);
            }
            (Access::List, _) => return Err(HubError::WrongKeyType),
        };
        self.decode(index, store.get_by_index(&self.table, index)?)
    }

    pub fn set(&mut self, key: &Value, value: Value, metadata: Value) -> Result<Event> {
        let mut store = self.store.lock();
        let index = match self.access {
            Access::List => {
                let index = normalize_index(index_key(key)?, store.record_count(&self.table)?)?;
                store.set_by_index(
                    &self.table,
                    index,
                    None,
                    encode_optional(&value).as_deref(),
                    encode_optional(&metadata).as_deref(),
                )?;
                index
            }
            Access::Map => {
                map_key(key)?;
                require_value(&value)?;
                store.set(
                    &self.table,
                    &key.to_bytes(),
                    &value.to_bytes(),
                    encode_optional(&metadata).as_deref(),
                )?
            }
        };

        let record = self.decode(index, store.get_by_index(&self.table, index)?)?;
        Ok(Event::new(EventKind::Set, record.key, record.value, record.metadata))
    }

    pub fn insert(&mut self, key: &Value, value: Value, metadata: Value) -> Result<Event> {
        require_value(&value)?;
        let mut store = self.store.lock();
        let metadata_bytes = encode_optional(&metadata);

        match self.access {
            Access::List => {
                let raw = index_key(key)?;
                let size = store.record_count(&self.table)?;
                let index = if raw >= 0 && raw as usize == size {
                    size
                } else {
                    normalize_index(raw, size)?
                };
                store.insert_at(&self.table, index, &value.to_bytes(), metadata_bytes.as_deref())?;
                Ok(Event::new(EventKind::Insert, Value::Int(index as i32), value, metadata))
            }
            Access::Map => {
                map_key(key)?;
                let key_bytes = key.to_bytes();
                if store.find_key(&self.table, 0, &key_bytes)?.is_some() {
                    return Err(HubError::AlreadyExists);
                }
                store.append(
                    &self.table,
                    Some(&key_bytes),
                    &value.to_bytes(),
                    metadata_bytes.as_deref(),
                )?;
                Ok(Event::new(EventKind::Insert, key.clone(), value, metadata))
            }
        }
    }

    pub fn delete(&mut self, key: &Value) -> Result<Event> {
        let mut store = self.store.lock();
        let index = match self.access {
            Access::List => normalize_index(index_key(key)?, store.record_count(&self.table)?)?,
            Access::Map => {
                map_key(key)?;
                store
                    .find_key(&self.table, 0, &key.to_bytes())?
                    .ok_or(HubError::KeyNotFound)?
            }
        };

        let record = self.decode(index, store.get_by_index(&self.table, index)?)?;
        store.delete_by_index(&self.table, index)?;
        Ok(Event::new(EventKind::Delete, record.key, record.value, record.metadata))
    }

    pub fn clear(&mut self) -> Result<Event> {
        self.store.lock().clear(&self.table)?;
        Ok(Event::bare(EventKind::Clear))
    }

    pub fn query(&self, start: i64, end: i64) -> Result<ResultSet> {
        let mut store = self.store.lock();
        let (start, end) = normalize_query_limits(start, end, store.record_count(&self.table)?);
        let mut records = Vec::with_capacity(end - start);
        for index in start..end {
            records.push(self.decode(index, store.get_by_index(&self.table, index)?)?);
        }
        Ok(ResultSet::new(records))
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn require_list(&self) -> Result<()> {
        match self.access {
            Access::List => Ok(()),
            Access::Map => Err(HubError::NotSupported("push/pop on a map")),
        }
    }

    fn decode(&self, index: usize, raw: RawRecord) -> Result<Record> {
        let key = match self.access {
            Access::List => Value::Int(index as i32),
            Access::Map => decode_optional(raw.key.as_deref())?,
        };
        Ok(Record::new(
            key,
            decode_optional(raw.value.as_deref())?,
            decode_optional(raw.metadata.as_deref())?,
        ))
    }
}

fn encode_optional(value: &Value) -> Option<Vec<u8>> {
    (!value.is_empty()).then(|| value.to_bytes())
}

fn decode_optional(bytes: Option<&[u8]>) -> Result<Value> {
    match bytes {
        Some(bytes) => Value::from_bytes(bytes),
        None => Ok(Value::None),
    }
}
