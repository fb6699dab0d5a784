//! Storage Backends
//!
//! A closed set of record storages behind one contract:
//!
//! | Variant      | Kind | Keys                          | Mutable |
//! |--------------|------|-------------------------------|---------|
//! | MemoryList   | list | position (negative from end)  | yes     |
//! | MemoryMap    | map  | string, or position           | yes     |
//! | LogDb        | both | per `Access`                  | yes     |
//! | Directory    | map  | file name                     | no      |
//!
//! Mutators return the `Event` describing the change instead of raising it;
//! the owning container decides when sinks run.

mod directory;
mod list;
mod logdb;
mod map;
mod property;
mod query;

pub use directory::DirectoryStorage;
pub use list::MemoryList;
pub use logdb::{Access, LogDbStorage, SharedLogStore};
pub use map::MemoryMap;
pub use property::PropertyMap;
pub use query::{normalize_for_query, normalize_index, normalize_query_limits, Record, ResultSet};

use crate::error::{HubError, Result};
use crate::event::{Event, EventKind};
use crate::value::Value;

/// Whether a storage behaves like a sequence or a keyed map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    List,
    Map,
}

pub enum StorageBackend {
    MemoryList(MemoryList),
    MemoryMap(MemoryMap),
    LogDb(LogDbStorage),
    Directory(DirectoryStorage),
}

impl StorageBackend {
    pub fn kind(&self) -> ContainerKind {
        match self {
            StorageBackend::MemoryList(_) => ContainerKind::List,
            StorageBackend::MemoryMap(_) | StorageBackend::Directory(_) => ContainerKind::Map,
            StorageBackend::LogDb(s) => match s.access() {
                Access::List => ContainerKind::List,
                Access::Map => ContainerKind::Map,
            },
        }
    }

    pub fn record_count(&self) -> Result<usize> {
        match self {
            StorageBackend::MemoryList(s) => Ok(s.record_count()),
            StorageBackend::MemoryMap(s) => Ok(s.record_count()),
            StorageBackend::LogDb(s) => s.record_count(),
            StorageBackend::Directory(s) => s.record_count(),
        }
    }

    pub fn push_back(&mut self, value: Value, metadata: Value) -> Result<Event> {
        match self {
            StorageBackend::MemoryList(s) => s.push_back(value, metadata),
            StorageBackend::LogDb(s) => s.push_back(value, metadata),
            StorageBackend::MemoryMap(_) => Err(HubError::NotSupported("push_back on a map")),
            StorageBackend::Directory(s) => s.mutate(),
        }
    }

    pub fn push_front(&mut self, value: Value, metadata: Value) -> Result<Event> {
        match self {
            StorageBackend::MemoryList(s) => s.push_front(value, metadata),
            StorageBackend::LogDb(s) => s.push_front(value, metadata),
            StorageBackend::MemoryMap(_) => Err(HubError::NotSupported("push_front on a map")),
            StorageBackend::Directory(s) => s.mutate(),
        }
    }

    pub fn pop_back(&mut self) -> Result<(Record, Event)> {
        match self {
            StorageBackend::MemoryList(s) => s.pop_back(),
            StorageBackend::LogDb(s) => s.pop_back(),
            StorageBackend::MemoryMap(_) => Err(HubError::NotSupported("pop_back on a map")),
            StorageBackend::Directory(s) => s.mutate(),
        }
    }

    pub fn pop_front(&mut self) -> Result<(Record, Event)> {
        match self {
            StorageBackend::MemoryList(s) => s.pop_front(),
            StorageBackend::LogDb(s) => s.pop_front(),
            StorageBackend::MemoryMap(_) => Err(HubError::NotSupported("pop_front on a map")),
            StorageBackend::Directory(s) => s.mutate(),
        }
    }

    pub fn get(&self, key: &Value) -> Result<Record> {
        match self {
            StorageBackend::MemoryList(s) => s.get(key),
            StorageBackend::MemoryMap(s) => s.get(key),
            StorageBackend::LogDb(s) => s.get(key),
            StorageBackend::Directory(s) => s.get(key),
        }
    }

    pub fn set(&mut self, key: &Value, value: Value, metadata: Value) -> Result<Event> {
        match self {
            StorageBackend::MemoryList(s) => s.set(key, value, metadata),
            StorageBackend::MemoryMap(s) => s.set(key, value, metadata),
            StorageBackend::LogDb(s) => s.set(key, value, metadata),
            StorageBackend::Directory(s) => s.mutate(),
        }
    }

    pub fn insert(&mut self, key: &Value, value: Value, metadata: Value) -> Result<Event> {
        match self {
            StorageBackend::MemoryList(s) => s.insert(key, value, metadata),
            StorageBackend::MemoryMap(s) => s.insert(key, value, metadata),
            StorageBackend::LogDb(s) => s.insert(key, value, metadata),
            StorageBackend::Directory(s) => s.mutate(),
        }
    }

    pub fn delete(&mut self, key: &Value) -> Result<Event> {
        match self {
            StorageBackend::MemoryList(s) => s.delete(key),
            StorageBackend::MemoryMap(s) => s.delete(key),
            StorageBackend::LogDb(s) => s.delete(key),
            StorageBackend::Directory(s) => s.mutate(),
        }
    }

    pub fn clear(&mut self) -> Result<Event> {
        match self {
            StorageBackend::MemoryList(s) => s.clear(),
            StorageBackend::MemoryMap(s) => s.clear(),
            StorageBackend::LogDb(s) => s.clear(),
            StorageBackend::Directory(s) => s.mutate(),
        }
    }

    pub fn query(&self, start: i64, end: i64) -> Result<ResultSet> {
        match self {
            StorageBackend::MemoryList(s) => s.query(start, end),
            StorageBackend::MemoryMap(s) => s.query(start, end),
            StorageBackend::LogDb(s) => s.query(start, end),
            StorageBackend::Directory(s) => s.query(start, end),
        }
    }

    /// Current contents from `start` as synthetic events: `push_back` for
    /// lists, `set` for maps. The terminating `snapshot_end` is not included.
    pub fn snapshot(&self, start: i64) -> Result<Vec<Event>> {
        let kind = match self.kind() {
            ContainerKind::List => EventKind::PushBack,
            ContainerKind::Map => EventKind::Set,
        };
        let events = self
            .query(start, 0)?
            .into_iter()
            .map(|r| Event::new(kind, r.key, r.value, r.metadata))
            .collect();
        Ok(events)
    }
}

// =============================================================================
// Key Helpers
// =============================================================================

/// Integer position from a list key
pub(crate) fn index_key(key: &Value) -> Result<i64> {
    match key {
        Value::Int(i) => Ok(*i as i64),
        _ => Err(HubError::WrongKeyType),
    }
}

/// Key bytes from a map key
pub(crate) fn map_key(key: &Value) -> Result<&[u8]> {
    match key {
        Value::String(bytes) => Ok(bytes),
        _ => Err(HubError::WrongKeyType),
    }
}

pub(crate) fn require_value(value: &Value) -> Result<()> {
    if value.is_empty() {
        return Err(HubError::InvalidArgument("a value is required".into()));
    }
    Ok(())
}
