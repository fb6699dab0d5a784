//! In-memory list storage

use std::collections::VecDeque;

use crate::error::{HubError, Result};
use crate::event::{Event, EventKind};
use crate::value::Value;

use super::query::{normalize_index, normalize_query_limits, Record, ResultSet};
use super::{index_key, require_value};

/// Volatile list of (value, metadata) pairs
#[derive(Debug, Default)]
pub struct MemoryList {
    items: VecDeque<(Value, Value)>,
}

impl MemoryList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_count(&self) -> usize {
        self.items.len()
    }

    pub fn push_back(&mut self, value: Value, metadata: Value) -> Result<Event> {
        require_value(&value)?;
        let index = self.items.len();
        self.items.push_back((value.clone(), metadata.clone()));
        Ok(Event::new(EventKind::PushBack, Value::Int(index as i32), value, metadata))
    }

    pub fn push_front(&mut self, value: Value, metadata: Value) -> Result<Event> {
        require_value(&value)?;
        self.items.push_front((value.clone(), metadata.clone()));
        Ok(Event::new(EventKind::PushFront, Value::Int(0), value, metadata))
    }

    pub fn pop_back(&mut self) -> Result<(Record, Event)> {
        let (value, metadata) = self.items.pop_back().ok_or(empty_list(-1))?;
        let index = self.items.len();
        let record = Record::new(Value::Int(index as i32), value, metadata);
        let event = popped(EventKind::PopBack, &record);
        Ok((record, event))
    }

    pub fn pop_front(&mut self) -> Result<(Record, Event)> {
        let (value, metadata) = self.items.pop_front().ok_or(empty_list(0))?;
        let record = Record::new(Value::Int(0), value, metadata);
        let event = popped(EventKind::PopFront, &record);
        Ok((record, event))
    }

    pub fn get(&self, key: &Value) -> Result<Record> {
        let index = normalize_index(index_key(key)?, self.items.len())?;
        let (value, metadata) = &self.items[index];
        Ok(Record::new(Value::Int(index as i32), value.clone(), metadata.clone()))
    }

    /// Overwrite the record at `key`. Empty value or metadata keep the
    /// current one.
    pub fn set(&mut self, key: &Value, value: Value, metadata: Value) -> Result<Event> {
        let index = normalize_index(index_key(key)?, self.items.len())?;
        let item = &mut self.items[index];
        if !value.is_empty() {
            item.0 = value;
        }
        if !metadata.is_empty() {
            item.1 = metadata;
        }
        Ok(Event::new(
            EventKind::Set,
            Value::Int(index as i32),
            item.0.clone(),
            item.1.clone(),
        ))
    }

    /// Insert before `key`. An index equal to the length appends.
    pub fn insert(&mut self, key: &Value, value: Value, metadata: Value) -> Result<Event> {
        require_value(&value)?;
        let raw = index_key(key)?;
        let size = self.items.len();
        let index = if raw >= 0 && raw as usize == size {
            size
        } else {
            normalize_index(raw, size)?
        };
        self.items.insert(index, (value.clone(), metadata.clone()));
        Ok(Event::new(EventKind::Insert, Value::Int(index as i32), value, metadata))
    }

    pub fn delete(&mut self, key: &Value) -> Result<Event> {
        let index = normalize_index(index_key(key)?, self.items.len())?;
        let (value, metadata) = self
            .items
            .remove(index)
            .ok_or(HubError::InvalidIndex {
                index,
                size: self.items.len(),
            })?;
        Ok(Event::new(EventKind::Delete, Value::Int(index as i32), value, metadata))
    }

    pub fn clear(&mut self) -> Result<Event> {
        self.items.clear();
        Ok(Event::bare(EventKind::Clear))
    }

    pub fn query(&self, start: i64, end: i64) -> Result<ResultSet> {
        let (start, end) = normalize_query_limits(start, end, self.items.len());
        let records = self
            .items
            .range(start..end)
            .enumerate()
            .map(|(i, (value, metadata))| {
                Record::new(Value::Int((start + i) as i32), value.clone(), metadata.clone())
            })
            .collect();
        Ok(ResultSet::new(records))
    }
}

fn empty_list(index: i64) -> HubError {
    HubError::OutOfRange { index, size: 0 }
}

pub(super) fn popped(kind: EventKind, record: &Record) -> Event {
    Event::new(
        kind,
        record.key.clone(),
        record.value.clone(),
        record.metadata.clone(),
    )
}
