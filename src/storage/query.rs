//! Records, index normalization and query result sets

use crate::error::{HubError, Result};
use crate::value::Value;

/// A (key, value, metadata) triple
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub key: Value,
    pub value: Value,
    pub metadata: Value,
}

impl Record {
    pub fn new(key: Value, value: Value, metadata: Value) -> Self {
        Self {
            key,
            value,
            metadata,
        }
    }
}

/// Resolve a possibly negative index against `size`.
///
/// `-1` is the last element. Fails with OutOfRange when the index does not
/// name an existing element.
pub fn normalize_index(index: i64, size: usize) -> Result<usize> {
    let out_of_range = || HubError::OutOfRange { index, size };

    if index < 0 {
        let magnitude = usize::try_from(index.unsigned_abs()).map_err(|_| out_of_range())?;
        if magnitude > size {
            return Err(out_of_range());
        }
        Ok(size - magnitude)
    } else {
        let index = usize::try_from(index).map_err(|_| out_of_range())?;
        if index >= size {
            return Err(out_of_range());
        }
        Ok(index)
    }
}

/// Clamp a query position into `0..=size`
pub fn normalize_for_query(index: i64, size: usize) -> usize {
    if size == 0 {
        return 0;
    }
    if index < 0 {
        let magnitude = usize::try_from(index.unsigned_abs()).unwrap_or(usize::MAX);
        size.saturating_sub(magnitude)
    } else {
        usize::try_from(index).unwrap_or(usize::MAX).min(size)
    }
}

/// Resolve `[start, end)` for a query. `end == 0` means through the end and
/// a start past the end collapses to an empty range.
pub fn normalize_query_limits(start: i64, end: i64, size: usize) -> (usize, usize) {
    let end = if end == 0 {
        size
    } else {
        normalize_for_query(end, size)
    };
    let start = normalize_for_query(start, size).min(end);
    (start, end)
}

// =============================================================================
// Result Set
// =============================================================================

/// Materialized query result with a movable cursor.
///
/// Detached from the storage it came from: later writes never affect it.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    records: Vec<Record>,
    position: usize,
}

impl ResultSet {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            position: 0,
        }
    }

    /// Record under the cursor, None once past the end
    pub fn get_record(&self) -> Option<&Record> {
        self.records.get(self.position)
    }

    /// Advance the cursor. Returns false if it was already at the end.
    pub fn move_next(&mut self) -> bool {
        if self.at_end() {
            return false;
        }
        self.position += 1;
        true
    }

    /// Step the cursor back. Returns false if it was at the beginning.
    pub fn move_previous(&mut self) -> bool {
        if self.at_begin() {
            return false;
        }
        self.position -= 1;
        true
    }

    pub fn at_begin(&self) -> bool {
        self.position == 0
    }

    pub fn at_end(&self) -> bool {
        self.position >= self.records.len()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

impl IntoIterator for ResultSet {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
