//! Log Store
//!
//! Tables of ordered rows over a `PagedFile`. Every mutation appends one
//! `LogRecord` to the table's block chain and then applies the same fold
//! replay uses, so the in-memory rows always equal a replay of the log.

use std::collections::BTreeMap;
use std::path::Path;

use crate::config::LogStoreOptions;
use crate::error::{HubError, Result};

use super::format::{
    checksum, slots_per_block, BlockHeader, FieldDescriptor, FileHeader, LogRecord, Operation,
    BLOCK_HEADER_SIZE, FILE_HEADER_SIZE, FILL_BYTE, LOG_RECORD_SIZE,
};
use super::paged_file::PagedFile;
use super::replay::{self, ReplayStats};

// =============================================================================
// Rows and Tables
// =============================================================================

/// In-memory state of one record: where its current payloads live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Row {
    pub key: FieldDescriptor,
    pub value: FieldDescriptor,
    pub metadata: FieldDescriptor,
    pub record_id: u32,
}

impl Row {
    fn from_record(record: &LogRecord) -> Self {
        Self {
            key: record.key,
            value: record.value,
            metadata: record.metadata,
            record_id: record.record_id,
        }
    }
}

/// Payload bytes of one row. Absent fields are None.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
    pub metadata: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub(super) struct Table {
    pub head_offset: u32,
    pub tail_offset: u32,
    pub tail: BlockHeader,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(head_offset: u32, head: BlockHeader) -> Self {
        Self {
            head_offset,
            tail_offset: head_offset,
            tail: head,
            rows: Vec::new(),
        }
    }
}

/// Fold one record into `rows`. Shared by the write path and replay.
pub(super) fn apply(rows: &mut Vec<Row>, record: &LogRecord) -> Result<()> {
    let index = record.record_index as usize;
    let invalid = |size| HubError::InvalidIndex { index, size };

    match record.operation {
        Operation::Append => rows.push(Row::from_record(record)),
        Operation::Insert => {
            if index > rows.len() {
                return Err(invalid(rows.len()));
            }
            rows.insert(index, Row::from_record(record));
        }
        Operation::Set => {
            let size = rows.len();
            let row = rows.get_mut(index).ok_or_else(|| invalid(size))?;
            if record.key.is_present() {
                row.key = record.key;
            }
            if record.value.is_present() {
                row.value = record.value;
            }
            if record.metadata.is_present() {
                row.metadata = record.metadata;
            }
            row.record_id = record.record_id;
        }
        Operation::Delete => {
            if index >= rows.len() {
                return Err(invalid(rows.len()));
            }
            rows.remove(index);
        }
        Operation::Clear => rows.clear(),
    }

    Ok(())
}

// =============================================================================
// Low-level Log I/O
// =============================================================================

/// One field of a record about to be logged
#[derive(Debug, Clone, Copy)]
pub(super) enum Field<'a> {
    Absent,
    Write(&'a [u8]),
    Keep(FieldDescriptor),
}

impl<'a> From<Option<&'a [u8]>> for Field<'a> {
    fn from(data: Option<&'a [u8]>) -> Self {
        match data {
            Some(bytes) if !bytes.is_empty() => Field::Write(bytes),
            _ => Field::Absent,
        }
    }
}

/// File plus the append cursors shared by every table
pub(super) struct LogIo {
    pub file: PagedFile,
    pub block_size: u32,
    pub next_data_offset: u64,
    pub last_record_id: u32,
}

impl LogIo {
    pub fn read_block_header(&mut self, offset: u32) -> Result<BlockHeader> {
        let mut buf = [0u8; BLOCK_HEADER_SIZE];
        self.file.read(offset as u64, &mut buf)?;
        BlockHeader::decode(&buf)
    }

    pub fn read_record(&mut self, block_offset: u32, slot: usize) -> Result<LogRecord> {
        let mut buf = [0u8; LOG_RECORD_SIZE];
        self.file.read(slot_offset(block_offset, slot), &mut buf)?;
        LogRecord::decode(&buf)
    }

    pub fn read_field(&mut self, field: &FieldDescriptor) -> Result<Option<Vec<u8>>> {
        if !field.is_present() {
            return Ok(None);
        }
        self.file
            .read_vec(field.offset as u64, field.size as usize)
            .map(Some)
    }

    /// Reserve `len` bytes at the end of the data region
    fn reserve(&mut self, len: usize) -> Result<u32> {
        let offset = self.next_data_offset;
        let end = offset + len as u64;
        if end > u32::MAX as u64 {
            return Err(HubError::NotSupported("log file larger than 4 GiB"));
        }
        self.file.ensure_size(end)?;
        self.next_data_offset = end;
        Ok(offset as u32)
    }

    fn write_payload(&mut self, data: &[u8]) -> Result<FieldDescriptor> {
        let offset = self.reserve(data.len())?;
        self.file.write(offset as u64, data)?;
        Ok(FieldDescriptor {
            offset,
            size: data.len() as u32,
            checksum: checksum(data),
        })
    }

    fn resolve(&mut self, field: Field<'_>) -> Result<FieldDescriptor> {
        match field {
            Field::Absent => Ok(FieldDescriptor::default()),
            Field::Write(data) => self.write_payload(data),
            Field::Keep(desc) => Ok(desc),
        }
    }

    /// Make sure the table's tail block has a free slot
    fn ensure_room(&mut self, table: &mut Table) -> Result<()> {
        if (table.tail.used_count as usize) < slots_per_block(table.tail.size) {
            return Ok(());
        }

        // The new header is written before the old tail links to it, the
        // reverse of linking first: a torn allocation leaves an unreferenced
        // block, never a link to unwritten bytes
        let block_offset = self.reserve(self.block_size as usize)?;
        let header = BlockHeader::empty(self.block_size);
        self.file.write(block_offset as u64, &header.encode())?;

        table.tail.next_block_offset = block_offset;
        self.file
            .write(table.tail_offset as u64, &table.tail.encode())?;

        tracing::debug!(
            block_offset,
            previous = table.tail_offset,
            "allocated log block"
        );

        table.tail_offset = block_offset;
        table.tail = header;
        Ok(())
    }

    /// Append one record to `table` and fold it into the rows
    pub fn log(
        &mut self,
        table: &mut Table,
        operation: Operation,
        index: usize,
        fields: [Field<'_>; 3],
    ) -> Result<LogRecord> {
        // Step 1: room for one more slot
        self.ensure_room(table)?;

        // Step 2: payloads into the data region
        let [key, value, metadata] = fields;
        let key = self.resolve(key)?;
        let value = self.resolve(value)?;
        let metadata = self.resolve(metadata)?;

        // Step 3: the record itself
        let record = LogRecord {
            operation,
            record_index: index as u32,
            record_id: self.last_record_id.wrapping_add(1),
            key,
            value,
            metadata,
        };
        let slot = table.tail.used_count as usize;
        self.file
            .write(slot_offset(table.tail_offset, slot), &record.encode())?;

        // Step 4: publish the slot
        table.tail.used_count += 1;
        self.file
            .write(table.tail_offset as u64, &table.tail.encode())?;
        self.last_record_id = record.record_id;

        // Step 5: same fold as replay
        apply(&mut table.rows, &record)?;
        Ok(record)
    }

    /// Find the first row at or after `start` whose key equals `key`
    pub fn find_key(&mut self, rows: &[Row], start: usize, key: &[u8]) -> Result<Option<usize>> {
        let wanted = checksum(key);
        for (index, row) in rows.iter().enumerate().skip(start) {
            if row.key.size as usize != key.len() || row.key.checksum != wanted {
                continue;
            }
            // Checksums collide easily, compare the bytes
            if self.read_field(&row.key)?.as_deref() == Some(key) {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    pub fn read_row(&mut self, row: &Row) -> Result<RawRecord> {
        Ok(RawRecord {
            key: self.read_field(&row.key)?,
            value: self.read_field(&row.value)?,
            metadata: self.read_field(&row.metadata)?,
        })
    }
}

fn slot_offset(block_offset: u32, slot: usize) -> u64 {
    block_offset as u64 + (BLOCK_HEADER_SIZE + slot * LOG_RECORD_SIZE) as u64
}

fn table_mut<'a>(tables: &'a mut BTreeMap<String, Table>, name: &str) -> Result<&'a mut Table> {
    tables
        .get_mut(name)
        .ok_or_else(|| HubError::NotFound(format!("table '{}'", name)))
}

fn table_ref<'a>(tables: &'a BTreeMap<String, Table>, name: &str) -> Result<&'a Table> {
    tables
        .get(name)
        .ok_or_else(|| HubError::NotFound(format!("table '{}'", name)))
}

fn check_index(index: usize, size: usize) -> Result<()> {
    if index >= size {
        return Err(HubError::InvalidIndex { index, size });
    }
    Ok(())
}

// =============================================================================
// Log Store
// =============================================================================

/// Log-structured database over a single file
pub struct LogStore {
    io: LogIo,
    meta: Table,
    tables: BTreeMap<String, Table>,
    stats: ReplayStats,
}

impl LogStore {
    /// Open or create the log at `path` and replay it
    pub fn open(path: &Path, options: LogStoreOptions) -> Result<Self> {
        if slots_per_block(options.block_size) == 0 {
            return Err(HubError::InvalidArgument(format!(
                "block size {} cannot hold a record",
                options.block_size
            )));
        }

        let file = PagedFile::open(
            path,
            options.page_size,
            options.cache_size,
            options.grow_step,
            options.sync_strategy,
        )?;
        let mut io = LogIo {
            file,
            block_size: options.block_size,
            next_data_offset: (FILE_HEADER_SIZE + options.block_size as usize) as u64,
            last_record_id: 0,
        };

        if io.file.file_size() < FILE_HEADER_SIZE as u64 {
            Self::initialize(&mut io)?;
        }

        let mut header = [0u8; FILE_HEADER_SIZE];
        io.file.read(0, &mut header)?;
        let header = FileHeader::decode(&header)?;

        let (meta, tables, stats) = replay::replay(&mut io, header.meta_table_offset)?;
        tracing::info!(
            path = %path.display(),
            tables = stats.tables,
            records = stats.records_replayed,
            truncated = stats.tables_truncated,
            "log replay complete"
        );

        Ok(Self {
            io,
            meta,
            tables,
            stats,
        })
    }

    /// Lay out a fresh file: grow, meta block, then the file header last
    fn initialize(io: &mut LogIo) -> Result<()> {
        let meta_offset = FILE_HEADER_SIZE as u64;
        io.file.ensure_size(meta_offset + io.block_size as u64)?;
        io.file
            .write(meta_offset, &BlockHeader::empty(io.block_size).encode())?;
        io.file.write(0, &FileHeader::new().encode())?;
        tracing::debug!(path = %io.file.path().display(), "initialized log file");
        Ok(())
    }

    pub fn replay_stats(&self) -> ReplayStats {
        self.stats
    }

    pub fn sync(&mut self) -> Result<()> {
        self.io.file.sync()
    }

    // =========================================================================
    // Table Management
    // =========================================================================

    /// Create `name` if it does not exist yet
    pub fn create_table(&mut self, name: &str) -> Result<()> {
        if self.tables.contains_key(name) {
            return Ok(());
        }
        if name.is_empty() {
            return Err(HubError::InvalidArgument("table name is empty".into()));
        }

        // The meta row's value payload is the table's first block
        let block_size = self.io.block_size;
        let mut block = vec![FILL_BYTE; block_size as usize];
        block[..BLOCK_HEADER_SIZE].copy_from_slice(&BlockHeader::empty(block_size).encode());

        let index = self.meta.rows.len();
        let record = self.io.log(
            &mut self.meta,
            Operation::Append,
            index,
            [Field::Write(name.as_bytes()), Field::Write(&block), Field::Absent],
        )?;

        let head_offset = record.value.offset;
        self.tables.insert(
            name.to_string(),
            Table::new(head_offset, BlockHeader::empty(block_size)),
        );
        tracing::debug!(table = name, head_offset, "created table");
        Ok(())
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Open an existing table, failing with NotFound if it was never created
    pub fn open_table(&self, name: &str) -> Result<()> {
        table_ref(&self.tables, name).map(|_| ())
    }

    /// Remove `name` from the meta table. Its blocks are abandoned.
    pub fn delete_table(&mut self, name: &str) -> Result<()> {
        if !self.tables.contains_key(name) {
            return Err(HubError::NotFound(format!("table '{}'", name)));
        }

        let index = self
            .io
            .find_key(&self.meta.rows, 0, name.as_bytes())?
            .ok_or_else(|| HubError::Corrupt(format!("table '{}' missing from meta", name)))?;
        self.io.log(
            &mut self.meta,
            Operation::Delete,
            index,
            [Field::Absent, Field::Absent, Field::Absent],
        )?;
        self.tables.remove(name);
        tracing::debug!(table = name, "deleted table");
        Ok(())
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn record_count(&self, table: &str) -> Result<usize> {
        Ok(table_ref(&self.tables, table)?.rows.len())
    }

    /// Offset of the first block of `table`
    pub fn table_head_offset(&self, table: &str) -> Result<u32> {
        Ok(table_ref(&self.tables, table)?.head_offset)
    }

    /// Current in-memory rows of `table`
    pub fn rows(&self, table: &str) -> Result<&[Row]> {
        Ok(&table_ref(&self.tables, table)?.rows)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Append a row, returning its index
    pub fn append(
        &mut self,
        table: &str,
        key: Option<&[u8]>,
        value: &[u8],
        metadata: Option<&[u8]>,
    ) -> Result<usize> {
        let table = table_mut(&mut self.tables, table)?;
        let index = table.rows.len();
        self.io.log(
            table,
            Operation::Append,
            index,
            [key.into(), Field::Write(value), metadata.into()],
        )?;
        Ok(index)
    }

    /// Insert a row before `index`. `index == len` appends.
    pub fn insert_at(
        &mut self,
        table: &str,
        index: usize,
        value: &[u8],
        metadata: Option<&[u8]>,
    ) -> Result<usize> {
        let table = table_mut(&mut self.tables, table)?;
        if index > table.rows.len() {
            return Err(HubError::InvalidIndex {
                index,
                size: table.rows.len(),
            });
        }
        self.io.log(
            table,
            Operation::Insert,
            index,
            [Field::Absent, Field::Write(value), metadata.into()],
        )?;
        Ok(index)
    }

    /// Overwrite the given fields of row `index`. Omitted fields keep their
    /// current payload, reusing the previous descriptor.
    pub fn set_by_index(
        &mut self,
        table: &str,
        index: usize,
        key: Option<&[u8]>,
        value: Option<&[u8]>,
        metadata: Option<&[u8]>,
    ) -> Result<()> {
        let table = table_mut(&mut self.tables, table)?;
        check_index(index, table.rows.len())?;
        let current = table.rows[index];

        fn pick(data: Option<&[u8]>, prev: FieldDescriptor) -> Field<'_> {
            match data {
                Some(bytes) if !bytes.is_empty() => Field::Write(bytes),
                _ => Field::Keep(prev),
            }
        }
        let fields = [
            pick(key, current.key),
            pick(value, current.value),
            pick(metadata, current.metadata),
        ];

        self.io.log(table, Operation::Set, index, fields)?;
        Ok(())
    }

    /// Set the row holding `key`, appending one if none does
    pub fn set(
        &mut self,
        table: &str,
        key: &[u8],
        value: &[u8],
        metadata: Option<&[u8]>,
    ) -> Result<usize> {
        match self.find_key(table, 0, key)? {
            Some(index) => {
                self.set_by_index(table, index, None, Some(value), metadata)?;
                Ok(index)
            }
            None => self.append(table, Some(key), value, metadata),
        }
    }

    pub fn delete_by_index(&mut self, table: &str, index: usize) -> Result<()> {
        let table = table_mut(&mut self.tables, table)?;
        check_index(index, table.rows.len())?;
        self.io.log(
            table,
            Operation::Delete,
            index,
            [Field::Absent, Field::Absent, Field::Absent],
        )?;
        Ok(())
    }

    /// Delete the row holding `key`, returning the index it had
    pub fn delete(&mut self, table: &str, key: &[u8]) -> Result<usize> {
        let index = self
            .find_key(table, 0, key)?
            .ok_or(HubError::KeyNotFound)?;
        self.delete_by_index(table, index)?;
        Ok(index)
    }

    pub fn clear(&mut self, table: &str) -> Result<()> {
        let table = table_mut(&mut self.tables, table)?;
        self.io.log(
            table,
            Operation::Clear,
            0,
            [Field::Absent, Field::Absent, Field::Absent],
        )?;
        Ok(())
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub fn find_key(&mut self, table: &str, start_index: usize, key: &[u8]) -> Result<Option<usize>> {
        let table = table_ref(&self.tables, table)?;
        self.io.find_key(&table.rows, start_index, key)
    }

    pub fn get_by_index(&mut self, table: &str, index: usize) -> Result<RawRecord> {
        let table = table_ref(&self.tables, table)?;
        check_index(index, table.rows.len())?;
        self.io.read_row(&table.rows[index])
    }

    /// Row holding `key` and its index
    pub fn get(&mut self, table: &str, key: &[u8]) -> Result<(usize, RawRecord)> {
        let index = self
            .find_key(table, 0, key)?
            .ok_or(HubError::KeyNotFound)?;
        Ok((index, self.get_by_index(table, index)?))
    }

    /// Every record persisted for `table`, in chain order
    pub fn log_records(&mut self, table: &str) -> Result<Vec<LogRecord>> {
        let head = table_ref(&self.tables, table)?.head_offset;
        let mut records = Vec::new();
        let mut offset = head;
        while offset != 0 {
            let header = self.io.read_block_header(offset)?;
            for slot in 0..header.used_count as usize {
                records.push(self.io.read_record(offset, slot)?);
            }
            offset = header.next_block_offset;
        }
        Ok(records)
    }
}
