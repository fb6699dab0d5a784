//! Fixed-layout on-disk structures
//!
//! Every struct here has an `encode`/`decode` pair over little-endian u32
//! words. Nothing is ever cast from raw bytes.

use crate::error::{HubError, Result};

/// "LDB*" read as a little-endian u32
pub(crate) const MAGIC: u32 = u32::from_le_bytes(*b"LDB*");

/// Current log file format version
pub(crate) const VERSION: u32 = 1;

/// Magic (4) + Version (4) + Flags (4) + MetaTableOffset (4)
pub(crate) const FILE_HEADER_SIZE: usize = 16;

/// Size (4) + UsedCount (4) + NextBlockOffset (4)
pub(crate) const BLOCK_HEADER_SIZE: usize = 12;

/// Offset (4) + Size (4) + Checksum (4)
pub(crate) const FIELD_SIZE: usize = 12;

/// Operation (4) + Index (4) + RecordId (4) + three fields
pub(crate) const LOG_RECORD_SIZE: usize = 12 + 3 * FIELD_SIZE;

/// Byte written into freshly grown file space
pub(crate) const FILL_BYTE: u8 = 0xEE;

/// Seed of the running XOR checksum
const CHECKSUM_SEED: u8 = 2;

/// Running XOR over `data`, used only to skip obvious non-matches
pub fn checksum(data: &[u8]) -> u32 {
    data.iter().fold(CHECKSUM_SEED, |acc, b| acc ^ b) as u32
}

/// Number of record slots in a block of `block_size` bytes
pub fn slots_per_block(block_size: u32) -> usize {
    (block_size as usize).saturating_sub(BLOCK_HEADER_SIZE) / LOG_RECORD_SIZE
}

fn read_u32(buf: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]])
}

fn write_u32(buf: &mut [u8], pos: usize, v: u32) {
    buf[pos..pos + 4].copy_from_slice(&v.to_le_bytes());
}

fn check_len(buf: &[u8], needed: usize, what: &str) -> Result<()> {
    if buf.len() < needed {
        return Err(HubError::Corrupt(format!(
            "{} needs {} bytes, got {}",
            what,
            needed,
            buf.len()
        )));
    }
    Ok(())
}

// =============================================================================
// File Header
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub magic: u32,
    pub version: u32,
    pub flags: u32,
    pub meta_table_offset: u32,
}

impl FileHeader {
    pub fn new() -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            flags: 0,
            meta_table_offset: FILE_HEADER_SIZE as u32,
        }
    }

    pub fn encode(&self) -> [u8; FILE_HEADER_SIZE] {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        write_u32(&mut buf, 0, self.magic);
        write_u32(&mut buf, 4, self.version);
        write_u32(&mut buf, 8, self.flags);
        write_u32(&mut buf, 12, self.meta_table_offset);
        buf
    }

    /// Decode and validate magic and version
    pub fn decode(buf: &[u8]) -> Result<Self> {
        check_len(buf, FILE_HEADER_SIZE, "file header")?;
        let header = Self {
            magic: read_u32(buf, 0),
            version: read_u32(buf, 4),
            flags: read_u32(buf, 8),
            meta_table_offset: read_u32(buf, 12),
        };

        if header.magic != MAGIC {
            return Err(HubError::Corrupt(format!(
                "invalid magic: expected {:#x}, got {:#x}",
                MAGIC, header.magic
            )));
        }
        if header.version != VERSION {
            return Err(HubError::Corrupt(format!(
                "unsupported format version: {}",
                header.version
            )));
        }

        Ok(header)
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Block Header
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub size: u32,
    pub used_count: u32,
    pub next_block_offset: u32,
}

impl BlockHeader {
    pub fn empty(size: u32) -> Self {
        Self {
            size,
            used_count: 0,
            next_block_offset: 0,
        }
    }

    pub fn encode(&self) -> [u8; BLOCK_HEADER_SIZE] {
        let mut buf = [0u8; BLOCK_HEADER_SIZE];
        write_u32(&mut buf, 0, self.size);
        write_u32(&mut buf, 4, self.used_count);
        write_u32(&mut buf, 8, self.next_block_offset);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        check_len(buf, BLOCK_HEADER_SIZE, "block header")?;
        Ok(Self {
            size: read_u32(buf, 0),
            used_count: read_u32(buf, 4),
            next_block_offset: read_u32(buf, 8),
        })
    }
}

// =============================================================================
// Field Descriptor
// =============================================================================

/// Location of one payload in the data region. All zeros means absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub offset: u32,
    pub size: u32,
    pub checksum: u32,
}

impl FieldDescriptor {
    pub fn is_present(&self) -> bool {
        self.size != 0
    }

    fn encode_into(&self, buf: &mut [u8]) {
        write_u32(buf, 0, self.offset);
        write_u32(buf, 4, self.size);
        write_u32(buf, 8, self.checksum);
    }

    fn decode_from(buf: &[u8]) -> Self {
        Self {
            offset: read_u32(buf, 0),
            size: read_u32(buf, 4),
            checksum: read_u32(buf, 8),
        }
    }
}

// =============================================================================
// Log Record
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Append = 1,
    Insert = 2,
    Set = 3,
    Delete = 4,
    Clear = 5,
}

impl Operation {
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            1 => Some(Operation::Append),
            2 => Some(Operation::Insert),
            3 => Some(Operation::Set),
            4 => Some(Operation::Delete),
            5 => Some(Operation::Clear),
            _ => None,
        }
    }
}

/// One logged mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecord {
    pub operation: Operation,
    pub record_index: u32,
    pub record_id: u32,
    pub key: FieldDescriptor,
    pub value: FieldDescriptor,
    pub metadata: FieldDescriptor,
}

impl LogRecord {
    pub fn encode(&self) -> [u8; LOG_RECORD_SIZE] {
        let mut buf = [0u8; LOG_RECORD_SIZE];
        write_u32(&mut buf, 0, self.operation as u32);
        write_u32(&mut buf, 4, self.record_index);
        write_u32(&mut buf, 8, self.record_id);
        self.key.encode_into(&mut buf[12..24]);
        self.value.encode_into(&mut buf[24..36]);
        self.metadata.encode_into(&mut buf[36..48]);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        check_len(buf, LOG_RECORD_SIZE, "log record")?;
        let code = read_u32(buf, 0);
        let operation = Operation::from_u32(code)
            .ok_or_else(|| HubError::Corrupt(format!("unknown operation code {}", code)))?;

        Ok(Self {
            operation,
            record_index: read_u32(buf, 4),
            record_id: read_u32(buf, 8),
            key: FieldDescriptor::decode_from(&buf[12..24]),
            value: FieldDescriptor::decode_from(&buf[24..36]),
            metadata: FieldDescriptor::decode_from(&buf[36..48]),
        })
    }
}
