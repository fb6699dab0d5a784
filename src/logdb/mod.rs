//! Log Database
//!
//! Append-only, log-structured table storage in a single file. Tables are
//! chains of fixed-size blocks holding `LogRecord`s; payloads live in a data
//! region that only ever grows. Current state is rebuilt by replay on open.
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ File Header (16 bytes)                                       │
//! │   Magic "LDB*" | Version: 1 | Flags: 0 | MetaTableOffset: 16 │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Meta Table Block (block_size bytes)                          │
//! │   Size | UsedCount | NextBlockOffset   (12 bytes)            │
//! │   LogRecord slots (48 bytes each)                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Data Region (grows, never rewritten)                         │
//! │   field payloads, table head blocks, chained blocks          │
//! └──────────────────────────────────────────────────────────────┘
//!
//! LogRecord: Operation | RecordIndex | RecordId |
//!            KeyField | ValueField | MetadataField
//! Field:     Offset | Size | Checksum   (all zero = absent)
//! ```
//!
//! All integers are little-endian u32. A meta table row maps a table name
//! (key) to that table's first block, stored as the row's value payload.

mod format;
mod paged_file;
mod replay;
mod store;

pub use format::{
    checksum, slots_per_block, BlockHeader, FieldDescriptor, FileHeader, LogRecord, Operation,
};
pub use paged_file::PagedFile;
pub use replay::ReplayStats;
pub use store::{LogStore, RawRecord, Row};
