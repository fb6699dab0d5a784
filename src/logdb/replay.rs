//! Log Replay
//!
//! Rebuilds every table's rows by walking block chains from the file:
//! meta table first, then each table the meta table names. Chains of
//! deleted tables are walked too, only to find where written data ends.
//!
//! A slot is trusted only below its block's persisted `used_count`. A table
//! whose chain hits an unreadable block or record keeps the rows folded so
//! far; its tail is trimmed to the last good slot so the next write
//! overwrites the bad one.

use std::collections::{BTreeMap, HashSet};

use crate::error::Result;

use super::format::{slots_per_block, BlockHeader, Operation, BLOCK_HEADER_SIZE};
use super::store::{apply, LogIo, Table};

/// Result of replaying a log file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Number of user tables loaded
    pub tables: usize,
    /// Records folded, meta table included
    pub records_replayed: u64,
    /// Tables whose chain ended at a corrupt block or record
    pub tables_truncated: usize,
}

struct TableReplay {
    table: Table,
    records: u64,
    truncated: bool,
}

pub(super) fn replay(
    io: &mut LogIo,
    meta_offset: u32,
) -> Result<(Table, BTreeMap<String, Table>, ReplayStats)> {
    let mut stats = ReplayStats::default();

    let mut created = Vec::new();
    let meta = replay_table(io, meta_offset, "__meta__", Some(&mut created));
    stats.records_replayed += meta.records;
    if meta.truncated {
        stats.tables_truncated += 1;
    }
    let meta = meta.table;

    let mut tables = BTreeMap::new();
    for row in &meta.rows {
        let name = match io.read_field(&row.key) {
            Ok(Some(bytes)) => match String::from_utf8(bytes) {
                Ok(name) => name,
                Err(_) => {
                    tracing::warn!(offset = row.key.offset, "skipping table with non-UTF-8 name");
                    continue;
                }
            },
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable table name");
                continue;
            }
        };

        track_end(io, row.key.offset as u64 + row.key.size as u64);
        track_end(io, row.value.offset as u64 + row.value.size as u64);

        let replayed = replay_table(io, row.value.offset, &name, None);
        stats.records_replayed += replayed.records;
        if replayed.truncated {
            stats.tables_truncated += 1;
        }
        tables.insert(name, replayed.table);
    }
    stats.tables = tables.len();

    // Deleted tables no longer have a meta row, but their blocks and
    // payloads still occupy the data region
    let live: HashSet<u32> = tables.values().map(|t| t.head_offset).collect();
    for head in created.into_iter().filter(|head| !live.contains(head)) {
        let retired = replay_table(io, head, "(deleted)", None);
        tracing::debug!(head, records = retired.records, "walked deleted table chain");
    }

    Ok((meta, tables, stats))
}

fn track_end(io: &mut LogIo, end: u64) {
    if end > io.next_data_offset {
        io.next_data_offset = end;
    }
}

/// Fold one chain. With `created`, the head offset of every table a meta
/// Append record created is collected.
fn replay_table(
    io: &mut LogIo,
    head_offset: u32,
    name: &str,
    mut created: Option<&mut Vec<u32>>,
) -> TableReplay {
    let mut table = Table::new(head_offset, BlockHeader::empty(io.block_size));
    let mut records = 0u64;
    let mut visited = HashSet::new();
    let mut offset = head_offset;

    let truncated = loop {
        if !visited.insert(offset) {
            tracing::warn!(table = name, offset, "block chain loops, stopping replay");
            break true;
        }

        let header = match io.read_block_header(offset) {
            Ok(h) if valid_header(&h) => h,
            Ok(h) => {
                tracing::warn!(table = name, offset, ?h, "invalid block header, stopping replay");
                break true;
            }
            Err(e) => {
                tracing::warn!(table = name, offset, error = %e, "unreadable block, stopping replay");
                break true;
            }
        };

        table.tail_offset = offset;
        table.tail = header;
        track_end(io, offset as u64 + header.size as u64);

        let mut bad_slot = None;
        for slot in 0..header.used_count as usize {
            let folded = io.read_record(offset, slot).and_then(|record| {
                apply(&mut table.rows, &record)?;
                Ok(record)
            });
            match folded {
                Ok(record) => {
                    records += 1;
                    if record.record_id > io.last_record_id {
                        io.last_record_id = record.record_id;
                    }
                    if let Some(created) = created.as_deref_mut() {
                        if record.operation == Operation::Append && record.value.is_present() {
                            created.push(record.value.offset);
                        }
                    }
                    for field in [record.key, record.value, record.metadata] {
                        if field.is_present() {
                            track_end(io, field.offset as u64 + field.size as u64);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(table = name, offset, slot, error = %e, "bad record, stopping replay");
                    bad_slot = Some(slot);
                    break;
                }
            }
        }

        if let Some(slot) = bad_slot {
            table.tail.used_count = slot as u32;
            table.tail.next_block_offset = 0;
            break true;
        }

        if header.next_block_offset == 0 {
            break false;
        }
        offset = header.next_block_offset;
    };

    if truncated {
        // Writes continue from the last good block
        table.tail.next_block_offset = 0;
    }

    TableReplay {
        table,
        records,
        truncated,
    }
}

fn valid_header(header: &BlockHeader) -> bool {
    header.size as usize >= BLOCK_HEADER_SIZE
        && header.used_count as usize <= slots_per_block(header.size)
}
