//! Paged File
//!
//! Byte-addressable access to a raw file through a bounded page cache.
//! Eviction is FIFO by load order; a page is never promoted on access.
//! Writes go straight to the file and refresh the cached copy when present.

use std::collections::{HashMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::SyncStrategy;
use crate::error::{HubError, Result};

use super::format::FILL_BYTE;

/// Page-cached random access file
pub struct PagedFile {
    path: PathBuf,
    file: File,
    file_size: u64,

    page_size: usize,
    max_pages: usize,
    pages: HashMap<u64, Vec<u8>>,
    /// Page numbers in load order, oldest first
    load_order: VecDeque<u64>,

    grow_step: usize,
    sync_strategy: SyncStrategy,
    writes_since_sync: usize,
}

impl PagedFile {
    /// Open `path`, creating an empty file if it does not exist
    pub fn open(
        path: &Path,
        page_size: usize,
        cache_size: usize,
        grow_step: usize,
        sync_strategy: SyncStrategy,
    ) -> Result<Self> {
        if page_size == 0 {
            return Err(HubError::InvalidArgument("page size must be non-zero".into()));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let file_size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            file_size,
            page_size,
            max_pages: (cache_size / page_size).max(1),
            pages: HashMap::new(),
            load_order: VecDeque::new(),
            grow_step,
            sync_strategy,
            writes_since_sync: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of pages currently cached
    pub fn cached_pages(&self) -> usize {
        self.pages.len()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Fill `buf` with the bytes at `offset`
    pub fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.check_bounds(offset, buf.len())?;

        let page_size = self.page_size as u64;
        let mut done = 0usize;
        while done < buf.len() {
            let pos = offset + done as u64;
            let page_no = pos / page_size;
            let in_page = (pos % page_size) as usize;
            let chunk = (self.page_size - in_page).min(buf.len() - done);

            let page = self.page(page_no)?;
            buf[done..done + chunk].copy_from_slice(&page[in_page..in_page + chunk]);
            done += chunk;
        }

        Ok(())
    }

    /// Read `len` bytes at `offset` into a new buffer
    pub fn read_vec(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read(offset, &mut buf)?;
        Ok(buf)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Write `data` at `offset`. The range must lie inside the file.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.check_bounds(offset, data.len())?;

        let page_size = self.page_size as u64;
        let mut done = 0usize;
        while done < data.len() {
            let pos = offset + done as u64;
            let page_no = pos / page_size;
            let in_page = (pos % page_size) as usize;
            let chunk = (self.page_size - in_page).min(data.len() - done);

            if let Some(page) = self.pages.get_mut(&page_no) {
                page[in_page..in_page + chunk].copy_from_slice(&data[done..done + chunk]);
            }
            self.file.seek(SeekFrom::Start(pos))?;
            self.file.write_all(&data[done..done + chunk])?;
            done += chunk;
        }

        self.writes_since_sync += 1;
        let due = match self.sync_strategy {
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNWrites { count } => self.writes_since_sync >= count.max(1),
        };
        if due {
            self.sync()?;
        }

        Ok(())
    }

    /// Extend the file by at least `extra_pages` pages, never less than the
    /// configured growth step. New space is filled with the sentinel byte.
    pub fn grow(&mut self, extra_pages: usize) -> Result<()> {
        let step_pages = self.grow_step.div_ceil(self.page_size);
        let pages = extra_pages.max(step_pages).max(1);
        let old_size = self.file_size;
        let new_size = old_size + (pages * self.page_size) as u64;

        tracing::debug!(
            path = %self.path.display(),
            old_size,
            new_size,
            "growing paged file"
        );

        // A partially filled last page may be cached with stale padding
        let last_page = old_size / self.page_size as u64;
        if self.pages.remove(&last_page).is_some() {
            self.load_order.retain(|p| *p != last_page);
        }

        self.file.set_len(new_size)?;
        self.file.seek(SeekFrom::Start(old_size))?;
        let fill = vec![FILL_BYTE; self.page_size];
        let mut remaining = (new_size - old_size) as usize;
        while remaining > 0 {
            let n = remaining.min(fill.len());
            self.file.write_all(&fill[..n])?;
            remaining -= n;
        }
        self.file.sync_all()?;
        self.file_size = new_size;

        Ok(())
    }

    /// Grow until the file is at least `size` bytes long
    pub fn ensure_size(&mut self, size: u64) -> Result<()> {
        if size <= self.file_size {
            return Ok(());
        }
        let missing = (size - self.file_size) as usize;
        self.grow(missing.div_ceil(self.page_size))
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        self.writes_since_sync = 0;
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn check_bounds(&self, offset: u64, len: usize) -> Result<()> {
        let end = offset.checked_add(len as u64);
        match end {
            Some(end) if end <= self.file_size => Ok(()),
            _ => Err(HubError::Corrupt(format!(
                "access of {} bytes at offset {} past end of file ({} bytes)",
                len, offset, self.file_size
            ))),
        }
    }

    /// Cached page, loading it (and evicting the oldest page) on a miss
    fn page(&mut self, page_no: u64) -> Result<&Vec<u8>> {
        if !self.pages.contains_key(&page_no) {
            let mut data = vec![0u8; self.page_size];
            let start = page_no * self.page_size as u64;
            let available = (self.file_size.saturating_sub(start) as usize).min(self.page_size);

            self.file.seek(SeekFrom::Start(start))?;
            self.file.read_exact(&mut data[..available])?;

            if self.pages.len() >= self.max_pages {
                if let Some(oldest) = self.load_order.pop_front() {
                    self.pages.remove(&oldest);
                }
            }
            self.pages.insert(page_no, data);
            self.load_order.push_back(page_no);
        }

        self.pages
            .get(&page_no)
            .ok_or_else(|| HubError::Corrupt(format!("page {} missing from cache", page_no)))
    }
}
