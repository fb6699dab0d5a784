//! Configuration for hubstore
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

/// Main configuration for a hubstore instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for the log database file
    /// Internal structure:
    ///   {data_dir}/
    ///     └── hub.logdb        (log-structured database)
    pub data_dir: PathBuf,

    /// File name of the log database inside `data_dir`
    pub log_file_name: String,

    // -------------------------------------------------------------------------
    // Paged File Configuration
    // -------------------------------------------------------------------------
    /// Size of one cached page (in bytes)
    pub page_size: usize,

    /// Total bytes kept in the page cache
    pub cache_size: usize,

    /// Minimum number of bytes added whenever the file grows
    pub grow_step: usize,

    // -------------------------------------------------------------------------
    // Log Configuration
    // -------------------------------------------------------------------------
    /// Size of one log block (header + record slots)
    pub block_size: u32,

    /// How often to fdatasync the log file
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Filesystem Containers
    // -------------------------------------------------------------------------
    /// Root for `filesystem_map` containers. None disables the type.
    pub filesystem_root: Option<PathBuf>,

    /// Largest file a directory container will read (in bytes)
    pub max_file_size: u64,
}

/// Log sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fdatasync after every write (safest, slowest)
    EveryWrite,

    /// fdatasync after N writes
    EveryNWrites { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./hubstore_data"),
            log_file_name: "hub.logdb".to_string(),
            page_size: 4096,
            cache_size: 4 * 1024 * 1024, // 4 MB
            grow_step: 4 * 1024 * 1024,  // 4 MB
            block_size: 4096,
            sync_strategy: SyncStrategy::EveryWrite,
            filesystem_root: None,
            max_file_size: 16 * 1024 * 1024, // 16 MB
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Full path of the log database file
    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join(&self.log_file_name)
    }

    /// Options for opening a `LogStore` with this configuration
    pub fn log_store_options(&self) -> LogStoreOptions {
        LogStoreOptions {
            page_size: self.page_size,
            cache_size: self.cache_size,
            grow_step: self.grow_step,
            block_size: self.block_size,
            sync_strategy: self.sync_strategy,
        }
    }
}

/// The subset of `Config` a `LogStore` needs
#[derive(Debug, Clone, Copy)]
pub struct LogStoreOptions {
    pub page_size: usize,
    pub cache_size: usize,
    pub grow_step: usize,
    pub block_size: u32,
    pub sync_strategy: SyncStrategy,
}

impl Default for LogStoreOptions {
    fn default() -> Self {
        Config::default().log_store_options()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for the log file)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the log database file name
    pub fn log_file_name(mut self, name: impl Into<String>) -> Self {
        self.config.log_file_name = name.into();
        self
    }

    /// Set the page size (in bytes)
    pub fn page_size(mut self, size: usize) -> Self {
        self.config.page_size = size;
        self
    }

    /// Set the page cache size (in bytes)
    pub fn cache_size(mut self, size: usize) -> Self {
        self.config.cache_size = size;
        self
    }

    /// Set the minimum file growth step (in bytes)
    pub fn grow_step(mut self, size: usize) -> Self {
        self.config.grow_step = size;
        self
    }

    /// Set the log block size (in bytes)
    pub fn block_size(mut self, size: u32) -> Self {
        self.config.block_size = size;
        self
    }

    /// Set the log sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Enable `filesystem_map` containers rooted at `path`
    pub fn filesystem_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.filesystem_root = Some(path.into());
        self
    }

    /// Set the largest file directory containers will read
    pub fn max_file_size(mut self, size: u64) -> Self {
        self.config.max_file_size = size;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
