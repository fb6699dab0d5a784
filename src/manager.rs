//! Container Manager
//!
//! Resolves container types, creates or opens containers by name and keeps
//! a weak cache of live ones. The type of every container is recorded in
//! the `__meta__/containers` map; the known types are listed in
//! `__meta__/available_types`.
//!
//! | Type              | Storage                      | Lifetime               |
//! |-------------------|------------------------------|------------------------|
//! | `volatile_list`   | in-memory list               | until deleted          |
//! | `volatile_map`    | in-memory map                | until deleted          |
//! | `persistent_list` | log table, list access       | in the log file        |
//! | `persistent_map`  | log table, map access        | in the log file        |
//! | `filesystem_map`  | read-only directory          | on disk, not owned     |

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};

use crate::config::Config;
use crate::container::{Container, SharedStorage, Storage};
use crate::error::{HubError, Result};
use crate::logdb::LogStore;
use crate::storage::{
    Access, DirectoryStorage, LogDbStorage, MemoryList, MemoryMap, PropertyMap, SharedLogStore,
    StorageBackend,
};
use crate::value::Value;

// =============================================================================
// Type Names
// =============================================================================

pub const VOLATILE_LIST: &str = "volatile_list";
pub const VOLATILE_MAP: &str = "volatile_map";
pub const PERSISTENT_LIST: &str = "persistent_list";
pub const PERSISTENT_MAP: &str = "persistent_map";
pub const FILESYSTEM_MAP: &str = "filesystem_map";

/// Map of container name to type name
pub const META_CONTAINERS: &str = "__meta__/containers";

/// List of registered type names
pub const META_AVAILABLE_TYPES: &str = "__meta__/available_types";

/// Log table names: `{type}|data|{name}` and `{type}|properties|{name}`
fn table_name(type_name: &str, part: &str, container: &str) -> String {
    format!("{}|{}|{}", type_name, part, container)
}

// =============================================================================
// Container Manager
// =============================================================================

pub struct ContainerManager {
    config: Config,
    log_store: Option<SharedLogStore>,

    /// Volatile storages outlive their Container handles until deleted
    volatile: Mutex<HashMap<String, SharedStorage>>,

    /// Live containers. Lookup only, never extends a container's lifetime.
    open: Mutex<HashMap<String, Weak<Container>>>,

    /// Held while a name is created or deleted, meta entry included.
    /// Re-entrant so meta sinks on the same thread can call back in.
    registry: ReentrantMutex<()>,

    aliases: Mutex<HashMap<String, String>>,
    types: Vec<&'static str>,

    meta_containers: Arc<Container>,
    meta_types: Arc<Container>,

    next_diff_id: AtomicU64,
}

impl ContainerManager {
    /// Manager with only volatile (and, if configured, filesystem) types
    pub fn in_memory(config: Config) -> Result<Self> {
        Self::build(config, None)
    }

    /// Manager backed by the log file at `config.log_path()`.
    ///
    /// Persistent containers found in the log are registered in the meta
    /// container.
    pub fn open(config: Config) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;
        let store = LogStore::open(&config.log_path(), config.log_store_options())?;
        let store = Arc::new(Mutex::new(store));
        Self::build(config, Some(store))
    }

    fn build(config: Config, log_store: Option<SharedLogStore>) -> Result<Self> {
        let mut types = vec![VOLATILE_LIST, VOLATILE_MAP];
        if log_store.is_some() {
            types.extend([PERSISTENT_LIST, PERSISTENT_MAP]);
        }
        if config.filesystem_root.is_some() {
            types.push(FILESYSTEM_MAP);
        }

        let meta_containers = Arc::new(Container::with_backend(
            META_CONTAINERS,
            VOLATILE_MAP,
            StorageBackend::MemoryMap(MemoryMap::new()),
        ));
        let meta_types = Arc::new(Container::with_backend(
            META_AVAILABLE_TYPES,
            VOLATILE_LIST,
            StorageBackend::MemoryList(MemoryList::new()),
        ));

        let manager = Self {
            config,
            log_store,
            volatile: Mutex::new(HashMap::new()),
            open: Mutex::new(HashMap::new()),
            registry: ReentrantMutex::new(()),
            aliases: Mutex::new(HashMap::new()),
            types,
            meta_containers,
            meta_types,
            next_diff_id: AtomicU64::new(0),
        };
        manager.populate_meta()?;
        Ok(manager)
    }

    fn populate_meta(&self) -> Result<()> {
        for meta in [&self.meta_containers, &self.meta_types] {
            self.open
                .lock()
                .insert(meta.name().to_string(), Arc::downgrade(meta));
            self.meta_containers.set(
                Value::from(meta.name()),
                Value::from(meta.type_name()),
                Value::None,
            )?;
        }

        for type_name in &self.types {
            self.meta_types.push_back(Value::from(*type_name), Value::None)?;
        }

        if let Some(store) = &self.log_store {
            let tables = store.lock().table_names();
            for table in tables {
                let mut parts = table.splitn(3, '|');
                let (Some(type_name), Some("data"), Some(name)) =
                    (parts.next(), parts.next(), parts.next())
                else {
                    continue;
                };
                if type_name != PERSISTENT_LIST && type_name != PERSISTENT_MAP {
                    continue;
                }
                tracing::debug!(container = name, type_name, "found persistent container");
                self.meta_containers
                    .set(Value::from(name), Value::from(type_name), Value::None)?;
            }
        }

        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registered type names
    pub fn available_types(&self) -> &[&'static str] {
        &self.types
    }

    pub fn log_store(&self) -> Option<&SharedLogStore> {
        self.log_store.as_ref()
    }

    pub(crate) fn next_diff_id(&self) -> u64 {
        self.next_diff_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    // =========================================================================
    // Aliases
    // =========================================================================

    pub fn add_alias(&self, alias: impl Into<String>, type_name: impl Into<String>) {
        self.aliases.lock().insert(alias.into(), type_name.into());
    }

    /// Type an alias stands for, or the name itself
    pub fn resolve_alias(&self, type_name: &str) -> String {
        self.aliases
            .lock()
            .get(type_name)
            .cloned()
            .unwrap_or_else(|| type_name.to_string())
    }

    // =========================================================================
    // Containers
    // =========================================================================

    /// Open `name`, creating it with `type_name` if it does not exist.
    ///
    /// An empty `type_name` opens an existing container of any type.
    pub fn create_or_open(&self, type_name: &str, name: &str) -> Result<Arc<Container>> {
        self.get_container(type_name, name, true)
    }

    /// Create `name` with `type_name`, or open it if it already has that type
    pub fn create_container(&self, type_name: &str, name: &str) -> Result<Arc<Container>> {
        if type_name.is_empty() {
            return Err(HubError::InvalidArgument("container type is required".into()));
        }
        self.get_container(type_name, name, true)
    }

    /// Open an existing container. Fails with NotFound if it does not exist.
    pub fn open_container(&self, type_name: &str, name: &str) -> Result<Arc<Container>> {
        self.get_container(type_name, name, false)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.registered_type(name).is_some()
    }

    /// Type `name` was created with
    pub fn container_type(&self, name: &str) -> Result<String> {
        self.registered_type(name)
            .ok_or_else(|| HubError::NotFound(format!("container '{}'", name)))
    }

    /// Drop the container's storage and free the name. A live handle is
    /// detached: its later calls fail with NotFound.
    pub fn delete_container(&self, type_name: &str, name: &str) -> Result<()> {
        if name == META_CONTAINERS || name == META_AVAILABLE_TYPES {
            return Err(HubError::NotSupported("deleting a meta container"));
        }
        let _registry = self.registry.lock();

        let existing = self.container_type(name)?;
        let requested = self.resolve_alias(type_name);
        if !requested.is_empty() && requested != existing {
            return Err(HubError::AlreadyExistsWithDifferentType {
                name: name.to_string(),
                existing,
                requested,
            });
        }

        let live = self.open.lock().remove(name).and_then(|weak| weak.upgrade());
        if let Some(live) = live {
            live.detach();
        }

        match existing.as_str() {
            VOLATILE_LIST | VOLATILE_MAP => {
                self.volatile.lock().remove(name);
            }
            PERSISTENT_LIST | PERSISTENT_MAP => {
                let store = self.require_log_store(&existing)?;
                let mut store = store.lock();
                for part in ["data", "properties"] {
                    let table = table_name(&existing, part, name);
                    if store.has_table(&table) {
                        store.delete_table(&table)?;
                    }
                }
            }
            _ => {}
        }

        self.meta_containers.delete(Value::from(name))?;
        tracing::debug!(container = name, type_name = %existing, "deleted container");
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn registered_type(&self, name: &str) -> Option<String> {
        self.meta_containers
            .get(&Value::from(name))
            .ok()
            .and_then(|record| record.value.as_str().map(str::to_string))
    }

    fn get_container(&self, type_name: &str, name: &str, create: bool) -> Result<Arc<Container>> {
        if name.is_empty() {
            return Err(HubError::InvalidArgument("container name is empty".into()));
        }

        let requested = self.resolve_alias(type_name);
        if !requested.is_empty() && !self.types.iter().any(|t| *t == requested) {
            return Err(HubError::UnknownType(requested));
        }

        let _registry = self.registry.lock();
        let (container, created) = {
            let mut open = self.open.lock();
            let existing = self.registered_type(name);

            let type_name = match (&existing, requested.is_empty()) {
                (Some(existing), false) if *existing != requested => {
                    return Err(HubError::AlreadyExistsWithDifferentType {
                        name: name.to_string(),
                        existing: existing.clone(),
                        requested,
                    });
                }
                (Some(existing), _) => existing.clone(),
                (None, true) => return Err(HubError::NotFound(format!("container '{}'", name))),
                (None, false) if !create => {
                    return Err(HubError::NotFound(format!("container '{}'", name)));
                }
                (None, false) => requested,
            };

            if let Some(live) = open.get(name).and_then(Weak::upgrade) {
                if live.type_name() != type_name {
                    return Err(HubError::AlreadyExistsWithDifferentType {
                        name: name.to_string(),
                        existing: live.type_name().to_string(),
                        requested: type_name,
                    });
                }
                return Ok(live);
            }

            let storage = self.make_storage(&type_name, name)?;
            let container = Arc::new(Container::new(name, type_name.as_str(), storage));
            open.retain(|_, weak| weak.strong_count() > 0);
            open.insert(name.to_string(), Arc::downgrade(&container));
            (container, existing.is_none())
        };

        // Meta sinks may call back into the manager, so the cache lock is
        // released. The registry lock keeps the name reserved until then.
        if created {
            self.meta_containers.set(
                Value::from(name),
                Value::from(container.type_name()),
                Value::None,
            )?;
            tracing::debug!(container = name, type_name = container.type_name(), "created container");
        }

        Ok(container)
    }

    fn make_storage(&self, type_name: &str, name: &str) -> Result<SharedStorage> {
        match type_name {
            VOLATILE_LIST | VOLATILE_MAP => {
                let mut volatile = self.volatile.lock();
                let storage = volatile.entry(name.to_string()).or_insert_with(|| {
                    let backend = if type_name == VOLATILE_LIST {
                        StorageBackend::MemoryList(MemoryList::new())
                    } else {
                        StorageBackend::MemoryMap(MemoryMap::new())
                    };
                    Arc::new(Mutex::new(Storage::new(backend, PropertyMap::memory())))
                });
                Ok(Arc::clone(storage))
            }
            PERSISTENT_LIST | PERSISTENT_MAP => {
                let store = self.require_log_store(type_name)?;
                let access = if type_name == PERSISTENT_LIST {
                    Access::List
                } else {
                    Access::Map
                };
                let data = LogDbStorage::open(
                    Arc::clone(store),
                    table_name(type_name, "data", name),
                    access,
                )?;
                let properties = LogDbStorage::open(
                    Arc::clone(store),
                    table_name(type_name, "properties", name),
                    Access::Map,
                )?;
                Ok(Arc::new(Mutex::new(Storage::new(
                    StorageBackend::LogDb(data),
                    PropertyMap::LogDb(properties),
                ))))
            }
            FILESYSTEM_MAP => {
                let root = self
                    .config
                    .filesystem_root
                    .as_deref()
                    .ok_or_else(|| HubError::UnknownType(type_name.to_string()))?;
                let dir = directory_for(root, name)?;
                let backend = DirectoryStorage::open(dir, self.config.max_file_size)?;
                Ok(Arc::new(Mutex::new(Storage::new(
                    StorageBackend::Directory(backend),
                    PropertyMap::ReadOnly,
                ))))
            }
            other => Err(HubError::UnknownType(other.to_string())),
        }
    }

    fn require_log_store(&self, type_name: &str) -> Result<&SharedLogStore> {
        self.log_store
            .as_ref()
            .ok_or_else(|| HubError::UnknownType(type_name.to_string()))
    }
}

/// Directory for a `filesystem_map` container, confined to `root`
fn directory_for(root: &Path, name: &str) -> Result<std::path::PathBuf> {
    let relative = Path::new(name);
    let confined = relative
        .components()
        .all(|c| matches!(c, std::path::Component::Normal(_)));
    if !confined {
        return Err(HubError::InvalidArgument(format!(
            "invalid directory name '{}'",
            name
        )));
    }
    Ok(root.join(relative))
}
