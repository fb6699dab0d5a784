//! Containers
//!
//! A `Container` is a named, typed handle over one storage backend and its
//! property map. It serializes every operation with one re-entrant lock,
//! raises change events, runs the wait-and-pop queues and feeds diff sessions.
//!
//! ## Locking
//! ```text
//!   Container::state   ReentrantMutex  held for the whole public call,
//!                                      sink callbacks included
//!   Storage            Mutex           held only inside one backend call
//! ```
//! Sinks run synchronously while the container lock is held. A sink that
//! blocks stalls every other caller of the container, so sinks must not
//! block. A sink may call back into the same container.
//!
//! A container deleted through the manager is detached: every later call
//! on a handle that outlived the deletion fails with `NotFound`.

mod diff;
mod wait_pop;

pub use diff::{ChangeRecord, DiffSession};
pub use wait_pop::PopTicket;

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, ReentrantMutex};

use crate::error::{HubError, Result};
use crate::event::{Event, EventDispatcher, EventKind, EventSink};
use crate::storage::{ContainerKind, PropertyMap, Record, ResultSet, StorageBackend};
use crate::value::Value;

/// Backend and properties of one container
pub struct Storage {
    pub backend: StorageBackend,
    pub properties: PropertyMap,
    detached: bool,
}

impl Storage {
    pub fn new(backend: StorageBackend, properties: PropertyMap) -> Self {
        Self {
            backend,
            properties,
            detached: false,
        }
    }
}

/// Storage handle shared between a container and the provider that made it
pub type SharedStorage = Arc<Mutex<Storage>>;

#[derive(Default)]
struct ContainerState {
    dispatcher: EventDispatcher,
    next_waiter_id: u64,
    pop_next_waiters: VecDeque<(u64, EventSink)>,
    pop_key_waiters: HashMap<Vec<u8>, VecDeque<(u64, EventSink)>>,
}

pub struct Container {
    name: String,
    type_name: String,
    storage: SharedStorage,
    state: ReentrantMutex<RefCell<ContainerState>>,
}

impl Container {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, storage: SharedStorage) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            storage,
            state: ReentrantMutex::new(RefCell::new(ContainerState::default())),
        }
    }

    /// Container over `backend` with in-memory properties
    pub fn with_backend(
        name: impl Into<String>,
        type_name: impl Into<String>,
        backend: StorageBackend,
    ) -> Self {
        let storage = Storage::new(backend, PropertyMap::memory());
        Self::new(name, type_name, Arc::new(Mutex::new(storage)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn kind(&self) -> ContainerKind {
        self.storage.lock().backend.kind()
    }

    pub fn record_count(&self) -> Result<usize> {
        let _guard = self.state.lock();
        self.attached()?.backend.record_count()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    pub fn push_back(&self, value: Value, metadata: Value) -> Result<()> {
        let _guard = self.state.lock();
        let event = self.attached()?.backend.push_back(value, metadata)?;
        self.raise(&event);
        self.deliver_pop_next()
    }

    pub fn push_front(&self, value: Value, metadata: Value) -> Result<()> {
        let _guard = self.state.lock();
        let event = self.attached()?.backend.push_front(value, metadata)?;
        self.raise(&event);
        self.deliver_pop_next()
    }

    pub fn pop_back(&self) -> Result<Record> {
        let _guard = self.state.lock();
        let (record, event) = self.attached()?.backend.pop_back()?;
        self.raise(&event);
        Ok(record)
    }

    pub fn pop_front(&self) -> Result<Record> {
        let _guard = self.state.lock();
        let (record, event) = self.attached()?.backend.pop_front()?;
        self.raise(&event);
        Ok(record)
    }

    pub fn set(&self, key: Value, value: Value, metadata: Value) -> Result<()> {
        let _guard = self.state.lock();
        let event = self.attached()?.backend.set(&key, value, metadata)?;
        self.raise(&event);
        self.deliver_pop_key(&key)
    }

    pub fn insert(&self, key: Value, value: Value, metadata: Value) -> Result<()> {
        let _guard = self.state.lock();
        let event = self.attached()?.backend.insert(&key, value, metadata)?;
        self.raise(&event);
        self.deliver_pop_key(&key)
    }

    pub fn delete(&self, key: Value) -> Result<()> {
        let _guard = self.state.lock();
        let event = self.attached()?.backend.delete(&key)?;
        self.raise(&event);
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        let _guard = self.state.lock();
        let event = self.attached()?.backend.clear()?;
        self.raise(&event);
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn get(&self, key: &Value) -> Result<Record> {
        let _guard = self.state.lock();
        self.attached()?.backend.get(key)
    }

    /// Detached copy of `[start, end)`. See `normalize_query_limits`.
    pub fn query(&self, start: i64, end: i64) -> Result<ResultSet> {
        let _guard = self.state.lock();
        self.attached()?.backend.query(start, end)
    }

    pub fn get_property(&self, key: &str) -> Result<String> {
        let _guard = self.state.lock();
        self.attached()?.properties.get(key)
    }

    pub fn set_property(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.state.lock();
        self.attached()?.properties.set(key, value)
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Register `sink` for change events.
    ///
    /// With an empty `start` only future events are delivered. Otherwise
    /// `start` is a record position: the records from there on are sent as
    /// `push_back` (lists) or `set` (maps) events, then one `snapshot_end`,
    /// and only then is the sink registered.
    pub fn subscribe(&self, sink: EventSink, start: &str) -> Result<u64> {
        let guard = self.state.lock();

        if !start.is_empty() {
            let start: i64 = start.trim().parse().map_err(|_| {
                HubError::InvalidArgument(format!("invalid subscribe start '{}'", start))
            })?;
            let snapshot = self.attached()?.backend.snapshot(start)?;
            for event in &snapshot {
                sink(event);
            }
            sink(&Event::bare(EventKind::SnapshotEnd));
        }

        let cookie = guard.borrow_mut().dispatcher.subscribe(sink);
        Ok(cookie)
    }

    /// Returns false if the cookie was not registered
    pub fn unsubscribe(&self, cookie: u64) -> bool {
        let guard = self.state.lock();
        let removed = guard.borrow_mut().dispatcher.unsubscribe(cookie);
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        let guard = self.state.lock();
        let count = guard.borrow().dispatcher.len();
        count
    }

    /// Cut this handle off from its storage. Calls in progress finish first.
    pub(crate) fn detach(&self) {
        self.storage.lock().detached = true;
    }

    fn attached(&self) -> Result<MutexGuard<'_, Storage>> {
        let storage = self.storage.lock();
        if storage.detached {
            return Err(HubError::NotFound(format!("container '{}' was deleted", self.name)));
        }
        Ok(storage)
    }

    /// Send `event` to every sink registered right now
    fn raise(&self, event: &Event) {
        let guard = self.state.lock();
        let sinks = guard.borrow().dispatcher.sinks();
        for sink in sinks {
            sink(event);
        }
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .finish()
    }
}
