//! Tests for storage backends
//!
//! These tests verify:
//! - Negative index normalization on lists
//! - Query clamping and detached result sets
//! - Map key rules (string keys, duplicates, missing keys, positions)
//! - Log-backed lists and maps behave like the in-memory ones and persist
//! - Read-only directory storage
//! - Property maps

use std::fs;
use std::sync::Arc;

use hubstore::config::{LogStoreOptions, SyncStrategy};
use hubstore::logdb::LogStore;
use hubstore::storage::{
    Access, ContainerKind, DirectoryStorage, LogDbStorage, MemoryList, MemoryMap, PropertyMap,
    SharedLogStore, StorageBackend,
};
use hubstore::{EventKind, HubError, Value};
use parking_lot::Mutex;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn test_options() -> LogStoreOptions {
    LogStoreOptions {
        grow_step: 64 * 1024,
        sync_strategy: SyncStrategy::EveryNWrites { count: 1000 },
        ..LogStoreOptions::default()
    }
}

fn setup_log_store() -> (TempDir, SharedLogStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = LogStore::open(&temp_dir.path().join("s.logdb"), test_options()).unwrap();
    (temp_dir, Arc::new(Mutex::new(store)))
}

fn list_with(backend: &mut StorageBackend, count: i32) {
    for i in 0..count {
        backend
            .push_back(Value::from(format!("v{}", i)), Value::None)
            .unwrap();
    }
}

fn values(backend: &StorageBackend, start: i64, end: i64) -> Vec<Value> {
    backend
        .query(start, end)
        .unwrap()
        .into_iter()
        .map(|r| r.value)
        .collect()
}

/// Every list flavour, so each behaviour is checked against all of them
fn list_backends(store: &SharedLogStore) -> Vec<StorageBackend> {
    vec![
        StorageBackend::MemoryList(MemoryList::new()),
        StorageBackend::LogDb(LogDbStorage::open(Arc::clone(store), "list", Access::List).unwrap()),
    ]
}

fn map_backends(store: &SharedLogStore) -> Vec<StorageBackend> {
    vec![
        StorageBackend::MemoryMap(MemoryMap::new()),
        StorageBackend::LogDb(LogDbStorage::open(Arc::clone(store), "map", Access::Map).unwrap()),
    ]
}

// =============================================================================
// List Tests
// =============================================================================

#[test]
fn test_negative_index_resolution() {
    let (_temp, store) = setup_log_store();

    for mut backend in list_backends(&store) {
        list_with(&mut backend, 5);

        let last = backend.get(&Value::Int(-1)).unwrap();
        assert_eq!(last.key, Value::Int(4));
        assert_eq!(last.value, Value::from("v4"));

        let first = backend.get(&Value::Int(-5)).unwrap();
        assert_eq!(first.key, Value::Int(0));

        assert!(matches!(
            backend.get(&Value::Int(-6)),
            Err(HubError::OutOfRange { index: -6, size: 5 })
        ));
        assert!(matches!(
            backend.get(&Value::Int(5)),
            Err(HubError::OutOfRange { .. })
        ));
    }
}

#[test]
fn test_query_clamping() {
    let (_temp, store) = setup_log_store();

    for mut backend in list_backends(&store) {
        list_with(&mut backend, 3);

        assert_eq!(values(&backend, -100, 0).len(), 3);
        assert_eq!(values(&backend, 0, 0).len(), 3);
        assert!(values(&backend, 2, 1).is_empty());
        assert_eq!(values(&backend, -1, 0), vec![Value::from("v2")]);
        assert_eq!(
            values(&backend, 1, 2),
            vec![Value::from("v1")]
        );
    }
}

#[test]
fn test_query_is_detached() {
    let mut backend = StorageBackend::MemoryList(MemoryList::new());
    list_with(&mut backend, 2);

    let mut result = backend.query(0, 0).unwrap();
    backend.clear().unwrap();

    assert_eq!(result.record_count(), 2);
    assert_eq!(result.get_record().unwrap().value, Value::from("v0"));
    assert!(result.move_next());
    assert_eq!(result.get_record().unwrap().value, Value::from("v1"));
}

#[test]
fn test_push_pop_both_ends() {
    let (_temp, store) = setup_log_store();

    for mut backend in list_backends(&store) {
        backend.push_back(Value::from("b"), Value::None).unwrap();
        let event = backend.push_front(Value::from("a"), Value::from("meta")).unwrap();
        assert_eq!(event.kind, EventKind::PushFront);
        let event = backend.push_back(Value::from("c"), Value::None).unwrap();
        assert_eq!(event.key, Value::Int(2));

        let (record, event) = backend.pop_front().unwrap();
        assert_eq!(record.value, Value::from("a"));
        assert_eq!(record.metadata, Value::from("meta"));
        assert_eq!(event.kind, EventKind::PopFront);

        let (record, event) = backend.pop_back().unwrap();
        assert_eq!(record.value, Value::from("c"));
        assert_eq!(record.key, Value::Int(1));
        assert_eq!(event.kind, EventKind::PopBack);

        assert_eq!(backend.record_count().unwrap(), 1);
        backend.pop_back().unwrap();
        assert!(matches!(backend.pop_back(), Err(HubError::OutOfRange { .. })));
    }
}

#[test]
fn test_list_set_insert_delete() {
    let (_temp, store) = setup_log_store();

    for mut backend in list_backends(&store) {
        list_with(&mut backend, 3);

        backend
            .set(&Value::Int(0), Value::None, Value::from("m"))
            .unwrap();
        let record = backend.get(&Value::Int(0)).unwrap();
        assert_eq!(record.value, Value::from("v0"));
        assert_eq!(record.metadata, Value::from("m"));

        backend
            .insert(&Value::Int(-1), Value::from("x"), Value::None)
            .unwrap();
        backend
            .insert(&Value::Int(4), Value::from("end"), Value::None)
            .unwrap();
        assert_eq!(
            values(&backend, 0, 0),
            vec![
                Value::from("v0"),
                Value::from("v1"),
                Value::from("x"),
                Value::from("v2"),
                Value::from("end"),
            ]
        );

        let event = backend.delete(&Value::Int(-1)).unwrap();
        assert_eq!(event.kind, EventKind::Delete);
        assert_eq!(event.key, Value::Int(4));
        assert_eq!(backend.record_count().unwrap(), 4);

        assert!(matches!(
            backend.get(&Value::from("x")),
            Err(HubError::WrongKeyType)
        ));
        assert!(matches!(
            backend.push_back(Value::None, Value::None),
            Err(HubError::InvalidArgument(_))
        ));
    }
}

#[test]
fn test_list_snapshot_events() {
    let mut backend = StorageBackend::MemoryList(MemoryList::new());
    list_with(&mut backend, 3);

    let events = backend.snapshot(1).unwrap();

    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.kind == EventKind::PushBack));
    assert_eq!(events[0].key, Value::Int(1));
    assert_eq!(backend.kind(), ContainerKind::List);
}

// =============================================================================
// Map Tests
// =============================================================================

#[test]
fn test_map_key_rules() {
    let (_temp, store) = setup_log_store();

    for mut backend in map_backends(&store) {
        backend
            .insert(&Value::from("a"), Value::Int(1), Value::None)
            .unwrap();
        assert!(matches!(
            backend.insert(&Value::from("a"), Value::Int(2), Value::None),
            Err(HubError::AlreadyExists)
        ));

        backend
            .set(&Value::from("b"), Value::Double(2.5), Value::from("meta"))
            .unwrap();
        backend
            .set(&Value::from("b"), Value::Double(3.5), Value::None)
            .unwrap();
        let record = backend.get(&Value::from("b")).unwrap();
        assert_eq!(record.value, Value::Double(3.5));
        assert_eq!(record.metadata, Value::from("meta"));

        assert!(matches!(
            backend.delete(&Value::from("missing")),
            Err(HubError::KeyNotFound)
        ));
        assert!(matches!(
            backend.get(&Value::from("missing")),
            Err(HubError::KeyNotFound)
        ));
        assert!(matches!(
            backend.set(&Value::Double(1.0), Value::Int(1), Value::None),
            Err(HubError::WrongKeyType)
        ));
        assert!(matches!(
            backend.push_back(Value::Int(1), Value::None),
            Err(HubError::NotSupported(_))
        ));
        assert!(matches!(backend.pop_front(), Err(HubError::NotSupported(_))));

        // Integer keys address entries by position
        let second = backend.get(&Value::Int(1)).unwrap();
        assert_eq!(second.key, Value::from("b"));
        let last = backend.get(&Value::Int(-1)).unwrap();
        assert_eq!(last.key, Value::from("b"));

        let event = backend.delete(&Value::from("a")).unwrap();
        assert_eq!(event.value, Value::Int(1));
        assert_eq!(backend.record_count().unwrap(), 1);
        assert_eq!(backend.kind(), ContainerKind::Map);
    }
}

#[test]
fn test_map_snapshot_uses_set_events() {
    let mut backend = StorageBackend::MemoryMap(MemoryMap::new());
    backend
        .set(&Value::from("k"), Value::from("v"), Value::None)
        .unwrap();

    let events = backend.snapshot(0).unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Set);
    assert_eq!(events[0].key, Value::from("k"));
}

#[test]
fn test_log_backed_map_persists() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("p.logdb");

    {
        let store = Arc::new(Mutex::new(LogStore::open(&path, test_options()).unwrap()));
        let mut map = LogDbStorage::open(store, "m", Access::Map).unwrap();
        map.set(&Value::from("x"), Value::Int(7), Value::from("meta"))
            .unwrap();
        map.set(&Value::from("y"), Value::from("why"), Value::None)
            .unwrap();
        map.delete(&Value::from("x")).unwrap();
    }

    let store = Arc::new(Mutex::new(LogStore::open(&path, test_options()).unwrap()));
    let map = LogDbStorage::open(store, "m", Access::Map).unwrap();
    assert_eq!(map.record_count().unwrap(), 1);
    let record = map.get(&Value::from("y")).unwrap();
    assert_eq!(record.value, Value::from("why"));
    assert_eq!(record.metadata, Value::None);
}

// =============================================================================
// Directory Tests
// =============================================================================

#[test]
fn test_directory_storage() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("a.txt"), b"hello").unwrap();
    fs::write(temp_dir.path().join("big.bin"), vec![0u8; 64]).unwrap();
    fs::create_dir(temp_dir.path().join("sub")).unwrap();

    let mut backend =
        StorageBackend::Directory(DirectoryStorage::open(temp_dir.path(), 32).unwrap());

    assert_eq!(backend.record_count().unwrap(), 2);
    assert_eq!(
        backend.get(&Value::from("a.txt")).unwrap().value,
        Value::from("hello")
    );
    assert!(matches!(
        backend.get(&Value::from("missing")),
        Err(HubError::KeyNotFound)
    ));
    assert!(matches!(
        backend.get(&Value::from("big.bin")),
        Err(HubError::InvalidArgument(_))
    ));
    assert!(matches!(
        backend.get(&Value::from("../a.txt")),
        Err(HubError::InvalidArgument(_))
    ));
    assert!(matches!(
        backend.set(&Value::from("a.txt"), Value::from("x"), Value::None),
        Err(HubError::NotSupported(_))
    ));
    assert!(matches!(backend.clear(), Err(HubError::NotSupported(_))));
    assert!(matches!(backend.pop_back(), Err(HubError::NotSupported(_))));

    let first = backend.query(0, 1).unwrap();
    assert_eq!(first.records()[0].key, Value::from("a.txt"));
}

#[test]
fn test_directory_missing_root() {
    let temp_dir = TempDir::new().unwrap();
    let result = DirectoryStorage::open(temp_dir.path().join("nope"), 1024);
    assert!(matches!(result, Err(HubError::NotFound(_))));
}

// =============================================================================
// Property Map Tests
// =============================================================================

#[test]
fn test_property_maps() {
    let (_temp, store) = setup_log_store();
    let logdb = LogDbStorage::open(store, "props", Access::Map).unwrap();

    for mut props in [PropertyMap::memory(), PropertyMap::LogDb(logdb)] {
        assert!(matches!(props.get("owner"), Err(HubError::KeyNotFound)));
        props.set("owner", "alice").unwrap();
        props.set("owner", "bob").unwrap();
        assert_eq!(props.get("owner").unwrap(), "bob");
    }

    let mut read_only = PropertyMap::ReadOnly;
    assert!(matches!(
        read_only.set("k", "v"),
        Err(HubError::NotSupported(_))
    ));
}
