//! Tests for ContainerManager and diff sessions
//!
//! These tests verify:
//! - Create/open by name with the weak live-container cache
//! - Type checks (unknown types, conflicting types, aliases)
//! - Meta containers describe every container and type
//! - Volatile data outlives handles; persistent data outlives the process
//! - Filesystem containers
//! - Deleting a container detaches handles that outlive it
//! - Diff sessions mirror list and map changes without losing any

use std::fs;
use std::sync::{Arc, Barrier};
use std::thread;

use hubstore::config::SyncStrategy;
use hubstore::container::{ChangeRecord, DiffSession};
use hubstore::manager::{
    META_AVAILABLE_TYPES, META_CONTAINERS, PERSISTENT_LIST, PERSISTENT_MAP, VOLATILE_LIST,
    VOLATILE_MAP,
};
use hubstore::{channel_sink, Config, ContainerManager, EventKind, HubError, Value};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_config() -> (TempDir, Config) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path().join("data"))
        .grow_step(64 * 1024)
        .sync_strategy(SyncStrategy::EveryNWrites { count: 1000 })
        .filesystem_root(temp_dir.path().join("files"))
        .build();
    (temp_dir, config)
}

fn memory_manager() -> ContainerManager {
    ContainerManager::in_memory(Config::default()).unwrap()
}

fn decode_all(records: &[hubstore::storage::Record]) -> Vec<ChangeRecord> {
    records
        .iter()
        .map(|r| bincode::deserialize(r.value.as_bytes().unwrap()).unwrap())
        .collect()
}

// =============================================================================
// Create / Open Tests
// =============================================================================

#[test]
fn test_same_name_returns_same_container() {
    let manager = memory_manager();

    let first = manager.create_or_open(VOLATILE_LIST, "jobs").unwrap();
    let second = manager.create_or_open(VOLATILE_LIST, "jobs").unwrap();
    let third = manager.open_container("", "jobs").unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first, &third));
    assert_eq!(first.type_name(), VOLATILE_LIST);
}

#[test]
fn test_type_errors() {
    let manager = memory_manager();
    manager.create_or_open(VOLATILE_LIST, "jobs").unwrap();

    assert!(matches!(
        manager.create_or_open("bogus", "x"),
        Err(HubError::UnknownType(_))
    ));
    assert!(matches!(
        manager.create_or_open(PERSISTENT_LIST, "x"),
        Err(HubError::UnknownType(_))
    ));
    assert!(matches!(
        manager.create_or_open(VOLATILE_MAP, "jobs"),
        Err(HubError::AlreadyExistsWithDifferentType { .. })
    ));
    assert!(matches!(
        manager.open_container(VOLATILE_LIST, "missing"),
        Err(HubError::NotFound(_))
    ));
    assert!(matches!(
        manager.create_or_open("", "missing"),
        Err(HubError::NotFound(_))
    ));
    assert!(matches!(
        manager.create_container("", "x"),
        Err(HubError::InvalidArgument(_))
    ));
}

#[test]
fn test_live_container_type_is_checked() {
    let manager = memory_manager();
    let list = manager.create_or_open(VOLATILE_LIST, "x").unwrap();

    // Meta now disagrees with the live handle
    let meta = manager.open_container("", META_CONTAINERS).unwrap();
    meta.set(Value::from("x"), Value::from(VOLATILE_MAP), Value::None)
        .unwrap();

    assert!(matches!(
        manager.create_or_open(VOLATILE_MAP, "x"),
        Err(HubError::AlreadyExistsWithDifferentType { .. })
    ));
    assert_eq!(list.type_name(), VOLATILE_LIST);
}

#[test]
fn test_concurrent_create_with_different_types() {
    for round in 0..100 {
        let manager = Arc::new(memory_manager());
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = [VOLATILE_LIST, VOLATILE_MAP]
            .into_iter()
            .map(|type_name| {
                let manager = Arc::clone(&manager);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    manager
                        .create_or_open(type_name, "x")
                        .map(|c| c.type_name().to_string())
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let created: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(created.len(), 1, "round {}", round);
        assert_eq!(manager.container_type("x").unwrap(), *created[0]);
        assert!(results.iter().any(|r| matches!(
            r,
            Err(HubError::AlreadyExistsWithDifferentType { .. })
        )));
    }
}

#[test]
fn test_aliases() {
    let manager = memory_manager();
    manager.add_alias("list", VOLATILE_LIST);

    let container = manager.create_or_open("list", "a").unwrap();

    assert_eq!(container.type_name(), VOLATILE_LIST);
    assert_eq!(manager.resolve_alias("list"), VOLATILE_LIST);
    assert_eq!(manager.resolve_alias("other"), "other");
}

#[test]
fn test_volatile_data_outlives_handle() {
    let manager = memory_manager();

    {
        let container = manager.create_or_open(VOLATILE_LIST, "q").unwrap();
        container.push_back(Value::from("kept"), Value::None).unwrap();
    }

    let container = manager.open_container(VOLATILE_LIST, "q").unwrap();
    assert_eq!(container.record_count().unwrap(), 1);
}

#[test]
fn test_meta_containers() {
    let manager = memory_manager();
    manager.create_or_open(VOLATILE_MAP, "settings").unwrap();

    let meta = manager.open_container("", META_CONTAINERS).unwrap();
    let record = meta.get(&Value::from("settings")).unwrap();
    assert_eq!(record.value, Value::from(VOLATILE_MAP));
    assert!(meta.get(&Value::from(META_AVAILABLE_TYPES)).is_ok());

    let types = manager.open_container("", META_AVAILABLE_TYPES).unwrap();
    let names: Vec<_> = types
        .query(0, 0)
        .unwrap()
        .into_iter()
        .map(|r| r.value)
        .collect();
    assert_eq!(names, vec![Value::from(VOLATILE_LIST), Value::from(VOLATILE_MAP)]);
}

#[test]
fn test_delete_container() {
    let manager = memory_manager();
    let old = manager.create_or_open(VOLATILE_LIST, "gone").unwrap();
    old.push_back(Value::from("x"), Value::None).unwrap();

    manager.delete_container(VOLATILE_LIST, "gone").unwrap();

    assert!(!manager.exists("gone"));
    assert!(matches!(
        old.push_back(Value::from("y"), Value::None),
        Err(HubError::NotFound(_))
    ));
    assert!(matches!(
        manager.delete_container(VOLATILE_LIST, "gone"),
        Err(HubError::NotFound(_))
    ));
    assert!(matches!(
        manager.delete_container("", META_CONTAINERS),
        Err(HubError::NotSupported(_))
    ));

    // The name can be reused with another type
    let new = manager.create_or_open(VOLATILE_MAP, "gone").unwrap();
    assert!(!Arc::ptr_eq(&old, &new));
    assert_eq!(new.record_count().unwrap(), 0);
}

// =============================================================================
// Persistent Container Tests
// =============================================================================

#[test]
fn test_persistent_containers_survive_restart() {
    let (_temp, config) = setup_temp_config();

    {
        let manager = ContainerManager::open(config.clone()).unwrap();
        let list = manager.create_or_open(PERSISTENT_LIST, "events").unwrap();
        list.push_back(Value::from("one"), Value::Int(1)).unwrap();
        list.push_back(Value::from("two"), Value::None).unwrap();
        list.set_property("owner", "ops").unwrap();

        let map = manager.create_or_open(PERSISTENT_MAP, "users").unwrap();
        map.set(Value::from("alice"), Value::Int(30), Value::None)
            .unwrap();
    }

    let manager = ContainerManager::open(config).unwrap();
    assert_eq!(manager.container_type("events").unwrap(), PERSISTENT_LIST);
    assert_eq!(manager.container_type("users").unwrap(), PERSISTENT_MAP);

    let list = manager.open_container("", "events").unwrap();
    let records = list.query(0, 0).unwrap();
    assert_eq!(records.record_count(), 2);
    assert_eq!(records.records()[0].metadata, Value::Int(1));
    assert_eq!(list.get_property("owner").unwrap(), "ops");

    let map = manager.open_container(PERSISTENT_MAP, "users").unwrap();
    assert_eq!(map.get(&Value::from("alice")).unwrap().value, Value::Int(30));
}

#[test]
fn test_delete_persistent_container() {
    let (_temp, config) = setup_temp_config();

    {
        let manager = ContainerManager::open(config.clone()).unwrap();
        let list = manager.create_or_open(PERSISTENT_LIST, "tmp").unwrap();
        list.push_back(Value::from("x"), Value::None).unwrap();
        drop(list);
        manager.delete_container(PERSISTENT_LIST, "tmp").unwrap();
    }

    let manager = ContainerManager::open(config).unwrap();
    assert!(!manager.exists("tmp"));
    let list = manager.create_or_open(PERSISTENT_LIST, "tmp").unwrap();
    assert_eq!(list.record_count().unwrap(), 0);
}

#[test]
fn test_deleted_persistent_container_detaches_old_handle() {
    let (_temp, config) = setup_temp_config();
    let manager = ContainerManager::open(config).unwrap();

    let old = manager.create_or_open(PERSISTENT_LIST, "p").unwrap();
    old.push_back(Value::from("first"), Value::None).unwrap();
    manager.delete_container(PERSISTENT_LIST, "p").unwrap();

    let new = manager.create_or_open(PERSISTENT_LIST, "p").unwrap();
    let (sink, events) = channel_sink();
    new.subscribe(sink, "").unwrap();

    assert!(matches!(
        old.push_back(Value::from("stale"), Value::None),
        Err(HubError::NotFound(_))
    ));
    assert!(matches!(old.record_count(), Err(HubError::NotFound(_))));
    assert!(matches!(
        old.set_property("k", "v"),
        Err(HubError::NotFound(_))
    ));

    assert_eq!(new.record_count().unwrap(), 0);
    assert!(matches!(new.get_property("k"), Err(HubError::KeyNotFound)));
    assert!(events.try_recv().is_err());
}

// =============================================================================
// Filesystem Container Tests
// =============================================================================

#[test]
fn test_filesystem_map() {
    let (temp, config) = setup_temp_config();
    let dir = temp.path().join("files").join("docs");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("readme"), b"hi").unwrap();

    let manager = ContainerManager::in_memory(config).unwrap();
    let docs = manager.create_or_open("filesystem_map", "docs").unwrap();

    assert_eq!(docs.get(&Value::from("readme")).unwrap().value, Value::from("hi"));
    assert!(matches!(
        docs.set(Value::from("readme"), Value::from("x"), Value::None),
        Err(HubError::NotSupported(_))
    ));
    assert!(matches!(
        manager.create_or_open("filesystem_map", "missing"),
        Err(HubError::NotFound(_))
    ));
    assert!(matches!(
        manager.create_or_open("filesystem_map", "../escape"),
        Err(HubError::InvalidArgument(_))
    ));
}

// =============================================================================
// Diff Session Tests
// =============================================================================

#[test]
fn test_list_diff_mirrors_changes() {
    let manager = memory_manager();
    let source = manager.create_or_open(VOLATILE_LIST, "source").unwrap();
    source.push_back(Value::from("before"), Value::None).unwrap();

    let session = DiffSession::start(&manager, &source).unwrap();
    assert_eq!(
        session.destination().name(),
        format!("__/diff/source/{}", session.id())
    );

    for v in ["a", "b", "c"] {
        source.push_back(Value::from(v), Value::None).unwrap();
    }

    let mirrored = session.destination().query(0, 0).unwrap();
    assert_eq!(mirrored.record_count(), 3);
    let changes = decode_all(mirrored.records());
    assert!(changes.iter().all(|c| c.event == EventKind::PushBack));
    assert_eq!(changes[0].value, Value::from("a"));
    assert_eq!(changes[2].key, Value::Int(3));

    source.clear().unwrap();

    let after_clear = decode_all(session.destination().query(0, 0).unwrap().records());
    assert_eq!(after_clear.len(), 1);
    assert_eq!(after_clear[0].event, EventKind::Clear);
}

#[test]
fn test_diff_read_drains_destination() {
    let manager = memory_manager();
    let source = manager.create_or_open(VOLATILE_LIST, "src").unwrap();
    let session = DiffSession::start(&manager, &source).unwrap();

    source.push_back(Value::from("x"), Value::None).unwrap();
    source.pop_front().unwrap();

    let changes = session.read().unwrap();
    assert_eq!(
        changes.iter().map(|c| c.event).collect::<Vec<_>>(),
        vec![EventKind::PushBack, EventKind::PopFront]
    );
    assert!(session.read().unwrap().is_empty());

    let destination = session.destination().name().to_string();
    session.close().unwrap();
    assert!(!manager.exists(&destination));
    assert_eq!(source.subscriber_count(), 0);

    // Changes after close are not mirrored anywhere
    source.push_back(Value::from("y"), Value::None).unwrap();
}

#[test]
fn test_dropped_diff_session_deletes_destination() {
    let manager = memory_manager();
    let source = manager.create_or_open(VOLATILE_MAP, "src").unwrap();

    let destination = {
        let session = DiffSession::start(&manager, &source).unwrap();
        let name = session.destination().name().to_string();
        assert!(manager.exists(&name));
        name
    };

    assert!(!manager.exists(&destination));
    assert_eq!(source.subscriber_count(), 0);
    source
        .set(Value::from("k"), Value::Int(1), Value::None)
        .unwrap();
}

#[test]
fn test_diff_read_keeps_concurrent_changes() {
    const WRITES: i32 = 500;
    let manager = memory_manager();
    let source = manager.create_or_open(VOLATILE_LIST, "busy").unwrap();
    let session = DiffSession::start(&manager, &source).unwrap();

    let writer = {
        let source = Arc::clone(&source);
        thread::spawn(move || {
            for i in 0..WRITES {
                source.push_back(Value::Int(i), Value::None).unwrap();
            }
        })
    };

    let mut changes = Vec::new();
    while !writer.is_finished() {
        changes.extend(session.read().unwrap());
    }
    writer.join().unwrap();
    changes.extend(session.read().unwrap());

    let values: Vec<_> = changes.into_iter().map(|c| c.value).collect();
    assert_eq!(values, (0..WRITES).map(Value::Int).collect::<Vec<_>>());
}

#[test]
fn test_map_diff_mirrors_changes() {
    let manager = memory_manager();
    let source = manager.create_or_open(VOLATILE_MAP, "cfg").unwrap();
    let session = DiffSession::start(&manager, &source).unwrap();

    source
        .set(Value::from("a"), Value::Int(1), Value::None)
        .unwrap();
    source
        .insert(Value::from("b"), Value::Int(2), Value::None)
        .unwrap();
    source
        .set(Value::from("a"), Value::Int(3), Value::None)
        .unwrap();
    source.delete(Value::from("b")).unwrap();
    source
        .set(Value::from("z"), Value::Int(0), Value::None)
        .unwrap();

    let changes = session.read().unwrap();
    let keys: Vec<_> = changes.iter().map(|c| c.key.clone()).collect();
    assert_eq!(keys, vec![Value::from("a"), Value::from("z")]);

    // Deleting a key the destination no longer holds is not an error
    source.delete(Value::from("z")).unwrap();

    source
        .set(Value::from("a"), Value::Int(3), Value::None)
        .unwrap();
    let changes = session.read().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].key, Value::from("a"));
    assert_eq!(changes[0].value, Value::Int(3));
    assert_eq!(changes[0].event, EventKind::Set);

    source
        .set(Value::from("c"), Value::Int(4), Value::None)
        .unwrap();
    let (sink, events) = channel_sink();
    session.destination().subscribe(sink, "").unwrap();
    source.clear().unwrap();

    let seen: Vec<_> = events.try_iter().map(|e| (e.kind, e.key)).collect();
    assert_eq!(
        seen,
        vec![
            (EventKind::Delete, Value::from("c")),
            (EventKind::Clear, Value::None),
            (EventKind::Set, Value::from("__special__")),
        ]
    );

    let changes = session.read().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].event, EventKind::Clear);
    assert!(session.destination().query(0, 0).unwrap().records().is_empty());
}
