//! Diff sessions
//!
//! Mirrors the changes of a source container into a private destination
//! container, so a client that polls can catch up on what happened since
//! its last read.
//!
//! List sources: every change is pushed onto a list destination, in order.
//! A clear empties the destination and leaves a single `clear` change.
//!
//! Map sources: the destination is keyed by source key and keeps the last
//! change per key. A source delete deletes the key from the destination. A
//! clear deletes every key the destination holds, clears it, and records a
//! `clear` change under [`SPECIAL_KEY`].
//!
//! The destination lives as long as the session: `close` or drop deletes it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{HubError, Result};
use crate::event::{sink, Event, EventKind};
use crate::manager::{ContainerManager, VOLATILE_LIST, VOLATILE_MAP};
use crate::storage::ContainerKind;
use crate::value::Value;

use super::Container;

/// Destination key holding a map clear marker
pub const SPECIAL_KEY: &str = "__special__";

/// One mirrored change, stored bincode-encoded in the destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub event: EventKind,
    pub key: Value,
    pub value: Value,
    pub metadata: Value,
}

impl ChangeRecord {
    fn from_event(event: &Event) -> Self {
        Self {
            event: event.kind,
            key: event.key.clone(),
            value: event.value.clone(),
            metadata: event.metadata.clone(),
        }
    }

    fn encode(&self) -> Result<Value> {
        Ok(Value::String(bincode::serialize(self)?))
    }

    fn decode(value: &Value) -> Result<Self> {
        let bytes = value.as_bytes().unwrap_or_default();
        Ok(bincode::deserialize(bytes)?)
    }
}

pub struct DiffSession<'m> {
    id: u64,
    manager: &'m ContainerManager,
    source: Arc<Container>,
    destination: Arc<Container>,
    cookie: u64,
    closed: bool,
}

impl<'m> DiffSession<'m> {
    /// Create the destination `__/diff/{source}/{id}` and start mirroring
    /// changes made from now on
    pub fn start(manager: &'m ContainerManager, source: &Arc<Container>) -> Result<Self> {
        let id = manager.next_diff_id();
        let name = format!("__/diff/{}/{}", source.name(), id);
        let kind = source.kind();
        let type_name = match kind {
            ContainerKind::List => VOLATILE_LIST,
            ContainerKind::Map => VOLATILE_MAP,
        };
        let destination = manager.create_container(type_name, &name)?;

        let mirror_to = Arc::clone(&destination);
        let source_name = source.name().to_string();
        let cookie = source.subscribe(
            sink(move |event| {
                let mirrored = match kind {
                    ContainerKind::List => record_list_change(&mirror_to, &source_name, event),
                    ContainerKind::Map => record_map_change(&mirror_to, event),
                };
                if let Err(e) = mirrored {
                    tracing::warn!(
                        destination = mirror_to.name(),
                        event = %event.kind,
                        error = %e,
                        "failed to mirror change"
                    );
                }
            }),
            "",
        )?;

        tracing::debug!(source = source.name(), destination = %name, "diff session started");

        Ok(Self {
            id,
            manager,
            source: Arc::clone(source),
            destination,
            cookie,
            closed: false,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn destination(&self) -> &Arc<Container> {
        &self.destination
    }

    /// Changes accumulated since the last read, oldest first for lists and
    /// in key order for maps. The destination is emptied.
    pub fn read(&self) -> Result<Vec<ChangeRecord>> {
        // A change mirrored between the query and the clear would be lost
        let _guard = self.destination.state.lock();
        let records = self.destination.query(0, 0)?;
        self.destination.clear()?;
        records
            .iter()
            .map(|record| ChangeRecord::decode(&record.value))
            .collect()
    }

    /// Stop mirroring and delete the destination container
    pub fn close(mut self) -> Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.source.unsubscribe(self.cookie);
        self.manager
            .delete_container(self.destination.type_name(), self.destination.name())
    }
}

impl Drop for DiffSession<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            tracing::warn!(
                destination = self.destination.name(),
                error = %e,
                "failed to delete diff destination"
            );
        }
    }
}

fn record_list_change(destination: &Container, source_name: &str, event: &Event) -> Result<()> {
    if event.kind == EventKind::Clear {
        destination.clear()?;
    }
    let change = ChangeRecord::from_event(event).encode()?;
    destination.push_back(change, Value::from(source_name))
}

fn record_map_change(destination: &Container, event: &Event) -> Result<()> {
    match event.kind {
        EventKind::Set | EventKind::Insert => {
            let change = ChangeRecord::from_event(event).encode()?;
            destination.set(event.key.clone(), change, Value::None)
        }
        EventKind::Delete => delete_if_held(destination, event.key.clone()),
        EventKind::Clear => {
            let special = Value::from(SPECIAL_KEY);
            let held = destination.query(0, 0)?;
            for record in held.into_records() {
                if record.key != special {
                    delete_if_held(destination, record.key)?;
                }
            }
            destination.clear()?;
            let change = ChangeRecord::from_event(event).encode()?;
            destination.set(special, change, Value::None)
        }
        _ => Ok(()),
    }
}

fn delete_if_held(destination: &Container, key: Value) -> Result<()> {
    match destination.delete(key) {
        Err(HubError::KeyNotFound) => Ok(()),
        other => other,
    }
}
