//! Events
//!
//! Change notifications raised by containers and fanned out to sinks.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crossbeam::channel::{self, Receiver};
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Kind of change an event reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    PushBack,
    PushFront,
    PopBack,
    PopFront,
    Set,
    Insert,
    Delete,
    Clear,
    /// Ends the synthetic events sent by a snapshot subscribe
    SnapshotEnd,
    /// Record handed to a pop-next waiter
    WaitAndPopNext,
    /// Record handed to a pop-key waiter
    WaitAndPopKey,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PushBack => "push_back",
            EventKind::PushFront => "push_front",
            EventKind::PopBack => "pop_back",
            EventKind::PopFront => "pop_front",
            EventKind::Set => "set",
            EventKind::Insert => "insert",
            EventKind::Delete => "delete",
            EventKind::Clear => "clear",
            EventKind::SnapshotEnd => "snapshot_end",
            EventKind::WaitAndPopNext => "wnp_next",
            EventKind::WaitAndPopKey => "wnp_key",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One change notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub key: Value,
    pub value: Value,
    pub metadata: Value,
}

impl Event {
    pub fn new(kind: EventKind, key: Value, value: Value, metadata: Value) -> Self {
        Self {
            kind,
            key,
            value,
            metadata,
        }
    }

    /// Event with no payload
    pub fn bare(kind: EventKind) -> Self {
        Self::new(kind, Value::None, Value::None, Value::None)
    }
}

/// Receiver of events. Called synchronously under the container lock, so
/// it must not block.
pub type EventSink = Arc<dyn Fn(&Event) + Send + Sync>;

/// Wrap a closure as an `EventSink`
pub fn sink<F>(f: F) -> EventSink
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Sink that forwards every event into an unbounded channel
pub fn channel_sink() -> (EventSink, Receiver<Event>) {
    let (tx, rx) = channel::unbounded();
    let sink: EventSink = Arc::new(move |event: &Event| {
        // A dropped receiver just means nobody is listening anymore
        let _ = tx.send(event.clone());
    });
    (sink, rx)
}

// =============================================================================
// Event Dispatcher
// =============================================================================

/// Registered sinks keyed by cookie, in subscription order
#[derive(Default)]
pub struct EventDispatcher {
    sinks: BTreeMap<u64, EventSink>,
    last_cookie: u64,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sink`, returning its cookie
    pub fn subscribe(&mut self, sink: EventSink) -> u64 {
        self.last_cookie += 1;
        self.sinks.insert(self.last_cookie, sink);
        self.last_cookie
    }

    /// Returns false if the cookie was not registered
    pub fn unsubscribe(&mut self, cookie: u64) -> bool {
        self.sinks.remove(&cookie).is_some()
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Sinks registered right now, in subscription order. Raising from this
    /// copy means changes made by a sink only affect later raises.
    pub fn sinks(&self) -> Vec<EventSink> {
        self.sinks.values().cloned().collect()
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("sinks", &self.sinks.len())
            .field("last_cookie", &self.last_cookie)
            .finish()
    }
}
