//! # hubstore
//!
//! An embeddable data hub of named containers with:
//! - Lists and maps of (key, value, metadata) records
//! - A log-structured on-disk store rebuilt by replay on open
//! - Change subscriptions with snapshot-then-live delivery
//! - Single-consumer wait-and-pop queues
//! - Diff sessions that buffer changes for polling clients
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ContainerManager                          │
//! │        (types, aliases, weak cache, meta containers)         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                       Container                              │
//! │   (re-entrant lock, events, wait-and-pop, diff sessions)     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┼─────────────────┐
//!          │            │                 │
//!          ▼            ▼                 ▼
//!   ┌────────────┐ ┌──────────┐   ┌─────────────┐
//!   │  Memory    │ │ Directory│   │  LogDb      │
//!   │ list / map │ │ (r/o)    │   │ list / map  │
//!   └────────────┘ └──────────┘   └──────┬──────┘
//!                                        │
//!                                        ▼
//!                                 ┌─────────────┐
//!                                 │  LogStore   │
//!                                 │ (PagedFile) │
//!                                 └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod value;

pub mod logdb;
pub mod storage;
pub mod event;
pub mod container;
pub mod manager;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{HubError, Result};
pub use config::{Config, SyncStrategy};
pub use value::Value;
pub use event::{channel_sink, sink, Event, EventKind, EventSink};
pub use container::{Container, DiffSession, PopTicket};
pub use manager::ContainerManager;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of hubstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
