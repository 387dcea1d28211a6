//! Append-only event store boundary (spec §4.A, the EventLog).
//!
//! This module defines an infrastructure-facing abstraction for storing and
//! loading aggregate event streams, plus the projection bookkeeping
//! (`next_unprocessed`/`mark_processed`/`mark_failed`) the Projection
//! Dispatcher (§4.F) relies on. No storage assumptions beyond in-memory are
//! made here; a SQL-backed implementation is out of scope (spec §1).

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
