use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use canister_core::{AggregateId, ExpectedVersion};
use std::sync::Arc;

/// An event ready to be appended to a stream (not yet assigned a sequence number).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

/// A stored event in an append-only stream (assigned a sequence number).
///
/// `sequence_number` is the spec's "version". `processed`/`last_error` track
/// the projection dispatcher's pass over the event (§4.A, §4.F).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    /// Monotonically increasing position in the aggregate stream.
    pub sequence_number: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,

    pub processed: bool,
    pub last_error: Option<String>,
}

impl StoredEvent {
    pub fn stream_version(&self) -> u64 {
        self.sequence_number
    }

    /// Convert a stored event into an event envelope for publication.
    pub fn to_envelope(&self) -> canister_events::EventEnvelope<JsonValue> {
        canister_events::EventEnvelope::new(
            self.event_id,
            self.aggregate_id,
            self.aggregate_type.clone(),
            self.sequence_number,
            self.payload.clone(),
        )
    }
}

#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("event publication failed: {0}")]
    Publish(String),

    #[error("event not found: {0}")]
    NotFound(Uuid),
}

/// Append-only event store (spec §4.A, the EventLog).
///
/// - **No storage assumptions** (works for in-memory tests/dev and future SQL backends)
/// - **Optimistic locking** via `ExpectedVersion`
/// - **Projection bookkeeping**: every stored event starts unprocessed; the
///   projection dispatcher claims a batch via `next_unprocessed` and marks
///   each event processed or failed once handled.
pub trait EventStore: Send + Sync {
    /// Append events to an aggregate stream (append-only).
    ///
    /// Implementations must:
    /// - enforce optimistic concurrency against the current stream version
    /// - assign monotonically increasing `sequence_number`s starting at `current_version + 1`
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Load the full stream for an aggregate, in sequence order.
    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Whether any events have ever been appended for this aggregate id.
    fn exists(&self, aggregate_id: AggregateId) -> Result<bool, EventStoreError>;

    /// Claim up to `limit` unprocessed events, oldest first, across all streams.
    ///
    /// A claimed event is not returned again by a concurrent caller until it
    /// is marked processed or failed (or the store is dropped). Single
    /// projection worker per deployment is assumed (spec §5).
    fn next_unprocessed(&self, limit: usize) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Mark an event as successfully projected.
    fn mark_processed(&self, event_id: Uuid) -> Result<(), EventStoreError>;

    /// Mark an event as failed to project, recording the error for diagnostics.
    /// The event remains claimed so a crashed worker does not retry endlessly;
    /// it is released back to the unprocessed pool so the next tick can retry it.
    fn mark_failed(&self, event_id: Uuid, message: impl Into<String>) -> Result<(), EventStoreError>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected_version)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(aggregate_id)
    }

    fn exists(&self, aggregate_id: AggregateId) -> Result<bool, EventStoreError> {
        (**self).exists(aggregate_id)
    }

    fn next_unprocessed(&self, limit: usize) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).next_unprocessed(limit)
    }

    fn mark_processed(&self, event_id: Uuid) -> Result<(), EventStoreError> {
        (**self).mark_processed(event_id)
    }

    fn mark_failed(&self, event_id: Uuid, message: impl Into<String>) -> Result<(), EventStoreError> {
        (**self).mark_failed(event_id, message)
    }
}

impl UncommittedEvent {
    /// Convenience constructor from a typed event.
    pub fn from_typed<E>(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: canister_events::Event + Serialize,
    {
        let payload = serde_json::to_value(event)
            .map_err(|e| EventStoreError::InvalidAppend(format!("payload serialization failed: {e}")))?;

        Ok(Self {
            event_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}
