use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use uuid::Uuid;

use canister_core::{AggregateId, ExpectedVersion};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// In-memory append-only event store.
///
/// Intended for tests/dev and the reference deployment (spec §1 puts a
/// concrete SQL backend out of scope). Not optimized for performance.
///
/// `claimed` tracks event ids currently checked out by `next_unprocessed` so
/// a second caller doesn't double-claim the same event; a single `Mutex`
/// guards it since only one projection worker is expected per deployment
/// (spec §5).
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<AggregateId, Vec<StoredEvent>>>,
    claimed: Mutex<HashSet<Uuid>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        let aggregate_id = events[0].aggregate_id;
        let aggregate_type = events[0].aggregate_type.clone();

        for (idx, e) in events.iter().enumerate() {
            if e.aggregate_id != aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple aggregate_ids (index {idx})"
                )));
            }
            if e.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch contains multiple aggregate_types (index {idx})"
                )));
            }
        }

        let mut streams = self
            .streams
            .write()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        let stream = streams.entry(aggregate_id).or_default();
        let current = Self::current_version(stream);

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        if let Some(existing) = stream.first() {
            if existing.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    existing.aggregate_type, aggregate_type
                )));
            }
        }

        let mut next = current + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            let stored = StoredEvent {
                event_id: e.event_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: next,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
                processed: false,
                last_error: None,
            };
            next += 1;
            stream.push(stored.clone());
            committed.push(stored);
        }

        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        Ok(streams.get(&aggregate_id).cloned().unwrap_or_default())
    }

    fn exists(&self, aggregate_id: AggregateId) -> Result<bool, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        Ok(streams.get(&aggregate_id).map(|s| !s.is_empty()).unwrap_or(false))
    }

    fn next_unprocessed(&self, limit: usize) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;
        let mut claimed = self
            .claimed
            .lock()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        let mut candidates: Vec<StoredEvent> = streams
            .values()
            .flatten()
            .filter(|e| !e.processed && !claimed.contains(&e.event_id))
            .cloned()
            .collect();
        candidates.sort_by_key(|e| (e.occurred_at, e.aggregate_id, e.sequence_number));
        candidates.truncate(limit);

        for e in &candidates {
            claimed.insert(e.event_id);
        }

        Ok(candidates)
    }

    fn mark_processed(&self, event_id: Uuid) -> Result<(), EventStoreError> {
        let mut streams = self
            .streams
            .write()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;
        let mut claimed = self
            .claimed
            .lock()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        let event = streams
            .values_mut()
            .flatten()
            .find(|e| e.event_id == event_id)
            .ok_or(EventStoreError::NotFound(event_id))?;
        event.processed = true;
        event.last_error = None;
        claimed.remove(&event_id);

        Ok(())
    }

    fn mark_failed(&self, event_id: Uuid, message: impl Into<String>) -> Result<(), EventStoreError> {
        let mut streams = self
            .streams
            .write()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;
        let mut claimed = self
            .claimed
            .lock()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        let event = streams
            .values_mut()
            .flatten()
            .find(|e| e.event_id == event_id)
            .ok_or(EventStoreError::NotFound(event_id))?;
        event.last_error = Some(message.into());
        // Released back to the pool so the next dispatcher tick retries it.
        claimed.remove(&event_id);

        Ok(())
    }
}
