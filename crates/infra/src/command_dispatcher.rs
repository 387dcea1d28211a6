//! Command Router (spec §4.C).
//!
//! Flow for every command:
//! 1. determine `(aggregate_type, aggregate_id, is_creation)` from the command
//! 2. creation: `store.exists` must be false, else `AlreadyExists`
//! 3. non-creation: `load_stream` must be non-empty, else `NotFound`
//! 4. rehydrate the aggregate by replaying history, then `handle` to decide events
//! 5. `apply` the decided events in memory (a failure here is a programming
//!    error, not a domain error — `Fatal`)
//! 6. `append` with `ExpectedVersion::Exact(observed_version)`, retrying the
//!    whole sequence up to `MAX_RETRIES` times on `Concurrency` before
//!    surfacing `Conflict`
//! 7. publish the committed events onto the event bus
//!
//! This module contains no IO itself; it composes infrastructure traits.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use canister_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use canister_domain::{AggregateType, AnyAggregate, Canister, DeliveryNote};
use canister_events::{Command, EventBus, EventEnvelope};

use crate::envelope::DecodedCommand;
use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// The dispatcher's error taxonomy (spec §7): every HTTP/queue edge maps
/// these six kinds onto its own wire format.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("bad input: {0}")]
    BadInput(String),
    #[error("aggregate not found")]
    NotFound,
    #[error("aggregate already exists")]
    AlreadyExists,
    #[error("conflicting concurrent write: {0}")]
    Conflict(String),
    #[error("transient failure, retry later: {0}")]
    Transient(String),
    #[error("fatal internal error: {0}")]
    Fatal(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Conflict(msg),
            EventStoreError::AggregateTypeMismatch(msg) => DispatchError::Fatal(msg),
            EventStoreError::InvalidAppend(msg) => DispatchError::Fatal(msg),
            EventStoreError::Publish(msg) => DispatchError::Transient(msg),
            EventStoreError::NotFound(id) => DispatchError::Fatal(format!("event {id} not found")),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::BadInput(msg),
            DomainError::InvalidId(msg) => DispatchError::BadInput(msg),
            DomainError::InvariantViolation(msg) => DispatchError::Fatal(msg),
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::AlreadyExists => DispatchError::AlreadyExists,
        }
    }
}

/// Number of times a conflicting append is retried (reloading and replaying
/// the stream each time) before surfacing `Conflict` to the caller.
const MAX_RETRIES: u32 = 3;

/// Reusable command execution engine (the single dispatcher named in spec §4.C).
#[derive(Debug)]
pub struct CommandRouter<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandRouter<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandRouter<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch a command through the full event-sourcing pipeline.
    ///
    /// `make_aggregate` constructs an empty aggregate for the given id,
    /// ready for replay (see `AggregateType::empty`).
    #[tracing::instrument(skip_all, fields(aggregate_id = %command.target_aggregate_id()))]
    pub fn dispatch<A>(
        &self,
        command: A::Command,
        make_aggregate: impl Fn(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Command: Command,
        A::Event: canister_events::Event + Serialize + DeserializeOwned,
    {
        let aggregate_id = command.target_aggregate_id();
        let aggregate_type = command.aggregate_type();
        let is_creation = command.is_creation();

        for attempt in 0..=MAX_RETRIES {
            match self.try_dispatch::<A>(&command, aggregate_id, aggregate_type, is_creation, &make_aggregate) {
                Ok(committed) => return Ok(committed),
                Err(DispatchError::Conflict(msg)) if attempt < MAX_RETRIES => {
                    tracing::debug!(attempt, %msg, "optimistic concurrency conflict, retrying");
                    continue;
                }
                Err(err) => return Err(err),
            }
        }

        unreachable!("loop always returns within MAX_RETRIES + 1 iterations")
    }

    fn try_dispatch<A>(
        &self,
        command: &A::Command,
        aggregate_id: AggregateId,
        aggregate_type: &'static str,
        is_creation: bool,
        make_aggregate: &impl Fn(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: canister_events::Event + Serialize + DeserializeOwned,
    {
        if is_creation {
            if self.store.exists(aggregate_id)? {
                return Err(DispatchError::AlreadyExists);
            }
        } else if !self.store.exists(aggregate_id)? {
            return Err(DispatchError::NotFound);
        }

        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        let decided = aggregate.handle(command).map_err(DispatchError::from)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // Apply in memory before persisting. `apply` is infallible by
        // contract (it must agree with what `handle` just decided); this is
        // a sanity pass, not a domain decision point.
        for ev in &decided {
            aggregate.apply(ev);
        }

        let uncommitted = decided
            .iter()
            .map(|ev| UncommittedEvent::from_typed(aggregate_id, aggregate_type, Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()
            .map_err(DispatchError::from)?;

        let committed = self.store.append(uncommitted, expected)?;

        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Transient(format!("{e:?}")))?;
        }

        Ok(committed)
    }

    /// Dispatch a decoded command, regardless of which aggregate family it
    /// targets. This is the single entry point both the HTTP ingress
    /// adapter and the session queue consumer call into.
    ///
    /// Empty aggregates are constructed through the Aggregate Registry
    /// (`AggregateType::empty`, spec §4.B) rather than calling each
    /// concrete `Canister`/`DeliveryNote` constructor directly.
    pub fn dispatch_decoded(&self, command: DecodedCommand) -> Result<Vec<StoredEvent>, DispatchError> {
        match command {
            DecodedCommand::Canister(cmd) => self.dispatch::<Canister>(cmd, |id| {
                match AggregateType::Canister.empty(id) {
                    AnyAggregate::Canister(canister) => canister,
                    AnyAggregate::DeliveryNote(_) => {
                        unreachable!("AggregateType::Canister always yields AnyAggregate::Canister")
                    }
                }
            }),
            DecodedCommand::Delivery(cmd) => self.dispatch::<DeliveryNote>(cmd, |id| {
                match AggregateType::DeliveryNote.empty(id) {
                    AnyAggregate::DeliveryNote(delivery) => delivery,
                    AnyAggregate::Canister(_) => {
                        unreachable!("AggregateType::DeliveryNote always yields AnyAggregate::DeliveryNote")
                    }
                }
            }),
        }
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(aggregate_id: AggregateId, stream: &[StoredEvent]) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Fatal(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number == 0 || e.sequence_number <= last {
            return Err(DispatchError::Fatal(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            )));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    let mut sorted = history.to_vec();
    sorted.sort_by_key(|e| e.sequence_number);

    for stored in sorted {
        let ev: A::Event = serde_json::from_value(stored.payload)
            .map_err(|e| DispatchError::Fatal(format!("replay deserialization failed: {e}")))?;
        aggregate.apply(&ev);
    }

    Ok(())
}
