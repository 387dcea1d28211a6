use serde::{Deserialize, Serialize};
use uuid::Uuid;

use canister_core::AggregateId;

/// Envelope for an event, containing stream metadata.
///
/// An `EventEnvelope` wraps a domain event with the infrastructure metadata
/// needed for event sourcing: which stream it belongs to and where in that
/// stream it sits. This is the **unit of publication** - what the Command
/// Router hands to the `EventBus` after a successful append.
///
/// ## Why Envelopes?
///
/// Envelopes separate **infrastructure concerns** (ordering, identity,
/// stream membership) from **domain concerns** (business events). The
/// domain defines events; the infrastructure wraps them in envelopes for
/// transport.
///
/// ## Sequence Numbers
///
/// `sequence_number` provides:
/// - **Ordering**: events are processed in sequence number order
/// - **Idempotency**: duplicate events (same sequence number) can be detected
/// - **Optimistic concurrency**: version checking prevents concurrent writes
///
/// Sequence numbers are monotonically increasing per aggregate stream. They
/// start at 1 (0 is invalid) and increment by 1 for each appended event.
///
/// ## Generic Payload
///
/// The `E` type parameter allows envelopes to carry different payload types:
/// `EventEnvelope<serde_json::Value>` for transport (what the event bus
/// actually moves around), or `EventEnvelope<CanisterEvent>` once a caller
/// has decoded the payload into a typed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,

    aggregate_id: AggregateId,
    aggregate_type: String,

    /// Monotonically increasing position in the aggregate stream.
    sequence_number: u64,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
