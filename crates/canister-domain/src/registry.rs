use core::str::FromStr;

use canister_core::DomainError;

use crate::canister::{Canister, CanisterId};
use crate::delivery_note::{DeliveryNote, DeliveryNoteId};

/// Stable tag stored as `StoredEvent::aggregate_type` in the event log.
///
/// This is the Aggregate Registry's type-tag table (spec §4.B): given a
/// tag, know how to construct an empty aggregate of that type. Event
/// (de)serialization is not a separate table here — `serde`'s derive on
/// each aggregate's event enum already gives an exhaustive,
/// compiler-checked mapping (see `SPEC_FULL.md` §4.B).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AggregateType {
    Canister,
    DeliveryNote,
}

impl AggregateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateType::Canister => "Canister",
            AggregateType::DeliveryNote => "DeliveryNote",
        }
    }
}

impl core::fmt::Display for AggregateType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Canister" => Ok(AggregateType::Canister),
            "DeliveryNote" => Ok(AggregateType::DeliveryNote),
            other => Err(DomainError::validation(format!(
                "unknown aggregate_type '{other}'"
            ))),
        }
    }
}

/// Construct an empty aggregate of the given type, ready for replay.
pub enum AnyAggregate {
    Canister(Canister),
    DeliveryNote(DeliveryNote),
}

impl AggregateType {
    pub fn empty(&self, id: canister_core::AggregateId) -> AnyAggregate {
        match self {
            AggregateType::Canister => AnyAggregate::Canister(Canister::empty(CanisterId::new(id))),
            AggregateType::DeliveryNote => {
                AnyAggregate::DeliveryNote(DeliveryNote::empty(DeliveryNoteId(id)))
            }
        }
    }
}
