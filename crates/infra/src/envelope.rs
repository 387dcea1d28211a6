//! Command envelope decoding, shared by the HTTP ingress adapter (§4.E) and
//! the session queue consumer (§4.D).
//!
//! Outer shape: `{eventType: string, data: object}`. When `eventType` is not
//! recognized, the queue consumer additionally tries the fallback shape — a
//! flat object carrying a top-level `ev` field — to preserve producer
//! back-compat (spec §6).

use chrono::Utc;
use serde_json::Value as JsonValue;
use thiserror::Error;

use canister_core::{AggregateId, DomainError};
use canister_domain::{
    AddDeliveryItems, CanisterCheck, CanisterCommand, CanisterDamage, CanisterOrgCheckIn,
    CanisterOrgCheckOut, CanisterRefillSession, CanisterRefillerEntry, CanisterRefillerExit,
    CanisterRestoreDamage, CanisterRestoreTamper, CanisterStatus, CreateCanister,
    CreateDeliveryNote, DeliveryCommand, DeliveryItem, DeliveryNoteId, RemoveDeliveryItem,
    UpdateCanister,
};

/// The decoded outer `{eventType, data}` envelope, before it is resolved to
/// a typed command.
#[derive(Debug, Clone)]
pub struct OuterEnvelope {
    pub event_type: String,
    pub data: JsonValue,
}

/// A command decoded from either the HTTP surface or the queue, not yet
/// known to belong to a particular aggregate instance beyond its id.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedCommand {
    Canister(CanisterCommand),
    Delivery(DeliveryCommand),
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("unrecognized eventType '{0}'")]
    UnknownEventType(String),
    #[error("bad input: {0}")]
    BadInput(String),
}

impl From<DomainError> for EnvelopeError {
    fn from(value: DomainError) -> Self {
        EnvelopeError::BadInput(value.to_string())
    }
}

/// Decode the outer `{eventType, data}` shape into a typed command.
///
/// `mint_id` is consulted only for creation commands whose `data` omits an
/// aggregate id (spec §4.E: "the one place that may mint a new aggregate id
/// when a creation request omits it").
pub fn decode_outer(
    outer: &OuterEnvelope,
    mint_id: impl FnOnce() -> AggregateId,
) -> Result<DecodedCommand, EnvelopeError> {
    match outer.event_type.as_str() {
        "CreateCanister" => Ok(DecodedCommand::Canister(CanisterCommand::CreateCanister(
            decode_create_canister(&outer.data, mint_id)?,
        ))),
        "UpdateCanister" => Ok(DecodedCommand::Canister(CanisterCommand::UpdateCanister(
            decode_update_canister(&outer.data)?,
        ))),
        "CanisterEntry" => Ok(DecodedCommand::Canister(CanisterCommand::CanisterEntry {
            canister_id: canister_id_field(&outer.data)?,
            occurred_at: occurred_at_field(&outer.data),
        })),
        "CanisterExit" => Ok(DecodedCommand::Canister(CanisterCommand::CanisterExit {
            canister_id: canister_id_field(&outer.data)?,
            occurred_at: occurred_at_field(&outer.data),
        })),
        "CanisterCheck" => Ok(DecodedCommand::Canister(CanisterCommand::CanisterCheck(
            CanisterCheck {
                canister_id: canister_id_field(&outer.data)?,
                payload: string_field(&outer.data, "payload").unwrap_or_default(),
                occurred_at: occurred_at_field(&outer.data),
            },
        ))),
        "CanisterDamage" => Ok(DecodedCommand::Canister(CanisterCommand::CanisterDamage(
            CanisterDamage {
                canister_id: canister_id_field(&outer.data)?,
                occurred_at: occurred_at_field(&outer.data),
            },
        ))),
        "CanisterOrgCheckIn" => Ok(DecodedCommand::Canister(CanisterCommand::CanisterOrgCheckIn(
            CanisterOrgCheckIn {
                canister_id: canister_id_field(&outer.data)?,
                organisation_id: organisation_id_field(&outer.data)?,
                occurred_at: occurred_at_field(&outer.data),
            },
        ))),
        "CanisterOrgCheckOut" => Ok(DecodedCommand::Canister(CanisterCommand::CanisterOrgCheckOut(
            CanisterOrgCheckOut {
                canister_id: canister_id_field(&outer.data)?,
                organisation_id: organisation_id_field(&outer.data)?,
                occurred_at: occurred_at_field(&outer.data),
            },
        ))),
        "CanisterRestoreDamage" => Ok(DecodedCommand::Canister(CanisterCommand::CanisterRestoreDamage(
            CanisterRestoreDamage {
                canister_id: canister_id_field(&outer.data)?,
                occurred_at: occurred_at_field(&outer.data),
            },
        ))),
        "CanisterRestoreTamper" => Ok(DecodedCommand::Canister(CanisterCommand::CanisterRestoreTamper(
            CanisterRestoreTamper {
                canister_id: canister_id_field(&outer.data)?,
                occurred_at: occurred_at_field(&outer.data),
            },
        ))),
        "CanisterRefillerEntry" => Ok(DecodedCommand::Canister(CanisterCommand::CanisterRefillerEntry(
            CanisterRefillerEntry {
                canister_id: canister_id_field(&outer.data)?,
                occurred_at: occurred_at_field(&outer.data),
            },
        ))),
        "CanisterRefillerExit" => Ok(DecodedCommand::Canister(CanisterCommand::CanisterRefillerExit(
            CanisterRefillerExit {
                canister_id: canister_id_field(&outer.data)?,
                occurred_at: occurred_at_field(&outer.data),
            },
        ))),
        "CanisterRefillSession" => Ok(DecodedCommand::Canister(CanisterCommand::CanisterRefillSession(
            CanisterRefillSession {
                canister_id: canister_id_field(&outer.data)?,
                actual_volume: f64_field(&outer.data, "actual_volume").unwrap_or(0.0),
                occurred_at: occurred_at_field(&outer.data),
            },
        ))),
        "CreateDeliveryNote" => Ok(DecodedCommand::Delivery(DeliveryCommand::CreateDeliveryNote(
            decode_create_delivery_note(&outer.data, mint_id)?,
        ))),
        "AddDeliveryNoteItem" => Ok(DecodedCommand::Delivery(DeliveryCommand::AddDeliveryItems(
            decode_add_delivery_items(&outer.data)?,
        ))),
        "RemoveDeliveryNoteItem" => Ok(DecodedCommand::Delivery(DeliveryCommand::RemoveDeliveryItem(
            RemoveDeliveryItem {
                delivery_id: delivery_id_field(&outer.data)?,
                item_id: string_field(&outer.data, "item_id")
                    .ok_or_else(|| EnvelopeError::BadInput("item_id is required".into()))?,
                occurred_at: occurred_at_field(&outer.data),
            },
        ))),
        other => Err(EnvelopeError::UnknownEventType(other.to_string())),
    }
}

/// Fallback shorthand mapping for queue producers (spec §6): a flat object
/// with a top-level `ev` field and `aggregate_id`, decoded without the
/// `{eventType, data}` wrapper.
pub fn decode_fallback(raw: &JsonValue) -> Result<DecodedCommand, EnvelopeError> {
    let ev = string_field(raw, "ev")
        .ok_or_else(|| EnvelopeError::BadInput("missing 'ev' field".to_string()))?;

    match ev.as_str() {
        "can_entry" => Ok(DecodedCommand::Canister(CanisterCommand::CanisterEntry {
            canister_id: canister_id_field(raw)?,
            occurred_at: occurred_at_field(raw),
        })),
        "can_exit" => Ok(DecodedCommand::Canister(CanisterCommand::CanisterExit {
            canister_id: canister_id_field(raw)?,
            occurred_at: occurred_at_field(raw),
        })),
        "check" => Ok(DecodedCommand::Canister(CanisterCommand::CanisterCheck(CanisterCheck {
            canister_id: canister_id_field(raw)?,
            payload: string_field(raw, "payload").unwrap_or_default(),
            occurred_at: occurred_at_field(raw),
        }))),
        "can_refill" => Ok(DecodedCommand::Canister(CanisterCommand::CanisterRefillSession(
            CanisterRefillSession {
                canister_id: canister_id_field(raw)?,
                actual_volume: f64_field(raw, "actual_volume").unwrap_or(0.0),
                occurred_at: occurred_at_field(raw),
            },
        ))),
        "can_refiller_entry" => Ok(DecodedCommand::Canister(CanisterCommand::CanisterRefillerEntry(
            CanisterRefillerEntry {
                canister_id: canister_id_field(raw)?,
                occurred_at: occurred_at_field(raw),
            },
        ))),
        "can_refiller_exit" => Ok(DecodedCommand::Canister(CanisterCommand::CanisterRefillerExit(
            CanisterRefillerExit {
                canister_id: canister_id_field(raw)?,
                occurred_at: occurred_at_field(raw),
            },
        ))),
        other => Err(EnvelopeError::UnknownEventType(format!("ev:{other}"))),
    }
}

fn decode_create_canister(
    data: &JsonValue,
    mint_id: impl FnOnce() -> AggregateId,
) -> Result<CreateCanister, EnvelopeError> {
    let canister_id = match canister_id_field(data) {
        Ok(id) => id,
        Err(_) => canister_domain::CanisterId::new(mint_id()),
    };

    Ok(CreateCanister {
        canister_id,
        tag: string_field(data, "tag").unwrap_or_default(),
        mcu: string_field(data, "mcu").unwrap_or_default(),
        model: string_field(data, "model").unwrap_or_default(),
        name: string_field(data, "name").unwrap_or_default(),
        status: string_field(data, "status").unwrap_or_else(|| CanisterStatus::READY_FOR_USE.to_string()),
        organisation_id: organisation_id_field(data)?,
        attributes: data.get("attributes").cloned().unwrap_or(JsonValue::Null),
        occurred_at: occurred_at_field(data),
    })
}

fn decode_update_canister(data: &JsonValue) -> Result<UpdateCanister, EnvelopeError> {
    Ok(UpdateCanister {
        canister_id: canister_id_field(data)?,
        tag: string_field(data, "tag"),
        mcu: string_field(data, "mcu"),
        model: string_field(data, "model"),
        name: string_field(data, "name"),
        status: string_field(data, "status"),
        organisation_id: string_field(data, "organisation_id").or_else(|| string_field(data, "organization_id")),
        attributes: data.get("attributes").cloned(),
        occurred_at: occurred_at_field(data),
    })
}

fn decode_create_delivery_note(
    data: &JsonValue,
    mint_id: impl FnOnce() -> AggregateId,
) -> Result<CreateDeliveryNote, EnvelopeError> {
    let delivery_id = match delivery_id_field(data) {
        Ok(id) => id,
        Err(_) => DeliveryNoteId(mint_id()),
    };

    Ok(CreateDeliveryNote {
        delivery_id,
        organisation_id: organisation_id_field(data)?,
        occurred_at: occurred_at_field(data),
    })
}

fn decode_add_delivery_items(data: &JsonValue) -> Result<AddDeliveryItems, EnvelopeError> {
    let items = data
        .get("items")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| EnvelopeError::BadInput("items is required".to_string()))?;

    let items = items
        .iter()
        .map(|item| {
            let id = string_field(item, "id")
                .ok_or_else(|| EnvelopeError::BadInput("delivery item id is required".to_string()))?;
            let canister_id = item
                .get("canister_id")
                .and_then(JsonValue::as_str)
                .ok_or_else(|| EnvelopeError::BadInput("delivery item canister_id is required".to_string()))?
                .parse::<AggregateId>()?;
            Ok(DeliveryItem {
                id,
                canister_id,
                delivered: false,
            })
        })
        .collect::<Result<Vec<_>, EnvelopeError>>()?;

    Ok(AddDeliveryItems {
        delivery_id: delivery_id_field(data)?,
        items,
        occurred_at: occurred_at_field(data),
    })
}

fn canister_id_field(data: &JsonValue) -> Result<canister_domain::CanisterId, EnvelopeError> {
    aggregate_id_field(data).map(canister_domain::CanisterId::new)
}

fn delivery_id_field(data: &JsonValue) -> Result<DeliveryNoteId, EnvelopeError> {
    aggregate_id_field(data).map(DeliveryNoteId)
}

fn aggregate_id_field(data: &JsonValue) -> Result<AggregateId, EnvelopeError> {
    string_field(data, "aggregate_id")
        .or_else(|| string_field(data, "canister_id"))
        .or_else(|| string_field(data, "delivery_id"))
        .ok_or_else(|| EnvelopeError::BadInput("aggregate_id is required".to_string()))?
        .parse::<AggregateId>()
        .map_err(EnvelopeError::from)
}

fn organisation_id_field(data: &JsonValue) -> Result<String, EnvelopeError> {
    string_field(data, "organisation_id")
        .or_else(|| string_field(data, "organization_id"))
        .ok_or_else(|| EnvelopeError::BadInput("organisation_id is required".to_string()))
}

fn string_field(data: &JsonValue, key: &str) -> Option<String> {
    data.get(key).and_then(JsonValue::as_str).map(str::to_string)
}

fn f64_field(data: &JsonValue, key: &str) -> Option<f64> {
    data.get(key).and_then(JsonValue::as_f64)
}

/// Producers rarely send a timestamp; the ingress edges stamp one at decode
/// time rather than rejecting the message.
fn occurred_at_field(data: &JsonValue) -> chrono::DateTime<Utc> {
    data.get("occurred_at")
        .and_then(JsonValue::as_str)
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}
