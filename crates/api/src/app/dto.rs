//! JSON mapping between read-model rows and wire responses.

use canister_infra::event_store::StoredEvent;
use canister_infra::projections::{CanisterRow, DeliveryItemRow, DeliveryNoteRow};

pub fn committed_to_json(committed: &[StoredEvent]) -> serde_json::Value {
    serde_json::json!({
        "events_committed": committed.len(),
        "stream_version": committed.last().map(|e| e.sequence_number).unwrap_or(0),
    })
}

pub fn canister_row_to_json(row: CanisterRow) -> serde_json::Value {
    serde_json::json!({
        "id": row.aggregate_id.to_string(),
        "tag": row.tag,
        "mcu": row.mcu,
        "model": row.model,
        "name": row.name,
        "status": row.status,
        "organisation_id": row.organisation_id,
        "attributes": row.attributes,
        "current_temperature": row.current_temperature,
        "current_volume": row.current_volume,
        "tamper_state": row.tamper_state.as_str(),
        "tamper_sources": row.tamper_sources.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
    })
}

pub fn delivery_note_row_to_json(row: DeliveryNoteRow, items: Vec<DeliveryItemRow>) -> serde_json::Value {
    serde_json::json!({
        "id": row.aggregate_id.to_string(),
        "organisation_id": row.organisation_id,
        "status": row.status,
        "items": items.into_iter().map(delivery_item_row_to_json).collect::<Vec<_>>(),
    })
}

fn delivery_item_row_to_json(row: DeliveryItemRow) -> serde_json::Value {
    serde_json::json!({
        "item_id": row.item_id,
        "canister_id": row.canister_id.to_string(),
        "delivered": row.delivered,
    })
}
