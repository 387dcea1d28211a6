//! Relational read-model projector (spec §4.G).
//!
//! In-memory backing store standing in for the relational schema the spec
//! puts out of scope (§1): "the relational schema details beyond what the
//! projection requires" are not specified, so this keeps only the fields
//! §4.G actually names.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use canister_core::AggregateId;
use canister_domain::{parse_check_payload, CanisterEvent, DeliveryEvent, TamperSource, TamperState};

use crate::event_store::StoredEvent;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to decode event payload: {0}")]
    Decode(String),
    #[error("projection write failed: {0}")]
    Write(String),
}

/// Applies one event to a relational read model. Implementations must be
/// idempotent: re-applying the same event id produces the same row state.
pub trait RelationalProjector: Send + Sync {
    fn project(&self, event: &StoredEvent) -> Result<(), ProjectionError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanisterRow {
    pub aggregate_id: AggregateId,
    pub tag: String,
    pub mcu: String,
    pub model: String,
    pub name: String,
    pub status: String,
    pub organisation_id: String,
    pub attributes: JsonValue,
    pub current_temperature: JsonValue,
    pub current_volume: f64,
    pub tamper_state: TamperState,
    pub tamper_sources: Vec<TamperSource>,
}

#[derive(Debug, Default)]
pub struct CanisterRelationalProjector {
    rows: RwLock<HashMap<AggregateId, CanisterRow>>,
}

impl CanisterRelationalProjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, aggregate_id: AggregateId) -> Option<CanisterRow> {
        self.rows.read().expect("lock poisoned").get(&aggregate_id).cloned()
    }

    pub fn list_ready_for_use(&self, organisation_id: &str) -> Vec<CanisterRow> {
        self.rows
            .read()
            .expect("lock poisoned")
            .values()
            .filter(|row| row.organisation_id == organisation_id && row.status == canister_domain::CanisterStatus::READY_FOR_USE)
            .cloned()
            .collect()
    }
}

impl RelationalProjector for CanisterRelationalProjector {
    fn project(&self, event: &StoredEvent) -> Result<(), ProjectionError> {
        let decoded: CanisterEvent = serde_json::from_value(event.payload.clone())
            .map_err(|e| ProjectionError::Decode(e.to_string()))?;

        let mut rows = self.rows.write().map_err(|_| ProjectionError::Write("lock poisoned".into()))?;

        match decoded {
            CanisterEvent::CanisterCreated(e) => {
                rows.insert(
                    event.aggregate_id,
                    CanisterRow {
                        aggregate_id: event.aggregate_id,
                        tag: e.tag,
                        mcu: e.mcu,
                        model: e.model,
                        name: e.name,
                        status: e.status,
                        organisation_id: e.organisation_id,
                        attributes: e.attributes,
                        current_temperature: JsonValue::Null,
                        current_volume: canister_domain::DEFAULT_VOLUME,
                        tamper_state: TamperState::NoTamper,
                        tamper_sources: Vec::new(),
                    },
                );
            }
            CanisterEvent::CanisterUpdated(e) => {
                if let Some(row) = rows.get_mut(&event.aggregate_id) {
                    if let Some(tag) = e.tag {
                        row.tag = tag;
                    }
                    if let Some(mcu) = e.mcu {
                        row.mcu = mcu;
                    }
                    if let Some(model) = e.model {
                        row.model = model;
                    }
                    if let Some(name) = e.name {
                        row.name = name;
                    }
                    if let Some(status) = e.status {
                        row.status = status;
                    }
                    if let Some(org) = e.organisation_id {
                        row.organisation_id = org;
                    }
                    if let Some(attrs) = e.attributes {
                        row.attributes = attrs;
                    }
                }
            }
            CanisterEvent::CanisterCheck(e) => {
                if let Some(row) = rows.get_mut(&event.aggregate_id) {
                    let decoded = parse_check_payload(&e.payload);
                    row.current_temperature = decoded.temp_obj;
                    row.current_volume = decoded.volume;
                    row.tamper_state = decoded.tamp_state;
                    row.tamper_sources = decoded.tamp_srcs.into_iter().collect();
                    row.status = if row.tamper_state == TamperState::NoTamper {
                        canister_domain::CanisterStatus::READY_FOR_USE.to_string()
                    } else {
                        canister_domain::CanisterStatus::DAMAGED.to_string()
                    };
                }
            }
            CanisterEvent::CanisterDamage(_) => {
                if let Some(row) = rows.get_mut(&event.aggregate_id) {
                    row.status = canister_domain::CanisterStatus::DAMAGED.to_string();
                }
            }
            CanisterEvent::CanisterRestoreDamage(_) => {
                if let Some(row) = rows.get_mut(&event.aggregate_id) {
                    row.status = canister_domain::CanisterStatus::READY_FOR_USE.to_string();
                }
            }
            CanisterEvent::CanisterRestoreTamper(_) => {
                if let Some(row) = rows.get_mut(&event.aggregate_id) {
                    row.tamper_state = TamperState::NoTamper;
                    row.tamper_sources.clear();
                }
            }
            CanisterEvent::CanisterRefillSession(e) => {
                if let Some(row) = rows.get_mut(&event.aggregate_id) {
                    row.current_volume = e.actual_volume;
                }
            }
            // Movement-table side left to the implementer (spec §9 open question).
            CanisterEvent::CanisterEntry { .. }
            | CanisterEvent::CanisterExit { .. }
            | CanisterEvent::CanisterOrgCheckIn(_)
            | CanisterEvent::CanisterOrgCheckOut(_)
            | CanisterEvent::CanisterRefillerEntry(_)
            | CanisterEvent::CanisterRefillerExit(_) => {}
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryNoteRow {
    pub aggregate_id: AggregateId,
    pub organisation_id: String,
    pub status: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryItemRow {
    pub delivery_id: AggregateId,
    pub item_id: String,
    pub canister_id: AggregateId,
    pub delivered: bool,
}

#[derive(Debug, Default)]
pub struct DeliveryRelationalProjector {
    notes: RwLock<HashMap<AggregateId, DeliveryNoteRow>>,
    items: RwLock<HashMap<(AggregateId, String), DeliveryItemRow>>,
}

impl DeliveryRelationalProjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_note(&self, aggregate_id: AggregateId) -> Option<DeliveryNoteRow> {
        self.notes.read().expect("lock poisoned").get(&aggregate_id).cloned()
    }

    pub fn items_for(&self, aggregate_id: AggregateId) -> Vec<DeliveryItemRow> {
        self.items
            .read()
            .expect("lock poisoned")
            .values()
            .filter(|row| row.delivery_id == aggregate_id)
            .cloned()
            .collect()
    }
}

impl RelationalProjector for DeliveryRelationalProjector {
    fn project(&self, event: &StoredEvent) -> Result<(), ProjectionError> {
        let decoded: DeliveryEvent = serde_json::from_value(event.payload.clone())
            .map_err(|e| ProjectionError::Decode(e.to_string()))?;

        match decoded {
            DeliveryEvent::DeliveryNoteCreated(e) => {
                let mut notes = self.notes.write().map_err(|_| ProjectionError::Write("lock poisoned".into()))?;
                notes.insert(
                    event.aggregate_id,
                    DeliveryNoteRow {
                        aggregate_id: event.aggregate_id,
                        organisation_id: e.organisation_id,
                        status: "Created",
                    },
                );
            }
            DeliveryEvent::DeliveryItemsAdded(e) => {
                let mut items = self.items.write().map_err(|_| ProjectionError::Write("lock poisoned".into()))?;
                for item in e.items {
                    items.insert(
                        (event.aggregate_id, item.id.clone()),
                        DeliveryItemRow {
                            delivery_id: event.aggregate_id,
                            item_id: item.id,
                            canister_id: item.canister_id,
                            delivered: item.delivered,
                        },
                    );
                }
            }
            DeliveryEvent::DeliveryItemRemoved(e) => {
                let mut items = self.items.write().map_err(|_| ProjectionError::Write("lock poisoned".into()))?;
                items.remove(&(event.aggregate_id, e.item_id));
            }
        }

        Ok(())
    }
}
