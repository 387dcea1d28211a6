//! Search-index projector (spec §4.G).
//!
//! In-memory backing stands in for the search-index mapping, which §1 puts
//! out of scope beyond "what is indexed". Two document families per
//! aggregate: a state document (keyed by MCU for canisters, by item id for
//! delivery items) and an event document (keyed by event id).

use std::collections::HashMap;
use std::sync::RwLock;

use canister_core::AggregateId;
use canister_domain::{parse_check_payload, CanisterEvent, DeliveryEvent, TamperSource, TamperState};

use crate::event_store::StoredEvent;
use crate::projections::relational::ProjectionError;

pub trait SearchIndexProjector: Send + Sync {
    fn project(&self, event: &StoredEvent) -> Result<(), ProjectionError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanisterDoc {
    pub mcu: String,
    pub status: String,
    pub current_volume: f64,
    pub tamper_state: TamperState,
    pub tamper_sources: Vec<TamperSource>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventDoc {
    pub event_type: String,
    pub aggregate_id: String,
}

#[derive(Debug, Default)]
pub struct CanisterSearchProjector {
    canister_docs: RwLock<HashMap<String, CanisterDoc>>,
    /// MCU is the search index's natural key (spec §6: "unique index on
    /// MCU"), but most events only carry the aggregate id; this tracks
    /// which MCU a given aggregate was last indexed under.
    mcu_by_aggregate: RwLock<HashMap<AggregateId, String>>,
    event_docs: RwLock<HashMap<uuid::Uuid, EventDoc>>,
    refill_docs: RwLock<HashMap<uuid::Uuid, f64>>,
}

impl CanisterSearchProjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_by_mcu(&self, mcu: &str) -> Option<CanisterDoc> {
        self.canister_docs.read().expect("lock poisoned").get(mcu).cloned()
    }

    pub fn event_doc_count(&self) -> usize {
        self.event_docs.read().expect("lock poisoned").len()
    }

    fn append_event_doc(&self, event: &StoredEvent) -> Result<(), ProjectionError> {
        let mut docs = self.event_docs.write().map_err(|_| ProjectionError::Write("lock poisoned".into()))?;
        docs.insert(
            event.event_id,
            EventDoc {
                event_type: event.event_type.clone(),
                aggregate_id: event.aggregate_id.to_string(),
            },
        );
        Ok(())
    }
}

impl CanisterSearchProjector {
    fn patch_by_aggregate(&self, aggregate_id: AggregateId, patch: impl FnOnce(&mut CanisterDoc)) -> Result<(), ProjectionError> {
        let mcu_by_aggregate = self.mcu_by_aggregate.read().map_err(|_| ProjectionError::Write("lock poisoned".into()))?;
        let Some(mcu) = mcu_by_aggregate.get(&aggregate_id).cloned() else {
            return Ok(());
        };
        drop(mcu_by_aggregate);

        let mut docs = self.canister_docs.write().map_err(|_| ProjectionError::Write("lock poisoned".into()))?;
        if let Some(doc) = docs.get_mut(&mcu) {
            patch(doc);
        }
        Ok(())
    }
}

impl SearchIndexProjector for CanisterSearchProjector {
    fn project(&self, event: &StoredEvent) -> Result<(), ProjectionError> {
        let decoded: CanisterEvent = serde_json::from_value(event.payload.clone())
            .map_err(|e| ProjectionError::Decode(e.to_string()))?;

        match &decoded {
            CanisterEvent::CanisterCreated(e) => {
                let mut docs = self.canister_docs.write().map_err(|_| ProjectionError::Write("lock poisoned".into()))?;
                docs.insert(
                    e.mcu.clone(),
                    CanisterDoc {
                        mcu: e.mcu.clone(),
                        status: e.status.clone(),
                        current_volume: canister_domain::DEFAULT_VOLUME,
                        tamper_state: TamperState::NoTamper,
                        tamper_sources: Vec::new(),
                    },
                );
                drop(docs);
                let mut index = self.mcu_by_aggregate.write().map_err(|_| ProjectionError::Write("lock poisoned".into()))?;
                index.insert(event.aggregate_id, e.mcu.clone());
            }
            CanisterEvent::CanisterUpdated(e) => {
                let new_mcu = e.mcu.clone();
                self.patch_by_aggregate(event.aggregate_id, |doc| {
                    if let Some(status) = &e.status {
                        doc.status = status.clone();
                    }
                })?;
                if let Some(mcu) = new_mcu {
                    let mut index = self.mcu_by_aggregate.write().map_err(|_| ProjectionError::Write("lock poisoned".into()))?;
                    index.insert(event.aggregate_id, mcu);
                }
            }
            CanisterEvent::CanisterCheck(e) => {
                let decoded_payload = parse_check_payload(&e.payload);
                self.patch_by_aggregate(event.aggregate_id, |doc| {
                    doc.current_volume = decoded_payload.volume;
                    doc.tamper_state = decoded_payload.tamp_state;
                    doc.tamper_sources = decoded_payload.tamp_srcs.into_iter().collect();
                    doc.status = if doc.tamper_state == TamperState::NoTamper {
                        canister_domain::CanisterStatus::READY_FOR_USE.to_string()
                    } else {
                        canister_domain::CanisterStatus::DAMAGED.to_string()
                    };
                })?;
            }
            CanisterEvent::CanisterDamage(_) => {
                self.patch_by_aggregate(event.aggregate_id, |doc| {
                    doc.status = canister_domain::CanisterStatus::DAMAGED.to_string();
                })?;
            }
            CanisterEvent::CanisterRestoreDamage(_) => {
                self.patch_by_aggregate(event.aggregate_id, |doc| {
                    doc.status = canister_domain::CanisterStatus::READY_FOR_USE.to_string();
                })?;
            }
            CanisterEvent::CanisterRestoreTamper(_) => {
                self.patch_by_aggregate(event.aggregate_id, |doc| {
                    doc.tamper_state = TamperState::NoTamper;
                    doc.tamper_sources.clear();
                })?;
            }
            CanisterEvent::CanisterRefillSession(e) => {
                self.patch_by_aggregate(event.aggregate_id, |doc| {
                    doc.current_volume = e.actual_volume;
                })?;
                let mut refill = self.refill_docs.write().map_err(|_| ProjectionError::Write("lock poisoned".into()))?;
                refill.insert(event.event_id, e.actual_volume);
            }
            CanisterEvent::CanisterEntry { .. }
            | CanisterEvent::CanisterExit { .. }
            | CanisterEvent::CanisterOrgCheckIn(_)
            | CanisterEvent::CanisterOrgCheckOut(_)
            | CanisterEvent::CanisterRefillerEntry(_)
            | CanisterEvent::CanisterRefillerExit(_) => {}
        }

        self.append_event_doc(event)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryNoteDoc {
    pub organisation_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryItemDoc {
    pub delivery_id: String,
    pub canister_id: String,
}

#[derive(Debug, Default)]
pub struct DeliverySearchProjector {
    note_docs: RwLock<HashMap<uuid::Uuid, DeliveryNoteDoc>>,
    item_docs: RwLock<HashMap<String, DeliveryItemDoc>>,
}

impl DeliverySearchProjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_item_doc(&self, item_id: &str) -> Option<DeliveryItemDoc> {
        self.item_docs.read().expect("lock poisoned").get(item_id).cloned()
    }
}

impl SearchIndexProjector for DeliverySearchProjector {
    fn project(&self, event: &StoredEvent) -> Result<(), ProjectionError> {
        let decoded: DeliveryEvent = serde_json::from_value(event.payload.clone())
            .map_err(|e| ProjectionError::Decode(e.to_string()))?;

        match decoded {
            DeliveryEvent::DeliveryNoteCreated(e) => {
                let mut notes = self.note_docs.write().map_err(|_| ProjectionError::Write("lock poisoned".into()))?;
                notes.insert(event.aggregate_id.into(), DeliveryNoteDoc { organisation_id: e.organisation_id });
            }
            DeliveryEvent::DeliveryItemsAdded(e) => {
                let mut items = self.item_docs.write().map_err(|_| ProjectionError::Write("lock poisoned".into()))?;
                for item in e.items {
                    items.insert(
                        item.id,
                        DeliveryItemDoc {
                            delivery_id: event.aggregate_id.to_string(),
                            canister_id: item.canister_id.to_string(),
                        },
                    );
                }
            }
            DeliveryEvent::DeliveryItemRemoved(e) => {
                // A missing doc on delete is tolerated (spec §4.G: "a 404 from
                // the search index is non-fatal").
                let mut items = self.item_docs.write().map_err(|_| ProjectionError::Write("lock poisoned".into()))?;
                items.remove(&e.item_id);
            }
        }

        Ok(())
    }
}
