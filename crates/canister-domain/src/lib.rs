//! Canister domain module (event-sourced).
//!
//! This crate contains business rules for the canister and delivery-note
//! aggregates, implemented purely as deterministic domain logic (no IO, no
//! HTTP, no storage). See `SPEC_FULL.md` §4.B.

pub mod canister;
pub mod delivery_note;
pub mod registry;

pub use canister::{
    parse_check_payload, Canister, CanisterCheck, CanisterCommand, CanisterDamage, CanisterEvent,
    CanisterId, CanisterOrgCheckIn, CanisterOrgCheckOut, CanisterRefillSession,
    CanisterRefillerEntry, CanisterRefillerExit, CanisterRestoreDamage, CanisterRestoreTamper,
    CanisterStatus, CheckPayload, CreateCanister, TamperSource, TamperState, UpdateCanister,
    DEFAULT_VOLUME,
};
pub use delivery_note::{
    AddDeliveryItems, CreateDeliveryNote, DeliveryCommand, DeliveryEvent, DeliveryItem,
    DeliveryNote, DeliveryNoteId, RemoveDeliveryItem,
};
pub use registry::{AggregateType, AnyAggregate};

#[cfg(test)]
mod tests {
    use super::*;
    use canister_core::{Aggregate, AggregateId, AggregateRoot};
    use chrono::Utc;
    use serde_json::json;

    fn create_cmd(id: CanisterId) -> CreateCanister {
        CreateCanister {
            canister_id: id,
            tag: "t".into(),
            mcu: "M1".into(),
            model: "m1".into(),
            name: "n1".into(),
            status: CanisterStatus::READY_FOR_USE.to_string(),
            organisation_id: "o-1".into(),
            attributes: json!({}),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn creation_sets_defaults() {
        let id = CanisterId::new(AggregateId::new());
        let mut canister = Canister::empty(id);
        let events = canister.handle(&CanisterCommand::CreateCanister(create_cmd(id))).unwrap();
        assert_eq!(events.len(), 1);
        canister.apply(&events[0]);

        assert_eq!(canister.version(), 1);
        assert_eq!(canister.current_volume(), DEFAULT_VOLUME);
        assert_eq!(canister.tamper_state(), TamperState::NoTamper);
        assert_eq!(canister.status().0, CanisterStatus::READY_FOR_USE);
    }

    #[test]
    fn creation_twice_is_rejected() {
        let id = CanisterId::new(AggregateId::new());
        let mut canister = Canister::empty(id);
        let events = canister.handle(&CanisterCommand::CreateCanister(create_cmd(id))).unwrap();
        canister.apply(&events[0]);

        let err = canister
            .handle(&CanisterCommand::CreateCanister(create_cmd(id)))
            .unwrap_err();
        assert_eq!(err, canister_core::DomainError::already_exists());
    }

    #[test]
    fn non_creation_on_empty_aggregate_is_not_found() {
        let id = CanisterId::new(AggregateId::new());
        let canister = Canister::empty(id);
        let err = canister
            .handle(&CanisterCommand::CanisterDamage(CanisterDamage {
                canister_id: id,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, canister_core::DomainError::not_found());
    }

    #[test]
    fn tamper_parsing_no_tamper() {
        let decoded = parse_check_payload(r#"{"temp_obj":{},"volume":18.2,"tamp_state":0,"tamp_srcs":[0]}"#);
        assert_eq!(decoded.tamp_state, TamperState::NoTamper);
        assert_eq!(decoded.volume, 18.2);
    }

    #[test]
    fn tamper_parsing_tampered_with_switch() {
        let decoded = parse_check_payload(r#"{"temp_obj":{},"volume":5.0,"tamp_state":1,"tamp_srcs":[2]}"#);
        assert_eq!(decoded.tamp_state, TamperState::Tampered);
        assert!(decoded.tamp_srcs.contains(&TamperSource::TamperSwitch));
    }

    #[test]
    fn tamper_parsing_degrades_on_missing_fields() {
        let decoded = parse_check_payload(r#"{"volume":2.0}"#);
        assert_eq!(decoded.tamp_state, TamperState::NoTamper);
        assert!(decoded.tamp_srcs.is_empty());
        assert_eq!(decoded.volume, 2.0);
    }

    #[test]
    fn check_event_updates_status_to_damaged() {
        let id = CanisterId::new(AggregateId::new());
        let mut canister = Canister::empty(id);
        let create = canister.handle(&CanisterCommand::CreateCanister(create_cmd(id))).unwrap();
        canister.apply(&create[0]);

        let check = CanisterCheck {
            canister_id: id,
            payload: r#"{"temp_obj":{},"volume":5.0,"tamp_state":1,"tamp_srcs":[2]}"#.into(),
            occurred_at: Utc::now(),
        };
        let events = canister.handle(&CanisterCommand::CanisterCheck(check)).unwrap();
        canister.apply(&events[0]);

        assert_eq!(canister.status().0, CanisterStatus::DAMAGED);
        assert_eq!(canister.current_volume(), 5.0);
    }

    #[test]
    fn damage_then_restore_round_trip() {
        let id = CanisterId::new(AggregateId::new());
        let mut canister = Canister::empty(id);
        let create = canister.handle(&CanisterCommand::CreateCanister(create_cmd(id))).unwrap();
        canister.apply(&create[0]);

        let damage = canister
            .handle(&CanisterCommand::CanisterDamage(CanisterDamage {
                canister_id: id,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        canister.apply(&damage[0]);
        assert_eq!(canister.status().0, CanisterStatus::DAMAGED);

        let restore = canister
            .handle(&CanisterCommand::CanisterRestoreDamage(CanisterRestoreDamage {
                canister_id: id,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        canister.apply(&restore[0]);
        assert_eq!(canister.status().0, CanisterStatus::READY_FOR_USE);
    }

    #[test]
    fn delivery_item_remove_is_noop_when_missing() {
        let id = DeliveryNoteId(AggregateId::new());
        let mut note = DeliveryNote::empty(id);
        let created = note
            .handle(&DeliveryCommand::CreateDeliveryNote(CreateDeliveryNote {
                delivery_id: id,
                organisation_id: "o-1".into(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        note.apply(&created[0]);

        let removed = note
            .handle(&DeliveryCommand::RemoveDeliveryItem(RemoveDeliveryItem {
                delivery_id: id,
                item_id: "does-not-exist".into(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        note.apply(&removed[0]);
        assert!(note.items().is_empty());
    }

    #[test]
    fn event_payload_round_trips_through_serde() {
        let id = CanisterId::new(AggregateId::new());
        let event = CanisterEvent::CanisterCreated(create_cmd(id));
        let json = serde_json::to_value(&event).unwrap();
        let decoded: CanisterEvent = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(event, decoded);
        let reencoded = serde_json::to_value(&decoded).unwrap();
        assert_eq!(json, reencoded);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    proptest! {
        /// Any string at all, JSON or not, must decode to a `CheckPayload`
        /// without panicking — producers send malformed payloads and the
        /// aggregate must degrade rather than poison the stream.
        #[test]
        fn parse_check_payload_never_panics(raw in ".*") {
            let _ = parse_check_payload(&raw);
        }

        /// A well-formed payload round-trips its volume and tamper fields
        /// exactly; extra unknown keys are ignored rather than rejected.
        #[test]
        fn parse_check_payload_round_trips_known_fields(
            volume in -1000.0f64..1000.0,
            tamp_state in 0i64..3,
            extra_key in "[a-z]{1,8}",
        ) {
            let raw = json!({
                "volume": volume,
                "tamp_state": tamp_state,
                "tamp_srcs": [],
                extra_key: "ignored",
            })
            .to_string();

            let decoded = parse_check_payload(&raw);
            prop_assert_eq!(decoded.volume, volume);
            prop_assert_eq!(decoded.tamp_state, TamperState::from_code(tamp_state));
            prop_assert!(decoded.tamp_srcs.is_empty());
        }
    }
}
