use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;

use canister_core::{Aggregate, AggregateRoot, AggregateId, DomainError, MovementId};
use canister_events::{Command, Event};

/// Canister aggregate identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanisterId(pub AggregateId);

impl CanisterId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CanisterId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Lifecycle status. Modeled as an open string set (`ReadyForUse`,
/// `Damaged`, and any extension value a producer sends through
/// `UpdateCanister`) rather than a closed enum, per spec's "status ∈
/// {ReadyForUse, Damaged, …}".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanisterStatus(pub String);

impl CanisterStatus {
    pub const READY_FOR_USE: &'static str = "ReadyForUse";
    pub const DAMAGED: &'static str = "Damaged";

    pub fn ready_for_use() -> Self {
        Self(Self::READY_FOR_USE.to_string())
    }

    pub fn damaged() -> Self {
        Self(Self::DAMAGED.to_string())
    }
}

/// Integer-to-string tamper state encoding. Part of the core contract:
/// both the aggregate and the relational projector must parse
/// `CanisterCheck` payloads identically.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TamperState {
    NoTamper,
    Tampered,
    UnknownTamperState,
}

impl TamperState {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => TamperState::NoTamper,
            1 => TamperState::Tampered,
            _ => TamperState::UnknownTamperState,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TamperState::NoTamper => "NO_TAMPER",
            TamperState::Tampered => "TAMPERED",
            TamperState::UnknownTamperState => "UNKNOWN_TAMPER_STATE",
        }
    }
}

/// Integer-to-string tamper source encoding (see `TamperState`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TamperSource {
    NoTamper,
    Emi,
    TamperSwitch,
    UnknownTamperSource,
}

impl TamperSource {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => TamperSource::NoTamper,
            1 => TamperSource::Emi,
            2 => TamperSource::TamperSwitch,
            _ => TamperSource::UnknownTamperSource,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TamperSource::NoTamper => "NO_TAMPER",
            TamperSource::Emi => "EMI",
            TamperSource::TamperSwitch => "TAMPER_SWITCH",
            TamperSource::UnknownTamperSource => "UNKNOWN_TAMPER_SOURCE",
        }
    }
}

/// Decoded form of a `CanisterCheck` event's embedded string payload.
///
/// Producers send `{temp_obj, volume, tamp_state, tamp_srcs}` JSON encoded
/// as a string. Missing fields degrade to zero/empty rather than failing
/// the parse (open question in spec resolved this way: a malformed or
/// partial payload must not poison the aggregate or the projection).
#[derive(Debug, Clone, PartialEq)]
pub struct CheckPayload {
    pub temp_obj: JsonValue,
    pub volume: f64,
    pub tamp_state: TamperState,
    pub tamp_srcs: BTreeSet<TamperSource>,
}

/// Parse a `CanisterCheck` payload string. Shared by the aggregate's
/// `apply` and the relational projector so both sides agree on the
/// decoded state.
pub fn parse_check_payload(raw: &str) -> CheckPayload {
    let parsed: JsonValue = serde_json::from_str(raw).unwrap_or(JsonValue::Null);

    let temp_obj = parsed.get("temp_obj").cloned().unwrap_or(JsonValue::Null);
    let volume = parsed
        .get("volume")
        .and_then(JsonValue::as_f64)
        .unwrap_or(0.0);
    let tamp_state = parsed
        .get("tamp_state")
        .and_then(JsonValue::as_i64)
        .map(TamperState::from_code)
        .unwrap_or(TamperState::NoTamper);
    let tamp_srcs = parsed
        .get("tamp_srcs")
        .and_then(JsonValue::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(JsonValue::as_i64)
                .map(TamperSource::from_code)
                .collect()
        })
        .unwrap_or_default();

    CheckPayload {
        temp_obj,
        volume,
        tamp_state,
        tamp_srcs,
    }
}

/// Aggregate root: Canister.
#[derive(Debug, Clone, PartialEq)]
pub struct Canister {
    id: CanisterId,
    created: bool,
    version: u64,

    organisation_id: String,
    tag: String,
    mcu: String,
    model: String,
    name: String,
    status: CanisterStatus,
    attributes: JsonValue,

    current_temperature: JsonValue,
    current_volume: f64,
    tamper_state: TamperState,
    tamper_sources: BTreeSet<TamperSource>,
    last_movement_id: Option<MovementId>,
}

/// Volume assigned to a freshly created canister, per spec §3.
pub const DEFAULT_VOLUME: f64 = 20.0;

impl Canister {
    /// Empty, not-yet-created instance for rehydration.
    pub fn empty(id: CanisterId) -> Self {
        Self {
            id,
            created: false,
            version: 0,
            organisation_id: String::new(),
            tag: String::new(),
            mcu: String::new(),
            model: String::new(),
            name: String::new(),
            status: CanisterStatus(String::new()),
            attributes: JsonValue::Null,
            current_temperature: JsonValue::Null,
            current_volume: 0.0,
            tamper_state: TamperState::NoTamper,
            tamper_sources: BTreeSet::new(),
            last_movement_id: None,
        }
    }

    pub fn id_typed(&self) -> CanisterId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn organisation_id(&self) -> &str {
        &self.organisation_id
    }

    pub fn status(&self) -> &CanisterStatus {
        &self.status
    }

    pub fn current_volume(&self) -> f64 {
        self.current_volume
    }

    pub fn tamper_state(&self) -> TamperState {
        self.tamper_state
    }

    pub fn tamper_sources(&self) -> &BTreeSet<TamperSource> {
        &self.tamper_sources
    }

    pub fn last_movement_id(&self) -> Option<MovementId> {
        self.last_movement_id
    }
}

impl AggregateRoot for Canister {
    type Id = CanisterId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateCanister {
    pub canister_id: CanisterId,
    pub tag: String,
    pub mcu: String,
    pub model: String,
    pub name: String,
    pub status: String,
    pub organisation_id: String,
    pub attributes: JsonValue,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateCanister {
    pub canister_id: CanisterId,
    pub tag: Option<String>,
    pub mcu: Option<String>,
    pub model: Option<String>,
    pub name: Option<String>,
    pub status: Option<String>,
    pub organisation_id: Option<String>,
    pub attributes: Option<JsonValue>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanisterCheck {
    pub canister_id: CanisterId,
    /// String-encoded JSON: `{temp_obj, volume, tamp_state, tamp_srcs}`.
    pub payload: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanisterDamage {
    pub canister_id: CanisterId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanisterOrgCheckIn {
    pub canister_id: CanisterId,
    pub organisation_id: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanisterOrgCheckOut {
    pub canister_id: CanisterId,
    pub organisation_id: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanisterRestoreDamage {
    pub canister_id: CanisterId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanisterRestoreTamper {
    pub canister_id: CanisterId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanisterRefillerEntry {
    pub canister_id: CanisterId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanisterRefillerExit {
    pub canister_id: CanisterId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanisterRefillSession {
    pub canister_id: CanisterId,
    pub actual_volume: f64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CanisterCommand {
    CreateCanister(CreateCanister),
    UpdateCanister(UpdateCanister),
    CanisterEntry { canister_id: CanisterId, occurred_at: DateTime<Utc> },
    CanisterExit { canister_id: CanisterId, occurred_at: DateTime<Utc> },
    CanisterCheck(CanisterCheck),
    CanisterDamage(CanisterDamage),
    CanisterOrgCheckIn(CanisterOrgCheckIn),
    CanisterOrgCheckOut(CanisterOrgCheckOut),
    CanisterRestoreDamage(CanisterRestoreDamage),
    CanisterRestoreTamper(CanisterRestoreTamper),
    CanisterRefillerEntry(CanisterRefillerEntry),
    CanisterRefillerExit(CanisterRefillerExit),
    CanisterRefillSession(CanisterRefillSession),
}

impl CanisterCommand {
    pub fn canister_id(&self) -> CanisterId {
        match self {
            CanisterCommand::CreateCanister(c) => c.canister_id,
            CanisterCommand::UpdateCanister(c) => c.canister_id,
            CanisterCommand::CanisterEntry { canister_id, .. } => *canister_id,
            CanisterCommand::CanisterExit { canister_id, .. } => *canister_id,
            CanisterCommand::CanisterCheck(c) => c.canister_id,
            CanisterCommand::CanisterDamage(c) => c.canister_id,
            CanisterCommand::CanisterOrgCheckIn(c) => c.canister_id,
            CanisterCommand::CanisterOrgCheckOut(c) => c.canister_id,
            CanisterCommand::CanisterRestoreDamage(c) => c.canister_id,
            CanisterCommand::CanisterRestoreTamper(c) => c.canister_id,
            CanisterCommand::CanisterRefillerEntry(c) => c.canister_id,
            CanisterCommand::CanisterRefillerExit(c) => c.canister_id,
            CanisterCommand::CanisterRefillSession(c) => c.canister_id,
        }
    }
}

impl Command for CanisterCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        self.canister_id().0
    }

    fn aggregate_type(&self) -> &'static str {
        "Canister"
    }

    fn is_creation(&self) -> bool {
        matches!(self, CanisterCommand::CreateCanister(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CanisterEvent {
    CanisterCreated(CreateCanister),
    CanisterUpdated(UpdateCanister),
    CanisterEntry { canister_id: CanisterId, movement_id: MovementId, occurred_at: DateTime<Utc> },
    CanisterExit { canister_id: CanisterId, movement_id: MovementId, occurred_at: DateTime<Utc> },
    CanisterCheck(CanisterCheck),
    CanisterDamage(CanisterDamage),
    CanisterOrgCheckIn(CanisterOrgCheckIn),
    CanisterOrgCheckOut(CanisterOrgCheckOut),
    CanisterRestoreDamage(CanisterRestoreDamage),
    CanisterRestoreTamper(CanisterRestoreTamper),
    CanisterRefillerEntry(CanisterRefillerEntry),
    CanisterRefillerExit(CanisterRefillerExit),
    CanisterRefillSession(CanisterRefillSession),
}

impl Event for CanisterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CanisterEvent::CanisterCreated(_) => "canister.created",
            CanisterEvent::CanisterUpdated(_) => "canister.updated",
            CanisterEvent::CanisterEntry { .. } => "canister.entry",
            CanisterEvent::CanisterExit { .. } => "canister.exit",
            CanisterEvent::CanisterCheck(_) => "canister.check",
            CanisterEvent::CanisterDamage(_) => "canister.damaged",
            CanisterEvent::CanisterOrgCheckIn(_) => "canister.org_check_in",
            CanisterEvent::CanisterOrgCheckOut(_) => "canister.org_check_out",
            CanisterEvent::CanisterRestoreDamage(_) => "canister.restore_damage",
            CanisterEvent::CanisterRestoreTamper(_) => "canister.restore_tamper",
            CanisterEvent::CanisterRefillerEntry(_) => "canister.refiller_entry",
            CanisterEvent::CanisterRefillerExit(_) => "canister.refiller_exit",
            CanisterEvent::CanisterRefillSession(_) => "canister.refill_session",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CanisterEvent::CanisterCreated(e) => e.occurred_at,
            CanisterEvent::CanisterUpdated(e) => e.occurred_at,
            CanisterEvent::CanisterEntry { occurred_at, .. } => *occurred_at,
            CanisterEvent::CanisterExit { occurred_at, .. } => *occurred_at,
            CanisterEvent::CanisterCheck(e) => e.occurred_at,
            CanisterEvent::CanisterDamage(e) => e.occurred_at,
            CanisterEvent::CanisterOrgCheckIn(e) => e.occurred_at,
            CanisterEvent::CanisterOrgCheckOut(e) => e.occurred_at,
            CanisterEvent::CanisterRestoreDamage(e) => e.occurred_at,
            CanisterEvent::CanisterRestoreTamper(e) => e.occurred_at,
            CanisterEvent::CanisterRefillerEntry(e) => e.occurred_at,
            CanisterEvent::CanisterRefillerExit(e) => e.occurred_at,
            CanisterEvent::CanisterRefillSession(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Canister {
    type Command = CanisterCommand;
    type Event = CanisterEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CanisterEvent::CanisterCreated(e) => {
                self.id = e.canister_id;
                self.tag = e.tag.clone();
                self.mcu = e.mcu.clone();
                self.model = e.model.clone();
                self.name = e.name.clone();
                self.status = CanisterStatus(e.status.clone());
                self.organisation_id = e.organisation_id.clone();
                self.attributes = e.attributes.clone();
                self.current_volume = DEFAULT_VOLUME;
                self.tamper_state = TamperState::NoTamper;
                self.tamper_sources = BTreeSet::new();
                self.created = true;
            }
            CanisterEvent::CanisterUpdated(e) => {
                if let Some(tag) = &e.tag {
                    self.tag = tag.clone();
                }
                if let Some(mcu) = &e.mcu {
                    self.mcu = mcu.clone();
                }
                if let Some(model) = &e.model {
                    self.model = model.clone();
                }
                if let Some(name) = &e.name {
                    self.name = name.clone();
                }
                if let Some(status) = &e.status {
                    self.status = CanisterStatus(status.clone());
                }
                if let Some(org) = &e.organisation_id {
                    self.organisation_id = org.clone();
                }
                if let Some(attrs) = &e.attributes {
                    self.attributes = attrs.clone();
                }
            }
            CanisterEvent::CanisterEntry { movement_id, .. } => {
                self.last_movement_id = Some(*movement_id);
            }
            CanisterEvent::CanisterExit { movement_id, .. } => {
                self.last_movement_id = Some(*movement_id);
            }
            CanisterEvent::CanisterCheck(e) => {
                let decoded = parse_check_payload(&e.payload);
                self.current_temperature = decoded.temp_obj;
                self.current_volume = decoded.volume;
                self.tamper_state = decoded.tamp_state;
                self.tamper_sources = decoded.tamp_srcs;
                self.status = if self.tamper_state == TamperState::NoTamper {
                    CanisterStatus::ready_for_use()
                } else {
                    CanisterStatus::damaged()
                };
            }
            CanisterEvent::CanisterDamage(_) => {
                self.status = CanisterStatus::damaged();
            }
            CanisterEvent::CanisterRestoreDamage(_) => {
                self.status = CanisterStatus::ready_for_use();
            }
            CanisterEvent::CanisterRestoreTamper(_) => {
                self.tamper_state = TamperState::NoTamper;
                self.tamper_sources.clear();
            }
            CanisterEvent::CanisterOrgCheckIn(_)
            | CanisterEvent::CanisterOrgCheckOut(_)
            | CanisterEvent::CanisterRefillerEntry(_)
            | CanisterEvent::CanisterRefillerExit(_) => {
                // Recorded on the stream; no state mutation beyond that.
            }
            CanisterEvent::CanisterRefillSession(e) => {
                self.current_volume = e.actual_volume;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CanisterCommand::CreateCanister(cmd) => self.handle_create(cmd),
            CanisterCommand::UpdateCanister(cmd) => self.handle_update(cmd),
            CanisterCommand::CanisterEntry { canister_id, occurred_at } => {
                self.ensure_exists(*canister_id)?;
                Ok(vec![CanisterEvent::CanisterEntry {
                    canister_id: *canister_id,
                    movement_id: MovementId::new(),
                    occurred_at: *occurred_at,
                }])
            }
            CanisterCommand::CanisterExit { canister_id, occurred_at } => {
                self.ensure_exists(*canister_id)?;
                Ok(vec![CanisterEvent::CanisterExit {
                    canister_id: *canister_id,
                    movement_id: MovementId::new(),
                    occurred_at: *occurred_at,
                }])
            }
            CanisterCommand::CanisterCheck(cmd) => {
                self.ensure_exists(cmd.canister_id)?;
                Ok(vec![CanisterEvent::CanisterCheck(cmd.clone())])
            }
            CanisterCommand::CanisterDamage(cmd) => {
                self.ensure_exists(cmd.canister_id)?;
                Ok(vec![CanisterEvent::CanisterDamage(cmd.clone())])
            }
            CanisterCommand::CanisterOrgCheckIn(cmd) => {
                self.ensure_exists(cmd.canister_id)?;
                Ok(vec![CanisterEvent::CanisterOrgCheckIn(cmd.clone())])
            }
            CanisterCommand::CanisterOrgCheckOut(cmd) => {
                self.ensure_exists(cmd.canister_id)?;
                Ok(vec![CanisterEvent::CanisterOrgCheckOut(cmd.clone())])
            }
            CanisterCommand::CanisterRestoreDamage(cmd) => {
                self.ensure_exists(cmd.canister_id)?;
                Ok(vec![CanisterEvent::CanisterRestoreDamage(cmd.clone())])
            }
            CanisterCommand::CanisterRestoreTamper(cmd) => {
                self.ensure_exists(cmd.canister_id)?;
                Ok(vec![CanisterEvent::CanisterRestoreTamper(cmd.clone())])
            }
            CanisterCommand::CanisterRefillerEntry(cmd) => {
                self.ensure_exists(cmd.canister_id)?;
                Ok(vec![CanisterEvent::CanisterRefillerEntry(cmd.clone())])
            }
            CanisterCommand::CanisterRefillerExit(cmd) => {
                self.ensure_exists(cmd.canister_id)?;
                Ok(vec![CanisterEvent::CanisterRefillerExit(cmd.clone())])
            }
            CanisterCommand::CanisterRefillSession(cmd) => {
                self.ensure_exists(cmd.canister_id)?;
                Ok(vec![CanisterEvent::CanisterRefillSession(cmd.clone())])
            }
        }
    }
}

impl Canister {
    fn ensure_exists(&self, canister_id: CanisterId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != canister_id {
            return Err(DomainError::invariant("canister_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateCanister) -> Result<Vec<CanisterEvent>, DomainError> {
        if self.created {
            return Err(DomainError::already_exists());
        }
        if cmd.tag.trim().is_empty() {
            return Err(DomainError::validation("tag cannot be empty"));
        }
        if cmd.organisation_id.trim().is_empty() {
            return Err(DomainError::validation("organisation_id cannot be empty"));
        }
        Ok(vec![CanisterEvent::CanisterCreated(cmd.clone())])
    }

    fn handle_update(&self, cmd: &UpdateCanister) -> Result<Vec<CanisterEvent>, DomainError> {
        self.ensure_exists(cmd.canister_id)?;
        Ok(vec![CanisterEvent::CanisterUpdated(cmd.clone())])
    }
}
