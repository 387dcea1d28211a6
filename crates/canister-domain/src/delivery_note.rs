use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use canister_core::{Aggregate, AggregateRoot, AggregateId, DomainError};
use canister_events::{Command, Event};

/// Delivery note aggregate identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryNoteId(pub AggregateId);

impl core::fmt::Display for DeliveryNoteId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A line item on a delivery note. Producer-supplied `id`, not a UUID
/// (e.g. `"i-1"`), so it is kept as an opaque string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryItem {
    pub id: String,
    pub canister_id: AggregateId,
    pub delivered: bool,
}

/// Aggregate root: DeliveryNote.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryNote {
    id: DeliveryNoteId,
    created: bool,
    version: u64,

    organisation_id: String,
    items: Vec<DeliveryItem>,
}

impl DeliveryNote {
    pub fn empty(id: DeliveryNoteId) -> Self {
        Self {
            id,
            created: false,
            version: 0,
            organisation_id: String::new(),
            items: Vec::new(),
        }
    }

    pub fn id_typed(&self) -> DeliveryNoteId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn organisation_id(&self) -> &str {
        &self.organisation_id
    }

    pub fn items(&self) -> &[DeliveryItem] {
        &self.items
    }
}

impl AggregateRoot for DeliveryNote {
    type Id = DeliveryNoteId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateDeliveryNote {
    pub delivery_id: DeliveryNoteId,
    pub organisation_id: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddDeliveryItems {
    pub delivery_id: DeliveryNoteId,
    pub items: Vec<DeliveryItem>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveDeliveryItem {
    pub delivery_id: DeliveryNoteId,
    pub item_id: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeliveryCommand {
    CreateDeliveryNote(CreateDeliveryNote),
    AddDeliveryItems(AddDeliveryItems),
    RemoveDeliveryItem(RemoveDeliveryItem),
}

impl DeliveryCommand {
    pub fn delivery_id(&self) -> DeliveryNoteId {
        match self {
            DeliveryCommand::CreateDeliveryNote(c) => c.delivery_id,
            DeliveryCommand::AddDeliveryItems(c) => c.delivery_id,
            DeliveryCommand::RemoveDeliveryItem(c) => c.delivery_id,
        }
    }
}

impl Command for DeliveryCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        self.delivery_id().0
    }

    fn aggregate_type(&self) -> &'static str {
        "DeliveryNote"
    }

    fn is_creation(&self) -> bool {
        matches!(self, DeliveryCommand::CreateDeliveryNote(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeliveryEvent {
    DeliveryNoteCreated(CreateDeliveryNote),
    DeliveryItemsAdded(AddDeliveryItems),
    DeliveryItemRemoved(RemoveDeliveryItem),
}

impl Event for DeliveryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DeliveryEvent::DeliveryNoteCreated(_) => "delivery_note.created",
            DeliveryEvent::DeliveryItemsAdded(_) => "delivery_note.items_added",
            DeliveryEvent::DeliveryItemRemoved(_) => "delivery_note.item_removed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DeliveryEvent::DeliveryNoteCreated(e) => e.occurred_at,
            DeliveryEvent::DeliveryItemsAdded(e) => e.occurred_at,
            DeliveryEvent::DeliveryItemRemoved(e) => e.occurred_at,
        }
    }
}

impl Aggregate for DeliveryNote {
    type Command = DeliveryCommand;
    type Event = DeliveryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DeliveryEvent::DeliveryNoteCreated(e) => {
                self.id = e.delivery_id;
                self.organisation_id = e.organisation_id.clone();
                self.created = true;
            }
            DeliveryEvent::DeliveryItemsAdded(e) => {
                self.items.extend(e.items.iter().cloned());
            }
            DeliveryEvent::DeliveryItemRemoved(e) => {
                if let Some(pos) = self.items.iter().position(|i| i.id == e.item_id) {
                    self.items.remove(pos);
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            DeliveryCommand::CreateDeliveryNote(cmd) => self.handle_create(cmd),
            DeliveryCommand::AddDeliveryItems(cmd) => self.handle_add_items(cmd),
            DeliveryCommand::RemoveDeliveryItem(cmd) => self.handle_remove_item(cmd),
        }
    }
}

impl DeliveryNote {
    fn ensure_exists(&self, delivery_id: DeliveryNoteId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != delivery_id {
            return Err(DomainError::invariant("delivery_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateDeliveryNote) -> Result<Vec<DeliveryEvent>, DomainError> {
        if self.created {
            return Err(DomainError::already_exists());
        }
        if cmd.organisation_id.trim().is_empty() {
            return Err(DomainError::validation("organisation_id cannot be empty"));
        }
        Ok(vec![DeliveryEvent::DeliveryNoteCreated(cmd.clone())])
    }

    fn handle_add_items(&self, cmd: &AddDeliveryItems) -> Result<Vec<DeliveryEvent>, DomainError> {
        self.ensure_exists(cmd.delivery_id)?;
        if cmd.items.is_empty() {
            return Err(DomainError::validation("items cannot be empty"));
        }
        Ok(vec![DeliveryEvent::DeliveryItemsAdded(cmd.clone())])
    }

    fn handle_remove_item(&self, cmd: &RemoveDeliveryItem) -> Result<Vec<DeliveryEvent>, DomainError> {
        self.ensure_exists(cmd.delivery_id)?;
        Ok(vec![DeliveryEvent::DeliveryItemRemoved(cmd.clone())])
    }
}
