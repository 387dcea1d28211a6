use canister_core::AggregateId;

/// A command targets a specific aggregate (command abstraction).
///
/// Commands represent **intent** - a request to perform an action on an
/// aggregate. They are **transient** (not persisted) and are transformed
/// into events (which are persisted).
///
/// ## Command vs Event
///
/// - **Command**: Intent to do something (e.g., "damage this canister")
/// - **Event**: Fact that something happened (e.g., "CanisterDamage")
///
/// Commands are rejected if invalid (validation errors). Events represent
/// accepted changes.
///
/// ## Aggregate Targeting
///
/// Commands must specify which aggregate they target via
/// `target_aggregate_id()`, which aggregate type they belong to, and
/// whether they are expected to create a brand-new stream. This is enough
/// for the command router to decide the creation-vs-non-creation branch
/// (spec §4.C step 1) without matching on every command variant itself.
///
/// ## Design Constraints
///
/// Commands must be:
/// - **Cloneable**: commands may be copied for retries, logging, etc.
/// - **Send + Sync**: commands cross thread boundaries (HTTP handlers, the
///   session queue consumer)
/// - **'static**: commands don't contain borrowed data
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn target_aggregate_id(&self) -> AggregateId;

    /// Stable aggregate type tag (the event log's `aggregate_type` column).
    fn aggregate_type(&self) -> &'static str;

    /// True for commands that must target a not-yet-existing stream
    /// (`CreateCanister`, `CreateDeliveryNote`).
    fn is_creation(&self) -> bool;
}
