//! Aggregate root trait for event-sourced domain models.

/// Aggregate root marker + minimal interface.
///
/// Kept small so the command router can treat every aggregate uniformly
/// (identity + version) without depending on its command/event types.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Monotonically increasing version of the aggregate's state.
    ///
    /// Equals the number of events applied since the aggregate was
    /// constructed empty (no snapshots; full replay is the only path to
    /// this number per the engine's design).
    fn version(&self) -> u64;
}

/// Full event-sourced aggregate: decides events from commands, and
/// mutates its own state by applying events.
///
/// `handle` must be side-effect free and deterministic: given the same
/// state and command it always decides the same events (or the same
/// error). `apply` must never fail for an event this aggregate itself
/// produced; it is only fed historical events or just-decided ones.
pub trait Aggregate: AggregateRoot {
    type Command;
    type Event;
    type Error;

    /// Mutate state in place. Advances `version()` by one per event.
    fn apply(&mut self, event: &Self::Event);

    /// Validate the command against current state and decide what
    /// happened, without mutating state. An empty vec means "nothing to
    /// do" (not currently used by any canister command, but kept for
    /// idempotent no-ops).
    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}
