//! Infrastructure layer: event store, command router, session queue
//! consumer, projection dispatcher, and projectors (spec components A, C,
//! D, F, G).

pub mod command_dispatcher;
pub mod envelope;
pub mod event_store;
pub mod projections;
pub mod queue;

mod integration_tests;
