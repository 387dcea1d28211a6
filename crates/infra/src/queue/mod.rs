//! Session Queue Consumer (spec §4.D): a broker abstraction plus the
//! per-session FIFO consumption loop.

pub mod broker;
pub mod consumer;

pub use broker::{BrokerMessage, InMemorySessionBroker, SessionBroker, SessionHandle};
pub use consumer::SessionConsumer;
