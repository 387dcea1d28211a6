//! Event mechanics shared by the write path and the projection path:
//! the `Event`/`Command` traits, the envelope wrapping a stored event for
//! publication, and the pub/sub `EventBus` abstraction.

mod bus;
mod command;
mod envelope;
mod event;
mod handler;
mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use command::Command;
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::{execute, CommandHandler};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
