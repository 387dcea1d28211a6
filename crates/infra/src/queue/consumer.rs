//! Session Queue Consumer (spec §4.D).
//!
//! Accepts one session at a time, processes its messages strictly in FIFO
//! order, and acks/abandons/dead-letters each one based on the Command
//! Router's outcome. Cancellation is cooperative via a shared shutdown flag,
//! the same pattern the projection dispatcher uses (spec §5).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use canister_events::{EventBus, EventEnvelope};

use crate::command_dispatcher::{CommandRouter, DispatchError};
use crate::envelope::{decode_fallback, decode_outer, DecodedCommand, EnvelopeError, OuterEnvelope};
use crate::event_store::EventStore;
use crate::queue::broker::{BrokerMessage, SessionBroker, SessionHandle};

/// Messages fetched per `receive_batch` call, per spec §4.D.
const BATCH_SIZE: usize = 10;
/// How long `accept_session` blocks before the outer loop retries (spec §4.D: "wait briefly and retry").
const ACCEPT_TIMEOUT: Duration = Duration::from_millis(500);

pub struct SessionConsumer<Br, S, B> {
    broker: Br,
    router: Arc<CommandRouter<S, B>>,
    shutdown: Arc<AtomicBool>,
    /// Request-scoped deadline for command dispatch (spec §5), mirrored from
    /// the HTTP edge's `AppServices::dispatch_with_deadline`.
    request_deadline: Duration,
}

impl<Br, S, B> SessionConsumer<Br, S, B>
where
    Br: SessionBroker,
    S: EventStore + Send + Sync + 'static,
    B: EventBus<EventEnvelope<JsonValue>> + Send + Sync + 'static,
{
    pub fn new(broker: Br, router: Arc<CommandRouter<S, B>>, shutdown: Arc<AtomicBool>, request_deadline: Duration) -> Self {
        Self { broker, router, shutdown, request_deadline }
    }

    /// Dispatch on a worker thread, bounded by `request_deadline`. A message
    /// that blows the deadline is abandoned for redelivery rather than left
    /// to block this session's queue indefinitely; the worker thread is left
    /// to finish on its own and its result is discarded.
    fn dispatch_with_deadline(&self, command: DecodedCommand) -> Result<Vec<crate::event_store::StoredEvent>, DispatchError> {
        let router = self.router.clone();
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let _ = tx.send(router.dispatch_decoded(command));
        });

        match rx.recv_timeout(self.request_deadline) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(DispatchError::Transient(format!(
                "command dispatch exceeded {:?} deadline",
                self.request_deadline
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(DispatchError::Fatal("dispatch worker thread died without a result".to_string()))
            }
        }
    }

    /// Run until the shutdown flag is set. Finishes any in-flight message
    /// before observing shutdown (spec §5 cancellation).
    pub fn run(&self) {
        while !self.shutdown.load(Ordering::Relaxed) {
            self.run_once();
        }
    }

    /// Accept one session (if available within `ACCEPT_TIMEOUT`) and drain
    /// it to completion. A no-op if no session is available.
    pub fn run_once(&self) {
        let Some(session) = self.broker.accept_session(ACCEPT_TIMEOUT) else {
            return;
        };

        let session_id = session.session_id().to_string();
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            let batch = session.receive_batch(BATCH_SIZE);
            if batch.is_empty() {
                break;
            }

            for message in batch {
                self.process_one(&session, &message);
            }
        }

        debug!(session_id, "closing session");
        session.close();
    }

    fn process_one(&self, session: &Br::Handle, message: &BrokerMessage) {
        match self.decode(message) {
            Ok(command) => match self.dispatch_with_deadline(command) {
                Ok(_) => session.complete(message),
                Err(err) => self.handle_dispatch_error(session, message, err),
            },
            Err(err) => {
                warn!(message_id = %message.message_id, %err, "failed to decode queue message");
                session.dead_letter(message, &err.to_string());
            }
        }
    }

    fn decode(&self, message: &BrokerMessage) -> Result<crate::envelope::DecodedCommand, EnvelopeError> {
        let event_type = message
            .body
            .get("eventType")
            .and_then(JsonValue::as_str)
            .unwrap_or_default();

        if !event_type.is_empty() {
            let data = message.body.get("data").cloned().unwrap_or(JsonValue::Null);
            let outer = OuterEnvelope {
                event_type: event_type.to_string(),
                data,
            };
            match decode_outer(&outer, canister_core::AggregateId::new) {
                Ok(cmd) => return Ok(cmd),
                Err(EnvelopeError::UnknownEventType(_)) => {}
                Err(err) => return Err(err),
            }
        }

        decode_fallback(&message.body)
    }

    fn handle_dispatch_error(&self, session: &Br::Handle, message: &BrokerMessage, err: DispatchError) {
        match err {
            DispatchError::Conflict(_) | DispatchError::Transient(_) => {
                debug!(message_id = %message.message_id, %err, "abandoning message for redelivery");
                session.abandon(message);
            }
            DispatchError::BadInput(_) | DispatchError::NotFound | DispatchError::AlreadyExists | DispatchError::Fatal(_) => {
                warn!(message_id = %message.message_id, %err, "dead-lettering message");
                session.dead_letter(message, &err.to_string());
            }
        }
    }
}
