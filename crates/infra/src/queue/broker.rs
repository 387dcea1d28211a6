//! In-memory session-ordered message broker (spec §3 "Session", §4.D).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use serde_json::Value as JsonValue;
use uuid::Uuid;

/// A single queued message, scoped to a producer-chosen session id.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerMessage {
    pub message_id: Uuid,
    pub session_id: String,
    pub body: JsonValue,
}

/// A session-ordered queue broker: at most one consumer holds a given
/// session at a time; within a session, messages are delivered FIFO.
pub trait SessionBroker: Send + Sync {
    type Handle: SessionHandle;

    /// Block up to `timeout` waiting for a session with unclaimed messages.
    fn accept_session(&self, timeout: Duration) -> Option<Self::Handle>;
}

pub trait SessionHandle: Send {
    fn session_id(&self) -> &str;

    /// Fetch up to `max` messages in enqueue order. Returns fewer than `max`
    /// (including zero) if fewer are currently available.
    fn receive_batch(&self, max: usize) -> Vec<BrokerMessage>;

    /// Acknowledge successful processing; the message will not be redelivered.
    fn complete(&self, message: &BrokerMessage);

    /// Release the message's lease so the broker redelivers it later (spec §7 Transient/Conflict).
    fn abandon(&self, message: &BrokerMessage);

    /// Permanently drop the message after recording the failure reason (spec §7 BadInput/NotFound/AlreadyExists/Fatal).
    fn dead_letter(&self, message: &BrokerMessage, reason: &str);

    /// Release the session back to the broker, returning any still-pending messages to the pool.
    fn close(self);
}

#[derive(Default)]
struct BrokerState {
    queues: HashMap<String, VecDeque<BrokerMessage>>,
    pending_sessions: VecDeque<String>,
    held_sessions: HashSet<String>,
    dead_letters: Vec<(BrokerMessage, String)>,
}

/// Reference in-memory implementation of `SessionBroker`. Single-owner lock
/// per session via `held_sessions`.
#[derive(Default)]
pub struct InMemorySessionBroker {
    state: Mutex<BrokerState>,
    signal: Condvar,
}

impl InMemorySessionBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a message for a session. Called by producers (tests or a
    /// future external broker adapter).
    pub fn enqueue(&self, session_id: impl Into<String>, body: JsonValue) -> Uuid {
        let session_id = session_id.into();
        let message = BrokerMessage {
            message_id: Uuid::now_v7(),
            session_id: session_id.clone(),
            body,
        };
        let message_id = message.message_id;

        let mut state = self.state.lock().expect("broker lock poisoned");
        state.queues.entry(session_id.clone()).or_default().push_back(message);
        if !state.held_sessions.contains(&session_id) && !state.pending_sessions.contains(&session_id) {
            state.pending_sessions.push_back(session_id);
        }
        self.signal.notify_all();

        message_id
    }

    pub fn dead_letters(&self) -> Vec<(BrokerMessage, String)> {
        self.state.lock().expect("broker lock poisoned").dead_letters.clone()
    }
}

impl SessionBroker for Arc<InMemorySessionBroker> {
    type Handle = InMemorySessionHandle;

    fn accept_session(&self, timeout: Duration) -> Option<Self::Handle> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().expect("broker lock poisoned");

        loop {
            if let Some(session_id) = state.pending_sessions.pop_front() {
                state.held_sessions.insert(session_id.clone());
                return Some(InMemorySessionHandle {
                    broker: self.clone(),
                    session_id,
                });
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, result) = self
                .signal
                .wait_timeout(state, deadline - now)
                .expect("broker lock poisoned");
            state = guard;
            if result.timed_out() && state.pending_sessions.is_empty() {
                return None;
            }
        }
    }
}

pub struct InMemorySessionHandle {
    broker: Arc<InMemorySessionBroker>,
    session_id: String,
}

impl SessionHandle for InMemorySessionHandle {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn receive_batch(&self, max: usize) -> Vec<BrokerMessage> {
        let mut state = self.broker.state.lock().expect("broker lock poisoned");
        let queue = state.queues.entry(self.session_id.clone()).or_default();
        let count = max.min(queue.len());
        queue.drain(..count).collect()
    }

    fn complete(&self, _message: &BrokerMessage) {
        // In-memory messages are removed from the queue on receipt; completion is a no-op.
    }

    fn abandon(&self, message: &BrokerMessage) {
        let mut state = self.broker.state.lock().expect("broker lock poisoned");
        state
            .queues
            .entry(self.session_id.clone())
            .or_default()
            .push_front(message.clone());
        self.broker.signal.notify_all();
    }

    fn dead_letter(&self, message: &BrokerMessage, reason: &str) {
        let mut state = self.broker.state.lock().expect("broker lock poisoned");
        state.dead_letters.push((message.clone(), reason.to_string()));
    }

    fn close(self) {
        let mut state = self.broker.state.lock().expect("broker lock poisoned");
        state.held_sessions.remove(&self.session_id);
        let has_pending = state
            .queues
            .get(&self.session_id)
            .map(|q| !q.is_empty())
            .unwrap_or(false);
        if has_pending {
            state.pending_sessions.push_back(self.session_id.clone());
        }
        self.broker.signal.notify_all();
    }
}
