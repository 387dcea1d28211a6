//! Infrastructure wiring: event store, event bus, command router, session
//! queue consumer, and the projector set feeding the read models the HTTP
//! handlers serve from.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use canister_events::{EventEnvelope, InMemoryEventBus};
use canister_infra::command_dispatcher::{CommandRouter, DispatchError};
use canister_infra::envelope::DecodedCommand;
use canister_infra::event_store::{InMemoryEventStore, StoredEvent};
use canister_infra::projections::{
    CanisterRelationalProjector, CanisterSearchProjector, DeliveryRelationalProjector, DeliverySearchProjector,
    ProjectionDispatcher, ProjectorSet,
};
use canister_infra::queue::{InMemorySessionBroker, SessionConsumer};

use crate::config::Config;

type Router = CommandRouter<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>>;

#[derive(Clone)]
pub struct AppServices {
    pub router: Arc<Router>,
    pub canister_relational: Arc<CanisterRelationalProjector>,
    pub delivery_relational: Arc<DeliveryRelationalProjector>,
    pub broker: Arc<InMemorySessionBroker>,
    /// Request-scoped deadline for command dispatch (spec §5).
    pub request_deadline: Duration,
    shutdown: Arc<AtomicBool>,
}

impl AppServices {
    pub fn shutdown(&self) {
        self.shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
    }

    /// Dispatch a decoded command off the async executor, bounded by
    /// `request_deadline` (spec §5). A timed-out or panicked dispatch
    /// surfaces as `DispatchError::Transient` so callers retry/abandon it
    /// the same way they would a store timeout.
    pub async fn dispatch_with_deadline(
        &self,
        command: DecodedCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        let router = self.router.clone();
        let dispatch = tokio::task::spawn_blocking(move || router.dispatch_decoded(command));

        match tokio::time::timeout(self.request_deadline, dispatch).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(DispatchError::Fatal(format!("dispatch task panicked: {join_err}"))),
            Err(_elapsed) => Err(DispatchError::Transient(format!(
                "command dispatch exceeded {:?} deadline",
                self.request_deadline
            ))),
        }
    }
}

/// Wire the in-memory event store, bus, router, projector set, projection
/// dispatcher, and session queue consumer. The dispatcher and consumer run
/// on background tasks for the lifetime of the process (spec §5: one
/// projection worker, one queue consumer per deployment).
pub fn build_services(config: &Config) -> AppServices {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>> = Arc::new(InMemoryEventBus::new());
    let router: Arc<Router> = Arc::new(CommandRouter::new(store.clone(), bus));

    let canister_relational = Arc::new(CanisterRelationalProjector::new());
    let canister_search = Arc::new(CanisterSearchProjector::new());
    let delivery_relational = Arc::new(DeliveryRelationalProjector::new());
    let delivery_search = Arc::new(DeliverySearchProjector::new());

    let broker = Arc::new(InMemorySessionBroker::new());
    let shutdown = Arc::new(AtomicBool::new(false));

    let canister_set = ProjectorSet {
        relational: vec![canister_relational.clone()],
        search: vec![canister_search.clone()],
    };
    let delivery_set = ProjectorSet {
        relational: vec![delivery_relational.clone()],
        search: vec![delivery_search.clone()],
    };

    let dispatcher = ProjectionDispatcher::new(
        store,
        canister_set,
        delivery_set,
        shutdown.clone(),
        config.projection_batch_size,
        config.projection_poll_interval,
    );
    tokio::spawn(async move { dispatcher.run().await });

    {
        let broker = broker.clone();
        let router = router.clone();
        let shutdown = shutdown.clone();
        let request_deadline = config.request_deadline;
        tokio::task::spawn_blocking(move || {
            let consumer = SessionConsumer::new(broker, router, shutdown, request_deadline);
            consumer.run();
        });
    }

    tracing::info!(
        poll_interval_secs = config.projection_poll_interval.as_secs(),
        batch_size = config.projection_batch_size,
        request_deadline_secs = config.request_deadline.as_secs(),
        "infrastructure wired"
    );

    AppServices {
        router,
        canister_relational,
        delivery_relational,
        broker,
        request_deadline: config.request_deadline,
        shutdown,
    }
}
