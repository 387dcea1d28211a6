//! Projection Dispatcher (spec §4.F): polls the event log for unprocessed
//! events and fans each one out to the projector set registered for its
//! aggregate type.
//!
//! A single worker per deployment is assumed (spec §5); `next_unprocessed`
//! claims a batch so a second worker racing against this one would not
//! double-project, but nothing here coordinates across processes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use crate::event_store::{EventStore, StoredEvent};
use crate::projections::relational::{ProjectionError, RelationalProjector};
use crate::projections::search::SearchIndexProjector;

/// The projector set registered for one aggregate type.
pub struct ProjectorSet {
    pub relational: Vec<Arc<dyn RelationalProjector>>,
    pub search: Vec<Arc<dyn SearchIndexProjector>>,
}

impl ProjectorSet {
    fn project(&self, event: &StoredEvent) -> Result<(), ProjectionError> {
        for projector in &self.relational {
            projector.project(event)?;
        }
        for projector in &self.search {
            projector.project(event)?;
        }
        Ok(())
    }
}

/// Routes events by `aggregate_type` to the projector set registered for it.
pub struct ProjectionDispatcher<S> {
    store: S,
    canister: ProjectorSet,
    delivery: ProjectorSet,
    shutdown: Arc<AtomicBool>,
    batch_size: usize,
    poll_interval: Duration,
}

impl<S> ProjectionDispatcher<S>
where
    S: EventStore,
{
    /// `batch_size`/`poll_interval` come from the deployment config (spec
    /// §4.F); pass the defaults above if the caller has no override.
    pub fn new(
        store: S,
        canister: ProjectorSet,
        delivery: ProjectorSet,
        shutdown: Arc<AtomicBool>,
        batch_size: usize,
        poll_interval: Duration,
    ) -> Self {
        Self { store, canister, delivery, shutdown, batch_size, poll_interval }
    }

    /// Run until the shutdown flag is set. The batch already claimed when
    /// shutdown is observed is finished before returning (spec §5).
    pub async fn run(&self) {
        while !self.shutdown.load(Ordering::Relaxed) {
            let projected = self.tick();
            if projected == 0 {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
    }

    /// Claim one batch and project it. Returns the number of events claimed,
    /// so callers (and `run`) can decide whether to poll again immediately.
    pub fn tick(&self) -> usize {
        let batch = match self.store.next_unprocessed(self.batch_size) {
            Ok(batch) => batch,
            Err(err) => {
                error!(%err, "failed to claim unprocessed events");
                return 0;
            }
        };

        let claimed = batch.len();
        for event in batch {
            self.project_one(event);
        }
        claimed
    }

    fn project_one(&self, event: StoredEvent) {
        let set = match event.aggregate_type.as_str() {
            "Canister" => &self.canister,
            "DeliveryNote" => &self.delivery,
            other => {
                warn!(aggregate_type = other, event_id = %event.event_id, "no projector set registered for aggregate type");
                let _ = self.store.mark_processed(event.event_id);
                return;
            }
        };

        match set.project(&event) {
            Ok(()) => {
                if let Err(err) = self.store.mark_processed(event.event_id) {
                    error!(%err, event_id = %event.event_id, "failed to mark event processed");
                }
            }
            Err(err) => {
                warn!(%err, event_id = %event.event_id, "projection failed, will retry next tick");
                if let Err(mark_err) = self.store.mark_failed(event.event_id, err.to_string()) {
                    error!(%mark_err, event_id = %event.event_id, "failed to mark event failed");
                }
            }
        }
    }
}
