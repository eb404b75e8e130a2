use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use opslock_core::AppResult;
use opslock_domain::EventRecord;

use crate::event_config::EventServiceConfig;
use crate::event_ports::EventStore;
use crate::lock_updater::LockUpdater;

mod acquire;
mod cancel;
mod finish;
mod handle;


pub use handle::ActiveEvent;
pub(crate) use handle::EventState;

/// Event engine: acquires target locks, keeps their leases fresh and
/// archives outcomes, all through a document-store port.
///
/// Cross-process mutual exclusion is carried entirely by the store's
/// conditional writes; the service holds no lock visible to peers.
#[derive(Clone)]
pub struct EventService {
    store: Arc<dyn EventStore>,
    config: EventServiceConfig,
    updater: Arc<LockUpdater>,
}

impl EventService {
    /// Creates an event service over a store adapter.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>, config: EventServiceConfig) -> Self {
        Self {
            store,
            config,
            updater: Arc::new(LockUpdater::new(config.lock_update_interval)),
        }
    }

    /// Returns every event record, live and archived, in insertion order.
    pub async fn all(&self) -> AppResult<Vec<EventRecord>> {
        self.store.scan().await
    }

    /// Starts the heartbeat worker, clearing an earlier
    /// [`stop_lock_updater`](EventService::stop_lock_updater) call. Must be
    /// called from within a tokio runtime.
    pub fn start_lock_updater(&self) {
        self.updater.start(&self.store);
    }

    /// Stops the heartbeat worker until restarted. Leases of live events go
    /// stale and peers become entitled to reclaim their targets.
    pub fn stop_lock_updater(&self) {
        self.updater.stop();
    }
}

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
