use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use opslock_domain::{EventId, Target, store_now};
use tokio::sync::watch;
use tracing::warn;

use crate::event_ports::{EventFilter, EventMutation, EventStore};
use crate::event_service::{EventState, lock_unpoisoned};

/// Heartbeat worker refreshing the lease of every locally-held live event.
///
/// One updater exists per [`EventService`](crate::EventService). Events
/// register on acquisition and deregister on termination; the worker is
/// spawned lazily by the first registration. A stopped updater stays
/// stopped until started explicitly, so tests can let leases expire.
pub(crate) struct LockUpdater {
    interval: Duration,
    registered: Mutex<HashMap<Target, Arc<EventState>>>,
    runtime: Mutex<UpdaterRuntime>,
}

enum UpdaterRuntime {
    /// No worker spawned yet; the first registration starts one.
    Idle,
    /// Worker running; the sender signals it to exit.
    Running(watch::Sender<bool>),
    /// Explicitly stopped; registrations do not resurrect the worker.
    Stopped,
}

impl LockUpdater {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            registered: Mutex::new(HashMap::new()),
            runtime: Mutex::new(UpdaterRuntime::Idle),
        }
    }

    /// Adds a live event to the refresh set, spawning the worker unless it
    /// was explicitly stopped.
    pub(crate) fn register(
        self: &Arc<Self>,
        store: &Arc<dyn EventStore>,
        state: Arc<EventState>,
    ) {
        lock_unpoisoned(&self.registered).insert(state.target.clone(), state);

        let mut runtime = lock_unpoisoned(&self.runtime);
        if matches!(*runtime, UpdaterRuntime::Idle) {
            *runtime = self.spawn(store);
        }
    }

    /// Removes a terminated event from the refresh set. A handle that was
    /// pre-empted must not evict the successor registered under the same
    /// target, hence the identity check.
    pub(crate) fn deregister(&self, state: &Arc<EventState>) {
        let mut registered = lock_unpoisoned(&self.registered);
        if let Some(current) = registered.get(&state.target)
            && Arc::ptr_eq(current, state)
        {
            registered.remove(&state.target);
        }
    }

    /// Starts the worker, clearing a sticky stop.
    pub(crate) fn start(self: &Arc<Self>, store: &Arc<dyn EventStore>) {
        let mut runtime = lock_unpoisoned(&self.runtime);
        if matches!(*runtime, UpdaterRuntime::Running(_)) {
            return;
        }
        *runtime = self.spawn(store);
    }

    /// Stops the worker; later registrations stay unrefreshed until
    /// [`LockUpdater::start`] is called.
    pub(crate) fn stop(&self) {
        let mut runtime = lock_unpoisoned(&self.runtime);
        if let UpdaterRuntime::Running(shutdown) = &*runtime {
            let _ = shutdown.send(true);
        }
        *runtime = UpdaterRuntime::Stopped;
    }

    fn spawn(self: &Arc<Self>, store: &Arc<dyn EventStore>) -> UpdaterRuntime {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let updater = Arc::clone(self);
        let store = Arc::clone(store);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(updater.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => updater.refresh_all(store.as_ref()).await,
                    _ = shutdown_rx.changed() => break,
                }
            }
        });

        UpdaterRuntime::Running(shutdown_tx)
    }

    /// Refreshes the lease of every registered live event and flushes its
    /// buffered log lines. Zero-match updates mean the event terminated
    /// between ticks and are skipped; store errors are swallowed until the
    /// next tick, with the drained log lines put back.
    async fn refresh_all(&self, store: &dyn EventStore) {
        let states: Vec<Arc<EventState>> = lock_unpoisoned(&self.registered)
            .values()
            .cloned()
            .collect();

        for state in states {
            if !state.is_running() {
                continue;
            }

            let drained = state.take_buffered_log();
            let filter = EventFilter {
                start_time: Some(state.start_time),
                ..EventFilter::for_id(EventId::Lock(state.target.clone()))
            };
            let mutation = EventMutation {
                lock_update_time: Some(store_now()),
                append_log: drained.clone(),
                ..EventMutation::default()
            };

            if let Err(error) = store.update_matching(filter, mutation).await {
                state.restore_buffered_log(drained);
                warn!(event = %state.target, error = %error, "failed to refresh event lease");
            }
        }
    }
}
