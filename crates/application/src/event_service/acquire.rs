use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use opslock_core::{AppError, AppResult};
use opslock_domain::{
    CancelInfo, EventId, EventRecord, Target, format_elapsed, normalize_custom_data, store_now,
};
use tracing::debug;
use uuid::Uuid;

use super::EventService;
use super::handle::{ActiveEvent, EventLog, EventState};
use crate::event_ports::{BeginEventOpts, EventFilter, EventMutation};

impl EventService {
    /// Starts a new event, acquiring the exclusive lock on its target.
    ///
    /// When the target is already held by a live event the call fails with
    /// [`AppError::EventLocked`], unless the holder's lease has expired, in
    /// which case the stale record is archived and the lock taken over.
    /// The returned handle is registered with the heartbeat worker until
    /// terminated through [`ActiveEvent::done`] or [`ActiveEvent::abort`].
    pub async fn begin(&self, opts: BeginEventOpts) -> AppResult<ActiveEvent> {
        if opts.target.name.trim().is_empty() || opts.target.value.trim().is_empty() {
            return Err(AppError::Validation(
                "event target name and value must not be empty".to_owned(),
            ));
        }

        if opts.kind.trim().is_empty() {
            return Err(AppError::Validation(
                "event kind must not be empty".to_owned(),
            ));
        }

        if opts.owner.trim().is_empty() {
            return Err(AppError::Validation(
                "event owner must not be empty".to_owned(),
            ));
        }

        let start_custom_data = opts.custom_data.map(normalize_custom_data);

        loop {
            let now = store_now();
            let record = EventRecord {
                id: EventId::Lock(opts.target.clone()),
                target: opts.target.clone(),
                kind: opts.kind.clone(),
                owner: opts.owner.clone(),
                running: true,
                start_time: now,
                lock_update_time: now,
                end_time: None,
                error: String::new(),
                start_custom_data: start_custom_data.clone(),
                end_custom_data: None,
                log: String::new(),
                cancelable: opts.cancelable,
                cancel_info: CancelInfo::default(),
            };

            match self.store.insert_unique(record).await {
                Ok(()) => {
                    let state = Arc::new(EventState {
                        target: opts.target.clone(),
                        kind: opts.kind.clone(),
                        owner: opts.owner.clone(),
                        cancelable: opts.cancelable,
                        start_time: now,
                        running: AtomicBool::new(true),
                        log: Mutex::new(EventLog::default()),
                    });
                    self.updater.register(&self.store, Arc::clone(&state));
                    return Ok(ActiveEvent::new(self.clone(), state));
                }
                Err(AppError::Conflict(_)) => self.reclaim_expired(&opts.target).await?,
                Err(error) => return Err(error),
            }
        }
    }

    /// Archives the stale live record on the target, or fails with
    /// [`AppError::EventLocked`] while its lease is fresh. A lost race
    /// simply returns so the caller retries acquisition.
    async fn reclaim_expired(&self, target: &Target) -> AppResult<()> {
        let locking_id = EventId::Lock(target.clone());
        let existing = self
            .store
            .scan()
            .await?
            .into_iter()
            .find(|record| record.id == locking_id);
        let Some(existing) = existing else {
            // the holder finished between the failed insert and this read
            return Ok(());
        };

        let now = store_now();
        let age = now.signed_duration_since(existing.lock_update_time);
        if age.to_std().unwrap_or(Duration::ZERO) <= self.config.lock_expire_timeout {
            return Err(AppError::EventLocked(format!(
                "{} running \"{}\" start by {} at {}",
                existing.target, existing.kind, existing.owner, existing.start_time
            )));
        }

        let matched = self
            .store
            .update_matching(
                EventFilter {
                    lock_update_time: Some(existing.lock_update_time),
                    ..EventFilter::for_id(locking_id)
                },
                EventMutation {
                    id: Some(EventId::Archive(Uuid::new_v4())),
                    running: Some(false),
                    end_time: Some(now),
                    error: Some(format!(
                        "event expired, no update for {}",
                        format_elapsed(age)
                    )),
                    ..EventMutation::default()
                },
            )
            .await?;

        if matched > 0 {
            debug!(event = %existing.target, "archived expired event lock");
        }

        Ok(())
    }
}
