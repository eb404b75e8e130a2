use std::sync::atomic::Ordering;

use opslock_core::AppResult;
use opslock_domain::{EventId, normalize_custom_data, store_now};
use serde_json::Value;
use uuid::Uuid;

use super::handle::ActiveEvent;
use crate::event_ports::{EventFilter, EventMutation};

impl ActiveEvent {
    /// Terminates the event, archiving its outcome and releasing the lock.
    ///
    /// `error` carries the failure message of an unsuccessful operation.
    /// Terminating an event a peer already took over succeeds silently, and
    /// a repeated call is a no-op.
    pub async fn done(&self, error: Option<String>) -> AppResult<()> {
        self.finish(error, None).await
    }

    /// Terminates the event like [`done`](ActiveEvent::done), attaching an
    /// operator payload to the archived record.
    pub async fn done_with_data(&self, error: Option<String>, custom_data: Value) -> AppResult<()> {
        self.finish(error, Some(custom_data)).await
    }

    /// Discards the live record as if the event never happened, leaving no
    /// archive entry. A repeated call is a no-op.
    pub async fn abort(&self) -> AppResult<()> {
        if !self.state.is_running() {
            return Ok(());
        }

        self.service
            .store
            .delete_matching(self.own_record_filter())
            .await?;
        self.release_local();
        Ok(())
    }

    async fn finish(&self, error: Option<String>, custom_data: Option<Value>) -> AppResult<()> {
        if !self.state.is_running() {
            return Ok(());
        }

        let drained = self.state.take_buffered_log();
        let mutation = EventMutation {
            id: Some(EventId::Archive(Uuid::new_v4())),
            running: Some(false),
            end_time: Some(store_now()),
            error: Some(error.unwrap_or_default()),
            end_custom_data: custom_data.map(normalize_custom_data),
            append_log: drained.clone(),
            ..EventMutation::default()
        };

        match self
            .service
            .store
            .update_matching(self.own_record_filter(), mutation)
            .await
        {
            // zero matches: a peer already archived this event via takeover
            Ok(_matched) => {
                self.release_local();
                Ok(())
            }
            Err(store_error) => {
                self.state.restore_buffered_log(drained);
                Err(store_error)
            }
        }
    }

    /// Filter scoping a write to the record this handle created. The
    /// `start_time` guard keeps a pre-empted handle from touching a
    /// successor event that reuses the same locking identity.
    pub(super) fn own_record_filter(&self) -> EventFilter {
        EventFilter {
            start_time: Some(self.state.start_time),
            ..EventFilter::for_id(EventId::Lock(self.state.target.clone()))
        }
    }

    fn release_local(&self) {
        self.state.running.store(false, Ordering::SeqCst);
        self.service.updater.deregister(&self.state);
    }
}
