use opslock_core::{AppError, AppResult};
use opslock_domain::store_now;

use super::handle::ActiveEvent;
use crate::event_ports::{CancelRequest, EventFilter, EventMutation};

impl ActiveEvent {
    /// Records a third-party request to cancel this event.
    ///
    /// The holder is never interrupted; it observes the durable request and
    /// decides when to stop. Fails with [`AppError::NotCancelable`] when
    /// the event does not accept the handshake or is no longer running, and
    /// with [`AppError::EventNotFound`] when no live record is in the
    /// expected state (already asked, or pre-empted by a peer).
    pub async fn try_cancel(&self, reason: &str, owner: &str) -> AppResult<()> {
        self.ensure_cancelable()?;

        let filter = EventFilter {
            running: Some(true),
            cancelable: Some(true),
            cancel_asked: Some(false),
            ..self.own_record_filter()
        };
        let mutation = EventMutation {
            cancel_request: Some(CancelRequest {
                reason: reason.to_owned(),
                owner: owner.to_owned(),
                asked_at: store_now(),
            }),
            ..EventMutation::default()
        };

        let matched = self.service.store.update_matching(filter, mutation).await?;
        if matched == 0 {
            return Err(AppError::EventNotFound);
        }

        Ok(())
    }

    /// Acknowledges an outstanding cancellation request.
    ///
    /// The event stays running; the holder is expected to terminate it
    /// shortly after. Fails with [`AppError::EventNotFound`] when no
    /// request is outstanding.
    pub async fn ack_cancel(&self) -> AppResult<()> {
        self.ensure_cancelable()?;

        let filter = EventFilter {
            running: Some(true),
            cancelable: Some(true),
            cancel_asked: Some(true),
            ..self.own_record_filter()
        };
        let mutation = EventMutation {
            cancel_ack_time: Some(store_now()),
            ..EventMutation::default()
        };

        let matched = self.service.store.update_matching(filter, mutation).await?;
        if matched == 0 {
            return Err(AppError::EventNotFound);
        }

        Ok(())
    }

    fn ensure_cancelable(&self) -> AppResult<()> {
        if !self.state.cancelable || !self.state.is_running() {
            return Err(AppError::NotCancelable);
        }
        Ok(())
    }
}
