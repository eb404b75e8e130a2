use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opslock_core::AppResult;
use opslock_domain::{EventId, EventRecord, Target};
use serde_json::Value;

/// Options for starting a new event.
#[derive(Debug, Clone)]
pub struct BeginEventOpts {
    /// Resource to lock.
    pub target: Target,
    /// Short operation kind, e.g. `env-set`.
    pub kind: String,
    /// Operator starting the event.
    pub owner: String,
    /// Optional operator payload persisted with the start record.
    pub custom_data: Option<Value>,
    /// Whether the event accepts the cancellation handshake.
    pub cancelable: bool,
}

/// Cancellation request fields applied through [`EventMutation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelRequest {
    /// Reason supplied by the requester.
    pub reason: String,
    /// Requester identity.
    pub owner: String,
    /// When the request was made.
    pub asked_at: DateTime<Utc>,
}

/// Identity-keyed predicate for conditional store writes.
///
/// Every engine write is keyed on the record identity; the optional fields
/// tighten the match into a compare-and-swap. `start_time` scopes a write
/// to the one event a handle was created for, so a stale handle can never
/// touch a successor holding the same locking identity.
#[derive(Debug, Clone, PartialEq)]
pub struct EventFilter {
    /// Identity the record must carry.
    pub id: EventId,
    /// Required running flag, when set.
    pub running: Option<bool>,
    /// Required cancelable flag, when set.
    pub cancelable: Option<bool>,
    /// Required cancellation-asked flag, when set.
    pub cancel_asked: Option<bool>,
    /// Exact creation time the record must carry, when set.
    pub start_time: Option<DateTime<Utc>>,
    /// Exact lease timestamp the record must still carry, when set.
    pub lock_update_time: Option<DateTime<Utc>>,
}

impl EventFilter {
    /// Creates a filter matching on identity alone.
    #[must_use]
    pub fn for_id(id: EventId) -> Self {
        Self {
            id,
            running: None,
            cancelable: None,
            cancel_asked: None,
            start_time: None,
            lock_update_time: None,
        }
    }

    /// Returns true when the record satisfies every set predicate.
    #[must_use]
    pub fn matches(&self, record: &EventRecord) -> bool {
        record.id == self.id
            && self.running.is_none_or(|expected| record.running == expected)
            && self
                .cancelable
                .is_none_or(|expected| record.cancelable == expected)
            && self
                .cancel_asked
                .is_none_or(|expected| record.cancel_info.asked == expected)
            && self
                .start_time
                .is_none_or(|expected| record.start_time == expected)
            && self
                .lock_update_time
                .is_none_or(|expected| record.lock_update_time == expected)
    }
}

/// Field updates applied to the first record matching a filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventMutation {
    /// Replacement identity (the archival flip).
    pub id: Option<EventId>,
    /// Replacement running flag.
    pub running: Option<bool>,
    /// Termination time.
    pub end_time: Option<DateTime<Utc>>,
    /// Failure message; the empty string marks success.
    pub error: Option<String>,
    /// Operator payload captured at termination.
    pub end_custom_data: Option<Value>,
    /// Lease refresh timestamp.
    pub lock_update_time: Option<DateTime<Utc>>,
    /// Log text appended to the stored log.
    pub append_log: Option<String>,
    /// Marks the record as cancellation-asked.
    pub cancel_request: Option<CancelRequest>,
    /// Marks the outstanding cancellation request as acknowledged.
    pub cancel_ack_time: Option<DateTime<Utc>>,
}

impl EventMutation {
    /// Applies every set field to the record in place.
    pub fn apply(&self, record: &mut EventRecord) {
        if let Some(id) = &self.id {
            record.id = id.clone();
        }
        if let Some(running) = self.running {
            record.running = running;
        }
        if let Some(end_time) = self.end_time {
            record.end_time = Some(end_time);
        }
        if let Some(error) = &self.error {
            record.error = error.clone();
        }
        if let Some(end_custom_data) = &self.end_custom_data {
            record.end_custom_data = Some(end_custom_data.clone());
        }
        if let Some(lock_update_time) = self.lock_update_time {
            record.lock_update_time = lock_update_time;
        }
        if let Some(append_log) = &self.append_log {
            record.log.push_str(append_log);
        }
        if let Some(request) = &self.cancel_request {
            record.cancel_info.asked = true;
            record.cancel_info.reason = request.reason.clone();
            record.cancel_info.owner = request.owner.clone();
            record.cancel_info.start_time = Some(request.asked_at);
        }
        if let Some(ack_time) = self.cancel_ack_time {
            record.cancel_info.canceled = true;
            record.cancel_info.ack_time = Some(ack_time);
        }
    }
}

/// Document-store port for event records.
///
/// The store offers conditional writes keyed on the unique record identity
/// plus a linear scan, and nothing else: no multi-document transactions.
/// Cross-process mutual exclusion rests entirely on these primitives.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Inserts a record, failing with
    /// [`AppError::Conflict`](opslock_core::AppError::Conflict) when a
    /// record with the same identity already exists.
    async fn insert_unique(&self, record: EventRecord) -> AppResult<()>;

    /// Applies a mutation to the first record matching the filter and
    /// returns the match count. Never inserts.
    async fn update_matching(
        &self,
        filter: EventFilter,
        mutation: EventMutation,
    ) -> AppResult<u64>;

    /// Deletes every record matching the filter and returns the count.
    async fn delete_matching(&self, filter: EventFilter) -> AppResult<u64>;

    /// Returns every record in insertion order.
    async fn scan(&self) -> AppResult<Vec<EventRecord>>;
}
