use std::fmt::{Display, Formatter};

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Resource under lock, identified by a name/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    /// Resource category, e.g. `app`.
    pub name: String,
    /// Resource instance, e.g. `myapp`.
    pub value: String,
}

impl Target {
    /// Creates a target from its name/value parts.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl Display for Target {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}({})", self.name, self.value)
    }
}

/// Unique identity of an event record.
///
/// While the event runs the identity is the locked target itself, which is
/// what lets the store's uniqueness constraint enforce at most one live
/// event per target. Termination swaps it for an opaque archive id, and the
/// serialised form stays a nested document with exactly one populated
/// field, so both variants share one uniqueness index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventId {
    /// Live identity: the locked target.
    Lock(Target),
    /// Archived identity: opaque id assigned at termination.
    Archive(Uuid),
}

impl EventId {
    /// Returns true while the identity is the locking variant.
    #[must_use]
    pub fn is_lock(&self) -> bool {
        matches!(self, Self::Lock(_))
    }

    /// Returns the locked target, when live.
    #[must_use]
    pub fn locked_target(&self) -> Option<&Target> {
        match self {
            Self::Lock(target) => Some(target),
            Self::Archive(_) => None,
        }
    }
}

impl Display for EventId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lock(target) => write!(formatter, "{target}"),
            Self::Archive(id) => write!(formatter, "{id}"),
        }
    }
}

/// Cooperative cancellation state recorded on an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelInfo {
    /// True once a third party asked for cancellation.
    pub asked: bool,
    /// True once the holder acknowledged the request.
    pub canceled: bool,
    /// Reason supplied by the requester.
    pub reason: String,
    /// Requester identity.
    pub owner: String,
    /// When cancellation was asked.
    pub start_time: Option<DateTime<Utc>>,
    /// When the holder acknowledged.
    pub ack_time: Option<DateTime<Utc>>,
}

/// One persisted event: exclusive lock, lease heartbeat and audit record in
/// a single document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique identity: locking while live, archival after termination.
    pub id: EventId,
    /// Resource the event operates on.
    pub target: Target,
    /// Short operation kind, e.g. `env-set`.
    pub kind: String,
    /// Operator that started the event.
    pub owner: String,
    /// True while the lock is held.
    pub running: bool,
    /// When the event was created.
    pub start_time: DateTime<Utc>,
    /// Last lease refresh; a stale value makes the lock reclaimable.
    pub lock_update_time: DateTime<Utc>,
    /// Termination time; `None` while running.
    pub end_time: Option<DateTime<Utc>>,
    /// Failure message; empty on success.
    pub error: String,
    /// Operator payload captured at start, in normalised store form.
    pub start_custom_data: Option<Value>,
    /// Operator payload captured at termination, in normalised store form.
    pub end_custom_data: Option<Value>,
    /// Accumulated log text.
    pub log: String,
    /// Whether the ask/ack cancellation handshake is available.
    pub cancelable: bool,
    /// Cancellation handshake state.
    pub cancel_info: CancelInfo,
}

/// Current time truncated to microseconds, the finest resolution every
/// supported store round-trips losslessly. All persisted event timestamps
/// are taken through this function so that values read back from a store
/// compare equal to the ones a handle kept in memory.
#[must_use]
pub fn store_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Formats an elapsed duration for lease-expiry messages.
///
/// Renders `480ms`, `2.500s`, `3.2m` or `1.5h` depending on magnitude.
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    let millis = elapsed.num_milliseconds().max(0);
    if millis < 1_000 {
        format!("{millis}ms")
    } else if millis < 60_000 {
        format!("{:.3}s", millis as f64 / 1_000.0)
    } else if millis < 3_600_000 {
        format!("{:.1}m", millis as f64 / 60_000.0)
    } else {
        format!("{:.1}h", millis as f64 / 3_600_000.0)
    }
}
