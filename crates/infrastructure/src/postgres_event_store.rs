use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opslock_application::{EventFilter, EventMutation, EventStore};
use opslock_core::{AppError, AppResult};
use opslock_domain::{CancelInfo, EventId, EventRecord, Target};
use serde_json::Value;
use sqlx::{FromRow, PgPool};

#[cfg(test)]
mod tests;

/// PostgreSQL-backed event store.
///
/// One row per event. The jsonb `identity` column carries the
/// discriminated identity union and a unique index on it enforces the
/// at-most-one-live-event-per-target invariant; conditional updates ride
/// on plain `WHERE` predicates, so no transaction spans more than one row.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Creates an event store over the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct EventRecordRow {
    identity: Value,
    target_name: String,
    target_value: String,
    kind: String,
    owner: String,
    running: bool,
    start_time: DateTime<Utc>,
    lock_update_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    error: String,
    start_custom_data: Option<Value>,
    end_custom_data: Option<Value>,
    log: String,
    cancelable: bool,
    cancel_asked: bool,
    cancel_canceled: bool,
    cancel_reason: String,
    cancel_owner: String,
    cancel_start_time: Option<DateTime<Utc>>,
    cancel_ack_time: Option<DateTime<Utc>>,
}

impl EventRecordRow {
    fn try_into_record(self) -> AppResult<EventRecord> {
        let id: EventId = serde_json::from_value(self.identity).map_err(|error| {
            AppError::Internal(format!("failed to decode event identity column: {error}"))
        })?;

        Ok(EventRecord {
            id,
            target: Target::new(self.target_name, self.target_value),
            kind: self.kind,
            owner: self.owner,
            running: self.running,
            start_time: self.start_time,
            lock_update_time: self.lock_update_time,
            end_time: self.end_time,
            error: self.error,
            start_custom_data: self.start_custom_data,
            end_custom_data: self.end_custom_data,
            log: self.log,
            cancelable: self.cancelable,
            cancel_info: CancelInfo {
                asked: self.cancel_asked,
                canceled: self.cancel_canceled,
                reason: self.cancel_reason,
                owner: self.cancel_owner,
                start_time: self.cancel_start_time,
                ack_time: self.cancel_ack_time,
            },
        })
    }
}

fn identity_json(id: &EventId) -> AppResult<Value> {
    serde_json::to_value(id)
        .map_err(|error| AppError::Internal(format!("failed to encode event identity: {error}")))
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn insert_unique(&self, record: EventRecord) -> AppResult<()> {
        let identity = identity_json(&record.id)?;

        let result = sqlx::query(
            r#"
            INSERT INTO event_records (
                identity,
                target_name,
                target_value,
                kind,
                owner,
                running,
                start_time,
                lock_update_time,
                end_time,
                error,
                start_custom_data,
                end_custom_data,
                log,
                cancelable,
                cancel_asked,
                cancel_canceled,
                cancel_reason,
                cancel_owner,
                cancel_start_time,
                cancel_ack_time
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19, $20
            )
            ON CONFLICT (identity) DO NOTHING
            "#,
        )
        .bind(&identity)
        .bind(record.target.name.as_str())
        .bind(record.target.value.as_str())
        .bind(record.kind.as_str())
        .bind(record.owner.as_str())
        .bind(record.running)
        .bind(record.start_time)
        .bind(record.lock_update_time)
        .bind(record.end_time)
        .bind(record.error.as_str())
        .bind(&record.start_custom_data)
        .bind(&record.end_custom_data)
        .bind(record.log.as_str())
        .bind(record.cancelable)
        .bind(record.cancel_info.asked)
        .bind(record.cancel_info.canceled)
        .bind(record.cancel_info.reason.as_str())
        .bind(record.cancel_info.owner.as_str())
        .bind(record.cancel_info.start_time)
        .bind(record.cancel_info.ack_time)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to insert event record: {error}")))?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "event record already exists for identity '{}'",
                record.id
            )));
        }

        Ok(())
    }

    async fn update_matching(
        &self,
        filter: EventFilter,
        mutation: EventMutation,
    ) -> AppResult<u64> {
        let filter_identity = identity_json(&filter.id)?;
        let mutation_identity = mutation.id.as_ref().map(identity_json).transpose()?;
        let cancel_request = mutation.cancel_request.as_ref();

        let result = sqlx::query(
            r#"
            UPDATE event_records
            SET identity = COALESCE($7, identity),
                running = COALESCE($8, running),
                end_time = COALESCE($9, end_time),
                error = COALESCE($10, error),
                end_custom_data = COALESCE($11, end_custom_data),
                lock_update_time = COALESCE($12, lock_update_time),
                log = log || COALESCE($13, ''),
                cancel_asked = cancel_asked OR $14,
                cancel_reason = COALESCE($15, cancel_reason),
                cancel_owner = COALESCE($16, cancel_owner),
                cancel_start_time = COALESCE($17, cancel_start_time),
                cancel_canceled = cancel_canceled OR ($18::timestamptz IS NOT NULL),
                cancel_ack_time = COALESCE($18, cancel_ack_time)
            WHERE seq = (
                SELECT seq
                FROM event_records
                WHERE identity = $1
                  AND ($2::boolean IS NULL OR running = $2)
                  AND ($3::boolean IS NULL OR cancelable = $3)
                  AND ($4::boolean IS NULL OR cancel_asked = $4)
                  AND ($5::timestamptz IS NULL OR start_time = $5)
                  AND ($6::timestamptz IS NULL OR lock_update_time = $6)
                ORDER BY seq
                LIMIT 1
            )
            "#,
        )
        .bind(&filter_identity)
        .bind(filter.running)
        .bind(filter.cancelable)
        .bind(filter.cancel_asked)
        .bind(filter.start_time)
        .bind(filter.lock_update_time)
        .bind(&mutation_identity)
        .bind(mutation.running)
        .bind(mutation.end_time)
        .bind(mutation.error.as_deref())
        .bind(&mutation.end_custom_data)
        .bind(mutation.lock_update_time)
        .bind(mutation.append_log.as_deref())
        .bind(cancel_request.is_some())
        .bind(cancel_request.map(|request| request.reason.as_str()))
        .bind(cancel_request.map(|request| request.owner.as_str()))
        .bind(cancel_request.map(|request| request.asked_at))
        .bind(mutation.cancel_ack_time)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to update event records: {error}")))?;

        Ok(result.rows_affected())
    }

    async fn delete_matching(&self, filter: EventFilter) -> AppResult<u64> {
        let identity = identity_json(&filter.id)?;

        let result = sqlx::query(
            r#"
            DELETE FROM event_records
            WHERE identity = $1
              AND ($2::boolean IS NULL OR running = $2)
              AND ($3::boolean IS NULL OR cancelable = $3)
              AND ($4::boolean IS NULL OR cancel_asked = $4)
              AND ($5::timestamptz IS NULL OR start_time = $5)
              AND ($6::timestamptz IS NULL OR lock_update_time = $6)
            "#,
        )
        .bind(&identity)
        .bind(filter.running)
        .bind(filter.cancelable)
        .bind(filter.cancel_asked)
        .bind(filter.start_time)
        .bind(filter.lock_update_time)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to delete event records: {error}")))?;

        Ok(result.rows_affected())
    }

    async fn scan(&self) -> AppResult<Vec<EventRecord>> {
        let rows = sqlx::query_as::<_, EventRecordRow>(
            r#"
            SELECT identity,
                   target_name,
                   target_value,
                   kind,
                   owner,
                   running,
                   start_time,
                   lock_update_time,
                   end_time,
                   error,
                   start_custom_data,
                   end_custom_data,
                   log,
                   cancelable,
                   cancel_asked,
                   cancel_canceled,
                   cancel_reason,
                   cancel_owner,
                   cancel_start_time,
                   cancel_ack_time
            FROM event_records
            ORDER BY seq
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to scan event records: {error}")))?;

        rows.into_iter()
            .map(EventRecordRow::try_into_record)
            .collect()
    }
}
