use chrono::Duration;
use opslock_application::{CancelRequest, EventFilter, EventMutation, EventStore};
use opslock_core::AppError;
use opslock_domain::{CancelInfo, EventId, EventRecord, Target, store_now};
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use super::PostgresEventStore;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn test_store() -> Option<PostgresEventStore> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool: PgPool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres event store tests: {error}");
    }

    Some(PostgresEventStore::new(pool))
}

fn unique_target(test_name: &str) -> Target {
    Target::new("app", format!("{test_name}-{}", Uuid::new_v4()))
}

fn live_record(target: Target) -> EventRecord {
    let now = store_now();
    EventRecord {
        id: EventId::Lock(target.clone()),
        target,
        kind: "env-set".to_owned(),
        owner: "me@me.com".to_owned(),
        running: true,
        start_time: now,
        lock_update_time: now,
        end_time: None,
        error: String::new(),
        start_custom_data: None,
        end_custom_data: None,
        log: String::new(),
        cancelable: false,
        cancel_info: CancelInfo::default(),
    }
}

#[tokio::test]
async fn insert_unique_rejects_duplicate_identities() {
    let Some(store) = test_store().await else {
        return;
    };
    let record = live_record(unique_target("duplicate"));

    store.insert_unique(record.clone()).await.unwrap();
    let error = store.insert_unique(record).await.unwrap_err();
    assert!(matches!(error, AppError::Conflict(_)));
}

#[tokio::test]
async fn records_round_trip_through_scan() {
    let Some(store) = test_store().await else {
        return;
    };
    let target = unique_target("round-trip");
    let mut record = live_record(target.clone());
    record.start_custom_data = Some(serde_json::json!({"a": "value"}));
    record.log = "hey 42\n".to_owned();

    store.insert_unique(record.clone()).await.unwrap();

    let stored = store
        .scan()
        .await
        .unwrap()
        .into_iter()
        .find(|candidate| candidate.target == target)
        .unwrap();
    assert_eq!(stored, record);
}

#[tokio::test]
async fn update_matching_applies_sets_and_appends() {
    let Some(store) = test_store().await else {
        return;
    };
    let target = unique_target("update");
    let record = live_record(target.clone());
    let locking_id = record.id.clone();
    store.insert_unique(record).await.unwrap();

    let archive_id = EventId::Archive(Uuid::new_v4());
    let ended_at = store_now();
    let matched = store
        .update_matching(
            EventFilter::for_id(locking_id.clone()),
            EventMutation {
                id: Some(archive_id.clone()),
                running: Some(false),
                end_time: Some(ended_at),
                error: Some("myerr".to_owned()),
                append_log: Some("first\n".to_owned()),
                ..EventMutation::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(matched, 1);

    let matched = store
        .update_matching(
            EventFilter::for_id(archive_id.clone()),
            EventMutation {
                append_log: Some("second\n".to_owned()),
                ..EventMutation::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(matched, 1);

    let stored = store
        .scan()
        .await
        .unwrap()
        .into_iter()
        .find(|candidate| candidate.target == target)
        .unwrap();
    assert_eq!(stored.id, archive_id);
    assert!(!stored.running);
    assert_eq!(stored.end_time, Some(ended_at));
    assert_eq!(stored.error, "myerr");
    assert_eq!(stored.log, "first\nsecond\n");

    let matched = store
        .update_matching(EventFilter::for_id(locking_id), EventMutation::default())
        .await
        .unwrap();
    assert_eq!(matched, 0);
}

#[tokio::test]
async fn update_matching_honours_the_lease_compare_and_swap() {
    let Some(store) = test_store().await else {
        return;
    };
    let target = unique_target("lease-cas");
    let record = live_record(target.clone());
    let locking_id = record.id.clone();
    let original_lease = record.lock_update_time;
    store.insert_unique(record).await.unwrap();

    let matched = store
        .update_matching(
            EventFilter {
                lock_update_time: Some(original_lease - Duration::seconds(10)),
                ..EventFilter::for_id(locking_id.clone())
            },
            EventMutation {
                running: Some(false),
                ..EventMutation::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(matched, 0);

    let matched = store
        .update_matching(
            EventFilter {
                lock_update_time: Some(original_lease),
                ..EventFilter::for_id(locking_id)
            },
            EventMutation {
                running: Some(false),
                ..EventMutation::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(matched, 1);
}

#[tokio::test]
async fn cancel_transitions_round_trip() {
    let Some(store) = test_store().await else {
        return;
    };
    let target = unique_target("cancel");
    let mut record = live_record(target.clone());
    record.cancelable = true;
    let locking_id = record.id.clone();
    store.insert_unique(record).await.unwrap();

    let asked_at = store_now();
    let matched = store
        .update_matching(
            EventFilter {
                running: Some(true),
                cancelable: Some(true),
                cancel_asked: Some(false),
                ..EventFilter::for_id(locking_id.clone())
            },
            EventMutation {
                cancel_request: Some(CancelRequest {
                    reason: "because I want".to_owned(),
                    owner: "admin@admin.com".to_owned(),
                    asked_at,
                }),
                ..EventMutation::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(matched, 1);

    let ack_time = store_now();
    let matched = store
        .update_matching(
            EventFilter {
                running: Some(true),
                cancelable: Some(true),
                cancel_asked: Some(true),
                ..EventFilter::for_id(locking_id)
            },
            EventMutation {
                cancel_ack_time: Some(ack_time),
                ..EventMutation::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(matched, 1);

    let stored = store
        .scan()
        .await
        .unwrap()
        .into_iter()
        .find(|candidate| candidate.target == target)
        .unwrap();
    assert_eq!(
        stored.cancel_info,
        CancelInfo {
            asked: true,
            canceled: true,
            reason: "because I want".to_owned(),
            owner: "admin@admin.com".to_owned(),
            start_time: Some(asked_at),
            ack_time: Some(ack_time),
        }
    );
}

#[tokio::test]
async fn delete_matching_removes_only_matching_records() {
    let Some(store) = test_store().await else {
        return;
    };
    let target = unique_target("delete");
    let other_target = unique_target("delete-other");
    let record = live_record(target.clone());
    let locking_id = record.id.clone();
    store.insert_unique(record).await.unwrap();
    store
        .insert_unique(live_record(other_target.clone()))
        .await
        .unwrap();

    let deleted = store
        .delete_matching(EventFilter::for_id(locking_id.clone()))
        .await
        .unwrap();
    assert_eq!(deleted, 1);

    let deleted = store
        .delete_matching(EventFilter::for_id(locking_id))
        .await
        .unwrap();
    assert_eq!(deleted, 0);

    let records = store.scan().await.unwrap();
    assert!(!records.iter().any(|candidate| candidate.target == target));
    assert!(
        records
            .iter()
            .any(|candidate| candidate.target == other_target)
    );
}
