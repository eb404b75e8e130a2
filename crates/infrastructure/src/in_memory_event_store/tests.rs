use chrono::{Duration, Utc};
use opslock_application::{EventFilter, EventMutation, EventStore};
use opslock_core::AppError;
use opslock_domain::{CancelInfo, EventId, EventRecord, Target};
use uuid::Uuid;

use super::InMemoryEventStore;

fn live_record(target_value: &str) -> EventRecord {
    let target = Target::new("app", target_value);
    let now = Utc::now();
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
    let store = InMemoryEventStore::new();
    store.insert_unique(live_record("myapp")).await.unwrap();

    let error = store.insert_unique(live_record("myapp")).await.unwrap_err();
    assert!(matches!(error, AppError::Conflict(_)));

    store.insert_unique(live_record("otherapp")).await.unwrap();
    assert_eq!(store.scan().await.unwrap().len(), 2);
}

#[tokio::test]
async fn update_matching_applies_sets_and_appends() {
    let store = InMemoryEventStore::new();
    let record = live_record("myapp");
    let locking_id = record.id.clone();
    store.insert_unique(record).await.unwrap();

    let archive_id = EventId::Archive(Uuid::new_v4());
    let ended_at = Utc::now();
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

    let records = store.scan().await.unwrap();
    assert_eq!(records[0].id, archive_id);
    assert!(!records[0].running);
    assert_eq!(records[0].end_time, Some(ended_at));
    assert_eq!(records[0].error, "myerr");
    assert_eq!(records[0].log, "first\n");

    let matched = store
        .update_matching(
            EventFilter::for_id(archive_id),
            EventMutation {
                append_log: Some("second\n".to_owned()),
                ..EventMutation::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(matched, 1);
    assert_eq!(store.scan().await.unwrap()[0].log, "first\nsecond\n");

    let matched = store
        .update_matching(
            EventFilter::for_id(locking_id),
            EventMutation::default(),
        )
        .await
        .unwrap();
    assert_eq!(matched, 0);
}

#[tokio::test]
async fn update_matching_honours_the_lease_compare_and_swap() {
    let store = InMemoryEventStore::new();
    let record = live_record("myapp");
    let locking_id = record.id.clone();
    let original_lease = record.lock_update_time;
    store.insert_unique(record).await.unwrap();

    let stale_lease = original_lease - Duration::seconds(10);
    let matched = store
        .update_matching(
            EventFilter {
                lock_update_time: Some(stale_lease),
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
    assert!(store.scan().await.unwrap()[0].running);

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
    assert!(!store.scan().await.unwrap()[0].running);
}

#[tokio::test]
async fn scan_preserves_insertion_order() {
    let store = InMemoryEventStore::new();
    store.insert_unique(live_record("first")).await.unwrap();
    store.insert_unique(live_record("second")).await.unwrap();
    store.insert_unique(live_record("third")).await.unwrap();

    let values: Vec<String> = store
        .scan()
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.target.value)
        .collect();
    assert_eq!(values, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn delete_matching_removes_only_matching_records() {
    let store = InMemoryEventStore::new();
    let record = live_record("myapp");
    let locking_id = record.id.clone();
    store.insert_unique(record).await.unwrap();
    store.insert_unique(live_record("otherapp")).await.unwrap();

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
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].target.value, "otherapp");
}
