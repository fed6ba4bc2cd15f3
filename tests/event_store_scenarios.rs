use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use event_planner::{
    AppError, CreateEvent, EventStore, ManualClock, Priority, RecordStore, SqliteRecordStore, StoreConfig,
};
use serde_json::json;
use std::sync::Arc;
use tokio::time::Duration;

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 10).expect("date")
}

fn at(hour: u32, minute: u32) -> NaiveDateTime {
    day().and_hms_opt(hour, minute, 0).expect("instant")
}

fn standup() -> CreateEvent {
    CreateEvent::from_json(json!({
        "title": "Standup",
        "date": "2025-01-10",
        "time": "09:00",
        "priority": 2
    }))
    .expect("standup payload")
}

struct Harness {
    _dir: tempfile::TempDir,
    records: Arc<SqliteRecordStore>,
    clock: Arc<ManualClock>,
    store: Arc<EventStore>,
}

async fn harness(now: NaiveDateTime) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let records = Arc::new(SqliteRecordStore::new(&dir.path().join("events.sqlite")));
    let clock = Arc::new(ManualClock::new(now));
    let store = EventStore::new(records.clone(), clock.clone(), &StoreConfig::default());
    store.initialize().await.expect("initialize");
    Harness {
        _dir: dir,
        records,
        clock,
        store,
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn added_event_round_trips_through_storage() {
    let h = harness(at(8, 0)).await;
    let input = standup();
    let id = h.store.add_event(input.clone()).await.expect("add");

    let stored = h.records.get_all().await.expect("get all");
    assert_eq!(stored.len(), 1);
    let event = &stored[0];
    assert_eq!(event.id, id);
    assert_eq!(event.title, input.title);
    assert_eq!(event.date, input.date);
    assert_eq!(event.time, input.time);
    assert_eq!(event.priority, Priority::Medium);
    assert!(!event.completed);
    assert!(event.updated_at.is_none());
    assert_eq!(h.store.snapshot().events, stored);
}

#[tokio::test(start_paused = true)]
async fn standup_completes_once_its_time_has_passed() {
    let h = harness(at(8, 0)).await;
    let id = h.store.add_event(standup()).await.expect("add");
    assert!(!h.store.snapshot().events[0].completed);

    h.clock.set(at(9, 1));
    h.store.fetch_events().await;
    assert!(h.store.snapshot().events[0].completed);
    assert!(!h.store.scheduler().is_armed(id));

    settle().await;
    let stored = h.records.get(id).await.expect("get").expect("exists");
    assert!(stored.completed);
    assert!(stored.updated_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn scheduled_check_completes_event_when_due() {
    let h = harness(at(8, 0)).await;
    let id = h.store.add_event(standup()).await.expect("add");
    assert!(h.store.scheduler().is_armed(id));

    let mut updates = h.store.subscribe();
    updates.borrow_and_update();

    h.clock.set(at(9, 0));
    tokio::time::sleep(Duration::from_secs(3601)).await;

    assert!(updates.has_changed().expect("store alive"));
    assert!(h.store.snapshot().events[0].completed);
    assert!(h.records.get(id).await.expect("get").expect("exists").completed);
    assert_eq!(h.store.scheduler().armed_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn past_due_events_are_completed_on_first_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let records = Arc::new(SqliteRecordStore::new(&dir.path().join("events.sqlite")));
    records.open().expect("open");
    let overdue = records.insert_event(&standup()).expect("insert");
    let mut later = standup();
    later.title = "Retro".to_string();
    later.time = NaiveTime::from_hms_opt(16, 0, 0).expect("time");
    let upcoming = records.insert_event(&later).expect("insert");

    let clock = Arc::new(ManualClock::new(at(12, 0)));
    let store = EventStore::new(records.clone(), clock, &StoreConfig::default());
    store.initialize().await.expect("initialize");

    let snapshot = store.snapshot();
    assert_eq!(snapshot.events.len(), 2);
    assert!(snapshot.events[0].completed);
    assert!(!snapshot.events[1].completed);
    assert!(!store.scheduler().is_armed(overdue));
    assert!(store.scheduler().is_armed(upcoming));

    settle().await;
    assert!(records.get_event(overdue).expect("get").expect("exists").completed);
    assert!(!records.get_event(upcoming).expect("get").expect("exists").completed);
}

#[tokio::test(start_paused = true)]
async fn deleting_a_missing_event_publishes_an_error() {
    let h = harness(at(8, 0)).await;
    h.store.add_event(standup()).await.expect("add");
    let before = h.store.snapshot().events;

    let err = h.store.delete_event(9_999).await.expect_err("missing id");
    assert!(matches!(err, AppError::NotFound(_)));

    let snapshot = h.store.snapshot();
    assert_eq!(snapshot.events, before);
    assert!(!snapshot.loading);
    assert!(snapshot.error.as_deref().unwrap_or_default().starts_with("NOT_FOUND"));
}

#[tokio::test(start_paused = true)]
async fn completing_a_missing_event_is_not_found() {
    let h = harness(at(8, 0)).await;
    let err = h
        .store
        .mark_event_as_completed(404, true)
        .await
        .expect_err("missing id");
    assert!(matches!(err, AppError::NotFound(_)));
    assert!(h.store.snapshot().error.is_some());
}

#[tokio::test(start_paused = true)]
async fn only_the_three_priorities_reach_storage() {
    let h = harness(at(8, 0)).await;
    for raw in [0, 4, 10] {
        let err = CreateEvent::from_json(json!({
            "title": "Standup",
            "date": "2025-01-10",
            "time": "09:00",
            "priority": raw
        }))
        .expect_err("out of range");
        assert!(err.is_validation());
        assert!(err.to_string().contains(&format!("invalid priority {raw}")));
    }
    assert!(h.records.get_all().await.expect("get all").is_empty());

    for raw in 1..=3 {
        let payload = CreateEvent::from_json(json!({
            "title": format!("priority {raw}"),
            "date": "2025-01-11",
            "time": "09:00",
            "priority": raw
        }))
        .expect("valid payload");
        h.store.add_event(payload).await.expect("add");
    }
    let high = h.records.get_by_priority(Priority::High).await.expect("by priority");
    assert_eq!(high.len(), 1);
    assert_eq!(high[0].title, "priority 3");
    assert_eq!(h.store.snapshot().events.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn reopening_a_completed_event_rearms_its_check() {
    let h = harness(at(8, 0)).await;
    let id = h.store.add_event(standup()).await.expect("add");

    h.store.mark_event_as_completed(id, true).await.expect("complete");
    assert!(h.store.snapshot().events[0].completed);

    h.store.mark_event_as_completed(id, false).await.expect("reopen");
    assert!(!h.store.snapshot().events[0].completed);
    assert!(h.store.scheduler().is_armed(id));
}

#[tokio::test]
async fn bootstrap_opens_configured_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = StoreConfig::default()
        .merge(json!({
            "databasePath": dir.path().join("data").join("events.sqlite"),
            "logFilter": "debug"
        }))
        .expect("config");

    let store = event_planner::bootstrap(&config, &dir.path().join("logs"))
        .await
        .expect("bootstrap");
    assert!(store.snapshot().is_ready);
    assert!(dir.path().join("data").join("events.sqlite").exists());
    assert!(dir.path().join("logs").is_dir());
    store.teardown();
}
