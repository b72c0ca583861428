//! Integration tests for the per-save flag hook.
//!
//! Drives tasks through create / update / time passing / delete via the
//! `TaskService` and checks that the persisted flags always match the
//! deadline and status at the moment of the last save. Runs against both
//! the in-memory and the `SQLite` store.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use taskpulse::{
    InMemoryTaskStore, ManualClock, NewTask, SqliteTaskStore, TaskEvent, TaskPatch,
    TaskRepository, TaskService, TaskStore,
};
use taskpulse_proto::task::{OwnerId, Priority, Status, StatusFlags};

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

fn service_over<S: TaskStore>(store: S) -> (TaskService<S, Arc<ManualClock>>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(t0()));
    let repo = Arc::new(TaskRepository::new(store, Arc::clone(&clock)));
    (TaskService::new(repo), clock)
}

fn new_task(title: &str, deadline: Option<DateTime<Utc>>) -> NewTask {
    NewTask {
        title: title.to_string(),
        description: Some("integration".to_string()),
        deadline,
        priority: Priority::High,
        status: Status::Todo,
        tags: Some("home,bills".to_string()),
    }
}

/// Walks a task from calm to urgent to overdue to done, saving each time.
async fn walk_lifecycle<S: TaskStore>(store: S) {
    let (svc, clock) = service_over(store);
    let owner = OwnerId::new();

    let task = svc
        .create(owner, new_task("Pay electricity bill", Some(t0() + Duration::days(2))))
        .await
        .unwrap();
    assert_eq!(task.flags(), StatusFlags::CALM);

    // A day and a half later an edit touches the record: now inside 24h.
    clock.advance(Duration::hours(36));
    let patch = TaskPatch {
        description: Some(Some("due soon".to_string())),
        ..TaskPatch::default()
    };
    let task = svc.update(owner, task.id, patch).await.unwrap();
    assert_eq!(task.flags(), StatusFlags::URGENT);
    assert_eq!(svc.get(owner, task.id).await.unwrap().flags(), StatusFlags::URGENT);

    // Past the deadline.
    clock.advance(Duration::hours(13));
    let patch = TaskPatch {
        priority: Some(Priority::Critical),
        ..TaskPatch::default()
    };
    let task = svc.update(owner, task.id, patch).await.unwrap();
    assert_eq!(task.flags(), StatusFlags::OVERDUE);

    // Done wins over an overdue deadline.
    let patch = TaskPatch {
        status: Some(Status::Done),
        ..TaskPatch::default()
    };
    let task = svc.update(owner, task.id, patch).await.unwrap();
    assert_eq!(task.flags(), StatusFlags::CALM);

    let stored = svc.get(owner, task.id).await.unwrap();
    assert_eq!(stored, task);
    assert_eq!(stored.updated_at, t0() + Duration::hours(49));
    assert_eq!(stored.created_at, t0());
}

// ===========================================================================
// Lifecycle
// ===========================================================================

#[tokio::test]
async fn lifecycle_in_memory() {
    walk_lifecycle(InMemoryTaskStore::new()).await;
}

#[tokio::test]
async fn lifecycle_sqlite() {
    walk_lifecycle(SqliteTaskStore::open_in_memory().unwrap()).await;
}

#[tokio::test]
async fn deadline_exactly_now_is_urgent_not_overdue() {
    let (svc, _clock) = service_over(InMemoryTaskStore::new());
    let task = svc
        .create(OwnerId::new(), new_task("Right now", Some(t0())))
        .await
        .unwrap();
    assert_eq!(task.flags(), StatusFlags::URGENT);
}

#[tokio::test]
async fn deadline_exactly_one_day_out_is_calm() {
    let (svc, _clock) = service_over(InMemoryTaskStore::new());
    let task = svc
        .create(OwnerId::new(), new_task("Tomorrow", Some(t0() + Duration::hours(24))))
        .await
        .unwrap();
    assert_eq!(task.flags(), StatusFlags::CALM);
}

#[tokio::test]
async fn clearing_deadline_clears_flags() {
    let (svc, _clock) = service_over(SqliteTaskStore::open_in_memory().unwrap());
    let owner = OwnerId::new();
    let task = svc
        .create(owner, new_task("Late", Some(t0() - Duration::days(1))))
        .await
        .unwrap();
    assert_eq!(task.flags(), StatusFlags::OVERDUE);

    let patch = TaskPatch {
        deadline: Some(None),
        tags: Some(None),
        ..TaskPatch::default()
    };
    let task = svc.update(owner, task.id, patch).await.unwrap();
    let stored = svc.get(owner, task.id).await.unwrap();
    assert_eq!(stored.flags(), StatusFlags::CALM);
    assert_eq!(stored.deadline, None);
    assert_eq!(stored.tags, None);
    assert_eq!(stored.description.as_deref(), Some("integration"));
}

// ===========================================================================
// Events
// ===========================================================================

#[tokio::test]
async fn each_mutation_emits_one_event() {
    let (svc, _clock) = service_over(InMemoryTaskStore::new());
    let mut rx = svc.repository().subscribe();
    let owner = OwnerId::new();

    let task = svc
        .create(owner, new_task("Watch events", Some(t0() + Duration::hours(1))))
        .await
        .unwrap();
    assert_eq!(
        rx.try_recv().unwrap(),
        TaskEvent::Saved {
            task_id: task.id,
            owner,
            flags: StatusFlags::URGENT,
        }
    );

    let patch = TaskPatch {
        status: Some(Status::Done),
        ..TaskPatch::default()
    };
    svc.update(owner, task.id, patch).await.unwrap();
    assert_eq!(
        rx.try_recv().unwrap(),
        TaskEvent::Saved {
            task_id: task.id,
            owner,
            flags: StatusFlags::CALM,
        }
    );

    svc.delete(owner, task.id).await.unwrap();
    assert_eq!(
        rx.try_recv().unwrap(),
        TaskEvent::Deleted {
            task_id: task.id,
            owner
        }
    );
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn purge_owner_cascades_in_sqlite() {
    let (svc, _clock) = service_over(SqliteTaskStore::open_in_memory().unwrap());
    let leaving = OwnerId::new();
    let staying = OwnerId::new();
    for i in 0..4 {
        svc.create(leaving, new_task(&format!("old {i}"), None))
            .await
            .unwrap();
    }
    let kept = svc.create(staying, new_task("keep", None)).await.unwrap();

    assert_eq!(svc.purge_owner(leaving).await.unwrap(), 4);
    assert_eq!(svc.get(staying, kept.id).await.unwrap().title, "keep");
}
