//! Integration tests for filtered, ordered task listings.
//!
//! Seeds one owner's list with a done, an overdue, an urgent and a calm
//! task and checks every filter and ordering key against both stores.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use taskpulse::{
    InMemoryTaskStore, ManualClock, NewTask, SqliteTaskStore, TaskFilter, TaskRepository,
    TaskService, TaskStore,
};
use taskpulse_proto::task::{OwnerId, Priority, Status};

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 11, 20, 18, 30, 0).unwrap()
}

type Service<S> = TaskService<S, Arc<ManualClock>>;

/// Creates four tasks named after their state:
/// - `A`: done, priority LOW, deadline passed
/// - `B`: overdue, priority CRITICAL
/// - `C`: urgent, priority MEDIUM
/// - `D`: neither flag, priority HIGH, no deadline
///
/// Created in the order A, B, C, D so id order is alphabetical.
async fn seed<S: TaskStore>(store: S) -> (Service<S>, OwnerId) {
    let clock = Arc::new(ManualClock::new(t0()));
    let svc = TaskService::new(Arc::new(TaskRepository::new(store, clock)));
    let owner = OwnerId::new();

    let rows = [
        ("A", Priority::Low, Status::Done, Some(t0() - Duration::days(2))),
        ("B", Priority::Critical, Status::InProgress, Some(t0() - Duration::hours(5))),
        ("C", Priority::Medium, Status::Todo, Some(t0() + Duration::hours(5))),
        ("D", Priority::High, Status::Todo, None),
    ];
    for (title, priority, status, deadline) in rows {
        svc.create(
            owner,
            NewTask {
                title: title.to_string(),
                description: None,
                deadline,
                priority,
                status,
                tags: None,
            },
        )
        .await
        .unwrap();
    }

    // Another user's tasks never show up.
    svc.create(
        OwnerId::new(),
        NewTask {
            title: "X".to_string(),
            description: None,
            deadline: Some(t0() + Duration::hours(1)),
            priority: Priority::Critical,
            status: Status::Todo,
            tags: None,
        },
    )
    .await
    .unwrap();

    (svc, owner)
}

async fn titles<S: TaskStore>(
    svc: &Service<S>,
    owner: OwnerId,
    filter: &TaskFilter,
    ordering: Option<&str>,
) -> Vec<String> {
    svc.list(owner, filter, ordering)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.title)
        .collect()
}

async fn check_orderings<S: TaskStore>(store: S) {
    let (svc, owner) = seed(store).await;
    let all = TaskFilter::all();

    assert_eq!(titles(&svc, owner, &all, None).await, ["A", "B", "C", "D"]);
    assert_eq!(
        titles(&svc, owner, &all, Some("is_urgent")).await,
        ["A", "D", "C", "B"]
    );
    assert_eq!(
        titles(&svc, owner, &all, Some("-is_urgent")).await,
        ["B", "C", "D", "A"]
    );
    assert_eq!(
        titles(&svc, owner, &all, Some("-priority")).await,
        ["B", "D", "C", "A"]
    );
    assert_eq!(
        titles(&svc, owner, &all, Some("priority")).await,
        ["A", "C", "D", "B"]
    );
    // DONE < IN_PROGRESS < TODO, ties in id order.
    assert_eq!(
        titles(&svc, owner, &all, Some("status")).await,
        ["A", "B", "C", "D"]
    );
    assert_eq!(
        titles(&svc, owner, &all, Some("deadline")).await,
        ["D", "A", "B", "C"]
    );
    assert_eq!(
        titles(&svc, owner, &all, Some("-deadline")).await,
        ["C", "B", "A", "D"]
    );
    assert_eq!(
        titles(&svc, owner, &all, Some("-is_overdue")).await,
        ["B", "A", "C", "D"]
    );
    assert_eq!(
        titles(&svc, owner, &all, Some("title")).await,
        ["A", "B", "C", "D"]
    );
}

async fn check_filters<S: TaskStore>(store: S) {
    let (svc, owner) = seed(store).await;

    let urgent = TaskFilter {
        urgent: true,
        ..TaskFilter::all()
    };
    assert_eq!(titles(&svc, owner, &urgent, None).await, ["C"]);

    let overdue = TaskFilter {
        overdue: true,
        ..TaskFilter::all()
    };
    assert_eq!(titles(&svc, owner, &overdue, None).await, ["B"]);

    let either = TaskFilter {
        urgent: true,
        overdue: true,
        ..TaskFilter::all()
    };
    assert_eq!(
        titles(&svc, owner, &either, Some("-is_urgent")).await,
        ["B", "C"]
    );

    let high_or_low = TaskFilter {
        priorities: vec![Priority::High, Priority::Low],
        ..TaskFilter::all()
    };
    assert_eq!(titles(&svc, owner, &high_or_low, None).await, ["A", "D"]);

    let open_todo = TaskFilter {
        statuses: vec![Status::Todo],
        priorities: vec![Priority::Medium, Priority::High, Priority::Critical],
        ..TaskFilter::all()
    };
    assert_eq!(
        titles(&svc, owner, &open_todo, Some("-priority")).await,
        ["D", "C"]
    );

    let nothing = TaskFilter {
        urgent: true,
        statuses: vec![Status::Done],
        ..TaskFilter::all()
    };
    assert!(titles(&svc, owner, &nothing, None).await.is_empty());
}

// ===========================================================================
// Ordering
// ===========================================================================

#[tokio::test]
async fn orderings_in_memory() {
    check_orderings(InMemoryTaskStore::new()).await;
}

#[tokio::test]
async fn orderings_sqlite() {
    check_orderings(SqliteTaskStore::open_in_memory().unwrap()).await;
}

// ===========================================================================
// Filters
// ===========================================================================

#[tokio::test]
async fn filters_in_memory() {
    check_filters(InMemoryTaskStore::new()).await;
}

#[tokio::test]
async fn filters_sqlite() {
    check_filters(SqliteTaskStore::open_in_memory().unwrap()).await;
}
