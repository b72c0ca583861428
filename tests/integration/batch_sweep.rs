//! Integration tests for the batch recompute and the recurring sweeper.
//!
//! Tests paging bounds over a large table, failure handling for single
//! records and whole pages, the `SQLite` path shared with the command
//! entry points, and sweeper timing under paused tokio time.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use taskpulse::recompute::DEFAULT_PAGE_SIZE;
use taskpulse::{
    BatchRecomputer, InMemoryTaskStore, ManualClock, RecomputeError, RecurringSweeper,
    SqliteTaskStore, StoreError, TaskFilter, TaskRepository, TaskStore,
};
use taskpulse_proto::task::{OwnerId, Priority, Status, StatusFlags, Task, TaskId};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Instrumented stores
// ---------------------------------------------------------------------------

/// Records how many pages were read and the largest page handed out.
#[derive(Default)]
struct CountingStore {
    inner: InMemoryTaskStore,
    scans: AtomicUsize,
    largest_page: AtomicUsize,
}

impl TaskStore for CountingStore {
    async fn get(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        self.inner.get(id).await
    }

    async fn put(&self, task: &Task) -> Result<(), StoreError> {
        self.inner.put(task).await
    }

    async fn put_flags(&self, task: &Task) -> Result<bool, StoreError> {
        self.inner.put_flags(task).await
    }

    async fn remove(&self, id: &TaskId) -> Result<bool, StoreError> {
        self.inner.remove(id).await
    }

    async fn remove_owned_by(&self, owner: &OwnerId) -> Result<usize, StoreError> {
        self.inner.remove_owned_by(owner).await
    }

    async fn scan_page(&self, after: Option<TaskId>, limit: usize) -> Result<Vec<Task>, StoreError> {
        let page = self.inner.scan_page(after, limit).await?;
        self.scans.fetch_add(1, Ordering::SeqCst);
        self.largest_page.fetch_max(page.len(), Ordering::SeqCst);
        Ok(page)
    }

    async fn query(&self, owner: &OwnerId, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        self.inner.query(owner, filter).await
    }
}

/// Rejects writes for selected ids and, when asked, every page read.
#[derive(Default)]
struct FaultyStore {
    inner: InMemoryTaskStore,
    reject_puts: Mutex<HashSet<TaskId>>,
    fail_scans: AtomicBool,
}

impl TaskStore for FaultyStore {
    async fn get(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        self.inner.get(id).await
    }

    async fn put(&self, task: &Task) -> Result<(), StoreError> {
        if self.reject_puts.lock().contains(&task.id) {
            return Err(StoreError::WriteFailed(format!("row {} is locked", task.id)));
        }
        self.inner.put(task).await
    }

    async fn put_flags(&self, task: &Task) -> Result<bool, StoreError> {
        if self.reject_puts.lock().contains(&task.id) {
            return Err(StoreError::WriteFailed(format!("row {} is locked", task.id)));
        }
        self.inner.put_flags(task).await
    }

    async fn remove(&self, id: &TaskId) -> Result<bool, StoreError> {
        self.inner.remove(id).await
    }

    async fn remove_owned_by(&self, owner: &OwnerId) -> Result<usize, StoreError> {
        self.inner.remove_owned_by(owner).await
    }

    async fn scan_page(&self, after: Option<TaskId>, limit: usize) -> Result<Vec<Task>, StoreError> {
        if self.fail_scans.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        self.inner.scan_page(after, limit).await
    }

    async fn query(&self, owner: &OwnerId, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        self.inner.query(owner, filter).await
    }
}

/// Commits queued user edits right after handing out a page, the way a save
/// landing between a sweep's read and its write-back would.
#[derive(Default)]
struct InterleavingStore {
    inner: InMemoryTaskStore,
    pending_edits: Mutex<Vec<Task>>,
}

impl TaskStore for InterleavingStore {
    async fn get(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        self.inner.get(id).await
    }

    async fn put(&self, task: &Task) -> Result<(), StoreError> {
        self.inner.put(task).await
    }

    async fn put_flags(&self, task: &Task) -> Result<bool, StoreError> {
        self.inner.put_flags(task).await
    }

    async fn remove(&self, id: &TaskId) -> Result<bool, StoreError> {
        self.inner.remove(id).await
    }

    async fn remove_owned_by(&self, owner: &OwnerId) -> Result<usize, StoreError> {
        self.inner.remove_owned_by(owner).await
    }

    async fn scan_page(&self, after: Option<TaskId>, limit: usize) -> Result<Vec<Task>, StoreError> {
        let page = self.inner.scan_page(after, limit).await?;
        let edits = std::mem::take(&mut *self.pending_edits.lock());
        for edit in &edits {
            self.inner.put(edit).await?;
        }
        Ok(page)
    }

    async fn query(&self, owner: &OwnerId, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        self.inner.query(owner, filter).await
    }
}

/// Serves the first page, then parks every later page read until the
/// pass is dropped. `parked` fires once a read is waiting.
#[derive(Default)]
struct GatedStore {
    inner: InMemoryTaskStore,
    parked: Notify,
    release: Notify,
}

impl TaskStore for GatedStore {
    async fn get(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        self.inner.get(id).await
    }

    async fn put(&self, task: &Task) -> Result<(), StoreError> {
        self.inner.put(task).await
    }

    async fn put_flags(&self, task: &Task) -> Result<bool, StoreError> {
        self.inner.put_flags(task).await
    }

    async fn remove(&self, id: &TaskId) -> Result<bool, StoreError> {
        self.inner.remove(id).await
    }

    async fn remove_owned_by(&self, owner: &OwnerId) -> Result<usize, StoreError> {
        self.inner.remove_owned_by(owner).await
    }

    async fn scan_page(&self, after: Option<TaskId>, limit: usize) -> Result<Vec<Task>, StoreError> {
        if after.is_some() {
            self.parked.notify_one();
            self.release.notified().await;
        }
        self.inner.scan_page(after, limit).await
    }

    async fn query(&self, owner: &OwnerId, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        self.inner.query(owner, filter).await
    }
}

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap()
}

fn repo_over<S: TaskStore>(store: S) -> (Arc<TaskRepository<S, Arc<ManualClock>>>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(t0()));
    (
        Arc::new(TaskRepository::new(store, Arc::clone(&clock))),
        clock,
    )
}

async fn seed<S: TaskStore>(
    repo: &TaskRepository<S, Arc<ManualClock>>,
    deadline: Option<DateTime<Utc>>,
) -> Task {
    let mut task = Task {
        id: TaskId::new(),
        owner: OwnerId::new(),
        title: "seeded".to_string(),
        description: None,
        deadline,
        priority: Priority::Low,
        status: Status::Todo,
        tags: None,
        is_urgent: false,
        is_overdue: false,
        created_at: t0(),
        updated_at: t0(),
    };
    repo.save(&mut task).await.unwrap();
    task
}

// ===========================================================================
// Paging
// ===========================================================================

#[tokio::test]
async fn two_hundred_fifty_records_take_three_pages() {
    let (repo, clock) = repo_over(CountingStore::default());
    for i in 0..250 {
        seed(&repo, Some(t0() + Duration::hours(30 + i))).await;
    }

    // 12h later, deadlines up to 36h out (i = 0..=5) are inside the window.
    clock.advance(Duration::hours(12));
    let report = BatchRecomputer::new(Arc::clone(&repo))
        .recompute_all(DEFAULT_PAGE_SIZE)
        .await
        .unwrap();

    assert_eq!(report.pages, 3);
    assert_eq!(report.processed, 250);
    assert_eq!(report.updated, 6);
    assert_eq!(report.failed, 0);
    assert_eq!(repo.store().scans.load(Ordering::SeqCst), 3);
    assert_eq!(repo.store().largest_page.load(Ordering::SeqCst), 100);
}

#[tokio::test]
async fn exact_multiple_of_page_size_reads_trailing_empty_page() {
    let (repo, _clock) = repo_over(CountingStore::default());
    for _ in 0..200 {
        seed(&repo, None).await;
    }
    let report = BatchRecomputer::new(Arc::clone(&repo))
        .recompute_all(100)
        .await
        .unwrap();
    assert_eq!(report.pages, 2);
    assert_eq!(report.processed, 200);
    assert_eq!(repo.store().scans.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn page_size_of_one_still_visits_everything() {
    let (repo, clock) = repo_over(InMemoryTaskStore::new());
    let mut seeded = Vec::new();
    for h in [1, 2, 3, 4, 5] {
        seeded.push(seed(&repo, Some(t0() + Duration::hours(h))).await);
    }
    clock.advance(Duration::hours(10));
    let report = BatchRecomputer::new(Arc::clone(&repo))
        .recompute_all(1)
        .await
        .unwrap();
    assert_eq!(report.pages, 5);
    assert_eq!(report.processed, 5);
    assert_eq!(report.updated, 5);
    for task in &seeded {
        let stored = repo.find(&task.id).await.unwrap().unwrap();
        assert_eq!(stored.flags(), StatusFlags::OVERDUE);
    }
}

// ===========================================================================
// Failures
// ===========================================================================

#[tokio::test]
async fn failed_record_is_counted_and_pass_continues() {
    let (repo, clock) = repo_over(FaultyStore::default());
    let stuck = seed(&repo, Some(t0() + Duration::hours(2))).await;
    let others = [
        seed(&repo, Some(t0() + Duration::hours(3))).await,
        seed(&repo, Some(t0() + Duration::hours(4))).await,
    ];
    repo.store().reject_puts.lock().insert(stuck.id);

    clock.advance(Duration::hours(6));
    let report = BatchRecomputer::new(Arc::clone(&repo))
        .recompute_all(2)
        .await
        .unwrap();

    assert_eq!(report.processed, 3);
    assert_eq!(report.updated, 2);
    assert_eq!(report.failed, 1);
    for task in &others {
        let stored = repo.find(&task.id).await.unwrap().unwrap();
        assert_eq!(stored.flags(), StatusFlags::OVERDUE);
    }
    let stored = repo.find(&stuck.id).await.unwrap().unwrap();
    assert_eq!(stored.flags(), StatusFlags::URGENT);
}

#[tokio::test]
async fn failed_page_read_aborts_the_pass() {
    let (repo, _clock) = repo_over(FaultyStore::default());
    seed(&repo, None).await;
    repo.store().fail_scans.store(true, Ordering::SeqCst);

    let err = BatchRecomputer::new(Arc::clone(&repo))
        .recompute_all(10)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RecomputeError::Scan {
            after: None,
            source: StoreError::Unavailable(_)
        }
    ));
}

#[tokio::test]
async fn edits_made_during_a_pass_survive_it() {
    let (repo, clock) = repo_over(InterleavingStore::default());
    let completed = seed(&repo, Some(t0() + Duration::hours(2))).await;
    let retitled = seed(&repo, Some(t0() + Duration::hours(2))).await;

    // Both go overdue; meanwhile the user finishes one and renames the other.
    clock.advance(Duration::hours(3));
    let mut finished = completed.clone();
    finished.status = Status::Done;
    finished.title = "finished".to_string();
    finished.set_flags(StatusFlags::CALM);
    finished.updated_at = t0() + Duration::hours(3);
    let mut renamed = retitled.clone();
    renamed.title = "renamed".to_string();
    repo.store()
        .pending_edits
        .lock()
        .extend([finished.clone(), renamed.clone()]);

    let report = BatchRecomputer::new(Arc::clone(&repo))
        .recompute_all(DEFAULT_PAGE_SIZE)
        .await
        .unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.updated, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 0);

    assert_eq!(repo.find(&completed.id).await.unwrap().unwrap(), finished);

    let stored = repo.find(&retitled.id).await.unwrap().unwrap();
    assert_eq!(stored.title, "renamed");
    assert_eq!(stored.flags(), StatusFlags::OVERDUE);
    assert_eq!(stored.updated_at, retitled.updated_at);
}

// ===========================================================================
// SQLite
// ===========================================================================

#[tokio::test]
async fn sqlite_recompute_persists_only_changed_rows() {
    let (repo, clock) = repo_over(SqliteTaskStore::open_in_memory().unwrap());
    let soon = seed(&repo, Some(t0() + Duration::hours(26))).await;
    let far = seed(&repo, Some(t0() + Duration::days(9))).await;
    let none = seed(&repo, None).await;

    clock.advance(Duration::hours(3));
    let recomputer = BatchRecomputer::new(Arc::clone(&repo));
    let report = recomputer.recompute_all(2).await.unwrap();
    assert_eq!(report.pages, 2);
    assert_eq!(report.updated, 1);

    let stored = repo.find(&soon.id).await.unwrap().unwrap();
    assert_eq!(stored.flags(), StatusFlags::URGENT);
    assert_eq!(stored.updated_at, t0(), "quiet writes keep updated_at");
    assert_eq!(
        repo.find(&far.id).await.unwrap().unwrap().flags(),
        StatusFlags::CALM
    );
    assert_eq!(
        repo.find(&none.id).await.unwrap().unwrap().flags(),
        StatusFlags::CALM
    );

    let again = recomputer.recompute_all(2).await.unwrap();
    assert_eq!(again.updated, 0);
}

#[tokio::test]
async fn separate_processes_share_the_database_file() {
    let dir = std::env::temp_dir().join(format!("taskpulse-sweep-{}", TaskId::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("tasks.db");

    let (writer, clock) = repo_over(SqliteTaskStore::open(&path).unwrap());
    let task = seed(&writer, Some(t0() + Duration::hours(2))).await;

    // A second connection plays the role of the update-flags command.
    clock.advance(Duration::hours(3));
    let updater = Arc::new(TaskRepository::new(
        SqliteTaskStore::open(&path).unwrap(),
        Arc::clone(&clock),
    ));
    let report = BatchRecomputer::new(updater).recompute_all(100).await.unwrap();
    assert_eq!(report.updated, 1);

    let stored = writer.find(&task.id).await.unwrap().unwrap();
    assert_eq!(stored.flags(), StatusFlags::OVERDUE);

    drop(writer);
    let _ = std::fs::remove_dir_all(&dir);
}

// ===========================================================================
// Sweeper
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn sweeper_catches_deadlines_as_time_passes() {
    let (repo, clock) = repo_over(InMemoryTaskStore::new());
    let task = seed(&repo, Some(t0() + Duration::hours(26))).await;
    assert_eq!(task.flags(), StatusFlags::CALM);

    let cancel = CancellationToken::new();
    let sweeper = RecurringSweeper::new(
        BatchRecomputer::new(Arc::clone(&repo)),
        Arc::clone(&clock),
        cancel.child_token(),
    )
    .with_interval(StdDuration::from_secs(3600))
    .with_page_size(10);
    let mut events = sweeper.subscribe();
    let handle = sweeper.spawn();

    let first = events.recv().await.unwrap();
    assert_eq!(first.outcome.unwrap().updated, 0);

    // Move the manual clock before each interval elapses.
    for hours_later in [1, 3, 30] {
        clock.set(t0() + Duration::hours(hours_later));
        let event = events.recv().await.unwrap();
        assert!(event.outcome.is_ok());
        let flags = repo.find(&task.id).await.unwrap().unwrap().flags();
        match hours_later {
            1 => assert_eq!(flags, StatusFlags::CALM),
            3 => assert_eq!(flags, StatusFlags::URGENT),
            _ => assert_eq!(flags, StatusFlags::OVERDUE),
        }
    }

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn sweeper_survives_failed_passes() {
    let (repo, clock) = repo_over(FaultyStore::default());
    repo.store().fail_scans.store(true, Ordering::SeqCst);
    let task = seed(&repo, Some(t0() + Duration::hours(1))).await;

    let cancel = CancellationToken::new();
    let sweeper = RecurringSweeper::new(
        BatchRecomputer::new(Arc::clone(&repo)),
        Arc::clone(&clock),
        cancel.clone(),
    )
    .with_interval(StdDuration::from_secs(60));
    let mut events = sweeper.subscribe();
    let handle = sweeper.spawn();

    let failed = events.recv().await.unwrap();
    assert!(failed.outcome.unwrap_err().contains("connection reset"));

    // Storage recovers; the next pass goes through.
    repo.store().fail_scans.store(false, Ordering::SeqCst);
    clock.advance(Duration::hours(2));
    let recovered = events.recv().await.unwrap();
    assert_eq!(recovered.pass, 2);
    assert_eq!(recovered.outcome.unwrap().updated, 1);
    assert_eq!(
        repo.find(&task.id).await.unwrap().unwrap().flags(),
        StatusFlags::OVERDUE
    );

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn sweeper_cancelled_mid_pass_stops_without_event() {
    let (repo, clock) = repo_over(GatedStore::default());
    let first = seed(&repo, Some(t0() + Duration::hours(2))).await;
    let second = seed(&repo, Some(t0() + Duration::hours(2))).await;
    clock.advance(Duration::hours(3));

    let cancel = CancellationToken::new();
    let sweeper = RecurringSweeper::new(
        BatchRecomputer::new(Arc::clone(&repo)),
        Arc::clone(&clock),
        cancel.clone(),
    )
    .with_page_size(1);
    let mut events = sweeper.subscribe();
    let handle = sweeper.spawn();

    // The first page is written back, the second read never returns.
    repo.store().parked.notified().await;
    cancel.cancel();
    handle.await.unwrap();
    assert!(events.try_recv().is_err(), "an interrupted pass is not reported");

    let mut expected_first = first.clone();
    expected_first.set_flags(StatusFlags::OVERDUE);
    assert_eq!(repo.find(&first.id).await.unwrap().unwrap(), expected_first);
    assert_eq!(repo.find(&second.id).await.unwrap().unwrap(), second);
}
