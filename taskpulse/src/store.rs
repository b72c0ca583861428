//! Task persistence.
//!
//! Defines the [`TaskStore`] trait the rest of the core is written against,
//! plus [`InMemoryTaskStore`]. The `SQLite` implementation lives in
//! [`crate::sqlite`].
//!
//! Stores are dumb: they never compute flags and never emit events. The
//! save hook and change notifications belong to
//! [`TaskRepository`](crate::repo::TaskRepository).

use std::collections::BTreeMap;
use std::ops::Bound;

use taskpulse_proto::task::{OwnerId, Task, TaskId};
use tokio::sync::RwLock;

use crate::filter::TaskFilter;

/// Errors that can occur during task storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying storage is unavailable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A write operation failed.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// A read operation failed.
    #[error("read failed: {0}")]
    ReadFailed(String),

    /// The requested item was not found.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Trait for persisting task records.
///
/// Implementations:
/// - [`InMemoryTaskStore`]: in-process map, used by tests and ephemeral servers
/// - [`SqliteTaskStore`](crate::sqlite::SqliteTaskStore): on-disk store shared
///   between the API server and the flag-update commands
pub trait TaskStore: Send + Sync {
    /// Fetches a single task.
    fn get(
        &self,
        id: &TaskId,
    ) -> impl std::future::Future<Output = Result<Option<Task>, StoreError>> + Send;

    /// Inserts or replaces a task, keyed by its id.
    fn put(&self, task: &Task) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Writes only `task`'s `is_urgent` / `is_overdue` columns, and only if
    /// the stored record still has the deadline and status of `task`.
    ///
    /// Returns `false` when the record is gone or was edited since `task`
    /// was read; nothing is written then. Every other column is left alone.
    fn put_flags(
        &self,
        task: &Task,
    ) -> impl std::future::Future<Output = Result<bool, StoreError>> + Send;

    /// Removes a task. Returns `true` if it existed.
    fn remove(
        &self,
        id: &TaskId,
    ) -> impl std::future::Future<Output = Result<bool, StoreError>> + Send;

    /// Removes every task owned by `owner`, returning how many were removed.
    fn remove_owned_by(
        &self,
        owner: &OwnerId,
    ) -> impl std::future::Future<Output = Result<usize, StoreError>> + Send;

    /// Returns up to `limit` tasks with ids strictly greater than `after`
    /// (or from the start when `after` is `None`), in ascending id order.
    fn scan_page(
        &self,
        after: Option<TaskId>,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<Task>, StoreError>> + Send;

    /// Returns `owner`'s tasks that pass `filter`, in ascending id order.
    fn query(
        &self,
        owner: &OwnerId,
        filter: &TaskFilter,
    ) -> impl std::future::Future<Output = Result<Vec<Task>, StoreError>> + Send;
}

/// In-memory task store backed by an ordered map.
///
/// Thread-safe via [`RwLock`]. The map is keyed by [`TaskId`], whose UUID v7
/// ordering gives a stable scan order for keyset pagination.
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<BTreeMap<TaskId, Task>>,
}

impl InMemoryTaskStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tasks.
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Returns `true` if no tasks are stored.
    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

impl TaskStore for InMemoryTaskStore {
    async fn get(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.read().await.get(id).cloned())
    }

    async fn put(&self, task: &Task) -> Result<(), StoreError> {
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn put_flags(&self, task: &Task) -> Result<bool, StoreError> {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&task.id) {
            Some(stored) if stored.deadline == task.deadline && stored.status == task.status => {
                stored.set_flags(task.flags());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove(&self, id: &TaskId) -> Result<bool, StoreError> {
        Ok(self.tasks.write().await.remove(id).is_some())
    }

    async fn remove_owned_by(&self, owner: &OwnerId) -> Result<usize, StoreError> {
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, task| task.owner != *owner);
        Ok(before - tasks.len())
    }

    async fn scan_page(&self, after: Option<TaskId>, limit: usize) -> Result<Vec<Task>, StoreError> {
        let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
        let tasks = self.tasks.read().await;
        Ok(tasks
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(_, task)| task.clone())
            .collect())
    }

    async fn query(&self, owner: &OwnerId, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .values()
            .filter(|task| task.owner == *owner && filter.matches(task))
            .cloned()
            .collect())
    }
}
