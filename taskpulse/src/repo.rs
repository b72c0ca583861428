//! Task repository: the single write path for task records.
//!
//! [`TaskRepository`] wraps a [`TaskStore`] and a [`Clock`] and exposes two
//! explicit write methods:
//!
//! - [`save`](TaskRepository::save) runs the flag hook, stamps `updated_at`,
//!   persists, and broadcasts a [`TaskEvent::Saved`].
//! - [`save_quiet`](TaskRepository::save_quiet) writes only the flags, and
//!   only while the record's deadline and status are unchanged. No hook, no
//!   event. Used by the batch recomputer so routine sweeps neither show up
//!   as user changes nor overwrite them.

use taskpulse_proto::task::{OwnerId, StatusFlags, Task, TaskId};
use tokio::sync::broadcast;

use crate::clock::Clock;
use crate::filter::TaskFilter;
use crate::flags;
use crate::store::{StoreError, TaskStore};

/// Capacity of the change-event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A change notification emitted by normal writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// A task was created or updated through [`TaskRepository::save`].
    Saved {
        /// Which task.
        task_id: TaskId,
        /// Its owner.
        owner: OwnerId,
        /// Flags as committed.
        flags: StatusFlags,
    },
    /// A task was deleted.
    Deleted {
        /// Which task.
        task_id: TaskId,
        /// Its owner.
        owner: OwnerId,
    },
}

/// Write path and read access for task records.
pub struct TaskRepository<S, C> {
    store: S,
    clock: C,
    events: broadcast::Sender<TaskEvent>,
}

impl<S: TaskStore, C: Clock> TaskRepository<S, C> {
    /// Creates a repository over `store`, reading time from `clock`.
    #[must_use]
    pub fn new(store: S, clock: C) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            clock,
            events,
        }
    }

    /// Subscribes to change events from normal saves and deletes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    /// The clock this repository stamps records with.
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    /// The underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Saves `task` through the normal path.
    ///
    /// Immediately before the write the flags are recomputed from the
    /// record's deadline and status, overwriting whatever the caller put
    /// there, and `updated_at` is stamped. On success a
    /// [`TaskEvent::Saved`] is broadcast.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the write fails. `task` is left as it
    /// was and no event is sent then.
    pub async fn save(&self, task: &mut Task) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut record = task.clone();
        flags::refresh(&mut record, now);
        record.updated_at = now;

        self.store.put(&record).await?;
        *task = record;

        tracing::debug!(
            task_id = %task.id,
            is_urgent = task.is_urgent,
            is_overdue = task.is_overdue,
            "task saved"
        );
        // No subscribers is not an error.
        let _ = self.events.send(TaskEvent::Saved {
            task_id: task.id,
            owner: task.owner,
            flags: task.flags(),
        });
        Ok(())
    }

    /// Writes `task`'s flags as given, without the flag hook and without
    /// emitting an event. No other column is touched.
    ///
    /// Returns `false` if the stored record was deleted or had its deadline
    /// or status changed after `task` was read; the write is skipped then,
    /// since the flags in `task` no longer describe it.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the write fails.
    pub async fn save_quiet(&self, task: &Task) -> Result<bool, StoreError> {
        self.store.put_flags(task).await
    }

    /// Deletes a task. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the delete fails.
    pub async fn delete(&self, task: &Task) -> Result<bool, StoreError> {
        let existed = self.store.remove(&task.id).await?;
        if existed {
            tracing::debug!(task_id = %task.id, "task deleted");
            let _ = self.events.send(TaskEvent::Deleted {
                task_id: task.id,
                owner: task.owner,
            });
        }
        Ok(existed)
    }

    /// Deletes every task owned by `owner`. Used when a user is removed.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the delete fails.
    pub async fn purge_owner(&self, owner: &OwnerId) -> Result<usize, StoreError> {
        let removed = self.store.remove_owned_by(owner).await?;
        tracing::info!(owner = %owner, removed, "purged owner's tasks");
        Ok(removed)
    }

    /// Fetches a task by id.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the read fails.
    pub async fn find(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        self.store.get(id).await
    }

    /// Reads one page of tasks after `after`, see [`TaskStore::scan_page`].
    ///
    /// # Errors
    ///
    /// Returns the store's error if the read fails.
    pub async fn scan_page(
        &self,
        after: Option<TaskId>,
        limit: usize,
    ) -> Result<Vec<Task>, StoreError> {
        self.store.scan_page(after, limit).await
    }

    /// Returns `owner`'s tasks matching `filter`, in id order.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the read fails.
    pub async fn query(&self, owner: &OwnerId, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        self.store.query(owner, filter).await
    }
}
