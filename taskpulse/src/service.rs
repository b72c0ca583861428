//! Owner-scoped task CRUD.
//!
//! `TaskService` is the application-layer interface used by the HTTP API.
//! Every operation takes the caller's [`OwnerId`]; a task owned by someone
//! else is reported as [`TaskError::Forbidden`], a missing one as
//! [`TaskError::NotFound`]. All writes go through
//! [`TaskRepository::save`], so flags are always fresh after a mutation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use taskpulse_proto::task::{MAX_TASK_TITLE_LENGTH, OwnerId, Priority, Status, Task, TaskId};

use crate::clock::Clock;
use crate::filter::TaskFilter;
use crate::ordering;
use crate::repo::TaskRepository;
use crate::store::{StoreError, TaskStore};

/// Errors that can occur during task operations.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// Task title cannot be empty.
    #[error("task title cannot be empty")]
    TitleEmpty,
    /// Task title exceeds the maximum length.
    #[error("task title too long (max 255 characters)")]
    TitleTooLong,
    /// No task with this id exists.
    #[error("task not found: {0}")]
    NotFound(TaskId),
    /// The task belongs to another owner.
    #[error("task {0} belongs to another user")]
    Forbidden(TaskId),
    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Fields for a new task. Deadlines are already in UTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    /// Title, validated on create.
    pub title: String,
    /// Optional description.
    pub description: Option<String>,
    /// Optional deadline (UTC).
    pub deadline: Option<DateTime<Utc>>,
    /// Priority.
    pub priority: Priority,
    /// Initial status.
    pub status: Status,
    /// Optional tags.
    pub tags: Option<String>,
}

/// A partial update. `None` leaves a field alone; for the nullable fields
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    /// New title, validated like on create.
    pub title: Option<String>,
    /// New description, or `Some(None)` to clear.
    pub description: Option<Option<String>>,
    /// New deadline (UTC), or `Some(None)` to clear.
    pub deadline: Option<Option<DateTime<Utc>>>,
    /// New priority.
    pub priority: Option<Priority>,
    /// New status.
    pub status: Option<Status>,
    /// New tags, or `Some(None)` to clear.
    pub tags: Option<Option<String>>,
}

fn validate_title(title: &str) -> Result<(), TaskError> {
    if title.trim().is_empty() {
        return Err(TaskError::TitleEmpty);
    }
    if title.chars().count() > MAX_TASK_TITLE_LENGTH {
        return Err(TaskError::TitleTooLong);
    }
    Ok(())
}

/// Owner-scoped CRUD over a shared [`TaskRepository`].
pub struct TaskService<S, C> {
    repo: Arc<TaskRepository<S, C>>,
}

impl<S, C> Clone for TaskService<S, C> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
        }
    }
}

impl<S: TaskStore, C: Clock> TaskService<S, C> {
    /// Creates a service over a shared repository.
    #[must_use]
    pub const fn new(repo: Arc<TaskRepository<S, C>>) -> Self {
        Self { repo }
    }

    /// The underlying repository.
    #[must_use]
    pub const fn repository(&self) -> &Arc<TaskRepository<S, C>> {
        &self.repo
    }

    /// Creates a task for `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TitleEmpty`] or [`TaskError::TitleTooLong`] for
    /// an invalid title, or [`TaskError::Store`] if the write fails.
    pub async fn create(&self, owner: OwnerId, new: NewTask) -> Result<Task, TaskError> {
        validate_title(&new.title)?;

        let now = self.repo.clock().now();
        let mut task = Task {
            id: TaskId::new(),
            owner,
            title: new.title,
            description: new.description,
            deadline: new.deadline,
            priority: new.priority,
            status: new.status,
            tags: new.tags,
            is_urgent: false,
            is_overdue: false,
            created_at: now,
            updated_at: now,
        };
        self.repo.save(&mut task).await?;
        tracing::info!(task_id = %task.id, owner = %owner, "task created");
        Ok(task)
    }

    /// Fetches one of `owner`'s tasks.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NotFound`] or [`TaskError::Forbidden`], or
    /// [`TaskError::Store`] if the read fails.
    pub async fn get(&self, owner: OwnerId, id: TaskId) -> Result<Task, TaskError> {
        let task = self.repo.find(&id).await?.ok_or(TaskError::NotFound(id))?;
        if task.owner != owner {
            return Err(TaskError::Forbidden(id));
        }
        Ok(task)
    }

    /// Applies `patch` to one of `owner`'s tasks and saves it.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get), plus title validation errors when the
    /// patch carries a title.
    pub async fn update(&self, owner: OwnerId, id: TaskId, patch: TaskPatch) -> Result<Task, TaskError> {
        let mut task = self.get(owner, id).await?;

        if let Some(title) = patch.title {
            validate_title(&title)?;
            task.title = title;
        }
        if let Some(description) = patch.description {
            task.description = description;
        }
        if let Some(deadline) = patch.deadline {
            task.deadline = deadline;
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(tags) = patch.tags {
            task.tags = tags;
        }

        self.repo.save(&mut task).await?;
        Ok(task)
    }

    /// Deletes one of `owner`'s tasks.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get), or [`TaskError::Store`] if the delete
    /// fails.
    pub async fn delete(&self, owner: OwnerId, id: TaskId) -> Result<(), TaskError> {
        let task = self.get(owner, id).await?;
        if !self.repo.delete(&task).await? {
            return Err(TaskError::NotFound(id));
        }
        tracing::info!(task_id = %id, owner = %owner, "task deleted");
        Ok(())
    }

    /// Lists `owner`'s tasks passing `filter`, sorted by `ordering` when
    /// given. Without an ordering (or with an unknown key) tasks come back in
    /// id order.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Store`] if the query fails.
    pub async fn list(
        &self,
        owner: OwnerId,
        filter: &TaskFilter,
        ordering: Option<&str>,
    ) -> Result<Vec<Task>, TaskError> {
        let mut tasks = self.repo.query(&owner, filter).await?;
        if let Some(key) = ordering {
            ordering::order(&mut tasks, key);
        }
        Ok(tasks)
    }

    /// Deletes every task owned by `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Store`] if the delete fails.
    pub async fn purge_owner(&self, owner: OwnerId) -> Result<usize, TaskError> {
        Ok(self.repo.purge_owner(&owner).await?)
    }
}
