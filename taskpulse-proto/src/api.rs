//! JSON bodies exchanged with the HTTP API.
//!
//! Deadlines cross the wire as strings in the display timezone
//! (`YYYY-MM-DD HH:MM:SS`); conversion to and from UTC happens at the
//! server's presentation boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::task::{OwnerId, Priority, Status, TaskId};

/// Body of `POST /tasks`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    /// Task title.
    pub title: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Optional deadline in display time.
    #[serde(default)]
    pub deadline: Option<String>,
    /// Priority code.
    pub priority: Priority,
    /// Status code.
    pub status: Status,
    /// Optional tags.
    #[serde(default)]
    pub tags: Option<String>,
}

/// Body of `PUT`/`PATCH /tasks/{id}`.
///
/// Absent fields are left untouched. For the nullable fields an explicit
/// `null` clears the stored value, which is why they are double options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTaskRequest {
    /// New title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description, or `Some(None)` to clear.
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    /// New deadline in display time, or `Some(None)` to clear.
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub deadline: Option<Option<String>>,
    /// New priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// New status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    /// New tags, or `Some(None)` to clear.
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub tags: Option<Option<String>>,
}

/// A task as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResponse {
    /// Task identifier.
    pub id: TaskId,
    /// Owning user.
    pub owner: OwnerId,
    /// Title.
    pub title: String,
    /// Description.
    pub description: Option<String>,
    /// Deadline rendered in display time.
    pub deadline: Option<String>,
    /// Priority code.
    pub priority: Priority,
    /// Status code.
    pub status: Status,
    /// Tags.
    pub tags: Option<String>,
    /// Derived urgent flag.
    pub is_urgent: bool,
    /// Derived overdue flag.
    pub is_overdue: bool,
    /// Creation time (UTC).
    pub created_at: DateTime<Utc>,
    /// Last save time (UTC).
    pub updated_at: DateTime<Utc>,
}

/// Error body returned for every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable error description.
    pub error: String,
}

/// Body returned by `DELETE /tasks/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedBody {
    /// Confirmation message.
    pub message: String,
}

/// Distinguishes a missing field (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
