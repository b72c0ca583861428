//! Task model for `TaskPulse`.
//!
//! A [`Task`] is the only entity in the system. Its `is_urgent` and
//! `is_overdue` fields are derived from the deadline and status and are
//! rewritten by the core on every save; they travel over the wire so that
//! listings can filter and sort on them.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum allowed task title length in characters.
pub const MAX_TASK_TITLE_LENGTH: usize = 255;

/// Unique identifier for a task, based on UUID v7 for time-ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Creates a new time-ordered task identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `TaskId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Identifier of the user who owns a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(Uuid);

impl OwnerId {
    /// Creates a fresh random owner identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates an `OwnerId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OwnerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OwnerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Error returned when a priority or status code is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} code: {code:?}")]
pub struct UnknownCode {
    /// Which enum was being parsed (`"priority"` or `"status"`).
    pub kind: &'static str,
    /// The rejected input.
    pub code: String,
}

/// Task priority.
///
/// Variants are declared lowest first so the derived `Ord` is the ranking
/// used for sorting: `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    /// Can wait.
    Low,
    /// Normal priority.
    Medium,
    /// Should be done soon.
    High,
    /// Drop everything.
    Critical,
}

impl Priority {
    /// All priorities, lowest first.
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    /// Numeric rank, 1 for `Low` up to 4 for `Critical`.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Critical => 4,
        }
    }

    /// Stored / wire code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownCode {
                kind: "priority",
                code: s.to_string(),
            })
    }
}

/// Progress status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Not started.
    Todo,
    /// Being worked on.
    InProgress,
    /// Finished. Done tasks are never urgent or overdue.
    Done,
}

impl Status {
    /// All statuses in workflow order.
    pub const ALL: [Self; 3] = [Self::Todo, Self::InProgress, Self::Done];

    /// Stored / wire code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "TODO",
            Self::InProgress => "IN_PROGRESS",
            Self::Done => "DONE",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| UnknownCode {
                kind: "status",
                code: s.to_string(),
            })
    }
}

/// The pair of derived flags carried by every task.
///
/// At most one of the two is ever set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StatusFlags {
    /// Deadline is in the future but less than 24 hours away.
    pub is_urgent: bool,
    /// Deadline has passed.
    pub is_overdue: bool,
}

impl StatusFlags {
    /// Neither urgent nor overdue.
    pub const CALM: Self = Self {
        is_urgent: false,
        is_overdue: false,
    };
    /// Urgent only.
    pub const URGENT: Self = Self {
        is_urgent: true,
        is_overdue: false,
    };
    /// Overdue only.
    pub const OVERDUE: Self = Self {
        is_urgent: false,
        is_overdue: true,
    };
}

/// A personal task record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier (UUID v7, time-ordered).
    pub id: TaskId,
    /// The user who created the task.
    pub owner: OwnerId,
    /// Short title, 1..=255 characters.
    pub title: String,
    /// Optional free-form description.
    pub description: Option<String>,
    /// Optional deadline in UTC.
    pub deadline: Option<DateTime<Utc>>,
    /// Priority used for custom sorting.
    pub priority: Priority,
    /// Progress status.
    pub status: Status,
    /// Optional free-text tags.
    pub tags: Option<String>,
    /// Derived: deadline within the next 24 hours.
    pub is_urgent: bool,
    /// Derived: deadline already passed.
    pub is_overdue: bool,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the task was last saved through the normal save path.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Current derived flags of this record.
    #[must_use]
    pub const fn flags(&self) -> StatusFlags {
        StatusFlags {
            is_urgent: self.is_urgent,
            is_overdue: self.is_overdue,
        }
    }

    /// Overwrites the derived flags.
    pub const fn set_flags(&mut self, flags: StatusFlags) {
        self.is_urgent = flags.is_urgent;
        self.is_overdue = flags.is_overdue;
    }
}
