//! Listing filters.

use taskpulse_proto::task::{Priority, Status, Task};

/// Criteria for narrowing a task listing.
///
/// Flag filters combine as "either" when both are set, so asking for urgent
/// and overdue tasks returns everything that needs attention.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    /// Keep urgent tasks.
    pub urgent: bool,
    /// Keep overdue tasks.
    pub overdue: bool,
    /// Keep only these priorities (empty keeps all).
    pub priorities: Vec<Priority>,
    /// Keep only these statuses (empty keeps all).
    pub statuses: Vec<Status>,
}

impl TaskFilter {
    /// A filter that keeps every task.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Returns `true` if `task` passes this filter.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        let flags_ok = match (self.urgent, self.overdue) {
            (true, true) => task.is_urgent || task.is_overdue,
            (true, false) => task.is_urgent,
            (false, true) => task.is_overdue,
            (false, false) => true,
        };
        flags_ok
            && (self.priorities.is_empty() || self.priorities.contains(&task.priority))
            && (self.statuses.is_empty() || self.statuses.contains(&task.status))
    }
}
